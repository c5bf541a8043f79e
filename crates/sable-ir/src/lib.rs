//! SSA Intermediate Representation for the Sable compiler middle-end
//!
//! Functions are control-flow graphs of basic blocks holding typed
//! instructions in SSA form. Every value a function owns (constants,
//! arguments, blocks, instructions) lives in the function's arena and is
//! addressed by a copyable [`ValueId`]; use-lists are maintained next to
//! the arena so def-use stays bidirectionally consistent through every
//! mutation.
//!
//! # Structure
//!
//! - [`Module`] - Ordered function collection with name disambiguation
//! - [`Function`] - Value arena, def-use engine, naming, deep cloning
//! - Basic block and instruction operations as `Function` methods
//! - [`Scope`] / [`Syntax`] - Opcode registry and declarative operand schemas
//! - [`Builder`] - Block-cursored construction helper
//! - [`Printer`] - Chunked textual rendering
//! - [`EventStream`] - Replayable instrumentation log of IR mutations

pub mod block;
pub mod builder;
pub mod error;
pub mod events;
pub mod function;
pub mod insn;
pub mod module;
pub mod pretty;
pub mod syntax;
pub mod types;
pub mod value;

pub use builder::Builder;
pub use error::{IrError, IrResult};
pub use events::{Event, EventStream, OperandRecord};
pub use function::Function;
pub use module::Module;
pub use pretty::{PrettyPrint, Printer, default_colorize, set_default_colorize};
pub use syntax::{
    InsnSpec, ResultType, Scope, Slot, SlotKind, Syntax, class_to_opcode, opcode_to_class,
};
pub use types::Type;
pub use value::{ConstValue, Constant, ValueId};
