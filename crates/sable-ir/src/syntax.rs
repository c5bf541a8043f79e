//! Instruction syntax and opcode scope
//!
//! Each instruction class carries a declarative operand schema: a list of
//! named slots, optionally type-constrained, with at most one trailing
//! splat for variadic tails. The schema is validated once at declaration
//! (`Schema` failures) and checked against concrete operands at
//! construction (`Arity` / `TypeMismatch` failures).
//!
//! A `Scope` is the registry the builder consults to resolve symbolic
//! opcodes to instruction classes.

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::error::{IrError, IrResult};
use crate::types::Type;

/// Derive an opcode from an instruction class name: the last `::` path
/// component, stripped of a trailing `Insn`, CamelCase to snake_case.
pub fn class_to_opcode(class_name: &str) -> String {
    let short = class_name.rsplit("::").next().unwrap_or(class_name);
    let short = short.strip_suffix("Insn").unwrap_or(short);
    let mut out = String::with_capacity(short.len() + 4);
    for (i, ch) in short.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('_');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Reverse of [`class_to_opcode`]: `foo_bar` becomes `FooBarInsn`.
pub fn opcode_to_class(opcode: &str) -> String {
    let mut out = String::with_capacity(opcode.len() + 4);
    for part in opcode.split('_') {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.push(first.to_ascii_uppercase());
            out.extend(chars);
        }
    }
    out.push_str("Insn");
    out
}

/// Slot kind in an instruction's operand schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotKind {
    /// Exactly one operand, with an optional required type
    Operand { ty: Option<Type> },
    /// Zero or more trailing operands; at most one, must be last
    Splat,
}

/// A named operand slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slot {
    name: String,
    kind: SlotKind,
}

impl Slot {
    pub fn operand(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SlotKind::Operand { ty: None },
        }
    }

    pub fn operand_typed(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            kind: SlotKind::Operand { ty: Some(ty) },
        }
    }

    pub fn splat(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SlotKind::Splat,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &SlotKind {
        &self.kind
    }

    fn is_splat(&self) -> bool {
        matches!(self.kind, SlotKind::Splat)
    }
}

/// Declarative operand schema of an instruction class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Syntax {
    slots: Vec<Slot>,
}

impl Syntax {
    /// Build a schema, rejecting ill-formed declarations: a splat that is
    /// not the last slot, or more than one splat.
    pub fn new(slots: Vec<Slot>) -> IrResult<Self> {
        let splats = slots.iter().filter(|s| s.is_splat()).count();
        if splats > 1 {
            return Err(IrError::Schema {
                reason: "more than one splat slot".to_string(),
            });
        }
        if splats == 1 && !slots.last().map(Slot::is_splat).unwrap_or(false) {
            return Err(IrError::Schema {
                reason: "splat slot must be last".to_string(),
            });
        }
        Ok(Self { slots })
    }

    pub fn empty() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn has_splat(&self) -> bool {
        self.slots.last().map(Slot::is_splat).unwrap_or(false)
    }

    /// Number of fixed (non-splat) slots
    pub fn fixed_arity(&self) -> usize {
        self.slots.len() - usize::from(self.has_splat())
    }

    /// Find a slot by name, with its position
    pub fn slot_index(&self, name: &str) -> Option<(usize, &Slot)> {
        self.slots
            .iter()
            .enumerate()
            .find(|(_, s)| s.name == name)
    }

    /// Check operand count and per-slot type constraints.
    pub(crate) fn check(&self, opcode: &str, types: &[&Type]) -> IrResult<()> {
        let fixed = self.fixed_arity();
        let count_ok = if self.has_splat() {
            types.len() >= fixed
        } else {
            types.len() == fixed
        };
        if !count_ok {
            let expected = if self.has_splat() {
                format!("at least {}", fixed)
            } else {
                fixed.to_string()
            };
            return Err(IrError::Arity {
                opcode: opcode.to_string(),
                expected,
                got: types.len(),
            });
        }
        if let Some(slot) = self.first_invalid_slot(types) {
            let required = match &slot.kind {
                SlotKind::Operand { ty: Some(t) } => t,
                _ => return Ok(()),
            };
            let (index, _) = self.slot_index(&slot.name).unwrap_or((0, slot));
            return Err(IrError::TypeMismatch {
                opcode: opcode.to_string(),
                slot: slot.name.clone(),
                expected: required.name(),
                got: types[index].name(),
            });
        }
        Ok(())
    }

    /// First slot whose type constraint the given operands violate, if any.
    /// Does not consider arity; used both by `check` and by the printer's
    /// invalid-instruction marker.
    pub(crate) fn first_invalid_slot(&self, types: &[&Type]) -> Option<&Slot> {
        for (i, slot) in self.slots.iter().enumerate() {
            if let SlotKind::Operand { ty: Some(required) } = &slot.kind {
                match types.get(i) {
                    Some(actual) if actual.to_type() == required.to_type() => {}
                    _ => return Some(slot),
                }
            }
        }
        None
    }
}

/// How an instruction class computes its result type at construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultType {
    /// No result; the instruction stays at the bottom type
    Bottom,
    /// A fixed result type
    Fixed(Type),
    /// Copy the type of the operand at the given position
    FromOperand(usize),
}

/// An instruction class: identity, operand schema and behavioral flags.
/// The opcode is derived from the class name, never stored per instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsnSpec {
    class_name: String,
    opcode: String,
    syntax: Syntax,
    result: ResultType,
    terminator: bool,
    exits: Option<bool>,
    side_effects: bool,
}

impl InsnSpec {
    /// An ordinary (non-terminator) instruction class
    pub fn new(class_name: impl Into<String>, syntax: Syntax, result: ResultType) -> Self {
        let class_name = class_name.into();
        let opcode = class_to_opcode(&class_name);
        Self {
            class_name,
            opcode,
            syntax,
            result,
            terminator: false,
            exits: None,
            side_effects: false,
        }
    }

    /// A terminator class. `exits` answers whether the terminator returns
    /// from the function; `None` marks an abstract terminator for which
    /// the query reports `NotImplemented`.
    pub fn terminator(
        class_name: impl Into<String>,
        syntax: Syntax,
        exits: Option<bool>,
    ) -> Self {
        let class_name = class_name.into();
        let opcode = class_to_opcode(&class_name);
        Self {
            class_name,
            opcode,
            syntax,
            result: ResultType::Bottom,
            terminator: true,
            exits,
            side_effects: true,
        }
    }

    pub fn with_side_effects(mut self) -> Self {
        self.side_effects = true;
        self
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn opcode(&self) -> &str {
        &self.opcode
    }

    pub fn syntax(&self) -> &Syntax {
        &self.syntax
    }

    pub fn result(&self) -> &ResultType {
        &self.result
    }

    pub fn is_terminator(&self) -> bool {
        self.terminator
    }

    pub fn is_phi(&self) -> bool {
        self.opcode == "phi"
    }

    /// Whether this terminator returns from the function.
    pub fn exits(&self) -> IrResult<bool> {
        self.exits.ok_or_else(|| IrError::NotImplemented {
            what: format!("exits for {}", self.class_name),
        })
    }

    pub fn has_side_effects(&self) -> bool {
        self.side_effects
    }
}

/// Registry mapping opcodes to instruction classes.
///
/// `Scope::core()` carries the control-flow classes every function needs;
/// domain opcodes are registered on top with [`Scope::define`].
#[derive(Debug, Clone, Default)]
pub struct Scope {
    specs: FxHashMap<String, Rc<InsnSpec>>,
}

impl Scope {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in control-flow classes: `branch`, `cond_branch`,
    /// `return`, `return_value` and `phi`.
    pub fn core() -> Self {
        let mut scope = Self::empty();
        scope.define(InsnSpec::terminator(
            "BranchInsn",
            Syntax {
                slots: vec![Slot::operand_typed("target", Type::Label)],
            },
            Some(false),
        ));
        scope.define(InsnSpec::terminator(
            "CondBranchInsn",
            Syntax {
                slots: vec![
                    Slot::operand("condition"),
                    Slot::operand_typed("on_true", Type::Label),
                    Slot::operand_typed("on_false", Type::Label),
                ],
            },
            Some(false),
        ));
        scope.define(InsnSpec::terminator(
            "ReturnInsn",
            Syntax::empty(),
            Some(true),
        ));
        scope.define(InsnSpec::terminator(
            "ReturnValueInsn",
            Syntax {
                slots: vec![Slot::operand("value")],
            },
            Some(true),
        ));
        scope.define(InsnSpec::new(
            "PhiInsn",
            Syntax::empty(),
            ResultType::Bottom,
        ));
        scope
    }

    /// Register a class, keyed by its derived opcode.
    pub fn define(&mut self, spec: InsnSpec) -> Rc<InsnSpec> {
        let spec = Rc::new(spec);
        self.specs.insert(spec.opcode().to_string(), spec.clone());
        spec
    }

    pub fn resolve(&self, opcode: &str) -> IrResult<Rc<InsnSpec>> {
        self.specs
            .get(opcode)
            .cloned()
            .ok_or_else(|| IrError::UnknownOpcode {
                opcode: opcode.to_string(),
            })
    }

    pub fn contains(&self, opcode: &str) -> bool {
        self.specs.contains_key(opcode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_to_opcode() {
        assert_eq!(class_to_opcode("DupInsn"), "dup");
        assert_eq!(class_to_opcode("TupleConcatInsn"), "tuple_concat");
        assert_eq!(class_to_opcode("ir::insns::LoadLocalInsn"), "load_local");
    }

    #[test]
    fn test_opcode_to_class() {
        assert_eq!(opcode_to_class("foo_bar"), "FooBarInsn");
        assert_eq!(opcode_to_class("dup"), "DupInsn");
    }

    #[test]
    fn test_opcode_round_trip() {
        for class in ["DupInsn", "TupleConcatInsn", "CondBranchInsn"] {
            assert_eq!(opcode_to_class(&class_to_opcode(class)), class);
        }
    }

    #[test]
    fn test_schema_rejects_misplaced_splat() {
        let err = Syntax::new(vec![Slot::splat("rest"), Slot::operand("x")]).unwrap_err();
        assert!(matches!(err, IrError::Schema { .. }));

        let err = Syntax::new(vec![Slot::splat("a"), Slot::splat("b")]).unwrap_err();
        assert!(matches!(err, IrError::Schema { .. }));
    }

    #[test]
    fn test_arity_check() {
        let syntax = Syntax::new(vec![Slot::operand("lhs"), Slot::operand("rhs")]).unwrap();
        let int = Type::mono("Integer");
        assert!(syntax.check("add", &[&int, &int]).is_ok());
        let err = syntax.check("add", &[&int]).unwrap_err();
        assert!(matches!(err, IrError::Arity { got: 1, .. }));
    }

    #[test]
    fn test_splat_arity() {
        let syntax = Syntax::new(vec![Slot::operand("first"), Slot::splat("rest")]).unwrap();
        let int = Type::mono("Integer");
        assert!(syntax.check("pack", &[&int]).is_ok());
        assert!(syntax.check("pack", &[&int, &int, &int]).is_ok());
        assert!(matches!(
            syntax.check("pack", &[]).unwrap_err(),
            IrError::Arity { .. }
        ));
    }

    #[test]
    fn test_type_check() {
        let int = Type::mono("Integer");
        let str_ty = Type::mono("String");
        let syntax =
            Syntax::new(vec![Slot::operand_typed("count", int.clone())]).unwrap();
        assert!(syntax.check("rep", &[&int]).is_ok());
        let err = syntax.check("rep", &[&str_ty]).unwrap_err();
        assert!(matches!(err, IrError::TypeMismatch { .. }));
    }

    #[test]
    fn test_scope_resolution() {
        let scope = Scope::core();
        assert!(scope.resolve("branch").is_ok());
        assert!(scope.resolve("return_value").is_ok());
        let err = scope.resolve("frobnicate").unwrap_err();
        assert_eq!(
            err,
            IrError::UnknownOpcode {
                opcode: "frobnicate".to_string()
            }
        );
    }

    #[test]
    fn test_abstract_terminator_exits() {
        let spec = InsnSpec::terminator("HaltInsn", Syntax::empty(), None);
        assert!(matches!(
            spec.exits().unwrap_err(),
            IrError::NotImplemented { .. }
        ));
    }

    #[test]
    fn test_terminator_flags() {
        let scope = Scope::core();
        let ret = scope.resolve("return").unwrap();
        assert!(ret.is_terminator());
        assert!(ret.has_side_effects());
        assert_eq!(ret.exits().unwrap(), true);
        let br = scope.resolve("branch").unwrap();
        assert_eq!(br.exits().unwrap(), false);
    }
}
