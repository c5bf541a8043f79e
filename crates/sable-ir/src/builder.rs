//! IR construction
//!
//! The builder keeps a function under construction together with a
//! current-block cursor and the opcode scope used to resolve symbolic
//! opcodes. Appended instructions land in the cursor block; `add_block`
//! activates a new block for the duration of a closure and branches into
//! it from a fall-through cursor.

use crate::error::IrResult;
use crate::function::Function;
use crate::syntax::Scope;
use crate::types::Type;
use crate::value::{ConstValue, Constant, ValueId};

pub struct Builder {
    func: Function,
    scope: Scope,
    cursor: ValueId,
}

impl Builder {
    /// Start a function with the core opcode scope and no instrumentation.
    /// The entry block is created and activated immediately.
    pub fn new(name: impl Into<String>, args: &[(Type, &str)], return_type: Type) -> Self {
        Self::with_options(name, args, return_type, Scope::core(), false)
    }

    pub fn with_options(
        name: impl Into<String>,
        args: &[(Type, &str)],
        return_type: Type,
        scope: Scope,
        instrument: bool,
    ) -> Self {
        let mut func = if instrument {
            Function::instrumented(name, args, return_type)
        } else {
            Function::new(name, args, return_type)
        };
        let cursor = func.add_block(None);
        Self {
            func,
            scope,
            cursor,
        }
    }

    pub fn function(&self) -> &Function {
        &self.func
    }

    pub fn function_mut(&mut self) -> &mut Function {
        &mut self.func
    }

    pub fn into_function(self) -> Function {
        self.func
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn scope_mut(&mut self) -> &mut Scope {
        &mut self.scope
    }

    pub fn current_block(&self) -> ValueId {
        self.cursor
    }

    /// Resolve an argument of the function under construction by name.
    pub fn arg(&self, name: &str) -> IrResult<ValueId> {
        self.func.find(name)
    }

    pub fn constant(&mut self, ty: Type, value: ConstValue) -> ValueId {
        self.func.constant(Constant::new(ty, value))
    }

    /// Resolve `opcode` through the scope, construct the instruction and
    /// append it to the cursor block.
    pub fn append(&mut self, opcode: &str, operands: Vec<ValueId>) -> IrResult<ValueId> {
        self.append_with_params(opcode, operands, "")
    }

    pub fn append_with_params(
        &mut self,
        opcode: &str,
        operands: Vec<ValueId>,
        params: &str,
    ) -> IrResult<ValueId> {
        let spec = self.scope.resolve(opcode)?;
        let inst = self.func.create_inst(spec, operands, params)?;
        self.func.block_append(self.cursor, inst);
        Ok(inst)
    }

    /// Append a phi with an explicit type and (block, value) incoming
    /// pairs.
    pub fn phi(&mut self, ty: Type, incoming: Vec<(ValueId, ValueId)>) -> IrResult<ValueId> {
        let spec = self.scope.resolve("phi")?;
        let inst = self.func.create_phi(spec, ty, incoming);
        self.func.block_append(self.cursor, inst);
        Ok(inst)
    }

    pub fn ret(&mut self) -> IrResult<ValueId> {
        self.append("return", vec![])
    }

    pub fn ret_value(&mut self, value: ValueId) -> IrResult<ValueId> {
        self.append("return_value", vec![value])
    }

    pub fn branch(&mut self, target: ValueId) -> IrResult<ValueId> {
        self.append("branch", vec![target])
    }

    pub fn cond_branch(
        &mut self,
        condition: ValueId,
        on_true: ValueId,
        on_false: ValueId,
    ) -> IrResult<ValueId> {
        self.append("cond_branch", vec![condition, on_true, on_false])
    }

    /// Create a block without activating it, for forward references.
    pub fn new_block(&mut self, name: Option<&str>) -> ValueId {
        self.func.add_block(name)
    }

    /// Move the cursor to an existing block.
    pub fn switch_to(&mut self, block: ValueId) {
        self.cursor = block;
    }

    /// Create a block and activate it for the duration of the closure,
    /// restoring the previous cursor afterwards. A fall-through cursor
    /// (no terminator yet) gets an unconditional branch into the new
    /// block first.
    pub fn add_block<R>(
        &mut self,
        name: Option<&str>,
        body: impl FnOnce(&mut Builder) -> IrResult<R>,
    ) -> IrResult<(ValueId, R)> {
        let block = self.func.add_block(name);
        if self.func.terminator(self.cursor).is_none() {
            self.branch(block)?;
        }
        let previous = self.cursor;
        self.cursor = block;
        let result = body(self);
        self.cursor = previous;
        Ok((block, result?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IrError;
    use crate::syntax::{InsnSpec, ResultType, Slot, Syntax};

    fn int() -> Type {
        Type::mono("Integer")
    }

    fn test_builder(name: &str) -> Builder {
        let mut b = Builder::new(name, &[(int(), "count")], int());
        b.scope_mut().define(InsnSpec::new(
            "DupInsn",
            Syntax::new(vec![Slot::operand("value")]).unwrap(),
            ResultType::FromOperand(0),
        ));
        b
    }

    #[test]
    fn test_entry_block_created() {
        let b = test_builder("f");
        let func = b.function();
        assert_eq!(func.blocks().len(), 1);
        assert_eq!(func.entry(), Some(b.current_block()));
        assert_eq!(func.value_name(b.current_block()), Some("1"));
    }

    #[test]
    fn test_append_resolves_through_scope() {
        let mut b = test_builder("f");
        let count = b.arg("count").unwrap();
        let dup = b.append("dup", vec![count]).unwrap();
        assert_eq!(b.function().opcode(dup), Some("dup"));
        assert!(b.function().block_contains(b.current_block(), dup));
    }

    #[test]
    fn test_unknown_opcode() {
        let mut b = test_builder("f");
        let err = b.append("mystery", vec![]).unwrap_err();
        assert_eq!(
            err,
            IrError::UnknownOpcode {
                opcode: "mystery".to_string()
            }
        );
    }

    #[test]
    fn test_terminator_helpers() {
        let mut b = test_builder("f");
        let count = b.arg("count").unwrap();
        b.ret_value(count).unwrap();
        let func = b.into_function();
        let entry = func.entry().unwrap();
        assert!(func.block_well_terminated(entry));
        assert!(func.block_exits(entry).unwrap());
    }

    #[test]
    fn test_add_block_auto_branches() {
        let mut b = test_builder("f");
        let entry = b.current_block();
        let (body, _) = b
            .add_block(Some("body"), |b| {
                b.ret()?;
                Ok(())
            })
            .unwrap();

        // Cursor restored, and the fall-through branch materialized
        assert_eq!(b.current_block(), entry);
        let func = b.function();
        let term = func.terminator(entry).unwrap();
        assert_eq!(func.opcode(term), Some("branch"));
        assert_eq!(func.successors(entry), vec![body]);
    }

    #[test]
    fn test_add_block_skips_branch_when_terminated() {
        let mut b = test_builder("f");
        b.ret().unwrap();
        let entry = b.current_block();
        let (_, ()) = b
            .add_block(Some("dead"), |b| {
                b.ret()?;
                Ok(())
            })
            .unwrap();
        let func = b.function();
        let term = func.terminator(entry).unwrap();
        assert_eq!(func.opcode(term), Some("return"));
        assert!(func.successors(entry).is_empty());
    }

    #[test]
    fn test_phi_through_builder() {
        let mut b = test_builder("f");
        let count = b.arg("count").unwrap();
        let left = b.new_block(Some("left"));
        let phi = b.phi(int(), vec![(left, count)]).unwrap();
        let func = b.function();
        assert_eq!(func.opcode(phi), Some("phi"));
        assert_eq!(func.phi_value_for(phi, left), Some(count));
    }
}
