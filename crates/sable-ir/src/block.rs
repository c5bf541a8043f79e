//! Basic block operations
//!
//! A basic block is itself a value (a label): branch targets and phi
//! predecessors reference it through the ordinary use-lists. Block
//! membership mutation lives here; well-termination is a queryable
//! property rather than an invariant enforced on every edit, so IR under
//! construction may be transiently unterminated.

use crate::error::{IrError, IrResult};
use crate::events::Event;
use crate::function::Function;
use crate::value::{ValueData, ValueId};

impl Function {
    /// Append an instruction to a block, moving it out of its previous
    /// block if it had one.
    pub fn block_append(&mut self, block: ValueId, inst: ValueId) {
        if let Some(prev) = self.inst_data(inst).and_then(|d| d.block) {
            if let ValueData::Block(bd) = &mut self.values[prev.index()] {
                bd.insts.retain(|&i| i != inst);
            }
        }
        let index = {
            let ValueData::Block(bd) = &mut self.values[block.index()] else {
                return;
            };
            bd.insts.push(inst);
            bd.insts.len() - 1
        };
        if let Some(d) = self.inst_data_mut(inst) {
            d.block = Some(block);
        }
        self.note_placement(block, inst, index);
    }

    /// Insert `new` immediately before `existing`.
    pub fn block_insert(
        &mut self,
        block: ValueId,
        existing: ValueId,
        new: ValueId,
    ) -> IrResult<()> {
        let index = {
            let ValueData::Block(bd) = &mut self.values[block.index()] else {
                return Err(self.not_a_block(block));
            };
            let pos = bd
                .insts
                .iter()
                .position(|&i| i == existing)
                .ok_or_else(|| IrError::NotFound {
                    what: format!("instruction {} in block", existing),
                })?;
            bd.insts.insert(pos, new);
            pos
        };
        if let Some(d) = self.inst_data_mut(new) {
            d.block = Some(block);
        }
        self.note_placement(block, new, index);
        Ok(())
    }

    /// Unlink an instruction from a block without touching its operands.
    pub fn block_remove(&mut self, block: ValueId, inst: ValueId) -> IrResult<()> {
        {
            let ValueData::Block(bd) = &mut self.values[block.index()] else {
                return Err(self.not_a_block(block));
            };
            let pos = bd
                .insts
                .iter()
                .position(|&i| i == inst)
                .ok_or_else(|| IrError::NotFound {
                    what: format!("instruction {} in block", inst),
                })?;
            bd.insts.remove(pos);
        }
        if let Some(d) = self.inst_data_mut(inst) {
            d.block = None;
        }
        let name = self.value_name(inst).unwrap_or_default().to_string();
        self.note(move |_, _| Event::RemoveInstruction { name });
        Ok(())
    }

    /// Substitute `new` for `old` in place. Operand use-lists are not
    /// rewritten; callers wanting that use `replace_with`.
    pub fn block_replace(
        &mut self,
        block: ValueId,
        old: ValueId,
        new: ValueId,
    ) -> IrResult<()> {
        let index = {
            let ValueData::Block(bd) = &mut self.values[block.index()] else {
                return Err(self.not_a_block(block));
            };
            let pos = bd
                .insts
                .iter()
                .position(|&i| i == old)
                .ok_or_else(|| IrError::NotFound {
                    what: format!("instruction {} in block", old),
                })?;
            bd.insts[pos] = new;
            pos
        };
        if let Some(d) = self.inst_data_mut(old) {
            d.block = None;
        }
        if let Some(d) = self.inst_data_mut(new) {
            d.block = Some(block);
        }
        let old_name = self.value_name(old).unwrap_or_default().to_string();
        self.note(move |_, _| Event::RemoveInstruction { name: old_name });
        self.note_placement(block, new, index);
        Ok(())
    }

    pub fn block_contains(&self, block: ValueId, inst: ValueId) -> bool {
        match &self.values[block.index()] {
            ValueData::Block(bd) => bd.insts.contains(&inst),
            _ => false,
        }
    }

    /// Snapshot of the block's instructions; mutating it does not affect
    /// the block.
    pub fn block_insts(&self, block: ValueId) -> Vec<ValueId> {
        match &self.values[block.index()] {
            ValueData::Block(bd) => bd.insts.clone(),
            _ => Vec::new(),
        }
    }

    /// Instructions of a block restricted to one opcode.
    pub fn block_insts_with_opcode(&self, block: ValueId, opcode: &str) -> Vec<ValueId> {
        self.block_insts(block)
            .into_iter()
            .filter(|&i| self.opcode(i) == Some(opcode))
            .collect()
    }

    /// The block an instruction currently lives in.
    pub fn inst_block(&self, inst: ValueId) -> Option<ValueId> {
        self.inst_data(inst).and_then(|d| d.block)
    }

    /// The block's final instruction, when it is a terminator.
    pub fn terminator(&self, block: ValueId) -> Option<ValueId> {
        let last = *self.block_insts(block).last()?;
        if self.is_terminator(last) {
            Some(last)
        } else {
            None
        }
    }

    /// A block is well-terminated when its last instruction is the only
    /// terminator it holds.
    pub fn block_well_terminated(&self, block: ValueId) -> bool {
        let insts = self.block_insts(block);
        match insts.split_last() {
            Some((last, rest)) => {
                self.is_terminator(*last) && rest.iter().all(|&i| !self.is_terminator(i))
            }
            None => false,
        }
    }

    /// Blocks named as operands of this block's terminator.
    pub fn successors(&self, block: ValueId) -> Vec<ValueId> {
        match self.terminator(block) {
            Some(term) => self
                .operands(term)
                .into_iter()
                .filter(|&v| self.is_block(v))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Blocks whose terminator names this block, in function block order.
    pub fn predecessors(&self, block: ValueId) -> Vec<ValueId> {
        self.blocks
            .iter()
            .copied()
            .filter(|&b| self.successors(b).contains(&block))
            .collect()
    }

    pub fn predecessor_names(&self, block: ValueId) -> Vec<String> {
        self.predecessors(block)
            .into_iter()
            .filter_map(|b| self.value_name(b).map(|s| s.to_string()))
            .collect()
    }

    /// Whether control returns from the function at the end of this block.
    pub fn block_exits(&self, block: ValueId) -> IrResult<bool> {
        match self.terminator(block) {
            Some(term) => match self.inst_spec(term) {
                Some(spec) => spec.exits(),
                None => Ok(false),
            },
            None => Ok(false),
        }
    }

    fn not_a_block(&self, v: ValueId) -> IrError {
        IrError::NotFound {
            what: format!("block {} in function {}", v, self.name),
        }
    }

    fn note_placement(&mut self, block: ValueId, inst: ValueId, index: usize) {
        if !self.is_inst(inst) {
            return;
        }
        let name = self.value_name(inst).unwrap_or_default().to_string();
        let basic_block = self.value_name(block).unwrap_or_default().to_string();
        self.note(move |_, _| Event::AddInstruction {
            name,
            basic_block,
            index,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{InsnSpec, ResultType, Scope, Slot, Syntax};
    use crate::types::Type;
    use crate::value::Constant;
    use std::rc::Rc;

    fn int() -> Type {
        Type::mono("Integer")
    }

    fn dup_spec() -> Rc<InsnSpec> {
        Rc::new(InsnSpec::new(
            "DupInsn",
            Syntax::new(vec![Slot::operand("value")]).unwrap(),
            ResultType::FromOperand(0),
        ))
    }

    fn simple_inst(func: &mut Function) -> ValueId {
        let one = func.constant(Constant::int(int(), 1));
        func.create_inst(dup_spec(), vec![one], "").unwrap()
    }

    #[test]
    fn test_append_and_contains() {
        let mut func = Function::new("f", &[], Type::Bottom);
        let block = func.add_block(None);
        let i1 = simple_inst(&mut func);
        func.block_append(block, i1);
        assert!(func.block_contains(block, i1));
        assert_eq!(func.inst_block(i1), Some(block));
    }

    #[test]
    fn test_insert_before() {
        let mut func = Function::new("f", &[], Type::Bottom);
        let block = func.add_block(None);
        let i1 = simple_inst(&mut func);
        let i3 = simple_inst(&mut func);
        func.block_append(block, i1);
        func.block_append(block, i3);

        let i2 = simple_inst(&mut func);
        func.block_insert(block, i3, i2).unwrap();
        assert_eq!(func.block_insts(block), vec![i1, i2, i3]);

        let i4 = simple_inst(&mut func);
        let missing = simple_inst(&mut func);
        assert!(matches!(
            func.block_insert(block, missing, i4).unwrap_err(),
            IrError::NotFound { .. }
        ));
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut func = Function::new("f", &[], Type::Bottom);
        let block = func.add_block(None);
        let i1 = simple_inst(&mut func);
        func.block_append(block, i1);

        let mut snapshot = func.block_insts(block);
        snapshot.clear();
        assert_eq!(func.block_insts(block), vec![i1]);
    }

    #[test]
    fn test_remove() {
        let mut func = Function::new("f", &[], Type::Bottom);
        let block = func.add_block(None);
        let i1 = simple_inst(&mut func);
        func.block_append(block, i1);
        func.block_remove(block, i1).unwrap();
        assert!(func.block_insts(block).is_empty());
        assert_eq!(func.inst_block(i1), None);
        assert!(func.block_remove(block, i1).is_err());
    }

    #[test]
    fn test_replace_in_place() {
        let mut func = Function::new("f", &[], Type::Bottom);
        let block = func.add_block(None);
        let i1 = simple_inst(&mut func);
        func.block_append(block, i1);
        let i2 = simple_inst(&mut func);
        func.block_replace(block, i1, i2).unwrap();
        assert_eq!(func.block_insts(block), vec![i2]);
        assert_eq!(func.inst_block(i2), Some(block));
        assert_eq!(func.inst_block(i1), None);
    }

    #[test]
    fn test_terminator_discipline() {
        let mut func = Function::new("f", &[], Type::Bottom);
        let block = func.add_block(None);
        let scope = Scope::core();
        assert!(func.terminator(block).is_none());
        assert!(!func.block_well_terminated(block));

        let i1 = simple_inst(&mut func);
        func.block_append(block, i1);
        assert!(func.terminator(block).is_none());

        let ret = func
            .create_inst(scope.resolve("return").unwrap(), vec![], "")
            .unwrap();
        func.block_append(block, ret);
        assert_eq!(func.terminator(block), Some(ret));
        assert!(func.block_well_terminated(block));
    }

    #[test]
    fn test_successors_and_predecessors() {
        let mut func = Function::new("f", &[], Type::Bottom);
        let entry = func.add_block(Some("entry"));
        let left = func.add_block(Some("left"));
        let right = func.add_block(Some("right"));
        let scope = Scope::core();

        let cond = func.constant(Constant::new(int(), crate::value::ConstValue::Bool(true)));
        let br = func
            .create_inst(
                scope.resolve("cond_branch").unwrap(),
                vec![cond, left, right],
                "",
            )
            .unwrap();
        func.block_append(entry, br);

        assert_eq!(func.successors(entry), vec![left, right]);
        assert_eq!(func.predecessors(left), vec![entry]);
        assert_eq!(func.predecessor_names(right), vec!["entry".to_string()]);
    }

    #[test]
    fn test_exiting_block_has_no_successors() {
        let mut func = Function::new("f", &[], Type::Bottom);
        let block = func.add_block(None);
        let scope = Scope::core();
        let ret = func
            .create_inst(scope.resolve("return").unwrap(), vec![], "")
            .unwrap();
        func.block_append(block, ret);

        assert!(func.block_exits(block).unwrap());
        assert!(func.successors(block).is_empty());
    }

    #[test]
    fn test_filtered_iteration() {
        let mut func = Function::new("f", &[], Type::Bottom);
        let block = func.add_block(None);
        let scope = Scope::core();
        let i1 = simple_inst(&mut func);
        func.block_append(block, i1);
        let ret = func
            .create_inst(scope.resolve("return").unwrap(), vec![], "")
            .unwrap();
        func.block_append(block, ret);

        assert_eq!(func.block_insts_with_opcode(block, "dup"), vec![i1]);
        assert_eq!(func.block_insts_with_opcode(block, "return"), vec![ret]);
        assert!(func.block_insts_with_opcode(block, "phi").is_empty());
    }
}
