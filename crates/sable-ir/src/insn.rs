//! Instruction operations
//!
//! Instructions are users living in a basic block: they hold operands,
//! carry the class identity (`InsnSpec`) their opcode derives from, and
//! a stored result type computed at construction. Phi instructions keep
//! (predecessor block, incoming value) pairs instead of a flat operand
//! list; each pair contributes a use-edge for the value and one for the
//! block label.

use std::rc::Rc;

use crate::error::{IrError, IrResult};
use crate::function::Function;
use crate::syntax::{InsnSpec, ResultType};
use crate::types::Type;
use crate::value::{InstData, OperandStore, ValueData, ValueId};

impl Function {
    /// Create an instruction of the given class, checking its operand
    /// schema and computing the result type. The instruction is named
    /// anonymously and not yet placed in a block.
    pub fn create_inst(
        &mut self,
        spec: Rc<InsnSpec>,
        operands: Vec<ValueId>,
        params: impl Into<String>,
    ) -> IrResult<ValueId> {
        let types: Vec<Type> = operands.iter().map(|&v| self.value_type(v).clone()).collect();
        let refs: Vec<&Type> = types.iter().collect();
        spec.syntax().check(spec.opcode(), &refs)?;
        let ty = match spec.result() {
            ResultType::Bottom => Type::Bottom,
            ResultType::Fixed(t) => t.clone(),
            ResultType::FromOperand(i) => types[*i].clone(),
        };
        Ok(self.alloc_inst(spec, ty, OperandStore::Plain(operands), params.into()))
    }

    /// Create an instruction with an explicitly stored result type,
    /// bypassing the class's result rule but not its operand schema.
    pub fn create_inst_typed(
        &mut self,
        spec: Rc<InsnSpec>,
        ty: Type,
        operands: Vec<ValueId>,
        params: impl Into<String>,
    ) -> IrResult<ValueId> {
        let types: Vec<Type> = operands.iter().map(|&v| self.value_type(v).clone()).collect();
        let refs: Vec<&Type> = types.iter().collect();
        spec.syntax().check(spec.opcode(), &refs)?;
        Ok(self.alloc_inst(spec, ty, OperandStore::Plain(operands), params.into()))
    }

    /// Create a phi with an explicit type and (block, value) incoming
    /// pairs. Not yet placed in a block.
    pub fn create_phi(
        &mut self,
        spec: Rc<InsnSpec>,
        ty: Type,
        incoming: Vec<(ValueId, ValueId)>,
    ) -> ValueId {
        self.alloc_inst(spec, ty, OperandStore::Phi(incoming), String::new())
    }

    fn alloc_inst(
        &mut self,
        spec: Rc<InsnSpec>,
        ty: Type,
        operands: OperandStore,
        params: String,
    ) -> ValueId {
        let name = self.make_name(None);
        let id = self.alloc(ValueData::Inst(InstData {
            name: name.clone(),
            spec,
            ty,
            operands: OperandStore::Plain(Vec::new()),
            block: None,
            params,
        }));
        self.names.insert(name, id);
        // Install operands after allocation so use-edges point at a live id
        match &operands {
            OperandStore::Plain(ops) => {
                for &v in ops {
                    self.add_use(v, id);
                }
            }
            OperandStore::Phi(pairs) => {
                for &(b, v) in pairs {
                    self.add_use(v, id);
                    self.add_use(b, id);
                }
            }
        }
        if let Some(d) = self.inst_data_mut(id) {
            d.operands = operands;
        }
        self.note_update(id);
        id
    }

    /// The opcode an instruction's class derives to.
    pub fn opcode(&self, inst: ValueId) -> Option<&str> {
        self.inst_data(inst).map(|d| d.spec.opcode())
    }

    pub fn inst_spec(&self, inst: ValueId) -> Option<&Rc<InsnSpec>> {
        self.inst_data(inst).map(|d| &d.spec)
    }

    pub fn inst_params(&self, inst: ValueId) -> Option<&str> {
        self.inst_data(inst).map(|d| d.params.as_str())
    }

    pub fn is_terminator(&self, inst: ValueId) -> bool {
        self.inst_data(inst)
            .map(|d| d.spec.is_terminator())
            .unwrap_or(false)
    }

    pub fn is_phi(&self, inst: ValueId) -> bool {
        matches!(
            self.inst_data(inst),
            Some(InstData {
                operands: OperandStore::Phi(_),
                ..
            })
        )
    }

    /// Mutate the stored result type (generic-instruction model).
    pub fn set_inst_type(&mut self, inst: ValueId, ty: Type) {
        if let Some(d) = self.inst_data_mut(inst) {
            d.ty = ty;
        } else {
            return;
        }
        self.note_update(inst);
    }

    /// Delete an instruction: detach its operands from every use-list and
    /// unlink it from its block.
    pub fn remove_inst(&mut self, inst: ValueId) {
        self.detach(inst);
        if let Some(block) = self.inst_data(inst).and_then(|d| d.block) {
            let _ = self.block_remove(block, inst);
        }
    }

    /// Rewrite every use of `inst` to point at `other`, then delete
    /// `inst`. A replacement instruction not yet in a block is inserted at
    /// `inst`'s position first; constants and already-placed values are
    /// referenced where they are.
    pub fn replace_with(&mut self, inst: ValueId, other: ValueId) -> IrResult<()> {
        let needs_placement = self.is_inst(other)
            && self.inst_data(other).and_then(|d| d.block).is_none();
        if needs_placement {
            let block = self
                .inst_data(inst)
                .and_then(|d| d.block)
                .ok_or_else(|| IrError::NotFound {
                    what: format!("owning block of {}", self.inspect_as_value(inst)),
                })?;
            self.block_insert(block, inst, other)?;
        }
        self.replace_all_uses_with(inst, other);
        self.remove_inst(inst);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Named slot access
    // ------------------------------------------------------------------

    /// Read the operand bound to a named slot.
    pub fn slot(&self, inst: ValueId, name: &str) -> IrResult<ValueId> {
        let d = self.inst_data(inst).ok_or_else(|| IrError::NotFound {
            what: format!("instruction {}", inst),
        })?;
        let (index, _) = d
            .spec
            .syntax()
            .slot_index(name)
            .ok_or_else(|| IrError::NotFound {
                what: format!("slot '{}' of {}", name, d.spec.opcode()),
            })?;
        match &d.operands {
            OperandStore::Plain(ops) => ops.get(index).copied().ok_or_else(|| IrError::NotFound {
                what: format!("operand for slot '{}' of {}", name, d.spec.opcode()),
            }),
            OperandStore::Phi(_) => Err(IrError::Schema {
                reason: "phi operands are (block, value) pairs".to_string(),
            }),
        }
    }

    /// Rewrite the single operand position of a named slot.
    pub fn set_slot(&mut self, inst: ValueId, name: &str, value: ValueId) -> IrResult<()> {
        let old = self.slot(inst, name)?;
        let index = {
            let d = self.inst_data(inst).ok_or_else(|| IrError::NotFound {
                what: format!("instruction {}", inst),
            })?;
            d.spec
                .syntax()
                .slot_index(name)
                .map(|(i, _)| i)
                .ok_or_else(|| IrError::NotFound {
                    what: format!("slot '{}' of {}", name, d.spec.opcode()),
                })?
        };
        if let Some(d) = self.inst_data_mut(inst) {
            if let OperandStore::Plain(ops) = &mut d.operands {
                ops[index] = value;
            }
        }
        self.remove_one_use(old, inst);
        self.add_use(value, inst);
        self.note_update(inst);
        Ok(())
    }

    /// Read the variadic tail bound to a splat slot.
    pub fn splat(&self, inst: ValueId, name: &str) -> IrResult<Vec<ValueId>> {
        let d = self.inst_data(inst).ok_or_else(|| IrError::NotFound {
            what: format!("instruction {}", inst),
        })?;
        let (index, slot) = d
            .spec
            .syntax()
            .slot_index(name)
            .ok_or_else(|| IrError::NotFound {
                what: format!("slot '{}' of {}", name, d.spec.opcode()),
            })?;
        if !matches!(slot.kind(), crate::syntax::SlotKind::Splat) {
            return Err(IrError::Schema {
                reason: format!("slot '{}' is not a splat", name),
            });
        }
        match &d.operands {
            OperandStore::Plain(ops) => Ok(ops.get(index..).unwrap_or(&[]).to_vec()),
            OperandStore::Phi(_) => Err(IrError::Schema {
                reason: "phi operands are (block, value) pairs".to_string(),
            }),
        }
    }

    /// Replace the variadic tail bound to a splat slot.
    pub fn set_splat(
        &mut self,
        inst: ValueId,
        name: &str,
        values: Vec<ValueId>,
    ) -> IrResult<()> {
        let old_tail = self.splat(inst, name)?;
        let index = {
            let d = self.inst_data(inst).ok_or_else(|| IrError::NotFound {
                what: format!("instruction {}", inst),
            })?;
            d.spec
                .syntax()
                .slot_index(name)
                .map(|(i, _)| i)
                .ok_or_else(|| IrError::NotFound {
                    what: format!("slot '{}' of {}", name, d.spec.opcode()),
                })?
        };
        if let Some(d) = self.inst_data_mut(inst) {
            if let OperandStore::Plain(ops) = &mut d.operands {
                ops.truncate(index);
                ops.extend(values.iter().copied());
            }
        }
        for v in old_tail {
            self.remove_one_use(v, inst);
        }
        for &v in &values {
            self.add_use(v, inst);
        }
        self.note_update(inst);
        Ok(())
    }

    /// Re-run the syntax checks without failing.
    pub fn inst_valid(&self, inst: ValueId) -> bool {
        match self.inst_data(inst) {
            Some(d) => match &d.operands {
                OperandStore::Plain(ops) => {
                    let types: Vec<&Type> = ops.iter().map(|&v| self.value_type(v)).collect();
                    d.spec.syntax().check(d.spec.opcode(), &types).is_ok()
                }
                // Phi shape is enforced by construction
                OperandStore::Phi(_) => true,
            },
            None => false,
        }
    }

    /// Name of the first slot failing its type constraint, for the
    /// printer's invalid-instruction marker.
    pub(crate) fn inst_invalid_slot(&self, inst: ValueId) -> Option<String> {
        let d = self.inst_data(inst)?;
        let ops = match &d.operands {
            OperandStore::Plain(ops) => ops,
            OperandStore::Phi(_) => return None,
        };
        let types: Vec<&Type> = ops.iter().map(|&v| self.value_type(v)).collect();
        if let Some(slot) = d.spec.syntax().first_invalid_slot(&types) {
            return Some(slot.name().to_string());
        }
        if d.spec.syntax().check(d.spec.opcode(), &types).is_err() {
            return Some("arity".to_string());
        }
        None
    }

    // ------------------------------------------------------------------
    // Phi operations
    // ------------------------------------------------------------------

    /// The (predecessor block, incoming value) pairs of a phi, in
    /// insertion order.
    pub fn phi_incoming(&self, phi: ValueId) -> Vec<(ValueId, ValueId)> {
        match self.inst_data(phi) {
            Some(InstData {
                operands: OperandStore::Phi(pairs),
                ..
            }) => pairs.clone(),
            _ => Vec::new(),
        }
    }

    /// The incoming value for a given predecessor block.
    pub fn phi_value_for(&self, phi: ValueId, block: ValueId) -> Option<ValueId> {
        self.phi_incoming(phi)
            .iter()
            .find(|(b, _)| *b == block)
            .map(|&(_, v)| v)
    }

    /// Bind an incoming value for a predecessor block. An existing binding
    /// for the block is overwritten.
    pub fn phi_add_incoming(&mut self, phi: ValueId, block: ValueId, value: ValueId) {
        let previous = {
            let Some(d) = self.inst_data_mut(phi) else { return };
            let OperandStore::Phi(pairs) = &mut d.operands else {
                return;
            };
            if let Some(pair) = pairs.iter_mut().find(|(b, _)| *b == block) {
                Some(std::mem::replace(&mut pair.1, value))
            } else {
                pairs.push((block, value));
                None
            }
        };
        match previous {
            Some(old) => {
                self.remove_one_use(old, phi);
                self.add_use(value, phi);
            }
            None => {
                self.add_use(value, phi);
                self.add_use(block, phi);
            }
        }
        self.note_update(phi);
    }

    /// Drop the binding for a predecessor block.
    pub fn phi_remove_incoming(&mut self, phi: ValueId, block: ValueId) -> IrResult<()> {
        let removed = {
            let Some(d) = self.inst_data_mut(phi) else {
                return Err(IrError::NotFound {
                    what: format!("instruction {}", phi),
                });
            };
            let OperandStore::Phi(pairs) = &mut d.operands else {
                return Err(IrError::Schema {
                    reason: "not a phi".to_string(),
                });
            };
            let pos = pairs.iter().position(|(b, _)| *b == block);
            pos.map(|p| pairs.remove(p))
        };
        match removed {
            Some((b, v)) => {
                self.remove_one_use(v, phi);
                self.remove_one_use(b, phi);
                self.note_update(phi);
                Ok(())
            }
            None => Err(IrError::InvalidUse {
                user: self.inspect_as_value(phi),
                value: self.inspect_as_value(block),
            }),
        }
    }
}
