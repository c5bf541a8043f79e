//! IR Values
//!
//! Every entity that can appear as an operand (constants, arguments,
//! basic blocks, instructions) lives in its function's value arena
//! and is addressed by a `ValueId` handle.

use std::rc::Rc;

use crate::syntax::InsnSpec;
use crate::types::Type;

/// Handle into a function's value arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub(crate) u32);

impl ValueId {
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ValueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// Literal payload of a constant
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ConstValue {
    Int(i64),
    Bool(bool),
    Str(String),
}

impl ConstValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConstValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConstValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConstValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConstValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConstValue::Int(v) => write!(f, "{}", v),
            ConstValue::Bool(v) => write!(f, "{}", v),
            ConstValue::Str(s) => write!(f, "\"{}\"", s.escape_default()),
        }
    }
}

/// A typed literal. Two constants are equal iff their types and payloads
/// are equal; the arena interns them so equality coincides with handle
/// identity within a function. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Constant {
    pub ty: Type,
    pub value: ConstValue,
}

impl Constant {
    pub fn new(ty: Type, value: ConstValue) -> Self {
        Self { ty, value }
    }

    pub fn int(ty: Type, value: i64) -> Self {
        Self::new(ty, ConstValue::Int(value))
    }
}

/// Function argument payload
#[derive(Debug, Clone)]
pub(crate) struct ArgumentData {
    pub name: String,
    pub ty: Type,
}

/// Basic block payload: a named label holding an ordered instruction list
#[derive(Debug, Clone)]
pub(crate) struct BlockData {
    pub name: String,
    pub insts: Vec<ValueId>,
}

/// Operand storage of an instruction.
///
/// Phi instructions keep (predecessor block, incoming value) pairs; each
/// pair contributes two use-edges. Iteration over phi operands yields all
/// values first, then all blocks.
#[derive(Debug, Clone)]
pub(crate) enum OperandStore {
    Plain(Vec<ValueId>),
    Phi(Vec<(ValueId, ValueId)>),
}

impl OperandStore {
    pub fn flatten(&self) -> Vec<ValueId> {
        match self {
            OperandStore::Plain(ops) => ops.clone(),
            OperandStore::Phi(pairs) => {
                let mut out: Vec<ValueId> = pairs.iter().map(|(_, v)| *v).collect();
                out.extend(pairs.iter().map(|(b, _)| *b));
                out
            }
        }
    }
}

/// Instruction payload
#[derive(Debug, Clone)]
pub(crate) struct InstData {
    pub name: String,
    pub spec: Rc<InsnSpec>,
    pub ty: Type,
    pub operands: OperandStore,
    pub block: Option<ValueId>,
    pub params: String,
}

/// Arena slot
#[derive(Debug, Clone)]
pub(crate) enum ValueData {
    Constant(Constant),
    Argument(ArgumentData),
    Block(BlockData),
    Inst(InstData),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_id_display() {
        assert_eq!(format!("{}", ValueId(7)), "v7");
    }

    #[test]
    fn test_const_value_display() {
        assert_eq!(format!("{}", ConstValue::Int(42)), "42");
        assert_eq!(format!("{}", ConstValue::Bool(true)), "true");
        assert_eq!(
            format!("{}", ConstValue::Str("hi\n".to_string())),
            "\"hi\\n\""
        );
    }

    #[test]
    fn test_constant_equality() {
        let int = Type::mono("Integer");
        let a = Constant::int(int.clone(), 1);
        let b = Constant::int(int.clone(), 1);
        let c = Constant::int(int, 2);
        let d = Constant::int(Type::mono("Float"), 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[test]
    fn test_const_value_accessors() {
        assert_eq!(ConstValue::Int(3).as_int(), Some(3));
        assert_eq!(ConstValue::Bool(false).as_int(), None);
        assert_eq!(ConstValue::Bool(false).as_bool(), Some(false));
        assert_eq!(ConstValue::Str("x".into()).as_str(), Some("x"));
    }
}
