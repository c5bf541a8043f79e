//! Instrumentation event stream
//!
//! A function constructed with instrumentation keeps an ordered,
//! append-only log of every mutation affecting observable IR state.
//! The log is a flat list of serializable records so external
//! visualizers can replay the construction step by step.
//!
//! Types are interned on first sight: a `type` record is appended the
//! first time a type is referenced and every later reference carries its
//! integer id. For any instruction the `update_instruction` record
//! (operands and type) precedes its `add_instruction` record (placement),
//! so replayers can build fully-formed instructions before linking them
//! into blocks; renames come after placement. The log is never reordered.

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::types::Type;
use crate::value::ConstValue;

/// Operand encoding inside event records
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperandRecord {
    Constant {
        #[serde(rename = "type")]
        ty: u32,
        value: serde_json::Value,
    },
    Instruction {
        name: String,
    },
    BasicBlock {
        name: String,
    },
    Argument {
        name: String,
        #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
        ty: Option<u32>,
    },
}

/// A single mutation record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    SetArguments {
        arguments: Vec<OperandRecord>,
    },
    SetReturnType {
        return_type: u32,
    },
    Type {
        id: u32,
        kind: String,
        name: String,
    },
    AddBasicBlock {
        name: String,
    },
    RemoveBasicBlock {
        name: String,
    },
    UpdateInstruction {
        name: String,
        opcode: String,
        parameters: String,
        operands: Vec<OperandRecord>,
        #[serde(rename = "type")]
        ty: u32,
    },
    AddInstruction {
        name: String,
        basic_block: String,
        index: usize,
    },
    RemoveInstruction {
        name: String,
    },
    RenameInstruction {
        name: String,
        new_name: String,
    },
    TransformStart {
        name: String,
    },
}

/// Per-function ordered mutation log with a type interner
#[derive(Debug, Clone, Default)]
pub struct EventStream {
    events: Vec<Event>,
    type_ids: FxHashMap<Type, u32>,
}

impl EventStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub(crate) fn push(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Intern a type, appending its `type` record on first sight.
    pub(crate) fn type_id(&mut self, ty: &Type) -> u32 {
        if let Some(&id) = self.type_ids.get(ty) {
            return id;
        }
        let id = self.type_ids.len() as u32;
        self.type_ids.insert(ty.clone(), id);
        self.events.push(Event::Type {
            id,
            kind: ty.kind().to_string(),
            name: ty.name(),
        });
        id
    }

    /// Serialize the whole log as a JSON array.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.events)
    }
}

pub(crate) fn const_payload(value: &ConstValue) -> serde_json::Value {
    match value {
        ConstValue::Int(v) => serde_json::Value::from(*v),
        ConstValue::Bool(v) => serde_json::Value::from(*v),
        ConstValue::Str(s) => serde_json::Value::from(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_interning_emits_once() {
        let mut stream = EventStream::new();
        let int = Type::mono("Integer");
        let a = stream.type_id(&int);
        let b = stream.type_id(&int);
        assert_eq!(a, b);
        assert_eq!(stream.len(), 1);
        assert_eq!(
            stream.events()[0],
            Event::Type {
                id: 0,
                kind: "monotype".to_string(),
                name: "Integer".to_string(),
            }
        );
    }

    #[test]
    fn test_type_ids_are_sequential() {
        let mut stream = EventStream::new();
        assert_eq!(stream.type_id(&Type::mono("Integer")), 0);
        assert_eq!(stream.type_id(&Type::Bottom), 1);
        assert_eq!(stream.type_id(&Type::mono("Integer")), 0);
        assert_eq!(stream.type_id(&Type::Tuple(vec![Type::Bottom])), 2);
    }

    #[test]
    fn test_event_serialization() {
        let mut stream = EventStream::new();
        let ty = stream.type_id(&Type::mono("Integer"));
        stream.push(Event::UpdateInstruction {
            name: "2".to_string(),
            opcode: "dup".to_string(),
            parameters: String::new(),
            operands: vec![OperandRecord::Constant {
                ty,
                value: serde_json::Value::from(1),
            }],
            ty,
        });
        stream.push(Event::AddInstruction {
            name: "2".to_string(),
            basic_block: "1".to_string(),
            index: 0,
        });

        let json = stream.to_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        let records = parsed.as_array().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0]["event"], "type");
        assert_eq!(records[0]["kind"], "monotype");
        assert_eq!(records[1]["event"], "update_instruction");
        assert_eq!(records[1]["operands"][0]["kind"], "constant");
        assert_eq!(records[1]["operands"][0]["value"], 1);
        assert_eq!(records[2]["event"], "add_instruction");
        assert_eq!(records[2]["basic_block"], "1");
    }

    #[test]
    fn test_argument_record_skips_missing_type() {
        let rec = OperandRecord::Argument {
            name: "count".to_string(),
            ty: None,
        };
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["kind"], "argument");
        assert!(json.get("type").is_none());
    }
}
