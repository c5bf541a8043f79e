//! Pretty-printing for IR
//!
//! A chunked text assembler: callers emit `text`, `keyword`, `ty` and
//! `newline` chunks and the printer owns the whitespace discipline: a
//! single space between consecutive chunks unless the previous chunk
//! ended the line or either chunk is empty. Keywords can be colorized
//! with terminal escapes; the process-wide default for new printers is
//! the only global configuration in the crate.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::function::Function;
use crate::types::Type;
use crate::value::{InstData, OperandStore, ValueData, ValueId};

static DEFAULT_COLORIZE: AtomicBool = AtomicBool::new(false);

/// Set the process-wide default for keyword colorizing.
pub fn set_default_colorize(on: bool) {
    DEFAULT_COLORIZE.store(on, Ordering::Relaxed);
}

pub fn default_colorize() -> bool {
    DEFAULT_COLORIZE.load(Ordering::Relaxed)
}

/// Trait for pretty-printing IR constructs
pub trait PrettyPrint {
    fn pretty_print(&self) -> String;
}

/// Chunked text assembler
pub struct Printer {
    out: String,
    colorize: bool,
}

impl Printer {
    pub fn new() -> Self {
        Self::with_colorize(default_colorize())
    }

    pub fn with_colorize(colorize: bool) -> Self {
        Self {
            out: String::new(),
            colorize,
        }
    }

    pub fn is_colorized(&self) -> bool {
        self.colorize
    }

    pub fn text(&mut self, chunk: impl fmt::Display) {
        let chunk = chunk.to_string();
        self.push_chunk(&chunk);
    }

    pub fn keyword(&mut self, word: impl fmt::Display) {
        let word = word.to_string();
        if word.is_empty() {
            return;
        }
        if self.colorize {
            self.push_chunk(&format!("\x1b[1;37m{}\x1b[0m", word));
        } else {
            self.push_chunk(&word);
        }
    }

    pub fn ty(&mut self, ty: &Type) {
        self.push_chunk(&ty.to_string());
    }

    pub fn newline(&mut self) {
        self.out.push('\n');
    }

    pub fn finish(self) -> String {
        self.out
    }

    fn push_chunk(&mut self, chunk: &str) {
        if chunk.is_empty() {
            return;
        }
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push(' ');
        }
        self.out.push_str(chunk);
    }
}

impl Default for Printer {
    fn default() -> Self {
        Self::new()
    }
}

impl Function {
    /// The short reference form of a value: constants render inline as
    /// `^Type literal`, arguments and instructions as `%name`, blocks as
    /// `label %name`.
    pub fn inspect_as_value(&self, v: ValueId) -> String {
        match &self.values[v.index()] {
            ValueData::Constant(c) => format!("{} {}", c.ty, c.value),
            ValueData::Argument(a) => format!("%{}", a.name),
            ValueData::Inst(d) => format!("%{}", d.name),
            ValueData::Block(b) => format!("label %{}", b.name),
        }
    }

    fn operand_text(&self, data: &InstData) -> String {
        match &data.operands {
            OperandStore::Plain(ops) => {
                let parts: Vec<String> = ops.iter().map(|&v| self.inspect_as_value(v)).collect();
                parts.join(", ")
            }
            OperandStore::Phi(pairs) => {
                let parts: Vec<String> = pairs
                    .iter()
                    .map(|&(b, v)| {
                        format!(
                            "%{} => {}",
                            self.value_name(b).unwrap_or_default(),
                            self.inspect_as_value(v)
                        )
                    })
                    .collect();
                parts.join(", ")
            }
        }
    }

    /// One instruction line: `<type> %<name> = <opcode> <operands>`, the
    /// result part omitted at the bottom type, the opcode decorated with
    /// `!<slot>` when the instruction fails its syntax check.
    pub fn print_inst(&self, inst: ValueId, p: &mut Printer) {
        let Some(data) = self.inst_data(inst) else { return };
        if !data.ty.is_bottom() {
            p.ty(&data.ty);
            p.text(format!("%{}", data.name));
            p.text("=");
        }
        p.keyword(data.spec.opcode());
        if let Some(slot) = self.inst_invalid_slot(inst) {
            p.text(format!("!{}", slot));
        }
        p.text(self.operand_text(data));
    }

    /// Block body: `name:` header, each instruction indented three spaces,
    /// each line newline-terminated.
    pub fn print_block(&self, block: ValueId, p: &mut Printer) {
        let Some(name) = self.value_name(block) else { return };
        p.text(format!("{}:", name));
        p.newline();
        for inst in self.block_insts(block) {
            let mut sub = Printer::with_colorize(p.is_colorized());
            self.print_inst(inst, &mut sub);
            p.text(format!("   {}", sub.finish()));
            p.newline();
        }
    }

    /// Whole-function form: signature line, blocks separated by blank
    /// lines, closing brace.
    pub fn print(&self, p: &mut Printer) {
        p.keyword("function");
        p.ty(&self.return_type);
        p.text(format!("{}(", self.name));
        let last = self.args.len().saturating_sub(1);
        for (i, &arg) in self.args.iter().enumerate() {
            p.ty(self.value_type(arg));
            let name = self.value_name(arg).unwrap_or_default();
            if i == last {
                p.text(format!("%{}", name));
            } else {
                p.text(format!("%{},", name));
            }
        }
        p.text(")");
        p.text("{");
        p.newline();
        for (i, &block) in self.blocks.iter().enumerate() {
            if i > 0 {
                p.newline();
            }
            self.print_block(block, p);
        }
        p.text("}");
        p.newline();
    }
}

impl PrettyPrint for Function {
    fn pretty_print(&self) -> String {
        let mut p = Printer::new();
        self.print(&mut p);
        p.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{InsnSpec, ResultType, Scope, Slot, Syntax};
    use crate::value::Constant;

    fn int() -> Type {
        Type::mono("Integer")
    }

    #[test]
    fn test_chunk_spacing() {
        let mut p = Printer::with_colorize(false);
        p.text("foo");
        p.keyword("doh");
        p.text("bar");
        assert_eq!(p.finish(), "foo doh bar");
    }

    #[test]
    fn test_no_space_after_newline() {
        let mut p = Printer::with_colorize(false);
        p.text("foo");
        p.newline();
        p.text("bar");
        assert_eq!(p.finish(), "foo\nbar");
    }

    #[test]
    fn test_empty_chunks_are_dropped() {
        let mut p = Printer::with_colorize(false);
        p.text("foo");
        p.text("");
        p.text("bar");
        assert_eq!(p.finish(), "foo bar");
    }

    #[test]
    fn test_colorized_keyword() {
        let mut p = Printer::with_colorize(true);
        p.keyword("function");
        assert_eq!(p.finish(), "\x1b[1;37mfunction\x1b[0m");
    }

    #[test]
    fn test_bottom_type_renders_bare() {
        let mut p = Printer::with_colorize(false);
        p.ty(&Type::Bottom);
        assert_eq!(p.finish(), "bottom");
    }

    #[test]
    fn test_inspect_forms() {
        let mut func = Function::new("f", &[(int(), "count")], Type::Bottom);
        let arg = func.args()[0];
        let block = func.add_block(Some("entry"));
        let one = func.constant(Constant::int(int(), 1));
        assert_eq!(func.inspect_as_value(arg), "%count");
        assert_eq!(func.inspect_as_value(block), "label %entry");
        assert_eq!(func.inspect_as_value(one), "^Integer 1");
    }

    #[test]
    fn test_instruction_without_operands_and_type() {
        let mut func = Function::new("f", &[], Type::Bottom);
        let block = func.add_block(None);
        let scope = Scope::core();
        let ret = func
            .create_inst(scope.resolve("return").unwrap(), vec![], "")
            .unwrap();
        func.block_append(block, ret);

        let mut p = Printer::with_colorize(false);
        func.print_inst(ret, &mut p);
        assert_eq!(p.finish(), "return");
    }

    #[test]
    fn test_invalid_marker() {
        let mut func = Function::new("f", &[], Type::Bottom);
        let block = func.add_block(None);
        let mut scope = Scope::core();
        scope.define(InsnSpec::new(
            "RepeatInsn",
            Syntax::new(vec![Slot::operand_typed("count", int())]).unwrap(),
            ResultType::FromOperand(0),
        ));
        let one = func.constant(Constant::int(int(), 1));
        let rep = func
            .create_inst(scope.resolve("repeat").unwrap(), vec![one], "")
            .unwrap();
        func.block_append(block, rep);

        // Degrade the operand type after construction
        let bad = func.constant(Constant::new(
            Type::mono("String"),
            crate::value::ConstValue::Str("x".to_string()),
        ));
        func.replace_uses_of(rep, one, bad).unwrap();
        assert!(!func.inst_valid(rep));

        let mut p = Printer::with_colorize(false);
        func.print_inst(rep, &mut p);
        assert_eq!(p.finish(), "^Integer %2 = repeat !count ^String \"x\"");
    }

    #[test]
    fn test_phi_rendering() {
        let mut func = Function::new("f", &[], Type::Bottom);
        let bb = func.add_block(Some("join"));
        let bb1 = func.add_block(Some("left"));
        let scope = Scope::core();
        let v1 = func.constant(Constant::int(int(), 1));
        let phi = func.create_phi(scope.resolve("phi").unwrap(), int(), vec![(bb1, v1)]);
        func.block_append(bb, phi);

        let mut p = Printer::with_colorize(false);
        func.print_inst(phi, &mut p);
        assert_eq!(p.finish(), "^Integer %1 = phi %left => ^Integer 1");
    }
}
