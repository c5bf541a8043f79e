//! IR Functions
//!
//! A function owns the arena holding all of its values: constants,
//! arguments, basic blocks and instructions. It also keeps the use-list
//! of every value. All operand mutation goes through the def-use engine
//! here so the two sides stay consistent: for every user `u` and operand
//! `v`, `u` appears in `v`'s use-list exactly as many times as `v`
//! appears among `u`'s operands.

use rustc_hash::FxHashMap;

use crate::error::{IrError, IrResult};
use crate::events::{Event, EventStream, OperandRecord, const_payload};
use crate::types::Type;
use crate::value::{
    ArgumentData, Constant, InstData, OperandStore, ValueData, ValueId,
};

static LABEL_TYPE: Type = Type::Label;

/// A named, typed function: ordered arguments, ordered basic blocks, an
/// entry block and (optionally) an instrumentation event stream.
#[derive(Debug, Clone)]
pub struct Function {
    pub(crate) name: String,
    pub(crate) original_name: String,
    pub(crate) values: Vec<ValueData>,
    pub(crate) uses: Vec<Vec<ValueId>>,
    pub(crate) names: FxHashMap<String, ValueId>,
    pub(crate) constants: FxHashMap<Constant, ValueId>,
    pub(crate) args: Vec<ValueId>,
    pub(crate) return_type: Type,
    pub(crate) entry: Option<ValueId>,
    pub(crate) blocks: Vec<ValueId>,
    pub(crate) events: Option<EventStream>,
}

impl Function {
    pub fn new(name: impl Into<String>, args: &[(Type, &str)], return_type: Type) -> Self {
        Self::build(name, args, return_type, false)
    }

    /// Like [`Function::new`] but with the instrumentation stream enabled;
    /// construction itself records `set_arguments` and `set_return_type`.
    pub fn instrumented(
        name: impl Into<String>,
        args: &[(Type, &str)],
        return_type: Type,
    ) -> Self {
        Self::build(name, args, return_type, true)
    }

    fn build(
        name: impl Into<String>,
        args: &[(Type, &str)],
        return_type: Type,
        instrument: bool,
    ) -> Self {
        let name = name.into();
        let mut func = Self {
            name: name.clone(),
            original_name: name,
            values: Vec::new(),
            uses: Vec::new(),
            names: FxHashMap::default(),
            constants: FxHashMap::default(),
            args: Vec::new(),
            return_type,
            entry: None,
            blocks: Vec::new(),
            events: None,
        };
        for (ty, arg_name) in args {
            func.add_argument(arg_name, ty.clone());
        }
        if instrument {
            func.events = Some(EventStream::new());
            func.note_arguments();
            let ty = func.return_type.clone();
            func.note(|_, ev| Event::SetReturnType {
                return_type: ev.type_id(&ty),
            });
        }
        func
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name requested at creation, preserved across renames.
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub(crate) fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn return_type(&self) -> &Type {
        &self.return_type
    }

    pub fn set_return_type(&mut self, ty: Type) {
        self.return_type = ty.clone();
        self.note(move |_, ev| Event::SetReturnType {
            return_type: ev.type_id(&ty),
        });
    }

    pub fn args(&self) -> &[ValueId] {
        &self.args
    }

    pub fn entry(&self) -> Option<ValueId> {
        self.entry
    }

    pub fn set_entry(&mut self, block: ValueId) {
        self.entry = Some(block);
    }

    pub fn blocks(&self) -> &[ValueId] {
        &self.blocks
    }

    /// Record the start of a named transform pass in the event stream.
    pub fn begin_transform(&mut self, name: impl Into<String>) {
        let name = name.into();
        self.note(move |_, _| Event::TransformStart { name });
    }

    pub fn events(&self) -> Option<&EventStream> {
        self.events.as_ref()
    }

    pub fn is_instrumented(&self) -> bool {
        self.events.is_some()
    }

    // ------------------------------------------------------------------
    // Naming
    // ------------------------------------------------------------------

    /// Pick a function-unique name. Anonymous requests get the first free
    /// integer as a decimal string; a taken hint gets a `.N` suffix with
    /// the smallest free `N >= 1`; a free hint comes back verbatim.
    pub fn make_name(&self, hint: Option<&str>) -> String {
        match hint {
            None => {
                let mut n: u64 = 1;
                loop {
                    let candidate = n.to_string();
                    if !self.names.contains_key(&candidate) {
                        return candidate;
                    }
                    n += 1;
                }
            }
            Some(h) if !self.names.contains_key(h) => h.to_string(),
            Some(h) => {
                let mut n: u64 = 1;
                loop {
                    let candidate = format!("{}.{}", h, n);
                    if !self.names.contains_key(&candidate) {
                        return candidate;
                    }
                    n += 1;
                }
            }
        }
    }

    /// Resolve a named value.
    pub fn find(&self, name: &str) -> IrResult<ValueId> {
        self.names
            .get(name)
            .copied()
            .ok_or_else(|| IrError::NotFound {
                what: format!("value '{}' in function {}", name, self.name),
            })
    }

    /// Rename a named value through [`Function::make_name`]. Renaming an
    /// instruction is recorded in the event stream. Constants are unnamed
    /// and come back empty.
    pub fn set_value_name(&mut self, v: ValueId, hint: Option<&str>) -> String {
        if matches!(self.values[v.index()], ValueData::Constant(_)) {
            return String::new();
        }
        let current = self.value_name(v).map(|s| s.to_string());
        if let (Some(cur), Some(h)) = (&current, hint) {
            if cur == h {
                return cur.clone();
            }
        }
        let fresh = self.make_name(hint);
        if let Some(cur) = &current {
            self.names.remove(cur);
        }
        self.names.insert(fresh.clone(), v);
        match &mut self.values[v.index()] {
            ValueData::Argument(a) => a.name = fresh.clone(),
            ValueData::Block(b) => b.name = fresh.clone(),
            ValueData::Inst(d) => d.name = fresh.clone(),
            ValueData::Constant(_) => {}
        }
        if self.is_inst(v) {
            if let Some(old) = current {
                let new_name = fresh.clone();
                self.note(move |_, _| Event::RenameInstruction {
                    name: old,
                    new_name,
                });
            }
        }
        fresh
    }

    // ------------------------------------------------------------------
    // Values
    // ------------------------------------------------------------------

    pub(crate) fn alloc(&mut self, data: ValueData) -> ValueId {
        let id = ValueId::new(self.values.len());
        self.values.push(data);
        self.uses.push(Vec::new());
        id
    }

    /// Intern a constant: an equal (type, payload) pair always resolves to
    /// the same handle within this function.
    pub fn constant(&mut self, constant: Constant) -> ValueId {
        if let Some(&id) = self.constants.get(&constant) {
            return id;
        }
        let id = self.alloc(ValueData::Constant(constant.clone()));
        self.constants.insert(constant, id);
        id
    }

    pub fn add_argument(&mut self, name: &str, ty: Type) -> ValueId {
        let name = self.make_name(Some(name));
        let id = self.alloc(ValueData::Argument(ArgumentData {
            name: name.clone(),
            ty,
        }));
        self.names.insert(name, id);
        self.args.push(id);
        self.note_arguments();
        id
    }

    /// Create a basic block and append it to the block order. The first
    /// block becomes the entry.
    pub fn add_block(&mut self, name: Option<&str>) -> ValueId {
        let name = self.make_name(name);
        let id = self.alloc(ValueData::Block(crate::value::BlockData {
            name: name.clone(),
            insts: Vec::new(),
        }));
        self.names.insert(name.clone(), id);
        self.blocks.push(id);
        if self.entry.is_none() {
            self.entry = Some(id);
        }
        self.note(move |_, _| Event::AddBasicBlock { name });
        id
    }

    pub fn remove_block(&mut self, block: ValueId) -> IrResult<()> {
        let pos = self
            .blocks
            .iter()
            .position(|&b| b == block)
            .ok_or_else(|| IrError::NotFound {
                what: format!("block {} in function {}", self.inspect_as_value(block), self.name),
            })?;
        self.blocks.remove(pos);
        if self.entry == Some(block) {
            self.entry = None;
        }
        let name = self.value_name(block).unwrap_or_default().to_string();
        self.note(move |_, _| Event::RemoveBasicBlock { name });
        Ok(())
    }

    pub fn value_type(&self, v: ValueId) -> &Type {
        match &self.values[v.index()] {
            ValueData::Constant(c) => &c.ty,
            ValueData::Argument(a) => &a.ty,
            ValueData::Block(_) => &LABEL_TYPE,
            ValueData::Inst(d) => &d.ty,
        }
    }

    pub fn value_name(&self, v: ValueId) -> Option<&str> {
        match &self.values[v.index()] {
            ValueData::Constant(_) => None,
            ValueData::Argument(a) => Some(&a.name),
            ValueData::Block(b) => Some(&b.name),
            ValueData::Inst(d) => Some(&d.name),
        }
    }

    /// Labels are constant references, so blocks report as constants too.
    pub fn is_constant(&self, v: ValueId) -> bool {
        matches!(
            self.values[v.index()],
            ValueData::Constant(_) | ValueData::Block(_)
        )
    }

    pub fn is_argument(&self, v: ValueId) -> bool {
        matches!(self.values[v.index()], ValueData::Argument(_))
    }

    pub fn is_block(&self, v: ValueId) -> bool {
        matches!(self.values[v.index()], ValueData::Block(_))
    }

    pub fn is_inst(&self, v: ValueId) -> bool {
        matches!(self.values[v.index()], ValueData::Inst(_))
    }

    pub fn constant_value(&self, v: ValueId) -> Option<&Constant> {
        match &self.values[v.index()] {
            ValueData::Constant(c) => Some(c),
            _ => None,
        }
    }

    /// Arguments are external inputs and terminators transfer control;
    /// both must survive dead-code elimination.
    pub fn has_side_effects(&self, v: ValueId) -> bool {
        match &self.values[v.index()] {
            ValueData::Argument(_) => true,
            ValueData::Inst(d) => d.spec.has_side_effects(),
            _ => false,
        }
    }

    pub(crate) fn inst_data(&self, v: ValueId) -> Option<&InstData> {
        match &self.values[v.index()] {
            ValueData::Inst(d) => Some(d),
            _ => None,
        }
    }

    pub(crate) fn inst_data_mut(&mut self, v: ValueId) -> Option<&mut InstData> {
        match &mut self.values[v.index()] {
            ValueData::Inst(d) => Some(d),
            _ => None,
        }
    }

    /// All instructions, flattening blocks in insertion order.
    pub fn instructions(&self) -> impl Iterator<Item = ValueId> + '_ {
        self.blocks
            .iter()
            .flat_map(move |&b| self.block_insts(b).into_iter())
    }

    // ------------------------------------------------------------------
    // Def-use engine
    // ------------------------------------------------------------------

    /// Users of a value, one entry per operand position (insertion order).
    pub fn uses(&self, v: ValueId) -> &[ValueId] {
        &self.uses[v.index()]
    }

    pub fn use_count(&self, v: ValueId) -> usize {
        self.uses[v.index()].len()
    }

    pub fn is_used(&self, v: ValueId) -> bool {
        !self.uses[v.index()].is_empty()
    }

    /// Snapshot of a user's operands. Phi operands yield all incoming
    /// values first, then all predecessor blocks.
    pub fn operands(&self, user: ValueId) -> Vec<ValueId> {
        match self.inst_data(user) {
            Some(d) => d.operands.flatten(),
            None => Vec::new(),
        }
    }

    pub(crate) fn add_use(&mut self, value: ValueId, user: ValueId) {
        self.uses[value.index()].push(user);
    }

    pub(crate) fn remove_one_use(&mut self, value: ValueId, user: ValueId) {
        let list = &mut self.uses[value.index()];
        if let Some(pos) = list.iter().position(|&u| u == user) {
            list.remove(pos);
        }
    }

    /// Replace a user's whole operand list, patching use-lists by multiset
    /// semantics. Phi users keep (block, value) pairs and reject the flat
    /// form.
    pub fn set_operands(&mut self, user: ValueId, ops: Vec<ValueId>) -> IrResult<()> {
        let old = {
            let d = self.inst_data_mut(user).ok_or_else(|| IrError::NotFound {
                what: format!("instruction {}", user),
            })?;
            match &mut d.operands {
                OperandStore::Plain(cur) => std::mem::replace(cur, ops.clone()),
                OperandStore::Phi(_) => {
                    return Err(IrError::Schema {
                        reason: "phi operands are (block, value) pairs".to_string(),
                    })
                }
            }
        };
        for v in old {
            self.remove_one_use(v, user);
        }
        for &v in &ops {
            self.add_use(v, user);
        }
        self.note_update(user);
        Ok(())
    }

    /// Rewrite only the operand positions of `user` where `old` appears.
    /// On a phi this rebinds predecessor-block keys as well as incoming
    /// values. Fails when `old` is not currently an operand.
    pub fn replace_uses_of(&mut self, user: ValueId, old: ValueId, new: ValueId) -> IrResult<()> {
        let mut replaced = 0usize;
        {
            let d = self.inst_data_mut(user).ok_or_else(|| IrError::NotFound {
                what: format!("instruction {}", user),
            })?;
            match &mut d.operands {
                OperandStore::Plain(ops) => {
                    for o in ops.iter_mut() {
                        if *o == old {
                            *o = new;
                            replaced += 1;
                        }
                    }
                }
                OperandStore::Phi(pairs) => {
                    for (b, v) in pairs.iter_mut() {
                        if *v == old {
                            *v = new;
                            replaced += 1;
                        }
                        if *b == old {
                            *b = new;
                            replaced += 1;
                        }
                    }
                }
            }
        }
        if replaced == 0 {
            return Err(IrError::InvalidUse {
                user: self.inspect_as_value(user),
                value: self.inspect_as_value(old),
            });
        }
        if old != new {
            for _ in 0..replaced {
                self.remove_one_use(old, user);
                self.add_use(new, user);
            }
        }
        self.note_update(user);
        Ok(())
    }

    /// Walk the use-list of `old` once, swapping every operand position
    /// over to `new` and merging the back-edges.
    pub fn replace_all_uses_with(&mut self, old: ValueId, new: ValueId) {
        if old == new {
            return;
        }
        let users = std::mem::take(&mut self.uses[old.index()]);
        let mut touched: Vec<ValueId> = Vec::new();
        for user in users {
            self.rewrite_one_operand(user, old, new);
            self.uses[new.index()].push(user);
            if !touched.contains(&user) {
                touched.push(user);
            }
        }
        for user in touched {
            self.note_update(user);
        }
    }

    fn rewrite_one_operand(&mut self, user: ValueId, old: ValueId, new: ValueId) {
        let Some(d) = self.inst_data_mut(user) else { return };
        match &mut d.operands {
            OperandStore::Plain(ops) => {
                if let Some(slot) = ops.iter_mut().find(|o| **o == old) {
                    *slot = new;
                }
            }
            OperandStore::Phi(pairs) => {
                for (_, v) in pairs.iter_mut() {
                    if *v == old {
                        *v = new;
                        return;
                    }
                }
                for (b, _) in pairs.iter_mut() {
                    if *b == old {
                        *b = new;
                        return;
                    }
                }
            }
        }
    }

    /// Clear a user's operands, severing it from every use-list.
    pub fn detach(&mut self, user: ValueId) {
        let removed: Vec<ValueId> = match self.inst_data_mut(user) {
            Some(d) => match &mut d.operands {
                OperandStore::Plain(ops) => std::mem::take(ops),
                OperandStore::Phi(pairs) => {
                    let pairs = std::mem::take(pairs);
                    let mut all = Vec::with_capacity(pairs.len() * 2);
                    for (b, v) in pairs {
                        all.push(v);
                        all.push(b);
                    }
                    all
                }
            },
            None => return,
        };
        for v in removed {
            self.remove_one_use(v, user);
        }
        self.note_update(user);
    }

    // ------------------------------------------------------------------
    // Duplication
    // ------------------------------------------------------------------

    /// Deep clone: a fresh value graph with the same structure. Arguments,
    /// blocks and instructions get new identities; intra-function operand
    /// references are rewritten through the clone map; constants are
    /// re-interned content-identically. The clone's name reverts to
    /// `original_name` and its instrumentation is reset.
    pub fn dup(&self) -> Function {
        let mut new = Function {
            name: self.original_name.clone(),
            original_name: self.original_name.clone(),
            values: Vec::new(),
            uses: Vec::new(),
            names: FxHashMap::default(),
            constants: FxHashMap::default(),
            args: Vec::new(),
            return_type: self.return_type.clone(),
            entry: None,
            blocks: Vec::new(),
            events: None,
        };
        let mut map: FxHashMap<ValueId, ValueId> = FxHashMap::default();

        for &a in &self.args {
            if let ValueData::Argument(ad) = &self.values[a.index()] {
                let na = new.add_argument(&ad.name, ad.ty.clone());
                map.insert(a, na);
            }
        }
        for &b in &self.blocks {
            if let ValueData::Block(bd) = &self.values[b.index()] {
                let nb = new.add_block(Some(&bd.name));
                map.insert(b, nb);
            }
        }
        // Clone instructions without operands first so the map is complete
        // before any reference is rewritten.
        for &b in &self.blocks {
            for i in self.block_insts(b) {
                if let ValueData::Inst(d) = &self.values[i.index()] {
                    let shape = match d.operands {
                        OperandStore::Plain(_) => OperandStore::Plain(Vec::new()),
                        OperandStore::Phi(_) => OperandStore::Phi(Vec::new()),
                    };
                    let name = new.make_name(Some(&d.name));
                    let ni = new.alloc(ValueData::Inst(InstData {
                        name: name.clone(),
                        spec: d.spec.clone(),
                        ty: d.ty.clone(),
                        operands: shape,
                        block: None,
                        params: d.params.clone(),
                    }));
                    new.names.insert(name, ni);
                    new.block_append(map[&b], ni);
                    map.insert(i, ni);
                }
            }
        }
        // Second pass: rewrite operands through the map.
        for &b in &self.blocks {
            for i in self.block_insts(b) {
                let ni = map[&i];
                if let ValueData::Inst(d) = &self.values[i.index()] {
                    match &d.operands {
                        OperandStore::Plain(ops) => {
                            let nops: Vec<ValueId> = ops
                                .iter()
                                .map(|&v| self.remap(&mut new, &mut map, v))
                                .collect();
                            let _ = new.set_operands(ni, nops);
                        }
                        OperandStore::Phi(pairs) => {
                            for &(blk, val) in pairs {
                                let nb = self.remap(&mut new, &mut map, blk);
                                let nv = self.remap(&mut new, &mut map, val);
                                new.phi_add_incoming(ni, nb, nv);
                            }
                        }
                    }
                }
            }
        }
        new.entry = self.entry.map(|e| map[&e]);
        new
    }

    fn remap(
        &self,
        new: &mut Function,
        map: &mut FxHashMap<ValueId, ValueId>,
        v: ValueId,
    ) -> ValueId {
        if let Some(&n) = map.get(&v) {
            return n;
        }
        match &self.values[v.index()] {
            ValueData::Constant(c) => {
                let n = new.constant(c.clone());
                map.insert(v, n);
                n
            }
            _ => v,
        }
    }

    // ------------------------------------------------------------------
    // Instrumentation plumbing
    // ------------------------------------------------------------------

    pub(crate) fn note<F: FnOnce(&Self, &mut EventStream) -> Event>(&mut self, make: F) {
        let Some(mut ev) = self.events.take() else { return };
        let event = make(self, &mut ev);
        ev.push(event);
        self.events = Some(ev);
    }

    fn note_arguments(&mut self) {
        let Some(mut ev) = self.events.take() else { return };
        let mut arguments = Vec::with_capacity(self.args.len());
        for &a in &self.args {
            if let ValueData::Argument(ad) = &self.values[a.index()] {
                arguments.push(OperandRecord::Argument {
                    name: ad.name.clone(),
                    ty: Some(ev.type_id(&ad.ty)),
                });
            }
        }
        ev.push(Event::SetArguments { arguments });
        self.events = Some(ev);
    }

    /// Record the full current state (operands and type) of an instruction.
    pub(crate) fn note_update(&mut self, inst: ValueId) {
        let Some(mut ev) = self.events.take() else { return };
        if let Some(record) = self.update_record(&mut ev, inst) {
            ev.push(record);
        }
        self.events = Some(ev);
    }

    fn update_record(&self, ev: &mut EventStream, inst: ValueId) -> Option<Event> {
        let d = self.inst_data(inst)?;
        let mut operands = Vec::new();
        match &d.operands {
            OperandStore::Plain(ops) => {
                for &v in ops {
                    operands.push(self.encode_operand(ev, v));
                }
            }
            OperandStore::Phi(pairs) => {
                for &(_, v) in pairs {
                    operands.push(self.encode_operand(ev, v));
                }
                for &(b, _) in pairs {
                    operands.push(self.encode_operand(ev, b));
                }
            }
        }
        Some(Event::UpdateInstruction {
            name: d.name.clone(),
            opcode: d.spec.opcode().to_string(),
            parameters: d.params.clone(),
            operands,
            ty: ev.type_id(&d.ty),
        })
    }

    fn encode_operand(&self, ev: &mut EventStream, v: ValueId) -> OperandRecord {
        match &self.values[v.index()] {
            ValueData::Constant(c) => OperandRecord::Constant {
                ty: ev.type_id(&c.ty),
                value: const_payload(&c.value),
            },
            ValueData::Argument(a) => OperandRecord::Argument {
                name: a.name.clone(),
                ty: None,
            },
            ValueData::Block(b) => OperandRecord::BasicBlock {
                name: b.name.clone(),
            },
            ValueData::Inst(d) => OperandRecord::Instruction {
                name: d.name.clone(),
            },
        }
    }
}
