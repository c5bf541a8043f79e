//! IR Modules
//!
//! A module is an ordered collection of functions keyed by name. Names
//! are disambiguated on insertion with a `;N` suffix so the same source
//! name can be compiled repeatedly; `original_name` keeps the requested
//! form.

use rustc_hash::FxHashMap;

use crate::error::{IrError, IrResult};
use crate::events::EventStream;
use crate::function::Function;
use crate::pretty::PrettyPrint;

#[derive(Debug, Clone, Default)]
pub struct Module {
    name: String,
    functions: Vec<Function>,
    index: FxHashMap<String, usize>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a function, disambiguating its name against the module.
    pub fn add(&mut self, func: Function) -> &Function {
        self.insert(func, None)
    }

    /// Add a function under a prefixed name (used when inlining compiled
    /// artifacts under a namespace).
    pub fn add_with_prefix(&mut self, func: Function, prefix: &str) -> &Function {
        self.insert(func, Some(prefix))
    }

    fn insert(&mut self, mut func: Function, prefix: Option<&str>) -> &Function {
        let requested = match prefix {
            Some(p) => format!("{}{}", p, func.name()),
            None => func.name().to_string(),
        };
        let assigned = self.disambiguate(&requested);
        func.set_name(assigned.clone());
        let pos = self.functions.len();
        self.functions.push(func);
        self.index.insert(assigned, pos);
        &self.functions[pos]
    }

    /// Smallest free name: the requested one when unused, otherwise
    /// `base;N` with the smallest free `N >= 1` (the base strips any
    /// previous `;N` suffix so re-adding a disambiguated name keeps
    /// counting from the same family).
    fn disambiguate(&self, requested: &str) -> String {
        if !self.index.contains_key(requested) {
            return requested.to_string();
        }
        let base = requested.split(';').next().unwrap_or(requested);
        let mut n: u64 = 1;
        loop {
            let candidate = format!("{};{}", base, n);
            if !self.index.contains_key(&candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn find(&self, name: &str) -> IrResult<&Function> {
        let pos = self.position(name)?;
        Ok(&self.functions[pos])
    }

    pub fn find_mut(&mut self, name: &str) -> IrResult<&mut Function> {
        let pos = self.position(name)?;
        Ok(&mut self.functions[pos])
    }

    pub fn remove(&mut self, name: &str) -> IrResult<Function> {
        let pos = self.position(name)?;
        let func = self.functions.remove(pos);
        self.index.clear();
        for (i, f) in self.functions.iter().enumerate() {
            self.index.insert(f.name().to_string(), i);
        }
        Ok(func)
    }

    fn position(&self, name: &str) -> IrResult<usize> {
        self.index.get(name).copied().ok_or_else(|| IrError::NotFound {
            what: format!("function '{}' in module {}", name, self.name),
        })
    }

    pub fn functions(&self) -> impl Iterator<Item = &Function> {
        self.functions.iter()
    }

    pub fn function_count(&self) -> usize {
        self.functions.len()
    }

    /// The event streams of every instrumented function, in module order.
    pub fn instrumented(&self) -> Vec<(&str, &EventStream)> {
        self.functions
            .iter()
            .filter_map(|f| f.events().map(|ev| (f.name(), ev)))
            .collect()
    }
}

impl PrettyPrint for Module {
    fn pretty_print(&self) -> String {
        let mut out = String::new();
        for (i, func) in self.functions.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            out.push_str(&func.pretty_print());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Type;

    fn named(name: &str) -> Function {
        Function::new(name, &[], Type::Bottom)
    }

    #[test]
    fn test_add_and_find() {
        let mut module = Module::new("main");
        module.add(named("foo"));
        assert_eq!(module.function_count(), 1);
        assert!(module.find("foo").is_ok());
        assert!(matches!(
            module.find("bar").unwrap_err(),
            IrError::NotFound { .. }
        ));
    }

    #[test]
    fn test_name_disambiguation() {
        // S6: adding foo, foo, foo;1 yields foo, foo;1, foo;2 while each
        // original_name keeps the requested form.
        let mut module = Module::new("main");
        module.add(named("foo"));
        module.add(named("foo"));
        module.add(named("foo;1"));

        let names: Vec<_> = module.functions().map(|f| f.name().to_string()).collect();
        assert_eq!(names, vec!["foo", "foo;1", "foo;2"]);
        let originals: Vec<_> = module
            .functions()
            .map(|f| f.original_name().to_string())
            .collect();
        assert_eq!(originals, vec!["foo", "foo", "foo;1"]);
    }

    #[test]
    fn test_add_with_prefix() {
        let mut module = Module::new("main");
        module.add(named("init"));
        let added = module.add_with_prefix(named("init"), "lib.");
        assert_eq!(added.name(), "lib.init");
        assert_eq!(added.original_name(), "init");
    }

    #[test]
    fn test_remove() {
        let mut module = Module::new("main");
        module.add(named("foo"));
        module.add(named("bar"));
        let removed = module.remove("foo").unwrap();
        assert_eq!(removed.name(), "foo");
        assert_eq!(module.function_count(), 1);
        assert!(module.find("bar").is_ok());
        assert!(module.remove("foo").is_err());
    }

    #[test]
    fn test_instrumented_aggregation() {
        let mut module = Module::new("main");
        module.add(Function::instrumented("traced", &[], Type::Bottom));
        module.add(named("silent"));

        let streams = module.instrumented();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].0, "traced");
        assert!(!streams[0].1.is_empty());
    }
}
