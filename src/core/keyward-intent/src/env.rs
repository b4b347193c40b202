//! Identifier bindings visible to an intent.

use std::collections::BTreeMap;

use crate::expr::Value;

/// Attribute holding the list of addresses that approved an action.
pub const APPROVERS: &str = "approvers";

/// Bindings for intent evaluation.
///
/// Attributes are looked up by their full dotted name. Anything else is
/// split at the first `.` into `<contract>.<variable>` and resolved in the
/// contract's sub-scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingEnv {
    attributes: BTreeMap<String, Value>,
    analyzers: BTreeMap<String, BTreeMap<String, Value>>,
}

impl BindingEnv {
    /// Creates an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`set_attribute`](Self::set_attribute).
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set_attribute(name, value);
        self
    }

    /// Binds a well-known attribute, replacing any previous value.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.attributes.insert(name.into(), value.into());
    }

    /// Binds the variables produced by an analyzer contract.
    ///
    /// Returns `false` and keeps the existing scope if the contract was
    /// already bound.
    pub fn bind_analyzer(&mut self, contract: impl Into<String>, variables: BTreeMap<String, Value>) -> bool {
        match self.analyzers.entry(contract.into()) {
            std::collections::btree_map::Entry::Occupied(_) => false,
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(variables);
                true
            },
        }
    }

    /// Variables bound by `contract`, if any.
    pub fn analyzer(&self, contract: &str) -> Option<&BTreeMap<String, Value>> {
        self.analyzers.get(contract)
    }

    /// Contracts with a bound scope, in sorted order.
    pub fn analyzer_contracts(&self) -> impl Iterator<Item = &str> {
        self.analyzers.keys().map(String::as_str)
    }

    /// Resolves a dotted identifier.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        if let Some(v) = self.attributes.get(path) {
            return Some(v);
        }
        let (contract, var) = path.split_once('.')?;
        self.analyzers.get(contract)?.get(var)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_shadows_analyzer_scope() {
        let mut env = BindingEnv::new().with_attribute("space.id", 7i64);
        let mut vars = BTreeMap::new();
        vars.insert("id".to_string(), Value::Int(99));
        vars.insert("amount".to_string(), Value::Int(5));
        env.bind_analyzer("space", vars);

        assert_eq!(env.lookup("space.id"), Some(&Value::Int(7)));
        assert_eq!(env.lookup("space.amount"), Some(&Value::Int(5)));
        assert_eq!(env.lookup("space.missing"), None);
        assert_eq!(env.lookup("nothing"), None);
    }

    #[test]
    fn test_first_analyzer_binding_wins() {
        let mut env = BindingEnv::new();
        let first = BTreeMap::from([("x".to_string(), Value::Int(1))]);
        let second = BTreeMap::from([("x".to_string(), Value::Int(2))]);
        assert!(env.bind_analyzer("tx", first));
        assert!(!env.bind_analyzer("tx", second));
        assert_eq!(env.lookup("tx.x"), Some(&Value::Int(1)));
    }
}
