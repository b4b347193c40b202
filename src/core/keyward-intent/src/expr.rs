//! Intent expression tree and runtime values.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::env::BindingEnv;

/// A runtime value produced by evaluating an expression or bound by an analyzer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// String (addresses are strings).
    Str(String),
    /// Homogeneous or mixed list.
    List(Vec<Value>),
}

impl Value {
    /// Name of the value's type, for error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::List(_) => "list",
        }
    }

    /// Builds a list of strings.
    pub fn str_list<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::List(items.into_iter().map(|s| Value::Str(s.into())).collect())
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Str(s) => write_quoted(f, s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            },
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            c => write!(f, "{c}")?,
        }
    }
    f.write_str("\"")
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `==`
    Eq,
    /// `!=`
    Ne,
}

impl CmpOp {
    /// Source form of the operator.
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
        }
    }
}

/// Parsed intent expression.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// Constant.
    Literal(Value),
    /// Dotted identifier, resolved at evaluation time.
    Ident(String),
    /// `[a, b, ...]`
    List(Vec<Expr>),
    /// `!e`
    Not(Box<Expr>),
    /// `a && b`
    And(Box<Expr>, Box<Expr>),
    /// `a || b`
    Or(Box<Expr>, Box<Expr>),
    /// `a <op> b`
    Compare(CmpOp, Box<Expr>, Box<Expr>),
    /// `all(list)`
    All(Box<Expr>),
    /// `any(threshold, list)`
    Any(Box<Expr>, Box<Expr>),
}

impl Expr {
    /// Replaces every identifier bound in `env` with its value.
    ///
    /// Identifiers that `env` cannot resolve are left in place, so
    /// `approvers` stays symbolic unless the env binds it.
    pub fn substitute(&self, env: &BindingEnv) -> Expr {
        let sub = |e: &Expr| Box::new(e.substitute(env));
        match self {
            Expr::Literal(v) => Expr::Literal(v.clone()),
            Expr::Ident(name) => match env.lookup(name) {
                Some(v) => Expr::Literal(v.clone()),
                None => Expr::Ident(name.clone()),
            },
            Expr::List(items) => Expr::List(items.iter().map(|e| e.substitute(env)).collect()),
            Expr::Not(e) => Expr::Not(sub(e)),
            Expr::And(a, b) => Expr::And(sub(a), sub(b)),
            Expr::Or(a, b) => Expr::Or(sub(a), sub(b)),
            Expr::Compare(op, a, b) => Expr::Compare(*op, sub(a), sub(b)),
            Expr::All(l) => Expr::All(sub(l)),
            Expr::Any(n, l) => Expr::Any(sub(n), sub(l)),
        }
    }

    /// Identifiers still referenced by the expression, deduplicated and sorted.
    pub fn identifiers(&self) -> Vec<String> {
        let mut out = BTreeMap::new();
        self.collect_identifiers(&mut out);
        out.into_keys().collect()
    }

    fn collect_identifiers(&self, out: &mut BTreeMap<String, ()>) {
        match self {
            Expr::Literal(_) => {},
            Expr::Ident(name) => {
                out.insert(name.clone(), ());
            },
            Expr::List(items) => items.iter().for_each(|e| e.collect_identifiers(out)),
            Expr::Not(e) | Expr::All(e) => e.collect_identifiers(out),
            Expr::And(a, b) | Expr::Or(a, b) | Expr::Compare(_, a, b) | Expr::Any(a, b) => {
                a.collect_identifiers(out);
                b.collect_identifiers(out);
            },
        }
    }

    fn is_operator(&self) -> bool {
        matches!(self, Expr::And(..) | Expr::Or(..) | Expr::Compare(..))
    }
}

struct Operand<'a>(&'a Expr);

impl fmt::Display for Operand<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_operator() {
            write!(f, "({})", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(v) => write!(f, "{v}"),
            Expr::Ident(name) => f.write_str(name),
            Expr::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            },
            Expr::Not(e) => write!(f, "!{}", Operand(e)),
            Expr::And(a, b) => write!(f, "{} && {}", Operand(a), Operand(b)),
            Expr::Or(a, b) => write!(f, "{} || {}", Operand(a), Operand(b)),
            Expr::Compare(op, a, b) => write!(f, "{} {} {}", Operand(a), op.symbol(), Operand(b)),
            Expr::All(l) => write!(f, "all({l})"),
            Expr::Any(n, l) => write!(f, "any({n}, {l})"),
        }
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn test_display_is_reparseable() {
        let src = r#"any(2, ["a", "b\"c"]) && !(x.amount > 5 || creator == "bob")"#;
        let expr = parse(src).unwrap();
        let printed = expr.to_string();
        assert_eq!(parse(&printed).unwrap(), expr);
    }

    #[test]
    fn test_substitute_replaces_bound_identifiers_only() {
        let expr = parse("all(space.owners) && approvers == approvers").unwrap();
        let env = BindingEnv::new().with_attribute("space.owners", Value::str_list(["alice"]));
        let bound = expr.substitute(&env);
        assert_eq!(bound.identifiers(), vec!["approvers".to_string()]);
        assert_eq!(bound.to_string(), r#"all(["alice"]) && (approvers == approvers)"#);
    }

    #[test]
    fn test_value_json_is_untagged() {
        let v = Value::List(vec![Value::Int(3), Value::Str("x".into()), Value::Bool(true)]);
        assert_eq!(serde_json::to_string(&v).unwrap(), r#"[3,"x",true]"#);
        let back: Value = serde_json::from_str(r#"[3,"x",true]"#).unwrap();
        assert_eq!(back, v);
    }
}
