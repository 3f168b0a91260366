//! Expression AST for the DSL v2.1 logical language.

use std::fmt;

/// A parsed logical expression over ground atoms.
///
/// The grammar is purely boolean: comparisons are stripped into predicate
/// atoms before parsing and numeric arguments are coerced to constants by
/// the program normalizer, so arguments here are always identifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    True,
    False,
    Atom { predicate: String, args: Vec<String> },
    Not(Box<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Implies(Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn atom(predicate: impl Into<String>, args: Vec<String>) -> Self {
        Expr::Atom {
            predicate: predicate.into(),
            args,
        }
    }

    /// Stable propositional key for a ground atom: `Pred(a,b)` without
    /// spaces, or the bare name for 0-ary atoms. This is the name the
    /// solver driver uses for the corresponding boolean constant.
    pub fn atom_key(predicate: &str, args: &[String]) -> String {
        if args.is_empty() {
            predicate.to_string()
        } else {
            format!("{}({})", predicate, args.join(","))
        }
    }

    /// Collect every atom `(predicate, args)` in syntactic order,
    /// deduplicated by atom key.
    pub fn atoms(&self) -> Vec<(String, Vec<String>)> {
        let mut out = Vec::new();
        let mut seen = std::collections::BTreeSet::new();
        self.collect_atoms(&mut out, &mut seen);
        out
    }

    fn collect_atoms(
        &self,
        out: &mut Vec<(String, Vec<String>)>,
        seen: &mut std::collections::BTreeSet<String>,
    ) {
        match self {
            Expr::True | Expr::False => {}
            Expr::Atom { predicate, args } => {
                let key = Expr::atom_key(predicate, args);
                if seen.insert(key) {
                    out.push((predicate.clone(), args.clone()));
                }
            }
            Expr::Not(inner) => inner.collect_atoms(out, seen),
            Expr::And(items) | Expr::Or(items) => {
                for item in items {
                    item.collect_atoms(out, seen);
                }
            }
            Expr::Implies(lhs, rhs) => {
                lhs.collect_atoms(out, seen);
                rhs.collect_atoms(out, seen);
            }
        }
    }

    /// Flatten top-level conjunctions into their conjunct list.
    /// Non-conjunctive expressions yield themselves.
    pub fn conjuncts(&self) -> Vec<&Expr> {
        match self {
            Expr::And(items) => items.iter().flat_map(|e| e.conjuncts()).collect(),
            other => vec![other],
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::True => write!(f, "true"),
            Expr::False => write!(f, "false"),
            Expr::Atom { predicate, args } => {
                if args.is_empty() {
                    write!(f, "{predicate}")
                } else {
                    write!(f, "{}({})", predicate, args.join(", "))
                }
            }
            Expr::Not(inner) => write!(f, "(not {inner})"),
            Expr::And(items) => {
                let parts: Vec<String> = items.iter().map(|e| e.to_string()).collect();
                write!(f, "({})", parts.join(" and "))
            }
            Expr::Or(items) => {
                let parts: Vec<String> = items.iter().map(|e| e.to_string()).collect();
                write!(f, "({})", parts.join(" or "))
            }
            Expr::Implies(lhs, rhs) => write!(f, "({lhs} -> {rhs})"),
        }
    }
}
