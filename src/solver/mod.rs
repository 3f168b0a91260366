//! # Solver Driver
//!
//! Lowers a normalized [`LogicProgram`] into a fresh Z3 solver instance.
//! One instance per program, never reused across pipeline stages; the
//! caller owns the [`z3::Context`] and drops everything at the end of the
//! stage that needed it.
//!
//! Ground atoms are encoded propositionally: each atom becomes a boolean
//! constant named by its normalized key (`Pred(a,b)`). The type mapper
//! still resolves one Z3 sort per ontology sort and declares constants
//! lazily on first use, which is where argument sorts are checked.

use std::collections::HashMap;

use thiserror::Error;
use z3::ast::{Ast, Bool, Dynamic};
use z3::{Context, FuncDecl, SatResult, Solver, Sort, Symbol};

use crate::dsl::{DslError, Expr, ExpressionParser, ParseMode};
use crate::ontology::Ontology;
use crate::program::LogicProgram;

/// Errors raised while building or driving a solver instance.
#[derive(Error, Debug)]
pub enum SolverError {
    #[error(transparent)]
    Dsl(#[from] DslError),

    #[error("Solver error: {0}")]
    Backend(String),
}

/// Caches one Z3 sort per ontology sort and one term per constant.
///
/// `Entity` sorts carrying an enumerated value list become tagged
/// datatypes whose constructors are the listed values; plain `Entity`
/// falls back to the string sort; primitive bases map directly.
pub struct TypeMapper<'ctx> {
    ctx: &'ctx Context,
    sorts: HashMap<String, Sort<'ctx>>,
    constants: HashMap<String, Dynamic<'ctx>>,
}

impl<'ctx> TypeMapper<'ctx> {
    pub fn new(ctx: &'ctx Context) -> Self {
        TypeMapper {
            ctx,
            sorts: HashMap::new(),
            constants: HashMap::new(),
        }
    }

    /// Resolve the Z3 sort for an ontology sort name, caching the result.
    pub fn solver_sort(
        &mut self,
        name: &str,
        program: &LogicProgram,
        registry: &Ontology,
    ) -> Sort<'ctx> {
        if let Some(sort) = self.sorts.get(name) {
            return sort.clone();
        }
        let base = resolve_base(name, program, registry);
        let sort = match base.as_str() {
            "Bool" => Sort::bool(self.ctx),
            "Int" => Sort::int(self.ctx),
            "Float" => Sort::real(self.ctx),
            "String" => Sort::string(self.ctx),
            _ => {
                let values = registry
                    .sort_spec(name)
                    .map(|spec| spec.values.clone())
                    .unwrap_or_default();
                if values.is_empty() {
                    Sort::string(self.ctx)
                } else {
                    let symbols: Vec<Symbol> =
                        values.iter().map(|v| Symbol::String(v.clone())).collect();
                    let (sort, _, _) = Sort::enumeration(
                        self.ctx,
                        Symbol::String(name.to_string()),
                        &symbols,
                    );
                    sort
                }
            }
        };
        self.sorts.insert(name.to_string(), sort.clone());
        sort
    }

    /// Declare (once) and return the term for a program constant.
    pub fn constant(
        &mut self,
        name: &str,
        program: &LogicProgram,
        registry: &Ontology,
    ) -> Option<Dynamic<'ctx>> {
        if let Some(term) = self.constants.get(name) {
            return Some(term.clone());
        }
        let sort_name = program.constants.get(name)?.sort.clone();
        let sort = self.solver_sort(&sort_name, program, registry);
        let decl = FuncDecl::new(self.ctx, name, &[], &sort);
        let term = decl.apply(&[]);
        self.constants.insert(name.to_string(), term.clone());
        Some(term)
    }
}

/// Walk the declared sort chain down to a primitive base.
fn resolve_base(name: &str, program: &LogicProgram, registry: &Ontology) -> String {
    let mut current = name.to_string();
    for _ in 0..32 {
        if matches!(current.as_str(), "Bool" | "Int" | "Float" | "String" | "Entity") {
            return current;
        }
        match program.sorts.get(&current) {
            Some(def) if def.base != current => current = def.base.clone(),
            _ => return registry.base_sort(&current).to_string(),
        }
    }
    "Entity".to_string()
}

/// A built solver plus the handles the feedback engine needs.
pub struct SolverInstance<'ctx> {
    ctx: &'ctx Context,
    pub solver: Solver<'ctx>,
    pub query: Option<Bool<'ctx>>,
    pub query_text: Option<String>,
    /// Tracking labels in assertion order (`rule id`, `rule_i`,
    /// `axiom_i`, `fact_i`); used for unsat-core reporting.
    pub assertion_labels: Vec<String>,
    tracked: Vec<(Bool<'ctx>, String)>,
}

impl<'ctx> SolverInstance<'ctx> {
    pub fn context(&self) -> &'ctx Context {
        self.ctx
    }

    /// Entailment: `solver ⊨ P` iff `solver ∧ ¬P` is UNSAT.
    /// UNKNOWN counts as not entailed.
    pub fn entails(&self, proposition: &Bool<'ctx>) -> bool {
        self.solver.push();
        self.solver.assert(&proposition.not());
        let result = self.solver.check();
        self.solver.pop(1);
        result == SatResult::Unsat
    }

    /// Entailment probe for an atom by its normalized key.
    pub fn entails_atom_key(&self, key: &str) -> bool {
        self.entails(&Bool::new_const(self.ctx, key))
    }

    /// Map the current unsat core back onto assertion labels.
    /// Falls back to enumerating every assertion when the core is empty.
    pub fn core_labels(&self) -> Vec<String> {
        let core = self.solver.get_unsat_core();
        let mut labels: Vec<String> = Vec::new();
        for item in &core {
            let rendered = item.to_string();
            if let Some((_, label)) = self
                .tracked
                .iter()
                .find(|(lit, _)| lit.to_string() == rendered)
            {
                labels.push(label.clone());
            }
        }
        if labels.is_empty() {
            labels = self.assertion_labels.clone();
        }
        if labels.is_empty() {
            labels.push("conflict_0".to_string());
        }
        labels
    }
}

/// Builds fresh solver instances from normalized programs.
pub struct SolverDriver<'a> {
    registry: &'a Ontology,
}

impl<'a> SolverDriver<'a> {
    pub fn new(registry: &'a Ontology) -> Self {
        SolverDriver { registry }
    }

    /// Assert every rule, axiom and fact of `program` into a fresh solver.
    ///
    /// Rules become `condition => conclusion`; axioms are asserted as
    /// formulas; each fact row is asserted as the corresponding predicate
    /// application. The query, when present, is parsed and returned
    /// alongside the solver handle.
    pub fn build<'ctx>(
        &self,
        ctx: &'ctx Context,
        program: &LogicProgram,
    ) -> Result<SolverInstance<'ctx>, SolverError> {
        let solver = Solver::new(ctx);
        let parser = ExpressionParser::new(self.registry, ParseMode::Permissive);
        let mut mapper = TypeMapper::new(ctx);
        let mut labels = Vec::new();
        let mut tracked = Vec::new();

        let mut track = |solver: &Solver<'ctx>,
                         formula: &Bool<'ctx>,
                         label: String,
                         tracked: &mut Vec<(Bool<'ctx>, String)>| {
            let lit = Bool::new_const(ctx, format!("track!{}", tracked.len()));
            solver.assert_and_track(formula, &lit);
            tracked.push((lit, label.clone()));
            labels.push(label);
        };

        for (idx, rule) in program.rules.iter().enumerate() {
            let condition = parser.parse(&rule.condition, &program.predicates, &program.constants)?;
            let conclusion =
                parser.parse(&rule.conclusion, &program.predicates, &program.constants)?;
            let cond = self.lower(ctx, &condition.expr, program, &mut mapper);
            let concl = self.lower(ctx, &conclusion.expr, program, &mut mapper);
            let label = rule
                .id
                .clone()
                .unwrap_or_else(|| format!("rule_{idx}"));
            track(&solver, &cond.implies(&concl), label, &mut tracked);
        }

        for (idx, axiom) in program.axioms.iter().enumerate() {
            let parsed = parser.parse(&axiom.formula, &program.predicates, &program.constants)?;
            let formula = self.lower(ctx, &parsed.expr, program, &mut mapper);
            track(&solver, &formula, format!("axiom_{idx}"), &mut tracked);
        }

        let mut fact_idx = 0usize;
        for (name, rows) in &program.facts {
            for row in rows {
                let key = Expr::atom_key(name, row);
                for arg in row {
                    let _ = mapper.constant(arg, program, self.registry);
                }
                let atom = Bool::new_const(ctx, key.as_str());
                track(&solver, &atom, format!("fact_{fact_idx}"), &mut tracked);
                fact_idx += 1;
            }
        }

        let (query, query_text) = match &program.query {
            Some(text) if !text.trim().is_empty() => {
                let parsed = parser.parse(text, &program.predicates, &program.constants)?;
                let lowered = self.lower(ctx, &parsed.expr, program, &mut mapper);
                (Some(lowered), Some(text.clone()))
            }
            _ => (None, None),
        };

        Ok(SolverInstance {
            ctx,
            solver,
            query,
            query_text,
            assertion_labels: labels,
            tracked,
        })
    }

    /// Lower a parsed expression to a Z3 boolean term.
    fn lower<'ctx>(
        &self,
        ctx: &'ctx Context,
        expr: &Expr,
        program: &LogicProgram,
        mapper: &mut TypeMapper<'ctx>,
    ) -> Bool<'ctx> {
        match expr {
            Expr::True => Bool::from_bool(ctx, true),
            Expr::False => Bool::from_bool(ctx, false),
            Expr::Atom { predicate, args } => {
                for arg in args {
                    let _ = mapper.constant(arg, program, self.registry);
                }
                Bool::new_const(ctx, Expr::atom_key(predicate, args).as_str())
            }
            Expr::Not(inner) => self.lower(ctx, inner, program, mapper).not(),
            Expr::And(items) => {
                let lowered: Vec<Bool<'ctx>> = items
                    .iter()
                    .map(|item| self.lower(ctx, item, program, mapper))
                    .collect();
                let refs: Vec<&Bool<'ctx>> = lowered.iter().collect();
                Bool::and(ctx, &refs)
            }
            Expr::Or(items) => {
                let lowered: Vec<Bool<'ctx>> = items
                    .iter()
                    .map(|item| self.lower(ctx, item, program, mapper))
                    .collect();
                let refs: Vec<&Bool<'ctx>> = lowered.iter().collect();
                Bool::or(ctx, &refs)
            }
            Expr::Implies(lhs, rhs) => {
                let l = self.lower(ctx, lhs, program, mapper);
                let r = self.lower(ctx, rhs, program, mapper);
                l.implies(&r)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::program::{ConstantDef, PredicateDef, Rule, SortDef};
    use z3::Config;

    fn registry() -> Ontology {
        Ontology::load_default().expect("embedded catalogue")
    }

    fn zero_ary(names: &[&str]) -> std::collections::BTreeMap<String, PredicateDef> {
        names
            .iter()
            .map(|n| ((*n).to_string(), PredicateDef::default()))
            .collect()
    }

    #[test]
    fn test_rule_and_fact_entail_query() {
        let registry = registry();
        let mut program = LogicProgram {
            predicates: zero_ary(&["A", "B"]),
            query: Some("B".to_string()),
            ..Default::default()
        };
        program.rules.push(Rule {
            condition: "A".into(),
            conclusion: "B".into(),
            id: None,
        });
        program.facts.insert("A".into(), vec![Vec::new()]);

        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let driver = SolverDriver::new(&registry);
        let instance = driver.build(&ctx, &program).expect("build");
        assert_eq!(instance.solver.check(), SatResult::Sat);
        let query = instance.query.clone().expect("query");
        assert!(instance.entails(&query));
    }

    #[test]
    fn test_conflicting_rules_are_unsat() {
        let registry = registry();
        let mut program = LogicProgram {
            predicates: zero_ary(&["A", "B"]),
            ..Default::default()
        };
        program.rules.push(Rule {
            condition: "A".into(),
            conclusion: "B".into(),
            id: None,
        });
        program.rules.push(Rule {
            condition: "A".into(),
            conclusion: "not B".into(),
            id: None,
        });
        program.facts.insert("A".into(), vec![Vec::new()]);

        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let driver = SolverDriver::new(&registry);
        let instance = driver.build(&ctx, &program).expect("build");
        assert_eq!(instance.solver.check(), SatResult::Unsat);
        assert!(!instance.core_labels().is_empty());
    }

    #[test]
    fn test_fact_rows_assert_atom_keys() {
        let registry = registry();
        let mut program = LogicProgram {
            ..Default::default()
        };
        program.sorts.insert("Soggetto".into(), SortDef::default());
        program
            .constants
            .insert("tizio".into(), ConstantDef { sort: "Soggetto".into() });
        program.predicates.insert(
            "BuonaFede".into(),
            PredicateDef { arity: 1, sorts: vec!["Soggetto".into()] },
        );
        program
            .facts
            .insert("BuonaFede".into(), vec![vec!["tizio".into()]]);

        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let driver = SolverDriver::new(&registry);
        let instance = driver.build(&ctx, &program).expect("build");
        assert!(instance.entails_atom_key("BuonaFede(tizio)"));
        assert!(!instance.entails_atom_key("BuonaFede(caio)"));
    }

    #[test]
    fn test_malformed_rule_is_a_dsl_error() {
        let registry = registry();
        let mut program = LogicProgram::default();
        program.rules.push(Rule {
            condition: "((".into(),
            conclusion: "A".into(),
            id: None,
        });
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let driver = SolverDriver::new(&registry);
        assert!(matches!(
            driver.build(&ctx, &program),
            Err(SolverError::Dsl(_))
        ));
    }

    #[test]
    fn test_type_mapper_caches_sorts() {
        let registry = registry();
        let program = LogicProgram::default();
        let cfg = Config::new();
        let ctx = Context::new(&cfg);
        let mut mapper = TypeMapper::new(&ctx);
        let first = mapper.solver_sort("Contratto", &program, &registry);
        let second = mapper.solver_sort("Contratto", &program, &registry);
        assert_eq!(first, second);
        assert_eq!(mapper.sorts.len(), 1);
    }
}
