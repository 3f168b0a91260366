//! Recursive-descent parser for DSL v2.1 expressions.
//!
//! Three surface forms are accepted interchangeably:
//! - prefix S-expressions: `(and A B)`, `(Pred arg1 arg2)`
//! - call-style operators: `and(A, B)`, `not(A)`
//! - infix: `A and B`, `A -> B`, `not A`, `Pred(a, b)`
//!
//! Every predicate application is validated against the program
//! declarations and the ontology registry: canonical name, arity, and the
//! sort of each constant argument. Identifiers that are not declared
//! constants are fresh variables and always pass.

use std::collections::BTreeMap;

use crate::ontology::{is_logical_keyword, Ontology};
use crate::program::{ConstantDef, PredicateDef};

use super::expr::Expr;
use super::DslError;

/// Auto-declaration policy for unknown predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// Unknown predicates are an error (guardrail, refined programs).
    Strict,
    /// Unknown atoms auto-declare using the registry signature when
    /// available (initial extraction, queries).
    Permissive,
}

/// Parse result: the expression plus any predicates auto-declared along
/// the way (permissive mode only). The caller merges these back into the
/// program declarations.
#[derive(Debug, Clone)]
pub struct ParsedExpression {
    pub expr: Expr,
    pub auto_declared: BTreeMap<String, PredicateDef>,
}

/// Expression parser bound to a registry and a parse mode.
pub struct ExpressionParser<'a> {
    registry: &'a Ontology,
    mode: ParseMode,
}

impl<'a> ExpressionParser<'a> {
    pub fn new(registry: &'a Ontology, mode: ParseMode) -> Self {
        ExpressionParser { registry, mode }
    }

    /// Parse `text` against the given declarations.
    pub fn parse(
        &self,
        text: &str,
        predicates: &BTreeMap<String, PredicateDef>,
        constants: &BTreeMap<String, ConstantDef>,
    ) -> Result<ParsedExpression, DslError> {
        let tokens = tokenize(text)?;
        if tokens.is_empty() {
            return Err(DslError::Parse("empty expression".to_string()));
        }
        let mut cursor = Cursor {
            tokens,
            pos: 0,
            registry: self.registry,
            mode: self.mode,
            predicates,
            constants,
            auto_declared: BTreeMap::new(),
        };
        let expr = cursor.parse_expr()?;
        if cursor.pos < cursor.tokens.len() {
            return Err(DslError::Parse(format!(
                "unexpected trailing input near '{}'",
                cursor.tokens[cursor.pos]
            )));
        }
        Ok(ParsedExpression {
            expr,
            auto_declared: cursor.auto_declared,
        })
    }
}

// ============================================================================
// Lexer
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    LParen,
    RParen,
    Comma,
    Arrow,
    Ident(String),
    Number(String),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Arrow => write!(f, "->"),
            Token::Ident(s) | Token::Number(s) => write!(f, "{s}"),
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>, DslError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            '-' if chars.get(i + 1) == Some(&'>') => {
                tokens.push(Token::Arrow);
                i += 2;
            }
            '=' if chars.get(i + 1) == Some(&'>') => {
                tokens.push(Token::Arrow);
                i += 2;
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            c if c.is_ascii_digit() => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(Token::Number(chars[start..i].iter().collect()));
            }
            other => {
                return Err(DslError::Parse(format!(
                    "unexpected character '{other}' in expression"
                )))
            }
        }
    }
    Ok(tokens)
}

// ============================================================================
// Parser
// ============================================================================

struct Cursor<'a> {
    tokens: Vec<Token>,
    pos: usize,
    registry: &'a Ontology,
    mode: ParseMode,
    predicates: &'a BTreeMap<String, PredicateDef>,
    constants: &'a BTreeMap<String, ConstantDef>,
    auto_declared: BTreeMap<String, PredicateDef>,
}

impl<'a> Cursor<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn bump(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: &Token) -> Result<(), DslError> {
        match self.bump() {
            Some(ref tok) if tok == expected => Ok(()),
            Some(tok) => Err(DslError::Parse(format!(
                "expected '{expected}', found '{tok}'"
            ))),
            None => Err(DslError::Parse(format!(
                "expected '{expected}', found end of input"
            ))),
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, DslError> {
        self.parse_implies()
    }

    // Right-associative, lowest precedence.
    fn parse_implies(&mut self) -> Result<Expr, DslError> {
        let lhs = self.parse_or()?;
        let is_implies = match self.peek() {
            Some(Token::Arrow) => true,
            Some(Token::Ident(word)) => word.eq_ignore_ascii_case("implies"),
            _ => false,
        };
        if is_implies {
            self.bump();
            let rhs = self.parse_implies()?;
            return Ok(Expr::Implies(Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<Expr, DslError> {
        let mut items = vec![self.parse_and()?];
        while matches!(self.peek(), Some(Token::Ident(w)) if w.eq_ignore_ascii_case("or")) {
            self.bump();
            items.push(self.parse_and()?);
        }
        if items.len() == 1 {
            Ok(items.pop().expect("non-empty"))
        } else {
            Ok(Expr::Or(items))
        }
    }

    fn parse_and(&mut self) -> Result<Expr, DslError> {
        let mut items = vec![self.parse_unary()?];
        while matches!(self.peek(), Some(Token::Ident(w)) if w.eq_ignore_ascii_case("and")) {
            self.bump();
            items.push(self.parse_unary()?);
        }
        if items.len() == 1 {
            Ok(items.pop().expect("non-empty"))
        } else {
            Ok(Expr::And(items))
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, DslError> {
        if let Some(Token::Ident(word)) = self.peek() {
            if word.eq_ignore_ascii_case("not") && self.peek_at(1) != Some(&Token::LParen) {
                self.bump();
                let inner = self.parse_unary()?;
                return Ok(Expr::Not(Box::new(inner)));
            }
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr, DslError> {
        match self.bump() {
            Some(Token::Ident(word)) => self.parse_ident_form(word),
            Some(Token::LParen) => self.parse_paren_body(),
            Some(tok) => Err(DslError::Parse(format!("unexpected token '{tok}'"))),
            None => Err(DslError::Parse("unexpected end of input".to_string())),
        }
    }

    /// An identifier starts a boolean literal, a call-style operator, a
    /// call-style atom, or a bare 0-ary atom.
    fn parse_ident_form(&mut self, word: String) -> Result<Expr, DslError> {
        let lower = word.to_ascii_lowercase();
        if lower == "true" {
            return Ok(Expr::True);
        }
        if lower == "false" {
            return Ok(Expr::False);
        }

        let has_call = self.peek() == Some(&Token::LParen);
        if is_logical_keyword(&word) {
            if !has_call {
                return Err(DslError::Parse(format!(
                    "operator '{word}' used without operands"
                )));
            }
            self.bump(); // consume '('
            let args = self.parse_operator_call_args()?;
            return build_operator(&lower, args);
        }

        if has_call {
            self.bump(); // consume '('
            let args = self.parse_term_args_comma()?;
            return self.validated_atom(word, args);
        }

        self.validated_atom(word, Vec::new())
    }

    /// Comma-separated expression operands for `and(A, B)` style calls.
    fn parse_operator_call_args(&mut self) -> Result<Vec<Expr>, DslError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.bump();
            return Ok(args);
        }
        loop {
            args.push(self.parse_expr()?);
            match self.bump() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                Some(tok) => {
                    return Err(DslError::Parse(format!(
                        "expected ',' or ')', found '{tok}'"
                    )))
                }
                None => return Err(DslError::Parse("unclosed operator call".to_string())),
            }
        }
        Ok(args)
    }

    /// Comma-separated term arguments for `Pred(a, b)` atoms.
    fn parse_term_args_comma(&mut self) -> Result<Vec<String>, DslError> {
        let mut args = Vec::new();
        if self.peek() == Some(&Token::RParen) {
            self.bump();
            return Ok(args);
        }
        loop {
            match self.bump() {
                Some(Token::Ident(name)) => args.push(name),
                Some(Token::Number(lit)) => args.push(lit),
                Some(tok) => {
                    return Err(DslError::Parse(format!(
                        "expected argument, found '{tok}'"
                    )))
                }
                None => return Err(DslError::Parse("unclosed atom".to_string())),
            }
            match self.bump() {
                Some(Token::Comma) => continue,
                Some(Token::RParen) => break,
                Some(tok) => {
                    return Err(DslError::Parse(format!(
                        "expected ',' or ')', found '{tok}'"
                    )))
                }
                None => return Err(DslError::Parse("unclosed atom".to_string())),
            }
        }
        Ok(args)
    }

    /// Body of a parenthesized form: prefix operator, S-expression atom,
    /// or a grouped infix expression.
    fn parse_paren_body(&mut self) -> Result<Expr, DslError> {
        if let Some(Token::Ident(word)) = self.peek().cloned() {
            if is_logical_keyword(&word)
                && !word.eq_ignore_ascii_case("true")
                && !word.eq_ignore_ascii_case("false")
            {
                self.bump();
                return self.parse_prefix_operator(&word.to_ascii_lowercase());
            }
            // `(Pred arg1 arg2)`: a plain identifier followed by bare terms.
            let next_is_term = matches!(
                self.peek_at(1),
                Some(Token::Ident(w)) if !is_logical_keyword(w)
            ) || matches!(self.peek_at(1), Some(Token::Number(_)));
            if next_is_term {
                self.bump();
                let args = self.parse_term_args_space()?;
                return self.validated_atom(word, args);
            }
        }
        let inner = self.parse_expr()?;
        self.expect(&Token::RParen)?;
        Ok(inner)
    }

    /// `(and A B ...)` / `(not A)` / `(implies A B)` bodies, plus the
    /// quantified forms `(forall x BODY)` / `(exists x BODY)`. The logic
    /// is ground: a quantified variable is kept as a fresh Skolem
    /// constant name inside the body atoms.
    fn parse_prefix_operator(&mut self, op: &str) -> Result<Expr, DslError> {
        if op == "forall" || op == "exists" {
            match self.bump() {
                Some(Token::Ident(_)) => {}
                _ => {
                    return Err(DslError::Parse(format!(
                        "'{op}' requires a bound variable"
                    )))
                }
            }
        }
        let mut args = Vec::new();
        while self.peek() != Some(&Token::RParen) {
            if self.peek().is_none() {
                return Err(DslError::Parse(format!("unclosed '({op} ...' form")));
            }
            args.push(self.parse_unary()?);
        }
        self.bump(); // consume ')'
        if op == "forall" || op == "exists" {
            return build_operator("and", args);
        }
        build_operator(op, args)
    }

    /// Whitespace-separated term arguments for `(Pred a b)` atoms.
    fn parse_term_args_space(&mut self) -> Result<Vec<String>, DslError> {
        let mut args = Vec::new();
        loop {
            match self.peek() {
                Some(Token::Ident(name)) if !is_logical_keyword(name) => {
                    args.push(name.clone());
                    self.bump();
                }
                Some(Token::Number(lit)) => {
                    args.push(lit.clone());
                    self.bump();
                }
                Some(Token::RParen) => {
                    self.bump();
                    break;
                }
                Some(tok) => {
                    return Err(DslError::Parse(format!(
                        "expected argument or ')', found '{tok}'"
                    )))
                }
                None => return Err(DslError::Parse("unclosed atom".to_string())),
            }
        }
        Ok(args)
    }

    /// Resolve, validate and (in permissive mode) auto-declare an atom.
    fn validated_atom(&mut self, raw_name: String, args: Vec<String>) -> Result<Expr, DslError> {
        let canonical = self.registry.resolve_predicate(&raw_name);
        if canonical.is_empty() || is_logical_keyword(&canonical) {
            return Err(DslError::Parse(format!(
                "'{raw_name}' cannot be used as a predicate"
            )));
        }

        let declared = self
            .predicates
            .get(&canonical)
            .cloned()
            .or_else(|| self.auto_declared.get(&canonical).cloned());

        let def = match declared {
            Some(def) => def,
            None => {
                if self.mode == ParseMode::Strict {
                    return Err(DslError::UnknownPredicate(canonical));
                }
                let def = match self.registry.signature(&canonical) {
                    Some((arity, sorts)) => PredicateDef { arity, sorts },
                    None if args.is_empty() => PredicateDef::default(),
                    None => PredicateDef {
                        arity: args.len(),
                        sorts: vec!["Entity".to_string(); args.len()],
                    },
                };
                self.auto_declared.insert(canonical.clone(), def.clone());
                def
            }
        };

        if def.arity != args.len() {
            return Err(DslError::ArityMismatch {
                predicate: canonical,
                expected: def.arity,
                actual: args.len(),
            });
        }

        for (position, arg) in args.iter().enumerate() {
            let expected = def
                .sorts
                .get(position)
                .map(String::as_str)
                .unwrap_or("Entity");
            if arg.chars().next().is_some_and(|c| c.is_ascii_digit()) {
                if self.mode == ParseMode::Strict {
                    return Err(DslError::TypeMismatch {
                        predicate: canonical,
                        argument: arg.clone(),
                        expected: expected.to_string(),
                        found: "numeric literal".to_string(),
                    });
                }
                continue;
            }
            if let Some(constant) = self.constants.get(arg) {
                if !self.sort_compatible(&constant.sort, expected) {
                    return Err(DslError::TypeMismatch {
                        predicate: canonical,
                        argument: arg.clone(),
                        expected: expected.to_string(),
                        found: constant.sort.clone(),
                    });
                }
            }
            // Otherwise the argument is a fresh variable of the expected sort.
        }

        Ok(Expr::atom(canonical, args))
    }

    /// A constant of sort `actual` can fill a position of sort `expected`
    /// when the sorts match, either side is the `Entity` fallback, or
    /// `expected` is an ancestor of `actual` in the ontology tree.
    fn sort_compatible(&self, actual: &str, expected: &str) -> bool {
        if actual == expected || expected == "Entity" || actual == "Entity" {
            return true;
        }
        let mut current = self.registry.resolve_sort(actual);
        let mut hops = 0;
        while hops < 32 {
            match self.registry.parent_sort(&current) {
                Some(parent) if parent == expected => return true,
                Some(parent) => {
                    current = parent.to_string();
                    hops += 1;
                }
                None => break,
            }
        }
        false
    }
}

fn build_operator(op: &str, mut args: Vec<Expr>) -> Result<Expr, DslError> {
    match op {
        "not" => {
            if args.len() != 1 {
                return Err(DslError::Parse(format!(
                    "'not' takes exactly one operand, got {}",
                    args.len()
                )));
            }
            Ok(Expr::Not(Box::new(args.remove(0))))
        }
        "implies" => {
            if args.len() != 2 {
                return Err(DslError::Parse(format!(
                    "'implies' takes exactly two operands, got {}",
                    args.len()
                )));
            }
            let rhs = args.pop().expect("two operands");
            let lhs = args.pop().expect("two operands");
            Ok(Expr::Implies(Box::new(lhs), Box::new(rhs)))
        }
        "and" => match args.len() {
            0 => Err(DslError::Parse("'and' needs operands".to_string())),
            1 => Ok(args.remove(0)),
            _ => Ok(Expr::And(args)),
        },
        "or" => match args.len() {
            0 => Err(DslError::Parse("'or' needs operands".to_string())),
            1 => Ok(args.remove(0)),
            _ => Ok(Expr::Or(args)),
        },
        other => Err(DslError::Parse(format!("unknown operator '{other}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ontology::Ontology;

    fn registry() -> Ontology {
        Ontology::load_default().expect("embedded catalogue")
    }

    fn decls() -> (BTreeMap<String, PredicateDef>, BTreeMap<String, ConstantDef>) {
        let mut predicates = BTreeMap::new();
        predicates.insert(
            "Inadempimento".to_string(),
            PredicateDef {
                arity: 2,
                sorts: vec!["Debitore".into(), "Contratto".into()],
            },
        );
        predicates.insert("Mora".to_string(), PredicateDef { arity: 0, sorts: vec![] });
        predicates.insert("Colpa".to_string(), PredicateDef { arity: 0, sorts: vec![] });
        let mut constants = BTreeMap::new();
        constants.insert("deb".to_string(), ConstantDef { sort: "Debitore".into() });
        constants.insert("contr".to_string(), ConstantDef { sort: "Contratto".into() });
        (predicates, constants)
    }

    #[test]
    fn test_infix_precedence() {
        let (preds, consts) = decls();
        let reg = registry();
        let parser = ExpressionParser::new(&reg, ParseMode::Strict);
        let parsed = parser
            .parse("Mora and not Colpa -> Mora", &preds, &consts)
            .expect("parse");
        match parsed.expr {
            Expr::Implies(lhs, _) => match *lhs {
                Expr::And(items) => assert_eq!(items.len(), 2),
                other => panic!("expected And on the left, got {other:?}"),
            },
            other => panic!("expected Implies, got {other:?}"),
        }
    }

    #[test]
    fn test_three_surface_forms_agree() {
        let (preds, consts) = decls();
        let reg = registry();
        let parser = ExpressionParser::new(&reg, ParseMode::Strict);
        let a = parser.parse("(and Mora Colpa)", &preds, &consts).expect("prefix");
        let b = parser.parse("and(Mora, Colpa)", &preds, &consts).expect("call");
        let c = parser.parse("Mora and Colpa", &preds, &consts).expect("infix");
        assert_eq!(a.expr, b.expr);
        assert_eq!(b.expr, c.expr);
    }

    #[test]
    fn test_sexpr_atom_with_args() {
        let (preds, consts) = decls();
        let reg = registry();
        let parser = ExpressionParser::new(&reg, ParseMode::Strict);
        let parsed = parser
            .parse("(Inadempimento deb contr)", &preds, &consts)
            .expect("parse");
        assert_eq!(
            parsed.expr,
            Expr::atom("Inadempimento", vec!["deb".into(), "contr".into()])
        );
    }

    #[test]
    fn test_strict_rejects_unknown_predicate() {
        let (preds, consts) = decls();
        let reg = registry();
        let parser = ExpressionParser::new(&reg, ParseMode::Strict);
        let err = parser
            .parse("PredicatoFantasma(deb)", &preds, &consts)
            .expect_err("must fail");
        assert!(matches!(err, DslError::UnknownPredicate(_)));
    }

    #[test]
    fn test_permissive_auto_declares_from_registry() {
        let (preds, consts) = decls();
        let reg = registry();
        let parser = ExpressionParser::new(&reg, ParseMode::Permissive);
        let parsed = parser
            .parse("BuonaFede(deb)", &preds, &consts)
            .expect("parse");
        let def = parsed.auto_declared.get("BuonaFede").expect("declared");
        assert_eq!(def.arity, 1);
        assert_eq!(def.sorts, vec!["Soggetto".to_string()]);
    }

    #[test]
    fn test_permissive_placeholder_for_unknown_zero_ary() {
        let (preds, consts) = decls();
        let reg = registry();
        let parser = ExpressionParser::new(&reg, ParseMode::Permissive);
        let parsed = parser
            .parse("ClausolaSperimentale", &preds, &consts)
            .expect("parse");
        let def = parsed.auto_declared.get("ClausolaSperimentale").expect("declared");
        assert_eq!(def.arity, 0);
    }

    #[test]
    fn test_arity_mismatch() {
        let (preds, consts) = decls();
        let reg = registry();
        let parser = ExpressionParser::new(&reg, ParseMode::Strict);
        let err = parser
            .parse("Inadempimento(deb)", &preds, &consts)
            .expect_err("must fail");
        assert!(matches!(err, DslError::ArityMismatch { expected: 2, actual: 1, .. }));
    }

    #[test]
    fn test_type_mismatch_on_wrong_constant_sort() {
        let (preds, consts) = decls();
        let reg = registry();
        let parser = ExpressionParser::new(&reg, ParseMode::Strict);
        let err = parser
            .parse("Inadempimento(contr, deb)", &preds, &consts)
            .expect_err("must fail");
        assert!(matches!(err, DslError::TypeMismatch { .. }));
    }

    #[test]
    fn test_subsort_constant_is_accepted() {
        let registry = registry();
        let mut preds = BTreeMap::new();
        preds.insert(
            "CapacitaContrattuale".to_string(),
            PredicateDef { arity: 1, sorts: vec!["Soggetto".into()] },
        );
        let mut consts = BTreeMap::new();
        consts.insert("deb".to_string(), ConstantDef { sort: "Debitore".into() });
        let parser = ExpressionParser::new(&registry, ParseMode::Strict);
        // Debitore extends Soggetto, so the constant fits.
        parser
            .parse("CapacitaContrattuale(deb)", &preds, &consts)
            .expect("subsort accepted");
    }

    #[test]
    fn test_quantified_form_skolemizes_the_body() {
        let registry = registry();
        let preds = BTreeMap::new();
        let consts = BTreeMap::new();
        let parser = ExpressionParser::new(&registry, ParseMode::Permissive);
        let parsed = parser
            .parse("(exists x (BuonaFede x))", &preds, &consts)
            .expect("parse");
        assert_eq!(parsed.expr, Expr::atom("BuonaFede", vec!["x".into()]));
    }

    #[test]
    fn test_malformed_expression() {
        let (preds, consts) = decls();
        let reg = registry();
        let parser = ExpressionParser::new(&reg, ParseMode::Strict);
        assert!(parser.parse("and and", &preds, &consts).is_err());
        assert!(parser.parse("(Mora", &preds, &consts).is_err());
        assert!(parser.parse("", &preds, &consts).is_err());
    }

    #[test]
    fn test_alias_resolution_inside_parse() {
        let registry = registry();
        let preds = BTreeMap::new();
        let consts = BTreeMap::new();
        let parser = ExpressionParser::new(&registry, ParseMode::Permissive);
        let parsed = parser
            .parse("possessopacifico(tizio, fondo)", &preds, &consts)
            .expect("parse");
        match parsed.expr {
            Expr::Atom { predicate, .. } => assert_eq!(predicate, "PossessoPubblico"),
            other => panic!("expected atom, got {other:?}"),
        }
    }
}
