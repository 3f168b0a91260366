//! # Ontology Registry
//!
//! Canonical sorts and predicates for the Italian civil-law domain.
//! The registry is loaded once from the embedded YAML catalogue and is
//! read-only afterwards; pipeline components receive a shared handle
//! instead of reading process globals.

pub mod aliases;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use self::aliases::{MANUAL_PREDICATE_ALIASES, MANUAL_SORT_ALIASES};

/// Canonical DSL version accepted by the whole pipeline.
pub const DSL_VERSION: &str = "2.1";

/// Logical keywords that must never be treated as predicate names.
pub const LOGICAL_KEYWORDS: &[&str] = &[
    "and", "or", "not", "implies", "true", "false", "forall", "exists",
];

/// Returns true when `name` is a reserved logical keyword.
pub fn is_logical_keyword(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    LOGICAL_KEYWORDS.contains(&lower.as_str())
}

/// Declaration of a sort in the ontology tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortSpec {
    /// Parent sort; absent for roots (which resolve to `Entity`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extends: Option<String>,

    #[serde(default)]
    pub description: String,

    /// Optional enumerated values; sorts carrying them become tagged
    /// datatypes in the solver type mapper.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub values: Vec<String>,
}

/// Declaration of a predicate with its typed argument list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredicateSpec {
    /// Ordered argument sorts; arity is implied by the length.
    #[serde(default)]
    pub sorts: Vec<String>,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub synonyms: Vec<String>,
}

impl PredicateSpec {
    pub fn arity(&self) -> usize {
        self.sorts.len()
    }
}

#[derive(Debug, Deserialize)]
struct OntologyDocument {
    #[serde(default)]
    sorts: BTreeMap<String, SortSpec>,
    #[serde(default)]
    predicates: BTreeMap<String, PredicateSpec>,
}

/// Errors raised while loading the ontology catalogue.
#[derive(Error, Debug)]
pub enum OntologyError {
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Predicate '{predicate}' references undeclared sort '{sort}'")]
    UnknownArgumentSort { predicate: String, sort: String },

    #[error("Synonym '{synonym}' is declared by both '{first}' and '{second}'")]
    DuplicateSynonym {
        synonym: String,
        first: String,
        second: String,
    },
}

/// The process-wide registry of canonical sorts and predicates.
///
/// Lookups never fail loudly: unknown names are returned verbatim so the
/// guardrail (not the resolver) decides what is an error.
#[derive(Debug, Clone)]
pub struct Ontology {
    sorts: BTreeMap<String, SortSpec>,
    predicates: BTreeMap<String, PredicateSpec>,
    sort_aliases: BTreeMap<String, String>,
    predicate_aliases: BTreeMap<String, String>,
    /// Parent-resolved base sort per declared sort (inheritance flattened
    /// at load time; cycles collapse to `Entity`).
    resolved_bases: BTreeMap<String, String>,
}

const EMBEDDED_CATALOGUE: &str = include_str!("../../resources/ontology/legal_it.yaml");

impl Ontology {
    /// Load the embedded Italian civil-law catalogue.
    pub fn load_default() -> Result<Self, OntologyError> {
        Self::from_yaml(EMBEDDED_CATALOGUE)
    }

    /// Parse a YAML catalogue and build the alias maps.
    pub fn from_yaml(source: &str) -> Result<Self, OntologyError> {
        let doc: OntologyDocument = serde_yaml::from_str(source)?;

        for (name, spec) in &doc.predicates {
            for sort in &spec.sorts {
                if !doc.sorts.contains_key(sort) {
                    return Err(OntologyError::UnknownArgumentSort {
                        predicate: name.clone(),
                        sort: sort.clone(),
                    });
                }
            }
        }

        let mut sort_aliases = BTreeMap::new();
        for (name, spec) in &doc.sorts {
            sort_aliases.insert(name.to_lowercase(), name.clone());
            let desc = spec.description.trim().to_lowercase();
            if !desc.is_empty() {
                sort_aliases.insert(desc, name.clone());
            }
        }
        for (alias, canonical) in MANUAL_SORT_ALIASES {
            sort_aliases.insert((*alias).to_lowercase(), (*canonical).to_string());
        }

        let mut predicate_aliases = BTreeMap::new();
        let mut synonym_owner: BTreeMap<String, String> = BTreeMap::new();
        for (name, spec) in &doc.predicates {
            predicate_aliases.insert(name.to_lowercase(), name.clone());
            for synonym in &spec.synonyms {
                let key = synonym.trim().to_lowercase();
                if key.is_empty() {
                    continue;
                }
                if let Some(owner) = synonym_owner.get(&key) {
                    if owner != name {
                        return Err(OntologyError::DuplicateSynonym {
                            synonym: synonym.clone(),
                            first: owner.clone(),
                            second: name.clone(),
                        });
                    }
                }
                synonym_owner.insert(key.clone(), name.clone());
                predicate_aliases.insert(key, name.clone());
            }
        }
        for (alias, canonical) in MANUAL_PREDICATE_ALIASES {
            predicate_aliases.insert((*alias).to_lowercase(), (*canonical).to_string());
        }

        let resolved_bases = flatten_sort_tree(&doc.sorts);

        Ok(Ontology {
            sorts: doc.sorts,
            predicates: doc.predicates,
            sort_aliases,
            predicate_aliases,
            resolved_bases,
        })
    }

    /// Resolve a raw sort name to its canonical form.
    ///
    /// Falls back to substring heuristics for common free-text phrasings
    /// and returns the input verbatim when nothing matches.
    pub fn resolve_sort(&self, raw: &str) -> String {
        let key = raw.trim();
        if key.is_empty() {
            return "Entity".to_string();
        }
        if let Some(canonical) = self.sort_aliases.get(&key.to_lowercase()) {
            return canonical.clone();
        }
        let lowered = key.to_lowercase();
        if lowered.contains("obbligat") {
            return "Debitore".to_string();
        }
        if lowered.contains("titolare") || lowered.contains("creditor") {
            return "Creditore".to_string();
        }
        if lowered.contains("accordo") || lowered.contains("contratt") {
            return "Contratto".to_string();
        }
        key.to_string()
    }

    /// Resolve a raw predicate name to its canonical form.
    pub fn resolve_predicate(&self, raw: &str) -> String {
        let key = raw.trim();
        if key.is_empty() {
            return String::new();
        }
        self.predicate_aliases
            .get(&key.to_lowercase())
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }

    /// Canonical signature `(arity, arg_sorts)` for a predicate, if known.
    pub fn signature(&self, name: &str) -> Option<(usize, Vec<String>)> {
        let canonical = self.resolve_predicate(name);
        self.predicates
            .get(&canonical)
            .map(|spec| (spec.arity(), spec.sorts.clone()))
    }

    pub fn has_sort(&self, name: &str) -> bool {
        self.sorts.contains_key(name)
    }

    pub fn has_predicate(&self, name: &str) -> bool {
        self.predicates.contains_key(name)
    }

    pub fn sort_spec(&self, name: &str) -> Option<&SortSpec> {
        self.sorts.get(name)
    }

    pub fn predicate_spec(&self, name: &str) -> Option<&PredicateSpec> {
        self.predicates.get(name)
    }

    /// Parent sort of `name` as declared, or `None` for roots.
    pub fn parent_sort(&self, name: &str) -> Option<&str> {
        self.sorts
            .get(name)
            .and_then(|s| s.extends.as_deref())
    }

    /// Root of the inheritance chain for `name` (flattened at load time).
    pub fn base_sort(&self, name: &str) -> &str {
        self.resolved_bases
            .get(name)
            .map(String::as_str)
            .unwrap_or("Entity")
    }

    pub fn sorts(&self) -> &BTreeMap<String, SortSpec> {
        &self.sorts
    }

    pub fn predicates(&self) -> &BTreeMap<String, PredicateSpec> {
        &self.predicates
    }
}

/// Walk each inheritance chain up to its root, guarding against cycles.
fn flatten_sort_tree(sorts: &BTreeMap<String, SortSpec>) -> BTreeMap<String, String> {
    let mut resolved = BTreeMap::new();
    for name in sorts.keys() {
        let mut current = name.as_str();
        let mut hops = 0;
        loop {
            match sorts.get(current).and_then(|s| s.extends.as_deref()) {
                Some(parent) if hops < sorts.len() => {
                    current = parent;
                    hops += 1;
                }
                _ => break,
            }
        }
        let base = if hops >= sorts.len() { "Entity" } else { current };
        resolved.insert(name.clone(), base.to_string());
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Ontology {
        Ontology::load_default().expect("embedded catalogue must parse")
    }

    #[test]
    fn test_load_default_catalogue() {
        let ont = registry();
        assert!(ont.has_sort("Debitore"));
        assert!(ont.has_predicate("ResponsabilitaContrattuale"));
    }

    #[test]
    fn test_resolve_sort_alias_and_heuristics() {
        let ont = registry();
        assert_eq!(ont.resolve_sort("debitore"), "Debitore");
        assert_eq!(ont.resolve_sort("soggetto obbligato all'adempimento"), "Debitore");
        assert_eq!(ont.resolve_sort("parte titolare del credito"), "Creditore");
        assert_eq!(ont.resolve_sort("un accordo qualsiasi"), "Contratto");
        assert_eq!(ont.resolve_sort(""), "Entity");
        // Unknown names come back verbatim.
        assert_eq!(ont.resolve_sort("Astronave"), "Astronave");
    }

    #[test]
    fn test_resolve_predicate_synonyms() {
        let ont = registry();
        assert_eq!(ont.resolve_predicate("possessopacifico"), "PossessoPubblico");
        assert_eq!(ont.resolve_predicate("duratapossesso20anni"), "DurataPossesso");
        assert_eq!(ont.resolve_predicate("mancato adempimento"), "Inadempimento");
        assert_eq!(ont.resolve_predicate("Sconosciuto"), "Sconosciuto");
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let ont = registry();
        for raw in ["possessopacifico", "Debitore", "NonEsiste"] {
            let once = ont.resolve_predicate(raw);
            assert_eq!(ont.resolve_predicate(&once), once);
        }
        for raw in ["soggetto debitore", "Contratto", "NonEsiste"] {
            let once = ont.resolve_sort(raw);
            assert_eq!(ont.resolve_sort(&once), once);
        }
    }

    #[test]
    fn test_signature_lookup() {
        let ont = registry();
        let (arity, sorts) = ont.signature("ResponsabilitaContrattuale").expect("known");
        assert_eq!(arity, 3);
        assert_eq!(sorts, vec!["Debitore", "Creditore", "Contratto"]);
        assert!(ont.signature("Inesistente").is_none());
    }

    #[test]
    fn test_base_sort_flattening() {
        let ont = registry();
        // Professionista extends Debitore extends Soggetto.
        assert_eq!(ont.base_sort("Professionista"), "Soggetto");
        assert_eq!(ont.base_sort("Entity"), "Entity");
        assert_eq!(ont.base_sort("MaiVisto"), "Entity");
    }
}
