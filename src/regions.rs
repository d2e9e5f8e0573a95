//! Canonical region codes (Brazilian federative units) and the diacritic-tolerant
//! name lookup used to key datasets that only carry full region names.

use crate::error::{PipelineError, Result};
use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// The closed set of valid two-letter codes.
pub const VALID_CODES: [&str; 27] = [
    "AC", "AL", "AP", "AM", "BA", "CE", "DF", "ES", "GO", "MA", "MT", "MS", "MG", "PA", "PB",
    "PR", "PE", "PI", "RJ", "RN", "RS", "RO", "RR", "SC", "SP", "SE", "TO",
];

/// Full region names. Spelling variants without accents are covered by folding.
const REGION_NAMES: [(&str, &str); 27] = [
    // Norte
    ("Acre", "AC"),
    ("Amapá", "AP"),
    ("Amazonas", "AM"),
    ("Pará", "PA"),
    ("Rondônia", "RO"),
    ("Roraima", "RR"),
    ("Tocantins", "TO"),
    // Nordeste
    ("Alagoas", "AL"),
    ("Bahia", "BA"),
    ("Ceará", "CE"),
    ("Maranhão", "MA"),
    ("Paraíba", "PB"),
    ("Pernambuco", "PE"),
    ("Piauí", "PI"),
    ("Rio Grande do Norte", "RN"),
    ("Sergipe", "SE"),
    // Centro-Oeste
    ("Distrito Federal", "DF"),
    ("Goiás", "GO"),
    ("Mato Grosso", "MT"),
    ("Mato Grosso do Sul", "MS"),
    // Sudeste
    ("Espírito Santo", "ES"),
    ("Minas Gerais", "MG"),
    ("Rio de Janeiro", "RJ"),
    ("São Paulo", "SP"),
    // Sul
    ("Paraná", "PR"),
    ("Rio Grande do Sul", "RS"),
    ("Santa Catarina", "SC"),
];

static NAME_INDEX: Lazy<HashMap<String, &'static str>> = Lazy::new(|| {
    REGION_NAMES
        .iter()
        .map(|(name, code)| (fold_name(name), *code))
        .collect()
});

/// A validated two-letter region code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct RegionCode(&'static str);

impl RegionCode {
    /// Canonicalizes (trim + uppercase) and accepts only members of [`VALID_CODES`].
    pub fn parse(raw: &str) -> Option<Self> {
        let canonical = raw.trim().to_uppercase();
        VALID_CODES
            .into_iter()
            .find(|code| *code == canonical)
            .map(RegionCode)
    }

    /// Looks up a full region name, ignoring case, accents and extra whitespace.
    pub fn from_name(name: &str) -> Option<Self> {
        NAME_INDEX.get(&fold_name(name)).map(|code| RegionCode(*code))
    }

    pub fn as_str(&self) -> &'static str {
        self.0
    }

    pub fn all() -> impl Iterator<Item = RegionCode> {
        VALID_CODES.into_iter().map(RegionCode)
    }
}

impl fmt::Display for RegionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.0)
    }
}

/// Lowercase, strip combining marks after NFD decomposition, collapse whitespace.
pub fn fold_name(name: &str) -> String {
    let stripped: String = name
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Boot-time self-check of the name table against the valid-code set.
pub fn verify_region_table() -> Result<()> {
    let valid: HashSet<&str> = VALID_CODES.iter().copied().collect();
    if valid.len() != VALID_CODES.len() {
        return Err(PipelineError::RegionTable(
            "duplicate entries in the valid code list".into(),
        ));
    }

    let mut seen: HashMap<String, &str> = HashMap::new();
    for (name, code) in REGION_NAMES.iter() {
        if !valid.contains(code) {
            return Err(PipelineError::RegionTable(format!(
                "name '{}' maps to unknown code '{}'",
                name, code
            )));
        }
        if let Some(previous) = seen.insert(fold_name(name), *code) {
            if previous != *code {
                return Err(PipelineError::RegionTable(format!(
                    "name '{}' folds onto both {} and {}",
                    name, previous, code
                )));
            }
        }
    }

    let covered: HashSet<&str> = seen.values().copied().collect();
    let mut missing: Vec<&str> = valid.difference(&covered).copied().collect();
    if !missing.is_empty() {
        missing.sort_unstable();
        return Err(PipelineError::RegionTable(format!(
            "codes without a name: {}",
            missing.join(", ")
        )));
    }
    Ok(())
}
