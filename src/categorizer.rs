use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

use crate::error::{Result, WealthError};
use crate::models::{CategoryId, CATEGORIES};

/// Normalised alias → category. Keys are compared after `normalize_label`.
pub const CATEGORY_ALIASES: &[(&str, CategoryId)] = &[
    ("real estate", CategoryId::RealEstate),
    ("property", CategoryId::RealEstate),
    ("immobiliare", CategoryId::RealEstate),
    ("immobili", CategoryId::RealEstate),
    ("growth investments", CategoryId::GrowthInvestments),
    ("growth", CategoryId::GrowthInvestments),
    ("equities growth", CategoryId::GrowthInvestments),
    ("stocks growth", CategoryId::GrowthInvestments),
    ("azioni", CategoryId::GrowthInvestments),
    ("luxury assets", CategoryId::LuxuryAssets),
    ("luxury", CategoryId::LuxuryAssets),
    ("collectibles", CategoryId::LuxuryAssets),
    ("art", CategoryId::LuxuryAssets),
    ("watch", CategoryId::LuxuryAssets),
    ("watches", CategoryId::LuxuryAssets),
    ("lusso", CategoryId::LuxuryAssets),
    ("dividend investments", CategoryId::DividendInvestments),
    ("dividends", CategoryId::DividendInvestments),
    ("high dividend", CategoryId::DividendInvestments),
    ("dividendi", CategoryId::DividendInvestments),
    ("fixed income", CategoryId::FixedIncome),
    ("bonds", CategoryId::FixedIncome),
    ("treasuries", CategoryId::FixedIncome),
    ("etf bond", CategoryId::FixedIncome),
    ("obbligazioni", CategoryId::FixedIncome),
    ("reddito fisso", CategoryId::FixedIncome),
    ("alternatives", CategoryId::Alternatives),
    ("crypto", CategoryId::Alternatives),
    ("private equity", CategoryId::Alternatives),
    ("venture", CategoryId::Alternatives),
    ("hedge fund", CategoryId::Alternatives),
    ("cripto", CategoryId::Alternatives),
];

pub fn strip_diacritics(input: &str) -> String {
    input.nfd().filter(|c| !is_combining_mark(*c)).collect()
}

/// Trim, lowercase, strip accents, collapse runs of whitespace.
pub fn normalize_label(input: &str) -> String {
    strip_diacritics(&input.to_lowercase())
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Pure lookup: official label (with or without emoji), id, then alias table.
pub fn lookup(raw: &str) -> Option<CategoryId> {
    let norm = normalize_label(raw);
    if norm.is_empty() {
        return None;
    }
    for def in &CATEGORIES {
        let label = normalize_label(def.label);
        let with_emoji = normalize_label(&format!("{} {}", def.emoji, def.label));
        if norm == label || norm == with_emoji || norm == def.id.key() {
            return Some(def.id);
        }
    }
    CATEGORY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == norm)
        .map(|(_, id)| *id)
}

/// Maps free-text labels onto the six categories and remembers what it
/// could not place.
#[derive(Debug, Default)]
pub struct Classifier {
    strict: bool,
    unmapped: Vec<String>,
    fallback_count: usize,
}

impl Classifier {
    pub fn new(strict: bool) -> Self {
        Self {
            strict,
            ..Self::default()
        }
    }

    pub fn classify(&mut self, raw: &str) -> Result<CategoryId> {
        if let Some(id) = lookup(raw) {
            return Ok(id);
        }
        if self.strict {
            return Err(WealthError::UnknownCategory(raw.trim().to_string()));
        }
        self.fallback_count += 1;
        let label = raw.trim();
        if !label.is_empty() && !self.unmapped.iter().any(|l| l == label) {
            tracing::debug!(label, "category mapped to fallback");
            self.unmapped.push(label.to_string());
        }
        Ok(CategoryId::FALLBACK)
    }

    /// Distinct unmapped labels in first-seen order.
    pub fn unmapped(&self) -> &[String] {
        &self.unmapped
    }

    pub fn fallback_count(&self) -> usize {
        self.fallback_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_labels_map_to_own_id() {
        let mut c = Classifier::new(true);
        for def in &CATEGORIES {
            assert_eq!(c.classify(def.label).unwrap(), def.id);
            assert_eq!(c.classify(&format!("{} {}", def.emoji, def.label)).unwrap(), def.id);
            assert_eq!(c.classify(def.id.title()).unwrap(), def.id);
            assert_eq!(c.classify(def.id.key()).unwrap(), def.id);
        }
    }

    #[test]
    fn test_every_alias_resolves() {
        let mut c = Classifier::new(true);
        for (alias, id) in CATEGORY_ALIASES {
            assert_eq!(c.classify(alias).unwrap(), *id, "{alias}");
            assert_eq!(c.classify(&alias.to_uppercase()).unwrap(), *id, "{alias}");
        }
    }

    #[test]
    fn test_alias_keys_are_normalized() {
        for (alias, _) in CATEGORY_ALIASES {
            assert_eq!(normalize_label(alias), *alias);
        }
    }

    #[test]
    fn test_classification_is_idempotent() {
        let mut c = Classifier::new(false);
        for label in ["Bonds", "N26", "  Real   Estate ", "Crypto", ""] {
            let first = c.classify(label).unwrap();
            let second = c.classify(label).unwrap();
            assert_eq!(first, second);
            assert_eq!(c.classify(first.key()).unwrap(), first);
        }
    }

    #[test]
    fn test_normalization_handles_accents_and_spacing() {
        assert_eq!(normalize_label("  Réal\t\tEstàte "), "real estate");
        assert_eq!(lookup("IMMOBILIARE"), Some(CategoryId::RealEstate));
        assert_eq!(lookup("Obbligazióni"), Some(CategoryId::FixedIncome));
        assert_eq!(lookup("hedge   fund"), Some(CategoryId::Alternatives));
    }

    #[test]
    fn test_lenient_fallback_records_unmapped() {
        let mut c = Classifier::new(false);
        assert_eq!(c.classify("N26").unwrap(), CategoryId::Alternatives);
        assert_eq!(c.classify("Revolut").unwrap(), CategoryId::Alternatives);
        assert_eq!(c.classify("N26").unwrap(), CategoryId::Alternatives);
        assert_eq!(c.classify("").unwrap(), CategoryId::Alternatives);
        assert_eq!(c.unmapped(), &["N26".to_string(), "Revolut".to_string()]);
        assert_eq!(c.fallback_count(), 4);
    }

    #[test]
    fn test_known_labels_are_not_recorded() {
        let mut c = Classifier::new(false);
        c.classify("Crypto").unwrap();
        assert!(c.unmapped().is_empty());
        assert_eq!(c.fallback_count(), 0);
    }

    #[test]
    fn test_strict_mode_rejects_unknown() {
        let mut c = Classifier::new(true);
        match c.classify(" Mystery ") {
            Err(WealthError::UnknownCategory(label)) => assert_eq!(label, "Mystery"),
            other => panic!("expected UnknownCategory, got {other:?}"),
        }
    }
}
