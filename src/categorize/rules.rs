use anyhow::Result;
use regex::Regex;
use serde::Deserialize;
use tracing::warn;

use super::{CategoryClassifier, Classification, ClassifyRequest};
use crate::models::{Category, MerchantMemory};

/// Confidence reported for a rule hit.
const RULE_CONFIDENCE: u8 = 90;

/// A merchant pattern mapped to a category, read from settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub(crate) struct CategoryRule {
    pub(crate) pattern: String,
    pub(crate) category: String,
    #[serde(default)]
    pub(crate) is_regex: bool,
}

#[cfg(test)]
impl CategoryRule {
    pub(crate) fn contains(pattern: &str, category: &str) -> Self {
        Self {
            pattern: pattern.into(),
            category: category.into(),
            is_regex: false,
        }
    }

    pub(crate) fn regex(pattern: &str, category: &str) -> Self {
        Self {
            pattern: pattern.into(),
            category: category.into(),
            is_regex: true,
        }
    }
}

/// Offline classifier: the first matching rule decides.
pub(crate) struct RuleClassifier {
    rules: Vec<CompiledRule>,
}

struct CompiledRule {
    pattern: String,
    regex: Option<Regex>,
    category: String,
    is_regex: bool,
}

impl RuleClassifier {
    pub(crate) fn new(rules: &[CategoryRule]) -> Self {
        let compiled = rules
            .iter()
            .map(|r| {
                let regex = if r.is_regex {
                    match Regex::new(&r.pattern) {
                        Ok(re) => Some(re),
                        Err(e) => {
                            warn!(pattern = %r.pattern, "Ignoring invalid category rule: {e}");
                            None
                        }
                    }
                } else {
                    None
                };
                CompiledRule {
                    pattern: r.pattern.to_lowercase(),
                    regex,
                    category: r.category.clone(),
                    is_regex: r.is_regex,
                }
            })
            .collect();

        Self { rules: compiled }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub(crate) fn categorize(&self, merchant: &str) -> Option<&str> {
        let lower = merchant.to_lowercase();

        for rule in &self.rules {
            let matched = if rule.is_regex {
                rule.regex.as_ref().is_some_and(|re| re.is_match(merchant))
            } else {
                lower.contains(&rule.pattern)
            };

            if matched {
                return Some(&rule.category);
            }
        }

        None
    }
}

impl CategoryClassifier for RuleClassifier {
    fn classify(
        &self,
        batch: &[ClassifyRequest],
        _memory: &MerchantMemory,
        _vocabulary: &[Category],
    ) -> Result<Vec<Classification>> {
        Ok(batch
            .iter()
            .map(|req| match self.categorize(&req.merchant_raw) {
                Some(category) => Classification {
                    id: req.id,
                    category: Some(category.to_string()),
                    merchant_normalized: None,
                    confidence: RULE_CONFIDENCE,
                    suggestions: Vec::new(),
                },
                None => Classification {
                    id: req.id,
                    category: None,
                    merchant_normalized: None,
                    confidence: 0,
                    suggestions: Vec::new(),
                },
            })
            .collect())
    }
}
