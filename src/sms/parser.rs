use anyhow::{Context, Result};
use chrono::{Datelike, Local, NaiveDate};
use regex::{Captures, Regex};
use rust_decimal::Decimal;
use std::str::FromStr;

use super::providers::{
    detect_provider, expand, Provider, GENERIC_AMOUNT, GENERIC_CARD, GENERIC_DATE,
    GENERIC_MERCHANT,
};

const CARD_WEIGHT: u8 = 30;
const AMOUNT_WEIGHT: u8 = 40;
const MERCHANT_WEIGHT: u8 = 20;
const DATE_WEIGHT: u8 = 10;

const TRIGGERED_THRESHOLD: u8 = 70;
const TRUSTED_THRESHOLD: u8 = 40;

/// Phrases that mark a text as a card alert (compared lowercase).
const TRIGGERS: &[&str] = &[
    "חיוב",
    "עסקה",
    "עסקת",
    "רכישה",
    "בכרטיס",
    "אושרה",
    "בוצע",
    "purchase",
    "charged",
    "charge of",
    "transaction",
    "card ending",
];

/// Foreign currency markers, checked in order. Symbols and Hebrew names are
/// matched as substrings, ISO codes as whole tokens.
const FOREIGN_MARKERS: &[(&str, &[&str])] = &[
    ("USD", &["$", "דולר"]),
    ("EUR", &["€", "יורו"]),
    ("GBP", &["£", "ליש\"ט", "פאונד"]),
];

/// Peer-payment brands that stand in for a merchant name.
const P2P_MERCHANTS: &[(&[&str], &str)] = &[
    (&["ביט", "bit"], "BIT"),
    (&["פייבוקס", "paybox"], "PayBox"),
    (&["פפר", "pepper"], "Pepper Pay"),
];

/// Structured reading of one SMS.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SmsCandidate {
    pub(crate) is_valid: bool,
    pub(crate) card_ending: Option<String>,
    pub(crate) merchant_name: Option<String>,
    pub(crate) amount: Option<Decimal>,
    pub(crate) currency: String,
    pub(crate) transaction_date: NaiveDate,
    pub(crate) date_found: bool,
    pub(crate) provider: Provider,
    pub(crate) confidence: u8,
    pub(crate) raw_message: String,
}

/// Minimum confidence for a candidate to count as a transaction.
pub(crate) fn validity_threshold(skip_trigger_check: bool) -> u8 {
    if skip_trigger_check {
        TRUSTED_THRESHOLD
    } else {
        TRIGGERED_THRESHOLD
    }
}

pub(crate) fn is_valid_confidence(confidence: u8, skip_trigger_check: bool) -> bool {
    confidence >= validity_threshold(skip_trigger_check)
}

struct ProviderRules {
    provider: Provider,
    card: Option<Regex>,
    amount: Option<Regex>,
    merchant: Option<Regex>,
    date: Option<Regex>,
}

pub(crate) struct SmsParser {
    local_currency: String,
    providers: Vec<ProviderRules>,
    card: Vec<Regex>,
    amount: Vec<Regex>,
    merchant: Vec<Regex>,
    date: Vec<Regex>,
}

fn compile(pattern: &str) -> Result<Regex> {
    let expanded = expand(pattern);
    Regex::new(&expanded).with_context(|| format!("Invalid SMS pattern: {pattern}"))
}

fn compile_opt(pattern: Option<&str>) -> Result<Option<Regex>> {
    pattern.map(compile).transpose()
}

fn compile_all(patterns: &[&str]) -> Result<Vec<Regex>> {
    patterns.iter().map(|p| compile(p)).collect()
}

/// First provider hit, else the first generic hit.
fn first_match<'t>(
    specific: Option<&Regex>,
    fallbacks: &[Regex],
    text: &'t str,
) -> Option<Captures<'t>> {
    specific
        .into_iter()
        .chain(fallbacks.iter())
        .find_map(|re| re.captures(text))
}

impl SmsParser {
    pub(crate) fn new(local_currency: &str) -> Result<Self> {
        let providers = Provider::known()
            .iter()
            .map(|&provider| {
                let p = provider.patterns();
                Ok(ProviderRules {
                    provider,
                    card: compile_opt(p.card)?,
                    amount: compile_opt(p.amount)?,
                    merchant: compile_opt(p.merchant)?,
                    date: compile_opt(p.date)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            local_currency: local_currency.to_uppercase(),
            providers,
            card: compile_all(GENERIC_CARD)?,
            amount: compile_all(GENERIC_AMOUNT)?,
            merchant: compile_all(GENERIC_MERCHANT)?,
            date: compile_all(GENERIC_DATE)?,
        })
    }

    pub(crate) fn parse(&self, text: &str, skip_trigger_check: bool) -> SmsCandidate {
        self.parse_at(text, skip_trigger_check, Local::now().date_naive())
    }

    pub(crate) fn parse_batch(&self, texts: &[String], skip_trigger_check: bool) -> Vec<SmsCandidate> {
        let today = Local::now().date_naive();
        texts
            .iter()
            .map(|t| self.parse_at(t, skip_trigger_check, today))
            .collect()
    }

    /// Parse against a fixed "today", used for year inference and as the
    /// fallback purchase date.
    pub(crate) fn parse_at(
        &self,
        text: &str,
        skip_trigger_check: bool,
        today: NaiveDate,
    ) -> SmsCandidate {
        let mut candidate = SmsCandidate {
            is_valid: false,
            card_ending: None,
            merchant_name: None,
            amount: None,
            currency: self.local_currency.clone(),
            transaction_date: today,
            date_found: false,
            provider: Provider::Unknown,
            confidence: 0,
            raw_message: text.to_string(),
        };

        if !skip_trigger_check && !has_trigger(text) {
            return candidate;
        }

        candidate.provider = detect_provider(text);
        let rules = self.providers.iter().find(|r| r.provider == candidate.provider);

        candidate.card_ending = first_match(rules.and_then(|r| r.card.as_ref()), &self.card, text)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string());

        candidate.amount =
            first_match(rules.and_then(|r| r.amount.as_ref()), &self.amount, text)
                .and_then(|c| c.get(1))
                .and_then(|m| parse_amount(m.as_str()));

        candidate.merchant_name =
            first_match(rules.and_then(|r| r.merchant.as_ref()), &self.merchant, text)
                .and_then(|c| c.get(1))
                .and_then(|m| clean_merchant(m.as_str()))
                .or_else(|| p2p_merchant(text));

        if let Some(date) = first_match(rules.and_then(|r| r.date.as_ref()), &self.date, text)
            .and_then(|c| date_from_captures(&c, today))
        {
            candidate.transaction_date = date;
            candidate.date_found = true;
        }

        if let Some(currency) = foreign_currency(text) {
            candidate.currency = currency.to_string();
        }

        candidate.confidence = score(&candidate);
        candidate.is_valid = is_valid_confidence(candidate.confidence, skip_trigger_check);
        candidate
    }
}

fn has_trigger(text: &str) -> bool {
    let lower = text.to_lowercase();
    TRIGGERS.iter().any(|t| lower.contains(t))
}

fn score(c: &SmsCandidate) -> u8 {
    let mut total = 0;
    if c.card_ending.is_some() {
        total += CARD_WEIGHT;
    }
    if c.amount.is_some() {
        total += AMOUNT_WEIGHT;
    }
    if c.merchant_name.is_some() {
        total += MERCHANT_WEIGHT;
    }
    if c.date_found {
        total += DATE_WEIGHT;
    }
    total
}

fn parse_amount(raw: &str) -> Option<Decimal> {
    let cleaned = raw.replace(',', "");
    Decimal::from_str(cleaned.trim()).ok()
}

fn clean_merchant(raw: &str) -> Option<String> {
    let trimmed = raw
        .trim()
        .trim_end_matches(|c: char| c == '.' || c == ':' || c == '-')
        .trim();
    if trimmed.is_empty() || trimmed.chars().all(|c| c.is_ascii_digit() || c.is_whitespace()) {
        return None;
    }
    Some(trimmed.to_string())
}

/// Whole-word, case-insensitive match, so "bit" never hits "bitcoin".
fn has_token(text: &str, token: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric())
        .any(|w| w.eq_ignore_ascii_case(token))
}

fn p2p_merchant(text: &str) -> Option<String> {
    P2P_MERCHANTS.iter().find_map(|(keywords, name)| {
        keywords
            .iter()
            .any(|k| has_token(text, k))
            .then(|| name.to_string())
    })
}

fn foreign_currency(text: &str) -> Option<&'static str> {
    FOREIGN_MARKERS.iter().find_map(|&(code, markers)| {
        let hit = has_token(text, code) || markers.iter().any(|m| text.contains(m));
        hit.then_some(code)
    })
}

/// Day and month with an optional year. Without a year, a month later than
/// the current one belongs to last year.
fn date_from_captures(caps: &Captures<'_>, today: NaiveDate) -> Option<NaiveDate> {
    let day: u32 = caps.get(1)?.as_str().parse().ok()?;
    let month: u32 = caps.get(2)?.as_str().parse().ok()?;
    let year = match caps.get(3) {
        Some(y) => {
            let y: i32 = y.as_str().parse().ok()?;
            if y < 100 {
                2000 + y
            } else {
                y
            }
        }
        None if month > today.month() => today.year() - 1,
        None => today.year(),
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
