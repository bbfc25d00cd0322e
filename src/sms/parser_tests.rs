#![allow(clippy::unwrap_used)]

use super::*;
use rust_decimal_macros::dec;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn parser() -> SmsParser {
    SmsParser::new("ILS").unwrap()
}

// ── Provider messages ─────────────────────────────────────────

#[test]
fn test_isracard_alert() {
    let text = "בכרטיסך המסתיים ב-1234 בוצע חיוב בסך 52.90 ש״ח ב-קפה קפה";
    let c = parser().parse_at(text, false, d(2024, 5, 1));
    assert_eq!(c.provider, Provider::Isracard);
    assert_eq!(c.card_ending.as_deref(), Some("1234"));
    assert_eq!(c.amount, Some(dec!(52.90)));
    assert_eq!(c.currency, "ILS");
    assert_eq!(c.merchant_name.as_deref(), Some("קפה קפה"));
    assert_eq!(c.confidence, 90);
    assert!(c.is_valid);
    assert!(!c.date_found);
    assert_eq!(c.transaction_date, d(2024, 5, 1));
    assert_eq!(c.raw_message, text);
}

#[test]
fn test_cal_alert_with_date() {
    let text = "כאל: אושרה עסקה בסך 120.00 ש\"ח בכרטיס 5678 בשופרסל דיל בתאריך 12/03";
    let c = parser().parse_at(text, false, d(2024, 5, 1));
    assert_eq!(c.provider, Provider::Cal);
    assert_eq!(c.card_ending.as_deref(), Some("5678"));
    assert_eq!(c.amount, Some(dec!(120.00)));
    assert_eq!(c.merchant_name.as_deref(), Some("שופרסל דיל"));
    assert_eq!(c.transaction_date, d(2024, 3, 12));
    assert_eq!(c.confidence, 100);
    assert!(c.is_valid);
}

#[test]
fn test_max_alert_in_dollars() {
    let text = "max: בוצעה עסקה בכרטיס 9876 בסך $45.50 ב-AMAZON.COM בתאריך 05/02";
    let c = parser().parse_at(text, false, d(2024, 5, 1));
    assert_eq!(c.provider, Provider::Max);
    assert_eq!(c.card_ending.as_deref(), Some("9876"));
    assert_eq!(c.amount, Some(dec!(45.50)));
    assert_eq!(c.currency, "USD");
    assert_eq!(c.merchant_name.as_deref(), Some("AMAZON.COM"));
    assert_eq!(c.transaction_date, d(2024, 2, 5));
}

#[test]
fn test_max_alert_with_card_suffix_phrase() {
    let text = "max: בוצעה עסקה בכרטיס המסתיים ב-1234 בסך 50.00 ש״ח ב-שופרסל";
    let c = parser().parse_at(text, false, d(2024, 5, 1));
    assert_eq!(c.provider, Provider::Max);
    assert_eq!(c.card_ending.as_deref(), Some("1234"));
    assert_eq!(c.amount, Some(dec!(50.00)));
    assert_eq!(c.merchant_name.as_deref(), Some("שופרסל"));
}

#[test]
fn test_generic_english_alert() {
    let text = "Purchase of $12.00 at STARBUCKS on 14/06 with card ending 4321";
    let c = parser().parse_at(text, false, d(2024, 5, 1));
    assert_eq!(c.provider, Provider::Unknown);
    assert_eq!(c.card_ending.as_deref(), Some("4321"));
    assert_eq!(c.amount, Some(dec!(12.00)));
    assert_eq!(c.merchant_name.as_deref(), Some("STARBUCKS"));
    assert_eq!(c.currency, "USD");
    // June is after May, so the alert is from last year.
    assert_eq!(c.transaction_date, d(2023, 6, 14));
    assert_eq!(c.confidence, 100);
}

#[test]
fn test_amount_with_thousands_separator() {
    let text = "בכרטיסך המסתיים ב-1234 בוצע חיוב בסך 1,234.50 ש״ח ב-ארקיע";
    let c = parser().parse_at(text, false, d(2024, 5, 1));
    assert_eq!(c.amount, Some(dec!(1234.50)));
}

#[test]
fn test_explicit_year_is_kept() {
    let text = "כאל: אושרה עסקה בסך 10.00 ש\"ח בכרטיס 5678 בקיוסק בתאריך 28.12.23";
    let c = parser().parse_at(text, false, d(2024, 1, 5));
    assert_eq!(c.transaction_date, d(2023, 12, 28));
}

#[test]
fn test_year_end_backlog() {
    let text = "כאל: אושרה עסקה בסך 10.00 ש\"ח בכרטיס 5678 בקיוסק בתאריך 30/12";
    let c = parser().parse_at(text, false, d(2024, 1, 2));
    assert_eq!(c.transaction_date, d(2023, 12, 30));
}

#[test]
fn test_invalid_day_falls_back_to_today() {
    let text = "כאל: אושרה עסקה בסך 10.00 ש\"ח בכרטיס 5678 בקיוסק בתאריך 31/02";
    let c = parser().parse_at(text, false, d(2024, 5, 1));
    assert!(!c.date_found);
    assert_eq!(c.transaction_date, d(2024, 5, 1));
    assert_eq!(c.confidence, 90);
}

// ── Trigger check and thresholds ──────────────────────────────

#[test]
fn test_non_alert_rejected() {
    let c = parser().parse_at("שלום, הקוד שלך הוא 123456", false, d(2024, 5, 1));
    assert!(!c.is_valid);
    assert_eq!(c.confidence, 0);
    assert_eq!(c.provider, Provider::Unknown);
    assert!(c.amount.is_none());
}

#[test]
fn test_skip_trigger_still_needs_evidence() {
    let c = parser().parse_at("שלום, הקוד שלך הוא 123456", true, d(2024, 5, 1));
    assert!(!c.is_valid);
    assert!(c.confidence < validity_threshold(true));
}

#[test]
fn test_lower_threshold_when_provenance_known() {
    let text = "חיוב בסך 80.00 בתאריך 01/04";
    let normal = parser().parse_at(text, false, d(2024, 5, 1));
    assert_eq!(normal.confidence, 50);
    assert!(!normal.is_valid);

    let trusted = parser().parse_at(text, true, d(2024, 5, 1));
    assert_eq!(trusted.confidence, 50);
    assert!(trusted.is_valid);
}

#[test]
fn test_threshold_boundaries() {
    assert!(is_valid_confidence(70, false));
    assert!(!is_valid_confidence(69, false));
    assert!(is_valid_confidence(40, true));
    assert!(!is_valid_confidence(39, true));
}

// ── Peer payments ─────────────────────────────────────────────

#[test]
fn test_p2p_synthetic_merchant() {
    let text = "bit: חיוב בסך 75.00 ש\"ח בכרטיס 1111";
    let c = parser().parse_at(text, false, d(2024, 5, 1));
    assert_eq!(c.merchant_name.as_deref(), Some("BIT"));
    assert_eq!(c.card_ending.as_deref(), Some("1111"));
    assert_eq!(c.confidence, 90);
    assert!(c.is_valid);
}

#[test]
fn test_p2p_keyword_needs_whole_word() {
    assert_eq!(p2p_merchant("חיוב bitcoin"), None);
    assert_eq!(p2p_merchant("תשלום PayBox"), Some("PayBox".to_string()));
}

// ── Currency ──────────────────────────────────────────────────

#[test]
fn test_foreign_currency_markers() {
    assert_eq!(foreign_currency("charged 10 EUR"), Some("EUR"));
    assert_eq!(foreign_currency("חיוב 10 יורו"), Some("EUR"));
    assert_eq!(foreign_currency("£5.00"), Some("GBP"));
    assert_eq!(foreign_currency("52.90 ש״ח"), None);
    assert_eq!(foreign_currency("EUROPCAR 100 ₪"), None);
}

#[test]
fn test_local_currency_from_constructor() {
    let c = SmsParser::new("ils")
        .unwrap()
        .parse_at("חיוב בסך 10.00", false, d(2024, 5, 1));
    assert_eq!(c.currency, "ILS");
}

// ── Batch ─────────────────────────────────────────────────────

#[test]
fn test_batch_is_independent() {
    let texts = vec![
        "בכרטיסך המסתיים ב-1234 בוצע חיוב בסך 52.90 ש״ח ב-קפה קפה".to_string(),
        "הודעה רגילה".to_string(),
    ];
    let out = parser().parse_batch(&texts, false);
    assert_eq!(out.len(), 2);
    assert!(out[0].is_valid);
    assert!(!out[1].is_valid);
}

// ── Providers ─────────────────────────────────────────────────

#[test]
fn test_detect_provider() {
    assert_eq!(detect_provider("ישראכרט: חיוב"), Provider::Isracard);
    assert_eq!(detect_provider("American Express charge"), Provider::Amex);
    assert_eq!(detect_provider("Visa CAL: purchase"), Provider::Cal);
    assert_eq!(detect_provider("שלום"), Provider::Unknown);
}

#[test]
fn test_provider_names_roundtrip() {
    for p in Provider::known() {
        assert_eq!(Provider::parse(p.as_str()), *p);
    }
    assert_eq!(Provider::parse("nope"), Provider::Unknown);
}
