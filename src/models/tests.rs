#![allow(clippy::unwrap_used)]

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::*;

// ── Transaction ───────────────────────────────────────────────

fn make_txn(amount: Decimal) -> Transaction {
    Transaction::new(
        1,
        NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        amount,
        "ILS".into(),
        "SHUFERSAL DEAL".into(),
        "cc_slip".into(),
    )
}

#[test]
fn test_new_expense_defaults() {
    let txn = make_txn(dec!(-50.00));
    assert!(txn.id.is_none());
    assert_eq!(txn.tx_type, TxType::Expense);
    assert_eq!(txn.status, TxStatus::Pending);
    assert!(!txn.is_duplicate);
    assert!(txn.duplicate_of.is_none());
    assert!(!txn.created_at.is_empty());
}

#[test]
fn test_new_income_type() {
    let txn = make_txn(dec!(1200));
    assert_eq!(txn.tx_type, TxType::Income);
    assert!(!txn.is_expense());
}

#[test]
fn test_abs_amount() {
    assert_eq!(make_txn(dec!(-42.99)).abs_amount(), dec!(42.99));
    assert_eq!(make_txn(dec!(42.99)).abs_amount(), dec!(42.99));
    assert_eq!(make_txn(Decimal::ZERO).abs_amount(), Decimal::ZERO);
}

#[test]
fn test_display_merchant_prefers_normalized() {
    let mut txn = make_txn(dec!(-10));
    assert_eq!(txn.display_merchant(), "SHUFERSAL DEAL");
    txn.merchant_normalized = Some("Shufersal".into());
    assert_eq!(txn.display_merchant(), "Shufersal");
    txn.merchant_normalized = Some("   ".into());
    assert_eq!(txn.display_merchant(), "SHUFERSAL DEAL");
}

#[test]
fn test_original_requires_both_fields() {
    let mut txn = make_txn(dec!(-74));
    assert!(txn.original().is_none());
    txn.original_amount = Some(dec!(20));
    assert!(txn.original().is_none());
    txn.original_currency = Some("USD".into());
    assert_eq!(txn.original(), Some((dec!(20), "USD")));
}

// ── TxStatus / TxType ─────────────────────────────────────────

#[test]
fn test_status_roundtrip() {
    for s in TxStatus::all() {
        assert_eq!(TxStatus::parse(s.as_str()), *s, "Roundtrip failed for {s}");
    }
}

#[test]
fn test_status_unknown_is_pending() {
    assert_eq!(TxStatus::parse("whatever"), TxStatus::Pending);
}

#[test]
fn test_type_parse() {
    assert_eq!(TxType::parse("EXPENSE"), TxType::Expense);
    assert_eq!(TxType::parse("income"), TxType::Income);
    assert_eq!(TxType::parse("credit"), TxType::Income);
    assert_eq!(TxType::parse("transfer"), TxType::Transfer);
    assert_eq!(TxType::parse(""), TxType::Expense);
}

// ── Receipt ───────────────────────────────────────────────────

#[test]
fn test_receipt_new_is_unmatched() {
    let r = EmailReceipt::new(
        1,
        "Wolt".into(),
        dec!(89.90),
        "ILS".into(),
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
    );
    assert!(!r.is_matched());
    assert!(r.items.is_empty());
}

// ── Category / MerchantMemory ─────────────────────────────────

#[test]
fn test_category_find_by_name() {
    let cats = vec![Category::new("Groceries".into()), Category::new("Dining".into())];
    assert_eq!(Category::find_by_name(&cats, "groceries").unwrap().name, "Groceries");
    assert!(Category::find_by_name(&cats, "Fuel").is_none());
}

#[test]
fn test_memory_key_normalizes() {
    assert_eq!(MerchantMemory::key("  SHUFERSAL #123 Deal "), "shufersal deal");
    assert_eq!(MerchantMemory::key("קפה  קפה"), "קפה קפה");
}

#[test]
fn test_memory_lookup() {
    let mut memory = MerchantMemory::new();
    assert!(memory.is_empty());
    memory.insert("Shufersal Deal 42", "Groceries".into());
    assert_eq!(memory.lookup("SHUFERSAL DEAL"), Some("Groceries"));
    assert_eq!(memory.lookup("Rami Levy"), None);
    assert_eq!(memory.len(), 1);
}

#[test]
fn test_timestamp_fixed_width() {
    let a = chrono::DateTime::parse_from_rfc3339("2024-01-02T03:04:05.678Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    assert_eq!(timestamp(a), "2024-01-02T03:04:05Z");
}
