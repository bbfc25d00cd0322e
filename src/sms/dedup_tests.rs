#![allow(clippy::unwrap_used, clippy::panic)]

use super::*;
use crate::sms::providers::Provider;
use crate::sms::SmsParser;
use chrono::TimeZone;
use rust_decimal_macros::dec;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn at(y: i32, m: u32, day: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, day, h, min, 0).unwrap()
}

fn cafe_candidate() -> SmsCandidate {
    SmsParser::new("ILS").unwrap().parse_at(
        "בכרטיסך המסתיים ב-1234 בוצע חיוב בסך 52.90 ש״ח ב-קפה קפה בתאריך 10/03",
        false,
        d(2024, 3, 10),
    )
}

fn window() -> Duration {
    Duration::minutes(60)
}

fn created(outcome: IngestOutcome) -> (i64, i64) {
    match outcome {
        IngestOutcome::Created {
            transaction_id,
            sms_id,
        } => (transaction_id, sms_id),
        other => panic!("expected Created, got {other:?}"),
    }
}

// ── Ingest ────────────────────────────────────────────────────

#[test]
fn test_ingest_creates_provisional_pair() {
    let db = Database::open_in_memory().unwrap();
    let candidate = cafe_candidate();
    let (tx_id, sms_id) =
        created(ingest_sms(&db, 1, &candidate, at(2024, 3, 10, 12, 0), window()).unwrap());

    let txn = db.get_transaction(tx_id).unwrap().unwrap();
    assert_eq!(txn.status, TxStatus::Provisional);
    assert_eq!(txn.source, "sms");
    assert_eq!(txn.amount, dec!(-52.90));
    assert_eq!(txn.merchant_raw, "קפה קפה");
    assert_eq!(txn.sms_id, Some(sms_id));
    assert_eq!(txn.date, d(2024, 3, 10));

    let sms = db.get_sms(sms_id).unwrap().unwrap();
    assert_eq!(sms.transaction_id, tx_id);
    assert_eq!(sms.provider, Provider::Isracard.as_str());
    assert_eq!(sms.card_ending.as_deref(), Some("1234"));
    assert_eq!(sms.amount, dec!(52.90));
    assert!(!sms.cc_matched);
}

#[test]
fn test_ingest_redelivery_within_window_is_duplicate() {
    let db = Database::open_in_memory().unwrap();
    let candidate = cafe_candidate();
    let (_, sms_id) =
        created(ingest_sms(&db, 1, &candidate, at(2024, 3, 10, 12, 0), window()).unwrap());

    let again = ingest_sms(&db, 1, &candidate, at(2024, 3, 10, 12, 30), window()).unwrap();
    assert_eq!(
        again,
        IngestOutcome::Duplicate {
            existing_sms_id: sms_id
        }
    );
    assert_eq!(db.get_transaction_count(1).unwrap(), 1);
}

#[test]
fn test_ingest_same_purchase_after_window_is_new() {
    let db = Database::open_in_memory().unwrap();
    let candidate = cafe_candidate();
    ingest_sms(&db, 1, &candidate, at(2024, 3, 10, 12, 0), window()).unwrap();
    let later = ingest_sms(&db, 1, &candidate, at(2024, 3, 10, 14, 0), window()).unwrap();
    assert!(matches!(later, IngestOutcome::Created { .. }));
    assert_eq!(db.get_transaction_count(1).unwrap(), 2);
}

#[test]
fn test_ingest_other_household_not_duplicate() {
    let db = Database::open_in_memory().unwrap();
    let candidate = cafe_candidate();
    ingest_sms(&db, 1, &candidate, at(2024, 3, 10, 12, 0), window()).unwrap();
    let other = ingest_sms(&db, 2, &candidate, at(2024, 3, 10, 12, 5), window()).unwrap();
    assert!(matches!(other, IngestOutcome::Created { .. }));
}

#[test]
fn test_ingest_rejects_invalid_candidate() {
    let db = Database::open_in_memory().unwrap();
    let candidate = SmsParser::new("ILS")
        .unwrap()
        .parse_at("חיוב בסך 80.00", false, d(2024, 3, 10));
    assert!(!candidate.is_valid);
    let outcome = ingest_sms(&db, 1, &candidate, at(2024, 3, 10, 12, 0), window()).unwrap();
    assert_eq!(outcome, IngestOutcome::Rejected { confidence: 40 });
    assert_eq!(db.get_transaction_count(1).unwrap(), 0);
}

#[test]
fn test_failed_sms_insert_removes_orphan_transaction() {
    let db = Database::open_in_memory().unwrap();
    db.execute_batch(
        "CREATE TRIGGER reject_sms BEFORE INSERT ON sms_transactions
         BEGIN SELECT RAISE(ABORT, 'sms store unavailable'); END;",
    )
    .unwrap();

    let err = ingest_sms(&db, 1, &cafe_candidate(), at(2024, 3, 10, 12, 0), window()).unwrap_err();
    assert!(format!("{err:#}").contains("sms store unavailable"));
    assert_eq!(db.get_transaction_count(1).unwrap(), 0);
    assert!(db.get_household_transactions(1).unwrap().is_empty());
}

// ── Slip matching ─────────────────────────────────────────────

fn sms_fixture(card: Option<&str>, amount: Decimal, date: NaiveDate) -> SmsTransaction {
    SmsTransaction {
        id: Some(1),
        household_id: 1,
        provider: "cal".into(),
        card_ending: card.map(str::to_string),
        merchant_name: Some("שופרסל".into()),
        amount,
        currency: "ILS".into(),
        transaction_date: date,
        raw_message: String::new(),
        transaction_id: 1,
        cc_matched: false,
        cc_matched_at: None,
        received_at: "2024-03-10T10:00:00Z".into(),
    }
}

fn slip_line(amount: Decimal, date: NaiveDate, card: Option<&str>) -> SlipEvidence<'_> {
    SlipEvidence {
        date,
        amount,
        currency: "ILS",
        merchant_raw: "SHUFERSAL",
        original: None,
        card_ending: card,
        source_file: None,
        source_row: None,
    }
}

#[test]
fn test_score_sms_weights() {
    let sms = sms_fixture(Some("5678"), dec!(120), d(2024, 3, 10));
    assert_eq!(score_sms(&sms, &slip_line(dec!(-120), d(2024, 3, 10), None)), Some(80));
    assert_eq!(score_sms(&sms, &slip_line(dec!(-120), d(2024, 3, 11), None)), Some(70));
    assert_eq!(score_sms(&sms, &slip_line(dec!(-120), d(2024, 3, 10), Some("5678"))), Some(95));
    assert_eq!(score_sms(&sms, &slip_line(dec!(-120), d(2024, 3, 9), Some("5678"))), Some(85));
    assert_eq!(score_sms(&sms, &slip_line(dec!(-120), d(2024, 3, 10), Some("0000"))), None);
    assert_eq!(score_sms(&sms, &slip_line(dec!(-120), d(2024, 3, 12), None)), None);
    assert_eq!(score_sms(&sms, &slip_line(dec!(-121), d(2024, 3, 10), None)), None);
}

#[test]
fn test_score_sms_compares_currency() {
    let mut sms = sms_fixture(None, dec!(45.50), d(2024, 2, 5));
    sms.currency = "USD".into();

    // Same number in another currency is a different charge.
    assert_eq!(score_sms(&sms, &slip_line(dec!(-45.50), d(2024, 2, 5), None)), None);

    // The settled line carries the alert as its original charge.
    let mut settled = slip_line(dec!(-168.35), d(2024, 2, 5), None);
    settled.original = Some((dec!(45.50), "usd"));
    assert_eq!(score_sms(&sms, &settled), Some(80));

    settled.original = Some((dec!(45.50), "EUR"));
    assert_eq!(score_sms(&sms, &settled), None);
}

#[test]
fn test_find_sms_for_slip_threshold() {
    let db = Database::open_in_memory().unwrap();
    let candidate = cafe_candidate();
    let (_, sms_id) =
        created(ingest_sms(&db, 1, &candidate, at(2024, 3, 10, 12, 0), window()).unwrap());

    // Same day, no card on the slip: 80, accepted.
    let hit = find_sms_for_slip(&db, 1, &slip_line(dec!(-52.90), d(2024, 3, 10), None))
        .unwrap()
        .unwrap();
    assert_eq!(hit.sms.id, Some(sms_id));
    assert_eq!(hit.score, 80);

    // A day off without a card only reaches 70.
    assert!(find_sms_for_slip(&db, 1, &slip_line(dec!(-52.90), d(2024, 3, 11), None))
        .unwrap()
        .is_none());

    // A day off with the card reaches 85.
    let hit = find_sms_for_slip(&db, 1, &slip_line(dec!(-52.90), d(2024, 3, 11), Some("1234")))
        .unwrap()
        .unwrap();
    assert_eq!(hit.score, 85);

    // Wrong card never matches.
    assert!(find_sms_for_slip(&db, 1, &slip_line(dec!(-52.90), d(2024, 3, 10), Some("9999")))
        .unwrap()
        .is_none());
}

// ── Merge ─────────────────────────────────────────────────────

#[test]
fn test_better_merchant_heuristic() {
    assert_eq!(better_merchant("קפה קפה", "CAFE CAFE TLV"), "קפה קפה");
    assert_eq!(better_merchant("CAFE", "קפה קפה"), "קפה קפה");
    assert_eq!(better_merchant("AMAZON", "AMAZON MKTPLACE"), "AMAZON MKTPLACE");
    assert_eq!(better_merchant("AMAZON MKTPLACE", "AMZN"), "AMAZON MKTPLACE");
    assert_eq!(better_merchant("שופרסל", "שופרסל דיל"), "שופרסל דיל");
}

#[test]
fn test_merge_slip_keeps_category_and_confirms() {
    let db = Database::open_in_memory().unwrap();
    let candidate = cafe_candidate();
    let (tx_id, sms_id) =
        created(ingest_sms(&db, 1, &candidate, at(2024, 3, 10, 12, 0), window()).unwrap());
    db.update_transaction_category(tx_id, Some("Dining"), Some("user"), TxStatus::Provisional)
        .unwrap();

    let sms = db.get_sms(sms_id).unwrap().unwrap();
    let slip = SlipEvidence {
        date: d(2024, 3, 11),
        amount: dec!(-52.90),
        currency: "ILS",
        merchant_raw: "CAFE CAFE TEL AVIV",
        original: None,
        card_ending: None,
        source_file: Some("march.csv"),
        source_row: Some(4),
    };
    let merged = merge_slip_into_sms(&db, &sms, &slip, at(2024, 3, 12, 8, 0)).unwrap();
    assert_eq!(merged, tx_id);

    let txn = db.get_transaction(tx_id).unwrap().unwrap();
    assert_eq!(txn.status, TxStatus::Pending);
    assert_eq!(txn.date, d(2024, 3, 11));
    assert_eq!(txn.merchant_raw, "קפה קפה");
    assert_eq!(txn.category.as_deref(), Some("Dining"));
    assert_eq!(txn.category_source.as_deref(), Some("user"));
    assert_eq!(txn.source_file.as_deref(), Some("march.csv"));
    assert_eq!(txn.source_row, Some(4));
    assert!(txn.original().is_none());

    let sms = db.get_sms(sms_id).unwrap().unwrap();
    assert!(sms.cc_matched);
    assert_eq!(sms.cc_matched_at.as_deref(), Some("2024-03-12T08:00:00Z"));

    // Matched SMS rows drop out of the candidate pool.
    assert!(find_sms_for_slip(&db, 1, &slip_line(dec!(-52.90), d(2024, 3, 10), None))
        .unwrap()
        .is_none());
}

#[test]
fn test_merge_foreign_sms_records_original_charge() {
    let db = Database::open_in_memory().unwrap();
    let candidate = SmsParser::new("ILS").unwrap().parse_at(
        "max: בוצעה עסקה בכרטיס 9876 בסך $45.50 ב-AMAZON.COM בתאריך 05/02",
        false,
        d(2024, 2, 5),
    );
    let (tx_id, sms_id) =
        created(ingest_sms(&db, 1, &candidate, at(2024, 2, 5, 9, 0), window()).unwrap());
    let sms = db.get_sms(sms_id).unwrap().unwrap();

    let slip = SlipEvidence {
        date: d(2024, 2, 6),
        amount: dec!(-168.35),
        currency: "ILS",
        merchant_raw: "AMAZON MKTPLACE",
        original: None,
        card_ending: Some("9876"),
        source_file: None,
        source_row: None,
    };
    merge_slip_into_sms(&db, &sms, &slip, at(2024, 2, 7, 9, 0)).unwrap();

    let txn = db.get_transaction(tx_id).unwrap().unwrap();
    assert_eq!(txn.amount, dec!(-168.35));
    assert_eq!(txn.currency, "ILS");
    assert_eq!(txn.original(), Some((dec!(45.50), "USD")));
    assert_eq!(txn.merchant_raw, "AMAZON MKTPLACE");
}

#[test]
fn test_merge_survives_failed_sms_mark() {
    let db = Database::open_in_memory().unwrap();
    let (tx_id, sms_id) =
        created(ingest_sms(&db, 1, &cafe_candidate(), at(2024, 3, 10, 12, 0), window()).unwrap());

    // Points at an SMS row that does not exist, so marking it fails.
    let mut sms = db.get_sms(sms_id).unwrap().unwrap();
    sms.id = Some(sms_id + 100);
    let slip = SlipEvidence {
        source_file: Some("march.csv"),
        source_row: Some(2),
        ..slip_line(dec!(-52.90), d(2024, 3, 10), Some("1234"))
    };
    let merged = merge_slip_into_sms(&db, &sms, &slip, at(2024, 3, 12, 8, 0)).unwrap();
    assert_eq!(merged, tx_id);

    let txn = db.get_transaction(tx_id).unwrap().unwrap();
    assert_eq!(txn.status, TxStatus::Pending);
    assert_eq!(txn.source_file.as_deref(), Some("march.csv"));
    assert_eq!(txn.source_row, Some(2));

    let stored = db.get_sms(sms_id).unwrap().unwrap();
    assert!(!stored.cc_matched);
    assert!(stored.cc_matched_at.is_none());
}

#[test]
fn test_merge_missing_transaction_errors() {
    let db = Database::open_in_memory().unwrap();
    let mut sms = sms_fixture(None, dec!(10), d(2024, 3, 10));
    sms.transaction_id = 999;
    let slip = SlipEvidence {
        date: d(2024, 3, 10),
        amount: dec!(-10),
        currency: "ILS",
        merchant_raw: "X",
        original: None,
        card_ending: None,
        source_file: None,
        source_row: None,
    };
    assert!(merge_slip_into_sms(&db, &sms, &slip, at(2024, 3, 10, 0, 0)).is_err());
}

// ── Staleness ─────────────────────────────────────────────────

#[test]
fn test_sweep_flags_only_provisional() {
    let db = Database::open_in_memory().unwrap();
    let parser = SmsParser::new("ILS").unwrap();
    let old = parser.parse_at(
        "בכרטיסך המסתיים ב-1234 בוצע חיוב בסך 10.00 ש״ח ב-קיוסק",
        false,
        d(2024, 1, 1),
    );
    let resolved = parser.parse_at(
        "בכרטיסך המסתיים ב-1234 בוצע חיוב בסך 20.00 ש״ח ב-מאפיה",
        false,
        d(2024, 1, 2),
    );
    let fresh = parser.parse_at(
        "בכרטיסך המסתיים ב-1234 בוצע חיוב בסך 30.00 ש״ח ב-פיצה",
        false,
        d(2024, 2, 20),
    );
    let (old_tx, _) = created(ingest_sms(&db, 1, &old, at(2024, 1, 1, 9, 0), window()).unwrap());
    let (resolved_tx, _) =
        created(ingest_sms(&db, 1, &resolved, at(2024, 1, 2, 9, 0), window()).unwrap());
    let (fresh_tx, _) =
        created(ingest_sms(&db, 1, &fresh, at(2024, 2, 20, 9, 0), window()).unwrap());
    db.update_transaction_category(resolved_tx, Some("Dining"), Some("user"), TxStatus::Verified)
        .unwrap();

    let report = sweep_stale(&db, 1, Duration::days(30), at(2024, 3, 1, 0, 0)).unwrap();
    assert_eq!(report.stale.len(), 2);
    assert_eq!(report.flagged, 1);
    assert!(report.detail.contains("2 unmatched SMS"));

    let status = |id| db.get_transaction(id).unwrap().unwrap().status;
    assert_eq!(status(old_tx), TxStatus::Flagged);
    assert_eq!(status(resolved_tx), TxStatus::Verified);
    assert_eq!(status(fresh_tx), TxStatus::Provisional);

    // Re-running changes nothing further.
    let again = sweep_stale(&db, 1, Duration::days(30), at(2024, 3, 1, 0, 0)).unwrap();
    assert_eq!(again.flagged, 0);
}
