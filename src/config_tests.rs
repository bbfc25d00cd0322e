#![allow(clippy::unwrap_used)]

use super::*;
use rust_decimal_macros::dec;
use std::io::Write;

#[test]
fn test_defaults() {
    let s = Settings::default();
    assert_eq!(s.local_currency, "ILS");
    assert_eq!(s.stale_sms_days, 30);
    assert_eq!(s.sms_duplicate_window_minutes, 60);
    assert_eq!(s.fx_bands["USD"], FxBand::new(dec!(3.4), dec!(4.0)));
}

#[test]
fn test_empty_toml_gives_defaults() {
    let s = Settings::from_toml("").unwrap();
    assert_eq!(s.local_currency, "ILS");
    assert_eq!(s.default_household, 1);
    assert!(s.fx_bands.contains_key("EUR"));
}

#[test]
fn test_partial_toml_merges_with_defaults() {
    let s = Settings::from_toml("local_currency = \"usd\"\nstale_sms_days = 14\n").unwrap();
    assert_eq!(s.local_currency, "USD");
    assert_eq!(s.stale_sms_days, 14);
    assert_eq!(s.rate_timeout_ms, 2000);
    assert_eq!(s.classifier_timeout_ms, 30_000);
}

#[test]
fn test_fx_band_table_replaces_defaults() {
    let toml = r#"
[fx_bands.usd]
min = 3.2
max = 3.9
"#;
    let s = Settings::from_toml(toml).unwrap();
    assert_eq!(s.fx_bands.len(), 1);
    assert_eq!(s.fx_bands["USD"], FxBand::new(dec!(3.2), dec!(3.9)));
    let bands = s.fx_bands();
    assert_eq!(bands.local_currency(), "ILS");
    assert!(bands.band_for("usd").is_some());
}

#[test]
fn test_inverted_band_rejected() {
    let toml = "[fx_bands.USD]\nmin = 4.0\nmax = 3.0\n";
    assert!(Settings::from_toml(toml).is_err());
}

#[test]
fn test_unknown_field_rejected() {
    assert!(Settings::from_toml("colour = \"blue\"").is_err());
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"default_household = 7\n").unwrap();
    let s = Settings::load_from_file(file.path()).unwrap();
    assert_eq!(s.default_household, 7);
}

#[test]
fn test_explicit_database_path() {
    let s = Settings::from_toml("database_path = \"/tmp/ledger.db\"").unwrap();
    assert_eq!(s.database_path().unwrap(), PathBuf::from("/tmp/ledger.db"));
}

#[test]
fn test_category_rules() {
    let toml = r#"
[[category_rules]]
pattern = "shufersal"
category = "Groceries"

[[category_rules]]
pattern = "^(PAZ|DELEK)"
category = "Fuel"
is_regex = true
"#;
    let s = Settings::from_toml(toml).unwrap();
    assert_eq!(
        s.category_rules,
        vec![
            CategoryRule::contains("shufersal", "Groceries"),
            CategoryRule::regex("^(PAZ|DELEK)", "Fuel"),
        ]
    );
}

#[test]
fn test_fx_rates_keys_uppercased() {
    let s = Settings::from_toml("[fx_rates]\nusd = 3.65\n").unwrap();
    assert_eq!(s.fx_rates["USD"], dec!(3.65));
}
