pub(crate) const SCHEMA_V1: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS categories (
    id    INTEGER PRIMARY KEY AUTOINCREMENT,
    name  TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS transactions (
    id                   INTEGER PRIMARY KEY AUTOINCREMENT,
    household_id         INTEGER NOT NULL,
    date                 TEXT NOT NULL,
    amount               TEXT NOT NULL,
    currency             TEXT NOT NULL,
    original_amount      TEXT,
    original_currency    TEXT,
    merchant_raw         TEXT NOT NULL DEFAULT '',
    merchant_normalized  TEXT,
    category             TEXT,
    category_source      TEXT,
    status               TEXT NOT NULL DEFAULT 'pending',
    tx_type              TEXT NOT NULL DEFAULT 'expense',
    source               TEXT NOT NULL DEFAULT '',
    notes                TEXT NOT NULL DEFAULT '',
    is_duplicate         BOOLEAN NOT NULL DEFAULT 0,
    duplicate_of         INTEGER REFERENCES transactions(id),
    sms_id               INTEGER,
    receipt_id           INTEGER,
    source_file          TEXT,
    source_row           INTEGER,
    created_at           TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_transactions_household_date ON transactions(household_id, date);
CREATE INDEX IF NOT EXISTS idx_transactions_status ON transactions(household_id, status);
CREATE UNIQUE INDEX IF NOT EXISTS idx_transactions_source_row
    ON transactions(household_id, source_file, source_row) WHERE source_file IS NOT NULL;

CREATE TABLE IF NOT EXISTS sms_transactions (
    id                INTEGER PRIMARY KEY AUTOINCREMENT,
    household_id      INTEGER NOT NULL,
    provider          TEXT NOT NULL,
    card_ending       TEXT,
    merchant_name     TEXT,
    amount            TEXT NOT NULL,
    currency          TEXT NOT NULL,
    transaction_date  TEXT NOT NULL,
    raw_message       TEXT NOT NULL,
    transaction_id    INTEGER NOT NULL REFERENCES transactions(id),
    cc_matched        BOOLEAN NOT NULL DEFAULT 0,
    cc_matched_at     TEXT,
    received_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sms_household_date ON sms_transactions(household_id, transaction_date);

CREATE TABLE IF NOT EXISTS email_receipts (
    id                      INTEGER PRIMARY KEY AUTOINCREMENT,
    household_id            INTEGER NOT NULL,
    merchant_name           TEXT NOT NULL,
    amount                  TEXT NOT NULL,
    currency                TEXT NOT NULL,
    receipt_date            TEXT NOT NULL,
    items                   TEXT NOT NULL DEFAULT '[]',
    matched_transaction_id  INTEGER REFERENCES transactions(id),
    match_confidence        INTEGER,
    matched_at              TEXT,
    created_at              TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_receipts_household_date ON email_receipts(household_id, receipt_date);

CREATE TABLE IF NOT EXISTS merchant_memory (
    household_id  INTEGER NOT NULL,
    merchant_key  TEXT NOT NULL,
    category      TEXT NOT NULL,
    updated_at    TEXT NOT NULL,
    PRIMARY KEY (household_id, merchant_key)
);

"#;

pub(crate) const CURRENT_VERSION: i32 = 1;

/// Migrations from version N to N+1.
/// Each entry is (from_version, sql).
pub(crate) const MIGRATIONS: &[(i32, &str)] = &[];
