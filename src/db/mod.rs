mod schema;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;

use crate::models::*;

const TX_COLUMNS: &str = "id, household_id, date, amount, currency, original_amount, original_currency,
     merchant_raw, merchant_normalized, category, category_source, status, tx_type, source,
     notes, is_duplicate, duplicate_of, sms_id, receipt_id, source_file, source_row, created_at";

const SMS_COLUMNS: &str = "id, household_id, provider, card_ending, merchant_name, amount, currency,
     transaction_date, raw_message, transaction_id, cc_matched, cc_matched_at, received_at";

const RECEIPT_COLUMNS: &str = "id, household_id, merchant_name, amount, currency, receipt_date,
     items, matched_transaction_id, match_confidence, matched_at, created_at";

pub(crate) struct Database {
    conn: Connection,
}

impl Database {
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .context("Failed to set database pragmas")?;
        let mut db = Self { conn };
        db.migrate().context("Database migration failed")?;
        db.seed_default_categories()?;
        Ok(db)
    }

    #[cfg(test)]
    pub(crate) fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        let mut db = Self { conn };
        db.migrate()?;
        db.seed_default_categories()?;
        Ok(db)
    }

    fn migrate(&mut self) -> Result<()> {
        let has_version_table: bool = self.conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            [],
            |row| row.get(0),
        )?;

        if !has_version_table {
            self.conn.execute_batch(schema::SCHEMA_V1)?;
            self.conn.execute(
                "INSERT INTO schema_version (version) VALUES (?1)",
                params![schema::CURRENT_VERSION],
            )?;
            return Ok(());
        }

        let current: i32 = self
            .conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0);

        for &(from_version, sql) in schema::MIGRATIONS {
            if current <= from_version {
                self.conn.execute_batch(sql)?;
            }
        }

        if current < schema::CURRENT_VERSION {
            self.conn.execute(
                "UPDATE schema_version SET version = ?1",
                params![schema::CURRENT_VERSION],
            )?;
        }

        Ok(())
    }

    fn seed_default_categories(&mut self) -> Result<()> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM categories", [], |row| row.get(0))?;
        if count > 0 {
            return Ok(());
        }

        let defaults = [
            "Bills & Subscriptions",
            "Clothing",
            "Coffee Shops",
            "Education",
            "Electronics",
            "Entertainment",
            "Fees & Charges",
            "Food & Dining",
            "Fuel",
            "Gifts & Donations",
            "Groceries",
            "Health",
            "Home & Garden",
            "Housing",
            "Income",
            "Insurance",
            "Kids",
            "Parking",
            "Personal Care",
            "Pharmacy",
            "Public Transit",
            "Restaurants",
            "Shopping",
            "Streaming",
            "Transfer",
            "Travel",
            "Uncategorized",
            "Utilities",
        ];

        let tx = self.conn.transaction()?;
        for name in &defaults {
            tx.execute(
                "INSERT OR IGNORE INTO categories (name) VALUES (?1)",
                params![name],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    // ── Transactions ──────────────────────────────────────────

    pub(crate) fn insert_transaction(&self, txn: &Transaction) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO transactions (household_id, date, amount, currency, original_amount, original_currency,
                merchant_raw, merchant_normalized, category, category_source, status, tx_type, source,
                notes, is_duplicate, duplicate_of, sms_id, receipt_id, source_file, source_row, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)",
            params![
                txn.household_id,
                txn.date,
                txn.amount.to_string(),
                txn.currency,
                txn.original_amount.map(|a| a.to_string()),
                txn.original_currency,
                txn.merchant_raw,
                txn.merchant_normalized,
                txn.category,
                txn.category_source,
                txn.status.as_str(),
                txn.tx_type.as_str(),
                txn.source,
                txn.notes,
                txn.is_duplicate,
                txn.duplicate_of,
                txn.sms_id,
                txn.receipt_id,
                txn.source_file,
                txn.source_row,
                txn.created_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Overwrite every mutable column of an existing row. Writing the same
    /// value twice is a no-op, so merges can be re-run safely.
    pub(crate) fn update_transaction(&self, txn: &Transaction) -> Result<()> {
        let id = txn
            .id
            .ok_or_else(|| anyhow::anyhow!("Cannot update a transaction without an id"))?;
        let changed = self.conn.execute(
            "UPDATE transactions SET date = ?1, amount = ?2, currency = ?3, original_amount = ?4,
                original_currency = ?5, merchant_raw = ?6, merchant_normalized = ?7, category = ?8,
                category_source = ?9, status = ?10, tx_type = ?11, source = ?12, notes = ?13,
                is_duplicate = ?14, duplicate_of = ?15, sms_id = ?16, receipt_id = ?17,
                source_file = ?18, source_row = ?19
             WHERE id = ?20",
            params![
                txn.date,
                txn.amount.to_string(),
                txn.currency,
                txn.original_amount.map(|a| a.to_string()),
                txn.original_currency,
                txn.merchant_raw,
                txn.merchant_normalized,
                txn.category,
                txn.category_source,
                txn.status.as_str(),
                txn.tx_type.as_str(),
                txn.source,
                txn.notes,
                txn.is_duplicate,
                txn.duplicate_of,
                txn.sms_id,
                txn.receipt_id,
                txn.source_file,
                txn.source_row,
                id,
            ],
        )?;
        if changed == 0 {
            anyhow::bail!("Transaction {id} not found");
        }
        Ok(())
    }

    pub(crate) fn get_transaction(&self, id: i64) -> Result<Option<Transaction>> {
        let sql = format!("SELECT {TX_COLUMNS} FROM transactions WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], transaction_from_row)
            .optional()?)
    }

    /// Rows for the given ids, in the order the ids were given. Unknown ids
    /// are skipped.
    pub(crate) fn get_transactions_by_ids(&self, ids: &[i64]) -> Result<Vec<Transaction>> {
        let mut out = Vec::with_capacity(ids.len());
        for &id in ids {
            if let Some(txn) = self.get_transaction(id)? {
                out.push(txn);
            }
        }
        Ok(out)
    }

    /// Live (non-duplicate) rows, newest date first, then creation order.
    pub(crate) fn get_household_transactions(&self, household_id: i64) -> Result<Vec<Transaction>> {
        let sql = format!(
            "SELECT {TX_COLUMNS} FROM transactions
             WHERE household_id = ?1 AND is_duplicate = 0
             ORDER BY date DESC, created_at ASC, id ASC"
        );
        self.query_transactions(&sql, params![household_id])
    }

    /// Live rows with no receipt attached, dated within `[from, to]`.
    pub(crate) fn get_unlinked_transactions(
        &self,
        household_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Transaction>> {
        let sql = format!(
            "SELECT {TX_COLUMNS} FROM transactions
             WHERE household_id = ?1 AND is_duplicate = 0 AND receipt_id IS NULL
               AND date >= ?2 AND date <= ?3
             ORDER BY date ASC, id ASC"
        );
        self.query_transactions(&sql, params![household_id, from, to])
    }

    pub(crate) fn get_uncategorized_transactions(&self, household_id: i64) -> Result<Vec<Transaction>> {
        let sql = format!(
            "SELECT {TX_COLUMNS} FROM transactions
             WHERE household_id = ?1 AND is_duplicate = 0 AND category IS NULL
               AND status IN ('provisional', 'pending')
             ORDER BY date ASC, id ASC"
        );
        self.query_transactions(&sql, params![household_id])
    }

    pub(crate) fn find_transaction_by_source_row(
        &self,
        household_id: i64,
        source_file: &str,
        source_row: i64,
    ) -> Result<Option<i64>> {
        Ok(self
            .conn
            .query_row(
                "SELECT id FROM transactions
                 WHERE household_id = ?1 AND source_file = ?2 AND source_row = ?3",
                params![household_id, source_file, source_row],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub(crate) fn set_transaction_sms_id(&self, transaction_id: i64, sms_id: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE transactions SET sms_id = ?1 WHERE id = ?2",
            params![sms_id, transaction_id],
        )?;
        Ok(())
    }

    pub(crate) fn update_transaction_category(
        &self,
        transaction_id: i64,
        category: Option<&str>,
        category_source: Option<&str>,
        status: TxStatus,
    ) -> Result<()> {
        self.conn.execute(
            "UPDATE transactions SET category = ?1, category_source = ?2, status = ?3 WHERE id = ?4",
            params![category, category_source, status.as_str(), transaction_id],
        )?;
        Ok(())
    }

    /// Move a row to `flagged`, but only if nobody resolved it in the
    /// meantime. Returns whether the row changed.
    pub(crate) fn flag_if_provisional(&self, transaction_id: i64) -> Result<bool> {
        let changed = self.conn.execute(
            "UPDATE transactions SET status = 'flagged' WHERE id = ?1 AND status = 'provisional'",
            params![transaction_id],
        )?;
        Ok(changed == 1)
    }

    pub(crate) fn delete_transaction(&self, id: i64) -> Result<()> {
        self.conn
            .execute("DELETE FROM transactions WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub(crate) fn get_transaction_count(&self, household_id: i64) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE household_id = ?1 AND is_duplicate = 0",
            params![household_id],
            |row| row.get(0),
        )?)
    }

    fn query_transactions(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> Result<Vec<Transaction>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, transaction_from_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    // ── SMS ───────────────────────────────────────────────────

    pub(crate) fn insert_sms(&self, sms: &SmsTransaction) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO sms_transactions (household_id, provider, card_ending, merchant_name, amount,
                currency, transaction_date, raw_message, transaction_id, cc_matched, cc_matched_at, received_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                sms.household_id,
                sms.provider,
                sms.card_ending,
                sms.merchant_name,
                sms.amount.to_string(),
                sms.currency,
                sms.transaction_date,
                sms.raw_message,
                sms.transaction_id,
                sms.cc_matched,
                sms.cc_matched_at,
                sms.received_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    #[cfg(test)]
    pub(crate) fn get_sms(&self, id: i64) -> Result<Option<SmsTransaction>> {
        let sql = format!("SELECT {SMS_COLUMNS} FROM sms_transactions WHERE id = ?1");
        Ok(self.conn.query_row(&sql, params![id], sms_from_row).optional()?)
    }

    /// An SMS for the same card, amount and purchase date received at or
    /// after `received_since`.
    pub(crate) fn find_recent_sms(
        &self,
        household_id: i64,
        card_ending: Option<&str>,
        amount: Decimal,
        transaction_date: NaiveDate,
        received_since: &str,
    ) -> Result<Option<i64>> {
        let sql = format!(
            "SELECT {SMS_COLUMNS} FROM sms_transactions
             WHERE household_id = ?1 AND card_ending IS ?2 AND transaction_date = ?3
               AND received_at >= ?4
             ORDER BY id ASC"
        );
        let candidates = self.query_sms(
            &sql,
            params![household_id, card_ending, transaction_date, received_since],
        )?;
        Ok(candidates
            .into_iter()
            .find(|s| s.amount == amount)
            .and_then(|s| s.id))
    }

    pub(crate) fn get_unmatched_sms_between(
        &self,
        household_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<SmsTransaction>> {
        let sql = format!(
            "SELECT {SMS_COLUMNS} FROM sms_transactions
             WHERE household_id = ?1 AND cc_matched = 0
               AND transaction_date >= ?2 AND transaction_date <= ?3
             ORDER BY transaction_date ASC, id ASC"
        );
        self.query_sms(&sql, params![household_id, from, to])
    }

    /// Unmatched SMS rows received before `received_before`.
    pub(crate) fn get_stale_sms(
        &self,
        household_id: i64,
        received_before: &str,
    ) -> Result<Vec<SmsTransaction>> {
        let sql = format!(
            "SELECT {SMS_COLUMNS} FROM sms_transactions
             WHERE household_id = ?1 AND cc_matched = 0 AND received_at < ?2
             ORDER BY received_at ASC, id ASC"
        );
        self.query_sms(&sql, params![household_id, received_before])
    }

    pub(crate) fn mark_sms_cc_matched(&self, sms_id: i64, matched_at: &str) -> Result<()> {
        let changed = self.conn.execute(
            "UPDATE sms_transactions SET cc_matched = 1, cc_matched_at = ?1 WHERE id = ?2",
            params![matched_at, sms_id],
        )?;
        if changed == 0 {
            anyhow::bail!("SMS {sms_id} not found");
        }
        Ok(())
    }

    fn query_sms(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<SmsTransaction>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, sms_from_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    // ── Receipts ──────────────────────────────────────────────

    pub(crate) fn insert_receipt(&self, receipt: &EmailReceipt) -> Result<i64> {
        let items = serde_json::to_string(&receipt.items).context("Failed to encode receipt items")?;
        self.conn.execute(
            "INSERT INTO email_receipts (household_id, merchant_name, amount, currency, receipt_date,
                items, matched_transaction_id, match_confidence, matched_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                receipt.household_id,
                receipt.merchant_name,
                receipt.amount.to_string(),
                receipt.currency,
                receipt.receipt_date,
                items,
                receipt.matched_transaction_id,
                receipt.match_confidence,
                receipt.matched_at,
                receipt.created_at,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    #[cfg(test)]
    pub(crate) fn get_receipt(&self, id: i64) -> Result<Option<EmailReceipt>> {
        let sql = format!("SELECT {RECEIPT_COLUMNS} FROM email_receipts WHERE id = ?1");
        Ok(self
            .conn
            .query_row(&sql, params![id], receipt_from_row)
            .optional()?)
    }

    pub(crate) fn get_unmatched_receipts_between(
        &self,
        household_id: i64,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<EmailReceipt>> {
        let sql = format!(
            "SELECT {RECEIPT_COLUMNS} FROM email_receipts
             WHERE household_id = ?1 AND matched_transaction_id IS NULL
               AND receipt_date >= ?2 AND receipt_date <= ?3
             ORDER BY receipt_date ASC, id ASC"
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![household_id, from, to], receipt_from_row)?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    /// Attach a receipt to a transaction. Both sides are written in one
    /// SQLite transaction: either both reference each other or neither does.
    pub(crate) fn link_receipt(
        &mut self,
        receipt_id: i64,
        transaction_id: i64,
        confidence: u8,
        matched_at: &str,
    ) -> Result<()> {
        let tx = self.conn.transaction()?;
        let receipts = tx.execute(
            "UPDATE email_receipts SET matched_transaction_id = ?1, match_confidence = ?2, matched_at = ?3
             WHERE id = ?4",
            params![transaction_id, confidence, matched_at, receipt_id],
        )?;
        if receipts == 0 {
            anyhow::bail!("Receipt {receipt_id} not found");
        }
        let txns = tx.execute(
            "UPDATE transactions SET receipt_id = ?1 WHERE id = ?2",
            params![receipt_id, transaction_id],
        )?;
        if txns == 0 {
            anyhow::bail!("Transaction {transaction_id} not found");
        }
        tx.commit()?;
        Ok(())
    }

    // ── Categories ────────────────────────────────────────────

    pub(crate) fn get_categories(&self) -> Result<Vec<Category>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM categories ORDER BY name")?;
        let rows = stmt.query_map([], |row| Ok(Category { name: row.get(0)? }))?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> Result<()> {
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn insert_category(&self, cat: &Category) -> Result<i64> {
        self.conn
            .execute("INSERT INTO categories (name) VALUES (?1)", params![cat.name])?;
        Ok(self.conn.last_insert_rowid())
    }

    // ── Merchant memory ───────────────────────────────────────

    pub(crate) fn get_merchant_memory(&self, household_id: i64) -> Result<MerchantMemory> {
        let mut stmt = self.conn.prepare(
            "SELECT merchant_key, category FROM merchant_memory WHERE household_id = ?1",
        )?;
        let rows = stmt.query_map(params![household_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut memory = MerchantMemory::new();
        for row in rows {
            let (key, category) = row?;
            memory.insert(&key, category);
        }
        Ok(memory)
    }

    pub(crate) fn remember_merchant(
        &self,
        household_id: i64,
        merchant: &str,
        category: &str,
    ) -> Result<()> {
        let key = MerchantMemory::key(merchant);
        if key.is_empty() {
            anyhow::bail!("Merchant name '{merchant}' has no letters to remember");
        }
        self.conn.execute(
            "INSERT INTO merchant_memory (household_id, merchant_key, category, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(household_id, merchant_key) DO UPDATE SET category = ?3, updated_at = ?4",
            params![household_id, key, category, now_timestamp()],
        )?;
        Ok(())
    }
}

fn parse_decimal(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap_or_default()
}

fn transaction_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let amount: String = row.get(3)?;
    let original_amount: Option<String> = row.get(5)?;
    Ok(Transaction {
        id: Some(row.get(0)?),
        household_id: row.get(1)?,
        date: row.get(2)?,
        amount: parse_decimal(&amount),
        currency: row.get(4)?,
        original_amount: original_amount.as_deref().map(parse_decimal),
        original_currency: row.get(6)?,
        merchant_raw: row.get(7)?,
        merchant_normalized: row.get(8)?,
        category: row.get(9)?,
        category_source: row.get(10)?,
        status: TxStatus::parse(&row.get::<_, String>(11)?),
        tx_type: TxType::parse(&row.get::<_, String>(12)?),
        source: row.get(13)?,
        notes: row.get(14)?,
        is_duplicate: row.get(15)?,
        duplicate_of: row.get(16)?,
        sms_id: row.get(17)?,
        receipt_id: row.get(18)?,
        source_file: row.get(19)?,
        source_row: row.get(20)?,
        created_at: row.get(21)?,
    })
}

fn sms_from_row(row: &Row<'_>) -> rusqlite::Result<SmsTransaction> {
    let amount: String = row.get(5)?;
    Ok(SmsTransaction {
        id: Some(row.get(0)?),
        household_id: row.get(1)?,
        provider: row.get(2)?,
        card_ending: row.get(3)?,
        merchant_name: row.get(4)?,
        amount: parse_decimal(&amount),
        currency: row.get(6)?,
        transaction_date: row.get(7)?,
        raw_message: row.get(8)?,
        transaction_id: row.get(9)?,
        cc_matched: row.get(10)?,
        cc_matched_at: row.get(11)?,
        received_at: row.get(12)?,
    })
}

fn receipt_from_row(row: &Row<'_>) -> rusqlite::Result<EmailReceipt> {
    let amount: String = row.get(3)?;
    let items: String = row.get(6)?;
    Ok(EmailReceipt {
        id: Some(row.get(0)?),
        household_id: row.get(1)?,
        merchant_name: row.get(2)?,
        amount: parse_decimal(&amount),
        currency: row.get(4)?,
        receipt_date: row.get(5)?,
        items: serde_json::from_str(&items).unwrap_or_default(),
        matched_transaction_id: row.get(7)?,
        match_confidence: row.get(8)?,
        matched_at: row.get(9)?,
        created_at: row.get(10)?,
    })
}
