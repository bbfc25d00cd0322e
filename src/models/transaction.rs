use chrono::NaiveDate;
use rust_decimal::Decimal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Provisional,
    Pending,
    Flagged,
    Skipped,
    Categorized,
    Verified,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provisional => "provisional",
            Self::Pending => "pending",
            Self::Flagged => "flagged",
            Self::Skipped => "skipped",
            Self::Categorized => "categorized",
            Self::Verified => "verified",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "provisional" => Self::Provisional,
            "flagged" => Self::Flagged,
            "skipped" => Self::Skipped,
            "categorized" => Self::Categorized,
            "verified" => Self::Verified,
            _ => Self::Pending,
        }
    }

    #[cfg(test)]
    pub fn all() -> &'static [TxStatus] {
        &[
            Self::Provisional,
            Self::Pending,
            Self::Flagged,
            Self::Skipped,
            Self::Categorized,
            Self::Verified,
        ]
    }
}

impl std::fmt::Display for TxStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxType {
    Expense,
    Income,
    Transfer,
}

impl TxType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expense => "expense",
            Self::Income => "income",
            Self::Transfer => "transfer",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "income" | "credit" => Self::Income,
            "transfer" => Self::Transfer,
            _ => Self::Expense,
        }
    }
}

impl std::fmt::Display for TxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A canonical ledger row.
///
/// `amount` is always expressed in `currency`. `original_amount` and
/// `original_currency` are only set when the issuer recorded a foreign
/// charge that differs from the settlement currency.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub id: Option<i64>,
    pub household_id: i64,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub currency: String,
    pub original_amount: Option<Decimal>,
    pub original_currency: Option<String>,
    pub merchant_raw: String,
    pub merchant_normalized: Option<String>,
    pub category: Option<String>,
    pub category_source: Option<String>,
    pub status: TxStatus,
    pub tx_type: TxType,
    pub source: String,
    pub notes: String,
    pub is_duplicate: bool,
    pub duplicate_of: Option<i64>,
    pub sms_id: Option<i64>,
    pub receipt_id: Option<i64>,
    pub source_file: Option<String>,
    pub source_row: Option<i64>,
    pub created_at: String,
}

impl Transaction {
    pub fn new(
        household_id: i64,
        date: NaiveDate,
        amount: Decimal,
        currency: String,
        merchant_raw: String,
        source: String,
    ) -> Self {
        let tx_type = if amount > Decimal::ZERO {
            TxType::Income
        } else {
            TxType::Expense
        };
        Self {
            id: None,
            household_id,
            date,
            amount,
            currency,
            original_amount: None,
            original_currency: None,
            merchant_raw,
            merchant_normalized: None,
            category: None,
            category_source: None,
            status: TxStatus::Pending,
            tx_type,
            source,
            notes: String::new(),
            is_duplicate: false,
            duplicate_of: None,
            sms_id: None,
            receipt_id: None,
            source_file: None,
            source_row: None,
            created_at: super::now_timestamp(),
        }
    }

    pub fn abs_amount(&self) -> Decimal {
        self.amount.abs()
    }

    pub fn is_expense(&self) -> bool {
        self.tx_type == TxType::Expense
    }

    /// Merchant name to show a person: the cleaned name when known.
    pub fn display_merchant(&self) -> &str {
        self.merchant_normalized
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(&self.merchant_raw)
    }

    /// The foreign charge, if the issuer recorded one.
    pub fn original(&self) -> Option<(Decimal, &str)> {
        match (self.original_amount, self.original_currency.as_deref()) {
            (Some(amount), Some(currency)) => Some((amount, currency)),
            _ => None,
        }
    }
}

/// A statement line as handed over by a statement parser.
#[derive(Debug, Clone)]
pub struct ParsedTransaction {
    pub date: NaiveDate,
    pub merchant_raw: String,
    pub amount: Decimal,
    pub currency: String,
    pub tx_type: TxType,
    pub original_amount: Option<Decimal>,
    pub original_currency: Option<String>,
    pub card_ending: Option<String>,
}
