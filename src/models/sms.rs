use chrono::NaiveDate;
use rust_decimal::Decimal;

/// One accepted SMS alert, always paired with the provisional ledger row it
/// created.
#[derive(Debug, Clone)]
pub struct SmsTransaction {
    pub id: Option<i64>,
    pub household_id: i64,
    pub provider: String,
    pub card_ending: Option<String>,
    pub merchant_name: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub transaction_date: NaiveDate,
    pub raw_message: String,
    pub transaction_id: i64,
    pub cc_matched: bool,
    pub cc_matched_at: Option<String>,
    pub received_at: String,
}
