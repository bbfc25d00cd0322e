use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptItem {
    pub name: String,
    #[serde(default)]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub price: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct EmailReceipt {
    pub id: Option<i64>,
    pub household_id: i64,
    pub merchant_name: String,
    pub amount: Decimal,
    pub currency: String,
    pub receipt_date: NaiveDate,
    pub items: Vec<ReceiptItem>,
    pub matched_transaction_id: Option<i64>,
    pub match_confidence: Option<u8>,
    pub matched_at: Option<String>,
    pub created_at: String,
}

impl EmailReceipt {
    pub fn new(
        household_id: i64,
        merchant_name: String,
        amount: Decimal,
        currency: String,
        receipt_date: NaiveDate,
    ) -> Self {
        Self {
            id: None,
            household_id,
            merchant_name,
            amount,
            currency,
            receipt_date,
            items: Vec::new(),
            matched_transaction_id: None,
            match_confidence: None,
            matched_at: None,
            created_at: super::now_timestamp(),
        }
    }

    pub fn is_matched(&self) -> bool {
        self.matched_transaction_id.is_some()
    }
}
