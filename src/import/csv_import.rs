use anyhow::{Context, Result};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;

use crate::models::{ParsedTransaction, TxType};

/// Where each field lives in a statement export.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct CsvProfile {
    pub(crate) name: String,
    pub(crate) date_column: usize,
    pub(crate) merchant_column: usize,
    pub(crate) amount_column: Option<usize>,
    pub(crate) debit_column: Option<usize>,
    pub(crate) credit_column: Option<usize>,
    pub(crate) currency_column: Option<usize>,
    pub(crate) original_amount_column: Option<usize>,
    pub(crate) original_currency_column: Option<usize>,
    pub(crate) card_column: Option<usize>,
    pub(crate) date_format: String,
    pub(crate) skip_rows: usize,
    /// Issuer exports list charges as positive numbers.
    pub(crate) negate_amounts: bool,
}

impl Default for CsvProfile {
    fn default() -> Self {
        Self {
            name: "Custom".into(),
            date_column: 0,
            merchant_column: 1,
            amount_column: Some(2),
            debit_column: None,
            credit_column: None,
            currency_column: None,
            original_amount_column: None,
            original_currency_column: None,
            card_column: None,
            date_format: "%d/%m/%Y".into(),
            skip_rows: 0,
            negate_amounts: false,
        }
    }
}

pub(crate) struct CsvImporter;

impl CsvImporter {
    /// Read the CSV and split off the header row when there is one.
    pub(crate) fn preview(path: &Path) -> Result<(Vec<String>, Vec<Vec<String>>)> {
        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .has_headers(false)
            .from_path(path)
            .with_context(|| format!("Failed to open CSV file: {}", path.display()))?;

        let mut all_rows: Vec<Vec<String>> = Vec::new();
        for result in rdr.records() {
            let record = result.context("Failed to read CSV record")?;
            all_rows.push(
                record
                    .iter()
                    .map(|s| s.trim_start_matches('\u{feff}').to_string())
                    .collect(),
            );
        }

        if all_rows.is_empty() {
            anyhow::bail!("CSV file is empty");
        }

        // Headers don't parse as dates or numbers
        let first_row = &all_rows[0];
        let looks_like_header = first_row.iter().all(|field| {
            let trimmed = field.trim();
            parse_decimal(trimmed).is_err() && parse_date(trimmed, "%d/%m/%Y").is_err()
        });

        if looks_like_header {
            let headers = all_rows.remove(0);
            Ok((headers, all_rows))
        } else {
            let headers: Vec<String> = (0..first_row.len())
                .map(|i| format!("Column {}", i + 1))
                .collect();
            Ok((headers, all_rows))
        }
    }

    /// Turn statement rows into parsed transactions, in file order. Rows
    /// without a date (totals, blank lines) are skipped.
    pub(crate) fn parse(
        rows: &[Vec<String>],
        profile: &CsvProfile,
        local_currency: &str,
    ) -> Result<Vec<ParsedTransaction>> {
        let mut parsed = Vec::new();

        for (i, row) in rows.iter().enumerate().skip(profile.skip_rows) {
            let date_str = cell(row, Some(profile.date_column));
            if date_str.is_empty() {
                continue;
            }

            let date = parse_date(date_str, &profile.date_format)
                .with_context(|| format!("Row {}: failed to parse date '{}'", i + 1, date_str))?;

            let merchant_raw = cell(row, Some(profile.merchant_column)).to_string();

            let amount = parse_amount(row, profile)
                .with_context(|| format!("Row {}: failed to parse amount", i + 1))?;

            let currency = normalize_currency(cell(row, profile.currency_column), local_currency);

            let original_currency = profile
                .original_currency_column
                .map(|c| normalize_currency(cell(row, Some(c)), &currency))
                .filter(|c| *c != currency);
            let original_amount = match (&original_currency, profile.original_amount_column) {
                (Some(_), Some(col)) => Some(
                    parse_decimal(cell(row, Some(col)))
                        .with_context(|| format!("Row {}: failed to parse original amount", i + 1))?
                        .abs(),
                ),
                _ => None,
            };

            let card_ending = Some(cell(row, profile.card_column))
                .map(|s| s.chars().filter(char::is_ascii_digit).collect::<String>())
                .filter(|d| d.len() >= 4)
                .map(|d| d[d.len() - 4..].to_string());

            let tx_type = if amount > Decimal::ZERO {
                TxType::Income
            } else {
                TxType::Expense
            };

            parsed.push(ParsedTransaction {
                date,
                merchant_raw,
                amount,
                currency,
                tx_type,
                original_currency: original_amount.and(original_currency),
                original_amount,
                card_ending,
            });
        }

        Ok(parsed)
    }
}

fn cell(row: &[String], column: Option<usize>) -> &str {
    column
        .and_then(|c| row.get(c))
        .map(|s| s.trim())
        .unwrap_or("")
}

pub(crate) fn parse_date(s: &str, fmt: &str) -> Result<NaiveDate> {
    if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
        return Ok(d);
    }
    for fallback in &["%d/%m/%Y", "%Y-%m-%d", "%d-%m-%Y", "%d.%m.%Y", "%d/%m/%y", "%d.%m.%y"] {
        if let Ok(d) = NaiveDate::parse_from_str(s, fallback) {
            return Ok(d);
        }
    }
    anyhow::bail!("Could not parse date: {}", s)
}

fn parse_amount(row: &[String], profile: &CsvProfile) -> Result<Decimal> {
    let amount = if let Some(amt_col) = profile.amount_column {
        parse_decimal(cell(row, Some(amt_col)))?
    } else {
        let debit = cell(row, profile.debit_column);
        let credit = cell(row, profile.credit_column);

        if !debit.is_empty() {
            -parse_decimal(debit)?.abs()
        } else if !credit.is_empty() {
            parse_decimal(credit)?.abs()
        } else {
            Decimal::ZERO
        }
    };

    if profile.negate_amounts {
        Ok(-amount)
    } else {
        Ok(amount)
    }
}

pub(crate) fn parse_decimal(s: &str) -> Result<Decimal> {
    let cleaned = s
        .replace(['$', ',', '₪', '€', '£', '"'], "")
        .replace('(', "-")
        .replace(')', "")
        .trim()
        .to_string();
    if cleaned.is_empty() {
        return Ok(Decimal::ZERO);
    }
    Decimal::from_str(&cleaned).with_context(|| format!("Failed to parse '{}' as decimal", s))
}

/// ISO code for a currency cell. Blank cells mean `default`.
pub(crate) fn normalize_currency(raw: &str, default: &str) -> String {
    let trimmed = raw.trim();
    match trimmed {
        "" => default.to_uppercase(),
        "₪" | "ש\"ח" | "ש״ח" | "שח" | "NIS" | "nis" => "ILS".into(),
        "$" | "דולר" => "USD".into(),
        "€" | "יורו" => "EUR".into(),
        "£" | "ליש\"ט" => "GBP".into(),
        other => other.to_uppercase(),
    }
}

#[cfg(test)]
#[path = "csv_import_tests.rs"]
mod tests;
