use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Largest difference still treated as the same amount.
const EXACT_TOLERANCE: Decimal = Decimal::from_parts(2, 0, 0, false, 2);

/// Accepted conversion-rate range from a foreign currency into the local
/// settlement currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub(crate) struct FxBand {
    pub(crate) min: Decimal,
    pub(crate) max: Decimal,
}

impl FxBand {
    pub(crate) fn new(min: Decimal, max: Decimal) -> Self {
        Self { min, max }
    }

    fn contains(&self, foreign_amount: Decimal, local_amount: Decimal) -> bool {
        local_amount >= foreign_amount * self.min && local_amount <= foreign_amount * self.max
    }
}

/// Static conversion bands keyed by foreign currency.
#[derive(Debug, Clone)]
pub(crate) struct FxBands {
    local_currency: String,
    bands: BTreeMap<String, FxBand>,
}

impl FxBands {
    pub(crate) fn new(local_currency: String, bands: BTreeMap<String, FxBand>) -> Self {
        Self {
            local_currency: local_currency.to_uppercase(),
            bands: bands
                .into_iter()
                .map(|(k, v)| (k.to_uppercase(), v))
                .collect(),
        }
    }

    pub(crate) fn local_currency(&self) -> &str {
        &self.local_currency
    }

    pub(crate) fn band_for(&self, currency: &str) -> Option<&FxBand> {
        self.bands.get(&currency.to_uppercase())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct AmountMatch {
    pub(crate) matches: bool,
    pub(crate) is_cross_currency: bool,
    pub(crate) is_exact_fx_match: bool,
}

impl AmountMatch {
    const NONE: AmountMatch = AmountMatch {
        matches: false,
        is_cross_currency: false,
        is_exact_fx_match: false,
    };

    /// Ordering key: exact foreign-charge evidence, then same-currency,
    /// then a band estimate. Higher is better.
    pub(crate) fn strength(&self) -> u8 {
        match (self.matches, self.is_exact_fx_match, self.is_cross_currency) {
            (false, _, _) => 0,
            (true, true, _) => 3,
            (true, false, false) => 2,
            (true, false, true) => 1,
        }
    }
}

/// One side of an amount comparison.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Money<'a> {
    pub(crate) amount: Decimal,
    pub(crate) currency: &'a str,
}

impl<'a> Money<'a> {
    pub(crate) fn new(amount: Decimal, currency: &'a str) -> Self {
        Self { amount, currency }
    }
}

fn near(a: Decimal, b: Decimal) -> bool {
    (a.abs() - b.abs()).abs() < EXACT_TOLERANCE
}

/// Compare a receipt amount against a transaction amount.
///
/// Checks run strongest first and the first success wins:
/// the transaction's recorded foreign charge, then plain same-currency
/// equality, then the static FX band for the receipt currency.
pub(crate) fn match_amounts(
    receipt: Money<'_>,
    tx: Money<'_>,
    tx_original: Option<Money<'_>>,
    bands: &FxBands,
) -> AmountMatch {
    let receipt_currency = receipt.currency.to_uppercase();
    let tx_currency = tx.currency.to_uppercase();

    if let Some(original) = tx_original {
        if original.currency.eq_ignore_ascii_case(&receipt_currency)
            && near(original.amount, receipt.amount)
        {
            return AmountMatch {
                matches: true,
                is_cross_currency: receipt_currency != tx_currency,
                is_exact_fx_match: true,
            };
        }
    }

    if receipt_currency == tx_currency {
        if near(receipt.amount, tx.amount) {
            return AmountMatch {
                matches: true,
                ..AmountMatch::NONE
            };
        }
        return AmountMatch::NONE;
    }

    if tx_currency == bands.local_currency() {
        if let Some(band) = bands.band_for(&receipt_currency) {
            if band.contains(receipt.amount.abs(), tx.amount.abs()) {
                return AmountMatch {
                    matches: true,
                    is_cross_currency: true,
                    is_exact_fx_match: false,
                };
            }
        }
    }

    AmountMatch::NONE
}

#[cfg(test)]
#[path = "amount_tests.rs"]
mod tests;
