use anyhow::{bail, Result};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use tracing::warn;

/// Where conversion rates come from.
pub(crate) trait RateSource: Send + Sync {
    /// Units of `to` per one unit of `from`.
    fn rate(&self, from: &str, to: &str) -> Result<Decimal>;
}

/// Fixed table of rates into the local currency, read from settings.
#[derive(Debug, Clone)]
pub(crate) struct StaticRates {
    local_currency: String,
    rates: BTreeMap<String, Decimal>,
}

impl StaticRates {
    pub(crate) fn new(local_currency: &str, rates: BTreeMap<String, Decimal>) -> Self {
        Self {
            local_currency: local_currency.to_uppercase(),
            rates: rates
                .into_iter()
                .map(|(k, v)| (k.to_uppercase(), v))
                .collect(),
        }
    }

    fn to_local(&self, currency: &str) -> Option<Decimal> {
        if currency == self.local_currency {
            return Some(Decimal::ONE);
        }
        self.rates.get(currency).copied().filter(|r| !r.is_zero())
    }
}

impl RateSource for StaticRates {
    fn rate(&self, from: &str, to: &str) -> Result<Decimal> {
        let from = from.to_uppercase();
        let to = to.to_uppercase();
        if from == to {
            return Ok(Decimal::ONE);
        }
        match (self.to_local(&from), self.to_local(&to)) {
            (Some(f), Some(t)) => Ok(f / t),
            _ => bail!("No rate for {from}/{to}"),
        }
    }
}

/// Ask `source` for a rate, giving up after `timeout`. Any failure yields
/// 1:1 so ingestion never stalls; the row can be corrected later.
pub(crate) fn rate_or_parity(
    source: &Arc<dyn RateSource>,
    from: &str,
    to: &str,
    timeout: Duration,
) -> Decimal {
    let (tx, rx) = mpsc::channel();
    let worker = Arc::clone(source);
    let (from_owned, to_owned) = (from.to_string(), to.to_string());
    thread::spawn(move || {
        // The receiver may be gone after a timeout.
        let _ = tx.send(worker.rate(&from_owned, &to_owned));
    });

    match rx.recv_timeout(timeout) {
        Ok(Ok(rate)) => rate,
        Ok(Err(e)) => {
            warn!(from, to, "Rate lookup failed, using 1:1: {e:#}");
            Decimal::ONE
        }
        Err(_) => {
            warn!(from, to, timeout_ms = timeout.as_millis() as u64, "Rate lookup timed out, using 1:1");
            Decimal::ONE
        }
    }
}

#[cfg(test)]
#[path = "fx_tests.rs"]
mod tests;
