//! Currency conversion for cross-currency totals.
//!
//! Reports aggregate amounts recorded in several currencies, so every
//! total is converted into the requested report currency first. Stored
//! rates win; when a pair has never been loaded the configured
//! USD-anchored table is used, and as a last resort the amount passes
//! through 1:1.

use crate::services::database::Database;
use rust_decimal::Decimal;
use service_core::error::AppError;
use std::collections::HashMap;
use tracing::{instrument, warn};

/// Fallback USD-to-X rates. Built once at startup and handed to the
/// conversion service; nothing else carries rate literals.
#[derive(Debug, Clone)]
pub struct CurrencyDefaults {
    usd_rates: HashMap<&'static str, Decimal>,
}

impl Default for CurrencyDefaults {
    fn default() -> Self {
        Self {
            usd_rates: HashMap::from([
                ("USD", Decimal::ONE),
                ("CLP", Decimal::new(950, 0)),
                ("EUR", Decimal::new(92, 2)),
                ("BRL", Decimal::new(50, 1)),
                ("ARS", Decimal::new(1000, 0)),
            ]),
        }
    }
}

impl CurrencyDefaults {
    /// Rate derived from the table by routing through USD. `None` when
    /// either side is not in the table.
    pub fn rate_between(&self, from_currency: &str, to_currency: &str) -> Option<Decimal> {
        let from_rate = self.usd_rates.get(from_currency)?;
        let to_rate = self.usd_rates.get(to_currency)?;
        Some((Decimal::ONE / from_rate) * to_rate)
    }
}

/// Converts amounts between currencies using stored or default rates.
#[derive(Clone)]
pub struct CurrencyService {
    db: Database,
    defaults: CurrencyDefaults,
}

impl CurrencyService {
    pub fn new(db: Database, defaults: CurrencyDefaults) -> Self {
        Self { db, defaults }
    }

    /// Rate for a pair: identity, then the stored rate, then the
    /// default table, then 1.
    #[instrument(skip(self))]
    pub async fn rate(&self, from_currency: &str, to_currency: &str) -> Result<Decimal, AppError> {
        if from_currency == to_currency {
            return Ok(Decimal::ONE);
        }

        if let Some(rate) = self.db.get_exchange_rate(from_currency, to_currency).await? {
            return Ok(rate);
        }

        if let Some(rate) = self.defaults.rate_between(from_currency, to_currency) {
            return Ok(rate);
        }

        warn!(
            from_currency = from_currency,
            to_currency = to_currency,
            "No exchange rate available, passing amount through 1:1"
        );

        Ok(Decimal::ONE)
    }

    /// Convert an amount into the target currency.
    pub async fn convert(
        &self,
        amount: Decimal,
        from_currency: &str,
        to_currency: &str,
    ) -> Result<Decimal, AppError> {
        if from_currency == to_currency {
            return Ok(amount);
        }
        let rate = self.rate(from_currency, to_currency).await?;
        Ok(amount * rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn default_rate_routes_through_usd() {
        let defaults = CurrencyDefaults::default();
        // USD -> CLP is the table rate itself.
        assert_eq!(defaults.rate_between("USD", "CLP"), Some(dec!(950)));
        // CLP -> USD is the reciprocal.
        let clp_usd = defaults.rate_between("CLP", "USD").unwrap();
        assert!((clp_usd - dec!(1) / dec!(950)).abs() < dec!(0.0000001));
        // EUR -> BRL crosses both legs.
        let eur_brl = defaults.rate_between("EUR", "BRL").unwrap();
        assert!((eur_brl - (dec!(1) / dec!(0.92)) * dec!(5.0)).abs() < dec!(0.0001));
    }

    #[test]
    fn default_rate_unknown_currency_is_none() {
        let defaults = CurrencyDefaults::default();
        assert_eq!(defaults.rate_between("USD", "XXX"), None);
        assert_eq!(defaults.rate_between("XXX", "CLP"), None);
    }
}
