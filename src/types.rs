//! Core data types shared by the screening pipeline

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Validation errors for daily bars
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CandleValidationError {
    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("volume ({0}) must be >= 0")]
    NegativeVolume(f64),

    #[error("open ({open}) must be between low ({low}) and high ({high})")]
    OpenOutOfRange { open: f64, low: f64, high: f64 },

    #[error("close ({close}) must be between low ({low}) and high ({high})")]
    CloseOutOfRange { close: f64, low: f64, high: f64 },

    #[error("prices must be positive and finite: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },

    #[error("bar dated {current} is not after previous bar {previous}")]
    OutOfOrder {
        previous: NaiveDate,
        current: NaiveDate,
    },
}

/// Daily OHLCV bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Create a new bar with validation
    pub fn new(
        date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, CandleValidationError> {
        let candle = Self::new_unchecked(date, open, high, low, close, volume);
        candle.validate()?;
        Ok(candle)
    }

    /// Create a bar without validation (for trusted sources or when validation is done separately)
    pub fn new_unchecked(
        date: NaiveDate,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    pub fn validate(&self) -> Result<(), CandleValidationError> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite() || *p <= 0.0) {
            return Err(CandleValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(CandleValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if self.volume.is_nan() || self.volume < 0.0 {
            return Err(CandleValidationError::NegativeVolume(self.volume));
        }

        if self.open < self.low || self.open > self.high {
            return Err(CandleValidationError::OpenOutOfRange {
                open: self.open,
                low: self.low,
                high: self.high,
            });
        }

        if self.close < self.low || self.close > self.high {
            return Err(CandleValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }

        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Instrument identifier using Arc<str> for cheap cloning
///
/// Symbols are cloned into every candidate, consistency record and
/// recommendation, so cloning must not allocate. Ordering is lexical and is
/// used as the deterministic tie-breaker when ranking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(#[serde(with = "arc_str_serde")] std::sync::Arc<str>);

/// Custom serde for Arc<str>
mod arc_str_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::sync::Arc;

    pub fn serialize<S>(value: &Arc<str>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Arc<str>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Arc::from(s.as_str()))
    }
}

impl Symbol {
    pub fn new(s: impl AsRef<str>) -> Self {
        Symbol(std::sync::Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Symbol::new(value)
    }
}

/// Ordered daily history for one instrument
///
/// Immutable for the duration of a run. Column accessors allocate, so callers
/// that need several columns should take them once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSeries {
    pub symbol: Symbol,
    pub candles: Vec<Candle>,
}

impl PriceSeries {
    pub fn new(symbol: Symbol, candles: Vec<Candle>) -> Self {
        Self { symbol, candles }
    }

    /// Validate every bar and the date ordering
    pub fn validate(&self) -> Result<(), CandleValidationError> {
        for candle in &self.candles {
            candle.validate()?;
        }
        for pair in self.candles.windows(2) {
            if pair[1].date <= pair[0].date {
                return Err(CandleValidationError::OutOfOrder {
                    previous: pair[0].date,
                    current: pair[1].date,
                });
            }
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn highs(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.high).collect()
    }

    pub fn lows(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.low).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.volume).collect()
    }

    pub fn last_close(&self) -> Option<f64> {
        self.candles.last().map(|c| c.close)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.candles.last().map(|c| c.date)
    }
}

/// Fundamental fields supplied per symbol; every field may be unknown
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    /// Quarter-over-quarter earnings growth (%)
    #[serde(default)]
    pub quarterly_earnings_growth: Option<f64>,
    /// Revenue growth (%)
    #[serde(default)]
    pub revenue_growth: Option<f64>,
    /// Return on equity (%)
    #[serde(default)]
    pub return_on_equity: Option<f64>,
    /// Explicit flag from the provider; `Some(false)` means negative quarterly earnings
    #[serde(default)]
    pub earnings_positive_flag: Option<bool>,
}

/// A held position, owned by the portfolio collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub shares: Money,
    pub entry_price: Money,
    pub entry_date: NaiveDate,
}

impl Holding {
    /// `None` when the product overflows the decimal range
    pub fn cost_basis(&self) -> Option<Money> {
        self.shares.checked_mul(self.entry_price)
    }

    /// Percent change of `current_price` against the entry price
    pub fn change_pct(&self, current_price: f64) -> f64 {
        let entry = self.entry_price.to_f64();
        if entry <= 0.0 {
            return 0.0;
        }
        (current_price / entry - 1.0) * 100.0
    }
}

/// Externally supplied positions keyed by symbol (read-only to the engine)
pub type Portfolio = BTreeMap<Symbol, Holding>;

// ============================================================================
// Money Type - Precise Decimal Arithmetic for Monetary Values
// ============================================================================

use rust_decimal::Decimal;
use std::fmt;

/// Decimal share counts and entry prices.
///
/// Portfolio files may carry either JSON numbers or strings; both decode
/// without float drift.
///
/// # Example
/// ```
/// use momentum_screener::Money;
/// let price = Money::from_f64(100.50);
/// let qty = Money::from_f64(2.0);
/// assert_eq!(price.checked_mul(qty).map(Money::to_f64), Some(201.0));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// NaN and infinities collapse to zero
    pub fn from_f64(value: f64) -> Self {
        if !value.is_finite() {
            return Money::ZERO;
        }
        Money(
            Decimal::try_from(value)
                .ok()
                .or_else(|| Decimal::from_f64_retain(value))
                .unwrap_or(Decimal::ZERO),
        )
    }

    pub fn to_f64(self) -> f64 {
        use rust_decimal::prelude::ToPrimitive;
        self.0.to_f64().unwrap_or(0.0)
    }

    /// `None` on overflow
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    /// `None` on overflow
    pub fn checked_mul(self, rhs: Money) -> Option<Money> {
        self.0.checked_mul(rhs.0).map(Money)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_candle_validation() {
        assert!(Candle::new(day(1), 10.0, 11.0, 9.0, 10.5, 100.0).is_ok());
        assert!(matches!(
            Candle::new(day(1), 10.0, 9.0, 11.0, 10.0, 100.0),
            Err(CandleValidationError::HighLessThanLow { .. })
        ));
        assert!(matches!(
            Candle::new(day(1), 10.0, 11.0, 9.0, 12.0, 100.0),
            Err(CandleValidationError::CloseOutOfRange { .. })
        ));
        assert!(matches!(
            Candle::new(day(1), 0.0, 11.0, 9.0, 10.0, 100.0),
            Err(CandleValidationError::NonPositivePrice { .. })
        ));
        assert!(matches!(
            Candle::new(day(1), 10.0, 11.0, 9.0, 10.0, -1.0),
            Err(CandleValidationError::NegativeVolume(_))
        ));
    }

    #[test]
    fn test_series_rejects_unordered_dates() {
        let series = PriceSeries::new(
            Symbol::new("AAA"),
            vec![
                Candle::new_unchecked(day(2), 10.0, 11.0, 9.0, 10.0, 1.0),
                Candle::new_unchecked(day(1), 10.0, 11.0, 9.0, 10.0, 1.0),
            ],
        );
        assert!(matches!(
            series.validate(),
            Err(CandleValidationError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn test_symbol_ordering_is_lexical() {
        let mut symbols = vec![Symbol::new("MSFT"), Symbol::new("AAPL"), Symbol::new("GOOG")];
        symbols.sort();
        assert_eq!(symbols[0].as_str(), "AAPL");
        assert_eq!(symbols[2].as_str(), "MSFT");
    }

    #[test]
    fn test_holding_change_pct() {
        let holding = Holding {
            shares: Money::from_f64(10.0),
            entry_price: Money::from_f64(50.0),
            entry_date: day(3),
        };
        assert!((holding.change_pct(45.0) + 10.0).abs() < 1e-9);
        assert_eq!(holding.cost_basis().map(Money::to_f64), Some(500.0));
    }

    #[test]
    fn test_money_precision() {
        let a = Money::from_f64(0.1);
        let b = Money::from_f64(0.2);
        let c = Money::from_f64(0.3);
        assert_eq!(a.checked_add(b), Some(c));
        assert_eq!(Money::from_f64(f64::NAN), Money::ZERO);
    }

    #[test]
    fn test_money_overflow_is_reported() {
        let huge: Money = serde_json::from_str("\"79228162514264337593543950335\"").unwrap();
        let holding = Holding {
            shares: huge,
            entry_price: Money::from_f64(2.0),
            entry_date: day(3),
        };
        assert_eq!(holding.cost_basis(), None);
        assert_eq!(huge.checked_add(huge), None);
        assert!(huge.checked_add(Money::ZERO).is_some());
    }

    #[test]
    fn test_money_serde() {
        let money = Money::from_f64(123.456);
        let json = serde_json::to_string(&money).unwrap();
        let parsed: Money = serde_json::from_str(&json).unwrap();
        assert_eq!(money, parsed);

        // portfolio files may carry plain numbers
        let from_number: Money = serde_json::from_str("12.5").unwrap();
        assert_eq!(from_number, Money::from_f64(12.5));
        let from_string: Money = serde_json::from_str("\"12.5\"").unwrap();
        assert_eq!(from_string, from_number);
    }
}
