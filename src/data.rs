//! Data loading
//!
//! The numeric core only talks to [`MarketDataProvider`]. This module ships a
//! CSV-directory adapter, an in-memory adapter, and the JSON loaders for
//! fundamentals and the portfolio.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::DataConfig;
use crate::symbols::{normalize_all, normalize_symbol};
use crate::{Candle, CandleValidationError, Fundamentals, Portfolio, PriceSeries, Symbol};

#[derive(Debug, Error)]
pub enum DataError {
    #[error("no data for {symbol} at {path}")]
    NotFound { symbol: Symbol, path: PathBuf },

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read CSV {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("{path} row {row}: {message}")]
    Parse {
        path: PathBuf,
        row: usize,
        message: String,
    },

    #[error("failed to parse JSON {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid candles for {symbol}: {source}")]
    InvalidCandles {
        symbol: Symbol,
        #[source]
        source: CandleValidationError,
    },

    #[error("{0} has no price history")]
    Empty(Symbol),
}

/// Source of prices and fundamentals for one run
pub trait MarketDataProvider: Send + Sync {
    /// Symbols to screen, already normalized
    fn universe(&self) -> Vec<Symbol>;

    fn price_series(&self, symbol: &Symbol) -> Result<PriceSeries, DataError>;

    fn benchmark_series(&self) -> Result<PriceSeries, DataError>;

    /// Unknown fundamentals are `None`, never an error
    fn fundamentals(&self, symbol: &Symbol) -> Option<Fundamentals>;
}

// =============================================================================
// CSV Data Loading
// =============================================================================

/// Load daily OHLCV bars from a CSV file (`date,open,high,low,close,volume`)
///
/// The date column accepts `YYYY-MM-DD` or any timestamp starting with it.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Candle>, DataError> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path).map_err(|source| DataError::Csv {
        path: path.to_path_buf(),
        source,
    })?;

    let mut candles = Vec::new();

    for (row_idx, result) in reader.records().enumerate() {
        let row = row_idx + 1;
        let record = result.map_err(|source| DataError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        let parse_error = |message: String| DataError::Parse {
            path: path.to_path_buf(),
            row,
            message,
        };

        let date_str = record
            .get(0)
            .ok_or_else(|| parse_error("missing date column".into()))?;
        let date = parse_date(date_str)
            .ok_or_else(|| parse_error(format!("failed to parse date {:?}", date_str)))?;

        let field = |idx: usize, name: &str| -> Result<f64, DataError> {
            record
                .get(idx)
                .ok_or_else(|| parse_error(format!("missing {} column", name)))?
                .trim()
                .parse::<f64>()
                .map_err(|e| parse_error(format!("failed to parse {}: {}", name, e)))
        };

        let open = field(1, "open")?;
        let high = field(2, "high")?;
        let low = field(3, "low")?;
        let close = field(4, "close")?;
        let volume = field(5, "volume")?;

        candles.push(Candle::new_unchecked(date, open, high, low, close, volume));
    }

    Ok(candles)
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| raw.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()))
}

/// Load a per-symbol fundamentals map (`{"AAPL": {...}, ...}`); keys are normalized
pub fn load_fundamentals(path: impl AsRef<Path>) -> Result<HashMap<Symbol, Fundamentals>, DataError> {
    let raw: HashMap<String, Fundamentals> = read_json(path.as_ref())?;
    Ok(raw
        .into_iter()
        .filter_map(|(key, value)| normalize_symbol(&key).map(|s| (s, value)))
        .collect())
}

/// Load the held positions (`{"AAPL": {"shares": 10, "entry_price": 150.0, "entry_date": "2024-01-02"}}`)
pub fn load_portfolio(path: impl AsRef<Path>) -> Result<Portfolio, DataError> {
    let raw: HashMap<String, crate::Holding> = read_json(path.as_ref())?;
    let mut portfolio = Portfolio::new();
    for (key, holding) in raw {
        match normalize_symbol(&key) {
            Some(symbol) => {
                portfolio.insert(symbol, holding);
            }
            None => warn!("Ignoring portfolio entry with unusable symbol {:?}", key),
        }
    }
    Ok(portfolio)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, DataError> {
    let contents = std::fs::read_to_string(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&contents).map_err(|source| DataError::Json {
        path: path.to_path_buf(),
        source,
    })
}

// =============================================================================
// Providers
// =============================================================================

/// Reads `{data_dir}/{SYMBOL}.csv` per symbol
#[derive(Debug, Clone)]
pub struct CsvDataProvider {
    data_dir: PathBuf,
    benchmark: Symbol,
    universe: Vec<Symbol>,
    fundamentals: HashMap<Symbol, Fundamentals>,
    /// Files whose name differs from the canonical symbol (e.g. `msft.csv`)
    files: HashMap<Symbol, PathBuf>,
}

impl CsvDataProvider {
    pub fn new(data_dir: impl Into<PathBuf>, benchmark: Symbol, universe: Vec<Symbol>) -> Self {
        CsvDataProvider {
            data_dir: data_dir.into(),
            benchmark,
            universe,
            fundamentals: HashMap::new(),
            files: HashMap::new(),
        }
    }

    pub fn with_fundamentals(mut self, fundamentals: HashMap<Symbol, Fundamentals>) -> Self {
        self.fundamentals = fundamentals;
        self
    }

    /// Build from config; an empty universe means every CSV in the data directory
    pub fn from_config(config: &DataConfig) -> Result<Self, DataError> {
        let data_dir = PathBuf::from(&config.data_dir);
        let benchmark = normalize_symbol(&config.benchmark_symbol).unwrap_or_else(|| config.benchmark());

        let files = discover_files(&data_dir)?;
        let universe = if config.universe.is_empty() {
            let mut found: Vec<Symbol> = files.keys().filter(|s| **s != benchmark).cloned().collect();
            found.sort();
            found
        } else {
            normalize_all(config.universe.iter().map(String::as_str))
        };

        let fundamentals = match &config.fundamentals_file {
            Some(path) => load_fundamentals(path)?,
            None => HashMap::new(),
        };

        info!(
            "CSV provider: {} symbols in {}, {} with fundamentals",
            universe.len(),
            data_dir.display(),
            fundamentals.len()
        );

        let mut provider =
            CsvDataProvider::new(data_dir, benchmark, universe).with_fundamentals(fundamentals);
        provider.files = files;
        Ok(provider)
    }

    fn path_for(&self, symbol: &Symbol) -> PathBuf {
        self.files
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| self.data_dir.join(format!("{}.csv", symbol.as_str())))
    }

    fn load(&self, symbol: &Symbol) -> Result<PriceSeries, DataError> {
        let path = self.path_for(symbol);
        if !path.exists() {
            return Err(DataError::NotFound {
                symbol: symbol.clone(),
                path,
            });
        }
        let candles = load_csv(&path)?;
        if candles.is_empty() {
            return Err(DataError::Empty(symbol.clone()));
        }
        let series = PriceSeries::new(symbol.clone(), candles);
        series.validate().map_err(|source| DataError::InvalidCandles {
            symbol: symbol.clone(),
            source,
        })?;
        debug!("Loaded {} candles for {}", series.len(), symbol);
        Ok(series)
    }
}

/// Map every `*.csv` in the directory to its normalized symbol
fn discover_files(data_dir: &Path) -> Result<HashMap<Symbol, PathBuf>, DataError> {
    if !data_dir.is_dir() {
        warn!("Data directory {} does not exist", data_dir.display());
        return Ok(HashMap::new());
    }
    let entries = std::fs::read_dir(data_dir).map_err(|source| DataError::Io {
        path: data_dir.to_path_buf(),
        source,
    })?;

    Ok(entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")))
        .filter_map(|path| {
            let stem = path.file_stem()?.to_string_lossy().into_owned();
            normalize_symbol(&stem).map(|symbol| (symbol, path))
        })
        .collect())
}

impl MarketDataProvider for CsvDataProvider {
    fn universe(&self) -> Vec<Symbol> {
        self.universe.clone()
    }

    fn price_series(&self, symbol: &Symbol) -> Result<PriceSeries, DataError> {
        self.load(symbol)
    }

    fn benchmark_series(&self) -> Result<PriceSeries, DataError> {
        self.load(&self.benchmark)
    }

    fn fundamentals(&self, symbol: &Symbol) -> Option<Fundamentals> {
        self.fundamentals.get(symbol).cloned()
    }
}

/// Provider over series already held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryDataProvider {
    benchmark: Option<PriceSeries>,
    series: HashMap<Symbol, PriceSeries>,
    fundamentals: HashMap<Symbol, Fundamentals>,
}

impl MemoryDataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_benchmark(mut self, benchmark: PriceSeries) -> Self {
        self.benchmark = Some(benchmark);
        self
    }

    pub fn with_series(mut self, series: PriceSeries) -> Self {
        self.series.insert(series.symbol.clone(), series);
        self
    }

    pub fn with_fundamentals(mut self, symbol: Symbol, fundamentals: Fundamentals) -> Self {
        self.fundamentals.insert(symbol, fundamentals);
        self
    }
}

impl MarketDataProvider for MemoryDataProvider {
    fn universe(&self) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self.series.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    fn price_series(&self, symbol: &Symbol) -> Result<PriceSeries, DataError> {
        self.series.get(symbol).cloned().ok_or_else(|| DataError::NotFound {
            symbol: symbol.clone(),
            path: PathBuf::from("<memory>"),
        })
    }

    fn benchmark_series(&self) -> Result<PriceSeries, DataError> {
        self.benchmark.clone().ok_or_else(|| DataError::NotFound {
            symbol: Symbol::new("BENCHMARK"),
            path: PathBuf::from("<memory>"),
        })
    }

    fn fundamentals(&self, symbol: &Symbol) -> Option<Fundamentals> {
        self.fundamentals.get(symbol).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "AAPL.csv",
            "date,open,high,low,close,volume\n\
             2024-01-02,100,105,99,104,1500000\n\
             2024-01-03 00:00:00,104,106,103,105.5,1200000\n",
        );
        let candles = load_csv(&path).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[1].date, NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
        assert_eq!(candles[1].close, 105.5);
    }

    #[test]
    fn test_load_csv_reports_bad_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            dir.path(),
            "BAD.csv",
            "date,open,high,low,close,volume\n2024-01-02,100,abc,99,104,1\n",
        );
        match load_csv(&path) {
            Err(DataError::Parse { row, message, .. }) => {
                assert_eq!(row, 1);
                assert!(message.contains("high"));
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_csv_provider_discovers_universe() {
        let dir = tempfile::tempdir().unwrap();
        let rows = "date,open,high,low,close,volume\n2024-01-02,10,11,9,10,100\n";
        write_file(dir.path(), "SPY.csv", rows);
        write_file(dir.path(), "msft.csv", rows);
        write_file(dir.path(), "AAPL.csv", rows);
        write_file(dir.path(), "notes.txt", "ignored");

        let config = DataConfig {
            data_dir: dir.path().to_string_lossy().into_owned(),
            ..DataConfig::default()
        };
        let provider = CsvDataProvider::from_config(&config).unwrap();
        assert_eq!(
            provider.universe(),
            vec![Symbol::new("AAPL"), Symbol::new("MSFT")]
        );
        assert_eq!(provider.benchmark_series().unwrap().len(), 1);
        assert_eq!(provider.price_series(&Symbol::new("MSFT")).unwrap().len(), 1);
        assert!(matches!(
            provider.price_series(&Symbol::new("NVDA")),
            Err(DataError::NotFound { .. })
        ));
    }

    #[test]
    fn test_load_fundamentals_and_portfolio() {
        let dir = tempfile::tempdir().unwrap();
        let fundamentals = write_file(
            dir.path(),
            "fundamentals.json",
            r#"{"aapl": {"revenue_growth": 12.0, "earnings_positive_flag": true}, "msft": {}}"#,
        );
        let map = load_fundamentals(&fundamentals).unwrap();
        assert_eq!(map[&Symbol::new("AAPL")].revenue_growth, Some(12.0));
        assert_eq!(map[&Symbol::new("MSFT")], Fundamentals::default());

        let portfolio = write_file(
            dir.path(),
            "portfolio.json",
            r#"{"nasdaq:aapl": {"shares": 10, "entry_price": "150.25", "entry_date": "2024-01-02"}}"#,
        );
        let positions = load_portfolio(&portfolio).unwrap();
        let holding = &positions[&Symbol::new("AAPL")];
        assert_eq!(holding.shares.to_f64(), 10.0);
        assert_eq!(holding.entry_price.to_f64(), 150.25);
    }

    #[test]
    fn test_missing_json_is_io_error() {
        assert!(matches!(
            load_portfolio("/nonexistent/portfolio.json"),
            Err(DataError::Io { .. })
        ));
    }
}
