//! Symbol normalization
//!
//! Raw identifiers arrive in many shapes (`nasdaq:aapl`, `$TSLA`, `BRK.B `).
//! Everything past the data adapters works with the canonical form produced
//! here: upper case, no exchange prefix or cashtag, class separator `-`.

use crate::Symbol;

/// Normalize a raw identifier, `None` if nothing usable remains
pub fn normalize_symbol(raw: &str) -> Option<Symbol> {
    let trimmed = raw.trim();
    let without_exchange = match trimmed.rsplit_once(':') {
        Some((_, ticker)) => ticker,
        None => trimmed,
    };
    let ticker = without_exchange.trim().trim_start_matches('$');

    let normalized: String = ticker
        .chars()
        .map(|c| match c {
            '.' | '/' => '-',
            other => other.to_ascii_uppercase(),
        })
        .collect();

    let valid = !normalized.is_empty()
        && !normalized.starts_with('-')
        && !normalized.ends_with('-')
        && normalized
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '^');

    valid.then(|| Symbol::new(normalized))
}

/// Normalize a list, dropping unusable entries and duplicates
pub fn normalize_all<'a>(raw: impl IntoIterator<Item = &'a str>) -> Vec<Symbol> {
    let mut symbols: Vec<Symbol> = raw
        .into_iter()
        .filter_map(|s| {
            let normalized = normalize_symbol(s);
            if normalized.is_none() {
                tracing::warn!("Ignoring unusable symbol {:?}", s);
            }
            normalized
        })
        .collect();
    symbols.sort();
    symbols.dedup();
    symbols
}
