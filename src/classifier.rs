//! Query classification helpers
//!
//! Decides whether a query is about markets (so the multi-agent path can
//! pair live stock data with a web search) and validates ticker symbols.

/// Static keyword list, matched case-insensitively
const FINANCE_KEYWORDS: &[&str] = &[
    "stock",
    "price",
    "financial",
    "investment",
    "market",
    "analyst",
    "recommendation",
    "earnings",
];

const MAX_SYMBOL_LEN: usize = 12;

/// True when the query mentions any finance keyword (case-insensitive).
pub fn is_finance_query(query: &str) -> bool {
    let lowered = query.to_lowercase();
    FINANCE_KEYWORDS.iter().any(|kw| lowered.contains(kw))
}

/// Trim and upper-case a ticker symbol, rejecting anything that cannot be one.
///
/// Accepts letters, digits and `. - ^ =` (covers `BRK.B`, `^GSPC`, `EURUSD=X`).
pub fn normalize_symbol(raw: &str) -> Option<String> {
    let symbol = raw.trim().trim_start_matches('$').to_uppercase();

    let valid = !symbol.is_empty()
        && symbol.len() <= MAX_SYMBOL_LEN
        && symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='));

    valid.then_some(symbol)
}
