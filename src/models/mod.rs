use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ── Ticker code ───────────────────────────────────────────────────────────────

/// Four-digit TSE security code, e.g. `7203`.
///
/// Only constructible through [`TickerCode::parse`], so every value holds
/// exactly four ASCII digits.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TickerCode(String);

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("invalid ticker code {0:?}: expected 4 ASCII digits")]
pub struct CodeError(pub String);

impl TickerCode {
    pub fn parse(s: &str) -> Result<Self, CodeError> {
        let s = s.trim();
        if s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(s.to_string()))
        } else {
            Err(CodeError(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for TickerCode {
    type Err = CodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TickerCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Listing row ───────────────────────────────────────────────────────────────

/// One row of the 52-week-high listing. PER/PBR stay as displayed
/// ("12.3", "－", ...), no numeric parsing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TickerRecord {
    pub code: TickerCode,
    pub name: String,
    pub market: String,
    pub per: String,
    pub pbr: String,
}

// ── Enriched row ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RatedTicker {
    pub record: TickerRecord,
    /// `None` when the rating site had nothing for this code.
    pub performance_rating: Option<String>,
}

impl RatedTicker {
    pub fn new(record: TickerRecord, performance_rating: Option<String>) -> Self {
        Self { record, performance_rating }
    }
}
