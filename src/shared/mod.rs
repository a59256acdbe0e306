//! Shared newtypes used across all domain modules.
//!
//! These types are serialization-transparent: they serialize/deserialize identically
//! to the raw format the feed sends, so they can be used directly in wire types
//! without conversion overhead.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::str::FromStr;

use crate::error::SdkError;

// ─── Ticker ──────────────────────────────────────────────────────────────────

/// Exchange symbol for a tradable instrument (e.g. `"AAPL"`).
///
/// Always stored trimmed and uppercased, so `"aapl"`, `" AAPL "` and `"AAPL"`
/// compare equal once parsed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticker(String);

impl Ticker {
    /// Normalize raw input into a ticker. Returns `None` when nothing is left
    /// after trimming.
    pub fn parse(s: &str) -> Option<Self> {
        let normalized = s.trim().to_uppercase();
        if normalized.is_empty() {
            None
        } else {
            Some(Self(normalized))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Ticker {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ticker::parse(s).ok_or_else(|| SdkError::Validation(format!("empty ticker: {s:?}")))
    }
}

impl AsRef<str> for Ticker {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Ticker {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Ticker {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

impl Serialize for Ticker {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Ticker {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ticker::parse(&s).ok_or_else(|| serde::de::Error::custom(format!("empty ticker: {s:?}")))
    }
}

// ─── Period ──────────────────────────────────────────────────────────────────

/// Bar granularity requested from the feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Period {
    #[serde(rename = "1d")]
    Day1,
    #[default]
    #[serde(rename = "1mo")]
    Month1,
    #[serde(rename = "3mo")]
    Month3,
    #[serde(rename = "6mo")]
    Month6,
    #[serde(rename = "1y")]
    Year1,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day1 => "1d",
            Self::Month1 => "1mo",
            Self::Month3 => "3mo",
            Self::Month6 => "6mo",
            Self::Year1 => "1y",
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Period {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1d" => Ok(Self::Day1),
            "1mo" => Ok(Self::Month1),
            "3mo" => Ok(Self::Month3),
            "6mo" => Ok(Self::Month6),
            "1y" => Ok(Self::Year1),
            other => Err(SdkError::Validation(format!("unknown period: {other:?}"))),
        }
    }
}

// ─── Utilities ───────────────────────────────────────────────────────────────

/// Normalize a raw ticker list: trim, uppercase, drop empties, de-duplicate
/// keeping the first occurrence.
pub fn normalize_tickers<I, S>(raw: I) -> Vec<Ticker>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<Ticker> = Vec::new();
    for ticker in raw.into_iter().filter_map(|s| Ticker::parse(s.as_ref())) {
        if !out.contains(&ticker) {
            out.push(ticker);
        }
    }
    out
}
