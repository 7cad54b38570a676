// auction_core/src/types/side.rs
//
// The ONE TRUE Side Enum.
//
// The original Python distinguished sides with a plain string Enum
// ("BUY" / "SELL"). This Rust enum replaces the string comparisons with a
// single-byte tag, kept case-insensitively parseable at the boundary where
// orders enter the system.

use std::fmt;

/// Order side: Buy or Sell. Represented as a single byte (`u8`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Side {
    Buy = 1,
    Sell = 2,
}

impl Side {
    /// Parse from a string (case-insensitive).
    pub fn from_str(s: &str) -> Result<Self, String> {
        match s.to_ascii_lowercase().as_str() {
            "buy" => Ok(Side::Buy),
            "sell" => Ok(Side::Sell),
            _ => Err("Side must be 'buy' or 'sell'".to_string()),
        }
    }

    /// The opposite side.
    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    /// Sign multiplier: Buy = +1, Sell = -1.
    pub fn sign(&self) -> i64 {
        match self {
            Side::Buy => 1,
            Side::Sell => -1,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}
