use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::ADDRESS_LEN;
use crate::error::PresenceError;

/// Unix timestamp (seconds, UTC).
pub type Timestamp = i64;

/// Stake attached to a declaration, in the smallest token unit.
pub type Balance = u128;

/// Current wall-clock time as a Unix timestamp.
pub fn unix_now() -> Timestamp {
    chrono::Utc::now().timestamp()
}

// ── EpochId ──────────────────────────────────────────────────────────────────

/// Sequential epoch identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct EpochId(pub u64);

impl EpochId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn inner(self) -> u64 {
        self.0
    }

    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Big-endian bytes; keeps sled keys ordered by epoch number.
    pub fn to_be_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl From<u64> for EpochId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for EpochId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for EpochId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EpochId({})", self.0)
    }
}

// ── Address ──────────────────────────────────────────────────────────────────

/// 20-byte actor address.
///
/// Parsed from 40 hex digits with or without a `0x` prefix, in any casing.
/// Equality and hashing are on the raw bytes, so `0xABCD…` and `abcd…` are
/// the same address. Always rendered as lowercase with a `0x` prefix.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    pub fn from_bytes(b: [u8; ADDRESS_LEN]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// Build an address from a byte slice, which must be exactly 20 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, PresenceError> {
        let arr: [u8; ADDRESS_LEN] = bytes.try_into().map_err(|_| {
            PresenceError::InvalidAddress(format!(
                "expected {ADDRESS_LEN} bytes, got {}",
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    /// Parse a hex address, accepting an optional `0x`/`0X` prefix.
    pub fn parse(s: &str) -> Result<Self, PresenceError> {
        let trimmed = s.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if digits.len() != ADDRESS_LEN * 2 {
            return Err(PresenceError::InvalidAddress(format!(
                "expected {} hex digits, got {}",
                ADDRESS_LEN * 2,
                digits.len()
            )));
        }

        let bytes = hex::decode(digits)
            .map_err(|e| PresenceError::InvalidAddress(format!("{s}: {e}")))?;
        Self::from_slice(&bytes)
    }

    /// Canonical form: `0x` followed by 40 lowercase hex digits.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }

    /// Abbreviated form for logs and status lines, e.g. `0x1234…abcd`.
    pub fn short(&self) -> String {
        let full = self.to_hex();
        format!("{}…{}", &full[..6], &full[full.len() - 4..])
    }
}

impl FromStr for Address {
    type Err = PresenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = PresenceError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Address> for String {
    fn from(a: Address) -> Self {
        a.to_hex()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.short())
    }
}
