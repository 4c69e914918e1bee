use crate::{
    Result,
    constants::{AUTH_KEY_LENGTH, MAX_SKU_LENGTH, MIN_SKU_LENGTH},
    error::Error,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// Stock-keeping unit identifying a filament product.
///
/// SKUs are case-insensitive; the stored form is trimmed and uppercased so
/// that `pla001` and `PLA001` resolve to the same payload.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Sku(String);

impl Sku {
    /// Create a new SKU with validation.
    ///
    /// The value is normalized (trimmed and converted to uppercase) before
    /// validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidSku` if:
    /// - The length is not between 3-32 characters after trimming
    /// - The SKU contains characters other than ASCII alphanumerics,
    ///   `-` or `_`
    pub fn new(sku: &str) -> Result<Self> {
        let sku = sku.trim().to_uppercase();

        let len = sku.len();
        if !(MIN_SKU_LENGTH..=MAX_SKU_LENGTH).contains(&len) {
            return Err(Error::InvalidSku(format!(
                "SKU must be {MIN_SKU_LENGTH}-{MAX_SKU_LENGTH} chars, got {len}"
            )));
        }

        if !sku
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(Error::InvalidSku(format!(
                "SKU may only contain ASCII alphanumerics, '-' or '_': {sku}"
            )));
        }

        Ok(Sku(sku))
    }

    /// Get the normalized SKU as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercase form used for payload file names on disk.
    #[must_use]
    pub fn file_stem(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Sku {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Sku::new(s)
    }
}

/// MIFARE Classic authentication key (6 bytes, 12 hex characters).
///
/// # Security
/// This type implements constant-time comparison so that key checks in the
/// mock device do not leak how many leading characters matched.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
pub struct AuthKey(String);

impl AuthKey {
    /// Create a new authentication key with validation.
    ///
    /// The key is normalized to uppercase hex.
    ///
    /// # Errors
    /// Returns `Error::InvalidAuthKey` if the key is not exactly 12 hex
    /// characters.
    pub fn new(key: &str) -> Result<Self> {
        let key = key.trim().to_uppercase();

        if key.len() != AUTH_KEY_LENGTH {
            return Err(Error::InvalidAuthKey(format!(
                "key must be {AUTH_KEY_LENGTH} hex chars, got {}",
                key.len()
            )));
        }

        if !key.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidAuthKey(format!(
                "key must be hexadecimal: {key}"
            )));
        }

        Ok(AuthKey(key))
    }

    /// Get the key as an uppercase hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuthKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AuthKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        AuthKey::new(s)
    }
}

/// Constant-time comparison implementation for AuthKey
impl PartialEq for AuthKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_bytes().ct_eq(other.0.as_bytes()).into()
    }
}

impl std::hash::Hash for AuthKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

/// Tag position within a session (1 or 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagNumber(u8);

impl TagNumber {
    /// First tag of the spool.
    pub const FIRST: TagNumber = TagNumber(1);

    /// Second tag of the spool.
    pub const SECOND: TagNumber = TagNumber(2);

    /// Create a new tag number with validation.
    ///
    /// # Errors
    /// Returns `Error::InvalidTagNumber` unless the value is 1 or 2.
    pub fn new(n: u8) -> Result<Self> {
        if !(1..=2).contains(&n) {
            return Err(Error::InvalidTagNumber(n));
        }
        Ok(TagNumber(n))
    }

    /// Get the raw tag number as u8.
    #[must_use]
    pub fn as_u8(&self) -> u8 {
        self.0
    }
}

impl fmt::Display for TagNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier of a programming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    /// Generate a fresh random session identifier.
    #[must_use]
    pub fn new() -> Self {
        SessionId(uuid::Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("PLA001", "PLA001")]
    #[case("pla001", "PLA001")]
    #[case("  petg-003  ", "PETG-003")]
    #[case("abs_002", "ABS_002")]
    fn test_sku_normalization(#[case] input: &str, #[case] expected: &str) {
        let sku = Sku::new(input).unwrap();
        assert_eq!(sku.as_str(), expected);
    }

    #[rstest]
    #[case("")]
    #[case("AB")]
    #[case("PLA 001")]
    #[case("PLA@001")]
    fn test_sku_rejects_invalid(#[case] input: &str) {
        assert!(Sku::new(input).is_err());
    }

    #[test]
    fn test_sku_case_insensitive_equality() {
        assert_eq!(Sku::new("pla001").unwrap(), Sku::new("PLA001").unwrap());
    }

    #[test]
    fn test_sku_file_stem() {
        let sku = Sku::new("PLA001").unwrap();
        assert_eq!(sku.file_stem(), "pla001");
    }

    #[test]
    fn test_auth_key_valid() {
        let key = AuthKey::new("ffffffffffff").unwrap();
        assert_eq!(key.as_str(), "FFFFFFFFFFFF");
    }

    #[rstest]
    #[case("FFFFFFFFFFF")] // 11 chars
    #[case("FFFFFFFFFFFFF")] // 13 chars
    #[case("GGGGGGGGGGGG")] // not hex
    #[case("")]
    fn test_auth_key_invalid(#[case] input: &str) {
        assert!(AuthKey::new(input).is_err());
    }

    #[test]
    fn test_auth_key_equality_is_normalized() {
        let a = AuthKey::new("a0b1c2d3e4f5").unwrap();
        let b = AuthKey::new("A0B1C2D3E4F5").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_tag_number_range() {
        assert!(TagNumber::new(1).is_ok());
        assert!(TagNumber::new(2).is_ok());
        assert!(TagNumber::new(0).is_err());
        assert!(TagNumber::new(3).is_err());
        assert_eq!(TagNumber::FIRST.as_u8(), 1);
        assert_eq!(TagNumber::SECOND.as_u8(), 2);
    }

    #[test]
    fn test_session_id_unique() {
        assert_ne!(SessionId::new(), SessionId::new());
    }

    #[test]
    fn test_tag_number_serializes_as_number() {
        let json = serde_json::to_string(&TagNumber::SECOND).unwrap();
        assert_eq!(json, "2");
    }
}
