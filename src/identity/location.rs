//! Peer locations and content hashes
//!
//! A location is one running node of a friend (one certificate, one
//! machine). Locations and content hashes are plain fixed-size byte
//! identifiers; parsing them out of certificates happens elsewhere.

use crate::error::IdentityError;
use std::fmt;
use std::str::FromStr;

/// Length of a location identifier in bytes
pub const LOCATION_ID_LENGTH: usize = 16;

/// Length of a content hash in bytes (160 bits)
pub const SHA1_LENGTH: usize = 20;

fn from_hex<const N: usize>(s: &str, kind: &'static str) -> Result<[u8; N], IdentityError> {
    if s.len() != N * 2 {
        return Err(IdentityError::InvalidLength {
            kind,
            expected: N * 2,
            actual: s.len(),
        });
    }

    let mut bytes = [0u8; N];
    hex::decode_to_slice(s, &mut bytes).map_err(|_| IdentityError::InvalidCharacter { kind })?;
    Ok(bytes)
}

/// Stable identifier of a peer location
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct LocationId([u8; LOCATION_ID_LENGTH]);

impl LocationId {
    /// Create a LocationId from raw bytes
    pub fn from_bytes(bytes: [u8; LOCATION_ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; LOCATION_ID_LENGTH] {
        &self.0
    }

    /// Generate a random identifier
    pub fn random() -> Self {
        Self(rand::random())
    }

    /// Convert to hexadecimal string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hexadecimal string
    pub fn from_hex(s: &str) -> Result<Self, IdentityError> {
        from_hex(s, "LocationId").map(Self)
    }
}

impl fmt::Display for LocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for LocationId {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// A peer location: identifier plus a human readable name
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Location {
    id: LocationId,
    name: String,
}

impl Location {
    /// Create a location
    pub fn new(id: LocationId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }

    /// Identifier of this location
    pub fn id(&self) -> LocationId {
        self.id
    }

    /// Display name of this location
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// A 160-bit content hash, as carried by tunnel requests
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Sha1Sum([u8; SHA1_LENGTH]);

impl Sha1Sum {
    /// Create a hash from raw bytes
    pub fn from_bytes(bytes: [u8; SHA1_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; SHA1_LENGTH] {
        &self.0
    }

    /// Convert to hexadecimal string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hexadecimal string
    pub fn from_hex(s: &str) -> Result<Self, IdentityError> {
        from_hex(s, "Sha1Sum").map(Self)
    }
}

impl fmt::Display for Sha1Sum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Sha1Sum {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_id_hex() {
        let id = LocationId::from_bytes([0xab; LOCATION_ID_LENGTH]);
        let hex = id.to_hex();
        assert_eq!(hex.len(), 32);
        assert_eq!(LocationId::from_hex(&hex).unwrap(), id);
    }

    #[test]
    fn test_location_id_bad_length() {
        let err = LocationId::from_hex("abcd").unwrap_err();
        assert_eq!(
            err,
            IdentityError::InvalidLength {
                kind: "LocationId",
                expected: 32,
                actual: 4,
            }
        );
    }

    #[test]
    fn test_sha1_bad_character() {
        let s = "zz".repeat(SHA1_LENGTH);
        assert!(matches!(
            Sha1Sum::from_hex(&s),
            Err(IdentityError::InvalidCharacter { kind: "Sha1Sum" })
        ));
    }

    #[test]
    fn test_signed_pair_rejected() {
        let s = format!("+a{}", "00".repeat(LOCATION_ID_LENGTH - 1));
        assert!(matches!(
            LocationId::from_hex(&s),
            Err(IdentityError::InvalidCharacter { kind: "LocationId" })
        ));

        let s = format!("{}-1", "00".repeat(SHA1_LENGTH - 1));
        assert!(s.parse::<Sha1Sum>().is_err());
    }

    #[test]
    fn test_uppercase_hex_accepted() {
        let id: LocationId = "ABABABABABABABABABABABABABABABAB".parse().unwrap();
        assert_eq!(id, LocationId::from_bytes([0xab; LOCATION_ID_LENGTH]));
        assert_eq!(id.to_hex(), "ab".repeat(LOCATION_ID_LENGTH));
    }

    #[test]
    fn test_sha1_parse() {
        let hash: Sha1Sum = "00112233445566778899aabbccddeeff00112233".parse().unwrap();
        assert_eq!(hash.as_bytes()[1], 0x11);
        assert_eq!(hash.to_string(), "00112233445566778899aabbccddeeff00112233");
    }

    #[test]
    fn test_random_locations_differ() {
        assert_ne!(LocationId::random(), LocationId::random());
    }

    #[test]
    fn test_location_display() {
        let location = Location::new(LocationId::default(), "laptop");
        assert!(location.to_string().starts_with("laptop ("));
        assert_eq!(location.name(), "laptop");
    }
}
