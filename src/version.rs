//! Schema version algebra.
//!
//! A [`Version`] is the (major, minor, patch) triple stamped on the
//! on-disk layout of the persistent key-value store. The engine parses it
//! out of stored bytes, compares it against the registry of migration
//! steps, and serializes it back when a migration commits.
//!
//! ## Wire format
//!
//! A length-prefixed binary record: a 4-byte big-endian size followed by
//! exactly that many payload bytes, the same shape `steps::rekey_tasks`
//! uses for legacy task records. The payload is three big-endian `u32`
//! fields (major, minor, patch), so the size prefix is always
//! [`PAYLOAD_LEN`]; `parse` rejects any blob whose prefix doesn't match
//! the bytes actually present. This is intentionally hand-rolled rather
//! than routed through a serialization crate, so the on-disk format never
//! shifts under an unrelated dependency bump.

use crate::error::MigrationError;
use byteorder::{BigEndian, ByteOrder};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of bytes in the length prefix itself.
const HEADER_LEN: usize = 4;
/// Number of payload bytes following the prefix: three `u32` fields.
const PAYLOAD_LEN: usize = 12;

/// The (major, minor, patch) identifier of the on-disk schema layout.
///
/// `Version::default()` is the sentinel `(0, 0, 0)` used to mean
/// "empty/unknown" — see [`Version::is_empty`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    /// Builds a version from its three components.
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self { major, minor, patch }
    }

    /// The sentinel value representing "no version has been stored yet".
    pub const fn empty() -> Self {
        Self::new(0, 0, 0)
    }

    /// True iff `self` is the `(0, 0, 0)` sentinel.
    ///
    /// This is checked structurally against the three fields rather than
    /// relying on `Version`'s derived `PartialEq` against a constructed
    /// sentinel, so the invariant holds even if the type grows fields later.
    pub fn is_empty(&self) -> bool {
        self.major == 0 && self.minor == 0 && self.patch == 0
    }

    /// Parses a serialized version record: a 4-byte big-endian length
    /// prefix followed by that many payload bytes.
    ///
    /// # Errors
    /// Returns [`MigrationError::CorruptVersion`] if `bytes` is shorter
    /// than the header, the prefix doesn't equal [`PAYLOAD_LEN`], or the
    /// payload doesn't exactly fill the remaining bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, MigrationError> {
        if bytes.len() < HEADER_LEN {
            return Err(MigrationError::CorruptVersion { len: bytes.len() });
        }

        let payload_len = BigEndian::read_u32(&bytes[0..HEADER_LEN]) as usize;
        if payload_len != PAYLOAD_LEN || bytes.len() != HEADER_LEN + payload_len {
            return Err(MigrationError::CorruptVersion { len: bytes.len() });
        }

        let payload = &bytes[HEADER_LEN..];
        Ok(Self::new(
            BigEndian::read_u32(&payload[0..4]),
            BigEndian::read_u32(&payload[4..8]),
            BigEndian::read_u32(&payload[8..12]),
        ))
    }

    /// Serializes this version to its length-prefixed big-endian record.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LEN + PAYLOAD_LEN];
        BigEndian::write_u32(&mut buf[0..HEADER_LEN], PAYLOAD_LEN as u32);
        BigEndian::write_u32(&mut buf[HEADER_LEN..HEADER_LEN + 4], self.major);
        BigEndian::write_u32(&mut buf[HEADER_LEN + 4..HEADER_LEN + 8], self.minor);
        BigEndian::write_u32(&mut buf[HEADER_LEN + 8..HEADER_LEN + 12], self.patch);
        buf
    }

    /// Parses the `current` version out of a build metadata string of the
    /// form `"<major>.<minor>.<patch>..."` — anything after the third
    /// dotted component (pre-release tags, build metadata, etc.) is
    /// ignored.
    ///
    /// # Errors
    /// Returns [`MigrationError::BadBuildVersion`] if `build_string` does
    /// not start with `\d+.\d+.\d+`.
    pub fn current_from_build(build_string: &str) -> Result<Self, MigrationError> {
        let mut parts = build_string.splitn(4, '.');
        let bad = || MigrationError::BadBuildVersion { build_string: build_string.to_string() };

        let major: u32 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        let minor: u32 = parts.next().ok_or_else(bad)?.parse().map_err(|_| bad())?;
        // The patch component may have trailing non-digit characters
        // attached directly (e.g. "3-rc1"); take only the leading digits.
        let patch_part = parts.next().ok_or_else(bad)?;
        let digit_prefix_len = patch_part.find(|c: char| !c.is_ascii_digit()).unwrap_or(patch_part.len());
        if digit_prefix_len == 0 {
            return Err(bad());
        }
        let patch: u32 = patch_part[..digit_prefix_len].parse().map_err(|_| bad())?;

        Ok(Self::new(major, minor, patch))
    }
}

impl fmt::Display for Version {
    /// Produces the exact diagnostic string used in error messages:
    /// `"Version(M, m, p)"`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Version({}, {}, {})", self.major, self.minor, self.patch)
    }
}
