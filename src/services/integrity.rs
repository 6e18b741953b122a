//! Subresource-integrity digests used to detect content drift.
//!
//! The string form is `<algorithm>-<base64 digest>`, e.g. `sha512-z4PhNX7v...`.
//! Several entries may be separated by whitespace; entries may carry a
//! `?options` suffix, which is ignored. Unknown algorithms are skipped.

use base64::{Engine as _, engine::general_purpose};
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("integrity string is empty")]
    Empty,
    #[error("no supported hash found in `{0}`")]
    NoSupportedHash(String),
}

/// Hash algorithms, ordered weakest to strongest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Algorithm {
    Sha256,
    Sha384,
    Sha512,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::Sha256 => "sha256",
            Algorithm::Sha384 => "sha384",
            Algorithm::Sha512 => "sha512",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "sha256" => Some(Algorithm::Sha256),
            "sha384" => Some(Algorithm::Sha384),
            "sha512" => Some(Algorithm::Sha512),
            _ => None,
        }
    }

    fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            Algorithm::Sha256 => Sha256::digest(data).to_vec(),
            Algorithm::Sha384 => Sha384::digest(data).to_vec(),
            Algorithm::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Hash {
    algorithm: Algorithm,
    digest: String,
}

/// A parsed integrity value holding one or more hashes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Integrity {
    hashes: Vec<Hash>,
}

impl Integrity {
    /// Hash `data` with the default algorithm (sha512).
    pub fn from_data(data: &[u8]) -> Self {
        Self::from_data_with(Algorithm::Sha512, data)
    }

    pub fn from_data_with(algorithm: Algorithm, data: &[u8]) -> Self {
        let digest = general_purpose::STANDARD.encode(algorithm.digest(data));
        Self {
            hashes: vec![Hash { algorithm, digest }],
        }
    }

    /// Parse an SRI string. Fails when no entry uses a supported algorithm.
    pub fn parse(value: &str) -> Result<Self, IntegrityError> {
        if value.trim().is_empty() {
            return Err(IntegrityError::Empty);
        }

        let mut hashes: Vec<Hash> = value
            .split_whitespace()
            .filter_map(|entry| {
                let entry = entry.split('?').next().unwrap_or(entry);
                let (name, digest) = entry.split_once('-')?;
                let algorithm = Algorithm::from_name(name)?;
                let decoded = general_purpose::STANDARD.decode(digest).ok()?;
                if decoded.len() != algorithm.digest(b"").len() {
                    return None;
                }
                Some(Hash {
                    algorithm,
                    digest: digest.to_string(),
                })
            })
            .collect();

        if hashes.is_empty() {
            return Err(IntegrityError::NoSupportedHash(value.to_string()));
        }

        // strongest first
        hashes.sort_by(|a, b| b.algorithm.cmp(&a.algorithm));
        Ok(Self { hashes })
    }

    /// Strongest algorithm present.
    pub fn algorithm(&self) -> Algorithm {
        self.hashes[0].algorithm
    }

    /// True iff both values share an algorithm with an identical digest.
    ///
    /// The comparison uses the strongest algorithm of `self` that `other`
    /// also carries; values without a common algorithm never match.
    pub fn matches(&self, other: &Integrity) -> bool {
        self.hashes
            .iter()
            .find_map(|mine| {
                other
                    .hashes
                    .iter()
                    .find(|theirs| theirs.algorithm == mine.algorithm)
                    .map(|theirs| theirs.digest == mine.digest)
            })
            .unwrap_or(false)
    }

    /// Check `data` against this value.
    pub fn check(&self, data: &[u8]) -> bool {
        self.matches(&Self::from_data_with(self.algorithm(), data))
    }
}

impl fmt::Display for Integrity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .hashes
            .iter()
            .map(|hash| format!("{}-{}", hash.algorithm.as_str(), hash.digest))
            .collect();
        f.write_str(&parts.join(" "))
    }
}

impl FromStr for Integrity {
    type Err = IntegrityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn digest_is_algorithm_tagged() {
        let sri = Integrity::from_data(b"hello world").to_string();
        assert!(sri.starts_with("sha512-"));
        // 64 bytes of base64 with padding
        assert_eq!(sri.len(), "sha512-".len() + 88);
    }

    #[test]
    fn same_content_matches_after_round_trip() {
        let a = Integrity::from_data(b"body { color: red }");
        let b = Integrity::parse(&a.to_string()).unwrap();
        assert!(a.matches(&b));
        assert!(b.check(b"body { color: red }"));
    }

    #[test]
    fn different_content_does_not_match() {
        let a = Integrity::from_data(b"v1");
        let b = Integrity::from_data(b"v2");
        assert!(!a.matches(&b));
    }

    #[test]
    fn different_algorithms_never_match() {
        let a = Integrity::from_data_with(Algorithm::Sha256, b"same");
        let b = Integrity::from_data_with(Algorithm::Sha512, b"same");
        assert!(!a.matches(&b));
    }

    #[test]
    fn parse_picks_strongest_and_skips_unknown() {
        let sha256 = Integrity::from_data_with(Algorithm::Sha256, b"x").to_string();
        let sha512 = Integrity::from_data(b"x").to_string();
        let combined = format!("md5-abc {}?foo {}", sha256, sha512);
        let parsed = Integrity::parse(&combined).unwrap();
        assert_eq!(parsed.algorithm(), Algorithm::Sha512);
        assert!(parsed.check(b"x"));
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert_eq!(Integrity::parse("   "), Err(IntegrityError::Empty));
        assert!(Integrity::parse("not-a-digest").is_err());
        assert!(Integrity::parse("sha512-AAAA").is_err());
        assert!(Integrity::parse("sha512-!!!").is_err());
    }
}
