//! Pure validation functions for manifest fields.
//!
//! Schema-level checks (share ordering, CIDR syntax, key fingerprints) live
//! here as deterministic, side-effect-free functions so they can be unit
//! tested with explicit inputs and reused by both manifest loading and the
//! bootstrap environment config. Cross-node consistency checks (duplicates,
//! provider counts) stay on [`Manifest::validate`](super::Manifest::validate)
//! since they need the whole node list.

use std::net::IpAddr;

use snafu::Snafu;

/// Required length of a key-identity fingerprint in hex characters.
pub const KEY_FINGERPRINT_HEX_LENGTH: usize = 8;

/// Errors for an out-of-order or degenerate redundancy policy.
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum PolicyError {
    #[snafu(display("{field} must be a positive integer"))]
    ShareCountZero { field: &'static str },

    #[snafu(display(
        "share counts must satisfy needed <= happy <= total, got {needed}/{happy}/{total}"
    ))]
    ShareOrdering { needed: u32, happy: u32, total: u32 },

    #[snafu(display("reserved_space cannot be empty"))]
    ReservedSpaceEmpty,
}

/// Errors for a syntactically invalid CIDR block.
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum CidrError {
    #[snafu(display("CIDR '{cidr}' is missing a '/<prefix>' suffix"))]
    MissingPrefix { cidr: String },

    #[snafu(display("CIDR '{cidr}' has an invalid network address"))]
    InvalidAddress { cidr: String },

    #[snafu(display("CIDR '{cidr}' prefix length exceeds {max}"))]
    PrefixTooLong { cidr: String, max: u8 },

    #[snafu(display("CIDR '{cidr}' has a non-numeric prefix length"))]
    InvalidPrefix { cidr: String },
}

/// Errors for a malformed key-identity fingerprint.
#[derive(Debug, Snafu, PartialEq, Eq)]
pub enum FingerprintError {
    #[snafu(display("key fingerprint must be {KEY_FINGERPRINT_HEX_LENGTH} hex characters, got {len}"))]
    Length { len: usize },

    #[snafu(display("key fingerprint '{fingerprint}' is not valid hex"))]
    NotHex { fingerprint: String },
}

/// Validate the erasure-coding share ordering `needed <= happy <= total`.
///
/// A violated ordering is a construction-time error: a policy that cannot
/// be satisfied must never reach the rest of the system.
pub fn validate_share_ordering(needed: u32, happy: u32, total: u32) -> Result<(), PolicyError> {
    if needed == 0 {
        return Err(PolicyError::ShareCountZero { field: "shares_needed" });
    }
    if happy == 0 {
        return Err(PolicyError::ShareCountZero { field: "shares_happy" });
    }
    if total == 0 {
        return Err(PolicyError::ShareCountZero { field: "shares_total" });
    }
    if needed > happy || happy > total {
        return Err(PolicyError::ShareOrdering { needed, happy, total });
    }
    Ok(())
}

/// Parse and validate a CIDR block, returning the network address and
/// prefix length.
pub fn parse_cidr(cidr: &str) -> Result<(IpAddr, u8), CidrError> {
    let (addr_str, prefix_str) = cidr.split_once('/').ok_or_else(|| CidrError::MissingPrefix {
        cidr: cidr.to_string(),
    })?;

    let addr: IpAddr = addr_str.parse().map_err(|_| CidrError::InvalidAddress {
        cidr: cidr.to_string(),
    })?;

    let prefix: u8 = prefix_str.parse().map_err(|_| CidrError::InvalidPrefix {
        cidr: cidr.to_string(),
    })?;

    let max = match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    };
    if prefix > max {
        return Err(CidrError::PrefixTooLong {
            cidr: cidr.to_string(),
            max,
        });
    }

    Ok((addr, prefix))
}

/// Validate a CIDR block without caring about the parsed value.
pub fn validate_cidr(cidr: &str) -> Result<(), CidrError> {
    parse_cidr(cidr).map(|_| ())
}

/// Validate a key-identity fingerprint: exactly 8 hex characters.
pub fn validate_key_fingerprint(fingerprint: &str) -> Result<(), FingerprintError> {
    if fingerprint.len() != KEY_FINGERPRINT_HEX_LENGTH {
        return Err(FingerprintError::Length {
            len: fingerprint.len(),
        });
    }
    if hex::decode(fingerprint).is_err() {
        return Err(FingerprintError::NotHex {
            fingerprint: fingerprint.to_string(),
        });
    }
    Ok(())
}
