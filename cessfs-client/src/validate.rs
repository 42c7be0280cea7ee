//! Bucket and territory name rules

use crate::error::{ClientError, Result};
use std::net::Ipv4Addr;

const BUCKET_MIN_LEN: usize = 3;
const BUCKET_MAX_LEN: usize = 63;
const TERRITORY_MAX_LEN: usize = 63;

/// Check a bucket name.
///
/// 3 to 63 characters of `[a-z0-9.-]`, starting and ending with a letter or
/// digit, without `..`, `.-` or `-.`, and not shaped like an IPv4 address.
pub fn validate_bucket_name(name: &str) -> Result<()> {
    let invalid = |reason| {
        Err(ClientError::InvalidBucketName {
            name: name.to_string(),
            reason,
        })
    };

    if name.len() < BUCKET_MIN_LEN || name.len() > BUCKET_MAX_LEN {
        return invalid("length must be between 3 and 63");
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'.' || b == b'-')
    {
        return invalid("only lowercase letters, digits, '.' and '-' are allowed");
    }
    let alnum = |b: Option<u8>| b.is_some_and(|b| b.is_ascii_lowercase() || b.is_ascii_digit());
    if !alnum(name.bytes().next()) || !alnum(name.bytes().last()) {
        return invalid("must start and end with a letter or digit");
    }
    if name.contains("..") || name.contains(".-") || name.contains("-.") {
        return invalid("must not contain '..', '.-' or '-.'");
    }
    if name.parse::<Ipv4Addr>().is_ok() {
        return invalid("must not be an IP address");
    }
    Ok(())
}

/// Check a territory name: 1 to 63 characters of `[A-Za-z0-9_-]`
pub fn validate_territory_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > TERRITORY_MAX_LEN {
        return Err(ClientError::InvalidTerritoryName {
            name: name.to_string(),
            reason: "length must be between 1 and 63",
        });
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(ClientError::InvalidTerritoryName {
            name: name.to_string(),
            reason: "only letters, digits, '_' and '-' are allowed",
        });
    }
    Ok(())
}
