//! Normalization of addresses, selectors and hex quantities for deterministic requests.

use thiserror::Error;

/// ERC-4626 `totalAssets()`.
pub const TOTAL_ASSETS_SELECTOR: &str = "0x01e1d114";
/// ERC-20 `balanceOf(address)`.
pub const BALANCE_OF_SELECTOR: &str = "0x70a08231";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("invalid address: {0}")]
    InvalidAddress(String),
    #[error("invalid selector: {0}")]
    InvalidSelector(String),
    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),
    #[error("quantity exceeds 128 bits: {0}")]
    QuantityOverflow(String),
    #[error("invalid block: {0}")]
    InvalidBlock(String),
}

fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

fn is_hex(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_hexdigit())
}

/// `0x` + 40 lowercase hex chars.
pub fn normalize_address(addr: &str) -> Result<String, NormalizeError> {
    let body = strip_0x(addr.trim());
    if body.len() != 40 || !is_hex(body) {
        return Err(NormalizeError::InvalidAddress(addr.to_string()));
    }
    Ok(format!("0x{}", body.to_lowercase()))
}

/// `0x` + 8 lowercase hex chars.
pub fn parse_selector(sel: &str) -> Result<String, NormalizeError> {
    let body = strip_0x(sel.trim());
    if body.len() != 8 || !is_hex(body) {
        return Err(NormalizeError::InvalidSelector(sel.to_string()));
    }
    Ok(format!("0x{}", body.to_lowercase()))
}

/// ABI-encode an address as a single 32-byte word (no `0x`).
pub fn encode_address_arg(addr: &str) -> Result<String, NormalizeError> {
    let addr = normalize_address(addr)?;
    Ok(format!("{:0>64}", &addr[2..]))
}

/// Parse a JSON-RPC hex quantity or a 32-byte return word.
pub fn parse_quantity(s: &str) -> Result<u128, NormalizeError> {
    let trimmed = s.trim();
    let body = strip_0x(trimmed);
    if body.is_empty() {
        // eth_call against an address with no code returns "0x"
        return Ok(0);
    }
    if !is_hex(body) {
        return Err(NormalizeError::InvalidQuantity(s.to_string()));
    }
    let significant = body.trim_start_matches('0');
    if significant.is_empty() {
        return Ok(0);
    }
    if significant.len() > 32 {
        return Err(NormalizeError::QuantityOverflow(trimmed.to_string()));
    }
    u128::from_str_radix(significant, 16).map_err(|_| NormalizeError::InvalidQuantity(s.to_string()))
}

/// Scale a raw on-chain amount down to whole tokens, truncating the fraction.
pub fn to_whole_tokens(raw: u128, decimals: u8) -> u128 {
    match 10u128.checked_pow(u32::from(decimals)) {
        Some(scale) => raw / scale,
        None => 0,
    }
}

/// "latest" (or empty) yields None; decimal or `0x` hex yields a block number.
pub fn parse_block_tag(s: &str) -> Result<Option<u64>, NormalizeError> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("latest") {
        return Ok(None);
    }
    if let Ok(n) = s.parse::<u64>() {
        return Ok(Some(n));
    }
    if s.starts_with("0x") || s.starts_with("0X") {
        return u64::from_str_radix(strip_0x(s), 16)
            .map(Some)
            .map_err(|_| NormalizeError::InvalidBlock(s.to_string()));
    }
    Err(NormalizeError::InvalidBlock(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_normalized() {
        let a = normalize_address("0xABCDEFabcdef0123456789012345678901234567").unwrap();
        assert_eq!(a, "0xabcdefabcdef0123456789012345678901234567");
        assert!(normalize_address("0x1234").is_err());
        assert!(normalize_address("0xzzcdefabcdef0123456789012345678901234567").is_err());
    }

    #[test]
    fn address_arg_padded() {
        let w = encode_address_arg("0x00000000000000000000000000000000000000ff").unwrap();
        assert_eq!(w.len(), 64);
        assert!(w.ends_with("ff"));
        assert!(w.starts_with("000000000000000000000000"));
    }

    #[test]
    fn selector() {
        assert_eq!(parse_selector("01E1D114").unwrap(), TOTAL_ASSETS_SELECTOR);
        assert!(parse_selector("0x01e1d1").is_err());
    }

    #[test]
    fn quantities() {
        assert_eq!(parse_quantity("0x").unwrap(), 0);
        assert_eq!(parse_quantity("0x0").unwrap(), 0);
        assert_eq!(parse_quantity("0x1b4").unwrap(), 436);
        let word = format!("0x{:0>64}", "de0b6b3a7640000");
        assert_eq!(parse_quantity(&word).unwrap(), 1_000_000_000_000_000_000);
        let big = format!("0x1{}", "0".repeat(32));
        assert!(matches!(
            parse_quantity(&big),
            Err(NormalizeError::QuantityOverflow(_))
        ));
        assert!(parse_quantity("0xg1").is_err());
    }

    #[test]
    fn whole_tokens() {
        assert_eq!(to_whole_tokens(55_000_500_000_000_000_000_000, 18), 55_000);
        assert_eq!(to_whole_tokens(1_999_999, 6), 1);
        assert_eq!(to_whole_tokens(42, 0), 42);
        assert_eq!(to_whole_tokens(u128::MAX, 255), 0);
    }

    #[test]
    fn block_tags() {
        assert_eq!(parse_block_tag("latest").unwrap(), None);
        assert_eq!(parse_block_tag("").unwrap(), None);
        assert_eq!(parse_block_tag("19000000").unwrap(), Some(19_000_000));
        assert_eq!(parse_block_tag("0x10").unwrap(), Some(16));
        assert!(parse_block_tag("pending").is_err());
    }
}
