//! Exact decimal <-> minor-unit conversion.
//!
//! Wire amounts are integers of the asset's smallest unit (e.g. 50000 for
//! 0.05 USDC). Configured limits are human decimals. Conversion is string
//! arithmetic only; floats would silently drift.

use crate::error::PayError;

/// Number of minor-unit decimals for a known asset symbol.
///
/// Unknown assets default to 6, the convention for the stablecoins this
/// engine is typically paying with.
pub fn asset_decimals(asset: &str) -> u32 {
    match asset.to_ascii_uppercase().as_str() {
        "USDC" | "USDT" => 6,
        "DAI" => 18,
        _ => 6,
    }
}

/// Parse a human decimal string (`"1.00"`, `"0.6"`, `"25"`) into minor units.
///
/// Rejects negative values, empty input, and more fractional digits than the
/// asset carries — excess precision is an error, not a rounding.
pub fn parse_decimal(s: &str, decimals: u32) -> Result<u128, PayError> {
    let s = s.trim();
    if s.is_empty() || s.starts_with('-') || s.starts_with('+') {
        return Err(PayError::Config(format!("invalid decimal amount: {s:?}")));
    }

    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };

    // u128::parse tolerates a leading `+`; only bare digits are valid here.
    if !int_part.bytes().all(|b| b.is_ascii_digit())
        || !frac_part.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(PayError::Config(format!("invalid decimal amount: {s:?}")));
    }

    if frac_part.len() as u32 > decimals {
        return Err(PayError::Config(format!(
            "amount {s:?} has more than {decimals} fractional digits"
        )));
    }
    if int_part.is_empty() && frac_part.is_empty() {
        return Err(PayError::Config(format!("invalid decimal amount: {s:?}")));
    }

    let int_units: u128 = if int_part.is_empty() {
        0
    } else {
        int_part
            .parse()
            .map_err(|_| PayError::Config(format!("invalid decimal amount: {s:?}")))?
    };

    let frac_units: u128 = if frac_part.is_empty() {
        0
    } else {
        let parsed: u128 = frac_part
            .parse()
            .map_err(|_| PayError::Config(format!("invalid decimal amount: {s:?}")))?;
        parsed * 10u128.pow(decimals - frac_part.len() as u32)
    };

    let scale = 10u128
        .checked_pow(decimals)
        .ok_or_else(|| PayError::Config(format!("decimals too large: {decimals}")))?;
    int_units
        .checked_mul(scale)
        .and_then(|v| v.checked_add(frac_units))
        .ok_or_else(|| PayError::Config(format!("amount {s:?} overflows")))
}

/// Format minor units back into a human decimal string, trimming trailing
/// fractional zeros (`50000` with 6 decimals -> `"0.05"`).
pub fn format_minor_units(amount: u128, decimals: u32) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let scale = 10u128.pow(decimals);
    let int_part = amount / scale;
    let frac_part = amount % scale;
    if frac_part == 0 {
        return int_part.to_string();
    }
    let frac = format!("{frac_part:0width$}", width = decimals as usize);
    let frac = frac.trim_end_matches('0');
    format!("{int_part}.{frac}")
}

/// Parse a wire amount string: an exact integer of minor units, digits only.
pub fn parse_minor_units(s: &str) -> Result<u128, PayError> {
    let s = s.trim();
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(PayError::ChallengeUnrecognized(format!(
            "invalid amount: {s:?}"
        )));
    }
    s.parse::<u128>()
        .map_err(|_| PayError::ChallengeUnrecognized(format!("invalid amount: {s:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_whole_and_fractional() {
        assert_eq!(parse_decimal("1.00", 6).unwrap(), 1_000_000);
        assert_eq!(parse_decimal("0.6", 6).unwrap(), 600_000);
        assert_eq!(parse_decimal("0.05", 6).unwrap(), 50_000);
        assert_eq!(parse_decimal("25", 6).unwrap(), 25_000_000);
        assert_eq!(parse_decimal(".5", 6).unwrap(), 500_000);
    }

    #[test]
    fn rejects_excess_precision() {
        assert!(parse_decimal("0.0000001", 6).is_err());
        assert!(parse_decimal("1.0000000", 6).is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_decimal("", 6).is_err());
        assert!(parse_decimal("-1", 6).is_err());
        assert!(parse_decimal("1.2.3", 6).is_err());
        assert!(parse_decimal("abc", 6).is_err());
        assert!(parse_decimal(".", 6).is_err());
    }

    #[test]
    fn rejects_embedded_signs() {
        assert!(parse_decimal("1.+5", 6).is_err());
        assert!(parse_decimal("+1.5", 6).is_err());
        assert!(parse_decimal("1.-5", 6).is_err());
    }

    #[test]
    fn formats_back_exactly() {
        assert_eq!(format_minor_units(50_000, 6), "0.05");
        assert_eq!(format_minor_units(1_000_000, 6), "1");
        assert_eq!(format_minor_units(600_000, 6), "0.6");
        assert_eq!(format_minor_units(0, 6), "0");
        assert_eq!(format_minor_units(42, 0), "42");
    }

    #[test]
    fn wire_amounts_are_plain_integers() {
        assert_eq!(parse_minor_units("50000").unwrap(), 50_000);
        assert!(parse_minor_units("0.05").is_err());
        assert!(parse_minor_units("-5").is_err());
        assert!(parse_minor_units("+5").is_err());
        assert!(parse_minor_units("").is_err());
    }

    #[test]
    fn known_asset_decimals() {
        assert_eq!(asset_decimals("USDC"), 6);
        assert_eq!(asset_decimals("usdc"), 6);
        assert_eq!(asset_decimals("DAI"), 18);
    }
}
