use crate::error::AdminError;
use crate::error::AdminError::InvalidAmount;
use crate::types::Amount;

/// 10^77 is the largest power of ten a U256 holds
pub const MAX_DECIMALS: u8 = 77;

/// Formats a base-unit amount the way viem's `formatUnits` does:
/// no trailing fractional zeros, no fraction at all when it is zero.
/// Decimals past [`MAX_DECIMALS`] have no U256 scale; the raw amount is shown.
pub fn format_units(amount: Amount, decimals: u8) -> String {
    if decimals == 0 || decimals > MAX_DECIMALS {
        return amount.to_string();
    }
    let base = Amount::exp10(decimals as usize);
    let (whole, fraction) = amount.div_mod(base);
    let fraction = format!("{:0>width$}", fraction.to_string(), width = decimals as usize);
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{fraction}")
    }
}

/// Same as [`format_units`] with thousands separators on the whole part
pub fn format_units_grouped(amount: Amount, decimals: u8) -> String {
    let formatted = format_units(amount, decimals);
    let (whole, fraction) = match formatted.split_once('.') {
        Some((w, f)) => (w.to_string(), Some(f.to_string())),
        None => (formatted, None),
    };

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    match fraction {
        Some(f) => format!("{grouped}.{f}"),
        None => grouped,
    }
}

/// Parses a human decimal string ("12.5") into base units.
/// More fractional digits than the token carries is an error, not a rounding.
pub fn parse_units(value: &str, decimals: u8) -> Result<Amount, AdminError> {
    let value = value.trim();
    let invalid = || InvalidAmount(value.to_string());
    if decimals > MAX_DECIMALS {
        return Err(invalid());
    }

    let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid());
    }
    if !whole.chars().all(|c| c.is_ascii_digit()) || !fraction.chars().all(|c| c.is_ascii_digit())
    {
        return Err(invalid());
    }
    if fraction.len() > decimals as usize {
        return Err(invalid());
    }

    let whole = if whole.is_empty() {
        Amount::zero()
    } else {
        Amount::from_dec_str(whole).or(Err(invalid()))?
    };
    let padded = format!("{:0<width$}", fraction, width = decimals as usize);
    let fraction = if padded.is_empty() {
        Amount::zero()
    } else {
        Amount::from_dec_str(&padded).or(Err(invalid()))?
    };

    whole
        .checked_mul(Amount::exp10(decimals as usize))
        .and_then(|w| w.checked_add(fraction))
        .ok_or_else(invalid)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_trims_fraction() {
        assert_eq!("1.5", format_units(Amount::from(1_500_000u64), 6));
        assert_eq!("500", format_units(Amount::from(500_000_000u64), 6));
        assert_eq!("0.000001", format_units(Amount::from(1u64), 6));
        assert_eq!("42", format_units(Amount::from(42u64), 0));
    }

    #[test]
    fn format_grouped() {
        let amount = parse_units("1234567.25", 18).unwrap();
        assert_eq!("1,234,567.25", format_units_grouped(amount, 18));
        assert_eq!("999", format_units_grouped(Amount::from(999u64), 0));
        assert_eq!("1,000", format_units_grouped(Amount::from(1000u64), 0));
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!(parse_units("", 18).is_err());
        assert!(parse_units(".", 18).is_err());
        assert!(parse_units("-1", 18).is_err());
        assert!(parse_units("1.2.3", 18).is_err());
        assert!(parse_units("abc", 18).is_err());
        assert!(parse_units("0.0000001", 6).is_err());
    }

    #[test]
    fn parse_accepts_leading_dot() {
        assert_eq!(Amount::from(500_000u64), parse_units(".5", 6).unwrap());
        assert_eq!(Amount::from(10u64), parse_units("10", 0).unwrap());
    }

    #[test]
    fn decimals_beyond_u256_do_not_panic() {
        assert_eq!("1", format_units(Amount::from(1u64), 80));
        assert_eq!("1", format_units(Amount::from(1u64), u8::MAX));
        assert!(parse_units("1", 80).is_err());
        assert_eq!(
            Amount::exp10(77),
            parse_units("1", MAX_DECIMALS).unwrap()
        );
        assert_eq!("1", format_units(Amount::exp10(77), MAX_DECIMALS));
    }

    #[test]
    fn format_then_parse_returns_the_same_amount() {
        let amounts = [
            Amount::zero(),
            Amount::from(1u64),
            Amount::from(1_000_000u64),
            Amount::from_dec_str("123456789012345678901234567890").unwrap(),
        ];
        for decimals in [0u8, 6, 18] {
            for amount in amounts {
                let text = format_units(amount, decimals);
                assert_eq!(amount, parse_units(&text, decimals).unwrap(), "{text}");
            }
        }
    }
}
