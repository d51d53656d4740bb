use crate::error::ParseError;

/// Parses a signed integer with optional base prefix and multiplier suffix.
///
/// Values are decimal by default, octal with a leading `0`
/// or hexadecimal with a leading `0x`.
/// A single trailing `K`, `M` or `G` multiplies the value
/// by 1024, 1024² or 1024³.
pub fn parse_num(token: &str) -> Result<i64, ParseError> {
    if token.is_empty() {
        return Err(ParseError::Empty);
    }

    let invalid = || ParseError::Invalid(token.to_string());

    let (negative, rest) = match token.as_bytes()[0] {
        b'-' => (true, &token[1..]),
        b'+' => (false, &token[1..]),
        _ => (false, token),
    };

    let (radix, digits) = if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        (16, hex)
    } else if rest.len() > 1 && rest.starts_with('0') {
        (8, &rest[1..])
    } else {
        (10, rest)
    };

    let end = digits
        .find(|c: char| !c.is_digit(radix))
        .unwrap_or(digits.len());
    let (number, suffix) = digits.split_at(end);
    if number.is_empty() {
        return Err(invalid());
    }

    let mut value = i64::from_str_radix(number, radix).map_err(|_| invalid())?;
    if negative {
        value = -value;
    }

    let multiplier = match suffix {
        "" => 1,
        "K" => 1024,
        "M" => 1024 * 1024,
        "G" => 1024 * 1024 * 1024,
        _ => return Err(invalid()),
    };
    value.checked_mul(multiplier).ok_or_else(invalid)
}
