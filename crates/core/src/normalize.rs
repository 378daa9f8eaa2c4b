//! Numeric normalisation for localized dashboard values.
//!
//! Dashboard cells render numbers for humans: `$2.3亿`, `-1.5万`, `12%`,
//! `1h 5m`. [`normalize`] turns such a token into a machine number. When the
//! token is not numeric it comes back untouched as [`Normalized::Text`]; the
//! function never fails, so callers must be ready for either shape in the same
//! column.
//!
//! # Example
//!
//! ```rust
//! use dashmetrics_core::normalize::{Normalized, normalize};
//!
//! assert_eq!(normalize("$23亿"), Normalized::Integer(2_300_000_000));
//! assert_eq!(normalize("$2.3亿"), Normalized::Integer(230_000_000));
//! assert_eq!(normalize("-1.5万"), Normalized::Integer(-15000));
//! assert_eq!(normalize("1.23456万"), Normalized::Float(12345.6));
//! assert_eq!(normalize("1h 5m"), Normalized::Integer(3900));
//! assert_eq!(normalize("N/A"), Normalized::Text("N/A".into()));
//! ```

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Magnitude suffixes and their power-of-ten exponents, checked in order.
///
/// The hundred-million suffix is checked first so that a token carrying more
/// than one marker is scaled by the largest.
pub const MAGNITUDE_SUFFIXES: &[(char, u32)] = &[('亿', 8), ('万', 4), ('千', 3)];

const CURRENCY_MARKERS: &[char] = &['$', '¥', '￥'];

static DURATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(\d+)h\s*)?(?:(\d+)m\s*)?(?:(\d+)s)?$").expect("duration pattern is valid")
});

/// A normalised cell value.
///
/// Serialises untagged: integers and floats become JSON numbers, text stays a
/// JSON string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Normalized {
    Integer(i64),
    Float(f64),
    /// The original token, returned when it could not be converted.
    Text(String),
}

impl Normalized {
    /// Numeric view of the value, `None` for unparsed text.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Normalized::Integer(i) => Some(*i as f64),
            Normalized::Float(f) => Some(*f),
            Normalized::Text(_) => None,
        }
    }

    pub fn is_text(&self) -> bool {
        matches!(self, Normalized::Text(_))
    }
}

impl fmt::Display for Normalized {
    /// Floats always carry a decimal point so that feeding the rendered
    /// string back through [`normalize`] yields the same variant.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Normalized::Integer(i) => write!(f, "{}", i),
            Normalized::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{:.1}", v),
            Normalized::Float(v) => write!(f, "{}", v),
            Normalized::Text(s) => f.write_str(s),
        }
    }
}

impl From<Normalized> for serde_json::Value {
    fn from(value: Normalized) -> Self {
        match value {
            Normalized::Integer(i) => serde_json::Value::from(i),
            Normalized::Float(f) => serde_json::Value::from(f),
            Normalized::Text(s) => serde_json::Value::String(s),
        }
    }
}

/// Converts a localized value token into a number.
///
/// Steps, in order:
/// 1. currency markers and `%` are removed (a `%` forces a float result);
/// 2. a leading `-` is recorded as the sign;
/// 3. a magnitude suffix (`亿` ×10^8, `万` ×10^4, `千` ×10^3) is removed;
/// 4. a clock-style duration (`1h 30m 15s`, `30m`) becomes total seconds;
/// 5. everything but digits and `.` is dropped and the rest is parsed.
///
/// Scaling shifts the decimal point in the text rather than multiplying a
/// float, so `2.3亿` is exactly `230000000`. The result is an integer when no
/// percent marker was present and no fractional digits remain after scaling;
/// otherwise a float. An unscaled `12.0` stays a float.
pub fn normalize(raw: &str) -> Normalized {
    let original = raw;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Normalized::Text(original.to_string());
    }

    let percent = trimmed.contains('%');
    let mut cleaned: String = trimmed.chars().filter(|c| *c != '%' && !CURRENCY_MARKERS.contains(c)).collect();
    cleaned = cleaned.trim().to_string();

    let negative = cleaned.starts_with('-');
    if negative {
        cleaned.remove(0);
    }

    let mut exponent = 0u32;
    if let Some((suffix, exp)) = MAGNITUDE_SUFFIXES.iter().find(|(s, _)| cleaned.contains(*s)) {
        exponent = *exp;
        cleaned = cleaned.replace(*suffix, "");
    }

    if let Some(seconds) = parse_duration(cleaned.trim()) {
        return Normalized::Integer(if negative { -seconds } else { seconds });
    }

    let digits: String = cleaned.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
    match scale_decimal(&digits, exponent, negative, percent) {
        Some(value) => value,
        None => Normalized::Text(original.to_string()),
    }
}

/// Parses `1h 5m 3s`-style durations into seconds.
///
/// At least one component must be present; a bare number is not a duration.
pub fn parse_duration(text: &str) -> Option<i64> {
    let caps = DURATION_RE.captures(text)?;
    if caps.iter().skip(1).all(|m| m.is_none()) {
        return None;
    }

    let component = |idx: usize, unit: i64| -> Option<i64> {
        match caps.get(idx) {
            Some(m) => m.as_str().parse::<i64>().ok().map(|v| v * unit),
            None => Some(0),
        }
    };

    Some(component(1, 3600)? + component(2, 60)? + component(3, 1)?)
}

/// Applies a power-of-ten scale to a plain decimal string.
///
/// Returns `None` for empty input or anything with more than one decimal
/// point.
fn scale_decimal(digits: &str, exponent: u32, negative: bool, percent: bool) -> Option<Normalized> {
    if digits.is_empty() || digits.matches('.').count() > 1 {
        return None;
    }

    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, f),
        None => (digits, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }

    let shift = exponent as usize;
    let mut mantissa = format!("{}{}", int_part, frac_part);
    let whole = frac_part.len() <= shift;
    let shifted = if whole {
        mantissa.push_str(&"0".repeat(shift - frac_part.len()));
        mantissa
    } else {
        let point_at = int_part.len() + shift;
        format!("{}.{}", &mantissa[..point_at], &mantissa[point_at..])
    };
    let shifted = if shifted.starts_with('.') { format!("0{}", shifted) } else { shifted };
    let signed = if negative { format!("-{}", shifted) } else { shifted };

    if whole
        && !percent
        && let Ok(int) = signed.parse::<i64>()
    {
        return Some(Normalized::Integer(int));
    }

    signed.parse::<f64>().ok().map(Normalized::Float)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("1000000", Normalized::Integer(1_000_000))]
    #[case("1,234,567", Normalized::Integer(1_234_567))]
    #[case("$2.3亿", Normalized::Integer(230_000_000))]
    #[case("$23亿", Normalized::Integer(2_300_000_000))]
    #[case("-1.5万", Normalized::Integer(-15000))]
    #[case("140.3万", Normalized::Integer(1_403_000))]
    #[case("12.0", Normalized::Float(12.0))]
    #[case("3千", Normalized::Integer(3000))]
    #[case("-20万", Normalized::Integer(-200_000))]
    #[case("12%", Normalized::Float(12.0))]
    #[case("-4.25%", Normalized::Float(-4.25))]
    #[case("$0.12", Normalized::Float(0.12))]
    #[case("1h 5m", Normalized::Integer(3900))]
    #[case("30m", Normalized::Integer(1800))]
    #[case("1h 30m 15s", Normalized::Integer(5415))]
    #[case("45s", Normalized::Integer(45))]
    fn test_normalize_values(#[case] input: &str, #[case] expected: Normalized) {
        assert_eq!(normalize(input), expected);
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("N/A")]
    #[case("-")]
    #[case("全球")]
    #[case("1.2.3")]
    fn test_unparseable_returns_original(#[case] input: &str) {
        assert_eq!(normalize(input), Normalized::Text(input.to_string()));
    }

    #[test]
    fn test_sign_applies_after_scaling() {
        assert_eq!(normalize("-2亿"), Normalized::Integer(-200_000_000));
    }

    #[test]
    fn test_fraction_beyond_suffix_precision() {
        assert_eq!(normalize("1.23456万"), Normalized::Float(12345.6));
    }

    #[test]
    fn test_whole_after_scaling_is_an_integer() {
        assert_eq!(normalize("1.50万"), Normalized::Integer(15000));
        assert_eq!(normalize("$0.5千"), Normalized::Integer(500));
        assert_eq!(serde_json::to_string(&normalize("140.3万")).unwrap(), "1403000");
    }

    #[test]
    fn test_leading_point() {
        assert_eq!(normalize(".5"), Normalized::Float(0.5));
    }

    #[test]
    fn test_duration_requires_a_component() {
        assert_eq!(parse_duration("12"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("2h"), Some(7200));
    }

    #[test]
    fn test_display_keeps_float_shape() {
        assert_eq!(Normalized::Float(12.0).to_string(), "12.0");
        assert_eq!(Normalized::Float(0.25).to_string(), "0.25");
        assert_eq!(Normalized::Integer(-15).to_string(), "-15");
    }

    #[test]
    fn test_serialises_untagged() {
        let json = serde_json::to_string(&vec![
            Normalized::Integer(3),
            Normalized::Float(1.5),
            Normalized::Text("N/A".into()),
        ])
        .unwrap();
        assert_eq!(json, r#"[3,1.5,"N/A"]"#);
    }

    #[test]
    fn test_deserialises_untagged() {
        let values: Vec<Normalized> = serde_json::from_str(r#"[3, 12.0, "N/A"]"#).unwrap();
        assert_eq!(
            values,
            vec![Normalized::Integer(3), Normalized::Float(12.0), Normalized::Text("N/A".into())]
        );
    }
}
