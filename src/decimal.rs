//! Fixed-point decimal arithmetic for money.
//!
//! [`Decimal`] stores an `i128`-scaled integer (scale = 10,000, i.e. four
//! fractional digits) so that price arithmetic never touches binary
//! floating point. The wider `i128` backing keeps the documented overflow
//! domain (`|value|*|other| < 2^63` pre-scaling) a caller contract rather
//! than a silent wraparound inside the type itself.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Number of implied fractional digits carried internally.
const SCALE_DIGITS: u32 = 4;

/// The scale factor corresponding to [`SCALE_DIGITS`].
const SCALE: i128 = 10_000;

/// Fixed-point decimal scaled by [`SCALE`].
///
/// Two decimals with the same scaled value are bit-for-bit equal; there is
/// no floating-point representation anywhere in this type.
#[derive(Clone, Copy, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Decimal {
    scaled: i128,
}

impl Decimal {
    /// The additive identity.
    pub const ZERO: Decimal = Decimal { scaled: 0 };

    /// Constructs a decimal from whole integer units (e.g. `Decimal::from_units(5)` is `5.0000`).
    pub fn from_units(units: i64) -> Self {
        Decimal {
            scaled: i128::from(units) * SCALE,
        }
    }

    /// Constructs a decimal from an integer number of hundredths ("cents"),
    /// e.g. `Decimal::from_cents(150)` is `1.5000`.
    pub fn from_cents(cents: i64) -> Self {
        Decimal {
            scaled: i128::from(cents) * (SCALE / 100),
        }
    }

    /// Parses a human-readable decimal string such as `"12.50"`, `"-3"`, or `"0.0001"`.
    pub fn from_str_exact(input: &str) -> Result<Self, DecimalParseError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(DecimalParseError::Empty);
        }

        let (negative, unsigned) = match input.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, input.strip_prefix('+').unwrap_or(input)),
        };

        let mut parts = unsigned.splitn(2, '.');
        let int_part = parts.next().unwrap_or("");
        let frac_part = parts.next().unwrap_or("");

        if int_part.is_empty() && frac_part.is_empty() {
            return Err(DecimalParseError::Invalid(input.to_owned()));
        }
        if !int_part.is_empty() && !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DecimalParseError::Invalid(input.to_owned()));
        }
        if frac_part.len() > SCALE_DIGITS as usize {
            return Err(DecimalParseError::TooPrecise(input.to_owned()));
        }
        if !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DecimalParseError::Invalid(input.to_owned()));
        }

        let int_value: i128 = if int_part.is_empty() {
            0
        } else {
            int_part
                .parse()
                .map_err(|_| DecimalParseError::Invalid(input.to_owned()))?
        };

        let mut frac_value: i128 = if frac_part.is_empty() {
            0
        } else {
            frac_part
                .parse()
                .map_err(|_| DecimalParseError::Invalid(input.to_owned()))?
        };
        for _ in 0..(SCALE_DIGITS as usize - frac_part.len()) {
            frac_value *= 10;
        }

        let scaled = int_value * SCALE + frac_value;
        Ok(Decimal {
            scaled: if negative { -scaled } else { scaled },
        })
    }

    /// Adds two decimals.
    pub fn add(self, other: Decimal) -> Decimal {
        Decimal {
            scaled: self.scaled + other.scaled,
        }
    }

    /// Subtracts `other` from `self`.
    pub fn sub(self, other: Decimal) -> Decimal {
        Decimal {
            scaled: self.scaled - other.scaled,
        }
    }

    /// Multiplies two decimals; the product is formed before rescaling back down by [`SCALE`].
    pub fn mul(self, other: Decimal) -> Decimal {
        Decimal {
            scaled: (self.scaled * other.scaled) / SCALE,
        }
    }

    /// Divides `self` by `other`. Division by zero returns [`Decimal::ZERO`]
    /// by documented policy, not an error.
    pub fn div(self, other: Decimal) -> Decimal {
        if other.scaled == 0 {
            return Decimal::ZERO;
        }
        Decimal {
            scaled: (self.scaled * SCALE) / other.scaled,
        }
    }

    /// Multiplies by a plain integer (no rescaling needed).
    pub fn mul_by_int(self, factor: i64) -> Decimal {
        Decimal {
            scaled: self.scaled * i128::from(factor),
        }
    }

    /// Divides by a plain integer. Division by zero returns [`Decimal::ZERO`].
    pub fn div_by_int(self, divisor: i64) -> Decimal {
        if divisor == 0 {
            return Decimal::ZERO;
        }
        Decimal {
            scaled: self.scaled / i128::from(divisor),
        }
    }

    /// Computes `self * percent / 100` using integer math throughout.
    pub fn percent(self, percent: Decimal) -> Decimal {
        self.mul(percent).div_by_int(100)
    }

    /// Returns true if this value is exactly zero.
    pub fn is_zero(self) -> bool {
        self.scaled == 0
    }

    /// Returns true if this value is strictly negative.
    pub fn is_negative(self) -> bool {
        self.scaled < 0
    }

    /// Rounds to two fractional digits using half-away-from-zero (ISO-4217 cents).
    pub fn round_to_cents(self) -> Decimal {
        // SCALE / 100 is the number of internal units per cent (four digits -> two digits).
        let unit = SCALE / 100;
        let quotient = self.scaled / unit;
        let remainder = self.scaled % unit;
        let half = unit / 2;

        let rounded = if remainder.abs() * 2 >= unit || (remainder.abs() == half && remainder != 0)
        {
            if self.scaled >= 0 {
                quotient + 1
            } else {
                quotient - 1
            }
        } else {
            quotient
        };

        Decimal {
            scaled: rounded * unit,
        }
    }

    /// Canonical string form: `"<int>.<4-digit-frac>"`, locale-independent.
    pub fn to_canonical_string(self) -> String {
        let negative = self.scaled < 0;
        let magnitude = self.scaled.unsigned_abs();
        let int_part = magnitude / (SCALE as u128);
        let frac_part = magnitude % (SCALE as u128);

        format!(
            "{}{}.{:0width$}",
            if negative { "-" } else { "" },
            int_part,
            frac_part,
            width = SCALE_DIGITS as usize
        )
    }
}

impl fmt::Debug for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Decimal({})", self.to_canonical_string())
    }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_canonical_string())
    }
}

impl PartialOrd for Decimal {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Decimal {
    fn cmp(&self, other: &Self) -> Ordering {
        self.scaled.cmp(&other.scaled)
    }
}

impl FromStr for Decimal {
    type Err = DecimalParseError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        Self::from_str_exact(input)
    }
}

impl TryFrom<String> for Decimal {
    type Error = DecimalParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_str_exact(&value)
    }
}

impl From<Decimal> for String {
    fn from(value: Decimal) -> Self {
        value.to_canonical_string()
    }
}

/// Failure modes when parsing a [`Decimal`] from a human-readable string.
#[derive(Debug, thiserror::Error, Eq, PartialEq)]
pub enum DecimalParseError {
    /// The input was empty or whitespace-only.
    #[error("decimal string is empty")]
    Empty,
    /// The input had more than four fractional digits.
    #[error("decimal string '{0}' has more than four fractional digits")]
    TooPrecise(String),
    /// The input was not a valid signed decimal literal.
    #[error("'{0}' is not a valid decimal literal")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::Decimal;

    fn d(s: &str) -> Decimal {
        Decimal::from_str_exact(s).expect("valid test decimal")
    }

    #[test]
    fn precision_is_exact_over_repeated_addition() {
        let mut total = Decimal::ZERO;
        let cent = d("0.01");
        for _ in 0..100 {
            total = total.add(cent);
        }
        assert_eq!(total, d("1.0000"));
        assert_eq!(total.to_canonical_string(), "1.0000");
    }

    #[test]
    fn addition_and_subtraction_round_trip() {
        let a = d("12.3456");
        let b = d("7.8901");
        assert_eq!(a.add(b).sub(b), a);
    }

    #[test]
    fn multiplication_rescales_after_product() {
        assert_eq!(d("2.0000").mul(d("3.0000")), d("6.0000"));
        assert_eq!(d("0.1000").mul(d("0.1000")), d("0.0100"));
    }

    #[test]
    fn division_by_zero_is_zero_not_an_error() {
        assert_eq!(d("5.0000").div(Decimal::ZERO), Decimal::ZERO);
        assert_eq!(d("5.0000").div_by_int(0), Decimal::ZERO);
    }

    #[test]
    fn percent_uses_integer_math() {
        let value = d("200.00");
        let ten_percent = d("10");
        assert_eq!(value.percent(ten_percent), d("20.0000"));
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(d("1.005").round_to_cents(), d("1.01"));
        assert_eq!(d("1.004").round_to_cents(), d("1.00"));
        assert_eq!(d("-1.005").round_to_cents(), d("-1.01"));
        assert_eq!(d("2.5").round_to_cents(), d("2.50"));
    }

    #[test]
    fn ordering_and_sign_queries() {
        assert!(d("1.00") < d("2.00"));
        assert!(d("-1.00").is_negative());
        assert!(Decimal::ZERO.is_zero());
        assert!(!d("0.0001").is_zero());
    }

    #[test]
    fn canonical_string_round_trips_through_parsing() {
        for literal in ["0", "-0.5", "123.4567", "-999.0001"] {
            let parsed = d(literal);
            let reparsed = Decimal::from_str_exact(&parsed.to_canonical_string())
                .expect("canonical string should reparse");
            assert_eq!(parsed, reparsed);
        }
    }

    #[test]
    fn rejects_excess_precision_and_garbage() {
        assert!(Decimal::from_str_exact("1.23456").is_err());
        assert!(Decimal::from_str_exact("abc").is_err());
        assert!(Decimal::from_str_exact("").is_err());
    }
}
