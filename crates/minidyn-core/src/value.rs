//! The engine's value model.
//!
//! [`Value`] is the closed set of things an expression can evaluate to: the
//! ten storable attribute types plus a function reference, an error carried
//! as a value, and the marker for a missing attribute. Stored items are maps
//! of `Value`; conversion to and from the external [`AttributeValue`] happens
//! at the operation boundary.
//!
//! Numbers are exact decimals. DynamoDB allows up to 38 significant digits
//! and magnitudes from `1E-130` to just under `1E+126`, which fits an `i128`
//! mantissa with a small exponent.

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use minidyn_model::AttributeValue;

use crate::expression::functions::FunctionName;

/// Maximum number of significant decimal digits a number may carry.
pub const MAX_SIGNIFICANT_DIGITS: u32 = 38;
const MAX_MAGNITUDE: i64 = 125;
const MIN_MAGNITUDE: i64 = -130;

/// An item as the engine stores it.
pub type Item = HashMap<String, Value>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A number string the engine cannot store.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NumberError {
    /// Not a decimal literal.
    #[error("The parameter cannot be converted to a numeric value: {0}")]
    Invalid(String),
    /// More than 38 significant digits.
    #[error("Attempting to store more than 38 significant digits in a Number")]
    Precision,
    /// Magnitude above `1E+125`.
    #[error(
        "Number overflow. Attempting to store a number with magnitude larger than supported range"
    )]
    Overflow,
    /// Magnitude below `1E-130`.
    #[error(
        "Number underflow. Attempting to store a number with magnitude smaller than supported range"
    )]
    Underflow,
}

/// A conversion between [`Value`] and [`AttributeValue`] failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    #[error(transparent)]
    Number(#[from] NumberError),
    #[error("One or more parameter values were invalid: An {0} set may not be empty")]
    EmptySet(&'static str),
    #[error("One or more parameter values were invalid: Null attribute value types must have the value of true")]
    InvalidNull,
    #[error("A value of type {0} cannot be stored")]
    NotStorable(&'static str),
}

// ---------------------------------------------------------------------------
// Number
// ---------------------------------------------------------------------------

/// An exact decimal: `mantissa * 10^exponent`.
///
/// Always normalized: the mantissa carries no trailing zeros and zero is
/// `(0, 0)`, so derived equality and hashing agree with numeric equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Number {
    mantissa: i128,
    exponent: i32,
}

impl Number {
    /// The number zero.
    pub const ZERO: Self = Self {
        mantissa: 0,
        exponent: 0,
    };

    /// Returns `true` for zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.mantissa == 0
    }

    /// Exact sum, failing when the result needs more than 38 digits.
    pub fn checked_add(&self, other: &Self) -> Result<Self, NumberError> {
        if self.is_zero() {
            return Ok(*other);
        }
        if other.is_zero() {
            return Ok(*self);
        }
        let exponent = self.exponent.min(other.exponent);
        let a = scale(self.mantissa, self.exponent - exponent)?;
        let b = scale(other.mantissa, other.exponent - exponent)?;
        let sum = a.checked_add(b).ok_or(NumberError::Precision)?;
        Self::normalize(sum, i64::from(exponent))
    }

    /// Exact difference, failing when the result needs more than 38 digits.
    pub fn checked_sub(&self, other: &Self) -> Result<Self, NumberError> {
        self.checked_add(&other.negate())
    }

    #[must_use]
    fn negate(&self) -> Self {
        Self {
            mantissa: -self.mantissa,
            exponent: self.exponent,
        }
    }

    fn normalize(mut mantissa: i128, mut exponent: i64) -> Result<Self, NumberError> {
        if mantissa == 0 {
            return Ok(Self::ZERO);
        }
        while mantissa % 10 == 0 {
            mantissa /= 10;
            exponent = exponent.checked_add(1).ok_or(NumberError::Overflow)?;
        }
        if digit_count(mantissa) > MAX_SIGNIFICANT_DIGITS {
            return Err(NumberError::Precision);
        }
        let magnitude = exponent
            .checked_add(i64::from(digit_count(mantissa)) - 1)
            .ok_or(NumberError::Overflow)?;
        if magnitude > MAX_MAGNITUDE {
            return Err(NumberError::Overflow);
        }
        if magnitude < MIN_MAGNITUDE {
            return Err(NumberError::Underflow);
        }
        let exponent = i32::try_from(exponent).map_err(|_| NumberError::Overflow)?;
        Ok(Self { mantissa, exponent })
    }

    fn cmp_magnitude(&self, other: &Self) -> Ordering {
        let (da, db) = (digit_count(self.mantissa), digit_count(other.mantissa));
        let ma = i64::from(self.exponent) + i64::from(da);
        let mb = i64::from(other.exponent) + i64::from(db);
        if ma != mb {
            return ma.cmp(&mb);
        }
        // Same leading-digit position: pad the shorter mantissa to equal length.
        let (mut a, mut b) = (self.mantissa.unsigned_abs(), other.mantissa.unsigned_abs());
        match da.cmp(&db) {
            Ordering::Less => a *= 10u128.pow(db - da),
            Ordering::Greater => b *= 10u128.pow(da - db),
            Ordering::Equal => {}
        }
        a.cmp(&b)
    }
}

fn digit_count(mantissa: i128) -> u32 {
    mantissa.unsigned_abs().checked_ilog10().map_or(1, |d| d + 1)
}

fn scale(mantissa: i128, by: i32) -> Result<i128, NumberError> {
    let by = u32::try_from(by).map_err(|_| NumberError::Precision)?;
    10i128
        .checked_pow(by)
        .and_then(|factor| mantissa.checked_mul(factor))
        .ok_or(NumberError::Precision)
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        let mut mantissa = i128::from(value);
        let mut exponent = 0;
        if mantissa == 0 {
            return Self::ZERO;
        }
        while mantissa % 10 == 0 {
            mantissa /= 10;
            exponent += 1;
        }
        Self { mantissa, exponent }
    }
}

impl FromStr for Number {
    type Err = NumberError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || NumberError::Invalid(format!("numeric value is not valid: {s:?}"));

        if s.is_empty() || s != s.trim() {
            return Err(invalid());
        }
        let (negative, rest) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        let (digits, explicit_exp) = match rest.find(['e', 'E']) {
            Some(pos) => {
                let exp: i64 = rest[pos + 1..].parse().map_err(|_| invalid())?;
                (&rest[..pos], exp)
            }
            None => (rest, 0),
        };
        let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.bytes().chain(frac_part.bytes()).all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }

        let all_digits = format!("{int_part}{frac_part}");
        let significant = all_digits.trim_start_matches('0');
        if significant.is_empty() {
            return Ok(Self::ZERO);
        }
        if significant.trim_end_matches('0').len() > MAX_SIGNIFICANT_DIGITS as usize {
            return Err(NumberError::Precision);
        }
        // Trailing zeros can push the digit string past i128; strip them first.
        let stripped = significant.trim_end_matches('0');
        let trailing = significant.len() - stripped.len();
        let mantissa: i128 = stripped.parse().map_err(|_| invalid())?;
        let frac_len = i64::try_from(frac_part.len()).map_err(|_| invalid())?;
        let trailing = i64::try_from(trailing).map_err(|_| invalid())?;
        let exponent = explicit_exp
            .checked_sub(frac_len)
            .and_then(|e| e.checked_add(trailing))
            .ok_or(if explicit_exp < 0 {
                NumberError::Underflow
            } else {
                NumberError::Overflow
            })?;

        Self::normalize(if negative { -mantissa } else { mantissa }, exponent)
    }
}

impl Ord for Number {
    fn cmp(&self, other: &Self) -> Ordering {
        let sign = self.mantissa.signum().cmp(&other.mantissa.signum());
        if sign != Ordering::Equal || self.mantissa == 0 {
            return sign;
        }
        let magnitude = self.cmp_magnitude(other);
        if self.mantissa > 0 {
            magnitude
        } else {
            magnitude.reverse()
        }
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mantissa < 0 {
            f.write_str("-")?;
        }
        let digits = self.mantissa.unsigned_abs().to_string();
        if self.exponent >= 0 {
            f.write_str(&digits)?;
            for _ in 0..self.exponent {
                f.write_str("0")?;
            }
            return Ok(());
        }
        let len = i64::try_from(digits.len()).map_err(|_| fmt::Error)?;
        let point = len + i64::from(self.exponent);
        if point > 0 {
            let (int_part, frac_part) =
                digits.split_at(usize::try_from(point).map_err(|_| fmt::Error)?);
            write!(f, "{int_part}.{frac_part}")
        } else {
            f.write_str("0.")?;
            for _ in 0..-point {
                f.write_str("0")?;
            }
            f.write_str(&digits)
        }
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A value produced by evaluating an expression or stored in an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    String(String),
    Number(Number),
    Binary(Bytes),
    Boolean(bool),
    Null,
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    StringSet(BTreeSet<String>),
    NumberSet(BTreeSet<Number>),
    BinarySet(BTreeSet<Bytes>),
    /// A built-in function, the callee of a call expression.
    Function(FunctionName),
    /// A recoverable evaluation failure, such as a function applied to the
    /// wrong operand types.
    Error(String),
    /// A path that resolves to nothing in the item.
    Undefined,
}

impl Value {
    /// Build an error value.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    /// Returns `true` for [`Value::Undefined`].
    #[must_use]
    pub fn is_undefined(&self) -> bool {
        matches!(self, Self::Undefined)
    }

    /// The type code used by `attribute_type` and in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::String(_) => "S",
            Self::Number(_) => "N",
            Self::Binary(_) => "B",
            Self::Boolean(_) => "BOOL",
            Self::Null => "NULL",
            Self::List(_) => "L",
            Self::Map(_) => "M",
            Self::StringSet(_) => "SS",
            Self::NumberSet(_) => "NS",
            Self::BinarySet(_) => "BS",
            Self::Function(_) => "FUNCTION",
            Self::Error(_) => "ERROR",
            Self::Undefined => "UNDEFINED",
        }
    }

    /// Parse a number literal into a value.
    pub fn number(literal: &str) -> Result<Self, NumberError> {
        literal.parse().map(Self::Number)
    }

    /// Convert into the external representation.
    pub fn to_attribute(&self) -> Result<AttributeValue, ValueError> {
        AttributeValue::try_from(self)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Number(Number::from(value))
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

/// Canonical textual form.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(s) => f.write_str(s),
            Self::Number(n) => write!(f, "{n}"),
            Self::Binary(b) => f.write_str(&String::from_utf8_lossy(b)),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Null => f.write_str("NULL"),
            Self::List(items) => {
                f.write_str("[")?;
                write_joined(f, items.iter())?;
                f.write_str("]")
            }
            Self::Map(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                f.write_str("{")?;
                for (i, key) in keys.into_iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {}", map[key])?;
                }
                f.write_str("}")
            }
            Self::StringSet(set) => {
                f.write_str("SS[")?;
                write_joined(f, set.iter())?;
                f.write_str("]")
            }
            Self::NumberSet(set) => {
                f.write_str("NS[")?;
                write_joined(f, set.iter())?;
                f.write_str("]")
            }
            Self::BinarySet(set) => {
                f.write_str("BS[")?;
                write_joined(f, set.iter().map(|b| String::from_utf8_lossy(b)))?;
                f.write_str("]")
            }
            Self::Function(name) => f.write_str(name.as_str()),
            Self::Error(message) => write!(f, "ERROR: {message}"),
            Self::Undefined => f.write_str("UNDEFINED"),
        }
    }
}

fn write_joined<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    items: impl Iterator<Item = T>,
) -> fmt::Result {
    for (i, item) in items.enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Conversions to and from the external representation
// ---------------------------------------------------------------------------

impl TryFrom<&AttributeValue> for Value {
    type Error = ValueError;

    fn try_from(value: &AttributeValue) -> Result<Self, ValueError> {
        Ok(match value {
            AttributeValue::S(s) => Self::String(s.clone()),
            AttributeValue::N(n) => Self::Number(n.parse()?),
            AttributeValue::B(b) => Self::Binary(b.clone()),
            AttributeValue::Bool(b) => Self::Boolean(*b),
            AttributeValue::Null(true) => Self::Null,
            AttributeValue::Null(false) => return Err(ValueError::InvalidNull),
            AttributeValue::L(items) => {
                Self::List(items.iter().map(Self::try_from).collect::<Result<_, _>>()?)
            }
            AttributeValue::M(map) => Self::Map(item_from_attributes(map)?),
            AttributeValue::Ss(items) => {
                if items.is_empty() {
                    return Err(ValueError::EmptySet("string"));
                }
                Self::StringSet(items.iter().cloned().collect())
            }
            AttributeValue::Ns(items) => {
                if items.is_empty() {
                    return Err(ValueError::EmptySet("number"));
                }
                Self::NumberSet(
                    items
                        .iter()
                        .map(|n| n.parse::<Number>())
                        .collect::<Result<_, _>>()?,
                )
            }
            AttributeValue::Bs(items) => {
                if items.is_empty() {
                    return Err(ValueError::EmptySet("binary"));
                }
                Self::BinarySet(items.iter().cloned().collect())
            }
        })
    }
}

impl TryFrom<&Value> for AttributeValue {
    type Error = ValueError;

    fn try_from(value: &Value) -> Result<Self, ValueError> {
        Ok(match value {
            Value::String(s) => Self::S(s.clone()),
            Value::Number(n) => Self::N(n.to_string()),
            Value::Binary(b) => Self::B(b.clone()),
            Value::Boolean(b) => Self::Bool(*b),
            Value::Null => Self::Null(true),
            Value::List(items) => {
                Self::L(items.iter().map(Self::try_from).collect::<Result<_, _>>()?)
            }
            Value::Map(map) => Self::M(item_to_attributes(map)?),
            Value::StringSet(set) => Self::Ss(set.iter().cloned().collect()),
            Value::NumberSet(set) => Self::Ns(set.iter().map(ToString::to_string).collect()),
            Value::BinarySet(set) => Self::Bs(set.iter().cloned().collect()),
            Value::Function(_) | Value::Error(_) | Value::Undefined => {
                return Err(ValueError::NotStorable(value.type_name()));
            }
        })
    }
}

/// Convert an external item (or placeholder value map) into engine values.
#[allow(clippy::implicit_hasher)]
pub fn item_from_attributes(
    attributes: &HashMap<String, AttributeValue>,
) -> Result<Item, ValueError> {
    attributes
        .iter()
        .map(|(k, v)| Ok((k.clone(), Value::try_from(v)?)))
        .collect()
}

/// Convert an engine item into the external representation.
#[allow(clippy::implicit_hasher)]
pub fn item_to_attributes(item: &Item) -> Result<HashMap<String, AttributeValue>, ValueError> {
    item.iter()
        .map(|(k, v)| Ok((k.clone(), AttributeValue::try_from(v)?)))
        .collect()
}
