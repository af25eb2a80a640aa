//!
//! # Resource quantities
//!
//! Parsing and arithmetic for Kubernetes resource quantities such as `500m`, `2`, `1Gi` or `1e3`.
//! Values are held as signed milli-units so that cpu and memory share one representation.
//!
use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

pub const RESOURCE_CPU: &str = "cpu";
pub const RESOURCE_MEMORY: &str = "memory";
pub const RESOURCE_STORAGE: &str = "storage";

/// Aggregated requests keyed by resource name
pub type ResourceList = BTreeMap<String, Quantity>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum QuantityError {
    #[error("empty quantity")]
    Empty,
    #[error("invalid number in quantity: {0}")]
    InvalidNumber(String),
    #[error("unknown suffix in quantity: {0}")]
    UnknownSuffix(String),
    #[error("quantity out of range: {0}")]
    Overflow(String),
}

/// Family of the suffix the quantity was written with; used when formatting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum QuantityFormat {
    #[default]
    DecimalSI,
    BinarySI,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Quantity {
    millis: i128,
    format: QuantityFormat,
}

const BINARY_SUFFIXES: [(&str, u32); 6] = [
    ("Ki", 10),
    ("Mi", 20),
    ("Gi", 30),
    ("Ti", 40),
    ("Pi", 50),
    ("Ei", 60),
];

const DECIMAL_SUFFIXES: [(&str, i32); 10] = [
    ("n", -9),
    ("u", -6),
    ("m", -3),
    ("", 0),
    ("k", 3),
    ("M", 6),
    ("G", 9),
    ("T", 12),
    ("P", 15),
    ("E", 18),
];

impl Quantity {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn from_millis(millis: i128, format: QuantityFormat) -> Self {
        Self { millis, format }
    }

    pub fn millis(&self) -> i128 {
        self.millis
    }

    pub fn format(&self) -> QuantityFormat {
        self.format
    }

    pub fn is_zero(&self) -> bool {
        self.millis == 0
    }

    /// multiply by a replica count
    pub fn times(&self, count: i64) -> Self {
        Self {
            millis: self.millis.saturating_mul(count as i128),
            format: self.format,
        }
    }

    pub fn parse(value: &str) -> Result<Self, QuantityError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(QuantityError::Empty);
        }

        let split = value
            .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '+' || c == '-'))
            .unwrap_or(value.len());
        let (number, suffix) = value.split_at(split);

        let (mantissa, scale) = parse_decimal(number)?;
        let overflow = || QuantityError::Overflow(value.to_owned());

        // numerator/denominator of the multiplier, expressed in milli-units
        let (format, num, den): (QuantityFormat, i128, i128) =
            if let Some((_, shift)) = BINARY_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
                (QuantityFormat::BinarySI, 1000i128 << shift, 1)
            } else {
                let exponent = match DECIMAL_SUFFIXES.iter().find(|(s, _)| *s == suffix) {
                    Some((_, exponent)) => *exponent,
                    None => parse_exponent(suffix)
                        .ok_or_else(|| QuantityError::UnknownSuffix(value.to_owned()))?,
                };
                let milli_exponent = exponent.checked_add(3).ok_or_else(overflow)?;
                if milli_exponent >= 0 {
                    let num = 10i128
                        .checked_pow(milli_exponent as u32)
                        .ok_or_else(overflow)?;
                    (QuantityFormat::DecimalSI, num, 1)
                } else {
                    let den = 10i128
                        .checked_pow((-milli_exponent) as u32)
                        .ok_or_else(overflow)?;
                    (QuantityFormat::DecimalSI, 1, den)
                }
            };

        let numerator = mantissa.checked_mul(num).ok_or_else(overflow)?;
        let denominator = 10i128
            .checked_pow(scale)
            .and_then(|d| d.checked_mul(den))
            .ok_or_else(overflow)?;

        // sub-milli precision is rounded up, as the api server does
        let mut millis = numerator / denominator;
        if numerator % denominator > 0 {
            millis += 1;
        }

        Ok(Self { millis, format })
    }
}

fn parse_exponent(suffix: &str) -> Option<i32> {
    let rest = suffix
        .strip_prefix('e')
        .or_else(|| suffix.strip_prefix('E'))?;
    if rest.is_empty() {
        return None;
    }
    rest.parse().ok()
}

/// returns mantissa and number of fractional digits
fn parse_decimal(number: &str) -> Result<(i128, u32), QuantityError> {
    let invalid = || QuantityError::InvalidNumber(number.to_owned());

    let (negative, digits) = match number.as_bytes().first() {
        Some(b'-') => (true, &number[1..]),
        Some(b'+') => (false, &number[1..]),
        Some(_) => (false, number),
        None => return Err(invalid()),
    };

    let (whole, fraction) = match digits.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (digits, ""),
    };

    if (whole.is_empty() && fraction.is_empty())
        || !whole.bytes().all(|b| b.is_ascii_digit())
        || !fraction.bytes().all(|b| b.is_ascii_digit())
    {
        return Err(invalid());
    }

    let mut mantissa: i128 = 0;
    for b in whole.bytes().chain(fraction.bytes()) {
        mantissa = mantissa
            .checked_mul(10)
            .and_then(|m| m.checked_add((b - b'0') as i128))
            .ok_or_else(|| QuantityError::Overflow(number.to_owned()))?;
    }

    Ok((if negative { -mantissa } else { mantissa }, fraction.len() as u32))
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl PartialEq for Quantity {
    fn eq(&self, other: &Self) -> bool {
        self.millis == other.millis
    }
}

impl Eq for Quantity {}

impl PartialOrd for Quantity {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Quantity {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.millis.cmp(&other.millis)
    }
}

impl Add for Quantity {
    type Output = Quantity;

    fn add(self, rhs: Self) -> Self::Output {
        let format = if self.is_zero() { rhs.format } else { self.format };
        Self {
            millis: self.millis.saturating_add(rhs.millis),
            format,
        }
    }
}

impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.millis % 1000 != 0 {
            return write!(f, "{}m", self.millis);
        }

        let value = self.millis / 1000;
        if value == 0 {
            return write!(f, "0");
        }

        if self.format == QuantityFormat::BinarySI {
            for (suffix, shift) in BINARY_SUFFIXES.iter().rev() {
                let unit = 1i128 << shift;
                if value % unit == 0 {
                    return write!(f, "{}{}", value / unit, suffix);
                }
            }
        }

        for (suffix, exponent) in DECIMAL_SUFFIXES.iter().rev() {
            if *exponent <= 0 {
                break;
            }
            let unit = 10i128.pow(*exponent as u32);
            if value % unit == 0 {
                return write!(f, "{}{}", value / unit, suffix);
            }
        }

        write!(f, "{value}")
    }
}

impl Serialize for Quantity {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Quantity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct QuantityVisitor;

        impl Visitor<'_> for QuantityVisitor {
            type Value = Quantity;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a quantity string or number")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Quantity, E> {
                Quantity::parse(v).map_err(E::custom)
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Quantity, E> {
                Ok(Quantity::from_millis(v as i128 * 1000, QuantityFormat::DecimalSI))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Quantity, E> {
                Ok(Quantity::from_millis(v as i128 * 1000, QuantityFormat::DecimalSI))
            }

            fn visit_f64<E: de::Error>(self, v: f64) -> Result<Quantity, E> {
                Quantity::parse(&v.to_string()).map_err(E::custom)
            }
        }

        deserializer.deserialize_any(QuantityVisitor)
    }
}

/// add every resource of `other` into `total`
pub fn add_resource_list(total: &mut ResourceList, other: &ResourceList) {
    for (name, quantity) in other {
        *total.entry(name.clone()).or_default() += *quantity;
    }
}

/// resources for `count` identical pods
pub fn multiply_resource_list(list: &ResourceList, count: i64) -> ResourceList {
    list.iter()
        .map(|(name, quantity)| (name.clone(), quantity.times(count)))
        .collect()
}

/// parse a raw `name -> quantity` map, such as container requests
pub fn parse_resource_list<'a, I>(raw: I) -> Result<ResourceList, QuantityError>
where
    I: IntoIterator<Item = (&'a String, &'a String)>,
{
    raw.into_iter()
        .map(|(name, value)| Ok((name.clone(), Quantity::parse(value)?)))
        .collect()
}

pub fn format_resource_list(list: &ResourceList) -> String {
    list.iter()
        .map(|(name, quantity)| format!("{name}={quantity}"))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod test {
    use super::*;

    fn q(value: &str) -> Quantity {
        Quantity::parse(value).expect("quantity")
    }

    #[test]
    fn test_parse_cpu() {
        assert_eq!(q("500m").millis(), 500);
        assert_eq!(q("2").millis(), 2000);
        assert_eq!(q("1.5").millis(), 1500);
        assert_eq!(q("0.1").millis(), 100);
        assert_eq!(q("100u").millis(), 1);
        assert_eq!(q("1e3").millis(), 1_000_000);
    }

    #[test]
    fn test_parse_memory() {
        assert_eq!(q("1Ki").millis(), 1024 * 1000);
        assert_eq!(q("256Mi").millis(), 256 * 1024 * 1024 * 1000);
        assert_eq!(q("1Gi").format(), QuantityFormat::BinarySI);
        assert_eq!(q("1G").millis(), 1_000_000_000_000);
        assert_eq!(q("1.5Gi"), q("1536Mi"));
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Quantity::parse(""), Err(QuantityError::Empty));
        assert!(matches!(
            Quantity::parse("abc"),
            Err(QuantityError::InvalidNumber(_))
        ));
        assert!(matches!(
            Quantity::parse("10Qi"),
            Err(QuantityError::UnknownSuffix(_))
        ));
        assert!(matches!(
            Quantity::parse("1.2.3"),
            Err(QuantityError::InvalidNumber(_))
        ));

        // exponents at the edge of i32 are rejected, not wrapped
        assert!(matches!(
            Quantity::parse("1e2147483647"),
            Err(QuantityError::Overflow(_))
        ));
        assert!(matches!(
            Quantity::parse("1e40"),
            Err(QuantityError::Overflow(_))
        ));
        assert!(matches!(
            Quantity::parse("1e-2147483648"),
            Err(QuantityError::Overflow(_))
        ));
    }

    #[test]
    fn test_format() {
        assert_eq!(q("500m").to_string(), "500m");
        assert_eq!(q("2").to_string(), "2");
        assert_eq!(q("1.5").to_string(), "1500m");
        assert_eq!(q("1024Mi").to_string(), "1Gi");
        assert_eq!(q("1536Mi").to_string(), "1536Mi");
        assert_eq!(q("2000M").to_string(), "2G");
        assert_eq!(Quantity::zero().to_string(), "0");
    }

    #[test]
    fn test_arithmetic() {
        let total = q("500m") + q("1500m");
        assert_eq!(total.to_string(), "2");

        let memory = q("512Mi").times(3);
        assert_eq!(memory.to_string(), "1536Mi");

        // zero takes the format of the other operand
        assert_eq!((Quantity::zero() + q("1Gi")).to_string(), "1Gi");
    }

    #[test]
    fn test_resource_lists() {
        let mut total = ResourceList::new();
        let pod: ResourceList = [
            (RESOURCE_CPU.to_owned(), q("500m")),
            (RESOURCE_MEMORY.to_owned(), q("1Gi")),
        ]
        .into_iter()
        .collect();

        add_resource_list(&mut total, &multiply_resource_list(&pod, 3));
        add_resource_list(&mut total, &pod);

        assert_eq!(format_resource_list(&total), "cpu=2,memory=4Gi");
    }

    #[test]
    fn test_serde() {
        let list: ResourceList =
            serde_json::from_str(r#"{"cpu":"250m","memory":"64Mi","pods":2}"#).expect("json");
        assert_eq!(list["cpu"].millis(), 250);
        assert_eq!(list["pods"].millis(), 2000);
        assert_eq!(
            serde_json::to_string(&list).expect("json"),
            r#"{"cpu":"250m","memory":"64Mi","pods":"2"}"#
        );
    }
}
