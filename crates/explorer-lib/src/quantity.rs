//! Exact resource quantities
//!
//! CPU is held as signed milli-cores and memory as signed bytes, both in an
//! `i64`. Cluster-wide totals are assumed to fit in 63 bits (about 9.2e15
//! cores or 8 EiB); accumulation past that bound saturates and is logged
//! instead of wrapping.
//!
//! Kubernetes quantity strings are parsed with integer arithmetic only and
//! rounded up to the target unit, matching `MilliValue()` / `Value()`.

use crate::error::{Error, Result};
use serde::Serialize;
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::str::FromStr;
use tracing::warn;

const MIB: i64 = 1024 * 1024;

/// Resource kinds tracked by the explorer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Cpu,
    Memory,
}

impl ResourceKind {
    /// Name used by the Kubernetes resource lists
    pub fn api_name(self) -> &'static str {
        match self {
            ResourceKind::Cpu => "cpu",
            ResourceKind::Memory => "memory",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_name())
    }
}

/// Shared behaviour of the exact quantity types
pub trait Amount: Copy {
    /// Underlying integer value (milli-cores or bytes)
    fn base_units(&self) -> i64;

    /// `floor(self / capacity * 100)`; a zero capacity yields 0%.
    fn percent_of(&self, capacity: &Self) -> i64 {
        let capacity = capacity.base_units();
        if capacity == 0 {
            return 0;
        }
        let scaled = i128::from(self.base_units()) * 100;
        let percent = scaled.div_euclid(i128::from(capacity));
        i64::try_from(percent).unwrap_or(if percent > 0 { i64::MAX } else { i64::MIN })
    }
}

/// CPU amount in milli-cores (1000 = one core)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct CpuQuantity(i64);

impl CpuQuantity {
    pub const ZERO: CpuQuantity = CpuQuantity(0);

    pub fn new(millis: i64) -> Self {
        Self(millis)
    }

    pub fn millis(&self) -> i64 {
        self.0
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }
}

impl Amount for CpuQuantity {
    fn base_units(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for CpuQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}m", self.0)
    }
}

impl FromStr for CpuQuantity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ParsedQuantity::parse(s)?.to_scaled(-3, s).map(Self)
    }
}

/// Memory amount in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MemoryQuantity(i64);

impl MemoryQuantity {
    pub const ZERO: MemoryQuantity = MemoryQuantity(0);

    pub fn new(bytes: i64) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> i64 {
        self.0
    }

    /// Whole mebibytes, truncated toward zero
    pub fn mebibytes(&self) -> i64 {
        self.0 / MIB
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }
}

impl Amount for MemoryQuantity {
    fn base_units(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for MemoryQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Mi", self.mebibytes())
    }
}

impl FromStr for MemoryQuantity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ParsedQuantity::parse(s)?.to_scaled(0, s).map(Self)
    }
}

fn saturating_sum(lhs: i64, rhs: i64, unit: &'static str) -> i64 {
    lhs.checked_add(rhs).unwrap_or_else(|| {
        warn!(lhs, rhs, unit, "Quantity accumulator saturated");
        if rhs > 0 {
            i64::MAX
        } else {
            i64::MIN
        }
    })
}

impl Add for CpuQuantity {
    type Output = CpuQuantity;

    fn add(self, rhs: Self) -> Self::Output {
        Self(saturating_sum(self.0, rhs.0, "millicores"))
    }
}

impl AddAssign for CpuQuantity {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for CpuQuantity {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl Add for MemoryQuantity {
    type Output = MemoryQuantity;

    fn add(self, rhs: Self) -> Self::Output {
        Self(saturating_sum(self.0, rhs.0, "bytes"))
    }
}

impl AddAssign for MemoryQuantity {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sum for MemoryQuantity {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

/// A quantity of either kind, used where rows mix metric kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResourceQuantity {
    Cpu(CpuQuantity),
    Memory(MemoryQuantity),
}

impl ResourceQuantity {
    /// Build a quantity of `kind` from its base units
    pub fn of(kind: ResourceKind, base_units: i64) -> Self {
        match kind {
            ResourceKind::Cpu => ResourceQuantity::Cpu(CpuQuantity::new(base_units)),
            ResourceKind::Memory => ResourceQuantity::Memory(MemoryQuantity::new(base_units)),
        }
    }

    pub fn kind(&self) -> ResourceKind {
        match self {
            ResourceQuantity::Cpu(_) => ResourceKind::Cpu,
            ResourceQuantity::Memory(_) => ResourceKind::Memory,
        }
    }

    /// Underlying integer magnitude, used for ordering
    pub fn magnitude(&self) -> i64 {
        match self {
            ResourceQuantity::Cpu(q) => q.base_units(),
            ResourceQuantity::Memory(q) => q.base_units(),
        }
    }
}

impl fmt::Display for ResourceQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceQuantity::Cpu(q) => fmt::Display::fmt(q, f),
            ResourceQuantity::Memory(q) => fmt::Display::fmt(q, f),
        }
    }
}

/// `mantissa * 10^decimal_exponent * 2^binary_exponent`
#[derive(Debug, PartialEq, Eq)]
struct ParsedQuantity {
    mantissa: i128,
    decimal_exponent: i32,
    binary_exponent: u32,
}

impl ParsedQuantity {
    fn parse(input: &str) -> Result<Self> {
        let invalid = |reason| Error::InvalidQuantity {
            input: input.to_string(),
            reason,
        };

        let s = input.trim();
        let (negative, s) = match s.as_bytes().first() {
            Some(b'-') => (true, &s[1..]),
            Some(b'+') => (false, &s[1..]),
            Some(_) => (false, s),
            None => return Err(invalid("empty quantity")),
        };

        let number_len = s
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(s.len());
        let (number, suffix) = s.split_at(number_len);

        let (whole, fraction) = number.split_once('.').unwrap_or((number, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid("missing digits"));
        }
        if fraction.contains('.') {
            return Err(invalid("more than one decimal point"));
        }

        let mut mantissa: i128 = 0;
        for digit in whole.bytes().chain(fraction.bytes()) {
            mantissa = mantissa
                .checked_mul(10)
                .and_then(|m| m.checked_add(i128::from(digit - b'0')))
                .ok_or_else(|| invalid("too many digits"))?;
        }
        if negative {
            mantissa = -mantissa;
        }

        let fraction_len =
            i32::try_from(fraction.len()).map_err(|_| invalid("too many digits"))?;
        let (decimal_exponent, binary_exponent) = match suffix {
            "" => (0, 0),
            "Ki" => (0, 10),
            "Mi" => (0, 20),
            "Gi" => (0, 30),
            "Ti" => (0, 40),
            "Pi" => (0, 50),
            "Ei" => (0, 60),
            "n" => (-9, 0),
            "u" => (-6, 0),
            "m" => (-3, 0),
            "k" => (3, 0),
            "M" => (6, 0),
            "G" => (9, 0),
            "T" => (12, 0),
            "P" => (15, 0),
            "E" => (18, 0),
            other if other.starts_with(['e', 'E']) => {
                let exponent = other[1..]
                    .parse::<i32>()
                    .map_err(|_| invalid("malformed exponent"))?;
                (exponent, 0)
            }
            _ => return Err(invalid("unknown suffix")),
        };

        let decimal_exponent = decimal_exponent
            .checked_sub(fraction_len)
            .ok_or_else(|| invalid("out of range"))?;

        Ok(Self {
            mantissa,
            decimal_exponent,
            binary_exponent,
        })
    }

    /// Value expressed in units of `10^unit_exponent`, rounded up
    fn to_scaled(&self, unit_exponent: i32, input: &str) -> Result<i64> {
        let out_of_range = || Error::InvalidQuantity {
            input: input.to_string(),
            reason: "out of range",
        };

        let binary = 1i128
            .checked_shl(self.binary_exponent)
            .ok_or_else(out_of_range)?;
        let mut value = self.mantissa.checked_mul(binary).ok_or_else(out_of_range)?;

        let exponent = self
            .decimal_exponent
            .checked_sub(unit_exponent)
            .ok_or_else(out_of_range)?;
        if exponent >= 0 {
            let factor = 10i128
                .checked_pow(exponent.unsigned_abs())
                .ok_or_else(out_of_range)?;
            value = value.checked_mul(factor).ok_or_else(out_of_range)?;
        } else {
            // Anything smaller than 10^-38 of a unit rounds to the unit itself.
            value = match 10i128.checked_pow(exponent.unsigned_abs()) {
                Some(divisor) => ceil_div(value, divisor),
                None => i128::from(value > 0),
            };
        }

        i64::try_from(value).map_err(|_| out_of_range())
    }
}

fn ceil_div(value: i128, divisor: i128) -> i128 {
    let quotient = value.div_euclid(divisor);
    if value.rem_euclid(divisor) == 0 {
        quotient
    } else {
        quotient + 1
    }
}
