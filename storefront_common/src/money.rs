use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const STORE_CURRENCY_CODE: &str = "USD";
pub const STORE_CURRENCY_CODE_LOWER: &str = "usd";

//--------------------------------------       Cents         ---------------------------------------------------------
/// A monetary amount in integer minor units (cents). All amounts in the storefront are carried in this type
/// end-to-end; floating point never touches money.
#[derive(Debug, Clone, Copy, Default, Type, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
pub struct Cents(i64);

op!(binary Cents, Add, add);
op!(binary Cents, Sub, sub);
op!(inplace Cents, SubAssign, sub_assign);
op!(unary Cents, Neg, neg);

impl Mul<i64> for Cents {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self::from(self.value() * rhs)
    }
}

impl Sum for Cents {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented in cents: {0}")]
pub struct CentsConversionError(String);

impl From<i64> for Cents {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl PartialEq for Cents {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Cents {}

impl TryFrom<u64> for Cents {
    type Error = CentsConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        if value > i64::MAX as u64 {
            Err(CentsConversionError(format!("Value {} is too large to convert to Cents", value)))
        } else {
            #[allow(clippy::cast_possible_wrap)]
            Ok(Self(value as i64))
        }
    }
}

impl Display for Cents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.abs();
        write!(f, "{sign}${}.{:02}", abs / 100, abs % 100)
    }
}

impl Cents {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_dollars(dollars: i64) -> Self {
        Self(dollars * 100)
    }

    /// The absolute difference between two amounts, in minor units.
    pub fn diff(&self, other: Cents) -> i64 {
        (self.0 - other.0).abs()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_formats_minor_units() {
        assert_eq!(Cents::from(1).to_string(), "$0.01");
        assert_eq!(Cents::from(12_345).to_string(), "$123.45");
        assert_eq!(Cents::from(-250).to_string(), "-$2.50");
        assert_eq!(Cents::from_dollars(10).to_string(), "$10.00");
    }

    #[test]
    fn arithmetic() {
        let a = Cents::from(150);
        let b = Cents::from(75);
        assert_eq!(a + b, Cents::from(225));
        assert_eq!(a - b, Cents::from(75));
        assert_eq!(a * 3, Cents::from(450));
        assert_eq!(a.diff(b), 75);
        assert_eq!(b.diff(a), 75);
        let total: Cents = vec![a, b, Cents::from(25)].into_iter().sum();
        assert_eq!(total, Cents::from(250));
    }
}
