use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};
use sqlx::Type;
use thiserror::Error;

use crate::op;

pub const KES_CURRENCY_CODE: &str = "KES";

//--------------------------------------        Money         ---------------------------------------------------------
/// An amount of money in cents of the store currency.
///
/// Prices, order totals and payment amounts are all stored as `Money`, so no floating point arithmetic ever touches a
/// balance. Mobile money providers only accept whole units; use [`Money::whole_units_ceil`] when building a request.
#[derive(Debug, Clone, Copy, Default, Type, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[sqlx(transparent)]
#[serde(transparent)]
pub struct Money(i64);

op!(binary Money, Add, add);
op!(binary Money, Sub, sub);
op!(inplace Money, AddAssign, add_assign);
op!(inplace Money, SubAssign, sub_assign);
op!(unary Money, Neg, neg);

impl Mul<i64> for Money {
    type Output = Self;

    fn mul(self, rhs: i64) -> Self::Output {
        Self(self.0 * rhs)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as a money amount: {0}")]
pub struct MoneyConversionError(String);

impl From<i64> for Money {
    fn from(cents: i64) -> Self {
        Self(cents)
    }
}

impl TryFrom<u64> for Money {
    type Error = MoneyConversionError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        i64::try_from(value)
            .map(Self)
            .map_err(|_| MoneyConversionError(format!("{value} cents is too large to store")))
    }
}

impl Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{KES_CURRENCY_CODE} {}.{:02}", abs / 100, abs % 100)
    }
}

impl Money {
    pub fn value(&self) -> i64 {
        self.0
    }

    pub fn from_whole_units(units: i64) -> Self {
        Self(units * 100)
    }

    /// Parses a decimal string such as "1250", "1250.5" or "1250.50" into cents.
    pub fn from_decimal_str(s: &str) -> Result<Self, MoneyConversionError> {
        let s = s.trim();
        let err = || MoneyConversionError(format!("'{s}' is not a valid amount"));
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let (units, cents) = match digits.split_once('.') {
            Some((u, c)) if !c.is_empty() && c.len() <= 2 => {
                let c = if c.len() == 1 { format!("{c}0") } else { c.to_string() };
                (u, c)
            },
            Some(_) => return Err(err()),
            None => (digits, "00".to_string()),
        };
        let units = units.parse::<i64>().map_err(|_| err())?;
        let cents = cents.parse::<i64>().map_err(|_| err())?;
        let value = units.checked_mul(100).and_then(|v| v.checked_add(cents)).ok_or_else(err)?;
        Ok(Self(if negative { -value } else { value }))
    }

    /// The amount in whole currency units, rounded up so that the payer is never undercharged.
    pub fn whole_units_ceil(&self) -> i64 {
        (self.0 + 99).div_euclid(100)
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display() {
        assert_eq!(Money::from(125_050).to_string(), "KES 1250.50");
        assert_eq!(Money::from(5).to_string(), "KES 0.05");
        assert_eq!(Money::from(-250).to_string(), "-KES 2.50");
    }

    #[test]
    fn arithmetic() {
        let mut total = Money::from_whole_units(10) * 3;
        total += Money::from(50);
        total -= Money::from(25);
        assert_eq!(total, Money::from(3025));
        assert_eq!(-total, Money::from(-3025));
        let sum: Money = vec![Money::from(1), Money::from(2), Money::from(3)].into_iter().sum();
        assert_eq!(sum.value(), 6);
    }

    #[test]
    fn whole_units_round_up() {
        assert_eq!(Money::from(100).whole_units_ceil(), 1);
        assert_eq!(Money::from(101).whole_units_ceil(), 2);
        assert_eq!(Money::from(0).whole_units_ceil(), 0);
    }

    #[test]
    fn parse_decimal() {
        assert_eq!(Money::from_decimal_str("1250").unwrap(), Money::from(125_000));
        assert_eq!(Money::from_decimal_str("1250.5").unwrap(), Money::from(125_050));
        assert_eq!(Money::from_decimal_str(" 0.05 ").unwrap(), Money::from(5));
        assert_eq!(Money::from_decimal_str("-2.50").unwrap(), Money::from(-250));
        assert!(Money::from_decimal_str("12.345").is_err());
        assert!(Money::from_decimal_str("abc").is_err());
    }

    #[test]
    fn serializes_as_plain_number() {
        let json = serde_json::to_string(&Money::from(4200)).unwrap();
        assert_eq!(json, "4200");
        let back: Money = serde_json::from_str("4200").unwrap();
        assert_eq!(back, Money::from(4200));
    }
}
