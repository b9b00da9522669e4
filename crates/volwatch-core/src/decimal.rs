//! Precision-safe decimal types for volume accounting.
//!
//! Uses `rust_decimal` so that a running window sum can be maintained by
//! repeated add/subtract without floating-point drift.

use crate::error::{CoreError, Result as CoreResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;

/// Unit price in the quote currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl Price {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Price {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<Decimal> for Price {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

/// Traded quantity in the target currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Qty(pub Decimal);

impl Qty {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    /// Quote-currency notional of this quantity: qty * price.
    ///
    /// Returns `CoreError::VolumeOverflow` if the product does not fit.
    pub fn notional(&self, price: Price) -> CoreResult<Volume> {
        self.0
            .checked_mul(price.0)
            .map(Volume)
            .ok_or_else(|| CoreError::VolumeOverflow(format!("{} * {}", self.0, price.0)))
    }
}

impl fmt::Display for Qty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Qty {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Traded volume denominated in the quote currency (e.g. KRW notional).
///
/// Plain arithmetic is unchecked. Volumes entering the system go through
/// `TradeEvent::new`, which enforces `0 <= volume <= MAX_PLAUSIBLE`; sums use
/// [`Volume::checked_add`].
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Volume(pub Decimal);

impl Volume {
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Largest single volume accepted from a source: 10^18 quote units.
    pub const MAX_PLAUSIBLE: Self = Self(Decimal::from_parts(0xA764_0000, 0x0DE0_B6B3, 0, false, 0));

    /// Non-negative and no larger than [`Volume::MAX_PLAUSIBLE`].
    #[inline]
    pub fn is_plausible(&self) -> bool {
        !self.is_negative() && *self <= Self::MAX_PLAUSIBLE
    }

    #[inline]
    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).map(Self)
    }

    #[inline]
    pub fn saturating_add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub fn is_positive(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    #[inline]
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Signed difference `self - earlier`, `None` on overflow.
    #[inline]
    pub fn delta_from(&self, earlier: Volume) -> Option<Decimal> {
        self.0.checked_sub(earlier.0)
    }

    /// Ratio `self / other`, `None` when `other` is zero or on overflow.
    #[inline]
    pub fn ratio_to(&self, other: Volume) -> Option<Decimal> {
        self.0.checked_div(other.0)
    }

    /// Volume truncated to whole quote units, for display.
    pub fn whole(&self) -> Decimal {
        self.0.trunc()
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Volume {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl From<Decimal> for Volume {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

impl Add for Volume {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Volume {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for Volume {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Volume {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Sum for Volume {
    /// Saturates instead of overflowing.
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Volume::ZERO, Volume::saturating_add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_notional_calculation() {
        let qty = Qty::new(dec!(1250.5));
        let price = Price::new(dec!(130.2));

        assert_eq!(qty.notional(price).unwrap(), Volume::new(dec!(162815.10)));
    }

    #[test]
    fn test_notional_overflow_is_an_error() {
        let qty = Qty::new(dec!(2));
        let price = Price::new(Decimal::MAX);

        let result = qty.notional(price);
        assert!(matches!(result, Err(CoreError::VolumeOverflow(_))));
    }

    #[test]
    fn test_max_plausible_volume() {
        assert_eq!(Volume::MAX_PLAUSIBLE.inner(), dec!(1000000000000000000));
        assert!(Volume::MAX_PLAUSIBLE.is_plausible());
        assert!(Volume::ZERO.is_plausible());
        assert!(!Volume::new(dec!(1000000000000000000.01)).is_plausible());
        assert!(!Volume::new(dec!(-1)).is_plausible());
    }

    #[test]
    fn test_checked_and_saturating_add() {
        let big = Volume::new(Decimal::MAX);
        assert_eq!(big.checked_add(Volume::new(dec!(1))), None);
        assert_eq!(big.saturating_add(Volume::new(dec!(1))), big);
        assert_eq!(
            Volume::new(dec!(1.5)).checked_add(Volume::new(dec!(2))),
            Some(Volume::new(dec!(3.5)))
        );
    }

    #[test]
    fn test_volume_delta_and_sign() {
        let earlier = Volume::new(dec!(250));
        let later = Volume::new(dec!(400));

        assert_eq!(later.delta_from(earlier), Some(dec!(150)));
        assert_eq!(earlier.delta_from(later), Some(dec!(-150)));
        assert_eq!(Volume::new(Decimal::MAX).delta_from(Volume::new(Decimal::MIN)), None);
        assert!(Volume::new(dec!(-1)).is_negative());
        assert!(!Volume::ZERO.is_positive());
        assert!(!Volume::ZERO.is_negative());
    }

    #[test]
    fn test_volume_add_sub_is_exact() {
        let mut sum = Volume::ZERO;
        for _ in 0..1000 {
            sum += Volume::new(dec!(0.1));
        }
        for _ in 0..1000 {
            sum -= Volume::new(dec!(0.1));
        }
        assert!(sum.is_zero());
    }

    #[test]
    fn test_ratio_to_zero() {
        assert_eq!(Volume::new(dec!(10)).ratio_to(Volume::ZERO), None);
        assert_eq!(
            Volume::new(dec!(10)).ratio_to(Volume::new(dec!(4))),
            Some(dec!(2.5))
        );
    }

    #[test]
    fn test_whole_truncates() {
        assert_eq!(Volume::new(dec!(11500000.97)).whole(), dec!(11500000));
    }
}
