//! Display-currency / native-unit conversion
//!
//! All arithmetic happens on integers in native-unit space: a display amount
//! is split into its decimal mantissa and scale and scaled exactly in `U256`,
//! so repeated conversions never accumulate floating-point drift.

use ethers_core::types::U256;
use rust_decimal::Decimal;

use crate::error::{Error, Result};

/// Fractional digits kept when converting native units back to display currency
pub const DISPLAY_SCALE: u32 = 12;

// 10^77 is the largest power of ten below 2^256
const MAX_DECIMALS: u8 = 36;

/// Fixed-rate converter between a display currency and a chain's smallest unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyConverter {
    /// Display units per whole native coin
    rate: Decimal,
    decimals: u8,
}

impl CurrencyConverter {
    pub fn new(rate: Decimal, decimals: u8) -> Result<Self> {
        if rate <= Decimal::ZERO {
            return Err(Error::Conversion(format!("exchange rate must be positive, got {}", rate)));
        }
        if decimals > MAX_DECIMALS {
            return Err(Error::Conversion(format!("{} decimals is out of range", decimals)));
        }
        Ok(Self { rate, decimals })
    }

    pub fn rate(&self) -> Decimal {
        self.rate
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    /// `floor(amount * 10^decimals / rate)`
    pub fn to_native(&self, amount: Decimal) -> Result<U256> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(Error::Conversion(format!("cannot convert negative amount {}", amount)));
        }

        // amount = m / 10^s, rate = r / 10^t  =>  native = m * 10^(decimals + t) / (r * 10^s)
        let numerator = mantissa(amount)
            .checked_mul(pow10(self.decimals as u32 + self.rate.scale())?)
            .ok_or_else(|| overflow(amount))?;
        let denominator = mantissa(self.rate)
            .checked_mul(pow10(amount.scale())?)
            .ok_or_else(|| overflow(amount))?;

        Ok(numerator / denominator)
    }

    /// `native * rate / 10^decimals`, truncated to [`DISPLAY_SCALE`] fractional digits
    pub fn to_display(&self, native: U256) -> Result<Decimal> {
        let numerator = native
            .checked_mul(mantissa(self.rate))
            .and_then(|n| n.checked_mul(pow10(DISPLAY_SCALE).ok()?))
            .ok_or_else(|| Error::Conversion(format!("{} native units is out of range", native)))?;
        let scaled = numerator / pow10(self.decimals as u32 + self.rate.scale())?;

        if scaled > U256::from(i128::MAX as u128) {
            return Err(Error::Conversion(format!("{} native units is out of range", native)));
        }
        Decimal::try_from_i128_with_scale(scaled.as_u128() as i128, DISPLAY_SCALE)
            .map(|d| d.normalize())
            .map_err(|e| Error::Conversion(format!("{} native units is out of range: {}", native, e)))
    }
}

fn mantissa(value: Decimal) -> U256 {
    U256::from(value.mantissa().unsigned_abs())
}

fn pow10(exponent: u32) -> Result<U256> {
    U256::from(10u8)
        .checked_pow(U256::from(exponent))
        .ok_or_else(|| Error::Conversion(format!("10^{} overflows", exponent)))
}

fn overflow(amount: Decimal) -> Error {
    Error::Conversion(format!("{} is out of range", amount))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::str::FromStr;

    fn ngn_per_eth() -> CurrencyConverter {
        CurrencyConverter::new(Decimal::from(450_000), 18).unwrap()
    }

    #[test]
    fn test_to_native_exact() {
        let converter = CurrencyConverter::new(Decimal::from(500), 18).unwrap();
        assert_eq!(
            converter.to_native(Decimal::from(100)).unwrap(),
            U256::from(200_000_000_000_000_000u64)
        );
        assert_eq!(converter.to_display(U256::exp10(18)).unwrap(), Decimal::from(500));
    }

    #[test]
    fn test_to_native_rounds_down() {
        // 1 NGN = 1e18 / 450000 = 2222222222222.22... wei
        let native = ngn_per_eth().to_native(Decimal::ONE).unwrap();
        assert_eq!(native, U256::from(2_222_222_222_222u64));
    }

    #[test]
    fn test_fractional_rate() {
        let converter = CurrencyConverter::new(Decimal::from_str("0.5").unwrap(), 6).unwrap();
        assert_eq!(converter.to_native(Decimal::from_str("1.25").unwrap()).unwrap(), U256::from(2_500_000u64));
        assert_eq!(converter.to_display(U256::from(2_500_000u64)).unwrap(), Decimal::from_str("1.25").unwrap());
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(CurrencyConverter::new(Decimal::ZERO, 18).is_err());
        assert!(CurrencyConverter::new(Decimal::from(1), 40).is_err());
        assert!(ngn_per_eth().to_native(Decimal::from(-1)).is_err());
        assert!(ngn_per_eth().to_display(U256::MAX).is_err());
    }

    #[test]
    fn test_zero() {
        assert_eq!(ngn_per_eth().to_native(Decimal::ZERO).unwrap(), U256::zero());
        assert_eq!(ngn_per_eth().to_display(U256::zero()).unwrap(), Decimal::ZERO);
    }

    proptest! {
        #[test]
        fn display_round_trip_within_one_unit(cents in 0i64..100_000_000_000) {
            let converter = ngn_per_eth();
            let amount = Decimal::new(cents, 2);

            let native = converter.to_native(amount).unwrap();
            let back = converter.to_display(native).unwrap();

            // One wei is worth 4.5e-13 NGN; display truncation loses under 1e-12 more
            prop_assert!(back <= amount);
            prop_assert!(amount - back < Decimal::new(2, 12));
        }

        #[test]
        fn native_round_trip_within_one_unit(wei in 0u128..100_000_000_000_000_000_000u128) {
            let converter = CurrencyConverter::new(Decimal::from(500), 18).unwrap();
            let native = U256::from(wei);

            let back = converter.to_native(converter.to_display(native).unwrap()).unwrap();

            // 1e-12 display units is 2e3 wei at this rate
            prop_assert!(back <= native);
            prop_assert!(native - back <= U256::from(2_000u64));
        }
    }
}
