use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::types::Rate;

/// How often instalments fall due.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentFrequency {
    #[default]
    Monthly,
    Quarterly,
    Yearly,
}

impl PaymentFrequency {
    pub fn periods_per_year(&self) -> u32 {
        match self {
            PaymentFrequency::Monthly => 12,
            PaymentFrequency::Quarterly => 4,
            PaymentFrequency::Yearly => 1,
        }
    }

    pub fn months_per_period(&self) -> u32 {
        match self {
            PaymentFrequency::Monthly => 1,
            PaymentFrequency::Quarterly => 3,
            PaymentFrequency::Yearly => 12,
        }
    }
}

/// Per-period rate as a decimal from an annual percentage.
/// 18% annual, monthly => 0.015.
pub fn period_rate(annual_rate_percent: Rate, frequency: PaymentFrequency) -> Rate {
    annual_rate_percent / dec!(100) / Decimal::from(frequency.periods_per_year())
}

/// Number of whole payment periods in the term. A term that is not an exact
/// multiple of the period length truncates the trailing partial period.
pub fn total_periods(term_months: u32, frequency: PaymentFrequency) -> u32 {
    term_months / frequency.months_per_period()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_period_rate_monthly() {
        assert_eq!(period_rate(dec!(18), PaymentFrequency::Monthly), dec!(0.015));
    }

    #[test]
    fn test_period_rate_quarterly() {
        assert_eq!(period_rate(dec!(12), PaymentFrequency::Quarterly), dec!(0.03));
    }

    #[test]
    fn test_period_rate_zero() {
        assert_eq!(period_rate(Decimal::ZERO, PaymentFrequency::Yearly), Decimal::ZERO);
    }

    #[test]
    fn test_total_periods_exact_multiple() {
        assert_eq!(total_periods(24, PaymentFrequency::Monthly), 24);
        assert_eq!(total_periods(24, PaymentFrequency::Quarterly), 8);
        assert_eq!(total_periods(24, PaymentFrequency::Yearly), 2);
    }

    #[test]
    fn test_total_periods_truncates_partial_period() {
        // 25 months quarterly: the trailing month is dropped, not rounded up
        assert_eq!(total_periods(25, PaymentFrequency::Quarterly), 8);
        assert_eq!(total_periods(11, PaymentFrequency::Yearly), 0);
    }
}
