use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::LoanEngineError;
use crate::schedule::{LoanRequest, LoanSchedule, RepaymentScheme};
use crate::types::{Money, Rate};
use crate::LoanEngineResult;

/// Aggregated view of a schedule plus the penalty and fee overlays.
///
/// Optional fields are None when the overlay was not requested, which is
/// distinct from a computed zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanSummary {
    /// First period's instalment, the quoted figure.
    pub monthly_installment: Money,
    /// Sum of all instalments.
    pub total_repayment: Money,
    /// Sum of all interest components.
    pub total_interest: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_late_penalty: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_fees: Option<Money>,
    /// total_repayment plus whichever overlays apply.
    pub final_payable_amount: Money,
    /// Annualised cost of a simple-interest loan, for comparison against
    /// annuity quotes. None for every other scheme.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effective_annual_rate: Option<Rate>,
    pub schedule: LoanSchedule,
}

/// Fold a schedule into its summary and apply the request's overlays.
pub fn summarize_schedule(
    schedule: &LoanSchedule,
    request: &LoanRequest,
) -> LoanEngineResult<LoanSummary> {
    let first = schedule.first().ok_or_else(|| {
        LoanEngineError::InsufficientData("Cannot summarise an empty schedule".into())
    })?;

    let monthly_installment = first.installment_amount;
    let total_repayment: Money = schedule.iter().map(|p| p.installment_amount).sum();
    let total_interest: Money = schedule.iter().map(|p| p.interest_component).sum();

    let total_late_penalty = if request.late_months > 0
        && request.late_penalty_rate_percent > Decimal::ZERO
    {
        Some(
            Decimal::from(request.late_months)
                * monthly_installment
                * request.late_penalty_rate_percent
                / dec!(100),
        )
    } else {
        None
    };

    let total_fees = if request.fee_flat > Decimal::ZERO || request.fee_percent > Decimal::ZERO {
        Some(request.fee_flat + request.principal * request.fee_percent / dec!(100))
    } else {
        None
    };

    let final_payable_amount = total_repayment
        + total_late_penalty.unwrap_or(Decimal::ZERO)
        + total_fees.unwrap_or(Decimal::ZERO);

    let effective_annual_rate = match request.scheme {
        RepaymentScheme::SimpleInterest => {
            if request.principal.is_zero() || request.term_months == 0 {
                None
            } else {
                Some(
                    total_interest / request.principal * dec!(12)
                        / Decimal::from(request.term_months)
                        * dec!(100),
                )
            }
        }
        _ => None,
    };

    Ok(LoanSummary {
        monthly_installment,
        total_repayment,
        total_interest,
        total_late_penalty,
        total_fees,
        final_payable_amount,
        effective_annual_rate,
        schedule: schedule.clone(),
    })
}
