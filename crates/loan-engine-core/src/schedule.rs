use chrono::{Months, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LoanEngineError;
use crate::rates::{period_rate, total_periods, PaymentFrequency};
use crate::types::{Money, Rate};
use crate::LoanEngineResult;

// ---------------------------------------------------------------------------
// Input types
// ---------------------------------------------------------------------------

/// How principal and interest are spread across the term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepaymentScheme {
    /// Fixed instalment amortising principal and interest together.
    Annuity,
    /// Flat instalment from non-compounding interest on the full principal.
    SimpleInterest,
    /// Rate steps up at fixed intervals; the loan re-amortises at each step.
    Stepped,
    /// Interest-only prefix, then annuity amortisation of the full balance.
    GracePeriod,
}

/// Loan product category. Low-interest (qarz-style) products carry a
/// regulatory cap on the nominal annual rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProductKind {
    #[default]
    Standard,
    LowInterest,
}

/// Input for schedule generation and summary computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanRequest {
    /// Amount borrowed, in currency units.
    pub principal: Money,
    /// Nominal annual rate as a percentage (18 = 18%).
    pub annual_rate_percent: Rate,
    /// Term in months.
    pub term_months: u32,
    pub scheme: RepaymentScheme,
    #[serde(default)]
    pub frequency: PaymentFrequency,
    #[serde(default)]
    pub product_kind: ProductKind,
    /// Interest-only months at the start (GracePeriod scheme).
    #[serde(default)]
    pub grace_period_months: u32,
    /// Months between rate steps (Stepped scheme).
    #[serde(default)]
    pub step_months: u32,
    /// Annual-percent increase applied at each step (Stepped scheme).
    #[serde(default)]
    pub step_rate_increase_percent: Rate,
    /// First due date is one period after this. None means today.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    /// Overdue months for the late-penalty overlay.
    #[serde(default)]
    pub late_months: u32,
    /// Penalty per overdue month, as a percentage of one instalment.
    #[serde(default)]
    pub late_penalty_rate_percent: Rate,
    /// One-off origination fee.
    #[serde(default)]
    pub fee_flat: Money,
    /// Origination fee as a percentage of principal.
    #[serde(default)]
    pub fee_percent: Rate,
}

// ---------------------------------------------------------------------------
// Output types
// ---------------------------------------------------------------------------

/// One row of an amortisation schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentPeriod {
    /// 1-based period number.
    pub index: u32,
    pub due_date: NaiveDate,
    pub principal_component: Money,
    pub interest_component: Money,
    pub installment_amount: Money,
    /// Balance after this period's principal is paid.
    pub remaining_balance: Money,
}

/// Ordered amortisation schedule, one entry per due date.
pub type LoanSchedule = Vec<PaymentPeriod>;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Build the full amortisation schedule for a resolved request.
///
/// The last period's principal component is forced to the remaining balance,
/// so the schedule always closes at exactly zero regardless of accumulated
/// decimal residue in the instalment split.
pub fn generate_schedule(request: &LoanRequest) -> LoanEngineResult<LoanSchedule> {
    let n = total_periods(request.term_months, request.frequency);
    if n == 0 {
        return Err(LoanEngineError::InvalidInput {
            field: "term_months".into(),
            reason: format!(
                "Term of {} months is shorter than one {:?} period",
                request.term_months, request.frequency
            ),
        });
    }

    let rate = period_rate(request.annual_rate_percent, request.frequency);
    let start = request
        .start_date
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    let months_per_period = request.frequency.months_per_period();

    let mut periods: LoanSchedule = Vec::with_capacity(n as usize);
    let mut balance = request.principal;

    match request.scheme {
        RepaymentScheme::Annuity => {
            let installment = annuity_installment(balance, rate, n)?;
            for index in 1..=n {
                let interest = balance * rate;
                let principal = if index == n { balance } else { installment - interest };
                balance -= principal;
                periods.push(PaymentPeriod {
                    index,
                    due_date: due_date(start, index * months_per_period)?,
                    principal_component: principal,
                    interest_component: interest,
                    installment_amount: installment,
                    remaining_balance: balance,
                });
            }
        }

        RepaymentScheme::SimpleInterest => {
            // Interest accrues on the full principal without compounding, so
            // both components are flat and the balance declines linearly.
            let interest = request.principal * rate;
            let principal_part = request.principal / Decimal::from(n);
            let installment = principal_part + interest;
            for index in 1..=n {
                let principal = if index == n { balance } else { principal_part };
                balance -= principal;
                periods.push(PaymentPeriod {
                    index,
                    due_date: due_date(start, index * months_per_period)?,
                    principal_component: principal,
                    interest_component: interest,
                    installment_amount: installment,
                    remaining_balance: balance,
                });
            }
        }

        RepaymentScheme::Stepped => {
            let step_periods = request.step_months / months_per_period;
            if step_periods == 0 {
                return Err(LoanEngineError::InvalidInput {
                    field: "step_months".into(),
                    reason: format!(
                        "Step of {} months is shorter than one {:?} period",
                        request.step_months, request.frequency
                    ),
                });
            }

            let mut block_rate = rate;
            let mut installment = Decimal::ZERO;
            for index in 1..=n {
                let elapsed = index - 1;
                if elapsed % step_periods == 0 {
                    // Block boundary: step the rate up and re-amortise the
                    // current balance over everything still outstanding.
                    let block = elapsed / step_periods;
                    let annual = request.annual_rate_percent
                        + request.step_rate_increase_percent * Decimal::from(block);
                    block_rate = period_rate(annual, request.frequency);
                    installment = annuity_installment(balance, block_rate, n - elapsed)?;
                }
                let interest = balance * block_rate;
                let principal = if index == n { balance } else { installment - interest };
                balance -= principal;
                periods.push(PaymentPeriod {
                    index,
                    due_date: due_date(start, index * months_per_period)?,
                    principal_component: principal,
                    interest_component: interest,
                    installment_amount: installment,
                    remaining_balance: balance,
                });
            }
        }

        RepaymentScheme::GracePeriod => {
            let grace_periods = request.grace_period_months / months_per_period;
            if grace_periods >= n {
                return Err(LoanEngineError::InvalidInput {
                    field: "grace_period_months".into(),
                    reason: format!(
                        "Grace of {} months leaves no repayment periods in a {}-month term",
                        request.grace_period_months, request.term_months
                    ),
                });
            }

            // Interest-only prefix: the balance does not move.
            for index in 1..=grace_periods {
                let interest = balance * rate;
                periods.push(PaymentPeriod {
                    index,
                    due_date: due_date(start, index * months_per_period)?,
                    principal_component: Decimal::ZERO,
                    interest_component: interest,
                    installment_amount: interest,
                    remaining_balance: balance,
                });
            }

            let installment = annuity_installment(balance, rate, n - grace_periods)?;
            for index in (grace_periods + 1)..=n {
                let interest = balance * rate;
                let principal = if index == n { balance } else { installment - interest };
                balance -= principal;
                periods.push(PaymentPeriod {
                    index,
                    due_date: due_date(start, index * months_per_period)?,
                    principal_component: principal,
                    interest_component: interest,
                    installment_amount: installment,
                    remaining_balance: balance,
                });
            }
        }
    }

    Ok(periods)
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Level instalment for a balance amortised over `periods` at `rate`:
///   A = B·r / (1 − (1+r)^−n), or B/n when r = 0.
pub(crate) fn annuity_installment(
    balance: Money,
    rate: Rate,
    periods: u32,
) -> LoanEngineResult<Money> {
    if periods == 0 {
        return Err(LoanEngineError::DivisionByZero {
            context: "annuity instalment with zero periods".into(),
        });
    }
    if rate.is_zero() {
        return Ok(balance / Decimal::from(periods));
    }

    let denom = Decimal::ONE - discount_factor(rate, periods);
    if denom <= Decimal::ZERO {
        return Err(LoanEngineError::DivisionByZero {
            context: format!("annuity factor at rate {rate} over {periods} periods"),
        });
    }
    Ok(balance * rate / denom)
}

/// (1+rate)^−n by repeated multiplication. The integer exponent stays exact
/// where powd would drift, and the factor only shrinks, so no rate can push
/// it out of Decimal range.
pub(crate) fn discount_factor(rate: Rate, periods: u32) -> Decimal {
    let recip = Decimal::ONE / (Decimal::ONE + rate);
    let mut factor = Decimal::ONE;
    for _ in 0..periods {
        factor *= recip;
    }
    factor
}

fn due_date(start: NaiveDate, months_ahead: u32) -> LoanEngineResult<NaiveDate> {
    start
        .checked_add_months(Months::new(months_ahead))
        .ok_or_else(|| {
            LoanEngineError::DateError(format!("Due date overflows at +{months_ahead} months"))
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
