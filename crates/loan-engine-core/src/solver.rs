use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::LoanEngineError;
use crate::rates::{period_rate, total_periods, PaymentFrequency};
use crate::schedule::{
    annuity_installment, discount_factor, generate_schedule, LoanRequest, ProductKind,
    RepaymentScheme,
};
use crate::summary::summarize_schedule;
use crate::types::{Money, Rate};
use crate::LoanEngineResult;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Hard cap on bisection steps for any solve.
const MAX_SOLVER_ITERATIONS: u32 = 100;

/// A solve converges once the forward instalment is within one currency unit
/// of the target.
const INSTALLMENT_TOLERANCE: Decimal = dec!(1);

/// Bracket-collapse floor for the rate solve, in annual percent. The
/// currency-unit tolerance above is the primary criterion; this stops the
/// search once the bracket is far tighter than any quoted rate.
const RATE_EPSILON: Decimal = dec!(0.0000001);

/// Bracket-collapse floor for the term solve, in months.
const TERM_EPSILON: Decimal = dec!(0.0000001);

/// Annual rate search bracket, in percent.
const RATE_BRACKET_HIGH: Decimal = dec!(100);

/// Term search bracket, in months.
const TERM_BRACKET_LOW: Decimal = dec!(1);
const TERM_BRACKET_HIGH: Decimal = dec!(600);

// ---------------------------------------------------------------------------
// Input / Output types
// ---------------------------------------------------------------------------

/// Which of the four loan quantities is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolveTarget {
    Principal,
    Rate,
    Term,
    Installment,
}

impl SolveTarget {
    fn name(&self) -> &'static str {
        match self {
            SolveTarget::Principal => "principal",
            SolveTarget::Rate => "rate",
            SolveTarget::Term => "term",
            SolveTarget::Installment => "installment",
        }
    }
}

/// A loan request with one quantity unknown: the three fields that are not
/// the target must be supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveRequest {
    pub target: SolveTarget,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub principal: Option<Money>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annual_rate_percent: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term_months: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installment: Option<Money>,
    pub scheme: RepaymentScheme,
    #[serde(default)]
    pub frequency: PaymentFrequency,
    #[serde(default)]
    pub product_kind: ProductKind,
    #[serde(default)]
    pub grace_period_months: u32,
    #[serde(default)]
    pub step_months: u32,
    #[serde(default)]
    pub step_rate_increase_percent: Rate,
}

/// Result of a parameter solve. `iterations` is zero for closed forms;
/// `residual` is the forward instalment minus the target at the returned
/// value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveOutput {
    pub target: SolveTarget,
    pub value: Decimal,
    pub iterations: u32,
    pub residual: Decimal,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Find the unknown quantity. Closed-form where one exists (installment,
/// principal), bisection on the forward instalment function otherwise.
pub fn solve(request: &SolveRequest) -> LoanEngineResult<SolveOutput> {
    // Low-interest products quote a fixed instalment only; the inverse
    // problems are not defined for them.
    if request.product_kind == ProductKind::LowInterest
        && request.target != SolveTarget::Installment
    {
        return Err(LoanEngineError::UnsupportedCombination {
            product: "LowInterest".into(),
            target: request.target.name().into(),
        });
    }

    match request.target {
        SolveTarget::Installment => solve_installment(request),
        SolveTarget::Principal => solve_principal(request),
        SolveTarget::Rate => solve_rate(request),
        SolveTarget::Term => solve_term(request),
    }
}

/// Gross-up a net disbursement: find the gross principal whose fees leave
/// exactly `net_amount` in hand. Bisection on the gross→net function.
pub fn solve_gross_principal(
    net_amount: Money,
    fee_flat: Money,
    fee_percent: Rate,
) -> LoanEngineResult<SolveOutput> {
    if net_amount <= Decimal::ZERO {
        return Err(LoanEngineError::InvalidInput {
            field: "net_amount".into(),
            reason: "Net amount must be positive".into(),
        });
    }
    if fee_flat < Decimal::ZERO || fee_percent < Decimal::ZERO {
        return Err(LoanEngineError::InvalidInput {
            field: "fees".into(),
            reason: "Fees cannot be negative".into(),
        });
    }
    if fee_percent >= dec!(100) {
        return Err(LoanEngineError::InvalidInput {
            field: "fee_percent".into(),
            reason: "A fee of 100% or more consumes the whole gross amount".into(),
        });
    }

    let net_of = |gross: Decimal| gross - fee_flat - gross * fee_percent / dec!(100);

    // net_of is increasing in gross, and the upper bound is the exact
    // inverse pushed out by one unit.
    let mut lo = net_amount;
    let mut hi = (net_amount + fee_flat) / (Decimal::ONE - fee_percent / dec!(100)) + Decimal::ONE;

    for iteration in 1..=MAX_SOLVER_ITERATIONS {
        let mid = (lo + hi) / dec!(2);
        let delta = net_of(mid) - net_amount;
        if delta.abs() <= INSTALLMENT_TOLERANCE {
            return Ok(SolveOutput {
                target: SolveTarget::Principal,
                value: mid,
                iterations: iteration,
                residual: delta,
            });
        }
        if delta > Decimal::ZERO {
            hi = mid;
        } else {
            lo = mid;
        }
    }

    Err(LoanEngineError::ConvergenceFailure {
        function: "gross principal bisection".into(),
        iterations: MAX_SOLVER_ITERATIONS,
        last_delta: net_of((lo + hi) / dec!(2)) - net_amount,
    })
}

// ---------------------------------------------------------------------------
// Per-target solves
// ---------------------------------------------------------------------------

fn solve_installment(request: &SolveRequest) -> LoanEngineResult<SolveOutput> {
    let loan = LoanRequest {
        principal: require(request.principal, "principal")?,
        annual_rate_percent: require(request.annual_rate_percent, "annual_rate_percent")?,
        term_months: require(request.term_months, "term_months")?,
        scheme: request.scheme,
        frequency: request.frequency,
        product_kind: request.product_kind,
        grace_period_months: request.grace_period_months,
        step_months: request.step_months,
        step_rate_increase_percent: request.step_rate_increase_percent,
        start_date: None,
        late_months: 0,
        late_penalty_rate_percent: Decimal::ZERO,
        fee_flat: Decimal::ZERO,
        fee_percent: Decimal::ZERO,
    };

    let schedule = generate_schedule(&loan)?;
    let summary = summarize_schedule(&schedule, &loan)?;
    Ok(SolveOutput {
        target: SolveTarget::Installment,
        value: summary.monthly_installment,
        iterations: 0,
        residual: Decimal::ZERO,
    })
}

fn solve_principal(request: &SolveRequest) -> LoanEngineResult<SolveOutput> {
    let annual = require(request.annual_rate_percent, "annual_rate_percent")?;
    let term_months = require(request.term_months, "term_months")?;
    let installment = require(request.installment, "installment")?;

    let n = total_periods(term_months, request.frequency);
    if n == 0 {
        return Err(LoanEngineError::InvalidInput {
            field: "term_months".into(),
            reason: "Term is shorter than one payment period".into(),
        });
    }
    let rate = period_rate(annual, request.frequency);

    let principal = match request.scheme {
        RepaymentScheme::Annuity => {
            if rate.is_zero() {
                installment * Decimal::from(n)
            } else {
                // P = A·(1 − (1+r)^−n) / r
                installment * (Decimal::ONE - discount_factor(rate, n)) / rate
            }
        }
        RepaymentScheme::SimpleInterest => {
            // A = P·(1/n + r)  =>  P = A·n / (1 + r·n)
            installment * Decimal::from(n) / (Decimal::ONE + rate * Decimal::from(n))
        }
        RepaymentScheme::Stepped | RepaymentScheme::GracePeriod => {
            // Every scheme's first instalment scales linearly with principal,
            // so one forward evaluation at unit principal fixes the ratio.
            let unit = SolveRequest {
                target: SolveTarget::Installment,
                principal: Some(Decimal::ONE),
                annual_rate_percent: Some(annual),
                term_months: Some(term_months),
                installment: None,
                ..request.clone()
            };
            let unit_installment = solve_installment(&unit)?.value;
            if unit_installment.is_zero() {
                return Err(LoanEngineError::DivisionByZero {
                    context: "unit instalment in principal solve".into(),
                });
            }
            installment / unit_installment
        }
    };

    Ok(SolveOutput {
        target: SolveTarget::Principal,
        value: principal,
        iterations: 0,
        residual: Decimal::ZERO,
    })
}

fn solve_rate(request: &SolveRequest) -> LoanEngineResult<SolveOutput> {
    require_direct_scheme(request)?;
    let principal = require(request.principal, "principal")?;
    let term_months = require(request.term_months, "term_months")?;
    let target = require(request.installment, "installment")?;

    let n = total_periods(term_months, request.frequency);
    if n == 0 {
        return Err(LoanEngineError::InvalidInput {
            field: "term_months".into(),
            reason: "Term is shorter than one payment period".into(),
        });
    }

    let delta_at = |annual: Rate| -> LoanEngineResult<Decimal> {
        Ok(level_installment(principal, annual, n, request.scheme, request.frequency)? - target)
    };

    // The instalment grows with the rate, so the bracket must straddle zero.
    let mut lo = Decimal::ZERO;
    let mut hi = RATE_BRACKET_HIGH;
    let delta_lo = delta_at(lo)?;
    if delta_lo.abs() <= INSTALLMENT_TOLERANCE {
        return Ok(SolveOutput {
            target: SolveTarget::Rate,
            value: lo,
            iterations: 0,
            residual: delta_lo,
        });
    }
    if delta_lo > Decimal::ZERO {
        return Err(LoanEngineError::InvalidInput {
            field: "installment".into(),
            reason: "Target instalment is below the zero-rate instalment".into(),
        });
    }
    if delta_at(hi)? < -INSTALLMENT_TOLERANCE {
        return Err(LoanEngineError::InvalidInput {
            field: "installment".into(),
            reason: "Target instalment requires an annual rate above 100%".into(),
        });
    }

    for iteration in 1..=MAX_SOLVER_ITERATIONS {
        let mid = (lo + hi) / dec!(2);
        let delta = delta_at(mid)?;
        if delta.abs() <= INSTALLMENT_TOLERANCE || hi - lo <= RATE_EPSILON {
            return Ok(SolveOutput {
                target: SolveTarget::Rate,
                value: mid,
                iterations: iteration,
                residual: delta,
            });
        }
        if delta > Decimal::ZERO {
            hi = mid;
        } else {
            lo = mid;
        }
    }

    Err(LoanEngineError::ConvergenceFailure {
        function: "rate bisection".into(),
        iterations: MAX_SOLVER_ITERATIONS,
        last_delta: delta_at((lo + hi) / dec!(2))?,
    })
}

fn solve_term(request: &SolveRequest) -> LoanEngineResult<SolveOutput> {
    require_direct_scheme(request)?;
    let principal = require(request.principal, "principal")?;
    let annual = require(request.annual_rate_percent, "annual_rate_percent")?;
    let target = require(request.installment, "installment")?;

    let rate = period_rate(annual, request.frequency);
    let months_per_period = Decimal::from(request.frequency.months_per_period());

    // Continuous relaxation: evaluate the closed-form instalment at a
    // fractional period count, return fractional months. Callers round to
    // whole periods.
    let delta_at = |months: Decimal| -> LoanEngineResult<Decimal> {
        let periods = months / months_per_period;
        Ok(continuous_installment(principal, rate, periods, request.scheme)? - target)
    };

    // Instalment shrinks as the term grows.
    let mut lo = TERM_BRACKET_LOW;
    let mut hi = TERM_BRACKET_HIGH;
    if delta_at(lo)? < -INSTALLMENT_TOLERANCE {
        return Err(LoanEngineError::InvalidInput {
            field: "installment".into(),
            reason: "Target instalment exceeds the one-month instalment".into(),
        });
    }
    let delta_hi = delta_at(hi)?;
    if delta_hi > INSTALLMENT_TOLERANCE {
        return Err(LoanEngineError::InvalidInput {
            field: "installment".into(),
            reason: "Loan does not amortise within 600 months at this instalment".into(),
        });
    }

    for iteration in 1..=MAX_SOLVER_ITERATIONS {
        let mid = (lo + hi) / dec!(2);
        let delta = delta_at(mid)?;
        if delta.abs() <= INSTALLMENT_TOLERANCE || hi - lo <= TERM_EPSILON {
            return Ok(SolveOutput {
                target: SolveTarget::Term,
                value: mid,
                iterations: iteration,
                residual: delta,
            });
        }
        if delta > Decimal::ZERO {
            lo = mid;
        } else {
            hi = mid;
        }
    }

    Err(LoanEngineError::ConvergenceFailure {
        function: "term bisection".into(),
        iterations: MAX_SOLVER_ITERATIONS,
        last_delta: delta_at((lo + hi) / dec!(2))?,
    })
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

fn require<T>(value: Option<T>, field: &str) -> LoanEngineResult<T> {
    value.ok_or_else(|| LoanEngineError::InvalidInput {
        field: field.into(),
        reason: "Required for this solve target".into(),
    })
}

/// Rate and term solves need a level forward instalment; the stepped and
/// grace schemes quote a first instalment that is not level.
fn require_direct_scheme(request: &SolveRequest) -> LoanEngineResult<()> {
    match request.scheme {
        RepaymentScheme::Annuity | RepaymentScheme::SimpleInterest => Ok(()),
        RepaymentScheme::Stepped => Err(LoanEngineError::UnsupportedCombination {
            product: "Stepped".into(),
            target: request.target.name().into(),
        }),
        RepaymentScheme::GracePeriod => Err(LoanEngineError::UnsupportedCombination {
            product: "GracePeriod".into(),
            target: request.target.name().into(),
        }),
    }
}

/// Forward instalment at a whole number of periods.
fn level_installment(
    principal: Money,
    annual_percent: Rate,
    periods: u32,
    scheme: RepaymentScheme,
    frequency: PaymentFrequency,
) -> LoanEngineResult<Money> {
    let rate = period_rate(annual_percent, frequency);
    match scheme {
        RepaymentScheme::Annuity => annuity_installment(principal, rate, periods),
        RepaymentScheme::SimpleInterest => {
            Ok(principal / Decimal::from(periods) + principal * rate)
        }
        _ => Err(LoanEngineError::UnsupportedCombination {
            product: "non-level scheme".into(),
            target: "forward instalment".into(),
        }),
    }
}

/// Forward instalment at a fractional number of periods, for the term solve.
fn continuous_installment(
    principal: Money,
    rate: Rate,
    periods: Decimal,
    scheme: RepaymentScheme,
) -> LoanEngineResult<Money> {
    if periods <= Decimal::ZERO {
        return Err(LoanEngineError::DivisionByZero {
            context: "instalment at non-positive period count".into(),
        });
    }
    match scheme {
        RepaymentScheme::Annuity => {
            if rate.is_zero() {
                return Ok(principal / periods);
            }
            // Discount form keeps the factor in (0, 1] at any rate
            let discount = (Decimal::ONE / (Decimal::ONE + rate)).powd(periods);
            let denom = Decimal::ONE - discount;
            if denom <= Decimal::ZERO {
                return Err(LoanEngineError::DivisionByZero {
                    context: "annuity factor at fractional term".into(),
                });
            }
            Ok(principal * rate / denom)
        }
        RepaymentScheme::SimpleInterest => Ok(principal / periods + principal * rate),
        _ => Err(LoanEngineError::UnsupportedCombination {
            product: "non-level scheme".into(),
            target: "forward instalment".into(),
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn annuity_solve(target: SolveTarget) -> SolveRequest {
        SolveRequest {
            target,
            principal: Some(dec!(200_000_000)),
            annual_rate_percent: Some(dec!(18)),
            term_months: Some(24),
            installment: None,
            scheme: RepaymentScheme::Annuity,
            frequency: PaymentFrequency::Monthly,
            product_kind: ProductKind::Standard,
            grace_period_months: 0,
            step_months: 0,
            step_rate_increase_percent: Decimal::ZERO,
        }
    }

    fn quoted_installment() -> Decimal {
        solve(&annuity_solve(SolveTarget::Installment)).unwrap().value
    }

    #[test]
    fn test_installment_closed_form_no_iterations() {
        let out = solve(&annuity_solve(SolveTarget::Installment)).unwrap();
        assert_eq!(out.iterations, 0);
        assert!(out.value > dec!(8_333_333)); // above the zero-rate instalment
    }

    #[test]
    fn test_principal_inverts_installment() {
        let installment = quoted_installment();
        let mut request = annuity_solve(SolveTarget::Principal);
        request.principal = None;
        request.installment = Some(installment);

        let out = solve(&request).unwrap();
        assert_eq!(out.iterations, 0);
        assert!((out.value - dec!(200_000_000)).abs() <= dec!(1));
    }

    #[test]
    fn test_principal_zero_rate() {
        let mut request = annuity_solve(SolveTarget::Principal);
        request.principal = None;
        request.annual_rate_percent = Some(Decimal::ZERO);
        request.installment = Some(dec!(10_000_000));
        request.term_months = Some(12);

        let out = solve(&request).unwrap();
        assert_eq!(out.value, dec!(120_000_000));
    }

    #[test]
    fn test_principal_simple_interest() {
        let mut request = annuity_solve(SolveTarget::Principal);
        request.scheme = RepaymentScheme::SimpleInterest;
        request.principal = None;
        request.annual_rate_percent = Some(dec!(12));
        request.term_months = Some(12);
        // 120M at 12% simple: 10M principal + 1.2M interest per month
        request.installment = Some(dec!(11_200_000));

        let out = solve(&request).unwrap();
        assert!((out.value - dec!(120_000_000)).abs() <= dec!(1));
    }

    #[test]
    fn test_principal_grace_scheme_scales_linearly() {
        let mut request = annuity_solve(SolveTarget::Principal);
        request.scheme = RepaymentScheme::GracePeriod;
        request.grace_period_months = 6;
        request.principal = None;
        // Grace quote is interest-only: 200M * 1.5% = 3M
        request.installment = Some(dec!(3_000_000));

        let out = solve(&request).unwrap();
        assert!((out.value - dec!(200_000_000)).abs() <= dec!(1));
    }

    #[test]
    fn test_rate_bisection_recovers_forward_rate() {
        let installment = quoted_installment();
        let mut request = annuity_solve(SolveTarget::Rate);
        request.annual_rate_percent = None;
        request.installment = Some(installment);

        let out = solve(&request).unwrap();
        assert!(out.iterations > 0);
        assert!(out.iterations <= MAX_SOLVER_ITERATIONS);
        assert!((out.value - dec!(18)).abs() < dec!(0.01));
    }

    #[test]
    fn test_rate_zero_when_target_is_even_split() {
        let mut request = annuity_solve(SolveTarget::Rate);
        request.annual_rate_percent = None;
        // 200M / 24 periods exactly
        request.installment = Some(dec!(200_000_000) / dec!(24));

        let out = solve(&request).unwrap();
        assert_eq!(out.value, Decimal::ZERO);
    }

    #[test]
    fn test_rate_below_zero_rate_installment_rejected() {
        let mut request = annuity_solve(SolveTarget::Rate);
        request.annual_rate_percent = None;
        request.installment = Some(dec!(1_000_000));
        assert!(matches!(
            solve(&request),
            Err(LoanEngineError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_term_bisection_recovers_forward_term() {
        let installment = quoted_installment();
        let mut request = annuity_solve(SolveTarget::Term);
        request.term_months = None;
        request.installment = Some(installment);

        let out = solve(&request).unwrap();
        assert!((out.value - dec!(24)).abs() < dec!(0.01));
    }

    #[test]
    fn test_term_never_amortising_rejected() {
        // 1.5% monthly interest on 200M is 3M; an instalment below that
        // never touches principal.
        let mut request = annuity_solve(SolveTarget::Term);
        request.term_months = None;
        request.installment = Some(dec!(2_900_000));
        assert!(matches!(
            solve(&request),
            Err(LoanEngineError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_stepped_rate_solve_unsupported() {
        let mut request = annuity_solve(SolveTarget::Rate);
        request.scheme = RepaymentScheme::Stepped;
        request.step_months = 6;
        request.annual_rate_percent = None;
        request.installment = Some(dec!(10_000_000));
        assert!(matches!(
            solve(&request),
            Err(LoanEngineError::UnsupportedCombination { .. })
        ));
    }

    #[test]
    fn test_low_interest_only_solves_installment() {
        let mut request = annuity_solve(SolveTarget::Rate);
        request.product_kind = ProductKind::LowInterest;
        request.annual_rate_percent = None;
        request.installment = Some(dec!(10_000_000));
        assert!(matches!(
            solve(&request),
            Err(LoanEngineError::UnsupportedCombination { .. })
        ));
    }

    #[test]
    fn test_missing_known_rejected() {
        let mut request = annuity_solve(SolveTarget::Rate);
        request.annual_rate_percent = None;
        // installment left as None
        assert!(matches!(
            solve(&request),
            Err(LoanEngineError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_gross_up_covers_fees() {
        // 2% + 1M flat on the gross; net target 100M
        let out = solve_gross_principal(dec!(100_000_000), dec!(1_000_000), dec!(2)).unwrap();
        let fees = dec!(1_000_000) + out.value * dec!(0.02);
        assert!((out.value - fees - dec!(100_000_000)).abs() <= dec!(1));
        assert!(out.value > dec!(100_000_000));
    }

    #[test]
    fn test_gross_up_rejects_confiscatory_fee() {
        assert!(solve_gross_principal(dec!(100), Decimal::ZERO, dec!(100)).is_err());
    }
}
