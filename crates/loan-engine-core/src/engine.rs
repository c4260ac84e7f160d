use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Instant;

use crate::error::LoanEngineError;
use crate::rates::total_periods;
use crate::schedule::{generate_schedule, LoanRequest, ProductKind, RepaymentScheme};
use crate::solver::{self, SolveOutput, SolveRequest, SolveTarget};
use crate::summary::{summarize_schedule, LoanSummary};
use crate::types::{with_metadata, ComputationOutput};
use crate::LoanEngineResult;

/// Regulatory cap on the nominal annual rate of low-interest products.
const LOW_INTEREST_RATE_CAP: Decimal = dec!(4);

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Validate a request, build its schedule, and fold it into a summary.
/// Validation is fail-fast: the first violated precondition is returned and
/// nothing is computed.
pub fn compute(request: &LoanRequest) -> LoanEngineResult<ComputationOutput<LoanSummary>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_request(request)?;

    let months_per_period = request.frequency.months_per_period();
    if request.term_months % months_per_period != 0 {
        warnings.push(format!(
            "Term of {} months is not a whole number of {:?} periods; the trailing {} month(s) are truncated",
            request.term_months,
            request.frequency,
            request.term_months % months_per_period,
        ));
    }

    let schedule = generate_schedule(request)?;
    let summary = summarize_schedule(&schedule, request)?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Amortisation Schedule + Summary",
        &serde_json::json!({
            "scheme": request.scheme,
            "frequency": request.frequency,
            "product_kind": request.product_kind,
            "annual_rate_percent": request.annual_rate_percent.to_string(),
            "term_months": request.term_months,
            "periods": summary.schedule.len(),
        }),
        warnings,
        elapsed,
        summary,
    ))
}

/// Solve for the one unknown of {principal, rate, term, installment}.
pub fn solve_for(request: &SolveRequest) -> LoanEngineResult<ComputationOutput<SolveOutput>> {
    let start = Instant::now();

    validate_solve_request(request)?;
    let output = solver::solve(request)?;

    let elapsed = start.elapsed().as_micros() as u64;
    let method = match request.target {
        SolveTarget::Installment | SolveTarget::Principal => "closed form",
        SolveTarget::Rate | SolveTarget::Term => "bisection",
    };
    Ok(with_metadata(
        "Loan Parameter Solver",
        &serde_json::json!({
            "target": request.target,
            "method": method,
            "scheme": request.scheme,
            "iteration_cap": 100,
        }),
        Vec::new(),
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_request(request: &LoanRequest) -> LoanEngineResult<()> {
    if request.principal <= Decimal::ZERO {
        return Err(invalid("principal", "Principal must be positive"));
    }
    if request.term_months == 0 {
        return Err(invalid("term_months", "Term must be at least one month"));
    }
    validate_rate(request.annual_rate_percent, request.product_kind)?;
    validate_modifiers(request)?;

    if total_periods(request.term_months, request.frequency) == 0 {
        return Err(invalid(
            "term_months",
            "Term is shorter than one payment period at this frequency",
        ));
    }
    Ok(())
}

fn validate_rate(annual_rate_percent: Decimal, product_kind: ProductKind) -> LoanEngineResult<()> {
    if annual_rate_percent < Decimal::ZERO {
        return Err(invalid("annual_rate_percent", "Rate cannot be negative"));
    }
    if product_kind == ProductKind::LowInterest && annual_rate_percent > LOW_INTEREST_RATE_CAP {
        return Err(invalid(
            "annual_rate_percent",
            "Low-interest products are capped at 4% annually",
        ));
    }
    Ok(())
}

fn validate_modifiers(request: &LoanRequest) -> LoanEngineResult<()> {
    match request.scheme {
        RepaymentScheme::GracePeriod => {
            if request.grace_period_months >= request.term_months {
                return Err(invalid(
                    "grace_period_months",
                    "Grace period must be shorter than the term",
                ));
            }
        }
        RepaymentScheme::Stepped => {
            if request.step_months == 0 {
                return Err(invalid("step_months", "Step length must be positive"));
            }
            if request.step_months >= request.term_months {
                return Err(invalid(
                    "step_months",
                    "Step length must be shorter than the term",
                ));
            }
            if request.step_rate_increase_percent < Decimal::ZERO {
                return Err(invalid(
                    "step_rate_increase_percent",
                    "Step increase cannot be negative",
                ));
            }
        }
        RepaymentScheme::Annuity | RepaymentScheme::SimpleInterest => {}
    }

    if request.late_penalty_rate_percent < Decimal::ZERO {
        return Err(invalid(
            "late_penalty_rate_percent",
            "Penalty rate cannot be negative",
        ));
    }
    if request.fee_flat < Decimal::ZERO {
        return Err(invalid("fee_flat", "Flat fee cannot be negative"));
    }
    if request.fee_percent < Decimal::ZERO {
        return Err(invalid("fee_percent", "Fee percentage cannot be negative"));
    }
    Ok(())
}

fn validate_solve_request(request: &SolveRequest) -> LoanEngineResult<()> {
    // The unknown must actually be unknown.
    let target_supplied = match request.target {
        SolveTarget::Principal => request.principal.is_some(),
        SolveTarget::Rate => request.annual_rate_percent.is_some(),
        SolveTarget::Term => request.term_months.is_some(),
        SolveTarget::Installment => request.installment.is_some(),
    };
    if target_supplied {
        return Err(invalid(
            request_target_field(request.target),
            "Must be omitted when it is the solve target",
        ));
    }

    if let Some(principal) = request.principal {
        if principal <= Decimal::ZERO {
            return Err(invalid("principal", "Principal must be positive"));
        }
    }
    if let Some(term_months) = request.term_months {
        if term_months == 0 {
            return Err(invalid("term_months", "Term must be at least one month"));
        }
    }
    if let Some(rate) = request.annual_rate_percent {
        validate_rate(rate, request.product_kind)?;
    }
    if let Some(installment) = request.installment {
        if installment <= Decimal::ZERO {
            return Err(invalid("installment", "Instalment must be positive"));
        }
    }

    // Scheme modifiers are only checkable once the term is known.
    if let Some(term_months) = request.term_months {
        match request.scheme {
            RepaymentScheme::GracePeriod if request.grace_period_months >= term_months => {
                return Err(invalid(
                    "grace_period_months",
                    "Grace period must be shorter than the term",
                ));
            }
            RepaymentScheme::Stepped
                if request.step_months == 0 || request.step_months >= term_months =>
            {
                return Err(invalid(
                    "step_months",
                    "Step length must be positive and shorter than the term",
                ));
            }
            _ => {}
        }
    }
    if request.step_rate_increase_percent < Decimal::ZERO {
        return Err(invalid(
            "step_rate_increase_percent",
            "Step increase cannot be negative",
        ));
    }
    Ok(())
}

fn request_target_field(target: SolveTarget) -> &'static str {
    match target {
        SolveTarget::Principal => "principal",
        SolveTarget::Rate => "annual_rate_percent",
        SolveTarget::Term => "term_months",
        SolveTarget::Installment => "installment",
    }
}

fn invalid(field: &str, reason: &str) -> LoanEngineError {
    LoanEngineError::InvalidInput {
        field: field.into(),
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
