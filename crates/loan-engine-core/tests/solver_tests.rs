use chrono::NaiveDate;
use loan_engine_core::{
    compute, solve_for, solve_gross_principal, LoanEngineError, LoanRequest, PaymentFrequency,
    ProductKind, RepaymentScheme, SolveRequest, SolveTarget,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ===========================================================================
// Helpers
// ===========================================================================

fn forward_request() -> LoanRequest {
    LoanRequest {
        principal: dec!(200_000_000),
        annual_rate_percent: dec!(18),
        term_months: 24,
        scheme: RepaymentScheme::Annuity,
        frequency: PaymentFrequency::Monthly,
        product_kind: ProductKind::Standard,
        grace_period_months: 0,
        step_months: 0,
        step_rate_increase_percent: Decimal::ZERO,
        start_date: Some(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()),
        late_months: 0,
        late_penalty_rate_percent: Decimal::ZERO,
        fee_flat: Decimal::ZERO,
        fee_percent: Decimal::ZERO,
    }
}

fn solve_request(target: SolveTarget) -> SolveRequest {
    let forward = forward_request();
    let mut request = SolveRequest {
        target,
        principal: Some(forward.principal),
        annual_rate_percent: Some(forward.annual_rate_percent),
        term_months: Some(forward.term_months),
        installment: None,
        scheme: forward.scheme,
        frequency: forward.frequency,
        product_kind: forward.product_kind,
        grace_period_months: 0,
        step_months: 0,
        step_rate_increase_percent: Decimal::ZERO,
    };
    match target {
        SolveTarget::Principal => request.principal = None,
        SolveTarget::Rate => request.annual_rate_percent = None,
        SolveTarget::Term => request.term_months = None,
        SolveTarget::Installment => {}
    }
    request
}

// ===========================================================================
// Inverse consistency
// ===========================================================================

#[test]
fn test_installment_solve_matches_compute_exactly() {
    let quoted = compute(&forward_request()).unwrap().result.monthly_installment;
    let solved = solve_for(&solve_request(SolveTarget::Installment))
        .unwrap()
        .result;
    assert_eq!(solved.value, quoted);
    assert_eq!(solved.iterations, 0);
}

#[test]
fn test_principal_solve_round_trips_through_compute() {
    let quoted = compute(&forward_request()).unwrap().result.monthly_installment;

    let mut request = solve_request(SolveTarget::Principal);
    request.installment = Some(quoted);
    let principal = solve_for(&request).unwrap().result.value;

    let mut forward = forward_request();
    forward.principal = principal;
    let replayed = compute(&forward).unwrap().result.monthly_installment;
    assert!((replayed - quoted).abs() <= dec!(1));
}

#[test]
fn test_rate_solve_round_trips_through_compute() {
    let quoted = compute(&forward_request()).unwrap().result.monthly_installment;

    let mut request = solve_request(SolveTarget::Rate);
    request.installment = Some(quoted);
    let solved = solve_for(&request).unwrap().result;
    assert!((solved.value - dec!(18)).abs() < dec!(0.01));

    let mut forward = forward_request();
    forward.annual_rate_percent = solved.value;
    let replayed = compute(&forward).unwrap().result.monthly_installment;
    assert!((replayed - quoted).abs() <= dec!(1));
}

#[test]
fn test_term_solve_recovers_term_in_months() {
    let quoted = compute(&forward_request()).unwrap().result.monthly_installment;

    let mut request = solve_request(SolveTarget::Term);
    request.installment = Some(quoted);
    let solved = solve_for(&request).unwrap().result;
    assert!((solved.value - dec!(24)).abs() < dec!(0.01));
}

#[test]
fn test_simple_interest_inverse_pair() {
    let mut forward = forward_request();
    forward.scheme = RepaymentScheme::SimpleInterest;
    let quoted = compute(&forward).unwrap().result.monthly_installment;

    let mut request = solve_request(SolveTarget::Principal);
    request.scheme = RepaymentScheme::SimpleInterest;
    request.installment = Some(quoted);
    let principal = solve_for(&request).unwrap().result.value;
    assert!((principal - dec!(200_000_000)).abs() <= dec!(1));
}

// ===========================================================================
// Solver surface
// ===========================================================================

#[test]
fn test_quarterly_solves_use_quarterly_periods() {
    let mut forward = forward_request();
    forward.frequency = PaymentFrequency::Quarterly;
    let quoted = compute(&forward).unwrap().result.monthly_installment;

    let mut request = solve_request(SolveTarget::Principal);
    request.frequency = PaymentFrequency::Quarterly;
    request.installment = Some(quoted);
    let principal = solve_for(&request).unwrap().result.value;
    assert!((principal - dec!(200_000_000)).abs() <= dec!(1));
}

#[test]
fn test_low_interest_product_restricted_to_installment() {
    let mut request = solve_request(SolveTarget::Rate);
    request.product_kind = ProductKind::LowInterest;
    request.installment = Some(dec!(10_000_000));
    assert!(matches!(
        solve_for(&request),
        Err(LoanEngineError::UnsupportedCombination { .. })
    ));

    let mut request = solve_request(SolveTarget::Installment);
    request.product_kind = ProductKind::LowInterest;
    request.annual_rate_percent = Some(dec!(4));
    assert!(solve_for(&request).is_ok());
}

#[test]
fn test_solver_reports_iterations_and_residual() {
    let quoted = compute(&forward_request()).unwrap().result.monthly_installment;

    let mut request = solve_request(SolveTarget::Rate);
    request.installment = Some(quoted);
    let solved = solve_for(&request).unwrap().result;
    assert!(solved.iterations > 0);
    assert!(solved.residual.abs() <= dec!(1));
}

#[test]
fn test_gross_up_round_trip() {
    let net = dec!(250_000_000);
    let gross = solve_gross_principal(net, dec!(2_000_000), dec!(1.5))
        .unwrap()
        .value;
    let fees = dec!(2_000_000) + gross * dec!(1.5) / dec!(100);
    assert!((gross - fees - net).abs() <= dec!(1));
}
