pub mod engine;
pub mod error;
pub mod rates;
pub mod schedule;
pub mod solver;
pub mod summary;
pub mod types;

pub use engine::{compute, solve_for};
pub use error::LoanEngineError;
pub use rates::PaymentFrequency;
pub use schedule::{LoanRequest, LoanSchedule, PaymentPeriod, ProductKind, RepaymentScheme};
pub use solver::{solve_gross_principal, SolveOutput, SolveRequest, SolveTarget};
pub use summary::LoanSummary;
pub use types::*;

/// Standard result type for all loan-engine operations
pub type LoanEngineResult<T> = Result<T, LoanEngineError>;
