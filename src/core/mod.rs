mod engine;
mod error;
mod income;
mod ledger;
mod solver;
mod tax;
mod types;
mod withdrawal;

pub use engine::{
    MAX_HORIZON_AGE, MAX_START_YEAR, MIN_START_YEAR, fixed_income_factors, run_projection,
};
pub use error::{EngineError, EngineResult};
pub use income::{FixedIncomeFactors, IncomeBreakdown, evaluate};
pub use ledger::{
    Account, AccountLedger, BalanceHistory, PretaxAccount, RothAccount, SavingsAccount, YearEntry,
};
pub use solver::{BisectionConfig, BisectionResult, SearchStatus, bisect_increasing};
pub use tax::{
    BASE_TAX_YEAR, CATCH_UP_AGE, ContributionLimits, ContributionSplit, EffectiveRateTable,
    RMD_START_AGE, TaxSchedule, apply_contribution_limits, compound_growth, contribution_limits,
    contribution_limits_for_year, effective_tax_rate, federal_tax, inflation_factor,
    required_minimum_distribution, rmd_divisor, ss_taxable_amount, standard_deduction,
    tax_brackets, taxable_income,
};
pub use types::{
    AccountFlows, AccountKind, FilingStatus, Inputs, Projection, WithdrawalOrder, YearPhase,
    YearResult, YearWarning,
};
pub use withdrawal::{
    DEFAULT_MAX_SEARCH_ITERATIONS, VisitState, WithdrawalEngine, WithdrawalSession,
    WithdrawalSettings,
};
