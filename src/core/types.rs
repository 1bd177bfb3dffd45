use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::error::{EngineError, EngineResult};
use super::income::IncomeBreakdown;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub enum AccountKind {
    #[serde(rename = "savings")]
    Savings,
    #[serde(rename = "pretax401k")]
    TraditionalPretax,
    #[serde(rename = "rothIra")]
    Roth,
}

impl AccountKind {
    pub const ALL: [AccountKind; 3] = [
        AccountKind::Savings,
        AccountKind::TraditionalPretax,
        AccountKind::Roth,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AccountKind::Savings => "savings",
            AccountKind::TraditionalPretax => "pretax401k",
            AccountKind::Roth => "rothIra",
        }
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "savings" | "taxable" => Ok(AccountKind::Savings),
            "pretax401k" | "pretax" | "trad401k" | "traditional" => {
                Ok(AccountKind::TraditionalPretax)
            }
            "rothira" | "roth" => Ok(AccountKind::Roth),
            _ => Err(EngineError::UnrecognizedAccountKind(s.to_string())),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FilingStatus {
    Single,
    Married,
}

impl FilingStatus {
    pub fn is_married(self) -> bool {
        self == FilingStatus::Married
    }
}

/// Order in which account kinds are drawn down within a retirement year.
/// Always a permutation of [`AccountKind::ALL`].
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub struct WithdrawalOrder([AccountKind; 3]);

impl WithdrawalOrder {
    pub fn new(kinds: &[AccountKind]) -> EngineResult<Self> {
        let valid = kinds.len() == 3 && AccountKind::ALL.iter().all(|k| kinds.contains(k));
        if !valid {
            return Err(EngineError::InvalidOrder(kinds.to_vec()));
        }
        Ok(Self([kinds[0], kinds[1], kinds[2]]))
    }

    pub fn kinds(&self) -> &[AccountKind; 3] {
        &self.0
    }
}

impl Default for WithdrawalOrder {
    fn default() -> Self {
        Self(AccountKind::ALL)
    }
}

impl fmt::Display for WithdrawalOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c] = self.0;
        write!(f, "{a},{b},{c}")
    }
}

impl FromStr for WithdrawalOrder {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kinds = s
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(AccountKind::from_str)
            .collect::<EngineResult<Vec<_>>>()?;
        WithdrawalOrder::new(&kinds)
    }
}

#[derive(Debug, Clone)]
pub struct Inputs {
    pub current_age: u32,
    pub retirement_age: u32,
    pub horizon_age: u32,
    pub start_year: i32,
    pub filing_status: FilingStatus,
    pub spouse_age_offset: i32,
    pub salary: f64,
    pub salary_growth: f64,
    pub pretax_contribution_rate: f64,
    pub roth_contribution_rate: f64,
    pub savings_annual_contribution: f64,
    pub savings_start: f64,
    pub pretax_start: f64,
    pub roth_start: f64,
    pub savings_interest_rate: f64,
    pub pretax_return: f64,
    pub roth_return: f64,
    pub inflation_rate: f64,
    pub annual_spending: f64,
    pub pension_self_annual: f64,
    pub pension_self_start_age: u32,
    pub pension_spouse_annual: f64,
    pub pension_spouse_start_age: u32,
    pub ss_self_annual: f64,
    pub ss_self_start_age: u32,
    pub ss_spouse_annual: f64,
    pub ss_spouse_start_age: u32,
    pub other_taxable_income: f64,
    pub use_savings: bool,
    pub use_trad_401k: bool,
    pub use_roth: bool,
    pub withdrawal_order: WithdrawalOrder,
    pub precision: f64,
    pub max_search_iterations: u32,
}

impl Inputs {
    pub fn spouse_age(&self, age: u32) -> u32 {
        (age as i64 + self.spouse_age_offset as i64).max(0) as u32
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum YearPhase {
    Working,
    Retired,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountFlows {
    pub savings: f64,
    #[serde(rename = "pretax401k")]
    pub pretax: f64,
    #[serde(rename = "rothIra")]
    pub roth: f64,
}

impl AccountFlows {
    pub fn get(&self, kind: AccountKind) -> f64 {
        match kind {
            AccountKind::Savings => self.savings,
            AccountKind::TraditionalPretax => self.pretax,
            AccountKind::Roth => self.roth,
        }
    }

    pub fn add(&mut self, kind: AccountKind, amount: f64) {
        match kind {
            AccountKind::Savings => self.savings += amount,
            AccountKind::TraditionalPretax => self.pretax += amount,
            AccountKind::Roth => self.roth += amount,
        }
    }

    pub fn total(&self) -> f64 {
        self.savings + self.pretax + self.roth
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum YearWarning {
    /// The gross-up search stopped at its iteration cap; the best estimate was used.
    SearchIterationCap {
        kind: AccountKind,
        iterations: u32,
        residual: f64,
    },
    /// An account closed the year below zero.
    NegativeBalance { kind: AccountKind, balance: f64 },
}

impl fmt::Display for YearWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            YearWarning::SearchIterationCap {
                kind,
                iterations,
                residual,
            } => write!(
                f,
                "{kind} withdrawal search hit its cap after {iterations} iterations (residual {residual:.4})"
            ),
            YearWarning::NegativeBalance { kind, balance } => {
                write!(f, "{kind} balance closed negative at {balance:.2}")
            }
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearResult {
    pub year: i32,
    pub age: u32,
    pub phase: YearPhase,
    pub salary: f64,
    pub contributions: AccountFlows,
    pub spending_target: f64,
    pub fixed_income_net: f64,
    pub withdrawal_need: f64,
    pub withdrawals: AccountFlows,
    pub rmd: f64,
    pub surplus_deposited: f64,
    pub unmet_spending: f64,
    pub income: Option<IncomeBreakdown>,
    pub growth: AccountFlows,
    pub end_balances: AccountFlows,
    pub warnings: Vec<YearWarning>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Projection {
    pub years: Vec<YearResult>,
    pub depleted_age: Option<u32>,
    pub warning_count: usize,
}
