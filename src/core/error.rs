use thiserror::Error;

use super::types::AccountKind;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("no accounts supplied; the withdrawal engine needs at least one account")]
    MissingAccounts,

    #[error("unrecognized account kind '{0}'")]
    UnrecognizedAccountKind(String),

    #[error("no {0} account is registered in the ledger")]
    AccountNotRegistered(AccountKind),

    #[error("withdrawal order must name savings, pretax401k and rothIra exactly once, got {0:?}")]
    InvalidOrder(Vec<AccountKind>),

    #[error("year {year} is before the first ledger year {first_year} of the {kind} account")]
    YearOutOfRange {
        kind: AccountKind,
        year: i32,
        first_year: i32,
    },

    #[error("invalid projection input: {0}")]
    InvalidInput(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
