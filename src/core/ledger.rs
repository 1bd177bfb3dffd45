use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;

use super::error::{EngineError, EngineResult};
use super::tax::required_minimum_distribution;
use super::types::{AccountKind, Inputs};

/// One tax year of activity on one account.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearEntry {
    pub year: i32,
    pub starting_balance: f64,
    pub deposits: f64,
    pub withdrawals: f64,
    pub interest: f64,
}

impl YearEntry {
    fn opening(year: i32, starting_balance: f64) -> Self {
        Self {
            year,
            starting_balance,
            deposits: 0.0,
            withdrawals: 0.0,
            interest: 0.0,
        }
    }

    pub fn ending_balance(&self) -> f64 {
        self.starting_balance + self.deposits - self.withdrawals + self.interest
    }
}

/// Year-indexed balance records. Entries are contiguous from `first_year`;
/// touching a later year rolls every intermediate ending balance forward.
#[derive(Debug, Clone)]
pub struct BalanceHistory {
    kind: AccountKind,
    first_year: i32,
    opening_balance: f64,
    entries: Vec<YearEntry>,
}

impl BalanceHistory {
    pub fn new(kind: AccountKind, first_year: i32, opening_balance: f64) -> Self {
        Self {
            kind,
            first_year,
            opening_balance,
            entries: Vec::new(),
        }
    }

    pub fn entries(&self) -> &[YearEntry] {
        &self.entries
    }

    fn index(&self, year: i32) -> EngineResult<usize> {
        if year < self.first_year {
            return Err(EngineError::YearOutOfRange {
                kind: self.kind,
                year,
                first_year: self.first_year,
            });
        }
        Ok((year - self.first_year) as usize)
    }

    fn last_ending(&self) -> f64 {
        self.entries
            .last()
            .map(YearEntry::ending_balance)
            .unwrap_or(self.opening_balance)
    }

    /// Entry for `year`, or the untouched opening entry it would get.
    pub fn entry(&self, year: i32) -> EngineResult<YearEntry> {
        let index = self.index(year)?;
        Ok(self
            .entries
            .get(index)
            .copied()
            .unwrap_or_else(|| YearEntry::opening(year, self.last_ending())))
    }

    fn entry_mut(&mut self, year: i32) -> EngineResult<&mut YearEntry> {
        let index = self.index(year)?;
        while self.entries.len() <= index {
            let next_year = self.first_year + self.entries.len() as i32;
            let starting = self.last_ending();
            self.entries.push(YearEntry::opening(next_year, starting));
        }
        Ok(&mut self.entries[index])
    }
}

fn check_amount(kind: AccountKind, amount: f64) -> EngineResult<()> {
    if !amount.is_finite() || amount < 0.0 {
        return Err(EngineError::InvalidInput(format!(
            "{kind} movement must be a finite non-negative amount, got {amount}"
        )));
    }
    Ok(())
}

/// Capabilities shared by every account kind. Balances only change through
/// `deposit`, `withdraw` and `accrue_interest`.
pub trait Account: fmt::Debug {
    fn kind(&self) -> AccountKind;
    fn growth_rate(&self) -> f64;
    fn history(&self) -> &BalanceHistory;
    fn history_mut(&mut self) -> &mut BalanceHistory;

    fn starting_balance(&self, year: i32) -> EngineResult<f64> {
        Ok(self.history().entry(year)?.starting_balance)
    }

    fn ending_balance(&self, year: i32) -> EngineResult<f64> {
        Ok(self.history().entry(year)?.ending_balance())
    }

    fn available_funds(&self, year: i32) -> EngineResult<f64> {
        Ok(self.ending_balance(year)?.max(0.0))
    }

    fn deposit(&mut self, amount: f64, year: i32) -> EngineResult<()> {
        check_amount(self.kind(), amount)?;
        self.history_mut().entry_mut(year)?.deposits += amount;
        Ok(())
    }

    fn withdraw(&mut self, amount: f64, year: i32) -> EngineResult<()> {
        check_amount(self.kind(), amount)?;
        self.history_mut().entry_mut(year)?.withdrawals += amount;
        Ok(())
    }

    /// Credits growth on the running balance and returns the amount credited.
    fn accrue_interest(&mut self, year: i32) -> EngineResult<f64> {
        let rate = self.growth_rate();
        let entry = self.history_mut().entry_mut(year)?;
        let interest = entry.ending_balance().max(0.0) * rate;
        entry.interest += interest;
        Ok(interest)
    }

    /// Interest credited this year that counts as taxable income.
    fn taxable_interest(&self, _year: i32) -> EngineResult<f64> {
        Ok(0.0)
    }

    /// Mandatory distribution for the year, based on the opening balance.
    fn required_distribution(&self, _age: u32, _year: i32) -> EngineResult<f64> {
        Ok(0.0)
    }
}

#[derive(Debug, Clone)]
pub struct SavingsAccount {
    history: BalanceHistory,
    interest_rate: f64,
}

impl SavingsAccount {
    pub fn new(first_year: i32, opening_balance: f64, interest_rate: f64) -> Self {
        Self {
            history: BalanceHistory::new(AccountKind::Savings, first_year, opening_balance),
            interest_rate,
        }
    }
}

impl Account for SavingsAccount {
    fn kind(&self) -> AccountKind {
        AccountKind::Savings
    }

    fn growth_rate(&self) -> f64 {
        self.interest_rate
    }

    fn history(&self) -> &BalanceHistory {
        &self.history
    }

    fn history_mut(&mut self) -> &mut BalanceHistory {
        &mut self.history
    }

    fn taxable_interest(&self, year: i32) -> EngineResult<f64> {
        Ok(self.history.entry(year)?.interest.max(0.0))
    }
}

#[derive(Debug, Clone)]
pub struct PretaxAccount {
    history: BalanceHistory,
    annual_return: f64,
}

impl PretaxAccount {
    pub fn new(first_year: i32, opening_balance: f64, annual_return: f64) -> Self {
        Self {
            history: BalanceHistory::new(
                AccountKind::TraditionalPretax,
                first_year,
                opening_balance,
            ),
            annual_return,
        }
    }
}

impl Account for PretaxAccount {
    fn kind(&self) -> AccountKind {
        AccountKind::TraditionalPretax
    }

    fn growth_rate(&self) -> f64 {
        self.annual_return
    }

    fn history(&self) -> &BalanceHistory {
        &self.history
    }

    fn history_mut(&mut self) -> &mut BalanceHistory {
        &mut self.history
    }

    fn required_distribution(&self, age: u32, year: i32) -> EngineResult<f64> {
        let rmd = required_minimum_distribution(age, self.starting_balance(year)?);
        Ok(rmd.min(self.available_funds(year)?))
    }
}

#[derive(Debug, Clone)]
pub struct RothAccount {
    history: BalanceHistory,
    annual_return: f64,
}

impl RothAccount {
    pub fn new(first_year: i32, opening_balance: f64, annual_return: f64) -> Self {
        Self {
            history: BalanceHistory::new(AccountKind::Roth, first_year, opening_balance),
            annual_return,
        }
    }
}

impl Account for RothAccount {
    fn kind(&self) -> AccountKind {
        AccountKind::Roth
    }

    fn growth_rate(&self) -> f64 {
        self.annual_return
    }

    fn history(&self) -> &BalanceHistory {
        &self.history
    }

    fn history_mut(&mut self) -> &mut BalanceHistory {
        &mut self.history
    }
}

/// Accounts addressable by kind, at most one per kind.
#[derive(Debug, Default)]
pub struct AccountLedger {
    accounts: BTreeMap<AccountKind, Box<dyn Account>>,
}

impl AccountLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_inputs(inputs: &Inputs) -> Self {
        let year = inputs.start_year;
        let mut ledger = Self::new();
        ledger.insert(Box::new(SavingsAccount::new(
            year,
            inputs.savings_start,
            inputs.savings_interest_rate,
        )));
        ledger.insert(Box::new(PretaxAccount::new(
            year,
            inputs.pretax_start,
            inputs.pretax_return,
        )));
        ledger.insert(Box::new(RothAccount::new(
            year,
            inputs.roth_start,
            inputs.roth_return,
        )));
        ledger
    }

    /// Registers an account, replacing any previous account of the same kind.
    pub fn insert(&mut self, account: Box<dyn Account>) {
        self.accounts.insert(account.kind(), account);
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn kinds(&self) -> impl Iterator<Item = AccountKind> + '_ {
        self.accounts.keys().copied()
    }

    pub fn get(&self, kind: AccountKind) -> EngineResult<&dyn Account> {
        self.accounts
            .get(&kind)
            .map(|account| account.as_ref())
            .ok_or(EngineError::AccountNotRegistered(kind))
    }

    pub fn get_mut(&mut self, kind: AccountKind) -> EngineResult<&mut (dyn Account + 'static)> {
        self.accounts
            .get_mut(&kind)
            .map(|account| account.as_mut())
            .ok_or(EngineError::AccountNotRegistered(kind))
    }

    pub fn starting_balance(&self, kind: AccountKind, year: i32) -> EngineResult<f64> {
        self.get(kind)?.starting_balance(year)
    }

    pub fn ending_balance(&self, kind: AccountKind, year: i32) -> EngineResult<f64> {
        self.get(kind)?.ending_balance(year)
    }

    pub fn deposit(&mut self, amount: f64, kind: AccountKind, year: i32) -> EngineResult<()> {
        self.get_mut(kind)?.deposit(amount, year)
    }

    pub fn withdraw(&mut self, amount: f64, kind: AccountKind, year: i32) -> EngineResult<()> {
        self.get_mut(kind)?.withdraw(amount, year)
    }

    pub fn accrue_interest(&mut self, kind: AccountKind, year: i32) -> EngineResult<f64> {
        self.get_mut(kind)?.accrue_interest(year)
    }

    pub fn taxable_interest(&self, kind: AccountKind, year: i32) -> EngineResult<f64> {
        self.get(kind)?.taxable_interest(year)
    }

    /// Ending balance of a kind for the year, or zero when the kind is absent.
    pub fn balance_or_zero(&self, kind: AccountKind, year: i32) -> EngineResult<f64> {
        match self.accounts.get(&kind) {
            Some(account) => account.ending_balance(year),
            None => Ok(0.0),
        }
    }
}
