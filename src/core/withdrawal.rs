use serde::Serialize;

use super::error::{EngineError, EngineResult};
use super::income::{FixedIncomeFactors, IncomeBreakdown, evaluate};
use super::ledger::AccountLedger;
use super::solver::{BisectionConfig, SearchStatus, bisect_increasing};
use super::types::{AccountFlows, AccountKind, Inputs, WithdrawalOrder, YearWarning};

pub const DEFAULT_MAX_SEARCH_ITERATIONS: u32 = 100;

#[derive(Debug, Clone, Copy)]
pub struct WithdrawalSettings {
    pub use_savings: bool,
    pub use_trad_401k: bool,
    pub use_roth: bool,
    pub max_search_iterations: u32,
}

impl WithdrawalSettings {
    pub fn from_inputs(inputs: &Inputs) -> Self {
        Self {
            use_savings: inputs.use_savings,
            use_trad_401k: inputs.use_trad_401k,
            use_roth: inputs.use_roth,
            max_search_iterations: inputs.max_search_iterations,
        }
    }

    pub fn enabled(&self, kind: AccountKind) -> bool {
        match kind {
            AccountKind::Savings => self.use_savings,
            AccountKind::TraditionalPretax => self.use_trad_401k,
            AccountKind::Roth => self.use_roth,
        }
    }
}

impl Default for WithdrawalSettings {
    fn default() -> Self {
        Self {
            use_savings: true,
            use_trad_401k: true,
            use_roth: true,
            max_search_iterations: DEFAULT_MAX_SEARCH_ITERATIONS,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum VisitState {
    Pending,
    Recognized,
    Skipped,
}

fn slot(kind: AccountKind) -> usize {
    match kind {
        AccountKind::Savings => 0,
        AccountKind::TraditionalPretax => 1,
        AccountKind::Roth => 2,
    }
}

/// One retirement year's withdrawal state. Created by
/// [`WithdrawalEngine::begin_year`] and threaded through every per-account
/// call for that year; once a kind has been visited it stays latched.
#[derive(Debug, Clone)]
pub struct WithdrawalSession {
    year: i32,
    age: u32,
    factors: FixedIncomeFactors,
    baseline: IncomeBreakdown,
    income: IncomeBreakdown,
    spending_target: f64,
    need: f64,
    shortfall: f64,
    visits: [VisitState; 3],
    withdrawals: AccountFlows,
    delivered: AccountFlows,
    warnings: Vec<YearWarning>,
}

impl WithdrawalSession {
    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn age(&self) -> u32 {
        self.age
    }

    pub fn factors(&self) -> &FixedIncomeFactors {
        &self.factors
    }

    /// Income with fixed sources and the RMD only.
    pub fn baseline(&self) -> &IncomeBreakdown {
        &self.baseline
    }

    pub fn spending_target(&self) -> f64 {
        self.spending_target
    }

    /// Spending left for the accounts after fixed income has been applied.
    pub fn need(&self) -> f64 {
        self.need
    }

    /// Fixed income left over after spending; zero when accounts are needed.
    pub fn surplus(&self) -> f64 {
        (self.baseline.spendable_income - self.spending_target).max(0.0)
    }

    pub fn shortfall(&self) -> f64 {
        self.shortfall
    }

    pub fn state(&self, kind: AccountKind) -> VisitState {
        self.visits[slot(kind)]
    }

    pub fn is_recognized(&self, kind: AccountKind) -> bool {
        self.state(kind) != VisitState::Pending
    }

    pub fn is_complete(&self) -> bool {
        self.visits.iter().all(|v| *v != VisitState::Pending)
    }

    /// Gross amounts taken out of each account, RMD included.
    pub fn withdrawals(&self) -> &AccountFlows {
        &self.withdrawals
    }

    /// Net amounts each account contributed toward the spending need.
    pub fn delivered(&self) -> &AccountFlows {
        &self.delivered
    }

    pub fn warnings(&self) -> &[YearWarning] {
        &self.warnings
    }

    pub fn take_warnings(&mut self) -> Vec<YearWarning> {
        std::mem::take(&mut self.warnings)
    }

    /// The year's settled income and tax, read once every kind has been visited.
    pub fn final_income_results(&self) -> IncomeBreakdown {
        self.income
    }

    fn latch(&mut self, kind: AccountKind, state: VisitState) {
        self.visits[slot(kind)] = state;
    }
}

pub struct WithdrawalEngine<'a> {
    ledger: &'a mut AccountLedger,
    settings: WithdrawalSettings,
}

impl<'a> WithdrawalEngine<'a> {
    pub fn new(ledger: &'a mut AccountLedger, settings: WithdrawalSettings) -> EngineResult<Self> {
        if ledger.is_empty() {
            log::error!("withdrawal engine constructed without accounts");
            return Err(EngineError::MissingAccounts);
        }
        Ok(Self { ledger, settings })
    }

    pub fn ledger(&self) -> &AccountLedger {
        &*self.ledger
    }

    pub fn settings(&self) -> &WithdrawalSettings {
        &self.settings
    }

    /// Opens a year: fixes the RMD into the factors, resolves the baseline
    /// income and derives the net spending need left for the accounts.
    pub fn begin_year(
        &self,
        year: i32,
        age: u32,
        mut factors: FixedIncomeFactors,
        spending_target: f64,
    ) -> EngineResult<WithdrawalSession> {
        factors.rmd = self.required_distribution(year, age)?;
        let baseline = evaluate(0.0, &factors);
        let need = (spending_target - baseline.spendable_income).max(0.0);

        Ok(WithdrawalSession {
            year,
            age,
            factors,
            baseline,
            income: baseline,
            spending_target,
            need,
            shortfall: need,
            visits: [VisitState::Pending; 3],
            withdrawals: AccountFlows::default(),
            delivered: AccountFlows::default(),
            warnings: Vec::new(),
        })
    }

    fn required_distribution(&self, year: i32, age: u32) -> EngineResult<f64> {
        let kind = AccountKind::TraditionalPretax;
        if !self.settings.enabled(kind) {
            return Ok(0.0);
        }
        match self.ledger.get(kind) {
            Ok(account) => account.required_distribution(age, year),
            Err(EngineError::AccountNotRegistered(_)) => Ok(0.0),
            Err(e) => Err(e),
        }
    }

    /// Visits every kind in `order`, each asked for whatever is still short.
    /// Returns the residual left unmet.
    pub fn run_year(
        &mut self,
        session: &mut WithdrawalSession,
        order: &WithdrawalOrder,
    ) -> EngineResult<f64> {
        for &kind in order.kinds() {
            let amount = session.shortfall.max(0.0);
            self.withdraw_from_targeted_account(session, amount, kind)?;
        }
        Ok(session.shortfall)
    }

    /// String-keyed entry point; unknown names are rejected before any state
    /// is touched.
    pub fn withdraw_from_named_account(
        &mut self,
        session: &mut WithdrawalSession,
        amount: f64,
        kind: &str,
    ) -> EngineResult<f64> {
        let kind = kind.parse::<AccountKind>()?;
        self.withdraw_from_targeted_account(session, amount, kind)
    }

    /// Draws up to `amount` of net spending from one account kind and
    /// returns the unmet residual. A kind is processed at most once per
    /// session; later calls return `amount` untouched.
    pub fn withdraw_from_targeted_account(
        &mut self,
        session: &mut WithdrawalSession,
        amount: f64,
        kind: AccountKind,
    ) -> EngineResult<f64> {
        self.ledger.get(kind)?;

        if session.is_recognized(kind) {
            log::debug!(
                "year={} {kind}: already {:?}, ignoring request for {amount:.2}",
                session.year,
                session.state(kind)
            );
            return Ok(amount);
        }

        if !self.settings.enabled(kind) {
            log::debug!("year={} {kind}: disabled, skipping", session.year);
            session.latch(kind, VisitState::Skipped);
            session.shortfall = amount;
            return Ok(amount);
        }

        let residual = match kind {
            AccountKind::TraditionalPretax => self.withdraw_pretax(session, amount)?,
            AccountKind::Savings | AccountKind::Roth => {
                self.withdraw_untaxed(session, amount, kind)?
            }
        };

        session.latch(kind, VisitState::Recognized);
        session.shortfall = residual;
        Ok(residual)
    }

    fn withdraw_untaxed(
        &mut self,
        session: &mut WithdrawalSession,
        amount: f64,
        kind: AccountKind,
    ) -> EngineResult<f64> {
        let year = session.year;
        let available = self.ledger.get(kind)?.available_funds(year)?;
        let withdrawal = available.min(amount.max(0.0));
        self.ledger.withdraw(withdrawal, kind, year)?;

        session.withdrawals.add(kind, withdrawal);
        session.delivered.add(kind, withdrawal);
        log::debug!("year={year} {kind}: requested {amount:.2}, withdrew {withdrawal:.2}");
        Ok(amount - withdrawal)
    }

    fn withdraw_pretax(&mut self, session: &mut WithdrawalSession, amount: f64) -> EngineResult<f64> {
        let kind = AccountKind::TraditionalPretax;
        let year = session.year;
        let available = self.ledger.get(kind)?.available_funds(year)?;
        let rmd = session.factors.rmd.min(available);
        let discretionary_cap = (available - rmd).max(0.0);
        let baseline_spendable = session.baseline.spendable_income;
        let target = amount.max(0.0);

        let gross = if target <= 0.0 || discretionary_cap <= 0.0 {
            0.0
        } else {
            let factors = &session.factors;
            let search = bisect_increasing(
                |candidate| {
                    evaluate(candidate, factors).spendable_income - baseline_spendable - target
                },
                BisectionConfig {
                    lower: 0.0,
                    upper: discretionary_cap,
                    precision: factors.precision,
                    max_iterations: self.settings.max_search_iterations,
                },
            );
            log::debug!(
                "year={year} {kind}: gross-up for {target:.2} -> {:.2} ({:?} after {} iterations)",
                search.value,
                search.status,
                search.iterations
            );
            if search.status == SearchStatus::IterationCapped {
                let warning = YearWarning::SearchIterationCap {
                    kind,
                    iterations: search.iterations,
                    residual: search.residual,
                };
                log::warn!("year={year}: {warning}");
                session.warnings.push(warning);
            }
            search.value.min(discretionary_cap)
        };

        // Tax is settled even when nothing discretionary is drawn.
        let income = evaluate(gross, &session.factors);
        let net = income.spendable_income - baseline_spendable;

        self.ledger.withdraw(rmd, kind, year)?;
        self.ledger.withdraw(gross, kind, year)?;

        session.income = income;
        session.withdrawals.add(kind, rmd + gross);
        session.delivered.add(kind, net);
        Ok(amount - net)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::income::factors_for_tests;
    use crate::core::ledger::{PretaxAccount, RothAccount, SavingsAccount};
    use crate::core::types::FilingStatus;
    use proptest::prelude::{prop_assert, proptest};

    const YEAR: i32 = 2030;
    const EPS: f64 = 1e-6;

    const ORDERS: [[AccountKind; 3]; 6] = [
        [AccountKind::Savings, AccountKind::TraditionalPretax, AccountKind::Roth],
        [AccountKind::Savings, AccountKind::Roth, AccountKind::TraditionalPretax],
        [AccountKind::TraditionalPretax, AccountKind::Savings, AccountKind::Roth],
        [AccountKind::TraditionalPretax, AccountKind::Roth, AccountKind::Savings],
        [AccountKind::Roth, AccountKind::Savings, AccountKind::TraditionalPretax],
        [AccountKind::Roth, AccountKind::TraditionalPretax, AccountKind::Savings],
    ];

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn assert_approx_tol(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn ledger(savings: f64, pretax: f64, roth: f64) -> AccountLedger {
        let mut ledger = AccountLedger::new();
        ledger.insert(Box::new(SavingsAccount::new(YEAR, savings, 0.0)));
        ledger.insert(Box::new(PretaxAccount::new(YEAR, pretax, 0.0)));
        ledger.insert(Box::new(RothAccount::new(YEAR, roth, 0.0)));
        ledger
    }

    fn balance(engine: &WithdrawalEngine<'_>, kind: AccountKind) -> f64 {
        engine.ledger().ending_balance(kind, YEAR).expect("balance")
    }

    #[test]
    fn refuses_to_run_without_accounts() {
        let mut empty = AccountLedger::new();
        let err = WithdrawalEngine::new(&mut empty, WithdrawalSettings::default())
            .err()
            .expect("must refuse");
        assert_eq!(err, EngineError::MissingAccounts);
    }

    #[test]
    fn savings_withdrawal_reduces_shortfall_dollar_for_dollar() {
        let mut ledger = ledger(10_000.0, 0.0, 0.0);
        let mut engine = WithdrawalEngine::new(&mut ledger, WithdrawalSettings::default())
            .expect("engine");
        let mut session = engine
            .begin_year(YEAR, 60, factors_for_tests(FilingStatus::Single), 25_000.0)
            .expect("session");

        let residual = engine
            .withdraw_from_targeted_account(&mut session, 25_000.0, AccountKind::Savings)
            .expect("withdraw");

        assert_approx(residual, 15_000.0);
        assert_approx(balance(&engine, AccountKind::Savings), 0.0);
        assert_eq!(session.state(AccountKind::Savings), VisitState::Recognized);
        assert_approx(session.final_income_results().tax, 0.0);
    }

    #[test]
    fn second_call_for_same_kind_is_a_no_op() {
        let mut ledger = ledger(10_000.0, 0.0, 8_000.0);
        let mut engine = WithdrawalEngine::new(&mut ledger, WithdrawalSettings::default())
            .expect("engine");
        let mut session = engine
            .begin_year(YEAR, 60, factors_for_tests(FilingStatus::Single), 3_000.0)
            .expect("session");

        engine
            .withdraw_from_targeted_account(&mut session, 3_000.0, AccountKind::Roth)
            .expect("first");
        let after_first = balance(&engine, AccountKind::Roth);
        let residual = engine
            .withdraw_from_targeted_account(&mut session, 5_000.0, AccountKind::Roth)
            .expect("second");

        assert_approx(residual, 5_000.0);
        assert_approx(after_first, 5_000.0);
        assert_approx(balance(&engine, AccountKind::Roth), after_first);
        assert_approx(session.withdrawals().roth, 3_000.0);
    }

    #[test]
    fn empty_account_is_still_latched_once_visited() {
        let mut ledger = ledger(0.0, 0.0, 0.0);
        let mut engine = WithdrawalEngine::new(&mut ledger, WithdrawalSettings::default())
            .expect("engine");
        let mut session = engine
            .begin_year(YEAR, 60, factors_for_tests(FilingStatus::Single), 1_000.0)
            .expect("session");

        let residual = engine
            .withdraw_from_targeted_account(&mut session, 1_000.0, AccountKind::Savings)
            .expect("withdraw");
        assert_approx(residual, 1_000.0);
        assert!(session.is_recognized(AccountKind::Savings));
        assert!(!session.is_complete());
    }

    #[test]
    fn pretax_search_nets_the_requested_amount_after_tax() {
        let mut ledger = ledger(0.0, 1_000_000.0, 0.0);
        let mut engine = WithdrawalEngine::new(&mut ledger, WithdrawalSettings::default())
            .expect("engine");
        let factors = factors_for_tests(FilingStatus::Single);
        let precision = factors.precision;
        let mut session = engine
            .begin_year(YEAR, 60, factors, 50_000.0)
            .expect("session");
        assert_approx(session.need(), 50_000.0);

        let residual = engine
            .withdraw_from_targeted_account(&mut session, 50_000.0, AccountKind::TraditionalPretax)
            .expect("withdraw");

        let income = session.final_income_results();
        let gross = income.pretax_withdrawal;
        assert!(gross > 50_000.0);
        assert_approx_tol(gross - income.tax, 50_000.0, precision);
        assert!(residual <= 0.0 && residual >= -precision);
        assert_approx(balance(&engine, AccountKind::TraditionalPretax), 1_000_000.0 - gross);
        assert!(session.warnings().is_empty());
    }

    #[test]
    fn rmd_is_taken_even_when_spending_is_already_covered() {
        let mut ledger = ledger(1_000_000.0, 500_000.0, 0.0);
        let mut engine = WithdrawalEngine::new(&mut ledger, WithdrawalSettings::default())
            .expect("engine");
        let mut session = engine
            .begin_year(YEAR, 75, factors_for_tests(FilingStatus::Single), 30_000.0)
            .expect("session");

        let rmd = 500_000.0 / 24.6;
        assert_approx(session.factors().rmd, rmd);
        let baseline = *session.baseline();
        assert_approx(session.need(), 30_000.0 - baseline.spendable_income);

        let residual = engine
            .run_year(&mut session, &WithdrawalOrder::default())
            .expect("year");

        assert_approx(residual, 0.0);
        assert_approx(balance(&engine, AccountKind::TraditionalPretax), 500_000.0 - rmd);
        assert_approx(
            balance(&engine, AccountKind::Savings),
            1_000_000.0 - session.need(),
        );
        let income = session.final_income_results();
        assert_approx(income.pretax_withdrawal, 0.0);
        assert_approx(income.tax, baseline.tax);
        assert!(income.tax > 0.0);
        assert!(session.is_complete());
    }

    #[test]
    fn tax_on_fixed_income_is_settled_without_a_discretionary_draw() {
        let mut ledger = ledger(0.0, 100_000.0, 0.0);
        let mut engine = WithdrawalEngine::new(&mut ledger, WithdrawalSettings::default())
            .expect("engine");
        let mut factors = factors_for_tests(FilingStatus::Married);
        factors.pension_self = 100_000.0;
        let mut session = engine.begin_year(YEAR, 65, factors, 50_000.0).expect("session");
        assert_approx(session.need(), 0.0);

        let residual = engine
            .withdraw_from_targeted_account(&mut session, 0.0, AccountKind::TraditionalPretax)
            .expect("withdraw");

        assert_approx(residual, 0.0);
        assert_approx_tol(session.final_income_results().tax, 7_598.676, 1e-3);
        assert_approx(balance(&engine, AccountKind::TraditionalPretax), 100_000.0);
        assert_approx(session.surplus(), 100_000.0 - 7_598.676 - 50_000.0);
    }

    #[test]
    fn pretax_draw_is_capped_by_balance_left_after_rmd() {
        let mut ledger = ledger(0.0, 10_000.0, 50_000.0);
        let mut engine = WithdrawalEngine::new(&mut ledger, WithdrawalSettings::default())
            .expect("engine");
        let order = WithdrawalOrder::new(&[
            AccountKind::TraditionalPretax,
            AccountKind::Roth,
            AccountKind::Savings,
        ])
        .expect("order");
        let mut session = engine
            .begin_year(YEAR, 80, factors_for_tests(FilingStatus::Single), 40_000.0)
            .expect("session");

        let residual = engine.run_year(&mut session, &order).expect("year");

        assert_approx(balance(&engine, AccountKind::TraditionalPretax), 0.0);
        assert_approx(session.withdrawals().pretax, 10_000.0);
        let from_roth = session.withdrawals().roth;
        assert!(from_roth > 0.0);
        assert_approx(session.delivered().total() + residual, session.need());
        assert_approx(residual, 0.0);
    }

    #[test]
    fn disabled_pretax_is_skipped_without_touching_other_accounts() {
        let settings = WithdrawalSettings {
            use_trad_401k: false,
            ..WithdrawalSettings::default()
        };
        let mut disabled_ledger = ledger(20_000.0, 500_000.0, 30_000.0);
        let mut disabled = WithdrawalEngine::new(&mut disabled_ledger, settings).expect("engine");
        let mut disabled_session = disabled
            .begin_year(YEAR, 78, factors_for_tests(FilingStatus::Single), 35_000.0)
            .expect("session");
        let disabled_residual = disabled
            .run_year(&mut disabled_session, &WithdrawalOrder::default())
            .expect("year");

        let mut empty_ledger = ledger(20_000.0, 0.0, 30_000.0);
        let mut reference =
            WithdrawalEngine::new(&mut empty_ledger, WithdrawalSettings::default()).expect("engine");
        let mut reference_session = reference
            .begin_year(YEAR, 78, factors_for_tests(FilingStatus::Single), 35_000.0)
            .expect("session");
        let reference_residual = reference
            .run_year(&mut reference_session, &WithdrawalOrder::default())
            .expect("year");

        assert_eq!(
            disabled_session.state(AccountKind::TraditionalPretax),
            VisitState::Skipped
        );
        assert_approx(disabled_session.factors().rmd, 0.0);
        assert_approx(disabled_session.withdrawals().pretax, 0.0);
        assert_approx(balance(&disabled, AccountKind::TraditionalPretax), 500_000.0);
        assert_approx(
            disabled_session.withdrawals().savings,
            reference_session.withdrawals().savings,
        );
        assert_approx(
            disabled_session.withdrawals().roth,
            reference_session.withdrawals().roth,
        );
        assert_approx(disabled_residual, reference_residual);
        assert_approx(disabled_session.withdrawals().savings, 20_000.0);
        assert_approx(disabled_session.withdrawals().roth, 15_000.0);
    }

    #[test]
    fn unknown_account_name_is_rejected_without_mutation() {
        let mut ledger = ledger(5_000.0, 0.0, 0.0);
        let mut engine = WithdrawalEngine::new(&mut ledger, WithdrawalSettings::default())
            .expect("engine");
        let mut session = engine
            .begin_year(YEAR, 60, factors_for_tests(FilingStatus::Single), 1_000.0)
            .expect("session");

        let err = engine
            .withdraw_from_named_account(&mut session, 1_000.0, "brokerage")
            .expect_err("must reject");
        assert_eq!(err, EngineError::UnrecognizedAccountKind("brokerage".to_string()));
        assert_approx(balance(&engine, AccountKind::Savings), 5_000.0);
        assert_approx(session.shortfall(), 1_000.0);
        assert!(AccountKind::ALL.iter().all(|k| !session.is_recognized(*k)));

        let residual = engine
            .withdraw_from_named_account(&mut session, 1_000.0, "savings")
            .expect("named savings");
        assert_approx(residual, 0.0);
    }

    #[test]
    fn unregistered_kind_is_a_configuration_error() {
        let mut ledger = AccountLedger::new();
        ledger.insert(Box::new(SavingsAccount::new(YEAR, 5_000.0, 0.0)));
        let mut engine = WithdrawalEngine::new(&mut ledger, WithdrawalSettings::default())
            .expect("engine");
        let mut session = engine
            .begin_year(YEAR, 80, factors_for_tests(FilingStatus::Single), 1_000.0)
            .expect("session");

        let err = engine
            .withdraw_from_targeted_account(&mut session, 1_000.0, AccountKind::Roth)
            .expect_err("must reject");
        assert_eq!(err, EngineError::AccountNotRegistered(AccountKind::Roth));
        assert!(!session.is_recognized(AccountKind::Roth));
        assert_approx(session.factors().rmd, 0.0);
    }

    #[test]
    fn rmd_lookup_before_first_ledger_year_is_an_error() {
        let mut ledger = ledger(10_000.0, 500_000.0, 0.0);
        let engine = WithdrawalEngine::new(&mut ledger, WithdrawalSettings::default())
            .expect("engine");

        let err = engine
            .begin_year(YEAR - 1, 75, factors_for_tests(FilingStatus::Single), 1_000.0)
            .expect_err("must not default the rmd");
        assert_eq!(
            err,
            EngineError::YearOutOfRange {
                kind: AccountKind::TraditionalPretax,
                year: YEAR - 1,
                first_year: YEAR,
            }
        );
    }

    #[test]
    fn missing_pretax_account_owes_no_rmd() {
        let mut ledger = AccountLedger::new();
        ledger.insert(Box::new(SavingsAccount::new(YEAR, 5_000.0, 0.0)));
        let engine = WithdrawalEngine::new(&mut ledger, WithdrawalSettings::default())
            .expect("engine");

        let session = engine
            .begin_year(YEAR, 80, factors_for_tests(FilingStatus::Single), 1_000.0)
            .expect("session");
        assert_approx(session.factors().rmd, 0.0);
        assert_eq!(session.year(), YEAR);
        assert_eq!(session.age(), 80);
        assert_approx(session.spending_target(), 1_000.0);
    }

    #[test]
    fn iteration_cap_reports_warning_and_uses_best_estimate() {
        let settings = WithdrawalSettings {
            max_search_iterations: 2,
            ..WithdrawalSettings::default()
        };
        let mut ledger = ledger(0.0, 1_000_000.0, 0.0);
        let mut engine = WithdrawalEngine::new(&mut ledger, settings).expect("engine");
        let mut session = engine
            .begin_year(YEAR, 60, factors_for_tests(FilingStatus::Single), 40_000.0)
            .expect("session");

        let residual = engine
            .withdraw_from_targeted_account(&mut session, 40_000.0, AccountKind::TraditionalPretax)
            .expect("withdraw");

        assert!(residual <= 0.0);
        assert_eq!(session.warnings().len(), 1);
        assert!(matches!(
            session.warnings()[0],
            YearWarning::SearchIterationCap {
                kind: AccountKind::TraditionalPretax,
                iterations: 2,
                ..
            }
        ));
        assert!(session.withdrawals().pretax > 40_000.0);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_withdrawals_plus_residual_equal_need(
            savings in 0u32..200_000,
            pretax in 0u32..400_000,
            roth in 0u32..200_000,
            spending in 0u32..150_000,
            pension in 0u32..40_000,
            ss in 0u32..40_000,
            age in 60u32..95,
            order_idx in 0usize..6,
            married in proptest::bool::ANY
        ) {
            let filing = if married { FilingStatus::Married } else { FilingStatus::Single };
            let mut factors = factors_for_tests(filing);
            factors.pension_self = pension as f64;
            factors.ss_self = ss as f64;
            let precision = factors.precision;

            let mut ledger = ledger(savings as f64, pretax as f64, roth as f64);
            let mut engine = WithdrawalEngine::new(&mut ledger, WithdrawalSettings::default())
                .expect("engine");
            let mut session = engine
                .begin_year(YEAR, age, factors, spending as f64)
                .expect("session");
            let order = WithdrawalOrder::new(&ORDERS[order_idx]).expect("order");

            let residual = engine.run_year(&mut session, &order).expect("year");

            prop_assert!(session.is_complete());
            prop_assert!((session.delivered().total() + residual - session.need()).abs() <= 2.0 * precision);
            for kind in AccountKind::ALL {
                prop_assert!(balance(&engine, kind) >= -1e-6);
            }
        }

        #[test]
        fn prop_repeat_calls_leave_balances_unchanged(
            savings in 0u32..50_000,
            pretax in 0u32..400_000,
            roth in 0u32..50_000,
            first in 0u32..60_000,
            second in 0u32..60_000,
            age in 60u32..95,
            kind_idx in 0usize..3
        ) {
            let kind = AccountKind::ALL[kind_idx];
            let mut ledger = ledger(savings as f64, pretax as f64, roth as f64);
            let mut engine = WithdrawalEngine::new(&mut ledger, WithdrawalSettings::default())
                .expect("engine");
            let mut session = engine
                .begin_year(YEAR, age, factors_for_tests(FilingStatus::Single), first as f64)
                .expect("session");

            engine.withdraw_from_targeted_account(&mut session, first as f64, kind).expect("first");
            let before = AccountKind::ALL.map(|k| balance(&engine, k));
            let residual = engine
                .withdraw_from_targeted_account(&mut session, second as f64, kind)
                .expect("second");
            let after = AccountKind::ALL.map(|k| balance(&engine, k));

            prop_assert!(residual == second as f64);
            prop_assert!(before == after);
        }
    }
}
