use super::error::{EngineError, EngineResult};
use super::income::FixedIncomeFactors;
use super::ledger::AccountLedger;
use super::tax::{
    TaxSchedule, apply_contribution_limits, compound_growth, contribution_limits_for_year,
};
use super::types::{
    AccountFlows, AccountKind, Inputs, Projection, YearPhase, YearResult, YearWarning,
};
use super::withdrawal::{WithdrawalEngine, WithdrawalSettings};

const NEGATIVE_BALANCE_TOLERANCE: f64 = 1e-6;

pub const MAX_HORIZON_AGE: u32 = 130;
pub const MIN_START_YEAR: i32 = 1900;
pub const MAX_START_YEAR: i32 = 2200;

pub fn run_projection(inputs: &Inputs) -> EngineResult<Projection> {
    validate_inputs(inputs)?;

    log::info!(
        "projecting ages {}..{} (retire at {}, order {})",
        inputs.current_age,
        inputs.horizon_age,
        inputs.retirement_age,
        inputs.withdrawal_order
    );

    let mut ledger = AccountLedger::from_inputs(inputs);
    let settings = WithdrawalSettings::from_inputs(inputs);
    let mut years = Vec::with_capacity((inputs.horizon_age - inputs.current_age) as usize);
    let mut salary = inputs.salary.max(0.0);

    for age in inputs.current_age..inputs.horizon_age {
        let year = inputs.start_year + (age - inputs.current_age) as i32;
        let result = if age < inputs.retirement_age {
            let result = run_working_year(inputs, &mut ledger, year, age, salary)?;
            salary *= 1.0 + inputs.salary_growth;
            result
        } else {
            run_retirement_year(inputs, &mut ledger, settings, year, age)?
        };
        years.push(result);
    }

    let depleted_age = years
        .iter()
        .find(|y| y.phase == YearPhase::Retired && y.unmet_spending > inputs.precision)
        .map(|y| y.age);
    let warning_count = years.iter().map(|y| y.warnings.len()).sum();

    log::info!(
        "projection finished: {} years, depleted at {:?}, {warning_count} warnings",
        years.len(),
        depleted_age
    );

    Ok(Projection {
        years,
        depleted_age,
        warning_count,
    })
}

fn validate_inputs(inputs: &Inputs) -> EngineResult<()> {
    if !(MIN_START_YEAR..=MAX_START_YEAR).contains(&inputs.start_year) {
        return Err(EngineError::InvalidInput(format!(
            "start year must be between {MIN_START_YEAR} and {MAX_START_YEAR}"
        )));
    }
    if inputs.horizon_age > MAX_HORIZON_AGE {
        return Err(EngineError::InvalidInput(format!(
            "horizon age must be <= {MAX_HORIZON_AGE}"
        )));
    }
    if inputs.horizon_age <= inputs.current_age {
        return Err(EngineError::InvalidInput(
            "horizon age must be greater than current age".to_string(),
        ));
    }
    if inputs.retirement_age < inputs.current_age {
        return Err(EngineError::InvalidInput(
            "retirement age cannot be before current age".to_string(),
        ));
    }
    if !inputs.precision.is_finite() || inputs.precision <= 0.0 {
        return Err(EngineError::InvalidInput(
            "search precision must be > 0".to_string(),
        ));
    }
    if inputs.max_search_iterations == 0 {
        return Err(EngineError::InvalidInput(
            "search iteration cap must be > 0".to_string(),
        ));
    }
    Ok(())
}

fn years_elapsed(inputs: &Inputs, year: i32) -> u32 {
    year.saturating_sub(inputs.start_year).max(0) as u32
}

fn run_working_year(
    inputs: &Inputs,
    ledger: &mut AccountLedger,
    year: i32,
    age: u32,
    salary: f64,
) -> EngineResult<YearResult> {
    let limits = contribution_limits_for_year(age, year, inputs.inflation_rate);
    let split = apply_contribution_limits(
        salary * inputs.pretax_contribution_rate,
        salary * inputs.roth_contribution_rate,
        limits,
    );

    let mut contributions = AccountFlows::default();
    contributions.add(AccountKind::TraditionalPretax, split.pretax);
    contributions.add(AccountKind::Roth, split.roth);
    contributions.add(
        AccountKind::Savings,
        inputs.savings_annual_contribution.max(0.0),
    );

    let mut growth = AccountFlows::default();
    for kind in AccountKind::ALL {
        ledger.deposit(contributions.get(kind), kind, year)?;
        growth.add(kind, ledger.accrue_interest(kind, year)?);
    }

    let (end_balances, warnings) = close_year(ledger, year)?;
    Ok(YearResult {
        year,
        age,
        phase: YearPhase::Working,
        salary,
        contributions,
        spending_target: 0.0,
        fixed_income_net: 0.0,
        withdrawal_need: 0.0,
        withdrawals: AccountFlows::default(),
        rmd: 0.0,
        surplus_deposited: 0.0,
        unmet_spending: 0.0,
        income: None,
        growth,
        end_balances,
        warnings,
    })
}

fn run_retirement_year(
    inputs: &Inputs,
    ledger: &mut AccountLedger,
    settings: WithdrawalSettings,
    year: i32,
    age: u32,
) -> EngineResult<YearResult> {
    let mut growth = AccountFlows::default();
    // Savings interest is credited up front so it can be reported as income.
    growth.add(
        AccountKind::Savings,
        ledger.accrue_interest(AccountKind::Savings, year)?,
    );
    let reported_interest = ledger.taxable_interest(AccountKind::Savings, year)?;

    let factors = fixed_income_factors(inputs, year, age, reported_interest);
    let spending_target = compound_growth(
        inputs.annual_spending.max(0.0),
        inputs.inflation_rate,
        years_elapsed(inputs, year),
    );

    let mut engine = WithdrawalEngine::new(ledger, settings)?;
    let mut session = engine.begin_year(year, age, factors, spending_target)?;
    let residual = engine.run_year(&mut session, &inputs.withdrawal_order)?;

    let surplus = session.surplus();
    if surplus > 0.0 {
        ledger.deposit(surplus, AccountKind::Savings, year)?;
    }
    for kind in [AccountKind::TraditionalPretax, AccountKind::Roth] {
        growth.add(kind, ledger.accrue_interest(kind, year)?);
    }

    let (end_balances, balance_warnings) = close_year(ledger, year)?;
    let mut warnings = session.take_warnings();
    warnings.extend(balance_warnings);

    let income = session.final_income_results();
    log::debug!(
        "year={} age={}: spend {:.2}, need {:.2}, unmet {:.2}, tax {:.2}",
        session.year(),
        session.age(),
        session.spending_target(),
        session.need(),
        residual.max(0.0),
        income.tax
    );

    Ok(YearResult {
        year: session.year(),
        age: session.age(),
        phase: YearPhase::Retired,
        salary: 0.0,
        contributions: AccountFlows::default(),
        spending_target: session.spending_target(),
        fixed_income_net: session.baseline().spendable_income,
        withdrawal_need: session.need(),
        withdrawals: *session.withdrawals(),
        rmd: session.factors().rmd,
        surplus_deposited: surplus,
        unmet_spending: residual.max(0.0),
        income: Some(income),
        growth,
        end_balances,
        warnings,
    })
}

/// Pensions, Social Security and other fixed sources for one year. The RMD
/// is left at zero; the withdrawal engine fills it in when the year opens.
pub fn fixed_income_factors(
    inputs: &Inputs,
    year: i32,
    age: u32,
    reported_interest: f64,
) -> FixedIncomeFactors {
    let elapsed = years_elapsed(inputs, year);
    let married = inputs.filing_status.is_married();
    let spouse_age = inputs.spouse_age(age);
    let ss_grown = |annual: f64| compound_growth(annual.max(0.0), inputs.inflation_rate, elapsed);

    FixedIncomeFactors {
        filing_status: inputs.filing_status,
        reported_interest,
        pension_self: if age >= inputs.pension_self_start_age {
            inputs.pension_self_annual.max(0.0)
        } else {
            0.0
        },
        pension_spouse: if married && spouse_age >= inputs.pension_spouse_start_age {
            inputs.pension_spouse_annual.max(0.0)
        } else {
            0.0
        },
        ss_self: if age >= inputs.ss_self_start_age {
            ss_grown(inputs.ss_self_annual)
        } else {
            0.0
        },
        ss_spouse: if married && spouse_age >= inputs.ss_spouse_start_age {
            ss_grown(inputs.ss_spouse_annual)
        } else {
            0.0
        },
        rmd: 0.0,
        other_taxable: inputs.other_taxable_income.max(0.0),
        schedule: TaxSchedule::for_year(inputs.filing_status, year, inputs.inflation_rate),
        precision: inputs.precision,
    }
}

fn close_year(
    ledger: &AccountLedger,
    year: i32,
) -> EngineResult<(AccountFlows, Vec<YearWarning>)> {
    let mut balances = AccountFlows::default();
    let mut warnings = Vec::new();
    for kind in AccountKind::ALL {
        let balance = ledger.balance_or_zero(kind, year)?;
        if balance < -NEGATIVE_BALANCE_TOLERANCE {
            let warning = YearWarning::NegativeBalance { kind, balance };
            log::warn!("year={year}: {warning}");
            warnings.push(warning);
        }
        balances.add(kind, balance);
    }
    Ok((balances, warnings))
}
