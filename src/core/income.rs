use serde::Serialize;

use super::tax::{TaxSchedule, ss_taxable_amount};
use super::types::FilingStatus;

/// Everything that feeds a year's income other than the discretionary
/// pretax withdrawal. Read-only once a year's session has opened.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedIncomeFactors {
    pub filing_status: FilingStatus,
    /// Taxable interest already credited to savings this year.
    pub reported_interest: f64,
    pub pension_self: f64,
    pub pension_spouse: f64,
    pub ss_self: f64,
    pub ss_spouse: f64,
    pub rmd: f64,
    pub other_taxable: f64,
    pub schedule: TaxSchedule,
    pub precision: f64,
}

impl FixedIncomeFactors {
    pub fn pensions(&self) -> f64 {
        self.pension_self + self.pension_spouse
    }

    pub fn ss_gross(&self) -> f64 {
        self.ss_self + self.ss_spouse
    }

    /// Taxable income from every source except Social Security and the
    /// discretionary withdrawal.
    pub fn fixed_other_income(&self) -> f64 {
        self.reported_interest + self.pensions() + self.rmd + self.other_taxable
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomeBreakdown {
    pub pretax_withdrawal: f64,
    pub gross_income: f64,
    pub ss_taxable: f64,
    pub taxable_income: f64,
    pub effective_rate: f64,
    pub tax: f64,
    pub net_income: f64,
    /// Net income less the interest that already sits in savings.
    pub spendable_income: f64,
}

/// Full tax picture for a year if `candidate_pretax_withdrawal` is taken on
/// top of the fixed sources. Has no side effects, so it is safe to call
/// repeatedly from a search.
pub fn evaluate(candidate_pretax_withdrawal: f64, factors: &FixedIncomeFactors) -> IncomeBreakdown {
    let withdrawal = candidate_pretax_withdrawal.max(0.0);
    let other_income = factors.fixed_other_income() + withdrawal;
    let ss_gross = factors.ss_gross().max(0.0);
    let ss_taxable = ss_taxable_amount(
        ss_gross,
        other_income,
        factors.filing_status.is_married(),
    );

    let gross_income = other_income + ss_taxable;
    let taxable_income = factors.schedule.taxable_income(gross_income);
    let effective_rate = factors.schedule.rates.effective_rate(taxable_income);
    let tax = taxable_income * effective_rate / 100.0;
    let net_income = other_income + ss_gross - tax;

    IncomeBreakdown {
        pretax_withdrawal: withdrawal,
        gross_income,
        ss_taxable,
        taxable_income,
        effective_rate,
        tax,
        net_income,
        spendable_income: net_income - factors.reported_interest,
    }
}

#[cfg(test)]
pub(crate) fn factors_for_tests(filing_status: FilingStatus) -> FixedIncomeFactors {
    FixedIncomeFactors {
        filing_status,
        reported_interest: 0.0,
        pension_self: 0.0,
        pension_spouse: 0.0,
        ss_self: 0.0,
        ss_spouse: 0.0,
        rmd: 0.0,
        other_taxable: 0.0,
        schedule: TaxSchedule::base(filing_status),
        precision: 0.01,
    }
}
