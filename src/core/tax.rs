use super::types::FilingStatus;

/// Tax year the nominal tables below are denominated in.
pub const BASE_TAX_YEAR: i32 = 2024;
pub const RMD_START_AGE: u32 = 73;
pub const CATCH_UP_AGE: u32 = 50;

const MARRIED_STANDARD_DEDUCTION: f64 = 32_600.0;
const SINGLE_STANDARD_DEDUCTION: f64 = 16_300.0;
const SINGLE_INCOME_SCALE: f64 = 0.5;

const BASE_CONTRIBUTION_LIMIT: f64 = 23_000.0;
const CATCH_UP_CONTRIBUTION: f64 = 7_500.0;

const MARGINAL_STEP: f64 = 1_000.0;

// (taxable income, effective rate %) at married-filing-jointly income levels.
const EFFECTIVE_RATES: [(f64, f64); 20] = [
    (10_000.0, 10.0),
    (20_000.0, 10.0),
    (30_000.0, 10.5),
    (40_000.0, 10.8),
    (50_000.0, 11.1),
    (60_000.0, 11.2),
    (70_000.0, 11.3),
    (80_000.0, 11.4),
    (90_000.0, 11.5),
    (100_000.0, 12.1),
    (125_000.0, 14.1),
    (150_000.0, 15.4),
    (200_000.0, 17.1),
    (250_000.0, 18.4),
    (300_000.0, 19.4),
    (400_000.0, 20.8),
    (500_000.0, 23.2),
    (750_000.0, 27.2),
    (1_000_000.0, 29.6),
    (2_000_000.0, 29.6),
];

// Uniform Lifetime Table divisors for ages 73..=100.
const RMD_DIVISORS: [f64; 28] = [
    26.5, 25.5, 24.6, 23.7, 22.9, 22.0, 21.1, 20.2, 19.4, 18.5, 17.7, 16.8, 16.0, 15.2, 14.4, 13.7,
    12.9, 12.2, 11.5, 10.8, 10.1, 9.5, 8.9, 8.4, 7.8, 7.3, 6.8, 6.4,
];
const RMD_DIVISOR_DECAY: f64 = 0.1;
const RMD_DIVISOR_FLOOR: f64 = 1.0;

struct SsThresholds {
    first: f64,
    second: f64,
}

fn ss_thresholds(is_married: bool) -> SsThresholds {
    if is_married {
        SsThresholds {
            first: 32_000.0,
            second: 44_000.0,
        }
    } else {
        SsThresholds {
            first: 25_000.0,
            second: 34_000.0,
        }
    }
}

/// Piecewise-linear table of effective federal rates, in percent, keyed by
/// taxable income. Breakpoints are sorted by income and never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct EffectiveRateTable {
    breakpoints: Vec<(f64, f64)>,
}

impl EffectiveRateTable {
    pub fn base(filing: FilingStatus) -> Self {
        let scale = match filing {
            FilingStatus::Married => 1.0,
            FilingStatus::Single => SINGLE_INCOME_SCALE,
        };
        Self::scaled(scale)
    }

    fn scaled(income_scale: f64) -> Self {
        Self {
            breakpoints: EFFECTIVE_RATES
                .iter()
                .map(|&(income, rate)| (income * income_scale, rate))
                .collect(),
        }
    }

    pub fn breakpoints(&self) -> &[(f64, f64)] {
        &self.breakpoints
    }

    pub fn effective_rate(&self, taxable_income: f64) -> f64 {
        let (first_income, first_rate) = self.breakpoints[0];
        if taxable_income <= first_income {
            return first_rate;
        }
        let (last_income, last_rate) = self.breakpoints[self.breakpoints.len() - 1];
        if taxable_income >= last_income {
            return last_rate;
        }

        for pair in self.breakpoints.windows(2) {
            let (lower_income, lower_rate) = pair[0];
            let (upper_income, upper_rate) = pair[1];
            #[allow(clippy::float_cmp)]
            if taxable_income == lower_income {
                return lower_rate;
            }
            if taxable_income < upper_income {
                return lower_rate
                    + (upper_rate - lower_rate) * (taxable_income - lower_income)
                        / (upper_income - lower_income);
            }
        }
        last_rate
    }
}

/// Standard deduction plus rate table for one filing status and tax year.
#[derive(Debug, Clone, PartialEq)]
pub struct TaxSchedule {
    pub standard_deduction: f64,
    pub rates: EffectiveRateTable,
}

impl TaxSchedule {
    pub fn base(filing: FilingStatus) -> Self {
        Self {
            standard_deduction: base_standard_deduction(filing),
            rates: EffectiveRateTable::base(filing),
        }
    }

    pub fn for_year(filing: FilingStatus, year: i32, inflation: f64) -> Self {
        Self {
            standard_deduction: standard_deduction(filing, year, inflation),
            rates: tax_brackets(filing, year, inflation),
        }
    }

    pub fn taxable_income(&self, gross_income: f64) -> f64 {
        (gross_income - self.standard_deduction).max(0.0)
    }

    pub fn federal_tax(&self, gross_income: f64) -> f64 {
        let taxable = self.taxable_income(gross_income);
        taxable * self.rates.effective_rate(taxable) / 100.0
    }

    /// Marginal rate in percent, estimated over the next $1,000 of gross income.
    pub fn marginal_rate(&self, gross_income: f64) -> f64 {
        let gross = gross_income.max(0.0);
        let delta = self.federal_tax(gross + MARGINAL_STEP) - self.federal_tax(gross);
        delta / MARGINAL_STEP * 100.0
    }
}

fn base_standard_deduction(filing: FilingStatus) -> f64 {
    match filing {
        FilingStatus::Married => MARRIED_STANDARD_DEDUCTION,
        FilingStatus::Single => SINGLE_STANDARD_DEDUCTION,
    }
}

/// Growth factor applied to base-year nominal amounts. Years before the
/// base year use the base tables unchanged.
pub fn inflation_factor(year: i32, inflation: f64) -> f64 {
    let years = year.saturating_sub(BASE_TAX_YEAR).max(0);
    compound_growth(1.0, inflation, years as u32)
}

pub fn standard_deduction(filing: FilingStatus, year: i32, inflation: f64) -> f64 {
    base_standard_deduction(filing) * inflation_factor(year, inflation)
}

pub fn tax_brackets(filing: FilingStatus, year: i32, inflation: f64) -> EffectiveRateTable {
    let filing_scale = match filing {
        FilingStatus::Married => 1.0,
        FilingStatus::Single => SINGLE_INCOME_SCALE,
    };
    EffectiveRateTable::scaled(filing_scale * inflation_factor(year, inflation))
}

pub fn taxable_income(gross_income: f64, filing: FilingStatus) -> f64 {
    TaxSchedule::base(filing).taxable_income(gross_income)
}

pub fn effective_tax_rate(taxable_income: f64) -> f64 {
    EffectiveRateTable::base(FilingStatus::Married).effective_rate(taxable_income)
}

pub fn federal_tax(gross_income: f64, filing: FilingStatus) -> f64 {
    TaxSchedule::base(filing).federal_tax(gross_income)
}

/// Portion of gross Social Security benefits subject to income tax, using
/// provisional income (other income plus half the benefit).
pub fn ss_taxable_amount(ss_gross: f64, other_taxable_income: f64, is_married: bool) -> f64 {
    if ss_gross <= 0.0 {
        return 0.0;
    }

    let thresholds = ss_thresholds(is_married);
    let provisional = other_taxable_income + 0.5 * ss_gross;
    if provisional <= thresholds.first {
        return 0.0;
    }

    let tier1 = (0.5 * (provisional - thresholds.first)).min(0.5 * ss_gross);
    if provisional <= thresholds.second {
        return tier1;
    }

    (tier1 + 0.85 * (provisional - thresholds.second)).min(0.85 * ss_gross)
}

pub fn rmd_divisor(age: u32) -> Option<f64> {
    if age < RMD_START_AGE {
        return None;
    }
    let index = (age - RMD_START_AGE) as usize;
    if let Some(divisor) = RMD_DIVISORS.get(index) {
        return Some(*divisor);
    }
    let last = RMD_DIVISORS[RMD_DIVISORS.len() - 1];
    let years_past = (index + 1 - RMD_DIVISORS.len()) as f64;
    Some((last - RMD_DIVISOR_DECAY * years_past).max(RMD_DIVISOR_FLOOR))
}

pub fn required_minimum_distribution(age: u32, balance: f64) -> f64 {
    if balance <= 0.0 {
        return 0.0;
    }
    match rmd_divisor(age) {
        Some(divisor) => balance / divisor,
        None => 0.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContributionLimits {
    pub base: f64,
    pub catch_up: f64,
}

impl ContributionLimits {
    pub fn total(self) -> f64 {
        self.base + self.catch_up
    }
}

pub fn contribution_limits(age: u32) -> ContributionLimits {
    ContributionLimits {
        base: BASE_CONTRIBUTION_LIMIT,
        catch_up: if age >= CATCH_UP_AGE {
            CATCH_UP_CONTRIBUTION
        } else {
            0.0
        },
    }
}

pub fn contribution_limits_for_year(age: u32, year: i32, inflation: f64) -> ContributionLimits {
    let base = contribution_limits(age);
    let factor = inflation_factor(year, inflation);
    ContributionLimits {
        base: base.base * factor,
        catch_up: base.catch_up * factor,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContributionSplit {
    pub pretax: f64,
    pub roth: f64,
}

/// Scales desired pretax and Roth contributions down to the combined limit,
/// keeping their ratio.
pub fn apply_contribution_limits(
    desired_pretax: f64,
    desired_roth: f64,
    limits: ContributionLimits,
) -> ContributionSplit {
    let pretax = desired_pretax.max(0.0);
    let roth = desired_roth.max(0.0);
    let desired_total = pretax + roth;
    let limit = limits.total().max(0.0);
    if desired_total <= limit || desired_total <= 1e-12 {
        return ContributionSplit { pretax, roth };
    }

    let scale = limit / desired_total;
    ContributionSplit {
        pretax: pretax * scale,
        roth: roth * scale,
    }
}

pub fn compound_growth(principal: f64, rate: f64, years: u32) -> f64 {
    principal * (1.0 + rate).powi(years as i32)
}
