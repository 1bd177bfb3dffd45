use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{ArgAction, Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::core::{
    AccountFlows, BASE_TAX_YEAR, DEFAULT_MAX_SEARCH_ITERATIONS, FilingStatus, Inputs,
    MAX_HORIZON_AGE, MAX_START_YEAR, MIN_START_YEAR, Projection, WithdrawalOrder, YearResult,
    run_projection,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliFilingStatus {
    Single,
    Married,
}

impl From<CliFilingStatus> for FilingStatus {
    fn from(value: CliFilingStatus) -> Self {
        match value {
            CliFilingStatus::Single => FilingStatus::Single,
            CliFilingStatus::Married => FilingStatus::Married,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiFilingStatus {
    Single,
    #[serde(alias = "mfj", alias = "married-filing-jointly", alias = "marriedFilingJointly")]
    Married,
}

impl From<ApiFilingStatus> for CliFilingStatus {
    fn from(value: ApiFilingStatus) -> Self {
        match value {
            ApiFilingStatus::Single => CliFilingStatus::Single,
            ApiFilingStatus::Married => CliFilingStatus::Married,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProjectPayload {
    current_age: Option<u32>,
    retirement_age: Option<u32>,
    horizon_age: Option<u32>,
    start_year: Option<i32>,
    filing_status: Option<ApiFilingStatus>,
    spouse_age_offset: Option<i32>,

    salary: Option<f64>,
    salary_growth: Option<f64>,
    pretax_contribution: Option<f64>,
    roth_contribution: Option<f64>,
    savings_contribution: Option<f64>,

    savings_start: Option<f64>,
    pretax_start: Option<f64>,
    roth_start: Option<f64>,

    savings_interest: Option<f64>,
    pretax_return: Option<f64>,
    roth_return: Option<f64>,
    inflation: Option<f64>,
    annual_spending: Option<f64>,

    pension_self: Option<f64>,
    pension_self_start_age: Option<u32>,
    pension_spouse: Option<f64>,
    pension_spouse_start_age: Option<u32>,
    ss_self: Option<f64>,
    ss_self_start_age: Option<u32>,
    ss_spouse: Option<f64>,
    ss_spouse_start_age: Option<u32>,
    other_taxable_income: Option<f64>,

    use_savings: Option<bool>,
    use_trad401k: Option<bool>,
    use_roth: Option<bool>,
    withdrawal_order: Option<String>,
    precision: Option<f64>,
    max_search_iterations: Option<u32>,
}

#[derive(Parser, Debug)]
#[command(
    name = "drawdown",
    about = "Retirement drawdown projection (savings + pretax 401(k) + Roth IRA, tax-aware withdrawals)"
)]
struct Cli {
    #[arg(long)]
    current_age: u32,
    #[arg(long)]
    retirement_age: u32,
    #[arg(long, default_value_t = 95, help = "Projection runs up to, not including, this age")]
    horizon_age: u32,
    #[arg(long, default_value_t = BASE_TAX_YEAR)]
    start_year: i32,
    #[arg(long, value_enum, default_value_t = CliFilingStatus::Married)]
    filing_status: CliFilingStatus,
    #[arg(
        long,
        default_value_t = 0,
        allow_hyphen_values = true,
        help = "Spouse age minus own age, in years"
    )]
    spouse_age_offset: i32,

    #[arg(long, default_value_t = 0.0)]
    salary: f64,
    #[arg(long, default_value_t = 0.0, help = "Annual salary growth in percent")]
    salary_growth_rate: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Pretax 401(k) contribution in percent of salary"
    )]
    pretax_contribution_rate: f64,
    #[arg(long, default_value_t = 0.0, help = "Roth contribution in percent of salary")]
    roth_contribution_rate: f64,
    #[arg(long, default_value_t = 0.0)]
    savings_annual_contribution: f64,

    #[arg(long, default_value_t = 0.0)]
    savings_start: f64,
    #[arg(long, default_value_t = 0.0)]
    pretax_start: f64,
    #[arg(long, default_value_t = 0.0)]
    roth_start: f64,

    #[arg(long, default_value_t = 0.0, help = "Savings interest rate in percent")]
    savings_interest_rate: f64,
    #[arg(long, default_value_t = 0.0, help = "Pretax account annual return in percent")]
    pretax_return: f64,
    #[arg(long, default_value_t = 0.0, help = "Roth account annual return in percent")]
    roth_return: f64,
    #[arg(long, default_value_t = 2.5, help = "Annual inflation in percent")]
    inflation_rate: f64,
    #[arg(long, help = "Retirement spending in start-year dollars")]
    annual_spending: f64,

    #[arg(long, default_value_t = 0.0)]
    pension_self_annual: f64,
    #[arg(long, default_value_t = 65)]
    pension_self_start_age: u32,
    #[arg(long, default_value_t = 0.0)]
    pension_spouse_annual: f64,
    #[arg(long, default_value_t = 65)]
    pension_spouse_start_age: u32,
    #[arg(long, default_value_t = 0.0, help = "Social Security in start-year dollars")]
    ss_self_annual: f64,
    #[arg(long, default_value_t = 67)]
    ss_self_start_age: u32,
    #[arg(long, default_value_t = 0.0)]
    ss_spouse_annual: f64,
    #[arg(long, default_value_t = 67)]
    ss_spouse_start_age: u32,
    #[arg(long, default_value_t = 0.0)]
    other_taxable_income: f64,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    use_savings: bool,
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    use_trad_401k: bool,
    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    use_roth: bool,
    #[arg(
        long,
        default_value = "savings,pretax,roth",
        help = "Comma-separated account kinds, each named once"
    )]
    withdrawal_order: String,
    #[arg(long, default_value_t = 0.01, help = "Gross-up search precision in dollars")]
    precision: f64,
    #[arg(long, default_value_t = DEFAULT_MAX_SEARCH_ITERATIONS)]
    max_search_iterations: u32,
}

#[derive(Debug)]
struct ApiRequest {
    inputs: Inputs,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectResponse {
    filing_status: FilingStatus,
    withdrawal_order: WithdrawalOrder,
    retirement_age: u32,
    horizon_age: u32,
    depleted_age: Option<u32>,
    warning_count: usize,
    total_tax: f64,
    total_unmet_spending: f64,
    final_balances: AccountFlows,
    years: Vec<YearResult>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_inputs(cli: Cli) -> Result<Inputs, String> {
    if !(MIN_START_YEAR..=MAX_START_YEAR).contains(&cli.start_year) {
        return Err(format!(
            "--start-year must be between {MIN_START_YEAR} and {MAX_START_YEAR}"
        ));
    }

    if cli.horizon_age > MAX_HORIZON_AGE {
        return Err(format!("--horizon-age must be <= {MAX_HORIZON_AGE}"));
    }

    if cli.horizon_age <= cli.current_age {
        return Err("--horizon-age must be > --current-age".to_string());
    }

    if cli.retirement_age < cli.current_age || cli.retirement_age > cli.horizon_age {
        return Err(
            "--retirement-age must be between --current-age and --horizon-age".to_string(),
        );
    }

    if !(-60..=60).contains(&cli.spouse_age_offset) {
        return Err("--spouse-age-offset must be between -60 and 60".to_string());
    }

    let amounts = [
        ("--salary", cli.salary),
        ("--savings-annual-contribution", cli.savings_annual_contribution),
        ("--savings-start", cli.savings_start),
        ("--pretax-start", cli.pretax_start),
        ("--roth-start", cli.roth_start),
        ("--annual-spending", cli.annual_spending),
        ("--pension-self-annual", cli.pension_self_annual),
        ("--pension-spouse-annual", cli.pension_spouse_annual),
        ("--ss-self-annual", cli.ss_self_annual),
        ("--ss-spouse-annual", cli.ss_spouse_annual),
        ("--other-taxable-income", cli.other_taxable_income),
    ];
    for (flag, value) in amounts {
        if !value.is_finite() || value < 0.0 {
            return Err(format!("{flag} must be >= 0"));
        }
    }

    let growth_rates = [
        ("--salary-growth-rate", cli.salary_growth_rate),
        ("--savings-interest-rate", cli.savings_interest_rate),
        ("--pretax-return", cli.pretax_return),
        ("--roth-return", cli.roth_return),
        ("--inflation-rate", cli.inflation_rate),
    ];
    for (flag, value) in growth_rates {
        if !value.is_finite() || value <= -100.0 {
            return Err(format!("{flag} must be > -100"));
        }
    }

    if !(0.0..=100.0).contains(&cli.pretax_contribution_rate) {
        return Err("--pretax-contribution-rate must be between 0 and 100".to_string());
    }

    if !(0.0..=100.0).contains(&cli.roth_contribution_rate) {
        return Err("--roth-contribution-rate must be between 0 and 100".to_string());
    }

    if cli.pretax_contribution_rate + cli.roth_contribution_rate > 100.0 {
        return Err(
            "--pretax-contribution-rate plus --roth-contribution-rate must be <= 100".to_string(),
        );
    }

    if !cli.precision.is_finite() || cli.precision <= 0.0 {
        return Err("--precision must be > 0".to_string());
    }

    if cli.max_search_iterations == 0 {
        return Err("--max-search-iterations must be > 0".to_string());
    }

    let withdrawal_order = cli
        .withdrawal_order
        .parse::<WithdrawalOrder>()
        .map_err(|e| format!("--withdrawal-order: {e}"))?;

    Ok(Inputs {
        current_age: cli.current_age,
        retirement_age: cli.retirement_age,
        horizon_age: cli.horizon_age,
        start_year: cli.start_year,
        filing_status: cli.filing_status.into(),
        spouse_age_offset: cli.spouse_age_offset,
        salary: cli.salary,
        salary_growth: cli.salary_growth_rate / 100.0,
        pretax_contribution_rate: cli.pretax_contribution_rate / 100.0,
        roth_contribution_rate: cli.roth_contribution_rate / 100.0,
        savings_annual_contribution: cli.savings_annual_contribution,
        savings_start: cli.savings_start,
        pretax_start: cli.pretax_start,
        roth_start: cli.roth_start,
        savings_interest_rate: cli.savings_interest_rate / 100.0,
        pretax_return: cli.pretax_return / 100.0,
        roth_return: cli.roth_return / 100.0,
        inflation_rate: cli.inflation_rate / 100.0,
        annual_spending: cli.annual_spending,
        pension_self_annual: cli.pension_self_annual,
        pension_self_start_age: cli.pension_self_start_age,
        pension_spouse_annual: cli.pension_spouse_annual,
        pension_spouse_start_age: cli.pension_spouse_start_age,
        ss_self_annual: cli.ss_self_annual,
        ss_self_start_age: cli.ss_self_start_age,
        ss_spouse_annual: cli.ss_spouse_annual,
        ss_spouse_start_age: cli.ss_spouse_start_age,
        other_taxable_income: cli.other_taxable_income,
        use_savings: cli.use_savings,
        use_trad_401k: cli.use_trad_401k,
        use_roth: cli.use_roth,
        withdrawal_order,
        precision: cli.precision,
        max_search_iterations: cli.max_search_iterations,
    })
}

/// Parses `project` flags (the first item is the program name), runs the
/// projection and renders it as pretty JSON.
pub fn run_cli<I, T>(args: I) -> Result<String, String>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::try_parse_from(args).map_err(|e| e.to_string())?;
    let inputs = build_inputs(cli)?;
    let projection = run_projection(&inputs).map_err(|e| e.to_string())?;
    let response = build_project_response(&inputs, projection);
    serde_json::to_string_pretty(&response).map_err(|e| format!("Failed to render JSON: {e}"))
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(
            "/api/project",
            get(project_get_handler).post(project_post_handler),
        )
        .route("/health", get(health_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    log::info!("drawdown HTTP API listening on http://{addr}");
    log::info!("Local access: http://127.0.0.1:{port}/api/project");

    axum::serve(listener, app).await
}

async fn health_handler() -> Response {
    json_response(StatusCode::OK, HealthResponse { status: "ok" })
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn project_get_handler(Query(payload): Query<ProjectPayload>) -> Response {
    project_handler_impl(payload).await
}

async fn project_post_handler(Json(payload): Json<ProjectPayload>) -> Response {
    project_handler_impl(payload).await
}

async fn project_handler_impl(payload: ProjectPayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => {
            log::debug!("rejected projection request: {msg}");
            return error_response(StatusCode::BAD_REQUEST, &msg);
        }
    };

    match run_projection(&request.inputs) {
        Ok(projection) => json_response(
            StatusCode::OK,
            build_project_response(&request.inputs, projection),
        ),
        Err(e) => {
            log::warn!("projection failed: {e}");
            error_response(StatusCode::UNPROCESSABLE_ENTITY, &e.to_string())
        }
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<ProjectPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: ProjectPayload) -> Result<ApiRequest, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.current_age {
        cli.current_age = v;
    }
    if let Some(v) = payload.retirement_age {
        cli.retirement_age = v;
    }
    if let Some(v) = payload.horizon_age {
        cli.horizon_age = v;
    }
    if let Some(v) = payload.start_year {
        cli.start_year = v;
    }
    if let Some(v) = payload.filing_status {
        cli.filing_status = v.into();
    }
    if let Some(v) = payload.spouse_age_offset {
        cli.spouse_age_offset = v;
    }

    if let Some(v) = payload.salary {
        cli.salary = v;
    }
    if let Some(v) = payload.salary_growth {
        cli.salary_growth_rate = v;
    }
    if let Some(v) = payload.pretax_contribution {
        cli.pretax_contribution_rate = v;
    }
    if let Some(v) = payload.roth_contribution {
        cli.roth_contribution_rate = v;
    }
    if let Some(v) = payload.savings_contribution {
        cli.savings_annual_contribution = v;
    }

    if let Some(v) = payload.savings_start {
        cli.savings_start = v;
    }
    if let Some(v) = payload.pretax_start {
        cli.pretax_start = v;
    }
    if let Some(v) = payload.roth_start {
        cli.roth_start = v;
    }

    if let Some(v) = payload.savings_interest {
        cli.savings_interest_rate = v;
    }
    if let Some(v) = payload.pretax_return {
        cli.pretax_return = v;
    }
    if let Some(v) = payload.roth_return {
        cli.roth_return = v;
    }
    if let Some(v) = payload.inflation {
        cli.inflation_rate = v;
    }
    if let Some(v) = payload.annual_spending {
        cli.annual_spending = v;
    }

    if let Some(v) = payload.pension_self {
        cli.pension_self_annual = v;
    }
    if let Some(v) = payload.pension_self_start_age {
        cli.pension_self_start_age = v;
    }
    if let Some(v) = payload.pension_spouse {
        cli.pension_spouse_annual = v;
    }
    if let Some(v) = payload.pension_spouse_start_age {
        cli.pension_spouse_start_age = v;
    }
    if let Some(v) = payload.ss_self {
        cli.ss_self_annual = v;
    }
    if let Some(v) = payload.ss_self_start_age {
        cli.ss_self_start_age = v;
    }
    if let Some(v) = payload.ss_spouse {
        cli.ss_spouse_annual = v;
    }
    if let Some(v) = payload.ss_spouse_start_age {
        cli.ss_spouse_start_age = v;
    }
    if let Some(v) = payload.other_taxable_income {
        cli.other_taxable_income = v;
    }

    if let Some(v) = payload.use_savings {
        cli.use_savings = v;
    }
    if let Some(v) = payload.use_trad401k {
        cli.use_trad_401k = v;
    }
    if let Some(v) = payload.use_roth {
        cli.use_roth = v;
    }
    if let Some(v) = payload.withdrawal_order {
        cli.withdrawal_order = v;
    }
    if let Some(v) = payload.precision {
        cli.precision = v;
    }
    if let Some(v) = payload.max_search_iterations {
        cli.max_search_iterations = v;
    }

    let inputs = build_inputs(cli)?;
    Ok(ApiRequest { inputs })
}

fn default_cli_for_api() -> Cli {
    Cli {
        current_age: 60,
        retirement_age: 65,
        horizon_age: 95,
        start_year: BASE_TAX_YEAR,
        filing_status: CliFilingStatus::Married,
        spouse_age_offset: 0,
        salary: 100_000.0,
        salary_growth_rate: 3.0,
        pretax_contribution_rate: 10.0,
        roth_contribution_rate: 5.0,
        savings_annual_contribution: 5_000.0,
        savings_start: 100_000.0,
        pretax_start: 600_000.0,
        roth_start: 150_000.0,
        savings_interest_rate: 3.0,
        pretax_return: 6.0,
        roth_return: 6.0,
        inflation_rate: 2.5,
        annual_spending: 80_000.0,
        pension_self_annual: 0.0,
        pension_self_start_age: 65,
        pension_spouse_annual: 0.0,
        pension_spouse_start_age: 65,
        ss_self_annual: 30_000.0,
        ss_self_start_age: 67,
        ss_spouse_annual: 15_000.0,
        ss_spouse_start_age: 67,
        other_taxable_income: 0.0,
        use_savings: true,
        use_trad_401k: true,
        use_roth: true,
        withdrawal_order: "savings,pretax,roth".to_string(),
        precision: 0.01,
        max_search_iterations: DEFAULT_MAX_SEARCH_ITERATIONS,
    }
}

fn build_project_response(inputs: &Inputs, projection: Projection) -> ProjectResponse {
    let total_tax = projection
        .years
        .iter()
        .filter_map(|y| y.income.map(|income| income.tax))
        .sum();
    let total_unmet_spending = projection.years.iter().map(|y| y.unmet_spending).sum();
    let final_balances = projection
        .years
        .last()
        .map(|y| y.end_balances)
        .unwrap_or_default();

    ProjectResponse {
        filing_status: inputs.filing_status,
        withdrawal_order: inputs.withdrawal_order,
        retirement_age: inputs.retirement_age,
        horizon_age: inputs.horizon_age,
        depleted_age: projection.depleted_age,
        warning_count: projection.warning_count,
        total_tax,
        total_unmet_spending,
        final_balances,
        years: projection.years,
    }
}
