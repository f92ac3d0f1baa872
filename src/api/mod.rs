use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::core::{
    self, AssumptionSet, BetaShape, MethodComparison, PerturbationSpec, PortfolioModel, Project,
    RiskFloorPolicy, SensitivityReport, SimulationOutcome, Triangular, default_parameters,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliRiskFloor {
    FloorAtZero,
    Signed,
}

impl From<CliRiskFloor> for RiskFloorPolicy {
    fn from(value: CliRiskFloor) -> Self {
        match value {
            CliRiskFloor::FloorAtZero => RiskFloorPolicy::FloorAtZero,
            CliRiskFloor::Signed => RiskFloorPolicy::Signed,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiRiskFloor {
    #[serde(alias = "floorAtZero", alias = "floor_at_zero")]
    FloorAtZero,
    Signed,
}

impl From<ApiRiskFloor> for CliRiskFloor {
    fn from(value: ApiRiskFloor) -> Self {
        match value {
            ApiRiskFloor::FloorAtZero => CliRiskFloor::FloorAtZero,
            ApiRiskFloor::Signed => CliRiskFloor::Signed,
        }
    }
}

/// Parses a `--project` spec of the form
/// `id:days:frames:modules:parts_per_day:module_value`.
fn parse_project_spec(raw: &str) -> Result<Project, String> {
    let parts: Vec<&str> = raw.split(':').collect();
    if parts.len() != 6 {
        return Err(format!(
            "expected id:days:frames:modules:parts_per_day:module_value, got {raw:?}"
        ));
    }

    let id = parts[0].trim();
    if id.is_empty() {
        return Err("project id must not be empty".to_string());
    }

    let duration_days = parts[1]
        .parse::<u32>()
        .map_err(|_| format!("invalid duration days {:?}", parts[1]))?;
    let frame_count = parts[2]
        .parse::<u32>()
        .map_err(|_| format!("invalid frame count {:?}", parts[2]))?;
    let module_count = parts[3]
        .parse::<u32>()
        .map_err(|_| format!("invalid module count {:?}", parts[3]))?;
    let parts_per_day = parts[4]
        .parse::<f64>()
        .map_err(|_| format!("invalid parts per day {:?}", parts[4]))?;
    let module_value = parts[5]
        .parse::<f64>()
        .map_err(|_| format!("invalid module value {:?}", parts[5]))?;

    Ok(Project {
        id: id.to_string(),
        duration_days,
        frame_count,
        module_count,
        parts_per_day,
        module_value,
    })
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "scanroi",
    about = "Inspection-method ROI model (flexible handheld vs fixed gantry): deterministic base case, Monte Carlo, tornado sensitivity"
)]
pub struct Cli {
    #[arg(long, default_value_t = 62.0, help = "Loaded labor rate in $/hr")]
    labor_rate: f64,
    #[arg(long, default_value_t = 260)]
    workdays_per_year: u32,
    #[arg(
        long,
        default_value_t = 8.0,
        help = "Manual inspection hours per day replaced by the flexible method"
    )]
    manual_hours_per_day: f64,
    #[arg(long, default_value_t = 5.0, help = "Scan time minimum in minutes")]
    scan_time_min: f64,
    #[arg(long, default_value_t = 7.5, help = "Scan time mode in minutes")]
    scan_time_mode: f64,
    #[arg(long, default_value_t = 10.0, help = "Scan time maximum in minutes")]
    scan_time_max: f64,
    #[arg(long, default_value_t = 2.0, help = "Miss probability Beta alpha")]
    miss_alpha: f64,
    #[arg(long, default_value_t = 198.0, help = "Miss probability Beta beta")]
    miss_beta: f64,
    #[arg(long, default_value_t = 6.0)]
    rework_hours_per_miss: f64,
    #[arg(long, default_value_t = 10.0)]
    manual_frame_hours: f64,
    #[arg(long, default_value_t = 12.0)]
    manual_final_hours: f64,
    #[arg(long, default_value_t = 10.0)]
    manual_rework_hours: f64,
    #[arg(long, default_value_t = 0.25)]
    automated_frame_hours: f64,
    #[arg(long, default_value_t = 0.25)]
    automated_final_hours: f64,
    #[arg(long, default_value_t = 1.0)]
    automated_rework_hours: f64,
    #[arg(
        long,
        default_value_t = 0.02,
        help = "Late-defect probability under manual inspection"
    )]
    late_defect_prob_manual: f64,
    #[arg(
        long,
        default_value_t = 0.01,
        help = "Late-defect probability under automated inspection"
    )]
    late_defect_prob_automated: f64,
    #[arg(
        long,
        default_value_t = 0.01,
        help = "Defect severity minimum as a fraction of module value"
    )]
    severity_min: f64,
    #[arg(long, default_value_t = 0.02)]
    severity_mode: f64,
    #[arg(long, default_value_t = 0.05)]
    severity_max: f64,
    #[arg(long, default_value_t = 260_000.0)]
    flexible_capex: f64,
    #[arg(long, default_value_t = 1_479_552.0)]
    fixed_capex_per_unit: f64,
    #[arg(
        long,
        default_value_t = 40_000.0,
        help = "Reprogramming cost per extra project using the fixed units"
    )]
    reprogram_cost_per_project: f64,
    #[arg(long, default_value_t = 1)]
    num_units: u32,
    #[arg(long, default_value_t = 3)]
    projects_using_units: u32,
    #[arg(
        long,
        value_enum,
        default_value_t = CliRiskFloor::FloorAtZero,
        help = "Whether the late-defect probability advantage is floored at zero"
    )]
    risk_floor: CliRiskFloor,
    #[arg(
        long = "project",
        value_parser = parse_project_spec,
        help = "Project spec id:days:frames:modules:parts_per_day:module_value; repeat per project. Defaults to the reference three-project portfolio"
    )]
    projects: Vec<Project>,
    #[arg(long, default_value_t = 10_000, help = "Monte Carlo trial count")]
    trials: u32,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long, help = "Skip the Monte Carlo run")]
    skip_monte_carlo: bool,
    #[arg(long, help = "Skip the tornado sensitivity analysis")]
    skip_sensitivity: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct AnalysisPayload {
    labor_rate: Option<f64>,
    workdays_per_year: Option<u32>,
    manual_hours_per_day: Option<f64>,
    scan_time_min: Option<f64>,
    scan_time_mode: Option<f64>,
    scan_time_max: Option<f64>,
    miss_alpha: Option<f64>,
    miss_beta: Option<f64>,
    rework_hours_per_miss: Option<f64>,
    manual_frame_hours: Option<f64>,
    manual_final_hours: Option<f64>,
    manual_rework_hours: Option<f64>,
    automated_frame_hours: Option<f64>,
    automated_final_hours: Option<f64>,
    automated_rework_hours: Option<f64>,
    late_defect_prob_manual: Option<f64>,
    late_defect_prob_automated: Option<f64>,
    severity_min: Option<f64>,
    severity_mode: Option<f64>,
    severity_max: Option<f64>,
    flexible_capex: Option<f64>,
    fixed_capex_per_unit: Option<f64>,
    reprogram_cost_per_project: Option<f64>,
    num_units: Option<u32>,
    projects_using_units: Option<u32>,
    risk_floor_policy: Option<ApiRiskFloor>,
    projects: Option<Vec<ProjectPayload>>,
    trials: Option<u32>,
    seed: Option<u64>,
    parameters: Option<Vec<PerturbationSpec>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectPayload {
    id: String,
    duration_days: u32,
    frame_count: u32,
    module_count: u32,
    parts_per_day: f64,
    module_value: f64,
}

impl From<ProjectPayload> for Project {
    fn from(value: ProjectPayload) -> Self {
        Project {
            id: value.id,
            duration_days: value.duration_days,
            frame_count: value.frame_count,
            module_count: value.module_count,
            parts_per_day: value.parts_per_day,
            module_value: value.module_value,
        }
    }
}

#[derive(Debug)]
struct ApiRequest {
    portfolio: PortfolioModel,
    assumptions: AssumptionSet,
    trials: u32,
    seed: u64,
    parameters: Option<Vec<PerturbationSpec>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EvaluateResponse {
    total_days: u32,
    deterministic: MethodComparison,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulateResponse {
    total_days: u32,
    outcome: SimulationOutcome,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SensitivityResponse {
    total_days: u32,
    report: SensitivityReport,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisResponse {
    total_days: u32,
    deterministic: MethodComparison,
    monte_carlo: Option<SimulationOutcome>,
    sensitivity: Option<SensitivityReport>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

/// The portfolio used when no `--project` specs are supplied: a reference
/// three-project program sized like a typical deployment.
fn default_portfolio_projects() -> Vec<Project> {
    vec![
        Project {
            id: "P1".to_string(),
            duration_days: 650,
            frame_count: 2880,
            module_count: 1440,
            parts_per_day: 24.0,
            module_value: 100_000.0,
        },
        Project {
            id: "P2".to_string(),
            duration_days: 168,
            frame_count: 1400,
            module_count: 700,
            parts_per_day: 20.0,
            module_value: 474_000.0,
        },
        Project {
            id: "P3".to_string(),
            duration_days: 42,
            frame_count: 90,
            module_count: 45,
            parts_per_day: 26.4,
            module_value: 650_000.0,
        },
    ]
}

fn build_model(cli: &Cli) -> Result<(PortfolioModel, AssumptionSet), String> {
    if !cli.labor_rate.is_finite() || cli.labor_rate <= 0.0 {
        return Err("--labor-rate must be > 0".to_string());
    }

    if !(1..=366).contains(&cli.workdays_per_year) {
        return Err("--workdays-per-year must be between 1 and 366".to_string());
    }

    if !cli.manual_hours_per_day.is_finite() || cli.manual_hours_per_day < 0.0 {
        return Err("--manual-hours-per-day must be >= 0".to_string());
    }

    if cli.scan_time_min < 0.0 {
        return Err("--scan-time-min must be >= 0".to_string());
    }

    if !(cli.scan_time_min <= cli.scan_time_mode && cli.scan_time_mode <= cli.scan_time_max) {
        return Err("scan time bounds must satisfy min <= mode <= max".to_string());
    }

    if cli.miss_alpha <= 0.0 || cli.miss_beta <= 0.0 {
        return Err("--miss-alpha and --miss-beta must be > 0".to_string());
    }

    if cli.rework_hours_per_miss < 0.0 {
        return Err("--rework-hours-per-miss must be >= 0".to_string());
    }

    for (name, hours) in [
        ("--manual-frame-hours", cli.manual_frame_hours),
        ("--manual-final-hours", cli.manual_final_hours),
        ("--manual-rework-hours", cli.manual_rework_hours),
        ("--automated-frame-hours", cli.automated_frame_hours),
        ("--automated-final-hours", cli.automated_final_hours),
        ("--automated-rework-hours", cli.automated_rework_hours),
    ] {
        if !hours.is_finite() || hours < 0.0 {
            return Err(format!("{name} must be >= 0"));
        }
    }

    for (name, prob) in [
        ("--late-defect-prob-manual", cli.late_defect_prob_manual),
        (
            "--late-defect-prob-automated",
            cli.late_defect_prob_automated,
        ),
    ] {
        if !(0.0..=1.0).contains(&prob) {
            return Err(format!("{name} must be between 0 and 1"));
        }
    }

    if cli.severity_min < 0.0 {
        return Err("--severity-min must be >= 0".to_string());
    }

    if !(cli.severity_min <= cli.severity_mode && cli.severity_mode <= cli.severity_max) {
        return Err("severity bounds must satisfy min <= mode <= max".to_string());
    }

    for (name, cost) in [
        ("--flexible-capex", cli.flexible_capex),
        ("--fixed-capex-per-unit", cli.fixed_capex_per_unit),
        (
            "--reprogram-cost-per-project",
            cli.reprogram_cost_per_project,
        ),
    ] {
        if !cost.is_finite() || cost < 0.0 {
            return Err(format!("{name} must be >= 0"));
        }
    }

    if cli.num_units < 1 {
        return Err("--num-units must be >= 1".to_string());
    }

    if cli.projects_using_units < 1 {
        return Err("--projects-using-units must be >= 1".to_string());
    }

    if !cli.skip_monte_carlo && cli.trials == 0 {
        return Err("--trials must be > 0".to_string());
    }

    let projects = if cli.projects.is_empty() {
        default_portfolio_projects()
    } else {
        cli.projects.clone()
    };
    let portfolio = PortfolioModel::new(projects).map_err(|e| e.to_string())?;

    let assumptions = AssumptionSet {
        labor_rate: cli.labor_rate,
        workdays_per_year: cli.workdays_per_year,
        manual_hours_per_day: cli.manual_hours_per_day,
        scan_time_minutes: Triangular {
            min: cli.scan_time_min,
            mode: cli.scan_time_mode,
            max: cli.scan_time_max,
        },
        miss_probability: BetaShape {
            alpha: cli.miss_alpha,
            beta: cli.miss_beta,
        },
        rework_hours_per_miss: cli.rework_hours_per_miss,
        manual_frame_hours: cli.manual_frame_hours,
        manual_final_hours: cli.manual_final_hours,
        manual_rework_hours: cli.manual_rework_hours,
        automated_frame_hours: cli.automated_frame_hours,
        automated_final_hours: cli.automated_final_hours,
        automated_rework_hours: cli.automated_rework_hours,
        late_defect_prob_manual: cli.late_defect_prob_manual,
        late_defect_prob_automated: cli.late_defect_prob_automated,
        severity_fraction: Triangular {
            min: cli.severity_min,
            mode: cli.severity_mode,
            max: cli.severity_max,
        },
        flexible_capex: cli.flexible_capex,
        fixed_capex_per_unit: cli.fixed_capex_per_unit,
        reprogram_cost_per_project: cli.reprogram_cost_per_project,
        num_units: cli.num_units,
        projects_using_units: cli.projects_using_units,
        risk_floor_policy: cli.risk_floor.into(),
    };

    Ok((portfolio, assumptions))
}

/// One-shot CLI entry point: deterministic base case plus the optional
/// Monte Carlo and sensitivity runs, serialized as a single JSON document.
pub fn run_analysis(cli: Cli) -> Result<String, String> {
    let (portfolio, assumptions) = build_model(&cli)?;

    let deterministic = core::evaluate(&portfolio, &assumptions).map_err(|e| e.to_string())?;
    let monte_carlo = if cli.skip_monte_carlo {
        None
    } else {
        Some(
            core::simulate(&portfolio, &assumptions, cli.trials, cli.seed)
                .map_err(|e| e.to_string())?,
        )
    };
    let sensitivity = if cli.skip_sensitivity {
        None
    } else {
        Some(
            core::analyze(&portfolio, &assumptions, &default_parameters())
                .map_err(|e| e.to_string())?,
        )
    };

    let response = AnalysisResponse {
        total_days: portfolio.total_days(),
        deterministic,
        monte_carlo,
        sensitivity,
    };
    serde_json::to_string_pretty(&response).map_err(|e| e.to_string())
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(
            "/api/evaluate",
            get(evaluate_get_handler).post(evaluate_post_handler),
        )
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route(
            "/api/sensitivity",
            get(sensitivity_get_handler).post(sensitivity_post_handler),
        )
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    println!("scanroi HTTP API listening on http://{addr}");
    println!("Local access: http://127.0.0.1:{port}/api/evaluate");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn evaluate_get_handler(Query(payload): Query<AnalysisPayload>) -> Response {
    evaluate_handler_impl(payload)
}

async fn evaluate_post_handler(Json(payload): Json<AnalysisPayload>) -> Response {
    evaluate_handler_impl(payload)
}

async fn simulate_get_handler(Query(payload): Query<AnalysisPayload>) -> Response {
    simulate_handler_impl(payload)
}

async fn simulate_post_handler(Json(payload): Json<AnalysisPayload>) -> Response {
    simulate_handler_impl(payload)
}

async fn sensitivity_get_handler(Query(payload): Query<AnalysisPayload>) -> Response {
    sensitivity_handler_impl(payload)
}

async fn sensitivity_post_handler(Json(payload): Json<AnalysisPayload>) -> Response {
    sensitivity_handler_impl(payload)
}

fn evaluate_handler_impl(payload: AnalysisPayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    match core::evaluate(&request.portfolio, &request.assumptions) {
        Ok(deterministic) => json_response(
            StatusCode::OK,
            EvaluateResponse {
                total_days: request.portfolio.total_days(),
                deterministic,
            },
        ),
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

fn simulate_handler_impl(payload: AnalysisPayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    match core::simulate(
        &request.portfolio,
        &request.assumptions,
        request.trials,
        request.seed,
    ) {
        Ok(outcome) => json_response(
            StatusCode::OK,
            SimulateResponse {
                total_days: request.portfolio.total_days(),
                outcome,
            },
        ),
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

fn sensitivity_handler_impl(payload: AnalysisPayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    let parameters = request.parameters.clone().unwrap_or_else(default_parameters);
    match core::analyze(&request.portfolio, &request.assumptions, &parameters) {
        Ok(report) => json_response(
            StatusCode::OK,
            SensitivityResponse {
                total_days: request.portfolio.total_days(),
                report,
            },
        ),
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
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
    let payload = serde_json::from_str::<AnalysisPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: AnalysisPayload) -> Result<ApiRequest, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.labor_rate {
        cli.labor_rate = v;
    }
    if let Some(v) = payload.workdays_per_year {
        cli.workdays_per_year = v;
    }
    if let Some(v) = payload.manual_hours_per_day {
        cli.manual_hours_per_day = v;
    }
    if let Some(v) = payload.scan_time_min {
        cli.scan_time_min = v;
    }
    if let Some(v) = payload.scan_time_mode {
        cli.scan_time_mode = v;
    }
    if let Some(v) = payload.scan_time_max {
        cli.scan_time_max = v;
    }
    if let Some(v) = payload.miss_alpha {
        cli.miss_alpha = v;
    }
    if let Some(v) = payload.miss_beta {
        cli.miss_beta = v;
    }
    if let Some(v) = payload.rework_hours_per_miss {
        cli.rework_hours_per_miss = v;
    }
    if let Some(v) = payload.manual_frame_hours {
        cli.manual_frame_hours = v;
    }
    if let Some(v) = payload.manual_final_hours {
        cli.manual_final_hours = v;
    }
    if let Some(v) = payload.manual_rework_hours {
        cli.manual_rework_hours = v;
    }
    if let Some(v) = payload.automated_frame_hours {
        cli.automated_frame_hours = v;
    }
    if let Some(v) = payload.automated_final_hours {
        cli.automated_final_hours = v;
    }
    if let Some(v) = payload.automated_rework_hours {
        cli.automated_rework_hours = v;
    }
    if let Some(v) = payload.late_defect_prob_manual {
        cli.late_defect_prob_manual = v;
    }
    if let Some(v) = payload.late_defect_prob_automated {
        cli.late_defect_prob_automated = v;
    }
    if let Some(v) = payload.severity_min {
        cli.severity_min = v;
    }
    if let Some(v) = payload.severity_mode {
        cli.severity_mode = v;
    }
    if let Some(v) = payload.severity_max {
        cli.severity_max = v;
    }
    if let Some(v) = payload.flexible_capex {
        cli.flexible_capex = v;
    }
    if let Some(v) = payload.fixed_capex_per_unit {
        cli.fixed_capex_per_unit = v;
    }
    if let Some(v) = payload.reprogram_cost_per_project {
        cli.reprogram_cost_per_project = v;
    }
    if let Some(v) = payload.num_units {
        cli.num_units = v;
    }
    if let Some(v) = payload.projects_using_units {
        cli.projects_using_units = v;
    }
    if let Some(v) = payload.risk_floor_policy {
        cli.risk_floor = v.into();
    }
    if let Some(v) = payload.projects {
        cli.projects = v.into_iter().map(Project::from).collect();
    }
    if let Some(v) = payload.trials {
        cli.trials = v;
    }
    if let Some(v) = payload.seed {
        cli.seed = v;
    }

    let trials = cli.trials;
    let seed = cli.seed;
    let (portfolio, assumptions) = build_model(&cli)?;

    Ok(ApiRequest {
        portfolio,
        assumptions,
        trials,
        seed,
        parameters: payload.parameters,
    })
}

fn default_cli_for_api() -> Cli {
    Cli {
        labor_rate: 62.0,
        workdays_per_year: 260,
        manual_hours_per_day: 8.0,
        scan_time_min: 5.0,
        scan_time_mode: 7.5,
        scan_time_max: 10.0,
        miss_alpha: 2.0,
        miss_beta: 198.0,
        rework_hours_per_miss: 6.0,
        manual_frame_hours: 10.0,
        manual_final_hours: 12.0,
        manual_rework_hours: 10.0,
        automated_frame_hours: 0.25,
        automated_final_hours: 0.25,
        automated_rework_hours: 1.0,
        late_defect_prob_manual: 0.02,
        late_defect_prob_automated: 0.01,
        severity_min: 0.01,
        severity_mode: 0.02,
        severity_max: 0.05,
        flexible_capex: 260_000.0,
        fixed_capex_per_unit: 1_479_552.0,
        reprogram_cost_per_project: 40_000.0,
        num_units: 1,
        projects_using_units: 3,
        risk_floor: CliRiskFloor::FloorAtZero,
        projects: Vec::new(),
        trials: 10_000,
        seed: 42,
        skip_monte_carlo: false,
        skip_sensitivity: false,
    }
}
