//! The single canonical implementation of the cost/benefit formula family.
//!
//! The deterministic base case, every Monte Carlo trial, and every
//! sensitivity perturbation all flow through [`evaluate_with_draws`]; they
//! differ only in which `TrialDraws` values they substitute for the three
//! stochastic inputs.

use std::sync::atomic::{AtomicBool, Ordering};

use super::sampler::{self, Rng, sample_beta, sample_triangular};
use super::types::{
    AssumptionSet, DeterministicResult, DistributionSummary, MethodComparison, ModelError,
    MonteCarloResult, PortfolioModel, RiskFloorPolicy, SimulationOutcome,
};

/// Values substituted for the three stochastic inputs in one evaluation.
/// Shared across all projects within a trial: they model portfolio-wide
/// uncertainty, not per-project noise.
#[derive(Debug, Clone, Copy)]
struct TrialDraws {
    scan_time_minutes: f64,
    miss_probability: f64,
    severity_fraction: f64,
}

impl TrialDraws {
    fn means(assumptions: &AssumptionSet) -> Self {
        Self {
            scan_time_minutes: assumptions.scan_time_minutes.mean(),
            miss_probability: assumptions.miss_probability.mean(),
            severity_fraction: assumptions.severity_fraction.mean(),
        }
    }

    fn sampled(assumptions: &AssumptionSet, rng: &mut Rng) -> Self {
        Self {
            scan_time_minutes: sample_triangular(assumptions.scan_time_minutes, rng),
            miss_probability: sample_beta(assumptions.miss_probability, rng),
            severity_fraction: sample_triangular(assumptions.severity_fraction, rng),
        }
    }
}

/// Base-case evaluation of both methods using the analytic distribution
/// means. Pure; never mutates its arguments.
pub fn evaluate(
    portfolio: &PortfolioModel,
    assumptions: &AssumptionSet,
) -> Result<MethodComparison, ModelError> {
    assumptions.validate()?;
    Ok(evaluate_with_draws(
        portfolio,
        assumptions,
        TrialDraws::means(assumptions),
    ))
}

fn evaluate_with_draws(
    portfolio: &PortfolioModel,
    assumptions: &AssumptionSet,
    draws: TrialDraws,
) -> MethodComparison {
    let total_days = portfolio.total_days();
    let flexible = method_result(
        flexible_benefit(portfolio, assumptions, draws),
        assumptions.flexible_capex,
        total_days,
        assumptions.workdays_per_year,
    );
    let fixed_asset = method_result(
        fixed_asset_benefit(portfolio, assumptions, draws),
        fixed_asset_investment(assumptions),
        total_days,
        assumptions.workdays_per_year,
    );

    MethodComparison {
        flexible,
        fixed_asset,
    }
}

fn flexible_benefit(
    portfolio: &PortfolioModel,
    assumptions: &AssumptionSet,
    draws: TrialDraws,
) -> f64 {
    let rate = assumptions.labor_rate;
    let scan_hours_per_part = draws.scan_time_minutes / 60.0;

    let mut benefit = 0.0;
    for project in portfolio.projects() {
        // Labor savings floor at zero: a method never shows negative labor
        // cost. The risk term is a plain expected value and is not floored.
        let per_day_labor = (assumptions.manual_hours_per_day * rate
            - project.parts_per_day * scan_hours_per_part * rate)
            .max(0.0);
        let per_day_risk = project.parts_per_day
            * draws.miss_probability
            * assumptions.rework_hours_per_miss
            * rate;
        benefit += (per_day_labor + per_day_risk) * project.duration_days as f64;
    }
    benefit
}

fn fixed_asset_benefit(
    portfolio: &PortfolioModel,
    assumptions: &AssumptionSet,
    draws: TrialDraws,
) -> f64 {
    let rate = assumptions.labor_rate;
    let frame_saving =
        (assumptions.manual_frame_hours - assumptions.automated_frame_hours).max(0.0) * rate;
    let module_saving = ((assumptions.manual_final_hours - assumptions.automated_final_hours)
        .max(0.0)
        + (assumptions.manual_rework_hours - assumptions.automated_rework_hours).max(0.0))
        * rate;
    let raw_delta = assumptions.late_defect_prob_manual - assumptions.late_defect_prob_automated;
    let risk_delta = match assumptions.risk_floor_policy {
        RiskFloorPolicy::FloorAtZero => raw_delta.max(0.0),
        RiskFloorPolicy::Signed => raw_delta,
    };

    let mut benefit = 0.0;
    for project in portfolio.projects() {
        let modules = project.module_count as f64;
        benefit += project.frame_count as f64 * frame_saving
            + modules * module_saving
            + modules * risk_delta * draws.severity_fraction * project.module_value;
    }
    benefit
}

fn fixed_asset_investment(assumptions: &AssumptionSet) -> f64 {
    let units = assumptions.num_units as f64;
    let extra_projects = assumptions.projects_using_units.saturating_sub(1) as f64;
    units * assumptions.fixed_capex_per_unit
        + assumptions.reprogram_cost_per_project * units * extra_projects
}

fn method_result(
    benefit: f64,
    investment: f64,
    total_days: u32,
    workdays_per_year: u32,
) -> DeterministicResult {
    let roi = if investment == 0.0 {
        None
    } else {
        Some((benefit - investment) / investment)
    };
    let annualized_benefit = if total_days == 0 {
        None
    } else {
        Some(benefit * workdays_per_year as f64 / total_days as f64)
    };
    let payback_years = match annualized_benefit {
        Some(annual) if annual > 0.0 => Some(investment / annual),
        _ => None,
    };

    DeterministicResult {
        benefit,
        investment,
        roi,
        annualized_benefit,
        payback_years,
    }
}

/// Runs `trials` independent Monte Carlo trials. Reproducible: trial k draws
/// from its own substream seeded by `derive_trial_seed(seed, k)`, so output
/// is identical for a given seed regardless of how the loop is scheduled.
pub fn simulate(
    portfolio: &PortfolioModel,
    assumptions: &AssumptionSet,
    trials: u32,
    seed: u64,
) -> Result<SimulationOutcome, ModelError> {
    let never = AtomicBool::new(false);
    simulate_with_cancel(portfolio, assumptions, trials, seed, &never)
}

/// Like [`simulate`], but checks `cancel` between trials and returns early
/// with the trials completed so far; `sample_count` reflects the truncation.
pub fn simulate_with_cancel(
    portfolio: &PortfolioModel,
    assumptions: &AssumptionSet,
    trials: u32,
    seed: u64,
    cancel: &AtomicBool,
) -> Result<SimulationOutcome, ModelError> {
    assumptions.validate()?;
    if trials == 0 {
        return Err(ModelError::InvalidParameter(
            "trials must be > 0".to_string(),
        ));
    }

    let base = evaluate_with_draws(portfolio, assumptions, TrialDraws::means(assumptions));

    let capacity = trials as usize;
    let mut flexible_roi = Vec::with_capacity(capacity);
    let mut flexible_payback = Vec::with_capacity(capacity);
    let mut fixed_roi = Vec::with_capacity(capacity);
    let mut fixed_payback = Vec::with_capacity(capacity);

    let mut completed = 0_u32;
    for trial in 0..trials {
        if cancel.load(Ordering::Relaxed) {
            break;
        }

        let mut rng = Rng::new(sampler::derive_trial_seed(seed, trial));
        let draws = TrialDraws::sampled(assumptions, &mut rng);
        let outcome = evaluate_with_draws(portfolio, assumptions, draws);

        flexible_roi.push(outcome.flexible.roi);
        flexible_payback.push(outcome.flexible.payback_years);
        fixed_roi.push(outcome.fixed_asset.roi);
        fixed_payback.push(outcome.fixed_asset.payback_years);
        completed += 1;
    }

    Ok(SimulationOutcome {
        flexible: collect_method(completed, seed, flexible_roi, flexible_payback, base.flexible),
        fixed_asset: collect_method(completed, seed, fixed_roi, fixed_payback, base.fixed_asset),
    })
}

fn collect_method(
    sample_count: u32,
    seed: u64,
    roi_samples: Vec<Option<f64>>,
    payback_samples: Vec<Option<f64>>,
    base_case: DeterministicResult,
) -> MonteCarloResult {
    let roi_summary = summarize(&roi_samples);
    MonteCarloResult {
        sample_count,
        seed,
        roi_samples,
        payback_samples,
        roi_summary,
        base_case,
    }
}

fn summarize(samples: &[Option<f64>]) -> Option<DistributionSummary> {
    let mut defined: Vec<f64> = samples.iter().filter_map(|s| *s).collect();
    if defined.is_empty() {
        return None;
    }

    let mean = defined.iter().sum::<f64>() / defined.len() as f64;
    Some(DistributionSummary {
        mean,
        p10: percentile(&mut defined, 10.0),
        p50: percentile(&mut defined, 50.0),
        p90: percentile(&mut defined, 90.0),
    })
}

fn percentile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len();
    if n == 1 {
        return values[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        values[lower]
    } else {
        let w = rank - lower as f64;
        values[lower] * (1.0 - w) + values[upper] * w
    }
}
