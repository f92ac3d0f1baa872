use std::fmt;

use serde::Serialize;

/// Whether the late-defect probability advantage of the automated method is
/// floored at zero or allowed to go negative when the automated method is
/// assumed to miss more defects than the manual one.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RiskFloorPolicy {
    FloorAtZero,
    Signed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ModelError {
    InvalidParameter(String),
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
        }
    }
}

impl std::error::Error for ModelError {}

/// One work package. Volume fields drive both methods' savings.
#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub id: String,
    pub duration_days: u32,
    pub frame_count: u32,
    pub module_count: u32,
    pub parts_per_day: f64,
    pub module_value: f64,
}

/// Immutable set of projects keyed by unique id. Ordering carries no meaning.
#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioModel {
    projects: Vec<Project>,
}

impl PortfolioModel {
    pub fn new(projects: Vec<Project>) -> Result<Self, ModelError> {
        for (idx, project) in projects.iter().enumerate() {
            if projects[..idx].iter().any(|p| p.id == project.id) {
                return Err(ModelError::InvalidParameter(format!(
                    "duplicate project id {:?}",
                    project.id
                )));
            }
            if project.duration_days == 0 {
                return Err(ModelError::InvalidParameter(format!(
                    "project {:?}: duration_days must be > 0",
                    project.id
                )));
            }
            if !project.parts_per_day.is_finite() || project.parts_per_day <= 0.0 {
                return Err(ModelError::InvalidParameter(format!(
                    "project {:?}: parts_per_day must be > 0",
                    project.id
                )));
            }
            if !project.module_value.is_finite() || project.module_value <= 0.0 {
                return Err(ModelError::InvalidParameter(format!(
                    "project {:?}: module_value must be > 0",
                    project.id
                )));
            }
        }
        Ok(Self { projects })
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn total_days(&self) -> u32 {
        self.projects.iter().map(|p| p.duration_days).sum()
    }
}

/// Triangular distribution bounds, `min <= mode <= max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangular {
    pub min: f64,
    pub mode: f64,
    pub max: f64,
}

impl Triangular {
    pub fn mean(self) -> f64 {
        (self.min + self.mode + self.max) / 3.0
    }

    pub fn validate(self, name: &str) -> Result<(), ModelError> {
        let ordered = self.min.is_finite()
            && self.mode.is_finite()
            && self.max.is_finite()
            && self.min <= self.mode
            && self.mode <= self.max;
        if ordered {
            Ok(())
        } else {
            Err(ModelError::InvalidParameter(format!(
                "{name}: triangular bounds must satisfy min <= mode <= max, got ({}, {}, {})",
                self.min, self.mode, self.max
            )))
        }
    }
}

/// Beta distribution shape parameters, both strictly positive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BetaShape {
    pub alpha: f64,
    pub beta: f64,
}

impl BetaShape {
    pub fn mean(self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    pub fn validate(self, name: &str) -> Result<(), ModelError> {
        let positive = self.alpha.is_finite()
            && self.beta.is_finite()
            && self.alpha > 0.0
            && self.beta > 0.0;
        if positive {
            Ok(())
        } else {
            Err(ModelError::InvalidParameter(format!(
                "{name}: beta shape parameters must be > 0, got ({}, {})",
                self.alpha, self.beta
            )))
        }
    }
}

/// Portfolio-wide assumptions shared by both inspection methods.
///
/// Monetary values are dollars, times are hours unless the field name says
/// otherwise, probabilities are fractions in [0, 1].
#[derive(Debug, Clone, PartialEq)]
pub struct AssumptionSet {
    pub labor_rate: f64,
    pub workdays_per_year: u32,

    // Flexible (handheld) method.
    pub manual_hours_per_day: f64,
    pub scan_time_minutes: Triangular,
    pub miss_probability: BetaShape,
    pub rework_hours_per_miss: f64,

    // Fixed-asset (gantry) method.
    pub manual_frame_hours: f64,
    pub manual_final_hours: f64,
    pub manual_rework_hours: f64,
    pub automated_frame_hours: f64,
    pub automated_final_hours: f64,
    pub automated_rework_hours: f64,
    pub late_defect_prob_manual: f64,
    pub late_defect_prob_automated: f64,
    pub severity_fraction: Triangular,

    // Investment.
    pub flexible_capex: f64,
    pub fixed_capex_per_unit: f64,
    pub reprogram_cost_per_project: f64,
    pub num_units: u32,
    pub projects_using_units: u32,

    pub risk_floor_policy: RiskFloorPolicy,
}

impl AssumptionSet {
    pub fn validate(&self) -> Result<(), ModelError> {
        self.scan_time_minutes.validate("scan_time_minutes")?;
        self.severity_fraction.validate("severity_fraction")?;
        self.miss_probability.validate("miss_probability")?;
        if self.num_units < 1 {
            return Err(ModelError::InvalidParameter(
                "num_units must be >= 1".to_string(),
            ));
        }
        if self.projects_using_units < 1 {
            return Err(ModelError::InvalidParameter(
                "projects_using_units must be >= 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Base-case outcome for one method. Undefined metrics are `None`, never a
/// sentinel number and never NaN.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeterministicResult {
    pub benefit: f64,
    pub investment: f64,
    pub roi: Option<f64>,
    pub annualized_benefit: Option<f64>,
    pub payback_years: Option<f64>,
}

/// Results for both methods from one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodComparison {
    pub flexible: DeterministicResult,
    pub fixed_asset: DeterministicResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionSummary {
    pub mean: f64,
    pub p10: f64,
    pub p50: f64,
    pub p90: f64,
}

/// Monte Carlo outcome distribution for one method.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonteCarloResult {
    pub sample_count: u32,
    pub seed: u64,
    pub roi_samples: Vec<Option<f64>>,
    pub payback_samples: Vec<Option<f64>>,
    pub roi_summary: Option<DistributionSummary>,
    pub base_case: DeterministicResult,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationOutcome {
    pub flexible: MonteCarloResult,
    pub fixed_asset: MonteCarloResult,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project(id: &str) -> Project {
        Project {
            id: id.to_string(),
            duration_days: 100,
            frame_count: 10,
            module_count: 5,
            parts_per_day: 20.0,
            module_value: 100_000.0,
        }
    }

    #[test]
    fn portfolio_rejects_duplicate_ids() {
        let err = PortfolioModel::new(vec![project("P1"), project("P1")])
            .expect_err("duplicate ids must be rejected");
        assert!(matches!(err, ModelError::InvalidParameter(_)));
    }

    #[test]
    fn portfolio_rejects_zero_duration() {
        let mut p = project("P1");
        p.duration_days = 0;
        assert!(PortfolioModel::new(vec![p]).is_err());
    }

    #[test]
    fn portfolio_sums_total_days() {
        let mut p2 = project("P2");
        p2.duration_days = 42;
        let portfolio = PortfolioModel::new(vec![project("P1"), p2]).expect("valid");
        assert_eq!(portfolio.total_days(), 142);
    }

    #[test]
    fn triangular_rejects_unordered_bounds() {
        let dist = Triangular {
            min: 5.0,
            mode: 4.0,
            max: 10.0,
        };
        assert!(dist.validate("scan").is_err());
    }

    #[test]
    fn triangular_mean_is_arithmetic() {
        let dist = Triangular {
            min: 5.0,
            mode: 7.5,
            max: 10.0,
        };
        assert!((dist.mean() - 7.5).abs() < 1e-12);
    }

    #[test]
    fn beta_shape_rejects_non_positive() {
        assert!(
            BetaShape {
                alpha: 0.0,
                beta: 198.0
            }
            .validate("miss")
            .is_err()
        );
        assert!(
            BetaShape {
                alpha: 2.0,
                beta: -1.0
            }
            .validate("miss")
            .is_err()
        );
    }

    #[test]
    fn beta_mean_matches_formula() {
        let shape = BetaShape {
            alpha: 2.0,
            beta: 198.0,
        };
        assert!((shape.mean() - 0.01).abs() < 1e-12);
    }
}
