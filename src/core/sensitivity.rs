//! One-at-a-time ("tornado") sensitivity analysis.
//!
//! Each perturbation scales exactly one assumption on its own copy of the
//! `AssumptionSet`; the caller's instance is never touched and perturbations
//! are independent of iteration order.

use serde::{Deserialize, Serialize};

use super::engine::evaluate;
use super::types::{AssumptionSet, ModelError, PortfolioModel};

/// An assumption axis that can be scaled in isolation. Distribution-valued
/// axes scale min/mode/max (or the alpha shape, for the beta-distributed
/// miss probability) together so the distribution invariants survive any
/// non-negative multiplier.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SensitivityParameter {
    LaborRate,
    ManualHoursPerDay,
    ScanTime,
    MissProbability,
    ReworkHoursPerMiss,
    SeverityFraction,
    LateDefectProbManual,
    LateDefectProbAutomated,
    FlexibleCapex,
    FixedCapexPerUnit,
    ReprogramCostPerProject,
}

impl SensitivityParameter {
    pub fn label(self) -> &'static str {
        match self {
            Self::LaborRate => "labor rate",
            Self::ManualHoursPerDay => "manual hours per day",
            Self::ScanTime => "scan time",
            Self::MissProbability => "miss probability",
            Self::ReworkHoursPerMiss => "rework hours per miss",
            Self::SeverityFraction => "defect severity",
            Self::LateDefectProbManual => "late defect probability (manual)",
            Self::LateDefectProbAutomated => "late defect probability (automated)",
            Self::FlexibleCapex => "flexible CAPEX",
            Self::FixedCapexPerUnit => "fixed CAPEX per unit",
            Self::ReprogramCostPerProject => "reprogramming cost per project",
        }
    }

    /// Returns a new assumption set with this one axis scaled. The input is
    /// never mutated.
    pub fn apply(self, base: &AssumptionSet, multiplier: f64) -> AssumptionSet {
        let mut scaled = base.clone();
        match self {
            Self::LaborRate => scaled.labor_rate *= multiplier,
            Self::ManualHoursPerDay => scaled.manual_hours_per_day *= multiplier,
            Self::ScanTime => {
                scaled.scan_time_minutes.min *= multiplier;
                scaled.scan_time_minutes.mode *= multiplier;
                scaled.scan_time_minutes.max *= multiplier;
            }
            Self::MissProbability => scaled.miss_probability.alpha *= multiplier,
            Self::ReworkHoursPerMiss => scaled.rework_hours_per_miss *= multiplier,
            Self::SeverityFraction => {
                scaled.severity_fraction.min *= multiplier;
                scaled.severity_fraction.mode *= multiplier;
                scaled.severity_fraction.max *= multiplier;
            }
            Self::LateDefectProbManual => scaled.late_defect_prob_manual *= multiplier,
            Self::LateDefectProbAutomated => scaled.late_defect_prob_automated *= multiplier,
            Self::FlexibleCapex => scaled.flexible_capex *= multiplier,
            Self::FixedCapexPerUnit => scaled.fixed_capex_per_unit *= multiplier,
            Self::ReprogramCostPerProject => scaled.reprogram_cost_per_project *= multiplier,
        }
        scaled
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerturbationSpec {
    pub parameter: SensitivityParameter,
    pub low_multiplier: f64,
    pub high_multiplier: f64,
}

/// The standard tornado set: every assumption axis at -20%/+20%.
pub fn default_parameters() -> Vec<PerturbationSpec> {
    [
        SensitivityParameter::LaborRate,
        SensitivityParameter::ManualHoursPerDay,
        SensitivityParameter::ScanTime,
        SensitivityParameter::MissProbability,
        SensitivityParameter::ReworkHoursPerMiss,
        SensitivityParameter::SeverityFraction,
        SensitivityParameter::LateDefectProbManual,
        SensitivityParameter::LateDefectProbAutomated,
        SensitivityParameter::FlexibleCapex,
        SensitivityParameter::FixedCapexPerUnit,
        SensitivityParameter::ReprogramCostPerProject,
    ]
    .into_iter()
    .map(|parameter| PerturbationSpec {
        parameter,
        low_multiplier: 0.8,
        high_multiplier: 1.2,
    })
    .collect()
}

/// Marginal ROI effect of one perturbed parameter. Deltas are `None` when
/// either side's ROI is undefined (e.g. CAPEX scaled to zero).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensitivityEntry {
    pub parameter: SensitivityParameter,
    pub label: &'static str,
    pub base_roi: Option<f64>,
    pub delta_low: Option<f64>,
    pub delta_high: Option<f64>,
}

impl SensitivityEntry {
    fn magnitude(&self) -> f64 {
        let low = self.delta_low.map(f64::abs).unwrap_or(0.0);
        let high = self.delta_high.map(f64::abs).unwrap_or(0.0);
        low.max(high)
    }
}

/// Per-method tornado entries, sorted by perturbation magnitude descending.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SensitivityReport {
    pub flexible: Vec<SensitivityEntry>,
    pub fixed_asset: Vec<SensitivityEntry>,
}

pub fn analyze(
    portfolio: &PortfolioModel,
    assumptions: &AssumptionSet,
    specs: &[PerturbationSpec],
) -> Result<SensitivityReport, ModelError> {
    for spec in specs {
        if !spec.low_multiplier.is_finite() || !spec.high_multiplier.is_finite() {
            return Err(ModelError::InvalidParameter(format!(
                "{}: multipliers must be finite",
                spec.parameter.label()
            )));
        }
    }

    let base = evaluate(portfolio, assumptions)?;

    let mut flexible = Vec::with_capacity(specs.len());
    let mut fixed_asset = Vec::with_capacity(specs.len());
    for spec in specs {
        let low = evaluate(
            portfolio,
            &spec.parameter.apply(assumptions, spec.low_multiplier),
        )?;
        let high = evaluate(
            portfolio,
            &spec.parameter.apply(assumptions, spec.high_multiplier),
        )?;

        flexible.push(entry(
            spec.parameter,
            base.flexible.roi,
            low.flexible.roi,
            high.flexible.roi,
        ));
        fixed_asset.push(entry(
            spec.parameter,
            base.fixed_asset.roi,
            low.fixed_asset.roi,
            high.fixed_asset.roi,
        ));
    }

    sort_by_magnitude(&mut flexible);
    sort_by_magnitude(&mut fixed_asset);

    Ok(SensitivityReport {
        flexible,
        fixed_asset,
    })
}

fn entry(
    parameter: SensitivityParameter,
    base_roi: Option<f64>,
    low_roi: Option<f64>,
    high_roi: Option<f64>,
) -> SensitivityEntry {
    let delta = |perturbed: Option<f64>| match (base_roi, perturbed) {
        (Some(base), Some(perturbed)) => Some(perturbed - base),
        _ => None,
    };
    SensitivityEntry {
        parameter,
        label: parameter.label(),
        base_roi,
        delta_low: delta(low_roi),
        delta_high: delta(high_roi),
    }
}

fn sort_by_magnitude(entries: &mut [SensitivityEntry]) {
    entries.sort_by(|a, b| b.magnitude().total_cmp(&a.magnitude()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{BetaShape, Project, RiskFloorPolicy, Triangular};

    fn sample_assumptions() -> AssumptionSet {
        AssumptionSet {
            labor_rate: 62.0,
            workdays_per_year: 260,
            manual_hours_per_day: 8.0,
            scan_time_minutes: Triangular {
                min: 5.0,
                mode: 7.5,
                max: 10.0,
            },
            miss_probability: BetaShape {
                alpha: 2.0,
                beta: 198.0,
            },
            rework_hours_per_miss: 6.0,
            manual_frame_hours: 10.0,
            manual_final_hours: 12.0,
            manual_rework_hours: 10.0,
            automated_frame_hours: 0.25,
            automated_final_hours: 0.25,
            automated_rework_hours: 1.0,
            late_defect_prob_manual: 0.02,
            late_defect_prob_automated: 0.01,
            severity_fraction: Triangular {
                min: 0.01,
                mode: 0.02,
                max: 0.05,
            },
            flexible_capex: 260_000.0,
            fixed_capex_per_unit: 1_479_552.0,
            reprogram_cost_per_project: 40_000.0,
            num_units: 1,
            projects_using_units: 3,
            risk_floor_policy: RiskFloorPolicy::FloorAtZero,
        }
    }

    fn sample_portfolio() -> PortfolioModel {
        PortfolioModel::new(vec![Project {
            id: "P1".to_string(),
            duration_days: 650,
            frame_count: 2880,
            module_count: 1440,
            parts_per_day: 24.0,
            module_value: 100_000.0,
        }])
        .expect("valid portfolio")
    }

    fn spec(parameter: SensitivityParameter) -> PerturbationSpec {
        PerturbationSpec {
            parameter,
            low_multiplier: 0.8,
            high_multiplier: 1.2,
        }
    }

    #[test]
    fn analyze_leaves_assumptions_untouched() {
        let portfolio = sample_portfolio();
        let assumptions = sample_assumptions();
        let snapshot = assumptions.clone();
        let before = evaluate(&portfolio, &assumptions).expect("valid inputs");

        analyze(&portfolio, &assumptions, &default_parameters()).expect("valid inputs");

        assert_eq!(assumptions, snapshot);
        let after = evaluate(&portfolio, &assumptions).expect("valid inputs");
        assert_eq!(before, after);
    }

    #[test]
    fn entries_are_sorted_by_magnitude_descending() {
        let report = analyze(
            &sample_portfolio(),
            &sample_assumptions(),
            &default_parameters(),
        )
        .expect("valid inputs");

        for entries in [&report.flexible, &report.fixed_asset] {
            for pair in entries.windows(2) {
                assert!(pair[0].magnitude() >= pair[1].magnitude());
            }
        }
    }

    #[test]
    fn scan_time_perturbation_moves_flexible_roi_inversely() {
        let report = analyze(
            &sample_portfolio(),
            &sample_assumptions(),
            &[spec(SensitivityParameter::ScanTime)],
        )
        .expect("valid inputs");

        let entry = &report.flexible[0];
        // Faster scans raise the flexible-method benefit.
        assert!(entry.delta_low.expect("defined") > 0.0);
        assert!(entry.delta_high.expect("defined") < 0.0);
    }

    #[test]
    fn capex_perturbation_moves_roi_inversely() {
        let report = analyze(
            &sample_portfolio(),
            &sample_assumptions(),
            &[spec(SensitivityParameter::FlexibleCapex)],
        )
        .expect("valid inputs");

        let entry = &report.flexible[0];
        assert!(entry.delta_low.expect("defined") > 0.0);
        assert!(entry.delta_high.expect("defined") < 0.0);
    }

    #[test]
    fn flexible_only_parameter_leaves_fixed_asset_flat() {
        let report = analyze(
            &sample_portfolio(),
            &sample_assumptions(),
            &[spec(SensitivityParameter::ReworkHoursPerMiss)],
        )
        .expect("valid inputs");

        let entry = &report.fixed_asset[0];
        assert_eq!(entry.delta_low, Some(0.0));
        assert_eq!(entry.delta_high, Some(0.0));
    }

    #[test]
    fn zeroed_capex_yields_undefined_delta() {
        let report = analyze(
            &sample_portfolio(),
            &sample_assumptions(),
            &[PerturbationSpec {
                parameter: SensitivityParameter::FlexibleCapex,
                low_multiplier: 0.0,
                high_multiplier: 1.2,
            }],
        )
        .expect("valid inputs");

        let entry = &report.flexible[0];
        assert_eq!(entry.delta_low, None);
        assert!(entry.delta_high.is_some());
    }

    #[test]
    fn negative_multiplier_on_distribution_is_rejected() {
        let err = analyze(
            &sample_portfolio(),
            &sample_assumptions(),
            &[PerturbationSpec {
                parameter: SensitivityParameter::ScanTime,
                low_multiplier: -1.0,
                high_multiplier: 1.2,
            }],
        )
        .expect_err("flipped bounds must be rejected");
        assert!(matches!(err, ModelError::InvalidParameter(_)));
    }

    #[test]
    fn non_finite_multiplier_is_rejected() {
        let err = analyze(
            &sample_portfolio(),
            &sample_assumptions(),
            &[PerturbationSpec {
                parameter: SensitivityParameter::LaborRate,
                low_multiplier: f64::NAN,
                high_multiplier: 1.2,
            }],
        )
        .expect_err("NaN multiplier must be rejected");
        assert!(matches!(err, ModelError::InvalidParameter(_)));
    }
}
