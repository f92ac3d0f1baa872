mod engine;
mod sampler;
mod sensitivity;
mod types;

pub use engine::{evaluate, simulate, simulate_with_cancel};
pub use sampler::{Rng, beta, derive_trial_seed, triangular};
pub use sensitivity::{
    PerturbationSpec, SensitivityEntry, SensitivityParameter, SensitivityReport, analyze,
    default_parameters,
};
pub use types::{
    AssumptionSet, BetaShape, DeterministicResult, DistributionSummary, MethodComparison,
    ModelError, MonteCarloResult, PortfolioModel, Project, RiskFloorPolicy, SimulationOutcome,
    Triangular,
};
