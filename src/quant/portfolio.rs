//! # Portfolio
//!
//! $$
//! \sigma_p^2 = \mathbf{w}^\top \Sigma \mathbf{w}
//! $$
//!
//! Long-only portfolio optimizers over one pluggable solver chain: Sharpe
//! maximization, the efficient frontier, multi-objective strategies,
//! hierarchical risk parity and signal tilts.

pub mod data;
pub mod engine;
pub mod fallback;
pub mod frontier;
pub mod hierarchical;
pub mod multi_objective;
pub mod sharpe;
pub mod signal;
pub mod solver;
pub mod types;

pub use data::diversification_ratio;
pub use data::herfindahl;
pub use data::portfolio_variance;
pub use data::sharpe_ratio;
pub use engine::PortfolioEngine;
pub use engine::PortfolioEngineConfig;
pub use fallback::FallbackPolicy;
pub use fallback::FallbackStage;
pub use fallback::SolverChain;
pub use frontier::EfficientFrontier;
pub use frontier::FrontierPoint;
pub use hierarchical::correlation_clusters;
pub use hierarchical::ClusterBudget;
pub use multi_objective::MethodComparison;
pub use multi_objective::MultiObjectiveConfig;
pub use multi_objective::MultiObjectiveOptimizer;
pub use sharpe::OptimizerConfig;
pub use sharpe::SharpeOptimizer;
pub use signal::NamedSignal;
pub use signal::SignalAttribution;
pub use signal::SignalComparison;
pub use signal::SignalConfig;
pub use signal::SignalEnhancedResult;
pub use signal::SignalOptimizer;
pub use solver::BackendKind;
pub use solver::Constraints;
pub use solver::SolverBackend;
pub use solver::SolverSettings;
pub use solver::SolverStatus;
pub use types::OptimizerMethod;
pub use types::PortfolioResult;
pub use types::Provenance;
