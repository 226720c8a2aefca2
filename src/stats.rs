//! # Stats
//!
//! $$
//! \hat\mu = T\,\bar r,\qquad \hat\Sigma = \frac{T}{N-1}\sum_{t=1}^{N}(r_t-\bar r)(r_t-\bar r)^\top
//! $$
//!
//! Return tables and the annualized moment estimates every optimizer consumes.

pub mod estimate;
pub mod moments;
pub mod returns;

pub use estimate::annualized_stats;
pub use estimate::corr_from_cov;
pub use estimate::correlation_matrix;
pub use estimate::is_positive_definite;
pub use estimate::MarketEstimate;
pub use estimate::StatsConfig;
pub use moments::quantile;
pub use moments::sample_mean;
pub use moments::sample_std;
pub use returns::ReturnTable;
