//! # quant-portfolio
//!
//! $$
//! \max_{\mathbf{w}\in\Delta}\ \frac{\mathbf{w}^\top\mu - r_f}{\sqrt{\mathbf{w}^\top\Sigma\mathbf{w}}}
//! $$
//!
//! Portfolio construction and risk analytics over a fixed basket of
//! instruments: annualized estimates from daily returns, constrained
//! optimizers with explicit solver fallbacks, a tail/concentration/drawdown
//! risk model and a rebalancing advisor.
//!
//! [`quant::portfolio::PortfolioEngine`] wires the pieces together.

pub mod error;
pub mod quant;
pub mod stats;
pub mod traits;

pub use error::PortfolioError;
pub use error::Result;
