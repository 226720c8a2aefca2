//! # Quant
//!
//! Portfolio construction, risk analytics and rebalancing.

pub mod portfolio;
pub mod rebalance;
pub mod risk;
