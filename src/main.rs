use anyhow::Context;
use anyhow::Result;
use quant_portfolio::quant::portfolio::NamedSignal;
use quant_portfolio::quant::portfolio::OptimizerMethod;
use quant_portfolio::quant::portfolio::PortfolioEngine;
use quant_portfolio::quant::portfolio::PortfolioEngineConfig;
use quant_portfolio::stats::ReturnTable;
use quant_portfolio::traits::Report;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::Distribution;
use rand_distr::Normal;
use tracing_subscriber::EnvFilter;

/// Daily drift and volatility of the demo basket.
const BASKET: [(&str, f64, f64); 5] = [
  ("equity", 0.0005, 0.013),
  ("tech", 0.0007, 0.018),
  ("bonds", 0.0002, 0.004),
  ("gold", 0.0003, 0.010),
  ("dividend", 0.0004, 0.009),
];

fn synthetic_returns(seed: u64, periods: usize) -> Result<ReturnTable> {
  let mut rng = StdRng::seed_from_u64(seed);
  let market = Normal::new(0.0, 0.007)?;
  let common: Vec<f64> = (0..periods).map(|_| market.sample(&mut rng)).collect();

  let mut columns = Vec::with_capacity(BASKET.len());
  for (i, &(_, drift, vol)) in BASKET.iter().enumerate() {
    let beta = [1.0, 1.3, -0.2, 0.1, 0.8][i];
    let idio = Normal::new(drift, vol)?;
    columns.push(
      common
        .iter()
        .map(|c| beta * c + idio.sample(&mut rng))
        .collect::<Vec<f64>>(),
    );
  }
  let names = BASKET.iter().map(|(n, _, _)| n.to_string()).collect();
  Ok(ReturnTable::from_columns(names, &columns)?)
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let engine = PortfolioEngine::new(PortfolioEngineConfig::default())?;
  let returns = synthetic_returns(42, 756)?;
  let estimate = engine.estimate(&returns).context("estimating annualized statistics")?;

  for method in [
    OptimizerMethod::MaxSharpe,
    OptimizerMethod::MinVariance,
    OptimizerMethod::RiskParity,
    OptimizerMethod::HierarchicalRiskParity,
  ] {
    let result = engine.optimize_with(method, &estimate, Some(&returns))?;
    println!("{}", serde_json::to_string_pretty(&result.to_value())?);
  }

  let momentum = NamedSignal::new("momentum".into(), vec![0.8, 1.2, -0.5, 0.1, 0.3], 0.6);
  let value = NamedSignal::new("value".into(), vec![0.2, -0.9, 0.4, 0.0, 0.7], 0.4);
  let tilted = engine.optimize_signals(&estimate, &[momentum, value])?;
  println!(
    "signal-enhanced sharpe {:.3}, dominant signal {:?}",
    tilted.result.sharpe, tilted.attribution.dominant_signal
  );

  let target = engine.optimize(&estimate, Some(&returns))?;
  let report = engine.risk_report(&returns, &target.weights)?;
  println!("{}", serde_json::to_string_pretty(&report.rating)?);

  let current = vec![0.2; BASKET.len()];
  let plan = engine.rebalance(&estimate, &current, &target.weights, 1_000_000.0, None)?;
  println!("{}", serde_json::to_string_pretty(&plan.to_value())?);

  Ok(())
}
