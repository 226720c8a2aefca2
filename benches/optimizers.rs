use std::hint::black_box;

use criterion::criterion_group;
use criterion::criterion_main;
use criterion::BenchmarkId;
use criterion::Criterion;
use quant_portfolio::quant::portfolio::BackendKind;
use quant_portfolio::quant::portfolio::MultiObjectiveConfig;
use quant_portfolio::quant::portfolio::MultiObjectiveOptimizer;
use quant_portfolio::quant::portfolio::OptimizerConfig;
use quant_portfolio::quant::portfolio::SharpeOptimizer;
use quant_portfolio::quant::risk::conditional_value_at_risk;
use quant_portfolio::quant::risk::VarMethod;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;

/// Random `(μ, Σ = AAᵀ/n + δI)` for `n` instruments.
fn market(n: usize, seed: u64) -> (Vec<f64>, Vec<Vec<f64>>) {
  let mut rng = StdRng::seed_from_u64(seed);
  let mu: Vec<f64> = (0..n).map(|_| rng.gen_range(0.02..0.15)).collect();
  let a: Vec<Vec<f64>> = (0..n)
    .map(|_| (0..n).map(|_| rng.gen_range(-0.3..0.3)).collect())
    .collect();
  let cov = (0..n)
    .map(|i| {
      (0..n)
        .map(|j| {
          let dot: f64 = (0..n).map(|k| a[i][k] * a[j][k]).sum::<f64>() / n as f64;
          if i == j { dot + 0.01 } else { dot }
        })
        .collect()
    })
    .collect();
  (mu, cov)
}

fn bench_max_sharpe(c: &mut Criterion) {
  let mut group = c.benchmark_group("max_sharpe");

  for &n in &[5, 10, 20] {
    let (mu, cov) = market(n, 7);
    for backend in [BackendKind::ProjectedGradient, BackendKind::NelderMead] {
      let opt = SharpeOptimizer::new(OptimizerConfig {
        backends: vec![backend],
        ..OptimizerConfig::default()
      })
      .unwrap();
      group.bench_with_input(BenchmarkId::new(backend.as_str(), n), &n, |b, _| {
        b.iter(|| black_box(opt.max_sharpe(&mu, &cov)))
      });
    }
  }

  group.finish();
}

fn bench_multi_objective(c: &mut Criterion) {
  let mut group = c.benchmark_group("multi_objective");
  let opt = MultiObjectiveOptimizer::new(OptimizerConfig::default(), MultiObjectiveConfig::default()).unwrap();

  for &n in &[5, 10, 20] {
    let (mu, cov) = market(n, 11);
    group.bench_with_input(BenchmarkId::new("risk_parity", n), &n, |b, _| {
      b.iter(|| black_box(opt.risk_parity(&mu, &cov)))
    });
    group.bench_with_input(BenchmarkId::new("hrp", n), &n, |b, _| {
      b.iter(|| black_box(opt.hierarchical_risk_parity(&mu, &cov)))
    });
  }

  group.finish();
}

fn bench_monte_carlo_cvar(c: &mut Criterion) {
  let mut rng = StdRng::seed_from_u64(3);
  let returns: Vec<f64> = (0..1000).map(|_| rng.gen_range(-0.03..0.03)).collect();
  let method = VarMethod::MonteCarlo {
    simulations: 10_000,
    seed: 42,
  };

  c.bench_function("monte_carlo_cvar", |b| {
    b.iter(|| black_box(conditional_value_at_risk(&returns, 0.99, method)))
  });
}

criterion_group!(
  benches,
  bench_max_sharpe,
  bench_multi_objective,
  bench_monte_carlo_cvar
);
criterion_main!(benches);
