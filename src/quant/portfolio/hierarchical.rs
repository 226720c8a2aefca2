//! # Hierarchical Risk Parity
//!
//! $$
//! \mathcal C \leftarrow \mathcal C \setminus\{C_a, C_b\} \cup \{C_a\cup C_b\}
//! \quad\text{while}\quad \max_{i\in C_a,\,j\in C_b}\rho_{ij} > \tau
//! $$
//!
//! Greedy correlation clustering followed by risk parity inside each cluster
//! and a configurable budget across clusters.

use serde::Deserialize;
use serde::Serialize;
use tracing::debug;

use super::data::dot;
use super::data::equal_weights;
use super::data::mat_vec_mul;
use super::fallback::FallbackPolicy;
use super::fallback::SolverChain;
use super::solver::Objective;
use super::solver::Problem;
use super::types::Provenance;
use crate::error::Result;

/// How capital is split across clusters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterBudget {
  /// Risk parity across clusters treated as synthetic instruments.
  #[default]
  EqualRisk,
  /// Each cluster receives `1/k` of capital.
  EqualCapital,
}

/// Partition instruments into correlation clusters.
///
/// Starts from singletons and repeatedly merges the first pair of clusters,
/// scanning in index order, whose largest cross correlation exceeds
/// `threshold`. Clusters are kept ordered by their lowest member so ties
/// always resolve towards the lowest index.
pub fn correlation_clusters(corr: &[Vec<f64>], threshold: f64) -> Vec<Vec<usize>> {
  let mut clusters: Vec<Vec<usize>> = (0..corr.len()).map(|i| vec![i]).collect();

  'merge: loop {
    for a in 0..clusters.len() {
      for b in (a + 1)..clusters.len() {
        let max_corr = clusters[a]
          .iter()
          .flat_map(|&i| clusters[b].iter().map(move |&j| corr[i][j]))
          .fold(f64::NEG_INFINITY, f64::max);
        if max_corr > threshold {
          let merged = clusters.remove(b);
          clusters[a].extend(merged);
          clusters[a].sort_unstable();
          continue 'merge;
        }
      }
    }
    break;
  }

  clusters
}

pub(crate) struct HierarchicalAllocation {
  pub weights: Vec<f64>,
  pub provenance: Provenance,
  pub clusters: Vec<Vec<usize>>,
}

/// Risk parity weights on a sub-covariance. Singletons get full weight
/// without a solve.
fn risk_parity_block(
  chain: &SolverChain,
  mu: &[f64],
  cov: &[Vec<f64>],
  risk_free: f64,
) -> Result<(Vec<f64>, Option<Provenance>)> {
  if mu.len() == 1 {
    return Ok((vec![1.0], None));
  }
  let problem = Problem::new(mu, cov, risk_free, Objective::RiskParity);
  let (w, p) = chain.solve(&problem, FallbackPolicy::EqualWeight)?;
  Ok((w, Some(p)))
}

pub(crate) fn allocate(
  chain: &SolverChain,
  mu: &[f64],
  cov: &[Vec<f64>],
  corr: &[Vec<f64>],
  risk_free: f64,
  threshold: f64,
  budget: ClusterBudget,
) -> Result<HierarchicalAllocation> {
  let n = mu.len();
  let clusters = correlation_clusters(corr, threshold);
  debug!(clusters = clusters.len(), "correlation clusters");

  let mut fell_back = false;
  let mut backend = None;
  let mut note = |p: Option<Provenance>| match p {
    Some(Provenance::Solver { backend: name }) => {
      backend.get_or_insert(name);
    }
    Some(_) => fell_back = true,
    None => {}
  };

  let mut intra = Vec::with_capacity(clusters.len());
  for members in &clusters {
    let sub_mu: Vec<f64> = members.iter().map(|&i| mu[i]).collect();
    let sub_cov: Vec<Vec<f64>> = members
      .iter()
      .map(|&i| members.iter().map(|&j| cov[i][j]).collect())
      .collect();
    let (w, p) = risk_parity_block(chain, &sub_mu, &sub_cov, risk_free)?;
    note(p);
    intra.push(w);
  }

  let k = clusters.len();
  let cluster_weights = match budget {
    ClusterBudget::EqualCapital => equal_weights(k),
    ClusterBudget::EqualRisk => {
      let embed = |c: usize| -> Vec<f64> {
        let mut v = vec![0.0; n];
        for (&i, &w) in clusters[c].iter().zip(&intra[c]) {
          v[i] = w;
        }
        v
      };
      let vectors: Vec<Vec<f64>> = (0..k).map(embed).collect();
      let cluster_mu: Vec<f64> = vectors.iter().map(|v| dot(v, mu)).collect();
      let cluster_cov: Vec<Vec<f64>> = vectors
        .iter()
        .map(|va| {
          let sigma_a = mat_vec_mul(cov, va);
          vectors.iter().map(|vb| dot(&sigma_a, vb)).collect()
        })
        .collect();
      let (w, p) = risk_parity_block(chain, &cluster_mu, &cluster_cov, risk_free)?;
      note(p);
      w
    }
  };

  let mut weights = vec![0.0; n];
  for (c, members) in clusters.iter().enumerate() {
    for (&i, &w) in members.iter().zip(&intra[c]) {
      weights[i] = cluster_weights[c] * w;
    }
  }

  let provenance = match (fell_back, backend) {
    (false, Some(backend)) => Provenance::Solver { backend },
    _ => Provenance::EqualWeight,
  };

  Ok(HierarchicalAllocation {
    weights,
    provenance,
    clusters,
  })
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;

  use super::*;
  use crate::quant::portfolio::solver::BackendKind;
  use crate::quant::portfolio::solver::SolverSettings;

  #[test]
  fn merge_scans_lowest_index_pairs_first() {
    let corr = vec![
      vec![1.0, 0.6, 0.2, 0.0],
      vec![0.6, 1.0, 0.7, 0.0],
      vec![0.2, 0.7, 1.0, 0.1],
      vec![0.0, 0.0, 0.1, 1.0],
    ];
    assert_eq!(correlation_clusters(&corr, 0.5), vec![vec![0, 1, 2], vec![3]]);
    assert_eq!(correlation_clusters(&corr, 0.65), vec![vec![0], vec![1, 2], vec![3]]);
    assert_eq!(correlation_clusters(&corr, 0.9).len(), 4);
  }

  #[test]
  fn threshold_is_strict() {
    let corr = vec![vec![1.0, 0.5], vec![0.5, 1.0]];
    assert_eq!(correlation_clusters(&corr, 0.5).len(), 2);
  }

  fn block_market() -> (Vec<f64>, Vec<Vec<f64>>, Vec<Vec<f64>>) {
    let vols = [0.2, 0.25, 0.1, 0.3];
    let corr = vec![
      vec![1.0, 0.8, 0.1, 0.0],
      vec![0.8, 1.0, 0.0, 0.1],
      vec![0.1, 0.0, 1.0, 0.7],
      vec![0.0, 0.1, 0.7, 1.0],
    ];
    let cov = (0..4)
      .map(|i| (0..4).map(|j| vols[i] * vols[j] * corr[i][j]).collect())
      .collect();
    (vec![0.08, 0.1, 0.04, 0.12], cov, corr)
  }

  #[test]
  fn equal_capital_splits_budget_evenly() {
    let (mu, cov, corr) = block_market();
    let chain = SolverChain::new(&[BackendKind::ProjectedGradient], SolverSettings::default()).unwrap();
    let alloc = allocate(&chain, &mu, &cov, &corr, 0.02, 0.5, ClusterBudget::EqualCapital).unwrap();

    assert_eq!(alloc.clusters, vec![vec![0, 1], vec![2, 3]]);
    assert_relative_eq!(alloc.weights[0] + alloc.weights[1], 0.5, epsilon = 1e-9);
    assert_relative_eq!(alloc.weights[2] + alloc.weights[3], 0.5, epsilon = 1e-9);
    // Inside a two-asset cluster, risk parity gives inverse-volatility weights.
    assert_relative_eq!(alloc.weights[0] / alloc.weights[1], 0.25 / 0.2, epsilon = 1e-4);
  }

  #[test]
  fn equal_risk_budget_balances_cluster_contributions() {
    let (mu, cov, corr) = block_market();
    let chain = SolverChain::new(&[BackendKind::ProjectedGradient], SolverSettings::default()).unwrap();
    let alloc = allocate(&chain, &mu, &cov, &corr, 0.02, 0.5, ClusterBudget::EqualRisk).unwrap();

    let w = &alloc.weights;
    let sigma_w = mat_vec_mul(&cov, w);
    let rc: Vec<f64> = w.iter().zip(&sigma_w).map(|(a, b)| a * b).collect();
    assert_relative_eq!(rc[0] + rc[1], rc[2] + rc[3], max_relative = 1e-3);
    assert_relative_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
    assert!(matches!(alloc.provenance, Provenance::Solver { .. }));
  }
}
