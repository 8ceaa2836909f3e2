/// Search for the global scale k2 that best predicts the observed outcomes.
///
/// The search runs in log space (`k2 = exp(log_k2)`). Loss is the negative
/// log-likelihood of a full rating pass at the candidate scale. Every
/// candidate is an independent pass, so each batch of candidates is evaluated
/// in parallel and merged in candidate order.
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::constants::{
    GLOBAL_GRID_POINTS, GLOBAL_MAX_STARTS, LOCAL_INITIAL_STEP, LOCAL_MAX_ITERATIONS,
    LOCAL_STENCIL_HALF_WIDTH, LOCAL_STEP_TOLERANCE, LOG_K2_MAX, LOG_K2_MIN, LOSS_TIE_EPSILON,
};
use crate::elo::{DualKElo, EloPass};
use crate::error::{EloError, Result};
use crate::types::{Dataset, OptimizationLevel};

/// How the search ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SearchStatus {
    /// Level 0: the seed is returned without searching.
    Skipped,
    /// Improved on the seed and every refinement reached the step tolerance.
    Converged,
    /// Improved on the seed but at least one refinement ran out of iterations.
    BudgetExhausted,
    /// Nothing beat the seed; the seed is returned.
    NoImprovement,
}

/// Which part of the search produced a trajectory point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SearchPhase {
    Seed,
    Grid,
    Refine,
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrajectoryPoint {
    pub phase: SearchPhase,
    /// Refinement start this point belongs to (0 = the seed). Always 0 for
    /// seed and grid points.
    pub start: usize,
    pub iteration: usize,
    /// Best position of this start after the iteration.
    pub log_k2: f64,
    pub loss: f64,
    /// Pattern step after the iteration. 0 for seed and grid points.
    pub step: f64,
}

/// Outcome of the k2 search. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OptimizationResult {
    pub level: OptimizationLevel,
    pub initial_log_k2: f64,
    /// Loss at the seed. `None` when the seed pass itself failed.
    pub initial_loss: Option<f64>,
    pub log_k2: f64,
    pub k2: f64,
    pub loss: f64,
    pub status: SearchStatus,
    pub evaluations: usize,
    pub failed_evaluations: usize,
    /// Empty at level 0.
    pub trajectory: Vec<TrajectoryPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    log_k2: f64,
    loss: f64,
}

/// Work done by one refinement start.
struct LocalOutcome {
    best: Option<Candidate>,
    trajectory: Vec<TrajectoryPoint>,
    evaluations: usize,
    failures: usize,
    converged: bool,
}

pub struct KOptimizer<'a> {
    elo: &'a DualKElo,
    dataset: &'a Dataset,
}

impl<'a> KOptimizer<'a> {
    pub fn new(elo: &'a DualKElo, dataset: &'a Dataset) -> Self {
        KOptimizer { elo, dataset }
    }

    /// Loss of a full rating pass at `k2 = exp(log_k2)`.
    pub fn loss_at(&self, log_k2: f64) -> Result<f64> {
        let pass = self.elo.run(
            self.dataset.num_individuals(),
            self.dataset.interactions(),
            log_k2.exp(),
            None,
        )?;
        checked_loss(&pass, log_k2)
    }

    pub fn optimize(&self, initial_log_k2: f64, level: OptimizationLevel) -> Result<OptimizationResult> {
        if !initial_log_k2.is_finite() {
            return Err(EloError::invalid("initial-k2", format!("{initial_log_k2} is not finite")));
        }
        self.optimize_from(initial_log_k2, level, self.loss_at(initial_log_k2))
    }

    /// Like [`optimize`](Self::optimize), for a caller that already ran the
    /// seed pass. A failed seed is fatal at level 0 and one failed candidate
    /// otherwise.
    pub fn optimize_from(
        &self,
        initial_log_k2: f64,
        level: OptimizationLevel,
        seed_loss: Result<f64>,
    ) -> Result<OptimizationResult> {
        if !initial_log_k2.is_finite() {
            return Err(EloError::invalid("initial-k2", format!("{initial_log_k2} is not finite")));
        }

        info!(initial_log_k2, ?level, "optimizing k2");

        if level == OptimizationLevel::None {
            let loss = seed_loss?;
            return Ok(OptimizationResult {
                level,
                initial_log_k2,
                initial_loss: Some(loss),
                log_k2: initial_log_k2,
                k2: initial_log_k2.exp(),
                loss,
                status: SearchStatus::Skipped,
                evaluations: 1,
                failed_evaluations: 0,
                trajectory: Vec::new(),
            });
        }

        let bounds = (LOG_K2_MIN.min(initial_log_k2), LOG_K2_MAX.max(initial_log_k2));

        let mut evaluations = 1;
        let mut failed_evaluations = 0;
        let mut trajectory = Vec::new();

        let seed = match seed_loss {
            Ok(loss) => {
                trajectory.push(TrajectoryPoint {
                    phase: SearchPhase::Seed,
                    start: 0,
                    iteration: 0,
                    log_k2: initial_log_k2,
                    loss,
                    step: 0.0,
                });
                Some(Candidate { log_k2: initial_log_k2, loss })
            }
            Err(e) => {
                warn!(error = %e, "seed evaluation failed; searching without it");
                failed_evaluations += 1;
                None
            }
        };

        // (log_k2, known loss) of every refinement start; the seed is always first.
        let mut starts: Vec<(f64, Option<Candidate>)> = vec![(initial_log_k2, seed)];
        let mut best = seed;

        if level == OptimizationLevel::Global {
            let grid = linspace(bounds.0, bounds.1, GLOBAL_GRID_POINTS);
            let results = self.evaluate_all(&grid);
            evaluations += grid.len();

            let losses: Vec<f64> = results
                .iter()
                .map(|r| r.as_ref().copied().unwrap_or(f64::INFINITY))
                .collect();
            for (&log_k2, result) in grid.iter().zip(&results) {
                match result {
                    Ok(loss) => {
                        trajectory.push(TrajectoryPoint {
                            phase: SearchPhase::Grid,
                            start: 0,
                            iteration: 0,
                            log_k2,
                            loss: *loss,
                            step: 0.0,
                        });
                        best = pick(best, Some(Candidate { log_k2, loss: *loss }), initial_log_k2);
                    }
                    Err(e) => {
                        debug!(log_k2, error = %e, "grid candidate failed");
                        failed_evaluations += 1;
                    }
                }
            }

            for idx in grid_local_minima(&losses).into_iter().take(GLOBAL_MAX_STARTS) {
                if grid[idx] != initial_log_k2 {
                    starts.push((grid[idx], Some(Candidate { log_k2: grid[idx], loss: losses[idx] })));
                }
            }
            debug!(starts = starts.len(), "refining from grid minima");
        }

        let outcomes: Vec<LocalOutcome> = starts
            .par_iter()
            .enumerate()
            .map(|(start, &(log_k2, known))| self.local_search(start, log_k2, known, bounds, initial_log_k2))
            .collect();

        let mut all_converged = true;
        for outcome in outcomes {
            evaluations += outcome.evaluations;
            failed_evaluations += outcome.failures;
            all_converged &= outcome.converged;
            trajectory.extend(outcome.trajectory);
            best = pick(best, outcome.best, initial_log_k2);
        }

        let Some(best) = best else {
            return Err(EloError::AllUnitsFailed {
                stage: "optimizer",
                failed: failed_evaluations,
            });
        };

        if failed_evaluations > 0 {
            warn!(failed_evaluations, evaluations, "some k2 candidates failed and were skipped");
        }

        let improved = match seed {
            Some(seed) => best.loss < seed.loss - tie_tolerance(seed.loss),
            None => true,
        };

        let (chosen, status) = match (improved, seed) {
            (false, Some(seed)) => {
                warn!(log_k2 = initial_log_k2, "search did not improve on the seed; keeping it");
                (seed, SearchStatus::NoImprovement)
            }
            _ if all_converged => (best, SearchStatus::Converged),
            _ => {
                warn!("search budget exhausted before convergence; using best value found");
                (best, SearchStatus::BudgetExhausted)
            }
        };

        info!(log_k2 = chosen.log_k2, loss = chosen.loss, ?status, evaluations, "k2 optimized");

        Ok(OptimizationResult {
            level,
            initial_log_k2,
            initial_loss: seed.map(|s| s.loss),
            log_k2: chosen.log_k2,
            k2: chosen.log_k2.exp(),
            loss: chosen.loss,
            status,
            evaluations,
            failed_evaluations,
            trajectory,
        })
    }

    /// Evaluate candidates in parallel. Results keep the order of `points`.
    fn evaluate_all(&self, points: &[f64]) -> Vec<Result<f64>> {
        points.par_iter().map(|&log_k2| self.loss_at(log_k2)).collect()
    }

    /// Pattern search from one start. The center only moves on a strict
    /// improvement, so its loss never increases.
    fn local_search(
        &self,
        start: usize,
        from: f64,
        known: Option<Candidate>,
        bounds: (f64, f64),
        seed: f64,
    ) -> LocalOutcome {
        let mut center = known;
        let mut position = from;
        let mut step = LOCAL_INITIAL_STEP;
        let mut evaluations = 0;
        let mut failures = 0;
        let mut trajectory = Vec::new();
        let mut converged = false;

        for iteration in 1..=LOCAL_MAX_ITERATIONS {
            if step < LOCAL_STEP_TOLERANCE {
                converged = true;
                break;
            }

            let stencil = stencil(position, step, bounds);
            let results = self.evaluate_all(&stencil);
            evaluations += stencil.len();

            let mut best_new = None;
            for (&log_k2, result) in stencil.iter().zip(results) {
                match result {
                    Ok(loss) => best_new = pick(best_new, Some(Candidate { log_k2, loss }), seed),
                    Err(_) => failures += 1,
                }
            }

            let moved = match (center, best_new) {
                (Some(c), Some(n)) => n.loss < c.loss - tie_tolerance(c.loss),
                (None, Some(_)) => true,
                _ => false,
            };
            if moved {
                center = best_new;
                position = best_new.map_or(position, |c| c.log_k2);
            } else {
                step *= 0.5;
            }

            if let Some(c) = center {
                debug!(start, iteration, log_k2 = c.log_k2, loss = c.loss, step, "pattern step");
                trajectory.push(TrajectoryPoint {
                    phase: SearchPhase::Refine,
                    start,
                    iteration,
                    log_k2: c.log_k2,
                    loss: c.loss,
                    step,
                });
            }
        }

        converged |= step < LOCAL_STEP_TOLERANCE;

        LocalOutcome {
            best: center,
            trajectory,
            evaluations,
            failures,
            converged,
        }
    }
}

/// Loss of a finished pass; a non-finite loss counts as a failed evaluation.
pub(crate) fn checked_loss(pass: &EloPass, log_k2: f64) -> Result<f64> {
    let loss = pass.log_loss();
    if loss.is_finite() {
        Ok(loss)
    } else {
        Err(EloError::NumericOverflow(format!("loss at log_k2 = {log_k2} is {loss}")))
    }
}

fn tie_tolerance(loss: f64) -> f64 {
    LOSS_TIE_EPSILON * loss.abs().max(1.0)
}

/// Lower loss wins; near-equal losses go to the candidate nearer `seed`.
fn pick(current: Option<Candidate>, challenger: Option<Candidate>, seed: f64) -> Option<Candidate> {
    match (current, challenger) {
        (None, c) | (c, None) => c,
        (Some(a), Some(b)) => {
            if (a.loss - b.loss).abs() <= tie_tolerance(a.loss) {
                if (b.log_k2 - seed).abs() < (a.log_k2 - seed).abs() {
                    Some(b)
                } else {
                    Some(a)
                }
            } else if b.loss < a.loss {
                Some(b)
            } else {
                Some(a)
            }
        }
    }
}

/// `center ± step·m` for m in 1..=half-width, clamped to `bounds`, without
/// duplicates or the center itself.
fn stencil(center: f64, step: f64, bounds: (f64, f64)) -> Vec<f64> {
    let mut points: Vec<f64> = Vec::with_capacity(2 * LOCAL_STENCIL_HALF_WIDTH);
    for m in 1..=LOCAL_STENCIL_HALF_WIDTH {
        for offset in [-(m as f64) * step, m as f64 * step] {
            let p = (center + offset).clamp(bounds.0, bounds.1);
            if p != center && !points.contains(&p) {
                points.push(p);
            }
        }
    }
    points
}

fn linspace(lo: f64, hi: f64, n: usize) -> Vec<f64> {
    if n < 2 {
        return vec![lo];
    }
    let width = (hi - lo) / (n - 1) as f64;
    (0..n).map(|i| if i == n - 1 { hi } else { lo + width * i as f64 }).collect()
}

/// Indices of finite grid losses no greater than their neighbors, best first.
fn grid_local_minima(losses: &[f64]) -> Vec<usize> {
    let mut minima: Vec<usize> = (0..losses.len())
        .filter(|&i| {
            let here = losses[i];
            here.is_finite()
                && (i == 0 || here <= losses[i - 1])
                && (i + 1 == losses.len() || here <= losses[i + 1])
        })
        .collect();
    minima.sort_by(|&a, &b| losses[a].total_cmp(&losses[b]).then(a.cmp(&b)));
    minima
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_INITIAL_LOG_K2;

    fn dataset() -> Dataset {
        // Mostly consistent A > B > C > D with a few upsets.
        let pairs = [
            ("A", "B"), ("B", "C"), ("C", "D"), ("A", "C"), ("B", "D"), ("A", "D"),
            ("B", "A"), ("A", "B"), ("C", "B"), ("B", "C"), ("A", "D"), ("D", "C"),
            ("C", "D"), ("A", "C"), ("B", "D"), ("A", "B"),
        ];
        Dataset::from_pairs(&pairs).unwrap()
    }

    #[test]
    fn test_level_zero_returns_seed_exactly() {
        let ds = dataset();
        let elo = DualKElo::default();
        let result = KOptimizer::new(&elo, &ds)
            .optimize(DEFAULT_INITIAL_LOG_K2, OptimizationLevel::None)
            .unwrap();
        assert_eq!(result.k2, DEFAULT_INITIAL_LOG_K2.exp());
        assert_eq!(result.log_k2, DEFAULT_INITIAL_LOG_K2);
        assert_eq!(result.status, SearchStatus::Skipped);
        assert_eq!(result.evaluations, 1);
        assert!(result.trajectory.is_empty());
        assert_eq!(result.initial_loss, Some(result.loss));
    }

    #[test]
    fn test_local_search_never_worsens_loss() {
        let ds = dataset();
        let elo = DualKElo::default();
        let opt = KOptimizer::new(&elo, &ds);
        for seed in [1.0, DEFAULT_INITIAL_LOG_K2, 8.5] {
            let result = opt.optimize(seed, OptimizationLevel::Local).unwrap();
            let initial = result.initial_loss.unwrap();
            assert!(result.loss <= initial, "seed {seed}: {} > {initial}", result.loss);
            assert!((opt.loss_at(result.log_k2).unwrap() - result.loss).abs() < 1e-9);
        }
    }

    #[test]
    fn test_refinement_trajectory_is_monotone() {
        let ds = dataset();
        let elo = DualKElo::default();
        let result = KOptimizer::new(&elo, &ds)
            .optimize(9.0, OptimizationLevel::Local)
            .unwrap();
        let refine: Vec<f64> = result
            .trajectory
            .iter()
            .filter(|p| p.phase == SearchPhase::Refine)
            .map(|p| p.loss)
            .collect();
        assert!(!refine.is_empty());
        for pair in refine.windows(2) {
            assert!(pair[1] <= pair[0]);
        }
    }

    #[test]
    fn test_global_at_least_as_good_as_local() {
        let ds = dataset();
        let elo = DualKElo::default();
        let opt = KOptimizer::new(&elo, &ds);
        let local = opt.optimize(9.5, OptimizationLevel::Local).unwrap();
        let global = opt.optimize(9.5, OptimizationLevel::Global).unwrap();
        assert!(global.loss <= local.loss + 1e-9);
        assert!(global.loss <= global.initial_loss.unwrap());
        assert!(global.trajectory.iter().any(|p| p.phase == SearchPhase::Grid));
        assert!(global.evaluations > GLOBAL_GRID_POINTS);
    }

    #[test]
    fn test_result_stays_in_domain() {
        let ds = dataset();
        let elo = DualKElo::default();
        let result = KOptimizer::new(&elo, &ds)
            .optimize(DEFAULT_INITIAL_LOG_K2, OptimizationLevel::Global)
            .unwrap();
        assert!(result.log_k2 >= LOG_K2_MIN && result.log_k2 <= LOG_K2_MAX);
        assert_eq!(result.k2, result.log_k2.exp());
    }

    #[test]
    fn test_non_finite_seed_rejected() {
        let ds = dataset();
        let elo = DualKElo::default();
        let err = KOptimizer::new(&elo, &ds)
            .optimize(f64::NAN, OptimizationLevel::Local)
            .unwrap_err();
        assert!(matches!(err, EloError::InvalidParameter { .. }));
    }

    #[test]
    fn test_global_recovers_from_overflowing_seed() {
        // exp(800) is not representable, so the seed pass fails; the grid
        // still spans usable scales below it.
        let ds = dataset();
        let elo = DualKElo::default();
        let result = KOptimizer::new(&elo, &ds)
            .optimize(800.0, OptimizationLevel::Global)
            .unwrap();
        assert_eq!(result.initial_loss, None);
        assert!(result.failed_evaluations > 0);
        assert!(result.failed_evaluations < result.evaluations);
        assert!(result.loss.is_finite());
        assert!(result.k2.is_finite());
        assert_ne!(result.status, SearchStatus::NoImprovement);
        assert!(result.trajectory.iter().all(|p| p.phase != SearchPhase::Seed));
    }

    #[test]
    fn test_overflowing_seed_is_fatal_without_search() {
        let ds = dataset();
        let elo = DualKElo::default();
        let err = KOptimizer::new(&elo, &ds)
            .optimize(800.0, OptimizationLevel::None)
            .unwrap_err();
        assert!(matches!(err, EloError::NumericOverflow(_)));
    }

    #[test]
    fn test_optimize_from_reuses_known_seed_loss() {
        let ds = dataset();
        let elo = DualKElo::default();
        let opt = KOptimizer::new(&elo, &ds);
        let seed_loss = opt.loss_at(DEFAULT_INITIAL_LOG_K2).unwrap();
        let from = opt
            .optimize_from(DEFAULT_INITIAL_LOG_K2, OptimizationLevel::Local, Ok(seed_loss))
            .unwrap();
        let direct = opt.optimize(DEFAULT_INITIAL_LOG_K2, OptimizationLevel::Local).unwrap();
        assert_eq!(from, direct);
    }

    #[test]
    fn test_pick_prefers_seed_on_tie() {
        let near = Candidate { log_k2: 5.0, loss: 1.0 };
        let far = Candidate { log_k2: 8.0, loss: 1.0 };
        assert_eq!(pick(Some(far), Some(near), 5.2), Some(near));
        assert_eq!(pick(Some(near), Some(far), 5.2), Some(near));
        let better = Candidate { log_k2: 8.0, loss: 0.5 };
        assert_eq!(pick(Some(near), Some(better), 5.2), Some(better));
    }

    #[test]
    fn test_stencil_clamps_and_dedups() {
        let points = stencil(0.25, 0.5, (0.0, 10.0));
        assert!(points.iter().all(|&p| (0.0..=10.0).contains(&p)));
        assert_eq!(points.iter().filter(|&&p| p == 0.0).count(), 1);
        assert!(points.contains(&0.75));
        assert!(points.contains(&2.25));
        assert!(!points.contains(&0.25));
        assert_eq!(points.len(), 5);
    }

    #[test]
    fn test_grid_local_minima() {
        let losses = [3.0, 2.0, 2.5, 1.0, 4.0, f64::INFINITY, 0.5];
        assert_eq!(grid_local_minima(&losses), vec![6, 3, 1]);
    }

    #[test]
    fn test_linspace_endpoints() {
        let grid = linspace(0.0, 10.0, 41);
        assert_eq!(grid.len(), 41);
        assert_eq!(grid[0], 0.0);
        assert_eq!(grid[40], 10.0);
        assert!((grid[20] - 5.0).abs() < 1e-12);
    }
}
