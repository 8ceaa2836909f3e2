/// Dominance matrix, triad linearity and hierarchy steepness.
///
/// The analysis is restricted to the top-n individuals of the final ratings.
/// Triads are unordered 3-element combinations of that subset; each one is
/// classified independently, so classification runs in parallel and results
/// are merged in enumeration order.
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::constants::{TOP_N_MAX, TOP_N_MIN};
use crate::error::{EloError, Result};
use crate::types::{Dataset, RatingState};

/// Square table of win counts: `wins(i, j)` = times `i` beat `j`.
///
/// Rows and columns follow the dataset's sorted individual order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DominanceMatrix {
    size: usize,
    wins: Vec<u32>,
}

impl DominanceMatrix {
    pub fn from_dataset(dataset: &Dataset) -> Self {
        let size = dataset.num_individuals();
        let mut wins = vec![0; size * size];
        for interaction in dataset.interactions() {
            wins[interaction.winner * size + interaction.loser] += 1;
        }
        DominanceMatrix { size, wins }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn wins(&self, i: usize, j: usize) -> u32 {
        self.wins[i * self.size + j]
    }

    pub fn interactions_between(&self, i: usize, j: usize) -> u32 {
        self.wins(i, j) + self.wins(j, i)
    }

    /// Win counts of `i` against every individual.
    pub fn row(&self, i: usize) -> &[u32] {
        &self.wins[i * self.size..(i + 1) * self.size]
    }

    /// Proportion of the `i`–`j` interactions that `i` won; 0 if they never met.
    pub fn dominance_proportion(&self, i: usize, j: usize) -> f64 {
        match self.interactions_between(i, j) {
            0 => 0.0,
            total => self.wins(i, j) as f64 / total as f64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TriadClass {
    /// The three pairwise relations form a linear order.
    Transitive,
    /// A beats B, B beats C, C beats A.
    Circular,
    /// At least one pair is tied on both win counts and ratings.
    Undetermined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TriadResult {
    /// Individual indices, in top-n order.
    pub members: [usize; 3],
    pub class: TriadClass,
    /// Pair relations decided by ratings because win counts were level.
    pub inferred_pairs: usize,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HierarchyMetrics {
    /// Selected individuals, highest rated first.
    pub top: Vec<usize>,
    pub transitive: usize,
    pub circular: usize,
    pub undetermined: usize,
    /// Triads whose classification failed (excluded from every count above).
    pub failed: usize,
    /// Pair relations across all classified triads that came from ratings.
    pub inferred_relations: usize,
    /// transitive / (transitive + circular); `None` if both are zero.
    pub linearity_index: Option<f64>,
    /// Normalized David's scores, aligned with `top`.
    pub davids_scores: Vec<f64>,
    /// Absolute slope of the ranked normalized David's scores.
    pub steepness: Option<f64>,
    pub triads: Vec<TriadResult>,
}

pub struct HierarchyAnalyzer<'a> {
    matrix: &'a DominanceMatrix,
}

impl<'a> HierarchyAnalyzer<'a> {
    pub fn new(matrix: &'a DominanceMatrix) -> Self {
        HierarchyAnalyzer { matrix }
    }

    /// The `top_n` highest-rated individuals; rating ties go to the
    /// individual with more interactions. Fewer are returned if the dataset
    /// is smaller.
    pub fn select_top(state: &RatingState, top_n: usize) -> Vec<usize> {
        let mut order = state.order_by_rating();
        order.truncate(top_n);
        order
    }

    pub fn analyze(&self, state: &RatingState, top_n: usize) -> Result<HierarchyMetrics> {
        if !(TOP_N_MIN..=TOP_N_MAX).contains(&top_n) {
            return Err(EloError::invalid(
                "top-n",
                format!("must be between {TOP_N_MIN} and {TOP_N_MAX}, got {top_n}"),
            ));
        }
        if state.len() != self.matrix.size() {
            return Err(EloError::invalid(
                "ratings",
                format!("have {} individuals, matrix has {}", state.len(), self.matrix.size()),
            ));
        }

        let top = Self::select_top(state, top_n);
        let combos = triads(top.len());
        info!(selected = top.len(), triads = combos.len(), "classifying triads");

        let outcomes: Vec<Result<TriadResult>> = combos
            .par_iter()
            .map(|&[a, b, c]| self.classify([top[a], top[b], top[c]], &state.ratings))
            .collect();

        let mut metrics = HierarchyMetrics {
            top: top.clone(),
            transitive: 0,
            circular: 0,
            undetermined: 0,
            failed: 0,
            inferred_relations: 0,
            linearity_index: None,
            davids_scores: Vec::new(),
            steepness: None,
            triads: Vec::with_capacity(combos.len()),
        };

        for (combo, outcome) in combos.iter().zip(outcomes) {
            match outcome {
                Ok(triad) => {
                    match triad.class {
                        TriadClass::Transitive => metrics.transitive += 1,
                        TriadClass::Circular => metrics.circular += 1,
                        TriadClass::Undetermined => metrics.undetermined += 1,
                    }
                    metrics.inferred_relations += triad.inferred_pairs;
                    metrics.triads.push(triad);
                }
                Err(e) => {
                    warn!(?combo, error = %e, "triad classification failed; excluded");
                    metrics.failed += 1;
                }
            }
        }

        if !combos.is_empty() && metrics.failed == combos.len() {
            return Err(EloError::AllUnitsFailed {
                stage: "hierarchy",
                failed: metrics.failed,
            });
        }

        let classified = metrics.transitive + metrics.circular;
        metrics.linearity_index = (classified > 0).then(|| metrics.transitive as f64 / classified as f64);
        metrics.davids_scores = self.normalized_davids_scores(&top);
        metrics.steepness = steepness(&metrics.davids_scores);

        debug!(
            transitive = metrics.transitive,
            circular = metrics.circular,
            undetermined = metrics.undetermined,
            linearity = ?metrics.linearity_index,
            "hierarchy analyzed"
        );

        Ok(metrics)
    }

    /// `Some((dominant, inferred))` for a pair, `None` for a full tie.
    fn dominant(&self, x: usize, y: usize, ratings: &[f64]) -> Result<Option<(usize, bool)>> {
        let (wx, wy) = (self.matrix.wins(x, y), self.matrix.wins(y, x));
        if wx != wy {
            return Ok(Some((if wx > wy { x } else { y }, false)));
        }

        let (rx, ry) = (ratings[x], ratings[y]);
        if !rx.is_finite() || !ry.is_finite() {
            return Err(EloError::NumericOverflow(format!(
                "cannot compare non-finite ratings {rx} and {ry}"
            )));
        }
        Ok(if rx > ry {
            Some((x, true))
        } else if ry > rx {
            Some((y, true))
        } else {
            None
        })
    }

    fn classify(&self, members: [usize; 3], ratings: &[f64]) -> Result<TriadResult> {
        let mut dominations = [0usize; 3];
        let mut inferred_pairs = 0;
        let mut tied = false;

        for (x, y) in [(0, 1), (1, 2), (0, 2)] {
            match self.dominant(members[x], members[y], ratings)? {
                Some((winner, inferred)) => {
                    dominations[if winner == members[x] { x } else { y }] += 1;
                    inferred_pairs += inferred as usize;
                }
                None => tied = true,
            }
        }

        let class = if tied {
            TriadClass::Undetermined
        } else if dominations == [1, 1, 1] {
            TriadClass::Circular
        } else {
            TriadClass::Transitive
        };

        Ok(TriadResult {
            members,
            class,
            inferred_pairs,
        })
    }

    /// Normalized David's scores from dominance proportions within `subset`.
    pub fn normalized_davids_scores(&self, subset: &[usize]) -> Vec<f64> {
        let n = subset.len();
        if n == 0 {
            return Vec::new();
        }
        let p = |i: usize, j: usize| self.matrix.dominance_proportion(subset[i], subset[j]);

        let w: Vec<f64> = (0..n).map(|i| (0..n).filter(|&j| j != i).map(|j| p(i, j)).sum::<f64>()).collect();
        let l: Vec<f64> = (0..n).map(|i| (0..n).filter(|&j| j != i).map(|j| p(j, i)).sum::<f64>()).collect();

        let max_ds = (n * (n - 1)) as f64 / 2.0;
        (0..n)
            .map(|i| {
                let w2: f64 = (0..n).filter(|&j| j != i).map(|j| w[j] * p(i, j)).sum();
                let l2: f64 = (0..n).filter(|&j| j != i).map(|j| l[j] * p(j, i)).sum();
                let ds = w[i] + w2 - l[i] - l2;
                (ds + max_ds) / n as f64
            })
            .collect()
    }
}

/// All `[i, j, k]` with `i < j < k < n`.
fn triads(n: usize) -> Vec<[usize; 3]> {
    let mut out = Vec::new();
    for i in 0..n {
        for j in i + 1..n {
            for k in j + 1..n {
                out.push([i, j, k]);
            }
        }
    }
    out
}

/// Absolute least-squares slope of scores sorted descending against rank 1..N.
fn steepness(scores: &[f64]) -> Option<f64> {
    let n = scores.len();
    if n < 2 {
        return None;
    }
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));

    let mean_x = (n + 1) as f64 / 2.0;
    let mean_y = sorted.iter().sum::<f64>() / n as f64;
    let (mut sxy, mut sxx) = (0.0, 0.0);
    for (i, &y) in sorted.iter().enumerate() {
        let dx = (i + 1) as f64 - mean_x;
        sxy += dx * (y - mean_y);
        sxx += dx * dx;
    }
    Some((sxy / sxx).abs())
}
