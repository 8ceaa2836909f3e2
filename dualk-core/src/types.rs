use std::collections::{BTreeSet, HashMap};

use crate::error::{EloError, Result};

/// One observed outcome: `winner` beat `loser`.
///
/// Individuals are dense indices into [`Dataset::individuals`].
/// `sequence_index` is the original row position (0-based, header excluded).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Interaction {
    pub winner: usize,
    pub loser: usize,
    pub sequence_index: usize,
}

/// Ordered interactions plus the sorted set of individuals they mention.
///
/// The individual set is the union of winners and losers, sorted, and is the
/// index space for every rating vector produced downstream.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dataset {
    individuals: Vec<String>,
    interactions: Vec<Interaction>,
}

impl Dataset {
    /// Build a dataset from `(winner, loser)` ID pairs in observation order.
    pub fn from_pairs<S: AsRef<str>>(pairs: &[(S, S)]) -> Result<Self> {
        let rows: Vec<(usize, String, String)> = pairs
            .iter()
            .enumerate()
            .map(|(i, (w, l))| (i + 1, w.as_ref().to_string(), l.as_ref().to_string()))
            .collect();
        Self::from_rows(rows)
    }

    /// Build a dataset from `(line, winner, loser)` rows. `line` is only used
    /// for error messages.
    pub(crate) fn from_rows(rows: Vec<(usize, String, String)>) -> Result<Self> {
        if rows.is_empty() {
            return Err(EloError::EmptyDataset);
        }

        for (line, winner, loser) in &rows {
            if winner == loser {
                return Err(EloError::SelfInteraction {
                    line: *line,
                    id: winner.clone(),
                });
            }
        }

        let individuals: Vec<String> = rows
            .iter()
            .flat_map(|(_, w, l)| [w.as_str(), l.as_str()])
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect();

        let id_map = IdMap::from_ids(&individuals);
        let interactions = rows
            .iter()
            .enumerate()
            .map(|(sequence_index, (_, w, l))| Interaction {
                winner: id_map.index_of(w),
                loser: id_map.index_of(l),
                sequence_index,
            })
            .collect();

        Ok(Dataset {
            individuals,
            interactions,
        })
    }

    /// Sorted individual IDs. Position = index used everywhere else.
    pub fn individuals(&self) -> &[String] {
        &self.individuals
    }

    pub fn interactions(&self) -> &[Interaction] {
        &self.interactions
    }

    pub fn num_individuals(&self) -> usize {
        self.individuals.len()
    }

    pub fn num_interactions(&self) -> usize {
        self.interactions.len()
    }

    pub fn id(&self, index: usize) -> &str {
        &self.individuals[index]
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.individuals.binary_search_by(|probe| probe.as_str().cmp(id)).ok()
    }

    /// Raw win and loss totals per individual.
    pub fn win_loss_counts(&self) -> Vec<(usize, usize)> {
        let mut counts = vec![(0, 0); self.individuals.len()];
        for interaction in &self.interactions {
            counts[interaction.winner].0 += 1;
            counts[interaction.loser].1 += 1;
        }
        counts
    }
}

/// Maps string IDs to dense indices while the dataset is being assembled.
struct IdMap<'a> {
    id_to_idx: HashMap<&'a str, usize>,
}

impl<'a> IdMap<'a> {
    fn from_ids(ids: &'a [String]) -> Self {
        let id_to_idx = ids
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.as_str(), idx))
            .collect();
        IdMap { id_to_idx }
    }

    fn index_of(&self, id: &str) -> usize {
        // Every ID was inserted from the same rows.
        self.id_to_idx[id]
    }
}

/// Ratings and experience counts, indexed like [`Dataset::individuals`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RatingState {
    pub ratings: Vec<f64>,
    pub matches_played: Vec<u32>,
}

impl RatingState {
    pub fn new(num_individuals: usize, initial_rating: f64) -> Self {
        RatingState {
            ratings: vec![initial_rating; num_individuals],
            matches_played: vec![0; num_individuals],
        }
    }

    pub fn len(&self) -> usize {
        self.ratings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ratings.is_empty()
    }

    /// 1-based competition ranks by rating, highest first. Exactly equal
    /// ratings share a rank.
    pub fn ranks(&self) -> Vec<usize> {
        let order = self.order_by_rating();
        let mut ranks = vec![0; self.ratings.len()];
        for (pos, &idx) in order.iter().enumerate() {
            ranks[idx] = if pos > 0 && self.ratings[order[pos - 1]] == self.ratings[idx] {
                ranks[order[pos - 1]]
            } else {
                pos + 1
            };
        }
        ranks
    }

    /// Indices sorted by rating descending; ties go to the individual with
    /// more matches, then to the lower index.
    pub fn order_by_rating(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.ratings.len()).collect();
        order.sort_by(|&a, &b| {
            self.ratings[b]
                .total_cmp(&self.ratings[a])
                .then_with(|| self.matches_played[b].cmp(&self.matches_played[a]))
                .then_with(|| a.cmp(&b))
        });
        order
    }
}

/// How hard the k2 optimizer searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OptimizationLevel {
    /// Keep the seed.
    #[default]
    None,
    /// Pattern search around the seed.
    Local,
    /// Coarse grid over the whole domain, refined from several starts.
    Global,
}

impl TryFrom<u8> for OptimizationLevel {
    type Error = EloError;

    fn try_from(level: u8) -> Result<Self> {
        match level {
            0 => Ok(OptimizationLevel::None),
            1 => Ok(OptimizationLevel::Local),
            2 => Ok(OptimizationLevel::Global),
            other => Err(EloError::invalid(
                "optimization-level",
                format!("expected 0, 1 or 2, got {other}"),
            )),
        }
    }
}

impl From<OptimizationLevel> for u8 {
    fn from(level: OptimizationLevel) -> u8 {
        match level {
            OptimizationLevel::None => 0,
            OptimizationLevel::Local => 1,
            OptimizationLevel::Global => 2,
        }
    }
}
