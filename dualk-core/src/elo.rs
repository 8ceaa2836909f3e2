/// Sequential Dual-K Elo rating pass.
///
/// Two learning-rate terms interact on every update: a per-individual
/// adaptive term k1 that shrinks with experience, and a global scale k2.
/// Updates are applied strictly in the given order; each one reads the state
/// the previous one left behind.
use crate::constants::{
    DEFAULT_K1_FLOOR, DEFAULT_K_BASE, ELO_SCALE, INITIAL_ELO_RATING, MIN_EXPECTED_PROBABILITY,
};
use crate::error::{EloError, Result};
use crate::types::{Interaction, RatingState};

/// Probability that an individual rated `rating` beats one rated `opponent`.
pub fn expected_score(rating: f64, opponent: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf((opponent - rating) / ELO_SCALE))
}

/// Result of one full pass over an interaction ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct EloPass {
    pub state: RatingState,
    /// Pre-update expected probability that the observed winner wins, one per
    /// interaction, in the order the interactions were applied.
    pub expectations: Vec<f64>,
}

impl EloPass {
    /// Negative log-likelihood of the observed outcomes: -sum(ln p_winner).
    pub fn log_loss(&self) -> f64 {
        -self
            .expectations
            .iter()
            .map(|&p| p.max(MIN_EXPECTED_PROBABILITY).ln())
            .sum::<f64>()
    }
}

/// Dual-K Elo update rule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DualKElo {
    k_base: f64,
    k1_floor: f64,
    initial_rating: f64,
}

impl Default for DualKElo {
    fn default() -> Self {
        DualKElo::new(DEFAULT_K_BASE, DEFAULT_K1_FLOOR, INITIAL_ELO_RATING)
    }
}

impl DualKElo {
    pub fn new(k_base: f64, k1_floor: f64, initial_rating: f64) -> Self {
        DualKElo {
            k_base,
            k1_floor,
            initial_rating,
        }
    }

    pub fn initial_rating(&self) -> f64 {
        self.initial_rating
    }

    /// Adaptive term for an individual with `matches_played` prior matches.
    pub fn k1(&self, matches_played: u32) -> f64 {
        (self.k_base / (1.0 + matches_played as f64)).max(self.k1_floor)
    }

    /// Rate `interactions` in slice order.
    pub fn run(
        &self,
        num_individuals: usize,
        interactions: &[Interaction],
        k2: f64,
        initial: Option<&RatingState>,
    ) -> Result<EloPass> {
        self.run_sequence(num_individuals, interactions.iter(), k2, initial)
    }

    /// Rate `interactions` in the order given by `order` (indices into the
    /// slice). Used for permuted passes without copying the interactions.
    pub fn run_ordered(
        &self,
        num_individuals: usize,
        interactions: &[Interaction],
        order: &[usize],
        k2: f64,
    ) -> Result<EloPass> {
        self.run_sequence(
            num_individuals,
            order.iter().map(move |&i| &interactions[i]),
            k2,
            None,
        )
    }

    fn run_sequence<'a, I>(
        &self,
        num_individuals: usize,
        interactions: I,
        k2: f64,
        initial: Option<&RatingState>,
    ) -> Result<EloPass>
    where
        I: ExactSizeIterator<Item = &'a Interaction>,
    {
        if !k2.is_finite() || k2 < 0.0 {
            return Err(EloError::NumericOverflow(format!("k2 = {k2} is not a usable scale")));
        }

        let mut state = match initial {
            Some(s) if s.len() != num_individuals => {
                return Err(EloError::invalid(
                    "initial state",
                    format!("has {} individuals, dataset has {num_individuals}", s.len()),
                ));
            }
            Some(s) => s.clone(),
            None => RatingState::new(num_individuals, self.initial_rating),
        };

        let mut expectations = Vec::with_capacity(interactions.len());

        for interaction in interactions {
            let (w, l) = (interaction.winner, interaction.loser);
            for index in [w, l] {
                if index >= num_individuals {
                    return Err(EloError::UnknownIndividual {
                        sequence_index: interaction.sequence_index,
                        index,
                    });
                }
            }
            if w == l {
                return Err(EloError::SelfInteraction {
                    line: interaction.sequence_index + 1,
                    id: w.to_string(),
                });
            }

            let expected_w = expected_score(state.ratings[w], state.ratings[l]);
            let k1_combined = (self.k1(state.matches_played[w]) + self.k1(state.matches_played[l])) / 2.0;
            let delta = k2 * k1_combined * (1.0 - expected_w);

            state.ratings[w] += delta;
            state.ratings[l] -= delta;

            if !state.ratings[w].is_finite() || !state.ratings[l].is_finite() {
                return Err(EloError::NumericOverflow(format!(
                    "rating diverged at interaction {} (k2 = {k2})",
                    interaction.sequence_index
                )));
            }

            state.matches_played[w] += 1;
            state.matches_played[l] += 1;
            expectations.push(expected_w);
        }

        Ok(EloPass {
            state,
            expectations,
        })
    }
}
