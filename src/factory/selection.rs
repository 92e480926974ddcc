//! Threshold-gated best-model selection

use super::SearchResult;
use crate::error::{AutoMlError, Result};
use tracing::info;

/// Default acceptance floor for search and evaluation scores
pub const DEFAULT_BASE_ACCURACY: f64 = 0.6;

/// An acceptance bar that rises to every score it admits.
///
/// A score is admitted only if it is strictly greater than the current bar,
/// so a later score equal to an earlier winner never replaces it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ratchet {
    threshold: f64,
}

impl Ratchet {
    pub fn new(base: f64) -> Self {
        Self { threshold: base }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn admits(&self, score: f64) -> bool {
        score > self.threshold
    }

    pub fn raise_to(&mut self, score: f64) {
        self.threshold = score;
    }

    /// Admit and raise in one step
    pub fn offer(&mut self, score: f64) -> bool {
        if self.admits(score) {
            self.raise_to(score);
            true
        } else {
            false
        }
    }
}

/// A search result that cleared the ratcheting threshold
#[derive(Debug, Clone)]
pub struct SelectedModel {
    pub result: SearchResult,
    /// Position of the winner in the searched list
    pub index: usize,
}

/// Index of the score the ratchet admits last, if any
pub fn select_best_index<I>(scores: I, base_accuracy: f64) -> Option<usize>
where
    I: IntoIterator<Item = f64>,
{
    let mut ratchet = Ratchet::new(base_accuracy);
    let mut best = None;
    for (idx, score) in scores.into_iter().enumerate() {
        if ratchet.offer(score) {
            best = Some(idx);
        }
    }
    best
}

/// Pick the highest-scoring result above `base_accuracy`.
///
/// Results are visited in order with a ratcheting threshold; fails with
/// `NoAcceptableModel` when nothing clears the floor.
pub fn select_best(results: Vec<SearchResult>, base_accuracy: f64) -> Result<SelectedModel> {
    let index = select_best_index(results.iter().map(|r| r.best_score), base_accuracy)
        .ok_or(AutoMlError::NoAcceptableModel {
            threshold: base_accuracy,
        })?;

    let result = results
        .into_iter()
        .nth(index)
        .ok_or(AutoMlError::NoAcceptableModel {
            threshold: base_accuracy,
        })?;

    info!(
        serial_id = %result.serial_id,
        model = %result.model_name,
        score = result.best_score,
        base_accuracy,
        "Selected best model"
    );

    Ok(SelectedModel { result, index })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_picks_maximum_above_floor() {
        assert_eq!(select_best_index(vec![0.5, 0.7, 0.65, 0.9, 0.3], 0.6), Some(3));
    }

    #[test]
    fn test_equal_scores_keep_first() {
        assert_eq!(select_best_index(vec![0.7, 0.7], 0.6), Some(0));
    }

    #[test]
    fn test_nothing_above_floor() {
        assert_eq!(select_best_index(vec![0.1, 0.2], 0.6), None);
        assert_eq!(select_best_index(vec![0.6], 0.6), None);
        assert_eq!(select_best_index(Vec::new(), 0.6), None);
    }

    #[test]
    fn test_nan_never_admitted() {
        assert_eq!(select_best_index(vec![f64::NAN, 0.8, f64::NAN], 0.6), Some(1));
    }

    #[test]
    fn test_winner_independent_of_floor() {
        let scores = vec![0.62, 0.91, 0.75, 0.88];
        let winners: Vec<Option<usize>> = [0.0, 0.3, 0.6, 0.9]
            .iter()
            .map(|&floor| select_best_index(scores.clone(), floor))
            .collect();
        assert!(winners.iter().all(|w| *w == Some(1)));
    }

    #[test]
    fn test_ratchet_raises_threshold() {
        let mut ratchet = Ratchet::new(0.6);
        assert!(ratchet.offer(0.7));
        assert_eq!(ratchet.threshold(), 0.7);
        assert!(!ratchet.offer(0.65));
        assert!(!ratchet.offer(0.7));
        assert_eq!(ratchet.threshold(), 0.7);
    }
}
