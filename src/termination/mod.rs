//! Termination criteria
//!
//! Every evolving unit (deme or master) stops when it reaches its
//! generation budget or, if configured, when its best fitness stagnates.

use serde::{Deserialize, Serialize};

use crate::error::{config_error, EvoResult};

/// Why an evolving unit stopped
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConvergedReason {
    /// The generation budget was used up
    MaxGenerations,
    /// The best fitness stopped improving
    Stagnation,
    /// A stop was requested from outside
    Cancelled,
}

/// Evolution state for termination checking
#[derive(Clone, Debug)]
pub struct EvolutionState<'a> {
    /// Generations completed so far
    pub generation: usize,
    /// Best fitness of the current population
    pub best_fitness: f64,
    /// History of best fitness values, one per completed generation
    pub fitness_history: &'a [f64],
}

/// Termination criterion trait
pub trait TerminationCriterion: Send + Sync {
    /// Check if evolution should terminate
    fn should_terminate(&self, state: &EvolutionState<'_>) -> bool;

    /// Reason reported when this criterion fires
    fn reason(&self) -> ConvergedReason;
}

/// Terminate after a maximum number of generations
#[derive(Clone, Debug)]
pub struct MaxGenerations(pub usize);

impl MaxGenerations {
    /// Create a new max generations criterion
    pub fn new(max: usize) -> Self {
        Self(max)
    }
}

impl TerminationCriterion for MaxGenerations {
    fn should_terminate(&self, state: &EvolutionState<'_>) -> bool {
        state.generation >= self.0
    }

    fn reason(&self) -> ConvergedReason {
        ConvergedReason::MaxGenerations
    }
}

/// Terminate when fitness improvement stagnates
///
/// Fires once the best fitness has improved by no more than `epsilon`
/// over the last `window` generations.
#[derive(Clone, Debug)]
pub struct FitnessStagnation {
    /// Number of generations to look back
    pub window: usize,
    /// Minimum improvement threshold
    pub epsilon: f64,
}

impl FitnessStagnation {
    /// Create a new fitness stagnation criterion
    pub fn new(window: usize, epsilon: f64) -> Self {
        Self { window, epsilon }
    }
}

impl TerminationCriterion for FitnessStagnation {
    fn should_terminate(&self, state: &EvolutionState<'_>) -> bool {
        let history = state.fitness_history;
        if self.window == 0 || history.len() <= self.window {
            return false;
        }

        let last = history[history.len() - 1];
        let reference = history[history.len() - 1 - self.window];
        last - reference <= self.epsilon
    }

    fn reason(&self) -> ConvergedReason {
        ConvergedReason::Stagnation
    }
}

/// Stagnation settings as they appear in configuration
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StagnationPolicy {
    /// Number of generations to look back
    pub window: usize,
    /// Minimum improvement threshold
    pub epsilon: f64,
}

impl StagnationPolicy {
    /// Check the window and threshold
    pub fn validate(&self) -> EvoResult<()> {
        if self.window == 0 {
            return Err(config_error("stagnation window must be at least 1"));
        }
        if !self.epsilon.is_finite() || self.epsilon < 0.0 {
            return Err(config_error(format!(
                "stagnation epsilon must be finite and non-negative, got {}",
                self.epsilon
            )));
        }
        Ok(())
    }
}

/// The termination rules applied by a single evolving unit
#[derive(Clone, Debug)]
pub struct TerminationPolicy {
    max_generations: MaxGenerations,
    stagnation: Option<FitnessStagnation>,
}

impl TerminationPolicy {
    /// Stop after `max_generations`, optionally on stagnation too
    pub fn new(max_generations: usize, stagnation: Option<StagnationPolicy>) -> Self {
        Self {
            max_generations: MaxGenerations::new(max_generations),
            stagnation: stagnation.map(|s| FitnessStagnation::new(s.window, s.epsilon)),
        }
    }

    /// The generation budget
    pub fn max_generations(&self) -> usize {
        self.max_generations.0
    }

    /// First criterion that fires, generation budget first
    pub fn check(&self, state: &EvolutionState<'_>) -> Option<ConvergedReason> {
        if self.max_generations.should_terminate(state) {
            return Some(self.max_generations.reason());
        }
        self.stagnation
            .as_ref()
            .filter(|s| s.should_terminate(state))
            .map(|s| s.reason())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(generation: usize, history: &[f64]) -> EvolutionState<'_> {
        EvolutionState {
            generation,
            best_fitness: history.last().copied().unwrap_or(f64::NEG_INFINITY),
            fitness_history: history,
        }
    }

    #[test]
    fn test_max_generations() {
        let criterion = MaxGenerations::new(10);
        assert!(!criterion.should_terminate(&state(5, &[])));
        assert!(criterion.should_terminate(&state(10, &[])));
        assert!(criterion.should_terminate(&state(15, &[])));
    }

    #[test]
    fn test_fitness_stagnation() {
        let criterion = FitnessStagnation::new(3, 0.01);

        let improving = [1.0, 2.0, 3.0, 4.0];
        assert!(!criterion.should_terminate(&state(4, &improving)));

        let flat = [1.0, 5.0, 5.0, 5.0, 5.0];
        assert!(criterion.should_terminate(&state(5, &flat)));
    }

    #[test]
    fn test_fitness_stagnation_needs_full_window() {
        let criterion = FitnessStagnation::new(3, 0.01);
        assert!(!criterion.should_terminate(&state(3, &[5.0, 5.0, 5.0])));
    }

    #[test]
    fn test_policy_prefers_max_generations() {
        let policy = TerminationPolicy::new(
            4,
            Some(StagnationPolicy {
                window: 2,
                epsilon: 0.0,
            }),
        );
        let flat = [1.0, 1.0, 1.0, 1.0];
        assert_eq!(
            policy.check(&state(4, &flat)),
            Some(ConvergedReason::MaxGenerations)
        );
        assert_eq!(
            policy.check(&state(3, &flat[..3])),
            Some(ConvergedReason::Stagnation)
        );
    }

    #[test]
    fn test_policy_without_stagnation() {
        let policy = TerminationPolicy::new(100, None);
        assert_eq!(policy.check(&state(50, &[1.0; 50])), None);
    }

    #[test]
    fn test_stagnation_policy_validate() {
        let bad_window = StagnationPolicy {
            window: 0,
            epsilon: 0.1,
        };
        assert!(bad_window.validate().is_err());

        let bad_epsilon = StagnationPolicy {
            window: 5,
            epsilon: -1.0,
        };
        assert!(bad_epsilon.validate().is_err());
    }
}
