//! Gene value range
//!
//! One closed interval shared by every gene of a chromosome. It seeds the
//! initial populations and clamps mutated genes.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{config_error, EvoResult};

/// Closed interval `[min, max]` for gene values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    /// Build bounds without checking them
    ///
    /// Runs check them through
    /// [`EngineSettings::validate`](crate::config::EngineSettings::validate);
    /// use [`Bounds::try_new`] to check up front.
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Build bounds, rejecting reversed or non-finite ends
    pub fn try_new(min: f64, max: f64) -> EvoResult<Self> {
        let bounds = Self::new(min, max);
        bounds.validate()?;
        Ok(bounds)
    }

    /// `[-half_width, half_width]`
    pub fn symmetric(half_width: f64) -> Self {
        Self::new(-half_width, half_width)
    }

    pub fn validate(&self) -> EvoResult<()> {
        if !(self.min.is_finite() && self.max.is_finite()) {
            return Err(config_error(format!(
                "gene bounds must be finite, got [{}, {}]",
                self.min, self.max
            )));
        }
        if self.min > self.max {
            return Err(config_error(format!(
                "gene bounds are reversed: [{}, {}]",
                self.min, self.max
            )));
        }
        Ok(())
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.min).min(self.max)
    }

    /// Uniform draw from the interval
    pub fn sample<R: Rng>(&self, rng: &mut R) -> f64 {
        if self.min < self.max {
            rng.gen_range(self.min..=self.max)
        } else {
            self.min
        }
    }
}

impl Default for Bounds {
    fn default() -> Self {
        Self::symmetric(5.12)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_try_new() {
        assert!(Bounds::try_new(-1.0, 1.0).is_ok());
        assert!(Bounds::try_new(1.0, -1.0).is_err());
        assert!(Bounds::try_new(f64::NEG_INFINITY, 1.0).is_err());
        assert!(Bounds::try_new(0.0, f64::NAN).is_err());
    }

    #[test]
    fn test_clamp_and_contains() {
        let b = Bounds::symmetric(5.0);
        assert_eq!(b.clamp(-10.0), -5.0);
        assert_eq!(b.clamp(10.0), 5.0);
        assert_eq!(b.clamp(1.5), 1.5);
        assert!(b.contains(5.0));
        assert!(!b.contains(5.01));
    }

    #[test]
    fn test_sample_stays_inside() {
        let mut rng = StdRng::seed_from_u64(7);
        let b = Bounds::new(-2.0, 3.0);
        assert!((0..200).all(|_| b.contains(b.sample(&mut rng))));
    }

    #[test]
    fn test_point_interval() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(Bounds::new(1.5, 1.5).sample(&mut rng), 1.5);
    }
}
