//! Benchmark objectives
//!
//! Classic minimisation problems, negated so that higher is better. Each is
//! available as a unit struct and through the serialisable [`Benchmark`]
//! enum, which also knows the conventional search range.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::fitness::traits::Fitness;
use crate::genome::bounds::Bounds;

fn sphere(x: &[f64]) -> f64 {
    x.iter().map(|xi| xi * xi).sum()
}

fn rastrigin(x: &[f64]) -> f64 {
    const A: f64 = 10.0;
    x.iter()
        .map(|xi| A + xi * xi - A * (2.0 * PI * xi).cos())
        .sum()
}

fn rosenbrock(x: &[f64]) -> f64 {
    x.windows(2)
        .map(|w| 100.0 * (w[1] - w[0] * w[0]).powi(2) + (1.0 - w[0]).powi(2))
        .sum()
}

/// Negated Σxᵢ²; optimum 0 at the origin
#[derive(Clone, Copy, Debug, Default)]
pub struct Sphere;

impl Fitness for Sphere {
    fn evaluate(&self, genes: &[f64]) -> f64 {
        -sphere(genes)
    }
}

/// Negated Rastrigin; highly multimodal, optimum 0 at the origin
#[derive(Clone, Copy, Debug, Default)]
pub struct Rastrigin;

impl Fitness for Rastrigin {
    fn evaluate(&self, genes: &[f64]) -> f64 {
        -rastrigin(genes)
    }
}

/// Negated Rosenbrock valley; optimum 0 at (1, 1, ..., 1)
#[derive(Clone, Copy, Debug, Default)]
pub struct Rosenbrock;

impl Fitness for Rosenbrock {
    fn evaluate(&self, genes: &[f64]) -> f64 {
        -rosenbrock(genes)
    }
}

/// A benchmark chosen by name, e.g. from a config file
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Benchmark {
    Sphere,
    Rastrigin,
    Rosenbrock,
}

impl Benchmark {
    /// Display name
    pub fn name(self) -> &'static str {
        match self {
            Self::Sphere => "Sphere",
            Self::Rastrigin => "Rastrigin",
            Self::Rosenbrock => "Rosenbrock",
        }
    }

    /// Search range the benchmark is usually run on
    pub fn bounds(self) -> Bounds {
        match self {
            Self::Sphere | Self::Rastrigin => Bounds::symmetric(5.12),
            Self::Rosenbrock => Bounds::new(-5.0, 10.0),
        }
    }
}

impl Fitness for Benchmark {
    fn evaluate(&self, genes: &[f64]) -> f64 {
        match self {
            Self::Sphere => Sphere.evaluate(genes),
            Self::Rastrigin => Rastrigin.evaluate(genes),
            Self::Rosenbrock => Rosenbrock.evaluate(genes),
        }
    }
}
