//! Chromosome value ranges
//!
//! Chromosomes are plain real-valued gene vectors carried by
//! [`Individual`](crate::population::individual::Individual); this module
//! holds the bounds used to seed and clamp them.

pub mod bounds;

pub mod prelude {
    pub use super::bounds::*;
}
