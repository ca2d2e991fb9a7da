//! Migration between demes
//!
//! Envelopes carry emigrants over the broker; each deme talks to the broker
//! through its own channel.

pub mod channel;
pub mod envelope;

pub mod prelude {
    pub use super::channel::*;
    pub use super::envelope::*;
}
