//! Migration envelope
//!
//! The unit of migration: the emigrants one deme sends to one neighbour at
//! a migration checkpoint.

use serde::{Deserialize, Serialize};

use crate::broker::codec;
use crate::error::EnvelopeError;
use crate::population::individual::Individual;
use crate::topology::DemeId;

const MAGIC: &[u8; 4] = b"FAME";

/// Emigrants sent from one deme to one neighbour
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MigrationEnvelope {
    /// Deme that sent the envelope
    pub source_deme_id: DemeId,
    /// Sender's generation at the migration checkpoint
    pub generation_number: usize,
    /// Evaluated emigrants, best first
    pub emigrants: Vec<Individual>,
}

impl MigrationEnvelope {
    /// Create an envelope
    pub fn new(
        source_deme_id: DemeId,
        generation_number: usize,
        emigrants: Vec<Individual>,
    ) -> Self {
        Self {
            source_deme_id,
            generation_number,
            emigrants,
        }
    }

    /// Serialise for the wire
    pub fn encode(&self) -> Result<Vec<u8>, EnvelopeError> {
        codec::encode(MAGIC, self)
    }

    /// Parse a wire payload
    pub fn decode(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        codec::decode(MAGIC, bytes)
    }

    /// Check the envelope against a run with `chromosome_len` genes that
    /// sends `max_emigrants` per migration
    pub fn validate(
        &self,
        chromosome_len: usize,
        max_emigrants: usize,
    ) -> Result<(), EnvelopeError> {
        if self.emigrants.len() > max_emigrants {
            return Err(EnvelopeError::TooManyEmigrants {
                limit: max_emigrants,
                actual: self.emigrants.len(),
            });
        }
        for emigrant in &self.emigrants {
            if emigrant.len() != chromosome_len {
                return Err(EnvelopeError::ChromosomeLength {
                    expected: chromosome_len,
                    actual: emigrant.len(),
                });
            }
            match emigrant.fitness() {
                Some(f) if f.is_finite() => {}
                _ => return Err(EnvelopeError::NonFiniteFitness),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope() -> MigrationEnvelope {
        MigrationEnvelope::new(
            2,
            10,
            vec![
                Individual::with_fitness(vec![1.0, 2.0], -5.0),
                Individual::with_fitness(vec![0.5, 0.5], -0.5),
            ],
        )
    }

    #[test]
    fn test_wire_roundtrip() {
        let original = envelope();
        let decoded = MigrationEnvelope::decode(&original.encode().unwrap()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(
            MigrationEnvelope::decode(b"definitely not an envelope"),
            Err(EnvelopeError::Undecodable(_))
        ));
    }

    #[test]
    fn test_validate_accepts_well_formed() {
        assert!(envelope().validate(2, 2).is_ok());
    }

    #[test]
    fn test_validate_chromosome_length() {
        assert_eq!(
            envelope().validate(3, 2),
            Err(EnvelopeError::ChromosomeLength {
                expected: 3,
                actual: 2
            })
        );
    }

    #[test]
    fn test_validate_fitness() {
        let unevaluated = MigrationEnvelope::new(0, 1, vec![Individual::new(vec![1.0])]);
        assert_eq!(unevaluated.validate(1, 1), Err(EnvelopeError::NonFiniteFitness));

        let nan =
            MigrationEnvelope::new(0, 1, vec![Individual::with_fitness(vec![1.0], f64::NAN)]);
        assert_eq!(nan.validate(1, 1), Err(EnvelopeError::NonFiniteFitness));
    }

    #[test]
    fn test_validate_emigrant_count() {
        assert_eq!(
            envelope().validate(2, 1),
            Err(EnvelopeError::TooManyEmigrants {
                limit: 1,
                actual: 2
            })
        );
        let empty = MigrationEnvelope::new(0, 1, Vec::new());
        assert!(empty.validate(2, 1).is_ok());
    }
}
