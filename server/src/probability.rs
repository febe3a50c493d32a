//! Weighted random value selection.

use rand::Rng;
use thiserror::Error;

/// Slack for floating point sums such as 0.1 + 0.15 + 0.25 + 0.5.
const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProbabilityError {
    #[error("probability {0} is outside (0, 1]")]
    OutOfRange(f64),
    #[error("adding {added} would raise the total probability from {total} above 1.0")]
    TotalExceeded { total: f64, added: f64 },
    #[error("no value covers the drawn probability {0}")]
    Exhausted(f64),
}

#[derive(Debug, Clone)]
struct Bucket<V> {
    probability: f64,
    values: Vec<V>,
}

impl<V> Bucket<V> {
    fn mass(&self) -> f64 {
        self.probability * self.values.len() as f64
    }
}

/// A set of values, each drawn with its own probability.
///
/// Values that share a probability share a bucket and are picked uniformly
/// within it, so every value keeps exactly the probability it was added with.
#[derive(Debug, Clone)]
pub struct ProbabilityTable<V> {
    buckets: Vec<Bucket<V>>,
}

impl<V> Default for ProbabilityTable<V> {
    fn default() -> Self {
        Self {
            buckets: Vec::new(),
        }
    }
}

impl<V: Clone> ProbabilityTable<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sum of the probabilities of every value added so far.
    pub fn total(&self) -> f64 {
        self.buckets.iter().map(Bucket::mass).sum()
    }

    pub fn len(&self) -> usize {
        self.buckets.iter().map(|b| b.values.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn add_value(&mut self, value: V, probability: f64) -> Result<(), ProbabilityError> {
        if !(probability > 0.0 && probability <= 1.0) {
            return Err(ProbabilityError::OutOfRange(probability));
        }

        let total = self.total();
        if total + probability > 1.0 + EPSILON {
            return Err(ProbabilityError::TotalExceeded {
                total,
                added: probability,
            });
        }

        // Buckets stay sorted ascending by probability
        match self
            .buckets
            .binary_search_by(|b| b.probability.total_cmp(&probability))
        {
            Ok(index) => self.buckets[index].values.push(value),
            Err(index) => self.buckets.insert(
                index,
                Bucket {
                    probability,
                    values: vec![value],
                },
            ),
        }

        Ok(())
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<V, ProbabilityError> {
        let roll: f64 = rng.gen();
        let mut cumulative = 0.0;

        for bucket in &self.buckets {
            cumulative += bucket.mass();

            if roll <= cumulative {
                let index = rng.gen_range(0..bucket.values.len());
                return Ok(bucket.values[index].clone());
            }
        }

        Err(ProbabilityError::Exhausted(roll))
    }
}
