use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;

use crate::error::{Error, Result};
use crate::vocab::Vocab;

/// Exponent applied to word counts before sampling negatives.
pub const DISTORTION: f64 = 0.75;

/// Draws negative labels with probability proportional to `count^0.75`.
/// The unknown word is never drawn.
#[derive(Debug, Clone)]
pub struct UnigramSampler {
    dist: WeightedIndex<f64>,
    /// Number of ids that can be drawn at all.
    support: usize,
}

impl UnigramSampler {
    pub fn new(vocab: &Vocab) -> Result<Self> {
        Self::from_counts(vocab.counts().enumerate().map(|(id, c)| if id == 0 { 0 } else { c }))
    }

    pub fn from_counts(counts: impl IntoIterator<Item = u64>) -> Result<Self> {
        let weights: Vec<f64> = counts
            .into_iter()
            .map(|c| (c as f64).powf(DISTORTION))
            .collect();
        let support = weights.iter().filter(|&&w| w > 0.0).count();
        let dist = WeightedIndex::new(&weights).map_err(|err| {
            Error::DataIntegrity(format!("cannot build negative sampler: {err}"))
        })?;
        Ok(UnigramSampler { dist, support })
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        self.dist.sample(rng)
    }

    /// Draw `n` distinct ids, or as many as there are if that's fewer.
    pub fn sample_unique<R: Rng + ?Sized>(&self, n: usize, rng: &mut R, out: &mut Vec<usize>) {
        out.clear();
        let n = n.min(self.support);
        while out.len() < n {
            let id = self.dist.sample(rng);
            if !out.contains(&id) {
                out.push(id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn unique_and_in_range() {
        let sampler = UnigramSampler::from_counts([0, 50, 20, 10, 5, 1]).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let mut out = vec![];
        for _ in 0..100 {
            sampler.sample_unique(3, &mut rng, &mut out);
            assert_eq!(out.len(), 3);
            assert!(out.iter().all(|&id| (1..6).contains(&id)));
            let mut sorted = out.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), 3);
        }
    }

    #[test]
    fn capped_at_support() {
        let sampler = UnigramSampler::from_counts([0, 4, 0, 9]).unwrap();
        let mut out = vec![];
        sampler.sample_unique(10, &mut StdRng::seed_from_u64(2), &mut out);
        out.sort_unstable();
        assert_eq!(out, [1, 3]);
    }

    #[test]
    fn frequency_bias() {
        // 16^0.75 = 8, 1^0.75 = 1: word 1 should come up about 8 times as often.
        let sampler = UnigramSampler::from_counts([0, 16, 1]).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let mut hits = [0usize; 3];
        for _ in 0..90_000 {
            hits[sampler.sample(&mut rng)] += 1;
        }
        assert_eq!(hits[0], 0);
        let ratio = hits[1] as f64 / hits[2] as f64;
        assert!((7.0..9.0).contains(&ratio), "ratio = {ratio}");
    }

    #[test]
    fn all_zero_counts() {
        assert!(UnigramSampler::from_counts([0, 0]).is_err());
    }
}
