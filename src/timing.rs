//! Timing model: human-plausible delays and randomized progress sequences.
//!
//! Two delay categories exist: `percent` (between frames of a percent block)
//! and `text` (between literal status frames). Each is a [`DelaySpec`]:
//! `max(min, base + uniform(jitter_low, jitter_high))`, never negative.

use std::ops::RangeInclusive;
use std::sync::Mutex;
use std::time::Duration;

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::TimingConfig;

/// Increment set for progress sequences.
pub const INCREMENTS: [u32; 4] = [1, 2, 3, 4];

/// A delay distribution, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DelaySpec {
    pub base: f64,
    /// Hard floor applied after jitter.
    pub min: f64,
    pub jitter_low: f64,
    pub jitter_high: f64,
}

impl DelaySpec {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(base: f64, min: f64, jitter_low: f64, jitter_high: f64) -> Self {
        Self {
            base,
            min,
            jitter_low,
            jitter_high,
        }
    }

    /// Draw one delay.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let jitter = if self.jitter_high > self.jitter_low {
            rng.gen_range(self.jitter_low..=self.jitter_high)
        } else {
            self.jitter_low
        };
        let secs = (self.base + jitter).max(self.min).max(0.0);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

/// Which delay distribution a frame uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayCategory {
    Percent,
    Text,
}

/// Weights over [`INCREMENTS`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepWeights(pub [u32; 4]);

impl Default for StepWeights {
    fn default() -> Self {
        Self([2, 4, 3, 1])
    }
}

/// Description of one progress block: where it starts, where it ends and how
/// it gets there.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressRun {
    pub start: u32,
    pub end: u32,
    pub weights: StepWeights,
    pub stall_probability: f64,
}

impl ProgressRun {
    pub fn new(start: u32, end: u32) -> Self {
        Self {
            start,
            end,
            weights: StepWeights::default(),
            stall_probability: 0.04,
        }
    }

    pub fn with_weights(mut self, weights: StepWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_stall_probability(mut self, p: f64) -> Self {
        self.stall_probability = p;
        self
    }

    pub fn build<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<u32> {
        build_steps(rng, self.start, self.end, self.weights, self.stall_probability)
    }
}

/// Generate a monotonic progress sequence from `start` to `end`.
///
/// The sequence begins at `start`, never decreases, ends exactly at `end`, and
/// each consecutive pair differs by 0 (a stall) or by a value in
/// [`INCREMENTS`] clamped at `end`. The number of frames after `start` never
/// exceeds `end - start`: a stall is only taken while enough slack remains to
/// finish with unit increments. A `start` above `end` is clamped to `end`.
pub fn build_steps<R: Rng + ?Sized>(
    rng: &mut R,
    start: u32,
    end: u32,
    weights: StepWeights,
    stall_probability: f64,
) -> Vec<u32> {
    let start = start.min(end);
    let budget = (end - start) as usize;
    let picker = WeightedIndex::new(weights.0).ok();
    let stall_probability = stall_probability.clamp(0.0, 1.0);

    let mut steps = vec![start];
    let mut p = start;
    while p < end {
        let taken = steps.len() - 1;
        let slack = taken + 1 + (end - p) as usize <= budget;
        if slack && stall_probability > 0.0 && rng.gen_bool(stall_probability) {
            steps.push(p);
            continue;
        }
        let inc = match &picker {
            Some(picker) => INCREMENTS[picker.sample(rng)],
            None => 1,
        };
        p = (p + inc).min(end);
        steps.push(p);
    }
    steps
}

/// Shared source of delays and random choices for choreography runs.
pub struct TimingModel {
    percent_step: DelaySpec,
    text_step: DelaySpec,
    stall_probability: f64,
    rng: Mutex<StdRng>,
}

impl TimingModel {
    pub fn new(config: &TimingConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic model for tests and rehearsals.
    pub fn with_seed(config: &TimingConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: &TimingConfig, rng: StdRng) -> Self {
        Self {
            percent_step: config.percent_step,
            text_step: config.text_step,
            stall_probability: config.stall_probability,
            rng: Mutex::new(rng),
        }
    }

    fn with_locked_rng<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut rng)
    }

    /// Delay before the next frame of the given category.
    pub fn delay(&self, category: DelayCategory) -> Duration {
        let spec = match category {
            DelayCategory::Percent => self.percent_step,
            DelayCategory::Text => self.text_step,
        };
        self.with_locked_rng(|rng| spec.sample(rng))
    }

    /// Progress block from `start` to `end` with default weights and the
    /// configured stall probability.
    pub fn progress(&self, start: u32, end: u32) -> Vec<u32> {
        let run = ProgressRun::new(start, end).with_stall_probability(self.stall_probability);
        self.progress_run(&run)
    }

    pub fn progress_run(&self, run: &ProgressRun) -> Vec<u32> {
        self.with_locked_rng(|rng| run.build(rng))
    }

    /// Uniform pick from an inclusive range.
    pub fn roll(&self, range: RangeInclusive<u32>) -> u32 {
        if range.is_empty() {
            return *range.start();
        }
        self.with_locked_rng(|rng| rng.gen_range(range))
    }

    /// Uniform pick of an index below `len`. `len` must be non-zero.
    pub fn pick(&self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        self.with_locked_rng(|rng| rng.gen_range(0..len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_well_formed(steps: &[u32], start: u32, end: u32) {
        assert_eq!(steps.first(), Some(&start));
        assert_eq!(steps.last(), Some(&end));
        for pair in steps.windows(2) {
            let diff = pair[1] - pair[0];
            assert!(
                diff == 0 || INCREMENTS.contains(&diff) || pair[1] == end,
                "bad increment {diff} in {steps:?}"
            );
            assert!(diff <= 4);
        }
        assert!(steps.len() - 1 <= (end - start) as usize);
    }

    #[test]
    fn build_steps_is_monotonic_over_many_seeds() {
        for seed in 0..200 {
            let mut rng = StdRng::seed_from_u64(seed);
            for (start, end) in [(1, 93), (29, 96), (0, 100), (5, 6), (0, 1)] {
                let steps = build_steps(&mut rng, start, end, StepWeights::default(), 0.05);
                assert_well_formed(&steps, start, end);
            }
        }
    }

    #[test]
    fn build_steps_equal_bounds_is_single_frame() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(
            build_steps(&mut rng, 50, 50, StepWeights::default(), 0.5),
            vec![50]
        );
    }

    #[test]
    fn build_steps_clamps_start_above_end() {
        let mut rng = StdRng::seed_from_u64(7);
        assert_eq!(build_steps(&mut rng, 60, 50, StepWeights::default(), 0.0), vec![50]);
    }

    #[test]
    fn build_steps_with_only_ones_walks_every_value() {
        let mut rng = StdRng::seed_from_u64(1);
        let steps = build_steps(&mut rng, 10, 20, StepWeights([1, 0, 0, 0]), 0.0);
        assert_eq!(steps, (10..=20).collect::<Vec<_>>());
    }

    #[test]
    fn build_steps_zero_weights_fall_back_to_unit_increments() {
        let mut rng = StdRng::seed_from_u64(1);
        let steps = build_steps(&mut rng, 0, 5, StepWeights([0, 0, 0, 0]), 0.0);
        assert_eq!(steps, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn stalls_happen_when_probable() {
        let mut rng = StdRng::seed_from_u64(3);
        let steps = build_steps(&mut rng, 0, 100, StepWeights([0, 0, 0, 1]), 0.9);
        assert!(steps.windows(2).any(|w| w[0] == w[1]));
        assert_well_formed(&steps, 0, 100);
    }

    #[test]
    fn delay_respects_floor() {
        let spec = DelaySpec::new(0.1, 0.5, -0.2, 0.1);
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..100 {
            assert!(spec.sample(&mut rng) >= Duration::from_millis(500));
        }
    }

    #[test]
    fn delay_never_negative() {
        let spec = DelaySpec::new(0.0, 0.0, -1.0, -0.5);
        let mut rng = StdRng::seed_from_u64(9);
        assert_eq!(spec.sample(&mut rng), Duration::ZERO);
    }

    #[test]
    fn oversized_delay_saturates() {
        let spec = DelaySpec::new(1e30, 0.0, 0.0, 1e30);
        let mut rng = StdRng::seed_from_u64(9);
        assert_eq!(spec.sample(&mut rng), Duration::MAX);
    }

    #[test]
    fn delay_stays_within_jitter_band() {
        let spec = DelaySpec::new(1.0, 0.0, -0.25, 0.25);
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..100 {
            let d = spec.sample(&mut rng).as_secs_f64();
            assert!((0.75..=1.25).contains(&d), "{d}");
        }
    }

    #[test]
    fn model_roll_stays_in_range() {
        let model = TimingModel::with_seed(&TimingConfig::instant(), 5);
        for _ in 0..50 {
            let v = model.roll(2..=4);
            assert!((2..=4).contains(&v));
        }
        assert_eq!(model.pick(1), 0);
    }

    #[test]
    fn seeded_models_agree() {
        let a = TimingModel::with_seed(&TimingConfig::default(), 42);
        let b = TimingModel::with_seed(&TimingConfig::default(), 42);
        assert_eq!(a.progress(1, 93), b.progress(1, 93));
        assert_eq!(a.delay(DelayCategory::Text), b.delay(DelayCategory::Text));
    }
}
