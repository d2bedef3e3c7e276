//! Synthetic pulse waveform

use super::noise::NoiseGenerator;
use std::f64::consts::TAU;

/// Pulse rate used when `pulse_rate` is not configured (beats per minute)
pub const DEFAULT_PULSE_RATE: f64 = 72.0;
/// Standard deviation of the additive noise
pub const NOISE_WEIGHT: f64 = 0.1;

/// Fundamental plus second and third harmonics, with Gaussian noise
pub struct PulseSignal {
    frequency_hz: f64,
    sampling_rate: f64,
    noise: NoiseGenerator,
}

impl PulseSignal {
    pub fn new(pulse_rate_bpm: f64, sampling_rate: u32, seed: u64) -> Self {
        Self {
            frequency_hz: pulse_rate_bpm / 60.0,
            sampling_rate: f64::from(sampling_rate.max(1)),
            noise: NoiseGenerator::new(seed),
        }
    }

    /// Noise-free waveform at sample `index`
    pub fn clean(&self, index: u64) -> f64 {
        let t = index as f64 / self.sampling_rate;
        let phase = TAU * self.frequency_hz * t;
        phase.sin() + 0.3 * (2.0 * phase).sin() + 0.1 * (3.0 * phase).sin()
    }

    pub fn sample(&mut self, index: u64) -> f64 {
        self.clean(index) + self.noise.gaussian(NOISE_WEIGHT)
    }
}
