//! Deterministic synthetic signals for exercising the detector without a
//! microphone.
//!
//! Every building block appends whole frames, so each event lands at the
//! start of its own frame and classification does not depend on where a
//! frame boundary happens to cut a sound.

use std::f32::consts::PI;
use std::time::Duration;

use rand::{rngs::StdRng, Rng, SeedableRng};

/// Default background noise amplitude (uniform, peak)
pub const DEFAULT_NOISE_LEVEL: f32 = 0.005;

/// Decay constant of a sharp clap, in seconds
const CLAP_DECAY_S: f32 = 0.008;
/// Decay constant of a soft, smeared clap, in seconds
const SOFT_CLAP_DECAY_S: f32 = 0.030;

/// Frame-aligned signal builder with a seeded noise source
pub struct SignalBuilder {
    sample_rate: u32,
    frame_size: usize,
    noise_level: f32,
    rng: StdRng,
    samples: Vec<f32>,
}

impl SignalBuilder {
    pub fn new(sample_rate: u32, frame_size: usize, seed: u64) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            frame_size: frame_size.max(1),
            noise_level: DEFAULT_NOISE_LEVEL,
            rng: StdRng::seed_from_u64(seed),
            samples: Vec::new(),
        }
    }

    pub fn noise_level(mut self, level: f32) -> Self {
        self.noise_level = level.max(0.0);
        self
    }

    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_size as f64 / self.sample_rate as f64)
    }

    fn noise(&mut self) -> f32 {
        if self.noise_level == 0.0 {
            0.0
        } else {
            self.rng.gen_range(-self.noise_level..=self.noise_level)
        }
    }

    /// Background noise for `frames` frames
    pub fn quiet(mut self, frames: usize) -> Self {
        for _ in 0..frames * self.frame_size {
            let sample = self.noise();
            self.samples.push(sample);
        }
        self
    }

    /// Background noise for at least `duration`, rounded up to whole frames
    pub fn quiet_for(self, duration: Duration) -> Self {
        let frame_s = self.frame_duration().as_secs_f64();
        let frames = (duration.as_secs_f64() / frame_s).ceil() as usize;
        self.quiet(frames)
    }

    fn burst(mut self, amplitude: f32, decay_s: f32) -> Self {
        let tau = decay_s * self.sample_rate as f32;
        // First sample pins the peak so the frame's peak is exactly `amplitude`
        self.samples.push(amplitude);
        for n in 1..self.frame_size {
            let envelope = (-(n as f32) / tau).exp();
            let sample = amplitude * envelope * self.rng.gen_range(-1.0f32..=1.0);
            self.samples.push(sample);
        }
        self
    }

    /// One frame holding a sharp clap: a fast-decaying noise burst
    ///
    /// Peak/RMS is around 5.6 with the default frame size at 48 kHz.
    pub fn clap(self, amplitude: f32) -> Self {
        self.burst(amplitude, CLAP_DECAY_S)
    }

    /// One frame holding a soft clap whose energy is smeared over the frame
    ///
    /// Peak/RMS is around 3.0 with the default frame size at 48 kHz.
    pub fn soft_clap(self, amplitude: f32) -> Self {
        self.burst(amplitude, SOFT_CLAP_DECAY_S)
    }

    /// Sustained tone (speech/music stand-in) lasting `frames` frames
    pub fn tone(mut self, frequency_hz: f32, amplitude: f32, frames: usize) -> Self {
        let start = self.samples.len();
        for n in 0..frames * self.frame_size {
            let t = (start + n) as f32 / self.sample_rate as f32;
            let sample = amplitude * (2.0 * PI * frequency_hz * t).sin() + self.noise();
            self.samples.push(sample);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn build(self) -> Vec<f32> {
        self.samples
    }
}
