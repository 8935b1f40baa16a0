// Frame module - per-buffer time-domain statistics
//
// Computes the three numbers the onset classifier works from: RMS energy,
// peak amplitude, and the peak-to-RMS ratio that measures how impulsive the
// buffer is. A clap's attack puts a single sharp peak on top of a modest RMS
// (ratios typically 4-10+); speech and music keep the peak close to the RMS.

use serde::{Deserialize, Serialize};

/// RMS below this is treated as silence when computing the peak/RMS ratio
pub const RMS_FLOOR: f32 = 0.001;

/// One buffer of captured audio, borrowed for the duration of analysis
///
/// `samples` may be interleaved; only the first channel is read. The frame
/// is never retained past the call that receives it.
#[derive(Debug, Clone, Copy)]
pub struct AudioFrame<'a> {
    samples: &'a [f32],
    sample_rate: u32,
    channels: u16,
}

impl<'a> AudioFrame<'a> {
    /// Wrap interleaved samples captured with `channels` channels
    pub fn new(samples: &'a [f32], sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels: channels.max(1),
        }
    }

    /// Wrap single-channel samples
    pub fn mono(samples: &'a [f32], sample_rate: u32) -> Self {
        Self::new(samples, sample_rate, 1)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of samples in the analysed (first) channel
    pub fn len(&self) -> usize {
        self.samples.len().div_ceil(self.channels as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration covered by this frame, zero when the sample rate is unknown
    pub fn duration(&self) -> std::time::Duration {
        if self.sample_rate == 0 {
            return std::time::Duration::ZERO;
        }
        std::time::Duration::from_secs_f64(self.len() as f64 / self.sample_rate as f64)
    }

    /// Iterate the first channel
    pub fn first_channel(&self) -> impl Iterator<Item = f32> + 'a {
        self.samples.iter().step_by(self.channels as usize).copied()
    }
}

/// Statistics for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameStatistics {
    /// Root-mean-square energy
    pub rms: f32,
    /// Maximum absolute sample value
    pub peak: f32,
    /// peak / rms, or 0 when rms is at or below [`RMS_FLOOR`]
    pub ratio: f32,
}

impl FrameStatistics {
    /// Build statistics from precomputed RMS and peak, applying the silence guard
    pub fn from_levels(rms: f32, peak: f32) -> Self {
        let ratio = if rms > RMS_FLOOR { peak / rms } else { 0.0 };
        Self { rms, peak, ratio }
    }
}

/// Compute RMS, peak and peak/RMS ratio for a frame
///
/// Pure and total: an empty frame yields zeroed statistics.
pub fn analyze(frame: &AudioFrame<'_>) -> FrameStatistics {
    let mut count = 0usize;
    let mut sum_squares = 0.0f64;
    let mut peak = 0.0f32;

    for sample in frame.first_channel() {
        count += 1;
        sum_squares += (sample as f64) * (sample as f64);
        peak = peak.max(sample.abs());
    }

    if count == 0 {
        return FrameStatistics::default();
    }

    let rms = (sum_squares / count as f64).sqrt() as f32;
    FrameStatistics::from_levels(rms, peak)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_frame_is_zeroed() {
        let stats = analyze(&AudioFrame::mono(&[], 48000));
        assert_eq!(stats, FrameStatistics::default());
    }

    #[test]
    fn test_silent_frame() {
        let samples = vec![0.0; 2048];
        let stats = analyze(&AudioFrame::mono(&samples, 48000));
        assert_eq!(stats.rms, 0.0);
        assert_eq!(stats.peak, 0.0);
        assert_eq!(stats.ratio, 0.0);
    }

    #[test]
    fn test_constant_signal_has_unit_ratio() {
        let samples = vec![-0.5; 1024];
        let stats = analyze(&AudioFrame::mono(&samples, 48000));
        assert!((stats.rms - 0.5).abs() < 1e-6);
        assert!((stats.peak - 0.5).abs() < 1e-6);
        assert!((stats.ratio - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_impulse_has_high_ratio() {
        // One full-scale sample in 100: rms = 0.1, peak = 1.0
        let mut samples = vec![0.0; 100];
        samples[10] = -1.0;
        let stats = analyze(&AudioFrame::mono(&samples, 48000));
        assert!((stats.rms - 0.1).abs() < 1e-6);
        assert_eq!(stats.peak, 1.0);
        assert!((stats.ratio - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_ratio_guard_below_rms_floor() {
        let mut samples = vec![0.0; 10_000];
        samples[0] = 0.05; // rms = 0.0005
        let stats = analyze(&AudioFrame::mono(&samples, 48000));
        assert!(stats.rms < RMS_FLOOR);
        assert!(stats.peak > 0.0);
        assert_eq!(stats.ratio, 0.0);
    }

    #[test]
    fn test_interleaved_frame_reads_first_channel() {
        // Left channel is silent, right channel is loud
        let samples: Vec<f32> = (0..256)
            .flat_map(|_| [0.0f32, 0.9f32])
            .collect();
        let frame = AudioFrame::new(&samples, 44100, 2);
        assert_eq!(frame.len(), 256);
        let stats = analyze(&frame);
        assert_eq!(stats.rms, 0.0);
        assert_eq!(stats.peak, 0.0);
    }

    #[test]
    fn test_frame_duration() {
        let samples = vec![0.0; 2400];
        let frame = AudioFrame::mono(&samples, 48000);
        assert_eq!(frame.duration(), std::time::Duration::from_millis(50));
        assert_eq!(
            AudioFrame::mono(&samples, 0).duration(),
            std::time::Duration::ZERO
        );
    }

    #[test]
    fn test_statistics_non_negative_for_random_frames() {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let len = rng.gen_range(1..512);
            let samples: Vec<f32> = (0..len).map(|_| rng.gen_range(-1.0..=1.0)).collect();
            let stats = analyze(&AudioFrame::mono(&samples, 48000));
            assert!(stats.rms >= 0.0);
            assert!(stats.peak >= 0.0);
            assert!(stats.ratio >= 0.0);
        }
    }
}
