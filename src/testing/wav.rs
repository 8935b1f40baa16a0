//! WAV loading and writing for offline replay.

use std::path::Path;

use crate::error::AudioError;

/// Decoded mono audio
#[derive(Debug, Clone, PartialEq)]
pub struct WavClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

fn read_error(path: &Path, err: hound::Error) -> AudioError {
    AudioError::StreamFailure {
        reason: format!("error reading {}: {err}", path.display()),
    }
}

/// Read a WAV file, keeping only the first channel
///
/// Integer formats are scaled to [-1.0, 1.0].
pub fn read_wav(path: &Path) -> Result<WavClip, AudioError> {
    let mut reader = hound::WavReader::open(path).map_err(|err| AudioError::StreamFailure {
        reason: format!("failed to open {}: {err}", path.display()),
    })?;
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(AudioError::UnsupportedFormat {
            format: format!("{} has zero channels", path.display()),
        });
    }

    let interleaved = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .map(|sample| sample.map_err(|err| read_error(path, err)))
            .collect::<Result<Vec<f32>, _>>()?,
        hound::SampleFormat::Int => match spec.bits_per_sample {
            bits @ (8 | 16 | 24 | 32) => {
                let scale = (1i64 << (bits - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|sample| {
                        sample
                            .map(|v| v as f32 / scale)
                            .map_err(|err| read_error(path, err))
                    })
                    .collect::<Result<Vec<f32>, _>>()?
            }
            bits => {
                return Err(AudioError::UnsupportedFormat {
                    format: format!("{}-bit integer PCM in {}", bits, path.display()),
                })
            }
        },
    };

    let samples = interleaved
        .iter()
        .step_by(spec.channels as usize)
        .copied()
        .collect();

    Ok(WavClip {
        samples,
        sample_rate: spec.sample_rate,
    })
}

/// Write mono f32 samples as a 32-bit float WAV
pub fn write_wav(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), AudioError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let write_error = |err: hound::Error| AudioError::StreamFailure {
        reason: format!("error writing {}: {err}", path.display()),
    };

    let mut writer = hound::WavWriter::create(path, spec).map_err(write_error)?;
    for &sample in samples {
        writer.write_sample(sample).map_err(write_error)?;
    }
    writer.finalize().map_err(write_error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_then_read_float_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.wav");
        let samples = vec![0.0, 0.25, -0.5, 1.0];

        write_wav(&path, &samples, 44_100).unwrap();
        let clip = read_wav(&path).unwrap();
        assert_eq!(clip.sample_rate, 44_100);
        assert_eq!(clip.samples, samples);
    }

    #[test]
    fn test_read_stereo_int16_keeps_first_channel() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 48_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for (left, right) in [(16384i16, 0i16), (-32768, 100), (0, -100)] {
            writer.write_sample(left).unwrap();
            writer.write_sample(right).unwrap();
        }
        writer.finalize().unwrap();

        let clip = read_wav(&path).unwrap();
        assert_eq!(clip.samples, vec![0.5, -1.0, 0.0]);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = read_wav(&dir.path().join("absent.wav")).unwrap_err();
        assert!(matches!(err, AudioError::StreamFailure { .. }));
    }
}
