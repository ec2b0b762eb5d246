//! Frame loudness estimation
//!
//! Reduces a frame of normalized samples to a single decibel-like reading:
//!
//! ```text
//! level_db = 10 * log10(mean(sample^2) + 1e-10)
//! ```
//!
//! The epsilon keeps fully silent frames at -100 dB instead of -inf.
//! Multi-channel frames are passed interleaved; the mean square runs over
//! every sample of every channel.

use thiserror::Error;

/// Added to the mean square before the logarithm
pub const LEVEL_EPSILON: f64 = 1e-10;

/// Reason a frame could not be turned into a level reading
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidFrame {
    #[error("audio frame is empty")]
    Empty,

    #[error("audio frame has a non-finite sample at index {index}")]
    NonFinite { index: usize },
}

/// Compute the loudness of one frame in dB
///
/// # Arguments
/// * `frame` - Samples in the normalized range `[-1.0, 1.0]`, interleaved
///   if the device has more than one channel
///
/// # Returns
/// The level in dB, or [`InvalidFrame`] for empty frames and frames
/// carrying NaN/infinite samples
///
/// # Example
/// ```
/// use noisewatch_core::audio::level::frame_level_db;
///
/// let silent = vec![0.0f32; 512];
/// assert!((frame_level_db(&silent).unwrap() + 100.0).abs() < 1e-9);
///
/// let full_scale = vec![1.0f32; 512];
/// assert!(frame_level_db(&full_scale).unwrap().abs() < 1e-6);
/// ```
pub fn frame_level_db(frame: &[f32]) -> Result<f64, InvalidFrame> {
    if frame.is_empty() {
        return Err(InvalidFrame::Empty);
    }

    let mut sum_squares = 0.0f64;
    for (index, &sample) in frame.iter().enumerate() {
        if !sample.is_finite() {
            return Err(InvalidFrame::NonFinite { index });
        }
        let s = sample as f64;
        sum_squares += s * s;
    }

    let mean_square = sum_squares / frame.len() as f64;
    Ok(10.0 * (mean_square + LEVEL_EPSILON).log10())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_silence_is_floor() {
        let level = frame_level_db(&[0.0; 256]).unwrap();
        assert_relative_eq!(level, -100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_full_scale_is_zero_db() {
        let level = frame_level_db(&[1.0; 256]).unwrap();
        assert_relative_eq!(level, 0.0, epsilon = 1e-6);

        // Sign does not matter, only energy
        let alternating: Vec<f32> = (0..256)
            .map(|i| if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        let level = frame_level_db(&alternating).unwrap();
        assert_relative_eq!(level, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn test_half_amplitude() {
        // mean square 0.25 -> 10*log10(0.25) = -6.0206 dB
        let level = frame_level_db(&[0.5; 128]).unwrap();
        assert_relative_eq!(level, -6.0206, epsilon = 1e-3);
    }

    #[test]
    fn test_default_threshold_amplitude() {
        // -18 dB corresponds to an amplitude of about 0.126
        let quiet = frame_level_db(&[0.1; 64]).unwrap();
        let loud = frame_level_db(&[0.2; 64]).unwrap();
        assert!(quiet < -18.0, "0.1 amplitude should be below -18 dB: {}", quiet);
        assert!(loud > -18.0, "0.2 amplitude should be above -18 dB: {}", loud);
    }

    #[test]
    fn test_empty_frame_rejected() {
        assert_eq!(frame_level_db(&[]), Err(InvalidFrame::Empty));
    }

    #[test]
    fn test_non_finite_rejected() {
        let frame = [0.1, 0.2, f32::NAN, 0.3];
        assert_eq!(
            frame_level_db(&frame),
            Err(InvalidFrame::NonFinite { index: 2 })
        );

        let frame = [f32::INFINITY];
        assert_eq!(
            frame_level_db(&frame),
            Err(InvalidFrame::NonFinite { index: 0 })
        );
    }

    #[test]
    fn test_interleaved_stereo_uses_all_channels() {
        // Anti-phase stereo carries full energy on both channels
        let stereo: Vec<f32> = (0..256).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        let level = frame_level_db(&stereo).unwrap();
        assert_relative_eq!(level, -6.0206, epsilon = 1e-3);

        // Uncorrelated channels: mean square over every sample
        let mixed = [0.5f32, 0.0, 0.5, 0.0];
        let mean_square = (0.25 + 0.25) / 4.0;
        let level = frame_level_db(&mixed).unwrap();
        assert_relative_eq!(level, 10.0 * (mean_square + LEVEL_EPSILON).log10(), epsilon = 1e-9);
    }
}
