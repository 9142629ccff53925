//! Per-buffer resampling and PCM16 conversion
//!
//! The capture callback hands over one buffer at a time and each buffer is
//! resampled in isolation: a pure, stateless linear resample of exactly
//! that buffer's duration. No filter state is carried across buffers,
//! which can introduce minute discontinuities at buffer boundaries - an
//! accepted approximation at typical buffer sizes (see DESIGN.md).
//!
//! Everything here runs synchronously inside the real-time callback's time
//! budget, so it must stay allocation-light and must never panic.

/// Target rate for every frame leaving the capture pipeline.
pub const TARGET_SAMPLE_RATE: u32 = 16_000;

/// Linear-interpolation resample of one buffer from `source_rate` to
/// `target_rate`. Output length is `round(len * target/source)`; the tail
/// is padded with the last sample when interpolation runs off the end.
pub fn resample_linear(input: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if input.is_empty() || source_rate == 0 || target_rate == 0 {
        return input.to_vec();
    }
    if source_rate == target_rate {
        return input.to_vec();
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let output_len = ((input.len() as f64) * ratio).round() as usize;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_idx = i as f64 / ratio;
        let idx = src_idx.floor() as usize;
        let frac = (src_idx - idx as f64) as f32;

        if idx + 1 < input.len() {
            output.push(input[idx] * (1.0 - frac) + input[idx + 1] * frac);
        } else {
            let pad = input.last().copied().unwrap_or(0.0);
            output.push(pad);
        }
    }

    output
}

/// Convert float samples to 16-bit signed PCM: clamp to [-1, 1], then scale
/// asymmetrically so both rails are reachable without overflow.
pub fn to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| {
            let s = sample.clamp(-1.0, 1.0);
            if s < 0.0 {
                (s * 0x8000 as f32) as i16
            } else {
                (s * 0x7FFF as f32) as i16
            }
        })
        .collect()
}

/// One callback buffer, native rate in, PCM16 frame at the target rate out.
///
/// Returns None when the buffer cannot be converted (unusable rate); the
/// caller drops the frame. Sending mis-rated audio is worse than sending
/// nothing.
pub fn frame_to_target(mono: &[f32], native_rate: u32) -> Option<Vec<i16>> {
    if native_rate == 0 {
        log::error!("resample: native rate is 0, dropping frame");
        return None;
    }
    if native_rate == TARGET_SAMPLE_RATE {
        return Some(to_pcm16(mono));
    }
    Some(to_pcm16(&resample_linear(
        mono,
        native_rate,
        TARGET_SAMPLE_RATE,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_second_of_silence_at_44100_resamples_to_16000() {
        let input = vec![0.0f32; 44_100];
        let output = resample_linear(&input, 44_100, TARGET_SAMPLE_RATE);

        let diff = (output.len() as i64 - 16_000i64).abs();
        assert!(diff <= 1, "expected ~16000 samples, got {}", output.len());
        assert!(output.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn equal_rates_pass_through_unchanged() {
        let input = vec![0.25f32, -0.5, 0.75];
        assert_eq!(resample_linear(&input, 16_000, 16_000), input);
    }

    #[test]
    fn downsampling_halves_a_48k_buffer() {
        let input = vec![0.0f32; 4800];
        let output = resample_linear(&input, 48_000, 24_000);
        assert_eq!(output.len(), 2400);
    }

    #[test]
    fn upsampling_preserves_a_constant_signal() {
        let input = vec![0.5f32; 800];
        let output = resample_linear(&input, 8_000, 16_000);
        assert_eq!(output.len(), 1600);
        for &s in &output {
            assert!((s - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn zero_rate_is_guarded() {
        let input = vec![0.1f32; 10];
        assert_eq!(resample_linear(&input, 0, 16_000), input);
        assert_eq!(resample_linear(&input, 16_000, 0), input);
    }

    #[test]
    fn pcm16_conversion_scales_and_clamps() {
        assert_eq!(to_pcm16(&[0.0]), vec![0]);
        assert_eq!(to_pcm16(&[1.0]), vec![i16::MAX]);
        assert_eq!(to_pcm16(&[-1.0]), vec![i16::MIN]);

        // Out-of-range input clamps instead of wrapping.
        assert_eq!(to_pcm16(&[2.0]), vec![i16::MAX]);
        assert_eq!(to_pcm16(&[-2.0]), vec![i16::MIN]);

        assert_eq!(to_pcm16(&[0.5])[0], (0.5 * 0x7FFF as f32) as i16);
        assert_eq!(to_pcm16(&[-0.5])[0], (-0.5 * 0x8000 as f32) as i16);
    }

    #[test]
    fn frame_to_target_passes_through_at_target_rate() {
        let pcm = frame_to_target(&[0.0, 0.5, -0.5], TARGET_SAMPLE_RATE).unwrap();
        assert_eq!(pcm.len(), 3);
    }

    #[test]
    fn frame_to_target_resamples_native_buffers() {
        // A 4096-sample buffer at 48kHz covers ~85.3ms; at 16kHz that is
        // ~1365 samples.
        let mono = vec![0.0f32; 4096];
        let pcm = frame_to_target(&mono, 48_000).unwrap();
        let expected = (4096.0 * 16_000.0 / 48_000.0_f64).round() as usize;
        assert_eq!(pcm.len(), expected);
    }

    #[test]
    fn frame_to_target_drops_unusable_rates() {
        assert!(frame_to_target(&[0.0; 16], 0).is_none());
    }
}
