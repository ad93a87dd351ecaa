//! Audio capture and chunk encoding.

pub mod capture;
pub mod chunk;

/// Mix multi-channel frames down to mono by averaging channels.
pub fn downmix_to_mono(samples: &[i16], channels: usize) -> Vec<i16> {
    if channels <= 1 {
        return samples.to_vec();
    }
    samples
        .chunks_exact(channels)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Simple linear interpolation resampling.
pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = source_pos.floor() as usize;
            let fraction = source_pos - source_idx as f64;

            if source_idx + 1 >= samples.len() {
                samples[samples.len() - 1]
            } else {
                let left = samples[source_idx] as f64;
                let right = samples[source_idx + 1] as f64;
                (left + (right - left) * fraction) as i16
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_mono_is_identity() {
        let samples = vec![1i16, 2, 3];
        assert_eq!(downmix_to_mono(&samples, 1), samples);
    }

    #[test]
    fn downmix_stereo_averages_pairs() {
        let stereo = vec![100i16, 200, 300, 400, 500, 600];
        assert_eq!(downmix_to_mono(&stereo, 2), vec![150i16, 350, 550]);
    }

    #[test]
    fn resample_same_rate_is_identity() {
        let samples = vec![10i16, 20, 30];
        assert_eq!(resample(&samples, 16000, 16000), samples);
    }

    #[test]
    fn resample_halves_length_when_downsampling_2x() {
        let samples: Vec<i16> = (0..100).collect();
        let out = resample(&samples, 32000, 16000);
        assert_eq!(out.len(), 50);
    }

    #[test]
    fn resample_doubles_length_when_upsampling_2x() {
        let samples: Vec<i16> = (0..50).collect();
        let out = resample(&samples, 8000, 16000);
        assert_eq!(out.len(), 100);
    }

    #[test]
    fn resample_empty_input() {
        assert!(resample(&[], 48000, 16000).is_empty());
    }
}
