// src/audio/mixer.rs  —  C9: parallel mixer for simultaneous caller replies
use rand::Rng;

/// One caller's rendered reply plus its uniformly random launch delay.
pub struct MixTrack {
    pub samples: Vec<f32>,
    pub delay_secs: f32,
}

/// Draw a uniform `[0, 2]` second delay for each of `count` callers being
/// emitted together (S0 acceptance, post-completion re-emission, and
/// post-completion auto-incoming all emit caller groups this way).
pub fn random_delays<R: Rng>(rng: &mut R, count: usize) -> Vec<f32> {
    (0..count).map(|_| rng.gen_range(0.0..=2.0)).collect()
}

/// Pad each track's front with `round(delay*sample_rate)` zeros, extend all
/// tracks to the longest with trailing zeros, sum sample-wise, and
/// soft-limit by the peak absolute sample if it exceeds 1.0.
pub fn mix_down(tracks: &[MixTrack], sample_rate: u32) -> Vec<f32> {
    if tracks.is_empty() {
        return Vec::new();
    }
    let sr = sample_rate as f32;
    let padded: Vec<Vec<f32>> = tracks
        .iter()
        .map(|t| {
            let pad = (t.delay_secs * sr).round().max(0.0) as usize;
            let mut v = vec![0.0f32; pad];
            v.extend_from_slice(&t.samples);
            v
        })
        .collect();

    let max_len = padded.iter().map(|v| v.len()).max().unwrap_or(0);
    let mut mix = vec![0.0f32; max_len];
    for track in &padded {
        for (i, &s) in track.iter().enumerate() {
            mix[i] += s;
        }
    }

    let peak = mix.iter().fold(0.0f32, |acc, &s| acc.max(s.abs()));
    if peak > 1.0 {
        for s in mix.iter_mut() {
            *s /= peak;
        }
    }
    mix
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mix_down_pads_and_sums() {
        let tracks = vec![
            MixTrack { samples: vec![1.0, 1.0], delay_secs: 0.0 },
            MixTrack { samples: vec![1.0, 1.0], delay_secs: 1.0 },
        ];
        let mixed = mix_down(&tracks, 2);
        // Second track starts 2 samples in (1s * 2Hz), so no overlap here.
        assert_eq!(mixed, vec![1.0, 1.0, 1.0, 1.0]);
    }

    #[test]
    fn mix_down_soft_limits_overlapping_peaks() {
        let tracks = vec![
            MixTrack { samples: vec![0.9, 0.9], delay_secs: 0.0 },
            MixTrack { samples: vec![0.9, 0.9], delay_secs: 0.0 },
        ];
        let mixed = mix_down(&tracks, 2);
        assert!(mixed.iter().all(|&s| s <= 1.0 + 1e-6));
        assert!((mixed[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn random_delays_stay_in_band() {
        let mut rng = rand::thread_rng();
        let delays = random_delays(&mut rng, 5);
        assert_eq!(delays.len(), 5);
        assert!(delays.iter().all(|&d| (0.0..=2.0).contains(&d)));
    }
}
