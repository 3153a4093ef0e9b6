// src/qso/profiles.rs  —  C8: per-caller random TX speed/tone registry
use rand::Rng;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
pub struct StationProfile {
    pub wpm: f32,
    pub tone_hz: f32,
}

/// Caller callsign → assigned profile. Sampled once on first reference and
/// held for the lifetime of the running session; cleared on a full stop,
/// preserved across pause.
#[derive(Debug, Default)]
pub struct StationProfileRegistry {
    profiles: HashMap<String, StationProfile>,
}

impl StationProfileRegistry {
    pub fn new() -> Self { Self::default() }

    pub fn clear(&mut self) { self.profiles.clear(); }

    pub fn profile_for<R: Rng>(
        &mut self,
        call: &str,
        rng: &mut R,
        wpm_range: (f32, f32),
        tone_range: (f32, f32),
    ) -> StationProfile {
        *self.profiles.entry(call.to_string()).or_insert_with(|| {
            let (wpm_lo, wpm_hi) = ordered(wpm_range);
            let (tone_lo, tone_hi) = ordered(tone_range);
            StationProfile {
                wpm: round1(rng.gen_range(wpm_lo..=wpm_hi)),
                tone_hz: round1(rng.gen_range(tone_lo..=tone_hi)),
            }
        })
    }
}

fn ordered((a, b): (f32, f32)) -> (f32, f32) {
    if a <= b { (a, b) } else { (b, a) }
}

fn round1(v: f32) -> f32 { (v * 10.0).round() / 10.0 }

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    #[test]
    fn same_caller_reuses_profile() {
        let mut reg = StationProfileRegistry::new();
        let mut rng = SmallRng::seed_from_u64(1);
        let a = reg.profile_for("N1MM", &mut rng, (18.0, 22.0), (550.0, 750.0));
        let b = reg.profile_for("N1MM", &mut rng, (18.0, 22.0), (550.0, 750.0));
        assert_eq!(a.wpm, b.wpm);
        assert_eq!(a.tone_hz, b.tone_hz);
    }

    #[test]
    fn reversed_ranges_are_sorted() {
        let mut reg = StationProfileRegistry::new();
        let mut rng = SmallRng::seed_from_u64(2);
        let p = reg.profile_for("N1MM", &mut rng, (22.0, 18.0), (750.0, 550.0));
        assert!((18.0..=22.0).contains(&p.wpm));
        assert!((550.0..=750.0).contains(&p.tone_hz));
    }

    #[test]
    fn clear_forgets_assignments() {
        let mut reg = StationProfileRegistry::new();
        let mut rng = SmallRng::seed_from_u64(3);
        reg.profile_for("N1MM", &mut rng, (20.0, 20.0), (650.0, 650.0));
        reg.clear();
        assert!(reg.profiles.is_empty());
    }
}
