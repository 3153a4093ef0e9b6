// src/dsp/keying.rs  —  AGC noise floor, hysteresis, debounce, adaptive dot
// estimate, and gap classification (C3 of the signal chain).
//
// This is frame-driven: `KeyingDetector::process_frame` is meant to be fed
// consecutive, non-overlapping chunks of audio at `sample_rate`, each
// `frame_ms` long. It owns the adaptive WPM estimate because that estimate
// is derived purely from observed mark durations, which are a keying
// concept, not a text-decoding one.

use super::tone::{dominant_frequency, goertzel_power};
use std::collections::VecDeque;

const HISTORY_CAP: usize = 256;

#[derive(Debug, Clone)]
pub struct KeyingConfig {
    pub sample_rate: u32,
    pub frame_ms: f32,
    pub target_tone_hz: f32,
    pub auto_tone: bool,
    pub tone_search_min_hz: f32,
    pub tone_search_max_hz: f32,
    pub threshold_on_mult: f32,
    pub threshold_off_mult: f32,
    pub agc_alpha: f32,
    pub power_smooth_alpha: f32,
    pub wpm_target: f32,
    pub auto_wpm: bool,
    pub dot_ms_min: f32,
    pub dot_ms_max: f32,
    pub min_key_down_ms: f32,
    pub min_key_up_ms: f32,
    pub min_key_down_dot_ratio: f32,
    pub min_key_up_dot_ratio: f32,
    pub dash_threshold_dots: f32,
    pub gap_char_threshold_dots: f32,
    pub gap_word_threshold_dots: f32,
    pub message_gap_dots: f32,
    pub message_gap_seconds: Option<f32>,
}

impl Default for KeyingConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            frame_ms: 10.0,
            target_tone_hz: 650.0,
            auto_tone: false,
            tone_search_min_hz: 300.0,
            tone_search_max_hz: 1200.0,
            threshold_on_mult: 4.0,
            threshold_off_mult: 2.4,
            agc_alpha: 0.03,
            power_smooth_alpha: 1.0,
            wpm_target: 20.0,
            auto_wpm: true,
            dot_ms_min: 25.0,
            dot_ms_max: 220.0,
            min_key_down_ms: 12.0,
            min_key_up_ms: 12.0,
            min_key_down_dot_ratio: 0.0,
            min_key_up_dot_ratio: 0.0,
            dash_threshold_dots: 2.0,
            gap_char_threshold_dots: 1.8,
            gap_word_threshold_dots: 5.0,
            message_gap_dots: 12.0,
            message_gap_seconds: None,
        }
    }
}

/// Event produced as soon as it becomes decidable: a completed mark
/// (classified dot/dash) or one of the three gap thresholds crossing while
/// the key stays up. Gap events are armed once per key-up interval — see
/// `gap_flushed_symbol` / `gap_flushed_word` / `gap_emitted_message` below.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KeyEvent {
    Symbol { is_dash: bool },
    CharGap,
    WordGap,
    MessageGap,
}

/// Opaque record of a completed key-down → key-up transition, exposed for
/// UI/debug readouts.
#[derive(Debug, Clone, Copy)]
pub struct KeyTransition {
    pub is_dash: bool,
    pub duration_secs: f32,
}

pub fn debounce_floor(absolute_ms: f32, ratio: f32, dot_ref_secs: f32) -> f32 {
    (absolute_ms / 1000.0).max(ratio * dot_ref_secs)
}

pub fn dash_threshold_secs(dash_threshold_dots: f32, dot_secs: f32) -> f32 {
    dash_threshold_dots.max(1.6) * dot_secs
}

pub fn char_gap_threshold_secs(gap_char_threshold_dots: f32, dot_secs: f32) -> f32 {
    gap_char_threshold_dots.max(1.6) * dot_secs
}

pub fn word_gap_threshold_secs(char_threshold_secs: f32, gap_word_threshold_dots: f32, dot_secs: f32) -> f32 {
    (char_threshold_secs + 0.8 * dot_secs).max(gap_word_threshold_dots * dot_secs)
}

pub fn message_gap_threshold_secs(
    message_gap_dots: f32,
    override_secs: Option<f32>,
    dot_secs: f32,
    frame_dur_secs: f32,
) -> f32 {
    let secs = match override_secs {
        Some(s) if s > 0.0 => s,
        _ => message_gap_dots * dot_secs,
    };
    secs.max(frame_dur_secs)
}

/// Median-of-lower-half of observed mark durations, blended 85/15 with the
/// previous estimate, clamped to the configured dot range. Returns `None`
/// when fewer than six marks have been observed yet.
pub fn update_dot_estimate(history: &VecDeque<f32>, old_secs: f32, dot_ms_min: f32, dot_ms_max: f32) -> Option<f32> {
    if history.len() < 6 {
        return None;
    }
    let mut v: Vec<f32> = history.iter().copied().collect();
    v.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let half = &v[..(v.len() / 2).max(1)];
    let median = half[half.len() / 2];
    let clamped = median.clamp(dot_ms_min / 1000.0, dot_ms_max / 1000.0);
    Some(0.85 * old_secs + 0.15 * clamped)
}

pub struct KeyingDetector {
    cfg: KeyingConfig,
    dot_estimate: f32,
    power_smooth: f32,
    noise_floor: f32,
    key_down: bool,
    elapsed: f64,
    down_since: f64,
    up_since: f64,
    down_durations: VecDeque<f32>,
    gap_flushed_symbol: bool,
    gap_flushed_word: bool,
    gap_emitted_message: bool,
    last_tone_hz: f32,
    last_power: f32,
}

impl KeyingDetector {
    pub fn new(cfg: KeyingConfig) -> Self {
        let dot_estimate = 1.2 / cfg.wpm_target.max(1.0);
        let last_tone_hz = cfg.target_tone_hz;
        Self {
            cfg,
            dot_estimate,
            power_smooth: 0.0,
            noise_floor: 1e-9,
            key_down: false,
            elapsed: 0.0,
            down_since: 0.0,
            up_since: 0.0,
            down_durations: VecDeque::with_capacity(HISTORY_CAP),
            gap_flushed_symbol: true,
            gap_flushed_word: true,
            gap_emitted_message: true,
            last_tone_hz,
            last_power: 0.0,
        }
    }

    /// Full reinitialization: dot estimate goes back to the configured
    /// target WPM and all learned history is discarded.
    pub fn reset(&mut self) {
        let cfg = self.cfg.clone();
        *self = Self::new(cfg);
    }

    /// Keep the learned dot estimate and mark-duration history but refresh
    /// tone tracking and the noise floor — used when resuming from PAUSED.
    pub fn recalibrate(&mut self) {
        self.power_smooth = 0.0;
        self.noise_floor = 1e-9;
        self.key_down = false;
        self.gap_flushed_symbol = true;
        self.gap_flushed_word = true;
        self.gap_emitted_message = true;
    }

    /// Offline noise calibration: given a captured noise-only buffer (no
    /// keying), split it into consecutive frames at the configured
    /// frame size, compute each frame's tone power at the target frequency,
    /// and set the noise floor to the 75th percentile of that distribution.
    /// Invoked once before real operation begins; leaves the floor
    /// unchanged (and returns `false`) if the buffer yields no full frame.
    pub fn calibrate_noise_floor(&mut self, noise_samples: &[f32]) -> bool {
        let frame_len = ((self.cfg.sample_rate as f32 * self.cfg.frame_ms / 1000.0).round() as usize).max(1);
        if noise_samples.len() < frame_len {
            return false;
        }
        let mut powers: Vec<f32> = noise_samples
            .chunks(frame_len)
            .filter(|c| c.len() == frame_len)
            .map(|c| goertzel_power(c, self.cfg.target_tone_hz, self.cfg.sample_rate))
            .collect();
        if powers.is_empty() {
            return false;
        }
        powers.sort_by(|a, b| a.partial_cmp(b).unwrap());
        let idx = (((powers.len() - 1) as f32) * 0.75).round() as usize;
        self.noise_floor = powers[idx.min(powers.len() - 1)];
        self.power_smooth = self.noise_floor;
        true
    }

    /// Current on/off thresholds, derived from the noise floor — exposed so
    /// a caller can report the result of `calibrate_noise_floor`.
    pub fn thresholds(&self) -> (f32, f32) {
        let on = (self.noise_floor * self.cfg.threshold_on_mult).max(1e-12);
        let off = (self.noise_floor * self.cfg.threshold_off_mult).max(1e-12);
        (on, off)
    }

    pub fn dot_estimate_secs(&self) -> f32 { self.dot_estimate }
    pub fn noise_floor(&self) -> f32 { self.noise_floor }
    pub fn tone_power(&self) -> f32 { self.last_power }
    pub fn tone_hz(&self) -> f32 { self.last_tone_hz }
    pub fn is_key_down(&self) -> bool { self.key_down }
    pub fn wpm_estimate(&self) -> f32 { 1.2 / self.dot_estimate.max(0.001) }

    /// Process one frame of audio samples and return any events that became
    /// decidable this frame (zero, one, or several — multiple gap thresholds
    /// can cross within the same frame on a very short frame size).
    pub fn process_frame(&mut self, frame: &[f32]) -> Vec<KeyEvent> {
        let cfg = &self.cfg;
        let n = frame.len().max(1);
        let frame_dur = n as f64 / cfg.sample_rate as f64;

        let tone_hz = if cfg.auto_tone {
            dominant_frequency(frame, cfg.sample_rate, cfg.tone_search_min_hz, cfg.tone_search_max_hz)
                .unwrap_or(self.last_tone_hz)
        } else {
            cfg.target_tone_hz
        };
        self.last_tone_hz = tone_hz;

        let power = goertzel_power(frame, tone_hz, cfg.sample_rate);
        let smooth_alpha = cfg.power_smooth_alpha.clamp(0.01, 1.0);
        self.power_smooth += smooth_alpha * (power - self.power_smooth);
        self.last_power = self.power_smooth;

        if !self.key_down {
            let agc_alpha = cfg.agc_alpha.clamp(0.001, 0.5);
            self.noise_floor += agc_alpha * (self.power_smooth - self.noise_floor);
        }

        let threshold_on = (self.noise_floor * cfg.threshold_on_mult).max(1e-12);
        let threshold_off = (self.noise_floor * cfg.threshold_off_mult).max(1e-12);
        let raw_down = if self.key_down {
            self.power_smooth > threshold_off
        } else {
            self.power_smooth > threshold_on
        };

        let mut events = Vec::new();
        self.elapsed += frame_dur;

        if raw_down != self.key_down {
            let candidate_dur = if self.key_down {
                (self.elapsed - self.down_since) as f32
            } else {
                (self.elapsed - self.up_since) as f32
            };
            let min_dur = if self.key_down {
                debounce_floor(cfg.min_key_down_ms, cfg.min_key_down_dot_ratio, self.dot_estimate)
            } else {
                debounce_floor(cfg.min_key_up_ms, cfg.min_key_up_dot_ratio, self.dot_estimate)
            };
            if candidate_dur >= min_dur {
                self.on_transition(raw_down, &mut events);
            }
        }

        if !self.key_down {
            self.handle_gap_progress(&mut events);
        }

        events
    }

    fn on_transition(&mut self, now_down: bool, events: &mut Vec<KeyEvent>) {
        if self.key_down && !now_down {
            let dur = (self.elapsed - self.down_since) as f32;
            if self.down_durations.len() >= HISTORY_CAP {
                self.down_durations.pop_front();
            }
            self.down_durations.push_back(dur);
            if self.cfg.auto_wpm {
                if let Some(updated) =
                    update_dot_estimate(&self.down_durations, self.dot_estimate, self.cfg.dot_ms_min, self.cfg.dot_ms_max)
                {
                    self.dot_estimate = updated;
                }
            }
            let dash_threshold = dash_threshold_secs(self.cfg.dash_threshold_dots, self.dot_estimate);
            events.push(KeyEvent::Symbol { is_dash: dur >= dash_threshold });
            self.up_since = self.elapsed;
            self.gap_flushed_symbol = false;
            self.gap_flushed_word = false;
            self.gap_emitted_message = false;
        } else if !self.key_down && now_down {
            self.down_since = self.elapsed;
        }
        self.key_down = now_down;
    }

    fn handle_gap_progress(&mut self, events: &mut Vec<KeyEvent>) {
        let gap = (self.elapsed - self.up_since) as f32;
        let dot = self.dot_estimate;
        let char_threshold = char_gap_threshold_secs(self.cfg.gap_char_threshold_dots, dot);
        let word_threshold = word_gap_threshold_secs(char_threshold, self.cfg.gap_word_threshold_dots, dot);
        let frame_dur = self.cfg.frame_ms / 1000.0;
        let message_threshold =
            message_gap_threshold_secs(self.cfg.message_gap_dots, self.cfg.message_gap_seconds, dot, frame_dur);

        if !self.gap_flushed_symbol && gap >= char_threshold {
            self.gap_flushed_symbol = true;
            events.push(KeyEvent::CharGap);
        }
        if !self.gap_flushed_word && gap >= word_threshold {
            self.gap_flushed_word = true;
            events.push(KeyEvent::WordGap);
        }
        if !self.gap_emitted_message && gap >= message_threshold {
            self.gap_emitted_message = true;
            events.push(KeyEvent::MessageGap);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone_frame(freq: f32, sample_rate: u32, n: usize, amp: f32, phase0: &mut f32) -> Vec<f32> {
        let mut out = Vec::with_capacity(n);
        let step = 2.0 * std::f32::consts::PI * freq / sample_rate as f32;
        for _ in 0..n {
            out.push(amp * phase0.sin());
            *phase0 += step;
        }
        out
    }

    #[test]
    fn detects_a_single_dot_and_following_char_gap() {
        let cfg = KeyingConfig {
            sample_rate: 8000,
            frame_ms: 5.0,
            wpm_target: 20.0,
            auto_wpm: false,
            min_key_down_ms: 1.0,
            min_key_up_ms: 1.0,
            ..Default::default()
        };
        let mut det = KeyingDetector::new(cfg.clone());
        let frame_len = (cfg.sample_rate as f32 * cfg.frame_ms / 1000.0) as usize;
        let dot_secs = 1.2 / 20.0;
        let mut phase = 0.0f32;

        let mut saw_symbol = false;
        let mut saw_char_gap = false;

        let mark_frames = ((dot_secs * cfg.sample_rate as f32) as usize / frame_len).max(1);
        for _ in 0..mark_frames {
            let f = tone_frame(cfg.target_tone_hz, cfg.sample_rate, frame_len, 0.5, &mut phase);
            for ev in det.process_frame(&f) {
                if let KeyEvent::Symbol { is_dash } = ev {
                    saw_symbol = true;
                    assert!(!is_dash);
                }
            }
        }

        let silence_frames = (((dot_secs * 3.0) * cfg.sample_rate as f32) as usize / frame_len) + 2;
        for _ in 0..silence_frames {
            let f = vec![0.0f32; frame_len];
            for ev in det.process_frame(&f) {
                if ev == KeyEvent::CharGap {
                    saw_char_gap = true;
                }
            }
        }

        assert!(saw_symbol, "expected a classified mark");
        assert!(saw_char_gap, "expected a char-gap event after silence");
    }

    #[test]
    fn debounce_rejects_short_glitch() {
        let floor = debounce_floor(12.0, 0.0, 0.06);
        assert!((floor - 0.012).abs() < 1e-6);
        let floor_ratio = debounce_floor(0.0, 0.3, 0.06);
        assert!((floor_ratio - 0.018).abs() < 1e-6);
    }

    #[test]
    fn noise_calibration_sets_floor_above_zero_from_75th_percentile() {
        let cfg = KeyingConfig { sample_rate: 8000, frame_ms: 10.0, ..Default::default() };
        let mut det = KeyingDetector::new(cfg.clone());

        // Deterministic pseudo-noise: not all-zero, so per-frame Goertzel
        // power varies frame to frame and has a well-defined percentile.
        let frame_len = (cfg.sample_rate as f32 * cfg.frame_ms / 1000.0) as usize;
        let mut seed = 12345u32;
        let mut next = || {
            seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
            ((seed >> 8) as f32 / u32::MAX as f32) * 2.0 - 1.0
        };
        let noise: Vec<f32> = (0..frame_len * 50).map(|_| next() * 0.1).collect();

        let ok = det.calibrate_noise_floor(&noise);
        assert!(ok);
        assert!(det.noise_floor() > 0.0);
        let (on, off) = det.thresholds();
        assert!((on - det.noise_floor() * cfg.threshold_on_mult).abs() < 1e-9);
        assert!((off - det.noise_floor() * cfg.threshold_off_mult).abs() < 1e-9);
        assert!(on > off);
    }

    #[test]
    fn noise_calibration_fails_gracefully_on_short_buffer() {
        let cfg = KeyingConfig { sample_rate: 8000, frame_ms: 10.0, ..Default::default() };
        let mut det = KeyingDetector::new(cfg);
        let before = det.noise_floor();
        assert!(!det.calibrate_noise_floor(&[0.0; 4]));
        assert_eq!(det.noise_floor(), before);
    }

    #[test]
    fn dot_estimate_requires_six_samples() {
        let mut hist = VecDeque::new();
        for _ in 0..5 {
            hist.push_back(0.05);
        }
        assert!(update_dot_estimate(&hist, 0.06, 25.0, 220.0).is_none());
        hist.push_back(0.05);
        assert!(update_dot_estimate(&hist, 0.06, 25.0, 220.0).is_some());
    }
}
