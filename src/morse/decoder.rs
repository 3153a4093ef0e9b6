// src/morse/decoder.rs  —  C4: assembles classified marks/gaps into text.
//
// Two entry points share the same symbol-assembly and gap-flush logic:
//   * `Decoder`       — audio-sample driven, wraps `dsp::keying::KeyingDetector`
//                        end to end (Goertzel → AGC → hysteresis → adaptive
//                        dot estimate → gap classification → text).
//   * `PaddleDecoder` — discrete-element driven, for a hardware paddle/keyer
//                        thread that already knows each mark's exact
//                        duration and only needs gap timing against a wall
//                        clock (`std::time::Instant`). It reuses the same
//                        threshold formulas as `Decoder` so the two never
//                        drift apart, but tracks its own lightweight state
//                        since it runs on `Instant` rather than a frame
//                        counter.

use crate::dsp::keying::{
    char_gap_threshold_secs, update_dot_estimate, word_gap_threshold_secs, KeyEvent, KeyingConfig, KeyingDetector,
};
use crate::morse::table;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PaddleEvent {
    DitDown, DitUp,
    DahDown, DahUp,
    None,
}

#[derive(Debug, Clone)]
pub struct DecoderConfig {
    pub keying: KeyingConfig,
    /// Literal word whose concatenated Morse code is injected into the
    /// alphabet as a configurable "oops" / attention prosign (default
    /// "CAVE", matching the reference decoder).
    pub prosign_literal: String,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self { keying: KeyingConfig::default(), prosign_literal: "CAVE".into() }
    }
}

pub struct Decoder {
    cfg: DecoderConfig,
    keying: KeyingDetector,
    current_code: String,
    prosign_pattern: Option<String>,
    message_gap: bool,
}

impl Decoder {
    pub fn new(cfg: DecoderConfig) -> Self {
        let keying = KeyingDetector::new(cfg.keying.clone());
        let prosign_pattern = table::prosign_code(&cfg.prosign_literal.to_ascii_uppercase());
        Self { cfg, keying, current_code: String::new(), prosign_pattern, message_gap: false }
    }

    pub fn reset(&mut self) {
        self.keying.reset();
        self.current_code.clear();
        self.message_gap = false;
    }

    pub fn recalibrate(&mut self) {
        self.keying.recalibrate();
    }

    /// Offline noise-floor calibration from a captured noise-only buffer.
    /// See `KeyingDetector::calibrate_noise_floor`; returns `false` (leaving
    /// the noise floor unchanged) if the buffer is too short to yield a
    /// single full frame.
    pub fn calibrate_noise_floor(&mut self, noise_samples: &[f32]) -> bool {
        self.keying.calibrate_noise_floor(noise_samples)
    }

    pub fn thresholds(&self) -> (f32, f32) {
        self.keying.thresholds()
    }

    pub fn current_code(&self) -> &str { &self.current_code }
    pub fn tone_power(&self) -> f32 { self.keying.tone_power() }
    pub fn tone_hz(&self) -> f32 { self.keying.tone_hz() }
    pub fn noise_floor(&self) -> f32 { self.keying.noise_floor() }
    pub fn wpm_estimate(&self) -> f32 { self.keying.wpm_estimate() }
    pub fn is_key_down(&self) -> bool { self.keying.is_key_down() }
    pub fn dot_ms(&self) -> f32 { self.keying.dot_estimate_secs() * 1000.0 }

    /// Tone power relative to the noise floor, in dB — a live S-meter-style
    /// readout for the UI. 0 dB at the floor itself, negative below it.
    pub fn level_db(&self) -> f32 {
        let ratio = (self.keying.tone_power() / self.keying.noise_floor().max(1e-12)).max(1e-12);
        10.0 * ratio.log10()
    }

    /// True if a message gap (sustained silence past `message_gap_dots`/
    /// `message_gap_seconds`) fired since the last call; consumes the flag.
    /// The runtime worker uses this to decide when to hand the accumulated
    /// text over to the QSO state machine as one "message".
    pub fn take_message_gap(&mut self) -> bool {
        std::mem::take(&mut self.message_gap)
    }

    /// Feed a contiguous block of audio samples; returns any text decided
    /// during this call (may be empty, may contain multiple characters and
    /// spaces if the block spans several symbols).
    pub fn process_samples(&mut self, samples: &[f32]) -> String {
        let frame_len = ((self.cfg.keying.sample_rate as f32 * self.cfg.keying.frame_ms / 1000.0) as usize).max(1);
        let mut out = String::new();
        for frame in samples.chunks(frame_len) {
            for ev in self.keying.process_frame(frame) {
                self.apply_event(ev, &mut out);
            }
        }
        out
    }

    /// Flush any pending symbol/character as if a word gap had just
    /// elapsed — call at end-of-stream to avoid losing a trailing letter.
    pub fn finalize(&mut self) -> String {
        let mut out = String::new();
        if !self.current_code.is_empty() {
            if let Some(s) = self.flush_char() {
                out.push_str(&s);
            }
        }
        out
    }

    /// Convenience one-shot: `process_samples` then `finalize`, as a single
    /// string. Handy for offline tests and tooling.
    pub fn decode_audio(&mut self, samples: &[f32]) -> String {
        let mut out = self.process_samples(samples);
        out.push_str(&self.finalize());
        out
    }

    fn apply_event(&mut self, ev: KeyEvent, out: &mut String) {
        match ev {
            KeyEvent::Symbol { is_dash } => {
                self.current_code.push(if is_dash { '-' } else { '.' });
            }
            KeyEvent::CharGap => {
                if let Some(s) = self.flush_char() {
                    out.push_str(&s);
                }
            }
            KeyEvent::WordGap => {
                out.push(' ');
            }
            KeyEvent::MessageGap => {
                self.message_gap = true;
            }
        }
    }

    fn flush_char(&mut self) -> Option<String> {
        let code = std::mem::take(&mut self.current_code);
        if let Some(pattern) = &self.prosign_pattern {
            if code == *pattern {
                return Some(format!("<{}>", self.cfg.prosign_literal.to_ascii_uppercase()));
            }
        }
        table::code_to_char(&code).map(|c| c.to_string())
    }
}

/// Discrete-element companion for hardware paddle / keyer threads that
/// already know each mark's exact duration. Mirrors `Decoder`'s gap
/// thresholds so the two never disagree, but measures gaps against
/// `Instant::now()` instead of a frame counter.
pub struct PaddleDecoder {
    current_code: String,
    decoded_text: String,
    dot_estimate: f32,
    auto_wpm: bool,
    dot_ms_min: f32,
    dot_ms_max: f32,
    gap_char_threshold_dots: f32,
    gap_word_threshold_dots: f32,
    message_gap_dots: f32,
    down_durations: VecDeque<f32>,
    last_event: Instant,
    last_char_flush: Option<Instant>,
    prosign_pattern: Option<String>,
    prosign_literal: String,
}

impl PaddleDecoder {
    pub fn new(cfg: &DecoderConfig) -> Self {
        Self {
            current_code: String::new(),
            decoded_text: String::new(),
            dot_estimate: 1.2 / cfg.keying.wpm_target.max(1.0),
            auto_wpm: cfg.keying.auto_wpm,
            dot_ms_min: cfg.keying.dot_ms_min,
            dot_ms_max: cfg.keying.dot_ms_max,
            gap_char_threshold_dots: cfg.keying.gap_char_threshold_dots,
            gap_word_threshold_dots: cfg.keying.gap_word_threshold_dots,
            message_gap_dots: cfg.keying.message_gap_dots,
            down_durations: VecDeque::with_capacity(256),
            last_event: Instant::now(),
            last_char_flush: None,
            prosign_pattern: table::prosign_code(&cfg.prosign_literal.to_ascii_uppercase()),
            prosign_literal: cfg.prosign_literal.to_ascii_uppercase(),
        }
    }

    /// Call when a paddle element fires. `el_dur` is the element's own
    /// duration (no inter-element gap). Advances the internal clock to the
    /// projected end of the element so char/word gaps are measured from
    /// when the mark finishes, not when it started.
    pub fn push_element(&mut self, is_dash: bool, el_dur: Duration) {
        self.current_code.push(if is_dash { '-' } else { '.' });

        let secs = el_dur.as_secs_f32();
        if self.down_durations.len() >= 256 {
            self.down_durations.pop_front();
        }
        self.down_durations.push_back(secs);
        if self.auto_wpm {
            if let Some(updated) =
                update_dot_estimate(&self.down_durations, self.dot_estimate, self.dot_ms_min, self.dot_ms_max)
            {
                self.dot_estimate = updated;
            }
        }

        self.last_event = Instant::now() + el_dur;
    }

    /// Call every tick; returns newly completed text (character, a
    /// trailing space on word gap, or just a bare space once the word gap
    /// elapses after the last character was already flushed).
    pub fn tick(&mut self) -> Option<String> {
        let dot = self.dot_estimate;
        let char_threshold_secs = char_gap_threshold_secs(self.gap_char_threshold_dots, dot);
        let char_gap = Duration::from_secs_f32(char_threshold_secs);
        let word_gap =
            Duration::from_secs_f32(word_gap_threshold_secs(char_threshold_secs, self.gap_word_threshold_dots, dot));

        if self.current_code.is_empty() {
            if let Some(flushed_at) = self.last_char_flush {
                if flushed_at.elapsed() >= word_gap {
                    self.last_char_flush = None;
                    self.decoded_text.push(' ');
                    return Some(" ".to_string());
                }
            }
            return None;
        }

        let elapsed = self.last_event.elapsed();
        if elapsed >= word_gap {
            let s = self.flush_char();
            self.last_char_flush = None;
            self.decoded_text.push(' ');
            return s.map(|txt| format!("{txt} "));
        }
        if elapsed >= char_gap {
            let s = self.flush_char();
            self.last_char_flush = Some(Instant::now());
            return s;
        }
        None
    }

    fn flush_char(&mut self) -> Option<String> {
        let code = std::mem::take(&mut self.current_code);
        if let Some(pattern) = &self.prosign_pattern {
            if code == *pattern {
                let lit = format!("<{}>", self.prosign_literal);
                self.decoded_text.push_str(&lit);
                return Some(lit);
            }
        }
        table::code_to_char(&code).map(|c| {
            self.decoded_text.push(c);
            c.to_string()
        })
    }

    pub fn decoded_text(&self) -> &str { &self.decoded_text }
    pub fn current_code(&self) -> &str { &self.current_code }
    pub fn message_gap_dots(&self) -> f32 { self.message_gap_dots }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(freq: f32, sr: u32, n: usize, amp: f32, phase0: &mut f32) -> Vec<f32> {
        let step = 2.0 * std::f32::consts::PI * freq / sr as f32;
        (0..n)
            .map(|_| {
                let s = amp * phase0.sin();
                *phase0 += step;
                s
            })
            .collect()
    }

    fn build_samples(text: &str, wpm: f32, sr: u32, tone_hz: f32) -> Vec<f32> {
        let dot = 1.2 / wpm;
        let mut samples = Vec::new();
        let mut phase = 0.0f32;
        let words: Vec<&str> = text.split_whitespace().collect();
        for (wi, word) in words.iter().enumerate() {
            let chars: Vec<char> = word.chars().collect();
            for (ci, &ch) in chars.iter().enumerate() {
                if let Some(code) = table::char_to_code(ch) {
                    let elems: Vec<char> = code.chars().collect();
                    for (i, el) in elems.iter().enumerate() {
                        let d = if *el == '-' { dot * 3.0 } else { dot };
                        samples.extend(tone(tone_hz, sr, (d * sr as f32) as usize, 0.6, &mut phase));
                        if i + 1 < elems.len() {
                            samples.extend(std::iter::repeat(0.0f32).take((dot * sr as f32) as usize));
                        }
                    }
                    if ci + 1 < chars.len() {
                        samples.extend(std::iter::repeat(0.0f32).take((dot * 3.0 * sr as f32) as usize));
                    }
                }
            }
            if wi + 1 < words.len() {
                samples.extend(std::iter::repeat(0.0f32).take((dot * 7.0 * sr as f32) as usize));
            }
        }
        samples.extend(std::iter::repeat(0.0f32).take((dot * 20.0 * sr as f32) as usize));
        samples
    }

    #[test]
    fn decodes_a_short_word() {
        let sr = 8000;
        let samples = build_samples("SOS", 20.0, sr, 650.0);
        let cfg = DecoderConfig {
            keying: KeyingConfig {
                sample_rate: sr,
                auto_wpm: true,
                wpm_target: 20.0,
                min_key_down_ms: 2.0,
                min_key_up_ms: 2.0,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut dec = Decoder::new(cfg);
        let text = dec.decode_audio(&samples);
        let upper = text.to_uppercase();
        assert!(upper.contains('S'));
        assert!(upper.contains('O'));
    }

    #[test]
    fn paddle_decoder_accumulates_elements() {
        let cfg = DecoderConfig::default();
        let mut dec = PaddleDecoder::new(&cfg);
        dec.push_element(false, Duration::from_millis(60));
        dec.push_element(true, Duration::from_millis(180));
        assert_eq!(dec.current_code(), ".-");
    }
}
