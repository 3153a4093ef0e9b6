// src/morse/encoder.rs  —  C5: text → pulse list → audio samples.
use crate::morse::table::{self, Token};

pub type Pulse = (bool, f32); // (key_down, duration_seconds)

#[derive(Debug, Clone)]
pub struct EncoderConfig {
    pub sample_rate: u32,
    pub tone_hz: f32,
    pub wpm: f32,
    pub farnsworth_wpm: Option<f32>,
    pub volume: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    /// Bare-literal tokens treated as prosigns even without angle brackets
    /// (e.g. configured station sign-offs), compared case-insensitively.
    pub prosign_tokens: Vec<String>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            tone_hz: 650.0,
            wpm: 20.0,
            farnsworth_wpm: None,
            volume: 0.25,
            attack_ms: 4.0,
            release_ms: 6.0,
            prosign_tokens: vec!["KN".into()],
        }
    }
}

impl EncoderConfig {
    pub fn dot_seconds(&self) -> f32 { 1.2 / self.wpm.max(1.0) }

    /// Basis for inter-letter/inter-word spacing: the Farnsworth dot if one
    /// is configured and slower than the element-timing dot, else the same
    /// dot used for elements.
    pub fn space_dot_seconds(&self) -> f32 {
        match self.farnsworth_wpm {
            Some(fw) if (1.0..self.wpm).contains(&fw) => 1.2 / fw,
            _ => self.dot_seconds(),
        }
    }
}

/// Build the on/off pulse list for `text`, matching the reference
/// encoder's prosign detection (bracketed token OR bare literal configured
/// in `prosign_tokens`) and its Farnsworth-aware inter-letter/word gaps.
pub fn text_to_pulses(text: &str, cfg: &EncoderConfig) -> Vec<Pulse> {
    let tokens = table::tokenize(text);
    let mut pulses: Vec<Pulse> = Vec::new();
    let dot = cfg.dot_seconds();
    let char_gap = 3.0 * cfg.space_dot_seconds();
    let word_gap = 7.0 * cfg.space_dot_seconds();
    let prosign_set: std::collections::HashSet<String> =
        cfg.prosign_tokens.iter().map(|t| t.to_ascii_uppercase()).collect();

    let n_tokens = tokens.len();
    for (token_idx, token) in tokens.into_iter().enumerate() {
        let (is_prosign, letters): (bool, Vec<&'static str>) = match &token {
            Token::Prosign(lit) => {
                let codes: Vec<&'static str> = lit.chars().filter_map(table::char_to_code).collect();
                (true, codes)
            }
            Token::Word(w) => {
                let codes: Vec<&'static str> = w.chars().filter_map(table::char_to_code).collect();
                (prosign_set.contains(w), codes)
            }
        };
        if letters.is_empty() {
            continue;
        }
        let letter_gap = if is_prosign { dot } else { char_gap };
        let n_letters = letters.len();
        for (letter_idx, morse) in letters.into_iter().enumerate() {
            let elems: Vec<char> = morse.chars().collect();
            let n_elems = elems.len();
            for (element_idx, el) in elems.into_iter().enumerate() {
                pulses.push((true, if el == '.' { dot } else { 3.0 * dot }));
                if element_idx + 1 < n_elems {
                    pulses.push((false, dot));
                }
            }
            if letter_idx + 1 < n_letters {
                pulses.push((false, letter_gap));
            }
        }
        if token_idx + 1 < n_tokens {
            pulses.push((false, word_gap));
        }
    }
    merge_same_state_pulses(pulses)
}

fn merge_same_state_pulses(pulses: Vec<Pulse>) -> Vec<Pulse> {
    let mut merged: Vec<Pulse> = Vec::with_capacity(pulses.len());
    for (state, dur) in pulses {
        if let Some(last) = merged.last_mut() {
            if last.0 == state {
                last.1 += dur;
                continue;
            }
        }
        merged.push((state, dur));
    }
    merged
}

/// Render `text` to a phase-continuous sine-wave sample buffer with
/// attack/release envelope shaping on every mark, plus 0.3s of trailing
/// silence so a downstream decoder's word/message gap has room to flush.
pub fn render_samples(text: &str, cfg: &EncoderConfig) -> Vec<f32> {
    let pulses = text_to_pulses(text, cfg);
    if pulses.is_empty() {
        return vec![0.0; 1];
    }

    let sr = cfg.sample_rate as f32;
    let volume = cfg.volume.clamp(0.0, 1.0);
    let attack_samples = ((sr * cfg.attack_ms / 1000.0).max(0.0)) as usize;
    let release_samples = ((sr * cfg.release_ms / 1000.0).max(0.0)) as usize;

    let mut out = Vec::new();
    let mut phase = 0.0f32;
    let phase_step = 2.0 * std::f32::consts::PI * cfg.tone_hz / sr;

    for (is_on, dur_secs) in pulses {
        let n = ((dur_secs * sr).round() as usize).max(1);
        if !is_on {
            out.extend(std::iter::repeat(0.0f32).take(n));
            continue;
        }

        let a = attack_samples.min(n);
        let r = release_samples.min(n);
        let mut env = vec![1.0f32; n];
        if a > 0 {
            for (i, e) in env.iter_mut().take(a).enumerate() {
                *e = i as f32 / a as f32;
            }
        }
        if r > 0 {
            let start = n - r;
            for (i, e) in env.iter_mut().skip(start).enumerate() {
                *e *= 1.0 - (i as f32 / r as f32);
            }
        }
        if a + r > n && n > 1 {
            let mid = n / 2;
            for (i, e) in env.iter_mut().take(mid).enumerate() {
                *e = i as f32 / mid as f32;
            }
            let tail = n - mid;
            for (i, e) in env.iter_mut().skip(mid).enumerate() {
                *e = 1.0 - (i as f32 / tail as f32);
            }
        }

        for e in env {
            out.push(phase.sin() * e * volume);
            phase += phase_step;
            if phase > 2.0 * std::f32::consts::PI {
                phase -= 2.0 * std::f32::consts::PI;
            }
        }
    }

    let tail = ((0.3 * sr) as usize).max(1);
    out.extend(std::iter::repeat(0.0f32).take(tail));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merges_adjacent_silences() {
        let merged = merge_same_state_pulses(vec![(false, 0.1), (false, 0.2), (true, 0.05)]);
        assert_eq!(merged, vec![(false, 0.3), (true, 0.05)]);
    }

    #[test]
    fn prosign_has_no_interletter_gap() {
        let cfg = EncoderConfig { wpm: 20.0, ..Default::default() };
        let pulses = text_to_pulses("<AR>", &cfg);
        let dot = cfg.dot_seconds();
        // AR = .-  .-.-.  => A(.-) then R(.-.) joined only by a 1-dot gap,
        // never the 3-dot char gap, since the whole token is one prosign.
        let silences: Vec<f32> = pulses.iter().filter(|(on, _)| !on).map(|(_, d)| *d).collect();
        assert!(silences.iter().all(|d| (d - dot).abs() < 1e-4 || *d > 2.0 * dot));
    }

    #[test]
    fn render_samples_has_trailing_silence() {
        let cfg = EncoderConfig { sample_rate: 8000, wpm: 20.0, ..Default::default() };
        let samples = render_samples("E", &cfg);
        let tail = &samples[samples.len() - 100..];
        assert!(tail.iter().all(|&s| s == 0.0));
    }
}
