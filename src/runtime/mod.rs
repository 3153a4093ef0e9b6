// src/runtime/mod.rs  —  the single logical worker: drains decoded text into
// the QSO engine and renders its replies into playable sample buffers.
// Grounded in the teacher's `main.rs` loop (decoder.tick() → engine.tick() →
// audio channel), generalized from live on/off-keying playback to the
// sample-rendering pipeline and from a single simulated station to a
// pile-up of independently profiled callers.
use rand::Rng;

use crate::audio::mixer::{self, MixTrack};
use crate::morse::decoder::DecoderConfig;
use crate::morse::encoder::EncoderConfig;
use crate::morse::{render_samples, Decoder};
use crate::qso::profiles::StationProfileRegistry;
use crate::qso::{QsoEngine, QsoResult, QsoSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Stopped,
    Running,
    Paused,
}

pub struct DecoderReadout {
    pub current_code: String,
    pub wpm_estimate: f32,
    pub tone_hz: f32,
    pub noise_floor: f32,
    pub is_key_down: bool,
    pub dot_ms: f32,
    pub level_db: f32,
}

pub struct Worker<R: Rng> {
    decoder: Decoder,
    engine: QsoEngine<R>,
    profiles: StationProfileRegistry,
    encoder_cfg: EncoderConfig,
    wpm_out_range: (f32, f32),
    tone_out_range: (f32, f32),
    sample_rate: u32,
    state: RuntimeState,
    pending_text: String,
    decoded_log: String,
}

impl<R: Rng> Worker<R> {
    pub fn new(
        decoder_cfg: DecoderConfig,
        encoder_cfg: EncoderConfig,
        wpm_out_range: (f32, f32),
        tone_out_range: (f32, f32),
        engine: QsoEngine<R>,
    ) -> Self {
        let sample_rate = encoder_cfg.sample_rate;
        Self {
            decoder: Decoder::new(decoder_cfg),
            engine,
            profiles: StationProfileRegistry::new(),
            encoder_cfg,
            wpm_out_range,
            tone_out_range,
            sample_rate,
            state: RuntimeState::Stopped,
            pending_text: String::new(),
            decoded_log: String::new(),
        }
    }

    pub fn state(&self) -> RuntimeState { self.state }
    pub fn snapshot(&self) -> QsoSnapshot { self.engine.snapshot() }
    pub fn decoded_log(&self) -> &str { &self.decoded_log }
    pub fn engine(&self) -> &QsoEngine<R> { &self.engine }

    /// Offline noise calibration (spec §4.2): set the decoder's noise floor
    /// from the 75th percentile of per-frame tone power in a captured
    /// noise-only buffer. Meant to run once before `start()`, with the
    /// caller responsible for the capture-duration deadline clock (spec §5).
    pub fn calibrate_noise_floor(&mut self, noise_samples: &[f32]) -> bool {
        self.decoder.calibrate_noise_floor(noise_samples)
    }

    pub fn decoder_readout(&self) -> DecoderReadout {
        DecoderReadout {
            current_code: self.decoder.current_code().to_string(),
            wpm_estimate: self.decoder.wpm_estimate(),
            tone_hz: self.decoder.tone_hz(),
            noise_floor: self.decoder.noise_floor(),
            is_key_down: self.decoder.is_key_down(),
            dot_ms: self.decoder.dot_ms(),
            level_db: self.decoder.level_db(),
        }
    }

    /// STOPPED→RUNNING: resets the decoder's learned state and counters.
    pub fn start(&mut self) {
        self.decoder.reset();
        self.state = RuntimeState::Running;
    }

    /// RUNNING→PAUSED: the caller stops feeding samples; any in-flight
    /// playback is the caller's responsibility to abort.
    pub fn pause(&mut self) {
        self.state = RuntimeState::Paused;
    }

    /// PAUSED→RUNNING: refreshes tone tracking / noise floor but keeps the
    /// learned dot estimate and mark history.
    pub fn resume(&mut self) {
        self.decoder.recalibrate();
        self.state = RuntimeState::Running;
    }

    /// Any state → STOPPED: tears down the decoder and QSO machine and
    /// forgets all assigned station profiles.
    pub fn stop(&mut self) {
        self.decoder.reset();
        self.engine.reset();
        self.profiles.clear();
        self.pending_text.clear();
        self.decoded_log.clear();
        self.state = RuntimeState::Stopped;
    }

    pub fn manual_reset(&mut self) {
        self.engine.reset();
        self.pending_text.clear();
        self.profiles.clear();
    }

    fn push_decoded(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.decoded_log.push_str(text);
        if self.decoded_log.len() > 400 {
            let trim = self.decoded_log.len() - 400;
            self.decoded_log.drain(0..trim);
        }
    }

    /// Feed one block of captured audio. Returns the protocol outcome once a
    /// message-gap flush hands accumulated text to the QSO engine.
    pub fn feed_samples(&mut self, samples: &[f32]) -> Option<QsoResult> {
        if self.state != RuntimeState::Running {
            return None;
        }
        let text = self.decoder.process_samples(samples);
        self.push_decoded(&text);
        self.pending_text.push_str(&text);

        if self.decoder.take_message_gap() {
            let tail = self.decoder.finalize();
            self.push_decoded(&tail);
            self.pending_text.push_str(&tail);
            return self.flush_pending();
        }
        None
    }

    /// Keyboard fallback: submit a fully-typed line directly, bypassing the
    /// CW decoder entirely.
    pub fn submit_text(&mut self, text: &str) -> Option<QsoResult> {
        if self.state != RuntimeState::Running || text.trim().is_empty() {
            return None;
        }
        self.pending_text.push_str(text.trim());
        self.pending_text.push(' ');
        self.push_decoded(&format!("{} ", text.trim()));
        Some(self.engine.process_text(&self.take_pending_upper()))
    }

    /// Force the currently accumulated text through the engine without
    /// waiting for a message gap (used by `--simulate`'s line-mode REPL,
    /// where each stdin line already is one full "over").
    pub fn flush_pending(&mut self) -> Option<QsoResult> {
        let text = self.take_pending_upper();
        if text.is_empty() {
            return None;
        }
        Some(self.engine.process_text(&text))
    }

    fn take_pending_upper(&mut self) -> String {
        let text = std::mem::take(&mut self.pending_text);
        text.trim().to_ascii_uppercase()
    }

    /// Render a `QsoResult`'s replies into the playable sample buffers to
    /// enqueue, in emission order. Per spec.md §4.9, only a run of *caller*
    /// replies (S0 acceptance, post-QSO re-emission, auto-incoming — the
    /// "{CALL} {CALL}" shape `extract_group_callsign` recognizes) is mixed
    /// down into one parallel buffer; every other reply (RR, report reply,
    /// EE, ...) is rendered and enqueued on its own, serially, even when it
    /// shares a single `QsoResult` with a caller batch (e.g. the "EE" that
    /// precedes a re-emitted pending-caller group after a completion).
    pub fn render_replies(&mut self, replies: &[String]) -> Vec<Vec<f32>> {
        let mut rng = rand::thread_rng();
        let mut buffers = Vec::new();
        let mut i = 0;
        while i < replies.len() {
            if extract_group_callsign(&replies[i]).is_some() {
                let start = i;
                while i < replies.len() && extract_group_callsign(&replies[i]).is_some() {
                    i += 1;
                }
                buffers.push(self.render_caller_group(&replies[start..i], &mut rng));
            } else {
                let call = self.caller_for(&replies[i], &mut rng);
                let cfg = self.profile_encoder_cfg(&call, &mut rng);
                buffers.push(render_samples(&replies[i], &cfg));
                i += 1;
            }
        }
        buffers
    }

    /// Render one contiguous run of caller replies. A lone caller (no actual
    /// parallelism) is rendered straight through like any other single
    /// reply; two or more go through the delay/mix/soft-limit pipeline.
    fn render_caller_group(&mut self, group: &[String], rng: &mut impl Rng) -> Vec<f32> {
        if group.len() == 1 {
            let call = self.caller_for(&group[0], rng);
            let cfg = self.profile_encoder_cfg(&call, rng);
            return render_samples(&group[0], &cfg);
        }

        let delays = mixer::random_delays(rng, group.len());
        let mut tracks = Vec::with_capacity(group.len());
        for (reply, delay_secs) in group.iter().zip(delays) {
            let call = self.caller_for(reply, rng);
            let cfg = self.profile_encoder_cfg(&call, rng);
            tracks.push(MixTrack { samples: render_samples(reply, &cfg), delay_secs });
        }
        mixer::mix_down(&tracks, self.sample_rate)
    }

    fn caller_for(&self, reply: &str, _rng: &mut impl Rng) -> String {
        extract_group_callsign(reply).map(str::to_string).unwrap_or_else(|| self.engine.active_other_call().to_string())
    }

    fn profile_encoder_cfg(&mut self, call: &str, rng: &mut impl Rng) -> EncoderConfig {
        let profile = self.profiles.profile_for(call, rng, self.wpm_out_range, self.tone_out_range);
        EncoderConfig { tone_hz: profile.tone_hz, wpm: profile.wpm, ..self.encoder_cfg.clone() }
    }
}

/// The default "caller_call"/"repeat_selected_call"/p2p-repeat templates all
/// render as two identical space-separated tokens ("{CALL} {CALL}"); that
/// shape is used here to recover which station a given TX line belongs to
/// without widening `QsoResult`'s contract to carry caller metadata.
fn extract_group_callsign(reply: &str) -> Option<&str> {
    let mut parts = reply.split_whitespace();
    let a = parts.next()?;
    let b = parts.next()?;
    if b == a && parts.next().is_none() {
        Some(a)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qso::patterns;
    use crate::qso::state::QsoConfig;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn extracts_callsign_from_doubled_template() {
        assert_eq!(extract_group_callsign("N1MM N1MM"), Some("N1MM"));
        assert_eq!(extract_group_callsign("RR"), None);
        assert_eq!(extract_group_callsign("KN UR 5NN 5NN TU 73 KN"), None);
    }

    fn worker() -> Worker<SmallRng> {
        let engine = QsoEngine::new(
            QsoConfig::default(),
            patterns::default_exchange_patterns(),
            vec![],
            vec![],
            SmallRng::seed_from_u64(1),
        );
        Worker::new(DecoderConfig::default(), EncoderConfig::default(), (20.0, 20.0), (650.0, 650.0), engine)
    }

    #[test]
    fn non_caller_reply_renders_as_its_own_serial_buffer() {
        let mut w = worker();
        let buffers = w.render_replies(&["RR".to_string()]);
        assert_eq!(buffers.len(), 1);
        assert!(!buffers[0].is_empty());
    }

    #[test]
    fn non_caller_reply_and_caller_group_split_into_separate_buffers() {
        let mut w = worker();
        let replies = vec!["EE".to_string(), "N1MM N1MM".to_string(), "W1AW W1AW".to_string()];
        let buffers = w.render_replies(&replies);
        // "EE" (non-caller) is its own serial buffer; the two contiguous
        // caller replies are mixed down into a single parallel buffer.
        assert_eq!(buffers.len(), 2);
        assert!(buffers.iter().all(|b| !b.is_empty()));
    }
}
