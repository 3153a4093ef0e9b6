// src/qso/state.rs  —  C7: QSO protocol state machine (pile-up model)
//
// Port of the reference `QSOStateMachine`, generalized with the compact-regex
// exchange validator (`qso::patterns`) already built for this crate and
// extended with the point-to-point (P2P) caller path: a single caller per
// drawn batch may be flagged P2P (displayed under the alias "P2P"), paired
// with a park reference drawn from the park pool, and validated/replied to
// through the patterns module's p2p_* templates.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::HashSet;

use crate::morse::table::{self, Token};
use crate::qso::patterns::{self, ExchangePatterns, Placeholders};

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum QsoState {
    S0,
    S1,
    S2,
    S4,
    S5,
    S6,
}

impl Default for QsoState {
    fn default() -> Self {
        QsoState::S0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CqMode {
    Simple,
    Parks,
    Summits,
}

impl CqMode {
    fn pattern_key(self) -> &'static str {
        match self {
            CqMode::Simple => "SIMPLE",
            CqMode::Parks => "POTA",
            CqMode::Summits => "SOTA",
        }
    }
}

#[derive(Debug, Clone)]
pub struct QsoConfig {
    pub my_call: String,
    pub other_call: String,
    pub cq_mode: CqMode,
    pub max_stations: u32,
    pub auto_incoming_after_qso: bool,
    pub auto_incoming_probability: f32,
    pub p2p_probability: f32,
    pub my_park_ref: String,
    pub allow_599: bool,
    pub allow_tu: bool,
    pub use_prosigns: bool,
    pub prosign_literal: String,
    pub ignore_bk: bool,
    pub ignore_fill_tokens: Vec<String>,
}

impl Default for QsoConfig {
    fn default() -> Self {
        Self {
            my_call: "EA4XYZ".into(),
            other_call: "N1MM".into(),
            cq_mode: CqMode::Parks,
            max_stations: 1,
            auto_incoming_after_qso: false,
            auto_incoming_probability: 0.5,
            p2p_probability: 0.0,
            my_park_ref: String::new(),
            allow_599: false,
            allow_tu: false,
            use_prosigns: true,
            prosign_literal: "CAVE".into(),
            ignore_bk: true,
            ignore_fill_tokens: vec!["RR".into(), "R".into(), "DE".into()],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QsoResult {
    pub state: QsoState,
    pub accepted: bool,
    pub replies: Vec<String>,
    pub errors: Vec<String>,
    pub info: Vec<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct QsoCompletion {
    pub timestamp_utc: String,
    pub my_call: String,
    pub other_call: String,
    pub transcript_rx: Vec<String>,
    pub transcript_tx: Vec<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct LogEntry {
    pub timestamp_utc: String,
    pub level: String,
    pub state: QsoState,
    pub message: String,
}

/// Read-only snapshot used by `qso::export` to build the session document,
/// and by the TUI/CLI for a status readout.
#[derive(Debug, Clone, serde::Serialize)]
pub struct QsoSnapshot {
    pub state: QsoState,
    pub active_other_call: String,
    pub active_call_selected: bool,
    pub pending_callers: Vec<String>,
    pub rx_transcript: Vec<String>,
    pub tx_transcript: Vec<String>,
    pub completions: Vec<QsoCompletion>,
    pub logs: Vec<LogEntry>,
}

pub struct QsoEngine<R: Rng> {
    config: QsoConfig,
    patterns: ExchangePatterns,
    callsign_pool: Vec<String>,
    park_pool: Vec<String>,

    state: QsoState,
    rx_transcript: Vec<String>,
    tx_transcript: Vec<String>,
    completions: Vec<QsoCompletion>,
    logs: Vec<LogEntry>,

    pending_callers: Vec<String>,
    active_call: String,
    active_call_selected: bool,
    s2_rr_confirmed: bool,
    last_tx: String,

    p2p_call: Option<String>,
    p2p_other_park_ref: Option<String>,

    rng: R,
}

impl<R: Rng> QsoEngine<R> {
    pub fn new(config: QsoConfig, patterns: ExchangePatterns, callsign_pool: Vec<String>, park_pool: Vec<String>, rng: R) -> Self {
        let active_call = config.other_call.to_ascii_uppercase();
        Self {
            config,
            patterns,
            callsign_pool,
            park_pool,
            state: QsoState::S0,
            rx_transcript: Vec::new(),
            tx_transcript: Vec::new(),
            completions: Vec::new(),
            logs: Vec::new(),
            pending_callers: Vec::new(),
            active_call,
            active_call_selected: false,
            s2_rr_confirmed: false,
            last_tx: String::new(),
            p2p_call: None,
            p2p_other_park_ref: None,
            rng,
        }
    }

    pub fn state(&self) -> QsoState { self.state }
    pub fn config(&self) -> &QsoConfig { &self.config }
    pub fn active_other_call(&self) -> &str { &self.active_call }
    pub fn pending_callers(&self) -> &[String] { &self.pending_callers }
    pub fn completions(&self) -> &[QsoCompletion] { &self.completions }

    pub fn snapshot(&self) -> QsoSnapshot {
        QsoSnapshot {
            state: self.state,
            active_other_call: self.active_call.clone(),
            active_call_selected: self.active_call_selected,
            pending_callers: self.pending_callers.clone(),
            rx_transcript: self.rx_transcript.clone(),
            tx_transcript: self.tx_transcript.clone(),
            completions: self.completions.clone(),
            logs: self.logs.clone(),
        }
    }

    pub fn reset(&mut self) {
        self.state = QsoState::S0;
        self.rx_transcript.clear();
        self.tx_transcript.clear();
        self.active_call = self.config.other_call.to_ascii_uppercase();
        self.active_call_selected = false;
        self.s2_rr_confirmed = false;
        self.pending_callers.clear();
        self.p2p_call = None;
        self.p2p_other_park_ref = None;
        self.last_tx.clear();
        self.log("INFO", "QSO reset (manual)");
    }

    fn active_is_p2p(&self) -> bool {
        self.p2p_call.as_deref() == Some(self.active_call.as_str())
    }

    fn display_of(&self, call: &str) -> String {
        if self.p2p_call.as_deref() == Some(call) { "P2P".to_string() } else { call.to_string() }
    }

    fn prosign_clean(&self) -> String {
        let lit: String = self.config.prosign_literal.chars().filter(|c| c.is_ascii_alphanumeric()).collect::<String>().to_ascii_uppercase();
        if lit.is_empty() { "KN".to_string() } else { lit }
    }

    fn now_iso() -> String {
        chrono::Utc::now().to_rfc3339()
    }

    fn log(&mut self, level: &str, message: &str) {
        self.logs.push(LogEntry { timestamp_utc: Self::now_iso(), level: level.into(), state: self.state, message: message.into() });
        if self.logs.len() > 2000 {
            let keep_from = self.logs.len() - 1000;
            self.logs.drain(0..keep_from);
        }
    }

    /// Feed one decoded inbound message; returns the protocol outcome.
    pub fn process_text(&mut self, text: &str) -> QsoResult {
        let tokens = normalize_tokens(text);
        if tokens.is_empty() {
            return QsoResult { errors: vec!["No usable tokens decoded.".into()], ..Default::default() };
        }
        self.rx_transcript.push(tokens.join(" "));
        let joined = tokens.join(" ");
        self.log("RX", &joined);

        match self.state {
            QsoState::S0 => self.handle_s0(&tokens),
            QsoState::S2 => self.handle_s2(&tokens),
            QsoState::S5 => self.handle_s5(&tokens),
            other => QsoResult { state: other, errors: vec![format!("Unhandled state: {other:?}")], ..Default::default() },
        }
    }

    fn handle_s0(&mut self, tokens: &[String]) -> QsoResult {
        let key = self.config.cq_mode.pattern_key();
        let compact_rx = patterns::compact_join(tokens);
        let ph = Placeholders { my_call: self.config.my_call.to_ascii_uppercase(), ..Default::default() };
        let ok = self.patterns.s0.get(key).map(|tpls| tpls.iter().any(|t| patterns::accepts(t, &ph, &compact_rx))).unwrap_or(false);

        if !ok {
            let msg = format!("S0 invalid: required CQ sequence not found for cq_mode {key}.");
            self.log("ERR", &msg);
            return QsoResult { state: self.state, errors: vec![msg], ..Default::default() };
        }

        self.s2_rr_confirmed = false;
        self.active_call_selected = false;
        let callers = self.draw_new_incoming_callers();
        self.assign_p2p(&callers);
        self.pending_callers = callers.clone();
        let replies = self.emit_callers(&callers);

        QsoResult {
            state: self.state,
            accepted: true,
            info: vec![format!("Valid CQ; {} station(s) calling. Select one by exact callsign.", replies.len())],
            replies,
            errors: vec![],
        }
    }

    fn handle_s2(&mut self, tokens: &[String]) -> QsoResult {
        if !self.active_call_selected {
            return self.handle_s2_select_station(tokens);
        }

        let display = self.display_of(&self.active_call.clone());
        if is_full_call_query(tokens, &display) {
            let reply = self.patterns.tx.get("ack_rr").cloned().unwrap_or_else(|| "RR".to_string());
            self.tx_transcript.push(reply.clone());
            self.last_tx = reply.clone();
            self.log("TX", &reply);
            self.s2_rr_confirmed = true;
            return QsoResult { state: self.state, accepted: true, replies: vec![reply], info: vec!["RR sent; continue with report.".into()], errors: vec![] };
        }
        if is_repeat_request(tokens) {
            let ph = Placeholders { other_call: display.clone(), ..Default::default() };
            let tpl = self.patterns.tx.get("repeat_selected_call").cloned().unwrap_or_default();
            let reply = patterns::render_tx(&tpl, &ph);
            self.tx_transcript.push(reply.clone());
            self.last_tx = reply.clone();
            self.log("TX", &reply);
            return QsoResult { state: self.state, accepted: true, replies: vec![reply], info: vec!["Repeat request detected; callsign repeated, still in S2.".into()], errors: vec![] };
        }
        self.handle_s2_direct_report(tokens)
    }

    fn handle_s2_select_station(&mut self, tokens: &[String]) -> QsoResult {
        if self.pending_callers.is_empty() {
            let msg = "S2 invalid: no pending stations to select.".to_string();
            self.log("ERR", &msg);
            return QsoResult { state: self.state, errors: vec![msg], ..Default::default() };
        }

        let pending = self.pending_callers.clone();
        if let Some(selected) = pending.iter().find(|c| is_full_call_query(tokens, &self.display_of(c))).cloned() {
            self.select_pending_station(&selected);
            let reply = self.patterns.tx.get("ack_rr").cloned().unwrap_or_else(|| "RR".to_string());
            self.tx_transcript.push(reply.clone());
            self.last_tx = reply.clone();
            self.log("TX", &reply);
            self.s2_rr_confirmed = true;
            return QsoResult { state: self.state, accepted: true, replies: vec![reply], info: vec![format!("Station {selected} selected; RR sent.")], errors: vec![] };
        }

        let wildcard_patterns = extract_wildcard_patterns(tokens);
        if !wildcard_patterns.is_empty() {
            let matches = self.match_pending_by_patterns(&wildcard_patterns);
            if matches.is_empty() {
                return QsoResult { state: self.state, accepted: true, info: vec!["No matches for the sent pattern.".into()], ..Default::default() };
            }
            let info = format!("Matches: {}", matches.join(", "));
            let replies = self.emit_callers(&matches);
            return QsoResult { state: self.state, accepted: true, replies, info: vec![info], errors: vec![] };
        }

        if let Some(call) = self.find_exact_pending_call(tokens) {
            self.select_pending_station(&call);
            return self.handle_s2_direct_report(tokens);
        }

        let msg = "S2 invalid: send the exact callsign of a queued station.".to_string();
        self.log("ERR", &msg);
        QsoResult { state: self.state, errors: vec![msg], ..Default::default() }
    }

    fn handle_s2_direct_report(&mut self, tokens: &[String]) -> QsoResult {
        let display = self.display_of(&self.active_call.clone());
        if is_repeat_request(tokens) {
            let ph = Placeholders { other_call: display, ..Default::default() };
            let tpl = self.patterns.tx.get("repeat_selected_call").cloned().unwrap_or_default();
            let reply = patterns::render_tx(&tpl, &ph);
            self.tx_transcript.push(reply.clone());
            self.last_tx = reply.clone();
            self.log("TX", &reply);
            return QsoResult { state: self.state, accepted: true, replies: vec![reply], info: vec!["Repeat request detected; callsign repeated, still in S2.".into()], errors: vec![] };
        }

        let cleaned = self.strip_fillers(tokens);
        let compact_rx = patterns::compact_join(&cleaned);
        let is_p2p = self.active_is_p2p();
        let key = if is_p2p {
            "p2p_ack".to_string()
        } else {
            let base = if self.s2_rr_confirmed { "report_no_call" } else { "report_require_call" };
            if self.config.allow_599 { format!("{base}_allow_599") } else { base.to_string() }
        };

        let ph = self.placeholders_for_active();
        let ok = self.patterns.s2.get(&key).map(|tpls| tpls.iter().any(|t| patterns::accepts(t, &ph, &compact_rx))).unwrap_or(false);
        if !ok {
            let msg = format!("S2 invalid: report does not match expected pattern ({key}).");
            self.log("ERR", &msg);
            return QsoResult { state: self.state, errors: vec![msg], ..Default::default() };
        }

        let reply_key = if is_p2p {
            if self.config.allow_tu { "p2p_station_reply_with_tu" } else { "p2p_station_reply_without_tu" }
        } else {
            "report_reply"
        };
        let tpl = self.patterns.tx.get(reply_key).cloned().unwrap_or_default();
        let reply = patterns::render_tx(&tpl, &ph);
        self.tx_transcript.push(reply.clone());
        self.last_tx = reply.clone();
        self.log("TX", &reply);
        self.state = QsoState::S5;
        self.s2_rr_confirmed = false;
        QsoResult { state: self.state, accepted: true, replies: vec![reply], info: vec!["Report valid, reply sent; awaiting final (73 EE).".into()], errors: vec![] }
    }

    fn handle_s5(&mut self, tokens: &[String]) -> QsoResult {
        let is_p2p = self.active_is_p2p();
        if is_p2p {
            if is_full_call_query(tokens, &self.active_call.clone()) {
                let ph = Placeholders { other_call_real: self.active_call.clone(), ..Default::default() };
                let tpl = self.patterns.tx.get("p2p_repeat_call").cloned().unwrap_or_default();
                let reply = patterns::render_tx(&tpl, &ph);
                self.tx_transcript.push(reply.clone());
                self.last_tx = reply.clone();
                self.log("TX", &reply);
                return QsoResult { state: self.state, accepted: true, replies: vec![reply], info: vec!["Repeating callsign; still awaiting final.".into()], errors: vec![] };
            }
            if is_ref_query(tokens) {
                let ph = Placeholders {
                    park_ref: self.p2p_other_park_ref.as_deref().map(patterns::compact_park_ref).unwrap_or_default(),
                    ..Default::default()
                };
                let tpl = self.patterns.tx.get("p2p_repeat_ref").cloned().unwrap_or_default();
                let reply = patterns::render_tx(&tpl, &ph);
                self.tx_transcript.push(reply.clone());
                self.last_tx = reply.clone();
                self.log("TX", &reply);
                return QsoResult { state: self.state, accepted: true, replies: vec![reply], info: vec!["Repeating park reference; still awaiting final.".into()], errors: vec![] };
            }
        } else if is_bare_question(tokens) {
            let reply = self.last_tx.clone();
            if !reply.is_empty() {
                self.tx_transcript.push(reply.clone());
                self.log("TX", &reply);
            }
            return QsoResult { state: self.state, accepted: true, replies: vec![reply], info: vec!["Repeating last transmission.".into()], errors: vec![] };
        }

        let collapsed = collapse_double_e(tokens);
        let cleaned = self.strip_fillers(&collapsed);
        let compact_rx = patterns::compact_join(&cleaned);

        let base = match (is_p2p, self.config.use_prosigns) {
            (true, true) => "p2p_with_prosign",
            (true, false) => "p2p_without_prosign",
            (false, true) => "with_prosign",
            (false, false) => "without_prosign",
        };
        let key = if self.config.allow_tu { format!("{base}_allow_tu") } else { base.to_string() };

        let ph = self.placeholders_for_active();
        let ok = self.patterns.s5.get(&key).map(|tpls| tpls.iter().any(|t| patterns::accepts(t, &ph, &compact_rx))).unwrap_or(false);
        if !ok {
            let expected = if self.config.use_prosigns { format!("{} 73 EE", self.prosign_clean()) } else { "73 EE".to_string() };
            let msg = format!("S5 invalid: expected closing '{expected}'.");
            self.log("ERR", &msg);
            return QsoResult { state: self.state, errors: vec![msg], ..Default::default() };
        }

        self.complete_qso_with_reply("QSO complete; back to S0.")
    }

    fn placeholders_for_active(&self) -> Placeholders {
        Placeholders {
            my_call: self.config.my_call.to_ascii_uppercase(),
            other_call: self.display_of(&self.active_call),
            other_call_real: self.active_call.clone(),
            call: self.display_of(&self.active_call),
            prosign: self.prosign_clean(),
            tx_prosign: self.prosign_clean(),
            park_ref: self.p2p_other_park_ref.as_deref().map(patterns::compact_park_ref).unwrap_or_default(),
            my_park_ref: patterns::compact_park_ref(&self.config.my_park_ref),
        }
    }

    fn complete_qso_with_reply(&mut self, info: &str) -> QsoResult {
        let completed_call = self.active_call.clone();
        let reply = self.patterns.tx.get("qso_complete").cloned().unwrap_or_else(|| "EE".to_string());
        self.tx_transcript.push(reply.clone());
        self.last_tx = reply.clone();
        self.log("TX", &reply);

        // P2P completions record the real callsign, the "(P2P)" marker, and
        // the park reference that was actually worked, since the transcript
        // alone only ever shows the "P2P" alias.
        let logged_other_call = if self.p2p_call.as_deref() == Some(completed_call.as_str()) {
            match &self.p2p_other_park_ref {
                Some(park_ref) => format!("{completed_call} (P2P) {park_ref}"),
                None => format!("{completed_call} (P2P)"),
            }
        } else {
            completed_call.clone()
        };

        self.completions.push(QsoCompletion {
            timestamp_utc: Self::now_iso(),
            my_call: self.config.my_call.to_ascii_uppercase(),
            other_call: logged_other_call,
            transcript_rx: self.rx_transcript.clone(),
            transcript_tx: self.tx_transcript.clone(),
        });
        self.log("INFO", "QSO completed");

        self.state = QsoState::S0;
        self.active_call = self.config.other_call.to_ascii_uppercase();
        self.active_call_selected = false;
        self.s2_rr_confirmed = false;
        if self.p2p_call.as_deref() == Some(completed_call.as_str()) {
            self.p2p_call = None;
            self.p2p_other_park_ref = None;
        }

        let mut out_replies = vec![reply];
        let mut out_info = vec![info.to_string()];

        if !self.pending_callers.is_empty() {
            let callers = self.pending_callers.clone();
            let replies = self.emit_callers(&callers);
            out_replies.extend(replies);
            out_info.push("Pending callers re-calling.".into());
        } else {
            let incoming = self.maybe_start_incoming_after_qso();
            if !incoming.is_empty() {
                out_replies.extend(incoming);
                out_info.push("New incoming station; CQ skipped.".into());
            }
        }

        QsoResult { state: self.state, accepted: true, replies: out_replies, errors: vec![], info: out_info }
    }

    fn draw_new_incoming_callers(&mut self) -> Vec<String> {
        let max_stations = self.config.max_stations.max(1) as usize;
        let requested = self.rng.gen_range(1..=max_stations);
        let pool: Vec<String> = self.callsign_pool.iter().filter(|c| !c.trim().is_empty()).cloned().collect();
        if pool.is_empty() {
            return vec![self.config.other_call.to_ascii_uppercase()];
        }
        let requested = requested.min(pool.len()).max(1);
        pool.choose_multiple(&mut self.rng, requested).cloned().collect()
    }

    fn assign_p2p(&mut self, callers: &[String]) {
        self.p2p_call = None;
        self.p2p_other_park_ref = None;
        if self.config.cq_mode != CqMode::Parks || self.park_pool.is_empty() || callers.is_empty() {
            return;
        }
        if self.rng.gen::<f32>() >= self.config.p2p_probability {
            return;
        }
        let idx = self.rng.gen_range(0..callers.len());
        self.p2p_call = Some(callers[idx].clone());
        let pidx = self.rng.gen_range(0..self.park_pool.len());
        self.p2p_other_park_ref = Some(self.park_pool[pidx].clone());
    }

    /// Emit one "{DISPLAY} {DISPLAY}" caller reply per entry in `callers`.
    /// The designated P2P caller (if any of these is it) is moved to the
    /// head of the order; the remainder is shuffled.
    fn emit_callers(&mut self, callers: &[String]) -> Vec<String> {
        let mut ordered: Vec<String> = callers.to_vec();
        if let Some(p2p) = self.p2p_call.clone() {
            if let Some(pos) = ordered.iter().position(|c| *c == p2p) {
                ordered.remove(pos);
                ordered.shuffle(&mut self.rng);
                ordered.insert(0, p2p);
            } else {
                ordered.shuffle(&mut self.rng);
            }
        } else {
            ordered.shuffle(&mut self.rng);
        }

        self.state = QsoState::S1;
        let mut replies = Vec::with_capacity(ordered.len());
        let tpl = self.patterns.tx.get("caller_call").cloned().unwrap_or_else(|| "{CALL} {CALL}".to_string());
        for call in &ordered {
            let ph = Placeholders { call: self.display_of(call), ..Default::default() };
            let reply = patterns::render_tx(&tpl, &ph);
            self.tx_transcript.push(reply.clone());
            self.last_tx = reply.clone();
            self.log("TX", &reply);
            replies.push(reply);
        }
        self.state = QsoState::S2;
        replies
    }

    fn maybe_start_incoming_after_qso(&mut self) -> Vec<String> {
        if !self.config.auto_incoming_after_qso {
            return Vec::new();
        }
        let p = self.config.auto_incoming_probability;
        if p <= 0.0 {
            return Vec::new();
        }
        if p < 1.0 && self.rng.gen::<f32>() >= p {
            return Vec::new();
        }
        self.active_call_selected = false;
        self.s2_rr_confirmed = false;
        let callers = self.draw_new_incoming_callers();
        self.assign_p2p(&callers);
        self.pending_callers = callers.clone();
        self.emit_callers(&callers)
    }

    fn select_pending_station(&mut self, call: &str) {
        self.active_call = call.to_string();
        self.active_call_selected = true;
        self.s2_rr_confirmed = false;
        self.pending_callers.retain(|c| c != call);
    }

    fn find_exact_pending_call(&self, tokens: &[String]) -> Option<String> {
        if self.pending_callers.is_empty() {
            return None;
        }
        let hay = patterns::compact_join(tokens);
        let mut best: Option<(usize, String)> = None;
        for call in &self.pending_callers {
            let needle = patterns::compact_token(&self.display_of(call));
            if needle.is_empty() {
                continue;
            }
            if let Some(pos) = hay.find(&needle) {
                if best.as_ref().map(|(p, _)| pos < *p).unwrap_or(true) {
                    best = Some((pos, call.clone()));
                }
            }
        }
        best.map(|(_, c)| c)
    }

    fn match_pending_by_patterns(&self, patterns_list: &[String]) -> Vec<String> {
        let mut matches = Vec::new();
        let mut seen = HashSet::new();
        for pattern in patterns_list {
            for call in &self.pending_callers {
                if seen.contains(call) {
                    continue;
                }
                let disp = self.display_of(call);
                if wildcard_matches_call(pattern, &disp) || wildcard_matches_call(pattern, call) {
                    seen.insert(call.clone());
                    matches.push(call.clone());
                }
            }
        }
        matches
    }

    fn strip_fillers(&self, tokens: &[String]) -> Vec<String> {
        let single_char = tokens.iter().filter(|t| patterns::compact_token(t).chars().count() == 1).count();
        let threshold = 4usize.max((0.6 * tokens.len().max(1) as f32) as usize);
        if single_char >= threshold {
            return tokens.to_vec();
        }
        let mut fillers: HashSet<String> = self.config.ignore_fill_tokens.iter().map(|s| s.to_ascii_uppercase()).collect();
        if self.config.ignore_bk {
            fillers.insert("BK".to_string());
        }
        tokens.iter().filter(|t| !fillers.contains(t.as_str())).cloned().collect()
    }
}

fn normalize_tokens(text: &str) -> Vec<String> {
    table::tokenize(text)
        .into_iter()
        .map(|t| match t {
            Token::Word(w) => w,
            Token::Prosign(p) => format!("<{p}>"),
        })
        .collect()
}

fn collapse_double_e(tokens: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        if i + 1 < tokens.len() && tokens[i] == "E" && tokens[i + 1] == "E" {
            out.push("EE".to_string());
            i += 2;
        } else {
            out.push(tokens[i].clone());
            i += 1;
        }
    }
    out
}

fn is_repeat_request(tokens: &[String]) -> bool {
    tokens.iter().any(|t| t.contains('?'))
}

fn is_bare_question(tokens: &[String]) -> bool {
    patterns::compact_join(tokens) == "?"
}

fn is_ref_query(tokens: &[String]) -> bool {
    patterns::compact_join(tokens) == "REF?"
}

fn is_full_call_query(tokens: &[String], call: &str) -> bool {
    let call_u = call.trim().to_ascii_uppercase();
    if call_u.is_empty() {
        return false;
    }
    let compact: Vec<String> = tokens.iter().map(|t| patterns::compact_token(t)).filter(|s| !s.is_empty()).collect();
    let wanted = format!("{call_u}?");
    if compact.concat() == wanted {
        return true;
    }
    for (i, t) in compact.iter().enumerate() {
        if *t == wanted {
            return true;
        }
        if *t == call_u && compact.get(i + 1).map(|s| s.as_str()) == Some("?") {
            return true;
        }
    }
    false
}

fn wildcard_matches_call(pattern: &str, call: &str) -> bool {
    if pattern.is_empty() {
        return false;
    }
    let escaped = regex::escape(pattern).replace("\\?", ".*");
    let re = format!("^{escaped}$");
    regex::Regex::new(&re).map(|r| r.is_match(&call.to_ascii_uppercase())).unwrap_or(false)
}

fn extract_wildcard_patterns(tokens: &[String]) -> Vec<String> {
    let compact: Vec<String> = tokens.iter().map(|t| patterns::compact_token(t)).filter(|s| !s.is_empty()).collect();
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    let mut has_any_question = false;

    for tok in &compact {
        if !tok.contains('?') {
            continue;
        }
        has_any_question = true;
        if !tok.chars().any(|c| c.is_ascii_alphanumeric()) {
            continue;
        }
        if seen.insert(tok.clone()) {
            out.push(tok.clone());
        }
    }

    let joined = compact.concat();
    if joined.contains('?') {
        has_any_question = true;
    }
    if joined.contains('?') && joined.chars().any(|c| c.is_ascii_alphanumeric()) && !seen.contains(&joined) {
        out.push(joined);
    }
    if out.is_empty() && has_any_question {
        out.push("?".to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn engine(cfg: QsoConfig, pool: Vec<String>, parks: Vec<String>) -> QsoEngine<SmallRng> {
        QsoEngine::new(cfg, patterns::default_exchange_patterns(), pool, parks, SmallRng::seed_from_u64(7))
    }

    #[test]
    fn s0_accepts_pota_cq_and_emits_caller() {
        let cfg = QsoConfig { my_call: "EA3IPX".into(), other_call: "N1MM".into(), cq_mode: CqMode::Parks, ..Default::default() };
        let mut eng = engine(cfg, vec![], vec![]);
        let r = eng.process_text("CQ CQ POTA DE EA3IPX EA3IPX K");
        assert!(r.accepted);
        assert_eq!(r.replies, vec!["N1MM N1MM".to_string()]);
        assert_eq!(eng.state(), QsoState::S2);
        assert_eq!(eng.pending_callers(), &["N1MM".to_string()]);
    }

    #[test]
    fn s0_rejects_missing_my_call() {
        let cfg = QsoConfig { my_call: "EA3IPX".into(), cq_mode: CqMode::Simple, ..Default::default() };
        let mut eng = engine(cfg, vec![], vec![]);
        let r = eng.process_text("CQ CQ DE N0CALL K");
        assert!(!r.accepted);
        assert!(!r.errors.is_empty());
    }

    #[test]
    fn full_contact_happy_path_completes() {
        let cfg = QsoConfig { my_call: "EA3IPX".into(), other_call: "N1MM".into(), cq_mode: CqMode::Simple, ..Default::default() };
        let mut eng = engine(cfg, vec![], vec![]);
        eng.process_text("CQ CQ DE EA3IPX EA3IPX K");
        assert_eq!(eng.state(), QsoState::S2);

        let r2 = eng.process_text("N1MM N1MM DE EA3IPX 5NN 5NN");
        assert!(r2.accepted);
        assert_eq!(eng.state(), QsoState::S5);

        let r3 = eng.process_text("CAVE 73 EE");
        assert!(r3.accepted);
        assert_eq!(eng.state(), QsoState::S0);
        assert_eq!(eng.completions().len(), 1);
    }

    #[test]
    fn wildcard_selection_matches_pending_callers() {
        let cfg = QsoConfig { my_call: "EA3IPX".into(), cq_mode: CqMode::Simple, max_stations: 3, ..Default::default() };
        let mut eng = engine(cfg, vec!["EA3AAA".into(), "EA3BBB".into(), "N1MM".into()], vec![]);
        eng.process_text("CQ CQ DE EA3IPX EA3IPX K");
        let pending = eng.pending_callers().to_vec();
        assert_eq!(pending.len(), 3);

        let r = eng.process_text("EA3?");
        assert!(r.accepted);
        assert!(r.replies.iter().any(|r| r.contains("EA3AAA") || r.contains("EA3BBB")));
    }

    #[test]
    fn strip_fillers_keeps_raw_stream_in_character_mode() {
        let cfg = QsoConfig::default();
        let eng = engine(cfg, vec![], vec![]);
        let toks: Vec<String> = ["R", "R", "D", "E", "R", "R"].iter().map(|s| s.to_string()).collect();
        let stripped = eng.strip_fillers(&toks);
        assert_eq!(stripped, toks);
    }

    #[test]
    fn pending_callers_always_re_emitted_over_auto_incoming() {
        let cfg = QsoConfig {
            my_call: "EA3IPX".into(),
            cq_mode: CqMode::Simple,
            max_stations: 2,
            auto_incoming_after_qso: true,
            auto_incoming_probability: 1.0,
            ..Default::default()
        };
        let mut eng = engine(cfg, vec!["N1MM".into(), "N2AAA".into()], vec![]);
        eng.process_text("CQ CQ DE EA3IPX EA3IPX K");
        let selected = eng.pending_callers()[0].clone();
        eng.process_text(&format!("{selected} {selected} DE EA3IPX 5NN 5NN"));
        eng.process_text("CAVE 73 EE");
        // The other pending caller must be the one re-emitted, not a fresh
        // auto-incoming draw, even though auto-incoming is forced on.
        assert_eq!(eng.state(), QsoState::S2);
        assert!(!eng.pending_callers().is_empty());
    }

    #[test]
    fn p2p_contact_completes_with_formatted_other_call() {
        let cfg = QsoConfig {
            my_call: "EA3IPX".into(),
            cq_mode: CqMode::Parks,
            max_stations: 1,
            p2p_probability: 1.0,
            my_park_ref: "EA-1234".into(),
            allow_tu: true,
            use_prosigns: true,
            prosign_literal: "BK".into(),
            // BK is the operator's chosen prosign literal here, not the
            // generic "break" filler, so it must not be stripped as filler.
            ignore_bk: false,
            ..Default::default()
        };
        let mut eng = engine(cfg, vec!["EA1AFV".into()], vec!["US-0001".into()]);

        let r0 = eng.process_text("CQ CQ POTA DE EA3IPX EA3IPX K");
        assert!(r0.accepted);
        assert_eq!(r0.replies, vec!["P2P P2P".to_string()]);
        assert_eq!(eng.state(), QsoState::S2);

        let r1 = eng.process_text("P2P");
        assert!(r1.accepted);
        assert_eq!(r1.replies, vec!["BK EA1AFV EA1AFV MY REF US0001 US0001 TU 73 BK".to_string()]);
        assert_eq!(eng.state(), QsoState::S5);

        let r2 = eng.process_text("BK EA1AFV EA3IPX MY REF EA-1234 EA-1234 73 BK");
        assert!(!r2.accepted, "TU is required when allow_tu is set");
        assert_eq!(eng.state(), QsoState::S5);

        let r3 = eng.process_text("BK EA1AFV EA3IPX MY REF EA-1234 EA-1234 TU 73 BK");
        assert!(r3.accepted);
        assert_eq!(eng.state(), QsoState::S0);
        assert_eq!(eng.completions().len(), 1);
        assert_eq!(eng.completions()[0].other_call, "EA1AFV (P2P) US-0001");
    }
}
