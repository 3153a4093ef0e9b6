// src/config.rs  —  Runtime configuration (CLI + TOML), ambient stack around
// THE CORE. Sections mirror spec.md §6 verbatim: `[audio]`, `[decoder]`,
// `[encoder]`, `[qso]`. File values are loaded first, then CLI flags
// override any field given on the command line — same merge order the
// teacher's `config.rs` used, generalized to this spec's field list.
use anyhow::{Context, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::dsp::keying::KeyingConfig;
use crate::morse::decoder::DecoderConfig as CoreDecoderConfig;
use crate::morse::encoder::EncoderConfig as CoreEncoderConfig;
use crate::qso::state::{CqMode, QsoConfig as CoreQsoConfig};

/// The example config is embedded directly in the binary at compile time.
/// Users can write it out with:  cw-qso-sim --write-config
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../config.toml.example");

// ── CLI ───────────────────────────────────────────────────────────────────
#[derive(Parser, Debug, Default)]
#[command(name = "cw-qso-sim", about = "CW QSO pile-up trainer  |  DD6DS", version)]
pub struct Cli {
    /// Config file path (default: ~/.config/cw-qso-sim/config.toml)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// List available audio input/output devices and exit
    #[arg(long, action)]
    pub list_devices: bool,

    /// Print the built-in default config.toml to stdout and exit
    #[arg(long, action)]
    pub print_config: bool,

    /// Write the built-in default config.toml to the config path and exit
    #[arg(long, action)]
    pub write_config: bool,

    /// Stdin line-mode simulator: type one decoded message per line.
    /// Commands: /reset  /export [path]  /quit
    #[arg(long, action)]
    pub simulate: bool,

    /// Launch the terminal UI (exit code 2 if the `tui` feature is not compiled in)
    #[arg(long, action)]
    pub tui: bool,

    /// TUI display language: en, de, fr, it (unknown codes fall back to en)
    #[arg(long)]
    pub lang: Option<String>,

    /// Decoder threshold preset, applied before any other decoder override
    #[arg(long)]
    pub preset: Option<Preset>,

    /// Capture this many seconds of silent-band audio before starting and
    /// set the noise floor from its 75th-percentile tone power, instead of
    /// the decoder's built-in default. Audio input mode only.
    #[arg(long)]
    pub calibrate_noise_secs: Option<f32>,

    // ── [audio] overrides ───────────────────────────────────────────────
    #[arg(long)]
    pub sample_rate: Option<u32>,
    #[arg(long)]
    pub input_device: Option<String>,
    #[arg(long)]
    pub output_device: Option<String>,
    #[arg(long)]
    pub blocksize: Option<u32>,
    #[arg(long)]
    pub channels: Option<u16>,
    #[arg(long)]
    pub input_mode: Option<InputMode>,

    // ── [decoder] overrides ─────────────────────────────────────────────
    #[arg(long)]
    pub frame_ms: Option<f32>,
    #[arg(long)]
    pub target_tone_hz: Option<f32>,
    #[arg(long)]
    pub auto_tone: Option<bool>,
    #[arg(long)]
    pub tone_search_min_hz: Option<f32>,
    #[arg(long)]
    pub tone_search_max_hz: Option<f32>,
    #[arg(long)]
    pub threshold_on_mult: Option<f32>,
    #[arg(long)]
    pub threshold_off_mult: Option<f32>,
    #[arg(long)]
    pub agc_alpha: Option<f32>,
    #[arg(long)]
    pub power_smooth_alpha: Option<f32>,
    #[arg(long)]
    pub wpm_target: Option<f32>,
    #[arg(long)]
    pub auto_wpm: Option<bool>,
    #[arg(long)]
    pub dot_ms_min: Option<f32>,
    #[arg(long)]
    pub dot_ms_max: Option<f32>,
    #[arg(long)]
    pub min_key_down_ms: Option<f32>,
    #[arg(long)]
    pub min_key_up_ms: Option<f32>,
    #[arg(long)]
    pub dash_threshold_dots: Option<f32>,
    #[arg(long)]
    pub gap_char_threshold_dots: Option<f32>,
    #[arg(long)]
    pub gap_word_threshold_dots: Option<f32>,
    #[arg(long)]
    pub message_gap_dots: Option<f32>,
    #[arg(long)]
    pub message_gap_seconds: Option<f32>,
    #[arg(long)]
    pub decoder_prosign_literal: Option<String>,

    // ── [encoder] overrides ─────────────────────────────────────────────
    #[arg(long)]
    pub tone_hz: Option<f32>,
    #[arg(long)]
    pub wpm: Option<f32>,
    #[arg(long)]
    pub farnsworth_wpm: Option<f32>,
    #[arg(long)]
    pub volume: Option<f32>,
    #[arg(long)]
    pub attack_ms: Option<f32>,
    #[arg(long)]
    pub release_ms: Option<f32>,
    #[arg(long)]
    pub wpm_out_start: Option<f32>,
    #[arg(long)]
    pub wpm_out_end: Option<f32>,
    #[arg(long)]
    pub tone_hz_out_start: Option<f32>,
    #[arg(long)]
    pub tone_hz_out_end: Option<f32>,

    // ── [qso] overrides ──────────────────────────────────────────────────
    /// Your callsign (e.g. EA3IPX)
    #[arg(long)]
    pub my_call: Option<String>,
    /// Fallback callsign used when the callsign pool is empty
    #[arg(long)]
    pub other_call: Option<String>,
    /// CQ mode: simple | parks | summits
    #[arg(long)]
    pub cq_mode: Option<CqMode>,
    #[arg(long)]
    pub max_stations: Option<u32>,
    #[arg(long)]
    pub callsigns_file: Option<String>,
    #[arg(long)]
    pub parks_file: Option<String>,
    #[arg(long)]
    pub exchange_patterns_file: Option<String>,
    #[arg(long)]
    pub auto_incoming_after_qso: Option<bool>,
    #[arg(long)]
    pub auto_incoming_probability: Option<f32>,
    #[arg(long)]
    pub p2p_probability: Option<f32>,
    #[arg(long)]
    pub my_park_ref: Option<String>,
    #[arg(long)]
    pub allow_599: Option<bool>,
    #[arg(long)]
    pub allow_tu: Option<bool>,
    #[arg(long)]
    pub use_prosigns: Option<bool>,
    #[arg(long)]
    pub qso_prosign_literal: Option<String>,
    #[arg(long)]
    pub ignore_bk: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InputMode {
    Audio,
    Keyboard,
}

/// UI-layer decoder presets named by the original GUI ("Normal"/"Noisy").
/// The core never hard-codes these (see SPEC_FULL.md REDESIGN FLAGS); this
/// enum and its overlay live entirely in the CLI shell.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Preset {
    Normal,
    Noisy,
}

impl Preset {
    /// Applied before file/CLI overrides so an explicit flag can still win.
    fn apply(self, cfg: &mut DecoderCfg) {
        match self {
            Preset::Normal => {
                cfg.threshold_on_mult = Some(4.0);
                cfg.threshold_off_mult = Some(2.4);
                cfg.agc_alpha = Some(0.03);
            }
            Preset::Noisy => {
                cfg.threshold_on_mult = Some(6.0);
                cfg.threshold_off_mult = Some(3.5);
                cfg.agc_alpha = Some(0.08);
            }
        }
    }
}

// ── TOML file structure — mirrors spec.md §6's section/field list ─────────
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    pub audio: Option<AudioCfg>,
    pub decoder: Option<DecoderCfg>,
    pub encoder: Option<EncoderCfg>,
    pub qso: Option<QsoCfg>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AudioCfg {
    pub sample_rate: Option<u32>,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub blocksize: Option<u32>,
    pub channels: Option<u16>,
    pub input_mode: Option<InputMode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DecoderCfg {
    pub frame_ms: Option<f32>,
    pub target_tone_hz: Option<f32>,
    pub auto_tone: Option<bool>,
    pub tone_search_min_hz: Option<f32>,
    pub tone_search_max_hz: Option<f32>,
    pub threshold_on_mult: Option<f32>,
    pub threshold_off_mult: Option<f32>,
    pub agc_alpha: Option<f32>,
    pub power_smooth_alpha: Option<f32>,
    pub wpm_target: Option<f32>,
    pub auto_wpm: Option<bool>,
    pub dot_ms_min: Option<f32>,
    pub dot_ms_max: Option<f32>,
    pub min_key_down_ms: Option<f32>,
    pub min_key_up_ms: Option<f32>,
    pub min_key_down_dot_ratio: Option<f32>,
    pub min_key_up_dot_ratio: Option<f32>,
    pub dash_threshold_dots: Option<f32>,
    pub gap_char_threshold_dots: Option<f32>,
    pub gap_word_threshold_dots: Option<f32>,
    pub message_gap_dots: Option<f32>,
    pub message_gap_seconds: Option<f32>,
    pub prosign_literal: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EncoderCfg {
    pub tone_hz: Option<f32>,
    pub wpm: Option<f32>,
    pub farnsworth_wpm: Option<f32>,
    pub volume: Option<f32>,
    pub attack_ms: Option<f32>,
    pub release_ms: Option<f32>,
    pub prosign_tokens: Option<Vec<String>>,
    pub wpm_out_start: Option<f32>,
    pub wpm_out_end: Option<f32>,
    pub tone_hz_out_start: Option<f32>,
    pub tone_hz_out_end: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QsoCfg {
    pub my_call: Option<String>,
    pub other_call: Option<String>,
    pub cq_mode: Option<CqMode>,
    pub max_stations: Option<u32>,
    pub callsigns_file: Option<String>,
    pub parks_file: Option<String>,
    pub exchange_patterns_file: Option<String>,
    pub auto_incoming_after_qso: Option<bool>,
    pub auto_incoming_probability: Option<f32>,
    pub p2p_probability: Option<f32>,
    pub my_park_ref: Option<String>,
    pub allow_599: Option<bool>,
    pub allow_tu: Option<bool>,
    pub use_prosigns: Option<bool>,
    pub prosign_literal: Option<String>,
    pub ignore_bk: Option<bool>,
    pub ignore_fill_tokens: Option<Vec<String>>,
}

// ── Resolved / merged config ────────────────────────────────────────────
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub sample_rate: u32,
    pub input_device: Option<String>,
    pub output_device: Option<String>,
    pub blocksize: u32,
    pub channels: u16,
    pub input_mode: InputMode,

    pub decoder: CoreDecoderConfig,
    pub encoder: CoreEncoderConfig,
    pub wpm_out_range: (f32, f32),
    pub tone_out_range: (f32, f32),

    pub qso: CoreQsoConfig,
    pub callsigns_file: Option<String>,
    pub parks_file: Option<String>,
    pub exchange_patterns_file: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let decoder = CoreDecoderConfig::default();
        let encoder = CoreEncoderConfig::default();
        Self {
            sample_rate: 48_000,
            input_device: None,
            output_device: None,
            blocksize: 1024,
            channels: 1,
            input_mode: InputMode::Audio,
            wpm_out_range: (encoder.wpm, encoder.wpm),
            tone_out_range: (encoder.tone_hz, encoder.tone_hz),
            decoder,
            encoder,
            qso: CoreQsoConfig::default(),
            callsigns_file: None,
            parks_file: None,
            exchange_patterns_file: None,
        }
    }
}

impl AppConfig {
    pub fn write_default_config(cli: &Cli) -> Result<PathBuf> {
        let path = cli.config.clone().unwrap_or_else(default_config_path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| format!("creating config directory {parent:?}"))?;
        }
        std::fs::write(&path, DEFAULT_CONFIG_TOML).with_context(|| format!("writing config to {path:?}"))?;
        Ok(path)
    }

    pub fn load(cli: &Cli) -> Result<Self> {
        let mut cfg = Self::default();

        let path = cli.config.clone().unwrap_or_else(default_config_path);
        let mut file_cfg: Option<FileConfig> = None;
        if path.exists() {
            let raw = std::fs::read_to_string(&path).with_context(|| format!("reading config {path:?}"))?;
            let fc: FileConfig = toml::from_str(&raw).with_context(|| format!("parsing config {path:?}"))?;
            cfg.apply_file(&fc);
            file_cfg = Some(fc);
        } else {
            log::warn!(
                "no config file found at {}; run `cw-qso-sim --write-config` to create one",
                path.display()
            );
        }

        let mut decoder_overrides = DecoderCfg::default();
        if let Some(preset) = cli.preset {
            preset.apply(&mut decoder_overrides);
            cfg.apply_decoder(&decoder_overrides);
        }

        cfg.apply_cli(cli);
        cfg.decoder.keying.sample_rate = cfg.sample_rate;
        cfg.encoder.sample_rate = cfg.sample_rate;
        sync_prosign_tokens(&mut cfg);

        // SPEC_FULL §4.4: "when only the fixed value is given, both range
        // endpoints copy it." That has to be re-derived here, after file+CLI
        // overrides are resolved, rather than seeded once from the
        // compiled-in default — otherwise an overridden `encoder.wpm`/
        // `tone_hz` with no explicit `wpm_out_*`/`tone_hz_out_*` would leave
        // the TX range pinned to the default wpm/tone instead of the
        // station's actual one.
        let file_encoder = file_cfg.as_ref().and_then(|f| f.encoder.as_ref());
        let wpm_range_given = file_encoder.map(|e| e.wpm_out_start.is_some() || e.wpm_out_end.is_some()).unwrap_or(false)
            || cli.wpm_out_start.is_some()
            || cli.wpm_out_end.is_some();
        let tone_range_given = file_encoder.map(|e| e.tone_hz_out_start.is_some() || e.tone_hz_out_end.is_some()).unwrap_or(false)
            || cli.tone_hz_out_start.is_some()
            || cli.tone_hz_out_end.is_some();
        if !wpm_range_given {
            cfg.wpm_out_range = (cfg.encoder.wpm, cfg.encoder.wpm);
        }
        if !tone_range_given {
            cfg.tone_out_range = (cfg.encoder.tone_hz, cfg.encoder.tone_hz);
        }

        normalize_ranges(&mut cfg);
        Ok(cfg)
    }

    fn apply_file(&mut self, fc: &FileConfig) {
        if let Some(a) = &fc.audio {
            if let Some(v) = a.sample_rate { self.sample_rate = v; }
            if let Some(v) = &a.input_device { self.input_device = Some(v.clone()); }
            if let Some(v) = &a.output_device { self.output_device = Some(v.clone()); }
            if let Some(v) = a.blocksize { self.blocksize = v; }
            if let Some(v) = a.channels { self.channels = v; }
            if let Some(v) = a.input_mode { self.input_mode = v; }
        }
        if let Some(d) = &fc.decoder {
            self.apply_decoder(d);
        }
        if let Some(e) = &fc.encoder {
            self.apply_encoder(e);
        }
        if let Some(q) = &fc.qso {
            self.apply_qso(q);
        }
    }

    fn apply_decoder(&mut self, d: &DecoderCfg) {
        let k = &mut self.decoder.keying;
        if let Some(v) = d.frame_ms { k.frame_ms = v; }
        if let Some(v) = d.target_tone_hz { k.target_tone_hz = v; }
        if let Some(v) = d.auto_tone { k.auto_tone = v; }
        if let Some(v) = d.tone_search_min_hz { k.tone_search_min_hz = v; }
        if let Some(v) = d.tone_search_max_hz { k.tone_search_max_hz = v; }
        if let Some(v) = d.threshold_on_mult { k.threshold_on_mult = v; }
        if let Some(v) = d.threshold_off_mult { k.threshold_off_mult = v; }
        if let Some(v) = d.agc_alpha { k.agc_alpha = v; }
        if let Some(v) = d.power_smooth_alpha { k.power_smooth_alpha = v; }
        if let Some(v) = d.wpm_target { k.wpm_target = v; }
        if let Some(v) = d.auto_wpm { k.auto_wpm = v; }
        if let Some(v) = d.dot_ms_min { k.dot_ms_min = v; }
        if let Some(v) = d.dot_ms_max { k.dot_ms_max = v; }
        if let Some(v) = d.min_key_down_ms { k.min_key_down_ms = v; }
        if let Some(v) = d.min_key_up_ms { k.min_key_up_ms = v; }
        if let Some(v) = d.min_key_down_dot_ratio { k.min_key_down_dot_ratio = v; }
        if let Some(v) = d.min_key_up_dot_ratio { k.min_key_up_dot_ratio = v; }
        if let Some(v) = d.dash_threshold_dots { k.dash_threshold_dots = v; }
        if let Some(v) = d.gap_char_threshold_dots { k.gap_char_threshold_dots = v; }
        if let Some(v) = d.gap_word_threshold_dots { k.gap_word_threshold_dots = v; }
        if let Some(v) = d.message_gap_dots { k.message_gap_dots = v; }
        if d.message_gap_seconds.is_some() { k.message_gap_seconds = d.message_gap_seconds; }
        if let Some(v) = &d.prosign_literal { self.decoder.prosign_literal = v.clone(); }
    }

    fn apply_encoder(&mut self, e: &EncoderCfg) {
        let c = &mut self.encoder;
        if let Some(v) = e.tone_hz { c.tone_hz = v; }
        if let Some(v) = e.wpm { c.wpm = v; }
        if e.farnsworth_wpm.is_some() { c.farnsworth_wpm = e.farnsworth_wpm; }
        if let Some(v) = e.volume { c.volume = v; }
        if let Some(v) = e.attack_ms { c.attack_ms = v; }
        if let Some(v) = e.release_ms { c.release_ms = v; }
        if let Some(v) = &e.prosign_tokens { c.prosign_tokens = v.clone(); }
        if let Some(v) = e.wpm_out_start { self.wpm_out_range.0 = v; }
        if let Some(v) = e.wpm_out_end { self.wpm_out_range.1 = v; }
        if let Some(v) = e.tone_hz_out_start { self.tone_out_range.0 = v; }
        if let Some(v) = e.tone_hz_out_end { self.tone_out_range.1 = v; }
    }

    fn apply_qso(&mut self, q: &QsoCfg) {
        let c = &mut self.qso;
        if let Some(v) = &q.my_call { c.my_call = v.clone(); }
        if let Some(v) = &q.other_call { c.other_call = v.clone(); }
        if let Some(v) = q.cq_mode { c.cq_mode = v; }
        if let Some(v) = q.max_stations { c.max_stations = v; }
        if let Some(v) = &q.callsigns_file { self.callsigns_file = Some(v.clone()); }
        if let Some(v) = &q.parks_file { self.parks_file = Some(v.clone()); }
        if let Some(v) = &q.exchange_patterns_file { self.exchange_patterns_file = Some(v.clone()); }
        if let Some(v) = q.auto_incoming_after_qso { c.auto_incoming_after_qso = v; }
        if let Some(v) = q.auto_incoming_probability { c.auto_incoming_probability = v; }
        if let Some(v) = q.p2p_probability { c.p2p_probability = v; }
        if let Some(v) = &q.my_park_ref { c.my_park_ref = v.clone(); }
        if let Some(v) = q.allow_599 { c.allow_599 = v; }
        if let Some(v) = q.allow_tu { c.allow_tu = v; }
        if let Some(v) = q.use_prosigns { c.use_prosigns = v; }
        if let Some(v) = &q.prosign_literal { c.prosign_literal = v.clone(); }
        if let Some(v) = q.ignore_bk { c.ignore_bk = v; }
        if let Some(v) = &q.ignore_fill_tokens { c.ignore_fill_tokens = v.clone(); }
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(v) = cli.sample_rate { self.sample_rate = v; }
        if let Some(v) = &cli.input_device { self.input_device = Some(v.clone()); }
        if let Some(v) = &cli.output_device { self.output_device = Some(v.clone()); }
        if let Some(v) = cli.blocksize { self.blocksize = v; }
        if let Some(v) = cli.channels { self.channels = v; }
        if let Some(v) = cli.input_mode { self.input_mode = v; }

        let k = &mut self.decoder.keying;
        if let Some(v) = cli.frame_ms { k.frame_ms = v; }
        if let Some(v) = cli.target_tone_hz { k.target_tone_hz = v; }
        if let Some(v) = cli.auto_tone { k.auto_tone = v; }
        if let Some(v) = cli.tone_search_min_hz { k.tone_search_min_hz = v; }
        if let Some(v) = cli.tone_search_max_hz { k.tone_search_max_hz = v; }
        if let Some(v) = cli.threshold_on_mult { k.threshold_on_mult = v; }
        if let Some(v) = cli.threshold_off_mult { k.threshold_off_mult = v; }
        if let Some(v) = cli.agc_alpha { k.agc_alpha = v; }
        if let Some(v) = cli.power_smooth_alpha { k.power_smooth_alpha = v; }
        if let Some(v) = cli.wpm_target { k.wpm_target = v; }
        if let Some(v) = cli.auto_wpm { k.auto_wpm = v; }
        if let Some(v) = cli.dot_ms_min { k.dot_ms_min = v; }
        if let Some(v) = cli.dot_ms_max { k.dot_ms_max = v; }
        if let Some(v) = cli.min_key_down_ms { k.min_key_down_ms = v; }
        if let Some(v) = cli.min_key_up_ms { k.min_key_up_ms = v; }
        if let Some(v) = cli.dash_threshold_dots { k.dash_threshold_dots = v; }
        if let Some(v) = cli.gap_char_threshold_dots { k.gap_char_threshold_dots = v; }
        if let Some(v) = cli.gap_word_threshold_dots { k.gap_word_threshold_dots = v; }
        if let Some(v) = cli.message_gap_dots { k.message_gap_dots = v; }
        if cli.message_gap_seconds.is_some() { k.message_gap_seconds = cli.message_gap_seconds; }
        if let Some(v) = &cli.decoder_prosign_literal { self.decoder.prosign_literal = v.clone(); }

        let c = &mut self.encoder;
        if let Some(v) = cli.tone_hz { c.tone_hz = v; }
        if let Some(v) = cli.wpm { c.wpm = v; }
        if cli.farnsworth_wpm.is_some() { c.farnsworth_wpm = cli.farnsworth_wpm; }
        if let Some(v) = cli.volume { c.volume = v; }
        if let Some(v) = cli.attack_ms { c.attack_ms = v; }
        if let Some(v) = cli.release_ms { c.release_ms = v; }
        if let Some(v) = cli.wpm_out_start { self.wpm_out_range.0 = v; }
        if let Some(v) = cli.wpm_out_end { self.wpm_out_range.1 = v; }
        if let Some(v) = cli.tone_hz_out_start { self.tone_out_range.0 = v; }
        if let Some(v) = cli.tone_hz_out_end { self.tone_out_range.1 = v; }

        let q = &mut self.qso;
        if let Some(v) = &cli.my_call { q.my_call = v.clone(); }
        if let Some(v) = &cli.other_call { q.other_call = v.clone(); }
        if let Some(v) = cli.cq_mode { q.cq_mode = v; }
        if let Some(v) = cli.max_stations { q.max_stations = v; }
        if let Some(v) = &cli.callsigns_file { self.callsigns_file = Some(v.clone()); }
        if let Some(v) = &cli.parks_file { self.parks_file = Some(v.clone()); }
        if let Some(v) = &cli.exchange_patterns_file { self.exchange_patterns_file = Some(v.clone()); }
        if let Some(v) = cli.auto_incoming_after_qso { q.auto_incoming_after_qso = v; }
        if let Some(v) = cli.auto_incoming_probability { q.auto_incoming_probability = v; }
        if let Some(v) = cli.p2p_probability { q.p2p_probability = v; }
        if let Some(v) = &cli.my_park_ref { q.my_park_ref = v.clone(); }
        if let Some(v) = cli.allow_599 { q.allow_599 = v; }
        if let Some(v) = cli.allow_tu { q.allow_tu = v; }
        if let Some(v) = cli.use_prosigns { q.use_prosigns = v; }
        if let Some(v) = &cli.qso_prosign_literal { q.prosign_literal = v.clone(); }
        if let Some(v) = cli.ignore_bk { q.ignore_bk = v; }
    }
}

/// Keeps the encoder's prosign vocabulary in agreement with the literals the
/// decoder and the QSO engine actually use (spec.md §9: "the encoder and
/// decoder must agree ... keep both sides driven from a single configuration
/// literal to avoid drift"). `qso.prosign_literal` is what TX templates
/// substitute into `{PROSIGN}`/`{TX_PROSIGN}`, so without this it would
/// render with a normal inter-letter gap unless the user separately listed
/// it under `[encoder] prosign_tokens`.
fn sync_prosign_tokens(cfg: &mut AppConfig) {
    let mut tokens: Vec<String> = cfg.encoder.prosign_tokens.drain(..).collect();
    for literal in [&cfg.decoder.prosign_literal, &cfg.qso.prosign_literal] {
        if !tokens.iter().any(|t| t.eq_ignore_ascii_case(literal)) {
            tokens.push(literal.clone());
        }
    }
    cfg.encoder.prosign_tokens = tokens;
}

/// Backward-compat normalization (spec.md §6 / SPEC_FULL.md §4.4): when only
/// a fixed value was ever supplied, both TX-range endpoints copy it; given
/// endpoints are sorted so start ≤ end.
fn normalize_ranges(cfg: &mut AppConfig) {
    if cfg.wpm_out_range.0 > cfg.wpm_out_range.1 {
        cfg.wpm_out_range = (cfg.wpm_out_range.1, cfg.wpm_out_range.0);
    }
    if cfg.tone_out_range.0 > cfg.tone_out_range.1 {
        cfg.tone_out_range = (cfg.tone_out_range.1, cfg.tone_out_range.0);
    }
}

fn default_config_path() -> PathBuf {
    config_dir().join("cw-qso-sim").join("config.toml")
}

fn config_dir() -> PathBuf {
    if let Ok(v) = std::env::var("XDG_CONFIG_HOME") { return PathBuf::from(v); }
    if let Ok(v) = std::env::var("APPDATA") { return PathBuf::from(v); }
    let home = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")).unwrap_or_default();
    PathBuf::from(home).join(".config")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_ranges() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.wpm_out_range, (cfg.encoder.wpm, cfg.encoder.wpm));
        assert_eq!(cfg.tone_out_range, (cfg.encoder.tone_hz, cfg.encoder.tone_hz));
    }

    #[test]
    fn normalize_ranges_sorts_reversed_endpoints() {
        let mut cfg = AppConfig::default();
        cfg.wpm_out_range = (25.0, 18.0);
        normalize_ranges(&mut cfg);
        assert_eq!(cfg.wpm_out_range, (18.0, 25.0));
    }

    #[test]
    fn preset_noisy_raises_thresholds() {
        let mut d = DecoderCfg::default();
        Preset::Noisy.apply(&mut d);
        assert_eq!(d.threshold_on_mult, Some(6.0));
    }

    #[test]
    fn overridden_wpm_without_explicit_range_yields_matching_fixed_range() {
        let cli = Cli { wpm: Some(25.0), tone_hz: Some(700.0), ..Default::default() };
        let cfg = AppConfig::load(&cli).expect("load should succeed with no config file present");
        assert_eq!(cfg.encoder.wpm, 25.0);
        assert_eq!(cfg.wpm_out_range, (25.0, 25.0));
        assert_eq!(cfg.encoder.tone_hz, 700.0);
        assert_eq!(cfg.tone_out_range, (700.0, 700.0));
    }

    #[test]
    fn explicit_out_range_is_not_overwritten_by_fixed_value() {
        let cli = Cli { wpm: Some(25.0), wpm_out_start: Some(15.0), wpm_out_end: Some(20.0), ..Default::default() };
        let cfg = AppConfig::load(&cli).expect("load should succeed with no config file present");
        assert_eq!(cfg.wpm_out_range, (15.0, 20.0));
    }
}
