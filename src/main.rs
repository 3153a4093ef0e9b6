// src/main.rs  —  cw-qso-sim  entry point
mod audio;
mod config;
mod dsp;
mod i18n;
mod keyer;
mod loaders;
mod morse;
mod qso;
mod runtime;
mod tui;

use anyhow::{Context, Result};
use clap::Parser;
use config::{AppConfig, Cli, InputMode};
use qso::{export as qso_export, QsoConfig, QsoEngine, QsoResult};
use rand::rngs::SmallRng;
use rand::SeedableRng;
use runtime::{RuntimeState, Worker};
use std::io::BufRead;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const TICK: Duration = Duration::from_millis(50);

/// Shared UI state handed to the TUI each frame.
#[derive(Default, Clone)]
pub struct AppState {
    pub my_call: String,
    pub other_call: String,
    pub runtime_state: String,
    pub qso_state: String,
    pub pending_callers: Vec<String>,
    pub rx_tail: Vec<String>,
    pub tx_tail: Vec<String>,
    pub current_code: String,
    pub decoded_tail: String,
    pub wpm_estimate: f32,
    pub tone_hz: f32,
    pub level_db: f32,
    pub status: String,
    pub text_mode: bool,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if cli.print_config {
        print!("{}", config::DEFAULT_CONFIG_TOML);
        return Ok(());
    }
    if cli.write_config {
        let path = AppConfig::write_default_config(&cli)?;
        println!("Config written to: {}", path.display());
        println!("Edit it to set your callsign, pools, and exchange behavior.");
        return Ok(());
    }
    if cli.list_devices {
        let (inputs, outputs) = audio::list_devices();
        println!("Input devices:");
        for d in &inputs { println!("  {d}"); }
        println!("Output devices:");
        for d in &outputs { println!("  {d}"); }
        return Ok(());
    }

    #[cfg(not(feature = "tui"))]
    if cli.tui {
        eprintln!("This build was compiled without the `tui` feature.");
        std::process::exit(2);
    }

    let cfg = AppConfig::load(&cli)?;

    let callsign_pool = match &cfg.callsigns_file {
        Some(path) => loaders::callsigns::load_file(path).with_context(|| format!("loading callsign pool {path}"))?,
        None => Vec::new(),
    };
    let park_pool = match &cfg.parks_file {
        Some(path) => loaders::parks::load_file(path).with_context(|| format!("loading park pool {path}"))?,
        None => Vec::new(),
    };
    let (patterns, pattern_warning) = loaders::load_exchange_patterns(cfg.exchange_patterns_file.as_deref());
    if let Some(w) = pattern_warning {
        log::warn!("{w}");
    }

    let qso_cfg: QsoConfig = cfg.qso.clone();
    let engine = QsoEngine::new(qso_cfg, patterns, callsign_pool, park_pool, SmallRng::from_entropy());

    if cli.simulate {
        let mut worker = Worker::new(cfg.decoder.clone(), cfg.encoder.clone(), cfg.wpm_out_range, cfg.tone_out_range, engine);
        worker.start();
        return run_simulate(worker);
    }

    let lang = cli.lang.clone().unwrap_or_else(|| "en".to_string());
    match cfg.input_mode {
        InputMode::Audio => run_audio(cfg, engine, cli.tui, cli.calibrate_noise_secs, lang),
        InputMode::Keyboard => run_keyboard(cfg, engine, cli.tui, lang),
    }
}

/// `--simulate`: a stdin line-mode REPL. Each line is one completed "over";
/// `/reset`, `/export [path]`, and `/quit` are handled as commands.
fn run_simulate<R: rand::Rng>(mut worker: Worker<R>) -> Result<()> {
    println!("cw-qso-sim --simulate  (type an over per line; /reset, /export [path], /quit)");
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        if trimmed.eq_ignore_ascii_case("/quit") {
            break;
        }
        if trimmed.eq_ignore_ascii_case("/reset") {
            worker.manual_reset();
            println!("(reset)");
            continue;
        }
        if let Some(rest) = trimmed.strip_prefix("/export") {
            let path = rest.trim();
            let path = if path.is_empty() { "session.json" } else { path };
            export_session(&worker, path)?;
            println!("(exported to {path})");
            continue;
        }
        if let Some(result) = worker.submit_text(trimmed) {
            print_result(&result);
        }
    }
    Ok(())
}

fn print_result(result: &QsoResult) {
    for info in &result.info {
        println!("[info] {info}");
    }
    for err in &result.errors {
        println!("[err] {err}");
    }
    for reply in &result.replies {
        println!("TX> {reply}");
    }
}

fn export_session<R: rand::Rng>(worker: &Worker<R>, path: &str) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    qso_export::export_to_file(worker.engine(), &now, std::path::Path::new(path))
}

/// Audio-input runtime: captures the microphone into the decoder and plays
/// simulated-station replies back out, optionally driving the TUI.
#[cfg(feature = "audio-cpal")]
fn run_audio(mut cfg: AppConfig, engine: QsoEngine<SmallRng>, want_tui: bool, calibrate_noise_secs: Option<f32>, lang: String) -> Result<()> {
    let input =
        audio::create_audio_input(cfg.input_device.as_deref(), 2.0).context("opening audio input device")?;
    // The actual capture sample rate is only known once the device stream is
    // open (cpal picks the device's default config); re-home the decoder
    // onto it so frame sizing stays correct.
    cfg.decoder.keying.sample_rate = input.ring().sample_rate();
    let mut worker = Worker::new(cfg.decoder.clone(), cfg.encoder.clone(), cfg.wpm_out_range, cfg.tone_out_range, engine);

    if let Some(secs) = calibrate_noise_secs {
        calibrate_noise_floor(&mut worker, &input, secs);
    }

    worker.start();
    run_audio_inner(cfg, input, worker, want_tui, lang)
}

#[cfg(not(feature = "audio-cpal"))]
fn run_audio(_cfg: AppConfig, _engine: QsoEngine<SmallRng>, _want_tui: bool, _calibrate_noise_secs: Option<f32>, _lang: String) -> Result<()> {
    anyhow::bail!("this build has no audio input support (feature \"audio-cpal\" disabled); use --simulate or input_mode = \"keyboard\"")
}

/// Capture `secs` of silent-band audio against a deadline clock and feed it
/// to the decoder's offline noise calibration. Reports failure (and leaves
/// the noise floor unchanged) if no audio arrived in that window, matching
/// spec.md §5's calibration-timeout contract.
#[cfg(feature = "audio-cpal")]
fn calibrate_noise_floor(worker: &mut Worker<SmallRng>, input: &audio::CpalAudioInputHandle, secs: f32) {
    println!("Calibrating noise floor from {secs:.1}s of silence — stay off the key…");
    let ring = input.ring();
    let deadline = std::time::Instant::now() + Duration::from_secs_f32(secs.max(0.1));
    let mut captured = Vec::new();
    while std::time::Instant::now() < deadline {
        captured.extend(ring.drain());
        thread::sleep(Duration::from_millis(50));
    }
    if captured.is_empty() {
        log::warn!("noise calibration failed: no audio captured in {secs:.1}s; noise floor unchanged");
        return;
    }
    if worker.calibrate_noise_floor(&captured) {
        println!("Noise floor calibrated from {} samples.", captured.len());
    } else {
        log::warn!("noise calibration failed: buffer too short for one frame; noise floor unchanged");
    }
}

#[cfg(feature = "audio-cpal")]
fn run_audio_inner(
    cfg: AppConfig,
    input: audio::CpalAudioInputHandle,
    mut worker: Worker<SmallRng>,
    want_tui: bool,
    lang: String,
) -> Result<()> {
    let ring = input.ring();
    let mut audio_out = audio::create_audio(cfg.encoder.tone_hz, cfg.encoder.volume);

    let (tx_playback, rx_playback) = mpsc::channel::<(Vec<f32>, u32)>();
    let sample_rate = cfg.sample_rate;
    thread::spawn(move || {
        while let Ok((samples, sr)) = rx_playback.recv() {
            if let Err(e) = audio_out.play_samples(&samples, sr) {
                log::error!("playback failed: {e}");
            }
        }
    });

    #[cfg(feature = "tui")]
    let mut tui = if want_tui { Some(tui::Tui::new(&lang)?) } else { None };
    #[cfg(not(feature = "tui"))]
    let _ = (want_tui, lang);

    let mut state = AppState { my_call: cfg.qso.my_call.clone(), status: "Listening…".into(), ..Default::default() };

    'main: loop {
        #[cfg(feature = "tui")]
        if tui.is_some() {
            use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
            while event::poll(Duration::from_millis(0))? {
                if let Event::Key(k) = event::read()? {
                    if k.kind == KeyEventKind::Release {
                        continue;
                    }
                    if k.code == KeyCode::Esc || (k.code == KeyCode::Char('c') && k.modifiers.contains(KeyModifiers::CONTROL)) {
                        break 'main;
                    }
                }
            }
        }

        let samples = ring.drain();
        if !samples.is_empty() {
            if let Some(result) = worker.feed_samples(&samples) {
                apply_result(&result, &tx_playback, &mut worker, sample_rate);
            }
        }

        refresh_state(&mut state, &worker);
        #[cfg(feature = "tui")]
        if let Some(t) = tui.as_mut() {
            t.draw(&state)?;
        }

        thread::sleep(TICK);
    }

    #[cfg(feature = "tui")]
    if let Some(mut t) = tui {
        t.cleanup();
    }
    println!("\n73! Good luck with the pile-ups.\n");
    Ok(())
}

/// Keyboard-fallback runtime: types replace keying entirely, as spec.md's
/// keyboard adapter describes. No audio device is required.
fn run_keyboard(cfg: AppConfig, engine: QsoEngine<SmallRng>, want_tui: bool, lang: String) -> Result<()> {
    let mut worker = Worker::new(cfg.decoder.clone(), cfg.encoder.clone(), cfg.wpm_out_range, cfg.tone_out_range, engine);
    worker.start();
    let mut audio_out = audio::create_audio(cfg.encoder.tone_hz, cfg.encoder.volume);
    let sample_rate = cfg.sample_rate;
    let (tx_playback, rx_playback) = mpsc::channel::<(Vec<f32>, u32)>();
    thread::spawn(move || {
        while let Ok((samples, sr)) = rx_playback.recv() {
            if let Err(e) = audio_out.play_samples(&samples, sr) {
                log::error!("playback failed: {e}");
            }
        }
    });

    #[cfg(feature = "tui")]
    let mut tui = if want_tui { Some(tui::Tui::new(&lang)?) } else { None };
    #[cfg(not(feature = "tui"))]
    let _ = (want_tui, lang);

    let mut state = AppState {
        my_call: cfg.qso.my_call.clone(),
        status: "Type your exchange; Enter ends your over.".into(),
        text_mode: true,
        ..Default::default()
    };
    let _keyer = keyer::create_keyer();
    let mut kb_buf = String::new();

    'main: loop {
        #[cfg(feature = "tui")]
        if let Some(t) = tui.as_mut() {
            use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
            while event::poll(Duration::from_millis(0))? {
                if let Event::Key(k) = event::read()? {
                    if k.kind == KeyEventKind::Release {
                        continue;
                    }
                    if k.code == KeyCode::Esc || (k.code == KeyCode::Char('c') && k.modifiers.contains(KeyModifiers::CONTROL)) {
                        break 'main;
                    }
                    match k.code {
                        KeyCode::Backspace => { kb_buf.pop(); }
                        KeyCode::Enter => {
                            let word = std::mem::take(&mut kb_buf);
                            if !word.trim().is_empty() {
                                if let Some(result) = worker.submit_text(&word) {
                                    apply_result(&result, &tx_playback, &mut worker, sample_rate);
                                }
                            }
                        }
                        KeyCode::Char(c) => kb_buf.push(c.to_ascii_uppercase()),
                        _ => {}
                    }
                }
            }
            state.current_code = kb_buf.clone();
            refresh_state(&mut state, &worker);
            t.draw(&state)?;
        }
        #[cfg(not(feature = "tui"))]
        {
            let _ = &mut kb_buf;
            break 'main;
        }

        thread::sleep(TICK);
    }

    #[cfg(feature = "tui")]
    if let Some(mut t) = tui {
        t.cleanup();
    }
    println!("\n73! Good luck with the pile-ups.\n");
    Ok(())
}

fn apply_result(
    result: &QsoResult,
    tx_playback: &mpsc::Sender<(Vec<f32>, u32)>,
    worker: &mut Worker<SmallRng>,
    sample_rate: u32,
) {
    for samples in worker.render_replies(&result.replies) {
        let _ = tx_playback.send((samples, sample_rate));
    }
    for err in &result.errors {
        log::warn!("{err}");
    }
}

fn refresh_state(state: &mut AppState, worker: &Worker<SmallRng>) {
    let snapshot = worker.snapshot();
    let readout = worker.decoder_readout();
    state.runtime_state = match worker.state() {
        RuntimeState::Stopped => "STOPPED",
        RuntimeState::Running => "RUNNING",
        RuntimeState::Paused => "PAUSED",
    }
    .to_string();
    state.qso_state = format!("{:?}", snapshot.state);
    state.other_call = snapshot.active_other_call;
    state.pending_callers = snapshot.pending_callers;
    state.tx_tail = snapshot.tx_transcript.iter().rev().take(12).rev().cloned().collect();
    state.rx_tail = snapshot.rx_transcript.iter().rev().take(12).rev().cloned().collect();
    state.current_code = readout.current_code;
    state.decoded_tail = worker.decoded_log().to_string();
    state.wpm_estimate = readout.wpm_estimate;
    state.tone_hz = readout.tone_hz;
    state.level_db = readout.level_db;
}
