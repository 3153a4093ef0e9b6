// src/dsp/mod.rs  —  Tone power estimation (C2) and keying detection (C3)
pub mod tone;
pub mod keying;

pub use tone::{goertzel_power, dominant_frequency};
pub use keying::{KeyingDetector, KeyingConfig, KeyEvent};
