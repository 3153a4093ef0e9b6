// src/qso/mod.rs  —  C6/C7/C8/C10: exchange patterns, station profiles,
// protocol state machine, session export.
pub mod export;
pub mod patterns;
pub mod profiles;
pub mod state;

pub use state::{CqMode, QsoCompletion, QsoConfig, QsoEngine, QsoResult, QsoSnapshot, QsoState};
