// src/keyer/mod.rs  —  KeyerInput trait + the keyboard fallback + the pure
// iambic renderer. Hardware HID/MIDI/serial adapters are out of scope: the
// only TX input path this crate renders against is the iambic keyer and the
// keyboard text-input fallback.
pub mod iambic;
pub mod keyboard;

use crate::morse::decoder::PaddleEvent;

/// Adapter interface — returns paddle events non-blocking.
pub trait KeyerInput: Send {
    /// Poll for the next event (non-blocking; returns PaddleEvent::None if nothing).
    fn poll(&mut self) -> PaddleEvent;
    /// Human-readable adapter name.
    fn name(&self) -> &str;
}

/// Factory for the TX input adapter. The only compiled-in option today is
/// the keyboard fallback; kept as a factory function (rather than
/// constructing `KeyboardKeyer` directly at the call site) so a future
/// adapter can be added without touching callers.
pub fn create_keyer() -> Box<dyn KeyerInput> {
    Box::new(keyboard::KeyboardKeyer::new())
}
