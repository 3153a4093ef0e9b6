// src/keyer/iambic.rs  —  pure iambic keyer renderer, factored out of the
// hardware-coupled adapter so it is testable without a device. A pure
// function of (dit_pressed, dah_pressed, elapsed): no HID/MIDI/serial I/O
// lives here, only the squeeze-latch timing state machine.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaddleMode {
    Straight,
    IambicA,
    IambicB,
}

/// A single rendered element transition: the element starts keyed down for
/// `is_dash`'s duration, then keyed up for one dot's worth of inter-element
/// space, unless it is the last element before the paddles go fully idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyerEvent {
    Down(bool),
    Up,
}

enum Phase {
    Idle,
    Element { is_dash: bool, started_at: Instant, dur: Duration },
    Gap { started_at: Instant, dur: Duration },
}

/// Renders paddle contact state into keyed elements. Drive it by calling
/// `set_paddles` whenever contact state changes and `tick` on every runtime
/// cycle; `tick` returns a `KeyerEvent` exactly when a transition occurs.
pub struct IambicKeyer {
    mode: PaddleMode,
    dot_dur: Duration,
    dit_pressed: bool,
    dah_pressed: bool,
    squeeze_active: bool,
    last_element: Option<bool>,
    phase: Phase,
    started_elements: Vec<bool>,
}

impl IambicKeyer {
    pub fn new(mode: PaddleMode, dot_dur: Duration) -> Self {
        Self {
            mode,
            dot_dur,
            dit_pressed: false,
            dah_pressed: false,
            squeeze_active: false,
            last_element: None,
            phase: Phase::Idle,
            started_elements: Vec::new(),
        }
    }

    pub fn set_dot_duration(&mut self, dot_dur: Duration) {
        self.dot_dur = dot_dur;
    }

    /// Update raw contact state. A true squeeze (both held at once) latches
    /// `squeeze_active`, which survives a brief single-paddle release until
    /// both paddles go fully idle (the anti-bounce behavior this renderer is
    /// grounded on).
    pub fn set_paddles(&mut self, dit: bool, dah: bool) {
        self.dit_pressed = dit;
        self.dah_pressed = dah;
        if dit && dah {
            self.squeeze_active = true;
        }
    }

    /// Drain the log of elements started since the last call (test hook).
    pub fn pop_started_elements(&mut self) -> Vec<bool> {
        std::mem::take(&mut self.started_elements)
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.phase, Phase::Idle)
    }

    /// Advance the state machine to `now`; returns the transition that just
    /// occurred, if any.
    pub fn tick(&mut self, now: Instant) -> Option<KeyerEvent> {
        if self.mode == PaddleMode::Straight {
            return self.tick_straight();
        }
        match self.phase {
            Phase::Idle => {
                if self.dit_pressed || self.dah_pressed {
                    let is_dash = self.decide_next();
                    self.start_element(is_dash, now);
                    return Some(KeyerEvent::Down(is_dash));
                }
                None
            }
            Phase::Element { is_dash: _, started_at, dur } => {
                if now.duration_since(started_at) >= dur {
                    self.phase = Phase::Gap { started_at: now, dur: self.dot_dur };
                    return Some(KeyerEvent::Up);
                }
                None
            }
            Phase::Gap { started_at, dur } => {
                if now.duration_since(started_at) >= dur {
                    if self.dit_pressed || self.dah_pressed {
                        let is_dash = self.decide_next();
                        self.start_element(is_dash, now);
                        return Some(KeyerEvent::Down(is_dash));
                    }
                    if self.squeeze_active && self.mode == PaddleMode::IambicB {
                        // Iambic-B memory: the squeeze broke mid-cycle but one
                        // more opposite element is still owed.
                        let is_dash = !self.last_element.unwrap_or(false);
                        self.squeeze_active = false;
                        self.start_element(is_dash, now);
                        return Some(KeyerEvent::Down(is_dash));
                    }
                    self.squeeze_active = false;
                    self.phase = Phase::Idle;
                }
                None
            }
        }
    }

    fn tick_straight(&mut self) -> Option<KeyerEvent> {
        let down = self.dit_pressed || self.dah_pressed;
        let was_down = matches!(self.phase, Phase::Element { .. });
        if down == was_down {
            return None;
        }
        if down {
            self.phase = Phase::Element { is_dash: false, started_at: Instant::now(), dur: Duration::MAX };
            Some(KeyerEvent::Down(false))
        } else {
            self.phase = Phase::Idle;
            Some(KeyerEvent::Up)
        }
    }

    fn start_element(&mut self, is_dash: bool, now: Instant) {
        let dur = if is_dash { self.dot_dur * 3 } else { self.dot_dur };
        self.phase = Phase::Element { is_dash, started_at: now, dur };
        self.last_element = Some(is_dash);
        self.started_elements.push(is_dash);
    }

    /// A squeeze with no prior element defaults to dot; an ongoing squeeze
    /// alternates from the opposite of the last element sent; a single held
    /// paddle re-sends its own polarity every cycle.
    fn decide_next(&self) -> bool {
        if self.dit_pressed && self.dah_pressed {
            match self.last_element {
                None => false,
                Some(prev) => !prev,
            }
        } else {
            self.dah_pressed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_dit_paddle_repeats_dots() {
        let mut k = IambicKeyer::new(PaddleMode::IambicA, Duration::from_millis(60));
        let mut now = Instant::now();
        k.set_paddles(true, false);
        assert_eq!(k.tick(now), Some(KeyerEvent::Down(false)));
        now += Duration::from_millis(60);
        assert_eq!(k.tick(now), Some(KeyerEvent::Up));
        now += Duration::from_millis(60);
        assert_eq!(k.tick(now), Some(KeyerEvent::Down(false)));
    }

    #[test]
    fn squeeze_with_no_history_defaults_to_dot_then_alternates() {
        let mut k = IambicKeyer::new(PaddleMode::IambicA, Duration::from_millis(50));
        let mut now = Instant::now();
        k.set_paddles(true, true);
        assert_eq!(k.tick(now), Some(KeyerEvent::Down(false)));
        now += Duration::from_millis(50);
        assert_eq!(k.tick(now), Some(KeyerEvent::Up));
        now += Duration::from_millis(50);
        assert_eq!(k.tick(now), Some(KeyerEvent::Down(true)));
    }

    #[test]
    fn iambic_b_sends_one_extra_element_after_squeeze_release() {
        let mut k = IambicKeyer::new(PaddleMode::IambicB, Duration::from_millis(50));
        let mut now = Instant::now();
        k.set_paddles(true, true);
        k.tick(now); // Down(dot)
        now += Duration::from_millis(50);
        k.tick(now); // Up
        now += Duration::from_millis(50);
        k.tick(now); // Down(dash) — alternation
        // release both paddles while the dash is being sent
        k.set_paddles(false, false);
        now += Duration::from_millis(150); // dash (3 dots) completes
        k.tick(now); // Up
        now += Duration::from_millis(50);
        let ev = k.tick(now);
        assert_eq!(ev, Some(KeyerEvent::Down(false)));
        assert!(k.is_idle() == false);
    }

    #[test]
    fn iambic_a_stops_immediately_after_squeeze_release() {
        let mut k = IambicKeyer::new(PaddleMode::IambicA, Duration::from_millis(50));
        let mut now = Instant::now();
        k.set_paddles(true, true);
        k.tick(now);
        now += Duration::from_millis(50);
        k.tick(now); // Up
        k.set_paddles(false, false);
        now += Duration::from_millis(50);
        let ev = k.tick(now);
        assert_eq!(ev, None);
        assert!(k.is_idle());
    }
}
