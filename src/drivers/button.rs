//! ISR-debounced push-button driver.
//!
//! ## Hardware
//!
//! Active-high momentary switch with an external pull-down.  GPIO fires
//! on the rising edge; the ISR records the raw timestamp into an atomic,
//! and `tick()` (called from the main loop at control-tick rate) runs
//! the debounce state machine and emits a single [`ButtonEvent::Press`]
//! per physical press.  Nothing here blocks; the 500 ms press latch is a
//! hold timer in the application service, not a delay loop.

use core::sync::atomic::{AtomicU32, Ordering};

const DEBOUNCE_MS: u32 = 50;

/// Raw ISR timestamp (milliseconds since boot, truncated to u32).
/// Written by the ISR, read by the main loop.
static BUTTON_ISR_TIMESTAMP: AtomicU32 = AtomicU32::new(0);

/// Simulated pin level for host builds (tests set this).
#[cfg(not(target_os = "espidf"))]
static SIM_LEVEL: core::sync::atomic::AtomicBool = core::sync::atomic::AtomicBool::new(false);

/// Debounced button events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    /// One confirmed press (rising edge that survived debounce).
    Press,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DebounceState {
    Idle,
    DebounceWait { since_ms: u32 },
    Latched,
}

pub struct ButtonDriver {
    gpio: i32,
    state: DebounceState,
    last_isr_ms: u32,
}

impl ButtonDriver {
    pub fn new(gpio: i32) -> Self {
        Self {
            gpio,
            state: DebounceState::Idle,
            last_isr_ms: 0,
        }
    }

    /// GPIO pin this button is attached to.
    pub fn gpio(&self) -> i32 {
        self.gpio
    }

    /// Call from the main loop at each control tick.
    /// `now_ms` is the current monotonic time in milliseconds.
    /// Returns a debounced press event, if any.
    pub fn tick(&mut self, now_ms: u32) -> Option<ButtonEvent> {
        let isr_ms = BUTTON_ISR_TIMESTAMP.load(Ordering::Acquire);
        let new_edge = isr_ms != self.last_isr_ms && isr_ms != 0;

        match self.state {
            DebounceState::Idle => {
                if new_edge {
                    self.last_isr_ms = isr_ms;
                    self.state = DebounceState::DebounceWait { since_ms: now_ms };
                }
                None
            }

            DebounceState::DebounceWait { since_ms } => {
                if now_ms.wrapping_sub(since_ms) < DEBOUNCE_MS {
                    return None;
                }
                if self.is_pressed_hw() {
                    // Edge confirmed by a steady level: real press.
                    self.state = DebounceState::Latched;
                    Some(ButtonEvent::Press)
                } else {
                    // Contact bounce or glitch.
                    self.state = DebounceState::Idle;
                    None
                }
            }

            DebounceState::Latched => {
                // Swallow edges until the button is released.
                if new_edge {
                    self.last_isr_ms = isr_ms;
                }
                if !self.is_pressed_hw() {
                    self.state = DebounceState::Idle;
                }
                None
            }
        }
    }

    /// Debounced level: `true` while a confirmed press is held.
    pub fn is_latched(&self) -> bool {
        self.state == DebounceState::Latched
    }

    #[cfg(target_os = "espidf")]
    fn is_pressed_hw(&self) -> bool {
        crate::drivers::hw_init::gpio_read(self.gpio)
    }

    #[cfg(not(target_os = "espidf"))]
    fn is_pressed_hw(&self) -> bool {
        SIM_LEVEL.load(Ordering::Acquire)
    }
}

/// ISR handler — register this on the button GPIO rising edge.
/// Safe to call from interrupt context (lock-free atomic store).
#[allow(unused)]
pub fn button_isr_handler(now_ms: u32) {
    BUTTON_ISR_TIMESTAMP.store(now_ms, Ordering::Release);
}

/// Host-side test hook: set the simulated pin level.
#[cfg(not(target_os = "espidf"))]
pub fn sim_set_level(pressed: bool) {
    SIM_LEVEL.store(pressed, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // BUTTON_ISR_TIMESTAMP and SIM_LEVEL are process globals; serialize
    // tests that touch them.
    static BUTTON_LOCK: Mutex<()> = Mutex::new(());

    fn reset() {
        BUTTON_ISR_TIMESTAMP.store(0, Ordering::SeqCst);
        sim_set_level(false);
    }

    #[test]
    fn no_events_without_press() {
        let _guard = BUTTON_LOCK.lock().unwrap();
        reset();
        let mut btn = ButtonDriver::new(37);
        assert_eq!(btn.tick(100), None);
        assert_eq!(btn.tick(200), None);
    }

    #[test]
    fn press_confirmed_after_debounce() {
        let _guard = BUTTON_LOCK.lock().unwrap();
        reset();
        let mut btn = ButtonDriver::new(37);

        sim_set_level(true);
        button_isr_handler(1000);
        assert_eq!(btn.tick(1000), None); // debounce wait
        assert_eq!(btn.tick(1030), None); // still within 50 ms
        assert_eq!(btn.tick(1060), Some(ButtonEvent::Press));
        assert!(btn.is_latched());
    }

    #[test]
    fn glitch_rejected() {
        let _guard = BUTTON_LOCK.lock().unwrap();
        reset();
        let mut btn = ButtonDriver::new(37);

        button_isr_handler(500);
        btn.tick(500);
        // Level already dropped by the time debounce expires: noise.
        assert_eq!(btn.tick(560), None);
        assert!(!btn.is_latched());
    }

    #[test]
    fn held_button_emits_once() {
        let _guard = BUTTON_LOCK.lock().unwrap();
        reset();
        let mut btn = ButtonDriver::new(37);

        sim_set_level(true);
        button_isr_handler(100);
        btn.tick(100);
        assert_eq!(btn.tick(160), Some(ButtonEvent::Press));

        // Bouncy contacts keep firing the ISR while held.
        for t in (200..1000).step_by(100) {
            button_isr_handler(t);
            assert_eq!(btn.tick(t), None);
        }

        // Release, then press again: a second event.
        sim_set_level(false);
        btn.tick(1100);
        sim_set_level(true);
        button_isr_handler(1200);
        btn.tick(1200);
        assert_eq!(btn.tick(1260), Some(ButtonEvent::Press));
    }
}
