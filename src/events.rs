//! Interrupt-driven event system.
//!
//! Events are produced by:
//! - the button GPIO ISR (press edges)
//! - the BLE GATT write callback (remote commands)
//! - the main loop itself (control and fetch ticks on host targets)
//!
//! Events are consumed by the main control loop, which processes them one
//! at a time.  The queue is the only channel between the radio stack's
//! callback context and the loop that owns the servo — the callback never
//! touches the actuator directly.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Button ISR   │────▶│              │     │              │
//! │ BLE callback │────▶│  Event Queue │────▶│  Main Loop   │
//! │ Software     │────▶│  (lock-free) │     │  (consumer)  │
//! └──────────────┘     └──────────────┘     └──────────────┘
//! ```

use core::sync::atomic::{AtomicU8, Ordering};

/// Maximum number of pending events.
/// Power of 2 for efficient ring buffer modulo.
const EVENT_QUEUE_CAP: usize = 16;

/// System event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Event {
    /// Control loop tick (sensor poll + actuation decision).
    ControlTick = 0,
    /// Time-service fetch cadence elapsed.
    TimeFetchTick = 1,
    /// A payload was written to the BLE command characteristic.
    RemoteCommand = 2,
    /// Debounced button press.
    ButtonPress = 3,
}

// ── Lock-free MPSC ring buffer ────────────────────────────────
//
// Three producer contexts push (the button GPIO ISR, the Bluedroid-task
// GATTS callback, the main loop itself); only the main loop pops.  A
// producer claims its slot with a compare-exchange on EVENT_HEAD, then
// publishes the payload through the slot's own atomic — so two racing
// producers can never write the same slot, and the consumer can never
// read a slot whose payload has not landed yet.

const SLOT_EMPTY: u8 = 0xFF;

static EVENT_HEAD: AtomicU8 = AtomicU8::new(0);
static EVENT_TAIL: AtomicU8 = AtomicU8::new(0);
static EVENT_BUFFER: [AtomicU8; EVENT_QUEUE_CAP] =
    [const { AtomicU8::new(SLOT_EMPTY) }; EVENT_QUEUE_CAP];

/// Push an event into the queue.
/// Safe to call from ISR / callback context (lock-free, multi-producer).
/// Returns `false` if the queue is full (event dropped).
pub fn push_event(event: Event) -> bool {
    let mut head = EVENT_HEAD.load(Ordering::Relaxed);
    loop {
        let tail = EVENT_TAIL.load(Ordering::Acquire);
        let next_head = (head + 1) % EVENT_QUEUE_CAP as u8;

        if next_head == tail {
            return false; // Queue full — drop event.
        }

        // Claim the slot.  On contention another producer moved the head;
        // retry with the fresh value.
        match EVENT_HEAD.compare_exchange_weak(
            head,
            next_head,
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => {
                EVENT_BUFFER[head as usize].store(event as u8, Ordering::Release);
                return true;
            }
            Err(current) => head = current,
        }
    }
}

/// Pop the next event from the queue.
/// Called from the main loop (single consumer).
/// Returns `None` if the queue is empty, or if the next slot is claimed
/// but its producer has not published the payload yet (retry next drain).
pub fn pop_event() -> Option<Event> {
    let tail = EVENT_TAIL.load(Ordering::Relaxed);
    let head = EVENT_HEAD.load(Ordering::Acquire);

    if tail == head {
        return None; // Empty.
    }

    let raw = EVENT_BUFFER[tail as usize].swap(SLOT_EMPTY, Ordering::Acquire);
    if raw == SLOT_EMPTY {
        // Slot claimed, payload not yet stored.  Tail stays put so the
        // event is picked up once the producer finishes.
        return None;
    }

    EVENT_TAIL.store((tail + 1) % EVENT_QUEUE_CAP as u8, Ordering::Release);
    event_from_u8(raw)
}

/// Drain all pending events into a callback, FIFO order.
pub fn drain_events(mut handler: impl FnMut(Event)) {
    while let Some(event) = pop_event() {
        handler(event);
    }
}

/// Number of pending events.
pub fn queue_len() -> usize {
    let head = EVENT_HEAD.load(Ordering::Relaxed) as usize;
    let tail = EVENT_TAIL.load(Ordering::Relaxed) as usize;
    (head + EVENT_QUEUE_CAP - tail) % EVENT_QUEUE_CAP
}

// ── Internal ──────────────────────────────────────────────────

fn event_from_u8(raw: u8) -> Option<Event> {
    match raw {
        0 => Some(Event::ControlTick),
        1 => Some(Event::TimeFetchTick),
        2 => Some(Event::RemoteCommand),
        3 => Some(Event::ButtonPress),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Tests share the static queue; serialise and drain to isolate.
    static QUEUE_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

    fn flush() {
        drain_events(|_| {});
    }

    #[test]
    fn fifo_order_preserved() {
        let _guard = QUEUE_LOCK.lock().unwrap();
        flush();
        push_event(Event::ControlTick);
        push_event(Event::RemoteCommand);
        push_event(Event::ButtonPress);
        assert_eq!(pop_event(), Some(Event::ControlTick));
        assert_eq!(pop_event(), Some(Event::RemoteCommand));
        assert_eq!(pop_event(), Some(Event::ButtonPress));
        assert_eq!(pop_event(), None);
    }

    #[test]
    fn racing_producers_lose_no_accepted_events() {
        let _guard = QUEUE_LOCK.lock().unwrap();
        flush();

        let accepted = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut producers = Vec::new();
        for _ in 0..3 {
            let accepted = accepted.clone();
            producers.push(std::thread::spawn(move || {
                for _ in 0..2000 {
                    if push_event(Event::RemoteCommand) {
                        accepted.fetch_add(1, Ordering::SeqCst);
                    }
                    std::thread::yield_now();
                }
            }));
        }

        // Drain concurrently from this thread (the single consumer).
        let mut drained = 0usize;
        while producers.iter().any(|p| !p.is_finished()) {
            drain_events(|_| drained += 1);
        }
        for p in producers {
            p.join().unwrap();
        }
        drain_events(|_| drained += 1);

        // Every push that reported success must come out exactly once.
        assert_eq!(drained, accepted.load(Ordering::SeqCst));
    }

    #[test]
    fn full_queue_drops_event() {
        let _guard = QUEUE_LOCK.lock().unwrap();
        flush();
        for _ in 0..EVENT_QUEUE_CAP - 1 {
            assert!(push_event(Event::ControlTick));
        }
        assert!(!push_event(Event::ControlTick), "queue should be full");
        assert_eq!(queue_len(), EVENT_QUEUE_CAP - 1);
        flush();
    }
}
