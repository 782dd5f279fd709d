//! Time-of-day operation gate.
//!
//! Once per fetch interval the firmware pulls a plaintext body from the
//! remote time service and looks for a line of the form
//!
//! ```text
//! datetime: 2024-05-01T23:30:05-07:00
//! ```
//!
//! The 19 characters after the `datetime:` marker are parsed as an
//! ISO-8601-like local timestamp with full layout and range validation —
//! a malformed body yields a typed [`ParseError`] instead of silently
//! wrong hour/minute values.  The extracted time is checked against the
//! [`OperationWindow`]; any failure on the way leaves the gate at its
//! previous value.  The gate itself is plain owned state: it has exactly
//! one writer (the main loop's fetch path) and is read in the same task.

use core::fmt;

/// Byte offset of the timestamp relative to the `datetime:` marker match.
const MARKER: &str = "datetime:";
/// Fixed timestamp width: `YYYY-MM-DDTHH:MM:SS`.
const TIMESTAMP_LEN: usize = 19;

// ───────────────────────────────────────────────────────────────
// Parse errors
// ───────────────────────────────────────────────────────────────

/// Why a response body failed to yield a usable time-of-day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// The body contains no `datetime:` marker.
    MarkerMissing,
    /// Fewer than 19 characters follow the marker.
    Truncated,
    /// A digit or separator is not where the layout requires it.
    Malformed,
    /// Layout is fine but a field is outside its legal range
    /// (e.g. hour 24, minute 61).
    FieldOutOfRange,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MarkerMissing => write!(f, "no 'datetime:' marker in body"),
            Self::Truncated => write!(f, "timestamp after marker is truncated"),
            Self::Malformed => write!(f, "timestamp layout is malformed"),
            Self::FieldOutOfRange => write!(f, "timestamp field out of range"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// TimeOfDay
// ───────────────────────────────────────────────────────────────

/// A validated wall-clock time of day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    hour: u8,
    minute: u8,
}

impl TimeOfDay {
    /// Construct from already-validated fields.
    /// Returns `None` if hour > 23 or minute > 59.
    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour > 23 || minute > 59 {
            return None;
        }
        Some(Self { hour, minute })
    }

    pub fn hour(self) -> u8 {
        self.hour
    }

    pub fn minute(self) -> u8 {
        self.minute
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

// ───────────────────────────────────────────────────────────────
// Body parsing
// ───────────────────────────────────────────────────────────────

/// Extract and validate the time-of-day from a time-service response body.
///
/// The marker search tolerates optional whitespace between `datetime:` and
/// the timestamp (the live service emits `datetime: 2024-…`).
pub fn parse_datetime(body: &str) -> Result<TimeOfDay, ParseError> {
    let idx = body.find(MARKER).ok_or(ParseError::MarkerMissing)?;
    let after = body[idx + MARKER.len()..].trim_start_matches(' ');

    // Byte-wise from here on: avoids panicking str slices on multibyte input.
    let bytes = after.as_bytes();
    if bytes.len() < TIMESTAMP_LEN {
        return Err(ParseError::Truncated);
    }
    let stamp = &bytes[..TIMESTAMP_LEN];

    // Layout: YYYY-MM-DDTHH:MM:SS
    //         0123456789012345678
    for (i, &b) in stamp.iter().enumerate() {
        let ok = match i {
            4 | 7 => b == b'-',
            10 => b == b'T',
            13 | 16 => b == b':',
            _ => b.is_ascii_digit(),
        };
        if !ok {
            return Err(ParseError::Malformed);
        }
    }

    let month = two_digits(stamp, 5);
    let day = two_digits(stamp, 8);
    let hour = two_digits(stamp, 11);
    let minute = two_digits(stamp, 14);
    let second = two_digits(stamp, 17);

    if !(1..=12).contains(&month) || !(1..=31).contains(&day) || second > 59 {
        return Err(ParseError::FieldOutOfRange);
    }

    TimeOfDay::new(hour, minute).ok_or(ParseError::FieldOutOfRange)
}

fn two_digits(stamp: &[u8], offset: usize) -> u8 {
    (stamp[offset] - b'0') * 10 + (stamp[offset + 1] - b'0')
}

// ───────────────────────────────────────────────────────────────
// Operation window
// ───────────────────────────────────────────────────────────────

/// The daily window during which automatic actuation is allowed.
/// Runs from the configured start time until midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationWindow {
    start_hour: u8,
    start_minute: u8,
}

impl OperationWindow {
    /// Returns `None` if the start time is not a valid time of day.
    pub fn starting_at(hour: u8, minute: u8) -> Option<Self> {
        if hour > 23 || minute > 59 {
            return None;
        }
        Some(Self {
            start_hour: hour,
            start_minute: minute,
        })
    }

    /// Whether `t` falls inside the window.
    pub fn contains(self, t: TimeOfDay) -> bool {
        t.hour() > self.start_hour
            || (t.hour() == self.start_hour && t.minute() >= self.start_minute)
    }
}

impl Default for OperationWindow {
    /// The stock 23:30-to-midnight window.
    fn default() -> Self {
        Self {
            start_hour: 23,
            start_minute: 30,
        }
    }
}

// ───────────────────────────────────────────────────────────────
// TimeGate
// ───────────────────────────────────────────────────────────────

/// The operation gate: a window plus the latched allow/deny decision.
///
/// `observe_body` is the only writer.  Failure paths never touch the
/// latched value, so a flaky network degrades to "keep doing what we
/// were doing" rather than flapping the gate on garbage input.
#[derive(Debug, Clone)]
pub struct TimeGate {
    window: OperationWindow,
    allow_operation: bool,
}

impl TimeGate {
    pub fn new(window: OperationWindow) -> Self {
        Self {
            window,
            // Closed until the first successful fetch.
            allow_operation: false,
        }
    }

    /// Whether automatic (button / light) actuation is currently allowed.
    pub fn is_open(&self) -> bool {
        self.allow_operation
    }

    /// Feed a fetched response body through the parser and update the gate.
    /// On any parse error the gate keeps its previous value.
    pub fn observe_body(&mut self, body: &str) -> Result<TimeOfDay, ParseError> {
        let t = parse_datetime(body)?;
        self.allow_operation = self.window.contains(t);
        Ok(t)
    }

    /// Update the gate from an already-parsed time (test hook and NTP-style
    /// callers).
    pub fn observe_time(&mut self, t: TimeOfDay) {
        self.allow_operation = self.window.contains(t);
    }

    /// Swap in a new window.  The latched decision is kept until the next
    /// observation re-evaluates it against the new bounds.
    pub fn set_window(&mut self, window: OperationWindow) {
        self.window = window;
    }

    pub fn window(&self) -> OperationWindow {
        self.window
    }
}

impl Default for TimeGate {
    fn default() -> Self {
        Self::new(OperationWindow::default())
    }
}

// ───────────────────────────────────────────────────────────────
// Tests
// ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const BODY_OPEN: &str = "abbreviation: PDT\ndatetime: 2024-05-01T23:30:05-07:00\nday_of_week: 3\n";
    const BODY_CLOSED: &str = "datetime: 2024-05-01T23:29:59-07:00\n";

    #[test]
    fn parses_live_service_body() {
        let t = parse_datetime(BODY_OPEN).unwrap();
        assert_eq!((t.hour(), t.minute()), (23, 30));
    }

    #[test]
    fn parses_without_space_after_marker() {
        let t = parse_datetime("datetime:2024-05-01T07:45:00-07:00").unwrap();
        assert_eq!((t.hour(), t.minute()), (7, 45));
    }

    #[test]
    fn missing_marker() {
        assert_eq!(parse_datetime("utc_offset: -07:00"), Err(ParseError::MarkerMissing));
    }

    #[test]
    fn truncated_timestamp() {
        assert_eq!(parse_datetime("datetime: 2024-05-01T23"), Err(ParseError::Truncated));
    }

    #[test]
    fn malformed_layout() {
        assert_eq!(
            parse_datetime("datetime: 2024/05/01T23:30:05-07:00"),
            Err(ParseError::Malformed)
        );
        assert_eq!(
            parse_datetime("datetime: 2024-05-01 23:30:05-07:00"),
            Err(ParseError::Malformed)
        );
    }

    #[test]
    fn hour_out_of_range_is_rejected_not_gated() {
        let mut gate = TimeGate::default();
        assert_eq!(
            gate.observe_body("datetime: 2024-05-01T24:10:00-07:00"),
            Err(ParseError::FieldOutOfRange)
        );
        assert!(!gate.is_open(), "invalid hour must never open the gate");
    }

    #[test]
    fn minute_out_of_range() {
        assert_eq!(
            parse_datetime("datetime: 2024-05-01T23:61:00-07:00"),
            Err(ParseError::FieldOutOfRange)
        );
    }

    #[test]
    fn gate_opens_at_2330() {
        let mut gate = TimeGate::default();
        gate.observe_body(BODY_OPEN).unwrap();
        assert!(gate.is_open());
    }

    #[test]
    fn gate_closed_at_2329() {
        let mut gate = TimeGate::default();
        gate.observe_body(BODY_CLOSED).unwrap();
        assert!(!gate.is_open());
    }

    #[test]
    fn gate_unchanged_when_marker_missing() {
        let mut gate = TimeGate::default();
        gate.observe_body(BODY_OPEN).unwrap();
        assert!(gate.is_open());

        // Marker-free body: prior value survives.
        assert_eq!(gate.observe_body("no timestamps here"), Err(ParseError::MarkerMissing));
        assert!(gate.is_open());
    }

    #[test]
    fn gate_unchanged_on_parse_error() {
        let mut gate = TimeGate::default();
        gate.observe_body(BODY_OPEN).unwrap();
        let _ = gate.observe_body("datetime: garbage-in-garbage");
        assert!(gate.is_open());
    }

    #[test]
    fn default_window_predicate_exhaustive() {
        let w = OperationWindow::default();
        for hour in 0u8..24 {
            for minute in 0u8..60 {
                let t = TimeOfDay::new(hour, minute).unwrap();
                let expected = hour == 23 && minute >= 30;
                assert_eq!(
                    w.contains(t),
                    expected,
                    "window mismatch at {:02}:{:02}",
                    hour,
                    minute
                );
            }
        }
    }

    #[test]
    fn custom_window_start() {
        let w = OperationWindow::starting_at(22, 0).unwrap();
        assert!(w.contains(TimeOfDay::new(22, 0).unwrap()));
        assert!(w.contains(TimeOfDay::new(23, 59).unwrap()));
        assert!(!w.contains(TimeOfDay::new(21, 59).unwrap()));
    }

    #[test]
    fn rejects_invalid_window_start() {
        assert!(OperationWindow::starting_at(24, 0).is_none());
        assert!(OperationWindow::starting_at(0, 60).is_none());
    }
}
