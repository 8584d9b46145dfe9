//! Fixed-length stepping over the requested time interval.

use std::fmt;

use chrono::{DateTime, Duration, Utc};

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SegmentWindow {
    /// The first window of a request.
    pub fn first(start: DateTime<Utc>, length: Duration) -> Self {
        Self {
            start,
            end: start + length,
        }
    }

    pub fn length(&self) -> Duration {
        self.end - self.start
    }

    /// Shifts both edges by `length`. Called after every attempt whatever
    /// its outcome.
    pub fn advance(&self, length: Duration) -> Self {
        Self {
            start: self.start + length,
            end: self.end + length,
        }
    }
}

impl fmt::Display for SegmentWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {}",
            self.start.format("%Y-%m-%dT%H:%M:%S"),
            self.end.format("%Y-%m-%dT%H:%M:%S")
        )
    }
}

/// Yields consecutive windows of `length` from `start` while the window end
/// does not pass `end`.
#[derive(Debug, Clone)]
pub struct SegmentClock {
    cursor: SegmentWindow,
    length: Duration,
    end: DateTime<Utc>,
}

impl SegmentClock {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, length: Duration) -> Self {
        Self {
            cursor: SegmentWindow::first(start, length),
            length,
            end,
        }
    }
}

impl Iterator for SegmentClock {
    type Item = SegmentWindow;

    fn next(&mut self) -> Option<SegmentWindow> {
        // non-positive lengths never terminate; config validation rejects them
        if self.length <= Duration::zero() || self.cursor.end > self.end {
            return None;
        }
        let window = self.cursor;
        self.cursor = self.cursor.advance(self.length);
        Some(window)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::TimeZone;

    fn t(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2014, 8, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn advance_keeps_length() {
        let day = Duration::days(1);
        let w = SegmentWindow::first(t(1, 0), day);
        let next = w.advance(day);
        assert_eq!(next.start, t(2, 0));
        assert_eq!(next.end, t(3, 0));
        assert_eq!(next.length(), day);
    }

    #[test]
    fn windows_are_contiguous_and_bounded() {
        let len = Duration::hours(7);
        let windows: Vec<_> = SegmentClock::new(t(1, 0), t(3, 0), len).collect();
        // 48 h / 7 h -> 6 whole windows, the 7th would end at 49 h
        assert_eq!(windows.len(), 6);
        for pair in windows.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
            assert!(pair[0].start < pair[1].start);
        }
        for w in &windows {
            assert_eq!(w.length(), len);
            assert!(w.end <= t(3, 0));
        }
    }

    #[test]
    fn exact_fit_includes_last_window() {
        let windows: Vec<_> = SegmentClock::new(t(1, 0), t(3, 0), Duration::days(1)).collect();
        assert_eq!(windows.len(), 2);
        assert_eq!(windows[1].end, t(3, 0));
    }

    #[test]
    fn too_long_yields_nothing() {
        let mut clock = SegmentClock::new(t(1, 0), t(1, 12), Duration::days(1));
        assert!(clock.next().is_none());
    }
}
