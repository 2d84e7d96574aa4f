//! Clip timestamps
//!
//! Clients send `MM:SS` or `HH:MM:SS`. Fields are not range-checked, so
//! `"90:00"` is ninety minutes.

use crate::error::{ClipError, Result};

/// Longest clip the service will cut, in seconds.
pub const MAX_CLIP_DURATION: u64 = 120;

/// Parse `MM:SS` or `HH:MM:SS` into whole seconds.
pub fn parse_timestamp(ts: &str) -> Result<u64> {
    let invalid = || ClipError::InvalidTimestamp(ts.to_string());

    let fields = ts
        .trim()
        .split(':')
        .map(|part| {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            part.parse::<u64>().ok()
        })
        .collect::<Option<Vec<u64>>>()
        .ok_or_else(invalid)?;

    let (hours, minutes, seconds) = match fields.as_slice() {
        [m, s] => (0, *m, *s),
        [h, m, s] => (*h, *m, *s),
        _ => return Err(invalid()),
    };

    hours
        .checked_mul(3600)
        .and_then(|h| minutes.checked_mul(60).and_then(|m| h.checked_add(m)))
        .and_then(|hm| hm.checked_add(seconds))
        .ok_or_else(invalid)
}

/// Render seconds as `HH:MM:SS`, the form ffmpeg takes for `-ss`.
pub fn format_timestamp(total: u64) -> String {
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// A validated `[start, end)` range of the source video.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipWindow {
    pub start: u64,
    pub end: u64,
}

impl ClipWindow {
    /// Build a window, enforcing `end > start` and the duration cap.
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if end <= start {
            return Err(ClipError::InvalidRange { start, end });
        }
        let requested = end - start;
        if requested > MAX_CLIP_DURATION {
            return Err(ClipError::DurationExceeded {
                requested,
                max: MAX_CLIP_DURATION,
            });
        }
        Ok(Self { start, end })
    }

    /// Parse both timestamps and validate the range between them.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        Self::new(parse_timestamp(start)?, parse_timestamp(end)?)
    }

    pub fn duration(&self) -> u64 {
        self.end - self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minutes_seconds() {
        assert_eq!(parse_timestamp("02:05").unwrap(), 125);
        assert_eq!(parse_timestamp("0:00").unwrap(), 0);
    }

    #[test]
    fn parses_hours_minutes_seconds() {
        assert_eq!(parse_timestamp("01:02:03").unwrap(), 3723);
        assert_eq!(parse_timestamp("  00:01:00 ").unwrap(), 60);
    }

    #[test]
    fn large_fields_are_not_bounded() {
        assert_eq!(parse_timestamp("90:00").unwrap(), 5400);
        assert_eq!(parse_timestamp("00:00:75").unwrap(), 75);
    }

    #[test]
    fn rejects_malformed_input() {
        for bad in ["", "5", "1:2:3:4", "aa:10", "1:-5", "1::2", "1:2.5", "+1:00"] {
            assert!(
                matches!(parse_timestamp(bad), Err(ClipError::InvalidTimestamp(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn rejects_overflow() {
        assert!(parse_timestamp("99999999999999999999:00").is_err());
        assert!(parse_timestamp(&format!("{}:00:00", u64::MAX / 1000)).is_err());
    }

    #[test]
    fn formats_as_hh_mm_ss() {
        assert_eq!(format_timestamp(125), "00:02:05");
        assert_eq!(format_timestamp(0), "00:00:00");
        assert_eq!(format_timestamp(3723), "01:02:03");
        assert_eq!(format_timestamp(100 * 3600), "100:00:00");
    }

    #[test]
    fn format_inverts_parse() {
        for (input, normalized) in [
            ("02:05", "00:02:05"),
            ("59:59", "00:59:59"),
            ("01:00:00", "01:00:00"),
            ("12:34:56", "12:34:56"),
            ("00:00", "00:00:00"),
        ] {
            assert_eq!(format_timestamp(parse_timestamp(input).unwrap()), normalized);
        }
    }

    #[test]
    fn window_requires_end_after_start() {
        assert!(matches!(
            ClipWindow::new(60, 60),
            Err(ClipError::InvalidRange { .. })
        ));
        // Ordering is checked before the duration cap.
        assert!(matches!(
            ClipWindow::new(1000, 10),
            Err(ClipError::InvalidRange { .. })
        ));
    }

    #[test]
    fn window_caps_duration() {
        assert_eq!(ClipWindow::new(0, 120).unwrap().duration(), 120);
        assert!(matches!(
            ClipWindow::new(0, 121),
            Err(ClipError::DurationExceeded { requested: 121, max: 120 })
        ));
    }

    #[test]
    fn window_parse_reports_bad_timestamp_first() {
        assert!(matches!(
            ClipWindow::parse("x", "00:10"),
            Err(ClipError::InvalidTimestamp(_))
        ));
        let window = ClipWindow::parse("00:01:00", "00:02:00").unwrap();
        assert_eq!((window.start, window.end), (60, 120));
    }
}
