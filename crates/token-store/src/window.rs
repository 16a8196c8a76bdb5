//! Rotation window day math
//!
//! A rotation window is one calendar day computed in a provider-specific
//! fixed UTC offset. Exhaustion marks are valid only while the persisted
//! day key equals the window's current day.

use chrono::{DateTime, FixedOffset, Utc};

/// A provider's rotation window: a calendar day at a fixed UTC offset.
///
/// The offset is a configuration constant per provider (e.g. UTC for
/// western-hosted services, UTC+8 for mainland-China billing days), never a
/// request parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationWindow {
    offset_hours: i8,
}

impl RotationWindow {
    /// Window aligned to UTC midnight.
    pub const UTC: RotationWindow = RotationWindow { offset_hours: 0 };

    /// Window aligned to midnight at the given whole-hour UTC offset.
    ///
    /// Offsets outside ±23 hours are clamped.
    pub fn utc_offset(hours: i8) -> Self {
        Self {
            offset_hours: hours.clamp(-23, 23),
        }
    }

    /// The day key ("YYYY-MM-DD") for the current instant.
    pub fn current_day(&self) -> String {
        self.day_for(Utc::now())
    }

    /// The day key for an arbitrary instant. Split out from `current_day`
    /// so window boundaries are testable without a clock.
    pub fn day_for(&self, at: DateTime<Utc>) -> String {
        match FixedOffset::east_opt(i32::from(self.offset_hours) * 3600) {
            Some(offset) => at.with_timezone(&offset).format("%Y-%m-%d").to_string(),
            None => at.format("%Y-%m-%d").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn utc_window_uses_utc_date() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 23, 30, 0).unwrap();
        assert_eq!(RotationWindow::UTC.day_for(at), "2025-03-01");
    }

    #[test]
    fn utc_plus_eight_rolls_over_before_utc() {
        // 23:30 UTC on March 1 is already 07:30 on March 2 in UTC+8
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 23, 30, 0).unwrap();
        assert_eq!(RotationWindow::utc_offset(8).day_for(at), "2025-03-02");
    }

    #[test]
    fn utc_plus_eight_same_day_during_overlap() {
        // 08:00 UTC is 16:00 UTC+8, same calendar day
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap();
        assert_eq!(RotationWindow::utc_offset(8).day_for(at), "2025-03-01");
    }

    #[test]
    fn negative_offset_lags_utc() {
        // 02:00 UTC on March 2 is still 21:00 March 1 in UTC-5
        let at = Utc.with_ymd_and_hms(2025, 3, 2, 2, 0, 0).unwrap();
        assert_eq!(RotationWindow::utc_offset(-5).day_for(at), "2025-03-01");
    }

    #[test]
    fn out_of_range_offset_is_clamped() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        // Clamped to +23, which is still a valid fixed offset
        let window = RotationWindow::utc_offset(i8::MAX);
        assert_eq!(window.day_for(at), "2025-03-02");
    }
}
