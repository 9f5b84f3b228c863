use crate::engine::EngineError;
use crate::model::{Day, Ms, Window, DAY_MS, MINUTE_MS};

/// Derives the valid booking window for a business day from the configured
/// opening and closing times. Pure, no state. All times are shop-local;
/// any UTC conversion is the caller's responsibility.
#[derive(Debug, Clone, Copy)]
pub struct OperatingCalendar {
    /// Minutes from midnight.
    opening: u16,
    closing: u16,
    /// Minimum appointment duration in ms.
    min_appointment_ms: Ms,
}

impl OperatingCalendar {
    pub fn new(
        opening_minutes: u16,
        closing_minutes: u16,
        min_appointment_minutes: u16,
    ) -> Result<Self, EngineError> {
        if opening_minutes >= closing_minutes {
            return Err(EngineError::InvalidConfiguration(
                "opening time must be before closing time",
            ));
        }
        if closing_minutes as Ms * MINUTE_MS > DAY_MS {
            return Err(EngineError::InvalidConfiguration(
                "closing time past end of day",
            ));
        }
        if min_appointment_minutes == 0 {
            return Err(EngineError::InvalidConfiguration(
                "minimum appointment duration must be positive",
            ));
        }
        Ok(Self {
            opening: opening_minutes,
            closing: closing_minutes,
            min_appointment_ms: min_appointment_minutes as Ms * MINUTE_MS,
        })
    }

    /// The operating window for the given business day.
    pub fn window_for(&self, day: Day) -> Window {
        let base = day * DAY_MS;
        Window::new(
            base + self.opening as Ms * MINUTE_MS,
            base + self.closing as Ms * MINUTE_MS,
        )
    }

    pub fn min_appointment_ms(&self) -> Ms {
        self.min_appointment_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_for_day() {
        // 08:00–18:00
        let cal = OperatingCalendar::new(8 * 60, 18 * 60, 30).unwrap();
        let w = cal.window_for(5);
        assert_eq!(w.start, 5 * DAY_MS + 8 * 60 * MINUTE_MS);
        assert_eq!(w.end, 5 * DAY_MS + 18 * 60 * MINUTE_MS);
        assert_eq!(w.duration_ms(), 10 * 60 * MINUTE_MS);
    }

    #[test]
    fn opening_after_closing_rejected() {
        let result = OperatingCalendar::new(18 * 60, 8 * 60, 30);
        assert!(matches!(result, Err(EngineError::InvalidConfiguration(_))));
    }

    #[test]
    fn opening_equal_closing_rejected() {
        let result = OperatingCalendar::new(9 * 60, 9 * 60, 30);
        assert!(matches!(result, Err(EngineError::InvalidConfiguration(_))));
    }

    #[test]
    fn zero_min_appointment_rejected() {
        let result = OperatingCalendar::new(8 * 60, 18 * 60, 0);
        assert!(matches!(result, Err(EngineError::InvalidConfiguration(_))));
    }

    #[test]
    fn closing_past_midnight_rejected() {
        let result = OperatingCalendar::new(8 * 60, 25 * 60, 30);
        assert!(matches!(result, Err(EngineError::InvalidConfiguration(_))));
    }
}
