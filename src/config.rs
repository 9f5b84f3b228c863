use std::path::PathBuf;

use crate::engine::EngineError;

/// Runtime configuration, read from `BAYLINE_*` environment variables.
/// All values are plain; validation happens here, once, at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Opening/closing time-of-day in minutes from midnight, shop-local.
    pub opening_minutes: u16,
    pub closing_minutes: u16,
    pub max_spots: u16,
    pub min_appointment_minutes: u16,
    /// How long past its start an unconfirmed booking survives.
    pub cancellation_threshold_minutes: u32,
    pub sweep_frequency_minutes: u32,
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub compact_threshold: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            opening_minutes: 8 * 60,
            closing_minutes: 18 * 60,
            max_spots: 4,
            min_appointment_minutes: 30,
            cancellation_threshold_minutes: 15,
            sweep_frequency_minutes: 1,
            data_dir: PathBuf::from("./data"),
            metrics_port: None,
            compact_threshold: 1000,
        }
    }
}

/// Parse "HH:MM" into minutes from midnight.
fn parse_time_of_day(s: &str) -> Option<u16> {
    let (h, m) = s.split_once(':')?;
    let h: u16 = h.parse().ok()?;
    let m: u16 = m.parse().ok()?;
    if h > 24 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

impl Config {
    pub fn from_env() -> Result<Self, EngineError> {
        let defaults = Config::default();
        let opening = std::env::var("BAYLINE_OPENING")
            .ok()
            .map(|s| {
                parse_time_of_day(&s)
                    .ok_or(EngineError::InvalidConfiguration("bad BAYLINE_OPENING"))
            })
            .transpose()?
            .unwrap_or(defaults.opening_minutes);
        let closing = std::env::var("BAYLINE_CLOSING")
            .ok()
            .map(|s| {
                parse_time_of_day(&s)
                    .ok_or(EngineError::InvalidConfiguration("bad BAYLINE_CLOSING"))
            })
            .transpose()?
            .unwrap_or(defaults.closing_minutes);

        let config = Self {
            opening_minutes: opening,
            closing_minutes: closing,
            max_spots: env_parsed("BAYLINE_MAX_SPOTS").unwrap_or(defaults.max_spots),
            min_appointment_minutes: env_parsed("BAYLINE_MIN_APPOINTMENT_MINUTES")
                .unwrap_or(defaults.min_appointment_minutes),
            cancellation_threshold_minutes: env_parsed("BAYLINE_CANCELLATION_THRESHOLD_MINUTES")
                .unwrap_or(defaults.cancellation_threshold_minutes),
            sweep_frequency_minutes: env_parsed("BAYLINE_SWEEP_FREQUENCY_MINUTES")
                .unwrap_or(defaults.sweep_frequency_minutes),
            data_dir: std::env::var("BAYLINE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            metrics_port: env_parsed("BAYLINE_METRICS_PORT"),
            compact_threshold: env_parsed("BAYLINE_COMPACT_THRESHOLD")
                .unwrap_or(defaults.compact_threshold),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.opening_minutes >= self.closing_minutes {
            return Err(EngineError::InvalidConfiguration(
                "opening time must be before closing time",
            ));
        }
        if self.max_spots == 0 {
            return Err(EngineError::InvalidConfiguration(
                "max spots must be positive",
            ));
        }
        if self.min_appointment_minutes == 0 {
            return Err(EngineError::InvalidConfiguration(
                "minimum appointment duration must be positive",
            ));
        }
        if self.sweep_frequency_minutes == 0 {
            return Err(EngineError::InvalidConfiguration(
                "sweep frequency must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_time_of_day_valid() {
        assert_eq!(parse_time_of_day("08:00"), Some(480));
        assert_eq!(parse_time_of_day("18:30"), Some(1110));
        assert_eq!(parse_time_of_day("0:05"), Some(5));
    }

    #[test]
    fn parse_time_of_day_invalid() {
        assert_eq!(parse_time_of_day("25:00"), None);
        assert_eq!(parse_time_of_day("08:60"), None);
        assert_eq!(parse_time_of_day("0800"), None);
        assert_eq!(parse_time_of_day("ab:cd"), None);
    }

    #[test]
    fn default_config_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn zero_spots_rejected() {
        let config = Config {
            max_spots: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn inverted_hours_rejected() {
        let config = Config {
            opening_minutes: 1200,
            closing_minutes: 480,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn zero_sweep_frequency_rejected() {
        let config = Config {
            sweep_frequency_minutes: 0,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidConfiguration(_))
        ));
    }
}
