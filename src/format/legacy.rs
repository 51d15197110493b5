//! SIF 1.x primitive syntax.

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};

use super::{parse_decimal, SifDuration, SifFormatter};
use crate::error::{Result, SifError};
use crate::version::SifVersion;

/// Formatter for the legacy (1.x) family.
#[derive(Debug, Clone, Copy)]
pub struct LegacyFormatter {
    version: SifVersion,
}

impl LegacyFormatter {
    /// Formatter bound to `version`.
    pub fn new(version: SifVersion) -> Self {
        Self { version }
    }
}

impl SifFormatter for LegacyFormatter {
    fn version(&self) -> SifVersion {
        self.version
    }

    fn to_date_string(&self, date: NaiveDate) -> String {
        date.format("%Y%m%d").to_string()
    }

    fn to_date(&self, value: &str) -> Result<NaiveDate> {
        let value = value.trim();
        let invalid = || SifError::Messaging(format!("Invalid SIF {} date: {value}", self.version));

        if value.len() != 8 || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let year = value[..4].parse().map_err(|_| invalid())?;
        let month = value[4..6].parse().map_err(|_| invalid())?;
        let day = value[6..].parse().map_err(|_| invalid())?;
        NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
    }

    fn to_time_string(&self, time: NaiveTime) -> String {
        time.format("%H:%M:%S").to_string()
    }

    fn to_time(&self, value: &str) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(value.trim(), "%H:%M:%S")
            .map_err(|e| SifError::Messaging(format!("Invalid SIF {} time {value}: {e}", self.version)))
    }

    // 1.x has no timestamp type; only the date survives.
    fn to_datetime_string(&self, datetime: DateTime<FixedOffset>) -> String {
        self.to_date_string(datetime.date_naive())
    }

    fn to_datetime(&self, value: &str) -> Result<DateTime<Utc>> {
        Ok(self.to_date(value)?.and_time(NaiveTime::MIN).and_utc())
    }

    fn to_bool_string(&self, value: bool) -> &'static str {
        if value {
            "Yes"
        } else {
            "No"
        }
    }

    fn to_bool(&self, value: &str) -> Result<bool> {
        match value.trim() {
            v if v.eq_ignore_ascii_case("yes") => Ok(true),
            v if v.eq_ignore_ascii_case("no") => Ok(false),
            v => Err(SifError::Messaging(format!("Invalid SIF {} boolean: {v}", self.version))),
        }
    }

    fn to_duration_string(&self, _duration: &SifDuration) -> Result<String> {
        Err(SifError::Unsupported(format!(
            "Durations are not supported in SIF {}",
            self.version
        )))
    }

    fn to_duration(&self, _value: &str) -> Result<SifDuration> {
        Err(SifError::Unsupported(format!(
            "Durations are not supported in SIF {}",
            self.version
        )))
    }

    fn to_decimal(&self, value: &str) -> Result<f64> {
        let value = value.trim();
        parse_decimal(value.strip_suffix('%').unwrap_or(value).trim_end())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn formatter() -> LegacyFormatter {
        LegacyFormatter::new(SifVersion::SIF15R1)
    }

    #[test]
    fn test_dates() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
        assert_eq!(formatter().to_date_string(date), "20240105");
        assert_eq!(formatter().to_date("20240105").unwrap(), date);
        assert!(formatter().to_date("2024-01-05").is_err());
        assert!(formatter().to_date("20241305").is_err());
    }

    #[test]
    fn test_datetime_collapses_to_date() {
        let dt = DateTime::parse_from_rfc3339("2024-01-05T13:45:00+00:00").unwrap();
        assert_eq!(formatter().to_datetime_string(dt), "20240105");
        let parsed = formatter().to_datetime("20240105").unwrap();
        assert_eq!(parsed.to_rfc3339(), "2024-01-05T00:00:00+00:00");
    }

    #[test]
    fn test_time() {
        let time = NaiveTime::from_hms_opt(13, 45, 9).unwrap();
        assert_eq!(formatter().to_time_string(time), "13:45:09");
        assert_eq!(formatter().to_time("13:45:09").unwrap(), time);
    }

    #[test]
    fn test_booleans() {
        assert_eq!(formatter().to_bool_string(false), "No");
        assert!(formatter().to_bool("Yes").unwrap());
        assert!(!formatter().to_bool("no").unwrap());
        assert!(formatter().to_bool("true").is_err());
    }

    #[test]
    fn test_duration_unsupported() {
        let err = formatter().to_duration("P1D").unwrap_err();
        assert!(matches!(err, SifError::Unsupported(_)));
        assert!(matches!(
            formatter().to_duration_string(&SifDuration::default()),
            Err(SifError::Unsupported(_))
        ));
    }

    #[test]
    fn test_decimal_strips_percent() {
        assert!((formatter().to_decimal("12.5%").unwrap() - 12.5).abs() < f64::EPSILON);
        assert!((formatter().to_decimal("-3").unwrap() + 3.0).abs() < f64::EPSILON);
        assert!(formatter().to_decimal("%").is_err());
    }
}
