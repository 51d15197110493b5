//! SIF 2.x+ primitive syntax (XML Schema datatypes).

use chrono::{
    DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeDelta, Utc,
};

use super::{SifDuration, SifFormatter};
use crate::error::{Result, SifError};
use crate::version::SifVersion;

/// Formatter for the current (2.x and later) family.
#[derive(Debug, Clone, Copy)]
pub struct CurrentFormatter {
    version: SifVersion,
}

impl CurrentFormatter {
    /// Formatter bound to `version`.
    pub fn new(version: SifVersion) -> Self {
        Self { version }
    }

    fn invalid(&self, kind: &str, value: &str) -> SifError {
        SifError::Messaging(format!("Invalid SIF {} {kind}: {value}", self.version))
    }
}

/// Split an optional `Z` / `+hh:mm` / `-hh:mm` suffix off a date or time
/// lexical value. Returns the remainder and the offset in seconds east of UTC.
fn split_zone(value: &str) -> Option<(&str, i32)> {
    if let Some(rest) = value.strip_suffix('Z') {
        return Some((rest, 0));
    }
    if value.len() > 6 && value.is_char_boundary(value.len() - 6) {
        let (rest, zone) = value.split_at(value.len() - 6);
        let sign = match zone.as_bytes()[0] {
            b'+' => 1,
            b'-' => -1,
            _ => return Some((value, 0)),
        };
        if zone.as_bytes()[3] != b':' {
            return Some((value, 0));
        }
        let hours: i32 = zone[1..3].parse().ok()?;
        let minutes: i32 = zone[4..].parse().ok()?;
        return Some((rest, sign * (hours * 3_600 + minutes * 60)));
    }
    Some((value, 0))
}

impl SifFormatter for CurrentFormatter {
    fn version(&self) -> SifVersion {
        self.version
    }

    fn to_date_string(&self, date: NaiveDate) -> String {
        date.format("%Y-%m-%d").to_string()
    }

    // The zone of an xs:date does not change the calendar day it names.
    fn to_date(&self, value: &str) -> Result<NaiveDate> {
        let value = value.trim();
        let (date, _) = split_zone(value).ok_or_else(|| self.invalid("date", value))?;
        NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| self.invalid("date", value))
    }

    fn to_time_string(&self, time: NaiveTime) -> String {
        time.format("%H:%M:%S").to_string()
    }

    fn to_time(&self, value: &str) -> Result<NaiveTime> {
        let value = value.trim();
        let (time, offset) = split_zone(value).ok_or_else(|| self.invalid("time", value))?;
        let time = NaiveTime::parse_from_str(time, "%H:%M:%S%.f")
            .map_err(|_| self.invalid("time", value))?;
        Ok(time
            .overflowing_sub_signed(TimeDelta::seconds(i64::from(offset)))
            .0)
    }

    fn to_datetime_string(&self, datetime: DateTime<FixedOffset>) -> String {
        datetime
            .with_timezone(&Utc)
            .to_rfc3339_opts(SecondsFormat::AutoSi, true)
    }

    // Values without a zone are taken as UTC.
    fn to_datetime(&self, value: &str) -> Result<DateTime<Utc>> {
        let value = value.trim();
        if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
            return Ok(datetime.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|_| self.invalid("datetime", value))
    }

    fn to_bool_string(&self, value: bool) -> &'static str {
        if value {
            "true"
        } else {
            "false"
        }
    }

    fn to_bool(&self, value: &str) -> Result<bool> {
        match value.trim() {
            "true" | "1" => Ok(true),
            "false" | "0" => Ok(false),
            v => Err(self.invalid("boolean", v)),
        }
    }

    fn to_duration_string(&self, duration: &SifDuration) -> Result<String> {
        Ok(duration.to_string())
    }

    fn to_duration(&self, value: &str) -> Result<SifDuration> {
        value.parse()
    }
}
