//! ISO-8601 durations (`xs:duration`).

use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SifError};

/// A calendar duration such as `P1Y2M3DT4H5M6.5S`.
///
/// Years and months have no fixed length, so components are kept as written
/// rather than folded into a single span.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SifDuration {
    /// Leading `-` sign
    pub negative: bool,
    /// Years
    pub years: u32,
    /// Months
    pub months: u32,
    /// Days
    pub days: u32,
    /// Hours
    pub hours: u32,
    /// Minutes
    pub minutes: u32,
    /// Seconds, possibly fractional
    pub seconds: f64,
}

impl SifDuration {
    /// Duration of whole days, hours, minutes and seconds.
    pub fn from_std(duration: std::time::Duration) -> Self {
        let total = duration.as_secs();
        Self {
            days: (total / 86_400) as u32,
            hours: ((total % 86_400) / 3_600) as u32,
            minutes: ((total % 3_600) / 60) as u32,
            seconds: (total % 60) as f64 + f64::from(duration.subsec_nanos()) / 1e9,
            ..Self::default()
        }
    }

    fn has_time(&self) -> bool {
        self.hours > 0 || self.minutes > 0 || self.seconds > 0.0
    }
}

impl fmt::Display for SifDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            f.write_str("-")?;
        }
        f.write_str("P")?;
        if self.years > 0 {
            write!(f, "{}Y", self.years)?;
        }
        if self.months > 0 {
            write!(f, "{}M", self.months)?;
        }
        if self.days > 0 {
            write!(f, "{}D", self.days)?;
        }
        if self.has_time() {
            f.write_str("T")?;
            if self.hours > 0 {
                write!(f, "{}H", self.hours)?;
            }
            if self.minutes > 0 {
                write!(f, "{}M", self.minutes)?;
            }
            if self.seconds > 0.0 {
                write!(f, "{}S", self.seconds)?;
            }
        } else if self.years == 0 && self.months == 0 && self.days == 0 {
            f.write_str("T0S")?;
        }
        Ok(())
    }
}

impl FromStr for SifDuration {
    type Err = SifError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || SifError::Messaging(format!("Invalid duration: {s}"));
        let trimmed = s.trim();

        let (negative, rest) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let rest = rest.strip_prefix('P').ok_or_else(invalid)?;
        let (date_part, time_part) = match rest.split_once('T') {
            Some((_, "")) => return Err(invalid()),
            Some((date, time)) => (date, Some(time)),
            None => (rest, None),
        };
        if date_part.is_empty() && time_part.is_none() {
            return Err(invalid());
        }

        let mut duration = Self {
            negative,
            ..Self::default()
        };

        for (value, designator) in components(date_part).ok_or_else(invalid)? {
            let whole: u32 = value.parse().map_err(|_| invalid())?;
            match designator {
                'Y' => duration.years = whole,
                'M' => duration.months = whole,
                'D' => duration.days = whole,
                _ => return Err(invalid()),
            }
        }
        for (value, designator) in components(time_part.unwrap_or("")).ok_or_else(invalid)? {
            match designator {
                'H' => duration.hours = value.parse().map_err(|_| invalid())?,
                'M' => duration.minutes = value.parse().map_err(|_| invalid())?,
                'S' => duration.seconds = value.parse().map_err(|_| invalid())?,
                _ => return Err(invalid()),
            }
        }

        Ok(duration)
    }
}

/// Split `1Y2M` into `[("1", 'Y'), ("2", 'M')]`; `None` on malformed input.
fn components(part: &str) -> Option<Vec<(&str, char)>> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, c) in part.char_indices() {
        if c.is_ascii_digit() || c == '.' {
            continue;
        }
        if i == start {
            return None;
        }
        out.push((&part[start..i], c));
        start = i + c.len_utf8();
    }
    (start == part.len()).then_some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full() {
        let d: SifDuration = "P1Y2M3DT4H5M6.5S".parse().unwrap();
        assert_eq!(d.years, 1);
        assert_eq!(d.months, 2);
        assert_eq!(d.days, 3);
        assert_eq!(d.hours, 4);
        assert_eq!(d.minutes, 5);
        assert!((d.seconds - 6.5).abs() < f64::EPSILON);
        assert_eq!(d.to_string(), "P1Y2M3DT4H5M6.5S");
    }

    #[test]
    fn test_minutes_vs_months() {
        let d: SifDuration = "PT30M".parse().unwrap();
        assert_eq!(d.minutes, 30);
        assert_eq!(d.months, 0);
        assert_eq!(d.to_string(), "PT30M");
    }

    #[test]
    fn test_negative_and_zero() {
        let d: SifDuration = "-P2D".parse().unwrap();
        assert!(d.negative);
        assert_eq!(d.to_string(), "-P2D");
        assert_eq!(SifDuration::default().to_string(), "PT0S");
    }

    #[test]
    fn test_rejects_malformed() {
        for bad in ["", "P", "PT", "1D", "P1X", "PTD", "P1DT", "P1H"] {
            assert!(bad.parse::<SifDuration>().is_err(), "{bad}");
        }
    }

    #[test]
    fn test_from_std() {
        let d = SifDuration::from_std(std::time::Duration::from_secs(90_061));
        assert_eq!(d.to_string(), "P1DT1H1M1S");
    }
}
