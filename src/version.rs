//! SIF protocol version tags.
//!
//! Versions are totally ordered by `(major, minor, revision)` and render the
//! way they appear on the wire: `1.5r1`, `2.0`, `3.0`. The major number
//! selects the [`VersionFamily`], which governs primitive syntax.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Result, SifError};

/// Structural generation of the SIF schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VersionFamily {
    /// SIF 1.x: compact dates, `Yes`/`No` booleans, no durations
    Legacy,
    /// SIF 2.x and later: XML Schema datatypes
    Current,
}

impl VersionFamily {
    /// Default XML namespace of messages in this family.
    pub fn xmlns(&self) -> &'static str {
        match self {
            Self::Legacy => "http://www.sifinfo.org/infrastructure/1.x",
            Self::Current => "http://www.sifinfo.org/infrastructure/2.x",
        }
    }
}

/// A SIF version identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SifVersion {
    major: u8,
    minor: u8,
    revision: u8,
}

impl SifVersion {
    /// SIF 1.0r1
    pub const SIF10R1: Self = Self::new(1, 0, 1);
    /// SIF 1.0r2
    pub const SIF10R2: Self = Self::new(1, 0, 2);
    /// SIF 1.1
    pub const SIF11: Self = Self::new(1, 1, 0);
    /// SIF 1.5r1
    pub const SIF15R1: Self = Self::new(1, 5, 1);
    /// SIF 2.0
    pub const SIF20: Self = Self::new(2, 0, 0);
    /// SIF 2.0r1
    pub const SIF20R1: Self = Self::new(2, 0, 1);
    /// SIF 2.1
    pub const SIF21: Self = Self::new(2, 1, 0);
    /// SIF 2.2
    pub const SIF22: Self = Self::new(2, 2, 0);
    /// SIF 2.3
    pub const SIF23: Self = Self::new(2, 3, 0);
    /// SIF 2.4
    pub const SIF24: Self = Self::new(2, 4, 0);
    /// SIF 2.5
    pub const SIF25: Self = Self::new(2, 5, 0);
    /// SIF 2.6
    pub const SIF26: Self = Self::new(2, 6, 0);
    /// SIF 3.0
    pub const SIF30: Self = Self::new(3, 0, 0);
    /// Most recent version this agent speaks
    pub const LATEST: Self = Self::SIF30;

    /// Every published version, oldest first.
    pub const ALL: [Self; 13] = [
        Self::SIF10R1,
        Self::SIF10R2,
        Self::SIF11,
        Self::SIF15R1,
        Self::SIF20,
        Self::SIF20R1,
        Self::SIF21,
        Self::SIF22,
        Self::SIF23,
        Self::SIF24,
        Self::SIF25,
        Self::SIF26,
        Self::SIF30,
    ];

    /// Create a version from its components.
    pub const fn new(major: u8, minor: u8, revision: u8) -> Self {
        Self {
            major,
            minor,
            revision,
        }
    }

    /// Major number.
    pub fn major(&self) -> u8 {
        self.major
    }

    /// Minor number.
    pub fn minor(&self) -> u8 {
        self.minor
    }

    /// Revision number (0 when absent).
    pub fn revision(&self) -> u8 {
        self.revision
    }

    /// Family governing primitive syntax.
    pub fn family(&self) -> VersionFamily {
        if self.major < 2 {
            VersionFamily::Legacy
        } else {
            VersionFamily::Current
        }
    }
}

impl Default for SifVersion {
    fn default() -> Self {
        Self::LATEST
    }
}

impl fmt::Display for SifVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if self.revision > 0 {
            write!(f, "r{}", self.revision)?;
        }
        Ok(())
    }
}

impl FromStr for SifVersion {
    type Err = SifError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || SifError::Config(format!("Invalid SIF version: {s}"));
        let s = s.trim();

        let (numbers, revision) = match s.to_lowercase().split_once('r') {
            Some((numbers, rev)) => (numbers.to_string(), rev.parse().map_err(|_| invalid())?),
            None => (s.to_string(), 0),
        };
        let (major, minor) = numbers.split_once('.').ok_or_else(invalid)?;

        Ok(Self::new(
            major.parse().map_err(|_| invalid())?,
            minor.parse().map_err(|_| invalid())?,
            revision,
        ))
    }
}

impl Serialize for SifVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SifVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
