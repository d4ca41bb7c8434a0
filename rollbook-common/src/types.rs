//! Domain vocabulary: attendance statuses, year levels, sex
//!
//! All three enumerations serialize as the display strings the API and
//! database use (e.g. "Year 7", "Present"), so serde derives double as
//! the wire format and FromStr/Display as the storage format.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Persisted attendance status. "Unmarked" is deliberately not a member:
/// absence of a record represents an unmarked day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

impl AttendanceStatus {
    pub const ALL: [AttendanceStatus; 4] = [
        AttendanceStatus::Present,
        AttendanceStatus::Absent,
        AttendanceStatus::Late,
        AttendanceStatus::Excused,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
            AttendanceStatus::Late => "Late",
            AttendanceStatus::Excused => "Excused",
        }
    }
}

impl fmt::Display for AttendanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttendanceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Present" => Ok(AttendanceStatus::Present),
            "Absent" => Ok(AttendanceStatus::Absent),
            "Late" => Ok(AttendanceStatus::Late),
            "Excused" => Ok(AttendanceStatus::Excused),
            other => Err(Error::InvalidInput(format!(
                "Unknown attendance status: {}",
                other
            ))),
        }
    }
}

/// Student sex
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "Male",
            Sex::Female => "Female",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sex {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Male" => Ok(Sex::Male),
            "Female" => Ok(Sex::Female),
            other => Err(Error::InvalidInput(format!("Unknown sex: {}", other))),
        }
    }
}

/// Ordered year/grade levels, early years first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum YearLevel {
    #[serde(rename = "EY")]
    EarlyYears,
    Reception,
    #[serde(rename = "Year 1")]
    Year1,
    #[serde(rename = "Year 2")]
    Year2,
    #[serde(rename = "Year 3")]
    Year3,
    #[serde(rename = "Year 4")]
    Year4,
    #[serde(rename = "Year 5")]
    Year5,
    #[serde(rename = "Year 6")]
    Year6,
    #[serde(rename = "Year 7")]
    Year7,
    #[serde(rename = "Year 8")]
    Year8,
    #[serde(rename = "Year 9")]
    Year9,
    #[serde(rename = "Year 10")]
    Year10,
    #[serde(rename = "Year 11")]
    Year11,
    #[serde(rename = "Year 12")]
    Year12,
    #[serde(rename = "Year 13")]
    Year13,
}

impl YearLevel {
    pub const ALL: [YearLevel; 15] = [
        YearLevel::EarlyYears,
        YearLevel::Reception,
        YearLevel::Year1,
        YearLevel::Year2,
        YearLevel::Year3,
        YearLevel::Year4,
        YearLevel::Year5,
        YearLevel::Year6,
        YearLevel::Year7,
        YearLevel::Year8,
        YearLevel::Year9,
        YearLevel::Year10,
        YearLevel::Year11,
        YearLevel::Year12,
        YearLevel::Year13,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            YearLevel::EarlyYears => "EY",
            YearLevel::Reception => "Reception",
            YearLevel::Year1 => "Year 1",
            YearLevel::Year2 => "Year 2",
            YearLevel::Year3 => "Year 3",
            YearLevel::Year4 => "Year 4",
            YearLevel::Year5 => "Year 5",
            YearLevel::Year6 => "Year 6",
            YearLevel::Year7 => "Year 7",
            YearLevel::Year8 => "Year 8",
            YearLevel::Year9 => "Year 9",
            YearLevel::Year10 => "Year 10",
            YearLevel::Year11 => "Year 11",
            YearLevel::Year12 => "Year 12",
            YearLevel::Year13 => "Year 13",
        }
    }
}

impl fmt::Display for YearLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for YearLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        YearLevel::ALL
            .iter()
            .find(|y| y.as_str() == s)
            .copied()
            .ok_or_else(|| Error::InvalidInput(format!("Unknown year level: {}", s)))
    }
}
