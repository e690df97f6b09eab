//! Core data types for chart calculations.
//!
//! This module defines the fundamental data structures:
//!
//! - [`SubjectId`] - Identity of a subject (the person a chart is cast for)
//! - [`ChartId`] - Caller-constructed identity of one interpretation
//! - [`YearMonth`] - Calendar month used to partition transit computations
//! - [`EphemerisDay`] - Daily planetary positions
//! - [`TransitDay`] - Daily transit aspects against a natal chart
//! - [`InterpretationEntry`] - Progressively accumulated interpretation text

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CacheError;

/// Identity of a subject record.
///
/// Used verbatim in transit cache keys, so it is never normalized.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubjectId(String);

impl SubjectId {
    /// Creates a new subject id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SubjectId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for SubjectId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Identity of an interpretation.
///
/// Built outside the cache from the chart type, subject name(s) and birth
/// date(s). The cache stores it as an opaque key.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChartId(String);

impl ChartId {
    /// Wraps an externally constructed chart identity.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChartId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ChartId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A calendar month, formatted as `YYYY-MM`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth {
    year: i32,
    month: u32,
}

impl YearMonth {
    /// Creates a month, validating that `month` is in `1..=12`.
    ///
    /// # Errors
    /// Returns [`CacheError::InvalidParameter`] for an out-of-range month or a
    /// year chrono cannot represent.
    pub fn new(year: i32, month: u32) -> Result<Self, CacheError> {
        if NaiveDate::from_ymd_opt(year, month, 1).is_none() {
            return Err(CacheError::InvalidParameter(format!(
                "Invalid month: {year}-{month}"
            )));
        }
        Ok(Self { year, month })
    }

    /// Returns the month containing `date`.
    #[must_use]
    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    /// Returns the year.
    #[must_use]
    pub const fn year(&self) -> i32 {
        self.year
    }

    /// Returns the month number (1-12).
    #[must_use]
    pub const fn month(&self) -> u32 {
        self.month
    }

    /// Returns the first day of the month.
    #[must_use]
    pub fn first_day(&self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// Returns the number of calendar days in the month, leap years included.
    #[must_use]
    pub const fn days_in_month(&self) -> u32 {
        match self.month {
            1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
            4 | 6 | 9 | 11 => 30,
            _ => {
                let leap = (self.year % 4 == 0 && self.year % 100 != 0) || self.year % 400 == 0;
                if leap { 29 } else { 28 }
            }
        }
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CacheError::InvalidParameter(format!("Invalid month: {s}"));
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let month = month.parse::<u32>().map_err(|_| invalid())?;
        Self::new(year, month)
    }
}

impl TryFrom<String> for YearMonth {
    type Error = CacheError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<YearMonth> for String {
    fn from(month: YearMonth) -> Self {
        month.to_string()
    }
}

/// Celestial bodies tracked by the ephemeris.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Planet {
    /// The Sun.
    Sun,
    /// The Moon.
    Moon,
    /// Mercury.
    Mercury,
    /// Venus.
    Venus,
    /// Mars.
    Mars,
    /// Jupiter.
    Jupiter,
    /// Saturn.
    Saturn,
    /// Uranus.
    Uranus,
    /// Neptune.
    Neptune,
    /// Pluto.
    Pluto,
    /// Mean lunar north node.
    NorthNode,
    /// Chiron.
    Chiron,
}

/// Major aspects between a transiting and a natal body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AspectKind {
    /// 0 degrees.
    Conjunction,
    /// 60 degrees.
    Sextile,
    /// 90 degrees.
    Square,
    /// 120 degrees.
    Trine,
    /// 180 degrees.
    Opposition,
}

impl AspectKind {
    /// Returns the exact angle of the aspect in degrees.
    #[must_use]
    pub const fn angle(&self) -> f64 {
        match self {
            Self::Conjunction => 0.0,
            Self::Sextile => 60.0,
            Self::Square => 90.0,
            Self::Trine => 120.0,
            Self::Opposition => 180.0,
        }
    }
}

/// Position of one body on one day.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanetPosition {
    /// The body.
    pub planet: Planet,
    /// Ecliptic longitude in degrees (0-360).
    pub longitude: f64,
    /// Ecliptic latitude in degrees.
    pub latitude: f64,
    /// Daily motion in degrees; negative while retrograde.
    pub speed: f64,
    /// Whether the body is retrograde.
    pub retrograde: bool,
}

impl PlanetPosition {
    /// Creates a position, deriving the retrograde flag from the speed.
    #[must_use]
    pub fn new(planet: Planet, longitude: f64, latitude: f64, speed: f64) -> Self {
        Self {
            planet,
            longitude,
            latitude,
            speed,
            retrograde: speed < 0.0,
        }
    }
}

/// All planetary positions for one day.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EphemerisDay {
    /// The day.
    pub date: NaiveDate,
    /// Positions of every tracked body.
    pub positions: Vec<PlanetPosition>,
}

impl EphemerisDay {
    /// Creates a day with no positions.
    #[must_use]
    pub const fn new(date: NaiveDate) -> Self {
        Self {
            date,
            positions: Vec::new(),
        }
    }

    /// Adds a position.
    #[must_use]
    pub fn with_position(mut self, position: PlanetPosition) -> Self {
        self.positions.push(position);
        self
    }

    /// Returns the position of `planet`, if present.
    #[must_use]
    pub fn position(&self, planet: Planet) -> Option<&PlanetPosition> {
        self.positions.iter().find(|p| p.planet == planet)
    }
}

/// One transit aspect active on a day.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitAspect {
    /// The moving body.
    pub transiting: Planet,
    /// The natal body being aspected.
    pub natal: Planet,
    /// The aspect formed.
    pub aspect: AspectKind,
    /// Distance from exact, in degrees.
    pub orb: f64,
    /// Whether the aspect is still tightening.
    pub applying: bool,
}

/// Transit aspects for one day of a subject's month.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransitDay {
    /// The day.
    pub date: NaiveDate,
    /// Aspects in orb on that day.
    pub aspects: Vec<TransitAspect>,
}

impl TransitDay {
    /// Creates a day with no aspects.
    #[must_use]
    pub const fn new(date: NaiveDate) -> Self {
        Self {
            date,
            aspects: Vec::new(),
        }
    }

    /// Adds an aspect.
    #[must_use]
    pub fn with_aspect(mut self, aspect: TransitAspect) -> Self {
        self.aspects.push(aspect);
        self
    }
}

/// A cached interpretation, possibly still being generated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterpretationEntry {
    /// The chart this text belongs to.
    pub chart_id: ChartId,
    /// Full accumulated text so far.
    pub content: String,
    /// True once generation finished.
    pub is_complete: bool,
    /// Write time in epoch milliseconds.
    pub timestamp: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_year_month_round_trip_format() {
        let month: YearMonth = "2025-02".parse().unwrap();
        assert_eq!(month.year(), 2025);
        assert_eq!(month.month(), 2);
        assert_eq!(month.to_string(), "2025-02");
        assert_eq!(YearMonth::new(987, 3).unwrap().to_string(), "0987-03");
    }

    #[test]
    fn test_year_month_rejects_garbage() {
        assert!("2025-13".parse::<YearMonth>().is_err());
        assert!("2025-00".parse::<YearMonth>().is_err());
        assert!("2025-2".parse::<YearMonth>().is_err());
        assert!("202502".parse::<YearMonth>().is_err());
        assert!("abcd-ef".parse::<YearMonth>().is_err());
    }

    #[test]
    fn test_days_in_month_leap_aware() {
        let days = |s: &str| s.parse::<YearMonth>().unwrap().days_in_month();
        assert_eq!(days("2024-02"), 29);
        assert_eq!(days("2025-02"), 28);
        assert_eq!(days("2000-02"), 29);
        assert_eq!(days("1900-02"), 28);
        assert_eq!(days("2025-01"), 31);
        assert_eq!(days("2025-04"), 30);
        assert_eq!(days("2025-12"), 31);
    }

    #[test]
    fn test_days_in_month_matches_calendar() {
        for year in [1999, 2000, 2023, 2024, 2100] {
            for month in 1..=12 {
                let ym = YearMonth::new(year, month).unwrap();
                let next = if month == 12 {
                    NaiveDate::from_ymd_opt(year + 1, 1, 1).unwrap()
                } else {
                    NaiveDate::from_ymd_opt(year, month + 1, 1).unwrap()
                };
                let expected = (next - ym.first_day()).num_days();
                assert_eq!(i64::from(ym.days_in_month()), expected, "{ym}");
            }
        }
    }

    #[test]
    fn test_year_month_serde_as_string() {
        let month = YearMonth::new(2024, 2).unwrap();
        let json = serde_json::to_string(&month).unwrap();
        assert_eq!(json, "\"2024-02\"");
        let back: YearMonth = serde_json::from_str(&json).unwrap();
        assert_eq!(back, month);
    }

    #[test]
    fn test_planet_position_retrograde_from_speed() {
        let direct = PlanetPosition::new(Planet::Mercury, 12.5, 1.2, 1.4);
        let retro = PlanetPosition::new(Planet::Mercury, 12.5, 1.2, -0.3);
        assert!(!direct.retrograde);
        assert!(retro.retrograde);
    }

    #[test]
    fn test_ephemeris_day_lookup() {
        let day = EphemerisDay::new(NaiveDate::from_ymd_opt(2024, 3, 20).unwrap())
            .with_position(PlanetPosition::new(Planet::Sun, 0.1, 0.0, 0.98));
        assert!(day.position(Planet::Sun).is_some());
        assert!(day.position(Planet::Moon).is_none());
    }
}
