//! Dated price and volume series.
//!
//! Both series are strictly chronological with no duplicate dates, and hold
//! only finite, non-negative values. The checks run once at construction;
//! after that a series is immutable.

use crate::domain::error::PulseError;
use chrono::{Duration, NaiveDate};

fn check_points(label: &str, points: &[(NaiveDate, f64)]) -> Result<(), PulseError> {
    for (i, (date, value)) in points.iter().enumerate() {
        if !value.is_finite() || *value < 0.0 {
            return Err(PulseError::malformed(format!(
                "{label} value on {date} must be finite and non-negative, got {value}"
            )));
        }
        if i > 0 {
            let prev = points[i - 1].0;
            if *date == prev {
                return Err(PulseError::malformed(format!(
                    "{label} has duplicate date {date}"
                )));
            }
            if *date < prev {
                return Err(PulseError::malformed(format!(
                    "{label} is not chronological: {date} follows {prev}"
                )));
            }
        }
    }
    Ok(())
}

fn consecutive_days(start: NaiveDate, values: &[f64]) -> Vec<(NaiveDate, f64)> {
    values
        .iter()
        .enumerate()
        .map(|(i, &v)| (start + Duration::days(i as i64), v))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PriceSeries {
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl PriceSeries {
    pub fn new(points: Vec<(NaiveDate, f64)>) -> Result<Self, PulseError> {
        check_points("price series", &points)?;
        let (dates, values) = points.into_iter().unzip();
        Ok(Self { dates, values })
    }

    /// One price per calendar day starting at `start`.
    pub fn from_values(start: NaiveDate, values: &[f64]) -> Result<Self, PulseError> {
        Self::new(consecutive_days(start, values))
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn latest(&self) -> Option<(NaiveDate, f64)> {
        Some((*self.dates.last()?, *self.values.last()?))
    }

    /// Percentage change from the first to the last price.
    pub fn period_return(&self) -> Option<f64> {
        let first = *self.values.first()?;
        let last = *self.values.last()?;
        if self.values.len() < 2 || first == 0.0 {
            return None;
        }
        Some((last / first - 1.0) * 100.0)
    }

    /// Values of both series restricted to the dates they share.
    pub fn align(&self, other: &PriceSeries) -> (Vec<f64>, Vec<f64>) {
        let mut left = Vec::new();
        let mut right = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.dates.len() && j < other.dates.len() {
            match self.dates[i].cmp(&other.dates[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    left.push(self.values[i]);
                    right.push(other.values[j]);
                    i += 1;
                    j += 1;
                }
            }
        }
        (left, right)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VolumeSeries {
    dates: Vec<NaiveDate>,
    values: Vec<f64>,
}

impl VolumeSeries {
    pub fn new(points: Vec<(NaiveDate, f64)>) -> Result<Self, PulseError> {
        check_points("volume series", &points)?;
        let (dates, values) = points.into_iter().unzip();
        Ok(Self { dates, values })
    }

    pub fn from_values(start: NaiveDate, values: &[f64]) -> Result<Self, PulseError> {
        Self::new(consecutive_days(start, values))
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
