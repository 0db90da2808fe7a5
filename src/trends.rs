//! Historical stress aggregation
//!
//! Turns a patient's scored reading history into the trend report shown to
//! patients, guardians and therapists: headline statistics, a daily series,
//! and breakdowns by location, time of day and trigger activity.
//!
//! Empty windows are not an error. They produce a report with zeroed
//! statistics, a `stable` direction and empty breakdowns.

use crate::models::{round1, ScoredReading};
use chrono::{DateTime, Days, NaiveDate, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, info};

/// Label used for readings without a location
pub const UNKNOWN_LOCATION: &str = "unknown";

/// Reporting period ending at a given date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimePeriod {
    Day,
    Week,
    Month,
}

impl TimePeriod {
    /// Number of calendar days covered, including the end date
    pub fn days(&self) -> u64 {
        match self {
            TimePeriod::Day => 1,
            TimePeriod::Week => 7,
            TimePeriod::Month => 30,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimePeriod::Day => "day",
            TimePeriod::Week => "week",
            TimePeriod::Month => "month",
        }
    }
}

impl std::str::FromStr for TimePeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "day" | "daily" => Ok(TimePeriod::Day),
            "week" | "weekly" => Ok(TimePeriod::Week),
            "month" | "monthly" => Ok(TimePeriod::Month),
            _ => Err(format!("Invalid time period: {}", s)),
        }
    }
}

/// Which readings a report covers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReportWindow {
    /// A fixed-length period ending on `as_of`
    Period { period: TimePeriod, as_of: NaiveDate },
    /// An explicit inclusive date range
    Range { start: NaiveDate, end: NaiveDate },
}

impl ReportWindow {
    /// Period label and inclusive date bounds
    pub fn bounds(&self) -> (String, NaiveDate, NaiveDate) {
        match self {
            ReportWindow::Period { period, as_of } => {
                let start = as_of
                    .checked_sub_days(Days::new(period.days() - 1))
                    .unwrap_or(*as_of);
                (period.as_str().to_string(), start, *as_of)
            }
            ReportWindow::Range { start, end } => {
                let (start, end) = if start <= end { (*start, *end) } else { (*end, *start) };
                ("custom".to_string(), start, end)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Improving,
    Worsening,
    Stable,
}

impl fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrendDirection::Improving => write!(f, "improving"),
            TrendDirection::Worsening => write!(f, "worsening"),
            TrendDirection::Stable => write!(f, "stable"),
        }
    }
}

/// Fixed time-of-day windows by local hour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimeOfDay {
    /// 06:00-11:59
    Morning,
    /// 12:00-16:59
    Afternoon,
    /// 17:00-20:59
    Evening,
    /// 21:00-05:59
    Night,
}

impl TimeOfDay {
    pub fn from_hour(hour: u32) -> Self {
        match hour {
            6..=11 => TimeOfDay::Morning,
            12..=16 => TimeOfDay::Afternoon,
            17..=20 => TimeOfDay::Evening,
            _ => TimeOfDay::Night,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimeOfDay::Morning => "Morning",
            TimeOfDay::Afternoon => "Afternoon",
            TimeOfDay::Evening => "Evening",
            TimeOfDay::Night => "Night",
        }
    }
}

/// Headline statistics of a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendSummary {
    #[serde(rename = "time_period")]
    pub period: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(rename = "total_data_points")]
    pub total_points: usize,
    #[serde(rename = "average_stress")]
    pub average: f64,
    #[serde(rename = "peak_stress")]
    pub peak: f64,
    #[serde(rename = "min_stress")]
    pub min: f64,
    pub trend_direction: TrendDirection,
    pub trend_percentage_change: f64,
}

/// One bucket of a location, time-of-day or trigger breakdown
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressBreakdown {
    pub key: String,
    pub average_stress: f64,
    pub peak_stress: f64,
    pub frequency: usize,
    pub percentage_of_total: f64,
}

/// Daily point of the stress time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyStress {
    pub date: NaiveDate,
    pub average_stress: f64,
    pub peak_stress: f64,
    pub data_points: usize,
}

/// Full trend report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    #[serde(flatten)]
    pub summary: TrendSummary,
    pub stress_trend: Vec<DailyStress>,
    pub stress_by_location: Vec<StressBreakdown>,
    pub hardest_times: Vec<StressBreakdown>,
    pub trigger_frequencies: Vec<StressBreakdown>,
}

impl TrendReport {
    /// Report for a window with no readings
    pub fn empty(period: String, start_date: NaiveDate, end_date: NaiveDate) -> Self {
        TrendReport {
            summary: TrendSummary {
                period,
                start_date,
                end_date,
                total_points: 0,
                average: 0.0,
                peak: 0.0,
                min: 0.0,
                trend_direction: TrendDirection::Stable,
                trend_percentage_change: 0.0,
            },
            stress_trend: Vec::new(),
            stress_by_location: Vec::new(),
            hardest_times: Vec::new(),
            trigger_frequencies: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.summary.total_points == 0
    }
}

/// Aggregation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendConfig {
    /// Percentage change beyond which a trend is improving or worsening
    pub trend_threshold_pct: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        TrendConfig {
            trend_threshold_pct: 5.0,
        }
    }
}

#[derive(Default)]
struct Bucket {
    sum: f64,
    peak: f64,
    count: usize,
}

impl Bucket {
    fn add(&mut self, score: f64) {
        if self.count == 0 || score > self.peak {
            self.peak = score;
        }
        self.sum += score;
        self.count += 1;
    }

    fn average(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

pub struct HistoricalAggregator {
    config: TrendConfig,
    time_zone: Tz,
}

impl HistoricalAggregator {
    pub fn new() -> Self {
        HistoricalAggregator {
            config: TrendConfig::default(),
            time_zone: Tz::UTC,
        }
    }

    pub fn with_config(config: TrendConfig, time_zone: Tz) -> Self {
        HistoricalAggregator { config, time_zone }
    }

    fn local_date(&self, timestamp: DateTime<Utc>) -> NaiveDate {
        timestamp.with_timezone(&self.time_zone).date_naive()
    }

    fn local_hour(&self, timestamp: DateTime<Utc>) -> u32 {
        timestamp.with_timezone(&self.time_zone).hour()
    }

    /// Build the trend report for `window`
    pub fn aggregate(&self, readings: &[ScoredReading], window: &ReportWindow) -> TrendReport {
        let (period, start, end) = window.bounds();

        let mut filtered: Vec<&ScoredReading> = readings
            .iter()
            .filter(|r| r.stress_score.is_finite())
            .filter(|r| {
                let date = self.local_date(r.timestamp());
                date >= start && date <= end
            })
            .collect();

        if filtered.is_empty() {
            debug!(%start, %end, "No readings in report window");
            return TrendReport::empty(period, start, end);
        }

        filtered.sort_by_key(|r| r.timestamp());
        let scores: Vec<f64> = filtered.iter().map(|r| r.stress_score).collect();

        let average = scores.iter().mean();
        let peak = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let (trend_direction, change) = trend_direction(&scores, self.config.trend_threshold_pct);

        let report = TrendReport {
            summary: TrendSummary {
                period,
                start_date: start,
                end_date: end,
                total_points: scores.len(),
                average: round1(average),
                peak: round1(peak),
                min: round1(min),
                trend_direction,
                trend_percentage_change: round1(change),
            },
            stress_trend: self.daily_series(&filtered),
            stress_by_location: self.by_location(&filtered),
            hardest_times: self.by_time_of_day(&filtered),
            trigger_frequencies: self.by_trigger(&filtered),
        };

        info!(
            period = %report.summary.period,
            points = report.summary.total_points,
            average = report.summary.average,
            direction = %report.summary.trend_direction,
            "Trend report aggregated"
        );

        report
    }

    /// Average and peak stress per local calendar date, ascending
    pub fn daily_series(&self, readings: &[&ScoredReading]) -> Vec<DailyStress> {
        let mut days: BTreeMap<NaiveDate, Bucket> = BTreeMap::new();
        for r in readings {
            days.entry(self.local_date(r.timestamp()))
                .or_default()
                .add(r.stress_score);
        }

        days.into_iter()
            .map(|(date, bucket)| DailyStress {
                date,
                average_stress: round1(bucket.average()),
                peak_stress: round1(bucket.peak),
                data_points: bucket.count,
            })
            .collect()
    }

    pub fn by_location(&self, readings: &[&ScoredReading]) -> Vec<StressBreakdown> {
        let mut entries = breakdown(readings.iter().map(|r| {
            let key = r
                .reading
                .location
                .as_deref()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .unwrap_or(UNKNOWN_LOCATION)
                .to_string();
            (key, r.stress_score)
        }));
        sort_by_frequency(&mut entries);
        entries
    }

    /// Time-of-day windows, hardest (highest average) first
    pub fn by_time_of_day(&self, readings: &[&ScoredReading]) -> Vec<StressBreakdown> {
        let mut buckets: BTreeMap<TimeOfDay, Bucket> = BTreeMap::new();
        for r in readings {
            buckets
                .entry(TimeOfDay::from_hour(self.local_hour(r.timestamp())))
                .or_default()
                .add(r.stress_score);
        }

        let total: usize = buckets.values().map(|b| b.count).sum();
        let mut entries: Vec<StressBreakdown> = buckets
            .into_iter()
            .map(|(slot, bucket)| to_breakdown(slot.label().to_string(), &bucket, total))
            .collect();

        entries.sort_by(|a, b| {
            b.average_stress
                .partial_cmp(&a.average_stress)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        entries
    }

    /// Activities present on readings; readings without one are not triggers
    pub fn by_trigger(&self, readings: &[&ScoredReading]) -> Vec<StressBreakdown> {
        let mut entries = breakdown(readings.iter().filter_map(|r| {
            r.reading
                .activity
                .as_deref()
                .map(str::trim)
                .filter(|a| !a.is_empty())
                .map(|a| (a.to_string(), r.stress_score))
        }));
        sort_by_frequency(&mut entries);
        entries
    }
}

impl Default for HistoricalAggregator {
    fn default() -> Self {
        Self::new()
    }
}

fn breakdown<I>(entries: I) -> Vec<StressBreakdown>
where
    I: Iterator<Item = (String, f64)>,
{
    let mut buckets: HashMap<String, Bucket> = HashMap::new();
    for (key, score) in entries {
        buckets.entry(key).or_default().add(score);
    }

    let total: usize = buckets.values().map(|b| b.count).sum();
    buckets
        .into_iter()
        .map(|(key, bucket)| to_breakdown(key, &bucket, total))
        .collect()
}

fn to_breakdown(key: String, bucket: &Bucket, total: usize) -> StressBreakdown {
    let percentage = if total == 0 {
        0.0
    } else {
        bucket.count as f64 / total as f64 * 100.0
    };
    StressBreakdown {
        key,
        average_stress: round1(bucket.average()),
        peak_stress: round1(bucket.peak),
        frequency: bucket.count,
        percentage_of_total: round1(percentage),
    }
}

fn sort_by_frequency(entries: &mut [StressBreakdown]) {
    entries.sort_by(|a, b| b.frequency.cmp(&a.frequency).then_with(|| a.key.cmp(&b.key)));
}

/// Compare the later half of a time-ordered series against the earlier half.
///
/// Returns the direction and the unrounded percentage change. Fewer than two
/// points, or an earlier average of zero, count as no change.
pub fn trend_direction(scores: &[f64], threshold_pct: f64) -> (TrendDirection, f64) {
    if scores.len() < 2 {
        return (TrendDirection::Stable, 0.0);
    }

    let mid = scores.len() / 2;
    let earlier = scores[..mid].iter().mean();
    let later = scores[mid..].iter().mean();

    if earlier == 0.0 || !earlier.is_finite() || !later.is_finite() {
        return (TrendDirection::Stable, 0.0);
    }

    let change = (later - earlier) / earlier * 100.0;
    let direction = if change > threshold_pct {
        TrendDirection::Worsening
    } else if change < -threshold_pct {
        TrendDirection::Improving
    } else {
        TrendDirection::Stable
    };

    (direction, change)
}
