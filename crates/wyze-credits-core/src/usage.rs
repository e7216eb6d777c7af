//! Usage tracking types for wyze-credits.
//!
//! Every successful debit writes an immutable [`UsageRecord`] and bumps the
//! [`UsageSummary`] of the calendar month it happened in.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{UnknownVariant, UsageId, UserId};

/// A metered product feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    /// Taking a skills assessment.
    Assessment,

    /// An AI chat interaction.
    AiChat,

    /// Generating a report.
    Report,

    /// A programmatic API call.
    ApiCall,
}

impl Feature {
    /// All features, in display order.
    pub const ALL: [Self; 4] = [Self::Assessment, Self::AiChat, Self::Report, Self::ApiCall];

    /// Wire and column name of the feature.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Assessment => "assessment",
            Self::AiChat => "ai_chat",
            Self::Report => "report",
            Self::ApiCall => "api_call",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|feature| feature.as_str() == s)
            .ok_or_else(|| UnknownVariant(s.to_string()))
    }
}

/// An immutable metered event (`ba_usage_tracking`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageRecord {
    /// Unique record ID.
    pub id: UsageId,

    /// The user who consumed credits.
    pub user_id: UserId,

    /// What was used.
    pub feature: Feature,

    /// Credits debited, at least 1.
    pub credits: i64,

    /// Opaque key-value context supplied by the caller.
    pub metadata: serde_json::Value,

    /// When the usage was recorded.
    pub created_at: DateTime<Utc>,
}

impl UsageRecord {
    /// Create a new usage record.
    #[must_use]
    pub fn new(
        user_id: UserId,
        feature: Feature,
        credits: i64,
        metadata: serde_json::Value,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: UsageId::generate(),
            user_id,
            feature,
            credits,
            metadata,
            created_at: at,
        }
    }
}

/// A calendar month key, rendered as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UsageMonth {
    year: i32,
    month: u32,
}

impl UsageMonth {
    /// The month containing `at`.
    #[must_use]
    pub fn of(at: DateTime<Utc>) -> Self {
        Self {
            year: at.year(),
            month: at.month(),
        }
    }

    /// The current UTC month.
    #[must_use]
    pub fn current() -> Self {
        Self::of(Utc::now())
    }

    /// First instant of the month.
    ///
    /// Returns `None` only for years chrono cannot represent.
    #[must_use]
    pub fn start(&self) -> Option<DateTime<Utc>> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }
}

impl fmt::Display for UsageMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for UsageMonth {
    type Err = InvalidMonth;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidMonth(s.to_string());
        let (year, month) = s.split_once('-').ok_or_else(invalid)?;
        if year.len() != 4 || month.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = year.parse().map_err(|_| invalid())?;
        let month: u32 = month.parse().map_err(|_| invalid())?;
        if !(1..=12).contains(&month) {
            return Err(invalid());
        }
        Ok(Self { year, month })
    }
}

impl Serialize for UsageMonth {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for UsageMonth {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// A month key that is not `YYYY-MM`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid month key: {0}")]
pub struct InvalidMonth(pub String);

/// Per-feature counters of one month.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyUsage {
    /// Credits consumed in the month.
    pub total_credits: i64,
    /// Assessment events.
    pub assessments_taken: i64,
    /// Report events.
    pub reports_generated: i64,
    /// AI chat events.
    pub ai_interactions: i64,
    /// API call events.
    pub api_calls: i64,
}

impl MonthlyUsage {
    /// Fold one usage event into the counters.
    pub fn record(&mut self, feature: Feature, credits: i64) {
        self.total_credits += credits;
        match feature {
            Feature::Assessment => self.assessments_taken += 1,
            Feature::Report => self.reports_generated += 1,
            Feature::AiChat => self.ai_interactions += 1,
            Feature::ApiCall => self.api_calls += 1,
        }
    }

    /// Counters rebuilt from raw usage records.
    #[must_use]
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a UsageRecord>) -> Self {
        let mut usage = Self::default();
        for record in records {
            usage.record(record.feature, record.credits);
        }
        usage
    }
}

/// The monthly rollup row (`ba_usage_summary`), keyed by user and month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSummary {
    /// The user the counters belong to.
    pub user_id: UserId,

    /// The month the counters cover.
    pub month: UsageMonth,

    /// The running totals.
    #[serde(flatten)]
    pub usage: MonthlyUsage,

    /// When the row was last updated.
    pub updated_at: DateTime<Utc>,
}

impl UsageSummary {
    /// Create an empty summary row.
    #[must_use]
    pub fn new(user_id: UserId, month: UsageMonth, at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            month,
            usage: MonthlyUsage::default(),
            updated_at: at,
        }
    }

    /// Fold one usage event into the row.
    pub fn record(&mut self, feature: Feature, credits: i64, at: DateTime<Utc>) {
        self.usage.record(feature, credits);
        self.updated_at = at;
    }
}
