//! Typed boundary to the services this engine consumes but does not own: the activity
//! catalogue, the user directory, the monitoring service that stores report schedules, and
//! the file store holding uploaded documents.
//!
//! Upstream payloads arrive with every field optional. They are validated here into domain
//! values, and a missing or malformed field is reported as [`UpstreamDataError`], never
//! replaced by a default.

use chrono::{DateTime, FixedOffset, Months};
use serde::{Deserialize, Serialize};

use super::domain::{ActivityId, DocumentUpload};
use super::identity::AccessToken;
use super::schedule::ReportSchedule;

/// Approval state an activity must carry before students may register for it.
pub const ACTIVITY_OPEN_STATUS: &str = "APPROVED";

/// Activity as returned by the activity service's filter endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub approval_status: Option<String>,
    #[serde(default)]
    pub start_period: Option<String>,
    #[serde(default)]
    pub months_duration: Option<i64>,
}

/// Validated time window of an activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivityWindow {
    pub start: DateTime<FixedOffset>,
    pub months: u32,
}

impl ActivityWindow {
    /// `start + months` calendar months; day-of-month is clamped to the target month's length.
    pub fn end(&self) -> Result<DateTime<FixedOffset>, UpstreamDataError> {
        self.start
            .checked_add_months(Months::new(self.months))
            .ok_or_else(|| {
                UpstreamDataError::malformed("activity", "months_duration", "out of range")
            })
    }
}

impl ActivityRecord {
    pub fn is_open(&self) -> bool {
        self.approval_status.as_deref() == Some(ACTIVITY_OPEN_STATUS)
    }

    pub fn name(&self) -> Result<&str, UpstreamDataError> {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| UpstreamDataError::missing("activity", "name"))
    }

    pub fn start(&self) -> Result<DateTime<FixedOffset>, UpstreamDataError> {
        let raw = self
            .start_period
            .as_deref()
            .ok_or_else(|| UpstreamDataError::missing("activity", "start_period"))?;
        DateTime::parse_from_rfc3339(raw.trim()).map_err(|err| {
            UpstreamDataError::malformed("activity", "start_period", err.to_string())
        })
    }

    pub fn months(&self) -> Result<u32, UpstreamDataError> {
        let months = self
            .months_duration
            .ok_or_else(|| UpstreamDataError::missing("activity", "months_duration"))?;
        u32::try_from(months).map_err(|_| {
            UpstreamDataError::malformed(
                "activity",
                "months_duration",
                format!("{months} is not a non-negative month count"),
            )
        })
    }

    pub fn window(&self) -> Result<ActivityWindow, UpstreamDataError> {
        Ok(ActivityWindow {
            start: self.start()?,
            months: self.months()?,
        })
    }
}

/// User as returned by the user service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub nrp: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityFilter {
    #[serde(default)]
    pub activity_id: Option<ActivityId>,
    #[serde(default)]
    pub name: Option<String>,
}

impl ActivityFilter {
    pub fn by_id(id: &ActivityId) -> Self {
        Self {
            activity_id: Some(id.clone()),
            name: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFilter {
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Activity catalogue lookups.
pub trait ActivityLookup: Send + Sync {
    fn activities(
        &self,
        filter: &ActivityFilter,
        token: &AccessToken,
    ) -> Result<Vec<ActivityRecord>, UpstreamError>;

    /// First activity carrying `id`, if the catalogue knows it.
    fn activity(
        &self,
        id: &ActivityId,
        token: &AccessToken,
    ) -> Result<Option<ActivityRecord>, UpstreamError> {
        Ok(self
            .activities(&ActivityFilter::by_id(id), token)?
            .into_iter()
            .next())
    }
}

/// User directory lookups.
pub trait UserLookup: Send + Sync {
    /// The user the token belongs to; `None` when the token is not recognised.
    fn current_user(&self, token: &AccessToken) -> Result<Option<UserRecord>, UpstreamError>;

    fn users(
        &self,
        filter: &UserFilter,
        token: &AccessToken,
    ) -> Result<Vec<UserRecord>, UpstreamError>;
}

/// Report-schedule persistence owned by the monitoring service.
///
/// Implementations should upsert on [`ReportSchedule::key`] so a regenerated schedule does not
/// duplicate entries emitted by an earlier, partially failed run.
pub trait MonitoringGateway: Send + Sync {
    fn create_report_schedule(
        &self,
        schedule: &ReportSchedule,
        token: &AccessToken,
    ) -> Result<(), UpstreamError>;
}

/// Object storage for registration documents.
pub trait DocumentStorage: Send + Sync {
    /// Stores the upload and returns the storage identifier.
    fn upload(&self, upload: &DocumentUpload) -> Result<String, UpstreamError>;
    fn delete(&self, file_storage_id: &str) -> Result<(), UpstreamError>;
}

/// A field in an upstream payload was absent or could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{entity} field `{field}` {problem}")]
pub struct UpstreamDataError {
    pub entity: &'static str,
    pub field: &'static str,
    pub problem: String,
}

impl UpstreamDataError {
    pub fn missing(entity: &'static str, field: &'static str) -> Self {
        Self {
            entity,
            field,
            problem: "is missing".to_string(),
        }
    }

    pub fn malformed(entity: &'static str, field: &'static str, detail: impl Into<String>) -> Self {
        Self {
            entity,
            field,
            problem: format!("is malformed: {}", detail.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    #[error("{service} unavailable: {reason}")]
    Unavailable {
        service: &'static str,
        reason: String,
    },
    #[error("invalid {0}")]
    Data(#[from] UpstreamDataError),
}

impl UpstreamError {
    pub fn unavailable(service: &'static str, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            service,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone};

    fn record(start: Option<&str>, months: Option<i64>) -> ActivityRecord {
        ActivityRecord {
            id: Some("act-1".to_string()),
            name: Some("Kampus Mengajar".to_string()),
            approval_status: Some("APPROVED".to_string()),
            start_period: start.map(str::to_string),
            months_duration: months,
        }
    }

    #[test]
    fn window_end_adds_calendar_months() {
        let window = record(Some("2024-01-01T00:00:00Z"), Some(3))
            .window()
            .expect("valid window");
        let end = window.end().expect("end in range");
        let expected = FixedOffset::east_opt(0)
            .expect("utc offset")
            .with_ymd_and_hms(2024, 4, 1, 0, 0, 0)
            .single()
            .expect("valid date");
        assert_eq!(end, expected);
    }

    #[test]
    fn window_end_clamps_to_month_length() {
        let window = record(Some("2024-01-31T08:00:00+07:00"), Some(1))
            .window()
            .expect("valid window");
        let end = window.end().expect("end in range");
        assert_eq!((end.month(), end.day()), (2, 29));
    }

    #[test]
    fn missing_and_malformed_timing_fields_are_reported() {
        let missing = record(None, Some(2)).window().expect_err("missing start");
        assert_eq!(missing.field, "start_period");

        let malformed = record(Some("01/01/2024"), Some(2))
            .window()
            .expect_err("malformed start");
        assert!(malformed.problem.contains("malformed"));

        let negative = record(Some("2024-01-01T00:00:00Z"), Some(-1))
            .window()
            .expect_err("negative months");
        assert_eq!(negative.field, "months_duration");

        let absent = record(Some("2024-01-01T00:00:00Z"), None)
            .window()
            .expect_err("missing months");
        assert_eq!(absent.field, "months_duration");
    }

    #[test]
    fn only_approved_activities_are_open() {
        let mut activity = record(Some("2024-01-01T00:00:00Z"), Some(2));
        assert!(activity.is_open());
        activity.approval_status = Some("PENDING".to_string());
        assert!(!activity.is_open());
        activity.approval_status = None;
        assert!(!activity.is_open());
    }
}
