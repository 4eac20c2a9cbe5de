use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::directory::{
    ActivityLookup, ActivityWindow, MonitoringGateway, UpstreamDataError, UpstreamError,
};
use super::domain::{ActivityId, Registration, RegistrationId};
use super::identity::AccessToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportType {
    WeeklyReport,
    FinalReport,
}

impl fmt::Display for ReportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportType::WeeklyReport => f.write_str("WEEKLY_REPORT"),
            ReportType::FinalReport => f.write_str("FINAL_REPORT"),
        }
    }
}

/// One reporting checkpoint sent to the monitoring service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSchedule {
    pub registration_id: RegistrationId,
    pub user_id: String,
    pub user_nrp: String,
    pub academic_advisor_id: String,
    pub academic_advisor_email: String,
    pub report_type: ReportType,
    pub week: u32,
    pub start_date: DateTime<FixedOffset>,
    pub end_date: DateTime<FixedOffset>,
}

/// Natural key of a schedule entry; stable across regenerations.
pub type ScheduleKey = (RegistrationId, u32, ReportType);

impl ReportSchedule {
    pub fn key(&self) -> ScheduleKey {
        (self.registration_id, self.week, self.report_type)
    }
}

/// Longest activity a schedule is planned for; longer durations are treated as malformed.
pub const MAX_ACTIVITY_MONTHS: u32 = 120;

/// Builds the full schedule for `registration`: `months * weeks_per_month` weekly entries
/// followed by one final entry spanning the whole activity.
pub fn plan(
    registration: &Registration,
    window: &ActivityWindow,
    weeks_per_month: u32,
) -> Result<Vec<ReportSchedule>, UpstreamDataError> {
    if window.months > MAX_ACTIVITY_MONTHS {
        return Err(UpstreamDataError::malformed(
            "activity",
            "months_duration",
            format!("{} exceeds {MAX_ACTIVITY_MONTHS} months", window.months),
        ));
    }
    let end = window.end()?;
    let total_weeks = window.months.checked_mul(weeks_per_month).ok_or_else(|| {
        UpstreamDataError::malformed("activity", "months_duration", "too many weeks")
    })?;
    let out_of_range =
        || UpstreamDataError::malformed("activity", "start_period", "weekly dates out of range");
    let entry = |report_type, week, start_date, end_date| ReportSchedule {
        registration_id: registration.id,
        user_id: registration.user_id.clone(),
        user_nrp: registration.user_nrp.clone(),
        academic_advisor_id: registration.academic_advisor_id.clone(),
        academic_advisor_email: registration.academic_advisor_email.clone(),
        report_type,
        week,
        start_date,
        end_date,
    };

    let mut schedules = Vec::with_capacity(total_weeks as usize + 1);
    for week in 1..=total_weeks {
        let start_date = window
            .start
            .checked_add_signed(Duration::days(i64::from(week - 1) * 7))
            .ok_or_else(out_of_range)?;
        let end_date = start_date
            .checked_add_signed(Duration::days(6))
            .ok_or_else(out_of_range)?;
        schedules.push(entry(ReportType::WeeklyReport, week, start_date, end_date));
    }
    schedules.push(entry(ReportType::FinalReport, total_weeks, window.start, end));

    Ok(schedules)
}

#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("activity {0} not found")]
    ActivityNotFound(ActivityId),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("failed to create {report_type} schedule for week {week}: {source}")]
    Emission {
        report_type: ReportType,
        week: u32,
        emitted: usize,
        #[source]
        source: UpstreamError,
    },
}

impl From<UpstreamDataError> for ScheduleError {
    fn from(value: UpstreamDataError) -> Self {
        Self::Upstream(UpstreamError::Data(value))
    }
}

/// Emits the report schedule of a fully approved registration.
pub struct ReportScheduleGenerator {
    activities: Arc<dyn ActivityLookup>,
    monitoring: Arc<dyn MonitoringGateway>,
    weeks_per_month: u32,
}

impl ReportScheduleGenerator {
    pub fn new(
        activities: Arc<dyn ActivityLookup>,
        monitoring: Arc<dyn MonitoringGateway>,
        weeks_per_month: u32,
    ) -> Self {
        Self {
            activities,
            monitoring,
            weeks_per_month,
        }
    }

    /// Sends every entry in order and stops at the first failure. Entries sent before the
    /// failure stay with the monitoring service.
    pub fn generate(
        &self,
        registration: &Registration,
        token: &AccessToken,
    ) -> Result<Vec<ReportSchedule>, ScheduleError> {
        let activity = self
            .activities
            .activity(&registration.activity_id, token)?
            .ok_or_else(|| ScheduleError::ActivityNotFound(registration.activity_id.clone()))?;
        let schedules = plan(registration, &activity.window()?, self.weeks_per_month)?;

        for (emitted, schedule) in schedules.iter().enumerate() {
            if let Err(source) = self.monitoring.create_report_schedule(schedule, token) {
                warn!(
                    registration_id = %registration.id,
                    week = schedule.week,
                    report_type = %schedule.report_type,
                    emitted,
                    "report schedule emission failed"
                );
                return Err(ScheduleError::Emission {
                    report_type: schedule.report_type,
                    week: schedule.week,
                    emitted,
                    source,
                });
            }
        }

        info!(
            registration_id = %registration.id,
            entries = schedules.len(),
            "report schedule generated"
        );
        Ok(schedules)
    }
}
