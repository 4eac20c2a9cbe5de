use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::directory::{
    ActivityLookup, ActivityRecord, ActivityWindow, UpstreamDataError, UpstreamError,
};
use super::domain::ActivityId;
use super::identity::AccessToken;
use super::repository::{RegistrationRepository, RepositoryError};

/// Why a student may not register for an activity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Ineligibility {
    #[error("Activity not found")]
    ActivityNotFound,
    #[error("This activity is not open for registration")]
    ActivityNotOpen,
    #[error("User already registered for this activity")]
    AlreadyRegistered,
    #[error("User already registered for an overlapping activity period")]
    OverlappingPeriod {
        existing_activity: ActivityId,
        existing_end: DateTime<FixedOffset>,
        candidate_start: DateTime<FixedOffset>,
    },
    #[error("Existing activity {0} not found")]
    ExistingActivityNotFound(ActivityId),
    #[error("Invalid activity data: {0}")]
    InvalidActivityData(#[from] UpstreamDataError),
    #[error("Eligibility could not be verified: {0}")]
    Unavailable(String),
}

impl Ineligibility {
    pub fn reason(&self) -> EligibilityReason {
        match self {
            Ineligibility::ActivityNotFound => EligibilityReason::ActivityNotFound,
            Ineligibility::ActivityNotOpen => EligibilityReason::ActivityNotOpen,
            Ineligibility::AlreadyRegistered => EligibilityReason::AlreadyRegistered,
            Ineligibility::OverlappingPeriod { .. } => EligibilityReason::OverlappingPeriod,
            Ineligibility::ExistingActivityNotFound(_) | Ineligibility::InvalidActivityData(_) => {
                EligibilityReason::InvalidActivityData
            }
            Ineligibility::Unavailable(_) => EligibilityReason::UpstreamUnavailable,
        }
    }
}

impl From<UpstreamError> for Ineligibility {
    fn from(value: UpstreamError) -> Self {
        match value {
            UpstreamError::Data(err) => Self::InvalidActivityData(err),
            unavailable @ UpstreamError::Unavailable { .. } => {
                Self::Unavailable(unavailable.to_string())
            }
        }
    }
}

impl From<RepositoryError> for Ineligibility {
    fn from(value: RepositoryError) -> Self {
        Self::Unavailable(value.to_string())
    }
}

/// Machine-readable companion to the verdict message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityReason {
    Eligible,
    ActivityNotFound,
    ActivityNotOpen,
    AlreadyRegistered,
    OverlappingPeriod,
    InvalidActivityData,
    UpstreamUnavailable,
}

/// Advisory answer returned to a prospective registrant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityVerdict {
    pub eligible: bool,
    pub reason: EligibilityReason,
    pub message: String,
}

impl EligibilityVerdict {
    pub fn eligible() -> Self {
        Self {
            eligible: true,
            reason: EligibilityReason::Eligible,
            message: "User is eligible to register for this activity".to_string(),
        }
    }

    pub fn denied(ineligibility: &Ineligibility) -> Self {
        Self {
            eligible: false,
            reason: ineligibility.reason(),
            message: ineligibility.to_string(),
        }
    }
}

/// Strict-after rule: the candidate must start after the existing activity has ended.
/// A candidate starting exactly at the existing end counts as overlapping.
pub fn starts_after(
    existing: &ActivityWindow,
    candidate_start: DateTime<FixedOffset>,
) -> Result<bool, UpstreamDataError> {
    Ok(candidate_start > existing.end()?)
}

/// Decides whether a student (identified by NRP) may register for an activity.
pub struct EligibilityEvaluator {
    registrations: Arc<dyn RegistrationRepository>,
    activities: Arc<dyn ActivityLookup>,
}

impl EligibilityEvaluator {
    pub fn new(
        registrations: Arc<dyn RegistrationRepository>,
        activities: Arc<dyn ActivityLookup>,
    ) -> Self {
        Self {
            registrations,
            activities,
        }
    }

    /// Advisory check; every failure becomes a negative verdict.
    pub fn check(
        &self,
        activity_id: &ActivityId,
        nrp: &str,
        token: &AccessToken,
    ) -> EligibilityVerdict {
        match self.assess(activity_id, nrp, token) {
            Ok(_) => EligibilityVerdict::eligible(),
            Err(ineligibility) => EligibilityVerdict::denied(&ineligibility),
        }
    }

    /// Runs every eligibility rule and returns the open candidate activity on success.
    pub fn assess(
        &self,
        activity_id: &ActivityId,
        nrp: &str,
        token: &AccessToken,
    ) -> Result<ActivityRecord, Ineligibility> {
        let candidate = self
            .activities
            .activity(activity_id, token)?
            .ok_or(Ineligibility::ActivityNotFound)?;
        if !candidate.is_open() {
            return Err(Ineligibility::ActivityNotOpen);
        }

        if self
            .registrations
            .find_by_activity_and_nrp(activity_id, nrp)?
            .is_some()
        {
            return Err(Ineligibility::AlreadyRegistered);
        }

        let Some(latest) = self.registrations.latest_for_student(nrp)? else {
            return Ok(candidate);
        };
        if &latest.activity_id == activity_id {
            return Err(Ineligibility::AlreadyRegistered);
        }

        let existing = self
            .activities
            .activity(&latest.activity_id, token)?
            .ok_or_else(|| Ineligibility::ExistingActivityNotFound(latest.activity_id.clone()))?;
        let existing_window = existing.window()?;
        let candidate_start = candidate.start()?;

        debug!(
            %activity_id,
            existing_activity = %latest.activity_id,
            %candidate_start,
            "evaluating registration period overlap"
        );

        if !starts_after(&existing_window, candidate_start)? {
            return Err(Ineligibility::OverlappingPeriod {
                existing_activity: latest.activity_id,
                existing_end: existing_window.end()?,
                candidate_start,
            });
        }

        Ok(candidate)
    }
}
