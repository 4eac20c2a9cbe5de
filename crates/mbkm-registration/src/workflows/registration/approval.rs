use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::directory::{UpstreamError, UserLookup};
use super::domain::{DuplicateDecision, Registration, RegistrationId, ReviewDecision, ReviewerSide};
use super::identity::{AccessToken, Identity, IdentityError, Role};
use super::repository::{RegistrationRepository, RepositoryError};
use super::schedule::{ReportScheduleGenerator, ScheduleError};

/// Outcome of a batch of review decisions.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApprovalSummary {
    pub updated: Vec<Registration>,
    pub schedules_generated: usize,
}

/// Applies reviewer decisions to registrations and triggers the report schedule once both
/// sides have approved.
pub struct ApprovalCoordinator {
    registrations: Arc<dyn RegistrationRepository>,
    users: Arc<dyn UserLookup>,
    schedules: ReportScheduleGenerator,
}

impl ApprovalCoordinator {
    pub fn new(
        registrations: Arc<dyn RegistrationRepository>,
        users: Arc<dyn UserLookup>,
        schedules: ReportScheduleGenerator,
    ) -> Self {
        Self {
            registrations,
            users,
            schedules,
        }
    }

    /// Decision by the academic advisor named on each registration.
    pub fn advisor_approval(
        &self,
        ids: &[RegistrationId],
        decision: ReviewDecision,
        token: &AccessToken,
    ) -> Result<ApprovalSummary, ApprovalError> {
        let reviewer = Identity::resolve(self.users.as_ref(), token)?;
        self.decide(&reviewer, ReviewerSide::AcademicAdvisor, ids, decision, token)
    }

    /// Decision by the program office (LO-MBKM or admin).
    pub fn lo_approval(
        &self,
        ids: &[RegistrationId],
        decision: ReviewDecision,
        token: &AccessToken,
    ) -> Result<ApprovalSummary, ApprovalError> {
        let reviewer = Identity::resolve(self.users.as_ref(), token)?;
        self.decide(&reviewer, ReviewerSide::ProgramOffice, ids, decision, token)
    }

    /// Routes the decision to the side matching the caller's role.
    pub fn approve(
        &self,
        ids: &[RegistrationId],
        decision: ReviewDecision,
        token: &AccessToken,
    ) -> Result<ApprovalSummary, ApprovalError> {
        let reviewer = Identity::resolve(self.users.as_ref(), token)?;
        let side = match reviewer.role {
            Role::AcademicAdvisor => ReviewerSide::AcademicAdvisor,
            Role::Admin | Role::ProgramOffice => ReviewerSide::ProgramOffice,
            Role::Student => {
                warn!(user_id = %reviewer.user_id, "student attempted a review decision");
                return Err(ApprovalError::Unauthorized);
            }
        };
        self.decide(&reviewer, side, ids, decision, token)
    }

    fn decide(
        &self,
        reviewer: &Identity,
        side: ReviewerSide,
        ids: &[RegistrationId],
        decision: ReviewDecision,
        token: &AccessToken,
    ) -> Result<ApprovalSummary, ApprovalError> {
        let permitted = match side {
            ReviewerSide::AcademicAdvisor => reviewer.advisor_email().map(|_| ()),
            ReviewerSide::ProgramOffice => reviewer.require_office(),
        };
        if permitted.is_err() {
            warn!(
                user_id = %reviewer.user_id,
                role = reviewer.role.label(),
                side = side.label(),
                "reviewer role not allowed for this decision"
            );
            return Err(ApprovalError::Unauthorized);
        }

        let mut summary = ApprovalSummary {
            updated: Vec::with_capacity(ids.len()),
            schedules_generated: 0,
        };
        for id in ids {
            let (stored, generated) = self.decide_one(reviewer, side, id, decision, token)?;
            if generated {
                summary.schedules_generated += 1;
            }
            summary.updated.push(stored);
        }
        Ok(summary)
    }

    fn decide_one(
        &self,
        reviewer: &Identity,
        side: ReviewerSide,
        id: &RegistrationId,
        decision: ReviewDecision,
        token: &AccessToken,
    ) -> Result<(Registration, bool), ApprovalError> {
        let loaded = self
            .registrations
            .fetch(id)?
            .filter(|registration| !registration.is_deleted());

        let mut registration = match (side, loaded) {
            (ReviewerSide::AcademicAdvisor, Some(registration))
                if reviewer.can_access(&registration) =>
            {
                registration
            }
            (ReviewerSide::AcademicAdvisor, _) => {
                warn!(
                    registration_id = %id,
                    user_id = %reviewer.user_id,
                    "advisor is not assigned to this registration"
                );
                return Err(ApprovalError::Unauthorized);
            }
            (ReviewerSide::ProgramOffice, Some(registration)) => registration,
            (ReviewerSide::ProgramOffice, None) => return Err(ApprovalError::NotFound(*id)),
        };

        let now = Utc::now();
        let outcome = registration.record_decision(side, decision, now)?;

        let generated = if outcome.schedule_due {
            self.schedules.generate(&registration, token)?;
            registration.schedule_generated_at = Some(now);
            true
        } else {
            false
        };

        let stored = self
            .registrations
            .update(registration)
            .map_err(|err| match err {
                RepositoryError::StaleVersion { expected, found } => {
                    warn!(
                        registration_id = %id,
                        expected,
                        found,
                        "registration changed while a decision was applied"
                    );
                    ApprovalError::ConcurrentModification(*id)
                }
                other => ApprovalError::Repository(other),
            })?;

        info!(
            registration_id = %id,
            side = side.label(),
            decision = %decision,
            previous = outcome.previous.label(),
            approval_status = stored.approval_status,
            "review decision recorded"
        );
        Ok((stored, generated))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApprovalError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Registration {0} not found")]
    NotFound(RegistrationId),
    #[error(transparent)]
    AlreadyDecided(#[from] DuplicateDecision),
    #[error("Registration {0} was modified concurrently")]
    ConcurrentModification(RegistrationId),
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<IdentityError> for ApprovalError {
    fn from(value: IdentityError) -> Self {
        match value {
            IdentityError::Upstream(err) => Self::Upstream(err),
            IdentityError::Unauthenticated
            | IdentityError::Forbidden
            | IdentityError::UnknownRole(_) => Self::Unauthorized,
        }
    }
}
