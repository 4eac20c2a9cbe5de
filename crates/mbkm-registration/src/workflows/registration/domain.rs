use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier wrapper for stored registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegistrationId(pub Uuid);

impl RegistrationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for RegistrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for RegistrationId {
    type Err = uuid::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(raw.trim()).map(Self)
    }
}

/// Identifier of a program offering owned by the activity service.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActivityId(pub String);

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for DocumentId {
    type Err = uuid::Error;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(raw.trim()).map(Self)
    }
}

/// Decision recorded by one reviewer side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

impl ValidationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ValidationStatus::Pending => "PENDING",
            ValidationStatus::Approved => "APPROVED",
            ValidationStatus::Rejected => "REJECTED",
        }
    }
}

/// Decision a reviewer may submit. `PENDING` is never a valid submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

impl ReviewDecision {
    pub const fn status(self) -> ValidationStatus {
        match self {
            ReviewDecision::Approved => ValidationStatus::Approved,
            ReviewDecision::Rejected => ValidationStatus::Rejected,
        }
    }
}

impl fmt::Display for ReviewDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReviewDecision::Approved => f.write_str("approved"),
            ReviewDecision::Rejected => f.write_str("rejected"),
        }
    }
}

/// The two parties whose approval a registration needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewerSide {
    AcademicAdvisor,
    ProgramOffice,
}

impl ReviewerSide {
    pub const fn label(self) -> &'static str {
        match self {
            ReviewerSide::AcademicAdvisor => "academic_advisor",
            ReviewerSide::ProgramOffice => "program_office",
        }
    }
}

/// A student's enrollment into one activity, together with both review decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub id: RegistrationId,
    pub activity_id: ActivityId,
    pub activity_name: String,
    pub user_id: String,
    pub user_nrp: String,
    pub user_name: String,
    pub advising_confirmation: bool,
    pub academic_advisor_id: String,
    pub academic_advisor: String,
    pub academic_advisor_email: String,
    pub mentor_name: String,
    pub mentor_email: String,
    pub lo_validation: ValidationStatus,
    pub academic_advisor_validation: ValidationStatus,
    pub semester: u8,
    pub total_sks: u16,
    pub approval_status: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule_generated_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency token, bumped by the repository on every write.
    #[serde(default)]
    pub version: u64,
}

/// Result of applying one reviewer decision in memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecisionOutcome {
    pub previous: ValidationStatus,
    /// Both sides are approved and no report schedule exists yet.
    pub schedule_due: bool,
}

/// Same-side duplicate submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Registration already {0}")]
pub struct DuplicateDecision(pub ReviewDecision);

impl Registration {
    pub fn validation(&self, side: ReviewerSide) -> ValidationStatus {
        match side {
            ReviewerSide::AcademicAdvisor => self.academic_advisor_validation,
            ReviewerSide::ProgramOffice => self.lo_validation,
        }
    }

    pub fn is_fully_approved(&self) -> bool {
        self.lo_validation == ValidationStatus::Approved
            && self.academic_advisor_validation == ValidationStatus::Approved
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Applies `decision` for `side`, keeping `approval_status` derived from both fields.
    ///
    /// Resubmitting the decision already recorded is rejected without touching the record.
    /// The opposite decision overwrites the field.
    pub fn record_decision(
        &mut self,
        side: ReviewerSide,
        decision: ReviewDecision,
        now: DateTime<Utc>,
    ) -> Result<DecisionOutcome, DuplicateDecision> {
        let previous = self.validation(side);
        if previous == decision.status() {
            return Err(DuplicateDecision(decision));
        }

        match side {
            ReviewerSide::AcademicAdvisor => self.academic_advisor_validation = decision.status(),
            ReviewerSide::ProgramOffice => self.lo_validation = decision.status(),
        }
        self.approval_status = self.is_fully_approved();
        self.updated_at = now;

        Ok(DecisionOutcome {
            previous,
            schedule_due: self.approval_status && self.schedule_generated_at.is_none(),
        })
    }
}

/// Stored artifact attached to a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub registration_id: RegistrationId,
    pub file_storage_id: String,
    pub name: String,
    pub document_type: String,
}

/// File handed to the storage collaborator before a document row is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentUpload {
    pub name: String,
    pub document_type: String,
    #[serde(default)]
    pub content: Vec<u8>,
}

/// Registration plus its attached documents, as returned to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrationDetails {
    #[serde(flatten)]
    pub registration: Registration,
    pub documents: Vec<Document>,
}

/// Fields a student supplies when registering for an activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationDraft {
    pub activity_id: ActivityId,
    pub academic_advisor_id: String,
    pub advising_confirmation: bool,
    pub academic_advisor: String,
    pub academic_advisor_email: String,
    pub mentor_name: String,
    pub mentor_email: String,
    pub semester: u8,
    pub total_sks: u16,
    #[serde(default)]
    pub documents: Vec<DocumentUpload>,
}

impl RegistrationDraft {
    /// Returns the first missing required field, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        let required = [
            ("activity_id", self.activity_id.0.as_str()),
            ("academic_advisor_id", self.academic_advisor_id.as_str()),
            ("academic_advisor", self.academic_advisor.as_str()),
            ("academic_advisor_email", self.academic_advisor_email.as_str()),
        ];
        required
            .into_iter()
            .find(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| field)
    }
}

/// Sparse update of the mentor/advisor metadata. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationUpdate {
    #[serde(default)]
    pub advising_confirmation: Option<bool>,
    #[serde(default)]
    pub academic_advisor: Option<String>,
    #[serde(default)]
    pub academic_advisor_email: Option<String>,
    #[serde(default)]
    pub mentor_name: Option<String>,
    #[serde(default)]
    pub mentor_email: Option<String>,
    #[serde(default)]
    pub semester: Option<u8>,
    #[serde(default)]
    pub total_sks: Option<u16>,
}

impl RegistrationUpdate {
    /// Copies every provided field onto `registration`; returns whether anything changed.
    pub fn apply_to(&self, registration: &mut Registration) -> bool {
        let mut changed = false;

        if let Some(value) = self.advising_confirmation {
            changed |= registration.advising_confirmation != value;
            registration.advising_confirmation = value;
        }
        changed |= merge_text(&mut registration.academic_advisor, &self.academic_advisor);
        changed |= merge_text(
            &mut registration.academic_advisor_email,
            &self.academic_advisor_email,
        );
        changed |= merge_text(&mut registration.mentor_name, &self.mentor_name);
        changed |= merge_text(&mut registration.mentor_email, &self.mentor_email);
        if let Some(value) = self.semester {
            changed |= registration.semester != value;
            registration.semester = value;
        }
        if let Some(value) = self.total_sks {
            changed |= registration.total_sks != value;
            registration.total_sks = value;
        }

        changed
    }
}

fn merge_text(target: &mut String, update: &Option<String>) -> bool {
    match update {
        Some(value) if target != value => {
            target.clone_from(value);
            true
        }
        _ => false,
    }
}

/// Query filter over stored registrations; unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationFilter {
    #[serde(default)]
    pub activity_name: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub user_nrp: Option<String>,
    #[serde(default)]
    pub academic_advisor_email: Option<String>,
    #[serde(default)]
    pub approval_status: Option<bool>,
    #[serde(default)]
    pub lo_validation: Option<ValidationStatus>,
    #[serde(default)]
    pub academic_advisor_validation: Option<ValidationStatus>,
}

impl RegistrationFilter {
    pub fn matches(&self, registration: &Registration) -> bool {
        fn eq_opt<T: PartialEq>(expected: &Option<T>, actual: &T) -> bool {
            expected.as_ref().map_or(true, |value| value == actual)
        }

        !registration.is_deleted()
            && eq_opt(&self.activity_name, &registration.activity_name)
            && eq_opt(&self.user_name, &registration.user_name)
            && eq_opt(&self.user_nrp, &registration.user_nrp)
            && eq_opt(
                &self.academic_advisor_email,
                &registration.academic_advisor_email,
            )
            && eq_opt(&self.approval_status, &registration.approval_status)
            && eq_opt(&self.lo_validation, &registration.lo_validation)
            && eq_opt(
                &self.academic_advisor_validation,
                &registration.academic_advisor_validation,
            )
    }
}

/// Offset/limit window over a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub const DEFAULT_LIMIT: usize = 10;
    pub const MAX_LIMIT: usize = 100;

    /// One-based page numbers, mirroring the `page`/`limit` query convention. A zero limit
    /// falls back to the default and larger ones are capped at [`Page::MAX_LIMIT`].
    pub fn numbered(page: usize, limit: usize) -> Self {
        let limit = match limit {
            0 => Self::DEFAULT_LIMIT,
            limit => limit.min(Self::MAX_LIMIT),
        };
        Self {
            offset: page.saturating_sub(1).saturating_mul(limit),
            limit,
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::numbered(1, Self::DEFAULT_LIMIT)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub page: Page,
}

/// Aggregate counts shown on an advisor's dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdvisorSummary {
    pub total: usize,
    pub total_approved: usize,
    pub pending_decisions: usize,
}
