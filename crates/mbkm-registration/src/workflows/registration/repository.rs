use chrono::{DateTime, Utc};

use super::domain::{
    ActivityId, Document, DocumentId, Page, Paginated, Registration, RegistrationFilter,
    RegistrationId,
};

/// Storage abstraction so the service module can be exercised in isolation.
///
/// Soft-deleted registrations are invisible to every read.
pub trait RegistrationRepository: Send + Sync {
    fn insert(&self, record: Registration) -> Result<Registration, RepositoryError>;

    /// Writes `record` only if the stored version still equals `record.version`, returning the
    /// stored copy with its version bumped.
    fn update(&self, record: Registration) -> Result<Registration, RepositoryError>;

    fn fetch(&self, id: &RegistrationId) -> Result<Option<Registration>, RepositoryError>;

    /// The student's most recently created registration, for any activity.
    fn latest_for_student(&self, nrp: &str) -> Result<Option<Registration>, RepositoryError>;

    fn find_by_activity_and_nrp(
        &self,
        activity_id: &ActivityId,
        nrp: &str,
    ) -> Result<Option<Registration>, RepositoryError>;

    /// Matching registrations, newest first.
    fn list(
        &self,
        filter: &RegistrationFilter,
        page: Page,
    ) -> Result<Paginated<Registration>, RepositoryError>;

    fn soft_delete(&self, id: &RegistrationId, at: DateTime<Utc>) -> Result<(), RepositoryError>;
}

pub trait DocumentRepository: Send + Sync {
    fn insert(&self, document: Document) -> Result<Document, RepositoryError>;
    fn fetch(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError>;
    fn for_registration(&self, id: &RegistrationId) -> Result<Vec<Document>, RepositoryError>;
    fn delete(&self, id: &DocumentId) -> Result<(), RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record was modified concurrently (expected version {expected}, found {found})")]
    StaleVersion { expected: u64, found: u64 },
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
