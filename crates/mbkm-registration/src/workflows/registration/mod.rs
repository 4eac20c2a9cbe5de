//! Registration of students into MBKM activities: dual-reviewer approval, report schedule
//! generation once both reviewers approve, and the overlap-based eligibility check that gates
//! new registrations.

pub mod approval;
pub mod directory;
pub mod domain;
pub mod eligibility;
pub mod identity;
pub mod memory;
pub mod repository;
pub mod router;
pub mod schedule;
pub mod service;

#[cfg(test)]
mod tests;

pub use approval::{ApprovalCoordinator, ApprovalError, ApprovalSummary};
pub use directory::{
    ActivityFilter, ActivityLookup, ActivityRecord, ActivityWindow, DocumentStorage,
    MonitoringGateway, UpstreamDataError, UpstreamError, UserFilter, UserLookup, UserRecord,
    ACTIVITY_OPEN_STATUS,
};
pub use domain::{
    ActivityId, AdvisorSummary, Document, DocumentId, DocumentUpload, DuplicateDecision, Page,
    Paginated, Registration, RegistrationDetails, RegistrationDraft, RegistrationFilter,
    RegistrationId, RegistrationUpdate, ReviewDecision, ReviewerSide, ValidationStatus,
};
pub use eligibility::{EligibilityEvaluator, EligibilityReason, EligibilityVerdict, Ineligibility};
pub use identity::{AccessToken, Identity, IdentityError, Role};
pub use memory::{
    DirectoryFixtures, MemoryBackend, MemoryDirectory, MemoryDocumentRepository,
    MemoryDocumentStorage, MemoryMonitoringGateway, MemoryRegistrationRepository, TokenUser,
};
pub use repository::{DocumentRepository, RegistrationRepository, RepositoryError};
pub use router::registration_router;
pub use schedule::{ReportSchedule, ReportScheduleGenerator, ReportType, ScheduleError};
pub use service::{RegistrationDependencies, RegistrationService, RegistrationServiceError};
