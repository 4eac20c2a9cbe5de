use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::ScheduleConfig;
use crate::workflows::registration::{
    AccessToken, ActivityId, ActivityRecord, DirectoryFixtures, Document, DocumentId,
    DocumentRepository, DocumentStorage, DocumentUpload, MemoryBackend, MemoryDirectory,
    MemoryDocumentRepository, MemoryDocumentStorage, MonitoringGateway, Page, Paginated,
    Registration, RegistrationDraft, RegistrationFilter, RegistrationId, RegistrationRepository,
    RegistrationService, ReportSchedule, RepositoryError, TokenUser, UpstreamError, UserRecord,
    ValidationStatus,
};

pub(super) const STUDENT: &str = "student-token";
pub(super) const OTHER_STUDENT: &str = "other-student-token";
pub(super) const ADVISOR: &str = "advisor-token";
pub(super) const OTHER_ADVISOR: &str = "other-advisor-token";
pub(super) const PROGRAM_OFFICE: &str = "lo-token";
pub(super) const ADMIN: &str = "admin-token";

pub(super) const STUDENT_NRP: &str = "5025201001";
pub(super) const ADVISOR_EMAIL: &str = "dewi.advisor@its.ac.id";

pub(super) fn token(raw: &str) -> AccessToken {
    AccessToken::new(raw)
}

pub(super) fn activity(id: &str, start: &str, months: i64, status: &str) -> ActivityRecord {
    ActivityRecord {
        id: Some(id.to_string()),
        name: Some(format!("Activity {id}")),
        approval_status: Some(status.to_string()),
        start_period: Some(start.to_string()),
        months_duration: Some(months),
    }
}

fn user(token: &str, id: &str, role: &str, nrp: Option<&str>, email: &str) -> TokenUser {
    TokenUser {
        token: token.to_string(),
        user: UserRecord {
            id: Some(id.to_string()),
            nrp: nrp.map(str::to_string),
            name: Some(format!("User {id}")),
            role: Some(role.to_string()),
            email: Some(email.to_string()),
        },
    }
}

/// Activity `act-a` runs 2024-01-01 for two months, `act-b` for three; `act-c` starts inside
/// `act-b`, `act-d` the day after `act-b` ends, and `act-e` exactly when it ends.
pub(super) fn fixtures() -> DirectoryFixtures {
    DirectoryFixtures {
        activities: vec![
            activity("act-a", "2024-01-01T00:00:00Z", 2, "APPROVED"),
            activity("act-b", "2024-01-01T00:00:00Z", 3, "APPROVED"),
            activity("act-c", "2024-03-01T00:00:00Z", 2, "APPROVED"),
            activity("act-d", "2024-04-02T00:00:00Z", 2, "APPROVED"),
            activity("act-e", "2024-04-01T00:00:00Z", 2, "APPROVED"),
            activity("act-draft", "2024-06-01T00:00:00Z", 2, "PENDING"),
        ],
        users: vec![
            user(STUDENT, "u-student", "MAHASISWA", Some(STUDENT_NRP), "rina@student.its.ac.id"),
            user(
                OTHER_STUDENT,
                "u-other-student",
                "MAHASISWA",
                Some("5025201099"),
                "bima@student.its.ac.id",
            ),
            user(ADVISOR, "u-advisor", "DOSEN PEMBIMBING", None, ADVISOR_EMAIL),
            user(
                OTHER_ADVISOR,
                "u-other-advisor",
                "DOSEN PEMBIMBING",
                None,
                "agus.advisor@its.ac.id",
            ),
            user(PROGRAM_OFFICE, "u-lo", "LO-MBKM", None, "lo@its.ac.id"),
            user(ADMIN, "u-admin", "ADMIN", None, "admin@its.ac.id"),
        ],
    }
}

pub(super) fn backend() -> MemoryBackend {
    MemoryBackend::with_directory(MemoryDirectory::from_fixtures(fixtures()))
}

pub(super) fn build_service(backend: &MemoryBackend) -> RegistrationService {
    RegistrationService::new(backend.dependencies(), ScheduleConfig::default())
}

pub(super) fn draft(activity_id: &str) -> RegistrationDraft {
    RegistrationDraft {
        activity_id: ActivityId(activity_id.to_string()),
        academic_advisor_id: "u-advisor".to_string(),
        advising_confirmation: true,
        academic_advisor: "Dewi Lestari".to_string(),
        academic_advisor_email: ADVISOR_EMAIL.to_string(),
        mentor_name: "Hendra".to_string(),
        mentor_email: "hendra@mitra.co.id".to_string(),
        semester: 6,
        total_sks: 20,
        documents: Vec::new(),
    }
}

pub(super) fn at(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

/// A pending registration of the fixture student, stored directly.
pub(super) fn seed_registration(
    backend: &MemoryBackend,
    activity_id: &str,
    created_at: &str,
) -> Registration {
    let created_at = at(created_at);
    let registration = Registration {
        id: RegistrationId::generate(),
        activity_id: ActivityId(activity_id.to_string()),
        activity_name: format!("Activity {activity_id}"),
        user_id: "u-student".to_string(),
        user_nrp: STUDENT_NRP.to_string(),
        user_name: "User u-student".to_string(),
        advising_confirmation: true,
        academic_advisor_id: "u-advisor".to_string(),
        academic_advisor: "Dewi Lestari".to_string(),
        academic_advisor_email: ADVISOR_EMAIL.to_string(),
        mentor_name: "Hendra".to_string(),
        mentor_email: "hendra@mitra.co.id".to_string(),
        lo_validation: ValidationStatus::Pending,
        academic_advisor_validation: ValidationStatus::Pending,
        semester: 6,
        total_sks: 20,
        approval_status: false,
        created_at,
        updated_at: created_at,
        deleted_at: None,
        schedule_generated_at: None,
        version: 0,
    };
    backend
        .registrations
        .insert(registration)
        .expect("seed registration")
}

pub(super) fn stored(backend: &MemoryBackend, id: &RegistrationId) -> Registration {
    backend
        .registrations
        .fetch(id)
        .expect("fetch succeeds")
        .expect("registration exists")
}

/// Monitoring gateway that accepts `succeed` entries and then fails.
pub(super) struct FlakyMonitoring {
    succeed: usize,
    received: Mutex<Vec<ReportSchedule>>,
}

impl FlakyMonitoring {
    pub(super) fn failing_after(succeed: usize) -> Self {
        Self {
            succeed,
            received: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn received(&self) -> Vec<ReportSchedule> {
        self.received.lock().expect("monitoring mutex poisoned").clone()
    }
}

impl MonitoringGateway for FlakyMonitoring {
    fn create_report_schedule(
        &self,
        schedule: &ReportSchedule,
        _token: &AccessToken,
    ) -> Result<(), UpstreamError> {
        let mut received = self.received.lock().expect("monitoring mutex poisoned");
        if received.len() >= self.succeed {
            return Err(UpstreamError::unavailable("monitoring", "connection reset"));
        }
        received.push(schedule.clone());
        Ok(())
    }
}

/// Repository whose every read sees a record another writer updates right after.
pub(super) struct RacingRepository {
    pub(super) inner: Arc<dyn RegistrationRepository>,
}

impl RegistrationRepository for RacingRepository {
    fn insert(&self, record: Registration) -> Result<Registration, RepositoryError> {
        self.inner.insert(record)
    }

    fn update(&self, record: Registration) -> Result<Registration, RepositoryError> {
        self.inner.update(record)
    }

    fn fetch(&self, id: &RegistrationId) -> Result<Option<Registration>, RepositoryError> {
        let seen = self.inner.fetch(id)?;
        if let Some(current) = &seen {
            let mut concurrent = current.clone();
            concurrent.mentor_name = "Concurrent Editor".to_string();
            self.inner.update(concurrent)?;
        }
        Ok(seen)
    }

    fn latest_for_student(&self, nrp: &str) -> Result<Option<Registration>, RepositoryError> {
        self.inner.latest_for_student(nrp)
    }

    fn find_by_activity_and_nrp(
        &self,
        activity_id: &ActivityId,
        nrp: &str,
    ) -> Result<Option<Registration>, RepositoryError> {
        self.inner.find_by_activity_and_nrp(activity_id, nrp)
    }

    fn list(
        &self,
        filter: &RegistrationFilter,
        page: Page,
    ) -> Result<Paginated<Registration>, RepositoryError> {
        self.inner.list(filter, page)
    }

    fn soft_delete(&self, id: &RegistrationId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        self.inner.soft_delete(id, at)
    }
}

pub(super) struct UnavailableRepository;

impl RegistrationRepository for UnavailableRepository {
    fn insert(&self, _record: Registration) -> Result<Registration, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(&self, _record: Registration) -> Result<Registration, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &RegistrationId) -> Result<Option<Registration>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn latest_for_student(&self, _nrp: &str) -> Result<Option<Registration>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn find_by_activity_and_nrp(
        &self,
        _activity_id: &ActivityId,
        _nrp: &str,
    ) -> Result<Option<Registration>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn list(
        &self,
        _filter: &RegistrationFilter,
        _page: Page,
    ) -> Result<Paginated<Registration>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn soft_delete(
        &self,
        _id: &RegistrationId,
        _at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

/// File store that accepts `succeed` uploads and then reports an outage.
pub(super) struct FlakyStorage {
    pub(super) inner: MemoryDocumentStorage,
    succeed: usize,
    uploads: Mutex<usize>,
}

impl FlakyStorage {
    pub(super) fn failing_after(inner: MemoryDocumentStorage, succeed: usize) -> Self {
        Self {
            inner,
            succeed,
            uploads: Mutex::new(0),
        }
    }
}

impl DocumentStorage for FlakyStorage {
    fn upload(&self, upload: &DocumentUpload) -> Result<String, UpstreamError> {
        let mut uploads = self.uploads.lock().expect("storage mutex poisoned");
        if *uploads >= self.succeed {
            return Err(UpstreamError::unavailable("storage", "down"));
        }
        *uploads += 1;
        self.inner.upload(upload)
    }

    fn delete(&self, file_storage_id: &str) -> Result<(), UpstreamError> {
        self.inner.delete(file_storage_id)
    }
}

/// Document table that accepts `succeed` inserts and then fails.
pub(super) struct FlakyDocuments {
    pub(super) inner: MemoryDocumentRepository,
    succeed: usize,
    inserts: Mutex<usize>,
}

impl FlakyDocuments {
    pub(super) fn failing_after(inner: MemoryDocumentRepository, succeed: usize) -> Self {
        Self {
            inner,
            succeed,
            inserts: Mutex::new(0),
        }
    }
}

impl DocumentRepository for FlakyDocuments {
    fn insert(&self, document: Document) -> Result<Document, RepositoryError> {
        let mut inserts = self.inserts.lock().expect("documents mutex poisoned");
        if *inserts >= self.succeed {
            return Err(RepositoryError::Unavailable("documents table locked".to_string()));
        }
        *inserts += 1;
        self.inner.insert(document)
    }

    fn fetch(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError> {
        self.inner.fetch(id)
    }

    fn for_registration(&self, id: &RegistrationId) -> Result<Vec<Document>, RepositoryError> {
        self.inner.for_registration(id)
    }

    fn delete(&self, id: &DocumentId) -> Result<(), RepositoryError> {
        self.inner.delete(id)
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
