//! In-process adapters for every collaborator trait. The API binary serves from them when no
//! external services are configured, and the demo and tests build on them.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::directory::{
    ActivityFilter, ActivityLookup, ActivityRecord, DocumentStorage, MonitoringGateway,
    UpstreamError, UserFilter, UserLookup, UserRecord,
};
use super::domain::{
    ActivityId, Document, DocumentId, DocumentUpload, Page, Paginated, Registration,
    RegistrationFilter, RegistrationId,
};
use super::identity::AccessToken;
use super::repository::{DocumentRepository, RegistrationRepository, RepositoryError};
use super::schedule::{ReportSchedule, ScheduleKey};
use super::service::RegistrationDependencies;

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, RepositoryError> {
    mutex
        .lock()
        .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
}

fn lock_upstream<'a, T>(
    mutex: &'a Mutex<T>,
    service: &'static str,
) -> Result<MutexGuard<'a, T>, UpstreamError> {
    mutex
        .lock()
        .map_err(|_| UpstreamError::unavailable(service, "mutex poisoned"))
}

/// Registrations kept in insertion order.
#[derive(Default, Clone)]
pub struct MemoryRegistrationRepository {
    records: Arc<Mutex<Vec<Registration>>>,
}

impl MemoryRegistrationRepository {
    /// Every stored row, soft-deleted ones included.
    pub fn snapshot(&self) -> Vec<Registration> {
        self.records
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    fn newest_first(
        &self,
        predicate: impl Fn(&Registration) -> bool,
    ) -> Result<Vec<Registration>, RepositoryError> {
        let guard = lock(&self.records)?;
        let mut matching: Vec<Registration> = guard
            .iter()
            .rev()
            .filter(|record| !record.is_deleted() && predicate(record))
            .cloned()
            .collect();
        // stable sort keeps later inserts ahead on equal timestamps
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matching)
    }
}

impl RegistrationRepository for MemoryRegistrationRepository {
    fn insert(&self, record: Registration) -> Result<Registration, RepositoryError> {
        let mut guard = lock(&self.records)?;
        if guard.iter().any(|existing| existing.id == record.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.push(record.clone());
        Ok(record)
    }

    fn update(&self, mut record: Registration) -> Result<Registration, RepositoryError> {
        let mut guard = lock(&self.records)?;
        let stored = guard
            .iter_mut()
            .find(|existing| existing.id == record.id && !existing.is_deleted())
            .ok_or(RepositoryError::NotFound)?;
        if stored.version != record.version {
            return Err(RepositoryError::StaleVersion {
                expected: record.version,
                found: stored.version,
            });
        }
        record.version += 1;
        *stored = record.clone();
        Ok(record)
    }

    fn fetch(&self, id: &RegistrationId) -> Result<Option<Registration>, RepositoryError> {
        let guard = lock(&self.records)?;
        Ok(guard
            .iter()
            .find(|record| &record.id == id && !record.is_deleted())
            .cloned())
    }

    fn latest_for_student(&self, nrp: &str) -> Result<Option<Registration>, RepositoryError> {
        Ok(self
            .newest_first(|record| record.user_nrp == nrp)?
            .into_iter()
            .next())
    }

    fn find_by_activity_and_nrp(
        &self,
        activity_id: &ActivityId,
        nrp: &str,
    ) -> Result<Option<Registration>, RepositoryError> {
        Ok(self
            .newest_first(|record| &record.activity_id == activity_id && record.user_nrp == nrp)?
            .into_iter()
            .next())
    }

    fn list(
        &self,
        filter: &RegistrationFilter,
        page: Page,
    ) -> Result<Paginated<Registration>, RepositoryError> {
        let matching = self.newest_first(|record| filter.matches(record))?;
        let total = matching.len();
        let items = matching
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect();
        Ok(Paginated { items, total, page })
    }

    fn soft_delete(&self, id: &RegistrationId, at: DateTime<Utc>) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.records)?;
        let stored = guard
            .iter_mut()
            .find(|record| &record.id == id && !record.is_deleted())
            .ok_or(RepositoryError::NotFound)?;
        stored.deleted_at = Some(at);
        stored.updated_at = at;
        stored.version += 1;
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct MemoryDocumentRepository {
    documents: Arc<Mutex<Vec<Document>>>,
}

impl DocumentRepository for MemoryDocumentRepository {
    fn insert(&self, document: Document) -> Result<Document, RepositoryError> {
        let mut guard = lock(&self.documents)?;
        if guard.iter().any(|existing| existing.id == document.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.push(document.clone());
        Ok(document)
    }

    fn fetch(&self, id: &DocumentId) -> Result<Option<Document>, RepositoryError> {
        let guard = lock(&self.documents)?;
        Ok(guard.iter().find(|document| &document.id == id).cloned())
    }

    fn for_registration(&self, id: &RegistrationId) -> Result<Vec<Document>, RepositoryError> {
        let guard = lock(&self.documents)?;
        Ok(guard
            .iter()
            .filter(|document| &document.registration_id == id)
            .cloned()
            .collect())
    }

    fn delete(&self, id: &DocumentId) -> Result<(), RepositoryError> {
        let mut guard = lock(&self.documents)?;
        let before = guard.len();
        guard.retain(|document| &document.id != id);
        if guard.len() == before {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

/// A directory user reachable through its bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUser {
    pub token: String,
    #[serde(flatten)]
    pub user: UserRecord,
}

/// Seed file for [`MemoryDirectory`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryFixtures {
    #[serde(default)]
    pub activities: Vec<ActivityRecord>,
    #[serde(default)]
    pub users: Vec<TokenUser>,
}

/// Activity catalogue and user directory backed by fixtures.
#[derive(Default, Clone)]
pub struct MemoryDirectory {
    activities: Arc<Mutex<Vec<ActivityRecord>>>,
    users: Arc<Mutex<HashMap<String, UserRecord>>>,
}

impl MemoryDirectory {
    pub fn from_fixtures(fixtures: DirectoryFixtures) -> Self {
        let users = fixtures
            .users
            .into_iter()
            .map(|entry| (entry.token, entry.user))
            .collect();
        Self {
            activities: Arc::new(Mutex::new(fixtures.activities)),
            users: Arc::new(Mutex::new(users)),
        }
    }

    /// Adds the activity, replacing any entry with the same id.
    pub fn upsert_activity(&self, activity: ActivityRecord) -> Result<(), UpstreamError> {
        let mut guard = lock_upstream(&self.activities, "activity")?;
        guard.retain(|existing| existing.id.is_none() || existing.id != activity.id);
        guard.push(activity);
        Ok(())
    }

    pub fn register_user(&self, token: &str, user: UserRecord) -> Result<(), UpstreamError> {
        lock_upstream(&self.users, "user")?.insert(token.to_string(), user);
        Ok(())
    }
}

impl ActivityLookup for MemoryDirectory {
    fn activities(
        &self,
        filter: &ActivityFilter,
        _token: &AccessToken,
    ) -> Result<Vec<ActivityRecord>, UpstreamError> {
        let guard = lock_upstream(&self.activities, "activity")?;
        Ok(guard
            .iter()
            .filter(|activity| {
                filter
                    .activity_id
                    .as_ref()
                    .map_or(true, |id| activity.id.as_deref() == Some(id.0.as_str()))
            })
            .filter(|activity| {
                filter.name.as_deref().map_or(true, |name| {
                    activity
                        .name
                        .as_deref()
                        .is_some_and(|candidate| candidate.contains(name))
                })
            })
            .cloned()
            .collect())
    }
}

impl UserLookup for MemoryDirectory {
    fn current_user(&self, token: &AccessToken) -> Result<Option<UserRecord>, UpstreamError> {
        let guard = lock_upstream(&self.users, "user")?;
        Ok(guard.get(token.as_str()).cloned())
    }

    fn users(
        &self,
        filter: &UserFilter,
        _token: &AccessToken,
    ) -> Result<Vec<UserRecord>, UpstreamError> {
        let guard = lock_upstream(&self.users, "user")?;
        let mut users: Vec<UserRecord> = guard
            .values()
            .filter(|user| {
                filter
                    .user_id
                    .as_ref()
                    .map_or(true, |id| user.id.as_ref() == Some(id))
            })
            .cloned()
            .collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }
}

/// Monitoring service stand-in that upserts schedule entries on their natural key.
#[derive(Default, Clone)]
pub struct MemoryMonitoringGateway {
    schedules: Arc<Mutex<BTreeMap<ScheduleKey, ReportSchedule>>>,
    emissions: Arc<Mutex<usize>>,
}

impl MemoryMonitoringGateway {
    /// Stored entries for a registration, weekly entries first and the final entry last.
    pub fn records_for(&self, id: &RegistrationId) -> Vec<ReportSchedule> {
        self.schedules
            .lock()
            .map(|guard| {
                guard
                    .values()
                    .filter(|schedule| &schedule.registration_id == id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn records(&self) -> Vec<ReportSchedule> {
        self.schedules
            .lock()
            .map(|guard| guard.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of create calls received, duplicates included.
    pub fn emissions(&self) -> usize {
        self.emissions.lock().map(|guard| *guard).unwrap_or_default()
    }
}

impl MonitoringGateway for MemoryMonitoringGateway {
    fn create_report_schedule(
        &self,
        schedule: &ReportSchedule,
        _token: &AccessToken,
    ) -> Result<(), UpstreamError> {
        *lock_upstream(&self.emissions, "monitoring")? += 1;
        lock_upstream(&self.schedules, "monitoring")?.insert(schedule.key(), schedule.clone());
        Ok(())
    }
}

#[derive(Default, Clone)]
pub struct MemoryDocumentStorage {
    files: Arc<Mutex<HashMap<String, DocumentUpload>>>,
}

impl MemoryDocumentStorage {
    pub fn contains(&self, file_storage_id: &str) -> bool {
        self.files
            .lock()
            .map(|guard| guard.contains_key(file_storage_id))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.files.lock().map(|guard| guard.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DocumentStorage for MemoryDocumentStorage {
    fn upload(&self, upload: &DocumentUpload) -> Result<String, UpstreamError> {
        let file_storage_id = format!("file-{}", DocumentId::generate());
        lock_upstream(&self.files, "storage")?.insert(file_storage_id.clone(), upload.clone());
        Ok(file_storage_id)
    }

    fn delete(&self, file_storage_id: &str) -> Result<(), UpstreamError> {
        lock_upstream(&self.files, "storage")?
            .remove(file_storage_id)
            .map(|_| ())
            .ok_or_else(|| {
                UpstreamError::unavailable("storage", format!("file {file_storage_id} not found"))
            })
    }
}

/// One shared set of in-memory adapters. Clones share state.
#[derive(Default, Clone)]
pub struct MemoryBackend {
    pub registrations: MemoryRegistrationRepository,
    pub documents: MemoryDocumentRepository,
    pub directory: MemoryDirectory,
    pub monitoring: MemoryMonitoringGateway,
    pub storage: MemoryDocumentStorage,
}

impl MemoryBackend {
    pub fn with_directory(directory: MemoryDirectory) -> Self {
        Self {
            directory,
            ..Self::default()
        }
    }

    pub fn dependencies(&self) -> RegistrationDependencies {
        RegistrationDependencies {
            registrations: Arc::new(self.registrations.clone()),
            documents: Arc::new(self.documents.clone()),
            activities: Arc::new(self.directory.clone()),
            users: Arc::new(self.directory.clone()),
            monitoring: Arc::new(self.monitoring.clone()),
            storage: Arc::new(self.storage.clone()),
        }
    }
}
