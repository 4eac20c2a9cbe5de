use std::sync::Arc;

use axum::http::StatusCode;
use chrono::Utc;
use tracing::{info, warn};

use crate::config::ScheduleConfig;

use super::approval::{ApprovalCoordinator, ApprovalError, ApprovalSummary};
use super::directory::{
    ActivityLookup, DocumentStorage, MonitoringGateway, UpstreamDataError, UpstreamError,
    UserFilter, UserLookup,
};
use super::domain::{
    ActivityId, AdvisorSummary, Document, DocumentId, DocumentUpload, Page, Paginated,
    Registration, RegistrationDetails, RegistrationDraft, RegistrationFilter, RegistrationId,
    RegistrationUpdate, ReviewDecision, ValidationStatus,
};
use super::eligibility::{EligibilityEvaluator, EligibilityVerdict, Ineligibility};
use super::identity::{AccessToken, Identity, IdentityError};
use super::repository::{DocumentRepository, RegistrationRepository, RepositoryError};
use super::schedule::ReportScheduleGenerator;

/// Collaborators the registration service is assembled from.
#[derive(Clone)]
pub struct RegistrationDependencies {
    pub registrations: Arc<dyn RegistrationRepository>,
    pub documents: Arc<dyn DocumentRepository>,
    pub activities: Arc<dyn ActivityLookup>,
    pub users: Arc<dyn UserLookup>,
    pub monitoring: Arc<dyn MonitoringGateway>,
    pub storage: Arc<dyn DocumentStorage>,
}

/// Service composing eligibility, approvals, and registration record keeping.
pub struct RegistrationService {
    registrations: Arc<dyn RegistrationRepository>,
    documents: Arc<dyn DocumentRepository>,
    users: Arc<dyn UserLookup>,
    storage: Arc<dyn DocumentStorage>,
    eligibility: EligibilityEvaluator,
    approvals: ApprovalCoordinator,
}

impl RegistrationService {
    pub fn new(dependencies: RegistrationDependencies, schedule: ScheduleConfig) -> Self {
        let RegistrationDependencies {
            registrations,
            documents,
            activities,
            users,
            monitoring,
            storage,
        } = dependencies;

        let generator =
            ReportScheduleGenerator::new(activities.clone(), monitoring, schedule.weeks_per_month);
        let eligibility = EligibilityEvaluator::new(registrations.clone(), activities);
        let approvals = ApprovalCoordinator::new(registrations.clone(), users.clone(), generator);

        Self {
            registrations,
            documents,
            users,
            storage,
            eligibility,
            approvals,
        }
    }

    /// Advisory eligibility check for the calling student.
    pub fn check_eligibility(
        &self,
        activity_id: &ActivityId,
        token: &AccessToken,
    ) -> Result<EligibilityVerdict, RegistrationServiceError> {
        let caller = self.identify(token)?;
        let nrp = caller.student_nrp()?;
        Ok(self.eligibility.check(activity_id, nrp, token))
    }

    /// Registers the calling student for an activity, attaching the uploaded documents.
    pub fn create_registration(
        &self,
        draft: RegistrationDraft,
        token: &AccessToken,
    ) -> Result<RegistrationDetails, RegistrationServiceError> {
        if let Some(field) = draft.missing_field() {
            return Err(RegistrationServiceError::InvalidRequest(field));
        }

        let caller = self.identify(token)?;
        let nrp = caller.student_nrp()?.to_string();
        let student = self
            .users
            .users(
                &UserFilter {
                    user_id: Some(caller.user_id.clone()),
                },
                token,
            )?
            .into_iter()
            .next()
            .ok_or(RegistrationServiceError::NotFound("user"))?;

        let activity = self.eligibility.assess(&draft.activity_id, &nrp, token)?;
        let activity_name = activity.name()?.to_string();

        let now = Utc::now();
        let registration = Registration {
            id: RegistrationId::generate(),
            activity_id: draft.activity_id,
            activity_name,
            user_id: caller.user_id.clone(),
            user_nrp: student.nrp.unwrap_or(nrp),
            user_name: student.name.unwrap_or_else(|| caller.name.clone()),
            advising_confirmation: draft.advising_confirmation,
            academic_advisor_id: draft.academic_advisor_id,
            academic_advisor: draft.academic_advisor,
            academic_advisor_email: draft.academic_advisor_email,
            mentor_name: draft.mentor_name,
            mentor_email: draft.mentor_email,
            lo_validation: ValidationStatus::Pending,
            academic_advisor_validation: ValidationStatus::Pending,
            semester: draft.semester,
            total_sks: draft.total_sks,
            approval_status: false,
            created_at: now,
            updated_at: now,
            deleted_at: None,
            schedule_generated_at: None,
            version: 0,
        };

        let mut files = Vec::with_capacity(draft.documents.len());
        for upload in &draft.documents {
            match self.storage.upload(upload) {
                Ok(file_storage_id) => files.push(file_storage_id),
                Err(err) => {
                    self.rollback(None, &[], &files);
                    return Err(err.into());
                }
            }
        }

        let registration = match self.registrations.insert(registration) {
            Ok(registration) => registration,
            Err(err) => {
                self.rollback(None, &[], &files);
                return Err(err.into());
            }
        };

        let mut documents = Vec::with_capacity(files.len());
        for (upload, file_storage_id) in draft.documents.iter().zip(&files) {
            let document = Document {
                id: DocumentId::generate(),
                registration_id: registration.id,
                file_storage_id: file_storage_id.clone(),
                name: upload.name.clone(),
                document_type: upload.document_type.clone(),
            };
            match self.documents.insert(document) {
                Ok(document) => documents.push(document),
                Err(err) => {
                    self.rollback(Some(&registration.id), &documents, &files);
                    return Err(err.into());
                }
            }
        }

        info!(
            registration_id = %registration.id,
            activity_id = %registration.activity_id,
            documents = documents.len(),
            "registration created"
        );
        Ok(RegistrationDetails {
            registration,
            documents,
        })
    }

    pub fn get_registration(
        &self,
        id: &RegistrationId,
        token: &AccessToken,
    ) -> Result<RegistrationDetails, RegistrationServiceError> {
        let caller = self.identify(token)?;
        let registration = self.accessible(&caller, id)?;
        let documents = self.documents.for_registration(id)?;
        Ok(RegistrationDetails {
            registration,
            documents,
        })
    }

    /// Full listing for the program office.
    pub fn list_registrations(
        &self,
        filter: RegistrationFilter,
        page: Page,
        token: &AccessToken,
    ) -> Result<Paginated<Registration>, RegistrationServiceError> {
        self.identify(token)?.require_office()?;
        Ok(self.registrations.list(&filter, page)?)
    }

    /// Registrations naming the calling advisor.
    pub fn list_for_advisor(
        &self,
        mut filter: RegistrationFilter,
        page: Page,
        token: &AccessToken,
    ) -> Result<Paginated<Registration>, RegistrationServiceError> {
        let caller = self.identify(token)?;
        filter.academic_advisor_email = Some(caller.advisor_email()?.to_string());
        Ok(self.registrations.list(&filter, page)?)
    }

    /// The calling student's own registrations.
    pub fn list_for_student(
        &self,
        mut filter: RegistrationFilter,
        page: Page,
        token: &AccessToken,
    ) -> Result<Paginated<Registration>, RegistrationServiceError> {
        let caller = self.identify(token)?;
        filter.user_nrp = Some(caller.student_nrp()?.to_string());
        Ok(self.registrations.list(&filter, page)?)
    }

    pub fn update_registration(
        &self,
        id: &RegistrationId,
        update: RegistrationUpdate,
        token: &AccessToken,
    ) -> Result<Registration, RegistrationServiceError> {
        let caller = self.identify(token)?;
        let mut registration = self.accessible(&caller, id)?;
        if !update.apply_to(&mut registration) {
            return Ok(registration);
        }
        registration.updated_at = Utc::now();
        let stored = self.registrations.update(registration)?;
        info!(registration_id = %id, "registration updated");
        Ok(stored)
    }

    /// Removes the registration's files from storage, then soft-deletes it.
    pub fn delete_registration(
        &self,
        id: &RegistrationId,
        token: &AccessToken,
    ) -> Result<(), RegistrationServiceError> {
        let caller = self.identify(token)?;
        self.accessible(&caller, id)?;

        for document in self.documents.for_registration(id)? {
            self.storage.delete(&document.file_storage_id)?;
            self.documents.delete(&document.id)?;
        }
        self.registrations.soft_delete(id, Utc::now())?;
        info!(registration_id = %id, "registration deleted");
        Ok(())
    }

    pub fn add_document(
        &self,
        registration_id: &RegistrationId,
        upload: DocumentUpload,
        token: &AccessToken,
    ) -> Result<Document, RegistrationServiceError> {
        let caller = self.identify(token)?;
        self.accessible(&caller, registration_id)?;
        self.attach(registration_id, &upload)
    }

    pub fn documents_for(
        &self,
        registration_id: &RegistrationId,
        token: &AccessToken,
    ) -> Result<Vec<Document>, RegistrationServiceError> {
        let caller = self.identify(token)?;
        self.accessible(&caller, registration_id)?;
        Ok(self.documents.for_registration(registration_id)?)
    }

    pub fn delete_document(
        &self,
        document_id: &DocumentId,
        token: &AccessToken,
    ) -> Result<(), RegistrationServiceError> {
        let caller = self.identify(token)?;
        let document = self
            .documents
            .fetch(document_id)?
            .ok_or(RegistrationServiceError::NotFound("document"))?;
        self.accessible(&caller, &document.registration_id)
            .map_err(|_| RegistrationServiceError::NotFound("document"))?;

        self.storage.delete(&document.file_storage_id)?;
        self.documents.delete(document_id)?;
        Ok(())
    }

    /// Dashboard counts for the calling advisor.
    pub fn advisor_summary(
        &self,
        token: &AccessToken,
    ) -> Result<AdvisorSummary, RegistrationServiceError> {
        let caller = self.identify(token)?;
        let filter = RegistrationFilter {
            academic_advisor_email: Some(caller.advisor_email()?.to_string()),
            ..RegistrationFilter::default()
        };
        let all = self.registrations.list(
            &filter,
            Page {
                offset: 0,
                limit: usize::MAX,
            },
        )?;

        Ok(AdvisorSummary {
            total: all.total,
            total_approved: all.items.iter().filter(|r| r.approval_status).count(),
            pending_decisions: all
                .items
                .iter()
                .filter(|r| r.academic_advisor_validation == ValidationStatus::Pending)
                .count(),
        })
    }

    pub fn advisor_approval(
        &self,
        ids: &[RegistrationId],
        decision: ReviewDecision,
        token: &AccessToken,
    ) -> Result<ApprovalSummary, RegistrationServiceError> {
        Ok(self.approvals.advisor_approval(ids, decision, token)?)
    }

    pub fn lo_approval(
        &self,
        ids: &[RegistrationId],
        decision: ReviewDecision,
        token: &AccessToken,
    ) -> Result<ApprovalSummary, RegistrationServiceError> {
        Ok(self.approvals.lo_approval(ids, decision, token)?)
    }

    pub fn approve(
        &self,
        ids: &[RegistrationId],
        decision: ReviewDecision,
        token: &AccessToken,
    ) -> Result<ApprovalSummary, RegistrationServiceError> {
        Ok(self.approvals.approve(ids, decision, token)?)
    }

    fn identify(&self, token: &AccessToken) -> Result<Identity, RegistrationServiceError> {
        Ok(Identity::resolve(self.users.as_ref(), token)?)
    }

    /// Loads a live registration the caller may see. Denials look like a missing record.
    fn accessible(
        &self,
        caller: &Identity,
        id: &RegistrationId,
    ) -> Result<Registration, RegistrationServiceError> {
        let registration = self
            .registrations
            .fetch(id)?
            .filter(|registration| !registration.is_deleted())
            .ok_or(RegistrationServiceError::NotFound("registration"))?;
        if !caller.can_access(&registration) {
            warn!(registration_id = %id, user_id = %caller.user_id, "registration access denied");
            return Err(RegistrationServiceError::NotFound("registration"));
        }
        Ok(registration)
    }

    fn attach(
        &self,
        registration_id: &RegistrationId,
        upload: &DocumentUpload,
    ) -> Result<Document, RegistrationServiceError> {
        let file_storage_id = self.storage.upload(upload)?;
        let document = Document {
            id: DocumentId::generate(),
            registration_id: *registration_id,
            file_storage_id: file_storage_id.clone(),
            name: upload.name.clone(),
            document_type: upload.document_type.clone(),
        };
        match self.documents.insert(document) {
            Ok(document) => Ok(document),
            Err(err) => {
                self.rollback(None, &[], &[file_storage_id]);
                Err(err.into())
            }
        }
    }

    /// Undoes a partially applied write: document rows, then the registration, then uploaded
    /// files. Cleanup failures are logged and never replace the original error.
    fn rollback(
        &self,
        registration_id: Option<&RegistrationId>,
        documents: &[Document],
        files: &[String],
    ) {
        for document in documents {
            if let Err(err) = self.documents.delete(&document.id) {
                warn!(document_id = %document.id, error = %err, "document rollback failed");
            }
        }
        if let Some(id) = registration_id {
            if let Err(err) = self.registrations.soft_delete(id, Utc::now()) {
                warn!(registration_id = %id, error = %err, "registration rollback failed");
            }
        }
        for file_storage_id in files {
            if let Err(err) = self.storage.delete(file_storage_id) {
                warn!(%file_storage_id, error = %err, "uploaded file rollback failed");
            }
        }
        warn!(
            registration_id = ?registration_id,
            documents = documents.len(),
            files = files.len(),
            "partial registration write rolled back"
        );
    }
}

/// Error raised by the registration service.
#[derive(Debug, thiserror::Error)]
pub enum RegistrationServiceError {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("missing required field `{0}`")]
    InvalidRequest(&'static str),
    #[error(transparent)]
    Ineligible(#[from] Ineligibility),
    #[error(transparent)]
    Approval(#[from] ApprovalError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl RegistrationServiceError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            Self::Ineligible(Ineligibility::Unavailable(_)) => StatusCode::BAD_GATEWAY,
            Self::Ineligible(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Approval(err) => match err {
                ApprovalError::Unauthorized => StatusCode::UNAUTHORIZED,
                ApprovalError::NotFound(_) => StatusCode::NOT_FOUND,
                ApprovalError::AlreadyDecided(_) => StatusCode::UNPROCESSABLE_ENTITY,
                ApprovalError::ConcurrentModification(_) => StatusCode::CONFLICT,
                ApprovalError::Schedule(_) | ApprovalError::Upstream(_) => StatusCode::BAD_GATEWAY,
                ApprovalError::Repository(err) => repository_status(err),
            },
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Repository(err) => repository_status(err),
        }
    }
}

fn repository_status(err: &RepositoryError) -> StatusCode {
    match err {
        RepositoryError::Conflict | RepositoryError::StaleVersion { .. } => StatusCode::CONFLICT,
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<IdentityError> for RegistrationServiceError {
    fn from(value: IdentityError) -> Self {
        match value {
            IdentityError::Upstream(err) => Self::Upstream(err),
            IdentityError::Unauthenticated
            | IdentityError::Forbidden
            | IdentityError::UnknownRole(_) => Self::Unauthorized,
        }
    }
}

impl From<UpstreamDataError> for RegistrationServiceError {
    fn from(value: UpstreamDataError) -> Self {
        Self::Upstream(UpstreamError::Data(value))
    }
}
