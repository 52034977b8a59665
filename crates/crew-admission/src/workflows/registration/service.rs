use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::time::Instant;

use super::answers::{AnswerValidationError, AnswerWriter, ValidatedAnswers};
use super::assessment::{AssessmentTrigger, Assessor, TaskRegistry};
use super::catalog::RequirementCatalog;
use super::domain::{
    CandidateProfile, Identity, JoinRequest, JourneyState, LegSummary, Registration,
    RegistrationFilter, RegistrationId,
};
use super::lifecycle::{LifecycleError, LifecycleOutcome, RegistrationLifecycle};
use super::observer::{PipelineEvent, PipelineObserver};
use super::prechecks::{PreCheckEvaluator, PreCheckFailure, PreCheckResult};
use super::repository::{
    DocumentVault, JourneyDirectory, NotifyError, OwnerNotice, OwnerNotifier,
    RegistrationRepository, RepositoryError, RequirementSource,
};
use crate::config::AdmissionConfig;

/// Stable codes carried by `ValidationFailed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCode {
    InvalidBody,
    JourneyNotPublished,
    MissingAnswers,
    EmptyAnswer,
}

impl ValidationCode {
    pub const fn token(self) -> &'static str {
        match self {
            ValidationCode::InvalidBody => "invalid_body",
            ValidationCode::JourneyNotPublished => "journey_not_published",
            ValidationCode::MissingAnswers => "missing_answers",
            ValidationCode::EmptyAnswer => "empty_answer",
        }
    }
}

/// Request-level error taxonomy of the join pipeline.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("authentication required")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: String },
    #[error("{message}")]
    ValidationFailed {
        code: ValidationCode,
        message: String,
        details: Option<Value>,
    },
    #[error("{}", .0.reason)]
    EligibilityFailed(PreCheckFailure),
    #[error("{message}")]
    Conflict {
        message: String,
        registration_id: Option<RegistrationId>,
    },
    #[error("{message}: {source}")]
    PersistenceFailed {
        message: String,
        source: RepositoryError,
        /// Set when the registration row was written before the failure.
        registration: Option<Box<Registration>>,
    },
    #[error("request did not finish within {}s", .0.as_secs())]
    TimedOut(Duration),
}

impl AdmissionError {
    /// Stable machine-readable category.
    pub const fn category(&self) -> &'static str {
        match self {
            AdmissionError::Unauthorized => "unauthorized",
            AdmissionError::Forbidden(_) => "forbidden",
            AdmissionError::NotFound { .. } => "not_found",
            AdmissionError::ValidationFailed { .. } => "validation_failed",
            AdmissionError::EligibilityFailed(_) => "eligibility_failed",
            AdmissionError::Conflict { .. } => "conflict",
            AdmissionError::PersistenceFailed { .. } => "persistence_failed",
            AdmissionError::TimedOut(_) => "timed_out",
        }
    }

    pub fn validation(
        code: ValidationCode,
        message: impl Into<String>,
        details: Option<Value>,
    ) -> Self {
        AdmissionError::ValidationFailed {
            code,
            message: message.into(),
            details,
        }
    }

    fn persistence(message: &str, source: RepositoryError) -> Self {
        AdmissionError::PersistenceFailed {
            message: message.to_string(),
            source,
            registration: None,
        }
    }
}

impl From<AnswerValidationError> for AdmissionError {
    fn from(err: AnswerValidationError) -> Self {
        let message = err.to_string();
        match err {
            AnswerValidationError::MissingAnswers { requirement_ids } => AdmissionError::validation(
                ValidationCode::MissingAnswers,
                message,
                Some(json!({
                    "missing_requirement_ids": requirement_ids
                        .iter()
                        .map(|id| id.0.as_str())
                        .collect::<Vec<_>>(),
                })),
            ),
            AnswerValidationError::EmptyAnswer { requirement_id } => AdmissionError::validation(
                ValidationCode::EmptyAnswer,
                message,
                Some(json!({ "requirement_id": requirement_id.0 })),
            ),
        }
    }
}

impl From<LifecycleError> for AdmissionError {
    fn from(err: LifecycleError) -> Self {
        let message = err.to_string();
        match err {
            LifecycleError::Duplicate { existing, .. } => AdmissionError::Conflict {
                message,
                registration_id: Some(existing),
            },
            LifecycleError::NotFound(id) => AdmissionError::NotFound {
                resource: "registration",
                id: id.0,
            },
            LifecycleError::InvalidTransition { .. } => AdmissionError::Conflict {
                message,
                registration_id: None,
            },
            LifecycleError::Contended { .. } => AdmissionError::persistence(
                "registration store kept conflicting",
                RepositoryError::Conflict,
            ),
            LifecycleError::Repository(source) => {
                AdmissionError::persistence("failed to store registration", source)
            }
        }
    }
}

/// Successful create-or-reactivate.
#[derive(Debug, Clone, Serialize)]
pub struct JoinOutcome {
    pub registration: Registration,
    pub reactivated: bool,
    pub message: String,
    pub assessment_dispatched: bool,
    pub owner_notified: bool,
}

/// State carried from the admission stages into the post-write stages.
struct Admitted {
    leg: LegSummary,
    profile: CandidateProfile,
    has_requirements: bool,
    validated: ValidatedAnswers,
    outcome: LifecycleOutcome,
}

/// Every collaborator the service reaches through a port.
#[derive(Clone)]
pub struct RegistrationPorts {
    pub registrations: Arc<dyn RegistrationRepository>,
    pub requirements: Arc<dyn RequirementSource>,
    pub directory: Arc<dyn JourneyDirectory>,
    pub documents: Arc<dyn DocumentVault>,
    pub notifier: Arc<dyn OwnerNotifier>,
    pub assessor: Arc<dyn Assessor>,
}

/// Orchestrates the join pipeline:
/// catalog -> pre-checks -> answer validation -> lifecycle -> answer writes -> assessment
/// trigger -> owner notice.
pub struct RegistrationService {
    directory: Arc<dyn JourneyDirectory>,
    documents: Arc<dyn DocumentVault>,
    notifier: Arc<dyn OwnerNotifier>,
    registrations: Arc<dyn RegistrationRepository>,
    observer: Arc<dyn PipelineObserver>,
    catalog: RequirementCatalog,
    evaluator: PreCheckEvaluator,
    answers: AnswerWriter,
    lifecycle: RegistrationLifecycle,
    trigger: AssessmentTrigger,
    request_timeout: Duration,
}

impl RegistrationService {
    pub fn new(
        ports: RegistrationPorts,
        config: &AdmissionConfig,
        tasks: Arc<TaskRegistry>,
        observer: Arc<dyn PipelineObserver>,
    ) -> Self {
        let catalog = RequirementCatalog::new(ports.requirements);
        let answers = AnswerWriter::new(catalog.clone(), Arc::clone(&ports.registrations));
        let lifecycle = RegistrationLifecycle::new(
            Arc::clone(&ports.registrations),
            Arc::clone(&observer),
            config.conflict_retry_limit,
        );
        let trigger = AssessmentTrigger::new(
            ports.assessor,
            tasks,
            Arc::clone(&observer),
            config.assessment_timeout,
        );

        Self {
            directory: ports.directory,
            documents: ports.documents,
            notifier: ports.notifier,
            registrations: ports.registrations,
            observer,
            catalog,
            evaluator: PreCheckEvaluator::new(),
            answers,
            lifecycle,
            trigger,
            request_timeout: config.request_timeout,
        }
    }

    /// Create a registration, or reactivate a cancelled one, for the calling participant.
    ///
    /// The synchronous part shares one deadline of the configured request timeout. Running out
    /// of time before the row is written yields `TimedOut`; running out while its answers are
    /// written yields `PersistenceFailed` carrying the row. The deferred assessment is never
    /// awaited here.
    pub async fn join(
        &self,
        identity: &Identity,
        request: JoinRequest,
    ) -> Result<JoinOutcome, AdmissionError> {
        let deadline = Instant::now() + self.request_timeout;

        let admitted = tokio::time::timeout_at(deadline, self.admit(identity, &request))
            .await
            .map_err(|_| AdmissionError::TimedOut(self.request_timeout))??;
        let Admitted {
            leg,
            profile,
            has_requirements,
            validated,
            outcome,
        } = admitted;
        let registration = outcome.registration;

        let writes = self.write_answers(&registration, &leg, validated, &request);
        let written = tokio::time::timeout_at(deadline, writes)
            .await
            .unwrap_or_else(|_| {
                Err(RepositoryError::Unavailable(format!(
                    "answer writes did not finish within {}ms",
                    self.request_timeout.as_millis()
                )))
            });
        if let Err(err) = written {
            self.observer.observe(&PipelineEvent::AnswerPersistenceFailed {
                registration_id: registration.id.clone(),
                error: err.to_string(),
            });
            return Err(AdmissionError::PersistenceFailed {
                message: "registration created but its answers could not be saved".to_string(),
                source: err,
                registration: Some(Box::new(registration)),
            });
        }

        let assessment_dispatched = self.trigger.maybe_trigger(
            &registration.id,
            leg.journey.auto_approval_enabled,
            has_requirements,
        );

        let owner_notified = if assessment_dispatched {
            false
        } else {
            self.notify_owner(&registration, &leg, &profile, deadline).await
        };

        let message = match (outcome.reactivated, assessment_dispatched) {
            (false, true) => "Registration submitted; automatic assessment in progress",
            (false, false) => "Registration submitted; awaiting owner review",
            (true, true) => "Registration reactivated; automatic assessment in progress",
            (true, false) => "Registration reactivated; awaiting owner review",
        }
        .to_string();

        Ok(JoinOutcome {
            registration,
            reactivated: outcome.reactivated,
            message,
            assessment_dispatched,
            owner_notified,
        })
    }

    /// Every stage up to and including the create-or-reactivate write.
    async fn admit(
        &self,
        identity: &Identity,
        request: &JoinRequest,
    ) -> Result<Admitted, AdmissionError> {
        if !identity.role.can_join_legs() {
            return Err(AdmissionError::Forbidden(
                "only crew members can register for legs".to_string(),
            ));
        }
        let participant_id = &identity.participant_id;

        let leg = self
            .directory
            .leg(&request.leg_id)
            .await
            .map_err(|err| AdmissionError::persistence("failed to load leg", err))?
            .ok_or_else(|| AdmissionError::NotFound {
                resource: "leg",
                id: request.leg_id.0.clone(),
            })?;
        let journey = &leg.journey;

        if journey.state != JourneyState::Published {
            return Err(AdmissionError::validation(
                ValidationCode::JourneyNotPublished,
                "journey is not accepting registrations",
                Some(json!({
                    "journey_id": journey.id.0,
                    "state": journey.state.label(),
                })),
            ));
        }

        let has_requirements = self
            .catalog
            .has_requirements(&journey.id)
            .await
            .map_err(|err| AdmissionError::persistence("failed to load requirements", err))?;

        let profile = self
            .directory
            .candidate_profile(participant_id)
            .await
            .map_err(|err| AdmissionError::persistence("failed to load profile", err))?
            .unwrap_or_else(|| CandidateProfile::empty(participant_id.clone()));

        let validated = if has_requirements {
            let requirements = self
                .catalog
                .load(&journey.id)
                .await
                .map_err(|err| AdmissionError::persistence("failed to load requirements", err))?;

            if let PreCheckResult::Failed(failure) =
                self.evaluator.evaluate(&profile, &journey.id, &requirements)
            {
                self.observer.observe(&PipelineEvent::PreCheckFailed {
                    participant_id: participant_id.clone(),
                    leg_id: leg.id.clone(),
                    fail_type: failure.fail_type.token(),
                    reason: failure.reason.clone(),
                });
                return Err(AdmissionError::EligibilityFailed(failure));
            }

            AnswerWriter::validate(&requirements, &request.answers).map_err(|err| {
                self.observer.observe(&PipelineEvent::AnswersRejected {
                    participant_id: participant_id.clone(),
                    leg_id: leg.id.clone(),
                    code: err.code(),
                });
                AdmissionError::from(err)
            })?
        } else {
            ValidatedAnswers::default()
        };

        if let Some(document_id) = &request.passport_document_id {
            let document = self
                .documents
                .passport_document(document_id)
                .await
                .map_err(|err| {
                    AdmissionError::persistence("failed to load passport document", err)
                })?
                .ok_or_else(|| AdmissionError::NotFound {
                    resource: "passport document",
                    id: document_id.0.clone(),
                })?;
            if &document.owner_id != participant_id {
                return Err(AdmissionError::Forbidden(
                    "passport document belongs to another user".to_string(),
                ));
            }
        }

        // Final await of the stage; no await follows a successful write.
        let outcome = self
            .lifecycle
            .create_or_reactivate(participant_id, &leg.id, request.notes.clone())
            .await?;

        Ok(Admitted {
            leg,
            profile,
            has_requirements,
            validated,
            outcome,
        })
    }

    async fn write_answers(
        &self,
        registration: &Registration,
        leg: &LegSummary,
        validated: ValidatedAnswers,
        request: &JoinRequest,
    ) -> Result<(), RepositoryError> {
        let written = self.answers.persist(&registration.id, validated).await?;
        if written > 0 {
            self.observer.observe(&PipelineEvent::AnswersPersisted {
                registration_id: registration.id.clone(),
                count: written,
            });
        }

        if let Some(document_id) = &request.passport_document_id {
            let linked = self
                .answers
                .persist_passport_answer(&registration.id, document_id, &leg.journey.id)
                .await?;
            if linked {
                self.observer.observe(&PipelineEvent::PassportLinked {
                    registration_id: registration.id.clone(),
                });
            }
        }
        Ok(())
    }

    async fn notify_owner(
        &self,
        registration: &Registration,
        leg: &LegSummary,
        profile: &CandidateProfile,
        deadline: Instant,
    ) -> bool {
        let notice = OwnerNotice {
            owner_id: leg.journey.owner_id.clone(),
            registration_id: registration.id.clone(),
            journey_id: leg.journey.id.clone(),
            journey_name: leg.journey.name.clone(),
            participant_display_name: profile.display_name.clone(),
            acting_participant_id: registration.participant_id.clone(),
        };

        let delivered = tokio::time::timeout_at(deadline, self.notifier.notify_owner(notice))
            .await
            .unwrap_or_else(|_| {
                Err(NotifyError::Transport(
                    "owner notice did not finish before the request deadline".to_string(),
                ))
            });

        match delivered {
            Ok(()) => {
                self.observer.observe(&PipelineEvent::OwnerNotified {
                    registration_id: registration.id.clone(),
                });
                true
            }
            Err(err) => {
                self.observer.observe(&PipelineEvent::OwnerNotificationFailed {
                    registration_id: registration.id.clone(),
                    error: err.to_string(),
                });
                false
            }
        }
    }

    /// The caller's registrations, newest first.
    pub async fn list(
        &self,
        identity: &Identity,
        filter: &RegistrationFilter,
    ) -> Result<Vec<Registration>, AdmissionError> {
        self.registrations
            .list_for_participant(&identity.participant_id, filter)
            .await
            .map_err(|err| AdmissionError::persistence("failed to list registrations", err))
    }

    /// Cancel one of the caller's registrations.
    pub async fn cancel(
        &self,
        identity: &Identity,
        registration_id: &RegistrationId,
    ) -> Result<Registration, AdmissionError> {
        self.lifecycle
            .cancel(&identity.participant_id, registration_id)
            .await
            .map_err(|err| match AdmissionError::from(err) {
                AdmissionError::Conflict { message, .. } => AdmissionError::Conflict {
                    message,
                    registration_id: Some(registration_id.clone()),
                },
                other => other,
            })
    }
}
