//! Crew registration for journey legs.
//!
//! A join request walks a fixed pipeline: requirement catalog, profile pre-checks, answer
//! validation, the create-or-reactivate state machine, answer writes, then either a deferred
//! assessment or an owner notice. Storage, notification, and scoring sit behind the ports in
//! [`repository`] and [`assessment`]; [`memory`] provides in-process adapters.

pub mod answers;
pub mod assessment;
pub mod catalog;
pub mod domain;
pub mod lifecycle;
pub mod memory;
pub mod observer;
pub mod prechecks;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use answers::{AnswerValidationError, AnswerWriteError, AnswerWriter, ValidatedAnswers};
pub use assessment::{
    AssessmentError, AssessmentTrigger, Assessor, RubricAssessor, ScoreComponent, ScoreSheet,
    TaskRegistry,
};
pub use catalog::RequirementCatalog;
pub use domain::{
    AnswerSubmission, CandidateProfile, DocumentId, ExperienceLevel, Identity, JoinRequest,
    JourneyId, JourneyState, JourneySummary, LegId, LegSummary, OwnerId, ParticipantId,
    ParticipantRole, PassportDocument, Registration, RegistrationAnswer, RegistrationFilter,
    RegistrationId, RegistrationStatus, Requirement, RequirementId, RequirementKind, RiskLevel,
};
pub use lifecycle::{LifecycleError, LifecycleOutcome, RegistrationLifecycle};
pub use memory::{InMemoryNotifier, InMemoryStore};
pub use observer::{PipelineEvent, PipelineObserver, TracingObserver};
pub use prechecks::{PreCheckEvaluator, PreCheckFailType, PreCheckFailure, PreCheckResult};
pub use repository::{
    AnswerScore, AssessmentWrite, DocumentVault, JourneyDirectory, NotifyError, OwnerNotice,
    OwnerNotifier, Reactivated, RegistrationRepository, RepositoryError, RequirementSource,
};
pub use router::{registration_router, PARTICIPANT_ID_HEADER, PARTICIPANT_ROLE_HEADER};
pub use service::{
    AdmissionError, JoinOutcome, RegistrationPorts, RegistrationService, ValidationCode,
};
