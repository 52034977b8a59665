use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::domain::{
    CandidateProfile, DocumentId, JourneyId, LegId, LegSummary, OwnerId, ParticipantId,
    PassportDocument, Registration, RegistrationAnswer, RegistrationFilter, RegistrationId,
    RegistrationStatus, Requirement, RequirementId,
};

/// Score fields the deferred assessment writes back onto its registration and answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssessmentWrite {
    pub match_percentage: u8,
    pub ai_match_score: f32,
    pub ai_match_reasoning: String,
    pub auto_approved: bool,
    pub answer_scores: Vec<AnswerScore>,
}

/// Per-answer verdicts written by the deferred assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerScore {
    pub requirement_id: RequirementId,
    pub ai_score: Option<f32>,
    pub passed: Option<bool>,
    pub photo_verification_passed: Option<bool>,
    pub photo_confidence_score: Option<f32>,
}

/// Result of a reactivation, including how many stale answers were discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct Reactivated {
    pub registration: Registration,
    pub cleared_answers: usize,
}

/// Durable store for registrations and their answers.
///
/// Implementations must make `insert` and `reactivate` atomic check-then-act operations: two
/// racing inserts for the same participant and leg resolve to one row and one `Conflict`.
#[async_trait]
pub trait RegistrationRepository: Send + Sync {
    async fn find_for_leg(
        &self,
        participant_id: &ParticipantId,
        leg_id: &LegId,
    ) -> Result<Option<Registration>, RepositoryError>;

    async fn fetch(&self, id: &RegistrationId) -> Result<Option<Registration>, RepositoryError>;

    /// Fails with `Conflict` when a row already exists for the same participant and leg.
    async fn insert(&self, registration: Registration) -> Result<Registration, RepositoryError>;

    /// Reset a cancelled registration to pending and drop its answers in one unit.
    /// Fails with `Conflict` when the stored status is no longer `Cancelled`.
    async fn reactivate(
        &self,
        id: &RegistrationId,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Reactivated, RepositoryError>;

    /// Compare-and-set status change; `Conflict` when the stored status differs from `expected`.
    async fn transition(
        &self,
        id: &RegistrationId,
        expected: RegistrationStatus,
        next: RegistrationStatus,
        now: DateTime<Utc>,
    ) -> Result<Registration, RepositoryError>;

    /// Write registration and answer scores in one unit; an auto-approved registration becomes
    /// `Approved`. Fails with `Conflict`, writing nothing, unless the registration is still
    /// `PendingApproval`.
    async fn record_assessment(
        &self,
        id: &RegistrationId,
        assessment: AssessmentWrite,
        now: DateTime<Utc>,
    ) -> Result<Registration, RepositoryError>;

    async fn list_for_participant(
        &self,
        participant_id: &ParticipantId,
        filter: &RegistrationFilter,
    ) -> Result<Vec<Registration>, RepositoryError>;

    /// Batch write; either every answer is stored or none is.
    async fn insert_answers(&self, answers: Vec<RegistrationAnswer>)
        -> Result<(), RepositoryError>;

    async fn answers_for(
        &self,
        id: &RegistrationId,
    ) -> Result<Vec<RegistrationAnswer>, RepositoryError>;
}

/// Read-only requirement storage backing the catalog.
#[async_trait]
pub trait RequirementSource: Send + Sync {
    async fn requirements_for(
        &self,
        journey_id: &JourneyId,
    ) -> Result<Vec<Requirement>, RepositoryError>;

    async fn count_for(&self, journey_id: &JourneyId) -> Result<usize, RepositoryError>;
}

/// Read-only access to legs, journeys, and crew profiles.
#[async_trait]
pub trait JourneyDirectory: Send + Sync {
    async fn leg(&self, leg_id: &LegId) -> Result<Option<LegSummary>, RepositoryError>;

    async fn candidate_profile(
        &self,
        participant_id: &ParticipantId,
    ) -> Result<Option<CandidateProfile>, RepositoryError>;
}

/// Lookup for externally stored passport documents.
#[async_trait]
pub trait DocumentVault: Send + Sync {
    async fn passport_document(
        &self,
        id: &DocumentId,
    ) -> Result<Option<PassportDocument>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Outbound hook telling a journey owner a registration awaits review.
#[async_trait]
pub trait OwnerNotifier: Send + Sync {
    async fn notify_owner(&self, notice: OwnerNotice) -> Result<(), NotifyError>;
}

/// Payload handed to the notification transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerNotice {
    pub owner_id: OwnerId,
    pub registration_id: RegistrationId,
    pub journey_id: JourneyId,
    pub journey_name: String,
    pub participant_display_name: String,
    pub acting_participant_id: ParticipantId,
}

/// Notification dispatch error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
