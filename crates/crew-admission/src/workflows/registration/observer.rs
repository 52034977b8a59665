//! Side channel for pipeline progress.
//!
//! Components report what happened as [`PipelineEvent`]s instead of logging inline, so the
//! control flow stays testable without asserting on log output. [`TracingObserver`] is the
//! production sink.

use tracing::{debug, error, info, warn};

use super::domain::{LegId, ParticipantId, RegistrationId};

#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    PreCheckFailed {
        participant_id: ParticipantId,
        leg_id: LegId,
        fail_type: &'static str,
        reason: String,
    },
    AnswersRejected {
        participant_id: ParticipantId,
        leg_id: LegId,
        code: &'static str,
    },
    DuplicateRejected {
        participant_id: ParticipantId,
        leg_id: LegId,
        existing: RegistrationId,
    },
    ConflictRetried {
        participant_id: ParticipantId,
        leg_id: LegId,
        attempt: u8,
    },
    RegistrationCreated {
        registration_id: RegistrationId,
        reactivated: bool,
    },
    AnswersPersisted {
        registration_id: RegistrationId,
        count: usize,
    },
    AnswersCleared {
        registration_id: RegistrationId,
        count: usize,
    },
    AnswerPersistenceFailed {
        registration_id: RegistrationId,
        error: String,
    },
    PassportLinked {
        registration_id: RegistrationId,
    },
    AssessmentDispatched {
        registration_id: RegistrationId,
    },
    AssessmentSkipped {
        registration_id: RegistrationId,
        auto_approval_enabled: bool,
        has_requirements: bool,
    },
    AssessmentCompleted {
        registration_id: RegistrationId,
    },
    AssessmentFailed {
        registration_id: RegistrationId,
        error: String,
    },
    AssessmentTimedOut {
        registration_id: RegistrationId,
        timeout_ms: u128,
    },
    AssessmentScored {
        registration_id: RegistrationId,
        match_percentage: u8,
        auto_approved: bool,
    },
    OwnerNotified {
        registration_id: RegistrationId,
    },
    OwnerNotificationFailed {
        registration_id: RegistrationId,
        error: String,
    },
    RegistrationCancelled {
        registration_id: RegistrationId,
    },
}

/// Receiver for pipeline events. Implementations must not block.
pub trait PipelineObserver: Send + Sync {
    fn observe(&self, event: &PipelineEvent);
}

/// Observer that emits structured `tracing` events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PipelineObserver for TracingObserver {
    fn observe(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::PreCheckFailed {
                participant_id,
                leg_id,
                fail_type,
                reason,
            } => warn!(
                participant = %participant_id.0,
                leg = %leg_id.0,
                fail_type,
                reason = %reason,
                "eligibility pre-check failed"
            ),
            PipelineEvent::AnswersRejected {
                participant_id,
                leg_id,
                code,
            } => warn!(
                participant = %participant_id.0,
                leg = %leg_id.0,
                code,
                "submitted answers rejected"
            ),
            PipelineEvent::DuplicateRejected {
                participant_id,
                leg_id,
                existing,
            } => warn!(
                participant = %participant_id.0,
                leg = %leg_id.0,
                existing = %existing.0,
                "duplicate registration rejected"
            ),
            PipelineEvent::ConflictRetried {
                participant_id,
                leg_id,
                attempt,
            } => debug!(
                participant = %participant_id.0,
                leg = %leg_id.0,
                attempt,
                "store conflict, re-reading registration"
            ),
            PipelineEvent::RegistrationCreated {
                registration_id,
                reactivated,
            } => info!(
                registration = %registration_id.0,
                reactivated,
                "registration stored"
            ),
            PipelineEvent::AnswersPersisted {
                registration_id,
                count,
            } => info!(registration = %registration_id.0, count, "answers persisted"),
            PipelineEvent::AnswersCleared {
                registration_id,
                count,
            } => info!(
                registration = %registration_id.0,
                count,
                "stale answers cleared on reactivation"
            ),
            PipelineEvent::AnswerPersistenceFailed {
                registration_id,
                error,
            } => error!(
                registration = %registration_id.0,
                error = %error,
                "registration stored but answers were not"
            ),
            PipelineEvent::PassportLinked { registration_id } => {
                info!(registration = %registration_id.0, "passport document linked")
            }
            PipelineEvent::AssessmentDispatched { registration_id } => {
                info!(registration = %registration_id.0, "deferred assessment dispatched")
            }
            PipelineEvent::AssessmentSkipped {
                registration_id,
                auto_approval_enabled,
                has_requirements,
            } => debug!(
                registration = %registration_id.0,
                auto_approval_enabled,
                has_requirements,
                "deferred assessment not needed"
            ),
            PipelineEvent::AssessmentCompleted { registration_id } => {
                info!(registration = %registration_id.0, "deferred assessment finished")
            }
            PipelineEvent::AssessmentFailed {
                registration_id,
                error,
            } => error!(
                registration = %registration_id.0,
                error = %error,
                "deferred assessment failed"
            ),
            PipelineEvent::AssessmentTimedOut {
                registration_id,
                timeout_ms,
            } => error!(
                registration = %registration_id.0,
                timeout_ms = *timeout_ms as u64,
                "deferred assessment timed out"
            ),
            PipelineEvent::AssessmentScored {
                registration_id,
                match_percentage,
                auto_approved,
            } => info!(
                registration = %registration_id.0,
                match_percentage,
                auto_approved,
                "assessment written back"
            ),
            PipelineEvent::OwnerNotified { registration_id } => {
                info!(registration = %registration_id.0, "owner notified for review")
            }
            PipelineEvent::OwnerNotificationFailed {
                registration_id,
                error,
            } => warn!(
                registration = %registration_id.0,
                error = %error,
                "owner notification failed"
            ),
            PipelineEvent::RegistrationCancelled { registration_id } => {
                info!(registration = %registration_id.0, "registration cancelled")
            }
        }
    }
}
