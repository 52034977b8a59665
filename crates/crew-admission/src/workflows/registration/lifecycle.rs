use std::sync::Arc;

use chrono::Utc;

use super::domain::{LegId, ParticipantId, Registration, RegistrationId, RegistrationStatus};
use super::observer::{PipelineEvent, PipelineObserver};
use super::repository::{RegistrationRepository, RepositoryError};

/// Outcome of a successful create-or-reactivate.
#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleOutcome {
    pub registration: Registration,
    pub reactivated: bool,
}

/// Errors raised by the registration state machine.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("participant already holds registration {existing} ({})", .status.label())]
    Duplicate {
        existing: RegistrationId,
        status: RegistrationStatus,
    },
    #[error("registration {0} not found")]
    NotFound(RegistrationId),
    #[error("registration cannot move from {} to {}", .from.label(), .to.label())]
    InvalidTransition {
        from: RegistrationStatus,
        to: RegistrationStatus,
    },
    #[error("registration store kept conflicting after {attempts} attempts")]
    Contended { attempts: u8 },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Owns the registration state machine:
///
/// - no prior row -> `PendingApproval`
/// - `Cancelled` -> `PendingApproval` (reactivation, clean slate)
/// - anything else -> duplicate, no transition
///
/// Check-then-act races are resolved by the store's atomic insert and compare-and-set
/// reactivation; a conflict re-reads the row and decides again, up to `retry_limit` times.
#[derive(Clone)]
pub struct RegistrationLifecycle {
    repository: Arc<dyn RegistrationRepository>,
    observer: Arc<dyn PipelineObserver>,
    retry_limit: u8,
}

impl RegistrationLifecycle {
    pub fn new(
        repository: Arc<dyn RegistrationRepository>,
        observer: Arc<dyn PipelineObserver>,
        retry_limit: u8,
    ) -> Self {
        Self {
            repository,
            observer,
            retry_limit,
        }
    }

    pub async fn create_or_reactivate(
        &self,
        participant_id: &ParticipantId,
        leg_id: &LegId,
        notes: Option<String>,
    ) -> Result<LifecycleOutcome, LifecycleError> {
        let mut attempt: u8 = 0;
        loop {
            let existing = self.repository.find_for_leg(participant_id, leg_id).await?;
            let result = match existing {
                None => {
                    let fresh = Registration::pending(
                        participant_id.clone(),
                        leg_id.clone(),
                        notes.clone(),
                        Utc::now(),
                    );
                    self.repository
                        .insert(fresh)
                        .await
                        .map(|registration| LifecycleOutcome {
                            registration,
                            reactivated: false,
                        })
                }
                Some(previous) if previous.status == RegistrationStatus::Cancelled => self
                    .repository
                    .reactivate(&previous.id, notes.clone(), Utc::now())
                    .await
                    .map(|reactivated| {
                        if reactivated.cleared_answers > 0 {
                            self.observer.observe(&PipelineEvent::AnswersCleared {
                                registration_id: reactivated.registration.id.clone(),
                                count: reactivated.cleared_answers,
                            });
                        }
                        LifecycleOutcome {
                            registration: reactivated.registration,
                            reactivated: true,
                        }
                    }),
                Some(current) => {
                    self.observer.observe(&PipelineEvent::DuplicateRejected {
                        participant_id: participant_id.clone(),
                        leg_id: leg_id.clone(),
                        existing: current.id.clone(),
                    });
                    return Err(LifecycleError::Duplicate {
                        existing: current.id,
                        status: current.status,
                    });
                }
            };

            match result {
                Ok(outcome) => {
                    self.observer.observe(&PipelineEvent::RegistrationCreated {
                        registration_id: outcome.registration.id.clone(),
                        reactivated: outcome.reactivated,
                    });
                    return Ok(outcome);
                }
                Err(RepositoryError::Conflict) if attempt < self.retry_limit => {
                    attempt += 1;
                    self.observer.observe(&PipelineEvent::ConflictRetried {
                        participant_id: participant_id.clone(),
                        leg_id: leg_id.clone(),
                        attempt,
                    });
                }
                Err(RepositoryError::Conflict) => {
                    return Err(LifecycleError::Contended {
                        attempts: attempt.saturating_add(1),
                    })
                }
                Err(other) => return Err(other.into()),
            }
        }
    }

    /// Participant-initiated cancellation from `PendingApproval` or `Approved`.
    ///
    /// Registrations owned by someone else are reported as not found.
    pub async fn cancel(
        &self,
        participant_id: &ParticipantId,
        registration_id: &RegistrationId,
    ) -> Result<Registration, LifecycleError> {
        let current = self
            .repository
            .fetch(registration_id)
            .await?
            .filter(|registration| &registration.participant_id == participant_id)
            .ok_or_else(|| LifecycleError::NotFound(registration_id.clone()))?;

        match current.status {
            RegistrationStatus::PendingApproval | RegistrationStatus::Approved => {}
            from => {
                return Err(LifecycleError::InvalidTransition {
                    from,
                    to: RegistrationStatus::Cancelled,
                })
            }
        }

        let cancelled = self
            .repository
            .transition(
                registration_id,
                current.status,
                RegistrationStatus::Cancelled,
                Utc::now(),
            )
            .await
            .map_err(|err| match err {
                // Status moved underneath us, e.g. the owner rejected meanwhile.
                RepositoryError::Conflict => LifecycleError::InvalidTransition {
                    from: current.status,
                    to: RegistrationStatus::Cancelled,
                },
                other => other.into(),
            })?;

        self.observer.observe(&PipelineEvent::RegistrationCancelled {
            registration_id: cancelled.id.clone(),
        });
        Ok(cancelled)
    }
}
