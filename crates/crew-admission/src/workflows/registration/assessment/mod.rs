//! Deferred assessment: the trigger gate, the supervised task registry, and the bundled
//! rubric assessor.

mod rubric;

pub use rubric::{RubricAssessor, ScoreComponent, ScoreSheet};

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinSet;

use super::domain::RegistrationId;
use super::observer::{PipelineEvent, PipelineObserver};
use super::repository::RepositoryError;

/// Scores a registration and, depending on its policy, approves it.
#[async_trait]
pub trait Assessor: Send + Sync {
    async fn assess_and_maybe_approve(
        &self,
        registration_id: &RegistrationId,
    ) -> Result<(), AssessmentError>;
}

#[derive(Debug, thiserror::Error)]
pub enum AssessmentError {
    #[error("registration {0} not found")]
    RegistrationNotFound(RegistrationId),
    #[error("registration {0} left pending approval before it was scored")]
    NoLongerPending(RegistrationId),
    #[error("leg for registration {0} no longer exists")]
    LegMissing(RegistrationId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("scoring failed: {0}")]
    Scoring(String),
}

/// Tracks background tasks so shutdown can wait for them.
///
/// Tasks keep running after the request that spawned them has answered; [`TaskRegistry::drain`]
/// is the completion point. Dropping the registry aborts whatever is still registered.
#[derive(Default)]
pub struct TaskRegistry {
    tasks: Mutex<JoinSet<()>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task. Must be called from within a tokio runtime.
    pub fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut tasks = self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        while tasks.try_join_next().is_some() {}
        tasks.spawn(task);
    }

    /// Registered tasks not yet reaped, finished or not.
    pub fn in_flight(&self) -> usize {
        self.tasks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Wait until every registered task, including ones spawned while draining, has finished.
    /// Returns how many tasks were awaited.
    pub async fn drain(&self) -> usize {
        let mut drained = 0;
        loop {
            let mut batch = {
                let mut tasks = self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                std::mem::take(&mut *tasks)
            };
            if batch.is_empty() {
                return drained;
            }
            while let Some(joined) = batch.join_next().await {
                drained += 1;
                if let Err(err) = joined {
                    if err.is_panic() {
                        tracing::error!(error = %err, "background task panicked");
                    }
                }
            }
        }
    }
}

/// Gate and launcher for the deferred assessment.
///
/// Fires only when the journey has auto-approval enabled and at least one requirement. Runs
/// for the same registration are serialised; each run is bounded by `timeout` and its failure
/// is reported to the observer, never to the caller.
#[derive(Clone)]
pub struct AssessmentTrigger {
    assessor: Arc<dyn Assessor>,
    tasks: Arc<TaskRegistry>,
    observer: Arc<dyn PipelineObserver>,
    timeout: Duration,
    running: Arc<Mutex<HashMap<RegistrationId, Arc<tokio::sync::Mutex<()>>>>>,
}

impl AssessmentTrigger {
    pub fn new(
        assessor: Arc<dyn Assessor>,
        tasks: Arc<TaskRegistry>,
        observer: Arc<dyn PipelineObserver>,
        timeout: Duration,
    ) -> Self {
        Self {
            assessor,
            tasks,
            observer,
            timeout,
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub const fn should_fire(auto_approval_enabled: bool, has_requirements: bool) -> bool {
        auto_approval_enabled && has_requirements
    }

    /// Launch the assessment without awaiting it. Returns whether a task was registered.
    pub fn maybe_trigger(
        &self,
        registration_id: &RegistrationId,
        auto_approval_enabled: bool,
        has_requirements: bool,
    ) -> bool {
        if !Self::should_fire(auto_approval_enabled, has_requirements) {
            self.observer.observe(&PipelineEvent::AssessmentSkipped {
                registration_id: registration_id.clone(),
                auto_approval_enabled,
                has_requirements,
            });
            return false;
        }

        let slot = self.slot_for(registration_id);
        let assessor = Arc::clone(&self.assessor);
        let observer = Arc::clone(&self.observer);
        let running = Arc::clone(&self.running);
        let timeout = self.timeout;
        let id = registration_id.clone();

        self.tasks.spawn(async move {
            {
                let _turn = slot.lock().await;
                let event = match tokio::time::timeout(
                    timeout,
                    assessor.assess_and_maybe_approve(&id),
                )
                .await
                {
                    Ok(Ok(())) => PipelineEvent::AssessmentCompleted {
                        registration_id: id.clone(),
                    },
                    Ok(Err(err)) => PipelineEvent::AssessmentFailed {
                        registration_id: id.clone(),
                        error: err.to_string(),
                    },
                    Err(_) => PipelineEvent::AssessmentTimedOut {
                        registration_id: id.clone(),
                        timeout_ms: timeout.as_millis(),
                    },
                };
                observer.observe(&event);
            }
            release_slot(&running, &id, &slot);
        });

        self.observer.observe(&PipelineEvent::AssessmentDispatched {
            registration_id: registration_id.clone(),
        });
        true
    }

    fn slot_for(&self, registration_id: &RegistrationId) -> Arc<tokio::sync::Mutex<()>> {
        let mut running = self
            .running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(
            running
                .entry(registration_id.clone())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }
}

fn release_slot(
    running: &Mutex<HashMap<RegistrationId, Arc<tokio::sync::Mutex<()>>>>,
    registration_id: &RegistrationId,
    slot: &Arc<tokio::sync::Mutex<()>>,
) {
    let mut running = running
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    // Map entry plus our handle: nobody else is queued for this registration.
    if Arc::strong_count(slot) <= 2 {
        running.remove(registration_id);
    }
}
