use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tokio::sync::Notify;

use crate::config::AdmissionConfig;
use crate::workflows::registration::domain::{
    AnswerSubmission, CandidateProfile, DocumentId, ExperienceLevel, Identity, JoinRequest,
    JourneyId, JourneyState, JourneySummary, LegId, LegSummary, OwnerId, ParticipantId,
    ParticipantRole, PassportDocument, Registration, RegistrationAnswer, RegistrationFilter,
    RegistrationId, RegistrationStatus, Requirement, RequirementId, RequirementKind, RiskLevel,
};
use crate::workflows::registration::repository::{
    AssessmentWrite, NotifyError, OwnerNotice, OwnerNotifier, Reactivated,
    RegistrationRepository, RepositoryError,
};
use crate::workflows::registration::{
    AssessmentError, Assessor, InMemoryNotifier, InMemoryStore, PipelineEvent, PipelineObserver,
    RegistrationPorts, RegistrationService, RequirementCatalog, RubricAssessor, TaskRegistry,
};

pub(super) const JOURNEY: &str = "journey-atlantic";
pub(super) const LEG: &str = "leg-lisbon-madeira";
pub(super) const CREW: &str = "crew-ana";
pub(super) const OTHER_CREW: &str = "crew-joao";
pub(super) const OWNER: &str = "owner-ben";

pub(super) const REQ_RISK: &str = "req-risk";
pub(super) const REQ_EXPERIENCE: &str = "req-experience";
pub(super) const REQ_SKILL: &str = "req-skill";
pub(super) const REQ_MOTIVATION: &str = "req-motivation";
pub(super) const REQ_DIET: &str = "req-diet";
pub(super) const REQ_PASSPORT: &str = "req-passport";

pub(super) fn journey_id() -> JourneyId {
    JourneyId(JOURNEY.to_string())
}

pub(super) fn leg_id() -> LegId {
    LegId(LEG.to_string())
}

pub(super) fn crew_id() -> ParticipantId {
    ParticipantId(CREW.to_string())
}

pub(super) fn crew() -> Identity {
    Identity {
        participant_id: crew_id(),
        role: ParticipantRole::Crew,
    }
}

pub(super) fn other_crew() -> Identity {
    Identity {
        participant_id: ParticipantId(OTHER_CREW.to_string()),
        role: ParticipantRole::Crew,
    }
}

pub(super) fn timestamp(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, day, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn leg(state: JourneyState, auto_approval_enabled: bool) -> LegSummary {
    LegSummary {
        id: leg_id(),
        name: "Lisbon to Madeira".to_string(),
        journey: JourneySummary {
            id: journey_id(),
            name: "Atlantic Crossing".to_string(),
            state,
            owner_id: OwnerId(OWNER.to_string()),
            auto_approval_enabled,
        },
    }
}

pub(super) fn requirement(
    id: &str,
    kind: RequirementKind,
    is_required: bool,
    order: i32,
) -> Requirement {
    Requirement {
        id: RequirementId(id.to_string()),
        journey_id: journey_id(),
        kind,
        is_required,
        order,
    }
}

/// Offshore risk, competent-crew minimum, an optional navigation skill, a required and an
/// optional question, and an optional passport.
pub(super) fn standard_requirements() -> Vec<Requirement> {
    vec![
        requirement(
            REQ_RISK,
            RequirementKind::RiskLevel {
                required_level: RiskLevel::OffshoreSailing,
            },
            true,
            1,
        ),
        requirement(
            REQ_EXPERIENCE,
            RequirementKind::ExperienceLevel {
                minimum_level: ExperienceLevel::CompetentCrew,
            },
            true,
            2,
        ),
        requirement(
            REQ_SKILL,
            RequirementKind::Skill {
                skill_name: "navigation".to_string(),
            },
            false,
            3,
        ),
        requirement(
            REQ_MOTIVATION,
            RequirementKind::Question {
                question_text: "Why do you want to sail this leg?".to_string(),
            },
            true,
            4,
        ),
        requirement(
            REQ_DIET,
            RequirementKind::Question {
                question_text: "Any dietary restrictions?".to_string(),
            },
            false,
            5,
        ),
        requirement(
            REQ_PASSPORT,
            RequirementKind::Passport {
                require_photo_validation: false,
            },
            false,
            6,
        ),
    ]
}

pub(super) fn qualified_profile() -> CandidateProfile {
    CandidateProfile {
        participant_id: crew_id(),
        display_name: "Ana".to_string(),
        risk_levels: vec![RiskLevel::CoastalSailing, RiskLevel::OffshoreSailing],
        experience_level: Some(ExperienceLevel::CoastalSkipper),
        skills: vec!["Navigation".to_string(), "first aid".to_string()],
    }
}

pub(super) fn answer(requirement_id: &str, text: &str) -> AnswerSubmission {
    AnswerSubmission {
        requirement_id: RequirementId(requirement_id.to_string()),
        answer_text: Some(text.to_string()),
        answer_json: None,
    }
}

pub(super) fn join_request(answers: Vec<AnswerSubmission>) -> JoinRequest {
    JoinRequest {
        leg_id: leg_id(),
        notes: Some("Happy to cook".to_string()),
        answers,
        passport_document_id: None,
    }
}

pub(super) fn complete_request() -> JoinRequest {
    join_request(vec![
        answer(REQ_MOTIVATION, "  Building ocean miles  "),
        answer(REQ_DIET, "vegetarian"),
    ])
}

pub(super) fn passport(id: &str, owner: &str) -> PassportDocument {
    PassportDocument {
        id: DocumentId(id.to_string()),
        owner_id: ParticipantId(owner.to_string()),
        storage_key: format!("documents/{owner}/{id}.pdf"),
    }
}

/// Store holding one leg of the Atlantic journey, its standard requirements, and Ana's profile.
pub(super) fn seeded_store(state: JourneyState, auto_approval_enabled: bool) -> InMemoryStore {
    let store = InMemoryStore::default();
    store.add_leg(leg(state, auto_approval_enabled));
    for requirement in standard_requirements() {
        store.add_requirement(requirement);
    }
    store.add_profile(qualified_profile());
    store
}

/// Same leg with no requirements at all.
pub(super) fn bare_store(auto_approval_enabled: bool) -> InMemoryStore {
    let store = InMemoryStore::default();
    store.add_leg(leg(JourneyState::Published, auto_approval_enabled));
    store.add_profile(qualified_profile());
    store
}

pub(super) fn stored_registration(status: RegistrationStatus, day: u32) -> Registration {
    let mut registration =
        Registration::pending(crew_id(), leg_id(), Some("old notes".to_string()), timestamp(day));
    registration.status = status;
    registration
}

#[derive(Default)]
pub(super) struct RecordingObserver {
    events: Mutex<Vec<PipelineEvent>>,
}

impl RecordingObserver {
    pub(super) fn events(&self) -> Vec<PipelineEvent> {
        self.events.lock().expect("observer mutex poisoned").clone()
    }

    pub(super) fn count(&self, predicate: impl Fn(&PipelineEvent) -> bool) -> usize {
        self.events().iter().filter(|event| predicate(event)).count()
    }
}

impl PipelineObserver for RecordingObserver {
    fn observe(&self, event: &PipelineEvent) {
        self.events
            .lock()
            .expect("observer mutex poisoned")
            .push(event.clone());
    }
}

#[derive(Default)]
pub(super) struct HarnessOptions {
    pub(super) registrations: Option<Arc<dyn RegistrationRepository>>,
    pub(super) assessor: Option<Arc<dyn Assessor>>,
    pub(super) notifier: Option<Arc<dyn OwnerNotifier>>,
    pub(super) config: AdmissionConfig,
}

pub(super) struct Harness {
    pub(super) store: InMemoryStore,
    pub(super) notifier: InMemoryNotifier,
    pub(super) observer: Arc<RecordingObserver>,
    pub(super) tasks: Arc<TaskRegistry>,
    pub(super) service: Arc<RegistrationService>,
}

impl Harness {
    pub(super) fn registrations(&self) -> Vec<Registration> {
        self.store.registrations()
    }

    pub(super) async fn answers_for(&self, id: &RegistrationId) -> Vec<RegistrationAnswer> {
        self.store.answers_for(id).await.expect("answers readable")
    }

    pub(super) async fn fetch(&self, id: &RegistrationId) -> Registration {
        self.store
            .fetch(id)
            .await
            .expect("store readable")
            .expect("registration present")
    }
}

pub(super) fn harness(store: InMemoryStore) -> Harness {
    harness_with(store, HarnessOptions::default())
}

pub(super) fn harness_with(store: InMemoryStore, options: HarnessOptions) -> Harness {
    let observer = Arc::new(RecordingObserver::default());
    let tasks = Arc::new(TaskRegistry::new());
    let notifier = InMemoryNotifier::default();

    let registrations: Arc<dyn RegistrationRepository> = match options.registrations {
        Some(registrations) => registrations,
        None => Arc::new(store.clone()),
    };
    let assessor: Arc<dyn Assessor> = match options.assessor {
        Some(assessor) => assessor,
        None => Arc::new(RubricAssessor::new(
            Arc::clone(&registrations),
            Arc::new(store.clone()),
            RequirementCatalog::new(Arc::new(store.clone())),
            observer.clone(),
            options.config.auto_approve_threshold,
        )),
    };
    let notifier_port: Arc<dyn OwnerNotifier> = match options.notifier {
        Some(notifier) => notifier,
        None => Arc::new(notifier.clone()),
    };

    let ports = RegistrationPorts {
        registrations,
        requirements: Arc::new(store.clone()),
        directory: Arc::new(store.clone()),
        documents: Arc::new(store.clone()),
        notifier: notifier_port,
        assessor,
    };
    let service = Arc::new(RegistrationService::new(
        ports,
        &options.config,
        Arc::clone(&tasks),
        observer.clone(),
    ));

    Harness {
        store,
        notifier,
        observer,
        tasks,
        service,
    }
}

pub(super) fn fast_config() -> AdmissionConfig {
    AdmissionConfig {
        request_timeout: Duration::from_millis(200),
        assessment_timeout: Duration::from_millis(50),
        ..AdmissionConfig::default()
    }
}

/// Assessor that blocks until released and counts invocations.
#[derive(Default)]
pub(super) struct GatedAssessor {
    pub(super) gate: Notify,
    calls: AtomicUsize,
    finished: AtomicUsize,
}

impl GatedAssessor {
    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(super) fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Assessor for GatedAssessor {
    async fn assess_and_maybe_approve(
        &self,
        _registration_id: &RegistrationId,
    ) -> Result<(), AssessmentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.gate.notified().await;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(super) struct FailingAssessor;

#[async_trait]
impl Assessor for FailingAssessor {
    async fn assess_and_maybe_approve(
        &self,
        _registration_id: &RegistrationId,
    ) -> Result<(), AssessmentError> {
        Err(AssessmentError::Scoring("model endpoint returned 502".to_string()))
    }
}

pub(super) struct SlowAssessor(pub(super) Duration);

#[async_trait]
impl Assessor for SlowAssessor {
    async fn assess_and_maybe_approve(
        &self,
        _registration_id: &RegistrationId,
    ) -> Result<(), AssessmentError> {
        tokio::time::sleep(self.0).await;
        Ok(())
    }
}

/// Tracks how many runs overlap.
#[derive(Default)]
pub(super) struct OverlapProbe {
    current: AtomicUsize,
    peak: AtomicUsize,
    runs: AtomicUsize,
}

impl OverlapProbe {
    pub(super) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub(super) fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Assessor for OverlapProbe {
    async fn assess_and_maybe_approve(
        &self,
        _registration_id: &RegistrationId,
    ) -> Result<(), AssessmentError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(super) struct FailingNotifier;

#[async_trait]
impl OwnerNotifier for FailingNotifier {
    async fn notify_owner(&self, _notice: OwnerNotice) -> Result<(), NotifyError> {
        Err(NotifyError::Transport("smtp relay refused".to_string()))
    }
}

/// Registration store wrapper that injects stale reads, conflicts, delays, and write failures.
pub(super) struct ScriptedRepository {
    pub(super) inner: InMemoryStore,
    stale_reads: AtomicUsize,
    always_conflict: bool,
    fail_answers: bool,
    read_delay: Option<Duration>,
    answer_delay: Option<Duration>,
}

impl ScriptedRepository {
    pub(super) fn new(inner: InMemoryStore) -> Self {
        Self {
            inner,
            stale_reads: AtomicUsize::new(0),
            always_conflict: false,
            fail_answers: false,
            read_delay: None,
            answer_delay: None,
        }
    }

    /// The next `count` lookups report no existing registration.
    pub(super) fn with_stale_reads(self, count: usize) -> Self {
        self.stale_reads.store(count, Ordering::SeqCst);
        self
    }

    pub(super) fn always_conflicting(mut self) -> Self {
        self.always_conflict = true;
        self
    }

    pub(super) fn failing_answers(mut self) -> Self {
        self.fail_answers = true;
        self
    }

    pub(super) fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = Some(delay);
        self
    }

    pub(super) fn with_answer_delay(mut self, delay: Duration) -> Self {
        self.answer_delay = Some(delay);
        self
    }
}

#[async_trait]
impl RegistrationRepository for ScriptedRepository {
    async fn find_for_leg(
        &self,
        participant_id: &ParticipantId,
        leg_id: &LegId,
    ) -> Result<Option<Registration>, RepositoryError> {
        if let Some(delay) = self.read_delay {
            tokio::time::sleep(delay).await;
        }
        if self.always_conflict {
            return Ok(None);
        }
        let stale = self
            .stale_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if stale {
            return Ok(None);
        }
        self.inner.find_for_leg(participant_id, leg_id).await
    }

    async fn fetch(&self, id: &RegistrationId) -> Result<Option<Registration>, RepositoryError> {
        self.inner.fetch(id).await
    }

    async fn insert(&self, registration: Registration) -> Result<Registration, RepositoryError> {
        if self.always_conflict {
            return Err(RepositoryError::Conflict);
        }
        self.inner.insert(registration).await
    }

    async fn reactivate(
        &self,
        id: &RegistrationId,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Reactivated, RepositoryError> {
        self.inner.reactivate(id, notes, now).await
    }

    async fn transition(
        &self,
        id: &RegistrationId,
        expected: RegistrationStatus,
        next: RegistrationStatus,
        now: DateTime<Utc>,
    ) -> Result<Registration, RepositoryError> {
        self.inner.transition(id, expected, next, now).await
    }

    async fn record_assessment(
        &self,
        id: &RegistrationId,
        assessment: AssessmentWrite,
        now: DateTime<Utc>,
    ) -> Result<Registration, RepositoryError> {
        self.inner.record_assessment(id, assessment, now).await
    }

    async fn list_for_participant(
        &self,
        participant_id: &ParticipantId,
        filter: &RegistrationFilter,
    ) -> Result<Vec<Registration>, RepositoryError> {
        self.inner.list_for_participant(participant_id, filter).await
    }

    async fn insert_answers(
        &self,
        answers: Vec<RegistrationAnswer>,
    ) -> Result<(), RepositoryError> {
        if let Some(delay) = self.answer_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_answers {
            return Err(RepositoryError::Unavailable("answers table locked".to_string()));
        }
        self.inner.insert_answers(answers).await
    }

    async fn answers_for(
        &self,
        id: &RegistrationId,
    ) -> Result<Vec<RegistrationAnswer>, RepositoryError> {
        self.inner.answers_for(id).await
    }
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
