use async_trait::async_trait;
use crew_admission::config::AdmissionConfig;
use crew_admission::workflows::registration::{
    CandidateProfile, DocumentId, ExperienceLevel, InMemoryStore, JourneyId, JourneyState,
    JourneySummary, LegId, LegSummary, NotifyError, OwnerId, OwnerNotice, OwnerNotifier,
    ParticipantId, PassportDocument, PipelineObserver, RegistrationPorts, RegistrationService,
    Requirement, RequirementCatalog, RequirementId, RequirementKind, RiskLevel, RubricAssessor,
    TaskRegistry,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Owner notifier that records the notice in the service log.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct LogNotifier;

#[async_trait]
impl OwnerNotifier for LogNotifier {
    async fn notify_owner(&self, notice: OwnerNotice) -> Result<(), NotifyError> {
        info!(
            owner = %notice.owner_id,
            registration = %notice.registration_id,
            journey = %notice.journey_name,
            crew = %notice.participant_display_name,
            "registration awaiting owner review"
        );
        Ok(())
    }
}

/// Wire the registration service over a single in-memory store.
pub(crate) fn registration_service(
    store: &InMemoryStore,
    notifier: Arc<dyn OwnerNotifier>,
    config: &AdmissionConfig,
    tasks: Arc<TaskRegistry>,
    observer: Arc<dyn PipelineObserver>,
) -> RegistrationService {
    let assessor = RubricAssessor::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        RequirementCatalog::new(Arc::new(store.clone())),
        Arc::clone(&observer),
        config.auto_approve_threshold,
    );
    let ports = RegistrationPorts {
        registrations: Arc::new(store.clone()),
        requirements: Arc::new(store.clone()),
        directory: Arc::new(store.clone()),
        documents: Arc::new(store.clone()),
        notifier,
        assessor: Arc::new(assessor),
    };
    RegistrationService::new(ports, config, tasks, observer)
}

pub(crate) const ATLANTIC_LEG: &str = "leg-lisbon-madeira";
pub(crate) const SOLENT_LEG: &str = "leg-cowes-lymington";
pub(crate) const QUALIFIED_CREW: &str = "crew-ana";
pub(crate) const NOVICE_CREW: &str = "crew-tom";
pub(crate) const MOTIVATION_REQUIREMENT: &str = "req-atlantic-motivation";

fn journey(id: &str, name: &str, owner: &str, auto_approval_enabled: bool) -> JourneySummary {
    JourneySummary {
        id: JourneyId(id.to_string()),
        name: name.to_string(),
        state: JourneyState::Published,
        owner_id: OwnerId(owner.to_string()),
        auto_approval_enabled,
    }
}

fn atlantic_requirement(
    id: &str,
    kind: RequirementKind,
    is_required: bool,
    order: i32,
) -> Requirement {
    Requirement {
        id: RequirementId(id.to_string()),
        journey_id: JourneyId("journey-atlantic".to_string()),
        kind,
        is_required,
        order,
    }
}

/// Sample fleet: an auto-approving offshore passage with requirements, a coastal hop with none,
/// one experienced and one novice crew member.
pub(crate) fn seed_fixtures(store: &InMemoryStore) {
    store.add_leg(LegSummary {
        id: LegId(ATLANTIC_LEG.to_string()),
        name: "Lisbon to Madeira".to_string(),
        journey: journey("journey-atlantic", "Atlantic Passage", "owner-ben", true),
    });
    store.add_leg(LegSummary {
        id: LegId(SOLENT_LEG.to_string()),
        name: "Cowes to Lymington".to_string(),
        journey: journey("journey-solent", "Solent Day Sails", "owner-rita", false),
    });

    for requirement in [
        atlantic_requirement(
            "req-atlantic-risk",
            RequirementKind::RiskLevel {
                required_level: RiskLevel::OffshoreSailing,
            },
            true,
            1,
        ),
        atlantic_requirement(
            "req-atlantic-experience",
            RequirementKind::ExperienceLevel {
                minimum_level: ExperienceLevel::CompetentCrew,
            },
            true,
            2,
        ),
        atlantic_requirement(
            "req-atlantic-navigation",
            RequirementKind::Skill {
                skill_name: "navigation".to_string(),
            },
            false,
            3,
        ),
        atlantic_requirement(
            MOTIVATION_REQUIREMENT,
            RequirementKind::Question {
                question_text: "Why do you want to sail this passage?".to_string(),
            },
            true,
            4,
        ),
        atlantic_requirement(
            "req-atlantic-passport",
            RequirementKind::Passport {
                require_photo_validation: false,
            },
            false,
            5,
        ),
    ] {
        store.add_requirement(requirement);
    }

    store.add_profile(CandidateProfile {
        participant_id: ParticipantId(QUALIFIED_CREW.to_string()),
        display_name: "Ana".to_string(),
        risk_levels: vec![RiskLevel::CoastalSailing, RiskLevel::OffshoreSailing],
        experience_level: Some(ExperienceLevel::CoastalSkipper),
        skills: vec!["navigation".to_string(), "first aid".to_string()],
    });
    store.add_profile(CandidateProfile {
        participant_id: ParticipantId(NOVICE_CREW.to_string()),
        display_name: "Tom".to_string(),
        risk_levels: vec![RiskLevel::CoastalSailing],
        experience_level: Some(ExperienceLevel::Beginner),
        skills: Vec::new(),
    });
    store.add_document(PassportDocument {
        id: DocumentId("doc-ana-passport".to_string()),
        owner_id: ParticipantId(QUALIFIED_CREW.to_string()),
        storage_key: "passports/crew-ana/scan.pdf".to_string(),
    });
}
