use crate::infra::{
    registration_service, seed_fixtures, ATLANTIC_LEG, MOTIVATION_REQUIREMENT, NOVICE_CREW,
    QUALIFIED_CREW, SOLENT_LEG,
};
use clap::Args;
use crew_admission::config::AdmissionConfig;
use crew_admission::error::AppError;
use crew_admission::workflows::registration::{
    AdmissionError, AnswerSubmission, DocumentId, Identity, InMemoryNotifier, InMemoryStore,
    JoinOutcome, JoinRequest, LegId, ParticipantId, ParticipantRole, Registration,
    RegistrationFilter, RegistrationService, RequirementId, TaskRegistry, TracingObserver,
};
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Minimum match percentage for automatic approval (0-100).
    #[arg(long)]
    pub(crate) threshold: Option<u8>,
    /// Attach the sample passport document to the join request.
    #[arg(long)]
    pub(crate) with_passport: bool,
}

fn crew(id: &str) -> Identity {
    Identity {
        participant_id: ParticipantId(id.to_string()),
        role: ParticipantRole::Crew,
    }
}

fn join_request(leg: &str, with_passport: bool) -> JoinRequest {
    JoinRequest {
        leg_id: LegId(leg.to_string()),
        notes: Some("Can stand night watches".to_string()),
        answers: vec![AnswerSubmission {
            requirement_id: RequirementId(MOTIVATION_REQUIREMENT.to_string()),
            answer_text: Some("Building miles towards an ocean crossing".to_string()),
            answer_json: None,
        }],
        passport_document_id: with_passport.then(|| DocumentId("doc-ana-passport".to_string())),
    }
}

fn print_outcome(step: &str, result: &Result<JoinOutcome, AdmissionError>) {
    match result {
        Ok(outcome) => println!(
            "- {step}: {} [{}] reactivated={} assessment_dispatched={} owner_notified={}",
            outcome.registration.id,
            outcome.registration.status.label(),
            outcome.reactivated,
            outcome.assessment_dispatched,
            outcome.owner_notified,
        ),
        Err(err) => println!("- {step}: rejected ({}) {err}", err.category()),
    }
}

fn print_registration(registration: &Registration) {
    println!(
        "  {} on {} [{}] match={}%{}",
        registration.id,
        registration.leg_id,
        registration.status.label(),
        registration.match_percentage,
        registration
            .ai_match_reasoning
            .as_deref()
            .map(|reasoning| format!(" ({reasoning})"))
            .unwrap_or_default(),
    );
}

async fn print_registrations(service: &RegistrationService, identity: &Identity) -> Result<(), AppError> {
    let registrations = service
        .list(identity, &RegistrationFilter::default())
        .await?;
    println!("Registrations for {}:", identity.participant_id);
    for registration in &registrations {
        print_registration(registration);
    }
    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        threshold,
        with_passport,
    } = args;

    let mut config = AdmissionConfig::default();
    if let Some(threshold) = threshold {
        config.auto_approve_threshold = threshold.min(100);
    }

    let store = InMemoryStore::default();
    seed_fixtures(&store);
    let notifier = InMemoryNotifier::default();
    let tasks = Arc::new(TaskRegistry::new());
    let service = registration_service(
        &store,
        Arc::new(notifier.clone()),
        &config,
        Arc::clone(&tasks),
        Arc::new(TracingObserver),
    );

    let ana = crew(QUALIFIED_CREW);
    let tom = crew(NOVICE_CREW);

    println!("Crew admission demo");
    println!(
        "Auto-approval threshold: {}%",
        config.auto_approve_threshold
    );

    let joined = service
        .join(&ana, join_request(ATLANTIC_LEG, with_passport))
        .await;
    print_outcome("Ana joins the Atlantic passage", &joined);
    let registration = joined?.registration;

    let duplicate = service
        .join(&ana, join_request(ATLANTIC_LEG, with_passport))
        .await;
    print_outcome("Ana joins again", &duplicate);

    let rejected = service
        .join(&tom, join_request(ATLANTIC_LEG, false))
        .await;
    print_outcome("Tom joins the Atlantic passage", &rejected);

    let coastal = service.join(&tom, join_request(SOLENT_LEG, false)).await;
    print_outcome("Tom joins the Solent day sail", &coastal);

    let drained = tasks.drain().await;
    println!("\nBackground assessments finished: {drained}");
    print_registrations(&service, &ana).await?;

    let cancelled = service.cancel(&ana, &registration.id).await?;
    println!("\n- Ana cancels: {} [{}]", cancelled.id, cancelled.status.label());

    let rejoined = service
        .join(&ana, join_request(ATLANTIC_LEG, with_passport))
        .await;
    print_outcome("Ana rejoins", &rejoined);

    tasks.drain().await;
    println!();
    print_registrations(&service, &ana).await?;
    print_registrations(&service, &tom).await?;

    let notices = notifier.notices();
    println!("\nOwner notices sent: {}", notices.len());
    for notice in notices {
        println!(
            "  {} -> {}: {} asked to join {}",
            notice.registration_id, notice.owner_id, notice.participant_display_name, notice.journey_name
        );
    }

    Ok(())
}
