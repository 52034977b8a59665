//! In-memory adapters for the store and notification ports, used by the demo, the dev
//! server, and tests. One mutex guards all tables so every trait call is atomic.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::domain::{
    CandidateProfile, DocumentId, JourneyId, LegId, LegSummary, ParticipantId, PassportDocument,
    Registration, RegistrationAnswer, RegistrationFilter, RegistrationId, RegistrationStatus,
    Requirement,
};
use super::repository::{
    AssessmentWrite, DocumentVault, JourneyDirectory, NotifyError, OwnerNotice,
    OwnerNotifier, Reactivated, RegistrationRepository, RepositoryError, RequirementSource,
};

#[derive(Default)]
struct Tables {
    legs: HashMap<LegId, LegSummary>,
    profiles: HashMap<ParticipantId, CandidateProfile>,
    requirements: HashMap<JourneyId, Vec<Requirement>>,
    documents: HashMap<DocumentId, PassportDocument>,
    registrations: HashMap<RegistrationId, Registration>,
    answers: HashMap<RegistrationId, Vec<RegistrationAnswer>>,
}

impl Tables {
    fn registration_for(&self, participant_id: &ParticipantId, leg_id: &LegId) -> Option<&Registration> {
        self.registrations.values().find(|registration| {
            &registration.participant_id == participant_id && &registration.leg_id == leg_id
        })
    }
}

#[derive(Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    fn tables(&self) -> Result<MutexGuard<'_, Tables>, RepositoryError> {
        self.tables
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
    }

    fn tables_for_seeding(&self) -> MutexGuard<'_, Tables> {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_leg(&self, leg: LegSummary) {
        self.tables_for_seeding().legs.insert(leg.id.clone(), leg);
    }

    pub fn add_profile(&self, profile: CandidateProfile) {
        self.tables_for_seeding()
            .profiles
            .insert(profile.participant_id.clone(), profile);
    }

    pub fn add_requirement(&self, requirement: Requirement) {
        self.tables_for_seeding()
            .requirements
            .entry(requirement.journey_id.clone())
            .or_default()
            .push(requirement);
    }

    pub fn add_document(&self, document: PassportDocument) {
        self.tables_for_seeding()
            .documents
            .insert(document.id.clone(), document);
    }

    /// Store a registration row as-is, bypassing the lifecycle rules.
    pub fn put_registration(&self, registration: Registration) {
        self.tables_for_seeding()
            .registrations
            .insert(registration.id.clone(), registration);
    }

    pub fn registrations(&self) -> Vec<Registration> {
        self.tables_for_seeding()
            .registrations
            .values()
            .cloned()
            .collect()
    }
}

#[async_trait]
impl RegistrationRepository for InMemoryStore {
    async fn find_for_leg(
        &self,
        participant_id: &ParticipantId,
        leg_id: &LegId,
    ) -> Result<Option<Registration>, RepositoryError> {
        Ok(self.tables()?.registration_for(participant_id, leg_id).cloned())
    }

    async fn fetch(&self, id: &RegistrationId) -> Result<Option<Registration>, RepositoryError> {
        Ok(self.tables()?.registrations.get(id).cloned())
    }

    async fn insert(&self, registration: Registration) -> Result<Registration, RepositoryError> {
        let mut tables = self.tables()?;
        if tables.registrations.contains_key(&registration.id)
            || tables
                .registration_for(&registration.participant_id, &registration.leg_id)
                .is_some()
        {
            return Err(RepositoryError::Conflict);
        }
        tables
            .registrations
            .insert(registration.id.clone(), registration.clone());
        Ok(registration)
    }

    async fn reactivate(
        &self,
        id: &RegistrationId,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Reactivated, RepositoryError> {
        let mut tables = self.tables()?;
        let registration = tables
            .registrations
            .get_mut(id)
            .ok_or(RepositoryError::NotFound)?;
        if registration.status != RegistrationStatus::Cancelled {
            return Err(RepositoryError::Conflict);
        }
        registration.reset_for_reactivation(notes, now);
        let registration = registration.clone();
        let cleared_answers = tables.answers.remove(id).map(|rows| rows.len()).unwrap_or(0);
        Ok(Reactivated {
            registration,
            cleared_answers,
        })
    }

    async fn transition(
        &self,
        id: &RegistrationId,
        expected: RegistrationStatus,
        next: RegistrationStatus,
        now: DateTime<Utc>,
    ) -> Result<Registration, RepositoryError> {
        let mut tables = self.tables()?;
        let registration = tables
            .registrations
            .get_mut(id)
            .ok_or(RepositoryError::NotFound)?;
        if registration.status != expected {
            return Err(RepositoryError::Conflict);
        }
        registration.status = next;
        registration.updated_at = now;
        Ok(registration.clone())
    }

    async fn record_assessment(
        &self,
        id: &RegistrationId,
        assessment: AssessmentWrite,
        now: DateTime<Utc>,
    ) -> Result<Registration, RepositoryError> {
        let mut tables = self.tables()?;
        let Tables {
            registrations,
            answers,
            ..
        } = &mut *tables;
        let registration = registrations.get_mut(id).ok_or(RepositoryError::NotFound)?;
        if registration.status != RegistrationStatus::PendingApproval {
            return Err(RepositoryError::Conflict);
        }

        if let Some(rows) = answers.get_mut(id) {
            for score in &assessment.answer_scores {
                if let Some(row) = rows
                    .iter_mut()
                    .find(|row| row.requirement_id == score.requirement_id)
                {
                    row.ai_score = score.ai_score;
                    row.passed = score.passed;
                    row.photo_verification_passed = score.photo_verification_passed;
                    row.photo_confidence_score = score.photo_confidence_score;
                }
            }
        }

        registration.match_percentage = assessment.match_percentage;
        registration.ai_match_score = Some(assessment.ai_match_score);
        registration.ai_match_reasoning = Some(assessment.ai_match_reasoning);
        registration.auto_approved = Some(assessment.auto_approved);
        if assessment.auto_approved {
            registration.status = RegistrationStatus::Approved;
        }
        registration.updated_at = now;
        Ok(registration.clone())
    }

    async fn list_for_participant(
        &self,
        participant_id: &ParticipantId,
        filter: &RegistrationFilter,
    ) -> Result<Vec<Registration>, RepositoryError> {
        let tables = self.tables()?;
        let mut registrations: Vec<Registration> = tables
            .registrations
            .values()
            .filter(|registration| &registration.participant_id == participant_id)
            .filter(|registration| filter.matches(registration))
            .cloned()
            .collect();
        registrations.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(registrations)
    }

    async fn insert_answers(
        &self,
        answers: Vec<RegistrationAnswer>,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables()?;
        if answers
            .iter()
            .any(|answer| !tables.registrations.contains_key(&answer.registration_id))
        {
            return Err(RepositoryError::NotFound);
        }
        for answer in answers {
            let rows = tables
                .answers
                .entry(answer.registration_id.clone())
                .or_default();
            rows.retain(|row| row.requirement_id != answer.requirement_id);
            rows.push(answer);
        }
        Ok(())
    }

    async fn answers_for(
        &self,
        id: &RegistrationId,
    ) -> Result<Vec<RegistrationAnswer>, RepositoryError> {
        Ok(self
            .tables()?
            .answers
            .get(id)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl RequirementSource for InMemoryStore {
    async fn requirements_for(
        &self,
        journey_id: &JourneyId,
    ) -> Result<Vec<Requirement>, RepositoryError> {
        Ok(self
            .tables()?
            .requirements
            .get(journey_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn count_for(&self, journey_id: &JourneyId) -> Result<usize, RepositoryError> {
        Ok(self
            .tables()?
            .requirements
            .get(journey_id)
            .map(Vec::len)
            .unwrap_or(0))
    }
}

#[async_trait]
impl JourneyDirectory for InMemoryStore {
    async fn leg(&self, leg_id: &LegId) -> Result<Option<LegSummary>, RepositoryError> {
        Ok(self.tables()?.legs.get(leg_id).cloned())
    }

    async fn candidate_profile(
        &self,
        participant_id: &ParticipantId,
    ) -> Result<Option<CandidateProfile>, RepositoryError> {
        Ok(self.tables()?.profiles.get(participant_id).cloned())
    }
}

#[async_trait]
impl DocumentVault for InMemoryStore {
    async fn passport_document(
        &self,
        id: &DocumentId,
    ) -> Result<Option<PassportDocument>, RepositoryError> {
        Ok(self.tables()?.documents.get(id).cloned())
    }
}

/// Notifier that records notices instead of delivering them.
#[derive(Default, Clone)]
pub struct InMemoryNotifier {
    notices: Arc<Mutex<Vec<OwnerNotice>>>,
}

impl InMemoryNotifier {
    pub fn notices(&self) -> Vec<OwnerNotice> {
        self.notices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl OwnerNotifier for InMemoryNotifier {
    async fn notify_owner(&self, notice: OwnerNotice) -> Result<(), NotifyError> {
        self.notices
            .lock()
            .map_err(|_| NotifyError::Transport("notice log poisoned".to_string()))?
            .push(notice);
        Ok(())
    }
}
