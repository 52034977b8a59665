use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;

use super::super::catalog::RequirementCatalog;
use super::super::domain::{
    CandidateProfile, RegistrationAnswer, RegistrationId, RegistrationStatus, Requirement,
    RequirementId, RequirementKind,
};
use super::super::observer::{PipelineEvent, PipelineObserver};
use super::super::prechecks::PreCheckEvaluator;
use super::super::repository::{
    AnswerScore, AssessmentWrite, JourneyDirectory, RegistrationRepository, RepositoryError,
};
use super::{AssessmentError, Assessor};

const REQUIRED_WEIGHT: u16 = 2;
const OPTIONAL_WEIGHT: u16 = 1;

/// Discrete contribution to an assessment, kept for the reasoning trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreComponent {
    pub requirement_id: RequirementId,
    pub kind: &'static str,
    pub is_required: bool,
    /// Fraction of the requirement satisfied, 0.0..=1.0.
    pub satisfaction: f32,
    pub notes: String,
}

/// Rubric output before it is written back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreSheet {
    pub components: Vec<ScoreComponent>,
    pub match_percentage: u8,
    pub all_required_met: bool,
}

impl ScoreSheet {
    pub fn reasoning(&self) -> String {
        if self.components.is_empty() {
            return "no requirements to assess".to_string();
        }
        self.components
            .iter()
            .map(|component| format!("{}: {}", component.kind, component.notes))
            .collect::<Vec<_>>()
            .join("; ")
    }

    pub fn qualifies_for_auto_approval(&self, threshold: u8) -> bool {
        self.all_required_met && self.match_percentage >= threshold
    }
}

/// Deterministic stand-in for the AI scorer.
///
/// Declarative kinds reuse the pre-check rules, skills are matched against the stored profile,
/// passports and questions count when an answer row exists. Required requirements weigh double.
pub struct RubricAssessor {
    repository: Arc<dyn RegistrationRepository>,
    directory: Arc<dyn JourneyDirectory>,
    catalog: RequirementCatalog,
    observer: Arc<dyn PipelineObserver>,
    auto_approve_threshold: u8,
}

impl RubricAssessor {
    pub fn new(
        repository: Arc<dyn RegistrationRepository>,
        directory: Arc<dyn JourneyDirectory>,
        catalog: RequirementCatalog,
        observer: Arc<dyn PipelineObserver>,
        auto_approve_threshold: u8,
    ) -> Self {
        Self {
            repository,
            directory,
            catalog,
            observer,
            auto_approve_threshold: auto_approve_threshold.min(100),
        }
    }

    pub fn score(
        profile: &CandidateProfile,
        requirements: &[Requirement],
        answers: &[RegistrationAnswer],
    ) -> ScoreSheet {
        let answers_by_requirement: HashMap<&RequirementId, &RegistrationAnswer> = answers
            .iter()
            .map(|answer| (&answer.requirement_id, answer))
            .collect();

        let components: Vec<ScoreComponent> = requirements
            .iter()
            .map(|requirement| {
                score_requirement(
                    profile,
                    requirement,
                    answers_by_requirement.get(&requirement.id).copied(),
                )
            })
            .collect();

        let (earned, possible) = components.iter().fold((0.0_f32, 0_u16), |acc, component| {
            let weight = if component.is_required {
                REQUIRED_WEIGHT
            } else {
                OPTIONAL_WEIGHT
            };
            (acc.0 + component.satisfaction * weight as f32, acc.1 + weight)
        });

        // Nothing to score against counts as fully matched.
        let match_percentage = if possible == 0 {
            100
        } else {
            ((earned / possible as f32) * 100.0).round().clamp(0.0, 100.0) as u8
        };

        let all_required_met = components
            .iter()
            .filter(|component| component.is_required)
            .all(|component| component.satisfaction >= 1.0);

        ScoreSheet {
            components,
            match_percentage,
            all_required_met,
        }
    }
}

fn score_requirement(
    profile: &CandidateProfile,
    requirement: &Requirement,
    answer: Option<&RegistrationAnswer>,
) -> ScoreComponent {
    let (satisfaction, notes) = match &requirement.kind {
        RequirementKind::RiskLevel { .. } | RequirementKind::ExperienceLevel { .. } => {
            // Optional declarative rules are scored as if required.
            let as_required = Requirement {
                is_required: true,
                ..requirement.clone()
            };
            let result = PreCheckEvaluator::new().evaluate(
                profile,
                &requirement.journey_id,
                std::slice::from_ref(&as_required),
            );
            match result.fail_reason() {
                None => (1.0, "profile satisfies requirement".to_string()),
                Some(reason) => (0.0, reason.to_string()),
            }
        }
        RequirementKind::Skill { skill_name } => {
            if profile.has_skill(skill_name) {
                (1.0, format!("profile lists {skill_name}"))
            } else {
                (0.0, format!("profile does not list {skill_name}"))
            }
        }
        RequirementKind::Passport {
            require_photo_validation,
        } => match answer.and_then(|answer| answer.passport_document_id.as_ref()) {
            Some(_) if *require_photo_validation => (
                0.5,
                "passport on file, photo validation left for the owner".to_string(),
            ),
            Some(_) => (1.0, "passport on file".to_string()),
            None => (0.0, "no passport document linked".to_string()),
        },
        RequirementKind::Question { .. } => {
            let answered = answer.map(RegistrationAnswer::has_content).unwrap_or(false);
            if answered {
                (1.0, "question answered".to_string())
            } else {
                (0.0, "question unanswered".to_string())
            }
        }
    };

    ScoreComponent {
        requirement_id: requirement.id.clone(),
        kind: requirement.kind.label(),
        is_required: requirement.is_required,
        satisfaction,
        notes,
    }
}

fn answer_scores(sheet: &ScoreSheet, answers: &[RegistrationAnswer]) -> Vec<AnswerScore> {
    answers
        .iter()
        .filter_map(|answer| {
            sheet
                .components
                .iter()
                .find(|component| component.requirement_id == answer.requirement_id)
                .map(|component| AnswerScore {
                    requirement_id: answer.requirement_id.clone(),
                    ai_score: Some(component.satisfaction),
                    passed: Some(component.satisfaction >= 1.0),
                    photo_verification_passed: None,
                    photo_confidence_score: None,
                })
        })
        .collect()
}

#[async_trait]
impl Assessor for RubricAssessor {
    async fn assess_and_maybe_approve(
        &self,
        registration_id: &RegistrationId,
    ) -> Result<(), AssessmentError> {
        let registration = self
            .repository
            .fetch(registration_id)
            .await?
            .ok_or_else(|| AssessmentError::RegistrationNotFound(registration_id.clone()))?;
        if registration.status != RegistrationStatus::PendingApproval {
            return Err(AssessmentError::NoLongerPending(registration_id.clone()));
        }
        let leg = self
            .directory
            .leg(&registration.leg_id)
            .await?
            .ok_or_else(|| AssessmentError::LegMissing(registration_id.clone()))?;

        let requirements = self.catalog.load(&leg.journey.id).await?;
        let answers = self.repository.answers_for(registration_id).await?;
        let profile = self
            .directory
            .candidate_profile(&registration.participant_id)
            .await?
            .unwrap_or_else(|| CandidateProfile::empty(registration.participant_id.clone()));

        let sheet = Self::score(&profile, &requirements, &answers);
        let auto_approved = sheet.qualifies_for_auto_approval(self.auto_approve_threshold);

        self.repository
            .record_assessment(
                registration_id,
                AssessmentWrite {
                    match_percentage: sheet.match_percentage,
                    ai_match_score: f32::from(sheet.match_percentage) / 100.0,
                    ai_match_reasoning: sheet.reasoning(),
                    auto_approved,
                    answer_scores: answer_scores(&sheet, &answers),
                },
                Utc::now(),
            )
            .await
            .map_err(|err| match err {
                RepositoryError::Conflict => {
                    AssessmentError::NoLongerPending(registration_id.clone())
                }
                other => other.into(),
            })?;

        self.observer.observe(&PipelineEvent::AssessmentScored {
            registration_id: registration_id.clone(),
            match_percentage: sheet.match_percentage,
            auto_approved,
        });
        Ok(())
    }
}
