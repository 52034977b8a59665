use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;

use super::catalog::RequirementCatalog;
use super::domain::{
    AnswerSubmission, DocumentId, JourneyId, RegistrationAnswer, RegistrationId, Requirement,
    RequirementId,
};
use super::repository::{RegistrationRepository, RepositoryError};

/// Validation errors raised against submitted question answers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnswerValidationError {
    #[error("missing answers for required questions: {}", join_ids(.requirement_ids))]
    MissingAnswers { requirement_ids: Vec<RequirementId> },
    #[error("answer for requirement {requirement_id} is empty")]
    EmptyAnswer { requirement_id: RequirementId },
}

impl AnswerValidationError {
    pub const fn code(&self) -> &'static str {
        match self {
            AnswerValidationError::MissingAnswers { .. } => "missing_answers",
            AnswerValidationError::EmptyAnswer { .. } => "empty_answer",
        }
    }
}

fn join_ids(ids: &[RequirementId]) -> String {
    ids.iter()
        .map(|id| id.0.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failure of [`AnswerWriter::validate_and_persist`].
#[derive(Debug, thiserror::Error)]
pub enum AnswerWriteError {
    #[error(transparent)]
    Invalid(#[from] AnswerValidationError),
    #[error(transparent)]
    Persistence(#[from] RepositoryError),
}

/// Question answers that passed validation, with unknown requirement ids removed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedAnswers {
    answers: Vec<AnswerSubmission>,
}

impl ValidatedAnswers {
    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    pub fn requirement_ids(&self) -> impl Iterator<Item = &RequirementId> {
        self.answers.iter().map(|answer| &answer.requirement_id)
    }
}

/// Validates question answers and writes answer rows for a registration.
#[derive(Clone)]
pub struct AnswerWriter {
    catalog: RequirementCatalog,
    repository: Arc<dyn RegistrationRepository>,
}

impl AnswerWriter {
    pub fn new(catalog: RequirementCatalog, repository: Arc<dyn RegistrationRepository>) -> Self {
        Self {
            catalog,
            repository,
        }
    }

    /// Check `submitted` against the question requirements found in `requirements`.
    ///
    /// Missing required questions are reported first, by id. Answers pointing at anything other
    /// than a known question are dropped. When the same requirement is answered twice, the first
    /// submission wins.
    pub fn validate(
        requirements: &[Requirement],
        submitted: &[AnswerSubmission],
    ) -> Result<ValidatedAnswers, AnswerValidationError> {
        let questions: Vec<&Requirement> = requirements
            .iter()
            .filter(|requirement| requirement.kind.is_question())
            .collect();

        let submitted_ids: HashSet<&RequirementId> =
            submitted.iter().map(|answer| &answer.requirement_id).collect();
        let missing: Vec<RequirementId> = questions
            .iter()
            .filter(|question| question.is_required && !submitted_ids.contains(&question.id))
            .map(|question| question.id.clone())
            .collect();
        if !missing.is_empty() {
            return Err(AnswerValidationError::MissingAnswers {
                requirement_ids: missing,
            });
        }

        let known: HashSet<&RequirementId> = questions.iter().map(|question| &question.id).collect();
        let mut seen = HashSet::new();
        let mut answers = Vec::new();
        for answer in submitted {
            if !known.contains(&answer.requirement_id) || !seen.insert(&answer.requirement_id) {
                continue;
            }
            if !answer.has_content() {
                return Err(AnswerValidationError::EmptyAnswer {
                    requirement_id: answer.requirement_id.clone(),
                });
            }
            answers.push(answer.clone());
        }

        Ok(ValidatedAnswers { answers })
    }

    /// Write previously validated answers in a single batch.
    pub async fn persist(
        &self,
        registration_id: &RegistrationId,
        validated: ValidatedAnswers,
    ) -> Result<usize, RepositoryError> {
        if validated.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let rows: Vec<RegistrationAnswer> = validated
            .answers
            .into_iter()
            .map(|answer| RegistrationAnswer::from_submission(registration_id.clone(), answer, now))
            .collect();
        let count = rows.len();
        self.repository.insert_answers(rows).await?;
        Ok(count)
    }

    /// Load the journey's questions, validate `submitted` against them, and persist.
    ///
    /// Single-call entry point for callers that already hold a registration. The join pipeline
    /// calls [`AnswerWriter::validate`] and [`AnswerWriter::persist`] separately so that
    /// invalid answers are refused before any registration row is written.
    pub async fn validate_and_persist(
        &self,
        registration_id: &RegistrationId,
        submitted: &[AnswerSubmission],
        journey_id: &JourneyId,
    ) -> Result<usize, AnswerWriteError> {
        let questions = self.catalog.questions(journey_id).await?;
        let validated = Self::validate(&questions, submitted)?;
        Ok(self.persist(registration_id, validated).await?)
    }

    /// Link a passport document to the journey's passport requirement.
    ///
    /// Returns `false` without writing when the journey defines no passport requirement.
    pub async fn persist_passport_answer(
        &self,
        registration_id: &RegistrationId,
        document_id: &DocumentId,
        journey_id: &JourneyId,
    ) -> Result<bool, RepositoryError> {
        let Some(requirement) = self.catalog.passport_requirement(journey_id).await? else {
            return Ok(false);
        };

        let row = RegistrationAnswer::passport(
            registration_id.clone(),
            requirement.id,
            document_id.clone(),
            Utc::now(),
        );
        self.repository.insert_answers(vec![row]).await?;
        Ok(true)
    }
}
