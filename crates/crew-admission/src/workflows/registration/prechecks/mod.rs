mod rules;

use serde::{Deserialize, Serialize};

use super::domain::{CandidateProfile, JourneyId, Requirement, RequirementId};

/// Stable token describing why a candidate failed a pre-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreCheckFailType {
    RiskLevelMismatch,
    InsufficientExperience,
    MissingExperienceLevel,
}

impl PreCheckFailType {
    pub const fn token(self) -> &'static str {
        match self {
            PreCheckFailType::RiskLevelMismatch => "risk_level_mismatch",
            PreCheckFailType::InsufficientExperience => "insufficient_experience",
            PreCheckFailType::MissingExperienceLevel => "missing_experience_level",
        }
    }
}

/// First failing required requirement, in catalog order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreCheckFailure {
    pub requirement_id: RequirementId,
    pub fail_type: PreCheckFailType,
    pub reason: String,
}

/// Ephemeral outcome of the eligibility gate; never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreCheckResult {
    Passed,
    Failed(PreCheckFailure),
}

impl PreCheckResult {
    pub fn fail_type(&self) -> Option<PreCheckFailType> {
        match self {
            PreCheckResult::Passed => None,
            PreCheckResult::Failed(failure) => Some(failure.fail_type),
        }
    }

    pub fn fail_reason(&self) -> Option<&str> {
        match self {
            PreCheckResult::Passed => None,
            PreCheckResult::Failed(failure) => Some(failure.reason.as_str()),
        }
    }
}

/// Stateless evaluator over the declarative requirement kinds.
#[derive(Debug, Default, Clone, Copy)]
pub struct PreCheckEvaluator;

impl PreCheckEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Walk required requirements of `journey_id` in `order` and stop at the first failure.
    /// Only required declarative kinds are checked; the rest need answers or scoring.
    pub fn evaluate(
        &self,
        profile: &CandidateProfile,
        journey_id: &JourneyId,
        requirements: &[Requirement],
    ) -> PreCheckResult {
        let mut ordered: Vec<&Requirement> = requirements
            .iter()
            .filter(|requirement| &requirement.journey_id == journey_id)
            .filter(|requirement| requirement.is_required && requirement.kind.is_declarative())
            .collect();
        ordered.sort_by_key(|requirement| requirement.order);

        ordered
            .into_iter()
            .find_map(|requirement| rules::check_requirement(profile, requirement))
            .map(PreCheckResult::Failed)
            .unwrap_or(PreCheckResult::Passed)
    }
}
