use super::super::domain::{CandidateProfile, Requirement, RequirementKind};
use super::{PreCheckFailType, PreCheckFailure};

/// Check one declarative requirement against the profile. Other kinds always pass.
pub(crate) fn check_requirement(
    profile: &CandidateProfile,
    requirement: &Requirement,
) -> Option<PreCheckFailure> {
    match &requirement.kind {
        RequirementKind::RiskLevel { required_level } => {
            if profile.risk_levels.contains(required_level) {
                None
            } else {
                Some(PreCheckFailure {
                    requirement_id: requirement.id.clone(),
                    fail_type: PreCheckFailType::RiskLevelMismatch,
                    reason: format!(
                        "this leg requires comfort with {}, which is not in your profile",
                        required_level.label()
                    ),
                })
            }
        }
        RequirementKind::ExperienceLevel { minimum_level } => match profile.experience_level {
            Some(level) if level >= *minimum_level => None,
            Some(level) => Some(PreCheckFailure {
                requirement_id: requirement.id.clone(),
                fail_type: PreCheckFailType::InsufficientExperience,
                reason: format!(
                    "this leg requires at least {} experience (level {}), your profile says {} (level {})",
                    minimum_level.label(),
                    minimum_level.rank(),
                    level.label(),
                    level.rank()
                ),
            }),
            None => Some(PreCheckFailure {
                requirement_id: requirement.id.clone(),
                fail_type: PreCheckFailType::MissingExperienceLevel,
                reason: format!(
                    "this leg requires at least {} experience; set your experience level first",
                    minimum_level.label()
                ),
            }),
        },
        RequirementKind::Skill { .. }
        | RequirementKind::Passport { .. }
        | RequirementKind::Question { .. } => None,
    }
}
