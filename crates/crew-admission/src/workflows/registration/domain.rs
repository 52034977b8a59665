use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! display_id {
    ($($name:ident),+ $(,)?) => {
        $(
            impl fmt::Display for $name {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(&self.0)
                }
            }
        )+
    };
}

/// Identifier wrapper for crew members asking to join a leg.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParticipantId(pub String);

/// Identifier wrapper for journey owners (the owner of the boat sailing the journey).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JourneyId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LegId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequirementId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegistrationId(pub String);

impl RegistrationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

/// Reference to an externally stored, ownership-checked document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub String);

display_id!(
    ParticipantId,
    OwnerId,
    JourneyId,
    LegId,
    RequirementId,
    RegistrationId,
    DocumentId,
);

/// Publication state of a journey. Only published journeys accept registrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JourneyState {
    Draft,
    Published,
    Archived,
}

impl JourneyState {
    pub const fn label(self) -> &'static str {
        match self {
            JourneyState::Draft => "draft",
            JourneyState::Published => "published",
            JourneyState::Archived => "archived",
        }
    }
}

/// Read-only view of a journey as needed by the join pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JourneySummary {
    pub id: JourneyId,
    pub name: String,
    pub state: JourneyState,
    pub owner_id: OwnerId,
    pub auto_approval_enabled: bool,
}

/// Read-only view of a bookable leg and the journey it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegSummary {
    pub id: LegId,
    pub name: String,
    pub journey: JourneySummary,
}

/// Sea conditions a crew member is comfortable sailing in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    CoastalSailing,
    OffshoreSailing,
    ExtremeSailing,
}

impl RiskLevel {
    pub const fn label(self) -> &'static str {
        match self {
            RiskLevel::CoastalSailing => "coastal sailing",
            RiskLevel::OffshoreSailing => "offshore sailing",
            RiskLevel::ExtremeSailing => "extreme sailing",
        }
    }
}

/// Ordered sailing experience ladder; a higher level satisfies any lower minimum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperienceLevel {
    Beginner = 1,
    CompetentCrew = 2,
    CoastalSkipper = 3,
    OffshoreSkipper = 4,
}

impl ExperienceLevel {
    pub const fn rank(self) -> u8 {
        self as u8
    }

    pub const fn label(self) -> &'static str {
        match self {
            ExperienceLevel::Beginner => "beginner",
            ExperienceLevel::CompetentCrew => "competent crew",
            ExperienceLevel::CoastalSkipper => "coastal skipper",
            ExperienceLevel::OffshoreSkipper => "offshore skipper",
        }
    }
}

/// Stored crew profile consulted by pre-checks and the assessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateProfile {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub risk_levels: Vec<RiskLevel>,
    pub experience_level: Option<ExperienceLevel>,
    pub skills: Vec<String>,
}

impl CandidateProfile {
    /// Profile used when the participant never filled one in.
    pub fn empty(participant_id: ParticipantId) -> Self {
        Self {
            display_name: participant_id.0.clone(),
            participant_id,
            risk_levels: Vec::new(),
            experience_level: None,
            skills: Vec::new(),
        }
    }

    pub fn has_skill(&self, skill: &str) -> bool {
        let wanted = skill.trim();
        self.skills
            .iter()
            .any(|candidate| candidate.trim().eq_ignore_ascii_case(wanted))
    }
}

/// Kind-specific payload of a journey requirement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "requirement_type", rename_all = "snake_case")]
pub enum RequirementKind {
    RiskLevel { required_level: RiskLevel },
    ExperienceLevel { minimum_level: ExperienceLevel },
    Skill { skill_name: String },
    Passport { require_photo_validation: bool },
    Question { question_text: String },
}

impl RequirementKind {
    pub const fn label(&self) -> &'static str {
        match self {
            RequirementKind::RiskLevel { .. } => "risk_level",
            RequirementKind::ExperienceLevel { .. } => "experience_level",
            RequirementKind::Skill { .. } => "skill",
            RequirementKind::Passport { .. } => "passport",
            RequirementKind::Question { .. } => "question",
        }
    }

    /// Kinds decided from the stored profile alone, without answers or scoring.
    pub const fn is_declarative(&self) -> bool {
        matches!(
            self,
            RequirementKind::RiskLevel { .. } | RequirementKind::ExperienceLevel { .. }
        )
    }

    pub const fn is_question(&self) -> bool {
        matches!(self, RequirementKind::Question { .. })
    }

    pub const fn is_passport(&self) -> bool {
        matches!(self, RequirementKind::Passport { .. })
    }
}

/// Eligibility rule attached to a journey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub id: RequirementId,
    pub journey_id: JourneyId,
    #[serde(flatten)]
    pub kind: RequirementKind,
    pub is_required: bool,
    pub order: i32,
}

/// Lifecycle status of a registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStatus {
    PendingApproval,
    Approved,
    Rejected,
    Cancelled,
}

impl RegistrationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            RegistrationStatus::PendingApproval => "pending_approval",
            RegistrationStatus::Approved => "approved",
            RegistrationStatus::Rejected => "rejected",
            RegistrationStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pending_approval" | "pending" => Some(Self::PendingApproval),
            "approved" => Some(Self::Approved),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// A participant's request to sail on a leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Registration {
    pub id: RegistrationId,
    pub participant_id: ParticipantId,
    pub leg_id: LegId,
    pub status: RegistrationStatus,
    pub notes: Option<String>,
    pub match_percentage: u8,
    pub ai_match_score: Option<f32>,
    pub ai_match_reasoning: Option<String>,
    pub auto_approved: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Registration {
    /// Fresh pending registration with no assessment data.
    pub fn pending(
        participant_id: ParticipantId,
        leg_id: LegId,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RegistrationId::generate(),
            participant_id,
            leg_id,
            status: RegistrationStatus::PendingApproval,
            notes,
            match_percentage: 0,
            ai_match_score: None,
            ai_match_reasoning: None,
            auto_approved: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Return a cancelled registration to a clean pending state.
    pub fn reset_for_reactivation(&mut self, notes: Option<String>, now: DateTime<Utc>) {
        self.status = RegistrationStatus::PendingApproval;
        self.notes = notes;
        self.match_percentage = 0;
        self.ai_match_score = None;
        self.ai_match_reasoning = None;
        self.auto_approved = None;
        self.updated_at = now;
    }
}

/// Answer payload as submitted by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerSubmission {
    pub requirement_id: RequirementId,
    #[serde(default)]
    pub answer_text: Option<String>,
    #[serde(default)]
    pub answer_json: Option<serde_json::Value>,
}

impl AnswerSubmission {
    /// Text must carry something besides whitespace; structured answers count when non-null.
    pub fn has_content(&self) -> bool {
        let has_text = self
            .answer_text
            .as_deref()
            .map(|text| !text.trim().is_empty())
            .unwrap_or(false);
        let has_json = self
            .answer_json
            .as_ref()
            .map(|value| !value.is_null())
            .unwrap_or(false);
        has_text || has_json
    }
}

/// Stored answer row. Score fields are written by the assessor only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistrationAnswer {
    pub registration_id: RegistrationId,
    pub requirement_id: RequirementId,
    pub answer_text: Option<String>,
    pub answer_json: Option<serde_json::Value>,
    pub passport_document_id: Option<DocumentId>,
    pub photo_verification_passed: Option<bool>,
    pub photo_confidence_score: Option<f32>,
    pub ai_score: Option<f32>,
    pub passed: Option<bool>,
    pub created_at: DateTime<Utc>,
}

impl RegistrationAnswer {
    pub fn from_submission(
        registration_id: RegistrationId,
        submission: AnswerSubmission,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            registration_id,
            requirement_id: submission.requirement_id,
            answer_text: submission.answer_text.map(|text| text.trim().to_string()),
            answer_json: submission.answer_json,
            passport_document_id: None,
            photo_verification_passed: None,
            photo_confidence_score: None,
            ai_score: None,
            passed: None,
            created_at: now,
        }
    }

    pub fn has_content(&self) -> bool {
        self.answer_text
            .as_deref()
            .map(|text| !text.trim().is_empty())
            .unwrap_or(false)
            || self
                .answer_json
                .as_ref()
                .map(|value| !value.is_null())
                .unwrap_or(false)
    }

    pub fn passport(
        registration_id: RegistrationId,
        requirement_id: RequirementId,
        document_id: DocumentId,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            registration_id,
            requirement_id,
            answer_text: None,
            answer_json: None,
            passport_document_id: Some(document_id),
            photo_verification_passed: None,
            photo_confidence_score: None,
            ai_score: None,
            passed: None,
            created_at: now,
        }
    }
}

/// Stored passport document metadata; the binary lives in external storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassportDocument {
    pub id: DocumentId,
    pub owner_id: ParticipantId,
    pub storage_key: String,
}

/// Role supplied by the upstream identity layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    Crew,
    Owner,
    Admin,
}

impl ParticipantRole {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "crew" => Some(Self::Crew),
            "owner" => Some(Self::Owner),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }

    pub const fn can_join_legs(self) -> bool {
        matches!(self, ParticipantRole::Crew)
    }
}

/// Authenticated caller as resolved before the pipeline runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub participant_id: ParticipantId,
    pub role: ParticipantRole,
}

/// Inbound create-or-reactivate request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub leg_id: LegId,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub answers: Vec<AnswerSubmission>,
    #[serde(default)]
    pub passport_document_id: Option<DocumentId>,
}

/// Optional filters for listing the caller's registrations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationFilter {
    #[serde(default)]
    pub leg_id: Option<LegId>,
    #[serde(default)]
    pub status: Option<RegistrationStatus>,
}

impl RegistrationFilter {
    pub fn matches(&self, registration: &Registration) -> bool {
        self.leg_id
            .as_ref()
            .map(|leg| leg == &registration.leg_id)
            .unwrap_or(true)
            && self
                .status
                .map(|status| status == registration.status)
                .unwrap_or(true)
    }
}
