use std::sync::Arc;

use super::domain::{JourneyId, Requirement};
use super::repository::{RepositoryError, RequirementSource};

/// Ordered, journey-scoped view over stored requirements.
#[derive(Clone)]
pub struct RequirementCatalog {
    source: Arc<dyn RequirementSource>,
}

impl RequirementCatalog {
    pub fn new(source: Arc<dyn RequirementSource>) -> Self {
        Self { source }
    }

    /// Requirements of `journey_id`, sorted by `order` ascending.
    ///
    /// Rows belonging to other journeys are dropped so a misbehaving source can never widen
    /// what a registration is judged against.
    pub async fn load(&self, journey_id: &JourneyId) -> Result<Vec<Requirement>, RepositoryError> {
        let mut requirements: Vec<Requirement> = self
            .source
            .requirements_for(journey_id)
            .await?
            .into_iter()
            .filter(|requirement| &requirement.journey_id == journey_id)
            .collect();
        requirements.sort_by_key(|requirement| requirement.order);
        Ok(requirements)
    }

    pub async fn has_requirements(&self, journey_id: &JourneyId) -> Result<bool, RepositoryError> {
        Ok(self.source.count_for(journey_id).await? > 0)
    }

    pub async fn questions(
        &self,
        journey_id: &JourneyId,
    ) -> Result<Vec<Requirement>, RepositoryError> {
        Ok(self
            .load(journey_id)
            .await?
            .into_iter()
            .filter(|requirement| requirement.kind.is_question())
            .collect())
    }

    /// The journey's passport requirement, if it defines one.
    pub async fn passport_requirement(
        &self,
        journey_id: &JourneyId,
    ) -> Result<Option<Requirement>, RepositoryError> {
        Ok(self
            .load(journey_id)
            .await?
            .into_iter()
            .find(|requirement| requirement.kind.is_passport()))
    }
}
