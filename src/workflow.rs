use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};

use crate::gemini::ConceptGateway;
use crate::models::{ArchitecturalConcept, CivilConcept, InteriorConcept, StageRequirements};
use crate::stages;

/// The ordered workflow stage. Advancement is strictly monotonic except for
/// `go_back`, which is pure navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Requirements,
    Civil,
    Architectural,
    Interior,
    Finalized,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Requirements => "requirements",
            Stage::Civil => "civil",
            Stage::Architectural => "architectural",
            Stage::Interior => "interior",
            Stage::Finalized => "finalized",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageStatus {
    Pending,
    Generated,
    Approved,
    Revision,
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Caller input failed a precondition before any generator ran.
    #[error("invalid input: {0}")]
    Validation(String),
    /// The gateway call failed or returned schema-violating output. The
    /// workflow state is exactly what it was before the transition.
    #[error("generation failed: {0}")]
    Generation(String),
    /// A transition was attempted from a stage that does not permit it.
    #[error("{transition} is not valid from the {stage} stage")]
    Sequence { transition: &'static str, stage: Stage },
}

impl From<stages::GenerationError> for WorkflowError {
    fn from(err: stages::GenerationError) -> Self {
        WorkflowError::Generation(err.to_string())
    }
}

/// A single planning workflow: one tagged state value owning the stage
/// cursor, per-stage statuses, and the stored concepts. Concepts are
/// retained for the life of the workflow and replaced wholesale on
/// revision, never merged. All transitions assume serial invocation;
/// callers serialize access.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanningWorkflow {
    stage: Stage,
    requirements: Option<StageRequirements>,
    civil: Option<CivilConcept>,
    civil_status: StageStatus,
    architectural: Option<ArchitecturalConcept>,
    architectural_status: StageStatus,
    interior: Option<InteriorConcept>,
    interior_status: StageStatus,
}

impl Default for PlanningWorkflow {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanningWorkflow {
    pub fn new() -> Self {
        Self {
            stage: Stage::Requirements,
            requirements: None,
            civil: None,
            civil_status: StageStatus::Pending,
            architectural: None,
            architectural_status: StageStatus::Pending,
            interior: None,
            interior_status: StageStatus::Pending,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn civil(&self) -> Option<&CivilConcept> {
        self.civil.as_ref()
    }

    pub fn civil_status(&self) -> StageStatus {
        self.civil_status
    }

    pub fn architectural(&self) -> Option<&ArchitecturalConcept> {
        self.architectural.as_ref()
    }

    pub fn architectural_status(&self) -> StageStatus {
        self.architectural_status
    }

    pub fn interior(&self) -> Option<&InteriorConcept> {
        self.interior.as_ref()
    }

    pub fn interior_status(&self) -> StageStatus {
        self.interior_status
    }

    pub fn requirements(&self) -> Option<&StageRequirements> {
        self.requirements.as_ref()
    }

    /// Transition 1: only valid from `requirements`. Runs stage 1 and, on
    /// success, moves to `civil` with status `generated`. On failure the
    /// workflow stays in `requirements` untouched.
    pub async fn submit_requirements(
        &mut self,
        gateway: &dyn ConceptGateway,
        requirements: StageRequirements,
    ) -> Result<(), WorkflowError> {
        self.expect_stage("submit_requirements", Stage::Requirements)?;
        requirements.validate().map_err(WorkflowError::Validation)?;

        let civil = stages::generate_civil(gateway, &requirements, None).await?;

        self.requirements = Some(requirements);
        self.civil = Some(civil);
        self.civil_status = StageStatus::Generated;
        self.stage = Stage::Civil;
        info!(stage = %self.stage, "Civil concept generated");
        Ok(())
    }

    /// Transition 2: regenerate the civil concept with feedback. The stored
    /// concept is replaced in full; status stays `generated` (a fresh
    /// generation is not yet approved) and the stage does not move.
    pub async fn revise_civil(
        &mut self,
        gateway: &dyn ConceptGateway,
        feedback: &str,
    ) -> Result<(), WorkflowError> {
        self.expect_stage("revise_civil", Stage::Civil)?;
        let feedback = non_empty_feedback(feedback)?;
        let requirements = self
            .requirements
            .as_ref()
            .ok_or_else(|| WorkflowError::Validation("no requirements on record".into()))?;

        let civil = stages::generate_civil(gateway, requirements, Some(feedback)).await?;

        self.civil = Some(civil);
        self.civil_status = StageStatus::Generated;
        info!(stage = %self.stage, "Civil concept regenerated from feedback");
        Ok(())
    }

    /// Transition 3: approval and next-stage generation are one transaction.
    /// Marks civil `approved`, moves to `architectural`, and runs stage 2;
    /// a generator failure rolls both back to their prior values.
    pub async fn approve_civil(
        &mut self,
        gateway: &dyn ConceptGateway,
        feedback: Option<&str>,
    ) -> Result<(), WorkflowError> {
        self.expect_stage("approve_civil", Stage::Civil)?;
        let civil = self
            .civil
            .clone()
            .ok_or_else(|| WorkflowError::Validation("no civil concept on record".into()))?;

        let prior_status = self.civil_status;
        self.civil_status = StageStatus::Approved;
        self.stage = Stage::Architectural;

        match stages::generate_architectural(gateway, &civil, feedback).await {
            Ok(architectural) => {
                self.architectural = Some(architectural);
                self.architectural_status = StageStatus::Generated;
                info!(stage = %self.stage, "Architectural concept generated");
                Ok(())
            }
            Err(err) => {
                self.stage = Stage::Civil;
                self.civil_status = prior_status;
                warn!(error = %err, "Architectural generation failed, approval rolled back");
                Err(err.into())
            }
        }
    }

    /// Transition 4: revision of the architectural stage. Requires non-empty
    /// feedback and regenerates stage 2 from the stored (approved) civil
    /// concept; the upstream stage itself is not regenerated.
    pub async fn revise_architectural(
        &mut self,
        gateway: &dyn ConceptGateway,
        feedback: &str,
    ) -> Result<(), WorkflowError> {
        let feedback = non_empty_feedback(feedback)?;
        self.expect_stage("revise_architectural", Stage::Architectural)?;
        let civil = self
            .civil
            .as_ref()
            .ok_or_else(|| WorkflowError::Validation("no civil concept on record".into()))?;

        let architectural = stages::generate_architectural(gateway, civil, Some(feedback)).await?;

        self.architectural = Some(architectural);
        self.architectural_status = StageStatus::Generated;
        info!(stage = %self.stage, "Architectural concept regenerated from feedback");
        Ok(())
    }

    /// Transition 5: analogous to `approve_civil`, one stage further.
    pub async fn approve_architectural(
        &mut self,
        gateway: &dyn ConceptGateway,
        feedback: Option<&str>,
    ) -> Result<(), WorkflowError> {
        self.expect_stage("approve_architectural", Stage::Architectural)?;
        let architectural = self
            .architectural
            .clone()
            .ok_or_else(|| WorkflowError::Validation("no architectural concept on record".into()))?;
        let civil = self
            .civil
            .clone()
            .ok_or_else(|| WorkflowError::Validation("no civil concept on record".into()))?;

        let prior_status = self.architectural_status;
        self.architectural_status = StageStatus::Approved;
        self.stage = Stage::Interior;

        match stages::generate_interior(gateway, &architectural, &civil, feedback).await {
            Ok(interior) => {
                self.interior = Some(interior);
                self.interior_status = StageStatus::Generated;
                info!(stage = %self.stage, "Interior concept generated");
                Ok(())
            }
            Err(err) => {
                self.stage = Stage::Architectural;
                self.architectural_status = prior_status;
                warn!(error = %err, "Interior generation failed, approval rolled back");
                Err(err.into())
            }
        }
    }

    /// Transition 6: revision of the interior stage, same pattern as
    /// transition 4 one stage later.
    pub async fn revise_interior(
        &mut self,
        gateway: &dyn ConceptGateway,
        feedback: &str,
    ) -> Result<(), WorkflowError> {
        let feedback = non_empty_feedback(feedback)?;
        self.expect_stage("revise_interior", Stage::Interior)?;
        let architectural = self
            .architectural
            .as_ref()
            .ok_or_else(|| WorkflowError::Validation("no architectural concept on record".into()))?;
        let civil = self
            .civil
            .as_ref()
            .ok_or_else(|| WorkflowError::Validation("no civil concept on record".into()))?;

        let interior = stages::generate_interior(gateway, architectural, civil, Some(feedback)).await?;

        self.interior = Some(interior);
        self.interior_status = StageStatus::Generated;
        info!(stage = %self.stage, "Interior concept regenerated from feedback");
        Ok(())
    }

    /// Transition 7: terminal. No generator call, no further transition.
    pub fn approve_interior(&mut self) -> Result<(), WorkflowError> {
        self.expect_stage("approve_interior", Stage::Interior)?;
        if self.interior.is_none() {
            return Err(WorkflowError::Validation("no interior concept on record".into()));
        }
        self.interior_status = StageStatus::Approved;
        self.stage = Stage::Finalized;
        info!(stage = %self.stage, "Plan finalized");
        Ok(())
    }

    /// Transition 8: pure navigation. Stored concepts and statuses are
    /// untouched so a prior stage's output can be re-viewed or re-approved.
    pub fn go_back(&mut self) -> Result<(), WorkflowError> {
        match self.stage {
            Stage::Architectural => {
                self.stage = Stage::Civil;
                Ok(())
            }
            Stage::Interior => {
                self.stage = Stage::Architectural;
                Ok(())
            }
            stage => Err(WorkflowError::Sequence { transition: "go_back", stage }),
        }
    }

    fn expect_stage(&self, transition: &'static str, expected: Stage) -> Result<(), WorkflowError> {
        if self.stage == expected {
            Ok(())
        } else {
            Err(WorkflowError::Sequence { transition, stage: self.stage })
        }
    }
}

fn non_empty_feedback(feedback: &str) -> Result<&str, WorkflowError> {
    let trimmed = feedback.trim();
    if trimmed.is_empty() {
        Err(WorkflowError::Validation("revision feedback must not be empty".into()))
    } else {
        Ok(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::{GatewayError, GatewayRequest};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};
    use std::collections::VecDeque;

    /// Replays a scripted queue of gateway responses in order.
    struct ScriptedGateway {
        responses: Mutex<VecDeque<Result<Value, String>>>,
    }

    impl ScriptedGateway {
        fn new(responses: Vec<Result<Value, String>>) -> Self {
            Self { responses: Mutex::new(responses.into()) }
        }
    }

    #[async_trait]
    impl crate::gemini::ConceptGateway for ScriptedGateway {
        async fn invoke(&self, _request: GatewayRequest) -> Result<Value, GatewayError> {
            self.responses
                .lock()
                .pop_front()
                .expect("gateway invoked more times than scripted")
                .map_err(GatewayError::Http)
        }
    }

    fn requirements() -> StageRequirements {
        StageRequirements {
            property_details: "p002 - Marunji, Pune".into(),
            floors: 2,
            rooms: 3,
            budget_range: "75L".into(),
            purpose: "self-use".into(),
            style_preference: Some("Modern".into()),
            vastu_preference: Some("flexible".into()),
        }
    }

    fn civil_json(tag: &str) -> Value {
        json!({
            "civilPlanDataUri": "data:image/png;base64,Y2l2aWw=",
            "foundationPlanDataUri": "data:image/png;base64,Zm91bmQ=",
            "columnLayoutDataUri": "data:image/png;base64,Y29s",
            "floorAllocation": format!("floor allocation {tag}"),
            "roomSizes": "Bedrooms 12x10 ft",
            "stairAndWetAreaLogic": "Stacked wet areas",
            "assumptions": "FSI 1.1",
        })
    }

    fn arch_json(tag: &str) -> Value {
        json!({
            "architecturalPlanDataUri": "data:image/png;base64,cGxhbg==",
            "threeDModelDataUri": "data:image/png;base64,bW9kZWw=",
            "zoning": format!("zoning {tag}"),
            "lightAndVentilation": "cross ventilation",
            "architecturalStyleNotes": "modern",
        })
    }

    fn interior_json(tag: &str) -> Value {
        json!({
            "interiorRenderDataUri": "data:image/png;base64,cmVuZGVy",
            "furnitureLayoutPlanDataUri": "data:image/png;base64,ZnVybg==",
            "colorPalette": format!("palette {tag}"),
            "materialSuggestions": "oak flooring",
            "lightingConcept": "ambient cove lighting",
            "conceptualImagePrompt": "warm modern living room",
        })
    }

    async fn workflow_at_interior() -> (PlanningWorkflow, ScriptedGateway) {
        let gateway = ScriptedGateway::new(vec![
            Ok(civil_json("v1")),
            Ok(arch_json("v1")),
            Ok(interior_json("v1")),
        ]);
        let mut wf = PlanningWorkflow::new();
        wf.submit_requirements(&gateway, requirements()).await.unwrap();
        wf.approve_civil(&gateway, None).await.unwrap();
        wf.approve_architectural(&gateway, None).await.unwrap();
        (wf, gateway)
    }

    #[tokio::test]
    async fn submit_requirements_reaches_civil_generated() {
        let gateway = ScriptedGateway::new(vec![Ok(civil_json("v1"))]);
        let mut wf = PlanningWorkflow::new();
        wf.submit_requirements(&gateway, requirements()).await.unwrap();

        assert_eq!(wf.stage(), Stage::Civil);
        assert_eq!(wf.civil_status(), StageStatus::Generated);
        let civil = wf.civil().unwrap();
        assert!(civil.validate().is_ok());
        assert_eq!(civil.floor_allocation, "floor allocation v1");
    }

    #[tokio::test]
    async fn submit_failure_leaves_draft_untouched() {
        let gateway = ScriptedGateway::new(vec![Err("model unavailable".into())]);
        let mut wf = PlanningWorkflow::new();
        let before = wf.clone();

        let err = wf.submit_requirements(&gateway, requirements()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Generation(_)));
        assert_eq!(wf, before);
    }

    #[tokio::test]
    async fn invalid_requirements_are_rejected_before_generation() {
        // zero scripted responses: the gateway must not be reached
        let gateway = ScriptedGateway::new(vec![]);
        let mut wf = PlanningWorkflow::new();
        let mut req = requirements();
        req.rooms = 0;

        let err = wf.submit_requirements(&gateway, req).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
        assert_eq!(wf.stage(), Stage::Requirements);
    }

    #[tokio::test]
    async fn revise_civil_replaces_concept_wholesale() {
        let gateway = ScriptedGateway::new(vec![Ok(civil_json("v1")), Ok(civil_json("v2"))]);
        let mut wf = PlanningWorkflow::new();
        wf.submit_requirements(&gateway, requirements()).await.unwrap();

        wf.revise_civil(&gateway, "push the kitchen to the rear").await.unwrap();

        assert_eq!(wf.stage(), Stage::Civil);
        assert_eq!(wf.civil_status(), StageStatus::Generated);
        let expected: CivilConcept = serde_json::from_value(civil_json("v2")).unwrap();
        assert_eq!(wf.civil().unwrap(), &expected);
    }

    #[tokio::test]
    async fn approve_civil_failure_rolls_back_exactly() {
        let gateway = ScriptedGateway::new(vec![Ok(civil_json("v1")), Err("overloaded".into())]);
        let mut wf = PlanningWorkflow::new();
        wf.submit_requirements(&gateway, requirements()).await.unwrap();
        let before = wf.clone();

        let err = wf.approve_civil(&gateway, None).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Generation(_)));
        assert_eq!(wf, before);
    }

    #[tokio::test]
    async fn approve_architectural_failure_rolls_back_exactly() {
        let gateway = ScriptedGateway::new(vec![
            Ok(civil_json("v1")),
            Ok(arch_json("v1")),
            Err("overloaded".into()),
        ]);
        let mut wf = PlanningWorkflow::new();
        wf.submit_requirements(&gateway, requirements()).await.unwrap();
        wf.approve_civil(&gateway, None).await.unwrap();
        let before = wf.clone();

        let err = wf.approve_architectural(&gateway, None).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Generation(_)));
        assert_eq!(wf, before);
    }

    #[tokio::test]
    async fn empty_feedback_revisions_are_rejected_without_state_change() {
        let (mut wf, _gateway) = workflow_at_interior().await;
        let gateway = ScriptedGateway::new(vec![]);

        let before = wf.clone();
        let err = wf.revise_interior(&gateway, "   ").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
        assert_eq!(wf, before);

        wf.go_back().unwrap();
        let before = wf.clone();
        let err = wf.revise_architectural(&gateway, "").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
        assert_eq!(wf, before);
    }

    #[tokio::test]
    async fn stage_order_is_enforced() {
        let gateway = ScriptedGateway::new(vec![Ok(civil_json("v1"))]);
        let mut wf = PlanningWorkflow::new();

        assert!(matches!(
            wf.approve_interior(),
            Err(WorkflowError::Sequence { transition: "approve_interior", .. })
        ));
        assert!(matches!(
            wf.approve_architectural(&gateway, None).await,
            Err(WorkflowError::Sequence { .. })
        ));
        assert!(matches!(wf.go_back(), Err(WorkflowError::Sequence { .. })));

        wf.submit_requirements(&gateway, requirements()).await.unwrap();
        assert!(matches!(
            wf.approve_architectural(&gateway, None).await,
            Err(WorkflowError::Sequence { .. })
        ));
        // reaching interior requires both upstream approvals
        assert_eq!(wf.civil_status(), StageStatus::Generated);
        assert_eq!(wf.architectural_status(), StageStatus::Pending);
    }

    #[tokio::test]
    async fn go_back_preserves_generated_concepts() {
        let (mut wf, _gateway) = workflow_at_interior().await;
        let interior_before: InteriorConcept = wf.interior().unwrap().clone();

        wf.go_back().unwrap();
        assert_eq!(wf.stage(), Stage::Architectural);
        assert_eq!(wf.architectural_status(), StageStatus::Approved);
        assert_eq!(wf.interior().unwrap(), &interior_before);

        // forward again: the stored interior survives until the fresh
        // approval overwrites it
        let gateway = ScriptedGateway::new(vec![Ok(interior_json("v2"))]);
        wf.approve_architectural(&gateway, None).await.unwrap();
        assert_eq!(wf.stage(), Stage::Interior);
        assert_eq!(wf.interior().unwrap().color_palette, "palette v2");
    }

    #[tokio::test]
    async fn end_to_end_scenario_reaches_finalized() {
        let gateway = ScriptedGateway::new(vec![
            Ok(civil_json("v1")),
            Ok(arch_json("v1")),
            Ok(interior_json("v1")),
        ]);
        let mut wf = PlanningWorkflow::new();

        wf.submit_requirements(&gateway, requirements()).await.unwrap();
        assert_eq!((wf.stage(), wf.civil_status()), (Stage::Civil, StageStatus::Generated));

        wf.approve_civil(&gateway, None).await.unwrap();
        assert_eq!((wf.stage(), wf.architectural_status()), (Stage::Architectural, StageStatus::Generated));
        assert_eq!(wf.civil_status(), StageStatus::Approved);

        wf.approve_architectural(&gateway, None).await.unwrap();
        assert_eq!((wf.stage(), wf.interior_status()), (Stage::Interior, StageStatus::Generated));
        assert_eq!(wf.architectural_status(), StageStatus::Approved);

        wf.approve_interior().unwrap();
        assert_eq!(wf.stage(), Stage::Finalized);
        assert_eq!(wf.interior_status(), StageStatus::Approved);

        // terminal: no further transitions are defined
        assert!(matches!(wf.approve_interior(), Err(WorkflowError::Sequence { .. })));
        assert!(matches!(wf.go_back(), Err(WorkflowError::Sequence { .. })));
    }

    #[tokio::test]
    async fn revision_regenerates_without_advancing() {
        let (mut wf, _gateway) = workflow_at_interior().await;
        let gateway = ScriptedGateway::new(vec![Ok(interior_json("v2"))]);

        wf.revise_interior(&gateway, "warmer palette please").await.unwrap();
        assert_eq!(wf.stage(), Stage::Interior);
        assert_eq!(wf.interior_status(), StageStatus::Generated);
        assert_eq!(wf.interior().unwrap().color_palette, "palette v2");
        // upstream approvals are untouched by a downstream revision
        assert_eq!(wf.civil_status(), StageStatus::Approved);
        assert_eq!(wf.architectural_status(), StageStatus::Approved);
    }
}
