//! Single-shot AI tools: construction material estimation and one-off
//! house-plan improvement. Both are thin template+validate wrappers over
//! the same gateway the staged workflow uses.

use tracing::info;

use crate::gemini::{ConceptGateway, PromptTemplate};
use crate::models::{
    MaterialEstimation, MaterialEstimationRequest, PlanImprovement, PlanImprovementRequest,
};
use crate::stages::{GenerationError, invoke_validated};

pub async fn estimate_materials(
    gateway: &dyn ConceptGateway,
    request: &MaterialEstimationRequest,
) -> Result<MaterialEstimation, GenerationError> {
    let prompt = format!(
        "You are an AI assistant for BrickAi, specializing in construction material estimation.\n\
         Based on standard construction practices in India, provide an approximate estimation of the key materials required \
         for a residential building with the following specifications:\n\n\
         - Total Built-up Area: {} sq. ft.\n\
         - Number of Floors: {}\n\n\
         Return a JSON object with a `materials` array of {{name, quantity}} entries (e.g., \"Cement\", \"800 bags\") covering \
         at a minimum Cement, Steel, Bricks, Sand, and Aggregate, and an `explanation` field with a brief explanation and a \
         disclaimer that these are preliminary estimates and a professional should be consulted for accurate costing.",
        request.built_up_area, request.floors,
    );

    info!(template = PromptTemplate::MaterialEstimation.id(), "Estimating materials");
    invoke_validated(gateway, PromptTemplate::MaterialEstimation, prompt, vec![], MaterialEstimation::validate).await
}

pub async fn improve_plan(
    gateway: &dyn ConceptGateway,
    request: &PlanImprovementRequest,
) -> Result<PlanImprovement, GenerationError> {
    let prompt = format!(
        "You are an AI assistant specialized in improving house plans.\n\
         You will receive an original house plan image (attached) for property {} and should generate an improved version of \
         the plan, explaining the changes made.\n\
         Return a JSON object with an `explanation` field detailing the changes. The improved plan must be returned as a PNG \
         image; do not use SVG or other formats.",
        request.property_id,
    );

    info!(template = PromptTemplate::PlanImprovement.id(), property_id = %request.property_id, "Improving plan");
    invoke_validated(
        gateway,
        PromptTemplate::PlanImprovement,
        prompt,
        vec![request.original_plan_data_uri.clone()],
        PlanImprovement::validate,
    )
    .await
}
