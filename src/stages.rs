use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::info;

use crate::gemini::{ConceptGateway, GatewayError, GatewayRequest, PromptTemplate};
use crate::models::{ArchitecturalConcept, CivilConcept, InteriorConcept, StageRequirements};

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("model invocation failed: {0}")]
    Gateway(#[from] GatewayError),
    #[error("generated output violates the stage schema: {0}")]
    Schema(String),
}

/// Stage 1: the civil engineering concept. Every requirement field is
/// embedded verbatim; revision feedback, when present, is threaded as an
/// explicit block rather than left implicit.
pub async fn generate_civil(
    gateway: &dyn ConceptGateway,
    requirements: &StageRequirements,
    feedback: Option<&str>,
) -> Result<CivilConcept, GenerationError> {
    let prompt = format!(
        "You are a master Civil Engineer AI for BrickAi, known for creating clear, detailed, and professional-grade conceptual drawings.\n\
         Your task is to generate the first stage of a house plan: the Civil Engineering Concept.\n\
         Adhere strictly to the user's requirements. Produce high-quality, easy-to-understand conceptual drawings, plus a JSON object with the fields \
         floorAllocation, roomSizes, stairAndWetAreaLogic, assumptions, and disclaimer.\n\n\
         User Requirements:\n\
         - Property Details: {}\n\
         - Floors: {}\n\
         - Rooms (BHK): {}\n\
         - Budget: {}\n\
         - Purpose: {}\n\
         - Style Preference: {}\n\
         - Vastu Preference: {}\n\
         {}\n\
         The drawings required, in order: a conceptual civil layout (building placement, boundary lines, setbacks, access points), \
         a conceptual foundation plan (foundation type and layout), and a precise column layout grid.\n\
         In the text fields: define floor-wise space allocation, propose approximate room sizes, detail the logic for placing stairs \
         and wet areas (kitchen/bathrooms), and clearly state all assumptions made (soil, local bylaws, FSI). Include the mandatory disclaimer.",
        requirements.property_details,
        requirements.floors,
        requirements.rooms,
        requirements.budget_range,
        requirements.purpose,
        requirements.style_preference.as_deref().unwrap_or("none"),
        requirements.vastu_preference.as_deref().unwrap_or("none"),
        feedback_block(feedback),
    );

    info!(template = PromptTemplate::CivilConcept.id(), revision = feedback.is_some(), "Generating civil concept");
    invoke_validated(gateway, PromptTemplate::CivilConcept, prompt, vec![], CivilConcept::validate).await
}

/// Stage 2: the architectural concept, conditioned on the approved civil
/// concept. The civil layout drawing is attached for visual grounding and
/// the civil narrative fields are threaded for textual grounding.
///
/// The prompt instructs the model not to alter the core layout established
/// in stage 1. That contract lives in the prompt only; it is not
/// independently verifiable here.
pub async fn generate_architectural(
    gateway: &dyn ConceptGateway,
    civil: &CivilConcept,
    feedback: Option<&str>,
) -> Result<ArchitecturalConcept, GenerationError> {
    let prompt = format!(
        "You are an expert Architect AI for BrickAi, specializing in photorealistic 3D visualization.\n\
         Your task is to generate the second stage: the Architectural Concept.\n\
         You MUST build upon the approved Civil Concept drawing attached. Do not change the core layout.\n\n\
         Approved Civil Concept details:\n\
         - Floor allocation: {}\n\
         - Room sizes: {}\n\
         - Stair and wet area logic: {}\n\
         {}\n\
         Generate, in order: a photorealistic 3D floor plan (dollhouse view with rooms, doors, windows, basic furniture, \
         circulation paths) and a high-quality photorealistic 3D exterior rendering with depth and perspective.\n\
         Also return a JSON object with the fields zoning, lightAndVentilation, architecturalStyleNotes, and disclaimer: \
         detail the zoning strategy (public, private, service areas), the strategy for natural light and cross-ventilation, \
         and how the user's preferred style is reflected. Include the mandatory disclaimer.",
        civil.floor_allocation,
        civil.room_sizes,
        civil.stair_and_wet_area_logic,
        feedback_block(feedback),
    );

    info!(template = PromptTemplate::ArchitecturalConcept.id(), revision = feedback.is_some(), "Generating architectural concept");
    invoke_validated(
        gateway,
        PromptTemplate::ArchitecturalConcept,
        prompt,
        vec![civil.civil_plan_data_uri.clone()],
        ArchitecturalConcept::validate,
    )
    .await
}

/// Stage 3: the interior design concept, conditioned on the approved
/// architectural concept with the original civil concept for context.
pub async fn generate_interior(
    gateway: &dyn ConceptGateway,
    architectural: &ArchitecturalConcept,
    civil: &CivilConcept,
    feedback: Option<&str>,
) -> Result<InteriorConcept, GenerationError> {
    let prompt = format!(
        "You are a visionary Interior Designer AI for BrickAi.\n\
         Your task is to generate the final stage: the Interior Design Concept.\n\
         You MUST work within the approved architectural plan attached.\n\n\
         Approved Architectural Concept details:\n\
         - Zoning: {}\n\
         - Light and ventilation: {}\n\
         - Style notes: {}\n\
         Civil context: {}\n\
         {}\n\
         Generate, in order: a high-quality photorealistic 3D rendering of a key interior area showcasing the suggested palette, \
         materials, and lighting in action, and a clear 2D furniture layout diagram for key rooms showing traffic flow and spacing.\n\
         Also return a JSON object with the fields colorPalette, materialSuggestions, lightingConcept, conceptualImagePrompt, and \
         disclaimer: suggest a cohesive color palette, recommend materials for flooring, walls, and surfaces, describe a lighting \
         concept (ambient, task, accent), and provide a reusable image-generation prompt for the space. Include the mandatory disclaimer.",
        architectural.zoning,
        architectural.light_and_ventilation,
        architectural.architectural_style_notes,
        civil.floor_allocation,
        feedback_block(feedback),
    );

    info!(template = PromptTemplate::InteriorConcept.id(), revision = feedback.is_some(), "Generating interior concept");
    invoke_validated(
        gateway,
        PromptTemplate::InteriorConcept,
        prompt,
        vec![architectural.architectural_plan_data_uri.clone()],
        InteriorConcept::validate,
    )
    .await
}

pub(crate) fn feedback_block(feedback: Option<&str>) -> String {
    match feedback {
        Some(f) if !f.trim().is_empty() => {
            format!("\nUser Feedback for Revision:\n{}\n", f.trim())
        }
        _ => String::new(),
    }
}

pub(crate) async fn invoke_validated<T, F>(
    gateway: &dyn ConceptGateway,
    template: PromptTemplate,
    prompt: String,
    reference_images: Vec<String>,
    validate: F,
) -> Result<T, GenerationError>
where
    T: DeserializeOwned,
    F: Fn(&T) -> Result<(), String>,
{
    let output = gateway
        .invoke(GatewayRequest { template, prompt, reference_images })
        .await?;
    let parsed: T = serde_json::from_value(output).map_err(|e| GenerationError::Schema(e.to_string()))?;
    validate(&parsed).map_err(GenerationError::Schema)?;
    Ok(parsed)
}
