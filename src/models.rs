use serde::{Serialize, Deserialize};

/// User requirements submitted at the start of a planning session.
/// Immutable once submitted; a revision is a new generation request,
/// never a mutation of these fields.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StageRequirements {
    pub property_details: String,
    pub floors: u32,
    pub rooms: u32,
    pub budget_range: String,
    pub purpose: String,
    #[serde(default)]
    pub style_preference: Option<String>,
    #[serde(default)]
    pub vastu_preference: Option<String>,
}

impl StageRequirements {
    pub fn validate(&self) -> Result<(), String> {
        if self.floors == 0 {
            return Err("floors must be a positive number".into());
        }
        if self.rooms == 0 {
            return Err("rooms must be a positive number".into());
        }
        require("propertyDetails", &self.property_details)?;
        require("budgetRange", &self.budget_range)?;
        require("purpose", &self.purpose)?;
        Ok(())
    }
}

/// Stage 1 output: conceptual civil engineering drawings plus narrative.
/// Artifact fields are opaque data URIs ("data:<mimetype>;base64,...").
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CivilConcept {
    pub civil_plan_data_uri: String,
    pub foundation_plan_data_uri: String,
    pub column_layout_data_uri: String,
    pub floor_allocation: String,
    pub room_sizes: String,
    pub stair_and_wet_area_logic: String,
    pub assumptions: String,
    #[serde(default = "civil_disclaimer")]
    pub disclaimer: String,
}

impl CivilConcept {
    pub fn validate(&self) -> Result<(), String> {
        require("civilPlanDataUri", &self.civil_plan_data_uri)?;
        require("foundationPlanDataUri", &self.foundation_plan_data_uri)?;
        require("columnLayoutDataUri", &self.column_layout_data_uri)?;
        require("floorAllocation", &self.floor_allocation)?;
        require("roomSizes", &self.room_sizes)?;
        require("stairAndWetAreaLogic", &self.stair_and_wet_area_logic)?;
        require("assumptions", &self.assumptions)?;
        require("disclaimer", &self.disclaimer)
    }
}

/// Stage 2 output: architectural floor plan and exterior rendering plus narrative.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArchitecturalConcept {
    pub architectural_plan_data_uri: String,
    pub three_d_model_data_uri: String,
    pub zoning: String,
    pub light_and_ventilation: String,
    pub architectural_style_notes: String,
    #[serde(default = "architectural_disclaimer")]
    pub disclaimer: String,
}

impl ArchitecturalConcept {
    pub fn validate(&self) -> Result<(), String> {
        require("architecturalPlanDataUri", &self.architectural_plan_data_uri)?;
        require("threeDModelDataUri", &self.three_d_model_data_uri)?;
        require("zoning", &self.zoning)?;
        require("lightAndVentilation", &self.light_and_ventilation)?;
        require("architecturalStyleNotes", &self.architectural_style_notes)?;
        require("disclaimer", &self.disclaimer)
    }
}

/// Stage 3 output: interior rendering and furniture layout plus narrative.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InteriorConcept {
    pub interior_render_data_uri: String,
    pub furniture_layout_plan_data_uri: String,
    pub color_palette: String,
    pub material_suggestions: String,
    pub lighting_concept: String,
    pub conceptual_image_prompt: String,
    #[serde(default = "interior_disclaimer")]
    pub disclaimer: String,
}

impl InteriorConcept {
    pub fn validate(&self) -> Result<(), String> {
        require("interiorRenderDataUri", &self.interior_render_data_uri)?;
        require("furnitureLayoutPlanDataUri", &self.furniture_layout_plan_data_uri)?;
        require("colorPalette", &self.color_palette)?;
        require("materialSuggestions", &self.material_suggestions)?;
        require("lightingConcept", &self.lighting_concept)?;
        require("conceptualImagePrompt", &self.conceptual_image_prompt)?;
        require("disclaimer", &self.disclaimer)
    }
}

fn require(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        Err(format!("missing required field: {}", field))
    } else {
        Ok(())
    }
}

fn civil_disclaimer() -> String {
    "This is a conceptual civil layout only. It is not for construction and requires validation by a licensed civil engineer.".to_string()
}

fn architectural_disclaimer() -> String {
    "This is a conceptual architectural plan. It requires validation by a licensed architect.".to_string()
}

fn interior_disclaimer() -> String {
    "This is a conceptual interior design. Final material and furniture selection should be done with a professional.".to_string()
}

//== AUXILIARY TOOL CONTRACTS =================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MaterialEstimationRequest {
    pub built_up_area: f64,
    pub floors: u32,
}

impl MaterialEstimationRequest {
    pub fn validate(&self) -> Result<(), String> {
        if !self.built_up_area.is_finite() || self.built_up_area <= 0.0 {
            return Err("builtUpArea must be a positive number".into());
        }
        if self.floors == 0 {
            return Err("floors must be a positive number".into());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MaterialLine {
    pub name: String,
    pub quantity: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MaterialEstimation {
    pub materials: Vec<MaterialLine>,
    pub explanation: String,
}

impl MaterialEstimation {
    pub fn validate(&self) -> Result<(), String> {
        if self.materials.is_empty() {
            return Err("missing required field: materials".into());
        }
        for line in &self.materials {
            require("materials.name", &line.name)?;
            require("materials.quantity", &line.quantity)?;
        }
        require("explanation", &self.explanation)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PlanImprovementRequest {
    pub property_id: String,
    pub original_plan_data_uri: String,
}

impl PlanImprovementRequest {
    pub fn validate(&self) -> Result<(), String> {
        require("propertyId", &self.property_id)?;
        require("originalPlanDataUri", &self.original_plan_data_uri)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlanImprovement {
    pub improved_plan_data_uri: String,
    pub explanation: String,
}

impl PlanImprovement {
    pub fn validate(&self) -> Result<(), String> {
        require("improvedPlanDataUri", &self.improved_plan_data_uri)?;
        require("explanation", &self.explanation)
    }
}
