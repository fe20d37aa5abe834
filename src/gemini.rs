use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, error};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("gateway call timed out after {0}s")]
    Timeout(u64),
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Fixed prompt templates, one per generative operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTemplate {
    CivilConcept,
    ArchitecturalConcept,
    InteriorConcept,
    MaterialEstimation,
    PlanImprovement,
}

impl PromptTemplate {
    pub fn id(&self) -> &'static str {
        match self {
            PromptTemplate::CivilConcept => "civilConceptPrompt",
            PromptTemplate::ArchitecturalConcept => "architecturalConceptPrompt",
            PromptTemplate::InteriorConcept => "interiorConceptPrompt",
            PromptTemplate::MaterialEstimation => "materialEstimationPrompt",
            PromptTemplate::PlanImprovement => "planImprovementPrompt",
        }
    }

    /// Output artifact fields, in the order inline images from the model
    /// are assigned to them.
    pub fn artifact_fields(&self) -> &'static [&'static str] {
        match self {
            PromptTemplate::CivilConcept => {
                &["civilPlanDataUri", "foundationPlanDataUri", "columnLayoutDataUri"]
            }
            PromptTemplate::ArchitecturalConcept => {
                &["architecturalPlanDataUri", "threeDModelDataUri"]
            }
            PromptTemplate::InteriorConcept => {
                &["interiorRenderDataUri", "furnitureLayoutPlanDataUri"]
            }
            PromptTemplate::MaterialEstimation => &[],
            PromptTemplate::PlanImprovement => &["improvedPlanDataUri"],
        }
    }
}

/// One gateway call: a template, the assembled prompt text, and any data-URI
/// reference images the generation should visually condition on.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
    pub template: PromptTemplate,
    pub prompt: String,
    pub reference_images: Vec<String>,
}

/// The model invocation boundary. Implementations turn a structured prompt
/// into a JSON object the caller validates against the stage's output schema.
#[async_trait]
pub trait ConceptGateway: Send + Sync {
    async fn invoke(&self, request: GatewayRequest) -> Result<Value, GatewayError>;
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        let base_url = std::env::var("GEMINI_API_BASE")
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".to_string());
        let timeout_secs = std::env::var("GATEWAY_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(120);
        Self {
            client: Client::new(),
            api_key,
            base_url,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    fn is_demo(&self) -> bool {
        self.api_key == "DEMO_KEY"
    }

    async fn perform_api_call(&self, request: &GatewayRequest) -> Result<Value, GatewayError> {
        let wants_images = !request.template.artifact_fields().is_empty();
        let model = if wants_images { "gemini-2.5-flash-image-preview" } else { "gemini-1.5-flash" };
        let url = format!("{}/models/{}:generateContent?key={}", self.base_url, model, self.api_key);

        info!(template = request.template.id(), "Making request to: {}", url.replace(&self.api_key, "***"));

        let mut parts = vec![json!({ "text": request.prompt })];
        for reference in &request.reference_images {
            let (mime, data) = split_data_uri(reference).ok_or_else(|| {
                GatewayError::InvalidResponse("reference image is not a data URI".into())
            })?;
            parts.push(json!({ "inlineData": { "mimeType": mime, "data": data } }));
        }

        let generation_config = if wants_images {
            json!({
                "responseModalities": ["TEXT", "IMAGE"],
                "temperature": 0.4,
                "topP": 0.95,
                "topK": 64,
                "candidateCount": 1
            })
        } else {
            json!({
                "responseMimeType": "application/json",
                "temperature": 0.7,
                "topK": 40,
                "topP": 0.95,
                "maxOutputTokens": 2048
            })
        };

        let request_body = json!({
            "contents": [{ "parts": parts }],
            "generationConfig": generation_config
        });

        let mut loggable = request_body.clone();
        truncate_base64_in_json(&mut loggable);
        info!("Request body: {}", serde_json::to_string(&loggable).unwrap_or_default());

        let send = self.client.post(&url).json(&request_body).send();
        let response = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| GatewayError::Timeout(self.timeout.as_secs()))?
            .map_err(|e| GatewayError::Http(e.to_string()))?;

        let status = response.status();
        info!(%status, "Response received");

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!("API error response: {}", error_body);
            return Err(GatewayError::Http(format!("status={} body={}", status, error_body)));
        }

        let response_text = response.text().await.map_err(|e| GatewayError::Http(e.to_string()))?;
        let parsed: GeminiResponse = serde_json::from_str(&response_text)
            .map_err(|e| GatewayError::InvalidResponse(format!("parse error: {}", e)))?;

        self.assemble_output(request.template, &parsed)
    }

    /// Combine the JSON text part and any inline images into the structured
    /// output object. Images are mapped, in response order, onto artifact
    /// fields the model did not already fill with a data URI.
    fn assemble_output(&self, template: PromptTemplate, response: &GeminiResponse) -> Result<Value, GatewayError> {
        let text = extract_text(response)
            .ok_or_else(|| GatewayError::InvalidResponse("no text content in response".into()))?;
        let mut output: Value = serde_json::from_str(strip_json_fences(&text))
            .map_err(|e| GatewayError::InvalidResponse(format!("output is not valid JSON: {}", e)))?;
        if !output.is_object() {
            return Err(GatewayError::InvalidResponse("output is not a JSON object".into()));
        }

        let mut images = extract_inline_images(response).into_iter();
        for field in template.artifact_fields() {
            let already_set = output
                .get(*field)
                .and_then(|v| v.as_str())
                .map(|s| s.starts_with("data:"))
                .unwrap_or(false);
            if already_set {
                continue;
            }
            if let Some(data_uri) = images.next() {
                output[*field] = Value::String(data_uri);
            }
        }

        let mut loggable = output.clone();
        truncate_base64_in_json(&mut loggable);
        info!(template = template.id(), "Assembled structured output: {}", loggable);
        Ok(output)
    }

    /// Deterministic offline output used when no real API key is configured.
    fn demo_output(&self, request: &GatewayRequest) -> Value {
        info!(template = request.template.id(), "Using demo mode - no real generation performed");
        let mut output = demo_text_fields(request.template);
        for field in request.template.artifact_fields() {
            output[*field] = Value::String(placeholder_data_uri(field));
        }
        output
    }
}

#[async_trait]
impl ConceptGateway for GeminiClient {
    async fn invoke(&self, request: GatewayRequest) -> Result<Value, GatewayError> {
        if self.is_demo() {
            return Ok(self.demo_output(&request));
        }
        self.perform_api_call(&request).await
    }
}

/// Split "data:<mime>;base64,<payload>" into its mime type and payload.
/// The payload itself stays opaque; it is never decoded here.
fn split_data_uri(uri: &str) -> Option<(&str, &str)> {
    let rest = uri.strip_prefix("data:")?;
    let (mime, payload) = rest.split_once(";base64,")?;
    if mime.is_empty() || payload.is_empty() {
        return None;
    }
    Some((mime, payload))
}

fn strip_json_fences(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|s| s.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

// Truncates base64 payloads in JSON so logs stay readable.
fn truncate_base64_in_json(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (_, val) in map.iter_mut() {
                if let Value::String(s) = val {
                    if s.len() > 100 && looks_like_base64_payload(s) {
                        *val = Value::String(format!("{}...[truncated {} chars]", &s[..50], s.len() - 50));
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

// ASCII-only on purpose: the byte slice above is only safe when every
// char is one byte, and real base64 payloads are always ASCII.
fn looks_like_base64_payload(s: &str) -> bool {
    let body = s.strip_prefix("data:").map(|rest| {
        rest.split_once(";base64,").map(|(_, b)| b).unwrap_or(rest)
    }).unwrap_or(s);
    body.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=')
}

/// Simple SVG placeholder for demo mode, wrapped as a data URI.
fn placeholder_data_uri(field: &str) -> String {
    let colors = ["#3B82F6", "#EF4444", "#10B981", "#F59E0B", "#8B5CF6"];
    let color = colors[field.len() % colors.len()];
    let label = match field {
        "civilPlanDataUri" => "Civil Layout",
        "foundationPlanDataUri" => "Foundation Plan",
        "columnLayoutDataUri" => "Column Layout",
        "architecturalPlanDataUri" => "Floor Plan",
        "threeDModelDataUri" => "Exterior Rendering",
        "interiorRenderDataUri" => "Interior Rendering",
        "furnitureLayoutPlanDataUri" => "Furniture Layout",
        "improvedPlanDataUri" => "Improved Plan",
        _ => "Concept Drawing",
    };
    let svg = format!(
        r#"<svg width="400" height="300" xmlns="http://www.w3.org/2000/svg">
            <rect width="400" height="300" fill="{}" />
            <text x="200" y="150" font-family="Arial, sans-serif" font-size="24" font-weight="bold"
                  text-anchor="middle" fill="white">{}</text>
            <text x="200" y="200" font-family="Arial, sans-serif" font-size="12"
                  text-anchor="middle" fill="white" opacity="0.8">BrickAi conceptual drawing</text>
        </svg>"#,
        color, label
    );
    let encoded = base64::engine::general_purpose::STANDARD.encode(svg.as_bytes());
    format!("data:image/svg+xml;base64,{}", encoded)
}

fn demo_text_fields(template: PromptTemplate) -> Value {
    match template {
        PromptTemplate::CivilConcept => json!({
            "floorAllocation": "Ground floor: living, dining, kitchen, one bedroom. Upper floors: remaining bedrooms with attached baths.",
            "roomSizes": "Living 16x14 ft, kitchen 10x8 ft, bedrooms 12x10 ft, baths 7x5 ft.",
            "stairAndWetAreaLogic": "Dog-legged staircase near the entrance core; kitchen and bathrooms stacked on a shared plumbing wall.",
            "assumptions": "Firm soil, FSI 1.1, 3 ft side setbacks, municipal water and sewer available.",
        }),
        PromptTemplate::ArchitecturalConcept => json!({
            "zoning": "Public zone at entry (living/dining), private zone above (bedrooms), service zone at rear (kitchen, utility).",
            "lightAndVentilation": "North-facing windows for diffuse light; cross-ventilation via aligned openings on opposite walls.",
            "architecturalStyleNotes": "Clean horizontal lines, flat roof with parapet, neutral render with wood accents.",
        }),
        PromptTemplate::InteriorConcept => json!({
            "colorPalette": "Warm white primary, sage green secondary, brass accents.",
            "materialSuggestions": "Engineered oak flooring, matte emulsion walls, quartz countertops.",
            "lightingConcept": "Recessed ambient cove lighting, pendant task lights over counters, accent spots on feature walls.",
            "conceptualImagePrompt": "Photorealistic render of a warm modern living room, sage and white palette, brass fixtures, soft morning light.",
        }),
        PromptTemplate::MaterialEstimation => json!({
            "materials": [
                { "name": "Cement", "quantity": "800 bags" },
                { "name": "Steel", "quantity": "6.5 tonnes" },
                { "name": "Bricks", "quantity": "45,000 units" },
                { "name": "Sand", "quantity": "3,200 cu. ft." },
                { "name": "Aggregate", "quantity": "2,800 cu. ft." }
            ],
            "explanation": "These quantities are approximate and for preliminary planning only. Consult a professional for accurate project costing.",
        }),
        PromptTemplate::PlanImprovement => json!({
            "explanation": "Widened the circulation path near the entry, moved the kitchen to share a plumbing wall with the bathroom, and added a window to the stairwell for natural light.",
        }),
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Content,
}

#[derive(Debug, Deserialize, Default)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Part {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    Text { text: String },
    Other(Value),
}

#[derive(Debug, Deserialize)]
struct InlineData {
    data: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
}

fn extract_text(resp: &GeminiResponse) -> Option<String> {
    for c in &resp.candidates {
        for p in &c.content.parts {
            if let Part::Text { text } = p {
                return Some(text.clone());
            }
        }
    }
    None
}

fn extract_inline_images(resp: &GeminiResponse) -> Vec<String> {
    let mut images = Vec::new();
    for c in &resp.candidates {
        for p in &c.content.parts {
            if let Part::Inline { inline_data } = p {
                info!("Found image data with mime type: {}", inline_data.mime_type);
                images.push(format!("data:{};base64,{}", inline_data.mime_type, inline_data.data));
            }
        }
    }
    images
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn split_data_uri_accepts_well_formed_uris() {
        let (mime, payload) = split_data_uri("data:image/png;base64,iVBORw0KGgo").unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(payload, "iVBORw0KGgo");
    }

    #[test]
    fn split_data_uri_rejects_plain_strings() {
        assert!(split_data_uri("not a data uri").is_none());
        assert!(split_data_uri("data:;base64,abc").is_none());
        assert!(split_data_uri("data:image/png;base64,").is_none());
    }

    #[test]
    fn strip_json_fences_handles_fenced_and_bare_json() {
        assert_eq!(strip_json_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_json_fences("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn truncate_base64_shortens_long_payloads() {
        let long = "A".repeat(400);
        let mut value = json!({ "civilPlanDataUri": format!("data:image/png;base64,{}", long), "zoning": "short" });
        truncate_base64_in_json(&mut value);
        let uri = value["civilPlanDataUri"].as_str().unwrap();
        assert!(uri.contains("truncated"));
        assert_eq!(value["zoning"], "short");
    }

    #[test]
    fn truncate_leaves_long_multibyte_text_intact() {
        // long, spaceless narrative text in a non-ASCII script must not be
        // mistaken for base64 (the truncation slice assumes ASCII)
        let narrative = "अभ".repeat(60);
        let mut value = json!({ "floorAllocation": narrative.clone() });
        truncate_base64_in_json(&mut value);
        assert_eq!(value["floorAllocation"], narrative);
    }

    #[test]
    fn placeholder_is_a_data_uri() {
        let uri = placeholder_data_uri("civilPlanDataUri");
        assert!(uri.starts_with("data:image/svg+xml;base64,"));
        assert!(split_data_uri(&uri).is_some());
    }

    #[test]
    fn inline_images_map_onto_artifact_fields() {
        let resp: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[
                {"text":"{\"zoning\":\"z\",\"lightAndVentilation\":\"l\",\"architecturalStyleNotes\":\"s\"}"},
                {"inlineData":{"mimeType":"image/png","data":"AAA"}},
                {"inlineData":{"mimeType":"image/png","data":"BBB"}}
            ]}}]}"#,
        )
        .unwrap();
        let client = GeminiClient::new("DEMO_KEY".into());
        let out = client.assemble_output(PromptTemplate::ArchitecturalConcept, &resp).unwrap();
        assert_eq!(out["architecturalPlanDataUri"], "data:image/png;base64,AAA");
        assert_eq!(out["threeDModelDataUri"], "data:image/png;base64,BBB");
        assert_eq!(out["zoning"], "z");
    }
}
