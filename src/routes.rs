use axum::{Json, extract::{Path, State}, http::StatusCode, response::{IntoResponse, Response}};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::Arc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::gemini::ConceptGateway;
use crate::models::{MaterialEstimationRequest, PlanImprovementRequest, StageRequirements};
use crate::pdf::generate_pdf;
use crate::stages::GenerationError;
use crate::tools;
use crate::workflow::{PlanningWorkflow, Stage, WorkflowError};

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<RwLock<HashMap<Uuid, Arc<Mutex<PlanSession>>>>>,
    pub gateway: Arc<dyn ConceptGateway>,
}

impl AppState {
    pub fn new(gateway: Arc<dyn ConceptGateway>) -> Self {
        Self { sessions: Arc::default(), gateway }
    }
}

/// One user's planning session: the workflow state plus bookkeeping.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSession {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub workflow: PlanningWorkflow,
}

#[derive(Debug)]
pub enum ApiError {
    NotFound,
    Busy,
    Workflow(WorkflowError),
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        ApiError::Workflow(err)
    }
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        ApiError::Workflow(WorkflowError::Generation(err.to_string()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "session not found".to_string()),
            ApiError::Busy => (StatusCode::CONFLICT, "a generation is already in progress for this session".to_string()),
            ApiError::Workflow(err) => {
                let status = match &err {
                    WorkflowError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    WorkflowError::Generation(_) => StatusCode::BAD_GATEWAY,
                    WorkflowError::Sequence { .. } => StatusCode::CONFLICT,
                };
                (status, err.to_string())
            }
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct ReviseRequest {
    pub feedback: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct ApproveRequest {
    #[serde(default)]
    pub feedback: Option<String>,
}

fn session_handle(state: &AppState, id: Uuid) -> Result<Arc<Mutex<PlanSession>>, ApiError> {
    state.sessions.read().get(&id).cloned().ok_or(ApiError::NotFound)
}

/// Create a session and run stage 1 in the same request. The session is
/// only registered once the civil concept exists, so there are no
/// half-initialized sessions in the store.
pub async fn create_session(
    State(state): State<AppState>,
    Json(requirements): Json<StageRequirements>,
) -> Result<Json<PlanSession>, ApiError> {
    let mut workflow = PlanningWorkflow::new();
    workflow.submit_requirements(state.gateway.as_ref(), requirements).await?;

    let now = Utc::now();
    let session = PlanSession { id: Uuid::new_v4(), created_at: now, updated_at: now, workflow };
    tracing::info!(session_id = %session.id, "Planning session created");

    state
        .sessions
        .write()
        .insert(session.id, Arc::new(Mutex::new(session.clone())));
    Ok(Json(session))
}

/// Read-only snapshot. Waits for any in-flight transition instead of
/// returning busy; only overlapping transitions get rejected.
pub async fn get_session(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<PlanSession>, ApiError> {
    let handle = session_handle(&state, id)?;
    let session = handle.lock().await;
    Ok(Json(session.clone()))
}

macro_rules! transition_handler {
    ($name:ident, revise, $method:ident) => {
        pub async fn $name(
            Path(id): Path<Uuid>,
            State(state): State<AppState>,
            Json(body): Json<ReviseRequest>,
        ) -> Result<Json<PlanSession>, ApiError> {
            let handle = session_handle(&state, id)?;
            let mut session = handle.try_lock().map_err(|_| ApiError::Busy)?;
            session.workflow.$method(state.gateway.as_ref(), &body.feedback).await?;
            session.updated_at = Utc::now();
            Ok(Json(session.clone()))
        }
    };
    ($name:ident, approve, $method:ident) => {
        pub async fn $name(
            Path(id): Path<Uuid>,
            State(state): State<AppState>,
            body: Option<Json<ApproveRequest>>,
        ) -> Result<Json<PlanSession>, ApiError> {
            let handle = session_handle(&state, id)?;
            let mut session = handle.try_lock().map_err(|_| ApiError::Busy)?;
            let feedback = body.and_then(|Json(b)| b.feedback);
            session.workflow.$method(state.gateway.as_ref(), feedback.as_deref()).await?;
            session.updated_at = Utc::now();
            Ok(Json(session.clone()))
        }
    };
}

transition_handler!(revise_civil, revise, revise_civil);
transition_handler!(approve_civil, approve, approve_civil);
transition_handler!(revise_architectural, revise, revise_architectural);
transition_handler!(approve_architectural, approve, approve_architectural);
transition_handler!(revise_interior, revise, revise_interior);

pub async fn approve_interior(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<PlanSession>, ApiError> {
    let handle = session_handle(&state, id)?;
    let mut session = handle.try_lock().map_err(|_| ApiError::Busy)?;
    session.workflow.approve_interior()?;
    session.updated_at = Utc::now();
    Ok(Json(session.clone()))
}

pub async fn go_back(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<PlanSession>, ApiError> {
    let handle = session_handle(&state, id)?;
    let mut session = handle.try_lock().map_err(|_| ApiError::Busy)?;
    session.workflow.go_back()?;
    session.updated_at = Utc::now();
    Ok(Json(session.clone()))
}

pub async fn export_pdf(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Response, ApiError> {
    let handle = session_handle(&state, id)?;
    let session = handle.lock().await;
    if session.workflow.stage() != Stage::Finalized {
        return Err(ApiError::Workflow(WorkflowError::Sequence {
            transition: "export_pdf",
            stage: session.workflow.stage(),
        }));
    }

    let pdf_bytes = generate_pdf(&session);
    let mut headers = axum::http::HeaderMap::new();
    headers.insert(axum::http::header::CONTENT_TYPE, "application/pdf".parse().unwrap());
    headers.insert(
        axum::http::header::CONTENT_DISPOSITION,
        format!("attachment; filename=\"house_plan_{}.pdf\"", id).parse().unwrap(),
    );
    Ok((StatusCode::OK, headers, pdf_bytes).into_response())
}

pub async fn estimate_materials(
    State(state): State<AppState>,
    Json(request): Json<MaterialEstimationRequest>,
) -> Result<Json<crate::models::MaterialEstimation>, ApiError> {
    request
        .validate()
        .map_err(|e| ApiError::Workflow(WorkflowError::Validation(e)))?;
    let estimation = tools::estimate_materials(state.gateway.as_ref(), &request).await?;
    Ok(Json(estimation))
}

pub async fn improve_plan(
    State(state): State<AppState>,
    Json(request): Json<PlanImprovementRequest>,
) -> Result<Json<crate::models::PlanImprovement>, ApiError> {
    request
        .validate()
        .map_err(|e| ApiError::Workflow(WorkflowError::Validation(e)))?;
    let improvement = tools::improve_plan(state.gateway.as_ref(), &request).await?;
    Ok(Json(improvement))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::GeminiClient;
    use crate::workflow::StageStatus;

    fn demo_state() -> AppState {
        AppState::new(Arc::new(GeminiClient::new("DEMO_KEY".into())))
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

    #[tokio::test]
    async fn session_lifecycle_over_the_demo_gateway() {
        let state = demo_state();

        let Json(session) = create_session(State(state.clone()), Json(requirements())).await.unwrap();
        assert_eq!(session.workflow.stage(), Stage::Civil);
        assert_eq!(session.workflow.civil_status(), StageStatus::Generated);
        let id = session.id;

        let Json(session) = approve_civil(Path(id), State(state.clone()), None).await.unwrap();
        assert_eq!(session.workflow.stage(), Stage::Architectural);

        let Json(session) = approve_architectural(Path(id), State(state.clone()), None).await.unwrap();
        assert_eq!(session.workflow.stage(), Stage::Interior);

        let Json(session) = approve_interior(Path(id), State(state.clone())).await.unwrap();
        assert_eq!(session.workflow.stage(), Stage::Finalized);

        let response = export_pdf(Path(id), State(state)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn snapshot_reads_wait_for_in_flight_transitions() {
        let state = demo_state();
        let Json(session) = create_session(State(state.clone()), Json(requirements())).await.unwrap();
        let id = session.id;

        let handle = state.sessions.read().get(&id).cloned().unwrap();
        let guard = handle.lock().await;

        let read_state = state.clone();
        let read = tokio::spawn(async move { get_session(Path(id), State(read_state)).await });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!read.is_finished());

        drop(guard);
        let Json(snapshot) = read.await.unwrap().unwrap();
        assert_eq!(snapshot.id, id);
    }

    #[tokio::test]
    async fn unknown_session_is_404() {
        let state = demo_state();
        let err = get_session(Path(Uuid::new_v4()), State(state)).await.unwrap_err();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn error_statuses_follow_the_taxonomy() {
        let validation = ApiError::Workflow(WorkflowError::Validation("empty feedback".into())).into_response();
        assert_eq!(validation.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let generation = ApiError::Workflow(WorkflowError::Generation("model unavailable".into())).into_response();
        assert_eq!(generation.status(), StatusCode::BAD_GATEWAY);

        let sequence = ApiError::Workflow(WorkflowError::Sequence {
            transition: "approve_interior",
            stage: Stage::Civil,
        })
        .into_response();
        assert_eq!(sequence.status(), StatusCode::CONFLICT);

        let busy = ApiError::Busy.into_response();
        assert_eq!(busy.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn pdf_export_requires_a_finalized_plan() {
        let state = demo_state();
        let Json(session) = create_session(State(state.clone()), Json(requirements())).await.unwrap();

        let err = export_pdf(Path(session.id), State(state)).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn empty_revision_feedback_maps_to_422() {
        let state = demo_state();
        let Json(session) = create_session(State(state.clone()), Json(requirements())).await.unwrap();

        let err = revise_civil(
            Path(session.id),
            State(state),
            Json(ReviseRequest { feedback: "   ".into() }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
