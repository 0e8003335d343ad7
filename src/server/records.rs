/// Record mutation routes.
///
/// Every write goes through the store, which resets the row's anchoring
/// columns so the next reconciler tick notarizes the new content.
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{patch, post, put};
use axum::{Json, Router};
use serde::Deserialize;

use super::error::{api_error, bad_request, ApiError};
use super::AppState;
use crate::state::models::{
    InterviewRecord, InterviewStatus, NewInterview, NewProject, NewResume, Project, ProjectStatus,
    Resume, ResumeContent,
};

pub fn record_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/projects", post(create_project))
        .route("/api/projects/{id}/status", patch(set_project_status))
        .route("/api/projects/{id}/participator", post(assign_participator))
        .route("/api/projects/{id}/files", post(attach_project_file))
        .route("/api/resumes", post(create_resume))
        .route("/api/resumes/{id}", put(update_resume))
        .route("/api/interviews", post(create_interview))
        .route("/api/interviews/{id}/status", patch(set_interview_status))
}

// ─── Projects ────────────────────────────────────────────

/// POST /api/projects
async fn create_project(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewProject>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    if req.name.trim().is_empty() {
        return Err(bad_request("name must not be empty"));
    }

    let project = state.store.create_project(req).await.map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(project)))
}

#[derive(Debug, Deserialize)]
struct ProjectStatusRequest {
    status: ProjectStatus,
}

/// PATCH /api/projects/{id}/status
async fn set_project_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<ProjectStatusRequest>,
) -> Result<Json<Project>, ApiError> {
    state
        .store
        .set_project_status(id, req.status)
        .await
        .map(Json)
        .map_err(api_error)
}

#[derive(Debug, Deserialize)]
struct ParticipatorRequest {
    name: String,
    uid: String,
}

/// POST /api/projects/{id}/participator
async fn assign_participator(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<ParticipatorRequest>,
) -> Result<Json<Project>, ApiError> {
    if req.uid.trim().is_empty() {
        return Err(bad_request("uid must not be empty"));
    }

    state
        .store
        .assign_participator(id, &req.name, &req.uid)
        .await
        .map(Json)
        .map_err(api_error)
}

#[derive(Debug, Deserialize)]
struct AttachFileRequest {
    file_id: i64,
}

/// POST /api/projects/{id}/files
async fn attach_project_file(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<AttachFileRequest>,
) -> Result<Json<Project>, ApiError> {
    state
        .store
        .attach_project_file(id, req.file_id)
        .await
        .map(Json)
        .map_err(api_error)
}

// ─── Resumes ─────────────────────────────────────────────

/// POST /api/resumes
async fn create_resume(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewResume>,
) -> Result<(StatusCode, Json<Resume>), ApiError> {
    if req.user_uid.trim().is_empty() {
        return Err(bad_request("user_uid must not be empty"));
    }

    let resume = state.store.create_resume(req).await.map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(resume)))
}

/// PUT /api/resumes/{id}
async fn update_resume(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<ResumeContent>,
) -> Result<Json<Resume>, ApiError> {
    state
        .store
        .update_resume(id, req)
        .await
        .map(Json)
        .map_err(api_error)
}

// ─── Interviews ──────────────────────────────────────────

/// POST /api/interviews
async fn create_interview(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewInterview>,
) -> Result<(StatusCode, Json<InterviewRecord>), ApiError> {
    if req.interviewee_uid.trim().is_empty() {
        return Err(bad_request("interviewee_uid must not be empty"));
    }

    let interview = state.store.create_interview(req).await.map_err(api_error)?;
    Ok((StatusCode::CREATED, Json(interview)))
}

#[derive(Debug, Deserialize)]
struct InterviewStatusRequest {
    status: InterviewStatus,
    #[serde(default)]
    comment: Option<String>,
}

/// PATCH /api/interviews/{id}/status
async fn set_interview_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<InterviewStatusRequest>,
) -> Result<Json<InterviewRecord>, ApiError> {
    state
        .store
        .set_interview_status(id, req.status, req.comment)
        .await
        .map(Json)
        .map_err(api_error)
}
