use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::authz::Subject;
use super::AppState;
use crate::directory::normalize_username;
use crate::error::{AppError, AppResult};
use crate::rbac::{parse_role_name, ResourceRole, RoleName};

#[derive(Debug, Serialize)]
pub struct Hello {
    pub message: &'static str,
    pub username: String,
}

#[derive(Debug, Serialize)]
pub struct UserRoles {
    pub username: String,
    pub roles: Vec<RoleName>,
}

#[derive(Debug, Serialize)]
pub struct OwnedIds {
    pub username: String,
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct RoleChange {
    pub username: String,
    pub role: RoleName,
    pub changed: bool,
}

/// Run a store mutation on the blocking pool; appends fsync under the
/// enforcer write lock.
async fn blocking<T, F>(f: F) -> AppResult<T>
where
    F: FnOnce() -> AppResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::internal("task_failed".to_string(), format!("role update task failed: {e}")))?
}

fn sorted_roles(state: &AppState, username: &str) -> AppResult<Vec<RoleName>> {
    let mut roles = state.enforcer.roles(username)?;
    roles.sort();
    Ok(roles)
}

pub async fn hello(Extension(subject): Extension<Subject>) -> Json<Hello> {
    Json(Hello { message: "hello", username: subject.0 })
}

pub async fn my_roles(State(state): State<AppState>, Extension(subject): Extension<Subject>) -> AppResult<Json<UserRoles>> {
    let roles = sorted_roles(&state, subject.as_str())?;
    Ok(Json(UserRoles { username: subject.0, roles }))
}

pub async fn my_studies(State(state): State<AppState>, Extension(subject): Extension<Subject>) -> AppResult<Json<OwnedIds>> {
    let ids = state.enforcer.study_ids_with_role(subject.as_str(), ResourceRole::Owner)?;
    Ok(Json(OwnedIds { username: subject.0, ids }))
}

pub async fn my_projects(State(state): State<AppState>, Extension(subject): Extension<Subject>) -> AppResult<Json<OwnedIds>> {
    let ids = state.enforcer.project_ids_with_role(subject.as_str(), ResourceRole::Owner)?;
    Ok(Json(OwnedIds { username: subject.0, ids }))
}

pub async fn user_roles(State(state): State<AppState>, Path(username): Path<String>) -> AppResult<Json<UserRoles>> {
    let username = normalize_username(&username)?.to_string();
    let roles = sorted_roles(&state, &username)?;
    Ok(Json(UserRoles { username, roles }))
}

pub async fn grant_role(
    State(state): State<AppState>,
    Extension(subject): Extension<Subject>,
    Path((username, role)): Path<(String, String)>,
) -> AppResult<Json<RoleChange>> {
    let role = parse_role_name(&role)?;
    let granted = role.clone();
    let (username, changed) = blocking(move || {
        let (user, _) = state.directory.find_or_create(&username)?;
        let changed = state.enforcer.add_role(&user.username, &granted)?;
        Ok((user.username, changed))
    })
    .await?;
    info!(target: "authz", by = subject.as_str(), user = %username, role = %role, changed, "role grant");
    Ok(Json(RoleChange { username, role, changed }))
}

pub async fn revoke_role(
    State(state): State<AppState>,
    Extension(subject): Extension<Subject>,
    Path((username, role)): Path<(String, String)>,
) -> AppResult<Json<RoleChange>> {
    let role = parse_role_name(&role)?;
    let username = normalize_username(&username)?.to_string();
    let (user, revoked) = (username.clone(), role.clone());
    let changed = blocking(move || Ok(state.enforcer.remove_role(&user, &revoked)?)).await?;
    info!(target: "authz", by = subject.as_str(), user = %username, role = %role, changed, "role revoke");
    Ok(Json(RoleChange { username, role, changed }))
}
