use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection},
        DefaultBodyLimit, Multipart, Path, State,
    },
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use tracing::{debug, instrument};
use uuid::Uuid;

use super::dto::{
    ChangePasswordRequest, LoginRequest, LoginResponse, ProfileUpdate, RegisterRequest, UserData,
};
use super::repo_types::{PendingFriendRequest, User};
use super::services;
use crate::{
    auth::extractors::AuthUser, error::ApiError, images::services::UploadItem,
    response::ApiResponse, state::AppState,
};

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/u/:user_id", get(get_user))
}

pub fn protected_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/:id", put(update_profile).delete(delete_account))
        .route("/update-password/:id", put(change_password))
        .route("/:id/friend-request", post(send_friend_request))
        .route("/:id/friend-request/accept", post(accept_friend_request))
        .route("/friend-requests", get(pending_friend_requests))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ApiResponse<User>>), ApiError> {
    let Json(req) = payload?;
    let user = services::register(&state, req).await?;
    Ok((
        StatusCode::CREATED,
        ApiResponse::with_data("Account created successfully", user),
    ))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<LoginResponse> {
    let Json(req) = payload?;
    let res = services::login(&state, req).await?;
    Ok(ApiResponse::with_data("Success", res))
}

/// PUT /:id (multipart): text fields `userName`, `email`, `description`
/// and at most one image file part.
#[instrument(skip(state, id, mp))]
pub async fn update_profile(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
    mp: Result<Multipart, MultipartRejection>,
) -> ApiResult<User> {
    let Path(id) = id?;
    let mut mp = mp?;
    let (update, image) = read_profile_form(&mut mp).await?;
    let user = services::update_profile(&state, user_id, id, update, image).await?;
    Ok(ApiResponse::with_data("Updated successfully", user))
}

fn bad_multipart(e: MultipartError) -> ApiError {
    ApiError::Validation(format!("Invalid multipart body: {}", e))
}

async fn read_profile_form(
    mp: &mut Multipart,
) -> Result<(ProfileUpdate, Option<UploadItem>), ApiError> {
    let mut update = ProfileUpdate::default();
    let mut image = None;

    while let Some(field) = mp.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();

        if field.file_name().is_some() {
            if image.is_some() {
                debug!(field = %name, "ignoring extra file part");
                continue;
            }
            let content_type = field
                .content_type()
                .unwrap_or("application/octet-stream")
                .to_string();
            let body = field.bytes().await.map_err(bad_multipart)?;
            image = Some(UploadItem { body, content_type });
            continue;
        }

        let value = field.text().await.map_err(bad_multipart)?;
        match name.as_str() {
            "userName" => update.user_name = Some(value),
            "email" => update.email = Some(value),
            "description" => update.description = Some(value),
            // profilePic and anything unknown
            other => debug!(field = %other, "ignoring form field"),
        }
    }

    Ok((update, image))
}

#[instrument(skip(state, id, payload))]
pub async fn change_password(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> ApiResult<()> {
    let Path(id) = id?;
    let Json(req) = payload?;
    services::change_password(&state, user_id, id, req).await?;
    Ok(ApiResponse::message("Password updated successfully"))
}

#[instrument(skip(state, id))]
pub async fn get_user(
    State(state): State<AppState>,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<UserData> {
    let Path(id) = id?;
    let user = services::get_user(&state, id).await?;
    Ok(ApiResponse::with_data("Success", UserData { user }))
}

#[instrument(skip(state, id))]
pub async fn send_friend_request(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<()> {
    let Path(id) = id?;
    services::send_friend_request(&state, user_id, id).await?;
    Ok(ApiResponse::message("Friend request sent"))
}

#[instrument(skip(state, id))]
pub async fn accept_friend_request(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<()> {
    let Path(id) = id?;
    services::accept_friend_request(&state, user_id, id).await?;
    Ok(ApiResponse::message("Friend request accepted"))
}

#[instrument(skip(state))]
pub async fn pending_friend_requests(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
) -> ApiResult<Vec<PendingFriendRequest>> {
    let pending = services::pending_friend_requests(&state, user_id).await?;
    Ok(ApiResponse::with_data("Success", pending))
}

#[instrument(skip(state, id))]
pub async fn delete_account(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    id: Result<Path<Uuid>, PathRejection>,
) -> ApiResult<()> {
    let Path(id) = id?;
    services::delete_account(&state, user_id, id).await?;
    Ok(ApiResponse::message("Account deleted"))
}
