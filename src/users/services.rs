use axum::extract::FromRef;
use tracing::{info, warn};
use uuid::Uuid;

use super::dto::{ChangePasswordRequest, LoginRequest, LoginResponse, ProfileUpdate, RegisterRequest};
use super::repo_types::{NewUser, PendingFriendRequest, ProfileChanges, PublicUser, User};
use crate::{
    auth::{
        jwt::JwtKeys,
        password::{hash_password, verify_password},
    },
    error::ApiError,
    images::services::{ext_from_mime, upload_profile_picture, UploadItem},
    state::AppState,
};

fn ensure_self(caller: Uuid, id: Uuid, action: &str) -> Result<(), ApiError> {
    if caller != id {
        warn!(%caller, target_id = %id, action, "attempt to act on another account");
        return Err(ApiError::Forbidden(format!("You can only {action} your own account")));
    }
    Ok(())
}

async fn fetch_user(st: &AppState, id: Uuid) -> Result<User, ApiError> {
    st.users
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))
}

pub async fn register(st: &AppState, req: RegisterRequest) -> Result<User, ApiError> {
    let req = req.validate()?;

    if st
        .users
        .find_by_user_name_or_email(&req.user_name, &req.email)
        .await?
        .is_some()
    {
        warn!(user_name = %req.user_name, email = %req.email, "identity already registered");
        return Err(ApiError::Conflict(
            "User already exists with this user name or email".into(),
        ));
    }

    let password_hash = hash_password(&req.password).await?;
    let user = st
        .users
        .create(NewUser {
            user_name: req.user_name,
            email: req.email,
            password_hash,
        })
        .await?;

    info!(user_id = %user.id, user_name = %user.user_name, "user registered");
    Ok(user)
}

pub async fn login(st: &AppState, req: LoginRequest) -> Result<LoginResponse, ApiError> {
    let req = req.validate()?;

    let user = st.users.find_by_email(&req.email).await?.ok_or_else(|| {
        warn!(email = %req.email, "login unknown email");
        ApiError::NotFound("User not found".into())
    })?;

    if !verify_password(&req.password, &user.password_hash).await? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(ApiError::Auth("Password doesn't match".into()));
    }

    let token = JwtKeys::from_ref(st).sign(&user)?;
    info!(user_id = %user.id, "user logged in");
    Ok(LoginResponse {
        token,
        user_id: user.id,
    })
}

pub async fn update_profile(
    st: &AppState,
    caller: Uuid,
    id: Uuid,
    update: ProfileUpdate,
    image: Option<UploadItem>,
) -> Result<User, ApiError> {
    ensure_self(caller, id, "update")?;
    let update = update.validate()?;

    if let Some(img) = &image {
        if ext_from_mime(&img.content_type).is_none() {
            return Err(ApiError::Validation(format!(
                "Unsupported image type {}",
                img.content_type
            )));
        }
        if img.body.is_empty() {
            return Err(ApiError::Validation("Uploaded image is empty".into()));
        }
    }

    fetch_user(st, id).await?;
    if let Some(name) = &update.user_name {
        if matches!(st.users.find_by_user_name(name).await?, Some(u) if u.id != id) {
            return Err(ApiError::Conflict("User name is already taken".into()));
        }
    }
    if let Some(email) = &update.email {
        if matches!(st.users.find_by_email(email).await?, Some(u) if u.id != id) {
            return Err(ApiError::Conflict("Email is already registered".into()));
        }
    }

    let profile_picture = match image {
        Some(img) => Some(upload_profile_picture(st, id, img).await?),
        None => None,
    };

    let changes = ProfileChanges {
        user_name: update.user_name,
        email: update.email,
        description: update.description,
        profile_picture,
    };
    let updated = st.users.update_profile(id, &changes).await;
    if !matches!(updated, Ok(Some(_))) {
        if let Some(url) = &changes.profile_picture {
            warn!(user_id = %id, %url, "profile write failed, uploaded picture is orphaned");
        }
    }
    let user = updated?.ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    info!(user_id = %id, picture = changes.profile_picture.is_some(), "profile updated");
    Ok(user)
}

pub async fn change_password(
    st: &AppState,
    caller: Uuid,
    id: Uuid,
    req: ChangePasswordRequest,
) -> Result<(), ApiError> {
    ensure_self(caller, id, "update")?;
    let req = req.validate()?;

    let user = fetch_user(st, id).await?;
    if !verify_password(&req.current_password, &user.password_hash).await? {
        warn!(user_id = %id, "password change with wrong current password");
        return Err(ApiError::Auth("Current password doesn't match".into()));
    }

    let hash = hash_password(&req.new_password).await?;
    if !st.users.update_password(id, &hash).await? {
        return Err(ApiError::NotFound("User not found".into()));
    }
    info!(user_id = %id, "password updated");
    Ok(())
}

pub async fn get_user(st: &AppState, id: Uuid) -> Result<PublicUser, ApiError> {
    Ok(fetch_user(st, id).await?.into())
}

/// `caller` asks `recipient_id` to become friends.
pub async fn send_friend_request(
    st: &AppState,
    caller: Uuid,
    recipient_id: Uuid,
) -> Result<(), ApiError> {
    if caller == recipient_id {
        return Err(ApiError::Validation(
            "You can't send a friend request to yourself".into(),
        ));
    }

    let recipient = fetch_user(st, recipient_id).await?;
    let sender = fetch_user(st, caller).await?;

    if recipient.request_from(sender.id).is_some() {
        return Err(ApiError::Conflict(
            "You have already sent a friend request to this user".into(),
        ));
    }
    if sender.is_friend_of(recipient.id) {
        return Err(ApiError::Conflict("You are already friends with this user".into()));
    }

    st.users.add_friend_request(recipient.id, sender.id).await?;
    info!(sender = %sender.id, recipient = %recipient.id, "friend request sent");
    Ok(())
}

/// `caller` accepts the request previously sent by `sender_id`.
pub async fn accept_friend_request(
    st: &AppState,
    caller: Uuid,
    sender_id: Uuid,
) -> Result<(), ApiError> {
    if caller == sender_id {
        return Err(ApiError::Validation(
            "You can't accept a friend request from yourself".into(),
        ));
    }

    let sender = fetch_user(st, sender_id).await?;
    let current = fetch_user(st, caller).await?;

    if current.request_from(sender.id).is_none() {
        return Err(ApiError::Conflict(
            "There is no friend request from this user".into(),
        ));
    }
    if current.is_friend_of(sender.id) {
        return Err(ApiError::Conflict("You are already friends with this user".into()));
    }

    st.users.accept_friend_request(current.id, sender.id).await?;
    info!(user_id = %current.id, friend = %sender.id, "friend request accepted");
    Ok(())
}

pub async fn pending_friend_requests(
    st: &AppState,
    caller: Uuid,
) -> Result<Vec<PendingFriendRequest>, ApiError> {
    Ok(st.users.pending_friend_requests(caller).await?)
}

pub async fn delete_account(st: &AppState, caller: Uuid, id: Uuid) -> Result<(), ApiError> {
    ensure_self(caller, id, "delete")?;
    if !st.users.delete(id).await? {
        return Err(ApiError::NotFound("User not found".into()));
    }
    info!(user_id = %id, "account deleted");
    Ok(())
}
