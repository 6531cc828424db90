/// Profile and account self-service routes
///
/// All handlers run behind the JWT middleware and act on the caller's own
/// account.

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::accounts::Profile;
use crate::auth::{validate_password_strength, AuthService, Identity};
use crate::error::{AppError, AuthError, DatabaseError, ErrorContext};
use crate::routes::auth::UserResponse;
use crate::validators::validate_profile;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

fn user_not_found() -> AppError {
    AppError::Database(DatabaseError::NotFound("User not found".to_string()))
}

/// GET /api/v1/users/profile
pub async fn get_profile(
    identity: web::ReqData<Identity>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let account = auth
        .accounts()
        .find_by_id(identity.user_id)
        .await?
        .ok_or_else(user_not_found)?;
    let profile = auth
        .accounts()
        .get_profile(identity.user_id)
        .await?
        .unwrap_or_default();

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "user": UserResponse::from(&account),
        "profile": profile,
    })))
}

/// PUT /api/v1/users/profile
pub async fn update_profile(
    identity: web::ReqData<Identity>,
    form: web::Json<Profile>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let profile = validate_profile(form.into_inner())?;
    let saved = auth
        .accounts()
        .upsert_profile(identity.user_id, profile)
        .await?;

    tracing::info!(user_id = %identity.user_id, "Profile updated");

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Profile updated successfully",
        "profile": saved,
    })))
}

/// PUT /api/v1/users/change-password
///
/// Every refresh session of the user is revoked on success.
pub async fn change_password(
    identity: web::ReqData<Identity>,
    form: web::Json<ChangePasswordRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("change_password").with_user_id(identity.user_id);

    let account = auth
        .accounts()
        .find_by_id(identity.user_id)
        .await?
        .ok_or_else(user_not_found)?;

    if !auth
        .hasher()
        .verify_password(&account.password_hash, &form.current_password)?
    {
        return Err(context.log_error(AuthError::InvalidCredentials.into()));
    }

    validate_password_strength(&form.new_password)?;
    let password_hash = auth.hasher().hash_password(&form.new_password)?;
    auth.accounts()
        .update_password(account.id, &password_hash)
        .await?;

    let revoked = auth.end_all_sessions(account.id).await?;
    tracing::info!(
        request_id = %context.request_id,
        user_id = %account.id,
        revoked_sessions = revoked,
        "Password changed"
    );

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Password changed successfully"
    })))
}

/// DELETE /api/v1/users/account
pub async fn delete_account(
    identity: web::ReqData<Identity>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    auth.end_all_sessions(identity.user_id).await?;
    auth.accounts().delete_account(identity.user_id).await?;

    tracing::info!(user_id = %identity.user_id, "Account deleted");

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Account deleted successfully"
    })))
}
