/// Authentication Routes
///
/// Registration, login, token refresh and logout.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::accounts::{Account, NewAccount};
use crate::auth::{validate_password_strength, AuthService, Identity, TokenPair};
use crate::error::{AppError, ErrorContext};
use crate::validators::{is_valid_email, is_valid_username};

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

/// `login` is an email address or a username
#[derive(Deserialize)]
pub struct LoginRequest {
    pub login: String,
    pub password: String,
}

/// Body of both refresh and logout
#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub role: String,
}

impl From<&Account> for UserResponse {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            email: account.email.clone(),
            username: account.username.clone(),
            role: account.role.to_string(),
        }
    }
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserResponse,
}

impl AuthResponse {
    fn new(tokens: TokenPair, account: &Account) -> Self {
        Self {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: tokens.expires_in,
            user: UserResponse::from(account),
        }
    }
}

/// POST /api/v1/auth/register
///
/// # Errors
/// - 400: invalid email, username or weak password
/// - 409: email or username already taken
pub async fn register(
    form: web::Json<RegisterRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_registration");

    let email = is_valid_email(&form.email)?;
    let username = is_valid_username(&form.username)?;
    validate_password_strength(&form.password)?;
    let password_hash = auth.hasher().hash_password(&form.password)?;

    let account = auth
        .accounts()
        .create_account(NewAccount {
            email,
            username,
            password_hash,
        })
        .await?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %account.id,
        email = %account.email,
        "User registered, verification email would be sent"
    );

    Ok(HttpResponse::Created().json(serde_json::json!({
        "message": "User registered successfully",
        "user": UserResponse::from(&account),
    })))
}

/// POST /api/v1/auth/login
///
/// Unknown login and wrong password get the same 401.
pub async fn login(
    form: web::Json<LoginRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_login");

    let account = auth
        .verify_credentials(form.login.trim(), &form.password)
        .await?;
    let tokens = auth
        .issue_session(account.id, account.role)
        .await
        .map_err(|e| context.clone().with_user_id(account.id).log_error(e))?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %account.id,
        "User logged in successfully"
    );

    Ok(HttpResponse::Ok().json(AuthResponse::new(tokens, &account)))
}

/// POST /api/v1/auth/refresh
///
/// Rotates the presented refresh token: it cannot be used again.
pub async fn refresh(
    form: web::Json<RefreshRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let rotated = auth.refresh_session(&form.refresh_token).await?;

    Ok(HttpResponse::Ok().json(AuthResponse::new(rotated.tokens, &rotated.account)))
}

/// POST /api/v1/auth/logout
///
/// Revokes the given refresh token; repeating the call is harmless.
pub async fn logout(
    identity: web::ReqData<Identity>,
    form: web::Json<RefreshRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    auth.end_session(&form.refresh_token).await?;

    tracing::info!(user_id = %identity.user_id, "User logged out");

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Successfully logged out"
    })))
}
