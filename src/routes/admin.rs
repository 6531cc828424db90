/// Admin routes, mounted behind the role gate for `admin`

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthService, Identity, Role};
use crate::error::{AppError, DatabaseError};
use crate::routes::auth::UserResponse;

#[derive(Deserialize)]
pub struct ChangeRoleRequest {
    pub role: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ProfileSummary {
    first_name: String,
    last_name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UserListEntry {
    id: i64,
    email: String,
    username: String,
    role: String,
    verified: bool,
    created_at: String,
    profile: ProfileSummary,
}

/// GET /api/v1/admin/users
pub async fn list_users(auth: web::Data<AuthService>) -> Result<HttpResponse, AppError> {
    let users: Vec<UserListEntry> = auth
        .accounts()
        .list_accounts()
        .await?
        .into_iter()
        .map(|(account, profile)| UserListEntry {
            id: account.id,
            email: account.email,
            username: account.username,
            role: account.role.to_string(),
            verified: account.email_verified,
            created_at: account.created_at.to_rfc3339(),
            profile: ProfileSummary {
                first_name: profile.first_name,
                last_name: profile.last_name,
            },
        })
        .collect();

    Ok(HttpResponse::Ok().json(serde_json::json!({ "users": users })))
}

/// PUT /api/v1/admin/users/{id}/role
///
/// The new role reaches the user's tokens at their next refresh.
pub async fn change_user_role(
    admin: web::ReqData<Identity>,
    path: web::Path<i64>,
    form: web::Json<ChangeRoleRequest>,
    auth: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let user_id = path.into_inner();
    let role: Role = form.role.parse()?;

    let account = auth
        .accounts()
        .set_role(user_id, role)
        .await?
        .ok_or_else(|| AppError::Database(DatabaseError::NotFound("User not found".to_string())))?;

    tracing::info!(
        admin_id = %admin.user_id,
        user_id = %account.id,
        role = %account.role,
        "User role updated"
    );

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "User role updated successfully",
        "user": UserResponse::from(&account),
    })))
}
