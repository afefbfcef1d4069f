use axum::{extract::State, Json};
use bcrypt::verify;
use crate::auth::jwt::{sign_token, ADMIN_ROLE, TOKEN_TTL_HOURS};
use crate::dtos::auth::{LoginRequest, LoginResponse};
use crate::error::AppError;
use crate::state::AppState;
use tracing::warn;

// POST /auth/login - Exchange the admin password for a bearer token
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    if payload.password.is_empty() {
        return Err(AppError::validation("Password required"));
    }

    let hash = state
        .config
        .admin_password_hash
        .as_deref()
        .ok_or_else(|| AppError::forbidden("Admin login is disabled"))?;

    let ok = verify(&payload.password, hash)
        .map_err(|e| AppError::internal(format!("Password verify error: {e}")))?;

    if !ok {
        warn!("Rejected admin login");
        return Err(AppError::unauthorized("Invalid credentials"));
    }

    let secret = state
        .config
        .jwt_secret
        .as_deref()
        .ok_or_else(|| AppError::internal("JWT secret not configured"))?;

    let token = sign_token(ADMIN_ROLE, ADMIN_ROLE, secret)?;

    Ok(Json(LoginResponse {
        access_token: token,
        token_type: "Bearer",
        expires_in_seconds: TOKEN_TTL_HOURS * 60 * 60,
    }))
}
