use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
    Json,
};
use tracing::{error, info, warn};
use crate::services::auth_service::{get_auth_token, validate_jwt};
use crate::models::ErrorResponse;
use crate::AppState;

type Rejection = (StatusCode, Json<ErrorResponse>);

/// Only lets through callers holding a service token signed with our secret.
/// Without a configured secret every caller is let through.
pub async fn service_auth_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, Rejection> {

    let Some(secret) = &state.config.service_jwt_secret else {
        warn!("No SERVICE_JWT_SECRET configured - {} is unprotected", req.uri().path());
        return Ok(next.run(req).await);
    };

    // 1. Get the auth token from the request
    let token = get_auth_token(req.headers(), None)
        .ok_or_else(|| ErrorResponse::reply(StatusCode::UNAUTHORIZED, "Missing service token"))?;

    // 2. Validate Token
    let token_data = match validate_jwt(&token, secret) {
        Ok(token_data) => token_data,
        Err(e) => {
            error!("JWT validation failed: {}", e);
            return Err(ErrorResponse::reply(StatusCode::UNAUTHORIZED, "Invalid service token"));
        }
    };

    // 3. Only service tokens are accepted
    match token_data.claims.get("type").and_then(|v| v.as_str()) {
        Some("service") => {
            let caller = token_data.claims.get("sub").and_then(|v| v.as_str()).unwrap_or("unknown");
            info!("Service token validated for {}", caller);
            Ok(next.run(req).await)
        }
        other => {
            error!("Invalid token type: {:?}", other);
            Err(ErrorResponse::reply(StatusCode::UNAUTHORIZED, "Service token required"))
        }
    }
}
