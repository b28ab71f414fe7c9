use axum::http::{header, HeaderMap};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct ServiceClaims {
    sub: String,
    #[serde(rename = "type")]
    type_: String,
    exp: usize,
}

// Get the identity token of a connecting viewer: explicit query parameter
// first, then the Authorization header, then the auth_token cookie.
pub fn get_auth_token(headers: &HeaderMap, query_token: Option<&str>) -> Option<String> {
    if let Some(token) = query_token.map(str::trim).filter(|t| !t.is_empty()) {
        return Some(token.to_string());
    }

    if let Some(auth_header) = headers.get(header::AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        return Some(auth_header.strip_prefix("Bearer ").unwrap_or(auth_header).to_string());
    }

    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;
    cookie::Cookie::split_parse(cookie_header)
        .filter_map(Result::ok)
        .find(|c| c.name() == "auth_token")
        .map(|c| c.value().to_string())
}

// Sign a short-lived token identifying this service to upstream collaborators
pub fn generate_service_token(service_name: &str, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let expiration = (Utc::now() + Duration::seconds(60)).timestamp();
    let claims = ServiceClaims {
        sub: service_name.to_string(),
        type_: "service".to_string(),
        exp: expiration as usize,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}

// Validate a JWT token and return the token data
pub fn validate_jwt(token: &str, secret: &str) -> Result<TokenData<serde_json::Value>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<serde_json::Value>(token, &decoding_key, &validation)
}
