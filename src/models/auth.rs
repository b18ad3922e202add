use serde::{Deserialize, Serialize};

use super::admin::AdminProfile;

/// Claims embedded in the session token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,  // admin email
    pub name: String, // display name
    pub jti: String,
    pub exp: usize,
    pub iat: usize,
}

/// Extracted from a validated session token
#[derive(Debug, Clone, PartialEq)]
pub struct AdminSession {
    pub email: String,
    pub display_name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FederatedLoginRequest {
    pub id_token: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_in: u64,
    pub admin: AdminProfile,
}

/// Public sign-in settings the login page needs before anyone is signed in.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientAuthConfig {
    /// Present only when Google Sign-In is enabled.
    pub google_client_id: Option<String>,
}
