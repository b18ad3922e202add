use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{
        admin::{AdminProfile, PlatformAdmin},
        auth::{AdminSession, Claims, ClientAuthConfig, LoginResponse},
    },
    services::{credentials, paths},
    store::DocumentStore,
};

/// Identity asserted by a federated provider after token verification.
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedIdentity {
    pub email: String,
    pub name: Option<String>,
}

/// Verifies ID tokens issued by an external identity provider.
#[async_trait]
pub trait IdTokenVerifier: Send + Sync {
    async fn verify(&self, id_token: &str) -> AppResult<VerifiedIdentity>;
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: Option<String>,
    name: Option<String>,
}

/// Google Sign-In via the `tokeninfo` endpoint.
pub struct GoogleTokenVerifier {
    http: reqwest::Client,
    client_id: String,
    tokeninfo_url: String,
}

impl GoogleTokenVerifier {
    pub fn new(client_id: impl Into<String>, tokeninfo_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: client_id.into(),
            tokeninfo_url: tokeninfo_url.into(),
        }
    }
}

fn provider_error(reason: impl std::fmt::Display) -> AppError {
    AppError::Provider(format!("Google Sign-In Failed: {reason}"))
}

#[async_trait]
impl IdTokenVerifier for GoogleTokenVerifier {
    async fn verify(&self, id_token: &str) -> AppResult<VerifiedIdentity> {
        let response = self
            .http
            .get(&self.tokeninfo_url)
            .query(&[("id_token", id_token)])
            .send()
            .await
            .map_err(provider_error)?;
        if !response.status().is_success() {
            return Err(AppError::Unauthorized(
                "Google Sign-In Failed: the ID token was rejected".into(),
            ));
        }
        let info: TokenInfo = response.json().await.map_err(provider_error)?;

        if info.aud != self.client_id {
            return Err(AppError::Unauthorized(
                "Google Sign-In Failed: token issued for another application".into(),
            ));
        }
        let email = info
            .email
            .filter(|_| info.email_verified.as_deref() == Some("true"))
            .ok_or_else(|| {
                AppError::Unauthorized("Google Sign-In Failed: email not verified".into())
            })?;
        Ok(VerifiedIdentity {
            email,
            name: info.name,
        })
    }
}

/// Platform admin sign-in and session tokens.
#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn DocumentStore>,
    jwt_secret: String,
    token_ttl_seconds: u64,
    federated: Option<Arc<dyn IdTokenVerifier>>,
    google_client_id: Option<String>,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(store: Arc<dyn DocumentStore>, jwt_secret: impl Into<String>, token_ttl_seconds: u64) -> Self {
        Self {
            store,
            jwt_secret: jwt_secret.into(),
            token_ttl_seconds,
            federated: None,
            google_client_id: None,
            bcrypt_cost: credentials::BCRYPT_COST,
        }
    }

    pub fn with_federated(mut self, verifier: Arc<dyn IdTokenVerifier>) -> Self {
        self.federated = Some(verifier);
        self
    }

    /// Enables Google Sign-In for `client_id`, verified against
    /// `tokeninfo_url`.
    pub fn with_google(self, client_id: impl Into<String>, tokeninfo_url: impl Into<String>) -> Self {
        let client_id = client_id.into();
        let mut service =
            self.with_federated(Arc::new(GoogleTokenVerifier::new(client_id.clone(), tokeninfo_url)));
        service.google_client_id = Some(client_id);
        service
    }

    pub fn client_config(&self) -> ClientAuthConfig {
        ClientAuthConfig {
            google_client_id: self.google_client_id.clone(),
        }
    }

    pub fn with_bcrypt_cost(mut self, cost: u32) -> Self {
        self.bcrypt_cost = cost;
        self
    }

    pub fn token_ttl_seconds(&self) -> u64 {
        self.token_ttl_seconds
    }

    async fn find_admin(&self, email: &str) -> AppResult<Option<PlatformAdmin>> {
        let Some(data) = self.store.get(&paths::platform_admin(email)).await? else {
            return Ok(None);
        };
        serde_json::from_value(data)
            .map(Some)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Malformed admin record {email}: {e}")))
    }

    /// Email/password sign-in.
    pub async fn login(&self, email: &str, password: &str) -> AppResult<LoginResponse> {
        let email = normalize_email(email);
        if email.is_empty() || password.is_empty() {
            return Err(AppError::Validation("Email and password are required.".into()));
        }

        let admin = self
            .find_admin(&email)
            .await?
            .filter(|a| a.is_active)
            .ok_or(AppError::InvalidCredentials)?;
        let hash = admin
            .password_hash
            .as_deref()
            .ok_or(AppError::InvalidCredentials)?;
        if !credentials::verify_password(password, hash) {
            return Err(AppError::InvalidCredentials);
        }

        info!("Platform admin {} signed in", email);
        self.session_for(&admin)
    }

    /// Sign-in with a provider ID token. Only registered, active admins are
    /// let in.
    pub async fn federated_login(&self, id_token: &str) -> AppResult<LoginResponse> {
        let verifier = self.federated.as_ref().ok_or_else(|| {
            AppError::Provider("Google Sign-In Failed: sign-in provider not configured".into())
        })?;
        if id_token.trim().is_empty() {
            return Err(AppError::Validation("Missing ID token.".into()));
        }
        let identity = verifier.verify(id_token).await?;
        let email = normalize_email(&identity.email);

        let admin = match self.find_admin(&email).await? {
            Some(admin) if admin.is_active => admin,
            _ => {
                warn!("Federated sign-in refused for unregistered account {}", email);
                return Err(AppError::Unauthorized(
                    "Google Sign-In Failed: this account is not a platform administrator".into(),
                ));
            }
        };

        info!("Platform admin {} signed in via Google", email);
        self.session_for(&admin)
    }

    fn session_for(&self, admin: &PlatformAdmin) -> AppResult<LoginResponse> {
        Ok(LoginResponse {
            token: self.issue_token(admin)?,
            expires_in: self.token_ttl_seconds,
            admin: AdminProfile::from(admin),
        })
    }

    pub fn issue_token(&self, admin: &PlatformAdmin) -> AppResult<String> {
        let now = Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: admin.email.clone(),
            name: admin.display_name.clone(),
            jti: Uuid::new_v4().to_string(),
            iat: now,
            exp: now + self.token_ttl_seconds as usize,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(|e| AppError::Internal(e.into()))?;
        Ok(token)
    }

    pub fn decode_token(&self, token: &str) -> AppResult<AdminSession> {
        decode_session_token(token, &self.jwt_secret)
    }

    /// Registers or replaces a platform admin. Without a password the admin
    /// can only use federated sign-in.
    pub async fn create_admin(
        &self,
        email: &str,
        display_name: &str,
        password: Option<&str>,
    ) -> AppResult<PlatformAdmin> {
        let email = normalize_email(email);
        if !email.contains('@') || email.contains('/') {
            return Err(AppError::Validation(format!("Invalid email address: {email}")));
        }
        let display_name = display_name.trim();
        if display_name.is_empty() {
            return Err(AppError::Validation("Display name is required.".into()));
        }
        let password_hash = match password {
            Some(p) if p.len() < 8 => {
                return Err(AppError::Validation(
                    "Password must be at least 8 characters.".into(),
                ))
            }
            Some(p) => Some(credentials::hash_password(p, self.bcrypt_cost)?),
            None => None,
        };

        let admin = PlatformAdmin {
            email: email.clone(),
            display_name: display_name.to_string(),
            password_hash,
            is_active: true,
            created_at: Utc::now(),
        };
        let data = serde_json::to_value(&admin).map_err(|e| AppError::Internal(e.into()))?;
        self.store.set(&paths::platform_admin(&email), data).await?;
        info!("Platform admin {} saved", email);
        Ok(admin)
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn decode_session_token(token: &str, secret: &str) -> AppResult<AdminSession> {
    let key = DecodingKey::from_secret(secret.as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;

    let data = decode::<Claims>(token, &key, &validation)
        .map_err(|_| AppError::Unauthorized("Invalid or expired session".into()))?;
    Ok(AdminSession {
        email: data.claims.sub,
        display_name: data.claims.name,
    })
}
