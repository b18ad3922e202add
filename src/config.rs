use std::env;

pub const DEFAULT_GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    pub jwt_expiry_seconds: u64,
    pub media_dir: String,
    pub static_dir: String,
    pub host: String,
    pub port: u16,
    pub app_base_url: String,
    // Federated sign-in (optional)
    pub google_client_id: Option<String>,
    pub google_tokeninfo_url: String,
    // Registration
    pub school_id_max_attempts: u32,
    pub admin_password_length: usize,
    pub max_logo_bytes: usize,
    pub login_rate_limit: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self {
            database_url: required("DATABASE_URL")?,
            redis_url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into()),
            jwt_secret: required("JWT_SECRET")?,
            jwt_expiry_seconds: env::var("JWT_EXPIRY_SECONDS")
                .unwrap_or_else(|_| "28800".into())
                .parse()?,
            media_dir: env::var("MEDIA_DIR").unwrap_or_else(|_| "/data/media".into()),
            static_dir: env::var("STATIC_DIR").unwrap_or_else(|_| "./static".into()),
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".into())
                .parse()?,
            app_base_url: env::var("APP_BASE_URL")
                .unwrap_or_else(|_| "http://localhost".into()),
            google_client_id: env::var("GOOGLE_CLIENT_ID").ok().filter(|s| !s.is_empty()),
            google_tokeninfo_url: env::var("GOOGLE_TOKENINFO_URL")
                .unwrap_or_else(|_| DEFAULT_GOOGLE_TOKENINFO_URL.into()),
            school_id_max_attempts: env::var("SCHOOL_ID_MAX_ATTEMPTS")
                .unwrap_or_else(|_| "25".into())
                .parse()?,
            admin_password_length: env::var("ADMIN_PASSWORD_LENGTH")
                .unwrap_or_else(|_| "10".into())
                .parse()?,
            max_logo_bytes: env::var("MAX_LOGO_BYTES")
                .unwrap_or_else(|_| (5 * 1024 * 1024).to_string())
                .parse()?,
            login_rate_limit: env::var("LOGIN_RATE_LIMIT")
                .unwrap_or_else(|_| "10".into())
                .parse()?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.school_id_max_attempts == 0 {
            anyhow::bail!("SCHOOL_ID_MAX_ATTEMPTS must be at least 1");
        }
        if self.admin_password_length < 8 {
            anyhow::bail!("ADMIN_PASSWORD_LENGTH must be at least 8");
        }
        Ok(())
    }

    /// Public base under which API routes are mounted.
    pub fn api_base_url(&self) -> String {
        format!("{}/api", self.app_base_url.trim_end_matches('/'))
    }
}

fn required(key: &str) -> anyhow::Result<String> {
    env::var(key).map_err(|_| anyhow::anyhow!("Missing required env var: {}", key))
}
