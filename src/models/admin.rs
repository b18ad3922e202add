use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Platform operator account stored at `platformAdmins/{email}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformAdmin {
    pub email: String,
    pub display_name: String,
    /// Absent for accounts that may only use federated sign-in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(with = "super::timestamp")]
    pub created_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

/// Public view of an admin, without credentials.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminProfile {
    pub email: String,
    pub display_name: String,
}

impl From<&PlatformAdmin> for AdminProfile {
    fn from(admin: &PlatformAdmin) -> Self {
        Self {
            email: admin.email.clone(),
            display_name: admin.display_name.clone(),
        }
    }
}
