pub mod assets;
pub mod auth;
pub mod credentials;
pub mod gate;
pub mod ids;
pub mod plans;
pub mod schools;

/// Document layout.
pub mod paths {
    pub const SCHOOLS: &str = "schools";
    pub const PLANS: &str = "platformConfig/plans";
    pub const ADMINS: &str = "platformAdmins";

    /// Sub-collections created empty with every school.
    pub const PLACEHOLDER_COLLECTIONS: [&str; 4] = ["students", "teachers", "classes", "settings"];

    pub fn school(school_id: &str) -> String {
        format!("{SCHOOLS}/{school_id}")
    }

    pub fn placeholder(school_id: &str, collection: &str) -> String {
        format!("{SCHOOLS}/{school_id}/{collection}/_placeholder")
    }

    pub fn admin_credentials(school_id: &str) -> String {
        format!("{SCHOOLS}/{school_id}/auth/admin_credentials")
    }

    pub fn platform_admin(email: &str) -> String {
        format!("{ADMINS}/{email}")
    }
}
