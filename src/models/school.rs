use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::plan::Plan;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchoolStatus {
    Active,
    Inactive,
    Suspended,
}

/// Tenant record stored at `schools/{schoolId}`.
///
/// The admin password is never part of this document; only its bcrypt hash
/// is kept, under `schools/{schoolId}/auth/admin_credentials`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct School {
    pub school_id: String,
    pub name: String,
    pub city: String,
    pub admin_name: String,
    pub admin_email: String,
    /// Empty when the school has no logo.
    #[serde(default)]
    pub logo_url: String,
    pub plan: Plan,
    pub status: SchoolStatus,
    #[serde(with = "super::timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub school_type: Option<String>,
}

/// Registration form contents.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterSchoolInput {
    pub school_name: String,
    pub city: String,
    pub admin_name: String,
    pub admin_email: String,
    pub plan_key: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub school_type: Option<String>,
}

impl RegisterSchoolInput {
    /// Checks required fields before anything touches a backing service.
    pub fn validate(&self) -> Result<(), String> {
        if self.plan_key.trim().is_empty() {
            return Err("Please select a subscription plan.".into());
        }
        let required = [&self.school_name, &self.city, &self.admin_name, &self.admin_email];
        if required.iter().any(|v| v.trim().is_empty()) {
            return Err("Please fill out all required fields.".into());
        }
        if !self.admin_email.contains('@') {
            return Err("Invalid administrator email address.".into());
        }
        Ok(())
    }
}

/// Returned once after registration; the password is not retrievable later.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub school_id: String,
    pub admin_password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSchoolRequest {
    pub name: Option<String>,
    pub logo_url: Option<String>,
    pub status: Option<SchoolStatus>,
    /// Re-resolved against the catalog; the embedded plan is replaced whole.
    pub plan_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteConfirmation {
    /// Must repeat the school ID for the deletion to go ahead.
    pub confirm: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolStats {
    pub total: usize,
    pub normal: usize,
    pub pro: usize,
    pub ultra: usize,
    /// Counts for every plan name seen, including tiers beyond the built-in three.
    pub by_plan: BTreeMap<String, usize>,
}

pub fn compute_stats(schools: &[School]) -> SchoolStats {
    let mut stats = SchoolStats {
        total: schools.len(),
        ..Default::default()
    };
    for school in schools {
        match school.plan.name.as_str() {
            "Normal" => stats.normal += 1,
            "Pro" => stats.pro += 1,
            "Ultra" => stats.ultra += 1,
            _ => {}
        }
        *stats.by_plan.entry(school.plan.name.clone()).or_default() += 1;
    }
    stats
}

/// Full view pushed to dashboard listeners.
#[derive(Debug, Clone, Serialize)]
pub struct SchoolSnapshot {
    pub schools: Vec<School>,
    pub stats: SchoolStats,
}

impl SchoolSnapshot {
    pub fn new(schools: Vec<School>) -> Self {
        let stats = compute_stats(&schools);
        Self { schools, stats }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::plan::PlanLimits;

    fn school(id: &str, plan: &str) -> School {
        School {
            school_id: id.into(),
            name: format!("School {id}"),
            city: "Pune".into(),
            admin_name: "Admin".into(),
            admin_email: "admin@example.com".into(),
            logo_url: String::new(),
            plan: Plan {
                name: plan.into(),
                limits: PlanLimits {
                    students: 100,
                    teachers: 10,
                },
                allowed_features: vec![],
            },
            status: SchoolStatus::Active,
            created_at: Utc::now(),
            phone: None,
            address: None,
            school_type: None,
        }
    }

    #[test]
    fn stats_count_each_tier() {
        let schools = vec![
            school("1", "Normal"),
            school("2", "Pro"),
            school("3", "Normal"),
            school("4", "Ultra"),
            school("5", "Pro"),
        ];
        let stats = compute_stats(&schools);
        assert_eq!(stats.total, 5);
        assert_eq!((stats.normal, stats.pro, stats.ultra), (2, 2, 1));
        assert_eq!(stats.by_plan.values().sum::<usize>(), 5);
    }

    #[test]
    fn stats_of_empty_list() {
        assert_eq!(compute_stats(&[]), SchoolStats::default());
    }

    #[test]
    fn unknown_tiers_only_appear_in_by_plan() {
        let stats = compute_stats(&[school("1", "Trial")]);
        assert_eq!(stats.total, 1);
        assert_eq!(stats.normal + stats.pro + stats.ultra, 0);
        assert_eq!(stats.by_plan.get("Trial"), Some(&1));
    }

    #[test]
    fn validation_reports_missing_fields() {
        let mut input = RegisterSchoolInput {
            school_name: "Green Valley".into(),
            city: "Pune".into(),
            admin_name: "R. Iyer".into(),
            admin_email: "admin@greenvalley.edu".into(),
            plan_key: "Pro".into(),
            ..Default::default()
        };
        assert!(input.validate().is_ok());

        input.city = "  ".into();
        assert_eq!(input.validate().unwrap_err(), "Please fill out all required fields.");

        input.city = "Pune".into();
        input.plan_key.clear();
        assert_eq!(input.validate().unwrap_err(), "Please select a subscription plan.");
    }

    #[test]
    fn record_round_trips_through_stored_shape() {
        let original = school("SCH2026-12345", "Pro");
        let value = serde_json::to_value(&original).unwrap();
        assert_eq!(value["schoolId"], "SCH2026-12345");
        assert_eq!(value["status"], "active");
        assert!(value.get("phone").is_none());
        let back: School = serde_json::from_value(value).unwrap();
        assert_eq!(back.school_id, original.school_id);
    }
}
