use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Limit value meaning "no limit".
pub const UNLIMITED: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLimits {
    pub students: i64,
    pub teachers: i64,
}

impl PlanLimits {
    pub fn validate(&self) -> Result<(), String> {
        if self.students < UNLIMITED || self.teachers < UNLIMITED {
            return Err("Limits must be -1 (unlimited) or a non-negative number".into());
        }
        Ok(())
    }
}

/// A subscription tier. Schools embed a copy of this at assignment time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub name: String,
    pub limits: PlanLimits,
    #[serde(default)]
    pub allowed_features: Vec<String>,
}

/// Contents of the `platformConfig/plans` singleton, keyed by tier.
pub type PlanCatalogMap = BTreeMap<String, Plan>;

/// Editable list of feature flags for one plan while it is being edited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeatureList {
    features: Vec<String>,
}

impl FeatureList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a comma separated list, trimming entries and skipping blanks
    /// and duplicates.
    pub fn from_csv(raw: &str) -> Self {
        let mut list = Self::new();
        for item in raw.split(',') {
            list.add(item);
        }
        list
    }

    /// Appends a feature. Returns `false` when it is blank or already listed.
    pub fn add(&mut self, feature: &str) -> bool {
        let feature = feature.trim();
        if feature.is_empty() || self.contains(feature) {
            return false;
        }
        self.features.push(feature.to_string());
        true
    }

    /// Renames the entry at `index`. Blank names and names used by another
    /// entry are rejected.
    pub fn edit(&mut self, index: usize, feature: &str) -> Result<(), String> {
        let feature = feature.trim();
        if feature.is_empty() {
            return Err("Feature name cannot be empty".into());
        }
        if self
            .features
            .iter()
            .enumerate()
            .any(|(i, f)| i != index && f == feature)
        {
            return Err(format!("Feature '{feature}' is already listed"));
        }
        let slot = self
            .features
            .get_mut(index)
            .ok_or_else(|| format!("No feature at position {index}"))?;
        *slot = feature.to_string();
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Option<String> {
        (index < self.features.len()).then(|| self.features.remove(index))
    }

    pub fn contains(&self, feature: &str) -> bool {
        self.features.iter().any(|f| f == feature)
    }

    pub fn as_slice(&self) -> &[String] {
        &self.features
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn into_vec(self) -> Vec<String> {
        self.features
    }
}

impl<S: AsRef<str>> FromIterator<S> for FeatureList {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut list = Self::new();
        for item in iter {
            list.add(item.as_ref());
        }
        list
    }
}

/// Features as sent by clients: either a list or the comma separated text
/// of the edit form.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FeaturesInput {
    List(Vec<String>),
    Csv(String),
}

impl From<FeaturesInput> for FeatureList {
    fn from(input: FeaturesInput) -> Self {
        match input {
            FeaturesInput::List(items) => items.into_iter().collect(),
            FeaturesInput::Csv(raw) => FeatureList::from_csv(&raw),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePlanRequest {
    pub limits: PlanLimits,
    pub features: FeaturesInput,
    /// Also rewrite `allowedFeatures` on every school currently on this tier.
    #[serde(default)]
    pub propagate_to_schools: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanUpdateOutcome {
    pub key: String,
    pub plan: Plan,
    pub schools_updated: usize,
}

/// Catalog installed by `seed-platform plans`.
pub fn default_catalog() -> PlanCatalogMap {
    fn plan(name: &str, students: i64, teachers: i64, features: &[&str]) -> Plan {
        Plan {
            name: name.to_string(),
            limits: PlanLimits { students, teachers },
            allowed_features: features.iter().map(|f| f.to_string()).collect(),
        }
    }
    BTreeMap::from([
        (
            "Normal".to_string(),
            plan("Normal", 300, 20, &["attendance", "students", "teachers"]),
        ),
        (
            "Pro".to_string(),
            plan(
                "Pro",
                1000,
                80,
                &["attendance", "students", "teachers", "exams", "fees"],
            ),
        ),
        (
            "Ultra".to_string(),
            plan(
                "Ultra",
                UNLIMITED,
                UNLIMITED,
                &["attendance", "students", "teachers", "exams", "fees", "transport", "analytics"],
            ),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn csv_input_is_trimmed_and_deduplicated() {
        let list = FeatureList::from_csv(" exams, fees ,, exams,");
        assert_eq!(list.as_slice(), ["exams", "fees"]);
        assert!(FeatureList::from_csv("").is_empty());
    }

    #[test]
    fn edit_and_remove_entries() {
        let mut list: FeatureList = ["attendance", "fees"].into_iter().collect();
        assert!(list.add("exams"));
        assert!(!list.add("fees"));

        list.edit(1, "billing").unwrap();
        assert!(list.edit(0, "exams").is_err());
        assert!(list.edit(9, "x").is_err());
        assert!(list.edit(0, "  ").is_err());

        assert_eq!(list.remove(0).as_deref(), Some("attendance"));
        assert_eq!(list.remove(5), None);
        assert_eq!(list.into_vec(), vec!["billing", "exams"]);
    }

    #[test]
    fn unlimited_limits() {
        let limits = PlanLimits {
            students: UNLIMITED,
            teachers: 10,
        };
        assert!(limits.validate().is_ok());
        assert!(PlanLimits { students: -2, teachers: 0 }.validate().is_err());
    }

    #[test]
    fn plan_uses_stored_field_names() {
        let plan: Plan = serde_json::from_value(json!({
            "name": "Pro",
            "limits": { "students": 500, "teachers": 40 },
            "allowedFeatures": ["exams"]
        }))
        .unwrap();
        assert_eq!(plan.allowed_features, vec!["exams"]);
        assert_eq!(serde_json::to_value(&plan).unwrap()["allowedFeatures"], json!(["exams"]));
    }

    #[test]
    fn update_request_accepts_both_feature_forms() {
        let req: UpdatePlanRequest = serde_json::from_value(json!({
            "limits": { "students": 1, "teachers": 1 },
            "features": "a, b"
        }))
        .unwrap();
        assert!(!req.propagate_to_schools);
        assert_eq!(FeatureList::from(req.features).len(), 2);

        let req: UpdatePlanRequest = serde_json::from_value(json!({
            "limits": { "students": 1, "teachers": 1 },
            "features": ["a", "a", "c"],
            "propagateToSchools": true
        }))
        .unwrap();
        assert!(req.propagate_to_schools);
        assert_eq!(FeatureList::from(req.features).as_slice(), ["a", "c"]);
    }
}
