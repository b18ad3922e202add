use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{error, info};

use crate::{
    error::{AppError, AppResult},
    models::plan::{default_catalog, FeatureList, Plan, PlanCatalogMap, PlanLimits, PlanUpdateOutcome},
    services::paths,
    store::{DocumentStore, Query, WriteBatch},
};

/// Reads and edits the `platformConfig/plans` singleton.
#[derive(Clone)]
pub struct PlanCatalog {
    store: Arc<dyn DocumentStore>,
}

impl PlanCatalog {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    pub async fn fetch_plans(&self) -> AppResult<PlanCatalogMap> {
        let data = self
            .store
            .get(paths::PLANS)
            .await?
            .ok_or_else(|| AppError::not_found("Platform configuration", paths::PLANS))?;
        serde_json::from_value(data).map_err(|e| {
            AppError::Internal(anyhow::anyhow!("Malformed plan catalog: {e}"))
        })
    }

    /// Full definition for one tier key.
    pub async fn resolve(&self, key: &str) -> AppResult<Plan> {
        self.fetch_plans()
            .await?
            .remove(key)
            .ok_or_else(|| AppError::not_found("Plan", key))
    }

    /// Rewrites limits and features of one tier, leaving the other tiers
    /// untouched. With `propagate`, schools on that tier get the new feature
    /// list in a second, separate batch.
    pub async fn update_plan(
        &self,
        key: &str,
        limits: PlanLimits,
        features: FeatureList,
        propagate: bool,
    ) -> AppResult<PlanUpdateOutcome> {
        if key.contains('.') || key.contains('/') {
            return Err(AppError::Validation(format!("Invalid plan key: {key}")));
        }
        limits.validate().map_err(AppError::Validation)?;

        let mut plan = self.resolve(key).await?;
        let features = features.into_vec();

        let mut batch = WriteBatch::new();
        batch.update(
            paths::PLANS,
            vec![
                (format!("{key}.limits.students"), json!(limits.students)),
                (format!("{key}.limits.teachers"), json!(limits.teachers)),
                (format!("{key}.allowedFeatures"), json!(features)),
            ],
        );
        self.store.commit(batch).await?;
        info!("Plan {} updated", key);

        plan.limits = limits;
        plan.allowed_features = features;

        let schools_updated = if propagate {
            self.propagate_features(&plan).await.map_err(|e| {
                error!("Propagating plan {} to schools failed: {}", key, e);
                AppError::PropagationFailed {
                    tier: key.to_string(),
                    reason: e.to_string(),
                }
            })?
        } else {
            0
        };

        Ok(PlanUpdateOutcome {
            key: key.to_string(),
            plan,
            schools_updated,
        })
    }

    /// Rewrites `plan.allowedFeatures` on every school whose embedded plan
    /// carries this plan's display name. All or nothing.
    async fn propagate_features(&self, plan: &Plan) -> AppResult<usize> {
        let schools = self
            .store
            .query(&Query::collection(paths::SCHOOLS).where_eq("plan.name", plan.name.as_str()))
            .await?;
        if schools.is_empty() {
            return Ok(0);
        }

        let mut batch = WriteBatch::new();
        for school in &schools {
            batch.update(
                school.path.clone(),
                vec![("plan.allowedFeatures".to_string(), json!(plan.allowed_features))],
            );
        }
        self.store.commit(batch).await?;
        info!("Plan {} features propagated to {} schools", plan.name, schools.len());
        Ok(schools.len())
    }

    /// Installs the default tiers. Returns `false` when a catalog already
    /// exists and `overwrite` is not set.
    pub async fn seed_defaults(&self, overwrite: bool) -> AppResult<bool> {
        if !overwrite && self.store.get(paths::PLANS).await?.is_some() {
            return Ok(false);
        }
        let catalog: Value = serde_json::to_value(default_catalog())
            .map_err(|e| AppError::Internal(e.into()))?;
        self.store.set(paths::PLANS, catalog).await?;
        Ok(true)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::memory::MemoryDocumentStore;

    pub(crate) async fn seeded_catalog() -> (Arc<MemoryDocumentStore>, PlanCatalog) {
        let store = Arc::new(MemoryDocumentStore::new());
        let catalog = PlanCatalog::new(store.clone());
        assert!(catalog.seed_defaults(false).await.unwrap());
        (store, catalog)
    }

    async fn put_school(store: &MemoryDocumentStore, id: &str, plan: &Plan) {
        store
            .set(
                &paths::school(id),
                json!({ "schoolId": id, "name": id, "plan": plan }),
            )
            .await
            .unwrap();
    }

    async fn features_of(store: &MemoryDocumentStore, id: &str) -> Value {
        store.get(&paths::school(id)).await.unwrap().unwrap()["plan"]["allowedFeatures"].clone()
    }

    #[tokio::test]
    async fn missing_catalog_is_not_found() {
        let catalog = PlanCatalog::new(Arc::new(MemoryDocumentStore::new()));
        assert!(matches!(
            catalog.fetch_plans().await,
            Err(AppError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn resolves_known_keys_only() {
        let (_, catalog) = seeded_catalog().await;
        let plans = catalog.fetch_plans().await.unwrap();
        assert_eq!(plans.keys().collect::<Vec<_>>(), ["Normal", "Pro", "Ultra"]);
        assert_eq!(catalog.resolve("Ultra").await.unwrap().limits.students, -1);
        assert!(matches!(
            catalog.resolve("Gold").await,
            Err(AppError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn seeding_does_not_clobber_existing_catalog() {
        let (_, catalog) = seeded_catalog().await;
        assert!(!catalog.seed_defaults(false).await.unwrap());
        assert!(catalog.seed_defaults(true).await.unwrap());
    }

    #[tokio::test]
    async fn update_without_propagation_leaves_schools_alone() {
        let (store, catalog) = seeded_catalog().await;
        let pro = catalog.resolve("Pro").await.unwrap();
        put_school(&store, "SCH2026-10001", &pro).await;

        let outcome = catalog
            .update_plan(
                "Pro",
                PlanLimits { students: 50, teachers: 5 },
                FeatureList::from_csv("exams, library"),
                false,
            )
            .await
            .unwrap();
        assert_eq!(outcome.schools_updated, 0);

        let plans = catalog.fetch_plans().await.unwrap();
        assert_eq!(plans["Pro"].limits, PlanLimits { students: 50, teachers: 5 });
        assert_eq!(plans["Pro"].allowed_features, vec!["exams", "library"]);
        assert_eq!(plans["Pro"].name, "Pro");
        assert_eq!(plans["Normal"], default_catalog()["Normal"]);

        assert_eq!(features_of(&store, "SCH2026-10001").await, json!(pro.allowed_features));
    }

    #[tokio::test]
    async fn propagation_rewrites_only_matching_tier() {
        let (store, catalog) = seeded_catalog().await;
        let pro = catalog.resolve("Pro").await.unwrap();
        let normal = catalog.resolve("Normal").await.unwrap();
        put_school(&store, "SCH2026-10001", &pro).await;
        put_school(&store, "SCH2026-10002", &pro).await;
        put_school(&store, "SCH2026-10003", &normal).await;

        let outcome = catalog
            .update_plan(
                "Pro",
                pro.limits,
                FeatureList::from_csv("exams,transport"),
                true,
            )
            .await
            .unwrap();
        assert_eq!(outcome.schools_updated, 2);

        for id in ["SCH2026-10001", "SCH2026-10002"] {
            assert_eq!(features_of(&store, id).await, json!(["exams", "transport"]));
        }
        assert_eq!(
            features_of(&store, "SCH2026-10003").await,
            json!(normal.allowed_features)
        );
    }

    #[tokio::test]
    async fn propagation_failure_is_reported_separately() {
        let (store, catalog) = seeded_catalog().await;
        let pro = catalog.resolve("Pro").await.unwrap();
        put_school(&store, "SCH2026-10001", &pro).await;

        // First commit is the catalog write, second is the propagation batch.
        store.fail_nth_commit(2);
        let result = catalog
            .update_plan("Pro", pro.limits, FeatureList::from_csv("exams"), true)
            .await;
        assert!(matches!(result, Err(AppError::PropagationFailed { .. })));

        assert_eq!(catalog.resolve("Pro").await.unwrap().allowed_features, vec!["exams"]);
        assert_eq!(features_of(&store, "SCH2026-10001").await, json!(pro.allowed_features));
    }

    #[tokio::test]
    async fn catalog_failure_is_a_plain_remote_error() {
        let (store, catalog) = seeded_catalog().await;
        store.fail_next_commit();
        let pro = catalog.resolve("Pro").await.unwrap();
        let result = catalog
            .update_plan("Pro", pro.limits, FeatureList::from_csv("exams"), true)
            .await;
        assert!(matches!(result, Err(AppError::Remote(_))));
        assert_eq!(catalog.resolve("Pro").await.unwrap(), pro);
    }

    #[tokio::test]
    async fn rejects_invalid_limits_and_keys() {
        let (_, catalog) = seeded_catalog().await;
        let bad = PlanLimits { students: -5, teachers: 1 };
        assert!(matches!(
            catalog.update_plan("Pro", bad, FeatureList::new(), false).await,
            Err(AppError::Validation(_))
        ));
        let ok = PlanLimits { students: 1, teachers: 1 };
        assert!(matches!(
            catalog.update_plan("Pro.limits", ok, FeatureList::new(), false).await,
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            catalog.update_plan("Gold", ok, FeatureList::new(), false).await,
            Err(AppError::NotFound { .. })
        ));
    }
}
