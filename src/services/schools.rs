use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

use crate::{
    config::Config,
    error::{AppError, AppResult},
    models::{
        school::{
            RegisterSchoolInput, Registration, School, SchoolSnapshot, SchoolStatus,
            UpdateSchoolRequest,
        },
        timestamp,
    },
    services::{
        assets::{self, AssetUpload, BlobStore},
        credentials, ids, paths,
        plans::PlanCatalog,
    },
    store::{field_at, ChangeEvent, Direction, DocumentStore, Query, StoreError, WriteBatch},
};

#[derive(Debug, Clone)]
pub struct RegistrationSettings {
    pub id_max_attempts: u32,
    pub password_length: usize,
    pub max_logo_bytes: usize,
    pub bcrypt_cost: u32,
}

impl RegistrationSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            id_max_attempts: config.school_id_max_attempts,
            password_length: config.admin_password_length,
            max_logo_bytes: config.max_logo_bytes,
            bcrypt_cost: credentials::BCRYPT_COST,
        }
    }
}

/// Creates, lists, edits and deletes school tenants.
#[derive(Clone)]
pub struct SchoolService {
    store: Arc<dyn DocumentStore>,
    blobs: Arc<dyn BlobStore>,
    plans: PlanCatalog,
    settings: RegistrationSettings,
}

fn placeholder_info(collection: &str) -> &'static str {
    match collection {
        "students" => "This subcollection holds all student records.",
        "teachers" => "This subcollection holds all teacher records.",
        "classes" => "This subcollection holds all class records.",
        _ => "This subcollection holds school settings.",
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// School record, admin credentials and the empty sub-collections, as one
/// batch. The record uses a create-only write so an ID taken concurrently is
/// never overwritten.
fn provisioning_batch(
    school: &School,
    password_hash: &str,
    now: &DateTime<Utc>,
) -> AppResult<WriteBatch> {
    let id = &school.school_id;
    let record = serde_json::to_value(school).map_err(|e| AppError::Internal(e.into()))?;

    let mut batch = WriteBatch::new();
    batch.create(paths::school(id), record);
    batch.set(
        paths::admin_credentials(id),
        json!({
            "email": school.admin_email,
            "passwordHash": password_hash,
            "role": "admin",
        }),
    );
    for collection in paths::PLACEHOLDER_COLLECTIONS {
        batch.set(
            paths::placeholder(id, collection),
            json!({
                "_initialized": true,
                "info": placeholder_info(collection),
                "createdAt": timestamp::format(now),
            }),
        );
    }
    Ok(batch)
}

impl SchoolService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        blobs: Arc<dyn BlobStore>,
        plans: PlanCatalog,
        settings: RegistrationSettings,
    ) -> Self {
        Self {
            store,
            blobs,
            plans,
            settings,
        }
    }

    /// Registers a school and returns its ID and the generated admin
    /// password. The password is shown once and only its hash is stored.
    pub async fn create(
        &self,
        input: RegisterSchoolInput,
        logo: Option<AssetUpload>,
    ) -> AppResult<Registration> {
        input.validate().map_err(AppError::Validation)?;

        let school_id =
            ids::allocate_school_id(self.store.as_ref(), self.settings.id_max_attempts).await?;
        let admin_password = credentials::generate_password(self.settings.password_length);
        let password_hash = credentials::hash_password(&admin_password, self.settings.bcrypt_cost)?;

        let plan = self.plans.resolve(input.plan_key.trim()).await?;

        let logo = match &logo {
            Some(upload) => Some(
                assets::upload_asset(self.blobs.as_ref(), upload, self.settings.max_logo_bytes)
                    .await?,
            ),
            None => None,
        };

        let now = Utc::now();
        let school = School {
            school_id: school_id.clone(),
            name: input.school_name.trim().to_string(),
            city: input.city.trim().to_string(),
            admin_name: input.admin_name.trim().to_string(),
            admin_email: input.admin_email.trim().to_string(),
            logo_url: logo.as_ref().map(|l| l.url.clone()).unwrap_or_default(),
            plan,
            status: SchoolStatus::Active,
            created_at: now,
            phone: non_blank(input.phone),
            address: non_blank(input.address),
            school_type: non_blank(input.school_type),
        };

        let batch = provisioning_batch(&school, &password_hash, &now)?;
        if let Err(e) = self.store.commit(batch).await {
            error!("Registering school {} failed: {}", school_id, e);
            if let Some(logo) = &logo {
                if let Err(cleanup) = self.blobs.remove(&logo.key).await {
                    warn!("Could not remove orphaned logo {}: {}", logo.key, cleanup);
                }
            }
            return Err(match e {
                StoreError::AlreadyExists(_) => AppError::Conflict(format!(
                    "School ID {school_id} was taken concurrently. Please retry."
                )),
                e => e.into(),
            });
        }

        info!(
            "School {} registered on the {} plan",
            school_id, school.plan.name
        );
        Ok(Registration {
            school_id,
            admin_password,
        })
    }

    /// All schools, newest first. Records that no longer parse are skipped.
    pub async fn list(&self) -> AppResult<Vec<School>> {
        let docs = self
            .store
            .query(&Query::collection(paths::SCHOOLS).order_by("createdAt", Direction::Descending))
            .await?;
        Ok(docs
            .into_iter()
            .filter_map(|doc| match serde_json::from_value::<School>(doc.data) {
                Ok(school) => Some(school),
                Err(e) => {
                    warn!("Skipping malformed school record {}: {}", doc.path, e);
                    None
                }
            })
            .collect())
    }

    pub async fn get(&self, school_id: &str) -> AppResult<School> {
        if !ids::is_valid_school_id(school_id) {
            return Err(AppError::not_found("School", school_id));
        }
        let data = self
            .store
            .get(&paths::school(school_id))
            .await?
            .ok_or_else(|| AppError::not_found("School", school_id))?;
        parse_school(school_id, data)
    }

    /// Live view of all schools. The first item is the current state; each
    /// later item follows a committed change to the school records.
    pub fn listen_for_changes(&self) -> SchoolFeed {
        SchoolFeed {
            service: self.clone(),
            events: self.store.changes(),
            primed: false,
        }
    }

    /// Partial update of name, logo, status and plan. A new plan is copied
    /// from the catalog as a whole.
    pub async fn update(&self, school_id: &str, req: UpdateSchoolRequest) -> AppResult<School> {
        if !ids::is_valid_school_id(school_id) {
            return Err(AppError::not_found("School", school_id));
        }

        let mut fields: Vec<(String, Value)> = Vec::new();
        if let Some(name) = req.name {
            let name = name.trim();
            if name.is_empty() {
                return Err(AppError::Validation("School name cannot be empty.".into()));
            }
            fields.push(("name".into(), json!(name)));
        }
        let new_logo = match req.logo_url {
            Some(logo_url) => {
                let logo_url = logo_url.trim().to_string();
                self.check_logo_url(&logo_url)?;
                fields.push(("logoUrl".into(), json!(logo_url)));
                Some(logo_url)
            }
            None => None,
        };
        if let Some(status) = req.status {
            fields.push(("status".into(), json!(status)));
        }
        if let Some(plan_key) = req.plan_key {
            let plan = self.plans.resolve(plan_key.trim()).await?;
            let plan = serde_json::to_value(plan).map_err(|e| AppError::Internal(e.into()))?;
            fields.push(("plan".into(), plan));
        }
        if fields.is_empty() {
            return Err(AppError::Validation("Nothing to update.".into()));
        }

        let path = paths::school(school_id);
        let previous_logo = match &new_logo {
            Some(_) => self.raw_record(school_id).await?.1,
            None => None,
        };
        match self.store.update(&path, fields).await {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => return Err(AppError::not_found("School", school_id)),
            Err(e) => return Err(e.into()),
        }
        if let (Some(old), Some(new)) = (previous_logo, new_logo) {
            if old != new {
                self.remove_logo(school_id, &old).await;
            }
        }
        info!("School {} updated", school_id);
        self.get(school_id).await
    }

    /// Accepts an empty string, a URL issued by the blob store, or a plain
    /// `http(s)` URL. Characters that could break out of an attribute are
    /// refused either way.
    fn check_logo_url(&self, url: &str) -> AppResult<()> {
        if url.is_empty() {
            return Ok(());
        }
        let unsafe_char = url.chars().any(|c| {
            c.is_whitespace() || c.is_control() || matches!(c, '"' | '\'' | '<' | '>' | '`' | '\\')
        });
        let known = self.blobs.key_for_url(url).is_some()
            || url.starts_with("https://")
            || url.starts_with("http://");
        if unsafe_char || !known {
            return Err(AppError::Validation(
                "Logo URL must be an http(s) address.".into(),
            ));
        }
        Ok(())
    }

    /// Raw stored record and its `logoUrl`, without requiring the record to
    /// parse as a [`School`].
    async fn raw_record(&self, school_id: &str) -> AppResult<(Value, Option<String>)> {
        let data = self
            .store
            .get(&paths::school(school_id))
            .await?
            .ok_or_else(|| AppError::not_found("School", school_id))?;
        let logo_url = field_at(&data, "logoUrl")
            .and_then(Value::as_str)
            .filter(|u| !u.is_empty())
            .map(str::to_string);
        Ok((data, logo_url))
    }

    /// Deletes a logo object this service uploaded. Failures are only logged.
    async fn remove_logo(&self, school_id: &str, logo_url: &str) {
        if let Some(key) = self.blobs.key_for_url(logo_url) {
            if let Err(e) = self.blobs.remove(&key).await {
                warn!("Could not delete logo {} of school {}: {}", key, school_id, e);
            }
        }
    }

    /// Permanently removes a school and everything stored under it.
    /// `confirmation` must repeat the school ID; anything else leaves the
    /// store untouched.
    pub async fn delete(&self, school_id: &str, confirmation: Option<&str>) -> AppResult<()> {
        if confirmation.map(str::trim) != Some(school_id) {
            return Err(AppError::ConfirmationRequired);
        }
        if !ids::is_valid_school_id(school_id) {
            return Err(AppError::not_found("School", school_id));
        }
        // Records that no longer parse must stay deletable.
        let (data, logo_url) = self.raw_record(school_id).await?;

        let mut batch = WriteBatch::new();
        batch.delete_tree(paths::school(school_id));
        self.store.commit(batch).await?;

        if let Some(logo_url) = logo_url {
            self.remove_logo(school_id, &logo_url).await;
        }
        let name = field_at(&data, "name").and_then(Value::as_str).unwrap_or("unnamed");
        info!("School {} ({}) deleted", school_id, name);
        Ok(())
    }
}

fn parse_school(school_id: &str, data: Value) -> AppResult<School> {
    serde_json::from_value(data).map_err(|e| {
        AppError::Internal(anyhow::anyhow!("Malformed school record {school_id}: {e}"))
    })
}

/// Subscription returned by [`SchoolService::listen_for_changes`].
/// Dropping it unsubscribes.
pub struct SchoolFeed {
    service: SchoolService,
    events: broadcast::Receiver<ChangeEvent>,
    primed: bool,
}

impl SchoolFeed {
    /// Next full snapshot, or `None` once the store stops publishing.
    pub async fn next(&mut self) -> Option<AppResult<SchoolSnapshot>> {
        if !self.primed {
            self.primed = true;
            return Some(self.snapshot().await);
        }
        loop {
            match self.events.recv().await {
                Ok(event) if event.touches(paths::SCHOOLS) => return Some(self.snapshot().await),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    debug!("School feed lagged by {} events, resyncing", skipped);
                    return Some(self.snapshot().await);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    async fn snapshot(&self) -> AppResult<SchoolSnapshot> {
        self.service.list().await.map(SchoolSnapshot::new)
    }
}
