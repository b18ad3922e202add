use chrono::{Datelike, Utc};
use rand::Rng;
use tracing::warn;

use crate::{
    error::{AppError, AppResult},
    services::paths,
    store::DocumentStore,
};

/// Random candidate of the form `SCH<year>-<5 digits>`.
pub fn candidate_school_id(year: i32) -> String {
    let digits: u32 = rand::thread_rng().gen_range(10000..=99999);
    format!("SCH{year}-{digits}")
}

/// Checks the `SCH<4-digit year>-<5 digits>` shape.
pub fn is_valid_school_id(id: &str) -> bool {
    let Some(rest) = id.strip_prefix("SCH") else {
        return false;
    };
    let Some((year, digits)) = rest.split_once('-') else {
        return false;
    };
    year.len() == 4
        && digits.len() == 5
        && year.chars().all(|c| c.is_ascii_digit())
        && digits.chars().all(|c| c.is_ascii_digit())
}

/// Picks an unused school ID for the current year, giving up after
/// `max_attempts` collisions.
pub async fn allocate_school_id(store: &dyn DocumentStore, max_attempts: u32) -> AppResult<String> {
    let year = Utc::now().year();
    allocate_with(store, max_attempts, || candidate_school_id(year)).await
}

/// Allocation loop with an injectable candidate source.
///
/// The existence check and the later write are not atomic; registration
/// writes the record with a create-only operation so a concurrent winner
/// surfaces as a conflict instead of being overwritten.
pub async fn allocate_with<F>(
    store: &dyn DocumentStore,
    max_attempts: u32,
    mut next_candidate: F,
) -> AppResult<String>
where
    F: FnMut() -> String + Send,
{
    for attempt in 1..=max_attempts {
        let candidate = next_candidate();
        if store.get(&paths::school(&candidate)).await?.is_none() {
            return Ok(candidate);
        }
        warn!(
            "Generated school ID {} already exists (attempt {}/{}). Retrying...",
            candidate, attempt, max_attempts
        );
    }
    Err(AppError::IdAllocationExhausted {
        attempts: max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryDocumentStore;
    use serde_json::json;

    #[test]
    fn candidates_match_format() {
        for _ in 0..200 {
            let id = candidate_school_id(2026);
            assert!(is_valid_school_id(&id), "{id}");
            assert!(id.starts_with("SCH2026-"));
        }
    }

    #[test]
    fn format_check_rejects_malformed_ids() {
        assert!(is_valid_school_id("SCH2026-00042"));
        assert!(!is_valid_school_id("SCH26-12345"));
        assert!(!is_valid_school_id("SCH2026-1234"));
        assert!(!is_valid_school_id("sch2026-12345"));
        assert!(!is_valid_school_id("SCH2026-12a45"));
        assert!(!is_valid_school_id("SCH2026_12345"));
    }

    #[tokio::test]
    async fn skips_ids_already_in_use() {
        let store = MemoryDocumentStore::new();
        store.set("schools/SCH2026-11111", json!({})).await.unwrap();
        store.set("schools/SCH2026-22222", json!({})).await.unwrap();

        let mut candidates = ["SCH2026-11111", "SCH2026-22222", "SCH2026-33333"].into_iter();
        let id = allocate_with(&store, 5, || candidates.next().unwrap().to_string())
            .await
            .unwrap();
        assert_eq!(id, "SCH2026-33333");
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let store = MemoryDocumentStore::new();
        store.set("schools/SCH2026-11111", json!({})).await.unwrap();

        let mut calls = 0;
        let err = allocate_with(&store, 3, || {
            calls += 1;
            "SCH2026-11111".to_string()
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::IdAllocationExhausted { attempts: 3 }));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn random_allocation_returns_free_id() {
        let store = MemoryDocumentStore::new();
        let id = allocate_school_id(&store, 5).await.unwrap();
        assert!(is_valid_school_id(&id));
        assert!(store.get(&paths::school(&id)).await.unwrap().is_none());
    }
}
