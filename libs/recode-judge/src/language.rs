//! Maps a requested language id to the runtime that will actually run it.

use crate::catalog::CatalogService;
use crate::error::JudgeError;
use recode_common::config::JudgeConfig;
use recode_common::types::LanguageInfo;
use std::collections::HashSet;
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

pub struct LanguageResolver {
    retired: HashSet<i32>,
    preferred_prefixes: Vec<String>,
    fallback_id: i32,
    /// Only a default found in the catalog is remembered; the fallback is not
    default_id: OnceCell<i32>,
}

impl LanguageResolver {
    pub fn new(
        retired: impl IntoIterator<Item = i32>,
        preferred_prefixes: Vec<String>,
        fallback_id: i32,
    ) -> Self {
        Self {
            retired: retired.into_iter().collect(),
            preferred_prefixes: preferred_prefixes
                .into_iter()
                .map(|p| p.to_lowercase())
                .collect(),
            fallback_id,
            default_id: OnceCell::new(),
        }
    }

    pub fn from_config(config: &JudgeConfig) -> Self {
        Self::new(
            config.retired_language_ids.iter().copied(),
            config.preferred_runtime_prefixes.clone(),
            config.fallback_language_id,
        )
    }

    pub fn is_retired(&self, id: i32) -> bool {
        self.retired.contains(&id)
    }

    /// Pass valid ids through; swap retired or non-positive ids for the default runtime
    pub async fn resolve(&self, requested: i32, catalog: &CatalogService) -> i32 {
        if requested > 0 && !self.is_retired(requested) {
            return requested;
        }

        let effective = self.default_runtime(catalog).await;
        info!(requested, effective, "substituting default runtime");
        effective
    }

    /// Default runtime from the catalog, or the configured fallback when the
    /// catalog is unreachable or has no preferred runtime.
    pub async fn default_runtime(&self, catalog: &CatalogService) -> i32 {
        let found = self
            .default_id
            .get_or_try_init(|| async {
                let languages = catalog.languages().await?;
                self.pick_default(&languages).ok_or_else(|| {
                    JudgeError::Configuration(
                        "language catalog has no preferred runtime".to_string(),
                    )
                })
            })
            .await;

        match found {
            Ok(id) => *id,
            Err(e) => {
                warn!(error = %e, fallback = self.fallback_id, "using fallback runtime");
                self.fallback_id
            }
        }
    }

    fn pick_default(&self, languages: &[LanguageInfo]) -> Option<i32> {
        let picked = languages
            .iter()
            .filter(|lang| !self.is_retired(lang.id))
            .find(|lang| {
                let name = lang.name.trim().to_lowercase();
                self.preferred_prefixes
                    .iter()
                    .any(|prefix| name.starts_with(prefix.as_str()))
            })
            .map(|lang| lang.id);

        if let Some(id) = picked {
            debug!(id, "default runtime chosen from catalog");
        }
        picked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeBackend;
    use std::sync::Arc;
    use std::time::Duration;

    fn resolver() -> LanguageResolver {
        LanguageResolver::from_config(&JudgeConfig::default())
    }

    fn catalog(backend: &Arc<FakeBackend>) -> CatalogService {
        CatalogService::new(backend.clone(), Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_valid_ids_pass_through() {
        let backend = Arc::new(FakeBackend::new());
        let catalog = catalog(&backend);
        let resolver = resolver();

        assert_eq!(resolver.resolve(71, &catalog).await, 71);
        assert_eq!(resolver.resolve(50, &catalog).await, 50);
        assert_eq!(backend.stats().language_calls, 0);
    }

    #[tokio::test]
    async fn test_retired_and_invalid_ids_use_catalog_default() {
        let backend = Arc::new(FakeBackend::new());
        let catalog = catalog(&backend);
        let resolver = resolver();

        // 28 is retired, so the first preferred runtime after it wins
        assert_eq!(resolver.resolve(28, &catalog).await, 92);
        assert_eq!(resolver.resolve(0, &catalog).await, 92);
        assert_eq!(resolver.resolve(-4, &catalog).await, 92);
        assert_eq!(backend.stats().language_calls, 1);
    }

    #[tokio::test]
    async fn test_unreachable_catalog_uses_fallback_without_caching_it() {
        let backend = Arc::new(FakeBackend::new());
        backend.set_catalog_failure(true);
        let catalog = catalog(&backend);
        let resolver = resolver();

        assert_eq!(resolver.resolve(28, &catalog).await, 71);

        backend.set_catalog_failure(false);
        assert_eq!(resolver.resolve(28, &catalog).await, 92);
    }

    #[tokio::test]
    async fn test_catalog_without_preferred_runtime() {
        let backend = Arc::new(FakeBackend::new().with_languages(vec![LanguageInfo {
            id: 50,
            name: "C (GCC 9.2.0)".to_string(),
        }]));
        let catalog = catalog(&backend);

        assert_eq!(resolver().resolve(0, &catalog).await, 71);
    }

    #[tokio::test]
    async fn test_prefix_match_ignores_case() {
        let backend = Arc::new(FakeBackend::new().with_languages(vec![LanguageInfo {
            id: 100,
            name: "PYTHON 3.12".to_string(),
        }]));
        let catalog = catalog(&backend);

        assert_eq!(resolver().resolve(28, &catalog).await, 100);
    }
}
