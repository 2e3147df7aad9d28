//! Breed catalog lookup.
//!
//! Cat breeds are validated against an external catalog (TheCatAPI by default).
//! The catalog is fetched lazily and kept for a fixed TTL; a refresh that fails
//! falls back to the previous snapshot when one exists.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::AppError;

pub const DEFAULT_BREEDS_URL: &str = "https://api.thecatapi.com";
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BreedError {
    #[error("http client setup failed: {0}")]
    Client(String),
    #[error("request failed: {0}")]
    Request(String),
    #[error("request timed out")]
    Timeout,
    #[error("catalog responded with HTTP {0}")]
    Status(u16),
    #[error("invalid catalog payload: {0}")]
    Decode(String),
}

/// One catalog record. Only the names matter for validation.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct Breed {
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_alt_names")]
    pub alt_names: Vec<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AltNames {
    Joined(String),
    List(Vec<String>),
}

/// The upstream catalog sends alternate names as one comma separated string,
/// often empty.
fn deserialize_alt_names<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<AltNames> = Option::deserialize(deserializer)?;
    let names = match raw {
        None => Vec::new(),
        Some(AltNames::Joined(joined)) => split_alt_names(&joined),
        Some(AltNames::List(list)) => list
            .iter()
            .flat_map(|item| split_alt_names(item))
            .collect(),
    };
    Ok(names)
}

fn split_alt_names(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

#[async_trait]
pub trait BreedSource: Send + Sync {
    async fn fetch_breeds(&self) -> Result<Vec<Breed>, BreedError>;
}

/// HTTP client for `GET {base}/v1/breeds`.
pub struct TheCatApi {
    client: reqwest::Client,
    breeds_url: Url,
}

impl TheCatApi {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, BreedError> {
        let mut base = Url::parse(base_url)
            .map_err(|err| BreedError::Client(format!("invalid base url {base_url}: {err}")))?;
        // Without a trailing slash `join` would replace the last path segment.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let breeds_url = base
            .join("v1/breeds")
            .map_err(|err| BreedError::Client(err.to_string()))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("spycats/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| BreedError::Client(err.to_string()))?;
        Ok(Self { client, breeds_url })
    }

    pub fn breeds_url(&self) -> &Url {
        &self.breeds_url
    }
}

#[async_trait]
impl BreedSource for TheCatApi {
    async fn fetch_breeds(&self) -> Result<Vec<Breed>, BreedError> {
        debug!(url = %self.breeds_url, "Fetching breed catalog");
        let response = self
            .client
            .get(self.breeds_url.clone())
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    BreedError::Timeout
                } else {
                    BreedError::Request(err.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(BreedError::Status(response.status().as_u16()));
        }

        response
            .json::<Vec<Breed>>()
            .await
            .map_err(|err| BreedError::Decode(err.to_string()))
    }
}

/// Fixed catalog, loaded from a JSON file for offline runs and used by tests.
pub struct StaticBreeds {
    breeds: Vec<Breed>,
}

impl StaticBreeds {
    pub fn new(breeds: Vec<Breed>) -> Self {
        Self { breeds }
    }

    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let payload = std::fs::read_to_string(path)?;
        let breeds: Vec<Breed> = serde_json::from_str(&payload)?;
        Ok(Self::new(breeds))
    }
}

#[async_trait]
impl BreedSource for StaticBreeds {
    async fn fetch_breeds(&self) -> Result<Vec<Breed>, BreedError> {
        Ok(self.breeds.clone())
    }
}

struct Snapshot {
    names: Arc<HashSet<String>>,
    fetched_at: Instant,
}

impl Snapshot {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }
}

/// Read-through cache over a [`BreedSource`].
///
/// Readers share the current snapshot; an expired snapshot is refreshed by a
/// single caller while the rest wait on `refresh` and then reuse its result.
pub struct BreedCatalog {
    source: Arc<dyn BreedSource>,
    ttl: Duration,
    snapshot: RwLock<Option<Snapshot>>,
    refresh: Mutex<()>,
}

impl BreedCatalog {
    pub fn new(source: Arc<dyn BreedSource>, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            snapshot: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    pub async fn is_valid_breed(&self, name: &str) -> Result<bool, BreedError> {
        let names = self.get_or_refresh().await?;
        Ok(names.contains(name.trim()))
    }

    pub async fn get_or_refresh(&self) -> Result<Arc<HashSet<String>>, BreedError> {
        if let Some(names) = self.fresh_names().await {
            return Ok(names);
        }

        let _guard = self.refresh.lock().await;
        // Another caller may have refreshed while we waited for the guard.
        if let Some(names) = self.fresh_names().await {
            return Ok(names);
        }

        match self.source.fetch_breeds().await {
            Ok(breeds) => {
                let names = Arc::new(index_names(&breeds));
                info!(
                    breeds = breeds.len(),
                    names = names.len(),
                    "Breed catalog refreshed"
                );
                *self.snapshot.write().await = Some(Snapshot {
                    names: Arc::clone(&names),
                    fetched_at: Instant::now(),
                });
                Ok(names)
            }
            Err(err) => {
                let snapshot = self.snapshot.read().await;
                match snapshot.as_ref() {
                    Some(stale) => {
                        warn!(
                            error = %err,
                            age_secs = stale.fetched_at.elapsed().as_secs(),
                            "Breed catalog refresh failed, serving stale snapshot"
                        );
                        Ok(Arc::clone(&stale.names))
                    }
                    None => Err(err),
                }
            }
        }
    }

    async fn fresh_names(&self) -> Option<Arc<HashSet<String>>> {
        let snapshot = self.snapshot.read().await;
        snapshot
            .as_ref()
            .filter(|snapshot| snapshot.is_fresh(self.ttl))
            .map(|snapshot| Arc::clone(&snapshot.names))
    }
}

fn index_names(breeds: &[Breed]) -> HashSet<String> {
    let mut names = HashSet::new();
    for breed in breeds {
        names.insert(breed.name.trim().to_string());
        for alt in &breed.alt_names {
            names.insert(alt.clone());
        }
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct CountingSource {
        breeds: Vec<Breed>,
        calls: AtomicUsize,
        failing: AtomicBool,
        delay: Duration,
    }

    impl CountingSource {
        fn new(delay: Duration) -> Self {
            Self {
                breeds: vec![Breed {
                    name: "Abyssinian".to_string(),
                    alt_names: Vec::new(),
                }],
                calls: AtomicUsize::new(0),
                failing: AtomicBool::new(false),
                delay,
            }
        }
    }

    #[async_trait]
    impl BreedSource for CountingSource {
        async fn fetch_breeds(&self) -> Result<Vec<Breed>, BreedError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.failing.load(Ordering::SeqCst) {
                return Err(BreedError::Status(503));
            }
            Ok(self.breeds.clone())
        }
    }

    #[test]
    fn alt_names_are_split_and_trimmed() {
        let payload = r#"[
            {"name": "American Shorthair", "alt_names": "Domestic Shorthair,  Shorthair , "},
            {"name": "Bengal", "alt_names": ""},
            {"name": "Birman"},
            {"name": "Burmese", "alt_names": null}
        ]"#;
        let breeds: Vec<Breed> = serde_json::from_str(payload).expect("parse breeds");
        assert_eq!(
            breeds[0].alt_names,
            vec!["Domestic Shorthair".to_string(), "Shorthair".to_string()]
        );
        assert!(breeds[1].alt_names.is_empty());
        assert!(breeds[2].alt_names.is_empty());
        assert!(breeds[3].alt_names.is_empty());
    }

    #[test]
    fn unknown_catalog_fields_are_ignored() {
        let payload = r#"[{"id": "abys", "name": "Abyssinian", "weight": {"metric": "3 - 5"}}]"#;
        let breeds: Vec<Breed> = serde_json::from_str(payload).expect("parse breeds");
        assert_eq!(breeds[0].name, "Abyssinian");
    }

    #[tokio::test]
    async fn canonical_and_alternate_names_are_valid() {
        let source = StaticBreeds::new(vec![Breed {
            name: "Siamese".to_string(),
            alt_names: vec!["Thai".to_string()],
        }]);
        let catalog = BreedCatalog::new(Arc::new(source), DEFAULT_CACHE_TTL);
        assert!(catalog.is_valid_breed("Siamese").await.expect("lookup"));
        assert!(catalog.is_valid_breed("Thai").await.expect("lookup"));
        assert!(!catalog.is_valid_breed("Dragon").await.expect("lookup"));
    }

    #[tokio::test]
    async fn fresh_snapshot_is_served_from_cache() {
        let source = Arc::new(CountingSource::new(Duration::ZERO));
        let catalog = BreedCatalog::new(source.clone(), DEFAULT_CACHE_TTL);
        catalog.is_valid_breed("Abyssinian").await.expect("first");
        catalog.is_valid_breed("Abyssinian").await.expect("second");
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn expired_snapshot_is_refetched() {
        let source = Arc::new(CountingSource::new(Duration::ZERO));
        let catalog = BreedCatalog::new(source.clone(), Duration::ZERO);
        catalog.is_valid_breed("Abyssinian").await.expect("first");
        catalog.is_valid_breed("Abyssinian").await.expect("second");
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_fetch() {
        let source = Arc::new(CountingSource::new(Duration::from_millis(50)));
        let catalog = BreedCatalog::new(source.clone(), DEFAULT_CACHE_TTL);
        let (a, b, c, d) = tokio::join!(
            catalog.is_valid_breed("Abyssinian"),
            catalog.is_valid_breed("Abyssinian"),
            catalog.is_valid_breed("Dragon"),
            catalog.is_valid_breed("Abyssinian"),
        );
        assert!(a.expect("a") && b.expect("b") && d.expect("d"));
        assert!(!c.expect("c"));
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_refresh_falls_back_to_stale_snapshot() {
        let source = Arc::new(CountingSource::new(Duration::ZERO));
        let catalog = BreedCatalog::new(source.clone(), Duration::ZERO);
        assert!(catalog.is_valid_breed("Abyssinian").await.expect("warm"));

        source.failing.store(true, Ordering::SeqCst);
        assert!(catalog.is_valid_breed("Abyssinian").await.expect("stale"));
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_fetch_without_snapshot_is_an_error() {
        let source = Arc::new(CountingSource::new(Duration::ZERO));
        source.failing.store(true, Ordering::SeqCst);
        let catalog = BreedCatalog::new(source, DEFAULT_CACHE_TTL);
        let err = catalog.is_valid_breed("Abyssinian").await.unwrap_err();
        assert_eq!(err, BreedError::Status(503));
    }

    #[test]
    fn client_rejects_malformed_base_url() {
        assert!(matches!(
            TheCatApi::new("not a url", DEFAULT_REQUEST_TIMEOUT),
            Err(BreedError::Client(_))
        ));
        assert!(TheCatApi::new(DEFAULT_BREEDS_URL, DEFAULT_REQUEST_TIMEOUT).is_ok());
    }

    #[test]
    fn base_url_path_is_kept_when_joining() {
        let cases = [
            (DEFAULT_BREEDS_URL, "https://api.thecatapi.com/v1/breeds"),
            ("https://proxy.internal/catapi", "https://proxy.internal/catapi/v1/breeds"),
            ("https://proxy.internal/catapi/", "https://proxy.internal/catapi/v1/breeds"),
        ];
        for (base, expected) in cases {
            let api = TheCatApi::new(base, DEFAULT_REQUEST_TIMEOUT).expect("client");
            assert_eq!(api.breeds_url().as_str(), expected, "base: {base}");
        }
    }
}
