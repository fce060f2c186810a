//! Add-on catalog ingestion.
//!
//! The catalog is a remote JSON index. It is cached in-process and refreshed
//! whenever the index's `metadata.generated` timestamp changes; fetch time is
//! irrelevant to invalidation. A failed refresh serves the stale cache; only
//! the very first fetch failing is an error.

use k0rdent_core::{Error, Result};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub const DEFAULT_INDEX_URL: &str = "https://catalog.k0rdent.io/index.json";
pub const RAW_CONTENT_BASE_URL: &str = "https://raw.githubusercontent.com/k0rdent/catalog/main/";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogChart {
    pub chart_name: String,
    pub version: String,
    pub service_template_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub helm_repository_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub slug: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub validated_platforms: Vec<String>,
    #[serde(default)]
    pub service_templates: Vec<CatalogChart>,
}

#[derive(Debug, Deserialize)]
struct RawIndex {
    metadata: RawMetadata,
    #[serde(default)]
    apps: Vec<RawApp>,
}

#[derive(Debug, Deserialize)]
struct RawMetadata {
    generated: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawApp {
    slug: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    validated_platforms: Vec<String>,
    #[serde(default)]
    charts: Vec<CatalogChart>,
}

/// Parse the raw index document into the cached entry list plus its
/// generation timestamp.
pub fn parse_index(body: &str) -> Result<(String, Vec<CatalogEntry>)> {
    let index: RawIndex = serde_json::from_str(body)
        .map_err(|e| Error::Unavailable(format!("catalog index is malformed: {e}")))?;
    let entries = index
        .apps
        .into_iter()
        .map(|app| CatalogEntry {
            slug: app.slug,
            title: app.title,
            summary: app.summary,
            tags: app.tags,
            validated_platforms: app.validated_platforms,
            service_templates: app.charts,
        })
        .collect();
    Ok((index.metadata.generated, entries))
}

/// Case-insensitive substring match on the slug.
pub fn filter_entries(entries: &[CatalogEntry], filter: Option<&str>) -> Vec<CatalogEntry> {
    match filter {
        Some(needle) if !needle.is_empty() => {
            let needle = needle.to_ascii_lowercase();
            entries
                .iter()
                .filter(|e| e.slug.to_ascii_lowercase().contains(&needle))
                .cloned()
                .collect()
        }
        _ => entries.to_vec(),
    }
}

struct CacheState {
    generated: String,
    entries: Vec<CatalogEntry>,
}

pub struct CatalogClient {
    http: reqwest::Client,
    index_url: String,
    raw_base_url: String,
    cache: RwLock<Option<CacheState>>,
}

impl CatalogClient {
    pub fn new() -> Self {
        Self::with_urls(DEFAULT_INDEX_URL, RAW_CONTENT_BASE_URL)
    }

    pub fn with_urls(index_url: impl Into<String>, raw_base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            index_url: index_url.into(),
            raw_base_url: raw_base_url.into(),
            cache: RwLock::new(None),
        }
    }

    /// Refresh the cache. A fetch or parse failure with a warm cache keeps
    /// serving stale entries; a cold cache surfaces `unavailable`.
    pub async fn refresh(&self) -> Result<()> {
        let fetched = self.fetch_index().await;
        match fetched {
            Ok((generated, entries)) => {
                let mut cache = self.cache.write().await;
                match cache.as_ref() {
                    Some(state) if state.generated == generated => {
                        debug!(%state.generated, "catalog index unchanged");
                    }
                    _ => {
                        info!(%generated, apps = entries.len(), "catalog index refreshed");
                        *cache = Some(CacheState { generated, entries });
                    }
                }
                Ok(())
            }
            Err(err) => {
                if self.cache.read().await.is_some() {
                    warn!("catalog refresh failed, serving stale index: {err}");
                    Ok(())
                } else {
                    Err(err)
                }
            }
        }
    }

    async fn fetch_index(&self) -> Result<(String, Vec<CatalogEntry>)> {
        let response = self
            .http
            .get(&self.index_url)
            .send()
            .await
            .map_err(|e| Error::Unavailable(format!("catalog index fetch failed: {e}")))?;
        if !response.status().is_success() {
            return Err(Error::Unavailable(format!(
                "catalog index fetch failed: http {}",
                response.status()
            )));
        }
        let body = response
            .text()
            .await
            .map_err(|e| Error::Unavailable(format!("catalog index read failed: {e}")))?;
        parse_index(&body)
    }

    /// Entries from the refreshed cache, filtered by slug substring.
    pub async fn list(&self, filter: Option<&str>) -> Result<Vec<CatalogEntry>> {
        self.refresh().await?;
        let cache = self.cache.read().await;
        let state = cache
            .as_ref()
            .ok_or_else(|| Error::Unavailable("catalog index has not been fetched".into()))?;
        Ok(filter_entries(&state.entries, filter))
    }

    /// Exact-slug lookup.
    pub async fn find(&self, slug: &str) -> Result<Option<CatalogEntry>> {
        self.refresh().await?;
        let cache = self.cache.read().await;
        Ok(cache
            .as_ref()
            .and_then(|state| state.entries.iter().find(|e| e.slug == slug))
            .cloned())
    }

    /// Fetch a raw-content file referenced by a catalog path (service
    /// template or helm repository manifest).
    pub async fn fetch_raw(&self, path: &str) -> Result<String> {
        let url = format!("{}{}", self.raw_base_url, path.trim_start_matches('/'));
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::Unavailable(format!("catalog content fetch failed: {e}")))?;
        if response.status().as_u16() == 404 {
            return Err(Error::NotFound(format!("catalog file {path:?} does not exist")));
        }
        if !response.status().is_success() {
            return Err(Error::Unavailable(format!(
                "catalog content fetch failed: http {}",
                response.status()
            )));
        }
        response
            .text()
            .await
            .map_err(|e| Error::Unavailable(format!("catalog content read failed: {e}")))
    }
}

impl Default for CatalogClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INDEX: &str = r#"{
        "metadata": {"generated": "2026-07-01T12:00:00Z"},
        "apps": [
            {
                "slug": "ingress-nginx",
                "title": "Ingress NGINX",
                "summary": "Ingress controller",
                "tags": ["networking"],
                "validatedPlatforms": ["aws", "azure"],
                "charts": [
                    {
                        "chartName": "ingress-nginx",
                        "version": "4.11.0",
                        "serviceTemplatePath": "apps/ingress-nginx/service-template.yaml",
                        "helmRepositoryPath": "apps/ingress-nginx/helm-repository.yaml"
                    }
                ]
            },
            {
                "slug": "cert-manager",
                "title": "cert-manager",
                "charts": [
                    {
                        "chartName": "cert-manager",
                        "version": "1.16.0",
                        "serviceTemplatePath": "apps/cert-manager/service-template.yaml"
                    }
                ]
            }
        ]
    }"#;

    #[test]
    fn parses_the_index_shape() {
        let (generated, entries) = parse_index(INDEX).unwrap();
        assert_eq!(generated, "2026-07-01T12:00:00Z");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].slug, "ingress-nginx");
        assert_eq!(entries[0].validated_platforms, vec!["aws", "azure"]);
        assert_eq!(entries[0].service_templates[0].version, "4.11.0");
        assert!(entries[1].service_templates[0].helm_repository_path.is_none());
    }

    #[test]
    fn malformed_index_is_unavailable() {
        let err = parse_index("{\"apps\": []}").unwrap_err();
        assert_eq!(err.code(), "unavailable");
    }

    #[test]
    fn slug_filter_is_case_insensitive_substring() {
        let (_, entries) = parse_index(INDEX).unwrap();
        let hits = filter_entries(&entries, Some("NGINX"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].slug, "ingress-nginx");

        let all = filter_entries(&entries, None);
        assert_eq!(all.len(), 2);
        let none = filter_entries(&entries, Some("postgres"));
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn cold_cache_failure_is_unavailable() {
        // nothing listens on this port
        let client = CatalogClient::with_urls("http://127.0.0.1:9/index.json", "http://127.0.0.1:9/");
        let err = client.list(None).await.unwrap_err();
        assert_eq!(err.code(), "unavailable");
    }
}
