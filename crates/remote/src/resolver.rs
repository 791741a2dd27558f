use crate::error::{ErrorKind, Result};
use crate::fetcher::{FetchOptions, ProxyFallbackFetcher, apply_prefix};
use crate::pointer::{decode_pointer, normalize_path, raw_url};
use tracing::instrument;
use tsundoku_model::error::ErrorKind as ModelErrorKind;
use tsundoku_model::{
    ClockHandle, FailureKind, FullRecord, LightIndexEntry, PLACEHOLDER_DESCRIPTION, WorkDocument, WorkType, sanitize,
    seconds_to_millis,
};

const UNTITLED: &str = "Untitled";

/// Pre-fetched values that take precedence over the resolved document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveHint {
    pub id: Option<String>,
    pub title: Option<String>,
    pub cover_url: Option<String>,
    pub work_type: Option<WorkType>,
}
impl From<&LightIndexEntry> for ResolveHint {
    fn from(entry: &LightIndexEntry) -> Self {
        Self {
            id: Some(entry.id.clone()),
            title: Some(entry.title.clone()),
            cover_url: entry.cover_url.clone(),
            work_type: Some(entry.work_type.clone()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolverOptions {
    /// Host the decoded repository paths are fetched from.
    pub raw_host: String,
    /// Prefix applied to a document's own cover url.
    pub image_proxy: Option<String>,
    pub placeholder_image: String,
    pub fetch: FetchOptions,
}
impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            raw_host: "https://raw.githubusercontent.com".to_string(),
            image_proxy: None,
            placeholder_image: "https://placehold.co/300x450?text=No+Cover".to_string(),
            fetch: FetchOptions::default(),
        }
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Resolves indirection pointers into [`FullRecord`]s.
pub struct CatalogResolver {
    fetcher: ProxyFallbackFetcher,
    options: ResolverOptions,
    clock: ClockHandle,
}

impl CatalogResolver {
    pub fn new(fetcher: ProxyFallbackFetcher, options: ResolverOptions, clock: ClockHandle) -> Self {
        Self { fetcher, options, clock }
    }

    pub fn fetcher(&self) -> &ProxyFallbackFetcher {
        &self.fetcher
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    /// Resolve the work behind `url`.
    ///
    /// Never fails: any error becomes a failure record whose
    /// [`FailureKind`] says whether it was this item, or the network.
    #[instrument(skip(self, hint), fields(id = hint.id.as_deref()))]
    pub async fn resolve(&self, url: &str, hint: &ResolveHint) -> FullRecord {
        match self.try_resolve(url, hint).await {
            Ok(record) => record,
            Err(error) => {
                let kind = match &*error {
                    ErrorKind::InvalidPointer(_) => FailureKind::InvalidPointer,
                    ErrorKind::AllProxiesFailed(_) => FailureKind::SystemicNetwork,
                    ErrorKind::InvalidDocument(_) => FailureKind::Validation,
                    ErrorKind::Transport | ErrorKind::MalformedDocument => FailureKind::ItemResolution,
                };
                tracing::warn!(url, ?kind, ?error, "Failed to resolve work");
                let mut record = FullRecord::failure(url, kind, (*error).to_string(), self.clock.now_millis());
                record.id = hint.id.clone().unwrap_or_default();
                record.work_type = hint.work_type.clone().unwrap_or_default();
                record.image_url = self.options.placeholder_image.clone();
                record
            },
        }
    }

    async fn try_resolve(&self, url: &str, hint: &ResolveHint) -> Result<FullRecord> {
        let path = normalize_path(&decode_pointer(url)?);
        let target = raw_url(&self.options.raw_host, &path);
        let response = self.fetcher.fetch(&target, &self.options.fetch).await?;
        let document = WorkDocument::from_slice(&response.body).map_err(|e| {
            let kind = match &*e {
                ModelErrorKind::Json => ErrorKind::MalformedDocument,
                other => ErrorKind::InvalidDocument(other.to_string()),
            };
            e.raise(kind)
        })?;
        tracing::debug!(url, chapters = document.chapters.len(), "Resolved work document");
        Ok(self.merge(url, hint, document))
    }

    fn image_url(&self, hint: &ResolveHint, document: &WorkDocument) -> String {
        if let Some(cover) = non_blank(hint.cover_url.as_deref()) {
            return cover.to_string();
        }
        match (non_blank(document.cover.as_deref()), self.options.image_proxy.as_deref()) {
            (Some(cover), Some(proxy)) => apply_prefix(proxy, cover),
            (Some(cover), None) => cover.to_string(),
            (None, _) => self.options.placeholder_image.clone(),
        }
    }

    fn merge(&self, url: &str, hint: &ResolveHint, document: WorkDocument) -> FullRecord {
        let id = hint.id.clone().unwrap_or_default();
        let title = non_blank(hint.title.as_deref()).or(non_blank(document.title.as_deref())).unwrap_or(UNTITLED);
        let work_type = hint
            .work_type
            .clone()
            .or_else(|| non_blank(document.work_type.as_deref()).map(|t| t.parse().unwrap_or_default()))
            .or_else(|| WorkType::from_key(&id))
            .unwrap_or_default();
        let description = match non_blank(document.description.as_deref()) {
            Some(description) => sanitize(description),
            None => PLACEHOLDER_DESCRIPTION.to_string(),
        };
        FullRecord {
            url: url.to_string(),
            title: sanitize(title),
            description,
            image_url: self.image_url(hint, &document),
            author: non_blank(document.author.as_deref()).map(sanitize),
            artist: non_blank(document.artist.as_deref()).map(sanitize),
            genres: document.genres.iter().map(|g| sanitize(g)).filter(|g| !g.is_empty()).collect(),
            work_type,
            status: non_blank(document.status.as_deref()).map(sanitize),
            chapter_count: document.chapters.len(),
            last_updated: seconds_to_millis(document.last_updated()),
            chapters: document.chapters,
            error: false,
            error_details: None,
            id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pointer::pointer_url;
    use crate::transport::{MockRoute, MockTransport};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tsundoku_model::ManualClock;

    const RAW: &str = "https://raw.example";
    const PATH: &str = "raw/owner/repo/refs/heads/main/works/berserk.json";
    const FETCHED: &str = "https://raw.example/owner/repo/main/works/berserk.json";

    fn resolver(transport: Arc<MockTransport>, image_proxy: Option<&str>) -> CatalogResolver {
        let options = ResolverOptions {
            raw_host: RAW.to_string(),
            image_proxy: image_proxy.map(str::to_string),
            placeholder_image: "placeholder.png".to_string(),
            fetch: FetchOptions { timeout: Duration::from_millis(200), retries: 0 },
        };
        CatalogResolver::new(ProxyFallbackFetcher::new(transport, vec![]), options, ManualClock::at(42_000))
    }

    fn document() -> serde_json::Value {
        json!({
            "title": "Berserk <Deluxe>",
            "description": "  Dark & brutal  ",
            "author": "Kentaro Miura",
            "cover": "https://img.example/berserk.jpg",
            "genres": ["action", " ", "fantasy"],
            "type": "manga",
            "chapters": {
                "1": {"title": "Ch. 1", "last_updated": 100},
                "2": {"title": "Ch. 2", "last_updated": "300"},
                "3": {"title": "Ch. 3", "last_updated": 200}
            }
        })
    }

    #[tokio::test]
    async fn test_resolves_document() {
        let transport = Arc::new(MockTransport::new().json(FETCHED, &document()));
        let resolver = resolver(transport.clone(), None);
        let record = resolver.resolve(&pointer_url("https://cubari.moe", PATH), &ResolveHint::default()).await;
        assert!(!record.is_error(), "{record:?}");
        assert_eq!(transport.calls(), vec![FETCHED]);
        assert_eq!(record.title, "Berserk &lt;Deluxe&gt;");
        assert_eq!(record.description, "Dark &amp; brutal");
        assert_eq!(record.genres, vec!["action", "fantasy"]);
        assert_eq!(record.chapter_count, 3);
        assert_eq!(record.last_updated, 300_000);
        assert_eq!(record.image_url, "https://img.example/berserk.jpg");
        assert_eq!(record.work_type, WorkType::Manga);
    }

    #[tokio::test]
    async fn test_hint_takes_precedence() {
        let transport = Arc::new(MockTransport::new().json(FETCHED, &document()));
        let hint = ResolveHint {
            id: Some("KR_berserk".to_string()),
            title: Some("Hinted".to_string()),
            cover_url: Some("https://img.example/hint.jpg".to_string()),
            work_type: Some(WorkType::Manhwa),
        };
        let record = resolver(transport, None).resolve(&pointer_url("https://cubari.moe", PATH), &hint).await;
        assert_eq!(record.id, "KR_berserk");
        assert_eq!(record.title, "Hinted");
        assert_eq!(record.image_url, "https://img.example/hint.jpg");
        assert_eq!(record.work_type, WorkType::Manhwa);
    }

    #[tokio::test]
    async fn test_document_cover_goes_through_image_proxy() {
        let transport = Arc::new(MockTransport::new().json(FETCHED, &document()));
        let record = resolver(transport, Some("https://images.example/?u={url}"))
            .resolve(&pointer_url("https://cubari.moe", PATH), &ResolveHint::default())
            .await;
        assert_eq!(record.image_url, "https://images.example/?u=https%3A%2F%2Fimg.example%2Fberserk.jpg");
    }

    #[tokio::test]
    async fn test_placeholders_for_sparse_document() {
        let transport = Arc::new(MockTransport::new().json(FETCHED, &json!({"chapters": {}})));
        let record = resolver(transport, None)
            .resolve(&pointer_url("https://cubari.moe", PATH), &ResolveHint::default())
            .await;
        assert!(!record.is_error());
        assert_eq!(record.title, UNTITLED);
        assert_eq!(record.description, PLACEHOLDER_DESCRIPTION);
        assert_eq!(record.image_url, "placeholder.png");
        assert_eq!(record.last_updated, 0);
    }

    #[tokio::test]
    async fn test_invalid_pointer_is_not_retryable() {
        let transport = Arc::new(MockTransport::new());
        let record = resolver(transport.clone(), None)
            .resolve("https://cubari.moe/read/imgur/abc", &ResolveHint { id: Some("JP_x".to_string()), ..Default::default() })
            .await;
        assert!(record.is_error());
        assert_eq!(record.id, "JP_x");
        let details = record.error_details.unwrap();
        assert_eq!(details.kind, FailureKind::InvalidPointer);
        assert!(!details.retryable);
        assert_eq!(details.timestamp, 42_000);
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unreachable_document_is_systemic() {
        let transport = Arc::new(MockTransport::new());
        let record = resolver(transport, None)
            .resolve(&pointer_url("https://cubari.moe", PATH), &ResolveHint::default())
            .await;
        let details = record.error_details.unwrap();
        assert_eq!(details.kind, FailureKind::SystemicNetwork);
        assert!(details.retryable);
    }

    #[tokio::test]
    async fn test_document_shape_failures() {
        let transport = Arc::new(
            MockTransport::new()
                .json(FETCHED, &json!({"title": "no chapters"}))
                .route(format!("{RAW}/owner/repo/main/html.json"), MockRoute::Respond {
                    status: 200,
                    body: b"<html>".to_vec(),
                }),
        );
        let resolver = resolver(transport, None);
        let record = resolver.resolve(&pointer_url("https://cubari.moe", PATH), &ResolveHint::default()).await;
        assert_eq!(record.failure_kind(), Some(FailureKind::Validation));
        let record = resolver
            .resolve(&pointer_url("https://cubari.moe", "owner/repo/main/html.json"), &ResolveHint::default())
            .await;
        assert_eq!(record.failure_kind(), Some(FailureKind::ItemResolution));
    }
}
