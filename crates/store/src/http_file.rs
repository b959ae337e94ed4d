//! File store backed by a public object-storage URL.
//!
//! Objects are fetched from `{storage_url}/{bucket}/{path}`.

use async_trait::async_trait;
use orgchat_core::FileStore;
use orgchat_core::error::StoreError;
use tracing::debug;

pub struct HttpFileStore {
    base_url: String,
    bucket: String,
    client: reqwest::Client,
}

impl HttpFileStore {
    pub fn new(base_url: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bucket: bucket.into().trim_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// The public URL of the object at `path`.
    pub fn object_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url,
            self.bucket,
            path.trim_start_matches('/')
        )
    }
}

#[async_trait]
impl FileStore for HttpFileStore {
    fn name(&self) -> &str {
        "http"
    }

    async fn fetch(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        let url = self.object_url(path);
        debug!(url = %url, "Fetching uploaded file");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| StoreError::FetchFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::FetchFailed(format!(
                "GET {url} returned {status}"
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StoreError::FetchFailed(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::routing::get;

    #[test]
    fn object_url_joins_segments() {
        let store = HttpFileStore::new("https://files.example.com/public/", "orgchat-docs");
        assert_eq!(
            store.object_url("/u1/report.csv"),
            "https://files.example.com/public/orgchat-docs/u1/report.csv"
        );
    }

    #[tokio::test]
    async fn fetch_returns_body_and_maps_404() {
        let router = Router::new().route("/docs/u1/a.csv", get(|| async { "id,name\n1,Ann" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let store = HttpFileStore::new(format!("http://{addr}"), "docs");
        let bytes = store.fetch("u1/a.csv").await.unwrap();
        assert_eq!(bytes, b"id,name\n1,Ann");

        let err = store.fetch("u1/missing.csv").await.unwrap_err();
        assert!(matches!(err, StoreError::FetchFailed(_)));
    }
}
