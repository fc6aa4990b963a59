//! Firebase Realtime Database client over its REST interface.
//!
//! Every node is addressable as `<database-url>/<path>.json`; reads are GET,
//! whole-record writes PUT, partial writes PATCH.

use crate::config::DatabaseConfig;
use crate::credentials::{ServiceAccount, TokenProvider};
use crate::record::{validate_key, AttendanceUpdate, StudentRecord};
use crate::store::StudentStore;
use crate::StoreError;
use async_trait::async_trait;
use reqwest::{Method, Url};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::instrument;

pub struct FirebaseStore {
    base: Url,
    root: String,
    client: reqwest::Client,
    auth: TokenProvider,
}

impl FirebaseStore {
    /// Build a client from configuration. Fails if the credentials file is
    /// absent or the URL is unusable; performs no network I/O.
    pub fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let account = ServiceAccount::from_file(&config.credentials)?;
        let base = database_base(&config.url)?;
        validate_key(&config.root)?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(3))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        tracing::info!(
            url = %base,
            root = %config.root,
            account = %account.client_email,
            "database client ready"
        );

        Ok(Self {
            base,
            root: config.root.clone(),
            auth: TokenProvider::new(account, client.clone()),
            client,
        })
    }

    fn node_url(&self, id: Option<&str>) -> Result<(Url, String), StoreError> {
        node_url(&self.base, &self.root, id)
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        id: Option<&str>,
        body: Option<&B>,
    ) -> Result<serde_json::Value, StoreError> {
        let (url, path) = self.node_url(id)?;
        let token = self.auth.token().await?;

        let mut req = self.client.request(method.clone(), url).bearer_auth(token);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(%method, %path, %status, "database request failed");
            return Err(StoreError::Status { status, path, body });
        }
        tracing::debug!(%method, %path, "database request ok");

        let text = resp.text().await?;
        if text.trim().is_empty() {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_str(&text).map_err(|source| StoreError::Decode { path, source })
    }
}

/// Normalize the configured URL so that relative joins land under it.
fn database_base(url: &str) -> Result<Url, StoreError> {
    if url.trim().is_empty() {
        return Err(StoreError::UrlMissing);
    }
    let mut normalized = url.trim().to_string();
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    let parsed = Url::parse(&normalized).map_err(|e| StoreError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "https" | "http") {
        return Err(StoreError::InvalidUrl {
            url: url.to_string(),
            reason: "scheme must be http or https".into(),
        });
    }
    Ok(parsed)
}

/// `<base>/<root>.json` or `<base>/<root>/<id>.json`, each segment
/// percent-encoded so keys holding `?`, `%` or spaces address their own node.
fn node_url(base: &Url, root: &str, id: Option<&str>) -> Result<(Url, String), StoreError> {
    let (segments, path) = match id {
        Some(id) => {
            validate_key(id)?;
            (vec![root.to_string(), format!("{id}.json")], format!("{root}/{id}"))
        }
        None => (vec![format!("{root}.json")], root.to_string()),
    };

    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| StoreError::InvalidUrl {
            url: base.to_string(),
            reason: "URL cannot have a path".into(),
        })?
        .pop_if_empty()
        .extend(&segments);
    Ok((url, path))
}

fn decode_record(key: &str, value: serde_json::Value, path: &str) -> Result<StudentRecord, StoreError> {
    serde_json::from_value::<StudentRecord>(value)
        .map(|r| r.with_defaults(key))
        .map_err(|source| StoreError::Decode {
            path: path.to_string(),
            source,
        })
}

#[async_trait]
impl StudentStore for FirebaseStore {
    #[instrument(skip(self))]
    async fn get(&self, id: &str) -> Result<Option<StudentRecord>, StoreError> {
        let value = self.send::<()>(Method::GET, Some(id), None).await?;
        if value.is_null() {
            return Ok(None);
        }
        decode_record(id, value, &format!("{}/{id}", self.root)).map(Some)
    }

    #[instrument(skip(self))]
    async fn list(&self) -> Result<BTreeMap<String, StudentRecord>, StoreError> {
        let value = self.send::<()>(Method::GET, None, None).await?;
        let mut out = BTreeMap::new();
        match value {
            serde_json::Value::Null => {}
            serde_json::Value::Object(map) => {
                for (key, v) in map {
                    let record = decode_record(&key, v, &format!("{}/{key}", self.root))?;
                    out.insert(key, record);
                }
            }
            // Numeric keys can make the database return an array.
            serde_json::Value::Array(items) => {
                for (i, v) in items.into_iter().enumerate().filter(|(_, v)| !v.is_null()) {
                    let key = i.to_string();
                    let record = decode_record(&key, v, &format!("{}/{key}", self.root))?;
                    out.insert(key, record);
                }
            }
            other => {
                return Err(StoreError::Decode {
                    path: self.root.clone(),
                    source: serde::de::Error::custom(format!("expected an object, got {other}")),
                })
            }
        }
        Ok(out)
    }

    #[instrument(skip(self, record), fields(id = %record.id))]
    async fn put(&self, record: &StudentRecord) -> Result<(), StoreError> {
        self.send(Method::PUT, Some(record.id.as_str()), Some(record)).await?;
        Ok(())
    }

    #[instrument(skip(self, update))]
    async fn update_attendance(&self, id: &str, update: &AttendanceUpdate) -> Result<(), StoreError> {
        self.send(Method::PATCH, Some(id), Some(update)).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> Result<(), StoreError> {
        self.send::<()>(Method::DELETE, Some(id), None).await?;
        Ok(())
    }
}
