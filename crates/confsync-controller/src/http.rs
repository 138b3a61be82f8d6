//! # HTTP Remote Client
//!
//! The real networked [`RemoteConfigPort`] variant, speaking the
//! configuration service's HTTP API.
//!
//! ## Client Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     HttpConfigClient                                    │
//! │                                                                         │
//! │  get      GET    {base}/v1/cs/configs?dataId=&group=&tenant=           │
//! │  publish  POST   {base}/v1/cs/configs   (form-encoded, metadata JSON)  │
//! │  delete   DELETE {base}/v1/cs/configs?dataId=&group=&tenant=           │
//! │  listen   poll task per subscription: GET + compare at a short         │
//! │           interval, invoking the handler on drift                      │
//! │                                                                         │
//! │  FIXED OPERATIONAL PARAMETERS (set at construction, never per-call)    │
//! │  • bounded request + connect timeouts                                  │
//! │  • no client-side response caching (Cache-Control: no-cache)           │
//! │  • namespace bound once per client, matching the cache identity        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! One client is constructed per server identity by the client cache and
//! shared by every resource on that identity. Subscription poll tasks are
//! owned here and aborted on cancel.

use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use url::Url;

use confsync_core::{parse_server_address, AdditionalConfig};

use crate::auth::AuthInfo;
use crate::cache::ClientFactory;
use crate::config::ControllerConfig;
use crate::error::{SyncError, SyncResult};
use crate::remote::{ChangeHandler, ConfigChange, RemoteConfigPort, SubscriptionId};

/// Entry API path on the configuration service.
const CONFIGS_PATH: &str = "v1/cs/configs";

/// Header carrying the access key.
const HEADER_ACCESS_KEY: &str = "x-access-key";

/// Header carrying the secret key.
const HEADER_SECRET_KEY: &str = "x-secret-key";

// =============================================================================
// HTTP Client
// =============================================================================

/// Networked remote-config client over the service's HTTP API.
pub struct HttpConfigClient {
    http: reqwest::Client,
    base: Url,
    namespace: String,
    access_key: String,
    secret_key: String,
    poll_interval: Duration,
    subscriptions: Mutex<HashMap<SubscriptionId, JoinHandle<()>>>,
    next_subscription: AtomicU64,
}

impl HttpConfigClient {
    /// Creates a client bound to the resolved connection target.
    pub fn new(auth: &AuthInfo, config: &ControllerConfig) -> SyncResult<Self> {
        let base = Self::base_url(auth)?;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::CACHE_CONTROL,
            reqwest::header::HeaderValue::from_static("no-cache"),
        );

        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .default_headers(headers)
            .build()?;

        Ok(HttpConfigClient {
            http,
            base,
            namespace: auth.namespace.clone(),
            access_key: auth.access_key.clone(),
            secret_key: auth.secret_key.clone(),
            poll_interval: config.listen_poll_interval(),
            subscriptions: Mutex::new(HashMap::new()),
            next_subscription: AtomicU64::new(1),
        })
    }

    /// Derives the base URL from the resolved target: a full endpoint URL
    /// when given, otherwise `host[:port]` with the default service port.
    fn base_url(auth: &AuthInfo) -> SyncResult<Url> {
        if let Some(endpoint) = auth.endpoint.as_deref().filter(|e| !e.trim().is_empty()) {
            let endpoint = endpoint.trim();
            let url = if endpoint.contains("://") {
                Url::parse(endpoint)?
            } else {
                Url::parse(&format!("http://{}", endpoint))?
            };
            return Ok(url);
        }

        if let Some(address) = auth.server_address.as_deref().filter(|a| !a.trim().is_empty()) {
            let (host, port) = parse_server_address(address)?;
            return Ok(Url::parse(&format!("http://{}:{}", host, port))?);
        }

        Err(SyncError::InvalidSpec(
            "remote server spec names neither an endpoint nor a server address".into(),
        ))
    }

    fn configs_url(&self) -> Url {
        // The base URL is validated at construction; joining a constant
        // relative path cannot fail.
        self.base
            .join(CONFIGS_PATH)
            .unwrap_or_else(|_| self.base.clone())
    }

    fn entry_query(&self, group: &str, key: &str) -> Vec<(&'static str, String)> {
        vec![
            ("dataId", key.to_string()),
            ("group", group.to_string()),
            ("tenant", self.namespace.clone()),
        ]
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header(HEADER_ACCESS_KEY, self.access_key.as_str())
            .header(HEADER_SECRET_KEY, self.secret_key.as_str())
    }

    /// One fetch used by both `get` and the listener poll loop.
    async fn fetch(&self, group: &str, key: &str) -> SyncResult<Option<String>> {
        let response = self
            .authed(self.http.get(self.configs_url()).query(&self.entry_query(group, key)))
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(Some(response.text().await?)),
            StatusCode::NOT_FOUND => Ok(None),
            status => Err(SyncError::RemoteUnavailable(format!(
                "get {}/{} returned {}",
                group, key, status
            ))),
        }
    }
}

#[async_trait]
impl RemoteConfigPort for HttpConfigClient {
    async fn get(&self, group: &str, key: &str) -> SyncResult<Option<String>> {
        self.fetch(group, key).await
    }

    async fn publish(
        &self,
        group: &str,
        key: &str,
        content: &str,
        metadata: Option<&AdditionalConfig>,
    ) -> SyncResult<()> {
        let mut form: Vec<(&str, String)> = vec![
            ("dataId", key.to_string()),
            ("group", group.to_string()),
            ("tenant", self.namespace.clone()),
            ("content", content.to_string()),
        ];
        if let Some(meta) = metadata.filter(|m| !m.is_empty()) {
            if !meta.labels.is_empty() {
                form.push(("labels", serde_json::to_string(&meta.labels)?));
            }
            if !meta.properties.is_empty() {
                form.push(("properties", serde_json::to_string(&meta.properties)?));
            }
            if !meta.tags.is_empty() {
                form.push(("tags", serde_json::to_string(&meta.tags)?));
            }
        }

        let response = self
            .authed(self.http.post(self.configs_url()).form(&form))
            .send()
            .await?;

        if response.status().is_success() {
            debug!(group, key, "Published entry");
            Ok(())
        } else {
            Err(SyncError::RemoteUnavailable(format!(
                "publish {}/{} returned {}",
                group,
                key,
                response.status()
            )))
        }
    }

    async fn delete(&self, group: &str, key: &str) -> SyncResult<()> {
        let response = self
            .authed(
                self.http
                    .delete(self.configs_url())
                    .query(&self.entry_query(group, key)),
            )
            .send()
            .await?;

        match response.status() {
            // Absent entries are success by contract.
            status if status.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Ok(()),
            status => Err(SyncError::RemoteUnavailable(format!(
                "delete {}/{} returned {}",
                group, key, status
            ))),
        }
    }

    async fn listen(
        &self,
        group: &str,
        key: &str,
        handler: ChangeHandler,
    ) -> SyncResult<SubscriptionId> {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));

        // Seed the comparison state so registration itself never fires the
        // handler; only subsequent drift does.
        let mut last = self.fetch(group, key).await?;

        let http = self.http.clone();
        let base = self.base.clone();
        let namespace = self.namespace.clone();
        let access_key = self.access_key.clone();
        let secret_key = self.secret_key.clone();
        let poll_interval = self.poll_interval;
        let group = group.to_string();
        let key = key.to_string();

        let task = tokio::spawn(async move {
            let url = base.join(CONFIGS_PATH).unwrap_or(base);
            let mut interval = tokio::time::interval(poll_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it so the loop
            // waits a full interval after the seeding fetch.
            interval.tick().await;

            loop {
                interval.tick().await;

                let response = http
                    .get(url.clone())
                    .query(&[
                        ("dataId", key.as_str()),
                        ("group", group.as_str()),
                        ("tenant", namespace.as_str()),
                    ])
                    .header(HEADER_ACCESS_KEY, access_key.as_str())
                    .header(HEADER_SECRET_KEY, secret_key.as_str())
                    .send()
                    .await;

                let current = match response {
                    Ok(r) if r.status() == StatusCode::OK => match r.text().await {
                        Ok(text) => Some(text),
                        Err(e) => {
                            warn!(group = %group, key = %key, error = %e, "Listener read failed");
                            continue;
                        }
                    },
                    Ok(r) if r.status() == StatusCode::NOT_FOUND => None,
                    Ok(r) => {
                        warn!(group = %group, key = %key, status = %r.status(), "Listener poll rejected");
                        continue;
                    }
                    Err(e) => {
                        warn!(group = %group, key = %key, error = %e, "Listener poll failed");
                        continue;
                    }
                };

                if current != last {
                    debug!(group = %group, key = %key, "Remote entry drifted");
                    handler(ConfigChange {
                        group: group.clone(),
                        entry_key: key.clone(),
                        content: current.clone(),
                    });
                    last = current;
                }
            }
        });

        self.subscriptions
            .lock()
            .expect("subscription lock poisoned")
            .insert(id, task);
        Ok(id)
    }

    async fn cancel_listen(&self, subscription: SubscriptionId) -> SyncResult<()> {
        let task = self
            .subscriptions
            .lock()
            .expect("subscription lock poisoned")
            .remove(&subscription);
        if let Some(task) = task {
            task.abort();
            debug!(subscription = %subscription, "Canceled listener poll task");
        }
        Ok(())
    }
}

impl Drop for HttpConfigClient {
    fn drop(&mut self) {
        if let Ok(subs) = self.subscriptions.lock() {
            for task in subs.values() {
                task.abort();
            }
        }
    }
}

// =============================================================================
// Factory
// =============================================================================

/// Client factory producing [`HttpConfigClient`]s, for wiring into the
/// [`crate::cache::ClientCache`] in networked deployments.
pub fn http_client_factory(config: &ControllerConfig) -> ClientFactory {
    let config = config.clone();
    Arc::new(move |_identity, auth: &AuthInfo| {
        let client = HttpConfigClient::new(auth, &config)?;
        Ok(Arc::new(client) as Arc<dyn RemoteConfigPort>)
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn auth(endpoint: Option<&str>, address: Option<&str>) -> AuthInfo {
        AuthInfo {
            access_key: "ak".to_string(),
            secret_key: "sk".to_string(),
            endpoint: endpoint.map(String::from),
            server_address: address.map(String::from),
            namespace: "ns-1".to_string(),
        }
    }

    #[test]
    fn test_base_url_from_endpoint_without_scheme() {
        let url = HttpConfigClient::base_url(&auth(Some("conf.example.com"), None)).unwrap();
        assert_eq!(url.as_str(), "http://conf.example.com/");
    }

    #[test]
    fn test_base_url_keeps_explicit_scheme() {
        let url =
            HttpConfigClient::base_url(&auth(Some("https://conf.example.com:8443"), None)).unwrap();
        assert_eq!(url.scheme(), "https");
        assert_eq!(url.port(), Some(8443));
    }

    #[test]
    fn test_base_url_from_address_defaults_port() {
        let url = HttpConfigClient::base_url(&auth(None, Some("10.0.0.1"))).unwrap();
        assert_eq!(url.as_str(), "http://10.0.0.1:8848/");

        let url = HttpConfigClient::base_url(&auth(None, Some("10.0.0.1:9090"))).unwrap();
        assert_eq!(url.port(), Some(9090));
    }

    #[test]
    fn test_base_url_requires_a_target() {
        assert!(matches!(
            HttpConfigClient::base_url(&auth(None, None)),
            Err(SyncError::InvalidSpec(_))
        ));
    }

    #[tokio::test]
    async fn test_cancel_unknown_subscription_is_noop() {
        let client =
            HttpConfigClient::new(&auth(Some("conf.example.com"), None), &ControllerConfig::default())
                .unwrap();
        client.cancel_listen(SubscriptionId(99)).await.unwrap();
    }

    #[tokio::test]
    async fn test_configs_url() {
        let client =
            HttpConfigClient::new(&auth(Some("conf.example.com"), None), &ControllerConfig::default())
                .unwrap();
        assert_eq!(
            client.configs_url().as_str(),
            "http://conf.example.com/v1/cs/configs"
        );
    }
}
