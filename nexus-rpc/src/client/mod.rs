//! Client dispatcher
//!
//! [`Client`] mirrors the router's shape: [`scope`](Client::scope) descends
//! into a namespace, and queries, mutations and subscriptions are issued by
//! name. Queries and mutations travel through the batch link, which
//! coalesces calls made within a short window into one request.
//! Subscriptions travel through the stream link, one event stream each.
//!
//! ```rust,ignore
//! let client = Client::new("http://127.0.0.1:3000/api/rpc")?;
//!
//! let greeting: Greeting = client.query("hello", json!({"text": "world"})).await?;
//! let user: User = client.scope("user").query("getById", json!({"id": "1"})).await?;
//!
//! let mut stream = client.subscribe::<_, String>("teststream", json!({"text": "x"})).await?;
//! while let Some(message) = stream.next().await {
//!     println!("{}", message?);
//! }
//! ```

mod batch;
mod config;
mod error;
mod stream;
mod transport;

pub use config::ClientConfig;
pub use error::ClientError;
pub use stream::SubscriptionHandle;
pub use transport::{Procedure, TransportKind};

#[cfg(test)]
pub(crate) use stream::{SseDecoder, SseFrame};

use crate::batch::CallRequest;
use crate::dispatcher::SubscribeRequest;
use crate::{ProcedureMeta, ProcedureType};
use batch::{BatchLink, rejection};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use stream::Unsubscriber;

struct ClientInner {
    http: reqwest::Client,
    base_url: String,
    config: ClientConfig,
    batch: BatchLink,
}

/// Handle to a remote router.
///
/// Cloning is cheap; clones share one connection pool and one batch link.
/// Must be created inside a Tokio runtime.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
    prefix: Option<String>,
}

impl Client {
    /// Client with default configuration for the router mounted at
    /// `base_url` (e.g. `http://127.0.0.1:3000/api/rpc`).
    ///
    /// # Errors
    ///
    /// [`ClientError::Setup`] for a malformed URL.
    pub fn new(base_url: impl AsRef<str>) -> Result<Self, ClientError> {
        Self::with_config(base_url, ClientConfig::default())
    }

    /// Client with explicit configuration.
    ///
    /// # Errors
    ///
    /// [`ClientError::Config`] for an invalid configuration,
    /// [`ClientError::Setup`] for a malformed URL or header.
    pub fn with_config(
        base_url: impl AsRef<str>,
        config: ClientConfig,
    ) -> Result<Self, ClientError> {
        config.validate()?;
        let base_url = base_url.as_ref().trim_end_matches('/').to_string();
        reqwest::Url::parse(&base_url)
            .map_err(|e| ClientError::Setup(format!("invalid base URL '{}': {}", base_url, e)))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ClientError::Setup(format!("invalid header '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ClientError::Setup(format!("invalid value for '{}': {}", name, e)))?;
            headers.insert(name, value);
        }
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        let batch = BatchLink::spawn(http.clone(), base_url.clone(), &config);
        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                config,
                batch,
            }),
            prefix: None,
        })
    }

    /// Client whose calls are resolved under `namespace`.
    ///
    /// `client.scope("user").query("getById", ..)` calls `user.getById`.
    pub fn scope(&self, namespace: impl AsRef<str>) -> Self {
        Self {
            inner: self.inner.clone(),
            prefix: Some(self.path(namespace.as_ref())),
        }
    }

    /// Full path of `name` under this client's scope
    pub fn path(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}.{}", prefix, name),
            None => name.to_string(),
        }
    }

    /// Active configuration
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Run a query through the batch link.
    pub async fn query<I, O>(&self, name: &str, input: I) -> Result<O, ClientError>
    where
        I: Serialize,
        O: DeserializeOwned,
    {
        self.request(self.path(name), input).await
    }

    /// Run a mutation through the batch link.
    pub async fn mutation<I, O>(&self, name: &str, input: I) -> Result<O, ClientError>
    where
        I: Serialize,
        O: DeserializeOwned,
    {
        self.request(self.path(name), input).await
    }

    /// Open a subscription through the stream link.
    pub async fn subscribe<I, O>(
        &self,
        name: &str,
        input: I,
    ) -> Result<SubscriptionHandle<O>, ClientError>
    where
        I: Serialize,
        O: DeserializeOwned,
    {
        self.open_stream(self.path(name), input, None).await
    }

    /// Open a subscription, asking the producer to resume after
    /// `last_event_id`.
    pub async fn subscribe_from<I, O>(
        &self,
        name: &str,
        input: I,
        last_event_id: impl Into<String>,
    ) -> Result<SubscriptionHandle<O>, ClientError>
    where
        I: Serialize,
        O: DeserializeOwned,
    {
        self.open_stream(self.path(name), input, Some(last_event_id.into()))
            .await
    }

    /// Typed query or mutation. The path is absolute; the scope is ignored.
    ///
    /// # Errors
    ///
    /// [`ClientError::WrongKind`] if `P` is a subscription.
    pub async fn call<P: Procedure>(&self, input: P::Input) -> Result<P::Output, ClientError> {
        match TransportKind::for_procedure(P::KIND) {
            TransportKind::Batch => self.request(P::PATH.to_string(), input).await,
            TransportKind::Stream => Err(ClientError::WrongKind {
                path: P::PATH.to_string(),
                kind: P::KIND,
            }),
        }
    }

    /// Typed subscription. The path is absolute; the scope is ignored.
    ///
    /// # Errors
    ///
    /// [`ClientError::WrongKind`] if `P` is a query or mutation.
    pub async fn subscribe_to<P: Procedure>(
        &self,
        input: P::Input,
    ) -> Result<SubscriptionHandle<P::Output>, ClientError> {
        match TransportKind::for_procedure(P::KIND) {
            TransportKind::Stream => self.open_stream(P::PATH.to_string(), input, None).await,
            TransportKind::Batch => Err(ClientError::WrongKind {
                path: P::PATH.to_string(),
                kind: P::KIND,
            }),
        }
    }

    /// Ask the server to cancel a subscription by id.
    pub async fn unsubscribe(&self, id: &crate::SubscriptionId) -> Result<bool, ClientError> {
        self.unsubscriber().send(id).await
    }

    /// Catalog of the server's procedures, sorted by path.
    pub async fn procedures(&self) -> Result<Vec<ProcedureMeta>, ClientError> {
        let response = self
            .inner
            .http
            .get(format!("{}/procedures", self.inner.base_url))
            .timeout(self.inner.config.request_timeout)
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(rejection(status, &body));
        }
        Ok(serde_json::from_slice(&body)?)
    }

    /// Kind of `name` according to the server's catalog, if it exists
    pub async fn kind_of(&self, name: &str) -> Result<Option<ProcedureType>, ClientError> {
        let path = self.path(name);
        Ok(self
            .procedures()
            .await?
            .into_iter()
            .find(|p| p.path == path)
            .map(|p| p.procedure_type))
    }

    async fn request<I, O>(&self, path: String, input: I) -> Result<O, ClientError>
    where
        I: Serialize,
        O: DeserializeOwned,
    {
        let input = serde_json::to_value(input)?;
        let value = self.inner.batch.call(CallRequest::new(path, input)).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn open_stream<I, O>(
        &self,
        path: String,
        input: I,
        last_event_id: Option<String>,
    ) -> Result<SubscriptionHandle<O>, ClientError>
    where
        I: Serialize,
    {
        let mut request = SubscribeRequest::new(path, serde_json::to_value(input)?);
        request.last_event_id = last_event_id;
        stream::open(
            &self.inner.http,
            &format!("{}/subscribe", self.inner.base_url),
            &request,
            self.unsubscriber(),
        )
        .await
    }

    fn unsubscriber(&self) -> Unsubscriber {
        Unsubscriber {
            http: self.inner.http.clone(),
            url: format!("{}/unsubscribe", self.inner.base_url),
        }
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.inner.base_url)
            .field("prefix", &self.prefix)
            .finish()
    }
}
