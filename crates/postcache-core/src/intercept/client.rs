//! Request adapter with callback-style completion events
//!
//! [`InterceptingClient`] routes every request through a
//! [`NetworkInterceptor`] before it reaches the transport. Calls are opened,
//! configured and sent; completion is reported to registered handlers as a
//! fixed sequence of [`CallEvent`]s, always from a spawned task and never
//! from inside `send`.

use super::interceptor::{InterceptDecision, NetworkInterceptor};
use super::rewriter::parse_request_url;
use crate::error::{PostcacheResult, ResultExt};
use crate::http::{HttpRequest, ResponseView, SharedTransport, SynthesizedResponse};
use reqwest::Method;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;
use url::Url;

/// Progress of a call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Unsent,
    Opened,
    HeadersReceived,
    Loading,
    Done,
}

/// Events delivered to call handlers.
///
/// A completed call yields `HeadersReceived`, `Loading` and `Done` state
/// changes, then `Load` and `LoadEnd`. A failed call yields `Done`, `Error`
/// and `LoadEnd`.
#[derive(Debug, Clone)]
pub enum CallEvent {
    ReadyStateChange(ReadyState),
    Load(Arc<dyn ResponseView>),
    Error(String),
    LoadEnd,
}

impl CallEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ReadyStateChange(_) => "readystatechange",
            Self::Load(_) => "load",
            Self::Error(_) => "error",
            Self::LoadEnd => "loadend",
        }
    }
}

type EventHandler = Box<dyn FnMut(&CallEvent) + Send>;

/// Adapter that installs an interceptor in front of a transport
#[derive(Clone)]
pub struct InterceptingClient {
    interceptor: Arc<dyn NetworkInterceptor>,
    transport: SharedTransport,
    base_url: Option<Url>,
}

impl InterceptingClient {
    pub fn new(interceptor: Arc<dyn NetworkInterceptor>, transport: SharedTransport) -> Self {
        Self {
            interceptor,
            transport,
            base_url: None,
        }
    }

    /// Origin against which relative URLs are resolved
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = Some(base_url);
        self
    }

    /// Start configuring a call
    pub fn open(&self, method: Method, url: impl Into<String>) -> PendingCall {
        PendingCall {
            client: self.clone(),
            method,
            url: url.into(),
            headers: Vec::new(),
            handlers: Vec::new(),
            state: ReadyState::Opened,
        }
    }

    /// Send a request and wait for its response
    pub async fn fetch(&self, request: HttpRequest) -> PostcacheResult<Arc<dyn ResponseView>> {
        self.dispatch(request).await
    }

    /// Resolve a possibly relative URL against the base origin
    pub fn resolve(&self, raw: &str) -> PostcacheResult<Url> {
        parse_request_url(self.base_url.as_ref(), raw)
    }

    async fn dispatch(&self, request: HttpRequest) -> PostcacheResult<Arc<dyn ResponseView>> {
        let decision = self.interceptor.intercept(&request).await;
        debug!("{} {} -> {}", request.method, request.url, decision.label());

        if let InterceptDecision::ServeFromCache {
            request: rewritten,
            key,
            entry,
            ..
        } = &decision
        {
            match SynthesizedResponse::from_entry(entry) {
                Ok(response) => {
                    self.interceptor.on_served_from_cache(key, rewritten).await;
                    // Cached answers still arrive asynchronously
                    tokio::task::yield_now().await;
                    return Ok(Arc::new(response));
                }
                Err(e) => self.interceptor.on_synthesis_failed(key, &e),
            }
        }

        let outgoing = decision.outgoing(&request);
        let response = self.transport.execute(&outgoing).await?;
        self.interceptor.on_response(&decision, &response).await;
        Ok(Arc::new(response))
    }
}

/// A call being configured; consumed by [`PendingCall::send`]
pub struct PendingCall {
    client: InterceptingClient,
    method: Method,
    url: String,
    headers: Vec<(String, String)>,
    handlers: Vec<EventHandler>,
    state: ReadyState,
}

impl PendingCall {
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Register a completion handler; handlers run in registration order
    pub fn on_event<F>(&mut self, handler: F) -> &mut Self
    where
        F: FnMut(&CallEvent) + Send + 'static,
    {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn ready_state(&self) -> ReadyState {
        self.state
    }

    /// Send the call. Events are delivered later, from a spawned task.
    pub fn send(self, body: Option<String>) -> CallHandle {
        let PendingCall {
            client,
            method,
            url,
            headers,
            mut handlers,
            ..
        } = self;

        let task = tokio::spawn(async move {
            tokio::task::yield_now().await;

            let result = match client.resolve(&url) {
                Ok(parsed) => {
                    let mut request = HttpRequest::new(method, parsed);
                    request.headers = headers;
                    request.body = body;
                    client.dispatch(request).await
                }
                Err(e) => Err(e),
            };

            let mut emit = |event: CallEvent| {
                for handler in handlers.iter_mut() {
                    handler(&event);
                }
            };
            match &result {
                Ok(response) => {
                    emit(CallEvent::ReadyStateChange(ReadyState::HeadersReceived));
                    emit(CallEvent::ReadyStateChange(ReadyState::Loading));
                    emit(CallEvent::ReadyStateChange(ReadyState::Done));
                    emit(CallEvent::Load(Arc::clone(response)));
                    emit(CallEvent::LoadEnd);
                }
                Err(e) => {
                    emit(CallEvent::ReadyStateChange(ReadyState::Done));
                    emit(CallEvent::Error(e.to_string()));
                    emit(CallEvent::LoadEnd);
                }
            }
            result
        });

        CallHandle { task }
    }
}

/// Handle to a sent call
pub struct CallHandle {
    task: JoinHandle<PostcacheResult<Arc<dyn ResponseView>>>,
}

impl CallHandle {
    /// Wait until every event has been delivered and return the outcome
    pub async fn finished(self) -> PostcacheResult<Arc<dyn ResponseView>> {
        self.task.await.context("Call task failed")?
    }
}
