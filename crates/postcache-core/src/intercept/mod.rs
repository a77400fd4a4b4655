//! Request interception
//!
//! The classifier and rewriter decide what happens to a request; the
//! [`NetworkInterceptor`] trait is the seam a cache service plugs into, and
//! [`InterceptingClient`] installs an interceptor in front of a transport.

pub mod classifier;
pub mod client;
pub mod interceptor;
pub mod rewriter;

pub use classifier::{Classification, EndpointTemplate, RequestClassifier};
pub use client::{CallEvent, CallHandle, InterceptingClient, PendingCall, ReadyState};
pub use interceptor::{InterceptDecision, NetworkInterceptor};
pub use rewriter::{UrlRewriter, parse_request_url};
