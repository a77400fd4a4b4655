//! HTTP request/response model and the transport seam
//!
//! Real responses ([`NetworkResponse`]) and responses fabricated from the
//! cache ([`SynthesizedResponse`]) are both consumed through the
//! [`ResponseView`] trait, so a consumer cannot tell them apart except through
//! [`ResponseView::from_cache`].

pub mod synthesized;
pub mod transport;
pub mod types;

pub use synthesized::SynthesizedResponse;
pub use transport::{ReqwestTransport, SharedTransport, Transport};
pub use types::{HttpRequest, NetworkResponse, ResponseView};

#[cfg(test)]
pub use transport::MockTransport;
