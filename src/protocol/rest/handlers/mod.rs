//! REST API Handlers
//!
//! Contains all HTTP endpoint handlers organized by domain.

pub mod admin;
pub mod statement;

use std::sync::Arc;

use axum::http::uri::Authority;
use axum::http::{header, HeaderMap};

/// Source of the absolute base URL used in `nextUri` links.
///
/// A configured public URL wins; otherwise the request's `Host` header is
/// used when it is a plain `host[:port]` authority, falling back to the bind
/// address.
#[derive(Debug, Clone)]
pub struct UriBase {
    public_url: Option<Arc<str>>,
    bind_address: Arc<str>,
}

impl UriBase {
    pub fn new(public_url: Option<&str>, bind_address: &str) -> Self {
        Self {
            public_url: public_url.map(|u| Arc::from(u.trim_end_matches('/'))),
            bind_address: Arc::from(bind_address),
        }
    }

    pub fn resolve(&self, headers: &HeaderMap) -> String {
        if let Some(url) = &self.public_url {
            return url.to_string();
        }
        match headers.get(header::HOST).and_then(host_authority) {
            Some(host) => format!("http://{host}"),
            None => format!("http://{}", self.bind_address),
        }
    }
}

fn host_authority(value: &header::HeaderValue) -> Option<Authority> {
    let authority: Authority = value.to_str().ok()?.parse().ok()?;
    // No userinfo in links handed back to clients.
    (!authority.as_str().contains('@')).then_some(authority)
}
