//! Verified-identity extraction.
//!
//! Authentication itself is an external collaborator: an identity-aware proxy in front of this server
//! authenticates the user and injects the verified, opaque user id into a trusted header (configured via
//! [`crate::config::ServerConfig::identity_header`]). This extractor surfaces that id to handlers; the server
//! never re-derives identity itself. Requests without the header are rejected with a 401.
use std::future::{ready, Ready};

use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use log::trace;

use crate::{config::ServerConfig, errors::ServerError};

/// The authenticated caller, as attested by the fronting identity provider. The same opaque id identifies the
/// caller whether they act as a buyer or a seller; authorization is decided per resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedUser {
    pub user_id: String,
}

impl FromRequest for VerifiedUser {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        let header = req
            .app_data::<web::Data<ServerConfig>>()
            .map(|c| c.identity_header.clone())
            .unwrap_or_else(|| "x-verified-user-id".to_string());
        let result = req
            .headers()
            .get(&header)
            .and_then(|v| v.to_str().ok())
            .filter(|s| !s.trim().is_empty())
            .map(|s| VerifiedUser { user_id: s.to_string() })
            .ok_or(ServerError::Unauthenticated);
        if let Ok(user) = &result {
            trace!("💻️ Request is acting as {}", user.user_id);
        }
        ready(result)
    }
}
