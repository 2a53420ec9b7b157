// ABOUTME: Caller identity taken from a trusted header set by the upstream gateway
// ABOUTME: Exposes the authenticated user id to handlers as an axum extractor
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Pierre Fitness Intelligence

//! # Authentication
//!
//! Tokens are verified before requests reach this service. The gateway
//! forwards the verified user id in a header (default `x-user-id`) and this
//! module trusts it as-is.

use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::errors::{AppError, AppResult};
use crate::resources::ServerResources;

/// Verified identity of the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    /// User id as issued by the identity provider
    pub user_id: String,
}

impl AuthenticatedUser {
    /// Read the user id from `header`
    ///
    /// # Errors
    ///
    /// Returns `AuthRequired` when the header is missing, blank, or not UTF-8
    pub fn from_headers(headers: &HeaderMap, header: &str) -> AppResult<Self> {
        let user_id = headers
            .get(header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or_else(AppError::auth_required)?;

        Ok(Self {
            user_id: user_id.to_owned(),
        })
    }
}

#[async_trait]
impl FromRequestParts<Arc<ServerResources>> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        resources: &Arc<ServerResources>,
    ) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers, &resources.config.auth.user_id_header)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;
    use axum::http::HeaderValue;

    #[test]
    fn test_reads_trusted_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", HeaderValue::from_static(" user-a "));
        let user = AuthenticatedUser::from_headers(&headers, "x-user-id").unwrap();
        assert_eq!(user.user_id, "user-a");
    }

    #[test]
    fn test_missing_header_requires_auth() {
        let err = AuthenticatedUser::from_headers(&HeaderMap::new(), "x-user-id").unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthRequired);
    }
}
