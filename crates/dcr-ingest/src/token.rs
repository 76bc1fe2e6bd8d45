// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bearer token acquisition.
//!
//! The pipeline only needs `get_token() -> String`. [`TokenFactory`] either
//! holds a static token or resolves one lazily, once per run, through a
//! resolver such as [`ClientCredentials`].

use crate::constants::MONITOR_SCOPE;
use serde::Deserialize;
use std::fmt::Debug;
use std::sync::Arc;
use std::{future::Future, pin::Pin};
use tokio::sync::OnceCell;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Token request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Token endpoint returned {status}: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("Token provider returned an empty token")]
    Empty,
}

pub type TokenResolverFn =
    Arc<dyn Fn() -> Pin<Box<dyn Future<Output = Result<String, TokenError>> + Send>> + Send + Sync>;

#[derive(Clone)]
pub enum TokenFactory {
    Static(String),
    Dynamic {
        resolver_fn: TokenResolverFn,
        token: Arc<OnceCell<String>>,
    },
}

impl TokenFactory {
    pub fn new_from_resolver(resolver_fn: TokenResolverFn) -> Self {
        Self::Dynamic {
            resolver_fn,
            token: Arc::new(OnceCell::new()),
        }
    }

    pub fn new_from_static_token(token: &str) -> Self {
        Self::Static(token.to_string())
    }

    /// Resolves the token. A successful dynamic resolution is cached; a failed
    /// one is retried on the next call. Empty tokens are an error.
    pub async fn get_token(&self) -> Result<&str, TokenError> {
        let token = match self {
            Self::Static(token) => token.as_str(),
            Self::Dynamic { resolver_fn, token } => token
                .get_or_try_init(|| async {
                    let resolved = (resolver_fn)().await?;
                    if resolved.trim().is_empty() {
                        return Err(TokenError::Empty);
                    }
                    Ok(resolved)
                })
                .await?
                .as_str(),
        };
        if token.trim().is_empty() {
            return Err(TokenError::Empty);
        }
        Ok(token)
    }
}

impl Debug for TokenFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TokenFactory")
    }
}

/// OAuth 2.0 client-credentials grant against an Entra ID tenant.
#[derive(Clone)]
pub struct ClientCredentials {
    client: reqwest::Client,
    /// e.g. `https://login.microsoftonline.com`
    authority_host: String,
    tenant_id: String,
    client_id: String,
    client_secret: String,
    scope: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

impl ClientCredentials {
    pub fn new(
        client: reqwest::Client,
        authority_host: &str,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Self {
        Self {
            client,
            authority_host: authority_host.trim_end_matches('/').to_string(),
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            scope: MONITOR_SCOPE.to_string(),
        }
    }

    #[must_use]
    pub fn token_url(&self) -> String {
        format!("{}/{}/oauth2/v2.0/token", self.authority_host, self.tenant_id)
    }

    /// Requests a fresh access token.
    pub async fn fetch(&self) -> Result<String, TokenError> {
        let url = self.token_url();
        debug!("Requesting access token from {url}");
        let response = self
            .client
            .post(&url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("scope", self.scope.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TokenError::Rejected { status, body });
        }
        let token: TokenResponse = response.json().await?;
        if token.access_token.trim().is_empty() {
            return Err(TokenError::Empty);
        }
        Ok(token.access_token)
    }

    /// Wraps this provider in a lazily resolving [`TokenFactory`].
    #[must_use]
    pub fn into_factory(self) -> TokenFactory {
        let credentials = Arc::new(self);
        TokenFactory::new_from_resolver(Arc::new(move || {
            let credentials = Arc::clone(&credentials);
            Box::pin(async move { credentials.fetch().await })
        }))
    }
}

impl Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("authority_host", &self.authority_host)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}
