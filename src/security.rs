#![forbid(unsafe_code)]

//! Process and caller guards used by the backend.

use std::collections::HashMap;

use anyhow::{Result, bail};
use nix::unistd::Uid;

/// Fails fast when a binary is started as root. Blobs are written under the
/// media root with the process uid, so running as root would leave files a
/// regular service account cannot clean up.
pub fn ensure_not_root(process: &str) -> Result<()> {
    ensure_not_root_for(Uid::current(), process)
}

fn ensure_not_root_for(uid: Uid, process: &str) -> Result<()> {
    if uid.is_root() {
        bail!(
            "{process} must not be run as root; use a regular user or a dedicated service account"
        );
    }
    Ok(())
}

/// Identity of an authenticated uploader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
}

/// Resolves the caller behind a request. The identity provider itself is an
/// external collaborator; implementations only map credentials to user ids.
pub trait Authenticator: Send + Sync {
    /// `authorization` is the raw `Authorization` header value, if present.
    fn authenticate(&self, authorization: Option<&str>) -> Option<Caller>;
}

/// Static bearer-token table loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthenticator {
    tokens: HashMap<String, String>,
}

impl StaticTokenAuthenticator {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }
}

impl Authenticator for StaticTokenAuthenticator {
    fn authenticate(&self, authorization: Option<&str>) -> Option<Caller> {
        let token = bearer_token(authorization?)?;
        self.tokens.get(token).map(|user_id| Caller {
            user_id: user_id.clone(),
        })
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
