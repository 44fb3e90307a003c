//! Running image I/O under another account.
//!
//! The batch runner calls an [`Impersonator`] before each image in impersonation mode
//! and keeps the returned guard alive while the image is read and processed. Account
//! switching itself is platform specific and lives behind the trait.

use crate::core::errors::{FormError, FormResult, ProcessingStage};
use std::str::FromStr;

/// Logon credentials from a `DOMAIN;username;password` connection string.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub domain: String,
    pub username: String,
    password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

impl Credentials {
    pub fn password(&self) -> &str {
        &self.password
    }

    /// `DOMAIN\username`, as used in log messages.
    pub fn principal(&self) -> String {
        format!("{}\\{}", self.domain, self.username)
    }
}

impl FromStr for Credentials {
    type Err = FormError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(';').collect();
        let [domain, username, password] = parts.as_slice() else {
            return Err(FormError::invalid_field(
                "impersonation.connection_string",
                "DOMAIN;username;password",
                format!("{} fields", parts.len()),
            ));
        };
        if username.trim().is_empty() {
            return Err(FormError::invalid_field(
                "impersonation.connection_string",
                "a non-empty username",
                "\"\"",
            ));
        }
        Ok(Self {
            domain: domain.trim().to_string(),
            username: username.trim().to_string(),
            password: password.to_string(),
        })
    }
}

/// Restores the original identity when dropped.
#[must_use = "the identity reverts as soon as the guard is dropped"]
pub struct ImpersonationGuard {
    principal: String,
    revert: Option<Box<dyn FnOnce() + Send>>,
}

impl ImpersonationGuard {
    /// A guard running `revert` on drop.
    pub fn new(principal: impl Into<String>, revert: impl FnOnce() + Send + 'static) -> Self {
        Self {
            principal: principal.into(),
            revert: Some(Box::new(revert)),
        }
    }

    pub fn principal(&self) -> &str {
        &self.principal
    }
}

impl std::fmt::Debug for ImpersonationGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImpersonationGuard")
            .field("principal", &self.principal)
            .finish_non_exhaustive()
    }
}

impl Drop for ImpersonationGuard {
    fn drop(&mut self) {
        if let Some(revert) = self.revert.take() {
            revert();
        }
        tracing::debug!(principal = %self.principal, "reverted to own identity");
    }
}

/// Switches the calling thread to another account.
pub trait Impersonator: Send + Sync {
    fn impersonate(&self) -> FormResult<ImpersonationGuard>;
}

/// Impersonator for platforms where the process already runs with the needed access.
///
/// It validates the configured credentials and brackets each image with log entries
/// but does not change the thread identity.
#[derive(Debug, Clone)]
pub struct CredentialImpersonator {
    credentials: Option<Credentials>,
}

impl CredentialImpersonator {
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials: Some(credentials),
        }
    }

    /// Parses the connection string; a missing string is reported on first use.
    pub fn from_connection_string(connection_string: Option<&str>) -> FormResult<Self> {
        let credentials = connection_string
            .map(str::parse::<Credentials>)
            .transpose()?;
        Ok(Self { credentials })
    }
}

impl Impersonator for CredentialImpersonator {
    fn impersonate(&self) -> FormResult<ImpersonationGuard> {
        let credentials = self.credentials.as_ref().ok_or_else(|| {
            FormError::stage_error(
                ProcessingStage::Impersonation,
                "no impersonation.connection_string configured",
            )
        })?;
        let principal = credentials.principal();
        tracing::info!(principal = %principal, "impersonating user");
        Ok(ImpersonationGuard::new(principal, || {}))
    }
}
