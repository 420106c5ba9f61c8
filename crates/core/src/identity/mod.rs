//! External identity provider.
//!
//! Approving an application creates an account, an organization, an allowlist entry and an
//! invitation at the identity provider. The platform only ever sees the opaque identifiers it
//! hands back ([`ExternalUserId`], [`OrganizationId`]).
//!
//! A create call can succeed at the provider and still time out locally, so callers look an
//! account or organization up before creating it.
//!
//! [`ClerkProvisioner`] talks to the hosted provider over HTTP. [`InMemoryProvisioner`] backs
//! tests and explicit local development. Without either, [`UnconfiguredProvisioner`] refuses
//! every call so approvals fail instead of recording organizations nobody can sign in to.

mod clerk;
mod memory;

pub use clerk::{ClerkConfig, ClerkProvisioner};
pub use memory::{InMemoryProvisioner, Organization, ProvisionerCall};

use async_trait::async_trait;
use cardio_types::EmailAddress;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

macro_rules! external_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

external_id!(
    /// Account identifier issued by the identity provider.
    ExternalUserId
);
external_id!(
    /// Tenant identifier issued by the identity provider; partitions every clinical and
    /// billing row.
    OrganizationId
);

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity provider request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("identity provider returned {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("identity provider did not answer within {0:?}")]
    Timeout(Duration),
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait IdentityProvisioner: Send + Sync {
    /// Finds an existing account for `email`.
    async fn find_user(&self, email: &EmailAddress)
        -> Result<Option<ExternalUserId>, IdentityError>;

    /// Creates an account for `email`.
    async fn create_user(&self, email: &EmailAddress) -> Result<ExternalUserId, IdentityError>;

    /// Creates an organization owned by `created_by`. `slug` is unique per organization.
    async fn create_organization(
        &self,
        name: &str,
        slug: &str,
        created_by: &ExternalUserId,
    ) -> Result<OrganizationId, IdentityError>;

    /// Finds the organization created with `slug`.
    async fn find_organization(&self, slug: &str)
        -> Result<Option<OrganizationId>, IdentityError>;

    /// Allows `email` to sign up; failures are tolerated by callers.
    async fn allowlist(&self, email: &EmailAddress) -> Result<(), IdentityError>;

    /// Sends a sign-in invitation to `email`.
    async fn invite(&self, email: &EmailAddress) -> Result<(), IdentityError>;
}

/// Stands in when no identity provider is configured; every call fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredProvisioner;

impl UnconfiguredProvisioner {
    fn refuse<T>(&self) -> Result<T, IdentityError> {
        Err(IdentityError::Unavailable(
            "no identity provider is configured".into(),
        ))
    }
}

#[async_trait]
impl IdentityProvisioner for UnconfiguredProvisioner {
    async fn find_user(
        &self,
        _email: &EmailAddress,
    ) -> Result<Option<ExternalUserId>, IdentityError> {
        self.refuse()
    }

    async fn create_user(&self, _email: &EmailAddress) -> Result<ExternalUserId, IdentityError> {
        self.refuse()
    }

    async fn find_organization(
        &self,
        _slug: &str,
    ) -> Result<Option<OrganizationId>, IdentityError> {
        self.refuse()
    }

    async fn create_organization(
        &self,
        _name: &str,
        _slug: &str,
        _created_by: &ExternalUserId,
    ) -> Result<OrganizationId, IdentityError> {
        self.refuse()
    }

    async fn allowlist(&self, _email: &EmailAddress) -> Result<(), IdentityError> {
        self.refuse()
    }

    async fn invite(&self, _email: &EmailAddress) -> Result<(), IdentityError> {
        self.refuse()
    }
}
