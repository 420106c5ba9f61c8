use super::{ExternalUserId, IdentityError, IdentityProvisioner, OrganizationId};
use crate::constants::DEFAULT_IDENTITY_TIMEOUT;
use crate::{CardioError, CardioResult};
use async_trait::async_trait;
use cardio_types::EmailAddress;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Connection settings for the hosted identity provider.
#[derive(Clone)]
pub struct ClerkConfig {
    api_url: String,
    secret_key: String,
    redirect_url: Option<String>,
    timeout: Duration,
}

impl ClerkConfig {
    pub fn new(api_url: impl Into<String>, secret_key: impl Into<String>) -> CardioResult<Self> {
        let api_url = api_url.into().trim().trim_end_matches('/').to_string();
        let secret_key = secret_key.into().trim().to_string();
        if secret_key.is_empty() {
            return Err(CardioError::Config("identity provider secret key is empty".into()));
        }
        if !api_url.starts_with("https://") && !api_url.starts_with("http://") {
            return Err(CardioError::Config(format!(
                "identity provider url must be http(s), got {api_url:?}"
            )));
        }
        Ok(Self {
            api_url,
            secret_key,
            redirect_url: None,
            timeout: DEFAULT_IDENTITY_TIMEOUT,
        })
    }

    /// Where invitation links land once accepted.
    pub fn with_redirect_url(mut self, url: Option<String>) -> Self {
        self.redirect_url = url.filter(|u| !u.trim().is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl fmt::Debug for ClerkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClerkConfig")
            .field("api_url", &self.api_url)
            .field("secret_key", &"<redacted>")
            .field("redirect_url", &self.redirect_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Serialize)]
struct CreateUser<'a> {
    email_address: [&'a str; 1],
}

#[derive(Serialize)]
struct CreateOrganization<'a> {
    name: &'a str,
    slug: &'a str,
    created_by: &'a str,
}

#[derive(Serialize)]
struct CreateAllowlistIdentifier<'a> {
    identifier: &'a str,
    notify: bool,
}

#[derive(Serialize)]
struct CreateInvitation<'a> {
    email_address: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    redirect_url: Option<&'a str>,
    ignore_existing: bool,
}

#[derive(Deserialize)]
struct Created {
    id: String,
}

/// [`IdentityProvisioner`] backed by the Clerk backend API.
#[derive(Debug, Clone)]
pub struct ClerkProvisioner {
    client: reqwest::Client,
    config: ClerkConfig,
}

impl ClerkProvisioner {
    pub fn new(config: ClerkConfig) -> Result<Self, IdentityError> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, IdentityError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.config.api_url, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.secret_key)
            .json(body)
            .send()
            .await?;
        read_json(&url, response).await
    }

    /// `GET` that maps 404 to `None`.
    async fn get<R>(&self, path: &str, query: &[(&str, &str)]) -> Result<Option<R>, IdentityError>
    where
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.config.api_url, path);
        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.secret_key)
            .query(query)
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        read_json(&url, response).await.map(Some)
    }
}

async fn read_json<R: DeserializeOwned>(
    url: &str,
    response: reqwest::Response,
) -> Result<R, IdentityError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        tracing::warn!(%url, status = status.as_u16(), "identity provider rejected request");
        return Err(IdentityError::Rejected {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response.json::<R>().await?)
}

#[async_trait]
impl IdentityProvisioner for ClerkProvisioner {
    async fn find_user(
        &self,
        email: &EmailAddress,
    ) -> Result<Option<ExternalUserId>, IdentityError> {
        let users: Option<Vec<Created>> = self
            .get("/users", &[("email_address", email.as_str())])
            .await?;
        Ok(users
            .and_then(|users| users.into_iter().next())
            .map(|user| ExternalUserId::new(user.id)))
    }

    async fn create_user(&self, email: &EmailAddress) -> Result<ExternalUserId, IdentityError> {
        let created: Created = self
            .post(
                "/users",
                &CreateUser {
                    email_address: [email.as_str()],
                },
            )
            .await?;
        Ok(ExternalUserId::new(created.id))
    }

    async fn find_organization(
        &self,
        slug: &str,
    ) -> Result<Option<OrganizationId>, IdentityError> {
        let org: Option<Created> = self.get(&format!("/organizations/{slug}"), &[]).await?;
        Ok(org.map(|org| OrganizationId::new(org.id)))
    }

    async fn create_organization(
        &self,
        name: &str,
        slug: &str,
        created_by: &ExternalUserId,
    ) -> Result<OrganizationId, IdentityError> {
        let created: Created = self
            .post(
                "/organizations",
                &CreateOrganization {
                    name,
                    slug,
                    created_by: created_by.as_str(),
                },
            )
            .await?;
        Ok(OrganizationId::new(created.id))
    }

    async fn allowlist(&self, email: &EmailAddress) -> Result<(), IdentityError> {
        let _: serde_json::Value = self
            .post(
                "/allowlist_identifiers",
                &CreateAllowlistIdentifier {
                    identifier: email.as_str(),
                    notify: false,
                },
            )
            .await?;
        Ok(())
    }

    async fn invite(&self, email: &EmailAddress) -> Result<(), IdentityError> {
        let _: serde_json::Value = self
            .post(
                "/invitations",
                &CreateInvitation {
                    email_address: email.as_str(),
                    redirect_url: self.config.redirect_url.as_deref(),
                    ignore_existing: true,
                },
            )
            .await?;
        Ok(())
    }
}
