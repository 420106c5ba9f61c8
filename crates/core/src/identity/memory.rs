use super::{ExternalUserId, IdentityError, IdentityProvisioner, OrganizationId};
use async_trait::async_trait;
use cardio_types::EmailAddress;
use cardio_uuid::ShardableUuid;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// One kind of identity provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProvisionerCall {
    FindUser,
    CreateUser,
    FindOrganization,
    CreateOrganization,
    Allowlist,
    Invite,
}

/// An organization as the provider stores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Organization {
    pub id: OrganizationId,
    pub name: String,
    pub slug: String,
    pub created_by: ExternalUserId,
}

#[derive(Debug, Default)]
struct State {
    users: Vec<(ExternalUserId, EmailAddress)>,
    organizations: Vec<Organization>,
    allowlist: Vec<EmailAddress>,
    invitations: Vec<EmailAddress>,
    failing: HashSet<ProvisionerCall>,
    calls: HashMap<ProvisionerCall, usize>,
}

/// Identity provider kept in process memory.
///
/// Every call is counted, and any kind of call can be made to fail, to stall before it takes
/// effect, or to answer late after it took effect. That is how the approval workflow's retry
/// and timeout paths are exercised.
#[derive(Debug, Default)]
pub struct InMemoryProvisioner {
    state: Mutex<State>,
    latency: Mutex<HashMap<ProvisionerCall, Duration>>,
    late_replies: Mutex<HashMap<ProvisionerCall, Duration>>,
}

impl InMemoryProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent `call` fail until [`recover`](Self::recover) is called.
    pub fn fail_on(&self, call: ProvisionerCall) {
        self.lock().failing.insert(call);
    }

    pub fn recover(&self, call: ProvisionerCall) {
        self.lock().failing.remove(&call);
    }

    /// Delays every subsequent `call` by `delay`.
    pub fn delay(&self, call: ProvisionerCall, delay: Duration) {
        self.latency
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(call, delay);
    }

    /// Lets the next `call` take effect, then holds its answer back for `delay`.
    pub fn answer_late(&self, call: ProvisionerCall, delay: Duration) {
        self.late_replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(call, delay);
    }

    /// Number of times `call` was attempted, including failed attempts.
    pub fn calls(&self, call: ProvisionerCall) -> usize {
        self.lock().calls.get(&call).copied().unwrap_or(0)
    }

    pub fn users(&self) -> Vec<(ExternalUserId, EmailAddress)> {
        self.lock().users.clone()
    }

    pub fn organizations(&self) -> Vec<Organization> {
        self.lock().organizations.clone()
    }

    pub fn allowlisted(&self) -> Vec<EmailAddress> {
        self.lock().allowlist.clone()
    }

    pub fn invitations(&self) -> Vec<EmailAddress> {
        self.lock().invitations.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Applies latency, counts the call and checks failure injection.
    async fn enter(&self, call: ProvisionerCall) -> Result<MutexGuard<'_, State>, IdentityError> {
        let delay = self
            .latency
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&call)
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.lock();
        *state.calls.entry(call).or_default() += 1;
        if state.failing.contains(&call) {
            return Err(IdentityError::Unavailable(format!("{call:?} is failing")));
        }
        Ok(state)
    }

    /// Holds back the answer of a call that already took effect, once.
    async fn reply(&self, call: ProvisionerCall) {
        let delay = self
            .late_replies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&call);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl IdentityProvisioner for InMemoryProvisioner {
    async fn find_user(
        &self,
        email: &EmailAddress,
    ) -> Result<Option<ExternalUserId>, IdentityError> {
        let state = self.enter(ProvisionerCall::FindUser).await?;
        Ok(state
            .users
            .iter()
            .find(|(_, e)| e == email)
            .map(|(id, _)| id.clone()))
    }

    async fn create_user(&self, email: &EmailAddress) -> Result<ExternalUserId, IdentityError> {
        let id = ExternalUserId::new(format!("user_{}", ShardableUuid::new()));
        {
            let mut state = self.enter(ProvisionerCall::CreateUser).await?;
            if state.users.iter().any(|(_, e)| e == email) {
                return Err(IdentityError::Rejected {
                    status: 422,
                    body: "email address is taken".into(),
                });
            }
            state.users.push((id.clone(), email.clone()));
        }
        self.reply(ProvisionerCall::CreateUser).await;
        Ok(id)
    }

    async fn find_organization(
        &self,
        slug: &str,
    ) -> Result<Option<OrganizationId>, IdentityError> {
        let state = self.enter(ProvisionerCall::FindOrganization).await?;
        Ok(state
            .organizations
            .iter()
            .find(|org| org.slug == slug)
            .map(|org| org.id.clone()))
    }

    async fn create_organization(
        &self,
        name: &str,
        slug: &str,
        created_by: &ExternalUserId,
    ) -> Result<OrganizationId, IdentityError> {
        let id = OrganizationId::new(format!("org_{}", ShardableUuid::new()));
        {
            let mut state = self.enter(ProvisionerCall::CreateOrganization).await?;
            if state.organizations.iter().any(|org| org.slug == slug) {
                return Err(IdentityError::Rejected {
                    status: 422,
                    body: "slug is taken".into(),
                });
            }
            state.organizations.push(Organization {
                id: id.clone(),
                name: name.to_string(),
                slug: slug.to_string(),
                created_by: created_by.clone(),
            });
        }
        self.reply(ProvisionerCall::CreateOrganization).await;
        Ok(id)
    }

    async fn allowlist(&self, email: &EmailAddress) -> Result<(), IdentityError> {
        let mut state = self.enter(ProvisionerCall::Allowlist).await?;
        if !state.allowlist.contains(email) {
            state.allowlist.push(email.clone());
        }
        Ok(())
    }

    async fn invite(&self, email: &EmailAddress) -> Result<(), IdentityError> {
        let mut state = self.enter(ProvisionerCall::Invite).await?;
        state.invitations.push(email.clone());
        Ok(())
    }
}
