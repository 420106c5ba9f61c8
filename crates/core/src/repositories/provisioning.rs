//! Application decision and organization provisioning.
//!
//! Approving an application fans out into four identity provider calls and three local rows.
//! The workflow guarantees that this happens at most once per application:
//!
//! 1. Decisions on one application are serialized by a per-application async mutex.
//! 2. An application that is already `approved` with its Hospital in place is a no-op.
//! 3. After each successful primary call (user, organization, invitation) the external ids
//!    are checkpointed on the application, which stays `pending`. A retry resumes from the
//!    checkpoint instead of creating a second account or organization.
//! 4. Before creating an account or organization the provider is asked for an existing one
//!    (by email, and by the application's organization slug). A create that took effect but
//!    answered after the timeout is picked up this way on retry.
//! 5. The User, Doctor and Hospital rows and the `approved` status are committed in a single
//!    [`Database::write`]. Rows already present from an interrupted commit are kept and only
//!    the missing ones are inserted.
//!
//! Allow-listing is best-effort: a failure is logged and provisioning continues. Any other
//! failure leaves the application `pending` and is reported as
//! [`CardioError::ProvisioningFailed`].

use crate::clock::Clock;
use crate::constants::{DEFAULT_IDENTITY_TIMEOUT, SCHEMA_VERSION};
use crate::identity::{ExternalUserId, IdentityError, IdentityProvisioner, OrganizationId};
use crate::ids::{ApplicationId, DoctorId, HospitalId, UserId};
use crate::repositories::applications::{Application, ApplicationStatus, ProvisioningProgress};
use crate::repositories::directory::{Doctor, Hospital, User, BY_APPLICATION, BY_ORG};
use crate::store::Database;
use crate::{CardioError, CardioResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// An administrator's verdict on an application.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approved,
    Declined,
}

impl Decision {
    fn target(self) -> ApplicationStatus {
        match self {
            Self::Approved => ApplicationStatus::Approved,
            Self::Declined => ApplicationStatus::Declined,
        }
    }
}

impl FromStr for Decision {
    type Err = CardioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "approved" | "approve" => Ok(Self::Approved),
            "declined" | "decline" => Ok(Self::Declined),
            other => Err(CardioError::validation(
                "decision",
                format!("expected approved or declined, got {other:?}"),
            )),
        }
    }
}

/// The identity provider call that failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProvisioningStep {
    CreateUser,
    CreateOrganization,
    Allowlist,
    Invite,
}

impl fmt::Display for ProvisioningStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CreateUser => "create user",
            Self::CreateOrganization => "create organization",
            Self::Allowlist => "allowlist",
            Self::Invite => "invite",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DecisionOutcome {
    pub application_id: ApplicationId,
    pub status: ApplicationStatus,
    /// Present for approvals.
    pub hospital_id: Option<HospitalId>,
}

pub struct ProvisioningWorkflow {
    db: Arc<Database>,
    identity: Arc<dyn IdentityProvisioner>,
    clock: Arc<dyn Clock>,
    call_timeout: Duration,
    locks: Mutex<HashMap<ApplicationId, Arc<tokio::sync::Mutex<()>>>>,
}

impl fmt::Debug for ProvisioningWorkflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProvisioningWorkflow")
            .field("call_timeout", &self.call_timeout)
            .finish_non_exhaustive()
    }
}

impl ProvisioningWorkflow {
    pub fn new(
        db: Arc<Database>,
        identity: Arc<dyn IdentityProvisioner>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            identity,
            clock,
            call_timeout: DEFAULT_IDENTITY_TIMEOUT,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Upper bound for each identity provider call.
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Applies `decision` to an application.
    ///
    /// Repeating a decision that already took effect returns the same outcome without side
    /// effects. Reversing a decision fails with [`CardioError::InvalidTransition`].
    ///
    /// # Errors
    ///
    /// - [`CardioError::NotFound`] if the application does not exist
    /// - [`CardioError::InvalidTransition`] if it was already decided the other way
    /// - [`CardioError::ProvisioningFailed`] if a primary identity provider call failed; the
    ///   application stays `pending` and the call can be retried
    pub async fn decide(
        &self,
        id: ApplicationId,
        decision: Decision,
    ) -> CardioResult<DecisionOutcome> {
        let lock = self.lock_for(id);
        let result = {
            let _guard = lock.lock().await;
            self.decide_locked(id, decision).await
        };
        drop(lock);
        self.release_lock(id);
        result
    }

    async fn decide_locked(
        &self,
        id: ApplicationId,
        decision: Decision,
    ) -> CardioResult<DecisionOutcome> {
        let application = self.load(id)?;
        let target = decision.target();
        if application.status != ApplicationStatus::Pending && application.status != target {
            return Err(CardioError::InvalidTransition {
                id: id.to_string(),
                from: application.status,
                to: target,
            });
        }

        match decision {
            Decision::Declined => self.decline(application),
            Decision::Approved => self.approve(application).await,
        }
    }

    fn decline(&self, application: Application) -> CardioResult<DecisionOutcome> {
        let id = application.id;
        if application.status == ApplicationStatus::Pending {
            let now = self.clock.now();
            self.db.write(|tx| {
                let mut application = application;
                application.status = ApplicationStatus::Declined;
                application.decided_at = Some(now);
                tx.put(application);
                Ok(())
            })?;
            tracing::info!(application_id = %id, "application declined");
        }

        Ok(DecisionOutcome {
            application_id: id,
            status: ApplicationStatus::Declined,
            hospital_id: None,
        })
    }

    async fn approve(&self, application: Application) -> CardioResult<DecisionOutcome> {
        let id = application.id;

        if let Some(hospital_id) = self.existing_hospital(id)? {
            if application.status == ApplicationStatus::Approved {
                tracing::debug!(application_id = %id, "application already approved");
                return Ok(DecisionOutcome {
                    application_id: id,
                    status: ApplicationStatus::Approved,
                    hospital_id: Some(hospital_id),
                });
            }
        }

        let mut progress = application.provisioning.clone().unwrap_or_default();
        let email = &application.doctor.email;

        let user_id = match progress.external_user_id.clone() {
            Some(user_id) => user_id,
            None => {
                let step = ProvisioningStep::CreateUser;
                let user_id = match self.call(step, self.identity.find_user(email)).await? {
                    Some(existing) => {
                        tracing::info!(application_id = %id, "reusing existing identity account");
                        existing
                    }
                    None => self.call(step, self.identity.create_user(email)).await?,
                };
                progress.external_user_id = Some(user_id.clone());
                self.checkpoint(id, &progress)?;
                user_id
            }
        };

        let org_id = match progress.org_id.clone() {
            Some(org_id) => org_id,
            None => {
                let step = ProvisioningStep::CreateOrganization;
                let slug = organization_slug(id);
                let org_id = match self.call(step, self.identity.find_organization(&slug)).await? {
                    Some(existing) => {
                        tracing::info!(application_id = %id, "reusing existing organization");
                        existing
                    }
                    None => {
                        let name = application.hospital.name.as_str();
                        self.call(
                            step,
                            self.identity.create_organization(name, &slug, &user_id),
                        )
                        .await?
                    }
                };
                progress.org_id = Some(org_id.clone());
                self.checkpoint(id, &progress)?;
                org_id
            }
        };

        if !progress.invitation_sent {
            if let Err(err) = self
                .call(ProvisioningStep::Allowlist, self.identity.allowlist(email))
                .await
            {
                tracing::warn!(application_id = %id, error = %err, "allowlisting failed, continuing");
            }

            self.call(ProvisioningStep::Invite, self.identity.invite(email))
                .await?;
            progress.invitation_sent = true;
            self.checkpoint(id, &progress)?;
        }

        let hospital_id = self.commit(id, &user_id, &org_id)?;
        tracing::info!(
            application_id = %id,
            hospital_id = %hospital_id,
            org_id = %org_id,
            "application approved"
        );

        Ok(DecisionOutcome {
            application_id: id,
            status: ApplicationStatus::Approved,
            hospital_id: Some(hospital_id),
        })
    }

    /// Runs one identity provider call under the configured timeout.
    async fn call<T>(
        &self,
        step: ProvisioningStep,
        request: impl Future<Output = Result<T, IdentityError>>,
    ) -> CardioResult<T> {
        let result = match tokio::time::timeout(self.call_timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(IdentityError::Timeout(self.call_timeout)),
        };
        result.map_err(|source| CardioError::ProvisioningFailed { step, source })
    }

    fn checkpoint(&self, id: ApplicationId, progress: &ProvisioningProgress) -> CardioResult<()> {
        self.db.write(|tx| {
            let mut application = tx
                .tables()
                .applications
                .get(&id)
                .cloned()
                .ok_or_else(|| CardioError::not_found("application", id))?;
            application.provisioning = Some(progress.clone());
            tx.put(application);
            Ok(())
        })
    }

    /// Inserts whichever of User, Doctor and Hospital is missing and marks the application
    /// approved, all at once.
    fn commit(
        &self,
        id: ApplicationId,
        user_id: &ExternalUserId,
        org_id: &OrganizationId,
    ) -> CardioResult<HospitalId> {
        let now = self.clock.now();
        self.db.write(|tx| {
            let tables = tx.tables();
            let mut application = tables
                .applications
                .get(&id)
                .cloned()
                .ok_or_else(|| CardioError::not_found("application", id))?;
            let doctor = application.doctor.clone();

            let has_user = tables
                .users
                .lookup(BY_ORG, org_id.as_str())
                .any(|u| &u.external_user_id == user_id);
            let has_doctor = tables
                .doctors
                .lookup(BY_ORG, org_id.as_str())
                .any(|d| &d.external_user_id == user_id);
            let existing_hospital = tables
                .hospitals
                .first_by(BY_APPLICATION, &id.to_string())
                .map(|h| h.id);

            if !has_user {
                tx.put(User {
                    schema_version: SCHEMA_VERSION,
                    id: UserId::new(),
                    org_id: org_id.clone(),
                    external_user_id: user_id.clone(),
                    created_at: now,
                });
            }
            if !has_doctor {
                tx.put(Doctor {
                    schema_version: SCHEMA_VERSION,
                    id: DoctorId::new(),
                    name: doctor.name.clone(),
                    email: doctor.email.clone(),
                    phone: doctor.phone.clone(),
                    specialization: doctor.specialization.clone(),
                    license_number: doctor.license_number.clone(),
                    org_id: org_id.clone(),
                    external_user_id: user_id.clone(),
                    created_at: now,
                });
            }
            let hospital_id = match existing_hospital {
                Some(hospital_id) => hospital_id,
                None => {
                    let hospital = Hospital {
                        schema_version: SCHEMA_VERSION,
                        id: HospitalId::new(),
                        details: application.hospital.clone(),
                        doctor,
                        application_id: id,
                        org_id: org_id.clone(),
                        created_at: now,
                    };
                    let hospital_id = hospital.id;
                    tx.put(hospital);
                    hospital_id
                }
            };

            application.status = ApplicationStatus::Approved;
            application.decided_at = Some(now);
            tx.put(application);
            Ok(hospital_id)
        })
    }

    fn load(&self, id: ApplicationId) -> CardioResult<Application> {
        self.db
            .read(|t| t.applications.get(&id).cloned())?
            .ok_or_else(|| CardioError::not_found("application", id))
    }

    fn existing_hospital(&self, id: ApplicationId) -> CardioResult<Option<HospitalId>> {
        self.db.read(|t| {
            t.hospitals
                .first_by(BY_APPLICATION, &id.to_string())
                .map(|h| h.id)
        })
    }

    fn lock_for(&self, id: ApplicationId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(id).or_default().clone()
    }

    /// Forgets the lock for `id` once no decision holds or awaits it.
    fn release_lock(&self, id: ApplicationId) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        if locks.get(&id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&id);
        }
    }

    #[cfg(test)]
    fn held_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Slug of the organization provisioned for an application; unique per application.
fn organization_slug(id: ApplicationId) -> String {
    format!("hospital-{id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::identity::{InMemoryProvisioner, ProvisionerCall, UnconfiguredProvisioner};
    use crate::repositories::applications::tests::sample_form;
    use crate::repositories::applications::ApplicationService;

    struct Harness {
        db: Arc<Database>,
        idp: Arc<InMemoryProvisioner>,
        applications: ApplicationService,
        workflow: Arc<ProvisioningWorkflow>,
    }

    fn harness() -> Harness {
        let db = Arc::new(Database::in_memory());
        let idp = Arc::new(InMemoryProvisioner::new());
        let clock = Arc::new(SystemClock);
        Harness {
            applications: ApplicationService::new(db.clone(), clock.clone()),
            workflow: Arc::new(ProvisioningWorkflow::new(db.clone(), idp.clone(), clock)),
            db,
            idp,
        }
    }

    fn row_counts(db: &Database) -> (usize, usize, usize) {
        db.read(|t| (t.hospitals.len(), t.doctors.len(), t.users.len()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_approval_end_to_end() {
        let h = harness();
        let id = h.applications.submit(&sample_form()).unwrap();
        assert_eq!(
            h.applications.get(id).unwrap().status,
            ApplicationStatus::Pending
        );

        let outcome = h.workflow.decide(id, Decision::Approved).await.unwrap();
        let hospital_id = outcome.hospital_id.expect("approval returns a hospital");
        assert_eq!(outcome.status, ApplicationStatus::Approved);

        let orgs = h.idp.organizations();
        assert_eq!(orgs.len(), 1);
        let org_id = orgs[0].id.clone();
        let owner = orgs[0].created_by.clone();
        assert_eq!(orgs[0].name, "St Mary Cardiac Centre");
        assert_eq!(orgs[0].slug, organization_slug(id));

        let (hospital, doctor, user) = h
            .db
            .read(|t| {
                (
                    t.hospitals.get(&hospital_id).cloned(),
                    t.doctors.first_by(BY_ORG, org_id.as_str()).cloned(),
                    t.users.first_by(BY_ORG, org_id.as_str()).cloned(),
                )
            })
            .unwrap();
        let hospital = hospital.expect("hospital row");
        let doctor = doctor.expect("doctor row");
        let user = user.expect("user row");

        assert_eq!(hospital.org_id, org_id);
        assert_eq!(hospital.application_id, id);
        assert_eq!(doctor.email.as_str(), "a@x.com");
        assert_eq!(doctor.external_user_id, owner);
        assert_eq!(user.external_user_id, owner);
        assert_eq!(h.idp.invitations().len(), 1);
        assert_eq!(h.idp.allowlisted().len(), 1);
        assert_eq!(
            h.applications.get(id).unwrap().status,
            ApplicationStatus::Approved
        );
    }

    #[tokio::test]
    async fn test_repeated_approval_is_a_no_op() {
        let h = harness();
        let id = h.applications.submit(&sample_form()).unwrap();

        let first = h.workflow.decide(id, Decision::Approved).await.unwrap();
        let second = h.workflow.decide(id, Decision::Approved).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(h.idp.organizations().len(), 1);
        assert_eq!(h.idp.calls(ProvisionerCall::CreateUser), 1);
        assert_eq!(h.idp.calls(ProvisionerCall::Invite), 1);
        assert_eq!(row_counts(&h.db), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_concurrent_approvals_provision_once() {
        let h = harness();
        let id = h.applications.submit(&sample_form()).unwrap();
        h.idp
            .delay(ProvisionerCall::CreateOrganization, Duration::from_millis(20));

        let (a, b) = tokio::join!(
            h.workflow.decide(id, Decision::Approved),
            h.workflow.decide(id, Decision::Approved)
        );

        assert_eq!(a.unwrap().hospital_id, b.unwrap().hospital_id);
        assert_eq!(h.idp.organizations().len(), 1);
        assert_eq!(row_counts(&h.db), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_decline_is_side_effect_free() {
        let h = harness();
        let id = h.applications.submit(&sample_form()).unwrap();

        for _ in 0..3 {
            let outcome = h.workflow.decide(id, Decision::Declined).await.unwrap();
            assert_eq!(outcome.status, ApplicationStatus::Declined);
            assert_eq!(outcome.hospital_id, None);
        }

        assert_eq!(row_counts(&h.db), (0, 0, 0));
        assert_eq!(h.idp.calls(ProvisionerCall::CreateUser), 0);
        assert_eq!(
            h.applications.get(id).unwrap().status,
            ApplicationStatus::Declined
        );
    }

    #[tokio::test]
    async fn test_reversing_a_decision_is_rejected() {
        let h = harness();
        let declined = h.applications.submit(&sample_form()).unwrap();
        h.workflow.decide(declined, Decision::Declined).await.unwrap();

        let err = h
            .workflow
            .decide(declined, Decision::Approved)
            .await
            .expect_err("declined is terminal");
        assert!(matches!(err, CardioError::InvalidTransition { .. }));
        assert_eq!(h.idp.calls(ProvisionerCall::CreateUser), 0);

        let approved = h.applications.submit(&sample_form()).unwrap();
        h.workflow.decide(approved, Decision::Approved).await.unwrap();
        let err = h
            .workflow
            .decide(approved, Decision::Declined)
            .await
            .expect_err("approved is terminal");
        assert!(matches!(err, CardioError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn test_unknown_application_is_not_found() {
        let h = harness();
        let err = h
            .workflow
            .decide(ApplicationId::new(), Decision::Approved)
            .await
            .expect_err("should be missing");
        assert!(matches!(err, CardioError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_user_creation_failure_leaves_application_pending() {
        let h = harness();
        let id = h.applications.submit(&sample_form()).unwrap();
        h.idp.fail_on(ProvisionerCall::CreateUser);

        let err = h
            .workflow
            .decide(id, Decision::Approved)
            .await
            .expect_err("primary failure");
        assert!(matches!(
            err,
            CardioError::ProvisioningFailed {
                step: ProvisioningStep::CreateUser,
                ..
            }
        ));
        assert_eq!(
            h.applications.get(id).unwrap().status,
            ApplicationStatus::Pending
        );
        assert_eq!(row_counts(&h.db), (0, 0, 0));
    }

    #[tokio::test]
    async fn test_retry_after_org_failure_reuses_user() {
        let h = harness();
        let id = h.applications.submit(&sample_form()).unwrap();
        h.idp.fail_on(ProvisionerCall::CreateOrganization);

        assert!(h.workflow.decide(id, Decision::Approved).await.is_err());
        let progress = h.applications.get(id).unwrap().provisioning.expect("checkpoint");
        assert!(progress.external_user_id.is_some());
        assert!(progress.org_id.is_none());

        h.idp.recover(ProvisionerCall::CreateOrganization);
        h.workflow.decide(id, Decision::Approved).await.unwrap();

        assert_eq!(h.idp.users().len(), 1);
        assert_eq!(h.idp.organizations().len(), 1);
        assert_eq!(row_counts(&h.db), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_retry_after_invite_failure_does_not_duplicate_org() {
        let h = harness();
        let id = h.applications.submit(&sample_form()).unwrap();
        h.idp.fail_on(ProvisionerCall::Invite);

        let err = h
            .workflow
            .decide(id, Decision::Approved)
            .await
            .expect_err("invitation is primary");
        assert!(matches!(
            err,
            CardioError::ProvisioningFailed {
                step: ProvisioningStep::Invite,
                ..
            }
        ));
        assert_eq!(
            h.applications.get(id).unwrap().status,
            ApplicationStatus::Pending
        );

        h.idp.recover(ProvisionerCall::Invite);
        h.workflow.decide(id, Decision::Approved).await.unwrap();

        assert_eq!(h.idp.calls(ProvisionerCall::CreateOrganization), 1);
        assert_eq!(h.idp.organizations().len(), 1);
        assert_eq!(h.idp.invitations().len(), 1);
    }

    #[tokio::test]
    async fn test_allowlist_failure_is_tolerated() {
        let h = harness();
        let id = h.applications.submit(&sample_form()).unwrap();
        h.idp.fail_on(ProvisionerCall::Allowlist);

        let outcome = h.workflow.decide(id, Decision::Approved).await.unwrap();

        assert_eq!(outcome.status, ApplicationStatus::Approved);
        assert!(h.idp.allowlisted().is_empty());
        assert_eq!(row_counts(&h.db), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_slow_provider_times_out() {
        let db = Arc::new(Database::in_memory());
        let idp = Arc::new(InMemoryProvisioner::new());
        idp.delay(ProvisionerCall::CreateUser, Duration::from_millis(200));
        let applications = ApplicationService::new(db.clone(), Arc::new(SystemClock));
        let workflow = ProvisioningWorkflow::new(db.clone(), idp.clone(), Arc::new(SystemClock))
            .with_call_timeout(Duration::from_millis(10));

        let id = applications.submit(&sample_form()).unwrap();
        let err = workflow
            .decide(id, Decision::Approved)
            .await
            .expect_err("should time out");

        assert!(matches!(
            err,
            CardioError::ProvisioningFailed {
                source: IdentityError::Timeout(_),
                ..
            }
        ));
        assert_eq!(applications.get(id).unwrap().status, ApplicationStatus::Pending);
    }

    #[tokio::test]
    async fn test_status_set_to_approved_without_rows_is_rolled_forward() {
        let h = harness();
        let id = h.applications.submit(&sample_form()).unwrap();
        h.applications
            .set_status(id, ApplicationStatus::Approved)
            .unwrap();

        let outcome = h.workflow.decide(id, Decision::Approved).await.unwrap();

        assert!(outcome.hospital_id.is_some());
        assert_eq!(row_counts(&h.db), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_late_organization_answer_is_reused_on_retry() {
        let db = Arc::new(Database::in_memory());
        let idp = Arc::new(InMemoryProvisioner::new());
        idp.answer_late(ProvisionerCall::CreateOrganization, Duration::from_millis(200));
        let applications = ApplicationService::new(db.clone(), Arc::new(SystemClock));
        let workflow = ProvisioningWorkflow::new(db.clone(), idp.clone(), Arc::new(SystemClock))
            .with_call_timeout(Duration::from_millis(20));
        let id = applications.submit(&sample_form()).unwrap();

        let err = workflow
            .decide(id, Decision::Approved)
            .await
            .expect_err("answer arrives after the deadline");
        assert!(matches!(
            err,
            CardioError::ProvisioningFailed {
                step: ProvisioningStep::CreateOrganization,
                source: IdentityError::Timeout(_),
            }
        ));

        let outcome = workflow.decide(id, Decision::Approved).await.unwrap();
        let orgs = idp.organizations();
        assert_eq!(orgs.len(), 1);
        assert_eq!(idp.calls(ProvisionerCall::CreateOrganization), 1);
        let hospital = db
            .read(|t| t.hospitals.get(&outcome.hospital_id.unwrap()).cloned())
            .unwrap()
            .expect("hospital row");
        assert_eq!(hospital.org_id, orgs[0].id);
    }

    #[tokio::test]
    async fn test_late_user_answer_is_reused_on_retry() {
        let db = Arc::new(Database::in_memory());
        let idp = Arc::new(InMemoryProvisioner::new());
        idp.answer_late(ProvisionerCall::CreateUser, Duration::from_millis(200));
        let applications = ApplicationService::new(db.clone(), Arc::new(SystemClock));
        let workflow = ProvisioningWorkflow::new(db.clone(), idp.clone(), Arc::new(SystemClock))
            .with_call_timeout(Duration::from_millis(20));
        let id = applications.submit(&sample_form()).unwrap();

        assert!(workflow.decide(id, Decision::Approved).await.is_err());
        workflow.decide(id, Decision::Approved).await.unwrap();

        let users = idp.users();
        assert_eq!(users.len(), 1);
        assert_eq!(idp.calls(ProvisionerCall::CreateUser), 1);
        assert_eq!(idp.organizations()[0].created_by, users[0].0);
        assert_eq!(row_counts(&db), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_partially_written_commit_is_completed_without_duplicates() {
        let h = harness();
        let id = h.applications.submit(&sample_form()).unwrap();
        let application = h.applications.get(id).unwrap();
        let email = &application.doctor.email;

        let user_id = h.idp.create_user(email).await.unwrap();
        let org_id = h
            .idp
            .create_organization("St Mary Cardiac Centre", &organization_slug(id), &user_id)
            .await
            .unwrap();
        let progress = ProvisioningProgress {
            external_user_id: Some(user_id.clone()),
            org_id: Some(org_id.clone()),
            invitation_sent: true,
        };
        h.workflow.checkpoint(id, &progress).unwrap();

        let now = chrono::Utc::now();
        let doctor = application.doctor.clone();
        h.db.write(|tx| {
            tx.put(User {
                schema_version: SCHEMA_VERSION,
                id: UserId::new(),
                org_id: org_id.clone(),
                external_user_id: user_id.clone(),
                created_at: now,
            });
            tx.put(Doctor {
                schema_version: SCHEMA_VERSION,
                id: DoctorId::new(),
                name: doctor.name,
                email: doctor.email,
                phone: doctor.phone,
                specialization: doctor.specialization,
                license_number: doctor.license_number,
                org_id: org_id.clone(),
                external_user_id: user_id.clone(),
                created_at: now,
            });
            Ok(())
        })
        .unwrap();
        assert_eq!(row_counts(&h.db), (0, 1, 1));

        let outcome = h.workflow.decide(id, Decision::Approved).await.unwrap();

        assert_eq!(outcome.status, ApplicationStatus::Approved);
        assert_eq!(row_counts(&h.db), (1, 1, 1));
        assert_eq!(h.idp.calls(ProvisionerCall::CreateUser), 1);
        assert_eq!(h.idp.calls(ProvisionerCall::CreateOrganization), 1);
    }

    #[tokio::test]
    async fn test_decision_locks_are_released() {
        let h = harness();
        let approved = h.applications.submit(&sample_form()).unwrap();
        let declined = h.applications.submit(&sample_form()).unwrap();

        h.workflow.decide(approved, Decision::Approved).await.unwrap();
        h.workflow.decide(declined, Decision::Declined).await.unwrap();
        let _ = h.workflow.decide(declined, Decision::Approved).await;
        assert_eq!(h.workflow.held_locks(), 0);

        let (a, b) = tokio::join!(
            h.workflow.decide(approved, Decision::Approved),
            h.workflow.decide(approved, Decision::Approved)
        );
        assert!(a.is_ok() && b.is_ok());
        assert_eq!(h.workflow.held_locks(), 0);
    }

    #[tokio::test]
    async fn test_unconfigured_provider_refuses_approval() {
        let db = Arc::new(Database::in_memory());
        let applications = ApplicationService::new(db.clone(), Arc::new(SystemClock));
        let workflow = ProvisioningWorkflow::new(
            db.clone(),
            Arc::new(UnconfiguredProvisioner),
            Arc::new(SystemClock),
        );
        let approved = applications.submit(&sample_form()).unwrap();

        let err = workflow
            .decide(approved, Decision::Approved)
            .await
            .expect_err("no provider");
        assert!(matches!(
            err,
            CardioError::ProvisioningFailed {
                step: ProvisioningStep::CreateUser,
                source: IdentityError::Unavailable(_),
            }
        ));
        let application = applications.get(approved).unwrap();
        assert_eq!(application.status, ApplicationStatus::Pending);
        assert_eq!(application.provisioning, None);
        assert_eq!(row_counts(&db), (0, 0, 0));

        let declined = applications.submit(&sample_form()).unwrap();
        let outcome = workflow.decide(declined, Decision::Declined).await.unwrap();
        assert_eq!(outcome.status, ApplicationStatus::Declined);
    }

    #[test]
    fn test_decision_parses() {
        assert_eq!("approved".parse::<Decision>().unwrap(), Decision::Approved);
        assert_eq!("Decline".parse::<Decision>().unwrap(), Decision::Declined);
        assert!("pending".parse::<Decision>().is_err());
    }
}
