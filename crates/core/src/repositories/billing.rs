//! Subscription billing.
//!
//! Payments and payment attempts are append-only logs keyed by organization. Subscription
//! status is never stored: an organization is `Active` while "now" is strictly before its
//! latest payment's creation time plus [`SUBSCRIPTION_WINDOW_DAYS`].
//!
//! Charging is simulated. An organization's first ever attempt is declined; later attempts
//! succeed with probability [`PAYMENT_SUCCESS_RATE`]. Every attempt is logged, and a Payment
//! row is only written for a successful one.
//!
//! Storing clinical records needs an active subscription whose plan still has room, see
//! [`ensure_record_allowance`].

use crate::clock::Clock;
use crate::constants::{
    PAYMENTS_TABLE, PAYMENT_ATTEMPTS_TABLE, PAYMENT_SUCCESS_RATE, SCHEMA_VERSION,
    SUBSCRIPTION_WINDOW_DAYS,
};
use crate::identity::OrganizationId;
use crate::ids::{PaymentAttemptId, PaymentId};
use crate::repositories::directory::BY_ORG;
use crate::store::{Database, Row, Tables};
use crate::validation;
use crate::{CardioError, CardioResult};
use cardio_uuid::ShardableUuid;
use chrono::{DateTime, Datelike, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanType {
    Basic,
    Standard,
    Premium,
}

impl PlanType {
    /// Monthly price in US cents.
    pub fn amount_cents(self) -> u32 {
        match self {
            Self::Basic => 399,
            Self::Standard => 599,
            Self::Premium => 999,
        }
    }

    pub fn features(self) -> PlanFeatures {
        match self {
            Self::Basic => PlanFeatures {
                prediction: true,
                record_limit: Some(0),
                analytics: Analytics::None,
            },
            Self::Standard => PlanFeatures {
                prediction: true,
                record_limit: Some(5_000),
                analytics: Analytics::Limited,
            },
            Self::Premium => PlanFeatures {
                prediction: true,
                record_limit: None,
                analytics: Analytics::Full,
            },
        }
    }
}

impl fmt::Display for PlanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Basic => "basic",
            Self::Standard => "standard",
            Self::Premium => "premium",
        })
    }
}

impl FromStr for PlanType {
    type Err = CardioError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "standard" => Ok(Self::Standard),
            "premium" => Ok(Self::Premium),
            other => Err(CardioError::validation(
                "plan_type",
                format!("unknown plan {other:?}"),
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Analytics {
    None,
    Limited,
    Full,
}

/// What a plan unlocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFeatures {
    pub prediction: bool,
    /// Stored records allowed; `None` is unlimited, `Some(0)` means prediction only.
    pub record_limit: Option<u32>,
    pub analytics: Analytics,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    #[default]
    Card,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Success,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CardBrand {
    Visa,
    Mastercard,
    Amex,
}

/// Card details as entered; never persisted or logged.
#[derive(Clone, Default, Deserialize)]
pub struct CardDetails {
    pub card_number: String,
    pub card_holder_name: String,
    pub expiration_month: String,
    pub expiration_year: String,
    pub cvc: String,
}

impl fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardDetails")
            .field("card_number", &"<redacted>")
            .field("card_holder_name", &self.card_holder_name)
            .finish_non_exhaustive()
    }
}

impl CardDetails {
    /// Validates the card and returns its last four digits.
    fn validate(&self, now: DateTime<Utc>) -> CardioResult<String> {
        validation::required("card_holder_name", &self.card_holder_name)?;

        let digits: String = self
            .card_number
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();
        if !digits.chars().all(|c| c.is_ascii_digit()) || !(13..=19).contains(&digits.len()) {
            return Err(CardioError::validation(
                "card_number",
                "must be 13 to 19 digits",
            ));
        }
        let brand = card_brand(&digits)
            .ok_or_else(|| CardioError::validation("card_number", "unsupported card type"))?;

        let month: u32 = self
            .expiration_month
            .trim()
            .parse()
            .ok()
            .filter(|m| (1..=12).contains(m))
            .ok_or_else(|| CardioError::validation("expiration_month", "must be 1 to 12"))?;
        let year: i32 = self
            .expiration_year
            .trim()
            .parse()
            .map_err(|_| CardioError::validation("expiration_year", "must be a year"))?;
        if year < now.year() || (year == now.year() && month < now.month()) {
            return Err(CardioError::validation("expiration_year", "card has expired"));
        }

        let cvc_len = if brand == CardBrand::Amex { 4 } else { 3 };
        let cvc = self.cvc.trim();
        if cvc.len() != cvc_len || !cvc.chars().all(|c| c.is_ascii_digit()) {
            return Err(CardioError::validation(
                "cvc",
                format!("must be {cvc_len} digits"),
            ));
        }

        Ok(digits[digits.len() - 4..].to_string())
    }
}

fn card_brand(digits: &str) -> Option<CardBrand> {
    let bytes = digits.as_bytes();
    match (bytes.first(), bytes.get(1), digits.len()) {
        (Some(b'4'), _, 13 | 16 | 19) => Some(CardBrand::Visa),
        (Some(b'5'), Some(b'1'..=b'5'), 16) => Some(CardBrand::Mastercard),
        (Some(b'3'), Some(b'4' | b'7'), 15) => Some(CardBrand::Amex),
        _ => None,
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub schema_version: u32,
    pub id: PaymentId,
    pub org_id: OrganizationId,
    pub plan_type: PlanType,
    pub amount_cents: u32,
    pub currency: String,
    pub status: PaymentStatus,
    pub method: PaymentMethod,
    pub card_last4: String,
    pub created_at: DateTime<Utc>,
}

impl Payment {
    pub fn valid_until(&self) -> DateTime<Utc> {
        self.created_at + Duration::days(SUBSCRIPTION_WINDOW_DAYS)
    }
}

impl Row for Payment {
    const TABLE: &'static str = PAYMENTS_TABLE;
    type Key = PaymentId;

    fn key(&self) -> PaymentId {
        self.id
    }

    fn shard(&self) -> ShardableUuid {
        self.id.shard()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn index_entries(&self) -> Vec<(&'static str, String)> {
        vec![(BY_ORG, self.org_id.to_string())]
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAttempt {
    pub schema_version: u32,
    pub id: PaymentAttemptId,
    pub org_id: OrganizationId,
    pub plan_type: PlanType,
    pub was_successful: bool,
    pub created_at: DateTime<Utc>,
}

impl Row for PaymentAttempt {
    const TABLE: &'static str = PAYMENT_ATTEMPTS_TABLE;
    type Key = PaymentAttemptId;

    fn key(&self) -> PaymentAttemptId {
        self.id
    }

    fn shard(&self) -> ShardableUuid {
        self.id.shard()
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn index_entries(&self) -> Vec<(&'static str, String)> {
        vec![(BY_ORG, self.org_id.to_string())]
    }
}

/// Decides whether a charge goes through.
pub trait PaymentProcessor: Send + Sync + fmt::Debug {
    /// `prior_attempts` counts this organization's earlier attempts, failed or not.
    fn authorize(&self, prior_attempts: usize, amount_cents: u32) -> bool;
}

/// Declines every first attempt, then approves at a fixed rate.
#[derive(Debug)]
pub struct SimulatedProcessor {
    rng: Mutex<StdRng>,
    success_rate: f64,
}

impl SimulatedProcessor {
    pub fn new(rng: StdRng) -> Self {
        Self {
            rng: Mutex::new(rng),
            success_rate: PAYMENT_SUCCESS_RATE,
        }
    }

    pub fn from_entropy() -> Self {
        Self::new(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl PaymentProcessor for SimulatedProcessor {
    fn authorize(&self, prior_attempts: usize, _amount_cents: u32) -> bool {
        if prior_attempts == 0 {
            return false;
        }
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.gen_bool(self.success_rate)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionState {
    Active,
    Expired,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubscriptionStatus {
    pub status: SubscriptionState,
    pub plan_type: PlanType,
    pub valid_until: DateTime<Utc>,
    pub features: PlanFeatures,
}

/// Checks that `org_id` may store one more clinical record at `now`.
///
/// # Errors
///
/// - [`CardioError::SubscriptionRequired`] if the organization never paid or its latest
///   payment's window has closed
/// - [`CardioError::PlanLimitReached`] if the plan's record limit is used up
pub(crate) fn ensure_record_allowance(
    tables: &Tables,
    org_id: &OrganizationId,
    now: DateTime<Utc>,
) -> CardioResult<()> {
    let latest = tables
        .payments
        .latest_by(BY_ORG, org_id.as_str())
        .filter(|p| now < p.valid_until())
        .ok_or(CardioError::SubscriptionRequired)?;

    if let Some(limit) = latest.plan_type.features().record_limit {
        let stored = tables.records.count_by(BY_ORG, org_id.as_str());
        if stored >= limit as usize {
            return Err(CardioError::PlanLimitReached {
                plan: latest.plan_type,
                limit,
            });
        }
    }
    Ok(())
}

#[derive(Clone, Debug)]
pub struct BillingLedger {
    db: Arc<Database>,
    processor: Arc<dyn PaymentProcessor>,
    clock: Arc<dyn Clock>,
}

impl BillingLedger {
    pub fn new(
        db: Arc<Database>,
        processor: Arc<dyn PaymentProcessor>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            db,
            processor,
            clock,
        }
    }

    /// Charges `org_id` for `plan_type`.
    ///
    /// # Errors
    ///
    /// - [`CardioError::Validation`] if the card details are invalid (no attempt is logged)
    /// - [`CardioError::NotFoundOrg`] if no hospital belongs to `org_id`
    /// - [`CardioError::AlreadySubscribed`] if the latest payment is for the same plan and
    ///   still inside its window
    /// - [`CardioError::PaymentFailed`] if the charge was declined; the attempt is logged
    pub fn add_payment(
        &self,
        org_id: &OrganizationId,
        plan_type: PlanType,
        card: &CardDetails,
        method: PaymentMethod,
    ) -> CardioResult<Payment> {
        let now = self.clock.now();
        let card_last4 = card.validate(now)?;
        let amount_cents = plan_type.amount_cents();

        let payment = self.db.write(|tx| {
            let tables = tx.tables();
            if tables.hospitals.first_by(BY_ORG, org_id.as_str()).is_none() {
                return Err(CardioError::NotFoundOrg);
            }

            if let Some(latest) = tables.payments.latest_by(BY_ORG, org_id.as_str()) {
                if latest.plan_type == plan_type && now < latest.valid_until() {
                    return Err(CardioError::AlreadySubscribed {
                        plan: plan_type,
                        valid_until: latest.valid_until(),
                    });
                }
            }

            let prior_attempts = tables.payment_attempts.count_by(BY_ORG, org_id.as_str());
            let was_successful = self.processor.authorize(prior_attempts, amount_cents);

            let attempt_id = PaymentAttemptId::from_timestamp_id(self.db.next_log_id(now));
            tx.put(PaymentAttempt {
                schema_version: SCHEMA_VERSION,
                id: attempt_id,
                org_id: org_id.clone(),
                plan_type,
                was_successful,
                created_at: now,
            });

            if !was_successful {
                return Ok(None);
            }

            let payment_id = PaymentId::from_timestamp_id(self.db.next_log_id(now));
            let payment = Payment {
                schema_version: SCHEMA_VERSION,
                id: payment_id,
                org_id: org_id.clone(),
                plan_type,
                amount_cents,
                currency: "USD".into(),
                status: PaymentStatus::Success,
                method,
                card_last4: card_last4.clone(),
                created_at: now,
            };
            tx.put(payment.clone());
            Ok(Some(payment))
        })?;

        match payment {
            Some(payment) => {
                tracing::info!(
                    org_id = %org_id,
                    plan = %plan_type,
                    payment_id = %payment.id,
                    "payment recorded"
                );
                Ok(payment)
            }
            None => {
                tracing::warn!(org_id = %org_id, plan = %plan_type, "payment declined");
                Err(CardioError::PaymentFailed)
            }
        }
    }

    /// Derives the organization's subscription from its latest payment.
    ///
    /// # Errors
    ///
    /// [`CardioError::NotFoundOrg`] if `org_id` is absent or has never paid.
    pub fn check_subscription_status(
        &self,
        org_id: Option<&OrganizationId>,
    ) -> CardioResult<SubscriptionStatus> {
        let org_id = org_id.ok_or(CardioError::NotFoundOrg)?;
        let latest = self
            .db
            .read(|t| t.payments.latest_by(BY_ORG, org_id.as_str()).cloned())?
            .ok_or(CardioError::NotFoundOrg)?;

        let valid_until = latest.valid_until();
        let status = if self.clock.now() < valid_until {
            SubscriptionState::Active
        } else {
            SubscriptionState::Expired
        };

        Ok(SubscriptionStatus {
            status,
            plan_type: latest.plan_type,
            valid_until,
            features: latest.plan_type.features(),
        })
    }

    /// All payments of an organization, newest first.
    pub fn payments(&self, org_id: &OrganizationId) -> CardioResult<Vec<Payment>> {
        self.db.read(|t| {
            t.payments
                .lookup(BY_ORG, org_id.as_str())
                .rev()
                .cloned()
                .collect()
        })
    }
}
