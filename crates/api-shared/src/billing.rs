use crate::records::enum_name;
use cardio_core::{
    CardDetails, CardioError, OrganizationId, Payment, PaymentMethod, PlanType, SubscriptionStatus,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Payment form. Card details are validated and discarded; only the last four digits are kept.
#[derive(Clone, Deserialize, ToSchema)]
pub struct AddPaymentReq {
    pub org_id: String,
    /// `basic`, `standard` or `premium`.
    pub plan_type: String,
    /// Only `card` is accepted; defaults to `card`.
    #[serde(default)]
    pub payment_method: Option<String>,
    pub card_number: String,
    pub card_holder_name: String,
    pub expiration_month: String,
    pub expiration_year: String,
    pub cvc: String,
}

impl std::fmt::Debug for AddPaymentReq {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddPaymentReq")
            .field("org_id", &self.org_id)
            .field("plan_type", &self.plan_type)
            .field("payment_method", &self.payment_method)
            .finish_non_exhaustive()
    }
}

/// A payment request split into the arguments of `BillingLedger::add_payment`.
pub struct PaymentCommand {
    pub org_id: OrganizationId,
    pub plan_type: PlanType,
    pub card: CardDetails,
    pub method: PaymentMethod,
}

impl TryFrom<AddPaymentReq> for PaymentCommand {
    type Error = CardioError;

    fn try_from(req: AddPaymentReq) -> Result<Self, Self::Error> {
        let org_id = req.org_id.trim();
        if org_id.is_empty() {
            return Err(CardioError::NotFoundOrg);
        }
        let method = match req.payment_method.as_deref().map(str::trim) {
            None | Some("") => PaymentMethod::Card,
            Some(m) if m.eq_ignore_ascii_case("card") => PaymentMethod::Card,
            Some(other) => {
                return Err(CardioError::validation(
                    "payment_method",
                    format!("unsupported payment method {other:?}"),
                ))
            }
        };
        Ok(Self {
            org_id: OrganizationId::new(org_id),
            plan_type: req.plan_type.parse()?,
            card: CardDetails {
                card_number: req.card_number,
                card_holder_name: req.card_holder_name,
                expiration_month: req.expiration_month,
                expiration_year: req.expiration_year,
                cvc: req.cvc,
            },
            method,
        })
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PaymentRes {
    pub id: String,
    pub org_id: String,
    pub plan_type: String,
    pub amount_cents: u32,
    pub currency: String,
    pub status: String,
    pub payment_method: String,
    pub card_last4: String,
    pub created_at: String,
    pub valid_until: String,
}

impl From<&Payment> for PaymentRes {
    fn from(p: &Payment) -> Self {
        Self {
            id: p.id.to_string(),
            org_id: p.org_id.to_string(),
            plan_type: p.plan_type.to_string(),
            amount_cents: p.amount_cents,
            currency: p.currency.clone(),
            status: enum_name(&p.status),
            payment_method: enum_name(&p.method),
            card_last4: p.card_last4.clone(),
            created_at: p.created_at.to_rfc3339(),
            valid_until: p.valid_until().to_rfc3339(),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PlanFeaturesRes {
    pub prediction: bool,
    /// Absent means unlimited.
    pub record_limit: Option<u32>,
    /// `none`, `limited` or `full`.
    pub analytics: String,
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct SubscriptionRes {
    /// `active` or `expired`.
    pub status: String,
    pub plan_type: String,
    pub valid_until: String,
    pub features: PlanFeaturesRes,
}

impl From<&SubscriptionStatus> for SubscriptionRes {
    fn from(s: &SubscriptionStatus) -> Self {
        Self {
            status: enum_name(&s.status),
            plan_type: s.plan_type.to_string(),
            valid_until: s.valid_until.to_rfc3339(),
            features: PlanFeaturesRes {
                prediction: s.features.prediction,
                record_limit: s.features.record_limit,
                analytics: enum_name(&s.features.analytics),
            },
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PaymentsRes {
    pub payments: Vec<PaymentRes>,
}
