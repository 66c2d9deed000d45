use {
    crate::domain::{
        error::WebhookError,
        ports::{FeeRefundTotal, ProviderCharge, ProviderGateway, ProviderPaymentIntent},
    },
    async_trait::async_trait,
};

/// `ProviderGateway` over the Stripe API. Conversions from SDK types to
/// domain shapes happen here and nowhere else.
pub struct StripeGateway {
    client: stripe::Client,
}

impl StripeGateway {
    pub fn new(secret_key: &str) -> Self {
        Self {
            client: stripe::Client::new(secret_key),
        }
    }
}

fn convert_charge(charge: stripe::Charge) -> ProviderCharge {
    let payment_intent_id = charge.payment_intent.as_ref().map(|e| match e {
        stripe::Expandable::Id(id) => id.to_string(),
        stripe::Expandable::Object(pi) => pi.id.to_string(),
    });
    let (balance_transaction_id, fee_details) = match charge.balance_transaction.as_ref() {
        Some(stripe::Expandable::Id(id)) => (Some(id.to_string()), None),
        Some(stripe::Expandable::Object(bt)) => (
            Some(bt.id.to_string()),
            serde_json::to_value(&bt.fee_details).ok(),
        ),
        None => (None, None),
    };
    let transfer_id = charge.transfer.as_ref().map(|e| match e {
        stripe::Expandable::Id(id) => id.to_string(),
        stripe::Expandable::Object(t) => t.id.to_string(),
    });
    let application_fee_id = charge.application_fee.as_ref().map(|e| match e {
        stripe::Expandable::Id(id) => id.to_string(),
        stripe::Expandable::Object(fee) => fee.id.to_string(),
    });

    ProviderCharge {
        id: charge.id.to_string(),
        payment_intent_id,
        amount: charge.amount,
        amount_refunded: charge.amount_refunded,
        application_fee_id,
        balance_transaction_id,
        fee_details,
        transfer_id,
    }
}

#[async_trait]
impl ProviderGateway for StripeGateway {
    async fn retrieve_charge(&self, charge_id: &str) -> Result<ProviderCharge, WebhookError> {
        let id = charge_id
            .parse::<stripe::ChargeId>()
            .map_err(|e| WebhookError::Provider(format!("invalid Charge id: {e}")))?;
        let charge = stripe::Charge::retrieve(&self.client, &id, &["balance_transaction"])
            .await
            .map_err(|e| WebhookError::Provider(format!("Stripe API: {e}")))?;
        Ok(convert_charge(charge))
    }

    async fn retrieve_payment_intent_with_latest_charge(
        &self,
        payment_intent_id: &str,
    ) -> Option<ProviderPaymentIntent> {
        let id = match payment_intent_id.parse::<stripe::PaymentIntentId>() {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(payment_intent_id, error = %e, "invalid PaymentIntent id");
                return None;
            }
        };
        let pi = match stripe::PaymentIntent::retrieve(
            &self.client,
            &id,
            &[
                "latest_charge",
                "latest_charge.balance_transaction",
                "latest_charge.transfer",
            ],
        )
        .await
        {
            Ok(pi) => pi,
            Err(e) => {
                // Callers fall back to the charge carried in the event.
                tracing::warn!(payment_intent_id, error = %e, "PaymentIntent fetch failed");
                return None;
            }
        };

        let latest_charge = match pi.latest_charge {
            Some(stripe::Expandable::Object(charge)) => Some(convert_charge(*charge)),
            Some(stripe::Expandable::Id(_)) | None => None,
        };

        Some(ProviderPaymentIntent {
            id: pi.id.to_string(),
            latest_charge,
        })
    }

    async fn sum_application_fee_refunds(
        &self,
        application_fee_id: &str,
    ) -> Result<FeeRefundTotal, WebhookError> {
        let id = application_fee_id
            .parse::<stripe::ApplicationFeeId>()
            .map_err(|e| WebhookError::Provider(format!("invalid ApplicationFee id: {e}")))?;
        let fee = stripe::ApplicationFee::retrieve(&self.client, &id, &[])
            .await
            .map_err(|e| WebhookError::Provider(format!("Stripe API: {e}")))?;

        // The embedded refunds list carries up to 100 entries. More than that
        // is unexpected for a single fee; surface it as retryable rather than
        // summing a truncated page.
        if fee.refunds.has_more {
            return Err(WebhookError::Provider(format!(
                "application fee {application_fee_id} has more than one refund page"
            )));
        }

        let amount = fee.refunds.data.iter().map(|r| r.amount).sum();
        let latest_refund_id = fee.refunds.data.last().map(|r| r.id.to_string());

        Ok(FeeRefundTotal {
            amount,
            latest_refund_id,
        })
    }
}
