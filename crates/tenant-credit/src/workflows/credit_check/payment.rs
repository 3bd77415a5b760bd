use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{info, warn};

use super::domain::{CreditCheckFee, PaymentRequest, TransactionId};
use super::error::CreditCheckError;
use super::gateway::PaymentGateway;

const DECLINED_WITHOUT_REASON: &str = "payment was declined";
const MISSING_TRANSACTION_ID: &str = "payment was approved without a transaction id";

/// Collects the credit check fee through the configured gateway.
pub struct FeeCollector<P> {
    gateway: Arc<P>,
    fee: CreditCheckFee,
}

impl<P> FeeCollector<P>
where
    P: PaymentGateway + 'static,
{
    pub fn new(gateway: Arc<P>, fee: CreditCheckFee) -> Self {
        Self { gateway, fee }
    }

    pub fn fee(&self) -> &CreditCheckFee {
        &self.fee
    }

    pub fn request_for(
        &self,
        customer_email: &str,
        metadata: BTreeMap<String, String>,
    ) -> PaymentRequest {
        PaymentRequest {
            amount_cents: self.fee.amount_cents,
            currency: self.fee.currency.clone(),
            description: self.fee.description.clone(),
            customer_email: customer_email.trim().to_string(),
            metadata,
        }
    }

    /// Charge the fee. A decline surfaces the gateway's message unchanged.
    pub async fn collect(
        &self,
        request: PaymentRequest,
    ) -> Result<TransactionId, CreditCheckError> {
        let response = self.gateway.charge(request).await.map_err(|err| {
            warn!(error = %err, "payment gateway call failed");
            CreditCheckError::Payment(err.to_string())
        })?;

        if !response.success {
            let message = response
                .error
                .unwrap_or_else(|| DECLINED_WITHOUT_REASON.to_string());
            warn!(reason = %message, "credit check payment declined");
            return Err(CreditCheckError::Payment(message));
        }

        match response.transaction_id {
            Some(transaction_id) => {
                info!(
                    %transaction_id,
                    amount = %self.fee.display_amount(),
                    "credit check fee collected"
                );
                Ok(transaction_id)
            }
            None => Err(CreditCheckError::Payment(MISSING_TRANSACTION_ID.to_string())),
        }
    }
}
