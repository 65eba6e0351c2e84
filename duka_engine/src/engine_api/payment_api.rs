use std::{fmt::Debug, sync::Arc, time::Duration};

use log::*;
use tokio::time::timeout;

use crate::{
    db_types::{
        NewPaymentTransaction,
        Order,
        OrderId,
        OrderStatusType,
        PaymentStatusType,
        PaymentTransaction,
        Settlement,
        TransactionStatus,
    },
    engine_api::errors::PaymentError,
    traits::{EngineDatabase, PaymentProvider, PaymentRequest, ProviderStatus},
};

#[derive(Debug, Clone, Copy)]
pub struct PaymentConfig {
    /// How long to wait for the provider to accept a payment request
    pub initiation_timeout: Duration,
    /// Attempts allowed after the first one
    pub max_retries: i64,
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self { initiation_timeout: Duration::from_secs(60), max_retries: 3 }
    }
}

/// `PaymentApi` starts payments and reverses them.
///
/// Every attempt is a new [`PaymentTransaction`]. Retries never modify an earlier attempt; they point back to it
/// through `parent_id`.
pub struct PaymentApi<B, P> {
    db: B,
    provider: Arc<P>,
    config: PaymentConfig,
}

impl<B: Clone, P> Clone for PaymentApi<B, P> {
    fn clone(&self) -> Self {
        Self { db: self.db.clone(), provider: Arc::clone(&self.provider), config: self.config }
    }
}

impl<B, P> Debug for PaymentApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentApi ({:?})", self.config)
    }
}

impl<B, P> PaymentApi<B, P> {
    pub fn new(db: B, provider: Arc<P>, config: PaymentConfig) -> Self {
        Self { db, provider, config }
    }

    pub fn config(&self) -> &PaymentConfig {
        &self.config
    }
}

impl<B, P> PaymentApi<B, P>
where
    B: EngineDatabase,
    P: PaymentProvider,
{
    async fn fetch_order(&self, order_id: &OrderId) -> Result<Order, PaymentError> {
        self.db.fetch_order(order_id).await?.ok_or_else(|| PaymentError::OrderNotFound(order_id.clone()))
    }

    pub async fn transactions_for_order(&self, order_id: &OrderId) -> Result<Vec<PaymentTransaction>, PaymentError> {
        self.db.fetch_transactions_for_order(order_id).await
    }

    pub async fn transaction_by_correlation_id(
        &self,
        correlation_id: &str,
    ) -> Result<PaymentTransaction, PaymentError> {
        self.db
            .fetch_transaction_by_correlation_id(correlation_id)
            .await?
            .ok_or_else(|| PaymentError::TransactionNotFound(correlation_id.to_string()))
    }

    /// Asks the payer to pay the outstanding balance of the order.
    ///
    /// The transaction is created in `processing` before the provider is called. If the provider rejects the request
    /// or cannot be reached, the transaction is settled as `failed` and the error returned; the order is left as it
    /// was. If the provider does not answer within the initiation timeout, the transaction stays in `processing`
    /// without a correlation id and is left for the reconciler.
    ///
    /// If the order has earlier attempts, the new transaction is a retry of the latest one.
    pub async fn initiate(
        &self,
        order_id: &OrderId,
        payer_reference: &str,
    ) -> Result<PaymentTransaction, PaymentError> {
        let order = self.fetch_order(order_id).await?;
        let attempts = self.db.fetch_transactions_for_order(order_id).await?;
        self.check_payable(&order, &attempts).await?;
        let paid = self.db.total_paid(order_id).await?;
        let amount = order.total_price - paid;
        if !amount.is_positive() {
            return Err(PaymentError::PaymentNotAllowed {
                order_id: order_id.clone(),
                reason: "nothing is owed".to_string(),
            });
        }
        let parent = attempts.last();
        let new_tx = NewPaymentTransaction {
            order_id: order_id.clone(),
            payer_reference: payer_reference.to_string(),
            amount,
            retry_count: parent.map(|p| p.retry_count + 1).unwrap_or_default(),
            parent_id: parent.map(|p| p.id),
        };
        let tx = self.db.insert_transaction(new_tx).await?;
        let request = PaymentRequest {
            order_id: order_id.clone(),
            amount,
            payer_reference: payer_reference.to_string(),
            description: format!("Order {}", order_id.as_str()),
        };
        match timeout(self.config.initiation_timeout, self.provider.initiate_payment(&request)).await {
            Err(_) => {
                warn!(
                    "💳️ The payment provider did not answer within {}s for transaction #{} (order {order_id}). It is \
                     left in processing for the reconciler",
                    self.config.initiation_timeout.as_secs(),
                    tx.id
                );
                Ok(tx)
            },
            Ok(Ok(initiated)) => {
                let cid = initiated.correlation_id.as_str();
                let merchant_request_id = initiated.merchant_request_id.as_deref();
                let updated = self.db.assign_correlation_id(tx.id, cid, merchant_request_id).await?;
                info!("💳️ Payment of {amount} for order {order_id} requested. Correlation id: {cid}");
                Ok(updated.unwrap_or(tx))
            },
            Ok(Err(e)) => {
                warn!("💳️ Payment request for order {order_id} failed. {e}");
                let settlement = Settlement {
                    status: TransactionStatus::Failed,
                    result_code: None,
                    result_desc: Some(e.to_string()),
                    receipt_number: None,
                };
                self.db.settle_transaction(tx.id, settlement).await?;
                Err(e.into())
            },
        }
    }

    /// Starts a new attempt for the order. Uses the payer reference of the last attempt if none is given.
    pub async fn retry(
        &self,
        order_id: &OrderId,
        payer_reference: Option<&str>,
    ) -> Result<PaymentTransaction, PaymentError> {
        let attempts = self.db.fetch_transactions_for_order(order_id).await?;
        let payer = match (payer_reference, attempts.last()) {
            (Some(p), _) => p.to_string(),
            (None, Some(last)) => last.payer_reference.clone(),
            (None, None) => {
                return Err(PaymentError::PaymentNotAllowed {
                    order_id: order_id.clone(),
                    reason: "no payer reference was given and there is no earlier attempt".to_string(),
                })
            },
        };
        debug!("💳️ Retrying payment for order {order_id} ({} earlier attempts)", attempts.len());
        self.initiate(order_id, &payer).await
    }

    async fn check_payable(&self, order: &Order, attempts: &[PaymentTransaction]) -> Result<(), PaymentError> {
        let not_allowed = |reason: String| PaymentError::PaymentNotAllowed { order_id: order.order_id.clone(), reason };
        if order.status != OrderStatusType::Pending {
            return Err(not_allowed(format!("the order is {}", order.status)));
        }
        if !order.payment_status.accepts_payment() {
            return Err(not_allowed(format!("its payment status is {}", order.payment_status)));
        }
        if attempts.iter().any(|t| t.status.is_live()) {
            return Err(PaymentError::PaymentInProgress(order.order_id.clone()));
        }
        let next_retry = attempts.last().map(|t| t.retry_count + 1).unwrap_or_default();
        if next_retry > self.config.max_retries {
            return Err(PaymentError::RetriesExhausted {
                order_id: order.order_id.clone(),
                attempts: i64::try_from(attempts.len()).unwrap_or(i64::MAX),
            });
        }
        Ok(())
    }

    /// Asks the provider for the current state of a payment. This is a direct poll; nothing is recorded.
    pub async fn query_status(&self, correlation_id: &str) -> Result<ProviderStatus, PaymentError> {
        Ok(self.provider.query_payment_status(correlation_id).await?)
    }

    /// Reverses the order's completed payment.
    ///
    /// When the provider accepts the reversal the transaction moves from `completed` to `reversed`, and a `paid` order
    /// becomes `refunded`.
    pub async fn request_reversal(&self, order_id: &OrderId, reason: &str) -> Result<PaymentTransaction, PaymentError> {
        let attempts = self.db.fetch_transactions_for_order(order_id).await?;
        let completed = attempts
            .into_iter()
            .rev()
            .find(|t| t.status == TransactionStatus::Completed)
            .ok_or_else(|| PaymentError::NoCompletedPayment(order_id.clone()))?;
        let receipt =
            completed.receipt_number.clone().ok_or_else(|| PaymentError::NoCompletedPayment(order_id.clone()))?;
        let reference = self.provider.reverse_payment(&receipt, completed.amount, reason).await?;
        info!("💳️ Reversal of {receipt} for order {order_id} accepted. Reference: {reference}");
        let reversed = self
            .db
            .mark_transaction_reversed(completed.id)
            .await?
            .ok_or_else(|| PaymentError::NoCompletedPayment(order_id.clone()))?;
        let (paid, refunded) = (PaymentStatusType::Paid, PaymentStatusType::Refunded);
        if self.db.set_payment_status(order_id, paid, refunded).await?.is_some() {
            info!("💳️ Order {order_id} has been refunded");
        }
        Ok(reversed)
    }
}
