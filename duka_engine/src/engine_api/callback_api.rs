//! Callback ingestion.
//!
//! Every observed payment outcome (a provider callback, a poll result, a timeout notice, or a reconciler decision)
//! goes through [`CallbackApi`]. The outcome is logged first, keyed by correlation id, result code and payload hash,
//! and then applied through the settlement guard, so that each distinct outcome takes effect exactly once no matter
//! how often it is delivered.
use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{
        CallbackOutcome,
        CallbackSource,
        InsertCallbackResult,
        NewCallbackEntry,
        Order,
        PaymentEvent,
        PaymentTransaction,
        TransactionStatus,
    },
    engine_api::{errors::PaymentError, order_flow_api::OrderFlowApi},
    events::{EventProducers, PaymentSettledEvent},
    helpers::payload_hash,
    traits::EngineDatabase,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestResult {
    /// The outcome settled the transaction
    Applied(PaymentTransaction),
    /// This exact payload has already been processed
    Duplicate,
    /// The transaction had already been settled by another observation. It is returned as it stands.
    AlreadySettled(PaymentTransaction),
    /// The provider has no result yet
    Pending,
    /// No transaction has this correlation id. The payload is kept for inspection.
    Unmatched,
    /// The payload could not be understood. It is kept for inspection.
    Malformed,
}

impl IngestResult {
    fn log_outcome(&self) -> CallbackOutcome {
        match self {
            Self::Applied(_) => CallbackOutcome::Applied,
            Self::Duplicate | Self::AlreadySettled(_) => CallbackOutcome::AlreadyProcessed,
            Self::Pending => CallbackOutcome::Pending,
            Self::Unmatched => CallbackOutcome::Unmatched,
            Self::Malformed => CallbackOutcome::Malformed,
        }
    }
}

#[derive(Clone)]
pub struct CallbackApi<B> {
    db: B,
    orders: OrderFlowApi<B>,
    producers: EventProducers,
}

impl<B> Debug for CallbackApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CallbackApi")
    }
}

impl<B> CallbackApi<B> {
    pub fn new(db: B, orders: OrderFlowApi<B>, producers: EventProducers) -> Self {
        Self { db, orders, producers }
    }
}

impl<B> CallbackApi<B>
where B: EngineDatabase
{
    /// Logs and applies a payment outcome, matching it to its transaction by correlation id.
    pub async fn ingest(&self, event: PaymentEvent) -> Result<IngestResult, PaymentError> {
        self.log_and_apply(event, None).await
    }

    /// Logs and applies a payment outcome for a transaction that is already known, which need not have a
    /// correlation id.
    pub async fn ingest_for_transaction(
        &self,
        tx: PaymentTransaction,
        event: PaymentEvent,
    ) -> Result<IngestResult, PaymentError> {
        self.log_and_apply(event, Some(tx)).await
    }

    /// Keeps a payload that could not be parsed, so that it can be inspected later.
    pub async fn record_malformed(
        &self,
        raw_payload: &str,
        source: CallbackSource,
        error: &str,
    ) -> Result<IngestResult, PaymentError> {
        warn!("📨️ Malformed {source:?} payload received. {error}. Payload: {raw_payload}");
        let entry = NewCallbackEntry {
            correlation_id: None,
            result_code: None,
            payload_hash: payload_hash(raw_payload),
            raw_payload: raw_payload.to_string(),
            source,
        };
        if let InsertCallbackResult::Inserted(entry) = self.db.record_callback(entry).await? {
            self.db.update_callback_outcome(entry.id, CallbackOutcome::Malformed, Some(error)).await?;
        }
        Ok(IngestResult::Malformed)
    }

    async fn log_and_apply(
        &self,
        event: PaymentEvent,
        known: Option<PaymentTransaction>,
    ) -> Result<IngestResult, PaymentError> {
        let cid = event.correlation_id.clone().unwrap_or_else(|| "(none)".to_string());
        let entry = NewCallbackEntry {
            correlation_id: event.correlation_id.clone(),
            result_code: event.result_code,
            payload_hash: payload_hash(&event.raw_payload),
            raw_payload: event.raw_payload.clone(),
            source: event.source,
        };
        let entry = match self.db.record_callback(entry).await? {
            InsertCallbackResult::Inserted(entry) => entry,
            InsertCallbackResult::Existing(entry) if entry.outcome.is_settled() => {
                debug!("📨️ Duplicate {:?} for {cid} ignored. It was {:?}", event.source, entry.outcome);
                return Ok(IngestResult::Duplicate);
            },
            InsertCallbackResult::Existing(entry) => {
                info!("📨️ Reprocessing {:?} for {cid}. Its last outcome was {:?}", event.source, entry.outcome);
                entry
            },
        };
        let result = match known {
            Some(tx) => self.apply(tx, &event).await,
            None => self.match_and_apply(&event).await,
        };
        match &result {
            Ok(r) => {
                self.db.update_callback_outcome(entry.id, r.log_outcome(), None).await?;
            },
            Err(e) => {
                error!("📨️ Could not apply {:?} for {cid}. {e}", event.source);
                let err = e.to_string();
                self.db.update_callback_outcome(entry.id, CallbackOutcome::Error, Some(&err)).await?;
            },
        }
        result
    }

    async fn match_and_apply(&self, event: &PaymentEvent) -> Result<IngestResult, PaymentError> {
        let Some(cid) = event.correlation_id.as_deref() else {
            warn!("📨️ {:?} without a correlation id cannot be matched. Payload: {}", event.source, event.raw_payload);
            return Ok(IngestResult::Unmatched);
        };
        match self.db.fetch_transaction_by_correlation_id(cid).await? {
            Some(tx) => self.apply(tx, event).await,
            None => {
                warn!("📨️ No payment transaction matches {cid}. The payload has been kept for inspection");
                Ok(IngestResult::Unmatched)
            },
        }
    }

    /// Settles the transaction and drives the order.
    ///
    /// If the transaction was already settled, the order is driven again from the stored outcome. Driving the order is
    /// idempotent, and this finishes the job when an earlier attempt settled the transaction but failed to update the
    /// order.
    async fn apply(&self, tx: PaymentTransaction, event: &PaymentEvent) -> Result<IngestResult, PaymentError> {
        let Some(settlement) = event.settlement() else {
            debug!("📨️ Payment transaction #{} is still pending at the provider", tx.id);
            return Ok(IngestResult::Pending);
        };
        if let Some(amount) = event.amount {
            if amount < tx.amount {
                warn!("📨️ Payment transaction #{} was for {}, but the provider reports {amount}", tx.id, tx.amount);
            }
        }
        let receipt = settlement.receipt_number.clone();
        let reports_success = settlement.status == TransactionStatus::Completed;
        let Some(settled) = self.db.settle_transaction(tx.id, settlement).await? else {
            let mut current = self.db.fetch_transaction(tx.id).await?.unwrap_or(tx);
            debug!(
                "📨️ Payment transaction #{} is already {}. {:?} outcome ignored",
                current.id, current.status, event.outcome
            );
            if let (true, Some(receipt)) = (reports_success, receipt.as_deref()) {
                if let Some(filled) = self.db.fill_receipt_number(current.id, receipt).await? {
                    info!("📨️ Receipt {receipt} recorded for payment transaction #{}", filled.id);
                    current = filled;
                }
            }
            if current.status == TransactionStatus::Completed || current.status.is_failure() {
                self.drive_order(&current).await?;
            }
            return Ok(IngestResult::AlreadySettled(current));
        };
        info!(
            "📨️ Payment transaction #{} for order {} settled as {} ({:?})",
            settled.id, settled.order_id, settled.status, event.source
        );
        let order = self.drive_order(&settled).await?;
        let event = PaymentSettledEvent { transaction: settled.clone(), order: Some(order) };
        self.producers.publish_payment_settled(event).await;
        Ok(IngestResult::Applied(settled))
    }

    /// Brings the order in line with a settled transaction.
    async fn drive_order(&self, settled: &PaymentTransaction) -> Result<Order, PaymentError> {
        let order_id = &settled.order_id;
        if settled.status == TransactionStatus::Completed {
            return Ok(self.orders.confirm_payment(order_id, settled.receipt_number.as_deref()).await?);
        }
        let live = self.db.count_live_transactions(order_id, Some(settled.id)).await?;
        if live == 0 {
            let reason = settled.result_desc.clone().unwrap_or_else(|| format!("payment {}", settled.status));
            Ok(self.orders.handle_payment_failure(order_id, &reason).await?)
        } else {
            debug!("📨️ Order {order_id} has {live} other payments in flight. Leaving it as it is");
            Ok(self.orders.fetch_order(order_id).await?)
        }
    }
}
