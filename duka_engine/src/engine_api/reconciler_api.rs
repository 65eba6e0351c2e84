//! The reconciler settles payments whose outcome never arrived.
//!
//! A transaction that has been `processing` for longer than the grace period is polled at the provider. Terminal
//! results go through the same ingestion path as callbacks, so a late callback and a poll can never both apply.
//! Once a transaction has been swept `max_sweep_attempts` times without an answer it is force-failed as `timeout`.
use std::{fmt::Debug, sync::Arc, time::Duration};

use log::*;
use serde_json::json;
use tokio::time::timeout;

use crate::{
    db_types::{CallbackSource, PaymentEvent, PaymentOutcome, PaymentTransaction, TransactionStatus},
    engine_api::{
        callback_api::{CallbackApi, IngestResult},
        errors::PaymentError,
    },
    traits::{EngineDatabase, PaymentProvider},
};

pub const RECONCILIATION_EXHAUSTED: &str = "reconciliation exhausted";

#[derive(Debug, Clone, Copy)]
pub struct ReconcilerConfig {
    /// Transactions younger than this are left alone
    pub grace_period: Duration,
    /// Sweeps allowed before a transaction is force-failed
    pub max_sweep_attempts: i64,
    /// How long to wait for each status query
    pub query_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(300),
            max_sweep_attempts: 6,
            query_timeout: Duration::from_secs(5),
        }
    }
}

/// What a sweep did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepResult {
    pub examined: usize,
    pub settled: usize,
    pub still_pending: usize,
    pub exhausted: usize,
    pub errors: usize,
}

enum Poll {
    Settled,
    NoAnswer,
}

pub struct ReconcilerApi<B, P> {
    db: B,
    provider: Arc<P>,
    callbacks: CallbackApi<B>,
    config: ReconcilerConfig,
}

impl<B: Clone, P> Clone for ReconcilerApi<B, P> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            provider: Arc::clone(&self.provider),
            callbacks: self.callbacks.clone(),
            config: self.config,
        }
    }
}

impl<B, P> Debug for ReconcilerApi<B, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconcilerApi ({:?})", self.config)
    }
}

impl<B, P> ReconcilerApi<B, P> {
    pub fn new(db: B, provider: Arc<P>, callbacks: CallbackApi<B>, config: ReconcilerConfig) -> Self {
        Self { db, provider, callbacks, config }
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }
}

impl<B, P> ReconcilerApi<B, P>
where
    B: EngineDatabase,
    P: PaymentProvider,
{
    /// Polls every stale `processing` transaction once.
    ///
    /// Failures on one transaction are logged and counted, and do not stop the sweep.
    pub async fn sweep(&self) -> Result<SweepResult, PaymentError> {
        let stale = self.db.fetch_stale_transactions(self.config.grace_period).await?;
        let mut result = SweepResult { examined: stale.len(), ..Default::default() };
        if stale.is_empty() {
            trace!("🕰️ No stale payments to reconcile");
            return Ok(result);
        }
        debug!("🕰️ Reconciling {} stale payments", stale.len());
        for tx in stale {
            let id = tx.id;
            match self.reconcile(tx).await {
                Ok(SweepOutcome::Settled) => result.settled += 1,
                Ok(SweepOutcome::StillPending) => result.still_pending += 1,
                Ok(SweepOutcome::Exhausted) => result.exhausted += 1,
                Err(e) => {
                    error!("🕰️ Could not reconcile payment transaction #{id}. {e}");
                    result.errors += 1;
                },
            }
        }
        info!(
            "🕰️ Reconciliation sweep complete. {} examined, {} settled, {} pending, {} exhausted, {} errors",
            result.examined, result.settled, result.still_pending, result.exhausted, result.errors
        );
        Ok(result)
    }

    async fn reconcile(&self, tx: PaymentTransaction) -> Result<SweepOutcome, PaymentError> {
        let attempts = self.db.record_sweep_attempt(tx.id).await?;
        let poll = match tx.correlation_id.as_deref() {
            Some(cid) => self.poll(&tx, cid).await?,
            None => {
                debug!("🕰️ Payment transaction #{} was never acknowledged by the provider", tx.id);
                Poll::NoAnswer
            },
        };
        match poll {
            Poll::Settled => Ok(SweepOutcome::Settled),
            Poll::NoAnswer if attempts >= self.config.max_sweep_attempts => {
                self.force_fail(tx, attempts).await?;
                Ok(SweepOutcome::Exhausted)
            },
            Poll::NoAnswer => {
                debug!(
                    "🕰️ Payment transaction #{} is still unresolved after {attempts} of {} sweeps",
                    tx.id, self.config.max_sweep_attempts
                );
                Ok(SweepOutcome::StillPending)
            },
        }
    }

    async fn poll(&self, tx: &PaymentTransaction, cid: &str) -> Result<Poll, PaymentError> {
        match timeout(self.config.query_timeout, self.provider.query_payment_status(cid)).await {
            Err(_) => {
                warn!("🕰️ Status query for {cid} timed out after {}ms", self.config.query_timeout.as_millis());
                Ok(Poll::NoAnswer)
            },
            Ok(Err(e)) => {
                warn!("🕰️ Status query for {cid} failed. {e}");
                Ok(Poll::NoAnswer)
            },
            Ok(Ok(status)) if status.outcome == PaymentOutcome::Pending => Ok(Poll::NoAnswer),
            Ok(Ok(status)) => {
                let mut event = PaymentEvent::new(cid, status.outcome, CallbackSource::Poll, status.raw);
                event.result_code = status.result_code;
                event.result_desc = status.result_desc;
                event.receipt_number = status.receipt_number;
                match self.callbacks.ingest_for_transaction(tx.clone(), event).await? {
                    IngestResult::Pending => Ok(Poll::NoAnswer),
                    _ => Ok(Poll::Settled),
                }
            },
        }
    }

    async fn force_fail(&self, tx: PaymentTransaction, attempts: i64) -> Result<(), PaymentError> {
        let raw = json!({
            "transaction_id": tx.id,
            "correlation_id": tx.correlation_id,
            "sweep_attempts": attempts,
            "result_desc": RECONCILIATION_EXHAUSTED,
        })
        .to_string();
        let mut event = PaymentEvent::new("", PaymentOutcome::Timeout, CallbackSource::Reconciler, raw);
        event.correlation_id = tx.correlation_id.clone();
        event.result_desc = Some(RECONCILIATION_EXHAUSTED.to_string());
        let id = tx.id;
        let reason = PaymentError::ReconciliationExhausted(format!("#{id}"));
        match self.callbacks.ingest_for_transaction(tx, event).await? {
            IngestResult::Applied(_) => warn!("🕰️ {reason} ({attempts} sweeps)"),
            other => debug!("🕰️ Payment transaction #{id} could not be force-failed: {other:?}"),
        }
        Ok(())
    }

    /// Polls a single transaction now, regardless of its age, and applies a terminal result. Returns the transaction
    /// as it stands afterwards.
    pub async fn refresh(&self, correlation_id: &str) -> Result<PaymentTransaction, PaymentError> {
        let tx = self
            .db
            .fetch_transaction_by_correlation_id(correlation_id)
            .await?
            .ok_or_else(|| PaymentError::TransactionNotFound(correlation_id.to_string()))?;
        if tx.status != TransactionStatus::Processing {
            return Ok(tx);
        }
        let id = tx.id;
        self.poll(&tx, correlation_id).await?;
        self.db
            .fetch_transaction(id)
            .await?
            .ok_or_else(|| PaymentError::TransactionNotFound(correlation_id.to_string()))
    }
}

enum SweepOutcome {
    Settled,
    StillPending,
    Exhausted,
}
