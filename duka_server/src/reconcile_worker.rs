use std::{sync::Arc, time::Duration};

use duka_engine::{
    events::EventProducers,
    CallbackApi,
    OrderFlowApi,
    ReconcilerApi,
    ReconcilerConfig,
    SelectionPolicy,
    SqliteDatabase,
    WarehouseSelector,
};
use log::*;
use tokio::{task::JoinHandle, time::MissedTickBehavior};

use crate::integrations::mpesa::MpesaGateway;

/// Starts the reconciliation worker. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Sweeps never overlap: the next tick is only taken once the previous sweep has finished, and ticks missed while a
/// sweep was running are skipped rather than replayed.
pub fn start_reconcile_worker(
    db: SqliteDatabase,
    gateway: Arc<MpesaGateway>,
    producers: EventProducers,
    policy: SelectionPolicy,
    config: ReconcilerConfig,
    interval: Duration,
) -> JoinHandle<()> {
    // A zero period would make the interval panic
    let interval = interval.max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let orders = OrderFlowApi::new(db.clone(), WarehouseSelector::new(policy), producers.clone());
        let callbacks = CallbackApi::new(db.clone(), orders, producers);
        let api = ReconcilerApi::new(db, gateway, callbacks, config);
        info!("🕰️ Payment reconciliation worker started. Sweeping every {}s", interval.as_secs());
        loop {
            timer.tick().await;
            trace!("🕰️ Running payment reconciliation sweep");
            match api.sweep().await {
                Ok(result) => {
                    debug!("🕰️ Sweep finished. {} settled, {} force-failed", result.settled, result.exhausted);
                },
                Err(e) => {
                    error!("🕰️ Error running payment reconciliation sweep: {e}");
                },
            }
        }
    })
}
