use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info};

use crate::engine::dispatcher::{CascadeOutcome, Dispatcher};
use crate::store::AssignmentStore;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub expired: usize,
    pub stalled: usize,
    pub reoffered: usize,
    pub no_courier: usize,
    pub exhausted: usize,
    pub failures: usize,
}

impl SweepReport {
    fn record(&mut self, outcome: &CascadeOutcome) {
        match outcome {
            CascadeOutcome::Offered(_) => self.reoffered += 1,
            CascadeOutcome::NoCourierAvailable => self.no_courier += 1,
            CascadeOutcome::Exhausted => self.exhausted += 1,
            CascadeOutcome::AlreadyHandled => {}
        }
    }
}

/// Ticks every `sweep_interval` until `shutdown` flips to `true`.
pub async fn run_expiry_sweeper(dispatcher: Arc<Dispatcher>, mut shutdown: watch::Receiver<bool>) {
    let period = dispatcher.settings().sweep_interval;
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval_ms = period.as_millis() as u64, "expiry sweeper started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = sweep_once(&dispatcher).await;
                if report != SweepReport::default() {
                    info!(
                        expired = report.expired,
                        stalled = report.stalled,
                        reoffered = report.reoffered,
                        no_courier = report.no_courier,
                        exhausted = report.exhausted,
                        failures = report.failures,
                        "sweep finished"
                    );
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("expiry sweeper stopped");
}

/// One pass: expire overdue offers and cascade them, then retry stalled
/// orders. Each order is handled independently; a failure is counted and
/// the pass continues.
pub async fn sweep_once(dispatcher: &Dispatcher) -> SweepReport {
    let metrics = dispatcher.metrics();
    let now = dispatcher.now();
    let mut report = SweepReport::default();

    match dispatcher.store().list_expired_offers(now).await {
        Ok(expired) => {
            for offer in expired {
                report.expired += 1;
                match dispatcher.expire(&offer).await {
                    Ok(outcome) => report.record(&outcome),
                    Err(err) => {
                        report.failures += 1;
                        metrics.sweep_failures_total.inc();
                        error!(
                            order_id = %offer.order_id,
                            courier_id = %offer.courier_id,
                            error = %err,
                            "failed to expire offer"
                        );
                    }
                }
            }
        }
        Err(err) => {
            report.failures += 1;
            metrics.sweep_failures_total.inc();
            error!(error = %err, "failed to list expired offers");
        }
    }

    let cutoff = now - dispatcher.settings().stalled_retry_after;
    match dispatcher.store().list_stalled_orders(cutoff).await {
        Ok(stalled) => {
            for order_id in stalled {
                report.stalled += 1;
                match dispatcher.cascade(order_id).await {
                    Ok(outcome) => report.record(&outcome),
                    Err(err) => {
                        report.failures += 1;
                        metrics.sweep_failures_total.inc();
                        error!(order_id = %order_id, error = %err, "failed to retry stalled order");
                    }
                }
            }
        }
        Err(err) => {
            report.failures += 1;
            metrics.sweep_failures_total.inc();
            error!(error = %err, "failed to list stalled orders");
        }
    }

    metrics.sweeps_total.inc();
    debug!(?report, "sweep tick");
    report
}
