use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

pub async fn enqueue_ready(state: &AppState, order_id: Uuid) -> Result<(), AppError> {
    state
        .ready_tx
        .send(order_id)
        .await
        .map_err(|err| AppError::Internal(format!("ready queue send failed: {err}")))?;

    state.metrics.orders_in_queue.inc();
    Ok(())
}

/// Drains the ready queue, opening the first offer for each order.
pub async fn run_dispatch_engine(state: Arc<AppState>, mut ready_rx: mpsc::Receiver<Uuid>) {
    info!("dispatch engine started");

    while let Some(order_id) = ready_rx.recv().await {
        state.metrics.orders_in_queue.dec();

        let start = Instant::now();
        match state.dispatcher.cascade(order_id).await {
            Ok(outcome) => {
                info!(
                    order_id = %order_id,
                    outcome = ?outcome,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "ready order dispatched"
                );
            }
            Err(AppError::MissingLocation(_)) => {
                warn!(order_id = %order_id, "ready order has no pickup location; not dispatching");
            }
            Err(err) => {
                error!(order_id = %order_id, error = %err, "failed to dispatch ready order");
            }
        }
    }

    warn!("dispatch engine stopped: queue channel closed");
}
