use crate::config::MAX_DISPATCH_BATCH_SIZE;
use crate::errors::ServiceError;
use crate::metrics::{self, names};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};
use utoipa::ToSchema;

/// Outcome of a [`run_in_batches`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct BatchStats {
    pub total_batches: usize,
    pub completed_batches: usize,
    pub successful_batches: usize,
    pub failed_batches: usize,
    pub orders_processed: usize,
    pub errors: Vec<String>,
}

/// Calls `f` once per chunk of at most `size` items, strictly one after another,
/// sleeping `delay` between chunks (never after the last one).
///
/// A failing chunk is recorded in the returned [`BatchStats`] and the run moves
/// on; successful results are returned in chunk order.
pub async fn run_in_batches<'a, T, R, F, Fut>(
    items: &'a [T],
    size: usize,
    delay: Duration,
    mut f: F,
) -> (Vec<R>, BatchStats)
where
    F: FnMut(&'a [T]) -> Fut,
    Fut: Future<Output = Result<R, ServiceError>>,
{
    let size = size.clamp(1, MAX_DISPATCH_BATCH_SIZE);
    let total_batches = items.len().div_ceil(size);
    let mut stats = BatchStats {
        total_batches,
        ..Default::default()
    };
    let mut results = Vec::with_capacity(total_batches);

    for (index, chunk) in items.chunks(size).enumerate() {
        debug!(
            batch = index + 1,
            total_batches,
            size = chunk.len(),
            "Processing dispatch batch"
        );

        match f(chunk).await {
            Ok(result) => {
                stats.successful_batches += 1;
                stats.orders_processed += chunk.len();
                results.push(result);
            }
            Err(e) => {
                warn!(batch = index + 1, error = %e, "Dispatch batch failed");
                metrics::increment_counter(names::BATCHES_FAILED);
                stats.failed_batches += 1;
                stats.errors.push(format!("batch {}: {}", index + 1, e));
            }
        }
        stats.completed_batches += 1;

        if index + 1 < total_batches && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    (results, stats)
}
