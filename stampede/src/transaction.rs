use crate::context::CURRENT_RUN;
use stampede_core::TransactionLabels;
use std::future::Future;
use tokio::time::Instant;

/// Transaction hook used by the `#[transaction]` macro. Not intended to be used manually.
///
/// Records latency and the outcome of `func` under `labels`, and counts it towards the run the
/// calling virtual user belongs to. Outside of a virtual user only the metrics are recorded.
pub async fn transaction_hook<T, R, E>(labels: TransactionLabels, func: T) -> T::Output
where
    T: Future<Output = Result<R, E>>,
{
    let start = Instant::now();
    let res = func.await;

    #[cfg(feature = "metrics")]
    {
        let elapsed = start.elapsed();
        metrics::describe_histogram!(labels.latency, metrics::Unit::Nanoseconds, "");
        metrics::histogram!(labels.latency).record(elapsed.as_nanos() as f64);

        if res.is_ok() {
            metrics::counter!(labels.success).increment(1);
        } else {
            metrics::counter!(labels.error).increment(1);
        }
    }
    #[cfg(not(feature = "metrics"))]
    let _ = (start, labels);

    if CURRENT_RUN
        .try_with(|context| context.record_transaction(res.is_ok()))
        .is_err()
    {
        tracing::trace!("Transaction outside of a virtual user");
    }

    res
}
