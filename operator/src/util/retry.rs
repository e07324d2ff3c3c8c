use std::future::Future;
use tokio::time::Duration;

use super::Error;

/// Backoff schedule for optimistic-concurrency conflicts (spec.md §4.1
/// "Conflict retry", §9 "Optimistic-concurrency loop"): 3 attempts at 100ms,
/// 200ms, 400ms. Any other error bubbles immediately.
const BACKOFF: [Duration; 3] = [
    Duration::from_millis(100),
    Duration::from_millis(200),
    Duration::from_millis(400),
];

/// Runs `op` (a read-modify-write closure) up to `1 + BACKOFF.len()` times,
/// retrying only on HTTP 409 Conflict responses from the orchestrator. The
/// closure is re-invoked from scratch on every attempt so it can re-fetch
/// the latest resource version before retrying the write.
pub async fn on_conflict<T, F, Fut>(mut op: F) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < BACKOFF.len() && is_conflict(&err) => {
                tokio::time::sleep(BACKOFF[attempt]).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn is_conflict(err: &Error) -> bool {
    matches!(
        err,
        Error::KubeError {
            source: kube::Error::Api(ae),
        } if ae.code == 409
    )
}
