use std::future::Future;
use std::time::Duration;

/// Run a suspending operation under a timeout. On expiry the result is
/// `None` and a structured warning is recorded; callers decide whether a
/// missing result is fatal.
pub async fn with_timeout<T>(
    duration: Duration,
    operation: &str,
    fut: impl Future<Output = T>,
) -> Option<T> {
    match tokio::time::timeout(duration, fut).await {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(
                operation,
                timeout_ms = duration.as_millis() as u64,
                "operation timed out"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_value_within_deadline() {
        let result = with_timeout(Duration::from_secs(1), "fast", async { 42 }).await;
        assert_eq!(result, Some(42));
    }

    #[tokio::test]
    async fn returns_none_on_expiry() {
        let result = with_timeout(Duration::from_millis(10), "slow", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            42
        })
        .await;
        assert_eq!(result, None);
    }
}
