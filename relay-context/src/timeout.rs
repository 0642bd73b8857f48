use std::future::Future;
use std::time::Duration;

use relay_core::{RelayError, RelayResult};

/// Errors an upstream call can end with.
pub trait IntoRelayError {
    fn into_relay_error(self) -> RelayError;
}

impl IntoRelayError for RelayError {
    fn into_relay_error(self) -> RelayError {
        self
    }
}

impl IntoRelayError for anyhow::Error {
    fn into_relay_error(self) -> RelayError {
        match self.downcast::<RelayError>() {
            Ok(relay) => relay,
            Err(other) => RelayError::upstream(format!("{other:#}")),
        }
    }
}

/// Race `fut` against `after`.
///
/// Elapsing yields `UpstreamTimeout`; the upstream operation itself is
/// dropped, not cancelled server-side, and may still complete.
pub async fn with_upstream_timeout<T, E, F>(
    operation: &'static str,
    after: Duration,
    fut: F,
) -> RelayResult<T>
where
    F: Future<Output = Result<T, E>>,
    E: IntoRelayError,
{
    match tokio::time::timeout(after, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.into_relay_error()),
        Err(_) => Err(RelayError::UpstreamTimeout { operation, after }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn slow_upstream_times_out() {
        let result: RelayResult<()> =
            with_upstream_timeout("list", Duration::from_secs(30), async {
                tokio::time::sleep(Duration::from_secs(31)).await;
                Ok::<_, anyhow::Error>(())
            })
            .await;

        assert_eq!(
            result,
            Err(RelayError::UpstreamTimeout {
                operation: "list",
                after: Duration::from_secs(30),
            })
        );
    }

    #[tokio::test]
    async fn upstream_errors_pass_through_their_cause() {
        let result: RelayResult<()> = with_upstream_timeout("send", Duration::from_secs(1), async {
            Err(anyhow::anyhow!("535 authentication failed"))
        })
        .await;
        assert_eq!(result, Err(RelayError::upstream("535 authentication failed")));

        let typed: RelayResult<()> = with_upstream_timeout("send", Duration::from_secs(1), async {
            Err(RelayError::NotConfigured("outbound relay"))
        })
        .await;
        assert_eq!(typed, Err(RelayError::NotConfigured("outbound relay")));
    }
}
