use std::future::Future;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("collaborator timed out after {0:?}")]
    Timeout(Duration),

    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },

    #[cfg(feature = "http")]
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model error: {0}")]
    Model(String),

    #[error("expected {expected} scores, got {got}")]
    ScoreCount { expected: usize, got: usize },
}

/// Run a collaborator call with a hard deadline.
pub async fn with_timeout<T, F>(limit: Duration, fut: F) -> Result<T, AiError>
where
    F: Future<Output = Result<T, AiError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(AiError::Timeout(limit)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn timeout_maps_to_error() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, AiError>(1)
        };
        let err = with_timeout(Duration::from_millis(10), slow).await.unwrap_err();
        assert!(matches!(err, AiError::Timeout(_)));
    }

    #[tokio::test]
    async fn fast_call_passes_through() {
        let v = with_timeout(Duration::from_secs(1), async { Ok::<_, AiError>(7) })
            .await
            .unwrap();
        assert_eq!(v, 7);
    }
}
