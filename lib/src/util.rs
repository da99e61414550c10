// lib/src/util.rs
use log::warn;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

use models::errors::{PortalError, PortalResult};

pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 10;

/// Upper bound applied to every call into the identity service, the
/// directory, the blob store or the notification sink.
#[derive(Debug, Clone, Copy)]
pub struct CallLimits {
    pub timeout: Duration,
}

impl Default for CallLimits {
    fn default() -> Self {
        CallLimits {
            timeout: Duration::from_secs(DEFAULT_CALL_TIMEOUT_SECS),
        }
    }
}

impl CallLimits {
    pub fn new(timeout: Duration) -> Self {
        CallLimits { timeout }
    }

    /// Runs `call`, turning an overrun into `UpstreamUnavailable` naming
    /// `operation`.
    pub async fn run<T, E, F>(&self, operation: &str, call: F) -> PortalResult<T>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<PortalError>,
    {
        match timeout(self.timeout, call).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => {
                warn!("{} timed out after {:?}", operation, self.timeout);
                Err(PortalError::upstream(
                    operation,
                    format!("timed out after {} ms", self.timeout.as_millis()),
                ))
            }
        }
    }
}

/// Trims `name` and drops empty values.
pub fn non_blank(name: Option<&str>) -> Option<String> {
    name.map(str::trim).filter(|n| !n.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use models::errors::ErrorKind;

    #[tokio::test]
    async fn slow_call_becomes_upstream_unavailable() {
        let limits = CallLimits::new(Duration::from_millis(20));
        let result: PortalResult<()> = limits
            .run("directory lookup", async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok::<(), PortalError>(())
            })
            .await;
        let err = result.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);
        assert!(err.to_string().starts_with("directory lookup is unavailable"));
    }

    #[tokio::test]
    async fn fast_call_passes_through() {
        let limits = CallLimits::default();
        let value = limits.run("count", async { Ok::<u64, PortalError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn non_blank_drops_whitespace() {
        assert_eq!(non_blank(Some("  ")), None);
        assert_eq!(non_blank(Some(" Dr. Lee ")), Some("Dr. Lee".to_string()));
        assert_eq!(non_blank(None), None);
    }
}
