//! Per-request context: tenant scope, deadline, and cancellation

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use tenancy_common::LogicalCluster;

use crate::error::AdmissionError;

/// Why a call made under a [`RequestContext`] did not complete
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Interrupted {
    /// The request (or the server) was cancelled
    #[error("request cancelled")]
    Cancelled,
    /// The request deadline passed
    #[error("request deadline exceeded")]
    DeadlineExceeded,
}

/// Context for a single admission request
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    cluster: Option<LogicalCluster>,
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl RequestContext {
    /// Context scoped to a logical cluster, with no deadline
    pub fn new(cluster: LogicalCluster) -> Self {
        Self {
            cluster: Some(cluster),
            ..Default::default()
        }
    }

    /// Set an absolute deadline
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Set a deadline relative to now
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Tie the request to a cancellation token (usually a child of the server's)
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Logical cluster the request was made in
    pub fn cluster(&self) -> Result<&LogicalCluster, AdmissionError> {
        self.cluster
            .as_ref()
            .ok_or_else(|| AdmissionError::malformed("request carries no logical cluster"))
    }

    /// The request deadline, if any
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Run `fut` until it completes, the deadline passes, or the request is cancelled
    ///
    /// Cancellation wins over an already-expired deadline, which wins over a
    /// ready future.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, Interrupted> {
        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(Interrupted::Cancelled),
            _ = deadline => Err(Interrupted::DeadlineExceeded),
            out = fut => Ok(out),
        }
    }
}
