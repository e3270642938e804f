//! Timeout enforcement.
//!
//! # Responsibilities
//! - Wrap upstream calls with the service deadline
//! - Cancel operations cleanly on timeout
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities; the inner future is dropped on expiry,
//!   which releases its connection
//! - Timeout errors are distinct from other errors

use std::future::Future;
use std::time::Duration;

/// The deadline elapsed before the operation finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("deadline of {0:?} exceeded")]
pub struct DeadlineExceeded(pub Duration);

/// Run `future` to completion or until `deadline` elapses.
pub async fn with_deadline<F>(deadline: Duration, future: F) -> Result<F::Output, DeadlineExceeded>
where
    F: Future,
{
    tokio::time::timeout(deadline, future)
        .await
        .map_err(|_| DeadlineExceeded(deadline))
}
