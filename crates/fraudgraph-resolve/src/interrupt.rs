//! Caller-driven interruption of an expansion.
//!
//! Every store await in the expander is raced against the caller's
//! cancellation token and the request deadline, so an abandoned request
//! stops at the next store call instead of running to completion.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why an expansion stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    Cancelled,
    TimedOut { after: Duration },
}

/// Cancellation token plus optional deadline for one request.
#[derive(Debug, Clone)]
pub struct Interrupt {
    token: CancellationToken,
    deadline: Option<(Instant, Duration)>,
}

impl Interrupt {
    pub fn new(token: CancellationToken, timeout: Option<Duration>) -> Self {
        Self {
            token,
            deadline: timeout.map(|t| (Instant::now() + t, t)),
        }
    }

    /// Never interrupts.
    pub fn never() -> Self {
        Self::new(CancellationToken::new(), None)
    }

    /// Fail if the request is already cancelled or past its deadline.
    pub fn check(&self) -> Result<(), Interruption> {
        if self.token.is_cancelled() {
            return Err(Interruption::Cancelled);
        }
        if let Some((deadline, after)) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Interruption::TimedOut { after });
            }
        }
        Ok(())
    }

    /// Run `fut` unless the request is cancelled or times out first.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, Interruption> {
        self.check()?;

        let deadline = async {
            match self.deadline {
                Some((at, after)) => {
                    tokio::time::sleep_until(at).await;
                    after
                }
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(Interruption::Cancelled),
            after = deadline => Err(Interruption::TimedOut { after }),
            out = fut => Ok(out),
        }
    }
}
