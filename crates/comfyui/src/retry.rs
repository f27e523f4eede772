//! Fixed-interval bounded retry.
//!
//! Both the readiness probe and result polling are "try, wait, try
//! again" loops with an attempt ceiling. [`attempt`] runs such a loop;
//! the operation decides per attempt whether it is done, should be
//! retried, or must abort immediately.

use std::future::Future;

use comfy_worker_core::config::RetryPolicy;

/// Outcome of a single attempt.
#[derive(Debug)]
pub enum Attempt<T, E> {
    /// Success. Stop and return the value.
    Done(T),
    /// Not yet. Wait and try again if budget remains.
    Pending,
    /// Unrecoverable. Stop without spending the remaining budget.
    Abort(E),
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts")]
    Exhausted { attempts: u32 },

    #[error("attempt {attempt} failed: {error}")]
    Aborted { attempt: u32, error: E },
}

/// Run `op` until it returns [`Attempt::Done`] or [`Attempt::Abort`],
/// or until `policy.max_attempts` attempts have been made.
///
/// `op` receives the 1-based attempt number. The loop sleeps
/// `policy.delay` between attempts but not after the last one.
pub async fn attempt<T, E, F, Fut>(policy: &RetryPolicy, mut op: F) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Attempt<T, E>>,
{
    for n in 1..=policy.max_attempts {
        match op(n).await {
            Attempt::Done(value) => return Ok(value),
            Attempt::Abort(error) => return Err(RetryError::Aborted { attempt: n, error }),
            Attempt::Pending => {}
        }

        if n < policy.max_attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }

    Err(RetryError::Exhausted {
        attempts: policy.max_attempts,
    })
}
