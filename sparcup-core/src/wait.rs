//! Fixed-interval bounded polling. The remote never pushes state changes, so
//! every readiness wait in the crate goes through [`poll`].

use crate::config::WaitPolicy;
use crate::error::RemoteError;
use std::thread;

#[derive(Debug)]
pub enum Waited<T> {
    /// The predicate held.
    Ready(T),
    /// Attempts ran out; carries the last successfully fetched value.
    Exhausted(T),
    /// Attempts ran out without a single successful fetch.
    Failed(RemoteError),
}

impl<T> Waited<T> {
    /// The freshest value, or `fallback` if nothing was ever fetched.
    pub fn or(self, fallback: T) -> T {
        match self {
            Waited::Ready(v) | Waited::Exhausted(v) => v,
            Waited::Failed(_) => fallback,
        }
    }
}

/// Call `fetch` up to `policy.attempts` times, sleeping `policy.interval`
/// between calls, until `ready` accepts the value. Fetch errors use up an
/// attempt and are logged.
pub fn poll<T, F, P>(policy: &WaitPolicy, what: &str, mut fetch: F, mut ready: P) -> Waited<T>
where
    F: FnMut() -> Result<T, RemoteError>,
    P: FnMut(&T) -> bool,
{
    let mut last: Option<T> = None;
    let mut last_err = None;
    for attempt in 1..=policy.attempts.max(1) {
        match fetch() {
            Ok(v) if ready(&v) => return Waited::Ready(v),
            Ok(v) => {
                if attempt == 1 {
                    tracing::info!(%what, "waiting for remote to become ready");
                } else if attempt % 60 == 0 {
                    tracing::info!(%what, waited_secs = (policy.interval * attempt).as_secs(), "still waiting");
                }
                last = Some(v);
            }
            Err(e) => {
                tracing::warn!(%what, attempt, error = %e, "refresh failed");
                last_err = Some(e);
            }
        }
        if attempt < policy.attempts && !policy.interval.is_zero() {
            thread::sleep(policy.interval);
        }
    }
    tracing::warn!(%what, attempts = policy.attempts, "gave up waiting, results may be inconsistent");
    match (last, last_err) {
        (Some(v), _) => Waited::Exhausted(v),
        (None, Some(e)) => Waited::Failed(e),
        (None, None) => Waited::Failed(RemoteError::rejected(format!("no state fetched for {what}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const FAST: WaitPolicy = WaitPolicy::new(5, Duration::ZERO);

    #[test]
    fn ready_after_a_few_polls() {
        let mut n = 0;
        let w = poll(&FAST, "x", || { n += 1; Ok(n) }, |v| *v >= 3);
        assert!(matches!(w, Waited::Ready(3)));
    }

    #[test]
    fn exhaustion_keeps_last_value() {
        let mut n = 0;
        let w = poll(&FAST, "x", || { n += 1; Ok(n) }, |_| false);
        assert!(matches!(w, Waited::Exhausted(5)));
        assert_eq!(n, 5);
    }

    #[test]
    fn errors_consume_attempts() {
        let w: Waited<u32> =
            poll(&FAST, "x", || Err(RemoteError::Transport { message: "down".into() }), |_| true);
        assert!(matches!(w, Waited::Failed(RemoteError::Transport { .. })));
    }
}
