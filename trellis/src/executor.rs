//! Combinators for emitters whose listeners return futures.
//!
//! Dispatch itself is synchronous. When `R` is a future, `emit` hands back
//! one pending result per listener and these helpers fold that sequence
//! into a single future.
//!
//! ```rust
//! use trellis::{Emitter, executor::{self, Pending}};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> trellis::Result {
//! let emitter = Emitter::<u32, Pending<u32>>::default();
//! emitter.on("job.done", |msg| {
//!     let n = *msg.payload();
//!     Ok(Box::pin(async move { n * 2 }) as Pending<u32>)
//! })?;
//!
//! let pending = emitter.emit("job.done", 21)?;
//! let settled = executor::settle_all(pending).await;
//! assert_eq!(settled[0].as_ref().ok(), Some(&42));
//! # Ok(())
//! # }
//! ```

use std::future::Future;

use futures_util::future::{LocalBoxFuture, join_all, select_all};

use crate::Outcome;

/// A boxed, single-threaded listener future.
pub type Pending<T> = LocalBoxFuture<'static, T>;

/// Await every pending slot. Slots that already failed keep their error.
/// Order matches the input order.
pub async fn settle_all<F>(outcomes: Vec<Outcome<F>>) -> Vec<Outcome<F::Output>>
where
    F: Future,
{
    join_all(outcomes.into_iter().map(|outcome| async move {
        match outcome {
            Ok(pending) => Ok(pending.await),
            Err(e) => Err(e),
        }
    }))
    .await
}

/// Resolve with the first slot to settle.
///
/// A slot that already failed has settled, so the earliest failed slot wins
/// without polling anything. Returns `None` for an empty sequence.
pub async fn race<F>(outcomes: Vec<Outcome<F>>) -> Option<Outcome<F::Output>>
where
    F: Future,
{
    let mut pending = Vec::with_capacity(outcomes.len());
    for outcome in outcomes {
        match outcome {
            Ok(future) => pending.push(Box::pin(future)),
            Err(e) => return Some(Err(e)),
        }
    }
    if pending.is_empty() {
        return None;
    }
    let (output, _, _) = select_all(pending).await;
    Some(Ok(output))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::sleep;

    use super::*;
    use crate::{Config, Emitter};

    fn emitter() -> Emitter<u64, Pending<u64>> {
        let emitter = Emitter::default();
        for delay in [30, 10, 20] {
            emitter
                .on("work", move |msg| {
                    let n = *msg.payload();
                    Ok(Box::pin(async move {
                        sleep(Duration::from_millis(delay)).await;
                        n + delay
                    }) as Pending<u64>)
                })
                .unwrap();
        }
        emitter
    }

    #[tokio::test(start_paused = true)]
    async fn settle_all_keeps_listener_order() {
        let settled = settle_all(emitter().emit("work", 1).unwrap()).await;
        let values: Vec<u64> = settled.into_iter().map(|o| o.unwrap()).collect();
        assert_eq!(values, vec![31, 11, 21]);
    }

    #[tokio::test(start_paused = true)]
    async fn race_returns_fastest_listener() {
        let winner = race(emitter().emit("work", 1).unwrap()).await;
        assert_eq!(winner.unwrap().unwrap(), 11);
    }

    #[tokio::test]
    async fn race_of_nothing_is_none() {
        let emitter = Emitter::<u64, Pending<u64>>::default();
        let outcomes = emitter.emit("idle", 0).unwrap();
        assert!(race(outcomes).await.is_none());
    }

    #[tokio::test]
    async fn failed_slots_survive_settling() {
        let emitter = Emitter::<u64, Pending<u64>>::new(Config::default());
        emitter.on("mixed", |_| Err("refused".into())).unwrap();
        emitter
            .on("mixed", |msg| {
                let n = *msg.payload();
                Ok(Box::pin(async move { n }) as Pending<u64>)
            })
            .unwrap();

        let settled = settle_all(emitter.emit("mixed", 5).unwrap()).await;
        assert_eq!(settled.len(), 2);
        assert_eq!(settled[0].as_ref().unwrap_err().cause().to_string(), "refused");
        assert_eq!(settled[1].as_ref().ok(), Some(&5));

        let first = race(emitter.emit("mixed", 5).unwrap()).await.unwrap();
        assert!(first.is_err());
    }
}
