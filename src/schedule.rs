// src/schedule.rs
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

/// Whether the shutdown signal has fired
pub fn is_shutdown(shutdown_rx: &watch::Receiver<bool>) -> bool {
    *shutdown_rx.borrow() || shutdown_rx.has_changed().is_err()
}

/// Run `f` straight away and then every `period` until shutdown.
///
/// Shutdown is checked before the first run and while waiting between runs;
/// a run in progress is never interrupted. Runs do not overlap: a tick that
/// falls due during a long run fires as soon as that run finishes. A zero
/// period runs `f` once.
pub async fn every<F, Fut>(period: Duration, mut shutdown_rx: watch::Receiver<bool>, mut f: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    if is_shutdown(&shutdown_rx) {
        return;
    }
    f().await;

    if period.is_zero() {
        return;
    }

    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

    loop {
        tokio::select! {
            biased;
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    return;
                }
            }
            _ = ticker.tick() => {
                if is_shutdown(&shutdown_rx) {
                    return;
                }
                f().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl FnMut() -> std::future::Ready<()>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (count, move || {
            c.fetch_add(1, Ordering::SeqCst);
            std::future::ready(())
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_runs_immediately_then_periodically() {
        let (count, f) = counter();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(every(Duration::from_secs(10), rx, f));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert_eq!(count.load(Ordering::SeqCst), 4);

        tx.send(true).unwrap();
        handle.await.unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_every_already_shut_down() {
        let (count, f) = counter();
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        every(Duration::from_secs(10), rx, f).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_every_sender_dropped() {
        let (count, f) = counter();
        let (tx, rx) = watch::channel(false);
        drop(tx);
        every(Duration::from_secs(10), rx, f).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_every_zero_period_runs_once() {
        let (count, f) = counter();
        let (_tx, rx) = watch::channel(false);
        every(Duration::ZERO, rx, f).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
