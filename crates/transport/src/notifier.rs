//! This module contains the [Notifier] struct.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::task::Context;
use std::task::Poll;
use std::time::Duration;

#[derive(Default)]
struct NotifierState {
    /// Indicates whether state has woken.
    woken: bool,

    /// The wakers associated with State.
    wakers: Vec<std::task::Waker>,
}

/// A notifier that can be woken by calling `wake` or `set_timeout`.
/// Used to wait for a connection to settle in
/// [ConnectionInterface::wait_for_data_channel_open](crate::core::transport::ConnectionInterface::wait_for_data_channel_open).
#[derive(Clone, Default)]
pub struct Notifier(Arc<Mutex<NotifierState>>);

impl Notifier {
    fn state(&self) -> MutexGuard<'_, NotifierState> {
        // The state is a flag and a waker list, both valid after a panic elsewhere.
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Immediately wake the notifier.
    pub fn wake(&self) {
        let mut state = self.state();
        state.woken = true;
        for waker in state.wakers.drain(..) {
            waker.wake();
        }
    }

    /// Whether the notifier has been woken.
    pub fn is_woken(&self) -> bool {
        self.state().woken
    }

    /// Wake the notifier after the specified time.
    pub fn set_timeout(&self, timeout: Duration) {
        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            this.wake();
        });
    }
}

impl Future for Notifier {
    type Output = ();
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.state();

        if state.woken {
            return Poll::Ready(());
        }

        state.wakers.push(cx.waker().clone());
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_notifier() {
        let notifier = Notifier::default();
        notifier.set_timeout(Duration::from_millis(200));

        let mut jobs = vec![];

        // Await three times.
        for _ in 0..3 {
            let notifier_clone = notifier.clone();
            jobs.push(tokio::spawn(async move {
                notifier_clone.await;
            }));
        }

        // Await three times after wake.
        for _ in 0..3 {
            let notifier_clone = notifier.clone();
            jobs.push(tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(400)).await;
                notifier_clone.await;
            }));
        }

        futures::future::join_all(jobs).await;
        assert!(notifier.is_woken());
        notifier.await;
    }

    #[tokio::test]
    async fn test_wake_before_await() {
        let notifier = Notifier::default();
        notifier.wake();
        tokio::time::timeout(Duration::from_millis(50), notifier)
            .await
            .expect("woken notifier should be ready");
    }
}
