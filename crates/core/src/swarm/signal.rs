//! Waiters of introduction handshake steps.

use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;

use crate::dht::Did;
use crate::error::Error;
use crate::error::Result;

/// Handshake steps a node waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// The target accepted the introduction.
    Ready,
    /// The offer of the initiator.
    Offer,
    /// The answer of the target.
    Answer,
}

/// Pending handshake steps, keyed by step and token. A step nobody waits for is dropped.
#[derive(Default)]
pub struct SignalBoard {
    waiters: DashMap<(SignalKind, String), oneshot::Sender<String>>,
}

/// A registered wait for one handshake step.
pub struct SignalWait<'a> {
    board: &'a SignalBoard,
    key: (SignalKind, String),
    rx: oneshot::Receiver<String>,
}

impl SignalBoard {
    /// Register a wait before the step can possibly arrive.
    pub fn expect(&self, kind: SignalKind, token: &str) -> SignalWait<'_> {
        let (tx, rx) = oneshot::channel();
        let key = (kind, token.to_string());
        self.waiters.insert(key.clone(), tx);
        SignalWait {
            board: self,
            key,
            rx,
        }
    }

    /// Complete the wait of a step, returns whether someone waited for it.
    pub fn deliver(&self, kind: SignalKind, token: &str, sdp: String) -> bool {
        match self.waiters.remove(&(kind, token.to_string())) {
            Some((_, tx)) => tx.send(sdp).is_ok(),
            None => false,
        }
    }

    /// Number of steps waited for.
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    /// Whether no step is waited for.
    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }
}

impl SignalWait<'_> {
    /// Wait for the step until `timeout` ms passed. `peer` names the other side in errors.
    pub async fn wait(mut self, timeout: u64, peer: &Did) -> Result<String> {
        match tokio::time::timeout(Duration::from_millis(timeout), &mut self.rx).await {
            Ok(Ok(sdp)) => Ok(sdp),
            _ => {
                tracing::debug!(
                    "{:?} of {} did not arrive within {}ms",
                    self.key.0,
                    self.key.1,
                    timeout
                );
                Err(Error::LinkTimeout(peer.clone()))
            }
        }
    }
}

impl Drop for SignalWait<'_> {
    fn drop(&mut self) {
        self.board.waiters.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_deliver_and_expire() {
        let board = SignalBoard::default();
        let peer = Did::from(3u32);

        let wait = board.expect(SignalKind::Offer, "t1");
        assert!(!board.deliver(SignalKind::Answer, "t1", "x".to_string()));
        assert!(board.deliver(SignalKind::Offer, "t1", "sdp".to_string()));
        assert_eq!(wait.wait(100, &peer).await.unwrap(), "sdp");
        assert!(board.is_empty());

        let wait = board.expect(SignalKind::Ready, "t2");
        assert!(matches!(
            wait.wait(10, &peer).await,
            Err(Error::LinkTimeout(_))
        ));
        assert!(board.is_empty());
        assert!(!board.deliver(SignalKind::Ready, "t2", String::new()));
    }
}
