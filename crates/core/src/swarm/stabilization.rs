//! Stabilization run daemons to maintain the ring.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Weak;
use std::time::Duration;

use futures::future::FutureExt;
use futures::pin_mut;
use futures::select;
use futures_timer::Delay;

use crate::error::Error;
use crate::error::Result;
use crate::swarm::Swarm;

/// The stabilization runner.
#[derive(Clone)]
pub struct Stabilizer {
    swarm: Weak<Swarm>,
}

impl Stabilizer {
    /// Create a new stabilization runner.
    pub fn new(swarm: Weak<Swarm>) -> Self {
        Self { swarm }
    }

    fn swarm(&self) -> Result<Arc<Swarm>> {
        self.swarm.upgrade().ok_or(Error::SwarmStopped)
    }

    /// Run stabilization once, unless a run is in flight already.
    pub async fn stabilize(&self) -> Result<()> {
        let swarm = self.swarm()?;
        if swarm.polling.swap(true, Ordering::SeqCst) {
            tracing::debug!("{} skips tick: previous one still running", swarm.did);
            return Ok(());
        }
        let ret = self.run(&swarm).await;
        swarm.polling.store(false, Ordering::SeqCst);
        ret
    }

    async fn run(&self, swarm: &Swarm) -> Result<()> {
        let mut first: Option<Error> = None;

        tracing::debug!("STABILIZATION poll start");
        let poll_timeout = swarm.config.swarm.node_poll_timeout;
        {
            let poll = swarm.node.poll(swarm).fuse();
            let deadline = Delay::new(Duration::from_millis(poll_timeout)).fuse();
            pin_mut!(poll, deadline);
            select! {
                polled = poll => if let Err(e) = polled {
                    tracing::error!("[stabilize] Failed on poll {}", e);
                    first.get_or_insert(e);
                },
                _ = deadline => {
                    tracing::warn!("[stabilize] poll exceeded {}ms", poll_timeout);
                }
            }
        }
        tracing::debug!("STABILIZATION poll end");

        if let Err(e) = self.adjust_finger_size(swarm).await {
            tracing::error!("[stabilize] Failed on adjust finger size {}", e);
            first.get_or_insert(e);
        }
        if let Err(e) = swarm.hub.check_timeouts() {
            tracing::error!("[stabilize] Failed on check timeouts {}", e);
            first.get_or_insert(e);
        }
        swarm.hub.recycle().await;

        match first {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Keep the link count within bounds once the ring view stopped changing:
    /// drop the last finger while too many links live, add one while too few do.
    pub async fn adjust_finger_size(&self, swarm: &Swarm) -> Result<()> {
        let state = swarm.node.state_digest()?;
        let check_length = swarm.config.swarm.node_state_check_length;
        let stable = {
            let mut states = swarm
                .node_states
                .lock()
                .map_err(|_| Error::DHTSyncLockError)?;
            states.push_back(state);
            while states.len() > check_length {
                states.pop_front();
            }
            states.len() == check_length && states.iter().all(|s| Some(s) == states.front())
        };
        if !stable {
            return Ok(());
        }

        let conns = swarm.hub.len();
        let size = swarm.node.finger_len()?;
        let cfg = &swarm.config.swarm;
        let ceiling = cfg
            .max_node_finger_size
            .min(swarm.config.node.finger_table_size);
        if conns > cfg.max_hub_conn_count && size > cfg.min_node_finger_size {
            swarm.node.pop_finger()?;
            tracing::info!("{} reducing finger size to {}", swarm.did, size - 1);
        } else if conns < cfg.min_hub_conn_count && size < ceiling {
            swarm.node.fix_finger(size, swarm).await?;
            tracing::info!("{} increasing finger size to {}", swarm.did, size + 1);
        } else {
            return Ok(());
        }
        swarm
            .node_states
            .lock()
            .map_err(|_| Error::DHTSyncLockError)?
            .clear();
        Ok(())
    }

    /// Run stabilization in a loop until the swarm stops.
    pub async fn wait(self: Arc<Self>, interval: Duration) {
        loop {
            {
                let Ok(swarm) = self.swarm() else {
                    return;
                };
                let timeout = Delay::new(interval).fuse();
                let stopped = swarm.stop_notify.notified().fuse();
                pin_mut!(timeout, stopped);
                select! {
                    _ = timeout => {},
                    _ = stopped => {},
                }
                if !swarm.is_started() {
                    tracing::debug!("{} stabilization ends", swarm.did);
                    return;
                }
            }
            if let Err(e) = self.stabilize().await {
                if let Ok(swarm) = self.swarm() {
                    swarm.report_error(e);
                }
            }
        }
    }
}
