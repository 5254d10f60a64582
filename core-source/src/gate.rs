//! # Initialization Gate
//!
//! One-shot barrier that holds resolution requests until startup plugin
//! loading finishes. It leaves `Pending` exactly once, either to `Open` or
//! to `Abandoned`, and never goes back.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Pending,
    Open,
    /// Startup ended without opening the gate.
    Abandoned,
}

#[derive(Debug, Clone)]
pub struct InitGate {
    state: Arc<watch::Sender<GateState>>,
}

impl InitGate {
    pub fn new() -> Self {
        let (state, _) = watch::channel(GateState::Pending);
        Self {
            state: Arc::new(state),
        }
    }

    /// Opens the gate. Returns `true` only for the call that opened it.
    pub fn open(&self) -> bool {
        let opened = self.transition(GateState::Open);
        if opened {
            debug!("Initialization gate opened");
        }
        opened
    }

    /// Marks startup as failed. Has no effect once the gate is open.
    pub fn abandon(&self) -> bool {
        let abandoned = self.transition(GateState::Abandoned);
        if abandoned {
            warn!("Initialization gate abandoned");
        }
        abandoned
    }

    pub fn state(&self) -> GateState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == GateState::Open
    }

    /// Suspends until the gate leaves `Pending`.
    pub async fn wait(&self) -> GateState {
        let mut rx = self.state.subscribe();
        let state = match rx.wait_for(|state| *state != GateState::Pending).await {
            Ok(state) => *state,
            // The sender lives in `self`, so this cannot close while waiting.
            Err(_) => GateState::Abandoned,
        };
        state
    }

    /// Like [`wait`](Self::wait), but gives up after `timeout` and reports
    /// the state seen at that point.
    pub async fn wait_timeout(&self, timeout: Option<Duration>) -> GateState {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, self.wait())
                .await
                .unwrap_or_else(|_| self.state()),
            None => self.wait().await,
        }
    }

    /// Guard that abandons the gate if dropped before [`InitGuard::open`].
    pub fn guard(&self) -> InitGuard {
        InitGuard {
            gate: self.clone(),
            done: false,
        }
    }

    fn transition(&self, to: GateState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == GateState::Pending {
                *state = to;
                true
            } else {
                false
            }
        })
    }
}

impl Default for InitGate {
    fn default() -> Self {
        Self::new()
    }
}

pub struct InitGuard {
    gate: InitGate,
    done: bool,
}

impl InitGuard {
    pub fn open(mut self) -> bool {
        self.done = true;
        self.gate.open()
    }
}

impl Drop for InitGuard {
    fn drop(&mut self) {
        if !self.done {
            self.gate.abandon();
        }
    }
}
