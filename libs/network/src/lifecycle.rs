//! Socket Lifecycle State Machine
//!
//! Both adapters share one lifecycle shape:
//!
//! ```text
//! Created ─Acquire─► Binding/Connecting ─Acquired─► Ready ─Activate─► Active
//!                          │                          │                 │
//!                          └──────────CloseRequested──┴─────────────────┤
//!                                                                       ▼
//!                          Failed ◄──Fault── (any non-terminal)      Closing ─Released─► Closed
//! ```
//!
//! [`LifecycleState::on`] is a pure transition function with one arm per
//! (state, event) pair. [`Lifecycle`] wraps it with the shared bookkeeping the
//! adapters need: a `watch` channel so teardown callers can wait for release,
//! and a `broadcast` channel carrying [`AdapterEvent`] notifications.

use crate::error::{Result, TransportError};
use parking_lot::Mutex;
use std::fmt;
use std::net::SocketAddr;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

/// Notification capacity per subscriber
pub const EVENT_CHANNEL_CAPACITY: usize = 16;

/// How an endpoint is acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Bound local endpoint (ingress)
    Bind,
    /// Connected endpoint (egress)
    Connect,
}

/// Lifecycle state of one adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Created,
    /// Waiting for bind/connect confirmation
    Acquiring(Role),
    /// Endpoint usable, address resolved
    Ready,
    Active,
    /// Teardown in flight
    Closing,
    Closed,
    /// Absorbing error state
    Failed,
}

/// Inputs driving the lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    Acquire(Role),
    Acquired,
    Activate,
    CloseRequested,
    Released,
    Fault,
}

impl LifecycleState {
    /// Next state for `event`, or an error if no handler exists
    pub fn on(self, event: LifecycleEvent) -> Result<LifecycleState> {
        use LifecycleEvent as E;
        use LifecycleState as S;

        let next = match (self, event) {
            (S::Created, E::Acquire(role)) => S::Acquiring(role),
            (S::Acquiring(_), E::Acquired) => S::Ready,
            (S::Ready, E::Activate) => S::Active,

            (S::Acquiring(_) | S::Ready | S::Active, E::CloseRequested) => S::Closing,
            (S::Closing, E::CloseRequested) => S::Closing,
            (S::Closed, E::CloseRequested) => S::Closed,
            (S::Failed, E::CloseRequested) => S::Failed,

            (S::Closing, E::Released) => S::Closed,
            (S::Failed, E::Released) => S::Failed,

            (
                S::Created | S::Acquiring(_) | S::Ready | S::Active | S::Closing,
                E::Fault,
            ) => S::Failed,

            (from, event) => return Err(TransportError::InvalidTransition { from, event }),
        };

        Ok(next)
    }

    /// Closed or Failed
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Closed | LifecycleState::Failed)
    }

    /// Send/receive allowed
    pub fn is_usable(self) -> bool {
        matches!(self, LifecycleState::Ready | LifecycleState::Active)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Created => "created",
            LifecycleState::Acquiring(Role::Bind) => "binding",
            LifecycleState::Acquiring(Role::Connect) => "connecting",
            LifecycleState::Ready => "ready",
            LifecycleState::Active => "active",
            LifecycleState::Closing => "closing",
            LifecycleState::Closed => "closed",
            LifecycleState::Failed => "failed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleEvent::Acquire(Role::Bind) => "bind",
            LifecycleEvent::Acquire(Role::Connect) => "connect",
            LifecycleEvent::Acquired => "acquired",
            LifecycleEvent::Activate => "activate",
            LifecycleEvent::CloseRequested => "close requested",
            LifecycleEvent::Released => "released",
            LifecycleEvent::Fault => "fault",
        };
        f.write_str(name)
    }
}

/// Notifications published to collaborators
#[derive(Debug, Clone)]
pub enum AdapterEvent {
    /// Endpoint usable; addresses come from the live socket
    Ready {
        local: SocketAddr,
        peer: Option<SocketAddr>,
    },
    /// Fatal error; always followed by `Close`
    Error(TransportError),
    /// Endpoint released; emitted exactly once
    Close,
}

/// What a teardown caller has to do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseStep {
    /// Caller owns the teardown and must release the endpoint
    Start,
    /// Another caller is releasing; wait for it
    InFlight,
    /// Nothing left to release
    Done,
}

/// Point-in-time view published on the watch channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleSnapshot {
    pub state: LifecycleState,
    /// Endpoint released (or never acquired)
    pub released: bool,
}

/// Shared lifecycle handle owned by one adapter
#[derive(Debug)]
pub struct Lifecycle {
    name: &'static str,
    current: Mutex<LifecycleSnapshot>,
    watch: watch::Sender<LifecycleSnapshot>,
    events: broadcast::Sender<AdapterEvent>,
}

impl Lifecycle {
    /// New lifecycle in `Created` with its own notification channel
    pub fn new(name: &'static str) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self::with_events(name, events)
    }

    /// New lifecycle publishing on an existing channel
    ///
    /// Builders create the channel first so `Ready` can be observed.
    pub fn with_events(name: &'static str, events: broadcast::Sender<AdapterEvent>) -> Self {
        let initial = LifecycleSnapshot {
            state: LifecycleState::Created,
            released: false,
        };
        let (watch, _) = watch::channel(initial);

        Self {
            name,
            current: Mutex::new(initial),
            watch,
            events,
        }
    }

    pub fn state(&self) -> LifecycleState {
        self.current.lock().state
    }

    pub fn snapshot(&self) -> LifecycleSnapshot {
        *self.current.lock()
    }

    /// Receive future notifications
    pub fn subscribe(&self) -> broadcast::Receiver<AdapterEvent> {
        self.events.subscribe()
    }

    /// Watch state changes
    pub fn watch(&self) -> watch::Receiver<LifecycleSnapshot> {
        self.watch.subscribe()
    }

    /// Apply one event, publishing the new state
    pub fn apply(&self, event: LifecycleEvent) -> Result<LifecycleState> {
        let mut current = self.current.lock();
        let from = current.state;
        let to = from.on(event)?;

        if to != from {
            debug!(adapter = self.name, %from, %to, %event, "lifecycle transition");
            current.state = to;
            self.watch.send_replace(*current);
        }

        Ok(to)
    }

    /// Begin acquiring the endpoint
    pub fn begin_acquire(&self, role: Role) -> Result<()> {
        self.apply(LifecycleEvent::Acquire(role)).map(|_| ())
    }

    /// Endpoint confirmed: emit `Ready` and activate
    pub fn acquired(&self, local: SocketAddr, peer: Option<SocketAddr>) -> Result<()> {
        self.apply(LifecycleEvent::Acquired)?;
        self.emit(AdapterEvent::Ready { local, peer });
        self.apply(LifecycleEvent::Activate)?;
        Ok(())
    }

    /// Move to `Failed` and emit `Error`
    ///
    /// Returns false when the lifecycle was already terminal; the error is
    /// then only logged.
    pub fn fail(&self, error: TransportError) -> bool {
        let newly_failed = {
            let mut current = self.current.lock();
            match current.state.on(LifecycleEvent::Fault) {
                Ok(to) if to != current.state => {
                    debug!(adapter = self.name, from = %current.state, "lifecycle fault");
                    current.state = to;
                    self.watch.send_replace(*current);
                    true
                }
                _ => false,
            }
        };

        if newly_failed {
            warn!(adapter = self.name, error = %error, "adapter failed");
            self.emit(AdapterEvent::Error(error));
        } else {
            debug!(adapter = self.name, error = %error, "error after teardown ignored");
        }

        newly_failed
    }

    /// Claim the teardown
    pub fn begin_close(&self) -> Result<CloseStep> {
        let mut current = self.current.lock();
        let from = current.state;
        let to = from.on(LifecycleEvent::CloseRequested)?;

        let step = match from {
            LifecycleState::Closing => CloseStep::InFlight,
            LifecycleState::Closed => CloseStep::Done,
            LifecycleState::Failed if current.released => CloseStep::Done,
            LifecycleState::Failed => CloseStep::InFlight,
            _ => CloseStep::Start,
        };

        if to != from {
            debug!(adapter = self.name, %from, %to, "lifecycle transition");
            current.state = to;
            self.watch.send_replace(*current);
        }

        Ok(step)
    }

    /// Endpoint released: emit `Close` the first time
    pub fn released(&self) {
        let first = {
            let mut current = self.current.lock();
            if current.released {
                false
            } else {
                if let Ok(to) = current.state.on(LifecycleEvent::Released) {
                    if to != current.state {
                        debug!(adapter = self.name, from = %current.state, %to, "lifecycle transition");
                    }
                    current.state = to;
                }
                current.released = true;
                self.watch.send_replace(*current);
                true
            }
        };

        if first {
            self.emit(AdapterEvent::Close);
        }
    }

    /// Wait until the endpoint has been released
    pub async fn wait_released(&self) {
        let mut watch = self.watch.subscribe();
        // The sender lives in self, so the channel cannot close while we wait
        let _ = watch.wait_for(|snapshot| snapshot.released).await;
    }

    fn emit(&self, event: AdapterEvent) {
        // No subscribers is not an error
        let _ = self.events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn addr() -> SocketAddr {
        "127.0.0.1:44002".parse().unwrap()
    }

    #[test]
    fn test_happy_path_transitions() {
        use LifecycleEvent as E;
        use LifecycleState as S;

        let mut state = S::Created;
        for (event, expected) in [
            (E::Acquire(Role::Bind), S::Acquiring(Role::Bind)),
            (E::Acquired, S::Ready),
            (E::Activate, S::Active),
            (E::CloseRequested, S::Closing),
            (E::Released, S::Closed),
        ] {
            state = state.on(event).unwrap();
            assert_eq!(state, expected);
        }
        assert!(state.is_terminal());
    }

    #[test]
    fn test_fault_from_every_non_terminal_state() {
        for state in [
            LifecycleState::Created,
            LifecycleState::Acquiring(Role::Connect),
            LifecycleState::Ready,
            LifecycleState::Active,
            LifecycleState::Closing,
        ] {
            assert_eq!(
                state.on(LifecycleEvent::Fault).unwrap(),
                LifecycleState::Failed
            );
        }
    }

    #[test]
    fn test_invalid_transitions() {
        assert!(LifecycleState::Created
            .on(LifecycleEvent::Acquired)
            .is_err());
        assert!(LifecycleState::Active
            .on(LifecycleEvent::Acquire(Role::Bind))
            .is_err());
        assert!(LifecycleState::Closed.on(LifecycleEvent::Fault).is_err());
        assert!(LifecycleState::Failed.on(LifecycleEvent::Activate).is_err());
    }

    #[test]
    fn test_close_is_idempotent_in_terminal_states() {
        assert_eq!(
            LifecycleState::Closed
                .on(LifecycleEvent::CloseRequested)
                .unwrap(),
            LifecycleState::Closed
        );
        assert_eq!(
            LifecycleState::Failed
                .on(LifecycleEvent::CloseRequested)
                .unwrap(),
            LifecycleState::Failed
        );
    }

    #[test]
    fn test_display_names() {
        assert_eq!(LifecycleState::Acquiring(Role::Bind).to_string(), "binding");
        assert_eq!(
            LifecycleState::Acquiring(Role::Connect).to_string(),
            "connecting"
        );
        assert_eq!(LifecycleEvent::CloseRequested.to_string(), "close requested");
    }

    #[tokio::test]
    async fn test_ready_then_single_close() {
        let lifecycle = Lifecycle::new("test");
        let mut events = lifecycle.subscribe();

        lifecycle.begin_acquire(Role::Bind).unwrap();
        lifecycle.acquired(addr(), None).unwrap();
        assert_eq!(lifecycle.state(), LifecycleState::Active);

        assert_eq!(lifecycle.begin_close().unwrap(), CloseStep::Start);
        assert_eq!(lifecycle.begin_close().unwrap(), CloseStep::InFlight);
        lifecycle.released();
        lifecycle.released();
        assert_eq!(lifecycle.begin_close().unwrap(), CloseStep::Done);
        assert_eq!(lifecycle.state(), LifecycleState::Closed);

        assert!(matches!(
            events.recv().await.unwrap(),
            AdapterEvent::Ready { local, peer: None } if local == addr()
        ));
        assert!(matches!(events.recv().await.unwrap(), AdapterEvent::Close));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_failure_emits_error_then_close() {
        let lifecycle = Lifecycle::new("test");
        let mut events = lifecycle.subscribe();

        lifecycle.begin_acquire(Role::Connect).unwrap();
        lifecycle.acquired(addr(), Some(addr())).unwrap();

        let error = TransportError::io("receive", io::Error::from(io::ErrorKind::ConnectionReset));
        assert!(lifecycle.fail(error.clone()));
        assert!(!lifecycle.fail(error));
        assert_eq!(lifecycle.begin_close().unwrap(), CloseStep::InFlight);
        lifecycle.released();

        assert_eq!(lifecycle.state(), LifecycleState::Failed);
        assert_eq!(lifecycle.begin_close().unwrap(), CloseStep::Done);

        assert!(matches!(events.recv().await.unwrap(), AdapterEvent::Ready { .. }));
        assert!(matches!(events.recv().await.unwrap(), AdapterEvent::Error(_)));
        assert!(matches!(events.recv().await.unwrap(), AdapterEvent::Close));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_wait_released_wakes_waiters() {
        let lifecycle = std::sync::Arc::new(Lifecycle::new("test"));
        lifecycle.begin_acquire(Role::Bind).unwrap();
        lifecycle.acquired(addr(), None).unwrap();
        assert_eq!(lifecycle.begin_close().unwrap(), CloseStep::Start);

        let waiter = {
            let lifecycle = lifecycle.clone();
            tokio::spawn(async move { lifecycle.wait_released().await })
        };

        tokio::task::yield_now().await;
        lifecycle.released();
        waiter.await.unwrap();
        assert!(lifecycle.snapshot().released);
    }
}
