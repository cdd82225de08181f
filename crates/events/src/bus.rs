//! Event publishing/subscription abstraction (mechanics only).
//!
//! The bus is the seam between the ledger and anything that reacts to committed
//! changes: the hardware bridge that lights the LED of a released compartment,
//! a storefront cache, a test probe.
//!
//! ## Delivery contract
//!
//! - **After commit**: publishers call `publish` only once the ledger
//!   transaction has committed. A publish failure never rolls anything back.
//! - **Fire-and-forget**: there is no acknowledgment. Callers log a failed
//!   publish and carry on.
//! - **No ordering guarantee** relative to other writers of the ledger.

use std::sync::Arc;
use std::sync::mpsc::Receiver;
use std::time::Duration;

/// A subscription to the notification stream.
///
/// Each subscription receives its own copy of every message published after it
/// was created (broadcast semantics). Intended for a single consuming thread.
#[derive(Debug)]
pub struct Subscription<M> {
    receiver: Receiver<M>,
}

impl<M> Subscription<M> {
    pub fn new(receiver: Receiver<M>) -> Self {
        Self { receiver }
    }

    /// Block until the next message is available.
    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message without blocking.
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Block for up to `timeout` waiting for a message.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<M, std::sync::mpsc::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Collect everything already delivered without blocking.
    pub fn drain(&self) -> Vec<M> {
        self.receiver.try_iter().collect()
    }
}

/// Publish/subscribe sink for committed warehouse events.
pub trait EventBus<M>: Send + Sync {
    type Error: core::fmt::Debug + Send + Sync + 'static;

    fn publish(&self, message: M) -> Result<(), Self::Error>;

    fn subscribe(&self) -> Subscription<M>;
}

impl<M, B> EventBus<M> for Arc<B>
where
    B: EventBus<M> + ?Sized,
{
    type Error = B::Error;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        (**self).publish(message)
    }

    fn subscribe(&self) -> Subscription<M> {
        (**self).subscribe()
    }
}

/// A bus with no hardware bridge behind it: publishes are logged and dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullEventBus;

impl<M> EventBus<M> for NullEventBus
where
    M: core::fmt::Debug + Send + 'static,
{
    type Error = core::convert::Infallible;

    fn publish(&self, message: M) -> Result<(), Self::Error> {
        tracing::debug!(?message, "no notification sink configured; dropping");
        Ok(())
    }

    fn subscribe(&self) -> Subscription<M> {
        // The sender is dropped immediately, so the subscription reports
        // disconnection on the first receive.
        let (_tx, rx) = std::sync::mpsc::channel();
        Subscription::new(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_bus_accepts_everything_and_delivers_nothing() {
        let bus = NullEventBus;
        let sub = EventBus::<u32>::subscribe(&bus);
        bus.publish(7u32).unwrap();
        assert!(matches!(
            sub.try_recv(),
            Err(std::sync::mpsc::TryRecvError::Disconnected)
        ));
    }
}
