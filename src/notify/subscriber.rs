//! Fan-out of committed configurations to subscriber channels.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{SendTimeoutError, TryRecvError};
use tokio_util::sync::CancellationToken;

/// Buffering and back-pressure settings for subscriber channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastPolicy {
    /// Values buffered per subscriber before a send has to wait (minimum 1).
    pub capacity: usize,
    /// How long a send waits for buffer space; `None` waits indefinitely.
    pub send_timeout: Option<Duration>,
}

impl Default for BroadcastPolicy {
    fn default() -> Self {
        Self {
            capacity: 16,
            send_timeout: Some(Duration::from_secs(5)),
        }
    }
}

/// Receiving end of a subscription to one configuration name.
///
/// Yields every configuration committed after the subscription was created,
/// in commit order. `recv` returns `None` once the watch task for the name
/// has stopped.
pub struct Subscription<T> {
    rx: mpsc::Receiver<Arc<T>>,
}

impl<T> Subscription<T> {
    /// A subscription that is already closed.
    pub(crate) fn closed() -> Self {
        let (_, rx) = mpsc::channel(1);
        Self { rx }
    }

    /// Wait for the next committed configuration.
    pub async fn recv(&mut self) -> Option<Arc<T>> {
        self.rx.recv().await
    }

    /// Take a configuration that has already been delivered, without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<T>> {
        match self.rx.try_recv() {
            Ok(value) => Some(value),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Give up the wrapper and use the channel directly.
    pub fn into_inner(self) -> mpsc::Receiver<Arc<T>> {
        self.rx
    }
}

/// Outcome of delivering one value to every subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    /// Subscribers that received the value.
    pub delivered: usize,
    /// Subscribers skipped because their buffer stayed full past the timeout.
    pub timed_out: usize,
    /// Subscribers whose receiver was dropped.
    pub closed: usize,
    /// Whether delivery stopped early because of cancellation.
    pub cancelled: bool,
}

/// Subscriber channels for one configuration name.
///
/// # Examples
///
/// ```rust
/// use livecfg::notify::{BroadcastPolicy, Broadcaster};
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
///
/// # async fn example() {
/// let policy = BroadcastPolicy::default();
/// let mut broadcaster = Broadcaster::new();
/// let mut subscription = broadcaster.subscribe(policy.capacity);
///
/// let delivery = broadcaster
///     .broadcast(&Arc::new(42), &policy, &CancellationToken::new())
///     .await;
/// assert_eq!(delivery.delivered, 1);
/// assert_eq!(*subscription.recv().await.unwrap(), 42);
/// # }
/// ```
pub struct Broadcaster<T> {
    senders: Vec<mpsc::Sender<Arc<T>>>,
}

impl<T> Broadcaster<T> {
    /// Create a broadcaster without subscribers.
    pub fn new() -> Self {
        Self {
            senders: Vec::new(),
        }
    }

    /// Add a subscriber with a buffer of `capacity` values.
    pub fn subscribe(&mut self, capacity: usize) -> Subscription<T> {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        self.senders.push(tx);
        Subscription { rx }
    }

    /// Number of subscribers, including ones dropped since the last prune.
    pub fn len(&self) -> usize {
        self.senders.len()
    }

    /// Whether there is no subscriber.
    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }

    /// Forget subscribers whose receiver was dropped.
    pub fn prune(&mut self) {
        self.senders.retain(|tx| !tx.is_closed());
    }

    /// Handles to the current subscribers, in subscription order.
    pub(crate) fn senders(&self) -> Vec<mpsc::Sender<Arc<T>>> {
        self.senders.clone()
    }

    /// Deliver `value` to every subscriber.
    pub async fn broadcast(
        &self,
        value: &Arc<T>,
        policy: &BroadcastPolicy,
        cancel: &CancellationToken,
    ) -> Delivery {
        deliver(&self.senders, value, policy, cancel).await
    }
}

impl<T> Default for Broadcaster<T> {
    fn default() -> Self {
        Self::new()
    }
}

enum Failure {
    TimedOut,
    Closed,
}

/// Send `value` to each sender in order, one at a time.
///
/// A send waits for buffer space up to the policy timeout. Cancellation
/// interrupts a waiting send and skips the remaining subscribers.
pub(crate) async fn deliver<T>(
    senders: &[mpsc::Sender<Arc<T>>],
    value: &Arc<T>,
    policy: &BroadcastPolicy,
    cancel: &CancellationToken,
) -> Delivery {
    let mut delivery = Delivery::default();

    for (index, sender) in senders.iter().enumerate() {
        let send = async {
            match policy.send_timeout {
                Some(timeout) => sender
                    .send_timeout(Arc::clone(value), timeout)
                    .await
                    .map_err(|e| match e {
                        SendTimeoutError::Timeout(_) => Failure::TimedOut,
                        SendTimeoutError::Closed(_) => Failure::Closed,
                    }),
                None => sender
                    .send(Arc::clone(value))
                    .await
                    .map_err(|_| Failure::Closed),
            }
        };

        let outcome = tokio::select! {
            biased;
            outcome = send => outcome,
            _ = cancel.cancelled() => {
                delivery.cancelled = true;
                break;
            }
        };

        match outcome {
            Ok(()) => {
                tracing::trace!(subscriber = index, "signaled new conf");
                delivery.delivered += 1;
            }
            Err(Failure::TimedOut) => {
                tracing::warn!(
                    subscriber = index,
                    timeout = ?policy.send_timeout,
                    "subscriber did not drain its channel, value dropped for it"
                );
                delivery.timed_out += 1;
            }
            Err(Failure::Closed) => delivery.closed += 1,
        }
    }

    delivery
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(capacity: usize, timeout_ms: Option<u64>) -> BroadcastPolicy {
        BroadcastPolicy {
            capacity,
            send_timeout: timeout_ms.map(Duration::from_millis),
        }
    }

    #[tokio::test]
    async fn test_subscribe_and_broadcast() {
        let policy = BroadcastPolicy::default();
        let mut broadcaster = Broadcaster::new();
        let mut sub = broadcaster.subscribe(policy.capacity);

        let token = CancellationToken::new();
        broadcaster.broadcast(&Arc::new(1), &policy, &token).await;
        broadcaster.broadcast(&Arc::new(2), &policy, &token).await;

        assert_eq!(*sub.recv().await.unwrap(), 1);
        assert_eq!(*sub.recv().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let policy = BroadcastPolicy::default();
        let mut broadcaster = Broadcaster::new();
        let mut sub1 = broadcaster.subscribe(policy.capacity);
        let mut sub2 = broadcaster.subscribe(policy.capacity);

        let delivery = broadcaster
            .broadcast(&Arc::new("v1"), &policy, &CancellationToken::new())
            .await;

        assert_eq!(delivery.delivered, 2);
        assert_eq!(*sub1.recv().await.unwrap(), "v1");
        assert_eq!(*sub2.recv().await.unwrap(), "v1");
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let policy = BroadcastPolicy::default();
        let mut broadcaster = Broadcaster::new();
        let sub = broadcaster.subscribe(policy.capacity);
        let _kept = broadcaster.subscribe(policy.capacity);
        drop(sub);

        let delivery = broadcaster
            .broadcast(&Arc::new(0), &policy, &CancellationToken::new())
            .await;
        assert_eq!(delivery.closed, 1);
        assert_eq!(delivery.delivered, 1);

        broadcaster.prune();
        assert_eq!(broadcaster.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_subscriber_times_out_without_blocking_others() {
        let policy = policy(1, Some(50));
        let mut broadcaster = Broadcaster::new();
        let _stalled = broadcaster.subscribe(policy.capacity);
        let mut live = broadcaster.subscribe(policy.capacity);
        let token = CancellationToken::new();

        let first = broadcaster.broadcast(&Arc::new(1), &policy, &token).await;
        assert_eq!(first.delivered, 2);
        assert_eq!(*live.recv().await.unwrap(), 1);

        // the stalled buffer is full now
        let second = broadcaster.broadcast(&Arc::new(2), &policy, &token).await;
        assert_eq!(second.timed_out, 1);
        assert_eq!(second.delivered, 1);
        assert_eq!(*live.recv().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_blocking_send() {
        let policy = policy(1, None);
        let mut broadcaster = Broadcaster::new();
        let _stalled = broadcaster.subscribe(policy.capacity);
        let token = CancellationToken::new();

        broadcaster.broadcast(&Arc::new(1), &policy, &token).await;

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let delivery = broadcaster.broadcast(&Arc::new(2), &policy, &token).await;
        assert!(delivery.cancelled);
        assert_eq!(delivery.delivered, 0);
    }

    #[tokio::test]
    async fn test_closed_subscription() {
        let mut sub: Subscription<u8> = Subscription::closed();
        assert!(sub.recv().await.is_none());
        assert!(sub.try_recv().is_none());
    }
}
