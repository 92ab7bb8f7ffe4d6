//! Notification channel: per-consumer bit-flag mailboxes
//!
//! Every consumer task owns one [`Mailbox`]. Producers OR event bits into
//! it from any context without blocking; the consumer waits, through its
//! [`Waiter`], until a target subset of bits has been observed or a
//! deadline passes.
//!
//! A wait only ever clears the bits it targets. Anything else stays
//! pending, so a later wait with a different target still observes it.
//!
//! ## Usage
//! ```ignore
//! static NET_EVENTS: Notifier<1> = Notifier::new();
//!
//! let mut waiter = NET_EVENTS.claim(NET_EVENT_INDEX)?;
//! // From a callback in another context
//! NET_EVENTS.set(NET_EVENT_INDEX, NetEvent::LINK_UP)?;
//! // In the consumer task
//! let seen = waiter.wait_all(NetEvent::LINK_UP, Duration::from_secs(5)).await;
//! ```

use core::cell::Cell;
use core::future::poll_fn;
use core::task::Poll;

use bitflags::bitflags;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::waitqueue::AtomicWaker;
use embassy_time::{with_deadline, Duration, Instant};

use super::error::NotifyError;

/// Mailbox index of the connection manager
pub const NET_EVENT_INDEX: usize = 0;

bitflags! {
    /// Events delivered to the connection manager
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NetEvent: u32 {
        /// TCP/IP stack finished its own initialization
        const LINK_STACK_READY = 0x01;
        const IP_ADDRESS_CHANGED = 0x02;
        const INTERFACE_UP = 0x04;
        const INTERFACE_DOWN = 0x08;
        const LINK_UP = 0x10;
        const LINK_DOWN = 0x20;
        /// Co-processor reported a new connection status
        const STATUS_UPDATED = 0x40;
        /// Someone asked for the access point connection to be redone
        const RECONNECT_REQUESTED = 0x80;
    }
}

#[derive(Clone, Copy)]
struct MailboxState {
    pending: u32,
    claimed: bool,
}

/// Bit-flag mailbox for a single consumer
pub struct Mailbox {
    state: Mutex<CriticalSectionRawMutex, Cell<MailboxState>>,
    waker: AtomicWaker,
}

impl Mailbox {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(Cell::new(MailboxState {
                pending: 0,
                claimed: false,
            })),
            waker: AtomicWaker::new(),
        }
    }

    /// OR `events` into the pending set and wake the consumer
    ///
    /// Never blocks. Fails only while no consumer has claimed the mailbox;
    /// the bits are then dropped, not latched for a later claim.
    pub fn set(&self, events: NetEvent) -> Result<(), NotifyError> {
        let claimed = self.state.lock(|cell| {
            let mut state = cell.get();
            if state.claimed {
                state.pending |= events.bits();
                cell.set(state);
            }
            state.claimed
        });

        if !claimed {
            return Err(NotifyError::NotClaimed);
        }
        self.waker.wake();
        Ok(())
    }

    /// Become the mailbox's only consumer
    pub fn claim(&self) -> Result<Waiter<'_>, NotifyError> {
        let newly_claimed = self.state.lock(|cell| {
            let mut state = cell.get();
            let free = !state.claimed;
            state.claimed = true;
            cell.set(state);
            free
        });

        if newly_claimed {
            Ok(Waiter { mailbox: self })
        } else {
            Err(NotifyError::AlreadyClaimed)
        }
    }

    /// Events set but not yet consumed
    pub fn pending(&self) -> NetEvent {
        NetEvent::from_bits_retain(self.state.lock(|cell| cell.get().pending))
    }

    /// Clear the `target` bits, returning the ones that were pending
    fn take(&self, target: NetEvent) -> NetEvent {
        let taken = self.state.lock(|cell| {
            let mut state = cell.get();
            let taken = state.pending & target.bits();
            state.pending &= !target.bits();
            cell.set(state);
            taken
        });
        NetEvent::from_bits_retain(taken)
    }

    fn post(&self, events: NetEvent) {
        self.state.lock(|cell| {
            let mut state = cell.get();
            state.pending |= events.bits();
            cell.set(state);
        });
        self.waker.wake();
    }
}

impl Default for Mailbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Index-addressable set of mailboxes
pub struct Notifier<const N: usize> {
    mailboxes: [Mailbox; N],
}

impl<const N: usize> Notifier<N> {
    pub const fn new() -> Self {
        Self {
            mailboxes: [const { Mailbox::new() }; N],
        }
    }

    pub fn mailbox(&self, index: usize) -> Result<&Mailbox, NotifyError> {
        self.mailboxes.get(index).ok_or(NotifyError::InvalidIndex)
    }

    /// Set `events` on the consumer at `index`
    pub fn set(&self, index: usize, events: NetEvent) -> Result<(), NotifyError> {
        self.mailbox(index)?.set(events)
    }

    /// Claim the mailbox at `index` for the calling consumer
    pub fn claim(&self, index: usize) -> Result<Waiter<'_>, NotifyError> {
        self.mailbox(index)?.claim()
    }
}

impl<const N: usize> Default for Notifier<N> {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer side of a [`Mailbox`]
pub struct Waiter<'a> {
    mailbox: &'a Mailbox,
}

impl<'a> Waiter<'a> {
    pub fn mailbox(&self) -> &'a Mailbox {
        self.mailbox
    }

    /// Wait until every bit of `target` has been observed
    ///
    /// Bits are accumulated across wake-ups, since a single wake may carry
    /// only part of the target. Returns `target` on success and the
    /// observed subset (possibly empty) once `timeout` runs out.
    /// `Duration::MAX` waits forever.
    pub async fn wait_all(&mut self, target: NetEvent, timeout: Duration) -> NetEvent {
        let deadline = Instant::now().checked_add(timeout);
        let mut observed = NetEvent::empty();

        debug!(
            "Starting wait for notification matching bitmask: {:#x}",
            target.bits()
        );

        while !observed.contains(target) {
            let delivered = match deadline {
                Some(at) => match with_deadline(at, self.next(target)).await {
                    Ok(events) => events,
                    Err(_) => {
                        debug!(
                            "Timed out while waiting for notification matching bitmask: {:#x}",
                            target.bits()
                        );
                        break;
                    }
                },
                None => self.next(target).await,
            };
            observed |= delivered;
        }

        target & observed
    }

    /// Wait until any bit of `target` is delivered
    ///
    /// Returns every target bit pending at that moment, or an empty set
    /// on timeout.
    pub async fn wait_any(&mut self, target: NetEvent, timeout: Duration) -> NetEvent {
        match Instant::now().checked_add(timeout) {
            Some(at) => with_deadline(at, self.next(target))
                .await
                .unwrap_or(NetEvent::empty()),
            None => self.next(target).await,
        }
    }

    /// Put `events` back so the next wait observes them
    pub fn repost(&self, events: NetEvent) {
        if !events.is_empty() {
            self.mailbox.post(events);
        }
    }

    /// Consume the pending `target` bits without waiting
    pub fn take_pending(&mut self, target: NetEvent) -> NetEvent {
        self.mailbox.take(target)
    }

    fn next(&self, target: NetEvent) -> impl core::future::Future<Output = NetEvent> + '_ {
        poll_fn(move |cx| {
            self.mailbox.waker.register(cx.waker());
            let delivered = self.mailbox.take(target);
            if delivered.is_empty() {
                Poll::Pending
            } else {
                Poll::Ready(delivered)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;
    use embassy_futures::join::join;
    use embassy_time::Timer;

    #[test]
    fn test_set_requires_claimed_mailbox() {
        let notifier: Notifier<2> = Notifier::new();
        assert_eq!(
            notifier.set(NET_EVENT_INDEX, NetEvent::LINK_UP),
            Err(NotifyError::NotClaimed)
        );
        assert_eq!(
            notifier.set(2, NetEvent::LINK_UP),
            Err(NotifyError::InvalidIndex)
        );

        let _waiter = notifier.claim(NET_EVENT_INDEX).unwrap();
        assert!(matches!(
            notifier.claim(NET_EVENT_INDEX),
            Err(NotifyError::AlreadyClaimed)
        ));
        assert_eq!(notifier.set(NET_EVENT_INDEX, NetEvent::LINK_UP), Ok(()));
        assert_eq!(
            notifier.set(1, NetEvent::LINK_UP),
            Err(NotifyError::NotClaimed)
        );
    }

    #[test]
    fn test_set_is_idempotent() {
        let mailbox = Mailbox::new();
        let mut waiter = mailbox.claim().unwrap();
        mailbox.set(NetEvent::LINK_UP).unwrap();
        mailbox.set(NetEvent::LINK_UP).unwrap();
        assert_eq!(mailbox.pending(), NetEvent::LINK_UP);

        let seen = block_on(waiter.wait_all(NetEvent::LINK_UP, Duration::from_millis(10)));
        assert_eq!(seen, NetEvent::LINK_UP);
        assert!(mailbox.pending().is_empty());
    }

    #[test]
    fn test_wait_all_accumulates_across_wakes() {
        let mailbox = Mailbox::new();
        let mut waiter = mailbox.claim().unwrap();
        let target = NetEvent::LINK_UP | NetEvent::IP_ADDRESS_CHANGED;

        let (seen, _) = block_on(join(
            waiter.wait_all(target, Duration::from_secs(2)),
            async {
                mailbox.set(NetEvent::LINK_UP).unwrap();
                Timer::after_millis(10).await;
                mailbox.set(NetEvent::IP_ADDRESS_CHANGED).unwrap();
            },
        ));

        assert_eq!(seen, target);
    }

    #[test]
    fn test_non_target_bits_are_preserved() {
        let mailbox = Mailbox::new();
        let mut waiter = mailbox.claim().unwrap();
        mailbox
            .set(NetEvent::STATUS_UPDATED | NetEvent::LINK_DOWN)
            .unwrap();

        let first = block_on(waiter.wait_all(NetEvent::LINK_DOWN, Duration::from_millis(50)));
        assert_eq!(first, NetEvent::LINK_DOWN);
        assert_eq!(mailbox.pending(), NetEvent::STATUS_UPDATED);

        let second = block_on(waiter.wait_all(NetEvent::STATUS_UPDATED, Duration::from_millis(50)));
        assert_eq!(second, NetEvent::STATUS_UPDATED);
        assert!(mailbox.pending().is_empty());
    }

    #[test]
    fn test_wait_all_timeout_returns_observed_subset() {
        let mailbox = Mailbox::new();
        let mut waiter = mailbox.claim().unwrap();
        mailbox.set(NetEvent::LINK_UP).unwrap();

        let started = std::time::Instant::now();
        let seen = block_on(waiter.wait_all(
            NetEvent::LINK_UP | NetEvent::IP_ADDRESS_CHANGED,
            Duration::from_millis(50),
        ));
        let elapsed = started.elapsed();

        assert_eq!(seen, NetEvent::LINK_UP);
        assert!(elapsed >= std::time::Duration::from_millis(45));
        assert!(elapsed < std::time::Duration::from_millis(500));
    }

    #[test]
    fn test_wait_all_timeout_with_nothing_observed() {
        let mailbox = Mailbox::new();
        let mut waiter = mailbox.claim().unwrap();
        mailbox.set(NetEvent::RECONNECT_REQUESTED).unwrap();

        let seen = block_on(waiter.wait_all(NetEvent::LINK_UP, Duration::from_millis(20)));
        assert!(seen.is_empty());
        assert_eq!(mailbox.pending(), NetEvent::RECONNECT_REQUESTED);
    }

    #[test]
    fn test_set_from_another_thread() {
        let notifier: Notifier<1> = Notifier::new();
        let mut waiter = notifier.claim(NET_EVENT_INDEX).unwrap();

        let seen = std::thread::scope(|s| {
            s.spawn(|| {
                std::thread::sleep(std::time::Duration::from_millis(10));
                notifier
                    .set(NET_EVENT_INDEX, NetEvent::INTERFACE_UP)
                    .unwrap();
                std::thread::sleep(std::time::Duration::from_millis(10));
                notifier.set(NET_EVENT_INDEX, NetEvent::LINK_UP).unwrap();
            });
            block_on(waiter.wait_all(
                NetEvent::INTERFACE_UP | NetEvent::LINK_UP,
                Duration::from_secs(2),
            ))
        });

        assert_eq!(seen, NetEvent::INTERFACE_UP | NetEvent::LINK_UP);
    }

    #[test]
    fn test_wait_any_returns_first_delivery() {
        let mailbox = Mailbox::new();
        let mut waiter = mailbox.claim().unwrap();
        mailbox
            .set(NetEvent::LINK_UP | NetEvent::RECONNECT_REQUESTED)
            .unwrap();

        let seen = block_on(waiter.wait_any(NetEvent::all(), Duration::from_millis(50)));
        assert_eq!(seen, NetEvent::LINK_UP | NetEvent::RECONNECT_REQUESTED);

        let none = block_on(waiter.wait_any(NetEvent::all(), Duration::from_millis(10)));
        assert!(none.is_empty());
    }

    #[test]
    fn test_repost_is_seen_by_next_wait() {
        let mailbox = Mailbox::new();
        let mut waiter = mailbox.claim().unwrap();
        waiter.repost(NetEvent::STATUS_UPDATED);

        let seen = block_on(waiter.wait_any(NetEvent::STATUS_UPDATED, Duration::from_millis(10)));
        assert_eq!(seen, NetEvent::STATUS_UPDATED);
    }

    #[test]
    fn test_take_pending_clears_only_target() {
        let mailbox = Mailbox::new();
        let mut waiter = mailbox.claim().unwrap();
        assert!(waiter.take_pending(NetEvent::STATUS_UPDATED).is_empty());

        mailbox
            .set(NetEvent::STATUS_UPDATED | NetEvent::LINK_UP)
            .unwrap();
        assert_eq!(
            waiter.take_pending(NetEvent::STATUS_UPDATED),
            NetEvent::STATUS_UPDATED
        );
        assert_eq!(mailbox.pending(), NetEvent::LINK_UP);
    }
}
