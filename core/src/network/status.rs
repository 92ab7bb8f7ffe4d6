//! Co-processor status bridge
//!
//! The co-processor transport reports coarse connection status changes
//! from its own context. The bridge caches the latest value and signals
//! `STATUS_UPDATED` to the connection manager; all decisions about what
//! the new status means are taken in the manager's own task.
//!
//! The transport's status callback is the only writer of the cached
//! status. Everything else reads it through [`StatusBridge::current`].

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use embassy_time::{Duration, Instant};

use super::notify::{Mailbox, NetEvent, Waiter};

/// Connection status as reported by the co-processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectionStatus {
    None,
    StationDown,
    StationUp,
    StationGotIp,
    ApDown,
    ApUp,
    /// Status code outside the known set
    Unknown(u8),
}

impl ConnectionStatus {
    /// Decode a raw status code from the co-processor
    pub const fn from_raw(code: u8) -> Self {
        match code {
            0 => Self::None,
            1 => Self::StationDown,
            2 => Self::StationUp,
            3 => Self::StationGotIp,
            4 => Self::ApDown,
            5 => Self::ApUp,
            other => Self::Unknown(other),
        }
    }

    pub const fn to_raw(self) -> u8 {
        match self {
            Self::None => 0,
            Self::StationDown => 1,
            Self::StationUp => 2,
            Self::StationGotIp => 3,
            Self::ApDown => 4,
            Self::ApUp => 5,
            Self::Unknown(code) => code,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "None",
            Self::StationDown => "Station Down",
            Self::StationUp => "Station Up",
            Self::StationGotIp => "Station Got IP",
            Self::ApDown => "AP Down",
            Self::ApUp => "AP Up",
            Self::Unknown(_) => "Unknown",
        }
    }

    /// Radio link can carry traffic
    pub const fn is_link_usable(self) -> bool {
        matches!(self, Self::StationUp | Self::StationGotIp | Self::ApUp)
    }

    /// Associated with an access point as a station
    pub const fn is_station_connected(self) -> bool {
        matches!(self, Self::StationUp | Self::StationGotIp)
    }

    /// A station association attempt is allowed from this status
    pub const fn needs_association(self) -> bool {
        matches!(self, Self::None | Self::StationDown)
    }
}

/// Caches the co-processor status and forwards changes to the manager
pub struct StatusBridge<'a> {
    status: Mutex<CriticalSectionRawMutex, Cell<ConnectionStatus>>,
    events: &'a Mailbox,
}

impl<'a> StatusBridge<'a> {
    pub const fn new(events: &'a Mailbox) -> Self {
        Self {
            status: Mutex::new(Cell::new(ConnectionStatus::None)),
            events,
        }
    }

    /// Status callback for the co-processor transport
    ///
    /// Called from the transport's event context on every status change.
    pub fn on_status_changed(&self, status: ConnectionStatus) {
        let previous = self.status.lock(|cell| cell.replace(status));

        debug!(
            "Co-processor status notification: {} -> {}",
            previous.as_str(),
            status.as_str()
        );

        if self.events.set(NetEvent::STATUS_UPDATED).is_err() {
            debug!("Status update before the connection manager started");
        }
    }

    /// Status callback taking the co-processor's raw status code
    pub fn on_raw_status(&self, code: u8) {
        self.on_status_changed(ConnectionStatus::from_raw(code));
    }

    pub fn current(&self) -> ConnectionStatus {
        self.status.lock(|cell| cell.get())
    }

    /// Wait until the status equals `target`
    ///
    /// Returns false if `timeout` runs out first.
    pub async fn wait_for_status(
        &self,
        waiter: &mut Waiter<'_>,
        target: ConnectionStatus,
        timeout: Duration,
    ) -> bool {
        self.wait_until(waiter, |status| status == target, timeout)
            .await
    }

    /// Wait until `accept` holds for the current status
    ///
    /// Status updates consumed while waiting are posted back to the
    /// mailbox on return so the manager loop still handles them.
    pub async fn wait_until(
        &self,
        waiter: &mut Waiter<'_>,
        mut accept: impl FnMut(ConnectionStatus) -> bool,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut consumed = false;

        while !accept(self.current()) {
            let Some(remaining) = remaining_until(deadline) else {
                break;
            };
            if !waiter
                .wait_all(NetEvent::STATUS_UPDATED, remaining)
                .await
                .is_empty()
            {
                consumed = true;
            }
        }

        if consumed {
            waiter.repost(NetEvent::STATUS_UPDATED);
        }
        accept(self.current())
    }

    /// Wait for a status report that satisfies `accept`
    ///
    /// Only updates still pending on the mailbox or delivered during the
    /// wait count; the cached status on its own never satisfies it.
    /// Consumed updates are posted back on return.
    pub async fn wait_for_report(
        &self,
        waiter: &mut Waiter<'_>,
        mut accept: impl FnMut(ConnectionStatus) -> bool,
        timeout: Duration,
    ) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        let mut consumed = false;
        let mut accepted = false;

        while let Some(remaining) = remaining_until(deadline) {
            if waiter
                .wait_all(NetEvent::STATUS_UPDATED, remaining)
                .await
                .is_empty()
            {
                continue;
            }
            consumed = true;
            if accept(self.current()) {
                accepted = true;
                break;
            }
        }

        if consumed {
            waiter.repost(NetEvent::STATUS_UPDATED);
        }
        accepted
    }
}

/// Time left before `deadline`, `None` once it has passed
fn remaining_until(deadline: Option<Instant>) -> Option<Duration> {
    match deadline {
        Some(at) => {
            let now = Instant::now();
            (now < at).then(|| at - now)
        }
        None => Some(Duration::MAX),
    }
}
