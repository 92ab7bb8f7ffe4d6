//! Interface event adapter
//!
//! Turns the TCP/IP stack's status/link callbacks into manager events.
//! The stack calls back with the full interface state; the adapter
//! compares it against the last state it saw and only forwards what
//! changed.

use core::cell::Cell;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use netconn_hal::network::{NetifCallback, NetifSnapshot};

use super::notify::{Mailbox, NetEvent};

/// Events implied by moving from `previous` to `current`
pub fn changes(previous: &NetifSnapshot, current: &NetifSnapshot) -> NetEvent {
    let mut events = NetEvent::empty();

    if previous.is_up() != current.is_up() {
        events |= if current.is_up() {
            NetEvent::INTERFACE_UP
        } else {
            NetEvent::INTERFACE_DOWN
        };
    }

    if previous.is_link_up() != current.is_link_up() {
        events |= if current.is_link_up() {
            NetEvent::LINK_UP
        } else {
            NetEvent::LINK_DOWN
        };
    }

    if previous.ipv4 != current.ipv4 {
        events |= NetEvent::IP_ADDRESS_CHANGED;
    }

    events
}

/// Stack callback that forwards interface changes to the manager
///
/// Starts from an all-down view, so the first callback reports every
/// "up" it sees.
pub struct InterfaceObserver<'a> {
    last: Mutex<CriticalSectionRawMutex, Cell<NetifSnapshot>>,
    events: &'a Mailbox,
}

impl<'a> InterfaceObserver<'a> {
    pub const fn new(events: &'a Mailbox) -> Self {
        Self {
            last: Mutex::new(Cell::new(NetifSnapshot::DOWN)),
            events,
        }
    }

    /// Last interface state reported by the stack
    pub fn last_seen(&self) -> NetifSnapshot {
        self.last.lock(|cell| cell.get())
    }
}

impl NetifCallback for InterfaceObserver<'_> {
    fn on_netif_changed(&self, snapshot: NetifSnapshot) {
        let previous = self.last.lock(|cell| cell.replace(snapshot));
        let events = changes(&previous, &snapshot);

        if events.is_empty() {
            return;
        }

        trace!("Interface change events: {:#x}", events.bits());
        if self.events.set(events).is_err() {
            debug!("Interface change before the connection manager started");
        }
    }
}
