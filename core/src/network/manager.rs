//! Connection manager task
//!
//! Owns the network interface and drives it from three event sources:
//! co-processor status changes (through the [`StatusBridge`]), interface
//! changes reported by the TCP/IP stack (through the
//! [`InterfaceObserver`]) and external reconnect requests. All of them
//! arrive as [`NetEvent`] bits on the manager's mailbox; every decision
//! is taken here, in the manager's own task.
//!
//! ## Startup
//! 1. Wait (without deadline) for [`NetEvent::LINK_STACK_READY`]
//! 2. Query firmware revision and hardware address under the retry
//!    policy from [`ManagerConfig::module_query_retry`]
//! 3. Register the interface, make it default and bring it up
//!
//! ## Main loop
//! Each [`ConnectionManager::step`]:
//! 1. Attempt association if the co-processor is not associated
//! 2. Wait for any event, bounded by [`ManagerConfig::loop_timeout`]
//! 3. Mirror a changed co-processor status onto the interface link
//! 4. Reconcile address acquisition with the interface link state
//! 5. If the wait in step 2 delivered a reconnect request, disconnect and
//!    associate again in this same iteration, after reconciliation. Status
//!    changes caused by the reconnect are mirrored on the next iteration.
//!
//! The manager must claim its mailbox before the TCP/IP stack finishes
//! initializing: [`signal_stack_ready`] on an unclaimed mailbox is
//! refused and the startup gate would never open.

use core::net::Ipv4Addr;

use embassy_time::{Duration, Timer};
use netconn_hal::network::{
    ConfigStore, Coprocessor, FirmwareRevision, MacAddress, NetInterface, StackError,
    TransportError,
};

use super::config::ManagerConfig;
use super::context::TxBacklog;
use super::controller::{ConnectOutcome, ConnectionController};
use super::error::{ConnectError, StartError};
use super::netif::InterfaceObserver;
use super::notify::{Mailbox, NetEvent, Waiter};
use super::status::{ConnectionStatus, StatusBridge};

/// Connection state derived from status, interface and acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnState {
    Idle,
    /// Association requested, station up not reported yet
    Associating,
    /// Radio link usable, address acquisition not running
    Linked,
    AddressAcquiring,
    Connected,
    /// Radio link gone while the interface still holds link or address
    LinkLost,
}

impl ConnState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Associating => "Associating",
            Self::Linked => "Linked",
            Self::AddressAcquiring => "Address Acquiring",
            Self::Connected => "Connected",
            Self::LinkLost => "Link Lost",
        }
    }
}

/// What a status update did to the interface link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkAction {
    Up,
    Down,
    /// Unrecognized status, link forced up
    FailSafeUp,
}

/// What reconciliation did to address acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DhcpAction {
    Started,
    Released,
    Failed(StackError),
}

/// Outcome of one main loop iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepReport {
    /// Events delivered by this iteration's wait
    pub events: NetEvent,
    pub connect: Option<Result<ConnectOutcome, ConnectError>>,
    pub reconnect: Option<Result<ConnectOutcome, ConnectError>>,
    pub link: Option<LinkAction>,
    pub dhcp: Option<DhcpAction>,
}

/// Co-processor identity, queried once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub firmware: FirmwareRevision,
    pub mac: MacAddress,
}

/// Point-in-time view for a management surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetStatusSnapshot {
    pub state: ConnState,
    pub status: ConnectionStatus,
    /// Interface link flag
    pub link: bool,
    pub ipv4: Ipv4Addr,
    /// Address acquisition running
    pub acquiring: bool,
    /// Outbound packets waiting for the co-processor
    pub tx_pending: u32,
    pub attempts: u32,
    /// Unrecognized statuses that forced the link up
    pub fail_safe_links: u32,
}

/// Collaborators handed to [`ConnectionManager::new`]
pub struct ManagerResources<'a, T, C, I> {
    pub transport: T,
    pub store: C,
    pub netif: I,
    pub bridge: &'a StatusBridge<'a>,
    pub observer: &'a InterfaceObserver<'a>,
    /// Claimed consumer side of the manager's mailbox
    pub waiter: Waiter<'a>,
    pub tx_backlog: Option<TxBacklog<'a>>,
}

pub struct ConnectionManager<'a, T, C, I> {
    controller: ConnectionController<'a, T, C>,
    netif: I,
    bridge: &'a StatusBridge<'a>,
    observer: &'a InterfaceObserver<'a>,
    waiter: Waiter<'a>,
    tx_backlog: Option<TxBacklog<'a>>,
    config: ManagerConfig,
    module: Option<ModuleInfo>,
    /// Status last mirrored onto the interface link
    last_status: Option<ConnectionStatus>,
    dhcp_active: bool,
    /// Last association attempt was accepted but not confirmed
    associating: bool,
    fail_safe_links: u32,
}

impl<'a, T, C, I> ConnectionManager<'a, T, C, I>
where
    T: Coprocessor,
    C: ConfigStore,
    I: NetInterface<'a>,
{
    pub fn new(resources: ManagerResources<'a, T, C, I>, config: ManagerConfig) -> Self {
        let ManagerResources {
            transport,
            store,
            netif,
            bridge,
            observer,
            waiter,
            tx_backlog,
        } = resources;

        Self {
            controller: ConnectionController::new(transport, store, bridge, config.connect),
            netif,
            bridge,
            observer,
            waiter,
            tx_backlog,
            config,
            module: None,
            last_status: None,
            dhcp_active: false,
            associating: false,
            fail_safe_links: 0,
        }
    }

    /// Run the manager forever
    pub async fn run(mut self) -> ! {
        self.wait_for_stack().await;

        while let Err(e) = self.bring_up().await {
            error!("Failed to bring up network interface: {:?}", e);
            Timer::after(self.config.module_query_retry.interval).await;
        }

        loop {
            let report = self.step().await;
            trace!("Connection state: {}", self.state().as_str());
            if let Some(DhcpAction::Failed(e)) = report.dhcp {
                debug!("Address acquisition change failed: {:?}", e);
            }
        }
    }

    /// Wait for the TCP/IP stack, then bring the interface up
    pub async fn start(&mut self) -> Result<(), StartError> {
        self.wait_for_stack().await;
        self.bring_up().await
    }

    /// One-time startup gate, no deadline
    pub async fn wait_for_stack(&mut self) {
        debug!("Waiting for the TCP/IP stack");
        self.waiter
            .wait_all(NetEvent::LINK_STACK_READY, Duration::MAX)
            .await;
        info!("TCP/IP stack ready");
    }

    /// Query the module and register the interface with the stack
    pub async fn bring_up(&mut self) -> Result<(), StartError> {
        let module = self
            .query_module_info()
            .await
            .map_err(StartError::ModuleQuery)?;

        self.netif
            .register(module.mac, self.observer)
            .map_err(|e| {
                error!("Failed to register network interface: {:?}", e);
                StartError::Register(e)
            })?;
        self.module = Some(module);

        self.netif.set_default();
        self.netif.set_up();

        let status = self.bridge.current();
        if status.is_station_connected() {
            debug!("Already associated at startup: {}", status.as_str());
            self.netif.set_link_up();
            self.last_status = Some(status);
            self.start_dhcp();
        }

        Ok(())
    }

    /// Run one iteration of the main loop
    pub async fn step(&mut self) -> StepReport {
        let mut report = StepReport::default();

        if self.bridge.current().needs_association() {
            let result = self.controller.connect(&mut self.waiter).await;
            self.note_attempt(&result);
            report.connect = Some(result);
        }

        report.events = self
            .waiter
            .wait_any(NetEvent::all(), self.config.loop_timeout)
            .await;

        if report.events.is_empty() {
            trace!("No network events before the loop timeout");
        }

        report.link = self.handle_status_update();
        report.dhcp = self.reconcile();

        if report.events.contains(NetEvent::RECONNECT_REQUESTED) {
            let result = self.reconnect().await;
            self.note_attempt(&result);
            report.reconnect = Some(result);
        }

        report
    }

    /// Mirror the co-processor status onto the interface link
    ///
    /// Does nothing if the status has not changed since it was last
    /// handled.
    pub fn handle_status_update(&mut self) -> Option<LinkAction> {
        let status = self.bridge.current();
        let previous = self.last_status.replace(status);
        if previous == Some(status) {
            return None;
        }
        if previous.is_some() {
            self.associating = false;
        }

        let action = match status {
            ConnectionStatus::Unknown(code) => {
                warn!("Unknown co-processor status {}, forcing link up", code);
                self.fail_safe_links = self.fail_safe_links.wrapping_add(1);
                LinkAction::FailSafeUp
            }
            s if s.is_link_usable() => LinkAction::Up,
            _ => LinkAction::Down,
        };

        match action {
            LinkAction::Up | LinkAction::FailSafeUp => self.netif.set_link_up(),
            LinkAction::Down => self.netif.set_link_down(),
        }

        debug!("Interface link {:?} for status {}", action, status.as_str());
        Some(action)
    }

    /// Bring address acquisition in line with the interface link
    ///
    /// Link down with an address or running acquisition releases it;
    /// link up without running acquisition starts it.
    pub fn reconcile(&mut self) -> Option<DhcpAction> {
        let snapshot = self.netif.snapshot();

        if !snapshot.is_link_up() {
            if !snapshot.has_address() && !self.dhcp_active {
                return None;
            }
            return Some(match self.netif.dhcp_release_and_stop() {
                Ok(()) => {
                    info!("Link down, released address and stopped DHCP");
                    self.dhcp_active = false;
                    DhcpAction::Released
                }
                Err(e) => {
                    error!("Failed to release DHCP lease: {:?}", e);
                    DhcpAction::Failed(e)
                }
            });
        }

        if self.dhcp_active {
            return None;
        }
        Some(self.start_dhcp())
    }

    /// Drop the association and immediately associate again
    pub async fn reconnect(&mut self) -> Result<ConnectOutcome, ConnectError> {
        info!("Reconnect requested");

        if let Err(e) = self
            .controller
            .disconnect(self.config.disconnect_timeout)
            .await
        {
            warn!("Disconnect before reconnect failed: {:?}", e);
        }

        self.controller.associate(&mut self.waiter).await
    }

    pub fn module_info(&self) -> Option<&ModuleInfo> {
        self.module.as_ref()
    }

    pub fn state(&self) -> ConnState {
        let status = self.bridge.current();
        let netif = self.netif.snapshot();
        let link_usable = status.is_link_usable() || matches!(status, ConnectionStatus::Unknown(_));

        if link_usable {
            if netif.is_link_up() && netif.has_address() {
                ConnState::Connected
            } else if netif.is_link_up() && self.dhcp_active {
                ConnState::AddressAcquiring
            } else {
                ConnState::Linked
            }
        } else if netif.is_link_up() || netif.has_address() || self.dhcp_active {
            ConnState::LinkLost
        } else if self.associating {
            ConnState::Associating
        } else {
            ConnState::Idle
        }
    }

    pub fn snapshot(&self) -> NetStatusSnapshot {
        let netif = self.netif.snapshot();
        NetStatusSnapshot {
            state: self.state(),
            status: self.bridge.current(),
            link: netif.is_link_up(),
            ipv4: netif.ipv4,
            acquiring: self.dhcp_active,
            tx_pending: self.tx_backlog.map_or(0, |backlog| backlog.pending()),
            attempts: self.controller.attempts(),
            fail_safe_links: self.fail_safe_links,
        }
    }

    /// The manager's own mailbox, for [`request_reconnect`](super::controller::request_reconnect)
    pub fn mailbox(&self) -> &'a Mailbox {
        self.waiter.mailbox()
    }

    fn start_dhcp(&mut self) -> DhcpAction {
        match self.netif.dhcp_start() {
            Ok(()) => {
                info!("Link up, started DHCP");
                self.dhcp_active = true;
                DhcpAction::Started
            }
            Err(e) => {
                error!("Failed to start DHCP: {:?}", e);
                DhcpAction::Failed(e)
            }
        }
    }

    fn note_attempt(&mut self, result: &Result<ConnectOutcome, ConnectError>) {
        self.associating = matches!(result, Ok(ConnectOutcome::Pending));
        if let Err(e) = result {
            warn!("Connection attempt failed: {}", e);
        }
    }

    async fn query_module_info(&mut self) -> Result<ModuleInfo, TransportError> {
        let policy = self.config.module_query_retry;
        let mut attempt = 1u32;

        loop {
            let e = match self.try_query_module_info().await {
                Ok(module) => return Ok(module),
                Err(e) => e,
            };

            match policy.next_delay(attempt) {
                Some(delay) => {
                    warn!(
                        "Module query failed: {:?}, retrying in {} ms",
                        e,
                        delay.as_millis()
                    );
                    Timer::after(delay).await;
                    attempt = attempt.saturating_add(1);
                }
                None => {
                    error!("Module query failed after {} attempts: {:?}", attempt, e);
                    return Err(e);
                }
            }
        }
    }

    async fn try_query_module_info(&mut self) -> Result<ModuleInfo, TransportError> {
        let timeout = self.config.query_timeout;
        let transport = self.controller.transport_mut();

        let firmware = transport.firmware_version(timeout).await?;
        info!("Firmware Version: {}", firmware.as_str());

        let mac = transport.hardware_address(timeout).await?;
        let m = mac.octets();
        info!(
            "HW Address: {:02X}.{:02X}.{:02X}.{:02X}.{:02X}.{:02X}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        );

        Ok(ModuleInfo { firmware, mac })
    }
}

/// Tell the manager the TCP/IP stack finished initializing
///
/// The manager has to claim its mailbox (by being constructed from a
/// claimed [`Waiter`]) before the stack is initialized. On an unclaimed
/// mailbox the event is dropped and this returns false; the caller must
/// then signal again once the manager exists.
pub fn signal_stack_ready(manager_events: &Mailbox) -> bool {
    manager_events.set(NetEvent::LINK_STACK_READY).is_ok()
}
