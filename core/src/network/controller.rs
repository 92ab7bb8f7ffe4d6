//! Access point connection controller
//!
//! Issues association attempts to the preferred access point using the
//! credentials held in the configuration store, then waits (bounded) for
//! the co-processor to report station up.

use embassy_time::Duration;
use heapless::String;
use netconn_hal::network::{ConfigKey, ConfigStore, Coprocessor, WifiMode};

use super::config::ConnectConfig;
use super::error::ConnectError;
use super::notify::{Mailbox, NetEvent, Waiter};
use super::status::{ConnectionStatus, StatusBridge};

/// Longest SSID accepted by 802.11
pub const SSID_MAX_LEN: usize = 32;

/// Longest pre-shared key (64 hex digits)
pub const PSK_MAX_LEN: usize = 64;

/// Result of a connection attempt that reached the co-processor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectOutcome {
    /// Already connected or connecting; nothing was sent
    AlreadyActive,
    /// Association accepted and station up observed
    StationUp,
    /// Association accepted but station up not reported in time
    Pending,
}

impl ConnectOutcome {
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::StationUp)
    }
}

/// Preferred access point credentials
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub ssid: String<SSID_MAX_LEN>,
    pub psk: String<PSK_MAX_LEN>,
}

impl Credentials {
    /// Validate raw SSID and PSK bytes
    ///
    /// An empty PSK selects an open network; an empty SSID is rejected.
    pub fn from_parts(ssid: &[u8], psk: &[u8]) -> Result<Self, ConnectError> {
        if ssid.is_empty() {
            return Err(ConnectError::MissingCredentials);
        }

        let ssid = core::str::from_utf8(ssid).map_err(|_| ConnectError::InvalidCredentials)?;
        let psk = core::str::from_utf8(psk).map_err(|_| ConnectError::InvalidCredentials)?;

        Ok(Self {
            ssid: String::try_from(ssid).map_err(|_| ConnectError::InvalidCredentials)?,
            psk: String::try_from(psk).map_err(|_| ConnectError::InvalidCredentials)?,
        })
    }

    /// Read the preferred access point entries from `store`
    pub fn load(store: &impl ConfigStore) -> Result<Self, ConnectError> {
        let ssid = store
            .read(ConfigKey::PreferredApSsid)
            .ok_or(ConnectError::MissingCredentials)?;
        let psk = store
            .read(ConfigKey::PreferredApCredentials)
            .unwrap_or_default();
        Self::from_parts(ssid, psk)
    }
}

/// Drives station association through the co-processor
pub struct ConnectionController<'a, T, C> {
    transport: T,
    store: C,
    bridge: &'a StatusBridge<'a>,
    config: ConnectConfig,
    attempts: u32,
}

impl<'a, T, C> ConnectionController<'a, T, C>
where
    T: Coprocessor,
    C: ConfigStore,
{
    pub fn new(transport: T, store: C, bridge: &'a StatusBridge<'a>, config: ConnectConfig) -> Self {
        Self {
            transport,
            store,
            bridge,
            config,
            attempts: 0,
        }
    }

    /// Connect to the preferred access point unless already connected
    /// or connecting
    ///
    /// Only `None` and `StationDown` allow an attempt; any other status
    /// returns [`ConnectOutcome::AlreadyActive`] without touching the
    /// transport.
    pub async fn connect(&mut self, waiter: &mut Waiter<'_>) -> Result<ConnectOutcome, ConnectError> {
        let status = self.bridge.current();
        if !status.needs_association() {
            debug!("Skipping connection attempt, status: {}", status.as_str());
            return Ok(ConnectOutcome::AlreadyActive);
        }
        self.associate(waiter).await
    }

    /// Issue an association attempt regardless of the current status
    ///
    /// Station up counts only when the co-processor reports it after the
    /// connect request; a status cached from an earlier association does
    /// not confirm this one. Transport failures are returned as-is; the
    /// cached status is left to the co-processor, so the caller retries on
    /// its next cycle.
    pub async fn associate(&mut self, waiter: &mut Waiter<'_>) -> Result<ConnectOutcome, ConnectError> {
        self.attempts = self.attempts.wrapping_add(1);

        self.transport
            .set_mode(WifiMode::Station, self.config.mode_timeout)
            .await
            .map_err(|e| {
                error!("Failed to select station mode: {:?}", e);
                ConnectError::from(e)
            })?;

        let credentials = Credentials::load(&self.store).map_err(|e| {
            error!("Access point credentials unavailable: {:?}", e);
            e
        })?;

        info!(
            "Connecting to access point: {} (attempt {})",
            credentials.ssid.as_str(),
            self.attempts
        );

        // Reports already pending predate this attempt
        let stale = waiter.take_pending(NetEvent::STATUS_UPDATED);

        let connected = self
            .transport
            .connect(
                credentials.ssid.as_str(),
                credentials.psk.as_str(),
                self.config.connect_timeout,
            )
            .await;
        if let Err(e) = connected {
            error!("Failed to connect to access point: {:?}", e);
            waiter.repost(stale);
            return Err(ConnectError::from(e));
        }

        let station_up = self
            .bridge
            .wait_for_report(
                waiter,
                ConnectionStatus::is_station_connected,
                self.config.station_up_timeout,
            )
            .await;
        waiter.repost(stale);

        if station_up {
            info!("Associated with access point");
            Ok(ConnectOutcome::StationUp)
        } else {
            warn!(
                "Station up not reported, status: {}",
                self.bridge.current().as_str()
            );
            Ok(ConnectOutcome::Pending)
        }
    }

    /// Drop the current association
    pub async fn disconnect(&mut self, timeout: Duration) -> Result<(), ConnectError> {
        self.transport.disconnect(timeout).await.map_err(ConnectError::from)
    }

    /// Association attempts issued so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }
}

/// Ask the connection manager to redo the access point connection
///
/// Callable from any context. Returns false when the manager has not
/// started yet, in which case the request is dropped.
pub fn request_reconnect(manager_events: &Mailbox) -> bool {
    manager_events.set(NetEvent::RECONNECT_REQUESTED).is_ok()
}
