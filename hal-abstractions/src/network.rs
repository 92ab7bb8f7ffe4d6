//! Network collaborator traits and the value types that cross them
//!
//! Trait methods that block on the co-processor return futures, so a
//! board can implement them with `async fn` on top of its own transport
//! task. Everything else is synchronous: the TCP/IP stack adapter is
//! expected to marshal calls onto the stack's own context itself.

use core::future::Future;
use core::net::Ipv4Addr;

use bitflags::bitflags;
use embassy_time::Duration;
use heapless::String;

/// Maximum length of the firmware revision string reported by the module
pub const FIRMWARE_REVISION_MAX_LEN: usize = 32;

/// Firmware revision string as reported by the co-processor
pub type FirmwareRevision = String<FIRMWARE_REVISION_MAX_LEN>;

/// 48-bit hardware (MAC) address of the co-processor's radio
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Raw address bytes in transmission order
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

/// Operating mode requested from the co-processor before association
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WifiMode {
    /// Client of an access point; frames are bridged to the host stack
    Station,
    /// The module hosts its own network
    AccessPoint,
}

/// Keys read from the persisted configuration store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigKey {
    /// SSID of the preferred access point
    PreferredApSsid,
    /// Pre-shared key of the preferred access point
    PreferredApCredentials,
}

/// Failure reported by the co-processor command transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransportError {
    /// No response within the requested timeout
    Timeout,
    /// Command channel is busy with another request
    Busy,
    /// Module answered with an error status
    Rejected,
    /// Framing or internal transport failure
    Internal,
}

impl core::fmt::Display for TransportError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Timeout => write!(f, "Co-processor request timed out"),
            Self::Busy => write!(f, "Co-processor command channel busy"),
            Self::Rejected => write!(f, "Co-processor rejected request"),
            Self::Internal => write!(f, "Co-processor transport error"),
        }
    }
}

impl core::error::Error for TransportError {}

/// Failure reported by the TCP/IP stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StackError {
    /// The stack refused the request in its current state
    Rejected,
    /// Allocation inside the stack failed
    OutOfMemory,
    /// Any other stack error
    Internal,
}

impl core::fmt::Display for StackError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Rejected => write!(f, "Stack rejected request"),
            Self::OutOfMemory => write!(f, "Stack out of memory"),
            Self::Internal => write!(f, "Stack internal error"),
        }
    }
}

impl core::error::Error for StackError {}

bitflags! {
    /// Interface flags as tracked by the TCP/IP stack
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct NetifFlags: u8 {
        /// Interface is administratively up
        const UP = 0x01;
        /// Underlying link is up
        const LINK_UP = 0x04;
    }
}

/// Point-in-time view of the interface state handed to callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetifSnapshot {
    pub flags: NetifFlags,
    pub ipv4: Ipv4Addr,
}

impl NetifSnapshot {
    /// Interface down, link down, no address
    pub const DOWN: Self = Self {
        flags: NetifFlags::empty(),
        ipv4: Ipv4Addr::UNSPECIFIED,
    };

    pub fn is_up(&self) -> bool {
        self.flags.contains(NetifFlags::UP)
    }

    pub fn is_link_up(&self) -> bool {
        self.flags.contains(NetifFlags::LINK_UP)
    }

    /// True once address acquisition has assigned a non-zero address
    pub fn has_address(&self) -> bool {
        !self.ipv4.is_unspecified()
    }
}

impl Default for NetifSnapshot {
    fn default() -> Self {
        Self::DOWN
    }
}

/// Command/response transport to the wireless co-processor
///
/// Every call is bounded by the timeout it is given. Status changes are
/// not returned from these calls; the transport reports them out of
/// band through the status callback it was wired to at startup.
pub trait Coprocessor {
    /// Select the module's operating mode
    fn set_mode(
        &mut self,
        mode: WifiMode,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), TransportError>>;

    /// Request association with an access point
    fn connect(
        &mut self,
        ssid: &str,
        psk: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), TransportError>>;

    /// Drop the current association
    fn disconnect(&mut self, timeout: Duration)
        -> impl Future<Output = Result<(), TransportError>>;

    /// Query the module firmware revision
    fn firmware_version(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<FirmwareRevision, TransportError>>;

    /// Query the module hardware address
    fn hardware_address(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<MacAddress, TransportError>>;
}

/// Persisted key/value configuration
pub trait ConfigStore {
    /// Raw entry data, `None` when the key was never written
    fn read(&self, key: ConfigKey) -> Option<&[u8]>;
}

/// Receiver of interface status and link change notifications
///
/// The stack invokes this from its own context every time the
/// administrative state, the link state or the address changes.
pub trait NetifCallback {
    fn on_netif_changed(&self, snapshot: NetifSnapshot);
}

/// Network interface owned by the connection manager
pub trait NetInterface<'a> {
    /// Register the interface with the stack and install `callback` as
    /// both its status and link callback
    fn register(
        &mut self,
        mac: MacAddress,
        callback: &'a dyn NetifCallback,
    ) -> Result<(), StackError>;

    /// Make this the default route interface
    fn set_default(&mut self);

    /// Bring the interface administratively up
    fn set_up(&mut self);

    fn set_link_up(&mut self);

    fn set_link_down(&mut self);

    /// Start DHCP address acquisition
    fn dhcp_start(&mut self) -> Result<(), StackError>;

    /// Release the leased address and stop DHCP
    fn dhcp_release_and_stop(&mut self) -> Result<(), StackError>;

    /// Current flags and address
    fn snapshot(&self) -> NetifSnapshot;
}
