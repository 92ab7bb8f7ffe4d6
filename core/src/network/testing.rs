//! Host-side fakes for the board collaborators

use core::cell::{Cell, RefCell};
use core::net::Ipv4Addr;

use embassy_time::Duration;
use netconn_hal::network::{
    ConfigKey, ConfigStore, Coprocessor, FirmwareRevision, MacAddress, NetInterface,
    NetifCallback, NetifFlags, NetifSnapshot, StackError, TransportError, WifiMode,
};

use super::status::{ConnectionStatus, StatusBridge};

pub const FAKE_MAC: MacAddress = MacAddress([0xc8, 0x93, 0x46, 0x01, 0x02, 0x03]);
pub const FAKE_FIRMWARE: &str = "2.3.1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    SetMode(WifiMode),
    Connect,
    Disconnect,
    FirmwareVersion,
    HardwareAddress,
}

/// Behaviour and call log shared between a test and its fake transport
#[derive(Default)]
pub struct Script {
    calls: RefCell<Vec<Call>>,
    mode_error: Cell<Option<TransportError>>,
    connect_error: Cell<Option<TransportError>>,
    silent: Cell<bool>,
    on_connect: RefCell<Vec<ConnectionStatus>>,
    query_failures: Cell<u32>,
    last_ssid: RefCell<String>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statuses reported, in order, after a successful connect
    pub fn connect_reports(&self, statuses: &[ConnectionStatus]) {
        *self.on_connect.borrow_mut() = statuses.to_vec();
    }

    pub fn fail_connect(&self, error: TransportError) {
        self.connect_error.set(Some(error));
    }

    pub fn fail_mode(&self, error: TransportError) {
        self.mode_error.set(Some(error));
    }

    /// Acknowledge commands without ever reporting a status change
    pub fn stay_silent(&self) {
        self.silent.set(true);
    }

    /// Fail the next `count` firmware revision queries
    pub fn fail_queries(&self, count: u32) {
        self.query_failures.set(count);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, call: Call) -> usize {
        self.calls.borrow().iter().filter(|c| **c == call).count()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn last_ssid(&self) -> String {
        self.last_ssid.borrow().clone()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

pub struct FakeCoprocessor<'a> {
    bridge: &'a StatusBridge<'a>,
    script: &'a Script,
}

impl<'a> FakeCoprocessor<'a> {
    pub fn new(bridge: &'a StatusBridge<'a>, script: &'a Script) -> Self {
        Self { bridge, script }
    }
}

impl Coprocessor for FakeCoprocessor<'_> {
    async fn set_mode(&mut self, mode: WifiMode, _timeout: Duration) -> Result<(), TransportError> {
        self.script.record(Call::SetMode(mode));
        match self.script.mode_error.get() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    async fn connect(
        &mut self,
        ssid: &str,
        _psk: &str,
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        self.script.record(Call::Connect);
        *self.script.last_ssid.borrow_mut() = ssid.to_string();

        if let Some(error) = self.script.connect_error.get() {
            return Err(error);
        }
        if self.script.silent.get() {
            return Ok(());
        }
        let reports = self.script.on_connect.borrow().clone();
        for status in reports {
            self.bridge.on_status_changed(status);
        }
        Ok(())
    }

    async fn disconnect(&mut self, _timeout: Duration) -> Result<(), TransportError> {
        self.script.record(Call::Disconnect);
        if !self.script.silent.get() {
            self.bridge.on_status_changed(ConnectionStatus::StationDown);
        }
        Ok(())
    }

    async fn firmware_version(
        &mut self,
        _timeout: Duration,
    ) -> Result<FirmwareRevision, TransportError> {
        self.script.record(Call::FirmwareVersion);
        let failures = self.script.query_failures.get();
        if failures > 0 {
            self.script.query_failures.set(failures - 1);
            return Err(TransportError::Timeout);
        }
        FirmwareRevision::try_from(FAKE_FIRMWARE).map_err(|_| TransportError::Internal)
    }

    async fn hardware_address(&mut self, _timeout: Duration) -> Result<MacAddress, TransportError> {
        self.script.record(Call::HardwareAddress);
        Ok(FAKE_MAC)
    }
}

pub struct FakeStore {
    ssid: Option<&'static [u8]>,
    psk: Option<&'static [u8]>,
}

impl FakeStore {
    pub fn new(ssid: &'static [u8], psk: &'static [u8]) -> Self {
        Self {
            ssid: Some(ssid),
            psk: Some(psk),
        }
    }

    pub fn empty() -> Self {
        Self {
            ssid: None,
            psk: None,
        }
    }
}

impl ConfigStore for FakeStore {
    fn read(&self, key: ConfigKey) -> Option<&[u8]> {
        match key {
            ConfigKey::PreferredApSsid => self.ssid,
            ConfigKey::PreferredApCredentials => self.psk,
        }
    }
}

/// Interface state shared between a test and its fake stack
pub struct NetifState<'a> {
    snapshot: Cell<NetifSnapshot>,
    callback: Cell<Option<&'a dyn NetifCallback>>,
    registered: Cell<Option<MacAddress>>,
    is_default: Cell<bool>,
    dhcp_running: Cell<bool>,
    lease: Cell<Option<Ipv4Addr>>,
    dhcp_starts: Cell<u32>,
    dhcp_stops: Cell<u32>,
    register_error: Cell<Option<StackError>>,
    dhcp_error: Cell<Option<StackError>>,
}

impl<'a> NetifState<'a> {
    pub fn new() -> Self {
        Self {
            snapshot: Cell::new(NetifSnapshot::DOWN),
            callback: Cell::new(None),
            registered: Cell::new(None),
            is_default: Cell::new(false),
            dhcp_running: Cell::new(false),
            lease: Cell::new(None),
            dhcp_starts: Cell::new(0),
            dhcp_stops: Cell::new(0),
            register_error: Cell::new(None),
            dhcp_error: Cell::new(None),
        }
    }

    /// Address handed out as soon as DHCP starts
    pub fn grant_lease(&self, address: Ipv4Addr) {
        self.lease.set(Some(address));
    }

    pub fn fail_register(&self, error: Option<StackError>) {
        self.register_error.set(error);
    }

    pub fn fail_dhcp(&self, error: Option<StackError>) {
        self.dhcp_error.set(error);
    }

    pub fn snapshot(&self) -> NetifSnapshot {
        self.snapshot.get()
    }

    pub fn registered(&self) -> Option<MacAddress> {
        self.registered.get()
    }

    pub fn is_default(&self) -> bool {
        self.is_default.get()
    }

    pub fn dhcp_running(&self) -> bool {
        self.dhcp_running.get()
    }

    pub fn dhcp_starts(&self) -> u32 {
        self.dhcp_starts.get()
    }

    pub fn dhcp_stops(&self) -> u32 {
        self.dhcp_stops.get()
    }

    /// Apply `f` to the interface state and report it like the stack would
    pub fn update(&self, f: impl FnOnce(&mut NetifSnapshot)) {
        let mut snapshot = self.snapshot.get();
        f(&mut snapshot);
        if snapshot == self.snapshot.get() {
            return;
        }
        self.snapshot.set(snapshot);
        if let Some(callback) = self.callback.get() {
            callback.on_netif_changed(snapshot);
        }
    }
}

pub struct FakeNetif<'a> {
    state: &'a NetifState<'a>,
}

impl<'a> FakeNetif<'a> {
    pub fn new(state: &'a NetifState<'a>) -> Self {
        Self { state }
    }
}

impl<'a> NetInterface<'a> for FakeNetif<'a> {
    fn register(
        &mut self,
        mac: MacAddress,
        callback: &'a dyn NetifCallback,
    ) -> Result<(), StackError> {
        if let Some(error) = self.state.register_error.get() {
            return Err(error);
        }
        self.state.registered.set(Some(mac));
        self.state.callback.set(Some(callback));
        Ok(())
    }

    fn set_default(&mut self) {
        self.state.is_default.set(true);
    }

    fn set_up(&mut self) {
        self.state.update(|s| s.flags.insert(NetifFlags::UP));
    }

    fn set_link_up(&mut self) {
        self.state.update(|s| s.flags.insert(NetifFlags::LINK_UP));
    }

    fn set_link_down(&mut self) {
        self.state.update(|s| s.flags.remove(NetifFlags::LINK_UP));
    }

    fn dhcp_start(&mut self) -> Result<(), StackError> {
        if let Some(error) = self.state.dhcp_error.get() {
            return Err(error);
        }
        self.state.dhcp_starts.set(self.state.dhcp_starts.get() + 1);
        self.state.dhcp_running.set(true);
        if let Some(address) = self.state.lease.get() {
            self.state.update(|s| s.ipv4 = address);
        }
        Ok(())
    }

    fn dhcp_release_and_stop(&mut self) -> Result<(), StackError> {
        if let Some(error) = self.state.dhcp_error.get() {
            return Err(error);
        }
        self.state.dhcp_stops.set(self.state.dhcp_stops.get() + 1);
        self.state.dhcp_running.set(false);
        self.state.update(|s| s.ipv4 = Ipv4Addr::UNSPECIFIED);
        Ok(())
    }

    fn snapshot(&self) -> NetifSnapshot {
        self.state.snapshot()
    }
}
