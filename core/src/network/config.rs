//! Connection manager configuration structures

use embassy_time::Duration;

use super::retry::RetryPolicy;

/// Access point association timeouts
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnectConfig {
    /// Bound on the station mode request
    pub mode_timeout: Duration,
    /// Bound on the association request itself
    pub connect_timeout: Duration,
    /// How long to wait for the module to report station up afterwards
    pub station_up_timeout: Duration,
}

impl Default for ConnectConfig {
    fn default() -> Self {
        Self {
            mode_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(15),
            station_up_timeout: Duration::from_secs(5),
        }
    }
}

/// Connection manager configuration
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ManagerConfig {
    /// Longest the main loop sleeps without any event
    pub loop_timeout: Duration,
    /// Bound on the disconnect issued for a reconnect request
    pub disconnect_timeout: Duration,
    /// Bound on each firmware revision / hardware address query
    pub query_timeout: Duration,
    /// Schedule for retrying the module info query at startup
    pub module_query_retry: RetryPolicy,
    pub connect: ConnectConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            loop_timeout: Duration::from_secs(30),
            disconnect_timeout: Duration::from_secs(1),
            query_timeout: Duration::from_secs(5),
            module_query_retry: RetryPolicy::forever(Duration::from_secs(10)),
            connect: ConnectConfig::default(),
        }
    }
}
