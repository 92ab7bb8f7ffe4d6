//! Connection manager error types

use netconn_hal::network::{StackError, TransportError};

/// Notification channel errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum NotifyError {
    /// No mailbox at the requested index
    InvalidIndex,
    /// The consumer has not claimed its mailbox yet
    NotClaimed,
    /// The mailbox already has a consumer
    AlreadyClaimed,
}

impl core::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::InvalidIndex => write!(f, "Invalid mailbox index"),
            Self::NotClaimed => write!(f, "Mailbox has no consumer"),
            Self::AlreadyClaimed => write!(f, "Mailbox already claimed"),
        }
    }
}

impl core::error::Error for NotifyError {}

/// Access point association errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectError {
    /// No SSID stored for the preferred access point
    MissingCredentials,
    /// Stored SSID or PSK is too long or not UTF-8
    InvalidCredentials,
    /// Co-processor transport failed
    Transport(TransportError),
}

impl core::fmt::Display for ConnectError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::MissingCredentials => write!(f, "Access point credentials missing"),
            Self::InvalidCredentials => write!(f, "Access point credentials invalid"),
            Self::Transport(e) => write!(f, "Transport error: {}", e),
        }
    }
}

impl core::error::Error for ConnectError {}

impl From<TransportError> for ConnectError {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

/// Errors that stop the manager from bringing the interface up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StartError {
    /// Module info query gave up under a bounded retry policy
    ModuleQuery(TransportError),
    /// The TCP/IP stack refused the interface
    Register(StackError),
}

impl core::fmt::Display for StartError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::ModuleQuery(e) => write!(f, "Module query failed: {}", e),
            Self::Register(e) => write!(f, "Interface registration failed: {}", e),
        }
    }
}

impl core::error::Error for StartError {}
