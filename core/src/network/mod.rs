//! Network connection manager
//!
//! This module provides the event-driven connection manager with:
//! - **`notify`**: Per-consumer bit-flag mailboxes with bounded waits
//! - **`status`**: Co-processor status cache and change signalling
//! - **`netif`**: Adapter from TCP/IP stack interface callbacks to events
//! - **`controller`**: Access point association
//! - **`manager`**: The manager task and its state machine
//! - **`context`**: Shared queues and contexts for the transfer tasks
//! - **`config`**: Configuration structs with `Default` implementations
//! - **`retry`**: Retry policy for startup queries
//! - **`error`**: Error enums for the operations above
//!
//! ## Data flow
//!
//! ```text
//! co-processor --status--> StatusBridge ------+
//!                                             |
//! TCP/IP stack --netif--> InterfaceObserver --+--> Mailbox --> ConnectionManager
//!                                             |
//! request_reconnect() ------------------------+
//! ```
//!
//! The manager is the only component that touches the interface's link
//! state or address acquisition. The status bridge is the only writer of
//! the cached co-processor status.

pub mod config;
pub mod context;
pub mod controller;
pub mod error;
pub mod manager;
pub mod netif;
pub mod notify;
pub mod retry;
pub mod status;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use config::{ConnectConfig, ManagerConfig};
pub use context::{init_contexts, CoprocessorPins, NetContexts, SharedQueues, TxBacklog};
pub use controller::{request_reconnect, ConnectOutcome, ConnectionController, Credentials};
pub use error::{ConnectError, NotifyError, StartError};
pub use manager::{
    signal_stack_ready, ConnState, ConnectionManager, ManagerResources, ModuleInfo,
    NetStatusSnapshot, StepReport,
};
pub use netif::InterfaceObserver;
pub use notify::{Mailbox, NetEvent, Notifier, Waiter, NET_EVENT_INDEX};
pub use retry::RetryPolicy;
pub use status::{ConnectionStatus, StatusBridge};
