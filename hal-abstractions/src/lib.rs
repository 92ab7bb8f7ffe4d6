//! Hardware abstraction traits for the wireless co-processor network stack
//!
//! This crate defines the seams between the connection manager and the
//! parts of the system it does not own: the co-processor command
//! transport, the persisted configuration store and the TCP/IP stack's
//! network interface. Boards implement these traits.

#![no_std]
#![deny(unsafe_code)]
#![deny(warnings)]

pub mod network;
