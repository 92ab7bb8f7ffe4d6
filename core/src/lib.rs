//! Connection manager for a network interface reached through a wireless
//! co-processor
//!
//! This crate contains the platform-agnostic part of the network stack:
//! the event plumbing between the co-processor, the TCP/IP stack and the
//! manager task, and the state machine that keeps the interface in step
//! with the radio link. It has NO hardware dependencies; boards supply
//! the collaborators defined in `netconn-hal`.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]
#![deny(warnings)]

mod fmt;

pub mod network;
