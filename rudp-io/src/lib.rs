//! Reliable UDP I/O
//!
//! This crate provides the datagram socket wrapper and the fault-injection
//! channel that simulates loss and corruption on top of it.

pub mod faults;
pub mod socket;

pub use faults::{
    ChannelStats, FaultError, FaultModel, LossyChannel, NoFaults, RandomFaults, ScriptedFaults,
};
pub use socket::{DatagramSocket, SocketError};
