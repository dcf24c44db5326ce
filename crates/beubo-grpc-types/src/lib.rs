//! Core types for the Beubo gRPC plugin relay.
//!
//! This crate defines the data structures shared by the wire layer and the
//! binary: the relayed plugin message, the event envelope, configuration, and
//! plugin discovery metadata. It contains no I/O.

pub mod config;
pub mod envelope;
pub mod error;
pub mod message;
pub mod plugin;
