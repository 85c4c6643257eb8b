//! Runs a [`vrouter_core::Router`] as a process: command line parsing,
//! configuration files, logging, and a UDP tunnel transport, plus canned
//! in-memory simulations of several routers.

pub mod cli;
pub mod parsing;
pub mod simulations;
pub mod udp_transport;
