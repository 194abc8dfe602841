//! Reverse-tunnel agent core: endpoint resolution, the gateway fleet
//! tracker, per-gateway tunnel supervisors with reconnect backoff, the
//! framed handshake, and the per-stream proxy that bridges multiplexed
//! streams to internal TCP destinations.

pub mod backoff;
pub mod config;
pub mod error;
pub mod handshake;
pub mod model;
pub mod proxy;
pub mod reconciler;
pub mod session;
pub mod supervisor;
pub mod tls;
