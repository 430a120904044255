//! API Facades Layer
//!
//! Host-facing socket functions. A host interpreter passes loosely-typed
//! values ([`HostValue`], [`SockAddrArg`]); the facades normalize them and
//! call into the adapters layer.
//!
//! All facades call underlying Rust modules from inner layers.

pub mod socket_facades;

// Re-export main facade types
pub use socket_facades::*;
