//! Adapters Layer: Socket Lifecycle and Name Resolution
//!
//! Provides the OS-facing half of the socket core. Everything here issues
//! syscalls or resolver calls; the values it consumes and produces come
//! from the `entities_socket` crate.
//!
//! ## Overview
//!
//! The `adapters_socket` crate provides:
//! - **Socket lifecycle**: create, bind, listen, connect, accept, socketpair,
//!   recvfrom and send, each with its blocking and non-blocking contract
//! - **Name resolution**: `getaddrinfo`/`getnameinfo` wrappers, host entries,
//!   service lookups and the host name
//! - **Resolver configuration**: the reverse-lookup policy
//!
//! ## Architecture
//!
//! This crate is part of the adapters layer in the CLEAN architecture implementation.
//! It depends on:
//! - `entities_socket`: For constants, the address codec and the error taxonomy
//!
//! ## See Also
//!
//! - [`entities_socket`](../entities_socket/index.html): Address codec and errors
//! - [`api_facades`](../api_facades/index.html): Host-facing entry points

pub mod config;
pub mod resolver;
pub mod socket;

pub use config::{ResolverConfig, DEFAULT_REVERSE_LOOKUP};
pub use resolver::{
    AddrInfo, AddressRecord, Hints, HostRecord, IpAddressRecord, NameService, ResolvedEntry, Resolver,
    SockAddrSpec, SystemNameService,
};
pub use socket::{ConnectOutcome, NoopReclaimer, ResourceReclaimer, Socket};
