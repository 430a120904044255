//! Entities Layer: Socket Core
//!
//! Pure, allocation-light building blocks shared by every socket operation.
//! Nothing in this crate issues a syscall; it only translates between the
//! values a caller supplies and the values the operating system expects.
//!
//! ## Overview
//!
//! The `entities_socket` crate provides:
//! - **Error taxonomy**: [`SocketError`] with its syscall, resolver, argument
//!   and retry categories
//! - **Symbol resolution**: `"INET"`, `"SOCK_STREAM"`, `"tcp"` and friends to
//!   their platform integers and back
//! - **Address codec**: `sockaddr_in`, `sockaddr_in6` and `sockaddr_un` to and
//!   from their native byte layout
//!
//! ## Usage
//!
//! ```rust
//! use entities_socket::{constants, encode_in, Address};
//! use std::net::Ipv4Addr;
//!
//! let family = constants::resolve_family("INET").unwrap();
//! assert_eq!(family, libc::AF_INET);
//!
//! let packed = encode_in(80, Ipv4Addr::LOCALHOST.into());
//! assert_eq!(packed.decode().unwrap(), Address::Inet { ip: Ipv4Addr::LOCALHOST, port: 80 });
//! ```
//!
//! ## See Also
//!
//! - [`adapters_socket`](../adapters_socket/index.html): socket lifecycle and name resolution

pub mod address;
pub mod constants;
pub mod error;

pub use address::{
    decode, decode_in, decode_reported, decode_un, encode, encode_in, encode_un, Address, PackedAddress,
    FAMILY_TAG_LEN, MAX_UNIX_PATH_LEN, SOCKADDR_IN6_LEN, SOCKADDR_IN_LEN, SOCKADDR_STORAGE_LEN,
    SOCKADDR_UN_LEN,
};
pub use constants::{Constant, ConstantArg};
pub use error::{ArgumentError, ResolverCode, SocketError};
