//! Address Module
//!
//! Encodes and decodes socket addresses in the platform's native
//! `sockaddr_in`, `sockaddr_in6` and `sockaddr_un` layouts. Packed addresses
//! are byte-for-byte what the kernel reads and writes, so they can be handed
//! straight to `bind(2)`, `connect(2)` and friends.
//!
//! ## Layout rules
//!
//! - The family tag sits at `offsetof(struct sockaddr, sa_family)`; BSD
//!   targets carry an extra length byte in front of it which is filled in
//!   on encode.
//! - Ports are stored in network byte order; padding is zero-filled.
//! - IPv4 and IPv6 buffers must be exactly the structure size.
//! - UNIX paths are NUL-terminated unless they run up to the end of a
//!   shortened buffer. A full-size buffer without a terminator is rejected.

use crate::constants::family_to_name;
use crate::error::{ArgumentError, SocketError};
use std::mem::{self, offset_of, size_of};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tracing::trace;

/// Offset of the family tag inside every `sockaddr_*`
pub const FAMILY_OFFSET: usize = offset_of!(libc::sockaddr, sa_family);
/// Minimum number of bytes needed to read the family tag
pub const FAMILY_TAG_LEN: usize = FAMILY_OFFSET + size_of::<libc::sa_family_t>();
/// `sizeof(struct sockaddr_in)`
pub const SOCKADDR_IN_LEN: usize = size_of::<libc::sockaddr_in>();
/// `sizeof(struct sockaddr_in6)`
pub const SOCKADDR_IN6_LEN: usize = size_of::<libc::sockaddr_in6>();
/// `sizeof(struct sockaddr_un)`
pub const SOCKADDR_UN_LEN: usize = size_of::<libc::sockaddr_un>();
/// `sizeof(struct sockaddr_storage)`, the largest address the kernel returns
pub const SOCKADDR_STORAGE_LEN: usize = size_of::<libc::sockaddr_storage>();

const SUN_PATH_OFFSET: usize = offset_of!(libc::sockaddr_un, sun_path);
const SUN_PATH_LEN: usize = SOCKADDR_UN_LEN - SUN_PATH_OFFSET;

/// Longest UNIX path that still leaves room for the NUL terminator
pub const MAX_UNIX_PATH_LEN: usize = SUN_PATH_LEN - 1;

/// A decoded socket address
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    /// `AF_INET`
    Inet { ip: Ipv4Addr, port: u16 },
    /// `AF_INET6`
    Inet6 {
        ip: Ipv6Addr,
        port: u16,
        flowinfo: u32,
        scope_id: u32,
    },
    /// `AF_UNIX`; an empty path is an unnamed socket
    Unix { path: Vec<u8> },
    /// Any family this codec does not interpret
    Opaque { family: i32, bytes: Vec<u8> },
}

impl Address {
    /// Address family (`AF_*` value)
    pub fn family(&self) -> i32 {
        match self {
            Address::Inet { .. } => libc::AF_INET,
            Address::Inet6 { .. } => libc::AF_INET6,
            Address::Unix { .. } => libc::AF_UNIX,
            Address::Opaque { family, .. } => *family,
        }
    }

    /// Port, for IP families
    pub fn port(&self) -> Option<u16> {
        match self {
            Address::Inet { port, .. } | Address::Inet6 { port, .. } => Some(*port),
            _ => None,
        }
    }

    /// IP address, for IP families
    pub fn ip(&self) -> Option<IpAddr> {
        match self {
            Address::Inet { ip, .. } => Some(IpAddr::V4(*ip)),
            Address::Inet6 { ip, .. } => Some(IpAddr::V6(*ip)),
            _ => None,
        }
    }

    /// Raw 4- or 16-byte IP address, as stored in host records
    pub fn ip_octets(&self) -> Option<Vec<u8>> {
        match self {
            Address::Inet { ip, .. } => Some(ip.octets().to_vec()),
            Address::Inet6 { ip, .. } => Some(ip.octets().to_vec()),
            _ => None,
        }
    }

    /// Path bytes, for `AF_UNIX`
    pub fn unix_path(&self) -> Option<&[u8]> {
        match self {
            Address::Unix { path } => Some(path),
            _ => None,
        }
    }

    /// Numeric host text (`"127.0.0.1"`, `"fe80::1%2"`)
    pub fn numeric_host(&self) -> Option<String> {
        match self {
            Address::Inet { ip, .. } => Some(ip.to_string()),
            Address::Inet6 { ip, scope_id: 0, .. } => Some(ip.to_string()),
            Address::Inet6 { ip, scope_id, .. } => Some(format!("{}%{}", ip, scope_id)),
            _ => None,
        }
    }

    /// Encode back into the native layout
    pub fn encode(&self) -> Result<PackedAddress, SocketError> {
        match self {
            Address::Inet { ip, port } => Ok(pack_in(*ip, *port)),
            Address::Inet6 {
                ip,
                port,
                flowinfo,
                scope_id,
            } => Ok(pack_in6(*ip, *port, *flowinfo, *scope_id)),
            Address::Unix { path } => encode_un(path),
            Address::Opaque { bytes, .. } => Ok(PackedAddress::from_bytes(bytes.clone())),
        }
    }
}

impl From<SocketAddr> for Address {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => Address::Inet {
                ip: *v4.ip(),
                port: v4.port(),
            },
            SocketAddr::V6(v6) => Address::Inet6 {
                ip: *v6.ip(),
                port: v6.port(),
                flowinfo: v6.flowinfo(),
                scope_id: v6.scope_id(),
            },
        }
    }
}

/// A socket address in native binary layout
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackedAddress {
    bytes: Vec<u8>,
}

impl PackedAddress {
    /// Wrap bytes without validating them; [`PackedAddress::decode`] validates
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Family tag, if the buffer is long enough to hold one
    pub fn family(&self) -> Option<i32> {
        read_family(&self.bytes)
    }

    pub fn decode(&self) -> Result<Address, SocketError> {
        decode(&self.bytes)
    }

    /// Copy into a `sockaddr_storage` suitable for passing to the OS
    ///
    /// # Returns
    ///
    /// * `Ok((storage, len))` - Storage and the meaningful length
    /// * `Err(SocketError)` - `InvalidAddress` when longer than `sockaddr_storage`
    pub fn to_storage(&self) -> Result<(libc::sockaddr_storage, libc::socklen_t), SocketError> {
        if self.bytes.len() > SOCKADDR_STORAGE_LEN {
            return Err(ArgumentError::InvalidAddress(format!(
                "too long sockaddr ({} bytes given but {} bytes max)",
                self.bytes.len(),
                SOCKADDR_STORAGE_LEN
            ))
            .into());
        }
        // SAFETY: sockaddr_storage is plain old data; the copy is bounded by its size
        let storage: libc::sockaddr_storage = unsafe { read_struct(&self.bytes) };
        Ok((storage, self.bytes.len() as libc::socklen_t))
    }
}

impl AsRef<[u8]> for PackedAddress {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl From<Vec<u8>> for PackedAddress {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<SocketAddr> for PackedAddress {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => pack_in(*v4.ip(), v4.port()),
            SocketAddr::V6(v6) => pack_in6(*v6.ip(), v6.port(), v6.flowinfo(), v6.scope_id()),
        }
    }
}

/// Encode an address from its parts
///
/// # Arguments
///
/// * `family` - `AF_INET`, `AF_INET6` or `AF_UNIX`
/// * `port` - Port in host byte order (ignored for `AF_UNIX`)
/// * `host` - 4 or 16 raw IP bytes, or the UNIX path
///
/// # Returns
///
/// * `Ok(PackedAddress)` - Native structure bytes
/// * `Err(SocketError)` - `InvalidAddress`, `PathTooLong` or `NulByte`
pub fn encode(family: i32, port: u16, host: &[u8]) -> Result<PackedAddress, SocketError> {
    match family {
        libc::AF_INET => {
            let octets: [u8; 4] = host.try_into().map_err(|_| host_length_error(family, 4, host.len()))?;
            Ok(pack_in(Ipv4Addr::from(octets), port))
        }
        libc::AF_INET6 => {
            let octets: [u8; 16] = host.try_into().map_err(|_| host_length_error(family, 16, host.len()))?;
            Ok(pack_in6(Ipv6Addr::from(octets), port, 0, 0))
        }
        libc::AF_UNIX => encode_un(host),
        other => Err(ArgumentError::InvalidAddress(format!(
            "cannot encode address family {}",
            family_to_name(other)
        ))
        .into()),
    }
}

fn host_length_error(family: i32, expected: usize, given: usize) -> SocketError {
    ArgumentError::InvalidAddress(format!(
        "{} host must be {} bytes, {} given",
        family_to_name(family),
        expected,
        given
    ))
    .into()
}

/// Pack a port and IP address (`sockaddr_in` or `sockaddr_in6`)
pub fn encode_in(port: u16, ip: IpAddr) -> PackedAddress {
    match ip {
        IpAddr::V4(v4) => pack_in(v4, port),
        IpAddr::V6(v6) => pack_in6(v6, port, 0, 0),
    }
}

/// Pack a UNIX-domain path into a full-size `sockaddr_un`
///
/// # Returns
///
/// * `Ok(PackedAddress)` - `SOCKADDR_UN_LEN` bytes
/// * `Err(SocketError)` - `NulByte` or `PathTooLong`
pub fn encode_un(path: &[u8]) -> Result<PackedAddress, SocketError> {
    if path.contains(&0) {
        return Err(ArgumentError::NulByte("unix socket path").into());
    }
    if path.len() > MAX_UNIX_PATH_LEN {
        return Err(ArgumentError::PathTooLong {
            len: path.len(),
            max: MAX_UNIX_PATH_LEN,
        }
        .into());
    }

    // SAFETY: all-zero is a valid sockaddr_un
    let mut sun: libc::sockaddr_un = unsafe { mem::zeroed() };
    sun.sun_family = libc::AF_UNIX as libc::sa_family_t;
    #[cfg(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    ))]
    {
        sun.sun_len = SOCKADDR_UN_LEN as u8;
    }
    for (dst, src) in sun.sun_path.iter_mut().zip(path) {
        *dst = *src as libc::c_char;
    }
    trace!(path_len = path.len(), "packed sockaddr_un");
    Ok(PackedAddress::from_bytes(struct_bytes(&sun)))
}

fn pack_in(ip: Ipv4Addr, port: u16) -> PackedAddress {
    // SAFETY: all-zero is a valid sockaddr_in
    let mut sin: libc::sockaddr_in = unsafe { mem::zeroed() };
    sin.sin_family = libc::AF_INET as libc::sa_family_t;
    sin.sin_port = port.to_be();
    sin.sin_addr = libc::in_addr {
        s_addr: u32::from_ne_bytes(ip.octets()),
    };
    #[cfg(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    ))]
    {
        sin.sin_len = SOCKADDR_IN_LEN as u8;
    }
    PackedAddress::from_bytes(struct_bytes(&sin))
}

fn pack_in6(ip: Ipv6Addr, port: u16, flowinfo: u32, scope_id: u32) -> PackedAddress {
    // SAFETY: all-zero is a valid sockaddr_in6
    let mut sin6: libc::sockaddr_in6 = unsafe { mem::zeroed() };
    sin6.sin6_family = libc::AF_INET6 as libc::sa_family_t;
    sin6.sin6_port = port.to_be();
    sin6.sin6_flowinfo = flowinfo;
    sin6.sin6_addr.s6_addr = ip.octets();
    sin6.sin6_scope_id = scope_id;
    #[cfg(any(
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd",
        target_os = "openbsd",
        target_os = "netbsd",
        target_os = "dragonfly"
    ))]
    {
        sin6.sin6_len = SOCKADDR_IN6_LEN as u8;
    }
    PackedAddress::from_bytes(struct_bytes(&sin6))
}

/// Decode native address bytes
///
/// Buffers too short to hold the family tag and IP buffers of the wrong
/// size are `InvalidAddress`. Families the codec does not know decode to
/// [`Address::Opaque`].
pub fn decode(bytes: &[u8]) -> Result<Address, SocketError> {
    let family = read_family(bytes).ok_or_else(|| too_short(bytes.len()))?;
    match family {
        libc::AF_INET => {
            expect_len(family, bytes.len(), SOCKADDR_IN_LEN)?;
            // SAFETY: length checked above; sockaddr_in is plain old data
            let sin: libc::sockaddr_in = unsafe { read_struct(bytes) };
            Ok(Address::Inet {
                ip: Ipv4Addr::from(sin.sin_addr.s_addr.to_ne_bytes()),
                port: u16::from_be(sin.sin_port),
            })
        }
        libc::AF_INET6 => {
            expect_len(family, bytes.len(), SOCKADDR_IN6_LEN)?;
            // SAFETY: length checked above; sockaddr_in6 is plain old data
            let sin6: libc::sockaddr_in6 = unsafe { read_struct(bytes) };
            Ok(Address::Inet6 {
                ip: Ipv6Addr::from(sin6.sin6_addr.s6_addr),
                port: u16::from_be(sin6.sin6_port),
                flowinfo: sin6.sin6_flowinfo,
                scope_id: sin6.sin6_scope_id,
            })
        }
        libc::AF_UNIX => Ok(Address::Unix {
            path: decode_un(bytes)?,
        }),
        other => {
            trace!(family = other, len = bytes.len(), "opaque sockaddr");
            Ok(Address::Opaque {
                family: other,
                bytes: bytes.to_vec(),
            })
        }
    }
}

/// Decode an IP address into `(port, ip)`
pub fn decode_in(bytes: &[u8]) -> Result<(u16, IpAddr), SocketError> {
    let family = read_family(bytes).ok_or_else(|| ArgumentError::InvalidAddress("too short sockaddr".to_string()))?;
    if family != libc::AF_INET && family != libc::AF_INET6 {
        return Err(ArgumentError::InvalidAddress("not an AF_INET/AF_INET6 sockaddr".to_string()).into());
    }
    let address = decode(bytes)?;
    match (address.port(), address.ip()) {
        (Some(port), Some(ip)) => Ok((port, ip)),
        _ => Err(ArgumentError::InvalidAddress("not an AF_INET/AF_INET6 sockaddr".to_string()).into()),
    }
}

/// Decode a UNIX-domain address into its path
///
/// A buffer that stops before `sun_path` is an unnamed socket. The path
/// ends at the first NUL; without one it runs to the end of the buffer,
/// except in a full-size `sockaddr_un` where that is `NotNulTerminated`.
pub fn decode_un(bytes: &[u8]) -> Result<Vec<u8>, SocketError> {
    let family = read_family(bytes).ok_or_else(|| ArgumentError::InvalidAddress("too short sockaddr".to_string()))?;
    if family != libc::AF_UNIX {
        return Err(ArgumentError::InvalidAddress("not an AF_UNIX sockaddr".to_string()).into());
    }
    if bytes.len() > SOCKADDR_UN_LEN {
        return Err(ArgumentError::InvalidAddress(format!(
            "too long sockaddr_un - {} longer than {}",
            bytes.len(),
            SOCKADDR_UN_LEN
        ))
        .into());
    }
    if bytes.len() <= SUN_PATH_OFFSET {
        return Ok(Vec::new());
    }

    let field = &bytes[SUN_PATH_OFFSET..];
    match field.iter().position(|&b| b == 0) {
        Some(end) => Ok(field[..end].to_vec()),
        None if bytes.len() == SOCKADDR_UN_LEN => Err(ArgumentError::NotNulTerminated.into()),
        None => {
            trace!(path_len = field.len(), "unterminated sun_path in short sockaddr_un");
            Ok(field.to_vec())
        }
    }
}

/// Decode an address the kernel wrote back (`accept`, `recvfrom`, `getsockname`)
///
/// The reported length may exceed the structure size: Linux counts the
/// terminator of a `sun_path` that fills the whole field. Such lengths are
/// clamped, and a UNIX path without a NUL takes the whole field. Anything
/// [`decode`] still rejects becomes [`Address::Opaque`], so a call the
/// kernel completed never fails here.
///
/// # Returns
///
/// * `Some(Address)` - Decoded address
/// * `None` - The buffer is too short to carry a family tag
pub fn decode_reported(bytes: &[u8]) -> Option<Address> {
    let family = read_family(bytes)?;
    let bytes = &bytes[..bytes.len().min(SOCKADDR_STORAGE_LEN)];
    if family == libc::AF_UNIX {
        let bytes = &bytes[..bytes.len().min(SOCKADDR_UN_LEN)];
        let field = bytes.get(SUN_PATH_OFFSET..).unwrap_or_default();
        let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
        return Some(Address::Unix {
            path: field[..end].to_vec(),
        });
    }
    Some(decode(bytes).unwrap_or_else(|err| {
        trace!(family, len = bytes.len(), error = %err, "undecodable reported sockaddr");
        Address::Opaque {
            family,
            bytes: bytes.to_vec(),
        }
    }))
}

fn read_family(bytes: &[u8]) -> Option<i32> {
    let tag = bytes.get(FAMILY_OFFSET..FAMILY_TAG_LEN)?;
    let mut raw = [0u8; size_of::<libc::sa_family_t>()];
    raw.copy_from_slice(tag);
    Some(libc::sa_family_t::from_ne_bytes(raw) as i32)
}

fn too_short(len: usize) -> SocketError {
    ArgumentError::InvalidAddress(format!(
        "too short sockaddr ({} bytes given but {} bytes min)",
        len, FAMILY_TAG_LEN
    ))
    .into()
}

fn expect_len(family: i32, len: usize, expected: usize) -> Result<(), SocketError> {
    if len == expected {
        return Ok(());
    }
    Err(ArgumentError::InvalidAddress(format!(
        "{} sockaddr length mismatch ({} bytes given but {} expected)",
        family_to_name(family),
        len,
        expected
    ))
    .into())
}

fn struct_bytes<T>(value: &T) -> Vec<u8> {
    // SAFETY: only called with zero-initialised libc sockaddr structs
    unsafe { std::slice::from_raw_parts(value as *const T as *const u8, size_of::<T>()) }.to_vec()
}

/// Copy up to `size_of::<T>()` bytes into a zeroed `T`
///
/// # Safety
///
/// `T` must be a plain C struct for which every bit pattern is valid.
unsafe fn read_struct<T>(bytes: &[u8]) -> T {
    let mut value: T = mem::zeroed();
    let len = bytes.len().min(size_of::<T>());
    std::ptr::copy_nonoverlapping(bytes.as_ptr(), &mut value as *mut T as *mut u8, len);
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn test_encode_in_exact_linux_bytes() {
        let packed = encode_in(80, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(
            packed.as_bytes(),
            &[0x02, 0x00, 0x00, 0x50, 0x7F, 0x00, 0x00, 0x01, 0, 0, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_encode_in_layout() {
        let packed = encode_in(80, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(packed.len(), SOCKADDR_IN_LEN);
        assert_eq!(packed.family(), Some(libc::AF_INET));
        let port_offset = offset_of!(libc::sockaddr_in, sin_port);
        assert_eq!(&packed.as_bytes()[port_offset..port_offset + 2], &[0x00, 0x50]);
        let addr_offset = offset_of!(libc::sockaddr_in, sin_addr);
        assert_eq!(&packed.as_bytes()[addr_offset..addr_offset + 4], &[127, 0, 0, 1]);
    }

    fn unix_bytes(path: &[u8], trailer: &[u8]) -> Vec<u8> {
        let mut bytes = encode_un(b"").unwrap().into_bytes();
        bytes.truncate(SUN_PATH_OFFSET);
        bytes.extend_from_slice(path);
        bytes.extend_from_slice(trailer);
        bytes
    }

    #[test]
    fn test_decode_reported_full_sun_path_with_counted_terminator() {
        let path = vec![b'q'; SUN_PATH_LEN];
        let bytes = unix_bytes(&path, &[0]);
        assert_eq!(bytes.len(), SOCKADDR_UN_LEN + 1);
        assert!(decode(&bytes).is_err());

        assert_eq!(decode_reported(&bytes), Some(Address::Unix { path: path.clone() }));
        assert_eq!(
            decode_reported(&unix_bytes(&path, &[])),
            Some(Address::Unix { path })
        );
    }

    #[test]
    fn test_decode_reported_short_buffers() {
        assert_eq!(decode_reported(&[]), None);
        assert_eq!(
            decode_reported(&unix_bytes(b"", &[])),
            Some(Address::Unix { path: Vec::new() })
        );
        assert_eq!(
            decode_reported(&unix_bytes(b"/run/app.sock", &[0])),
            Some(Address::Unix {
                path: b"/run/app.sock".to_vec()
            })
        );
    }

    #[test]
    fn test_decode_reported_falls_back_to_opaque() {
        let mut bytes = encode_in(80, IpAddr::V4(Ipv4Addr::LOCALHOST)).into_bytes();
        bytes.truncate(SOCKADDR_IN_LEN - 1);
        assert!(decode(&bytes).is_err());
        match decode_reported(&bytes) {
            Some(Address::Opaque { family, bytes: raw }) => {
                assert_eq!(family, libc::AF_INET);
                assert_eq!(raw, bytes);
            }
            other => panic!("Expected Opaque address, got {:?}", other),
        }

        let inet = encode_in(443, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(decode_reported(inet.as_bytes()), inet.decode().ok());
    }

    #[test]
    fn test_encode_by_family() {
        let packed = encode(libc::AF_INET, 8080, &[10, 0, 0, 1]).unwrap();
        assert_eq!(
            packed.decode().unwrap(),
            Address::Inet {
                ip: Ipv4Addr::new(10, 0, 0, 1),
                port: 8080
            }
        );

        let packed = encode(libc::AF_UNIX, 0, b"/tmp/sock").unwrap();
        assert_eq!(packed.decode().unwrap().unix_path(), Some(&b"/tmp/sock"[..]));
    }

    #[test]
    fn test_encode_wrong_host_length() {
        let err = encode(libc::AF_INET, 80, &[127, 0, 0]).unwrap_err();
        assert_eq!(err.to_string(), "AF_INET host must be 4 bytes, 3 given");
        assert!(encode(libc::AF_INET6, 80, &[0; 4]).is_err());
    }

    #[test]
    fn test_decode_short_buffer() {
        for len in 0..FAMILY_TAG_LEN {
            let err = decode(&vec![0u8; len]).unwrap_err();
            assert!(matches!(err, SocketError::InvalidArgument(ArgumentError::InvalidAddress(_))));
        }
    }

    #[test]
    fn test_decode_length_mismatch() {
        let mut bytes = encode_in(80, IpAddr::V4(Ipv4Addr::LOCALHOST)).into_bytes();
        bytes.push(0);
        let err = decode(&bytes).unwrap_err();
        assert!(err.to_string().contains("length mismatch"));

        let bytes = encode_in(80, IpAddr::V6(Ipv6Addr::LOCALHOST)).into_bytes();
        assert!(decode(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_decode_unknown_family_is_opaque() {
        let mut bytes = vec![0u8; 16];
        let family = 200 as libc::sa_family_t;
        bytes[FAMILY_OFFSET..FAMILY_TAG_LEN].copy_from_slice(&family.to_ne_bytes());
        let address = decode(&bytes).unwrap();
        assert_eq!(
            address,
            Address::Opaque {
                family: 200,
                bytes: bytes.clone()
            }
        );
        assert_eq!(address.encode().unwrap().as_bytes(), &bytes[..]);
    }

    #[test]
    fn test_inet6_scope_rendering() {
        let address = Address::Inet6 {
            ip: "fe80::1".parse().unwrap(),
            port: 22,
            flowinfo: 0,
            scope_id: 3,
        };
        assert_eq!(address.numeric_host().as_deref(), Some("fe80::1%3"));
        assert_eq!(address.encode().unwrap().decode().unwrap(), address);
    }

    #[test]
    fn test_decode_in() {
        let packed = encode_in(443, "::1".parse().unwrap());
        assert_eq!(decode_in(packed.as_bytes()).unwrap(), (443, "::1".parse().unwrap()));

        let err = decode_in(&[0u8]).unwrap_err();
        assert_eq!(err.to_string(), "too short sockaddr");

        let unix = encode_un(b"/tmp/x").unwrap();
        let err = decode_in(unix.as_bytes()).unwrap_err();
        assert_eq!(err.to_string(), "not an AF_INET/AF_INET6 sockaddr");
    }

    #[test]
    fn test_encode_un_limits() {
        let path = vec![b'a'; MAX_UNIX_PATH_LEN];
        let packed = encode_un(&path).unwrap();
        assert_eq!(packed.len(), SOCKADDR_UN_LEN);
        assert_eq!(decode_un(packed.as_bytes()).unwrap(), path);

        let err = encode_un(&vec![b'a'; MAX_UNIX_PATH_LEN + 1]).unwrap_err();
        assert_eq!(
            err,
            SocketError::InvalidArgument(ArgumentError::PathTooLong {
                len: MAX_UNIX_PATH_LEN + 1,
                max: MAX_UNIX_PATH_LEN
            })
        );

        let err = encode_un(b"/tmp/a\0b").unwrap_err();
        assert!(matches!(err, SocketError::InvalidArgument(ArgumentError::NulByte(_))));
    }

    #[test]
    fn test_decode_un_not_nul_terminated() {
        let mut bytes = encode_un(b"").unwrap().into_bytes();
        for byte in &mut bytes[SUN_PATH_OFFSET..] {
            *byte = b'x';
        }
        assert_eq!(decode_un(&bytes).unwrap_err(), SocketError::InvalidArgument(ArgumentError::NotNulTerminated));

        // the same path in a buffer one byte short is taken verbatim
        let short = &bytes[..bytes.len() - 1];
        assert_eq!(decode_un(short).unwrap(), vec![b'x'; SUN_PATH_LEN - 1]);
    }

    #[test]
    fn test_decode_un_unnamed_and_too_long() {
        let packed = encode_un(b"/tmp/s").unwrap();
        assert_eq!(decode_un(&packed.as_bytes()[..SUN_PATH_OFFSET]).unwrap(), Vec::<u8>::new());

        let mut long = packed.into_bytes();
        long.push(0);
        let err = decode_un(&long).unwrap_err();
        assert!(err.to_string().starts_with("too long sockaddr_un"));

        let inet = encode_in(1, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(decode_un(inet.as_bytes()).unwrap_err().to_string(), "not an AF_UNIX sockaddr");
    }

    #[test]
    fn test_to_storage() {
        let packed = encode_in(9, IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)));
        let (storage, len) = packed.to_storage().unwrap();
        assert_eq!(len as usize, SOCKADDR_IN_LEN);
        assert_eq!(storage.ss_family as i32, libc::AF_INET);

        let oversized = PackedAddress::from_bytes(vec![0; SOCKADDR_STORAGE_LEN + 1]);
        assert!(oversized.to_storage().is_err());
    }

    proptest! {
        #[test]
        fn prop_inet_round_trip(octets in any::<[u8; 4]>(), port in any::<u16>()) {
            let packed = encode(libc::AF_INET, port, &octets).unwrap();
            let address = packed.decode().unwrap();
            prop_assert_eq!(address.port(), Some(port));
            prop_assert_eq!(address.ip_octets(), Some(octets.to_vec()));
        }

        #[test]
        fn prop_inet6_round_trip(octets in any::<[u8; 16]>(), port in any::<u16>()) {
            let packed = encode(libc::AF_INET6, port, &octets).unwrap();
            let address = packed.decode().unwrap();
            prop_assert_eq!(address.family(), libc::AF_INET6);
            prop_assert_eq!(address.port(), Some(port));
            prop_assert_eq!(address.ip_octets(), Some(octets.to_vec()));
        }

        #[test]
        fn prop_unix_path_round_trip(path in proptest::collection::vec(1u8..=255, 0..=MAX_UNIX_PATH_LEN)) {
            let packed = encode_un(&path).unwrap();
            prop_assert_eq!(decode_un(packed.as_bytes()).unwrap(), path);
        }

        #[test]
        fn prop_decode_never_panics(bytes in proptest::collection::vec(any::<u8>(), 0..200)) {
            let _ = decode(&bytes);
        }
    }
}
