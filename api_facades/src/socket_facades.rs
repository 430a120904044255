//! Socket API Facades
//!
//! Entry points for a host interpreter. Hosts hand over loosely-typed
//! values (nil, integers, strings, arrays); these facades normalize them
//! into the typed arguments of the inner layers and return typed results.

use adapters_socket::{
    AddressRecord, Hints, HostRecord, NameService, ResolvedEntry, Resolver, ResourceReclaimer, SockAddrSpec, Socket,
};
use entities_socket::constants::{resolve_family, resolve_protocol, resolve_socktype};
use entities_socket::{decode_in, decode_un, encode_un, ArgumentError, ConstantArg, PackedAddress, SocketError};
use std::net::Ipv4Addr;
use tracing::trace;

/// A scalar value as supplied by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostValue {
    Nil,
    Int(i64),
    Str(String),
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::Str(value.to_string())
    }
}

impl From<i64> for HostValue {
    fn from(value: i64) -> Self {
        HostValue::Int(value)
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(HostValue::Nil, Into::into)
    }
}

/// A socket address as supplied by the host: packed bytes or an array
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SockAddrArg {
    Packed(Vec<u8>),
    /// `[family, port, host]` or `[family, port, host, numeric_address]`
    Array(Vec<HostValue>),
}

/// Normalize a host argument
///
/// # Returns
///
/// The host string to resolve (`None` for the wildcard) and any `AI_*`
/// flags the normalization implies:
/// - `Nil` gives no host
/// - `""` and `"<any>"` give `0.0.0.0`, `"<broadcast>"` gives `255.255.255.255`
/// - integers are an IPv4 address in host byte order
///
/// The last three are numeric, so `AI_NUMERICHOST` is added.
pub fn host_arg(host: &HostValue) -> Result<(Option<String>, i32), SocketError> {
    let numeric = |ip: Ipv4Addr| Ok((Some(ip.to_string()), libc::AI_NUMERICHOST));
    match host {
        HostValue::Nil => Ok((None, 0)),
        HostValue::Int(value) => {
            let raw = u32::try_from(*value).map_err(|_| ArgumentError::OutOfRange {
                value: *value,
                target: "uint32_t",
            })?;
            numeric(Ipv4Addr::from(raw))
        }
        HostValue::Str(name) if name.is_empty() || name == "<any>" => numeric(Ipv4Addr::UNSPECIFIED),
        HostValue::Str(name) if name == "<broadcast>" => numeric(Ipv4Addr::BROADCAST),
        HostValue::Str(name) => Ok((Some(name.clone()), 0)),
    }
}

/// Normalize a port argument: `Nil` is no service, integers become decimal
pub fn port_arg(port: &HostValue) -> Option<String> {
    match port {
        HostValue::Nil => None,
        HostValue::Int(value) => Some(value.to_string()),
        HostValue::Str(name) => Some(name.clone()),
    }
}

fn family_value(family: &HostValue) -> Result<i32, SocketError> {
    match family {
        HostValue::Nil => Ok(libc::AF_UNSPEC),
        HostValue::Int(value) => i32::try_from(*value).map_err(|_| {
            ArgumentError::OutOfRange {
                value: *value,
                target: "int",
            }
            .into()
        }),
        HostValue::Str(name) => resolve_family(name.as_str()),
    }
}

/// Create a socket from symbolic or numeric arguments
///
/// # Examples
///
/// ```rust
/// use api_facades::socket_facades::socket_new;
///
/// let socket = socket_new("INET".into(), "STREAM".into(), 0.into()).unwrap();
/// assert_eq!(socket.family(), libc::AF_INET);
/// ```
pub fn socket_new(domain: ConstantArg<'_>, socket_type: ConstantArg<'_>, protocol: ConstantArg<'_>) -> Result<Socket, SocketError> {
    let (family, socket_type, protocol) = socket_triple(domain, socket_type, protocol)?;
    Socket::new(family, socket_type, protocol)
}

/// Create a connected socket pair
pub fn socketpair(
    domain: ConstantArg<'_>,
    socket_type: ConstantArg<'_>,
    protocol: ConstantArg<'_>,
    reclaimer: &dyn ResourceReclaimer,
) -> Result<(Socket, Socket), SocketError> {
    let (family, socket_type, protocol) = socket_triple(domain, socket_type, protocol)?;
    Socket::pair(family, socket_type, protocol, reclaimer)
}

/// Create a socket pair, lend both ends to `f`, then close both
///
/// If `f` panics both ends are closed while unwinding.
pub fn socketpair_with<R>(
    domain: ConstantArg<'_>,
    socket_type: ConstantArg<'_>,
    protocol: ConstantArg<'_>,
    reclaimer: &dyn ResourceReclaimer,
    f: impl FnOnce(&Socket, &Socket) -> R,
) -> Result<R, SocketError> {
    let (first, second) = socketpair(domain, socket_type, protocol, reclaimer)?;
    let result = f(&first, &second);
    let closed_first = first.close();
    let closed_second = second.close();
    closed_first.and(closed_second)?;
    Ok(result)
}

fn socket_triple(
    domain: ConstantArg<'_>,
    socket_type: ConstantArg<'_>,
    protocol: ConstantArg<'_>,
) -> Result<(i32, i32, i32), SocketError> {
    let family = resolve_family(domain)?;
    let socket_type = resolve_socktype(socket_type)?;
    let protocol = resolve_protocol(protocol)?;
    trace!(family, socket_type, protocol, "resolved socket triple");
    Ok((family, socket_type, protocol))
}

pub fn gethostname<S: NameService>(resolver: &Resolver<S>) -> Result<String, SocketError> {
    resolver.hostname()
}

/// Host entry for a name
pub fn gethostbyname<S: NameService>(resolver: &Resolver<S>, host: &HostValue) -> Result<HostRecord, SocketError> {
    match host_arg(host)? {
        (Some(name), _) => resolver.forward_lookup(&name),
        (None, _) => Err(ArgumentError::InvalidShape("host name must not be nil".to_string()).into()),
    }
}

/// Host entry for a raw 4- or 16-byte address
pub fn gethostbyaddr<S: NameService>(
    resolver: &Resolver<S>,
    address: &[u8],
    family: Option<ConstantArg<'_>>,
) -> Result<HostRecord, SocketError> {
    let family = family.map(resolve_family).transpose()?;
    resolver.host_by_address(address, family)
}

pub fn getservbyname<S: NameService>(resolver: &Resolver<S>, name: &str, protocol: Option<&str>) -> Result<u16, SocketError> {
    resolver.resolve_service(name, protocol)
}

pub fn getservbyport<S: NameService>(resolver: &Resolver<S>, port: i64, protocol: Option<&str>) -> Result<String, SocketError> {
    resolver.service_name(port, protocol)
}

/// Resolve a host and port into normalized candidates
pub fn getaddrinfo<S: NameService>(
    resolver: &Resolver<S>,
    host: &HostValue,
    port: &HostValue,
    family: Option<ConstantArg<'_>>,
    socket_type: Option<ConstantArg<'_>>,
    protocol: Option<i32>,
    flags: Option<i32>,
) -> Result<Vec<ResolvedEntry>, SocketError> {
    let (host, host_flags) = host_arg(host)?;
    let mut hints = Hints::new().with_flags(flags.unwrap_or(0) | host_flags);
    if let Some(family) = family {
        hints = hints.with_family(resolve_family(family)?);
    }
    if let Some(socket_type) = socket_type {
        hints = hints.with_socktype(resolve_socktype(socket_type)?);
    }
    if let Some(protocol) = protocol {
        hints = hints.with_protocol(protocol);
    }
    resolver.lookup_address(host.as_deref(), port_arg(port).as_deref(), &hints)
}

/// Resolve an address into `(host, service)` names
///
/// Arrays of three elements are `[family, port, host]`. Longer arrays
/// carry the numeric address fourth; when it is nil the host is used.
pub fn getnameinfo<S: NameService>(
    resolver: &Resolver<S>,
    sockaddr: &SockAddrArg,
    flags: Option<i32>,
) -> Result<(String, String), SocketError> {
    let flags = flags.unwrap_or(0);
    let address = match sockaddr {
        SockAddrArg::Packed(bytes) => SockAddrSpec::Packed(PackedAddress::from_bytes(bytes.clone())),
        SockAddrArg::Array(items) => SockAddrSpec::Record(address_record(items)?),
    };
    resolver.reverse_lookup(&address, flags)
}

fn address_record(items: &[HostValue]) -> Result<AddressRecord, SocketError> {
    let (family, port, hostname, numeric) = match items {
        [family, port, host] => (family, port, host, &HostValue::Nil),
        [family, port, host, numeric, ..] => (family, port, host, numeric),
        _ => {
            return Err(
                ArgumentError::InvalidShape(format!("array size should be 3 or 4, {} given", items.len())).into(),
            );
        }
    };
    Ok(AddressRecord {
        family: family_value(family)?,
        port: port_arg(port),
        hostname: host_arg(hostname)?.0,
        numeric_address: host_arg(numeric)?.0,
    })
}

/// Pack a port and host into a native IP socket address
pub fn pack_sockaddr_in<S: NameService>(
    resolver: &Resolver<S>,
    port: &HostValue,
    host: &HostValue,
) -> Result<PackedAddress, SocketError> {
    let (host, host_flags) = host_arg(host)?;
    let hints = Hints::new().with_flags(host_flags);
    resolver.resolve_sockaddr(host.as_deref(), port_arg(port).as_deref(), &hints)
}

/// Unpack a native IP socket address into `(port, numeric_host)`
pub fn unpack_sockaddr_in(bytes: &[u8]) -> Result<(u16, String), SocketError> {
    let (port, ip) = decode_in(bytes)?;
    Ok((port, ip.to_string()))
}

/// Pack a UNIX-domain path
pub fn pack_sockaddr_un(path: &[u8]) -> Result<PackedAddress, SocketError> {
    encode_un(path)
}

/// Unpack a UNIX-domain address into its path
pub fn unpack_sockaddr_un(bytes: &[u8]) -> Result<Vec<u8>, SocketError> {
    decode_un(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use adapters_socket::{NoopReclaimer, ResolverConfig};

    fn resolver() -> Resolver {
        Resolver::new(ResolverConfig::new())
    }

    #[test]
    fn test_host_arg_normalization() {
        assert_eq!(host_arg(&HostValue::Nil).unwrap(), (None, 0));
        assert_eq!(
            host_arg(&"".into()).unwrap(),
            (Some("0.0.0.0".to_string()), libc::AI_NUMERICHOST)
        );
        assert_eq!(
            host_arg(&"<any>".into()).unwrap(),
            (Some("0.0.0.0".to_string()), libc::AI_NUMERICHOST)
        );
        assert_eq!(
            host_arg(&"<broadcast>".into()).unwrap(),
            (Some("255.255.255.255".to_string()), libc::AI_NUMERICHOST)
        );
        assert_eq!(
            host_arg(&HostValue::Int(0x7F00_0001)).unwrap(),
            (Some("127.0.0.1".to_string()), libc::AI_NUMERICHOST)
        );
        assert_eq!(host_arg(&"example.test".into()).unwrap(), (Some("example.test".to_string()), 0));
        assert!(host_arg(&HostValue::Int(-1)).is_err());
    }

    #[test]
    fn test_port_arg_normalization() {
        assert_eq!(port_arg(&HostValue::Nil), None);
        assert_eq!(port_arg(&HostValue::Int(80)), Some("80".to_string()));
        assert_eq!(port_arg(&"http".into()), Some("http".to_string()));
        assert_eq!(HostValue::from(None::<&str>), HostValue::Nil);
    }

    #[test]
    fn test_socket_new_symbolic() {
        let socket = socket_new("INET".into(), "SOCK_DGRAM".into(), 0.into()).unwrap();
        assert_eq!(socket.socket_type(), libc::SOCK_DGRAM);

        let err = socket_new("NOPE".into(), "STREAM".into(), 0.into()).unwrap_err();
        assert_eq!(err.to_string(), "unknown socket domain: NOPE");
    }

    #[test]
    fn test_socketpair_with_lends_both_ends() {
        let received = socketpair_with("UNIX".into(), "STREAM".into(), 0.into(), &NoopReclaimer, |a, b| {
            a.send(b"x", 0).unwrap();
            b.recvfrom(4, 0).unwrap().0
        })
        .unwrap();
        assert_eq!(received, b"x");
    }

    #[test]
    fn test_getnameinfo_array_shapes() {
        let err = getnameinfo(&resolver(), &SockAddrArg::Array(vec!["AF_INET".into(), 80.into()]), None).unwrap_err();
        assert_eq!(err.to_string(), "array size should be 3 or 4, 2 given");

        let record = address_record(&["AF_INET".into(), 80.into(), "ignored".into(), "127.0.0.1".into()]).unwrap();
        assert_eq!(record.family, libc::AF_INET);
        assert_eq!(record.port.as_deref(), Some("80"));
        assert_eq!(record.numeric_address.as_deref(), Some("127.0.0.1"));

        let record = address_record(&[HostValue::Nil, HostValue::Nil, "localhost".into(), HostValue::Nil]).unwrap();
        assert_eq!(record.family, libc::AF_UNSPEC);
        assert_eq!(record.hostname.as_deref(), Some("localhost"));
        assert_eq!(record.numeric_address, None);
    }

    #[test]
    fn test_getnameinfo_numeric_flags() {
        let flags = libc::NI_NUMERICHOST | libc::NI_NUMERICSERV;
        let array = SockAddrArg::Array(vec!["AF_INET".into(), 8080.into(), "127.0.0.1".into()]);
        let (host, service) = getnameinfo(&resolver(), &array, Some(flags)).unwrap();
        assert_eq!((host.as_str(), service.as_str()), ("127.0.0.1", "8080"));

        let packed = pack_sockaddr_in(&resolver(), &8080.into(), &"127.0.0.1".into()).unwrap();
        let (host, service) = getnameinfo(&resolver(), &SockAddrArg::Packed(packed.into_bytes()), Some(flags)).unwrap();
        assert_eq!((host.as_str(), service.as_str()), ("127.0.0.1", "8080"));
    }

    #[test]
    fn test_pack_unpack_sockaddr_in() {
        let packed = pack_sockaddr_in(&resolver(), &80.into(), &"127.0.0.1".into()).unwrap();
        assert_eq!(unpack_sockaddr_in(packed.as_bytes()).unwrap(), (80, "127.0.0.1".to_string()));

        let any = pack_sockaddr_in(&resolver(), &0.into(), &"".into()).unwrap();
        assert_eq!(unpack_sockaddr_in(any.as_bytes()).unwrap(), (0, "0.0.0.0".to_string()));
    }

    #[test]
    fn test_pack_unpack_sockaddr_un() {
        let packed = pack_sockaddr_un(b"/tmp/sock").unwrap();
        assert_eq!(unpack_sockaddr_un(packed.as_bytes()).unwrap(), b"/tmp/sock");
    }

    #[test]
    fn test_getaddrinfo_numeric_host() {
        let entries = getaddrinfo(
            &resolver(),
            &HostValue::Int(0x7F00_0001),
            &80.into(),
            Some("INET".into()),
            Some("STREAM".into()),
            None,
            None,
        )
        .unwrap();
        assert_eq!(entries[0].record.family_name, "AF_INET");
        assert_eq!(entries[0].record.numeric_address, "127.0.0.1");
        assert_eq!(entries[0].record.port, 80);
    }

    #[test]
    fn test_gethostbyname_nil() {
        assert!(matches!(
            gethostbyname(&resolver(), &HostValue::Nil),
            Err(SocketError::InvalidArgument(ArgumentError::InvalidShape(_)))
        ));
    }

    #[test]
    fn test_getservbyport_range() {
        let err = getservbyport(&resolver(), 65536, None).unwrap_err();
        assert_eq!(err.to_string(), "integer 65536 too big to convert into `uint16_t'");
    }
}
