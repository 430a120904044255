//! Integration tests for entities_socket crate
//!
//! These tests drive the symbol tables and the address codec together,
//! the way the adapters layer uses them.

use entities_socket::constants::{family_to_name, resolve_family, resolve_protocol, resolve_socktype};
use entities_socket::*;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

#[test]
fn test_symbolic_family_feeds_encoder() {
    let family = resolve_family("AF_INET").unwrap();
    let packed = encode(family, 53, &Ipv4Addr::new(192, 0, 2, 53).octets()).unwrap();
    let address = decode(packed.as_bytes()).unwrap();

    assert_eq!(family_to_name(address.family()), "AF_INET");
    assert_eq!(address.numeric_host().as_deref(), Some("192.0.2.53"));
    assert_eq!(address.port(), Some(53));
}

#[test]
fn test_socket_triple_resolution() {
    let triple = (
        resolve_family("INET6").unwrap(),
        resolve_socktype("SOCK_STREAM").unwrap(),
        resolve_protocol("tcp").unwrap(),
    );
    assert_eq!(triple, (libc::AF_INET6, libc::SOCK_STREAM, libc::IPPROTO_TCP));
}

#[test]
fn test_unpack_after_pack() {
    let packed = encode_in(8080, IpAddr::V6(Ipv6Addr::LOCALHOST));
    assert_eq!(packed.len(), SOCKADDR_IN6_LEN);
    assert_eq!(decode_in(packed.as_bytes()).unwrap(), (8080, IpAddr::V6(Ipv6Addr::LOCALHOST)));
}

#[test]
fn test_unix_path_at_field_boundary() {
    let path = vec![b'p'; MAX_UNIX_PATH_LEN];
    let packed = encode_un(&path).unwrap();
    assert_eq!(packed.len(), SOCKADDR_UN_LEN);

    match decode(packed.as_bytes()).unwrap() {
        Address::Unix { path: decoded } => assert_eq!(decoded, path),
        other => panic!("Expected Unix address, got {:?}", other),
    }
}

#[test]
fn test_errors_carry_no_origin() {
    let err = decode(&[]).unwrap_err();
    assert!(matches!(err, SocketError::InvalidArgument(ArgumentError::InvalidAddress(_))));
    assert_eq!(err.origin(), None);
    assert!(!err.is_retry());
}

#[test]
fn test_socket_addr_conversions_agree() {
    let addr: std::net::SocketAddr = "127.0.0.1:80".parse().unwrap();
    let packed = PackedAddress::from(addr);
    assert_eq!(packed, encode_in(80, IpAddr::V4(Ipv4Addr::LOCALHOST)));
    assert_eq!(packed.decode().unwrap(), Address::from(addr));
}
