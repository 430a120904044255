//! Constants Module
//!
//! Maps symbolic family, socket-type and protocol names to the integers the
//! operating system expects, and back. The tables are assembled at compile
//! time from the constants the target platform actually defines, so a name
//! is only accepted where the OS knows it.
//!
//! Names match case-sensitively, either bare (`"INET"`, `"STREAM"`) or with
//! the platform prefix (`"AF_INET"`, `"PF_INET"`, `"SOCK_STREAM"`,
//! `"IPPROTO_TCP"`). Protocols additionally accept their protocol-database
//! spelling (`"tcp"`, `"udp"`).

use crate::error::{ArgumentError, SocketError};

/// One registered constant: bare name and platform value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Constant {
    pub name: &'static str,
    pub value: i32,
}

/// A caller-supplied constant: already numeric, or a name to look up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstantArg<'a> {
    Int(i32),
    Name(&'a str),
}

impl From<i32> for ConstantArg<'_> {
    fn from(value: i32) -> Self {
        ConstantArg::Int(value)
    }
}

impl<'a> From<&'a str> for ConstantArg<'a> {
    fn from(name: &'a str) -> Self {
        ConstantArg::Name(name)
    }
}

const FAMILIES: &[Constant] = &[
    Constant { name: "UNSPEC", value: libc::AF_UNSPEC },
    Constant { name: "INET", value: libc::AF_INET },
    Constant { name: "INET6", value: libc::AF_INET6 },
    #[cfg(unix)]
    Constant { name: "UNIX", value: libc::AF_UNIX },
    #[cfg(any(target_os = "linux", target_os = "android"))]
    Constant { name: "NETLINK", value: libc::AF_NETLINK },
    #[cfg(any(target_os = "linux", target_os = "android"))]
    Constant { name: "PACKET", value: libc::AF_PACKET },
];

const SOCKET_TYPES: &[Constant] = &[
    Constant { name: "STREAM", value: libc::SOCK_STREAM },
    Constant { name: "DGRAM", value: libc::SOCK_DGRAM },
    Constant { name: "RAW", value: libc::SOCK_RAW },
    Constant { name: "SEQPACKET", value: libc::SOCK_SEQPACKET },
    #[cfg(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd"
    ))]
    Constant { name: "RDM", value: libc::SOCK_RDM },
];

const PROTOCOLS: &[Constant] = &[
    Constant { name: "IP", value: libc::IPPROTO_IP },
    Constant { name: "ICMP", value: libc::IPPROTO_ICMP },
    Constant { name: "TCP", value: libc::IPPROTO_TCP },
    Constant { name: "UDP", value: libc::IPPROTO_UDP },
    Constant { name: "IPV6", value: libc::IPPROTO_IPV6 },
    #[cfg(unix)]
    Constant { name: "ICMPV6", value: libc::IPPROTO_ICMPV6 },
    Constant { name: "RAW", value: libc::IPPROTO_RAW },
];

// protocol database spellings (/etc/protocols)
const PROTOCOL_ALIASES: &[Constant] = &[
    Constant { name: "ip", value: libc::IPPROTO_IP },
    Constant { name: "icmp", value: libc::IPPROTO_ICMP },
    Constant { name: "tcp", value: libc::IPPROTO_TCP },
    Constant { name: "udp", value: libc::IPPROTO_UDP },
    Constant { name: "ipv6", value: libc::IPPROTO_IPV6 },
    #[cfg(unix)]
    Constant { name: "ipv6-icmp", value: libc::IPPROTO_ICMPV6 },
    Constant { name: "raw", value: libc::IPPROTO_RAW },
];

struct ConstantTable {
    kind: &'static str,
    // first prefix is the one used when rendering names
    prefixes: &'static [&'static str],
    entries: &'static [Constant],
    aliases: &'static [Constant],
}

static FAMILY_TABLE: ConstantTable = ConstantTable {
    kind: "domain",
    prefixes: &["AF_", "PF_"],
    entries: FAMILIES,
    aliases: &[],
};

static SOCKET_TYPE_TABLE: ConstantTable = ConstantTable {
    kind: "type",
    prefixes: &["SOCK_"],
    entries: SOCKET_TYPES,
    aliases: &[],
};

static PROTOCOL_TABLE: ConstantTable = ConstantTable {
    kind: "protocol",
    prefixes: &["IPPROTO_"],
    entries: PROTOCOLS,
    aliases: PROTOCOL_ALIASES,
};

impl ConstantTable {
    fn lookup(&self, name: &str) -> Option<i32> {
        let bare = self
            .prefixes
            .iter()
            .find_map(|prefix| name.strip_prefix(prefix))
            .unwrap_or(name);
        // aliases are database names and never carry a prefix
        self.entries
            .iter()
            .find(|constant| constant.name == bare)
            .or_else(|| self.aliases.iter().find(|constant| constant.name == name))
            .map(|constant| constant.value)
    }

    fn resolve(&self, arg: ConstantArg<'_>) -> Result<i32, SocketError> {
        match arg {
            ConstantArg::Int(value) => Ok(value),
            ConstantArg::Name(name) => self.lookup(name).ok_or_else(|| {
                ArgumentError::UnknownConstant {
                    kind: self.kind,
                    name: name.to_string(),
                }
                .into()
            }),
        }
    }

    fn name_of(&self, value: i32) -> String {
        match self.entries.iter().find(|constant| constant.value == value) {
            Some(constant) => format!("{}{}", self.prefixes[0], constant.name),
            None => value.to_string(),
        }
    }
}

/// Resolve an address family (`"INET"`, `"AF_INET6"`, `"PF_UNIX"`, or an integer)
///
/// # Returns
///
/// * `Ok(i32)` - Platform `AF_*` value
/// * `Err(SocketError)` - `UnknownConstant` when the name is not registered
pub fn resolve_family<'a>(arg: impl Into<ConstantArg<'a>>) -> Result<i32, SocketError> {
    FAMILY_TABLE.resolve(arg.into())
}

/// Resolve a socket type (`"STREAM"`, `"SOCK_DGRAM"`, or an integer)
pub fn resolve_socktype<'a>(arg: impl Into<ConstantArg<'a>>) -> Result<i32, SocketError> {
    SOCKET_TYPE_TABLE.resolve(arg.into())
}

/// Resolve a protocol (`"TCP"`, `"IPPROTO_UDP"`, `"tcp"`, or an integer)
pub fn resolve_protocol<'a>(arg: impl Into<ConstantArg<'a>>) -> Result<i32, SocketError> {
    PROTOCOL_TABLE.resolve(arg.into())
}

/// Render a family value as `"AF_*"`, or its decimal form when unregistered
pub fn family_to_name(value: i32) -> String {
    FAMILY_TABLE.name_of(value)
}

/// Render a socket type value as `"SOCK_*"`, or its decimal form
pub fn socktype_to_name(value: i32) -> String {
    SOCKET_TYPE_TABLE.name_of(value)
}

/// Render a protocol value as `"IPPROTO_*"`, or its decimal form
pub fn protocol_to_name(value: i32) -> String {
    PROTOCOL_TABLE.name_of(value)
}

/// Registered address families
pub fn families() -> &'static [Constant] {
    FAMILIES
}

/// Registered socket types
pub fn socket_types() -> &'static [Constant] {
    SOCKET_TYPES
}

/// Registered protocols
pub fn protocols() -> &'static [Constant] {
    PROTOCOLS
}
