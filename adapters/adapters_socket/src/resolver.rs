//! Resolver Module
//!
//! Bridges to the platform name service: `getaddrinfo`, `getnameinfo`, the
//! services database and `gethostname`. Raw resolver output is normalized
//! into records whose order matches the resolver's preference order.
//!
//! The OS calls sit behind the [`NameService`] trait so the resolver's own
//! logic (reverse-lookup policy, forward consistency checks, service
//! fallbacks) can be driven without a network.

use crate::config::ResolverConfig;
use entities_socket::constants::family_to_name;
use entities_socket::{ArgumentError, PackedAddress, ResolverCode, SocketError, SOCKADDR_STORAGE_LEN};
use std::ffi::{CStr, CString};
use std::ptr;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Protocol assumed by service lookups when the caller names none
pub const DEFAULT_SERVICE_PROTOCOL: &str = "tcp";

// matches the buffers the resolver functions are commonly called with
const NAME_BUF_LEN: usize = 1024;
const HOSTNAME_BUF_LEN: usize = 256;

// getservbyname/getservbyport return a pointer into one static servent
static SERVICES_DB: Mutex<()> = Mutex::new(());

fn services_db() -> MutexGuard<'static, ()> {
    SERVICES_DB.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// `getaddrinfo` hints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hints {
    pub family: i32,
    pub socktype: i32,
    pub protocol: i32,
    pub flags: i32,
}

impl Default for Hints {
    fn default() -> Self {
        Self {
            family: libc::AF_UNSPEC,
            socktype: 0,
            protocol: 0,
            flags: 0,
        }
    }
}

impl Hints {
    /// Match any family, type and protocol
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_family(mut self, family: i32) -> Self {
        self.family = family;
        self
    }

    pub fn with_socktype(mut self, socktype: i32) -> Self {
        self.socktype = socktype;
        self
    }

    pub fn with_protocol(mut self, protocol: i32) -> Self {
        self.protocol = protocol;
        self
    }

    /// Replace the `AI_*` flag set
    pub fn with_flags(mut self, flags: i32) -> Self {
        self.flags = flags;
        self
    }
}

/// One raw `getaddrinfo` candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddrInfo {
    pub family: i32,
    pub socktype: i32,
    pub protocol: i32,
    pub canonical_name: Option<String>,
    pub address: PackedAddress,
}

/// Textual description of one IP address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpAddressRecord {
    /// `"AF_INET"`, `"AF_INET6"`, or the decimal family
    pub family_name: String,
    pub port: u16,
    /// Canonical or reverse-resolved name; the numeric form when neither applies
    pub hostname: String,
    pub numeric_address: String,
}

/// One normalized `getaddrinfo` result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEntry {
    pub record: IpAddressRecord,
    pub family: i32,
    pub socktype: i32,
    pub protocol: i32,
    pub address: PackedAddress,
}

/// Host entry, as produced by `gethostbyname`/`gethostbyaddr`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostRecord {
    pub canonical_name: String,
    pub aliases: Vec<String>,
    pub family: i32,
    /// Raw 4- or 16-byte addresses in resolver order
    pub addresses: Vec<Vec<u8>>,
}

/// Structured address accepted by [`Resolver::reverse_lookup`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    /// `AF_UNSPEC` lets the resolver pick
    pub family: i32,
    pub port: Option<String>,
    pub hostname: Option<String>,
    /// Preferred over `hostname` when present; never resolved through DNS
    pub numeric_address: Option<String>,
}

/// The two address shapes reverse lookups accept
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SockAddrSpec {
    Packed(PackedAddress),
    Record(AddressRecord),
}

/// Platform name service operations
pub trait NameService {
    /// Forward-resolve a host and/or service
    fn getaddrinfo(&self, host: Option<&str>, service: Option<&str>, hints: &Hints) -> Result<Vec<AddrInfo>, SocketError>;

    /// Reverse-resolve an address into `(host, service)` using `NI_*` flags
    fn getnameinfo(&self, address: &PackedAddress, flags: i32) -> Result<(String, String), SocketError>;

    /// Port registered for a service name, `None` when unknown
    fn getservbyname(&self, name: &str, protocol: &str) -> Result<Option<u16>, SocketError>;

    /// Service name registered for a port, `None` when unknown
    fn getservbyport(&self, port: u16, protocol: &str) -> Result<Option<String>, SocketError>;

    fn gethostname(&self) -> Result<String, SocketError>;
}

/// [`NameService`] backed by the C library resolver
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemNameService;

impl NameService for SystemNameService {
    fn getaddrinfo(&self, host: Option<&str>, service: Option<&str>, hints: &Hints) -> Result<Vec<AddrInfo>, SocketError> {
        let host_c = host.map(CString::new).transpose().map_err(|_| ArgumentError::NulByte("hostname"))?;
        let service_c = service
            .map(CString::new)
            .transpose()
            .map_err(|_| ArgumentError::NulByte("service name"))?;

        // SAFETY: all-zero is a valid addrinfo hint
        let mut raw_hints: libc::addrinfo = unsafe { std::mem::zeroed() };
        raw_hints.ai_family = hints.family;
        raw_hints.ai_socktype = hints.socktype;
        raw_hints.ai_protocol = hints.protocol;
        raw_hints.ai_flags = hints.flags;

        debug!(?host, ?service, family = hints.family, socktype = hints.socktype, flags = hints.flags, "getaddrinfo");
        let mut res: *mut libc::addrinfo = ptr::null_mut();
        // SAFETY: the C strings and hints outlive the call; res is freed below
        let rc = unsafe {
            libc::getaddrinfo(
                host_c.as_ref().map_or(ptr::null(), |s| s.as_ptr()),
                service_c.as_ref().map_or(ptr::null(), |s| s.as_ptr()),
                &raw_hints,
                &mut res,
            )
        };
        if rc != 0 {
            return Err(gai_error("getaddrinfo", rc));
        }

        let mut candidates = Vec::new();
        let mut cur = res;
        while !cur.is_null() {
            // SAFETY: cur is a node of the list getaddrinfo returned
            let ai = unsafe { &*cur };
            let bytes = if ai.ai_addr.is_null() {
                Vec::new()
            } else {
                // SAFETY: ai_addr points at ai_addrlen readable bytes
                unsafe { std::slice::from_raw_parts(ai.ai_addr as *const u8, ai.ai_addrlen as usize) }.to_vec()
            };
            let canonical_name = if ai.ai_canonname.is_null() {
                None
            } else {
                // SAFETY: ai_canonname is a NUL-terminated string owned by the list
                Some(unsafe { CStr::from_ptr(ai.ai_canonname) }.to_string_lossy().into_owned())
            };
            candidates.push(AddrInfo {
                family: ai.ai_family,
                socktype: ai.ai_socktype,
                protocol: ai.ai_protocol,
                canonical_name,
                address: PackedAddress::from_bytes(bytes),
            });
            cur = ai.ai_next;
        }
        if !res.is_null() {
            // SAFETY: res came from a successful getaddrinfo and is freed once
            unsafe { libc::freeaddrinfo(res) };
        }
        Ok(candidates)
    }

    fn getnameinfo(&self, address: &PackedAddress, flags: i32) -> Result<(String, String), SocketError> {
        let (storage, len) = address.to_storage()?;
        let mut host = [0 as libc::c_char; NAME_BUF_LEN];
        let mut serv = [0 as libc::c_char; NAME_BUF_LEN];

        debug!(len, flags, "getnameinfo");
        // SAFETY: storage holds len valid bytes; both buffers are writable for their length
        let rc = unsafe {
            libc::getnameinfo(
                &storage as *const libc::sockaddr_storage as *const libc::sockaddr,
                len,
                host.as_mut_ptr(),
                NAME_BUF_LEN as libc::socklen_t,
                serv.as_mut_ptr(),
                NAME_BUF_LEN as libc::socklen_t,
                flags,
            )
        };
        if rc != 0 {
            return Err(gai_error("getnameinfo", rc));
        }
        // SAFETY: getnameinfo NUL-terminates both buffers on success
        let (host, serv) = unsafe { (CStr::from_ptr(host.as_ptr()), CStr::from_ptr(serv.as_ptr())) };
        Ok((host.to_string_lossy().into_owned(), serv.to_string_lossy().into_owned()))
    }

    fn getservbyname(&self, name: &str, protocol: &str) -> Result<Option<u16>, SocketError> {
        let name_c = CString::new(name).map_err(|_| ArgumentError::NulByte("service name"))?;
        let proto_c = CString::new(protocol).map_err(|_| ArgumentError::NulByte("protocol name"))?;
        debug!(service = name, protocol, "getservbyname");
        let _db = services_db();
        // SAFETY: both strings outlive the call; the lock keeps other lookups off the entry until it is copied
        let entry = unsafe { libc::getservbyname(name_c.as_ptr(), proto_c.as_ptr()) };
        if entry.is_null() {
            return Ok(None);
        }
        // SAFETY: non-null servent from the services database
        let port = unsafe { (*entry).s_port };
        Ok(Some(u16::from_be(port as u16)))
    }

    fn getservbyport(&self, port: u16, protocol: &str) -> Result<Option<String>, SocketError> {
        let proto_c = CString::new(protocol).map_err(|_| ArgumentError::NulByte("protocol name"))?;
        debug!(port, protocol, "getservbyport");
        let _db = services_db();
        // SAFETY: proto_c outlives the call; the lock keeps other lookups off the entry until it is copied
        let entry = unsafe { libc::getservbyport(port.to_be() as libc::c_int, proto_c.as_ptr()) };
        if entry.is_null() {
            return Ok(None);
        }
        // SAFETY: non-null servent with a NUL-terminated s_name
        let name = unsafe { CStr::from_ptr((*entry).s_name) };
        Ok(Some(name.to_string_lossy().into_owned()))
    }

    fn gethostname(&self) -> Result<String, SocketError> {
        let mut buf = [0u8; HOSTNAME_BUF_LEN];
        // SAFETY: buf is writable for its full length
        let rc = unsafe { libc::gethostname(buf.as_mut_ptr() as *mut libc::c_char, buf.len()) };
        if rc != 0 {
            return Err(SocketError::last_os_error("gethostname"));
        }
        let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
    }
}

/// Map an `EAI_*` return code
///
/// `EAI_SYSTEM` means the real cause is in `errno`, so it becomes a syscall error.
fn gai_error(function: &'static str, code: i32) -> SocketError {
    if code == libc::EAI_SYSTEM {
        return SocketError::last_os_error(function);
    }
    // SAFETY: gai_strerror returns a static NUL-terminated string
    let message = unsafe { CStr::from_ptr(libc::gai_strerror(code)) };
    SocketError::resolution(function, ResolverCode::Gai(code), message.to_string_lossy().into_owned())
}

fn host_not_found(function: &'static str) -> SocketError {
    SocketError::resolution(function, ResolverCode::HostNotFound, "host not found")
}

/// Name resolution with an explicit reverse-lookup policy
pub struct Resolver<S: NameService = SystemNameService> {
    service: S,
    config: ResolverConfig,
}

impl Resolver<SystemNameService> {
    /// Resolver backed by the C library
    pub fn new(config: ResolverConfig) -> Self {
        Self::with_service(SystemNameService, config)
    }
}

impl<S: NameService> Resolver<S> {
    /// Resolver backed by an arbitrary name service
    pub fn with_service(service: S, config: ResolverConfig) -> Self {
        Self { service, config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    pub fn name_service(&self) -> &S {
        &self.service
    }

    /// Resolve a host and service into normalized candidates
    ///
    /// # Arguments
    ///
    /// * `host` - Host name or numeric address; `None` for the wildcard
    /// * `service` - Service name or decimal port; `None` for port 0
    /// * `hints` - Family, type, protocol and `AI_*` flags
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<ResolvedEntry>)` - Candidates in resolver order
    /// * `Err(SocketError)` - `Resolution` on resolver failure or an empty result
    pub fn lookup_address(&self, host: Option<&str>, service: Option<&str>, hints: &Hints) -> Result<Vec<ResolvedEntry>, SocketError> {
        let candidates = self.service.getaddrinfo(host, service, hints)?;
        if candidates.is_empty() {
            return Err(host_not_found("getaddrinfo"));
        }
        candidates
            .into_iter()
            .map(|candidate| {
                let mut record = self.describe_address(&candidate.address)?;
                if let Some(name) = candidate.canonical_name {
                    record.hostname = name;
                }
                Ok(ResolvedEntry {
                    record,
                    family: candidate.family,
                    socktype: candidate.socktype,
                    protocol: candidate.protocol,
                    address: candidate.address,
                })
            })
            .collect()
    }

    /// Describe one IP address, reverse-resolving it when the config allows
    pub fn describe_address(&self, address: &PackedAddress) -> Result<IpAddressRecord, SocketError> {
        let decoded = address.decode()?;
        let family_name = family_to_name(decoded.family());
        let (port, numeric_address) = match (decoded.port(), decoded.numeric_host()) {
            (Some(port), Some(numeric)) => (port, numeric),
            _ => {
                return Err(ArgumentError::InvalidAddress(format!("not an IP sockaddr ({})", family_name)).into());
            }
        };

        let hostname = if self.config.reverse_lookup() {
            match self.service.getnameinfo(address, 0) {
                Ok((host, _)) => host,
                Err(err) => {
                    warn!(error = %err, address = %numeric_address, "reverse lookup failed, using numeric address");
                    numeric_address.clone()
                }
            }
        } else {
            numeric_address.clone()
        };

        Ok(IpAddressRecord {
            family_name,
            port,
            hostname,
            numeric_address,
        })
    }

    /// Resolve an address into `(host, service)` names
    ///
    /// A structured address is first forward-resolved; when that yields
    /// several candidates they must all name the same host and service,
    /// otherwise the address is ambiguous.
    pub fn reverse_lookup(&self, address: &SockAddrSpec, flags: i32) -> Result<(String, String), SocketError> {
        match address {
            SockAddrSpec::Packed(packed) => {
                if packed.len() > SOCKADDR_STORAGE_LEN {
                    return Err(ArgumentError::InvalidAddress("sockaddr length too big".to_string()).into());
                }
                // rejects truncated or oversized IP structures
                packed.decode()?;
                self.service.getnameinfo(packed, flags)
            }
            SockAddrSpec::Record(record) => {
                let mut hints = Hints::new().with_family(record.family).with_socktype(if flags & libc::NI_DGRAM != 0 {
                    libc::SOCK_DGRAM
                } else {
                    libc::SOCK_STREAM
                });
                let host = match &record.numeric_address {
                    Some(numeric) => {
                        hints = hints.with_flags(libc::AI_NUMERICHOST);
                        Some(numeric.as_str())
                    }
                    None => record.hostname.as_deref(),
                };

                let candidates = self.service.getaddrinfo(host, record.port.as_deref(), &hints)?;
                let (first, rest) = candidates.split_first().ok_or_else(|| host_not_found("getaddrinfo"))?;
                let names = self.service.getnameinfo(&first.address, flags)?;
                for candidate in rest {
                    if self.service.getnameinfo(&candidate.address, flags)? != names {
                        return Err(SocketError::resolution(
                            "getnameinfo",
                            ResolverCode::AmbiguousAddress,
                            "sockaddr resolved to multiple nodename",
                        ));
                    }
                }
                Ok(names)
            }
        }
    }

    /// Host entry for a name (`gethostbyname`)
    pub fn forward_lookup(&self, name: &str) -> Result<HostRecord, SocketError> {
        let hints = Hints::new()
            .with_socktype(libc::SOCK_STREAM)
            .with_flags(libc::AI_CANONNAME);
        let candidates = self.service.getaddrinfo(Some(name), None, &hints)?;
        let first = candidates.first().ok_or_else(|| host_not_found("getaddrinfo"))?;

        let canonical_name = first.canonical_name.clone().unwrap_or_else(|| name.to_string());
        let aliases = if canonical_name != name {
            vec![name.to_string()]
        } else {
            Vec::new()
        };
        // the record carries one family; candidates of the other are left out
        let addresses = candidates
            .iter()
            .filter(|candidate| candidate.family == first.family)
            .filter_map(|candidate| candidate.address.decode().ok()?.ip_octets())
            .collect();

        Ok(HostRecord {
            canonical_name,
            aliases,
            family: first.family,
            addresses,
        })
    }

    /// Host entry for a raw 4- or 16-byte address (`gethostbyaddr`)
    ///
    /// The family defaults to `AF_INET6` for 16 bytes, `AF_INET` otherwise.
    pub fn host_by_address(&self, raw: &[u8], family: Option<i32>) -> Result<HostRecord, SocketError> {
        let family = family.unwrap_or(if raw.len() == 16 { libc::AF_INET6 } else { libc::AF_INET });
        let packed = entities_socket::encode(family, 0, raw)?;
        let (name, _) = self
            .service
            .getnameinfo(&packed, libc::NI_NAMEREQD)
            .map_err(|err| match err {
                SocketError::Resolution { message, .. } => {
                    SocketError::resolution("gethostbyaddr", ResolverCode::HostNotFound, message)
                }
                other => other,
            })?;
        Ok(HostRecord {
            canonical_name: name,
            aliases: Vec::new(),
            family,
            addresses: vec![raw.to_vec()],
        })
    }

    /// Port for a service name; decimal strings are accepted as-is
    pub fn resolve_service(&self, name: &str, protocol: Option<&str>) -> Result<u16, SocketError> {
        let protocol = protocol.unwrap_or(DEFAULT_SERVICE_PROTOCOL);
        if let Some(port) = self.service.getservbyname(name, protocol)? {
            return Ok(port);
        }
        let literal = !name.is_empty() && name.bytes().all(|b| b.is_ascii_digit());
        name.parse::<u16>().ok().filter(|_| literal).ok_or_else(|| {
            SocketError::resolution(
                "getservbyname",
                ResolverCode::UnknownService,
                format!("no such service {}/{}", name, protocol),
            )
        })
    }

    /// Service name for a port; there is no numeric fallback
    pub fn service_name(&self, port: i64, protocol: Option<&str>) -> Result<String, SocketError> {
        let port = u16::try_from(port).map_err(|_| ArgumentError::OutOfRange {
            value: port,
            target: "uint16_t",
        })?;
        let protocol = protocol.unwrap_or(DEFAULT_SERVICE_PROTOCOL);
        self.service.getservbyport(port, protocol)?.ok_or_else(|| {
            SocketError::resolution(
                "getservbyport",
                ResolverCode::UnknownService,
                format!("no such service for port {}/{}", port, protocol),
            )
        })
    }

    pub fn hostname(&self) -> Result<String, SocketError> {
        self.service.gethostname()
    }

    /// Pack the first candidate for a host and service
    pub fn resolve_sockaddr(&self, host: Option<&str>, service: Option<&str>, hints: &Hints) -> Result<PackedAddress, SocketError> {
        let candidates = self.service.getaddrinfo(host, service, hints)?;
        candidates
            .into_iter()
            .next()
            .map(|candidate| candidate.address)
            .ok_or_else(|| host_not_found("getaddrinfo"))
    }
}
