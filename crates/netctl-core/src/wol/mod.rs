// # Wake-on-LAN
//
// Builds magic packets and hands them to the network stack.
//
// ## Packet format
//
// 6 bytes of 0xFF followed by the 6-byte MAC address repeated 16 times
// (102 bytes), sent as the payload of a single UDP datagram.
//
// ## Delivery
//
// WOL has no acknowledgment channel. A successful `wake` means the datagram
// was handed to the network stack, never that the device woke up.
//
// ## Interface binding
//
// When a target names an interface, the socket is bound to it. If that is
// impossible the send fails; there is no fallback to the default route.

use crate::config::WolTarget;
use crate::error::{Error, Result};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info};

/// Length of a magic packet
pub const MAGIC_PACKET_LEN: usize = 102;

/// Default bound on a send
pub const DEFAULT_WAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// A 6-byte physical address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Create from raw bytes
    pub fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Parse `AA:BB:CC:DD:EE:FF` or `AA-BB-CC-DD-EE-FF` (any case)
    ///
    /// The separator must be the same throughout.
    pub fn parse(text: &str) -> Result<Self> {
        let invalid = || {
            Error::validation(
                "mac_address",
                format!("'{}' is not a MAC address like AA:BB:CC:DD:EE:FF", text),
            )
        };

        let text = text.trim();
        let separator = if text.contains(':') { ':' } else { '-' };
        let groups: Vec<&str> = text.split(separator).collect();
        if groups.len() != 6 {
            return Err(invalid());
        }

        let mut bytes = [0u8; 6];
        for (slot, group) in bytes.iter_mut().zip(&groups) {
            if group.len() != 2 || !group.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(invalid());
            }
            *slot = u8::from_str_radix(group, 16).map_err(|_| invalid())?;
        }
        Ok(Self(bytes))
    }

    /// Raw bytes
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl std::fmt::Display for MacAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02X}:{:02X}:{:02X}:{:02X}:{:02X}:{:02X}",
            a, b, c, d, e, g
        )
    }
}

impl std::str::FromStr for MacAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// A Wake-on-LAN magic packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagicPacket([u8; MAGIC_PACKET_LEN]);

impl MagicPacket {
    /// Build the packet for a MAC address
    pub fn new(mac: MacAddress) -> Self {
        let mut bytes = [0xFFu8; MAGIC_PACKET_LEN];
        for chunk in bytes[6..].chunks_exact_mut(6) {
            chunk.copy_from_slice(&mac.0);
        }
        Self(bytes)
    }

    /// Packet payload
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// What a successful wake actually guarantees: the datagram left the socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeReport {
    /// Target id (or the MAC address for ad-hoc wakes)
    pub target: String,
    /// Address the packet was built for
    pub mac: MacAddress,
    /// Datagram destination
    pub destination: SocketAddr,
    /// Bytes handed to the network stack
    pub bytes_sent: usize,
}

/// Sends magic packets
///
/// A fresh socket is created per call, so concurrent wakes for different
/// targets never wait on each other.
#[derive(Debug, Clone)]
pub struct WolDispatcher {
    timeout: Duration,
}

impl WolDispatcher {
    /// Create a dispatcher with a send bound
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Wake a stored target
    pub async fn wake_target(&self, target: &WolTarget) -> Result<WakeReport> {
        target.validate()?;
        let mac = MacAddress::parse(&target.mac_address)?;
        self.send(
            &target.id,
            mac,
            target.broadcast_ip,
            target.port,
            target.net_interface.as_deref(),
        )
        .await
    }

    /// Wake an ad-hoc address
    pub async fn wake(
        &self,
        mac: &str,
        broadcast_ip: Ipv4Addr,
        port: u16,
        interface: Option<&str>,
    ) -> Result<WakeReport> {
        let mac = MacAddress::parse(mac)?;
        if port == 0 {
            return Err(Error::validation("port", "must be between 1 and 65535"));
        }
        self.send(&mac.to_string(), mac, broadcast_ip, port, interface)
            .await
    }

    async fn send(
        &self,
        target: &str,
        mac: MacAddress,
        broadcast_ip: Ipv4Addr,
        port: u16,
        interface: Option<&str>,
    ) -> Result<WakeReport> {
        let destination = SocketAddr::V4(SocketAddrV4::new(broadcast_ip, port));
        let packet = MagicPacket::new(mac);

        let send = async {
            let socket = UdpSocket::bind(SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0))
                .await
                .map_err(|e| send_failed(target, "bind", e))?;
            socket
                .set_broadcast(true)
                .map_err(|e| send_failed(target, "SO_BROADCAST", e))?;
            if let Some(interface) = interface {
                bind_to_interface(&socket, target, interface)?;
            }

            debug!("Sending magic packet for {} to {}", mac, destination);
            socket
                .send_to(packet.as_bytes(), destination)
                .await
                .map_err(|e| send_failed(target, "send", e))
        };

        let bytes_sent = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| Error::timeout(target, self.timeout))??;

        if bytes_sent != MAGIC_PACKET_LEN {
            return Err(Error::SendFailed {
                target: target.to_string(),
                cause: format!("short send: {} of {} bytes", bytes_sent, MAGIC_PACKET_LEN),
            });
        }

        info!("Magic packet for {} handed to the network stack ({})", mac, destination);
        Ok(WakeReport {
            target: target.to_string(),
            mac,
            destination,
            bytes_sent,
        })
    }
}

impl Default for WolDispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_WAKE_TIMEOUT)
    }
}

fn send_failed(target: &str, step: &str, e: std::io::Error) -> Error {
    Error::SendFailed {
        target: target.to_string(),
        cause: format!("{}: {}", step, e),
    }
}

fn interface_not_found(target: &str, interface: &str) -> Error {
    Error::InterfaceNotFound {
        target: target.to_string(),
        interface: interface.to_string(),
    }
}

#[cfg(unix)]
fn interface_exists(interface: &str) -> bool {
    let Ok(name) = std::ffi::CString::new(interface) else {
        return false;
    };
    // SAFETY: `name` is a valid NUL-terminated string for the whole call
    unsafe { libc::if_nametoindex(name.as_ptr()) != 0 }
}

#[cfg(not(unix))]
fn interface_exists(_interface: &str) -> bool {
    false
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn bind_to_interface(socket: &UdpSocket, target: &str, interface: &str) -> Result<()> {
    if !interface_exists(interface) {
        return Err(interface_not_found(target, interface));
    }
    socket.bind_device(Some(interface.as_bytes())).map_err(|e| {
        if e.raw_os_error() == Some(libc::ENODEV) {
            interface_not_found(target, interface)
        } else {
            send_failed(target, "SO_BINDTODEVICE", e)
        }
    })
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn bind_to_interface(_socket: &UdpSocket, target: &str, interface: &str) -> Result<()> {
    if !interface_exists(interface) {
        return Err(interface_not_found(target, interface));
    }
    Err(Error::SendFailed {
        target: target.to_string(),
        cause: format!(
            "binding to interface {} is not supported on this platform",
            interface
        ),
    })
}
