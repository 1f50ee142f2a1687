//! NetBIOS name service client (RFC 1001/1002) over UDP port 137
//!
//! Only the two queries the resolver needs are implemented: NB name query
//! (name to address) and NBSTAT node status (address to name table).

use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs, UdpSocket};
use std::time::{Duration, Instant};

use bytes::{Buf, BufMut, BytesMut};
use tracing::{debug, trace};

use super::{NameService, NameServiceError, NetbiosName};

/// Name service UDP port
pub const NBNS_PORT: u16 = 137;

const NETBIOS_NAME_MAX_LEN: usize = 15;
const NETBIOS_NAME_LEN: usize = 16;
const NETBIOS_ENCODED_NAME_LEN: usize = 32;

const QTYPE_NB: u16 = 0x0020;
const QTYPE_NBSTAT: u16 = 0x0021;
const QCLASS_IN: u16 = 0x0001;

const FLAG_RESPONSE: u16 = 0x8000;
const FLAG_RECURSION_DESIRED: u16 = 0x0100;
const FLAG_BROADCAST: u16 = 0x0010;
const RCODE_MASK: u16 = 0x000F;

const NAME_FLAG_GROUP: u16 = 0x8000;
const NAME_FLAG_ACTIVE: u16 = 0x0400;

const HEADER_LEN: usize = 12;
/// TYPE, CLASS, TTL and RDLENGTH of a resource record
const RR_FIXED_LEN: usize = 10;
/// Name, suffix byte and NAME_FLAGS of one node status entry
const NODE_NAME_ENTRY_LEN: usize = NETBIOS_NAME_MAX_LEN + 3;
const MAX_DATAGRAM: usize = 1500;

/// First-level encoding: each half-byte becomes a letter 'A'..='P'
fn encode_name(name: &str, suffix: u8, pad: u8) -> Result<[u8; NETBIOS_ENCODED_NAME_LEN], NameServiceError> {
    if name.is_empty() || name.len() > NETBIOS_NAME_MAX_LEN || !name.is_ascii() {
        return Err(NameServiceError::InvalidName(name.to_string()));
    }

    let mut padded = [pad; NETBIOS_NAME_LEN];
    padded[..name.len()].copy_from_slice(name.to_ascii_uppercase().as_bytes());
    padded[NETBIOS_NAME_LEN - 1] = suffix;

    let mut encoded = [0u8; NETBIOS_ENCODED_NAME_LEN];
    for (i, &byte) in padded.iter().enumerate() {
        encoded[i * 2] = b'A' + (byte >> 4);
        encoded[i * 2 + 1] = b'A' + (byte & 0x0F);
    }
    Ok(encoded)
}

fn build_request(transaction_id: u16, flags: u16, encoded: &[u8; NETBIOS_ENCODED_NAME_LEN], qtype: u16) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(HEADER_LEN + NETBIOS_ENCODED_NAME_LEN + 6);
    buf.put_u16(transaction_id);
    buf.put_u16(flags);
    buf.put_u16(1); // QDCOUNT
    buf.put_u16(0); // ANCOUNT
    buf.put_u16(0); // NSCOUNT
    buf.put_u16(0); // ARCOUNT
    buf.put_u8(NETBIOS_ENCODED_NAME_LEN as u8);
    buf.put_slice(encoded);
    buf.put_u8(0); // empty scope
    buf.put_u16(qtype);
    buf.put_u16(QCLASS_IN);
    buf.to_vec()
}

/// Name query for `name` with the given suffix
pub fn name_query_packet(transaction_id: u16, name: &str, suffix: u8, broadcast: bool) -> Result<Vec<u8>, NameServiceError> {
    let encoded = encode_name(name, suffix, b' ')?;
    let mut flags = FLAG_RECURSION_DESIRED;
    if broadcast {
        flags |= FLAG_BROADCAST;
    }
    Ok(build_request(transaction_id, flags, &encoded, QTYPE_NB))
}

/// Node status request for the wildcard name
pub fn node_status_packet(transaction_id: u16) -> Vec<u8> {
    let mut encoded = [0u8; NETBIOS_ENCODED_NAME_LEN];
    let mut padded = [0u8; NETBIOS_NAME_LEN];
    padded[0] = b'*';
    for (i, &byte) in padded.iter().enumerate() {
        encoded[i * 2] = b'A' + (byte >> 4);
        encoded[i * 2 + 1] = b'A' + (byte & 0x0F);
    }
    build_request(transaction_id, 0, &encoded, QTYPE_NBSTAT)
}

/// Fail with `Malformed` unless `len` more bytes are available
fn ensure(buf: &[u8], len: usize) -> Result<(), NameServiceError> {
    if buf.remaining() < len {
        return Err(NameServiceError::Malformed(format!(
            "truncated response: need {} bytes, {} left",
            len,
            buf.remaining()
        )));
    }
    Ok(())
}

/// Skip a label sequence, stopping at a compression pointer
fn skip_name(buf: &mut &[u8]) -> Result<(), NameServiceError> {
    loop {
        ensure(buf, 1)?;
        let len = buf.get_u8();
        if len == 0 {
            return Ok(());
        }
        if len & 0xC0 == 0xC0 {
            ensure(buf, 1)?;
            buf.advance(1);
            return Ok(());
        }
        ensure(buf, len as usize)?;
        buf.advance(len as usize);
    }
}

/// Type and RDATA of the first answer record
struct Answer<'a> {
    rtype: u16,
    rdata: &'a [u8],
}

fn parse_answer(packet: &[u8]) -> Result<Answer<'_>, NameServiceError> {
    let mut buf = packet;
    ensure(buf, HEADER_LEN)?;
    let _transaction_id = buf.get_u16();
    let flags = buf.get_u16();
    let _qdcount = buf.get_u16();
    let ancount = buf.get_u16();
    buf.advance(4); // NSCOUNT, ARCOUNT

    if flags & FLAG_RESPONSE == 0 {
        return Err(NameServiceError::Malformed("not a response".to_string()));
    }
    let rcode = flags & RCODE_MASK;
    if rcode != 0 {
        return Err(NameServiceError::NotFound(format!("server returned rcode {}", rcode)));
    }
    if ancount == 0 {
        return Err(NameServiceError::NotFound("empty answer section".to_string()));
    }

    skip_name(&mut buf)?;
    ensure(buf, RR_FIXED_LEN)?;
    let rtype = buf.get_u16();
    let _class = buf.get_u16();
    let _ttl = buf.get_u32();
    let rdlength = buf.get_u16() as usize;
    ensure(buf, rdlength)?;

    Ok(Answer {
        rtype,
        rdata: &buf[..rdlength],
    })
}

/// Addresses from a positive name query response
pub fn parse_name_query_response(packet: &[u8]) -> Result<Vec<Ipv4Addr>, NameServiceError> {
    let answer = parse_answer(packet)?;
    if answer.rtype != QTYPE_NB {
        return Err(NameServiceError::Malformed(format!(
            "unexpected record type 0x{:04x}",
            answer.rtype
        )));
    }

    // Each entry: NB_FLAGS (2) + address (4)
    let mut rdata = answer.rdata;
    let mut addresses = Vec::with_capacity(rdata.remaining() / 6);
    while rdata.remaining() >= 6 {
        let _nb_flags = rdata.get_u16();
        addresses.push(Ipv4Addr::from(rdata.get_u32()));
    }
    Ok(addresses)
}

/// Name table from a node status response
pub fn parse_node_status_response(packet: &[u8]) -> Result<Vec<NetbiosName>, NameServiceError> {
    let answer = parse_answer(packet)?;
    if answer.rtype != QTYPE_NBSTAT {
        return Err(NameServiceError::Malformed(format!(
            "unexpected record type 0x{:04x}",
            answer.rtype
        )));
    }

    let mut rdata = answer.rdata;
    ensure(rdata, 1)?;
    let count = rdata.get_u8();
    let mut names = Vec::with_capacity(count as usize);
    for _ in 0..count {
        ensure(rdata, NODE_NAME_ENTRY_LEN)?;
        let name = String::from_utf8_lossy(&rdata[..NETBIOS_NAME_MAX_LEN])
            .trim_end_matches([' ', '\0'])
            .to_string();
        rdata.advance(NETBIOS_NAME_MAX_LEN);
        let name_type = rdata.get_u8();
        let flags = rdata.get_u16();
        names.push(NetbiosName {
            name,
            name_type,
            group: flags & NAME_FLAG_GROUP != 0,
            active: flags & NAME_FLAG_ACTIVE != 0,
        });
    }
    Ok(names)
}

/// Unicast/broadcast NBNS client
#[derive(Debug, Clone)]
pub struct NetbiosNameService {
    /// WINS server; `None` broadcasts name queries on the local segment
    name_server: Option<IpAddr>,
    /// Destination port of every query
    port: u16,
    timeout: Duration,
}

impl Default for NetbiosNameService {
    fn default() -> Self {
        Self {
            name_server: None,
            port: NBNS_PORT,
            timeout: Duration::from_millis(2000),
        }
    }
}

impl NetbiosNameService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name_server(mut self, server: IpAddr) -> Self {
        self.name_server = Some(server);
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn exchange(&self, target: SocketAddr, request: &[u8], broadcast: bool) -> Result<Vec<u8>, NameServiceError> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.set_broadcast(broadcast)?;
        socket.send_to(request, target)?;

        let transaction_id = (&request[..2]).get_u16();
        let deadline = Instant::now() + self.timeout;
        let mut buf = [0u8; MAX_DATAGRAM];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(NameServiceError::Timeout(target.to_string()));
            }
            socket.set_read_timeout(Some(remaining))?;

            let (len, from) = match socket.recv_from(&mut buf) {
                Ok(received) => received,
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    return Err(NameServiceError::Timeout(target.to_string()));
                }
                Err(e) => return Err(e.into()),
            };

            let packet = &buf[..len];
            if len >= 2 && (&packet[..2]).get_u16() == transaction_id {
                trace!(%from, len, "NBNS response");
                return Ok(packet.to_vec());
            }
            trace!(%from, "Ignoring unrelated NBNS datagram");
        }
    }

    fn node_status(&self, address: IpAddr) -> Result<Vec<NetbiosName>, NameServiceError> {
        let request = node_status_packet(rand::random());
        let response = self.exchange(SocketAddr::new(address, self.port), &request, false)?;
        let names = parse_node_status_response(&response)?;
        debug!(%address, count = names.len(), "Node status answered");
        Ok(names)
    }
}

impl NameService for NetbiosNameService {
    fn address_by_name(&self, name: &str) -> Result<IpAddr, NameServiceError> {
        if let Ok(addr) = name.parse::<IpAddr>() {
            return Ok(addr);
        }

        let (target, broadcast) = match self.name_server {
            Some(server) => (server, false),
            None => (IpAddr::V4(Ipv4Addr::BROADCAST), true),
        };
        let request = name_query_packet(rand::random(), name, 0x20, broadcast)?;
        let response = self.exchange(SocketAddr::new(target, self.port), &request, broadcast)?;

        parse_name_query_response(&response)?
            .into_iter()
            .next()
            .map(IpAddr::V4)
            .ok_or_else(|| NameServiceError::NotFound(name.to_string()))
    }

    fn names_by_address(&self, address: &str) -> Result<Vec<NetbiosName>, NameServiceError> {
        let addr: IpAddr = address
            .parse()
            .map_err(|_| NameServiceError::InvalidName(address.to_string()))?;
        self.node_status(addr)
    }

    fn is_active(&self, name: &str) -> Result<bool, NameServiceError> {
        let addr = self.address_by_name(name)?;
        Ok(self.node_status(addr)?.iter().any(|n| n.active))
    }
}

/// DNS for forward lookups, NetBIOS node status for the reverse direction
#[derive(Debug, Clone, Default)]
pub struct SystemNameService {
    netbios: NetbiosNameService,
}

impl SystemNameService {
    pub fn new(netbios: NetbiosNameService) -> Self {
        Self { netbios }
    }
}

impl NameService for SystemNameService {
    fn address_by_name(&self, name: &str) -> Result<IpAddr, NameServiceError> {
        let addrs: Vec<SocketAddr> = (name, 0).to_socket_addrs()?.collect();
        addrs
            .iter()
            .find(|a| a.is_ipv4())
            .or_else(|| addrs.first())
            .map(SocketAddr::ip)
            .ok_or_else(|| NameServiceError::NotFound(name.to_string()))
    }

    fn names_by_address(&self, address: &str) -> Result<Vec<NetbiosName>, NameServiceError> {
        self.netbios.names_by_address(address)
    }

    fn is_active(&self, name: &str) -> Result<bool, NameServiceError> {
        let addr = self.address_by_name(name)?;
        self.netbios.is_active(&addr.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_name_encoding() {
        let encoded = encode_name("A", 0x20, b' ').unwrap();
        assert_eq!(&encoded[..2], b"EB");
        assert_eq!(&encoded[2..4], b"CA");
        assert_eq!(&encoded[30..], b"CA");
    }

    #[test]
    fn test_name_too_long() {
        assert!(matches!(
            encode_name("ABCDEFGHIJKLMNOP", 0x20, b' '),
            Err(NameServiceError::InvalidName(_))
        ));
    }

    #[test]
    fn test_name_query_layout() {
        let packet = name_query_packet(0x1234, "nas", 0x20, true).unwrap();
        assert_eq!(packet.len(), HEADER_LEN + 1 + 32 + 1 + 4);
        assert_eq!(&packet[..2], &[0x12, 0x34]);
        assert_eq!(u16::from_be_bytes([packet[2], packet[3]]), 0x0110);
        assert_eq!(packet[12], 32);
        assert_eq!(&packet[packet.len() - 4..], &[0x00, 0x20, 0x00, 0x01]);
    }

    #[test]
    fn test_node_status_wildcard() {
        let packet = node_status_packet(7);
        assert_eq!(&packet[13..15], b"CK");
        assert_eq!(&packet[15..17], b"AA");
        assert_eq!(&packet[packet.len() - 4..], &[0x00, 0x21, 0x00, 0x01]);
    }

    fn response_packet(id: u16, rtype: u16, rdata: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u16(id);
        buf.put_u16(0x8500);
        buf.put_slice(&[0, 0, 0, 1, 0, 0, 0, 0]);
        buf.put_u8(32);
        buf.put_slice(&[b'A'; 32]);
        buf.put_u8(0);
        buf.put_u16(rtype);
        buf.put_u16(QCLASS_IN);
        buf.put_u32(300);
        buf.put_u16(rdata.len() as u16);
        buf.put_slice(rdata);
        buf.to_vec()
    }

    fn node_status_rdata() -> Vec<u8> {
        let mut buf = BytesMut::new();
        buf.put_u8(2);
        buf.put_slice(b"NAS            ");
        buf.put_u8(0x20);
        buf.put_u16(0x0400);
        buf.put_slice(b"WORKGROUP      ");
        buf.put_u8(0x00);
        buf.put_u16(0x8400);
        buf.put_slice(&[0u8; 46]);
        buf.to_vec()
    }

    /// Answer the first datagram with an unrelated reply, then with `reply`
    /// built for its transaction id; returns the request received
    fn respond_once<F>(socket: UdpSocket, reply: F) -> thread::JoinHandle<Vec<u8>>
    where
        F: Fn(u16) -> Vec<u8> + Send + 'static,
    {
        thread::spawn(move || {
            let mut buf = [0u8; MAX_DATAGRAM];
            let (len, from) = socket.recv_from(&mut buf).unwrap();
            let request = buf[..len].to_vec();
            let id = (&request[..]).get_u16();
            socket.send_to(&reply(id.wrapping_add(1)), from).unwrap();
            socket.send_to(&reply(id), from).unwrap();
            request
        })
    }

    fn local_responder() -> (UdpSocket, u16) {
        let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = socket.local_addr().unwrap().port();
        (socket, port)
    }

    #[test]
    fn test_parse_name_query_response() {
        let packet = response_packet(1, QTYPE_NB, &[0x00, 0x00, 192, 168, 1, 20]);
        assert_eq!(
            parse_name_query_response(&packet).unwrap(),
            vec![Ipv4Addr::new(192, 168, 1, 20)]
        );
    }

    #[test]
    fn test_parse_node_status_response() {
        let packet = response_packet(9, QTYPE_NBSTAT, &node_status_rdata());
        let names = parse_node_status_response(&packet).unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(names[0], NetbiosName::unique("NAS", 0x20));
        assert_eq!(names[1], NetbiosName::group("WORKGROUP", 0x00));
    }

    #[test]
    fn test_negative_response() {
        let mut packet = response_packet(1, QTYPE_NB, &[]);
        packet[3] = 0x03;
        assert!(matches!(
            parse_name_query_response(&packet),
            Err(NameServiceError::NotFound(_))
        ));
    }

    #[test]
    fn test_truncated_response() {
        let packet = response_packet(1, QTYPE_NB, &[0, 0, 10, 0, 0, 1]);
        assert!(matches!(
            parse_answer(&packet[..20]),
            Err(NameServiceError::Malformed(_))
        ));
        assert!(matches!(
            parse_answer(&packet[..8]),
            Err(NameServiceError::Malformed(_))
        ));
    }

    #[test]
    fn test_truncated_name_table() {
        let mut rdata = node_status_rdata();
        rdata.truncate(20);
        assert!(matches!(
            parse_node_status_response(&response_packet(2, QTYPE_NBSTAT, &rdata)),
            Err(NameServiceError::Malformed(_))
        ));
    }

    #[test]
    fn test_literal_address_short_circuits() {
        let service = NetbiosNameService::new();
        assert_eq!(
            service.address_by_name("10.1.2.3").unwrap(),
            IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3))
        );
    }

    #[test]
    fn test_node_status_exchange() {
        let (socket, port) = local_responder();
        let responder = respond_once(socket, |id| {
            response_packet(id, QTYPE_NBSTAT, &node_status_rdata())
        });

        let service = NetbiosNameService::new()
            .with_port(port)
            .with_timeout(Duration::from_secs(5));
        let names = service.names_by_address("127.0.0.1").unwrap();
        assert_eq!(names.len(), 2);
        assert_eq!(names[0], NetbiosName::unique("NAS", 0x20));

        let request = responder.join().unwrap();
        assert_eq!(&request[request.len() - 4..], &[0x00, 0x21, 0x00, 0x01]);
    }

    #[test]
    fn test_name_query_through_name_server() {
        let (socket, port) = local_responder();
        let responder = respond_once(socket, |id| {
            response_packet(id, QTYPE_NB, &[0x00, 0x00, 192, 168, 1, 20])
        });

        let service = NetbiosNameService::new()
            .with_name_server(IpAddr::V4(Ipv4Addr::LOCALHOST))
            .with_port(port)
            .with_timeout(Duration::from_secs(5));
        assert_eq!(
            service.address_by_name("nas").unwrap(),
            IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))
        );

        // Unicast to a name server: no broadcast bit
        let request = responder.join().unwrap();
        let mut header = &request[2..];
        assert_eq!(header.get_u16(), FLAG_RECURSION_DESIRED);
    }

    #[test]
    fn test_system_service_delegates_liveness() {
        let (socket, port) = local_responder();
        let responder = respond_once(socket, |id| {
            response_packet(id, QTYPE_NBSTAT, &node_status_rdata())
        });

        let netbios = NetbiosNameService::new()
            .with_port(port)
            .with_timeout(Duration::from_secs(5));
        let service = SystemNameService::new(netbios);
        assert!(service.is_active("127.0.0.1").unwrap());
        responder.join().unwrap();
    }

    #[test]
    fn test_silent_peer_times_out() {
        let (silent, port) = local_responder();
        let service = NetbiosNameService::new()
            .with_port(port)
            .with_timeout(Duration::from_millis(200));

        assert!(matches!(
            service.names_by_address("127.0.0.1"),
            Err(NameServiceError::Timeout(_))
        ));
        drop(silent);
    }
}
