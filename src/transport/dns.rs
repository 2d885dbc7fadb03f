//! Wildcard DNS responder for the captive portal.
//!
//! Every query gets an A record pointing at the portal address, which is
//! what makes OS connectivity probes land on the portal instead of timing
//! out. The socket is non-blocking and [`CaptiveDns::serve_one`] handles at
//! most one datagram, so the poll loop never stalls on DNS traffic.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

use log::{debug, info};

use super::TransportError;

/// Largest datagram we accept; standard plain-DNS message limit.
const MAX_PACKET: usize = 512;

/// TTL on the answers. Short, so clients re-ask once the portal is gone.
const ANSWER_TTL_SECS: u32 = 60;

/// Non-blocking UDP responder answering every name with one fixed address.
pub struct CaptiveDns {
    port: u16,
    answer: Ipv4Addr,
    socket: Option<UdpSocket>,
}

impl CaptiveDns {
    /// Create a responder for the given port (53 on-device, anything free in
    /// tests). Nothing is bound until [`CaptiveDns::open`].
    pub fn new(port: u16) -> Self {
        Self {
            port,
            answer: Ipv4Addr::UNSPECIFIED,
            socket: None,
        }
    }

    /// Bind the socket and start answering with `answer`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Bind`] when the port cannot be bound or the
    /// socket cannot be switched to non-blocking mode.
    pub fn open(&mut self, answer: Ipv4Addr) -> Result<(), TransportError> {
        let bind = |e| TransportError::Bind {
            port: self.port,
            source: e,
        };
        let socket = UdpSocket::bind(("0.0.0.0", self.port)).map_err(bind)?;
        socket.set_nonblocking(true).map_err(bind)?;
        info!("captive DNS answering every query with {answer}");
        self.answer = answer;
        self.socket = Some(socket);
        Ok(())
    }

    /// Drop the socket. Idempotent.
    pub fn close(&mut self) {
        if self.socket.take().is_some() {
            debug!("captive DNS closed");
        }
    }

    /// Address the responder is bound to while open.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Service at most one pending query. Returns whether a datagram was
    /// consumed (malformed ones are consumed and dropped).
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Recv`]/[`TransportError::Send`] on socket
    /// failures other than "nothing pending".
    pub fn serve_one(&mut self) -> Result<bool, TransportError> {
        let Some(socket) = self.socket.as_ref() else {
            return Ok(false);
        };

        let mut query = [0u8; MAX_PACKET];
        let (len, peer) = match socket.recv_from(&mut query) {
            Ok(received) => received,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
            Err(e) => return Err(TransportError::Recv(e)),
        };

        let Some(question) = parse_question(&query[..len]) else {
            debug!("ignoring malformed DNS packet from {peer}");
            return Ok(true);
        };

        let response = build_response(&query[..len], &question, self.answer);
        socket.send_to(&response, peer).map_err(TransportError::Send)?;

        let shown = if question.name.is_empty() { "(root)" } else { question.name.as_str() };
        debug!("dns {} -> {} (qtype {})", shown, self.answer, question.qtype);
        Ok(true)
    }
}

/// The first question of a query, plus how many bytes it occupied.
struct Question {
    name: String,
    qtype: u16,
    len: usize,
}

/// Decode the question section. Label compression never appears in
/// questions, so a plain label walk is enough.
fn parse_question(packet: &[u8]) -> Option<Question> {
    if packet.len() < 12 {
        return None;
    }

    let mut idx = 12;
    let mut name = String::new();

    loop {
        let label_len = *packet.get(idx)? as usize;
        idx += 1;
        if label_len == 0 {
            break;
        }
        let label = packet.get(idx..idx + label_len)?;
        if !name.is_empty() {
            name.push('.');
        }
        name.push_str(&String::from_utf8_lossy(label));
        idx += label_len;
    }

    let qtype = u16::from_be_bytes([*packet.get(idx)?, *packet.get(idx + 1)?]);
    // qclass follows; nothing to check, everything gets the same answer.
    packet.get(idx + 3)?;
    idx += 4;

    Some(Question {
        name,
        qtype,
        len: idx - 12,
    })
}

/// Assemble the response: echoed question plus a single A record. Non-A
/// queries get the same A answer, matching wildcard-responder behavior.
fn build_response(query: &[u8], question: &Question, answer: Ipv4Addr) -> Vec<u8> {
    let question_end = 12 + question.len;
    let mut response = Vec::with_capacity(question_end + 16);

    response.extend_from_slice(&query[0..2]); // transaction id
    response.extend_from_slice(&[0x81, 0x80]); // standard response, recursion available
    response.extend_from_slice(&query[4..6]); // QDCOUNT echoed
    response.extend_from_slice(&1u16.to_be_bytes()); // ANCOUNT
    response.extend_from_slice(&0u32.to_be_bytes()); // NSCOUNT + ARCOUNT

    response.extend_from_slice(&query[12..question_end]);

    response.extend_from_slice(&[0xC0, 0x0C]); // name: pointer to the question
    response.extend_from_slice(&1u16.to_be_bytes()); // TYPE A
    response.extend_from_slice(&1u16.to_be_bytes()); // CLASS IN
    response.extend_from_slice(&ANSWER_TTL_SECS.to_be_bytes());
    response.extend_from_slice(&4u16.to_be_bytes()); // RDLENGTH
    response.extend_from_slice(&answer.octets());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hand-built query for `name`, qtype A, transaction id 0xabcd.
    fn query_for(name: &str) -> Vec<u8> {
        let mut packet = vec![
            0xab, 0xcd, // id
            0x01, 0x00, // standard query, recursion desired
            0x00, 0x01, // QDCOUNT
            0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // AN/NS/AR
        ];
        for label in name.split('.').filter(|l| !l.is_empty()) {
            packet.push(label.len() as u8);
            packet.extend_from_slice(label.as_bytes());
        }
        packet.push(0);
        packet.extend_from_slice(&1u16.to_be_bytes()); // qtype A
        packet.extend_from_slice(&1u16.to_be_bytes()); // qclass IN
        packet
    }

    // ==================== Parsing Tests ====================

    #[test]
    fn test_parse_question_name_and_type() {
        let packet = query_for("connectivitycheck.gstatic.com");
        let question = parse_question(&packet).unwrap();
        assert_eq!(question.name, "connectivitycheck.gstatic.com");
        assert_eq!(question.qtype, 1);
        assert_eq!(12 + question.len, packet.len());
    }

    #[test]
    fn test_parse_rejects_truncated_packets() {
        let packet = query_for("example.com");
        assert!(parse_question(&packet[..8]).is_none());
        assert!(parse_question(&packet[..packet.len() - 3]).is_none());
    }

    // ==================== Response Tests ====================

    #[test]
    fn test_response_answers_with_fixed_address() {
        let packet = query_for("captive.apple.com");
        let question = parse_question(&packet).unwrap();
        let response = build_response(&packet, &question, Ipv4Addr::new(192, 168, 4, 1));

        // Same transaction, response flags, one answer.
        assert_eq!(&response[0..2], &[0xab, 0xcd]);
        assert_eq!(&response[2..4], &[0x81, 0x80]);
        assert_eq!(&response[6..8], &[0x00, 0x01]);
        // Question echoed verbatim.
        let question_end = 12 + question.len;
        assert_eq!(&response[12..question_end], &packet[12..]);
        // A record payload is the portal address.
        assert_eq!(&response[response.len() - 4..], &[192, 168, 4, 1]);
    }

    #[test]
    fn test_non_a_queries_still_get_an_a_answer() {
        let mut packet = query_for("example.com");
        let qtype_at = packet.len() - 4;
        packet[qtype_at..qtype_at + 2].copy_from_slice(&28u16.to_be_bytes()); // AAAA
        let question = parse_question(&packet).unwrap();
        assert_eq!(question.qtype, 28);

        let response = build_response(&packet, &question, Ipv4Addr::new(10, 0, 0, 1));
        let answer = &response[12 + question.len..];
        assert_eq!(&answer[2..4], &1u16.to_be_bytes()); // answered as TYPE A
        assert_eq!(&response[response.len() - 4..], &[10, 0, 0, 1]);
    }

    // ==================== Lifecycle Tests ====================

    #[test]
    fn test_serve_without_socket_is_a_noop() {
        let mut dns = CaptiveDns::new(0);
        assert!(!dns.serve_one().unwrap());
        dns.close();
    }
}
