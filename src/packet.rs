use std::fmt;
use std::net::Ipv4Addr;

use crate::error::{Error, Result};
use crate::options::{DhcpOption, MessageType, OptionCode};

pub const DHCP_MAGIC_COOKIE: [u8; 4] = [0x63, 0x82, 0x53, 0x63];
pub const BOOTREQUEST: u8 = 1;
pub const BOOTREPLY: u8 = 2;
pub const HTYPE_ETHERNET: u8 = 1;
pub const FIXED_HEADER_SIZE: usize = 240;
pub const MAX_CHADDR_SIZE: usize = 16;
pub const BROADCAST_FLAG: u16 = 0x8000;

/// A DHCPv4 packet: the fixed 236-byte BOOTP header, the magic cookie and a
/// list of options. The chaddr field holds only the meaningful hardware
/// address bytes; encoding pads it back out to 16 bytes and rewrites hlen to
/// the actual length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpPacket {
    pub op: u8,
    pub htype: u8,
    pub hlen: u8,
    pub hops: u8,
    pub xid: u32,
    pub secs: u16,
    pub flags: u16,
    pub ciaddr: Ipv4Addr,
    pub yiaddr: Ipv4Addr,
    pub siaddr: Ipv4Addr,
    pub giaddr: Ipv4Addr,
    pub chaddr: Vec<u8>,
    pub sname: [u8; 64],
    pub file: [u8; 128],
    pub options: Vec<DhcpOption>,
}

impl DhcpPacket {
    /// A fresh outgoing request: BOOTREQUEST over Ethernet with the
    /// broadcast flag set, all address fields zeroed and the given options
    /// appended.
    pub fn request(options: &[DhcpOption]) -> Self {
        Self {
            op: BOOTREQUEST,
            htype: HTYPE_ETHERNET,
            hlen: 0,
            hops: 0,
            xid: 0,
            secs: 0,
            flags: BROADCAST_FLAG,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr: Vec::new(),
            sname: [0u8; 64],
            file: [0u8; 128],
            options: options.to_vec(),
        }
    }

    /// Builds the REQUEST that answers an OFFER: a fresh base packet that
    /// copies xid, chaddr, flags and giaddr from the offer, carries the
    /// user's parameter options, and requests the offered address from the
    /// offering server (options 50 and 54).
    pub fn request_from_offer(offer: &DhcpPacket, user_options: &[DhcpOption]) -> Self {
        let mut packet = Self::request(&[]);
        packet.add_option(
            OptionCode::MessageType as u8,
            vec![MessageType::Request as u8],
        );
        packet.options.extend_from_slice(user_options);

        packet.htype = offer.htype;
        packet.xid = offer.xid;
        packet.chaddr = offer.chaddr.clone();
        packet.hlen = offer.chaddr.len() as u8;
        packet.flags = offer.flags;
        packet.giaddr = offer.giaddr;

        packet.add_option(
            OptionCode::RequestedIpAddress as u8,
            offer.yiaddr.octets().to_vec(),
        );
        let server_id = offer
            .option(OptionCode::ServerIdentifier as u8)
            .map(|option| option.data.clone())
            .unwrap_or_default();
        packet.add_option(OptionCode::ServerIdentifier as u8, server_id);

        packet
    }

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < FIXED_HEADER_SIZE {
            return Err(Error::NotEnoughData);
        }

        if data[236..240] != DHCP_MAGIC_COOKIE {
            return Err(Error::InvalidMagicCookie);
        }

        let op = data[0];
        let htype = data[1];
        let hlen = data[2];
        let hops = data[3];

        let xid = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let secs = u16::from_be_bytes([data[8], data[9]]);
        let flags = u16::from_be_bytes([data[10], data[11]]);

        let ciaddr = Ipv4Addr::new(data[12], data[13], data[14], data[15]);
        let yiaddr = Ipv4Addr::new(data[16], data[17], data[18], data[19]);
        let siaddr = Ipv4Addr::new(data[20], data[21], data[22], data[23]);
        let giaddr = Ipv4Addr::new(data[24], data[25], data[26], data[27]);

        let addr_len = (hlen as usize).min(MAX_CHADDR_SIZE);
        let chaddr = data[28..28 + addr_len].to_vec();

        let mut sname = [0u8; 64];
        sname.copy_from_slice(&data[44..108]);

        let mut file = [0u8; 128];
        file.copy_from_slice(&data[108..236]);

        let options = Self::parse_options(&data[240..])?;

        Ok(Self {
            op,
            htype,
            hlen,
            hops,
            xid,
            secs,
            flags,
            ciaddr,
            yiaddr,
            siaddr,
            giaddr,
            chaddr,
            sname,
            file,
            options,
        })
    }

    fn parse_options(data: &[u8]) -> Result<Vec<DhcpOption>> {
        let mut options = Vec::new();
        let mut index = 0;

        while index < data.len() {
            let code = data[index];

            if code == OptionCode::Pad as u8 {
                index += 1;
                continue;
            }

            if code == OptionCode::End as u8 {
                break;
            }

            if index + 1 >= data.len() {
                return Err(Error::NotEnoughData);
            }

            let length = data[index + 1] as usize;

            if index + 2 + length > data.len() {
                return Err(Error::Malformed);
            }

            let payload = data[index + 2..index + 2 + length].to_vec();
            options.push(DhcpOption::new(code, payload));

            index += 2 + length;
        }

        Ok(options)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut packet = Vec::with_capacity(self.encoded_len());

        packet.push(self.op);
        packet.push(self.htype);
        packet.push(self.chaddr.len().min(MAX_CHADDR_SIZE) as u8);
        packet.push(self.hops);

        packet.extend_from_slice(&self.xid.to_be_bytes());
        packet.extend_from_slice(&self.secs.to_be_bytes());
        packet.extend_from_slice(&self.flags.to_be_bytes());

        packet.extend_from_slice(&self.ciaddr.octets());
        packet.extend_from_slice(&self.yiaddr.octets());
        packet.extend_from_slice(&self.siaddr.octets());
        packet.extend_from_slice(&self.giaddr.octets());

        let mut chaddr = [0u8; MAX_CHADDR_SIZE];
        let addr_len = self.chaddr.len().min(MAX_CHADDR_SIZE);
        chaddr[..addr_len].copy_from_slice(&self.chaddr[..addr_len]);
        packet.extend_from_slice(&chaddr);

        packet.extend_from_slice(&self.sname);
        packet.extend_from_slice(&self.file);

        packet.extend_from_slice(&DHCP_MAGIC_COOKIE);

        for option in &self.options {
            if option.code == OptionCode::Pad as u8 || option.code == OptionCode::End as u8 {
                packet.push(option.code);
                continue;
            }
            if option.data.len() > u8::MAX as usize {
                return Err(Error::OversizedOption(option.code));
            }
            packet.push(option.code);
            packet.push(option.data.len() as u8);
            packet.extend_from_slice(&option.data);
        }

        packet.push(OptionCode::End as u8);

        Ok(packet)
    }

    fn encoded_len(&self) -> usize {
        let options: usize = self
            .options
            .iter()
            .map(|option| {
                if option.code == OptionCode::Pad as u8 || option.code == OptionCode::End as u8 {
                    1
                } else {
                    option.data.len() + 2
                }
            })
            .sum();
        FIXED_HEADER_SIZE + options + 1
    }

    /// Value of option 53 when present with length 1, Unspecified otherwise.
    pub fn message_type(&self) -> MessageType {
        for option in &self.options {
            if option.code == OptionCode::MessageType as u8
                && let [value] = option.data.as_slice()
            {
                return MessageType::from(*value);
            }
        }
        MessageType::Unspecified
    }

    pub fn option(&self, code: u8) -> Option<&DhcpOption> {
        self.options.iter().find(|option| option.code == code)
    }

    pub fn add_option(&mut self, code: u8, data: Vec<u8>) {
        self.options.push(DhcpOption::new(code, data));
    }

    /// Appends codes to the parameter request list, creating option 55 on
    /// first use.
    pub fn add_param_request(&mut self, codes: &[u8]) {
        for code in codes {
            match self
                .options
                .iter_mut()
                .find(|option| option.code == OptionCode::ParameterRequestList as u8)
            {
                Some(option) => option.data.push(*code),
                None => self.add_option(OptionCode::ParameterRequestList as u8, vec![*code]),
            }
        }
    }

    pub fn set_broadcast(&mut self) {
        self.flags = BROADCAST_FLAG;
    }

    pub fn set_unicast(&mut self) {
        self.flags = 0;
    }

    pub fn is_broadcast(&self) -> bool {
        (self.flags & BROADCAST_FLAG) != 0
    }

    pub fn mac_address(&self) -> String {
        self.chaddr
            .iter()
            .map(|byte| format!("{:02x}", byte))
            .collect::<Vec<_>>()
            .join(":")
    }
}

fn op_name(op: u8) -> &'static str {
    match op {
        BOOTREQUEST => "Request",
        BOOTREPLY => "Reply",
        _ => "Unknown",
    }
}

fn flags_name(flags: u16) -> &'static str {
    if (flags & BROADCAST_FLAG) != 0 {
        "Broadcast"
    } else {
        "Unicast"
    }
}

fn field_string(data: &[u8]) -> String {
    let end = data.iter().position(|byte| *byte == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).to_string()
}

impl fmt::Display for DhcpPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "  op={}  chaddr={}  hops={}  xid={:x}  secs={}  flags={}",
            op_name(self.op),
            self.mac_address(),
            self.hops,
            self.xid,
            self.secs,
            flags_name(self.flags),
        )?;
        writeln!(
            f,
            "  ciaddr={}  yiaddr={}  siaddr={}  giaddr={}  sname={}  file={}",
            self.ciaddr,
            self.yiaddr,
            self.siaddr,
            self.giaddr,
            field_string(&self.sname),
            field_string(&self.file),
        )?;
        writeln!(f, "  {} options:", self.options.len())?;
        for option in &self.options {
            writeln!(f, "     {}", option)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_discover() -> DhcpPacket {
        let mut packet = DhcpPacket::request(&[]);
        packet.xid = 0xDEADBEEF;
        packet.chaddr = vec![0x02, 0x00, 0x00, 0x11, 0x22, 0x33];
        packet.add_option(
            OptionCode::MessageType as u8,
            vec![MessageType::Discover as u8],
        );
        packet.add_option(OptionCode::Hostname as u8, b"h1".to_vec());
        packet
    }

    #[test]
    fn test_encode_discover_layout() {
        let encoded = test_discover().encode().unwrap();

        assert_eq!(encoded[0], BOOTREQUEST);
        assert_eq!(encoded[2], 6, "hlen must match the chaddr byte count");
        assert_eq!(&encoded[4..8], &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(&encoded[236..240], &DHCP_MAGIC_COOKIE);

        let parsed = DhcpPacket::parse(&encoded).unwrap();
        let msg_type = parsed.option(53).unwrap();
        assert_eq!(msg_type.len(), 1);
        assert_eq!(msg_type.data, vec![MessageType::Discover as u8]);
        assert_eq!(*encoded.last().unwrap(), 255);
    }

    #[test]
    fn test_roundtrip() {
        let packet = test_discover();
        let reparsed = DhcpPacket::parse(&packet.encode().unwrap()).unwrap();

        assert_eq!(reparsed.xid, packet.xid);
        assert_eq!(reparsed.chaddr, packet.chaddr);
        assert_eq!(reparsed.flags, packet.flags);
        assert_eq!(reparsed.options, packet.options);
        assert_eq!(reparsed.message_type(), MessageType::Discover);
        assert_eq!(reparsed.mac_address(), "02:00:00:11:22:33");
    }

    #[test]
    fn test_too_short_rejected() {
        assert!(matches!(
            DhcpPacket::parse(&[0u8; 100]),
            Err(Error::NotEnoughData)
        ));
    }

    #[test]
    fn test_invalid_magic_cookie() {
        let mut encoded = test_discover().encode().unwrap();
        encoded[236..240].copy_from_slice(&[0x63, 0x82, 0x53, 0x00]);
        assert!(matches!(
            DhcpPacket::parse(&encoded),
            Err(Error::InvalidMagicCookie)
        ));
    }

    #[test]
    fn test_truncated_option_is_malformed() {
        let mut encoded = test_discover().encode().unwrap();
        // Declared length runs past the end of the buffer.
        encoded.truncate(FIXED_HEADER_SIZE);
        encoded.extend_from_slice(&[12, 200, b'h', b'i']);
        assert!(matches!(DhcpPacket::parse(&encoded), Err(Error::Malformed)));
    }

    #[test]
    fn test_missing_length_byte() {
        let mut encoded = test_discover().encode().unwrap();
        encoded.truncate(FIXED_HEADER_SIZE);
        encoded.push(12);
        assert!(matches!(
            DhcpPacket::parse(&encoded),
            Err(Error::NotEnoughData)
        ));
    }

    #[test]
    fn test_bytes_after_end_ignored() {
        let mut encoded = test_discover().encode().unwrap();
        // Trailing garbage after the end marker must not become options.
        encoded.extend_from_slice(&[12, 2, b'x', b'y']);
        let parsed = DhcpPacket::parse(&encoded).unwrap();
        assert_eq!(parsed.options.len(), 2);
    }

    #[test]
    fn test_pad_options_skipped() {
        let mut encoded = test_discover().encode().unwrap();
        let end = encoded.len() - 1;
        encoded[end] = 0;
        encoded.extend_from_slice(&[0, 0, 255]);
        let parsed = DhcpPacket::parse(&encoded).unwrap();
        assert_eq!(parsed.options.len(), 2);
    }

    #[test]
    fn test_oversized_option_rejected() {
        let mut packet = test_discover();
        packet.options.push(DhcpOption::new(60, vec![0u8; 300]));
        assert!(matches!(packet.encode(), Err(Error::OversizedOption(60))));
    }

    #[test]
    fn test_message_type_unspecified() {
        let packet = DhcpPacket::request(&[]);
        assert_eq!(packet.message_type(), MessageType::Unspecified);

        let mut bad_len = DhcpPacket::request(&[]);
        bad_len.add_option(53, vec![1, 2]);
        assert_eq!(bad_len.message_type(), MessageType::Unspecified);
    }

    #[test]
    fn test_request_from_offer() {
        let mut offer = DhcpPacket::request(&[]);
        offer.op = BOOTREPLY;
        offer.xid = 7;
        offer.chaddr = vec![0x02, 0x00, 0x00, 0xaa, 0xbb, 0xcc];
        offer.yiaddr = Ipv4Addr::new(10, 0, 0, 2);
        offer.add_option(53, vec![MessageType::Offer as u8]);
        offer.add_option(54, vec![10, 0, 0, 1]);

        let user_options = vec![DhcpOption::new(12, b"h1".to_vec())];
        let request = DhcpPacket::request_from_offer(&offer, &user_options);

        assert_eq!(request.op, BOOTREQUEST);
        assert_eq!(request.xid, 7);
        assert_eq!(request.chaddr, offer.chaddr);
        assert_eq!(request.message_type(), MessageType::Request);
        assert_eq!(request.option(50).unwrap().data, vec![10, 0, 0, 2]);
        assert_eq!(request.option(54).unwrap().data, vec![10, 0, 0, 1]);
        assert!(request.option(12).is_some());
    }

    #[test]
    fn test_param_request_accumulates() {
        let mut packet = DhcpPacket::request(&[]);
        packet.add_param_request(&[1, 3]);
        packet.add_param_request(&[6]);
        assert_eq!(packet.option(55).unwrap().data, vec![1, 3, 6]);
    }
}
