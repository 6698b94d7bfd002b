use std::fmt;
use std::net::Ipv4Addr;

/// Codes from RFC 2132 that this client can name. Anything else is carried
/// opaquely as raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OptionCode {
    Pad = 0,
    SubnetMask = 1,
    TimeOffset = 2,
    Router = 3,
    TimeServer = 4,
    NameServer = 5,
    DnsServer = 6,
    Hostname = 12,
    BootfileSize = 13,
    DomainName = 15,
    RootPath = 17,
    InterfaceMtu = 26,
    BroadcastAddress = 28,
    NtpServers = 42,
    RequestedIpAddress = 50,
    LeaseTime = 51,
    OptionOverload = 52,
    MessageType = 53,
    ServerIdentifier = 54,
    ParameterRequestList = 55,
    Message = 56,
    MaxMessageSize = 57,
    RenewalTime = 58,
    RebindingTime = 59,
    ClassIdentifier = 60,
    ClientIdentifier = 61,
    TftpServerName = 66,
    BootfileName = 67,
    End = 255,
}

impl TryFrom<u8> for OptionCode {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Pad),
            1 => Ok(Self::SubnetMask),
            2 => Ok(Self::TimeOffset),
            3 => Ok(Self::Router),
            4 => Ok(Self::TimeServer),
            5 => Ok(Self::NameServer),
            6 => Ok(Self::DnsServer),
            12 => Ok(Self::Hostname),
            13 => Ok(Self::BootfileSize),
            15 => Ok(Self::DomainName),
            17 => Ok(Self::RootPath),
            26 => Ok(Self::InterfaceMtu),
            28 => Ok(Self::BroadcastAddress),
            42 => Ok(Self::NtpServers),
            50 => Ok(Self::RequestedIpAddress),
            51 => Ok(Self::LeaseTime),
            52 => Ok(Self::OptionOverload),
            53 => Ok(Self::MessageType),
            54 => Ok(Self::ServerIdentifier),
            55 => Ok(Self::ParameterRequestList),
            56 => Ok(Self::Message),
            57 => Ok(Self::MaxMessageSize),
            58 => Ok(Self::RenewalTime),
            59 => Ok(Self::RebindingTime),
            60 => Ok(Self::ClassIdentifier),
            61 => Ok(Self::ClientIdentifier),
            66 => Ok(Self::TftpServerName),
            67 => Ok(Self::BootfileName),
            255 => Ok(Self::End),
            other => Err(other),
        }
    }
}

impl OptionCode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Pad => "Pad",
            Self::SubnetMask => "SubnetMask",
            Self::TimeOffset => "TimeOffset",
            Self::Router => "Router",
            Self::TimeServer => "TimeServer",
            Self::NameServer => "NameServer",
            Self::DnsServer => "DNS",
            Self::Hostname => "Hostname",
            Self::BootfileSize => "BootfileSize",
            Self::DomainName => "DomainName",
            Self::RootPath => "RootPath",
            Self::InterfaceMtu => "InterfaceMTU",
            Self::BroadcastAddress => "BroadcastAddress",
            Self::NtpServers => "NTPServers",
            Self::RequestedIpAddress => "RequestedIP",
            Self::LeaseTime => "LeaseTime",
            Self::OptionOverload => "OptionOverload",
            Self::MessageType => "MessageType",
            Self::ServerIdentifier => "ServerID",
            Self::ParameterRequestList => "ParamsRequest",
            Self::Message => "Message",
            Self::MaxMessageSize => "MaxMessageSize",
            Self::RenewalTime => "RenewalTime",
            Self::RebindingTime => "RebindingTime",
            Self::ClassIdentifier => "ClassID",
            Self::ClientIdentifier => "ClientID",
            Self::TftpServerName => "TFTPServerName",
            Self::BootfileName => "BootfileName",
            Self::End => "End",
        }
    }

    /// Looks a code up by name, ignoring case, spaces, dashes and
    /// underscores, so that "subnet mask", "SubnetMask" and "subnet-mask"
    /// all resolve to option 1.
    pub fn from_name(name: &str) -> Option<Self> {
        let wanted = normalize_name(name);
        ALL_CODES
            .iter()
            .find(|code| normalize_name(code.name()) == wanted)
            .copied()
    }
}

const ALL_CODES: &[OptionCode] = &[
    OptionCode::Pad,
    OptionCode::SubnetMask,
    OptionCode::TimeOffset,
    OptionCode::Router,
    OptionCode::TimeServer,
    OptionCode::NameServer,
    OptionCode::DnsServer,
    OptionCode::Hostname,
    OptionCode::BootfileSize,
    OptionCode::DomainName,
    OptionCode::RootPath,
    OptionCode::InterfaceMtu,
    OptionCode::BroadcastAddress,
    OptionCode::NtpServers,
    OptionCode::RequestedIpAddress,
    OptionCode::LeaseTime,
    OptionCode::OptionOverload,
    OptionCode::MessageType,
    OptionCode::ServerIdentifier,
    OptionCode::ParameterRequestList,
    OptionCode::Message,
    OptionCode::MaxMessageSize,
    OptionCode::RenewalTime,
    OptionCode::RebindingTime,
    OptionCode::ClassIdentifier,
    OptionCode::ClientIdentifier,
    OptionCode::TftpServerName,
    OptionCode::BootfileName,
    OptionCode::End,
];

fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_'))
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

impl fmt::Display for OptionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Unspecified = 0,
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
}

impl From<u8> for MessageType {
    fn from(value: u8) -> Self {
        match value {
            1 => Self::Discover,
            2 => Self::Offer,
            3 => Self::Request,
            4 => Self::Decline,
            5 => Self::Ack,
            6 => Self::Nak,
            7 => Self::Release,
            8 => Self::Inform,
            _ => Self::Unspecified,
        }
    }
}

impl MessageType {
    pub fn from_name(name: &str) -> Option<Self> {
        let kinds = [
            Self::Unspecified,
            Self::Discover,
            Self::Offer,
            Self::Request,
            Self::Decline,
            Self::Ack,
            Self::Nak,
            Self::Release,
            Self::Inform,
        ];
        kinds
            .into_iter()
            .find(|kind| kind.to_string().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unspecified => write!(f, "Unspecified"),
            Self::Discover => write!(f, "Discover"),
            Self::Offer => write!(f, "Offer"),
            Self::Request => write!(f, "Request"),
            Self::Decline => write!(f, "Decline"),
            Self::Ack => write!(f, "Ack"),
            Self::Nak => write!(f, "Nak"),
            Self::Release => write!(f, "Release"),
            Self::Inform => write!(f, "Inform"),
        }
    }
}

/// A single DHCP option. The payload stays an opaque byte vector regardless
/// of the option code; typed access goes through the view methods below.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpOption {
    pub code: u8,
    pub data: Vec<u8>,
}

impl DhcpOption {
    pub fn new(code: u8, data: Vec<u8>) -> Self {
        Self { code, data }
    }

    pub fn len(&self) -> u8 {
        self.data.len() as u8
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_ipv4(&self) -> Option<Ipv4Addr> {
        let bytes: [u8; 4] = self.data.as_slice().try_into().ok()?;
        Some(Ipv4Addr::from(bytes))
    }

    pub fn as_ipv4_list(&self) -> Vec<Ipv4Addr> {
        self.data
            .chunks_exact(4)
            .map(|chunk| Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]))
            .collect()
    }

    pub fn as_u16(&self) -> Option<u16> {
        let bytes: [u8; 2] = self.data.as_slice().try_into().ok()?;
        Some(u16::from_be_bytes(bytes))
    }

    pub fn as_u32(&self) -> Option<u32> {
        let bytes: [u8; 4] = self.data.as_slice().try_into().ok()?;
        Some(u32::from_be_bytes(bytes))
    }

    pub fn as_str(&self) -> String {
        String::from_utf8_lossy(&self.data).to_string()
    }
}

fn to_hex(data: &[u8]) -> String {
    data.iter().map(|byte| format!("{:02x}", byte)).collect()
}

impl fmt::Display for DhcpOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Ok(code) = OptionCode::try_from(self.code) else {
            return write!(f, "{} (Unknown): 0x{}", self.code, to_hex(&self.data));
        };

        write!(f, "{} ({}): ", self.code, code)?;
        match code {
            OptionCode::Hostname
            | OptionCode::DomainName
            | OptionCode::RootPath
            | OptionCode::Message
            | OptionCode::ClassIdentifier
            | OptionCode::TftpServerName
            | OptionCode::BootfileName => write!(f, "{}", self.as_str()),

            OptionCode::MessageType => match self.data.as_slice() {
                [value] => write!(f, "{}", MessageType::from(*value)),
                _ => write!(f, "INVALID"),
            },

            OptionCode::SubnetMask
            | OptionCode::BroadcastAddress
            | OptionCode::RequestedIpAddress
            | OptionCode::ServerIdentifier => match self.as_ipv4() {
                Some(ip) => write!(f, "{}", ip),
                None => write!(f, "INVALID"),
            },

            OptionCode::Router
            | OptionCode::TimeServer
            | OptionCode::NameServer
            | OptionCode::DnsServer
            | OptionCode::NtpServers => {
                if self.data.len() % 4 != 0 || self.data.is_empty() {
                    return write!(f, "INVALID");
                }
                let ips: Vec<String> = self
                    .as_ipv4_list()
                    .iter()
                    .map(|ip| ip.to_string())
                    .collect();
                write!(f, "{}", ips.join(","))
            }

            OptionCode::TimeOffset
            | OptionCode::LeaseTime
            | OptionCode::RenewalTime
            | OptionCode::RebindingTime => match self.as_u32() {
                Some(value) => write!(f, "{}", value),
                None => write!(f, "INVALID"),
            },

            OptionCode::BootfileSize
            | OptionCode::InterfaceMtu
            | OptionCode::MaxMessageSize => match self.as_u16() {
                Some(value) => write!(f, "{}", value),
                None => write!(f, "INVALID"),
            },

            OptionCode::ParameterRequestList => {
                let names: Vec<String> = self
                    .data
                    .iter()
                    .map(|byte| match OptionCode::try_from(*byte) {
                        Ok(code) => code.to_string(),
                        Err(other) => other.to_string(),
                    })
                    .collect();
                write!(f, "{}", names.join(","))
            }

            _ => write!(f, "0x{}", to_hex(&self.data)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_roundtrip() {
        for value in 1..=8u8 {
            let msg_type = MessageType::from(value);
            assert_eq!(msg_type as u8, value);
        }
        assert_eq!(MessageType::from(0), MessageType::Unspecified);
        assert_eq!(MessageType::from(200), MessageType::Unspecified);
    }

    #[test]
    fn test_message_type_from_name() {
        assert_eq!(MessageType::from_name("discover"), Some(MessageType::Discover));
        assert_eq!(MessageType::from_name("NAK"), Some(MessageType::Nak));
        assert_eq!(MessageType::from_name("bogus"), None);
    }

    #[test]
    fn test_option_code_from_name() {
        assert_eq!(OptionCode::from_name("subnet mask"), Some(OptionCode::SubnetMask));
        assert_eq!(OptionCode::from_name("DNS"), Some(OptionCode::DnsServer));
        assert_eq!(OptionCode::from_name("router"), Some(OptionCode::Router));
        assert_eq!(OptionCode::from_name("no-such-option"), None);
    }

    #[test]
    fn test_ipv4_views() {
        let option = DhcpOption::new(3, vec![192, 168, 1, 1, 10, 0, 0, 1]);
        assert_eq!(option.as_ipv4(), None);
        assert_eq!(
            option.as_ipv4_list(),
            vec![Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::new(10, 0, 0, 1)]
        );

        let single = DhcpOption::new(54, vec![10, 0, 0, 1]);
        assert_eq!(single.as_ipv4(), Some(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn test_integer_views() {
        let lease = DhcpOption::new(51, 86400u32.to_be_bytes().to_vec());
        assert_eq!(lease.as_u32(), Some(86400));
        assert_eq!(lease.as_u16(), None);

        let mtu = DhcpOption::new(26, 1500u16.to_be_bytes().to_vec());
        assert_eq!(mtu.as_u16(), Some(1500));
    }

    #[test]
    fn test_display_by_code() {
        let msg = DhcpOption::new(53, vec![1]);
        assert_eq!(msg.to_string(), "53 (MessageType): Discover");

        let host = DhcpOption::new(12, b"h1".to_vec());
        assert_eq!(host.to_string(), "12 (Hostname): h1");

        let server = DhcpOption::new(54, vec![10, 0, 0, 1]);
        assert_eq!(server.to_string(), "54 (ServerID): 10.0.0.1");

        let params = DhcpOption::new(55, vec![1, 3, 6]);
        assert_eq!(params.to_string(), "55 (ParamsRequest): SubnetMask,Router,DNS");

        let unknown = DhcpOption::new(200, vec![0xde, 0xad]);
        assert_eq!(unknown.to_string(), "200 (Unknown): 0xdead");
    }
}
