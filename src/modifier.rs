//! Composable packet modifiers applied by [`crate::client::DhcpClient::send`].

use std::net::Ipv4Addr;

use crate::options::{MessageType, OptionCode};
use crate::packet::{BOOTREPLY, BOOTREQUEST, DhcpPacket};

pub type Modifier = Box<dyn Fn(&mut DhcpPacket) + Send + Sync>;

pub fn with_transaction_id(xid: u32) -> Modifier {
    Box::new(move |packet| packet.xid = xid)
}

pub fn with_client_ip(ip: Ipv4Addr) -> Modifier {
    Box::new(move |packet| packet.ciaddr = ip)
}

pub fn with_your_ip(ip: Ipv4Addr) -> Modifier {
    Box::new(move |packet| packet.yiaddr = ip)
}

pub fn with_next_server_ip(ip: Ipv4Addr) -> Modifier {
    Box::new(move |packet| packet.siaddr = ip)
}

pub fn with_secs(secs: u16) -> Modifier {
    Box::new(move |packet| packet.secs = secs)
}

/// Fills opcode (inverted), hardware type, xid, chaddr, flags and relay
/// address from an existing packet.
pub fn with_reply(request: &DhcpPacket) -> Modifier {
    let op = if request.op == BOOTREQUEST {
        BOOTREPLY
    } else {
        BOOTREQUEST
    };
    let htype = request.htype;
    let xid = request.xid;
    let chaddr = request.chaddr.clone();
    let flags = request.flags;
    let giaddr = request.giaddr;
    Box::new(move |packet| {
        packet.op = op;
        packet.htype = htype;
        packet.xid = xid;
        packet.chaddr = chaddr.clone();
        packet.hlen = chaddr.len() as u8;
        packet.flags = flags;
        packet.giaddr = giaddr;
    })
}

pub fn with_hw_type(htype: u8) -> Modifier {
    Box::new(move |packet| packet.htype = htype)
}

pub fn with_hw_addr(hwaddr: Vec<u8>) -> Modifier {
    Box::new(move |packet| {
        packet.chaddr = hwaddr.clone();
        packet.hlen = hwaddr.len() as u8;
    })
}

pub fn with_broadcast(broadcast: bool) -> Modifier {
    Box::new(move |packet| {
        if broadcast {
            packet.set_broadcast();
        } else {
            packet.set_unicast();
        }
    })
}

pub fn with_option(code: u8, data: Vec<u8>) -> Modifier {
    Box::new(move |packet| packet.add_option(code, data.clone()))
}

pub fn with_hostname(hostname: &str) -> Modifier {
    with_option(OptionCode::Hostname as u8, hostname.as_bytes().to_vec())
}

pub fn with_message_type(msg_type: MessageType) -> Modifier {
    with_option(OptionCode::MessageType as u8, vec![msg_type as u8])
}

pub fn with_requested_options(codes: Vec<u8>) -> Modifier {
    Box::new(move |packet| packet.add_param_request(&codes))
}

/// Marks the packet as relayed through the given agent address.
pub fn with_relay(ip: Ipv4Addr) -> Modifier {
    Box::new(move |packet| {
        packet.set_unicast();
        packet.giaddr = ip;
        packet.hops += 1;
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_modifiers() {
        let mut packet = DhcpPacket::request(&[]);
        with_transaction_id(0xDEADBEEF)(&mut packet);
        with_hw_addr(vec![0x02, 0, 0, 0x11, 0x22, 0x33])(&mut packet);
        with_message_type(MessageType::Discover)(&mut packet);
        with_hostname("h1")(&mut packet);
        with_broadcast(false)(&mut packet);

        assert_eq!(packet.xid, 0xDEADBEEF);
        assert_eq!(packet.hlen, 6);
        assert_eq!(packet.message_type(), MessageType::Discover);
        assert_eq!(packet.option(12).unwrap().data, b"h1".to_vec());
        assert!(!packet.is_broadcast());
    }

    #[test]
    fn test_with_reply_inverts_op() {
        let mut request = DhcpPacket::request(&[]);
        request.xid = 9;
        request.chaddr = vec![1, 2, 3, 4, 5, 6];

        let mut reply = DhcpPacket::request(&[]);
        with_reply(&request)(&mut reply);
        assert_eq!(reply.op, BOOTREPLY);
        assert_eq!(reply.xid, 9);
        assert_eq!(reply.chaddr, request.chaddr);

        let mut inverted = DhcpPacket::request(&[]);
        with_reply(&reply)(&mut inverted);
        assert_eq!(inverted.op, BOOTREQUEST);
    }

    #[test]
    fn test_with_relay() {
        let mut packet = DhcpPacket::request(&[]);
        with_relay(Ipv4Addr::new(192, 168, 1, 1))(&mut packet);
        assert!(!packet.is_broadcast());
        assert_eq!(packet.giaddr, Ipv4Addr::new(192, 168, 1, 1));
        assert_eq!(packet.hops, 1);
    }

    #[test]
    fn test_requested_options_merge() {
        let mut packet = DhcpPacket::request(&[]);
        with_requested_options(vec![1, 3])(&mut packet);
        with_requested_options(vec![6])(&mut packet);
        assert_eq!(packet.option(55).unwrap().data, vec![1, 3, 6]);
    }
}
