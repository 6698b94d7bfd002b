//! Per-transaction observer: collects the packets seen for one DHCP
//! exchange and enforces the discover- and request-phase timeouts.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::lease::Lease;
use crate::options::MessageType;
use crate::packet::DhcpPacket;

/// Lifecycle events for a single transaction. Dequeue events come from the
/// send task when a packet is actually written; received events come from
/// the receive task; timeout events fire when a reply lands after its phase
/// deadline.
#[derive(Debug, Clone)]
pub enum Event {
    DiscoverDequeue(DhcpPacket),
    RequestDequeue(DhcpPacket),
    ReceivedOffer(DhcpPacket),
    ReceivedAck(DhcpPacket),
    ReceivedNak(DhcpPacket),
    OfferTimeout,
    AckNakTimeout,
}

#[derive(Debug, Default)]
struct ResponseState {
    packets: HashMap<MessageType, Vec<DhcpPacket>>,
    discover_deadline: Option<Instant>,
    request_deadline: Option<Instant>,
    offer_listener: bool,
    ack_nak_listener: bool,
}

impl ResponseState {
    fn record(&mut self, packet: DhcpPacket) {
        self.packets
            .entry(packet.message_type())
            .or_default()
            .push(packet);
    }

    fn offer_timed_out(&mut self) {
        self.offer_listener = false;
        self.discover_deadline = None;
    }

    fn ack_nak_timed_out(&mut self) {
        self.ack_nak_listener = false;
        self.request_deadline = None;
    }
}

fn elapsed(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|deadline| Instant::now() >= deadline)
}

/// The observer returned by the client engine for every one-shot send.
///
/// The send task and the receive task both dispatch events here, always
/// after releasing the transaction-table lock; the internal mutex
/// serializes concurrent dispatches for the same transaction.
#[derive(Debug)]
pub struct PacketResponse {
    phase_timeout: Duration,
    state: Mutex<ResponseState>,
}

impl PacketResponse {
    pub fn new(phase_timeout: Duration) -> Self {
        Self {
            phase_timeout,
            state: Mutex::new(ResponseState {
                offer_listener: true,
                ack_nak_listener: true,
                ..ResponseState::default()
            }),
        }
    }

    pub fn dispatch(&self, event: Event) {
        let mut state = self.state.lock().unwrap();
        match event {
            Event::DiscoverDequeue(packet) => {
                state.record(packet);
                state.discover_deadline = Some(Instant::now() + self.phase_timeout);
            }
            Event::RequestDequeue(packet) => {
                state.record(packet);
                state.request_deadline = Some(Instant::now() + self.phase_timeout);
            }
            Event::ReceivedOffer(packet) => {
                if !state.offer_listener {
                    return;
                }
                if elapsed(state.discover_deadline) {
                    state.offer_timed_out();
                } else {
                    state.record(packet);
                }
            }
            Event::ReceivedAck(packet) | Event::ReceivedNak(packet) => {
                if !state.ack_nak_listener {
                    return;
                }
                if elapsed(state.request_deadline) {
                    state.ack_nak_timed_out();
                } else {
                    state.record(packet);
                }
            }
            Event::OfferTimeout => state.offer_timed_out(),
            Event::AckNakTimeout => state.ack_nak_timed_out(),
        }
    }

    pub fn add_packet(&self, packet: DhcpPacket) {
        self.state.lock().unwrap().record(packet);
    }

    /// The packets observed for one message type, in arrival order.
    pub fn packets(&self, msg_type: MessageType) -> Vec<DhcpPacket> {
        self.state
            .lock()
            .unwrap()
            .packets
            .get(&msg_type)
            .cloned()
            .unwrap_or_default()
    }

    /// The lease from the first ACK, falling back to the first OFFER.
    pub fn lease(&self) -> Option<Lease> {
        let state = self.state.lock().unwrap();
        state
            .packets
            .get(&MessageType::Ack)
            .or_else(|| state.packets.get(&MessageType::Offer))
            .and_then(|packets| packets.first())
            .map(Lease::from_reply)
    }
}
