//! The rate-shaped load driver: a generator task feeding synthetic clients
//! into the engine's send queue and a reporter task logging throughput.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval};
use tracing::{debug, info, warn};

use crate::client::DhcpClient;
use crate::modifier::{with_hw_addr, with_message_type, with_transaction_id};
use crate::options::{DhcpOption, MessageType};
use crate::packet::DhcpPacket;

const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// A locally-administered MAC address (02:00:00:xx:xx:xx).
pub fn random_mac() -> Vec<u8> {
    vec![0x02, 0x00, 0x00, rand::random(), rand::random(), rand::random()]
}

pub struct LoadDriver {
    stop_tx: broadcast::Sender<()>,
    handles: Vec<JoinHandle<()>>,
}

impl LoadDriver {
    /// Starts generating `rate` DISCOVERs per second, round-robin across
    /// `devices` synthetic clients, each send under a fresh random xid. The
    /// engine must already be started.
    pub fn spawn(
        client: Arc<DhcpClient>,
        options: Vec<DhcpOption>,
        devices: usize,
        rate: usize,
    ) -> Self {
        let (stop_tx, _) = broadcast::channel(1);

        let macs: Vec<Vec<u8>> = (0..devices.max(1)).map(|_| random_mac()).collect();
        info!(
            devices = macs.len(),
            rate, "starting load run ({} discovers/sec)", rate
        );

        let handles = vec![
            tokio::spawn(generate_loop(
                Arc::clone(&client),
                options,
                macs,
                rate,
                stop_tx.subscribe(),
            )),
            tokio::spawn(report_loop(client, stop_tx.subscribe())),
        ];

        Self { stop_tx, handles }
    }

    pub async fn stop(self) {
        let _ = self.stop_tx.send(());
        for handle in self.handles {
            let _ = handle.await;
        }
        debug!("load driver stopped");
    }
}

async fn generate_loop(
    client: Arc<DhcpClient>,
    options: Vec<DhcpOption>,
    macs: Vec<Vec<u8>>,
    rate: usize,
    mut stop_rx: broadcast::Receiver<()>,
) {
    let mut tick = interval(Duration::from_secs(1));
    let mut index = 0;

    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            _ = tick.tick() => {
                for _ in 0..rate {
                    let packet = DhcpPacket::request(&options);
                    let modifiers = vec![
                        with_transaction_id(rand::random()),
                        with_hw_addr(macs[index].clone()),
                        with_message_type(MessageType::Discover),
                    ];
                    if let Err(error) = client.send(packet, modifiers).await {
                        warn!("load generator stopping: {}", error);
                        return;
                    }
                    index = (index + 1) % macs.len();
                }
            }
        }
    }
}

async fn report_loop(client: Arc<DhcpClient>, mut stop_rx: broadcast::Receiver<()>) {
    let started = Instant::now();
    let mut tick = interval(REPORT_INTERVAL);
    tick.tick().await;

    loop {
        tokio::select! {
            _ = stop_rx.recv() => break,
            _ = tick.tick() => {
                let (requests, responses) = client.counters();
                let elapsed = started.elapsed().as_secs().max(1);
                info!(
                    "requests: {}, responses: {}, elapsed: {}s, send rate: {}/s, reply rate: {}/s",
                    requests,
                    responses,
                    elapsed,
                    requests / elapsed,
                    responses / elapsed,
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_random_mac_shape() {
        let mac = random_mac();
        assert_eq!(mac.len(), 6);
        assert_eq!(&mac[..3], &[0x02, 0x00, 0x00]);
    }

    #[test]
    fn test_random_macs_differ() {
        let macs: Vec<Vec<u8>> = (0..16).map(|_| random_mac()).collect();
        let distinct: std::collections::HashSet<_> = macs.iter().collect();
        assert!(distinct.len() > 1);
    }
}
