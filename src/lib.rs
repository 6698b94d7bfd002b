pub mod client;
pub mod config;
pub mod driver;
pub mod error;
pub mod lease;
pub mod modifier;
pub mod options;
pub mod optspec;
pub mod packet;
pub mod response;
pub mod table;

pub use client::{DhcpClient, LogEntry};
pub use config::Config;
pub use error::{Error, Result};
pub use lease::Lease;
pub use options::{DhcpOption, MessageType, OptionCode};
pub use packet::DhcpPacket;
pub use response::{Event, PacketResponse};
pub use table::TransactionTable;
