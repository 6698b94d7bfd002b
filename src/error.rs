#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("bad DHCP header: invalid magic cookie")]
    InvalidMagicCookie,

    #[error("not enough data to decode")]
    NotEnoughData,

    #[error("option is malformed")]
    Malformed,

    #[error("option {0} data exceeds 255 bytes")]
    OversizedOption(u8),

    #[error("xid {0:#010x} not found in transaction table")]
    UnknownXid(u32),

    #[error("option parse error: {0}")]
    OptionParse(String),

    #[error("socket error: {0}")]
    Socket(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, Error>;
