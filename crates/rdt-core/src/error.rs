//! Error types for every layer of the transfer stack.
//!
//! Transient loss never shows up here: a vanished packet is only visible to
//! the engines as a timer expiry.

use std::path::PathBuf;

use crate::packet::{MAX_DATAGRAM, MIN_DATAGRAM};

/// Framing errors raised by the packet codec and checksum unit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PacketError {
    #[error("datagram of {len} bytes is shorter than the {MIN_DATAGRAM}-byte minimum frame")]
    Truncated { len: usize },

    #[error("datagram of {len} bytes exceeds the {MAX_DATAGRAM}-byte transport limit")]
    DatagramTooLarge { len: usize },

    #[error("payload of {len} bytes does not fit the {max}-byte checksum range")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("control field {0:?} is neither a literal nor a checksum")]
    InvalidControl(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("socket I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("packet encode error: {0}")]
    Packet(#[from] PacketError),
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Packet(#[from] PacketError),

    #[error("peer unresponsive: {timeouts} consecutive timeouts waiting on sequence {seq}")]
    PeerUnresponsive { timeouts: u32, seq: u32 },

    #[error("file needs {0} packets, more than the sequence space allows")]
    TooManyChunks(usize),
}

/// Reasons a `FIRST` payload cannot open a session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BootstrapError {
    #[error("bootstrap payload is not UTF-8")]
    NotUtf8,

    #[error("bootstrap payload {0:?} is missing the ':<total>' packet count")]
    MissingTotal(String),

    #[error("invalid packet count {0:?}")]
    InvalidTotal(String),

    #[error("invalid file extension {0:?}")]
    InvalidExtension(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ReceiveError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Packet(#[from] PacketError),

    #[error("output file {path}: {source}")]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
