//! Reliable data transfer over a deliberately lossy datagram channel.
//!
//! A file is cut into [`chunk::ChunkSequence`] chunks, framed by the
//! [`packet`] codec and pushed through an [`channel::UnreliableChannel`] by
//! one of two ARQ engines:
//!
//! - [`snw`]: Stop-and-Wait, one packet in flight, sequence numbers mod 2.
//! - [`gbn`]: Go-Back-N, a window of packets in flight covered by a single
//!   [`timer::Timer`], cumulative acknowledgements.
//!
//! The receiving side is one [`receiver::Receiver`] loop that keeps a
//! [`session::SessionTable`] keyed by peer address, so a single socket can
//! serve many senders at once.

pub mod channel;
pub mod checksum;
pub mod chunk;
pub mod error;
pub mod gbn;
pub mod packet;
pub mod receiver;
pub mod sender;
pub mod session;
pub mod snw;
pub mod stats;
pub mod timer;
pub mod transport;

pub use channel::{ChannelStats, DropPolicy, UnreliableChannel};
pub use chunk::ChunkSequence;
pub use error::{BootstrapError, ChannelError, PacketError, ReceiveError, SendError};
pub use packet::Packet;
pub use receiver::{ControlKind, FINISHED_LINGER, Outcome, Receiver};
pub use sender::send_file;
pub use session::{Bootstrap, Session, SessionTable};
pub use stats::TransferStats;
pub use timer::{Timer, TimerState};
pub use transport::{Datagram, UdpTransport};

pub use rdt_abstract::{LossConfig, Protocol, TransferConfig};
