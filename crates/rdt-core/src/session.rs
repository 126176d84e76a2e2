//! Receiver-side per-peer state.
//!
//! A [`Session`] is created by `FIRST`, advanced by each in-order data
//! packet, and removed by `DONE`. The [`SessionTable`] is the only place
//! sessions live; there is no global state.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use rdt_abstract::Protocol;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;

use crate::error::{BootstrapError, ReceiveError};
use crate::snw::SNW_MODULUS;

/// Parsed `FIRST` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bootstrap {
    pub extension: String,
    pub modulus: u32,
}

impl Bootstrap {
    /// `"<ext>"` for SnW, `"<ext>:<total>"` for GBN.
    pub fn parse(payload: &[u8], protocol: Protocol) -> Result<Self, BootstrapError> {
        let text = std::str::from_utf8(payload).map_err(|_| BootstrapError::NotUtf8)?;
        let (extension, modulus) = match protocol {
            Protocol::StopAndWait => (text, SNW_MODULUS),
            Protocol::GoBackN => {
                let (ext, total) = text
                    .rsplit_once(':')
                    .ok_or_else(|| BootstrapError::MissingTotal(text.to_string()))?;
                let total: u32 = total
                    .trim()
                    .parse()
                    .ok()
                    .filter(|&t| t >= 1 && t <= i32::MAX as u32)
                    .ok_or_else(|| BootstrapError::InvalidTotal(total.to_string()))?;
                (ext, total)
            }
        };

        let valid = !extension.is_empty()
            && extension
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(BootstrapError::InvalidExtension(extension.to_string()));
        }

        Ok(Self {
            extension: extension.to_string(),
            modulus,
        })
    }
}

/// `<dir>/<ip>_<port>.<ext>`
pub fn output_path(dir: &Path, peer: SocketAddr, extension: &str) -> PathBuf {
    dir.join(format!("{}_{}.{}", peer.ip(), peer.port(), extension))
}

#[derive(Debug)]
pub struct Session {
    peer: SocketAddr,
    expected: u32,
    modulus: u32,
    extension: String,
    path: PathBuf,
    file: File,
    delivered_bytes: u64,
}

impl Session {
    /// Open (truncating) the output file. The header counts as packet 0, so
    /// the first data packet expected is 1.
    pub async fn create(
        peer: SocketAddr,
        bootstrap: &Bootstrap,
        output_dir: &Path,
    ) -> Result<Self, ReceiveError> {
        let path = output_path(output_dir, peer, &bootstrap.extension);
        let output_err = |source| ReceiveError::Output {
            path: path.clone(),
            source,
        };
        fs::create_dir_all(output_dir).await.map_err(output_err)?;
        let file = File::create(&path).await.map_err(output_err)?;

        Ok(Self {
            peer,
            expected: 1,
            modulus: bootstrap.modulus.max(1),
            extension: bootstrap.extension.clone(),
            path,
            file,
            delivered_bytes: 0,
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn expected_sequence(&self) -> u32 {
        self.expected
    }

    pub fn modulus(&self) -> u32 {
        self.modulus
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn delivered_bytes(&self) -> u64 {
        self.delivered_bytes
    }

    /// Sequence carried by every ack: the next one expected.
    pub fn ack_sequence(&self) -> i32 {
        (self.expected % self.modulus) as i32
    }

    pub fn is_expected(&self, seq: i32) -> bool {
        seq.rem_euclid(self.modulus as i32) as u32 == self.expected % self.modulus
    }

    /// Append an in-order payload and advance.
    pub async fn deliver(&mut self, payload: &[u8]) -> Result<(), ReceiveError> {
        self.file
            .write_all(payload)
            .await
            .map_err(|source| ReceiveError::Output {
                path: self.path.clone(),
                source,
            })?;
        self.expected += 1;
        self.delivered_bytes += payload.len() as u64;
        Ok(())
    }

    /// Flush and close the output file, returning its path.
    pub async fn finish(mut self) -> Result<PathBuf, ReceiveError> {
        self.file
            .flush()
            .await
            .map_err(|source| ReceiveError::Output {
                path: self.path.clone(),
                source,
            })?;
        Ok(self.path)
    }
}

#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<SocketAddr, Session>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the peer already has a session. Returns whether it was added.
    pub fn insert(&mut self, session: Session) -> bool {
        match self.sessions.entry(session.peer()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(session);
                true
            }
        }
    }

    pub fn get(&self, peer: &SocketAddr) -> Option<&Session> {
        self.sessions.get(peer)
    }

    pub fn get_mut(&mut self, peer: &SocketAddr) -> Option<&mut Session> {
        self.sessions.get_mut(peer)
    }

    pub fn remove(&mut self, peer: &SocketAddr) -> Option<Session> {
        self.sessions.remove(peer)
    }

    pub fn contains(&self, peer: &SocketAddr) -> bool {
        self.sessions.contains_key(peer)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn peers(&self) -> impl Iterator<Item = &SocketAddr> {
        self.sessions.keys()
    }
}
