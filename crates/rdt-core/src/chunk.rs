use std::path::Path;

use bytes::Bytes;
use rdt_abstract::Protocol;

/// A file cut into `mss`-sized chunks, prefixed by the bootstrap header.
///
/// Index 0 is the header (sent under `FIRST`), indices `1..total()` are the
/// file's bytes in order. The sequence is immutable once built.
#[derive(Debug, Clone)]
pub struct ChunkSequence {
    extension: String,
    protocol: Protocol,
    chunks: Vec<Bytes>,
}

impl ChunkSequence {
    pub fn from_bytes(
        extension: impl Into<String>,
        data: impl Into<Bytes>,
        mss: usize,
        protocol: Protocol,
    ) -> Self {
        let extension = extension.into();
        let data: Bytes = data.into();
        let mss = mss.max(1);

        let data_chunks = data.len().div_ceil(mss);
        let total = data_chunks + 1;
        let header = match protocol {
            Protocol::StopAndWait => extension.clone(),
            Protocol::GoBackN => format!("{extension}:{total}"),
        };

        let mut chunks = Vec::with_capacity(total);
        chunks.push(Bytes::from(header));
        let mut start = 0;
        while start < data.len() {
            let end = (start + mss).min(data.len());
            chunks.push(data.slice(start..end));
            start = end;
        }

        Self {
            extension,
            protocol,
            chunks,
        }
    }

    pub async fn load(path: &Path, mss: usize, protocol: Protocol) -> std::io::Result<Self> {
        let data = tokio::fs::read(path).await?;
        Ok(Self::from_bytes(Self::extension_of(path), data, mss, protocol))
    }

    /// Lower-cased text after the last `.` of the file name, or the whole
    /// name when there is no dot.
    pub fn extension_of(path: &Path) -> String {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match name.rsplit_once('.') {
            Some((_, ext)) => ext.to_lowercase(),
            None => name.to_lowercase(),
        }
    }

    /// Header plus data chunks.
    pub fn total(&self) -> usize {
        self.chunks.len()
    }

    pub fn data_chunks(&self) -> usize {
        self.chunks.len() - 1
    }

    pub fn get(&self, index: usize) -> Option<&Bytes> {
        self.chunks.get(index)
    }

    pub fn header(&self) -> &Bytes {
        &self.chunks[0]
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bytes> {
        self.chunks.iter()
    }
}
