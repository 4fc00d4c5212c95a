//! Checksummed little-endian artifact writer.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use crc::{Crc, CRC_64_GO_ISO};

use super::fingerprint::{fingerprint, FINGERPRINT_LENGTH};

static CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_GO_ISO);

pub struct ArtifactWriter {
    inner: BufWriter<File>,
    digest: crc::Digest<'static, u64>,
}

impl ArtifactWriter {
    /// Create the file and write the fingerprint prefix.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        let mut writer = Self {
            inner: BufWriter::new(file),
            digest: CRC64.digest(),
        };
        writer.inner.write_all(&fingerprint())?;
        Ok(writer)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes)?;
        self.digest.update(bytes);
        Ok(())
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.write_bytes(&[value])
    }

    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u64(&mut self, value: u64) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_i64(&mut self, value: i64) -> Result<()> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Element counts are 64-bit unsigned.
    pub fn write_count(&mut self, count: usize) -> Result<()> {
        self.write_u64(count as u64)
    }

    /// Write the CRC-64 footer and flush.
    pub fn finish(mut self) -> Result<()> {
        let crc = self.digest.finalize();
        self.inner.write_all(&crc.to_le_bytes())?;
        self.inner.flush()?;
        Ok(())
    }
}

// bincode serializes straight into the artifact through this impl, keeping
// the checksum in sync.
impl Write for ArtifactWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.digest.update(&buf[..written]);
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Read an artifact back: verify the fingerprint and the CRC footer, return
/// the body bytes between them.
pub fn read_artifact(path: &Path) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .read_to_end(&mut bytes)?;
    if bytes.len() < FINGERPRINT_LENGTH + 8 {
        bail!("{} is truncated", path.display());
    }
    if bytes[..FINGERPRINT_LENGTH] != fingerprint() {
        bail!("{} has a foreign or outdated fingerprint", path.display());
    }
    let body = &bytes[FINGERPRINT_LENGTH..bytes.len() - 8];
    let stored = u64::from_le_bytes(bytes[bytes.len() - 8..].try_into().expect("8 bytes"));
    if CRC64.checksum(body) != stored {
        bail!("{} failed its checksum", path.display());
    }
    Ok(body.to_vec())
}

/// Cursor over an artifact body for the read side.
pub struct BodyReader<'a> {
    body: &'a [u8],
    position: usize,
}

impl<'a> BodyReader<'a> {
    pub fn new(body: &'a [u8]) -> Self {
        Self { body, position: 0 }
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.position + n > self.body.len() {
            bail!("artifact body is truncated");
        }
        let slice = &self.body[self.position..self.position + n];
        self.position += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.take(2)?.try_into()?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into()?))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into()?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take(4)?.try_into()?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.take(8)?.try_into()?))
    }

    pub fn read_count(&mut self) -> Result<usize> {
        Ok(self.read_u64()? as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.position >= self.body.len()
    }
}
