//! Envelope/payload stream composition.
//!
//! A SIF message is an envelope (the `SIF_Message` wrapper) with one or more
//! object-data payloads spliced in at a placeholder element. Payloads can be
//! large, so the message is never assembled in memory: [`EnvelopeStreamer`]
//! reads through its sources once and reports the exact byte count up front,
//! as HTTP `Content-Length` requires.
//!
//! # Read phases
//!
//! ```text
//! envelope:  <SIF_Message>...<SIF_ObjectData></SIF_ObjectData>...</SIF_Message>
//!                            |              |                |
//!   Head     copy until the placeholder opening tag matches
//!   Payload  copy each payload source in order
//!   Tail     copy the rest of the envelope
//! ```
//!
//! In replace mode the placeholder markup itself (`<Tag>` and `</Tag>`) is
//! dropped, so the payloads take the placeholder's place. Otherwise the
//! payloads land between the opening and closing tags.
//!
//! A UTF-8 byte-order mark at the start of any source is skipped and not
//! counted.

mod message;

pub use message::{new_message_id, OutgoingMessage, PayloadSource, DEFAULT_PLACEHOLDER};

use std::collections::VecDeque;
use std::io::{self, Read};

use bytes::{Buf, Bytes};

/// UTF-8 byte-order mark.
pub const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

pub(crate) const CHUNK_SIZE: usize = 8 * 1024;

/// A readable byte source of known length.
pub struct ByteSource {
    reader: Box<dyn Read + Send>,
    len: u64,
    lead: u64,
}

impl ByteSource {
    /// Wrap `reader`, which will yield exactly `len` bytes.
    ///
    /// Reads up to three bytes immediately to detect a byte-order mark.
    pub fn from_reader<R: Read + Send + 'static>(mut reader: R, len: u64) -> io::Result<Self> {
        let mut head = Vec::with_capacity(UTF8_BOM.len());
        (&mut reader)
            .take(UTF8_BOM.len() as u64)
            .read_to_end(&mut head)?;

        if head == UTF8_BOM {
            return Ok(Self {
                reader: Box::new(reader),
                len,
                lead: UTF8_BOM.len() as u64,
            });
        }

        Ok(Self {
            reader: Box::new(Read::chain(io::Cursor::new(head), reader)),
            len,
            lead: 0,
        })
    }

    /// In-memory source.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let mut bytes: Bytes = bytes.into();
        let len = bytes.len() as u64;
        let lead = if bytes.starts_with(&UTF8_BOM) {
            bytes.advance(UTF8_BOM.len());
            UTF8_BOM.len() as u64
        } else {
            0
        };
        Self {
            reader: Box::new(bytes.reader()),
            len,
            lead,
        }
    }

    /// Declared length, including any byte-order mark.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the source declares no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Bytes this source contributes to a composed stream.
    pub fn content_len(&self) -> u64 {
        self.len.saturating_sub(self.lead)
    }
}

impl Read for ByteSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl std::fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteSource")
            .field("len", &self.len)
            .field("lead", &self.lead)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Head,
    Payload,
    Tail,
    Done,
}

/// Single-pass reader over an envelope with payloads spliced in.
#[derive(Debug)]
pub struct EnvelopeStreamer {
    envelope: Option<ByteSource>,
    payloads: VecDeque<ByteSource>,
    open_tag: Vec<u8>,
    close_tag: Vec<u8>,
    replace: bool,
    phase: Phase,
    /// Bytes of `open_tag` matched so far and held back.
    matched: usize,
    /// Envelope bytes read past the opening tag, consumed by the tail.
    carry: Bytes,
    /// Closing-tag bytes still to skip (replace mode).
    skip: usize,
    out: Vec<u8>,
    out_pos: usize,
    length: u64,
    written: u64,
}

impl EnvelopeStreamer {
    /// Compose `envelope` with `payloads` at the element named `placeholder`.
    pub fn new(
        envelope: ByteSource,
        payloads: Vec<ByteSource>,
        placeholder: &str,
        replace: bool,
    ) -> Self {
        let open_tag = format!("<{placeholder}>").into_bytes();
        let close_tag = format!("</{placeholder}>").into_bytes();

        let markup = if replace {
            (open_tag.len() + close_tag.len()) as u64
        } else {
            0
        };
        let length = (envelope.content_len()
            + payloads.iter().map(ByteSource::content_len).sum::<u64>())
        .saturating_sub(markup);

        Self {
            envelope: Some(envelope),
            payloads: payloads.into(),
            open_tag,
            close_tag,
            replace,
            phase: Phase::Head,
            matched: 0,
            carry: Bytes::new(),
            skip: 0,
            out: Vec::with_capacity(CHUNK_SIZE),
            out_pos: 0,
            length,
            written: 0,
        }
    }

    /// Stream `envelope` unchanged.
    pub fn passthrough(envelope: ByteSource) -> Self {
        let mut streamer = Self::new(envelope, Vec::new(), "", false);
        streamer.phase = Phase::Tail;
        streamer
    }

    /// Exact number of bytes this stream yields.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Bytes yielded so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Release every source still held. Safe to call repeatedly.
    pub fn close(&mut self) {
        self.envelope = None;
        self.payloads.clear();
        self.carry = Bytes::new();
        self.phase = Phase::Done;
    }

    fn envelope(&mut self) -> io::Result<&mut ByteSource> {
        self.envelope
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "envelope stream closed"))
    }

    /// Copy envelope bytes until the opening placeholder tag is matched.
    fn fill_head(&mut self) -> io::Result<()> {
        let mut chunk = vec![0u8; CHUNK_SIZE];
        let n = self.envelope()?.read(&mut chunk)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "placeholder {} not found in envelope",
                    String::from_utf8_lossy(&self.open_tag)
                ),
            ));
        }

        let mut split = None;
        for (i, &b) in chunk[..n].iter().enumerate() {
            if b == self.open_tag[self.matched] {
                self.matched += 1;
                if self.matched == self.open_tag.len() {
                    split = Some(i + 1);
                    break;
                }
            } else {
                // The tag opens with '<', which never recurs inside it, so a
                // mismatch can only restart at the current byte.
                self.out.extend_from_slice(&self.open_tag[..self.matched]);
                self.matched = 0;
                if b == self.open_tag[0] {
                    self.matched = 1;
                } else {
                    self.out.push(b);
                }
            }
        }

        if let Some(at) = split {
            if !self.replace {
                self.out.extend_from_slice(&self.open_tag);
            }
            self.matched = 0;
            chunk.truncate(n);
            self.carry = Bytes::from(chunk).slice(at..);
            self.phase = Phase::Payload;
        }
        Ok(())
    }

    /// Copy the next payload chunk, dropping sources as they run dry.
    fn fill_payload(&mut self) -> io::Result<()> {
        while let Some(source) = self.payloads.front_mut() {
            let start = self.out.len();
            self.out.resize(start + CHUNK_SIZE, 0);
            let n = source.read(&mut self.out[start..])?;
            self.out.truncate(start + n);
            if n > 0 {
                return Ok(());
            }
            self.payloads.pop_front();
        }
        self.skip = if self.replace { self.close_tag.len() } else { 0 };
        self.phase = Phase::Tail;
        Ok(())
    }

    /// Copy the remainder of the envelope, skipping the closing tag in replace mode.
    fn fill_tail(&mut self) -> io::Result<()> {
        let data = if self.carry.is_empty() {
            let mut chunk = vec![0u8; CHUNK_SIZE];
            let n = self.envelope()?.read(&mut chunk)?;
            if n == 0 {
                if self.skip > 0 {
                    return Err(self.missing_close_tag());
                }
                self.envelope = None;
                self.phase = Phase::Done;
                return Ok(());
            }
            chunk.truncate(n);
            Bytes::from(chunk)
        } else {
            std::mem::take(&mut self.carry)
        };

        let mut start = 0;
        while self.skip > 0 && start < data.len() {
            let expected = self.close_tag[self.close_tag.len() - self.skip];
            if data[start] != expected {
                return Err(self.missing_close_tag());
            }
            self.skip -= 1;
            start += 1;
        }
        self.out.extend_from_slice(&data[start..]);
        Ok(())
    }

    fn missing_close_tag(&self) -> io::Error {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "expected {} after placeholder",
                String::from_utf8_lossy(&self.close_tag)
            ),
        )
    }

    fn finish(&mut self) -> io::Result<usize> {
        if self.written != self.length {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "composed {} bytes but announced {}",
                    self.written, self.length
                ),
            ));
        }
        Ok(0)
    }
}

impl Read for EnvelopeStreamer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while self.out_pos == self.out.len() {
            self.out.clear();
            self.out_pos = 0;
            match self.phase {
                Phase::Head => self.fill_head()?,
                Phase::Payload => self.fill_payload()?,
                Phase::Tail => self.fill_tail()?,
                Phase::Done => return self.finish(),
            }
        }

        let n = buf.len().min(self.out.len() - self.out_pos);
        buf[..n].copy_from_slice(&self.out[self.out_pos..self.out_pos + n]);
        self.out_pos += n;
        self.written += n as u64;
        Ok(n)
    }
}

impl Drop for EnvelopeStreamer {
    fn drop(&mut self) {
        self.close();
    }
}
