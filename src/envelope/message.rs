//! Re-openable outgoing messages.

use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;

use bytes::Bytes;

use super::{ByteSource, EnvelopeStreamer};
use crate::error::{Result, SifError};

/// Element the envelope leaves empty for object data.
pub const DEFAULT_PLACEHOLDER: &str = "SIF_ObjectData";

/// Where a payload segment comes from.
#[derive(Debug, Clone)]
pub enum PayloadSource {
    /// Already rendered in memory.
    Bytes(Bytes),
    /// Rendered to a file, read on demand.
    File(PathBuf),
}

impl PayloadSource {
    fn open(&self) -> io::Result<ByteSource> {
        match self {
            Self::Bytes(bytes) => Ok(ByteSource::from_bytes(bytes.clone())),
            Self::File(path) => {
                let file = File::open(path)?;
                let len = file.metadata()?.len();
                ByteSource::from_reader(BufReader::new(file), len)
            },
        }
    }
}

impl From<Bytes> for PayloadSource {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<PathBuf> for PayloadSource {
    fn from(path: PathBuf) -> Self {
        Self::File(path)
    }
}

/// A message ready to send: envelope plus payload segments.
///
/// Holds descriptions rather than open streams, so each send attempt
/// composes a fresh [`EnvelopeStreamer`].
#[derive(Debug, Clone)]
pub struct OutgoingMessage {
    message_id: String,
    envelope: Bytes,
    payloads: Vec<PayloadSource>,
    placeholder: String,
    replace: bool,
}

impl OutgoingMessage {
    /// Message with the given envelope and no payloads.
    pub fn new(message_id: impl Into<String>, envelope: impl Into<Bytes>) -> Self {
        Self {
            message_id: message_id.into(),
            envelope: envelope.into(),
            payloads: Vec::new(),
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            replace: false,
        }
    }

    /// Append a payload segment.
    pub fn with_payload(mut self, payload: impl Into<PayloadSource>) -> Self {
        self.payloads.push(payload.into());
        self
    }

    /// Splice payloads at `placeholder`, dropping its markup when `replace` is set.
    pub fn with_placeholder(mut self, placeholder: impl Into<String>, replace: bool) -> Self {
        self.placeholder = placeholder.into();
        self.replace = replace;
        self
    }

    /// `SIF_MsgId` of the message.
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    /// Open a fresh composed stream.
    pub fn streamer(&self) -> Result<EnvelopeStreamer> {
        let envelope = ByteSource::from_bytes(self.envelope.clone());
        if self.payloads.is_empty() {
            return Ok(EnvelopeStreamer::passthrough(envelope));
        }

        let payloads = self
            .payloads
            .iter()
            .map(PayloadSource::open)
            .collect::<io::Result<Vec<_>>>()
            .map_err(|e| SifError::Messaging(format!("Failed to open payload: {e}")))?;

        Ok(EnvelopeStreamer::new(
            envelope,
            payloads,
            &self.placeholder,
            self.replace,
        ))
    }
}

/// New `SIF_MsgId`: 32 upper-case hex digits.
pub fn new_message_id() -> String {
    uuid::Uuid::new_v4().simple().to_string().to_uppercase()
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};

    use super::*;

    #[test]
    fn test_each_streamer_is_fresh() {
        let message = OutgoingMessage::new(
            new_message_id(),
            &b"<SIF_Message><SIF_ObjectData></SIF_ObjectData></SIF_Message>"[..],
        )
        .with_payload(Bytes::from_static(b"<A/>"));

        for _ in 0..2 {
            let mut out = String::new();
            message.streamer().unwrap().read_to_string(&mut out).unwrap();
            assert_eq!(out, "<SIF_Message><SIF_ObjectData><A/></SIF_ObjectData></SIF_Message>");
        }
    }

    #[test]
    fn test_file_payload() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\xEF\xBB\xBF<StudentPersonal/>").unwrap();

        let message = OutgoingMessage::new("M1", &b"<E><X></X></E>"[..])
            .with_payload(file.path().to_path_buf())
            .with_placeholder("X", true);
        let mut streamer = message.streamer().unwrap();
        let length = streamer.length();
        let mut out = String::new();
        streamer.read_to_string(&mut out).unwrap();
        assert_eq!(out, "<E><StudentPersonal/></E>");
        assert_eq!(length, out.len() as u64);
    }

    #[test]
    fn test_missing_file_is_messaging_error() {
        let message = OutgoingMessage::new("M1", &b"<E><X></X></E>"[..])
            .with_payload(PathBuf::from("/nonexistent/payload.xml"));
        assert!(matches!(message.streamer(), Err(SifError::Messaging(_))));
    }

    #[test]
    fn test_passthrough_without_payloads() {
        let message = OutgoingMessage::new("M1", &b"<SIF_Message/>"[..]);
        let mut streamer = message.streamer().unwrap();
        assert_eq!(streamer.length(), 14);
        let mut out = String::new();
        streamer.read_to_string(&mut out).unwrap();
        assert_eq!(out, "<SIF_Message/>");
    }

    #[test]
    fn test_message_id_shape() {
        let id = new_message_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }
}
