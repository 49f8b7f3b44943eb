//! Decoder for the binary event-stream framing used by Bedrock's
//! `invoke-with-response-stream`.
//!
//! Each frame is:
//!
//! ```text
//! total_len: u32 BE | headers_len: u32 BE | prelude_crc: u32
//! headers (headers_len bytes) | payload | message_crc: u32
//! ```
//!
//! Frames may be split across transport chunks; the decoder buffers until
//! a full frame is available. CRCs are not verified; TLS already covers
//! transport integrity.

use base64::Engine;
use toolrelay_core::error::ProviderError;

const PRELUDE_LEN: usize = 12;
const MIN_FRAME_LEN: usize = PRELUDE_LEN + 4;
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// A typed header value.
#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Bool(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Bytes(Vec<u8>),
    String(String),
    Timestamp(i64),
    Uuid([u8; 16]),
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub headers: Vec<(String, HeaderValue)>,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers.iter().find_map(|(k, v)| match v {
            HeaderValue::String(s) if k == name => Some(s.as_str()),
            _ => None,
        })
    }

    /// `event`, `exception` or `error`.
    pub fn message_type(&self) -> &str {
        self.header_str(":message-type").unwrap_or("event")
    }

    pub fn event_type(&self) -> Option<&str> {
        self.header_str(":event-type")
    }

    pub fn exception_type(&self) -> Option<&str> {
        self.header_str(":exception-type")
            .or_else(|| self.header_str(":error-code"))
    }
}

/// Incremental frame decoder.
#[derive(Debug, Default)]
pub struct EventStreamDecoder {
    buf: Vec<u8>,
}

impl EventStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes received but not yet consumed by a frame.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// The next complete frame, or `None` if more bytes are needed.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, ProviderError> {
        if self.buf.len() < PRELUDE_LEN {
            return Ok(None);
        }
        let total_len = read_u32(&self.buf[0..4]) as usize;
        let headers_len = read_u32(&self.buf[4..8]) as usize;

        if !(MIN_FRAME_LEN..=MAX_FRAME_LEN).contains(&total_len)
            || headers_len > total_len - MIN_FRAME_LEN
        {
            return Err(ProviderError::Decode(format!(
                "invalid event-stream prelude (total {total_len}, headers {headers_len})"
            )));
        }
        if self.buf.len() < total_len {
            return Ok(None);
        }

        let frame: Vec<u8> = self.buf.drain(..total_len).collect();
        let headers_end = PRELUDE_LEN + headers_len;
        let headers = parse_headers(&frame[PRELUDE_LEN..headers_end])?;
        let payload = frame[headers_end..total_len - 4].to_vec();

        Ok(Some(Frame { headers, payload }))
    }
}

fn read_u32(b: &[u8]) -> u32 {
    u32::from_be_bytes([b[0], b[1], b[2], b[3]])
}

fn take<'a>(input: &mut &'a [u8], n: usize) -> Result<&'a [u8], ProviderError> {
    if input.len() < n {
        return Err(ProviderError::Decode("truncated event-stream header".into()));
    }
    let (head, rest) = input.split_at(n);
    *input = rest;
    Ok(head)
}

fn parse_headers(mut input: &[u8]) -> Result<Vec<(String, HeaderValue)>, ProviderError> {
    let mut headers = Vec::new();
    while !input.is_empty() {
        let name_len = take(&mut input, 1)?[0] as usize;
        let name = String::from_utf8_lossy(take(&mut input, name_len)?).into_owned();
        let value_type = take(&mut input, 1)?[0];
        let value = match value_type {
            0 => HeaderValue::Bool(true),
            1 => HeaderValue::Bool(false),
            2 => HeaderValue::Byte(take(&mut input, 1)?[0] as i8),
            3 => {
                let b = take(&mut input, 2)?;
                HeaderValue::Short(i16::from_be_bytes([b[0], b[1]]))
            }
            4 => HeaderValue::Int(read_u32(take(&mut input, 4)?) as i32),
            5 | 8 => {
                let b = take(&mut input, 8)?;
                let mut arr = [0u8; 8];
                arr.copy_from_slice(b);
                let v = i64::from_be_bytes(arr);
                if value_type == 5 {
                    HeaderValue::Long(v)
                } else {
                    HeaderValue::Timestamp(v)
                }
            }
            6 | 7 => {
                let b = take(&mut input, 2)?;
                let len = u16::from_be_bytes([b[0], b[1]]) as usize;
                let raw = take(&mut input, len)?;
                if value_type == 6 {
                    HeaderValue::Bytes(raw.to_vec())
                } else {
                    HeaderValue::String(String::from_utf8_lossy(raw).into_owned())
                }
            }
            9 => {
                let mut arr = [0u8; 16];
                arr.copy_from_slice(take(&mut input, 16)?);
                HeaderValue::Uuid(arr)
            }
            other => {
                return Err(ProviderError::Decode(format!(
                    "unknown event-stream header type {other}"
                )));
            }
        };
        headers.push((name, value));
    }
    Ok(headers)
}

/// Decode a `chunk` event payload: `{"bytes": "<base64 json>"}`.
pub fn decode_chunk_payload(payload: &[u8]) -> Result<serde_json::Value, ProviderError> {
    let envelope: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|e| ProviderError::Decode(format!("chunk envelope: {e}")))?;
    let encoded = envelope["bytes"]
        .as_str()
        .ok_or_else(|| ProviderError::Decode("chunk envelope missing 'bytes'".into()))?;
    let raw = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| ProviderError::Decode(format!("chunk bytes: {e}")))?;
    serde_json::from_slice(&raw).map_err(|e| ProviderError::Decode(format!("chunk json: {e}")))
}

/// Encode a frame. CRC fields are written as zero.
#[cfg(test)]
pub(crate) fn encode_frame(headers: &[(&str, &str)], payload: &[u8]) -> Vec<u8> {
    let mut header_bytes = Vec::new();
    for (name, value) in headers {
        header_bytes.push(name.len() as u8);
        header_bytes.extend_from_slice(name.as_bytes());
        header_bytes.push(7);
        header_bytes.extend_from_slice(&(value.len() as u16).to_be_bytes());
        header_bytes.extend_from_slice(value.as_bytes());
    }
    let total = PRELUDE_LEN + header_bytes.len() + payload.len() + 4;
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(&(total as u32).to_be_bytes());
    out.extend_from_slice(&(header_bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(payload);
    out.extend_from_slice(&[0; 4]);
    out
}

/// Wrap a JSON event the way Bedrock does inside a `chunk` frame.
#[cfg(test)]
pub(crate) fn encode_chunk(event: &serde_json::Value) -> Vec<u8> {
    let encoded = base64::engine::general_purpose::STANDARD.encode(event.to_string());
    let payload = serde_json::json!({ "bytes": encoded }).to_string();
    encode_frame(
        &[
            (":event-type", "chunk"),
            (":content-type", "application/json"),
            (":message-type", "event"),
        ],
        payload.as_bytes(),
    )
}
