/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Tag=value encoder.
//!
//! Fields are appended in call order; [`Encoder::finish`] frames the body
//! with BeginString, BodyLength and CheckSum.

use crate::SOH;
use crate::checksum::{calculate_checksum, format_checksum};
use bytes::{BufMut, BytesMut};
use fixgate_core::Timestamp;

/// Builds one framed message.
#[derive(Debug, Clone)]
pub struct Encoder {
    /// Everything between BodyLength and CheckSum.
    body: BytesMut,
    begin_string: String,
}

impl Encoder {
    /// Creates an encoder for the given BeginString (e.g. `FIX.4.4`).
    #[must_use]
    pub fn new(begin_string: impl Into<String>) -> Self {
        Self::with_capacity(begin_string, 256)
    }

    /// Creates an encoder with a pre-sized body buffer.
    #[must_use]
    pub fn with_capacity(begin_string: impl Into<String>, capacity: usize) -> Self {
        Self {
            body: BytesMut::with_capacity(capacity),
            begin_string: begin_string.into(),
        }
    }

    /// Appends a string field.
    #[inline]
    pub fn put_str(&mut self, tag: u32, value: &str) {
        self.put_raw(tag, value.as_bytes());
    }

    /// Appends a signed integer field.
    #[inline]
    pub fn put_int(&mut self, tag: u32, value: i64) {
        let mut buf = itoa::Buffer::new();
        self.put_raw(tag, buf.format(value).as_bytes());
    }

    /// Appends an unsigned integer field.
    #[inline]
    pub fn put_uint(&mut self, tag: u32, value: u64) {
        let mut buf = itoa::Buffer::new();
        self.put_raw(tag, buf.format(value).as_bytes());
    }

    /// Appends a `Y`/`N` field.
    #[inline]
    pub fn put_bool(&mut self, tag: u32, value: bool) {
        self.put_raw(tag, if value { b"Y" } else { b"N" });
    }

    /// Appends a UTCTimestamp field with millisecond precision.
    #[inline]
    pub fn put_timestamp(&mut self, tag: u32, value: Timestamp) {
        self.put_raw(tag, value.format_millis().as_bytes());
    }

    /// Appends a field from raw bytes.
    #[inline]
    pub fn put_raw(&mut self, tag: u32, value: &[u8]) {
        let mut tag_buf = itoa::Buffer::new();
        self.body.put_slice(tag_buf.format(tag).as_bytes());
        self.body.put_u8(b'=');
        self.body.put_slice(value);
        self.body.put_u8(SOH);
    }

    /// Returns the BeginString this encoder frames with.
    #[must_use]
    pub fn begin_string(&self) -> &str {
        &self.begin_string
    }

    /// Returns the current body length.
    #[inline]
    #[must_use]
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Frames the body and returns the complete message.
    #[must_use]
    pub fn finish(self) -> BytesMut {
        let mut len_buf = itoa::Buffer::new();
        let body_len = len_buf.format(self.body.len());

        let mut message =
            BytesMut::with_capacity(self.begin_string.len() + body_len.len() + self.body.len() + 16);
        message.put_slice(b"8=");
        message.put_slice(self.begin_string.as_bytes());
        message.put_u8(SOH);
        message.put_slice(b"9=");
        message.put_slice(body_len.as_bytes());
        message.put_u8(SOH);
        message.put_slice(&self.body);

        let checksum = format_checksum(calculate_checksum(&message));
        message.put_slice(b"10=");
        message.put_slice(&checksum);
        message.put_u8(SOH);
        message
    }
}
