/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Zero-copy tag=value decoder.
//!
//! The decoder validates framing only:
//! - BeginString must be the first field and BodyLength the second
//! - MsgType must be the first body field
//! - BodyLength must point exactly at the CheckSum field
//! - CheckSum must match, unless validation is disabled

use crate::SOH;
use crate::checksum::{calculate_checksum, parse_checksum};
use crate::raw::{FieldRef, RawMessage};
use fixgate_core::{DecodeError, MsgType, tags};
use memchr::memchr;
use smallvec::SmallVec;

/// Equals sign delimiter between tag and value.
pub const EQUALS: u8 = b'=';

/// Decodes framed messages from a byte buffer.
#[derive(Debug)]
pub struct Decoder<'a> {
    input: &'a [u8],
    offset: usize,
    validate_checksum: bool,
}

impl<'a> Decoder<'a> {
    /// Creates a decoder over `input`.
    #[inline]
    #[must_use]
    pub const fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            offset: 0,
            validate_checksum: true,
        }
    }

    /// Enables or disables checksum validation.
    #[inline]
    #[must_use]
    pub const fn with_checksum_validation(mut self, validate: bool) -> Self {
        self.validate_checksum = validate;
        self
    }

    /// Decodes the next message.
    ///
    /// # Errors
    /// Returns `DecodeError` if the buffer does not hold one complete,
    /// well-framed message at the current offset.
    pub fn decode(&mut self) -> Result<RawMessage<'a>, DecodeError> {
        let start = self.offset;

        let begin_string = self.next_field().ok_or(DecodeError::Incomplete)?;
        if begin_string.tag != tags::BEGIN_STRING || begin_string.value.is_empty() {
            return Err(DecodeError::InvalidBeginString);
        }
        let begin_string = begin_string.as_str()?;

        let body_length = self.next_field().ok_or(DecodeError::MissingBodyLength)?;
        if body_length.tag != tags::BODY_LENGTH {
            return Err(DecodeError::MissingBodyLength);
        }
        let body_length: usize = body_length
            .as_str()?
            .parse()
            .map_err(|_| DecodeError::InvalidBodyLength)?;
        let body_start = self.offset;

        let msg_type = self.next_field().ok_or(DecodeError::MissingMsgType)?;
        if msg_type.tag != tags::MSG_TYPE || msg_type.value.is_empty() {
            return Err(DecodeError::MissingMsgType);
        }
        let parsed_type: MsgType = match msg_type.as_str()?.parse() {
            Ok(t) => t,
            Err(never) => match never {},
        };

        let mut fields: SmallVec<[FieldRef<'a>; 32]> = SmallVec::new();
        fields.push(msg_type);

        loop {
            let field_start = self.offset;
            let field = self.next_field().ok_or(DecodeError::Incomplete)?;
            if field.tag != tags::CHECK_SUM {
                fields.push(field);
                continue;
            }
            if field_start - body_start != body_length {
                return Err(DecodeError::InvalidBodyLength);
            }
            if self.validate_checksum {
                let declared =
                    parse_checksum(field.value).ok_or_else(|| DecodeError::InvalidFieldValue {
                        tag: tags::CHECK_SUM,
                        reason: "invalid checksum format".to_string(),
                    })?;
                let calculated = calculate_checksum(&self.input[start..field_start]);
                if calculated != declared {
                    return Err(DecodeError::ChecksumMismatch {
                        calculated,
                        declared,
                    });
                }
            }
            break;
        }

        Ok(RawMessage::new(
            &self.input[start..self.offset],
            begin_string,
            parsed_type,
            fields,
        ))
    }

    /// Parses the next field, or `None` if the buffer holds no complete one.
    ///
    /// A malformed tag also yields `None`.
    #[inline]
    pub fn next_field(&mut self) -> Option<FieldRef<'a>> {
        let remaining = self.input.get(self.offset..)?;
        let eq_pos = memchr(EQUALS, remaining)?;
        let tag = parse_tag(&remaining[..eq_pos])?;

        let value_start = eq_pos + 1;
        let soh_pos = memchr(SOH, &remaining[value_start..])?;
        let value = &remaining[value_start..value_start + soh_pos];

        self.offset += value_start + soh_pos + 1;
        Some(FieldRef::new(tag, value))
    }

    /// Bytes not consumed yet.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.input[self.offset.min(self.input.len())..]
    }

    /// Returns true if the buffer has been fully consumed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.offset >= self.input.len()
    }
}

/// Parses an ASCII tag number.
#[inline]
fn parse_tag(bytes: &[u8]) -> Option<u32> {
    if bytes.is_empty() || bytes.len() > 10 {
        return None;
    }
    bytes.iter().try_fold(0u32, |acc, &b| {
        if b.is_ascii_digit() {
            acc.checked_mul(10)?.checked_add(u32::from(b - b'0'))
        } else {
            None
        }
    })
}
