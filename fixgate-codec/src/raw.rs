/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! Zero-copy views over a decoded message.

use fixgate_core::{DecodeError, MsgType, Timestamp};
use smallvec::SmallVec;

/// One `tag=value` pair borrowing from the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldRef<'a> {
    /// Tag number.
    pub tag: u32,
    /// Raw value bytes (without the trailing SOH).
    pub value: &'a [u8],
}

impl<'a> FieldRef<'a> {
    /// Creates a field reference.
    #[inline]
    #[must_use]
    pub const fn new(tag: u32, value: &'a [u8]) -> Self {
        Self { tag, value }
    }

    /// Interprets the value as UTF-8.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidFieldValue` if the bytes are not UTF-8.
    pub fn as_str(&self) -> Result<&'a str, DecodeError> {
        std::str::from_utf8(self.value).map_err(|_| DecodeError::InvalidFieldValue {
            tag: self.tag,
            reason: "not valid utf-8".to_string(),
        })
    }
}

/// A framed message whose fields borrow from the input.
///
/// Header and trailer framing fields (8, 9, 10) are validated by the
/// decoder and not repeated in [`RawMessage::fields`].
#[derive(Debug, Clone)]
pub struct RawMessage<'a> {
    bytes: &'a [u8],
    begin_string: &'a str,
    msg_type: MsgType,
    fields: SmallVec<[FieldRef<'a>; 32]>,
}

impl<'a> RawMessage<'a> {
    pub(crate) fn new(
        bytes: &'a [u8],
        begin_string: &'a str,
        msg_type: MsgType,
        fields: SmallVec<[FieldRef<'a>; 32]>,
    ) -> Self {
        Self {
            bytes,
            begin_string,
            msg_type,
            fields,
        }
    }

    /// The complete message bytes, framing included.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    /// BeginString (tag 8).
    #[inline]
    #[must_use]
    pub fn begin_string(&self) -> &'a str {
        self.begin_string
    }

    /// MsgType (tag 35).
    #[inline]
    #[must_use]
    pub fn msg_type(&self) -> &MsgType {
        &self.msg_type
    }

    /// Fields in wire order, MsgType included.
    #[inline]
    #[must_use]
    pub fn fields(&self) -> &[FieldRef<'a>] {
        &self.fields
    }

    /// First occurrence of `tag`.
    #[must_use]
    pub fn get(&self, tag: u32) -> Option<&'a [u8]> {
        self.fields.iter().find(|f| f.tag == tag).map(|f| f.value)
    }

    /// Returns true if `tag` is present.
    #[must_use]
    pub fn contains(&self, tag: u32) -> bool {
        self.get(tag).is_some()
    }

    /// String value of `tag`.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidFieldValue` if the value is not UTF-8.
    pub fn get_str(&self, tag: u32) -> Result<Option<&'a str>, DecodeError> {
        self.fields
            .iter()
            .find(|f| f.tag == tag)
            .map(FieldRef::as_str)
            .transpose()
    }

    /// Unsigned integer value of `tag`.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidFieldValue` if the value is not a
    /// non-negative integer.
    pub fn get_uint(&self, tag: u32) -> Result<Option<u64>, DecodeError> {
        self.parse_with(tag, |s| s.parse::<u64>().ok(), "expected unsigned integer")
    }

    /// Signed integer value of `tag`.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidFieldValue` if the value is not an integer.
    pub fn get_int(&self, tag: u32) -> Result<Option<i64>, DecodeError> {
        self.parse_with(tag, |s| s.parse::<i64>().ok(), "expected integer")
    }

    /// `Y`/`N` value of `tag`.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidFieldValue` for anything but `Y` or `N`.
    pub fn get_bool(&self, tag: u32) -> Result<Option<bool>, DecodeError> {
        self.parse_with(
            tag,
            |s| match s {
                "Y" => Some(true),
                "N" => Some(false),
                _ => None,
            },
            "expected Y or N",
        )
    }

    /// UTCTimestamp value of `tag`.
    ///
    /// # Errors
    /// Returns `DecodeError::InvalidFieldValue` if the value is not a timestamp.
    pub fn get_timestamp(&self, tag: u32) -> Result<Option<Timestamp>, DecodeError> {
        self.parse_with(tag, Timestamp::parse, "expected UTCTimestamp")
    }

    fn parse_with<T>(
        &self,
        tag: u32,
        parse: impl FnOnce(&str) -> Option<T>,
        reason: &str,
    ) -> Result<Option<T>, DecodeError> {
        match self.get_str(tag)? {
            None => Ok(None),
            Some(s) => parse(s)
                .map(Some)
                .ok_or_else(|| DecodeError::InvalidFieldValue {
                    tag,
                    reason: reason.to_string(),
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn message(fields: SmallVec<[FieldRef<'static>; 32]>) -> RawMessage<'static> {
        RawMessage::new(b"", "FIX.4.4", MsgType::Heartbeat, fields)
    }

    #[test]
    fn test_typed_getters() {
        let msg = message(smallvec![
            FieldRef::new(34, b"7"),
            FieldRef::new(43, b"Y"),
            FieldRef::new(108, b"-5"),
            FieldRef::new(52, b"19700101-00:00:01.000"),
        ]);
        assert_eq!(msg.get_uint(34).unwrap(), Some(7));
        assert_eq!(msg.get_bool(43).unwrap(), Some(true));
        assert_eq!(msg.get_int(108).unwrap(), Some(-5));
        assert_eq!(
            msg.get_timestamp(52).unwrap(),
            Some(Timestamp::from_millis(1000))
        );
        assert_eq!(msg.get_uint(36).unwrap(), None);
    }

    #[test]
    fn test_invalid_values_report_tag() {
        let msg = message(smallvec![FieldRef::new(34, b"x"), FieldRef::new(43, b"maybe")]);
        assert_eq!(msg.get_uint(34).unwrap_err().tag(), Some(34));
        assert_eq!(msg.get_bool(43).unwrap_err().tag(), Some(43));
    }
}
