/******************************************************************************
   Author: Joaquín Béjar García
   Email: jb@taunais.com
   Date: 19/10/26
******************************************************************************/

//! # fixgate Codec
//!
//! The narrow tag=value codec the session layer consumes.
//!
//! Only framing is handled here: BeginString, BodyLength, CheckSum and a flat
//! list of fields. Interpreting fields is left to the session crate.
//!
//! ## Features
//!
//! - **Zero-copy parsing**: Field values reference the original buffer
//! - **SIMD-accelerated**: Uses `memchr` for fast delimiter search
//! - **Framing validation**: BodyLength and CheckSum are verified on decode

pub mod checksum;
pub mod decoder;
pub mod encoder;
pub mod raw;

pub use checksum::calculate_checksum;
pub use decoder::Decoder;
pub use encoder::Encoder;
pub use raw::{FieldRef, RawMessage};

/// SOH (Start of Header) delimiter used in FIX messages.
pub const SOH: u8 = 0x01;
