//! Precompiled chunk format.
//!
//! A chunk is a fixed header followed by the upvalue count of the main
//! function and the main function template, nested templates inline. Numbers
//! are stored in native byte order; the header carries reference values so a
//! loader on a different architecture rejects the chunk.

mod dump;
mod load;
pub mod varint;

pub use dump::{dump, dump_to_vec};
pub use load::{chunk_name, undump};

pub const SIGNATURE: &[u8; 4] = b"\x1bLua";
/// Major * 16 + minor.
pub const VERSION: u8 = 0x54;
pub const FORMAT: u8 = 0;
/// Catches line-ending and 8-bit-cleanliness conversions.
pub const DATA: &[u8; 6] = b"\x19\x93\r\n\x1a\n";

pub const INSTRUCTION_SIZE: u8 = 4;
pub const INTEGER_SIZE: u8 = 8;
pub const FLOAT_SIZE: u8 = 8;

pub const CHECK_INT: i64 = 0x5678;
pub const CHECK_NUM: f64 = 370.5;

/// Bytes before the main function's upvalue count.
pub const HEADER_LEN: usize = SIGNATURE.len() + 2 + DATA.len() + 3 + 8 + 8;
