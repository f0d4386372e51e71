//! Order-preserving byte encoding for keys
//!
//! `encode_key(a) < encode_key(b)` (bytewise) exactly when `a < b`. The
//! persisted image stores records under these bytes so a reader can walk
//! them in key order without decoding.
//!
//! Layout:
//! - one type tag byte per key (number, date, string, binary, array)
//! - numbers and dates: IEEE-754 bits, sign-flipped, big-endian
//! - strings: UTF-16 units in a 1 to 3 byte escape, then a `0x00` terminator
//! - binary: bytes in the same escape, then `0x00`
//! - arrays: encoded elements, then `0x00`

use super::Key;
use crate::error::{StrataError, StrataResult};

const TAG_TERMINATOR: u8 = 0x00;
const TAG_NUMBER: u8 = 0x10;
const TAG_DATE: u8 = 0x20;
const TAG_STRING: u8 = 0x30;
const TAG_BINARY: u8 = 0x40;
const TAG_ARRAY: u8 = 0x50;

const ONE_BYTE_LIMIT: u32 = 0x7E;
const TWO_BYTE_LIMIT: u32 = 0x3FFF + 0x7F;
const ONE_BYTE_ADJUST: u32 = 1;
const TWO_BYTE_ADJUST: u32 = 0x7F;
const THREE_BYTE_SHIFT: u32 = 6;

/// Encode a key into its ordered byte form.
pub fn encode_key(key: &Key) -> Vec<u8> {
	let mut out = Vec::new();
	encode_into(key, &mut out);
	out
}

fn encode_into(key: &Key, out: &mut Vec<u8>) {
	match key {
		Key::Number(n) => {
			out.push(TAG_NUMBER);
			encode_f64(*n, out);
		}
		Key::Date(ms) => {
			out.push(TAG_DATE);
			encode_f64(*ms, out);
		}
		Key::String(s) => {
			out.push(TAG_STRING);
			for unit in s.encode_utf16() {
				encode_unit(unit as u32, out);
			}
			out.push(TAG_TERMINATOR);
		}
		Key::Binary(bytes) => {
			out.push(TAG_BINARY);
			for byte in bytes {
				encode_unit(*byte as u32, out);
			}
			out.push(TAG_TERMINATOR);
		}
		Key::Array(items) => {
			out.push(TAG_ARRAY);
			for item in items {
				encode_into(item, out);
			}
			out.push(TAG_TERMINATOR);
		}
	}
}

fn encode_f64(n: f64, out: &mut Vec<u8>) {
	let n = if n == 0.0 { 0.0 } else { n };
	let bits = n.to_bits();
	let ordered = if bits & (1 << 63) != 0 {
		!bits
	} else {
		bits | (1 << 63)
	};
	out.extend_from_slice(&ordered.to_be_bytes());
}

fn encode_unit(unit: u32, out: &mut Vec<u8>) {
	if unit <= ONE_BYTE_LIMIT {
		out.push((unit + ONE_BYTE_ADJUST) as u8);
	} else if unit <= TWO_BYTE_LIMIT {
		let c = unit - TWO_BYTE_ADJUST + 0x8000;
		out.push((c >> 8) as u8);
		out.push((c & 0xFF) as u8);
	} else {
		let c = (unit << THREE_BYTE_SHIFT) | 0x00C0_0000;
		out.push((c >> 16) as u8);
		out.push(((c >> 8) & 0xFF) as u8);
		out.push((c & 0xFF) as u8);
	}
}

/// Decode bytes produced by [`encode_key`].
pub fn decode_key(bytes: &[u8]) -> StrataResult<Key> {
	let mut decoder = Decoder { bytes, pos: 0 };
	let key = decoder.key()?;
	if decoder.pos != bytes.len() {
		return Err(corrupt("trailing bytes after key"));
	}
	Ok(key)
}

struct Decoder<'a> {
	bytes: &'a [u8],
	pos: usize,
}

impl Decoder<'_> {
	fn next_byte(&mut self) -> StrataResult<u8> {
		let byte = *self
			.bytes
			.get(self.pos)
			.ok_or_else(|| corrupt("unexpected end of key"))?;
		self.pos += 1;
		Ok(byte)
	}

	fn peek(&self) -> StrataResult<u8> {
		self.bytes
			.get(self.pos)
			.copied()
			.ok_or_else(|| corrupt("unexpected end of key"))
	}

	fn key(&mut self) -> StrataResult<Key> {
		match self.next_byte()? {
			TAG_NUMBER => Ok(Key::Number(self.f64()?)),
			TAG_DATE => Ok(Key::Date(self.f64()?)),
			TAG_STRING => {
				let units = self.units()?;
				let units: Vec<u16> = units.into_iter().map(|u| u as u16).collect();
				String::from_utf16(&units)
					.map(Key::String)
					.map_err(|_| corrupt("string key is not valid UTF-16"))
			}
			TAG_BINARY => {
				let units = self.units()?;
				units
					.into_iter()
					.map(|u| u8::try_from(u).map_err(|_| corrupt("binary key unit out of range")))
					.collect::<StrataResult<Vec<u8>>>()
					.map(Key::Binary)
			}
			TAG_ARRAY => {
				let mut items = Vec::new();
				while self.peek()? != TAG_TERMINATOR {
					items.push(self.key()?);
				}
				self.pos += 1;
				Ok(Key::Array(items))
			}
			tag => Err(corrupt(&format!("unknown key tag 0x{tag:02x}"))),
		}
	}

	fn f64(&mut self) -> StrataResult<f64> {
		let end = self.pos + 8;
		let slice = self
			.bytes
			.get(self.pos..end)
			.ok_or_else(|| corrupt("truncated number"))?;
		let mut raw = [0u8; 8];
		raw.copy_from_slice(slice);
		self.pos = end;
		let ordered = u64::from_be_bytes(raw);
		let bits = if ordered & (1 << 63) != 0 {
			ordered & !(1 << 63)
		} else {
			!ordered
		};
		Ok(f64::from_bits(bits))
	}

	fn units(&mut self) -> StrataResult<Vec<u32>> {
		let mut units = Vec::new();
		loop {
			let first = self.next_byte()? as u32;
			if first == TAG_TERMINATOR as u32 {
				return Ok(units);
			}
			if first <= ONE_BYTE_LIMIT + ONE_BYTE_ADJUST {
				units.push(first - ONE_BYTE_ADJUST);
			} else if first & 0xC0 == 0x80 {
				let second = self.next_byte()? as u32;
				let c = ((first << 8) | second) - 0x8000;
				units.push(c + TWO_BYTE_ADJUST);
			} else {
				let second = self.next_byte()? as u32;
				let third = self.next_byte()? as u32;
				let c = (first << 16) | (second << 8) | third;
				units.push((c >> THREE_BYTE_SHIFT) & 0xFFFF);
			}
		}
	}
}

fn corrupt(msg: &str) -> StrataError {
	StrataError::Storage(format!("corrupt key encoding: {msg}"))
}
