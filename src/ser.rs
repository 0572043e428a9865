// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Wire-level integer primitives: BigSize variable-length integers, fixed-width big-endian
//! integers, and the truncated integers (`tu16`, `tu32`, `tu64`) used inside TLV values.
//!
//! All readers take a byte slice and return the decoded value together with the unread
//! remainder of the slice, so parsers can chain reads without carrying a cursor.

use crate::parse::DecodeError;

/// Reads `N` bytes, returning them as an array along with the unread remainder.
pub(crate) fn read_array<const N: usize>(buf: &[u8]) -> Result<([u8; N], &[u8]), DecodeError> {
	if buf.len() < N {
		return Err(DecodeError::TruncatedBuffer { expected: N as u64, available: buf.len() as u64 });
	}
	let (bytes, rest) = buf.split_at(N);
	let mut array = [0u8; N];
	array.copy_from_slice(bytes);
	Ok((array, rest))
}

/// Reads `len` bytes as a sub-slice, returning it along with the unread remainder.
pub(crate) fn read_slice(buf: &[u8], len: u64) -> Result<(&[u8], &[u8]), DecodeError> {
	if len > buf.len() as u64 {
		return Err(DecodeError::TruncatedBuffer { expected: len, available: buf.len() as u64 });
	}
	Ok(buf.split_at(len as usize))
}

pub(crate) fn read_u8(buf: &[u8]) -> Result<(u8, &[u8]), DecodeError> {
	let (bytes, rest) = read_array::<1>(buf)?;
	Ok((bytes[0], rest))
}

pub(crate) fn read_u16(buf: &[u8]) -> Result<(u16, &[u8]), DecodeError> {
	let (bytes, rest) = read_array::<2>(buf)?;
	Ok((u16::from_be_bytes(bytes), rest))
}

pub(crate) fn read_u32(buf: &[u8]) -> Result<(u32, &[u8]), DecodeError> {
	let (bytes, rest) = read_array::<4>(buf)?;
	Ok((u32::from_be_bytes(bytes), rest))
}

pub(crate) fn read_u64(buf: &[u8]) -> Result<(u64, &[u8]), DecodeError> {
	let (bytes, rest) = read_array::<8>(buf)?;
	Ok((u64::from_be_bytes(bytes), rest))
}

/// Reads a BigSize-encoded integer, rejecting non-minimal encodings.
pub(crate) fn read_bigsize(buf: &[u8]) -> Result<(u64, &[u8]), DecodeError> {
	let (first, rest) = read_u8(buf)?;
	match first {
		0xff => {
			let (value, rest) = read_u64(rest)?;
			if value < 0x1_0000_0000 {
				Err(DecodeError::NonMinimalEncoding)
			} else {
				Ok((value, rest))
			}
		},
		0xfe => {
			let (value, rest) = read_u32(rest)?;
			if value < 0x1_0000 {
				Err(DecodeError::NonMinimalEncoding)
			} else {
				Ok((value as u64, rest))
			}
		},
		0xfd => {
			let (value, rest) = read_u16(rest)?;
			if value < 0xfd {
				Err(DecodeError::NonMinimalEncoding)
			} else {
				Ok((value as u64, rest))
			}
		},
		n => Ok((n as u64, rest)),
	}
}

/// Appends the minimal BigSize encoding of `value`.
pub(crate) fn write_bigsize(value: u64, buf: &mut Vec<u8>) {
	match value {
		0..=0xfc => buf.push(value as u8),
		0xfd..=0xffff => {
			buf.push(0xfd);
			buf.extend_from_slice(&(value as u16).to_be_bytes());
		},
		0x1_0000..=0xffff_ffff => {
			buf.push(0xfe);
			buf.extend_from_slice(&(value as u32).to_be_bytes());
		},
		_ => {
			buf.push(0xff);
			buf.extend_from_slice(&value.to_be_bytes());
		},
	}
}

/// Decodes a truncated big-endian integer occupying the whole of `bytes`.
///
/// Truncated integers may drop any number of leading zero bytes, including all of them, but
/// may never be wider than the full-width type they truncate.
pub(crate) fn truncated_uint(
	field: &'static str, bytes: &[u8], max_width: usize,
) -> Result<u64, DecodeError> {
	if bytes.len() > max_width {
		return Err(DecodeError::FieldDecode { field, reason: "truncated integer too wide" });
	}
	let mut value = 0u64;
	for byte in bytes {
		value = value << 8 | *byte as u64;
	}
	Ok(value)
}

/// Appends a truncated big-endian integer, dropping leading zero bytes. Zero is written as a
/// single zero byte rather than an empty value.
#[cfg(test)]
pub(crate) fn write_truncated_uint(value: u64, buf: &mut Vec<u8>) {
	let bytes = value.to_be_bytes();
	let leading_zero_bytes = (value.leading_zeros() / 8) as usize;
	if leading_zero_bytes == bytes.len() {
		buf.push(0);
	} else {
		buf.extend_from_slice(&bytes[leading_zero_bytes..]);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn bigsize_bytes(value: u64) -> Vec<u8> {
		let mut buf = Vec::new();
		write_bigsize(value, &mut buf);
		buf
	}

	#[test]
	fn bigsize_threshold_encodings() {
		assert_eq!(bigsize_bytes(0), vec![0x00]);
		assert_eq!(bigsize_bytes(252), vec![0xfc]);
		assert_eq!(bigsize_bytes(253), vec![0xfd, 0x00, 0xfd]);
		assert_eq!(bigsize_bytes(65535), vec![0xfd, 0xff, 0xff]);
		assert_eq!(bigsize_bytes(65536), vec![0xfe, 0x00, 0x01, 0x00, 0x00]);
		assert_eq!(bigsize_bytes(4294967295), vec![0xfe, 0xff, 0xff, 0xff, 0xff]);
		assert_eq!(
			bigsize_bytes(4294967296),
			vec![0xff, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00]
		);
	}

	#[test]
	fn bigsize_round_trips() {
		for value in
			[0, 1, 252, 253, 254, 65535, 65536, 4294967295, 4294967296, u64::MAX]
		{
			let encoded = bigsize_bytes(value);
			let (decoded, rest) = read_bigsize(&encoded).unwrap();
			assert_eq!(decoded, value);
			assert!(rest.is_empty());
		}
	}

	#[test]
	fn bigsize_rejects_non_minimal_encodings() {
		for encoded in [
			&[0xfd, 0x00, 0xfc][..],
			&[0xfd, 0x00, 0x00][..],
			&[0xfe, 0x00, 0x00, 0xff, 0xff][..],
			&[0xff, 0x00, 0x00, 0x00, 0x00, 0xff, 0xff, 0xff, 0xff][..],
		] {
			assert_eq!(read_bigsize(encoded), Err(DecodeError::NonMinimalEncoding));
		}
	}

	#[test]
	fn bigsize_rejects_truncated_reads() {
		assert_eq!(
			read_bigsize(&[]),
			Err(DecodeError::TruncatedBuffer { expected: 1, available: 0 })
		);
		assert_eq!(
			read_bigsize(&[0xfd, 0x01]),
			Err(DecodeError::TruncatedBuffer { expected: 2, available: 1 })
		);
		assert_eq!(
			read_bigsize(&[0xfe, 0x01, 0x02]),
			Err(DecodeError::TruncatedBuffer { expected: 4, available: 2 })
		);
		assert_eq!(
			read_bigsize(&[0xff, 0x01]),
			Err(DecodeError::TruncatedBuffer { expected: 8, available: 1 })
		);
	}

	#[test]
	fn truncated_uint_drops_leading_zeroes() {
		let mut buf = Vec::new();
		write_truncated_uint(0x0100, &mut buf);
		assert_eq!(buf, vec![0x01, 0x00]);
		assert_eq!(truncated_uint("field", &buf, 4).unwrap(), 0x0100);

		// Readers are lenient about retained leading zeroes within the type's width.
		assert_eq!(truncated_uint("field", &[0x00, 0x01], 2).unwrap(), 1);
		assert_eq!(truncated_uint("field", &[], 2).unwrap(), 0);
	}

	#[test]
	fn truncated_uint_zero_is_one_byte() {
		let mut buf = Vec::new();
		write_truncated_uint(0, &mut buf);
		assert_eq!(buf, vec![0x00]);
	}

	#[test]
	fn truncated_uint_rejects_overwide_values() {
		assert_eq!(
			truncated_uint("field", &[0x01, 0x02, 0x03], 2),
			Err(DecodeError::FieldDecode { field: "field", reason: "truncated integer too wide" })
		);
	}

	#[test]
	fn fixed_width_reads_return_the_remainder() {
		let buf = [0x00, 0x01, 0xff];
		let (value, rest) = read_u16(&buf).unwrap();
		assert_eq!(value, 1);
		assert_eq!(rest, &[0xff]);
		assert_eq!(
			read_u32(&buf),
			Err(DecodeError::TruncatedBuffer { expected: 4, available: 3 })
		);
	}
}
