// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! TLV streams: the ordered sequence of type-length-value records underlying every BOLT12
//! message.
//!
//! This layer is deliberately ignorant of what any record means. It enforces the stream
//! grammar (minimal BigSize types and lengths, strictly-increasing types, no reads past the
//! end) and hands back raw [`TlvRecord`]s; each message kind interprets them against its own
//! field dictionary.

use bitcoin::secp256k1::schnorr::Signature;

use crate::merkle::SIGNATURE_TLV_TYPE;
use crate::parse::DecodeError;
use crate::ser;

/// A single type-length-value record. The length is implied by the value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TlvRecord {
	/// The record's type.
	pub r#type: u64,
	/// The record's value bytes.
	pub value: Vec<u8>,
}

impl TlvRecord {
	pub(crate) fn new(r#type: u64, value: Vec<u8>) -> Self {
		TlvRecord { r#type, value }
	}

	/// The record's full wire serialization: type, length, then value.
	pub(crate) fn serialized(&self) -> Vec<u8> {
		let mut buf = Vec::with_capacity(self.value.len() + 4);
		self.write(&mut buf);
		buf
	}

	/// The BigSize encoding of the record's type alone.
	pub(crate) fn type_bytes(&self) -> Vec<u8> {
		let mut buf = Vec::with_capacity(9);
		ser::write_bigsize(self.r#type, &mut buf);
		buf
	}

	fn write(&self, buf: &mut Vec<u8>) {
		ser::write_bigsize(self.r#type, buf);
		ser::write_bigsize(self.value.len() as u64, buf);
		buf.extend_from_slice(&self.value);
	}
}

/// Parses a byte stream into TLV records, requiring strictly-increasing types and consuming
/// the entire buffer.
pub fn parse_stream(bytes: &[u8]) -> Result<Vec<TlvRecord>, DecodeError> {
	let mut records = Vec::new();
	let mut last_type: Option<u64> = None;
	let mut buf = bytes;
	while !buf.is_empty() {
		let (r#type, rest) = ser::read_bigsize(buf)?;
		let (length, rest) = ser::read_bigsize(rest)?;
		let (value, rest) = ser::read_slice(rest, length)?;
		if let Some(previous) = last_type {
			if r#type <= previous {
				return Err(DecodeError::OutOfOrderRecord { previous, found: r#type });
			}
		}
		records.push(TlvRecord::new(r#type, value.to_vec()));
		last_type = Some(r#type);
		buf = rest;
	}
	Ok(records)
}

/// Serializes records back into the byte stream [`parse_stream`] would have decoded them
/// from. Record lengths are re-derived from the values.
pub fn serialize_stream(records: &[TlvRecord]) -> Vec<u8> {
	let mut buf = Vec::new();
	for record in records {
		record.write(&mut buf);
	}
	buf
}

/// A message kind's field dictionary, fed one record at a time.
pub(crate) trait FieldSet: Default {
	/// Decodes `record` into the matching field, returning whether the type was recognized.
	fn absorb(&mut self, record: &TlvRecord) -> Result<bool, DecodeError>;
}

/// The outcome of folding a record sequence through a field dictionary.
pub(crate) struct Folded<F> {
	pub fields: F,
	pub signature: Option<Signature>,
	pub unknown_records: Vec<TlvRecord>,
}

/// Folds records into a field set, splitting off the signature and collecting unrecognized
/// odd-typed records. Unrecognized even types are mandatory to understand and fail the fold.
pub(crate) fn fold_records<F: FieldSet>(records: &[TlvRecord]) -> Result<Folded<F>, DecodeError> {
	let mut fields = F::default();
	let mut signature = None;
	let mut unknown_records = Vec::new();
	for record in records {
		if record.r#type == SIGNATURE_TLV_TYPE {
			signature = Some(Signature::from_slice(&record.value).map_err(|_| {
				DecodeError::FieldDecode { field: "signature", reason: "not a 64-byte signature" }
			})?);
		} else if !fields.absorb(record)? {
			if record.r#type % 2 == 1 {
				unknown_records.push(record.clone());
			} else {
				return Err(DecodeError::UnknownRequiredField(record.r#type));
			}
		}
	}
	Ok(Folded { fields, signature, unknown_records })
}
