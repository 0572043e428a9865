// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The bech32 text layer and the error types surfaced when parsing fails.
//!
//! BOLT12 strings use bech32 characters without a checksum and may be split across lines for
//! display by inserting `+` between parts, optionally followed by whitespace. This module
//! undoes that transport encoding, leaving a raw TLV byte stream for the rest of the crate
//! to interpret.

use bech32::primitives::decode::{CheckedHrpstring, CheckedHrpstringError};
use bech32::{Hrp, NoChecksum};
use bitcoin::secp256k1;

use core::fmt;
use std::borrow::Cow;

use crate::MessageKind;

/// Failure to parse a BOLT12 string into a validated message.
#[derive(Debug, PartialEq)]
pub enum Bolt12ParseError {
	/// The string was not well-formed bech32 text with a known prefix.
	MalformedText(TextError),
	/// The TLV byte stream or one of its records could not be decoded.
	Decode(DecodeError),
	/// The records decoded but violate a constraint of the message kind.
	InvalidSemantics(SemanticError),
	/// The Merkle root of the message was not signed by the expected key.
	BadSignature(secp256k1::Error),
}

/// Failure in the character-level layer, before any bytes are recovered.
#[derive(Debug, PartialEq)]
pub enum TextError {
	/// A `+` continuation was not surrounded by bech32 characters.
	InvalidContinuation,
	/// The human-readable prefix is not `lno`, `lnr`, or `lni`.
	UnknownHrp(String),
	/// The data characters were not valid bech32.
	Bech32(CheckedHrpstringError),
}

/// Failure to decode the TLV byte stream into records and fields.
#[derive(Debug, PartialEq)]
pub enum DecodeError {
	/// A read ran past the end of the buffer.
	TruncatedBuffer {
		/// Bytes the read required.
		expected: u64,
		/// Bytes remaining in the buffer.
		available: u64,
	},
	/// A BigSize integer used more bytes than its value requires.
	NonMinimalEncoding,
	/// A record's type was not strictly greater than its predecessor's.
	OutOfOrderRecord {
		/// The preceding record's type.
		previous: u64,
		/// The offending record's type.
		found: u64,
	},
	/// An even-typed record outside the message's dictionary. Even types are mandatory to
	/// understand, so the message cannot be safely interpreted.
	UnknownRequiredField(u64),
	/// A recognized field's value did not match its required shape.
	FieldDecode {
		/// The field whose value was malformed.
		field: &'static str,
		/// What was wrong with it.
		reason: &'static str,
	},
}

/// Failure of a well-formed record set to satisfy the message kind's constraints.
#[derive(Debug, PartialEq)]
pub enum SemanticError {
	/// A field required by the message kind was absent.
	MissingMandatoryField(&'static str),
	/// A field was present that the message kind forbids in this configuration.
	UnexpectedField(&'static str),
	/// The message's expiry has already passed.
	AlreadyExpired,
	/// An invoice request's amount was below the offer's amount.
	InsufficientAmount,
	/// An invoice request's quantity was outside the offer's bounds.
	InvalidQuantity,
	/// An invoice request's recurrence counter was outside the offer's limit.
	InvalidRecurrenceCounter,
	/// An invoice's per-path payment parameters were inconsistent with its paths.
	InvalidPayInfo,
}

impl From<TextError> for Bolt12ParseError {
	fn from(error: TextError) -> Self {
		Self::MalformedText(error)
	}
}

impl From<DecodeError> for Bolt12ParseError {
	fn from(error: DecodeError) -> Self {
		Self::Decode(error)
	}
}

impl From<SemanticError> for Bolt12ParseError {
	fn from(error: SemanticError) -> Self {
		Self::InvalidSemantics(error)
	}
}

impl From<secp256k1::Error> for Bolt12ParseError {
	fn from(error: secp256k1::Error) -> Self {
		Self::BadSignature(error)
	}
}

impl fmt::Display for Bolt12ParseError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::MalformedText(error) => write!(f, "malformed text: {}", error),
			Self::Decode(error) => write!(f, "decode failure: {}", error),
			Self::InvalidSemantics(error) => write!(f, "invalid message: {}", error),
			Self::BadSignature(error) => write!(f, "bad signature: {}", error),
		}
	}
}

impl fmt::Display for TextError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::InvalidContinuation => {
				write!(f, "a + was not surrounded by bech32 characters")
			},
			Self::UnknownHrp(hrp) => write!(f, "unknown prefix {}", hrp),
			Self::Bech32(error) => write!(f, "{}", error),
		}
	}
}

impl fmt::Display for DecodeError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::TruncatedBuffer { expected, available } => {
				write!(f, "needed {} bytes but only {} remained", expected, available)
			},
			Self::NonMinimalEncoding => write!(f, "non-minimal BigSize encoding"),
			Self::OutOfOrderRecord { previous, found } => {
				write!(f, "record type {} followed type {}", found, previous)
			},
			Self::UnknownRequiredField(tlv_type) => {
				write!(f, "unknown even record type {}", tlv_type)
			},
			Self::FieldDecode { field, reason } => write!(f, "{}: {}", field, reason),
		}
	}
}

impl fmt::Display for SemanticError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::MissingMandatoryField(field) => write!(f, "missing {}", field),
			Self::UnexpectedField(field) => write!(f, "unexpected {}", field),
			Self::AlreadyExpired => write!(f, "already expired"),
			Self::InsufficientAmount => write!(f, "amount below the offer's amount"),
			Self::InvalidQuantity => write!(f, "quantity outside the offer's bounds"),
			Self::InvalidRecurrenceCounter => {
				write!(f, "recurrence counter outside the offer's limit")
			},
			Self::InvalidPayInfo => write!(f, "payment parameters inconsistent with paths"),
		}
	}
}

impl std::error::Error for Bolt12ParseError {}
impl std::error::Error for TextError {}
impl std::error::Error for DecodeError {}
impl std::error::Error for SemanticError {}

/// Strips the display transport from a BOLT12 string, returning the message kind named by its
/// prefix and the raw TLV byte stream.
pub(crate) fn decode_body(s: &str) -> Result<(MessageKind, Vec<u8>), Bolt12ParseError> {
	// The string may be split for display by inserting `+` between parts, each `+` optionally
	// followed by whitespace. Without a `+`, stray whitespace is left for the bech32 layer to
	// reject as any other invalid character.
	let encoded = match s.split('+').nth(1) {
		Some(_) => {
			for chunk in s.split('+') {
				let chunk = chunk.trim_start();
				if chunk.is_empty() || chunk.contains(char::is_whitespace) {
					return Err(TextError::InvalidContinuation.into());
				}
			}
			Cow::Owned(s.chars().filter(|c| *c != '+' && !c.is_whitespace()).collect())
		},
		None => Cow::Borrowed(s),
	};

	let parsed = CheckedHrpstring::new::<NoChecksum>(&encoded)
		.map_err(|e| TextError::Bech32(e))?;
	let hrp = parsed.hrp().to_string().to_ascii_lowercase();
	let kind = match hrp.as_str() {
		"lno" => MessageKind::Offer,
		"lnr" => MessageKind::InvoiceRequest,
		"lni" => MessageKind::Invoice,
		_ => return Err(TextError::UnknownHrp(hrp).into()),
	};

	Ok((kind, parsed.byte_iter().collect()))
}

/// Formats a TLV byte stream in the bech32 transport form for `kind`.
pub(crate) fn fmt_bech32(kind: MessageKind, data: &[u8], f: &mut fmt::Formatter) -> fmt::Result {
	let hrp = Hrp::parse(kind.hrp()).expect("HRP is invalid");
	bech32::encode_to_fmt::<NoChecksum, _>(f, hrp, data).map_err(|_| fmt::Error)
}
