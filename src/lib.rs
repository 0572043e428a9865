// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! A decoder for the three BOLT12 message kinds: offers (`lno`), invoice requests (`lnr`)
//! and invoices (`lni`).
//!
//! [`decode`] takes the bech32 text form of any of the three, strips the display transport,
//! parses the underlying TLV stream, checks the decoded fields against the constraints of
//! the message kind, computes the message's Merkle id, and verifies its signature when one
//! is required or present. Only a fully validated message is returned.
//!
//! ```
//! use lightning_bolt12::{decode, Bolt12Message};
//!
//! # fn check(encoded: &str) -> Result<(), lightning_bolt12::Bolt12ParseError> {
//! match decode(encoded)? {
//! 	Bolt12Message::Offer(offer) => println!("offer of {}", offer.description()),
//! 	Bolt12Message::InvoiceRequest(request) => println!("request {}", request.id()),
//! 	Bolt12Message::Invoice(invoice) => println!("{} msats due", invoice.amount_msats()),
//! }
//! # Ok(())
//! # }
//! ```

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]

pub mod blinded_path;
pub mod invoice;
pub mod invoice_request;
mod merkle;
pub mod offer;
pub mod parse;
mod ser;
pub mod tlv;

use core::fmt;
use core::ops::Range;
use core::time::Duration;
use std::time::SystemTime;

pub use crate::invoice::Invoice;
pub use crate::invoice_request::InvoiceRequest;
pub use crate::offer::Offer;
pub use crate::parse::Bolt12ParseError;

/// The three message kinds of the protocol, as named by a string's bech32 prefix.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageKind {
	/// An `lno` offer.
	Offer,
	/// An `lnr` invoice request.
	InvoiceRequest,
	/// An `lni` invoice.
	Invoice,
}

impl MessageKind {
	/// The kind's name, as used in signature tags.
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::Offer => "offer",
			Self::InvoiceRequest => "invoice_request",
			Self::Invoice => "invoice",
		}
	}

	pub(crate) fn hrp(&self) -> &'static str {
		match self {
			Self::Offer => "lno",
			Self::InvoiceRequest => "lnr",
			Self::Invoice => "lni",
		}
	}

	/// The TLV types hashed into this kind's Merkle id. Offers cover only the offer range;
	/// requests and invoices cover everything below the signature range.
	pub(crate) fn signable_types(&self) -> Range<u64> {
		match self {
			Self::Offer => 1..80,
			Self::InvoiceRequest | Self::Invoice => 0..240,
		}
	}
}

impl fmt::Display for MessageKind {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// Any of the three BOLT12 message kinds, fully decoded and validated.
#[derive(Clone, Debug, PartialEq)]
pub enum Bolt12Message {
	/// An offer parsed from an `lno` string.
	Offer(Offer),
	/// An invoice request parsed from an `lnr` string.
	InvoiceRequest(InvoiceRequest),
	/// An invoice parsed from an `lni` string.
	Invoice(Invoice),
}

impl Bolt12Message {
	/// Which of the three kinds this message is.
	pub fn kind(&self) -> MessageKind {
		match self {
			Self::Offer(_) => MessageKind::Offer,
			Self::InvoiceRequest(_) => MessageKind::InvoiceRequest,
			Self::Invoice(_) => MessageKind::Invoice,
		}
	}

	/// The message's Merkle id.
	pub fn id(&self) -> bitcoin::hashes::sha256::Hash {
		match self {
			Self::Offer(offer) => offer.id(),
			Self::InvoiceRequest(invoice_request) => invoice_request.id(),
			Self::Invoice(invoice) => invoice.id(),
		}
	}
}

impl fmt::Display for Bolt12Message {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			Self::Offer(offer) => fmt::Display::fmt(offer, f),
			Self::InvoiceRequest(invoice_request) => fmt::Display::fmt(invoice_request, f),
			Self::Invoice(invoice) => fmt::Display::fmt(invoice, f),
		}
	}
}

/// Decodes and validates a BOLT12 string, taking `now` as seconds since the epoch for the
/// expiry checks.
pub fn decode_with_time(s: &str, now: Duration) -> Result<Bolt12Message, Bolt12ParseError> {
	let (kind, bytes) = parse::decode_body(s)?;
	let records = tlv::parse_stream(&bytes).map_err(Bolt12ParseError::Decode)?;
	match kind {
		MessageKind::Offer => Offer::from_records(records, now).map(Bolt12Message::Offer),
		MessageKind::InvoiceRequest => {
			InvoiceRequest::from_records(records, now).map(Bolt12Message::InvoiceRequest)
		},
		MessageKind::Invoice => Invoice::from_records(records, now).map(Bolt12Message::Invoice),
	}
}

/// Decodes and validates a BOLT12 string against the system clock.
pub fn decode(s: &str) -> Result<Bolt12Message, Bolt12ParseError> {
	let now = SystemTime::UNIX_EPOCH.elapsed().unwrap_or(Duration::ZERO);
	decode_with_time(s, now)
}
