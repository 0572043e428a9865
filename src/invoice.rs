// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Data structures and decoding for `lni` invoices.
//!
//! An invoice is the final, payable message: it echoes the invoice request it answers and
//! adds the payment hash, the amount due, the blinded paths to pay over and the per-path
//! payment parameters. It is always signed by the recipient's node key.

use bitcoin::hashes::sha256;
use bitcoin::secp256k1::schnorr::Signature;
use bitcoin::secp256k1::PublicKey;

use core::fmt;
use core::time::Duration;

use crate::blinded_path::{self, BlindedPath, BlindedPayInfo};
use crate::invoice_request::InvoiceRequestFields;
use crate::offer;
use crate::parse::{Bolt12ParseError, DecodeError, SemanticError};
use crate::ser;
use crate::tlv::{self, FieldSet, TlvRecord};
use crate::MessageKind;

pub(crate) const INVOICE_PATHS: u64 = 160;
pub(crate) const INVOICE_BLINDEDPAY: u64 = 162;
pub(crate) const INVOICE_CREATED_AT: u64 = 164;
pub(crate) const INVOICE_RELATIVE_EXPIRY: u64 = 166;
pub(crate) const INVOICE_PAYMENT_HASH: u64 = 168;
pub(crate) const INVOICE_AMOUNT: u64 = 170;
pub(crate) const INVOICE_FALLBACKS: u64 = 172;
pub(crate) const INVOICE_FEATURES: u64 = 174;
pub(crate) const INVOICE_NODE_ID: u64 = 176;

/// How long an invoice remains payable when it does not say, in seconds.
pub const DEFAULT_RELATIVE_EXPIRY: u32 = 7200;

/// The payment hash whose preimage settles the invoice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PaymentHash(pub [u8; 32]);

/// An on-chain address to fall back to should the Lightning payment fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FallbackAddress {
	/// The segwit witness version of the address.
	pub version: u8,
	/// The witness program of the address.
	pub program: Vec<u8>,
}

fn decode_fallbacks(value: &[u8]) -> Result<Vec<FallbackAddress>, DecodeError> {
	const FIELD: &str = "invoice_fallbacks";
	let (count, mut buf) = ser::read_u8(value)?;
	let mut fallbacks = Vec::with_capacity(count as usize);
	for _ in 0..count {
		let (version, rest) = ser::read_u8(buf)?;
		if version > 16 {
			return Err(DecodeError::FieldDecode { field: FIELD, reason: "witness version over 16" });
		}
		let (program_len, rest) = ser::read_u16(rest)?;
		let (program, rest) = ser::read_slice(rest, program_len as u64)?;
		if program.len() < 2 || program.len() > 40 {
			return Err(DecodeError::FieldDecode {
				field: FIELD,
				reason: "witness program not 2 to 40 bytes",
			});
		}
		if version == 0 && program.len() != 20 && program.len() != 32 {
			return Err(DecodeError::FieldDecode {
				field: FIELD,
				reason: "v0 witness program not 20 or 32 bytes",
			});
		}
		if version == 1 && program.len() != 32 {
			return Err(DecodeError::FieldDecode {
				field: FIELD,
				reason: "v1 witness program not 32 bytes",
			});
		}
		fallbacks.push(FallbackAddress { version, program: program.to_vec() });
		buf = rest;
	}
	if !buf.is_empty() {
		return Err(DecodeError::FieldDecode { field: FIELD, reason: "trailing bytes" });
	}
	Ok(fallbacks)
}

#[cfg(test)]
fn encode_fallbacks(fallbacks: &[FallbackAddress], buf: &mut Vec<u8>) {
	buf.push(fallbacks.len() as u8);
	for fallback in fallbacks {
		buf.push(fallback.version);
		buf.extend_from_slice(&(fallback.program.len() as u16).to_be_bytes());
		buf.extend_from_slice(&fallback.program);
	}
}

/// The invoice-range fields, embedding the echoed request fields below them.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct InvoiceFields {
	pub invreq: InvoiceRequestFields,
	pub paths: Option<Vec<BlindedPath>>,
	pub blindedpay: Option<Vec<BlindedPayInfo>>,
	pub created_at: Option<u64>,
	pub relative_expiry: Option<u32>,
	pub payment_hash: Option<PaymentHash>,
	pub amount: Option<u64>,
	pub fallbacks: Option<Vec<FallbackAddress>>,
	pub features: Option<Vec<u8>>,
	pub node_id: Option<PublicKey>,
}

impl FieldSet for InvoiceFields {
	fn absorb(&mut self, record: &TlvRecord) -> Result<bool, DecodeError> {
		let value = &record.value[..];
		match record.r#type {
			INVOICE_PATHS => {
				self.paths = Some(blinded_path::parse_blinded_paths("invoice_paths", value)?)
			},
			INVOICE_BLINDEDPAY => {
				self.blindedpay =
					Some(blinded_path::parse_blinded_pay_info("invoice_blindedpay", value)?)
			},
			INVOICE_CREATED_AT => {
				self.created_at = Some(ser::truncated_uint("invoice_created_at", value, 8)?)
			},
			INVOICE_RELATIVE_EXPIRY => {
				self.relative_expiry =
					Some(ser::truncated_uint("invoice_relative_expiry", value, 4)? as u32)
			},
			INVOICE_PAYMENT_HASH => {
				let (bytes, rest) = ser::read_array::<32>(value)?;
				if !rest.is_empty() {
					return Err(DecodeError::FieldDecode {
						field: "invoice_payment_hash",
						reason: "not a 32-byte hash",
					});
				}
				self.payment_hash = Some(PaymentHash(bytes));
			},
			INVOICE_AMOUNT => {
				self.amount = Some(ser::truncated_uint("invoice_amount", value, 8)?)
			},
			INVOICE_FALLBACKS => self.fallbacks = Some(decode_fallbacks(value)?),
			INVOICE_FEATURES => self.features = Some(value.to_vec()),
			INVOICE_NODE_ID => {
				self.node_id = Some(offer::decode_point("invoice_node_id", value)?)
			},
			_ => return self.invreq.absorb(record),
		}
		Ok(true)
	}
}

impl InvoiceFields {
	/// Re-encodes the fields as records in type order.
	#[cfg(test)]
	pub(crate) fn to_records(&self, records: &mut Vec<TlvRecord>) {
		self.invreq.to_records(records);
		if let Some(paths) = &self.paths {
			let mut value = Vec::new();
			blinded_path::encode_blinded_paths(paths, &mut value);
			records.push(TlvRecord::new(INVOICE_PATHS, value));
		}
		if let Some(blindedpay) = &self.blindedpay {
			let mut value = Vec::new();
			blinded_path::encode_blinded_pay_info(blindedpay, &mut value);
			records.push(TlvRecord::new(INVOICE_BLINDEDPAY, value));
		}
		if let Some(created_at) = self.created_at {
			let mut value = Vec::new();
			ser::write_truncated_uint(created_at, &mut value);
			records.push(TlvRecord::new(INVOICE_CREATED_AT, value));
		}
		if let Some(relative_expiry) = self.relative_expiry {
			let mut value = Vec::new();
			ser::write_truncated_uint(relative_expiry as u64, &mut value);
			records.push(TlvRecord::new(INVOICE_RELATIVE_EXPIRY, value));
		}
		if let Some(payment_hash) = &self.payment_hash {
			records.push(TlvRecord::new(INVOICE_PAYMENT_HASH, payment_hash.0.to_vec()));
		}
		if let Some(amount) = self.amount {
			let mut value = Vec::new();
			ser::write_truncated_uint(amount, &mut value);
			records.push(TlvRecord::new(INVOICE_AMOUNT, value));
		}
		if let Some(fallbacks) = &self.fallbacks {
			let mut value = Vec::new();
			encode_fallbacks(fallbacks, &mut value);
			records.push(TlvRecord::new(INVOICE_FALLBACKS, value));
		}
		if let Some(features) = &self.features {
			records.push(TlvRecord::new(INVOICE_FEATURES, features.clone()));
		}
		if let Some(node_id) = &self.node_id {
			records.push(TlvRecord::new(INVOICE_NODE_ID, node_id.serialize().to_vec()));
		}
	}
}

/// An `Invoice` is a payment request for an [`Offer`], signed by its recipient.
///
/// [`Offer`]: crate::offer::Offer
#[derive(Clone, Debug, PartialEq)]
pub struct Invoice {
	bytes: Vec<u8>,
	fields: InvoiceFields,
	created_at: u64,
	payment_hash: PaymentHash,
	amount_msats: u64,
	signing_pubkey: PublicKey,
	signature: Signature,
	unknown_records: Vec<TlvRecord>,
	id: sha256::Hash,
	offer_id: Option<sha256::Hash>,
}

impl Invoice {
	pub(crate) fn from_records(
		records: Vec<TlvRecord>, now: Duration,
	) -> Result<Self, Bolt12ParseError> {
		let folded = tlv::fold_records::<InvoiceFields>(&records)?;
		let tlv::Folded { fields, signature, unknown_records } = folded;

		let paths = match &fields.paths {
			Some(paths) if !paths.is_empty() => paths,
			_ => return Err(SemanticError::MissingMandatoryField("invoice_paths").into()),
		};
		let blindedpay = match &fields.blindedpay {
			Some(blindedpay) => blindedpay,
			None => {
				return Err(SemanticError::MissingMandatoryField("invoice_blindedpay").into())
			},
		};
		if blindedpay.len() != paths.len() {
			return Err(SemanticError::InvalidPayInfo.into());
		}
		let created_at = match fields.created_at {
			Some(created_at) => created_at,
			None => {
				return Err(SemanticError::MissingMandatoryField("invoice_created_at").into())
			},
		};
		let payment_hash = match fields.payment_hash {
			Some(payment_hash) => payment_hash,
			None => {
				return Err(SemanticError::MissingMandatoryField("invoice_payment_hash").into())
			},
		};
		let amount_msats = match fields.amount {
			Some(amount) => amount,
			None => return Err(SemanticError::MissingMandatoryField("invoice_amount").into()),
		};
		let signing_pubkey = match fields.node_id {
			Some(node_id) => node_id,
			None => return Err(SemanticError::MissingMandatoryField("invoice_node_id").into()),
		};
		let signature = match signature {
			Some(signature) => signature,
			None => return Err(SemanticError::MissingMandatoryField("signature").into()),
		};

		let relative_expiry = fields.relative_expiry.unwrap_or(DEFAULT_RELATIVE_EXPIRY);
		if now.as_secs() > created_at.saturating_add(relative_expiry as u64) {
			return Err(SemanticError::AlreadyExpired.into());
		}

		// The mandatory created_at record lies in the signable range, so a root exists.
		let kind = MessageKind::Invoice;
		let id = match crate::merkle::root_hash(&records, kind.signable_types()) {
			Some(id) => id,
			None => {
				return Err(SemanticError::MissingMandatoryField("invoice_created_at").into())
			},
		};
		let digest = crate::merkle::signature_digest(kind, "signature", id);
		crate::merkle::verify_signature(&signature, &digest, signing_pubkey)?;

		let offer_id =
			crate::merkle::root_hash(&records, MessageKind::Offer.signable_types());
		let bytes = tlv::serialize_stream(&records);
		Ok(Invoice {
			bytes,
			fields,
			created_at,
			payment_hash,
			amount_msats,
			signing_pubkey,
			signature,
			unknown_records,
			id,
			offer_id,
		})
	}

	/// The Merkle root of the invoice's records.
	pub fn id(&self) -> sha256::Hash {
		self.id
	}

	/// The Merkle root of the echoed offer records alone, `None` when the invoice echoed no
	/// offer fields.
	pub fn offer_id(&self) -> Option<sha256::Hash> {
		self.offer_id
	}

	/// Blinded paths over which payment may be sent, in order of preference.
	pub fn paths(&self) -> &[BlindedPath] {
		self.fields.paths.as_deref().unwrap_or(&[])
	}

	/// Payment parameters for each of [`Invoice::paths`], in the same order.
	pub fn blindedpay(&self) -> &[BlindedPayInfo] {
		self.fields.blindedpay.as_deref().unwrap_or(&[])
	}

	/// Seconds since the epoch at which the invoice was created.
	pub fn created_at(&self) -> Duration {
		Duration::from_secs(self.created_at)
	}

	/// How long past [`Invoice::created_at`] the invoice remains payable.
	pub fn relative_expiry(&self) -> Duration {
		Duration::from_secs(
			self.fields.relative_expiry.unwrap_or(DEFAULT_RELATIVE_EXPIRY) as u64
		)
	}

	/// Whether the invoice has expired as of `now`, seconds since the epoch.
	pub fn is_expired_at(&self, now: Duration) -> bool {
		now.as_secs() > self.created_at.saturating_add(self.relative_expiry().as_secs())
	}

	/// The hash whose preimage must be revealed to settle the payment.
	pub fn payment_hash(&self) -> PaymentHash {
		self.payment_hash
	}

	/// The amount due, in millisatoshis.
	pub fn amount_msats(&self) -> u64 {
		self.amount_msats
	}

	/// On-chain addresses to fall back to should the Lightning payment fail.
	pub fn fallbacks(&self) -> &[FallbackAddress] {
		self.fields.fallbacks.as_deref().unwrap_or(&[])
	}

	/// Features pertaining to the invoice.
	pub fn features(&self) -> &[u8] {
		self.fields.features.as_deref().unwrap_or(&[])
	}

	/// The public key the invoice is signed with.
	pub fn signing_pubkey(&self) -> PublicKey {
		self.signing_pubkey
	}

	/// The recipient's signature over [`Invoice::id`].
	pub fn signature(&self) -> Signature {
		self.signature
	}

	/// Odd-typed records this decoder did not recognize, kept verbatim.
	pub fn unknown_records(&self) -> &[TlvRecord] {
		&self.unknown_records
	}
}

impl fmt::Display for Invoice {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		crate::parse::fmt_bech32(MessageKind::Invoice, &self.bytes, f)
	}
}
