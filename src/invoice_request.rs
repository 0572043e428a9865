// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Data structures and decoding for `lnr` invoice requests.
//!
//! An invoice request echoes the offer it responds to and adds the payer's choices: which
//! chain, what amount, how many items, which period of a recurring schedule. It is always
//! signed by the payer's transient key so the resulting invoice can be tied back to them.

use bitcoin::constants::ChainHash;
use bitcoin::hashes::sha256;
use bitcoin::network::Network;
use bitcoin::secp256k1::schnorr::Signature;
use bitcoin::secp256k1::PublicKey;

use core::fmt;
use core::time::Duration;

use crate::blinded_path::{self, BlindedPath};
use crate::offer::{self, Amount, OfferFields};
use crate::parse::{Bolt12ParseError, DecodeError, SemanticError};
use crate::ser;
use crate::tlv::{self, FieldSet, TlvRecord};
use crate::MessageKind;

pub(crate) const INVREQ_METADATA: u64 = 0;
pub(crate) const INVREQ_CHAIN: u64 = 80;
pub(crate) const INVREQ_AMOUNT: u64 = 82;
pub(crate) const INVREQ_FEATURES: u64 = 84;
pub(crate) const INVREQ_QUANTITY: u64 = 86;
pub(crate) const INVREQ_PAYER_ID: u64 = 88;
pub(crate) const INVREQ_PAYER_NOTE: u64 = 89;
pub(crate) const INVREQ_PATHS: u64 = 90;
pub(crate) const INVREQ_RECURRENCE_COUNTER: u64 = 92;
pub(crate) const INVREQ_RECURRENCE_START: u64 = 94;

/// The payer-range fields, embedding the echoed offer fields below them.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct InvoiceRequestFields {
	pub offer: OfferFields,
	pub metadata: Option<Vec<u8>>,
	pub chain: Option<ChainHash>,
	pub amount: Option<u64>,
	pub features: Option<Vec<u8>>,
	pub quantity: Option<u64>,
	pub payer_id: Option<PublicKey>,
	pub payer_note: Option<String>,
	pub paths: Option<Vec<BlindedPath>>,
	pub recurrence_counter: Option<u32>,
	pub recurrence_start: Option<u32>,
}

impl FieldSet for InvoiceRequestFields {
	fn absorb(&mut self, record: &TlvRecord) -> Result<bool, DecodeError> {
		let value = &record.value[..];
		match record.r#type {
			INVREQ_METADATA => self.metadata = Some(value.to_vec()),
			INVREQ_CHAIN => {
				self.chain = Some(offer::decode_chain_hash("invreq_chain", value)?)
			},
			INVREQ_AMOUNT => {
				self.amount = Some(ser::truncated_uint("invreq_amount", value, 8)?)
			},
			INVREQ_FEATURES => self.features = Some(value.to_vec()),
			INVREQ_QUANTITY => {
				self.quantity = Some(ser::truncated_uint("invreq_quantity", value, 8)?)
			},
			INVREQ_PAYER_ID => {
				self.payer_id = Some(offer::decode_point("invreq_payer_id", value)?)
			},
			INVREQ_PAYER_NOTE => {
				self.payer_note = Some(offer::decode_utf8("invreq_payer_note", value)?)
			},
			INVREQ_PATHS => {
				self.paths = Some(blinded_path::parse_blinded_paths("invreq_paths", value)?)
			},
			INVREQ_RECURRENCE_COUNTER => {
				self.recurrence_counter =
					Some(ser::truncated_uint("invreq_recurrence_counter", value, 4)? as u32)
			},
			INVREQ_RECURRENCE_START => {
				self.recurrence_start =
					Some(ser::truncated_uint("invreq_recurrence_start", value, 4)? as u32)
			},
			_ => return self.offer.absorb(record),
		}
		Ok(true)
	}
}

impl InvoiceRequestFields {
	/// Checks the payer-range fields against the echoed offer's constraints.
	pub(crate) fn check_against_offer(&self) -> Result<(), SemanticError> {
		match (self.offer.expects_quantity(), self.quantity) {
			(false, Some(_)) => return Err(SemanticError::UnexpectedField("invreq_quantity")),
			(true, None) => {
				return Err(SemanticError::MissingMandatoryField("invreq_quantity"))
			},
			(true, Some(quantity)) if !self.offer.is_valid_quantity(quantity) => {
				return Err(SemanticError::InvalidQuantity)
			},
			_ => {},
		}

		match (self.offer.amount(), self.amount) {
			(None, None) => return Err(SemanticError::MissingMandatoryField("invreq_amount")),
			(Some(Amount::Bitcoin { amount_msats }), Some(amount)) => {
				if amount < amount_msats {
					return Err(SemanticError::InsufficientAmount);
				}
			},
			// Currency-denominated amounts cannot be compared against millisatoshis here.
			_ => {},
		}

		match (self.offer.recurrence, self.recurrence_counter) {
			(None, Some(_)) => {
				return Err(SemanticError::UnexpectedField("invreq_recurrence_counter"))
			},
			(Some(_), None) => {
				return Err(SemanticError::MissingMandatoryField("invreq_recurrence_counter"))
			},
			(Some(_), Some(counter)) => {
				if let Some(limit) = self.offer.recurrence_limit {
					if counter > limit {
						return Err(SemanticError::InvalidRecurrenceCounter);
					}
				}
			},
			(None, None) => {},
		}

		let start_any_period = self.offer.recurrence.is_some()
			&& self.offer.recurrence_base.map_or(false, |base| base.start_any_period);
		match (start_any_period, self.recurrence_start) {
			(false, Some(_)) => {
				return Err(SemanticError::UnexpectedField("invreq_recurrence_start"))
			},
			(true, None) => {
				return Err(SemanticError::MissingMandatoryField("invreq_recurrence_start"))
			},
			_ => {},
		}

		Ok(())
	}

	/// Re-encodes the fields as records in type order.
	#[cfg(test)]
	pub(crate) fn to_records(&self, records: &mut Vec<TlvRecord>) {
		if let Some(metadata) = &self.metadata {
			records.push(TlvRecord::new(INVREQ_METADATA, metadata.clone()));
		}
		self.offer.to_records(records);
		if let Some(chain) = &self.chain {
			records.push(TlvRecord::new(INVREQ_CHAIN, chain.as_bytes().to_vec()));
		}
		if let Some(amount) = self.amount {
			let mut value = Vec::new();
			ser::write_truncated_uint(amount, &mut value);
			records.push(TlvRecord::new(INVREQ_AMOUNT, value));
		}
		if let Some(features) = &self.features {
			records.push(TlvRecord::new(INVREQ_FEATURES, features.clone()));
		}
		if let Some(quantity) = self.quantity {
			let mut value = Vec::new();
			ser::write_truncated_uint(quantity, &mut value);
			records.push(TlvRecord::new(INVREQ_QUANTITY, value));
		}
		if let Some(payer_id) = &self.payer_id {
			records.push(TlvRecord::new(INVREQ_PAYER_ID, payer_id.serialize().to_vec()));
		}
		if let Some(payer_note) = &self.payer_note {
			records.push(TlvRecord::new(INVREQ_PAYER_NOTE, payer_note.as_bytes().to_vec()));
		}
		if let Some(paths) = &self.paths {
			let mut value = Vec::new();
			blinded_path::encode_blinded_paths(paths, &mut value);
			records.push(TlvRecord::new(INVREQ_PATHS, value));
		}
		if let Some(counter) = self.recurrence_counter {
			let mut value = Vec::new();
			ser::write_truncated_uint(counter as u64, &mut value);
			records.push(TlvRecord::new(INVREQ_RECURRENCE_COUNTER, value));
		}
		if let Some(start) = self.recurrence_start {
			let mut value = Vec::new();
			ser::write_truncated_uint(start as u64, &mut value);
			records.push(TlvRecord::new(INVREQ_RECURRENCE_START, value));
		}
	}
}

/// An `InvoiceRequest` is a request for an invoice formulated from an [`Offer`].
///
/// [`Offer`]: crate::offer::Offer
#[derive(Clone, Debug, PartialEq)]
pub struct InvoiceRequest {
	bytes: Vec<u8>,
	fields: InvoiceRequestFields,
	metadata: Vec<u8>,
	payer_id: PublicKey,
	signature: Signature,
	unknown_records: Vec<TlvRecord>,
	id: sha256::Hash,
	offer_id: Option<sha256::Hash>,
}

impl InvoiceRequest {
	pub(crate) fn from_records(
		records: Vec<TlvRecord>, _now: Duration,
	) -> Result<Self, Bolt12ParseError> {
		let folded = tlv::fold_records::<InvoiceRequestFields>(&records)?;
		let tlv::Folded { fields, signature, unknown_records } = folded;

		let metadata = match &fields.metadata {
			Some(metadata) => metadata.clone(),
			None => return Err(SemanticError::MissingMandatoryField("invreq_metadata").into()),
		};
		let payer_id = match fields.payer_id {
			Some(payer_id) => payer_id,
			None => return Err(SemanticError::MissingMandatoryField("invreq_payer_id").into()),
		};
		let signature = match signature {
			Some(signature) => signature,
			None => return Err(SemanticError::MissingMandatoryField("signature").into()),
		};
		fields.check_against_offer()?;

		// The mandatory metadata record lies in the signable range, so a root exists.
		let kind = MessageKind::InvoiceRequest;
		let id = match crate::merkle::root_hash(&records, kind.signable_types()) {
			Some(id) => id,
			None => return Err(SemanticError::MissingMandatoryField("invreq_metadata").into()),
		};
		let digest = crate::merkle::signature_digest(kind, "signature", id);
		crate::merkle::verify_signature(&signature, &digest, payer_id)?;

		let offer_id =
			crate::merkle::root_hash(&records, MessageKind::Offer.signable_types());
		let bytes = tlv::serialize_stream(&records);
		Ok(InvoiceRequest {
			bytes,
			fields,
			metadata,
			payer_id,
			signature,
			unknown_records,
			id,
			offer_id,
		})
	}

	/// The Merkle root of the request's records.
	pub fn id(&self) -> sha256::Hash {
		self.id
	}

	/// The Merkle root of the echoed offer records alone, matching [`Offer::id`] of the offer
	/// this request was formulated from. `None` when the request echoed no offer fields.
	///
	/// [`Offer::id`]: crate::offer::Offer::id
	pub fn offer_id(&self) -> Option<sha256::Hash> {
		self.offer_id
	}

	/// An unpredictable series of bytes tying the request to the payer.
	pub fn metadata(&self) -> &[u8] {
		&self.metadata
	}

	/// The chain the payment will be made on, defaulting to the offer's first chain.
	pub fn chain(&self) -> ChainHash {
		self.fields.chain.unwrap_or_else(|| {
			self.fields
				.offer
				.chains
				.as_ref()
				.and_then(|chains| chains.first().copied())
				.unwrap_or_else(|| ChainHash::using_genesis_block(Network::Bitcoin))
		})
	}

	/// The amount the payer is willing to pay, in millisatoshis.
	pub fn amount_msats(&self) -> Option<u64> {
		self.fields.amount
	}

	/// Features pertaining to the request.
	pub fn features(&self) -> &[u8] {
		self.fields.features.as_deref().unwrap_or(&[])
	}

	/// The number of items requested.
	pub fn quantity(&self) -> Option<u64> {
		self.fields.quantity
	}

	/// A transient public key identifying the payer; signs the request.
	pub fn payer_id(&self) -> PublicKey {
		self.payer_id
	}

	/// A note from the payer to the recipient.
	pub fn payer_note(&self) -> Option<&str> {
		self.fields.payer_note.as_deref()
	}

	/// Blinded paths over which the payer may be sent the invoice.
	pub fn paths(&self) -> &[BlindedPath] {
		self.fields.paths.as_deref().unwrap_or(&[])
	}

	/// Which period of the offer's recurrence this request pays for.
	pub fn recurrence_counter(&self) -> Option<u32> {
		self.fields.recurrence_counter
	}

	/// The period the payer wishes to start at, when the offer allows starting anywhere.
	pub fn recurrence_start(&self) -> Option<u32> {
		self.fields.recurrence_start
	}

	/// The payer's signature over [`InvoiceRequest::id`].
	pub fn signature(&self) -> Signature {
		self.signature
	}

	/// Odd-typed records this decoder did not recognize, kept verbatim.
	pub fn unknown_records(&self) -> &[TlvRecord] {
		&self.unknown_records
	}
}

impl fmt::Display for InvoiceRequest {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		crate::parse::fmt_bech32(MessageKind::InvoiceRequest, &self.bytes, f)
	}
}
