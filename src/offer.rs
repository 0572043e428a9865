// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Data structures and decoding for `lno` offers.
//!
//! An offer is a precursor to an invoice: a merchant publishes one, a customer scans it and
//! sends an invoice request over a blinded path. Offers are long-lived, so they carry
//! everything needed to produce such a request: what is for sale, for how much, in what
//! quantities, and optionally on what recurring schedule.

use bitcoin::constants::ChainHash;
use bitcoin::hashes::sha256;
use bitcoin::network::Network;
use bitcoin::secp256k1::schnorr::Signature;
use bitcoin::secp256k1::PublicKey;

use core::fmt;
use core::num::NonZeroU64;
use core::time::Duration;

use crate::blinded_path::{self, BlindedPath};
use crate::parse::{Bolt12ParseError, DecodeError, SemanticError};
use crate::ser;
use crate::tlv::{self, FieldSet, TlvRecord};
use crate::MessageKind;

pub(crate) const OFFER_CHAINS: u64 = 2;
pub(crate) const OFFER_METADATA: u64 = 4;
pub(crate) const OFFER_CURRENCY: u64 = 6;
pub(crate) const OFFER_AMOUNT: u64 = 8;
pub(crate) const OFFER_DESCRIPTION: u64 = 10;
pub(crate) const OFFER_FEATURES: u64 = 12;
pub(crate) const OFFER_ABSOLUTE_EXPIRY: u64 = 14;
pub(crate) const OFFER_PATHS: u64 = 16;
pub(crate) const OFFER_ISSUER: u64 = 18;
pub(crate) const OFFER_QUANTITY_MAX: u64 = 20;
pub(crate) const OFFER_NODE_ID: u64 = 22;
pub(crate) const OFFER_RECURRENCE: u64 = 26;
pub(crate) const OFFER_RECURRENCE_BASE: u64 = 28;
pub(crate) const OFFER_RECURRENCE_PAYWINDOW: u64 = 64;
pub(crate) const OFFER_RECURRENCE_LIMIT: u64 = 66;

/// An ISO 4217 three-letter currency code.
pub type CurrencyCode = [u8; 3];

/// The minimum amount required for an item in an [`Offer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Amount {
	/// An amount of bitcoin.
	Bitcoin {
		/// The amount in millisatoshi.
		amount_msats: u64,
	},
	/// An amount of currency specified using ISO 4217.
	Currency {
		/// The currency that the amount is denominated in.
		iso4217_code: CurrencyCode,
		/// The amount in the currency unit adjusted by the ISO 4217 exponent (e.g., USD cents).
		amount: u64,
	},
}

/// Quantity of items supported by an [`Offer`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Quantity {
	/// Up to a specific number of items (inclusive).
	Bounded(NonZeroU64),
	/// One or more items.
	Unbounded,
	/// Only one item.
	One,
}

/// A repeating schedule on which an offer expects to be paid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Recurrence {
	/// The unit the period counts: 0 seconds, 1 days, 2 months, 3 years.
	pub time_unit: u8,
	/// How many time units lie between successive payments.
	pub period: u32,
}

/// Anchors a [`Recurrence`] at an absolute start time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecurrenceBase {
	/// Whether a payer may start at any period rather than the first.
	pub start_any_period: bool,
	/// Seconds since the epoch at which period zero begins.
	pub basetime: u64,
}

/// Bounds how far from a period's start a recurring payment may be made.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecurrencePaywindow {
	/// Seconds before the period start at which payment is accepted.
	pub seconds_before: u32,
	/// Whether an amount may be proportionally reduced for a partial period.
	pub proportional_amount: bool,
	/// Seconds after the period start at which payment is still accepted.
	pub seconds_after: u32,
}

/// The offer-range fields, each optional until a message kind's constraints are applied.
///
/// Invoice requests and invoices echo the offer they respond to, so they embed this same
/// field set for the offer range of their streams.
#[derive(Clone, Debug, Default, PartialEq)]
pub(crate) struct OfferFields {
	pub chains: Option<Vec<ChainHash>>,
	pub metadata: Option<Vec<u8>>,
	pub currency: Option<CurrencyCode>,
	pub amount: Option<u64>,
	pub description: Option<String>,
	pub features: Option<Vec<u8>>,
	pub absolute_expiry: Option<u64>,
	pub paths: Option<Vec<BlindedPath>>,
	pub issuer: Option<String>,
	pub quantity_max: Option<u64>,
	pub node_id: Option<PublicKey>,
	pub recurrence: Option<Recurrence>,
	pub recurrence_base: Option<RecurrenceBase>,
	pub recurrence_paywindow: Option<RecurrencePaywindow>,
	pub recurrence_limit: Option<u32>,
}

pub(crate) fn decode_utf8(field: &'static str, value: &[u8]) -> Result<String, DecodeError> {
	String::from_utf8(value.to_vec())
		.map_err(|_| DecodeError::FieldDecode { field, reason: "invalid UTF-8" })
}

pub(crate) fn decode_point(field: &'static str, value: &[u8]) -> Result<PublicKey, DecodeError> {
	PublicKey::from_slice(value)
		.map_err(|_| DecodeError::FieldDecode { field, reason: "invalid public key" })
}

pub(crate) fn decode_chain_hash(
	field: &'static str, value: &[u8],
) -> Result<ChainHash, DecodeError> {
	let (bytes, rest) = ser::read_array::<32>(value)?;
	if !rest.is_empty() {
		return Err(DecodeError::FieldDecode { field, reason: "not a 32-byte chain hash" });
	}
	Ok(ChainHash::from(bytes))
}

fn decode_bool(field: &'static str, byte: u8) -> Result<bool, DecodeError> {
	match byte {
		0 => Ok(false),
		1 => Ok(true),
		_ => Err(DecodeError::FieldDecode { field, reason: "not a boolean" }),
	}
}

fn decode_chains(value: &[u8]) -> Result<Vec<ChainHash>, DecodeError> {
	if value.len() % 32 != 0 {
		return Err(DecodeError::FieldDecode {
			field: "offer_chains",
			reason: "not a whole number of chain hashes",
		});
	}
	let mut chains = Vec::with_capacity(value.len() / 32);
	let mut buf = value;
	while !buf.is_empty() {
		let (bytes, rest) = ser::read_array::<32>(buf)?;
		chains.push(ChainHash::from(bytes));
		buf = rest;
	}
	Ok(chains)
}

fn decode_currency(value: &[u8]) -> Result<CurrencyCode, DecodeError> {
	let (code, rest) = ser::read_array::<3>(value)?;
	if !rest.is_empty() {
		return Err(DecodeError::FieldDecode {
			field: "offer_currency",
			reason: "not a three-letter code",
		});
	}
	Ok(code)
}

fn decode_recurrence(value: &[u8]) -> Result<Recurrence, DecodeError> {
	let (time_unit, rest) = ser::read_u8(value)?;
	let period = ser::truncated_uint("offer_recurrence", rest, 4)? as u32;
	Ok(Recurrence { time_unit, period })
}

fn decode_recurrence_base(value: &[u8]) -> Result<RecurrenceBase, DecodeError> {
	let (byte, rest) = ser::read_u8(value)?;
	let start_any_period = decode_bool("offer_recurrence_base", byte)?;
	let basetime = ser::truncated_uint("offer_recurrence_base", rest, 8)?;
	Ok(RecurrenceBase { start_any_period, basetime })
}

fn decode_recurrence_paywindow(value: &[u8]) -> Result<RecurrencePaywindow, DecodeError> {
	let (seconds_before, rest) = ser::read_u32(value)?;
	let (byte, rest) = ser::read_u8(rest)?;
	let proportional_amount = decode_bool("offer_recurrence_paywindow", byte)?;
	let seconds_after = ser::truncated_uint("offer_recurrence_paywindow", rest, 4)? as u32;
	Ok(RecurrencePaywindow { seconds_before, proportional_amount, seconds_after })
}

impl FieldSet for OfferFields {
	fn absorb(&mut self, record: &TlvRecord) -> Result<bool, DecodeError> {
		let value = &record.value[..];
		match record.r#type {
			OFFER_CHAINS => self.chains = Some(decode_chains(value)?),
			OFFER_METADATA => self.metadata = Some(value.to_vec()),
			OFFER_CURRENCY => self.currency = Some(decode_currency(value)?),
			OFFER_AMOUNT => self.amount = Some(ser::truncated_uint("offer_amount", value, 8)?),
			OFFER_DESCRIPTION => {
				self.description = Some(decode_utf8("offer_description", value)?)
			},
			OFFER_FEATURES => self.features = Some(value.to_vec()),
			OFFER_ABSOLUTE_EXPIRY => {
				self.absolute_expiry =
					Some(ser::truncated_uint("offer_absolute_expiry", value, 8)?)
			},
			OFFER_PATHS => {
				self.paths = Some(blinded_path::parse_blinded_paths("offer_paths", value)?)
			},
			OFFER_ISSUER => self.issuer = Some(decode_utf8("offer_issuer", value)?),
			OFFER_QUANTITY_MAX => {
				self.quantity_max = Some(ser::truncated_uint("offer_quantity_max", value, 8)?)
			},
			OFFER_NODE_ID => self.node_id = Some(decode_point("offer_node_id", value)?),
			OFFER_RECURRENCE => self.recurrence = Some(decode_recurrence(value)?),
			OFFER_RECURRENCE_BASE => {
				self.recurrence_base = Some(decode_recurrence_base(value)?)
			},
			OFFER_RECURRENCE_PAYWINDOW => {
				self.recurrence_paywindow = Some(decode_recurrence_paywindow(value)?)
			},
			OFFER_RECURRENCE_LIMIT => {
				self.recurrence_limit =
					Some(ser::truncated_uint("offer_recurrence_limit", value, 4)? as u32)
			},
			_ => return Ok(false),
		}
		Ok(true)
	}
}

impl OfferFields {
	/// The offer's amount, unifying the currency and amount records. A currency record
	/// without an amount is rejected during validation before this is meaningful.
	pub(crate) fn amount(&self) -> Option<Amount> {
		match (self.currency, self.amount) {
			(None, Some(amount_msats)) => Some(Amount::Bitcoin { amount_msats }),
			(Some(iso4217_code), Some(amount)) => {
				Some(Amount::Currency { iso4217_code, amount })
			},
			(_, None) => None,
		}
	}

	pub(crate) fn supported_quantity(&self) -> Quantity {
		match self.quantity_max {
			Some(0) => Quantity::Unbounded,
			Some(n) => match NonZeroU64::new(n) {
				Some(n) => Quantity::Bounded(n),
				None => Quantity::Unbounded,
			},
			None => Quantity::One,
		}
	}

	pub(crate) fn expects_quantity(&self) -> bool {
		self.quantity_max.is_some()
	}

	pub(crate) fn is_valid_quantity(&self, quantity: u64) -> bool {
		match self.supported_quantity() {
			Quantity::Bounded(n) => quantity > 0 && quantity <= n.get(),
			Quantity::Unbounded => quantity > 0,
			Quantity::One => quantity == 1,
		}
	}

	pub(crate) fn is_expired_at(&self, now: Duration) -> bool {
		match self.absolute_expiry {
			Some(seconds_from_epoch) => seconds_from_epoch < now.as_secs(),
			None => false,
		}
	}

	/// Re-encodes the fields as records in type order.
	#[cfg(test)]
	pub(crate) fn to_records(&self, records: &mut Vec<TlvRecord>) {
		if let Some(chains) = &self.chains {
			let mut value = Vec::with_capacity(chains.len() * 32);
			for chain in chains {
				value.extend_from_slice(chain.as_bytes());
			}
			records.push(TlvRecord::new(OFFER_CHAINS, value));
		}
		if let Some(metadata) = &self.metadata {
			records.push(TlvRecord::new(OFFER_METADATA, metadata.clone()));
		}
		if let Some(currency) = &self.currency {
			records.push(TlvRecord::new(OFFER_CURRENCY, currency.to_vec()));
		}
		if let Some(amount) = self.amount {
			let mut value = Vec::new();
			ser::write_truncated_uint(amount, &mut value);
			records.push(TlvRecord::new(OFFER_AMOUNT, value));
		}
		if let Some(description) = &self.description {
			records.push(TlvRecord::new(OFFER_DESCRIPTION, description.as_bytes().to_vec()));
		}
		if let Some(features) = &self.features {
			records.push(TlvRecord::new(OFFER_FEATURES, features.clone()));
		}
		if let Some(absolute_expiry) = self.absolute_expiry {
			let mut value = Vec::new();
			ser::write_truncated_uint(absolute_expiry, &mut value);
			records.push(TlvRecord::new(OFFER_ABSOLUTE_EXPIRY, value));
		}
		if let Some(paths) = &self.paths {
			let mut value = Vec::new();
			blinded_path::encode_blinded_paths(paths, &mut value);
			records.push(TlvRecord::new(OFFER_PATHS, value));
		}
		if let Some(issuer) = &self.issuer {
			records.push(TlvRecord::new(OFFER_ISSUER, issuer.as_bytes().to_vec()));
		}
		if let Some(quantity_max) = self.quantity_max {
			let mut value = Vec::new();
			ser::write_truncated_uint(quantity_max, &mut value);
			records.push(TlvRecord::new(OFFER_QUANTITY_MAX, value));
		}
		if let Some(node_id) = &self.node_id {
			records.push(TlvRecord::new(OFFER_NODE_ID, node_id.serialize().to_vec()));
		}
		if let Some(recurrence) = &self.recurrence {
			let mut value = vec![recurrence.time_unit];
			ser::write_truncated_uint(recurrence.period as u64, &mut value);
			records.push(TlvRecord::new(OFFER_RECURRENCE, value));
		}
		if let Some(base) = &self.recurrence_base {
			let mut value = vec![base.start_any_period as u8];
			ser::write_truncated_uint(base.basetime, &mut value);
			records.push(TlvRecord::new(OFFER_RECURRENCE_BASE, value));
		}
		if let Some(paywindow) = &self.recurrence_paywindow {
			let mut value = paywindow.seconds_before.to_be_bytes().to_vec();
			value.push(paywindow.proportional_amount as u8);
			ser::write_truncated_uint(paywindow.seconds_after as u64, &mut value);
			records.push(TlvRecord::new(OFFER_RECURRENCE_PAYWINDOW, value));
		}
		if let Some(limit) = self.recurrence_limit {
			let mut value = Vec::new();
			ser::write_truncated_uint(limit as u64, &mut value);
			records.push(TlvRecord::new(OFFER_RECURRENCE_LIMIT, value));
		}
	}
}

/// An `Offer` is a potentially long-lived proposal for payment of a good or service.
///
/// Created from the records of an `lno` string once their constraints have been checked.
#[derive(Clone, Debug, PartialEq)]
pub struct Offer {
	bytes: Vec<u8>,
	fields: OfferFields,
	description: String,
	signing_pubkey: PublicKey,
	signature: Option<Signature>,
	unknown_records: Vec<TlvRecord>,
	id: sha256::Hash,
}

impl Offer {
	pub(crate) fn from_records(
		records: Vec<TlvRecord>, now: Duration,
	) -> Result<Self, Bolt12ParseError> {
		let folded = tlv::fold_records::<OfferFields>(&records)?;
		let tlv::Folded { fields, signature, unknown_records } = folded;

		let description = match &fields.description {
			Some(description) => description.clone(),
			None => return Err(SemanticError::MissingMandatoryField("offer_description").into()),
		};
		let signing_pubkey = match fields.node_id {
			Some(node_id) => node_id,
			None => return Err(SemanticError::MissingMandatoryField("offer_node_id").into()),
		};
		if fields.currency.is_some() && fields.amount.is_none() {
			return Err(SemanticError::MissingMandatoryField("offer_amount").into());
		}
		if fields.is_expired_at(now) {
			return Err(SemanticError::AlreadyExpired.into());
		}

		// The mandatory description record lies in the signable range, so a root exists.
		let id = match crate::merkle::root_hash(&records, MessageKind::Offer.signable_types()) {
			Some(id) => id,
			None => return Err(SemanticError::MissingMandatoryField("offer_description").into()),
		};
		if let Some(signature) = &signature {
			let digest = crate::merkle::signature_digest(MessageKind::Offer, "signature", id);
			crate::merkle::verify_signature(signature, &digest, signing_pubkey)?;
		}

		let bytes = tlv::serialize_stream(&records);
		Ok(Offer { bytes, fields, description, signing_pubkey, signature, unknown_records, id })
	}

	/// The Merkle root of the offer's records, identifying it independently of its text form.
	pub fn id(&self) -> sha256::Hash {
		self.id
	}

	/// The chains that may be used when paying for the offer, defaulting to Bitcoin mainnet.
	pub fn chains(&self) -> Vec<ChainHash> {
		self.fields
			.chains
			.clone()
			.unwrap_or_else(|| vec![ChainHash::using_genesis_block(Network::Bitcoin)])
	}

	/// Opaque bytes the recipient echoes back in an invoice request.
	pub fn metadata(&self) -> Option<&[u8]> {
		self.fields.metadata.as_deref()
	}

	/// The minimum amount required for a successful payment of a single item.
	pub fn amount(&self) -> Option<Amount> {
		self.fields.amount()
	}

	/// A human-readable description of what is being offered.
	pub fn description(&self) -> &str {
		&self.description
	}

	/// Features pertaining to the offer.
	pub fn features(&self) -> &[u8] {
		self.fields.features.as_deref().unwrap_or(&[])
	}

	/// Seconds since the epoch after which the offer may no longer be paid.
	pub fn absolute_expiry(&self) -> Option<Duration> {
		self.fields.absolute_expiry.map(Duration::from_secs)
	}

	/// Blinded paths over which the offer's node may be reached.
	pub fn paths(&self) -> &[BlindedPath] {
		self.fields.paths.as_deref().unwrap_or(&[])
	}

	/// The issuer of the offer.
	pub fn issuer(&self) -> Option<&str> {
		self.fields.issuer.as_deref()
	}

	/// The quantities of an item that the offer supports in one payment.
	pub fn supported_quantity(&self) -> Quantity {
		self.fields.supported_quantity()
	}

	/// The public key invoices for this offer will be signed with.
	pub fn signing_pubkey(&self) -> PublicKey {
		self.signing_pubkey
	}

	/// The schedule on which the offer expects repeated payment, if any.
	pub fn recurrence(&self) -> Option<Recurrence> {
		self.fields.recurrence
	}

	/// The absolute anchor of the offer's recurrence schedule, if any.
	pub fn recurrence_base(&self) -> Option<RecurrenceBase> {
		self.fields.recurrence_base
	}

	/// Bounds on when within a period a recurring payment may be made, if any.
	pub fn recurrence_paywindow(&self) -> Option<RecurrencePaywindow> {
		self.fields.recurrence_paywindow
	}

	/// The final period of the offer's recurrence schedule, if bounded.
	pub fn recurrence_limit(&self) -> Option<u32> {
		self.fields.recurrence_limit
	}

	/// The offer's signature over its [`Offer::id`], if it carried one.
	pub fn signature(&self) -> Option<Signature> {
		self.signature
	}

	/// Odd-typed records this decoder did not recognize, kept verbatim.
	pub fn unknown_records(&self) -> &[TlvRecord] {
		&self.unknown_records
	}
}

impl fmt::Display for Offer {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		crate::parse::fmt_bech32(MessageKind::Offer, &self.bytes, f)
	}
}
