// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Blinded payment paths and the per-path payment parameters carried in invoices.

use bitcoin::secp256k1::PublicKey;

use crate::parse::DecodeError;
use crate::ser;

/// An upper bound on feature vectors inside composite fields.
const MAX_FEATURES_LEN: u16 = 1024;

/// A route to the recipient whose hops past the introduction node are blinded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlindedPath {
	/// The unblinded node the path starts at.
	pub first_node_id: PublicKey,
	/// The key enabling hops to unblind their part of the path.
	pub first_path_key: PublicKey,
	/// The blinded hops following the first node.
	pub hops: Vec<BlindedHop>,
}

/// One onion hop within a [`BlindedPath`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlindedHop {
	/// The hop's blinded node id.
	pub blinded_node_id: PublicKey,
	/// The encrypted payload only the hop itself can read.
	pub encrypted_payload: Vec<u8>,
}

/// Payment constraints for one [`BlindedPath`], in path order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlindedPayInfo {
	/// The base fee for the path, in millisatoshis.
	pub fee_base_msat: u32,
	/// The proportional fee for the path, in parts per million.
	pub fee_proportional_millionths: u32,
	/// The CLTV delta the path consumes. Nonzero.
	pub cltv_expiry_delta: u16,
	/// The smallest HTLC the path will carry, in millisatoshis.
	pub htlc_minimum_msat: u64,
	/// The largest HTLC the path will carry, in millisatoshis.
	pub htlc_maximum_msat: u64,
	/// Features supported along the path.
	pub features: Vec<u8>,
}

fn read_point<'a>(
	field: &'static str, buf: &'a [u8],
) -> Result<(PublicKey, &'a [u8]), DecodeError> {
	let (bytes, rest) = ser::read_array::<33>(buf)?;
	let point = PublicKey::from_slice(&bytes)
		.map_err(|_| DecodeError::FieldDecode { field, reason: "invalid public key" })?;
	Ok((point, rest))
}

fn read_hop<'a>(
	field: &'static str, buf: &'a [u8],
) -> Result<(BlindedHop, &'a [u8]), DecodeError> {
	let (blinded_node_id, rest) = read_point(field, buf)?;
	let (payload_len, rest) = ser::read_u16(rest)?;
	let (encrypted_payload, rest) = ser::read_slice(rest, payload_len as u64)?;
	Ok((BlindedHop { blinded_node_id, encrypted_payload: encrypted_payload.to_vec() }, rest))
}

/// Decodes a value consisting of back-to-back blinded paths.
pub(crate) fn parse_blinded_paths(
	field: &'static str, value: &[u8],
) -> Result<Vec<BlindedPath>, DecodeError> {
	let mut paths = Vec::new();
	let mut buf = value;
	while !buf.is_empty() {
		let (first_node_id, rest) = read_point(field, buf)?;
		let (first_path_key, rest) = read_point(field, rest)?;
		let (num_hops, mut rest) = ser::read_u8(rest)?;
		let mut hops = Vec::with_capacity(num_hops as usize);
		for _ in 0..num_hops {
			let (hop, hop_rest) = read_hop(field, rest)?;
			hops.push(hop);
			rest = hop_rest;
		}
		paths.push(BlindedPath { first_node_id, first_path_key, hops });
		buf = rest;
	}
	Ok(paths)
}

#[cfg(test)]
pub(crate) fn encode_blinded_paths(paths: &[BlindedPath], buf: &mut Vec<u8>) {
	for path in paths {
		buf.extend_from_slice(&path.first_node_id.serialize());
		buf.extend_from_slice(&path.first_path_key.serialize());
		buf.push(path.hops.len() as u8);
		for hop in &path.hops {
			buf.extend_from_slice(&hop.blinded_node_id.serialize());
			buf.extend_from_slice(&(hop.encrypted_payload.len() as u16).to_be_bytes());
			buf.extend_from_slice(&hop.encrypted_payload);
		}
	}
}

/// Decodes a value consisting of back-to-back per-path payment parameters.
pub(crate) fn parse_blinded_pay_info(
	field: &'static str, value: &[u8],
) -> Result<Vec<BlindedPayInfo>, DecodeError> {
	if value.is_empty() {
		return Err(DecodeError::FieldDecode { field, reason: "no pay info entries" });
	}
	let mut pay_info = Vec::new();
	let mut buf = value;
	while !buf.is_empty() {
		let (fee_base_msat, rest) = ser::read_u32(buf)?;
		let (fee_proportional_millionths, rest) = ser::read_u32(rest)?;
		let (cltv_expiry_delta, rest) = ser::read_u16(rest)?;
		let (htlc_minimum_msat, rest) = ser::read_u64(rest)?;
		let (htlc_maximum_msat, rest) = ser::read_u64(rest)?;
		let (features_len, rest) = ser::read_u16(rest)?;
		if features_len > MAX_FEATURES_LEN {
			return Err(DecodeError::FieldDecode { field, reason: "oversized feature vector" });
		}
		let (features, rest) = ser::read_slice(rest, features_len as u64)?;
		if fee_proportional_millionths > 1_000_000 {
			return Err(DecodeError::FieldDecode { field, reason: "fee rate over 100%" });
		}
		if cltv_expiry_delta == 0 {
			return Err(DecodeError::FieldDecode { field, reason: "zero CLTV delta" });
		}
		if htlc_minimum_msat > htlc_maximum_msat {
			return Err(DecodeError::FieldDecode {
				field,
				reason: "htlc minimum above htlc maximum",
			});
		}
		pay_info.push(BlindedPayInfo {
			fee_base_msat,
			fee_proportional_millionths,
			cltv_expiry_delta,
			htlc_minimum_msat,
			htlc_maximum_msat,
			features: features.to_vec(),
		});
		buf = rest;
	}
	Ok(pay_info)
}

#[cfg(test)]
pub(crate) fn encode_blinded_pay_info(pay_info: &[BlindedPayInfo], buf: &mut Vec<u8>) {
	for info in pay_info {
		buf.extend_from_slice(&info.fee_base_msat.to_be_bytes());
		buf.extend_from_slice(&info.fee_proportional_millionths.to_be_bytes());
		buf.extend_from_slice(&info.cltv_expiry_delta.to_be_bytes());
		buf.extend_from_slice(&info.htlc_minimum_msat.to_be_bytes());
		buf.extend_from_slice(&info.htlc_maximum_msat.to_be_bytes());
		buf.extend_from_slice(&(info.features.len() as u16).to_be_bytes());
		buf.extend_from_slice(&info.features);
	}
}
