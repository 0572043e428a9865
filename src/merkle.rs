// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Merkle identifiers and signature digests over a message's TLV records.
//!
//! Every message's id is the root of a Merkle tree whose leaves interleave a tagged hash of
//! each signable record's full serialization with a nonce leaf salting the record's type,
//! making record membership and ordering tamper-evident. Signatures commit to that root
//! through a further tagged digest naming the message kind.

use bitcoin::hashes::{sha256, Hash, HashEngine};
use bitcoin::secp256k1::schnorr::Signature;
use bitcoin::secp256k1::{self, Message, PublicKey, Secp256k1};

use core::ops::{Range, RangeInclusive};

use crate::tlv::TlvRecord;
use crate::MessageKind;

/// The TLV type carrying a message's signature.
pub(crate) const SIGNATURE_TLV_TYPE: u64 = 240;

/// The TLV type range reserved for signatures; never hashed into a message's id.
pub(crate) const SIGNATURE_TLV_TYPES: RangeInclusive<u64> = 240..=1000;

/// Computes the Merkle root over the records whose types fall in `signable`, or `None` when
/// no record does.
pub(crate) fn root_hash(records: &[TlvRecord], signable: Range<u64>) -> Option<sha256::Hash> {
	debug_assert!(signable.end <= *SIGNATURE_TLV_TYPES.start());
	let mut signable_records =
		records.iter().filter(|record| signable.contains(&record.r#type)).peekable();

	let nonce_tag = tagged_hash_engine(sha256::Hash::from_engine({
		let first_record = signable_records.peek()?;
		let mut engine = sha256::Hash::engine();
		engine.input("LnNonce".as_bytes());
		engine.input(&first_record.serialized());
		engine
	}));
	let leaf_tag = tagged_hash_engine(sha256::Hash::hash("LnLeaf".as_bytes()));
	let branch_tag = tagged_hash_engine(sha256::Hash::hash("LnBranch".as_bytes()));

	let mut leaves = Vec::new();
	for record in signable_records {
		leaves.push(tagged_hash_from_engine(leaf_tag.clone(), &record.serialized()));
		leaves.push(tagged_hash_from_engine(nonce_tag.clone(), &record.type_bytes()));
	}

	// Calculate the merkle root hash in place by consuming the leaves in branch-size steps,
	// leaving any leaf without a sibling at its level for a later level to pick up.
	let num_leaves = leaves.len();
	for level in 0.. {
		let step = 2 << level;
		let offset = step / 2;
		if offset >= num_leaves {
			break;
		}

		let left_branches = (0..num_leaves).step_by(step);
		let right_branches = (offset..num_leaves).step_by(step);
		for (i, j) in left_branches.zip(right_branches) {
			leaves[i] = tagged_branch_hash_from_engine(branch_tag.clone(), leaves[i], leaves[j]);
		}
	}

	leaves.first().copied()
}

/// Prepends the digest of a tag to a hash engine, domain-separating everything fed to it.
fn tagged_hash_engine(tag: sha256::Hash) -> sha256::HashEngine {
	let mut engine = sha256::Hash::engine();
	engine.input(tag.as_ref());
	engine
}

fn tagged_hash_from_engine<T: AsRef<[u8]>>(mut engine: sha256::HashEngine, msg: T) -> sha256::Hash {
	engine.input(msg.as_ref());
	sha256::Hash::from_engine(engine)
}

fn tagged_branch_hash_from_engine(
	mut engine: sha256::HashEngine, leaf1: sha256::Hash, leaf2: sha256::Hash,
) -> sha256::Hash {
	if leaf1 < leaf2 {
		engine.input(leaf1.as_ref());
		engine.input(leaf2.as_ref());
	} else {
		engine.input(leaf2.as_ref());
		engine.input(leaf1.as_ref());
	}
	sha256::Hash::from_engine(engine)
}

/// The digest a message's signature commits to: the Merkle root under a tag naming the
/// message kind and the signature field.
pub(crate) fn signature_digest(
	kind: MessageKind, field: &str, merkle_root: sha256::Hash,
) -> Message {
	let tag = sha256::Hash::from_engine({
		let mut engine = sha256::Hash::engine();
		engine.input("lightning".as_bytes());
		engine.input(kind.as_str().as_bytes());
		engine.input(field.as_bytes());
		engine
	});
	let digest = tagged_hash_from_engine(tagged_hash_engine(tag), merkle_root);
	Message::from_digest(digest.to_byte_array())
}

/// Verifies a BIP 340 signature over `digest` against the x-only half of `pubkey`.
pub(crate) fn verify_signature(
	signature: &Signature, digest: &Message, pubkey: PublicKey,
) -> Result<(), secp256k1::Error> {
	let secp_ctx = Secp256k1::verification_only();
	let pubkey = pubkey.into();
	secp_ctx.verify_schnorr(signature, digest, &pubkey)
}

#[cfg(test)]
mod tests {
	use super::*;

	/// Direct transcription of the tree definition, without the in-place tricks.
	fn reference_tagged_hash(tag: &[u8], msg: &[u8]) -> sha256::Hash {
		let tag_hash = sha256::Hash::hash(tag);
		let mut engine = sha256::Hash::engine();
		engine.input(tag_hash.as_ref());
		engine.input(msg);
		sha256::Hash::from_engine(engine)
	}

	fn reference_branch(leaf1: sha256::Hash, leaf2: sha256::Hash) -> sha256::Hash {
		let (smaller, larger) = if leaf1 < leaf2 { (leaf1, leaf2) } else { (leaf2, leaf1) };
		let mut msg = smaller.to_byte_array().to_vec();
		msg.extend_from_slice(larger.as_ref());
		reference_tagged_hash(b"LnBranch", &msg)
	}

	fn reference_nodes(records: &[TlvRecord]) -> Vec<sha256::Hash> {
		let mut nonce_tag = b"LnNonce".to_vec();
		nonce_tag.extend_from_slice(&records[0].serialized());
		records
			.iter()
			.map(|record| {
				let leaf = reference_tagged_hash(b"LnLeaf", &record.serialized());
				let nonce = reference_tagged_hash(&nonce_tag, &record.type_bytes());
				reference_branch(leaf, nonce)
			})
			.collect()
	}

	#[test]
	fn empty_record_set_has_no_root() {
		assert_eq!(root_hash(&[], 1..80), None);

		// Records outside the signable range do not count.
		let records = vec![TlvRecord::new(240, vec![0u8; 64])];
		assert_eq!(root_hash(&records, 1..80), None);
	}

	#[test]
	fn single_record_root() {
		let records = vec![TlvRecord::new(10, b"A coffee".to_vec())];
		let expected = reference_nodes(&records)[0];
		assert_eq!(root_hash(&records, 1..80), Some(expected));
	}

	#[test]
	fn odd_record_count_carries_the_last_node_up() {
		let records = vec![
			TlvRecord::new(6, vec![0x11]),
			TlvRecord::new(10, b"A coffee".to_vec()),
			TlvRecord::new(22, vec![0x02; 33]),
		];
		let nodes = reference_nodes(&records);
		let expected = reference_branch(reference_branch(nodes[0], nodes[1]), nodes[2]);
		assert_eq!(root_hash(&records, 1..80), Some(expected));
	}

	#[test]
	fn even_record_count_pairs_all_nodes() {
		let records = vec![
			TlvRecord::new(6, vec![0x11]),
			TlvRecord::new(8, vec![0x22]),
			TlvRecord::new(10, b"A coffee".to_vec()),
			TlvRecord::new(22, vec![0x02; 33]),
		];
		let nodes = reference_nodes(&records);
		let expected = reference_branch(
			reference_branch(nodes[0], nodes[1]),
			reference_branch(nodes[2], nodes[3]),
		);
		assert_eq!(root_hash(&records, 1..80), Some(expected));
	}

	#[test]
	fn signature_records_are_excluded_from_the_root() {
		let records = vec![
			TlvRecord::new(0, vec![0x01]),
			TlvRecord::new(10, b"A coffee".to_vec()),
		];
		let mut with_signature = records.clone();
		with_signature.push(TlvRecord::new(240, vec![0u8; 64]));
		assert_eq!(root_hash(&records, 0..240), root_hash(&with_signature, 0..240));
	}

	#[test]
	fn root_depends_on_record_types() {
		let records = vec![TlvRecord::new(10, b"A coffee".to_vec())];
		let renumbered = vec![TlvRecord::new(12, b"A coffee".to_vec())];
		assert_ne!(root_hash(&records, 1..80), root_hash(&renumbered, 1..80));
	}

	#[test]
	fn signature_digest_separates_message_kinds() {
		let root = sha256::Hash::hash(b"root");
		let offer = signature_digest(MessageKind::Offer, "signature", root);
		let invoice = signature_digest(MessageKind::Invoice, "signature", root);
		assert_ne!(offer, invoice);
	}
}
