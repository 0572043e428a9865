// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! End-to-end decoding of hand-assembled BOLT12 strings, with the transport encoding and
//! Merkle tree recomputed here from their definitions rather than through the crate.

use bitcoin::hashes::{sha256, Hash, HashEngine};
use bitcoin::secp256k1::schnorr::Signature;
use bitcoin::secp256k1::{Keypair, Message, PublicKey, Secp256k1, SecretKey};

use core::time::Duration;

use lightning_bolt12::parse::{DecodeError, SemanticError, TextError};
use lightning_bolt12::{decode_with_time, Bolt12Message, Bolt12ParseError, MessageKind};

const CHARSET: &[u8] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

fn bech32(hrp: &str, data: &[u8]) -> String {
	let mut s = String::from(hrp);
	s.push('1');
	let mut acc = 0u32;
	let mut bits = 0;
	for byte in data {
		acc = acc << 8 | *byte as u32;
		bits += 8;
		while bits >= 5 {
			bits -= 5;
			s.push(CHARSET[(acc >> bits) as usize & 0x1f] as char);
		}
	}
	if bits > 0 {
		s.push(CHARSET[(acc << (5 - bits)) as usize & 0x1f] as char);
	}
	s
}

/// One TLV record; types and lengths here all fit a single BigSize byte.
fn tlv(r#type: u8, value: &[u8]) -> Vec<u8> {
	assert!(r#type < 253 && value.len() < 253);
	let mut bytes = vec![r#type, value.len() as u8];
	bytes.extend_from_slice(value);
	bytes
}

fn tagged_hash(tag: &[u8], msg: &[u8]) -> sha256::Hash {
	let tag_hash = sha256::Hash::hash(tag);
	let mut engine = sha256::Hash::engine();
	engine.input(tag_hash.as_ref());
	engine.input(msg);
	sha256::Hash::from_engine(engine)
}

fn branch(leaf1: sha256::Hash, leaf2: sha256::Hash) -> sha256::Hash {
	let (smaller, larger) = if leaf1 < leaf2 { (leaf1, leaf2) } else { (leaf2, leaf1) };
	let mut msg = smaller.to_byte_array().to_vec();
	msg.extend_from_slice(larger.as_ref());
	tagged_hash(b"LnBranch", &msg)
}

/// Folds whole records (type byte included) into the Merkle root they identify.
fn merkle_root(records: &[Vec<u8>]) -> sha256::Hash {
	let mut nonce_tag = b"LnNonce".to_vec();
	nonce_tag.extend_from_slice(&records[0]);
	let mut nodes: Vec<sha256::Hash> = records
		.iter()
		.map(|record| {
			let leaf = tagged_hash(b"LnLeaf", record);
			let nonce = tagged_hash(&nonce_tag, &record[..1]);
			branch(leaf, nonce)
		})
		.collect();
	while nodes.len() > 1 {
		nodes = nodes
			.chunks(2)
			.map(|pair| if pair.len() == 2 { branch(pair[0], pair[1]) } else { pair[0] })
			.collect();
	}
	nodes[0]
}

fn sign(kind: &str, root: sha256::Hash, byte: u8) -> Signature {
	let secp_ctx = Secp256k1::new();
	let keys = Keypair::from_secret_key(&secp_ctx, &privkey(byte));
	let mut tag = b"lightning".to_vec();
	tag.extend_from_slice(kind.as_bytes());
	tag.extend_from_slice(b"signature");
	let digest = tagged_hash(&tag, root.as_ref());
	let message = Message::from_digest(digest.to_byte_array());
	secp_ctx.sign_schnorr_no_aux_rand(&message, &keys)
}

fn pubkey(byte: u8) -> PublicKey {
	let secp_ctx = Secp256k1::new();
	PublicKey::from_secret_key(&secp_ctx, &privkey(byte))
}

fn privkey(byte: u8) -> SecretKey {
	SecretKey::from_slice(&[byte; 32]).unwrap()
}

fn now() -> Duration {
	Duration::from_secs(1_000_000)
}

fn offer_records() -> Vec<Vec<u8>> {
	// 1000 msat, truncated to two bytes.
	vec![tlv(8, &[0x03, 0xe8]), tlv(10, b"A coffee"), tlv(22, &pubkey(42).serialize())]
}

#[test]
fn decodes_an_offer_and_its_merkle_id() {
	let records = offer_records();
	let encoded = bech32("lno", &records.concat());

	let message = decode_with_time(&encoded, now()).unwrap();
	assert_eq!(message.kind(), MessageKind::Offer);
	assert_eq!(message.id(), merkle_root(&records));
	match &message {
		Bolt12Message::Offer(offer) => {
			assert_eq!(offer.description(), "A coffee");
			assert_eq!(offer.signing_pubkey(), pubkey(42));
			assert_eq!(
				offer.amount(),
				Some(lightning_bolt12::offer::Amount::Bitcoin { amount_msats: 1000 })
			);
		},
		_ => panic!("not an offer"),
	}

	// The message renders back to the same string.
	assert_eq!(message.to_string(), encoded);
}

#[test]
fn decodes_an_offer_split_for_display() {
	let encoded = bech32("lno", &offer_records().concat());
	let joined = format!("{}+\n\t{}", &encoded[..15], &encoded[15..]);
	let split = decode_with_time(&joined, now()).unwrap();
	let whole = decode_with_time(&encoded, now()).unwrap();
	assert_eq!(split, whole);
}

#[test]
fn rejects_corrupted_text() {
	let encoded = bech32("lno", &offer_records().concat());

	// 'b' is not in the bech32 charset.
	let corrupted = format!("{}b", &encoded[..encoded.len() - 1]);
	assert!(matches!(
		decode_with_time(&corrupted, now()),
		Err(Bolt12ParseError::MalformedText(TextError::Bech32(_)))
	));

	// Mixed case is forbidden outright.
	let mixed = format!("LNO{}", &encoded[3..]);
	assert!(matches!(
		decode_with_time(&mixed, now()),
		Err(Bolt12ParseError::MalformedText(TextError::Bech32(_)))
	));
}

#[test]
fn decodes_a_signed_invoice_request() {
	let mut records = vec![tlv(0, &[0x01; 16])];
	records.extend(offer_records());
	records.push(tlv(88, &pubkey(43).serialize()));
	let root = merkle_root(&records);
	let signature = sign("invoice_request", root, 43);
	records.push(tlv(240, signature.as_ref()));

	let encoded = bech32("lnr", &records.concat());
	let message = decode_with_time(&encoded, now()).unwrap();
	assert_eq!(message.kind(), MessageKind::InvoiceRequest);
	assert_eq!(message.id(), root);
	match &message {
		Bolt12Message::InvoiceRequest(request) => {
			assert_eq!(request.payer_id(), pubkey(43));
			assert_eq!(request.metadata(), &[0x01; 16]);
			// The offer-range records alone identify the offer this answers.
			assert_eq!(request.offer_id(), Some(merkle_root(&offer_records())));
		},
		_ => panic!("not an invoice request"),
	}
}

#[test]
fn rejects_an_invoice_request_without_a_payer_id() {
	let mut records = vec![tlv(0, &[0x01; 16])];
	records.extend(offer_records());
	let encoded = bech32("lnr", &records.concat());
	assert_eq!(
		decode_with_time(&encoded, now()),
		Err(Bolt12ParseError::InvalidSemantics(SemanticError::MissingMandatoryField(
			"invreq_payer_id"
		)))
	);
}

fn blinded_path_value() -> Vec<u8> {
	let mut value = pubkey(40).serialize().to_vec();
	value.extend_from_slice(&pubkey(41).serialize());
	value.push(1);
	value.extend_from_slice(&pubkey(44).serialize());
	value.extend_from_slice(&8u16.to_be_bytes());
	value.extend_from_slice(&[0x33; 8]);
	value
}

fn blinded_pay_info_value() -> Vec<u8> {
	let mut value = 1u32.to_be_bytes().to_vec();
	value.extend_from_slice(&500u32.to_be_bytes());
	value.extend_from_slice(&144u16.to_be_bytes());
	value.extend_from_slice(&1u64.to_be_bytes());
	value.extend_from_slice(&1_000_000_000u64.to_be_bytes());
	value.extend_from_slice(&0u16.to_be_bytes());
	value
}

fn invoice_records(created_at: u64) -> Vec<Vec<u8>> {
	let mut records = vec![tlv(0, &[0x01; 16])];
	records.extend(offer_records());
	records.push(tlv(88, &pubkey(43).serialize()));
	records.push(tlv(160, &blinded_path_value()));
	records.push(tlv(162, &blinded_pay_info_value()));
	records.push(tlv(164, &created_at.to_be_bytes()[5..]));
	records.push(tlv(168, &[0x42; 32]));
	records.push(tlv(170, &[0x03, 0xe8]));
	records.push(tlv(176, &pubkey(42).serialize()));
	records
}

#[test]
fn decodes_a_signed_invoice() {
	let mut records = invoice_records(now().as_secs() - 100);
	let root = merkle_root(&records);
	let signature = sign("invoice", root, 42);
	records.push(tlv(240, signature.as_ref()));

	let encoded = bech32("lni", &records.concat());
	let message = decode_with_time(&encoded, now()).unwrap();
	assert_eq!(message.id(), root);
	match &message {
		Bolt12Message::Invoice(invoice) => {
			assert_eq!(invoice.amount_msats(), 1_000);
			assert_eq!(invoice.signing_pubkey(), pubkey(42));
			assert_eq!(invoice.relative_expiry(), Duration::from_secs(7200));
			assert_eq!(invoice.paths().len(), 1);
		},
		_ => panic!("not an invoice"),
	}
}

#[test]
fn rejects_an_expired_invoice() {
	// Created just past the default two-hour expiry; the signature need not be checked to
	// refuse payment.
	let mut records = invoice_records(now().as_secs() - 7201);
	records.push(tlv(240, &[0x01; 64]));
	let encoded = bech32("lni", &records.concat());
	assert_eq!(
		decode_with_time(&encoded, now()),
		Err(Bolt12ParseError::InvalidSemantics(SemanticError::AlreadyExpired))
	);
}

#[test]
fn rejects_an_invoice_with_empty_path_records() {
	// Present-but-empty paths and pay info records must not pass for a payable invoice, even
	// though zero paths trivially match zero pay info entries.
	let mut records = invoice_records(now().as_secs() - 100);
	for record in records.iter_mut() {
		if record[0] == 160 || record[0] == 162 {
			*record = tlv(record[0], &[]);
		}
	}
	let root = merkle_root(&records);
	let signature = sign("invoice", root, 42);
	records.push(tlv(240, signature.as_ref()));

	let encoded = bech32("lni", &records.concat());
	assert_eq!(
		decode_with_time(&encoded, now()),
		Err(Bolt12ParseError::Decode(DecodeError::FieldDecode {
			field: "invoice_blindedpay",
			reason: "no pay info entries",
		}))
	);
}

#[test]
fn rejects_an_invoice_with_a_malformed_fallback() {
	// A v0 witness program must be 20 or 32 bytes; this one is 21.
	let mut fallbacks = vec![0x01, 0x00];
	fallbacks.extend_from_slice(&21u16.to_be_bytes());
	fallbacks.extend_from_slice(&[0x11; 21]);

	let mut records = invoice_records(now().as_secs() - 100);
	records.insert(records.len() - 1, tlv(172, &fallbacks));
	records.push(tlv(240, &[0x01; 64]));
	let encoded = bech32("lni", &records.concat());
	assert_eq!(
		decode_with_time(&encoded, now()),
		Err(Bolt12ParseError::Decode(DecodeError::FieldDecode {
			field: "invoice_fallbacks",
			reason: "v0 witness program not 20 or 32 bytes",
		}))
	);
}

#[test]
fn preserves_unknown_odd_records_in_the_id() {
	let mut records = offer_records();
	records.push(tlv(71, &[0xaa, 0xbb]));
	let encoded = bech32("lno", &records.concat());
	let message = decode_with_time(&encoded, now()).unwrap();
	assert_eq!(message.id(), merkle_root(&records));
	match &message {
		Bolt12Message::Offer(offer) => {
			assert_eq!(offer.unknown_records().len(), 1);
			assert_eq!(offer.unknown_records()[0].r#type, 71);
			assert_eq!(offer.unknown_records()[0].value, vec![0xaa, 0xbb]);
		},
		_ => panic!("not an offer"),
	}
}

#[test]
fn rejects_unknown_even_records() {
	let mut records = offer_records();
	records.push(tlv(70, &[0xaa]));
	let encoded = bech32("lno", &records.concat());
	assert_eq!(
		decode_with_time(&encoded, now()),
		Err(Bolt12ParseError::Decode(DecodeError::UnknownRequiredField(70)))
	);
}
