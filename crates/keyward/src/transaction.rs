//! Just enough of the XDR `TransactionEnvelope` to sign it.
//!
//! The wallet never builds transactions; pages hand over a base64 `ENVELOPE_TYPE_TX` envelope
//! with an empty signature list, and we append one decorated signature.

use crate::{errors::KeywardError, keys::Keypair};
use base64::Engine as _;
use ed25519_dalek::Signer as _;
use sha2::{Digest as _, Sha256};

const ENVELOPE_TYPE_TX: u32 = 2;
const SIGNATURE_LEN: u32 = 64;
/// Type discriminant plus the trailing signature count.
const MIN_ENVELOPE_LEN: usize = 8;

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    xdr: String,
    /// The `Transaction` between the envelope discriminant and the signature count.
    body: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    pub envelope_xdr: String,
    pub hash_hex: String,
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let b: [u8; 4] = bytes.get(at..at.checked_add(4)?)?.try_into().ok()?;
    Some(u32::from_be_bytes(b))
}

impl UnsignedTransaction {
    pub fn parse(xdr_b64: &str) -> Result<Self, KeywardError> {
        let invalid = |why: &str| KeywardError::InvalidTransaction(why.to_owned());
        let xdr = xdr_b64.trim();
        let envelope = B64.decode(xdr).map_err(|_b64| invalid("not base64"))?;

        if envelope.len() <= MIN_ENVELOPE_LEN || envelope.len() % 4 != 0 {
            return Err(invalid("truncated envelope"));
        }
        if read_u32(&envelope, 0) != Some(ENVELOPE_TYPE_TX) {
            return Err(invalid("unsupported envelope type"));
        }
        if read_u32(&envelope, envelope.len() - 4) != Some(0) {
            return Err(invalid("envelope is already signed"));
        }
        let body = envelope
            .get(4..envelope.len() - 4)
            .ok_or_else(|| invalid("truncated envelope"))?
            .to_vec();
        Ok(Self {
            xdr: xdr.to_owned(),
            body,
        })
    }

    pub fn xdr(&self) -> &str {
        &self.xdr
    }

    /// `SHA-256(network id || ENVELOPE_TYPE_TX || tx)`, which is also the transaction hash.
    pub fn signature_payload_hash(&self, network_passphrase: &str) -> [u8; 32] {
        let network_id = Sha256::digest(network_passphrase.as_bytes());
        let mut h = Sha256::new();
        h.update(network_id);
        h.update(ENVELOPE_TYPE_TX.to_be_bytes());
        h.update(&self.body);
        h.finalize().into()
    }

    pub fn sign(&self, keypair: &Keypair, network_passphrase: &str) -> SignedTransaction {
        let hash = self.signature_payload_hash(network_passphrase);
        let signing = keypair.signing_key();
        let signature = signing.sign(&hash).to_bytes();
        let [.., h0, h1, h2, h3] = signing.verifying_key().to_bytes();

        let mut out = Vec::with_capacity(self.body.len() + 4 + 4 + 4 + 4 + 64);
        out.extend_from_slice(&ENVELOPE_TYPE_TX.to_be_bytes());
        out.extend_from_slice(&self.body);
        out.extend_from_slice(&1_u32.to_be_bytes());
        out.extend_from_slice(&[h0, h1, h2, h3]);
        out.extend_from_slice(&SIGNATURE_LEN.to_be_bytes());
        out.extend_from_slice(&signature);

        SignedTransaction {
            envelope_xdr: B64.encode(out),
            hash_hex: hex::encode(hash),
        }
    }
}
