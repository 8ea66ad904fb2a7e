use crate::errors::KeywardError;
use bip39::{Language, Mnemonic};
use ed25519_dalek::SigningKey;
use eyre::Context as _;
use hmac::{Hmac, Mac as _};
use sha2::Sha512;
use stellar_strkey::ed25519::{PrivateKey as StrPrivateKey, PublicKey as StrPublicKey};
use zeroize::Zeroizing;

type HmacSha512 = Hmac<Sha512>;

/// SLIP-0044 coin type for Stellar (SEP-0005 paths are `m/44'/148'/index'`).
const STELLAR_COIN_TYPE: u32 = 148;
const HARDENED: u32 = 0x8000_0000;

pub struct Keypair {
    public_key: String,
    seed: Zeroizing<[u8; 32]>,
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl Keypair {
    pub fn from_seed(seed: Zeroizing<[u8; 32]>) -> Self {
        let public = SigningKey::from_bytes(&seed).verifying_key().to_bytes();
        Self {
            public_key: StrPublicKey(public).to_string(),
            seed,
        }
    }

    /// Parse an `S...` secret seed.
    pub fn from_secret(secret: &str) -> eyre::Result<Self> {
        let parsed = StrPrivateKey::from_string(secret.trim())
            .map_err(|_bad| KeywardError::InvalidSecretKey)?;
        Ok(Self::from_seed(Zeroizing::new(parsed.0)))
    }

    pub fn public_key(&self) -> &str {
        &self.public_key
    }

    pub fn secret(&self) -> Zeroizing<String> {
        Zeroizing::new(StrPrivateKey(*self.seed).to_string())
    }

    pub fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.seed)
    }
}

/// Generate a fresh English mnemonic with `entropy_bits` of entropy (128 -> 12 words).
pub fn generate_mnemonic(entropy_bits: usize) -> eyre::Result<Zeroizing<String>> {
    if entropy_bits % 32 != 0 || !(128..=256).contains(&entropy_bits) {
        eyre::bail!("unsupported mnemonic entropy: {entropy_bits} bits");
    }
    let words = entropy_bits / 32 * 3;
    let mnemonic = Mnemonic::generate_in(Language::English, words).context("generate mnemonic")?;
    Ok(Zeroizing::new(mnemonic.to_string()))
}

/// Derive the ed25519 keypair at `m/44'/148'/index'`.
pub fn derive_keypair(mnemonic: &str, index: u32) -> Result<Keypair, KeywardError> {
    let parsed = Mnemonic::parse_in_normalized(Language::English, mnemonic.trim())
        .map_err(|_bad| KeywardError::Derivation)?;
    let seed = Zeroizing::new(parsed.to_seed_normalized(""));
    let key = slip10_derive(&seed[..], &[44, STELLAR_COIN_TYPE, index])?;
    Ok(Keypair::from_seed(key))
}

fn split_i(mac: HmacSha512) -> (Zeroizing<[u8; 32]>, Zeroizing<[u8; 32]>) {
    let mut buf = Zeroizing::new([0_u8; 64]);
    buf.copy_from_slice(&mac.finalize().into_bytes());
    let mut key = Zeroizing::new([0_u8; 32]);
    let mut chain = Zeroizing::new([0_u8; 32]);
    let (il, ir) = buf.split_at(32);
    key.copy_from_slice(il);
    chain.copy_from_slice(ir);
    (key, chain)
}

/// SLIP-0010 ed25519 derivation; every level is hardened.
fn slip10_derive(seed: &[u8], path: &[u32]) -> Result<Zeroizing<[u8; 32]>, KeywardError> {
    let mut mac =
        HmacSha512::new_from_slice(b"ed25519 seed").map_err(|_len| KeywardError::Derivation)?;
    mac.update(seed);
    let (mut key, mut chain) = split_i(mac);

    for &index in path {
        let mut mac =
            HmacSha512::new_from_slice(&chain[..]).map_err(|_len| KeywardError::Derivation)?;
        mac.update(&[0x00]);
        mac.update(&key[..]);
        mac.update(&(index | HARDENED).to_be_bytes());
        (key, chain) = split_i(mac);
    }
    Ok(key)
}
