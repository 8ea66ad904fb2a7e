use aes_gcm::{
    aead::{Aead as _, KeyInit as _},
    Aes256Gcm, Nonce,
};
use argon2::{
    password_hash::{PasswordHasher as _, SaltString},
    Algorithm, Argon2, Params, Version,
};
use base64::Engine as _;
use eyre::Context as _;
use hkdf::Hkdf;
use rand::Rng as _;
use secrecy::{ExposeSecret as _, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use zeroize::Zeroizing;

/// Name recorded next to every sealed record so the scheme can be versioned.
pub const ENCRYPTER_NAME: &str = "argon2id-hkdf-aes256gcm";

const B64: base64::engine::GeneralPurpose = base64::engine::general_purpose::STANDARD;

/// Password-sealed ciphertext. The salt travels with the box; nothing else is needed to open it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SealedBox {
    pub v: u8,
    pub salt_b64: String,
    pub nonce_b64: String,
    pub ct_b64: String,
}

pub fn fill_random(buf: &mut [u8]) {
    let mut rng = rand::rng();
    rng.fill_bytes(buf);
}

fn random_salt16() -> [u8; 16] {
    let mut s = [0_u8; 16];
    fill_random(&mut s);
    s
}

pub fn derive_password_key(
    password: &SecretString,
    salt16: &[u8; 16],
) -> eyre::Result<Zeroizing<[u8; 32]>> {
    // Frozen Argon2id parameters (argon2 0.5 defaults) so dependency bumps never orphan a vault.
    let params =
        Params::new(19 * 1024, 2, 1, Some(32)).map_err(|e| eyre::eyre!("argon2 params: {e}"))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
    let salt = SaltString::encode_b64(salt16).map_err(|e| eyre::eyre!("encode salt: {e}"))?;

    let hash = argon2
        .hash_password(password.expose_secret().as_bytes(), &salt)
        .map_err(|e| eyre::eyre!("argon2 hash: {e}"))?;
    let out = hash
        .hash
        .ok_or_else(|| eyre::eyre!("argon2 missing hash"))?;
    let Some(prefix) = out.as_bytes().get(..32) else {
        eyre::bail!("argon2 hash too short");
    };
    let mut key = Zeroizing::new([0_u8; 32]);
    key.copy_from_slice(prefix);
    Ok(key)
}

/// Bind the password key to one record so a box can't be replayed under another id.
fn derive_record_key(base: &[u8; 32], record_id: &str) -> eyre::Result<Zeroizing<[u8; 32]>> {
    let hk = Hkdf::<Sha256>::new(None, base);
    let info = format!("keyward:{record_id}:keystore");
    let mut out = Zeroizing::new([0_u8; 32]);
    hk.expand(info.as_bytes(), &mut out[..])
        .map_err(|e| eyre::eyre!("hkdf expand: {e}"))?;
    Ok(out)
}

pub fn seal(password: &SecretString, record_id: &str, plaintext: &[u8]) -> eyre::Result<SealedBox> {
    let salt = random_salt16();
    let base = derive_password_key(password, &salt)?;
    let key = derive_record_key(&base, record_id)?;

    let cipher = Aes256Gcm::new_from_slice(&key[..]).context("aes init")?;
    let mut nonce = [0_u8; 12];
    fill_random(&mut nonce);
    let ct = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|e| eyre::eyre!("aes encrypt: {e}"))?;

    Ok(SealedBox {
        v: 1,
        salt_b64: B64.encode(salt),
        nonce_b64: B64.encode(nonce),
        ct_b64: B64.encode(ct),
    })
}

pub fn open(
    password: &SecretString,
    record_id: &str,
    sealed: &SealedBox,
) -> eyre::Result<Zeroizing<Vec<u8>>> {
    if sealed.v != 1 {
        eyre::bail!("unsupported SealedBox version: {}", sealed.v);
    }
    let salt: [u8; 16] = B64
        .decode(&sealed.salt_b64)
        .context("decode salt")?
        .try_into()
        .map_err(|_salt| eyre::eyre!("invalid salt length"))?;
    let nonce = B64.decode(&sealed.nonce_b64).context("decode nonce")?;
    if nonce.len() != 12 {
        eyre::bail!("invalid nonce length");
    }
    let ct = B64.decode(&sealed.ct_b64).context("decode ciphertext")?;

    let base = derive_password_key(password, &salt)?;
    let key = derive_record_key(&base, record_id)?;
    let cipher = Aes256Gcm::new_from_slice(&key[..]).context("aes init")?;
    let pt = cipher
        .decrypt(Nonce::from_slice(&nonce), ct.as_ref())
        .map_err(|e| eyre::eyre!("aes decrypt: {e}"))?;
    Ok(Zeroizing::new(pt))
}

/// Burn the same KDF cost as a real open, so a missing record is not faster than a wrong password.
pub fn burn_kdf(password: &SecretString) {
    let salt = random_salt16();
    drop(derive_password_key(password, &salt));
}
