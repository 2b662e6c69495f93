use crate::chunk::compute_hash;
use crate::error::{DdsError, Result};
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// Byte width of one curve coordinate / scalar.
pub const COORDINATE_LEN: usize = 32;

/// Length of a serialized signature: `r || s`, each a big-endian scalar
/// left-padded to [`COORDINATE_LEN`] bytes.
pub const SIGNATURE_LEN: usize = 2 * COORDINATE_LEN;

/// A P-256 signing keypair.
#[derive(Clone)]
pub struct KeyPair {
    pub private_key: SigningKey,
    pub public_key: VerifyingKey,
}

/// Create a fresh random keypair.
pub fn generate_key_pair() -> KeyPair {
    let private_key = SigningKey::random(&mut OsRng);
    let public_key = private_key.verifying_key().clone();
    KeyPair {
        private_key,
        public_key,
    }
}

/// Uncompressed SEC1 encoding of a public key.
pub fn marshal_public_key(public_key: &VerifyingKey) -> Vec<u8> {
    public_key.to_encoded_point(false).as_bytes().to_vec()
}

/// Hex SHA-256 of the marshaled public key.
pub fn public_key_to_address(public_key: &VerifyingKey) -> String {
    compute_hash(&marshal_public_key(public_key))
}

/// Sign a precomputed hash. Returns a fixed-length `r || s` signature.
pub fn sign(private_key: &SigningKey, hash: &[u8]) -> Result<Vec<u8>> {
    if hash.is_empty() {
        return Err(DdsError::MalformedInput("cannot sign an empty hash".into()));
    }
    let signature: Signature = private_key
        .sign_prehash(hash)
        .map_err(|e| DdsError::MalformedInput(format!("signing failed: {}", e)))?;
    Ok(signature.to_bytes().to_vec())
}

/// Check `signature` over `hash` against a marshaled public key.
///
/// Never fails loudly: any malformed key, wrong-length signature or
/// out-of-range scalar simply verifies as `false`.
pub fn verify_signature(public_key: &[u8], hash: &[u8], signature: &[u8]) -> bool {
    if signature.len() != SIGNATURE_LEN || hash.is_empty() {
        return false;
    }
    let Ok(key) = VerifyingKey::from_sec1_bytes(public_key) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify_prehash(hash, &signature).is_ok()
}

/// Rebuild a signing key from its 32-byte big-endian scalar.
pub fn signing_key_from_bytes(bytes: &[u8]) -> Result<SigningKey> {
    if bytes.is_empty() {
        return Err(DdsError::MalformedInput("private key is empty".into()));
    }
    SigningKey::from_slice(bytes)
        .map_err(|_| DdsError::MalformedInput("private key is not a valid P-256 scalar".into()))
}

/// A keypair with its address, owned by a single identity.
#[derive(Clone)]
pub struct Wallet {
    keys: KeyPair,
    address: String,
}

/// On-disk form of a wallet. Only the private scalar is kept; the rest is
/// derived on load.
#[derive(Serialize, Deserialize)]
struct WalletFile {
    private_key: String,
    address: String,
}

impl Wallet {
    pub fn new() -> Self {
        Self::from_key_pair(generate_key_pair())
    }

    pub fn from_key_pair(keys: KeyPair) -> Self {
        let address = public_key_to_address(&keys.public_key);
        Self { keys, address }
    }

    pub fn from_private_key_bytes(bytes: &[u8]) -> Result<Self> {
        let private_key = signing_key_from_bytes(bytes)?;
        let public_key = private_key.verifying_key().clone();
        Ok(Self::from_key_pair(KeyPair {
            private_key,
            public_key,
        }))
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn public_key(&self) -> &VerifyingKey {
        &self.keys.public_key
    }

    pub fn public_key_bytes(&self) -> Vec<u8> {
        marshal_public_key(&self.keys.public_key)
    }

    /// Raw private scalar. Hand this only to code acting for the owner.
    pub fn private_key_bytes(&self) -> Vec<u8> {
        self.keys.private_key.to_bytes().to_vec()
    }

    pub fn sign_data(&self, hash: &[u8]) -> Result<Vec<u8>> {
        sign(&self.keys.private_key, hash)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = WalletFile {
            private_key: hex::encode(self.private_key_bytes()),
            address: self.address.clone(),
        };
        fs::write(path, serde_json::to_vec_pretty(&file)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file: WalletFile = serde_json::from_slice(&fs::read(path)?)?;
        let bytes = hex::decode(&file.private_key)
            .map_err(|e| DdsError::MalformedInput(format!("wallet key is not hex: {}", e)))?;
        let wallet = Self::from_private_key_bytes(&bytes)?;
        if wallet.address != file.address {
            return Err(DdsError::Corruption(format!(
                "wallet at {} records address {} but its key derives {}",
                path.display(),
                file.address,
                wallet.address
            )));
        }
        Ok(wallet)
    }
}

impl Default for Wallet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Wallet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Wallet")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::hash_bytes;

    #[test]
    fn signatures_have_fixed_length() {
        let wallet = Wallet::new();
        for i in 0..16u8 {
            let sig = wallet.sign_data(&hash_bytes(&[i])).unwrap();
            assert_eq!(sig.len(), SIGNATURE_LEN);
        }
    }

    #[test]
    fn sign_then_verify() {
        let wallet = Wallet::new();
        let hash = hash_bytes(b"payload");
        let sig = wallet.sign_data(&hash).unwrap();
        assert!(verify_signature(&wallet.public_key_bytes(), &hash, &sig));
        assert!(!verify_signature(
            &wallet.public_key_bytes(),
            &hash_bytes(b"other"),
            &sig
        ));
    }

    #[test]
    fn wrong_key_or_length_rejected() {
        let a = Wallet::new();
        let b = Wallet::new();
        let hash = hash_bytes(b"payload");
        let sig = a.sign_data(&hash).unwrap();

        assert!(!verify_signature(&b.public_key_bytes(), &hash, &sig));
        assert!(!verify_signature(&a.public_key_bytes(), &hash, &sig[..63]));
        let mut long = sig.clone();
        long.push(0);
        assert!(!verify_signature(&a.public_key_bytes(), &hash, &long));
        assert!(!verify_signature(b"not a key", &hash, &sig));
    }

    #[test]
    fn address_is_deterministic_hex() {
        let wallet = Wallet::new();
        let again = public_key_to_address(wallet.public_key());
        assert_eq!(wallet.address(), again);
        assert_eq!(again.len(), 64);
        assert_ne!(wallet.address(), Wallet::new().address());
    }

    #[test]
    fn wallet_restores_from_private_key() {
        let wallet = Wallet::new();
        let restored = Wallet::from_private_key_bytes(&wallet.private_key_bytes()).unwrap();
        assert_eq!(wallet.address(), restored.address());
        assert!(matches!(
            Wallet::from_private_key_bytes(&[]),
            Err(DdsError::MalformedInput(_))
        ));
    }

    #[test]
    fn wallet_file_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("wallet.json");
        let wallet = Wallet::new();
        wallet.save(&path).unwrap();
        assert_eq!(Wallet::load(&path).unwrap().address(), wallet.address());
    }
}
