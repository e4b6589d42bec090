//! secp256k1 signing key held in process

use crate::domain::BackendError;
use bft_types::{address_from_pubkey, sign_hash, Address, Hash, Signature};
use k256::ecdsa::SigningKey;
use std::fmt;

/// Signs consensus digests with a local key. Backends embed one to
/// implement [`Backend::sign`](crate::ports::Backend::sign).
#[derive(Clone)]
pub struct LocalSigner {
    key: SigningKey,
    address: Address,
}

impl LocalSigner {
    pub fn new(key: SigningKey) -> Self {
        let address = address_from_pubkey(key.verifying_key());
        Self { key, address }
    }

    /// Key from 32 secret bytes.
    pub fn from_bytes(secret: &[u8; 32]) -> Result<Self, BackendError> {
        let key = SigningKey::from_slice(secret)
            .map_err(|e| BackendError::Signing(e.to_string()))?;
        Ok(Self::new(key))
    }

    pub fn random<R: k256::elliptic_curve::rand_core::CryptoRngCore>(rng: &mut R) -> Self {
        Self::new(SigningKey::random(rng))
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn sign(&self, digest: &Hash) -> Result<Signature, BackendError> {
        Ok(sign_hash(digest, &self.key)?)
    }
}

impl fmt::Debug for LocalSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalSigner")
            .field("address", &bft_types::short_hex(&self.address))
            .finish_non_exhaustive()
    }
}
