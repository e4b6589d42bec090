//! # Keccak hashing and recoverable secp256k1 signatures
//!
//! Validators sign the Keccak-256 digest of a message's canonical bytes.
//! The signer is identified by the address recovered from the signature:
//! the last 20 bytes of the Keccak-256 hash of the uncompressed public key.

use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};

use crate::entities::{Address, Hash, Signature};
use crate::errors::CryptoError;

/// Keccak256 hash function.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Derive the address of a public key.
pub fn address_from_pubkey(public_key: &VerifyingKey) -> Address {
    let pubkey_bytes = public_key.to_encoded_point(false);
    // skip the 0x04 prefix
    let hash = keccak256(&pubkey_bytes.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    address
}

/// Sign a 32-byte digest, returning `r || s || v`.
pub fn sign_hash(message_hash: &Hash, key: &SigningKey) -> Result<Signature, CryptoError> {
    let (sig, recid) = key
        .sign_prehash_recoverable(message_hash)
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
    let mut out = [0u8; 65];
    out[..64].copy_from_slice(&sig.to_bytes());
    out[64] = recid.to_byte();
    Ok(Signature(out))
}

/// Recover the signer address of `signature` over `message_hash`.
pub fn recover_address(message_hash: &Hash, signature: &Signature) -> Result<Address, CryptoError> {
    let bytes = signature.as_bytes();
    let recovery_id = RecoveryId::from_byte(bytes[64]).ok_or(CryptoError::InvalidRecoveryId)?;
    let sig = EcdsaSignature::from_slice(&bytes[..64]).map_err(|_| CryptoError::InvalidFormat)?;
    let key = VerifyingKey::recover_from_prehash(message_hash, &sig, recovery_id)
        .map_err(|_| CryptoError::RecoveryFailed)?;
    Ok(address_from_pubkey(&key))
}
