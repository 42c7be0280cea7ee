//! Account keys and request signing
//!
//! Provides:
//! - sr25519 keypairs derived from a BIP-39 mnemonic the substrate way
//!   (mnemonic entropy, then mini secret, then ed25519-style expansion)
//! - SS58 account addresses with the CESS network prefix
//! - Signed random nonces for authenticating miner requests

use crate::error::{ClientError, Result};
use blake2::{Blake2b512, Digest};
use rand::distributions::Alphanumeric;
use rand::Rng;
use schnorrkel::{signing_context, ExpansionMode, Keypair, PublicKey, Signature};
use std::fmt;

/// SS58 network prefix of the CESS chain
pub const SS58_PREFIX: u16 = 11330;

/// Signing context for sr25519 signatures
pub const SIGNING_CONTEXT: &[u8] = b"substrate";

/// Length of the random nonce sent with each miner request
pub const NONCE_LEN: usize = 16;

const SS58_CHECKSUM_PREFIX: &[u8] = b"SS58PRE";
const SS58_CHECKSUM_LEN: usize = 2;

/// A random message and its base58 signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedNonce {
    pub message: String,
    pub signature: String,
}

/// sr25519 signing identity
pub struct Keyring {
    keypair: Keypair,
    account: String,
}

impl Keyring {
    /// Derive the keypair from a BIP-39 English mnemonic
    pub fn from_mnemonic(phrase: &str) -> Result<Self> {
        let mnemonic = bip39::Mnemonic::parse_in_normalized(bip39::Language::English, phrase.trim())
            .map_err(|e| ClientError::InvalidMnemonic(e.to_string()))?;
        let entropy = mnemonic.to_entropy();
        let mini = substrate_bip39::mini_secret_from_entropy(&entropy, "")
            .map_err(|e| ClientError::InvalidMnemonic(format!("{:?}", e)))?;
        let keypair = mini.expand_to_keypair(ExpansionMode::Ed25519);
        let account = ss58_encode(&keypair.public.to_bytes(), SS58_PREFIX);
        Ok(Self { keypair, account })
    }

    /// SS58 account address
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Raw public key
    pub fn public_key(&self) -> [u8; 32] {
        self.keypair.public.to_bytes()
    }

    /// Sign `message` with the substrate signing context
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.keypair
            .sign(signing_context(SIGNING_CONTEXT).bytes(message))
            .to_bytes()
    }

    /// Fresh random nonce and its base58 signature
    pub fn signed_nonce(&self) -> SignedNonce {
        let message: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(NONCE_LEN)
            .map(char::from)
            .collect();
        let signature = bs58::encode(self.sign(message.as_bytes())).into_string();
        SignedNonce { message, signature }
    }
}

impl fmt::Debug for Keyring {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keyring")
            .field("account", &self.account)
            .finish_non_exhaustive()
    }
}

/// Verify an sr25519 signature over `message`
pub fn verify_signature(public: &[u8; 32], message: &[u8], signature: &[u8]) -> bool {
    let Ok(public) = PublicKey::from_bytes(public) else {
        return false;
    };
    let Ok(signature) = Signature::from_bytes(signature) else {
        return false;
    };
    public
        .verify(signing_context(SIGNING_CONTEXT).bytes(message), &signature)
        .is_ok()
}

/// Verify the headers a miner receives: account address, nonce and base58 signature
pub fn verify_request(account: &str, message: &str, signature_b58: &str) -> bool {
    let Ok((public, _)) = ss58_decode(account) else {
        return false;
    };
    let Ok(signature) = bs58::decode(signature_b58).into_vec() else {
        return false;
    };
    verify_signature(&public, message.as_bytes(), &signature)
}

/// Encode a public key as an SS58 address
pub fn ss58_encode(public: &[u8; 32], prefix: u16) -> String {
    let mut data = ss58_prefix_bytes(prefix);
    data.extend_from_slice(public);
    let checksum = ss58_checksum(&data);
    data.extend_from_slice(&checksum[..SS58_CHECKSUM_LEN]);
    bs58::encode(data).into_string()
}

/// Decode an SS58 address into its public key and network prefix
pub fn ss58_decode(address: &str) -> Result<([u8; 32], u16)> {
    let invalid = |reason: &str| ClientError::InvalidAccount(format!("{}: {}", address, reason));
    let data = bs58::decode(address)
        .into_vec()
        .map_err(|_| invalid("not base58"))?;

    let (prefix, prefix_len) = match data.first() {
        Some(b) if *b < 64 => (*b as u16, 1),
        Some(b) if *b < 128 => {
            let second = *data.get(1).ok_or_else(|| invalid("truncated"))?;
            let lower = (b << 2) | (second >> 6);
            let upper = second & 0b0011_1111;
            (lower as u16 | ((upper as u16) << 8), 2)
        }
        _ => return Err(invalid("unsupported prefix")),
    };
    if data.len() != prefix_len + 32 + SS58_CHECKSUM_LEN {
        return Err(invalid("wrong length"));
    }

    let body_len = prefix_len + 32;
    let checksum = ss58_checksum(&data[..body_len]);
    if data[body_len..] != checksum[..SS58_CHECKSUM_LEN] {
        return Err(invalid("bad checksum"));
    }
    let mut public = [0u8; 32];
    public.copy_from_slice(&data[prefix_len..body_len]);
    Ok((public, prefix))
}

fn ss58_prefix_bytes(prefix: u16) -> Vec<u8> {
    let ident = prefix & 0b0011_1111_1111_1111;
    if ident < 64 {
        return vec![ident as u8];
    }
    let first = ((ident & 0b0000_0000_1111_1100) as u8) >> 2;
    let second = ((ident >> 8) as u8) | (((ident & 0b0000_0000_0000_0011) as u8) << 6);
    vec![first | 0b0100_0000, second]
}

fn ss58_checksum(data: &[u8]) -> Vec<u8> {
    let mut hasher = Blake2b512::new();
    hasher.update(SS58_CHECKSUM_PREFIX);
    hasher.update(data);
    hasher.finalize().to_vec()
}
