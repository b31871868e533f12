//! Hierarchical deterministic keys and P2PKH addresses.
//!
//! Every tree node owns a key derived from the cache's master key along the
//! node's [`KeyPath`]. Derivation is BIP32 over secp256k1; nothing besides
//! the master key and the path is needed to reproduce a node's address.

pub mod key_path;

pub use key_path::KeyPath;

use crate::error::StorageError;
use crate::hash::hash160;
use hmac::{Hmac, Mac};
use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::PrimeField;
use k256::{FieldBytes, NonZeroScalar, Scalar, SecretKey};
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use std::fmt;
use std::str::FromStr;

type HmacSha512 = Hmac<Sha512>;

const MASTER_HMAC_KEY: &[u8] = b"Bitcoin seed";
const XPRV_LEN: usize = 78;

/// Ledger network; selects address and extended key version bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
}

impl Network {
    fn address_version(self) -> u8 {
        match self {
            Network::Mainnet => 0x00,
            Network::Testnet => 0x6f,
        }
    }

    fn xprv_version(self) -> [u8; 4] {
        match self {
            Network::Mainnet => [0x04, 0x88, 0xad, 0xe4],
            Network::Testnet => [0x04, 0x35, 0x83, 0x94],
        }
    }
}

/// Pay-to-public-key-hash address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address {
    network: Network,
    hash: [u8; 20],
}

impl Address {
    pub fn from_public_key(network: Network, public_key: &[u8]) -> Self {
        Self {
            network,
            hash: hash160(public_key),
        }
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// `OP_DUP OP_HASH160 <hash> OP_EQUALVERIFY OP_CHECKSIG`
    pub fn locking_script(&self) -> Vec<u8> {
        let mut script = Vec::with_capacity(25);
        script.extend_from_slice(&[0x76, 0xa9, 0x14]);
        script.extend_from_slice(&self.hash);
        script.extend_from_slice(&[0x88, 0xac]);
        script
    }

    /// Recognize a P2PKH locking script.
    pub fn from_locking_script(network: Network, script: &[u8]) -> Option<Self> {
        if script.len() == 25
            && script[..3] == [0x76, 0xa9, 0x14]
            && script[23..] == [0x88, 0xac]
        {
            let mut hash = [0u8; 20];
            hash.copy_from_slice(&script[3..23]);
            Some(Self { network, hash })
        } else {
            None
        }
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut payload = Vec::with_capacity(21);
        payload.push(self.network.address_version());
        payload.extend_from_slice(&self.hash);
        f.write_str(&bs58::encode(payload).with_check().into_string())
    }
}

impl FromStr for Address {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|e| StorageError::InvalidKey(format!("invalid address {}: {}", s, e)))?;
        if bytes.len() != 21 {
            return Err(StorageError::InvalidKey(format!(
                "invalid address length for {}",
                s
            )));
        }
        let network = match bytes[0] {
            0x00 => Network::Mainnet,
            0x6f => Network::Testnet,
            other => {
                return Err(StorageError::InvalidKey(format!(
                    "unknown address version {:#04x}",
                    other
                )))
            }
        };
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&bytes[1..]);
        Ok(Self { network, hash })
    }
}

/// BIP32 extended private key
#[derive(Clone)]
pub struct ExtendedPrivateKey {
    network: Network,
    depth: u8,
    parent_fingerprint: [u8; 4],
    child_number: u32,
    chain_code: [u8; 32],
    secret: SecretKey,
}

impl ExtendedPrivateKey {
    /// Master key from seed bytes
    pub fn from_seed(network: Network, seed: &[u8]) -> Result<Self, StorageError> {
        let (key, chain_code) = hmac_split(MASTER_HMAC_KEY, &[seed])?;
        let secret = SecretKey::from_bytes(&FieldBytes::clone_from_slice(&key))
            .map_err(|_| StorageError::InvalidKey("seed produced an invalid key".to_string()))?;
        Ok(Self {
            network,
            depth: 0,
            parent_fingerprint: [0u8; 4],
            child_number: 0,
            chain_code,
            secret,
        })
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Compressed SEC1 public key
    pub fn public_key(&self) -> [u8; 33] {
        let point = self.secret.public_key().to_encoded_point(true);
        let mut out = [0u8; 33];
        out.copy_from_slice(point.as_bytes());
        out
    }

    pub fn address(&self) -> Address {
        Address::from_public_key(self.network, &self.public_key())
    }

    pub fn signing_key(&self) -> SigningKey {
        SigningKey::from(&self.secret)
    }

    /// Derive along `path`, relative to this key.
    pub fn derive_path(&self, path: &KeyPath) -> Result<Self, StorageError> {
        path.child_numbers()?
            .into_iter()
            .try_fold(self.clone(), |key, index| key.derive_child(index))
    }

    /// CKDpriv
    pub fn derive_child(&self, index: u32) -> Result<Self, StorageError> {
        let index_bytes = index.to_be_bytes();
        let secret_bytes = self.secret.to_bytes();
        let public = self.public_key();
        let (il, chain_code) = if index >= key_path::HARDENED_OFFSET {
            hmac_split(&self.chain_code, &[&[0u8][..], &secret_bytes[..], &index_bytes[..]])?
        } else {
            hmac_split(&self.chain_code, &[&public[..], &index_bytes[..]])?
        };

        let tweak: Scalar = Option::from(Scalar::from_repr(FieldBytes::clone_from_slice(&il)))
            .ok_or_else(|| invalid_child(index))?;
        let parent: Scalar = *self.secret.to_nonzero_scalar();
        let child: NonZeroScalar =
            Option::from(NonZeroScalar::new(parent + tweak)).ok_or_else(|| invalid_child(index))?;

        let mut parent_fingerprint = [0u8; 4];
        parent_fingerprint.copy_from_slice(&hash160(&public)[..4]);

        Ok(Self {
            network: self.network,
            depth: self.depth.saturating_add(1),
            parent_fingerprint,
            child_number: index,
            chain_code,
            secret: SecretKey::from(child),
        })
    }

    /// Base58Check `xprv`/`tprv` serialization
    pub fn to_extended_string(&self) -> String {
        let mut data = Vec::with_capacity(XPRV_LEN);
        data.extend_from_slice(&self.network.xprv_version());
        data.push(self.depth);
        data.extend_from_slice(&self.parent_fingerprint);
        data.extend_from_slice(&self.child_number.to_be_bytes());
        data.extend_from_slice(&self.chain_code);
        data.push(0);
        data.extend_from_slice(&self.secret.to_bytes());
        bs58::encode(data).with_check().into_string()
    }
}

impl FromStr for ExtendedPrivateKey {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let data = bs58::decode(s.trim())
            .with_check(None)
            .into_vec()
            .map_err(|e| StorageError::InvalidKey(format!("invalid extended key: {}", e)))?;
        if data.len() != XPRV_LEN {
            return Err(StorageError::InvalidKey(format!(
                "extended key must be {} bytes, got {}",
                XPRV_LEN,
                data.len()
            )));
        }
        let network = if data[..4] == Network::Mainnet.xprv_version() {
            Network::Mainnet
        } else if data[..4] == Network::Testnet.xprv_version() {
            Network::Testnet
        } else {
            return Err(StorageError::InvalidKey(
                "not an extended private key".to_string(),
            ));
        };
        if data[45] != 0 {
            return Err(StorageError::InvalidKey(
                "extended private key is missing its 0x00 prefix".to_string(),
            ));
        }

        let mut parent_fingerprint = [0u8; 4];
        parent_fingerprint.copy_from_slice(&data[5..9]);
        let mut child_number = [0u8; 4];
        child_number.copy_from_slice(&data[9..13]);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&data[13..45]);
        let secret = SecretKey::from_bytes(&FieldBytes::clone_from_slice(&data[46..78]))
            .map_err(|_| StorageError::InvalidKey("invalid private key scalar".to_string()))?;

        Ok(Self {
            network,
            depth: data[4],
            parent_fingerprint,
            child_number: u32::from_be_bytes(child_number),
            chain_code,
            secret,
        })
    }
}

impl fmt::Debug for ExtendedPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendedPrivateKey")
            .field("network", &self.network)
            .field("depth", &self.depth)
            .field("address", &self.address().to_string())
            .finish_non_exhaustive()
    }
}

fn hmac_split(key: &[u8], parts: &[&[u8]]) -> Result<([u8; 32], [u8; 32]), StorageError> {
    let mut mac = HmacSha512::new_from_slice(key)
        .map_err(|e| StorageError::InvalidKey(format!("HMAC init failed: {}", e)))?;
    for part in parts {
        mac.update(part);
    }
    let output = mac.finalize().into_bytes();
    let mut left = [0u8; 32];
    let mut right = [0u8; 32];
    left.copy_from_slice(&output[..32]);
    right.copy_from_slice(&output[32..]);
    Ok((left, right))
}

fn invalid_child(index: u32) -> StorageError {
    StorageError::InvalidKey(format!("child {} is not a valid key, use the next index", index))
}

#[cfg(test)]
mod tests {
    use super::*;

    // BIP32 test vector 1
    const SEED: &str = "000102030405060708090a0b0c0d0e0f";

    fn master() -> ExtendedPrivateKey {
        ExtendedPrivateKey::from_seed(Network::Mainnet, &hex::decode(SEED).unwrap()).unwrap()
    }

    #[test]
    fn test_master_key_matches_bip32_vector() {
        assert_eq!(
            master().to_extended_string(),
            "xprv9s21ZrQH143K3QTDL4LXw2F7HEK3wJUD2nW2nRk4stbPy6cq3jPPqjiChkVvvNKmPGJxWUtg6LnF5kejMRNNU3TGtRBeJgk33yuGBxrMPHi"
        );
    }

    #[test]
    fn test_hardened_then_normal_child_matches_vector() {
        let path = KeyPath::parse("m/0'/1").unwrap();
        assert_eq!(
            master().derive_path(&path).unwrap().to_extended_string(),
            "xprv9wTYmMFdV23N2TdNG573QoEsfRrWKQgWeibmLntzniatZvR9BmLnvSxqu53Kw1UmYPxLgboyZQaXwTCg8MSY3H2EU4pWcQDnRnrVA1xe8fs"
        );
    }

    #[test]
    fn test_extended_key_round_trip() {
        let key = master().derive_path(&KeyPath::parse("m/0/7").unwrap()).unwrap();
        let parsed: ExtendedPrivateKey = key.to_extended_string().parse().unwrap();
        assert_eq!(parsed.to_extended_string(), key.to_extended_string());
        assert_eq!(parsed.address(), key.address());
    }

    #[test]
    fn test_derivation_is_deterministic_and_path_sensitive() {
        let a = master().derive_path(&KeyPath::parse("m/0/1").unwrap()).unwrap();
        let b = master().derive_path(&KeyPath::parse("m/0/1").unwrap()).unwrap();
        let c = master().derive_path(&KeyPath::parse("m/0/2").unwrap()).unwrap();
        assert_eq!(a.address(), b.address());
        assert_ne!(a.address(), c.address());
    }

    #[test]
    fn test_address_round_trip_and_script() {
        let address = master().address();
        let text = address.to_string();
        assert!(text.starts_with('1'));
        let parsed: Address = text.parse().unwrap();
        assert_eq!(parsed, address);

        let script = address.locking_script();
        assert_eq!(script.len(), 25);
        assert_eq!(
            Address::from_locking_script(Network::Mainnet, &script),
            Some(address)
        );
    }

    #[test]
    fn test_testnet_versions() {
        let key =
            ExtendedPrivateKey::from_seed(Network::Testnet, &hex::decode(SEED).unwrap()).unwrap();
        assert!(key.to_extended_string().starts_with("tprv"));
        let text = key.address().to_string();
        assert!(text.starts_with('m') || text.starts_with('n'));
    }

    #[test]
    fn test_addresses_key_a_hash_set() {
        let seed = hex::decode(SEED).unwrap();
        let mainnet = ExtendedPrivateKey::from_seed(Network::Mainnet, &seed).unwrap();
        let testnet = ExtendedPrivateKey::from_seed(Network::Testnet, &seed).unwrap();

        let mut seen = std::collections::HashSet::new();
        assert!(seen.insert(mainnet.address()));
        assert!(seen.insert(testnet.address()));
        assert!(!seen.insert(master().address()));
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_debug_does_not_leak_secret() {
        let debug = format!("{:?}", master());
        assert!(!debug.contains("xprv"));
    }
}
