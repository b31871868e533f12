//! SIGHASH_ALL|FORKID signing (BIP143 digest) for P2PKH inputs.

use super::{write_out_point, write_output, write_varint, Transaction, Utxo};
use crate::error::PipelineError;
use crate::hash::sha256d;
use crate::keys::ExtendedPrivateKey;
use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature, VerifyingKey};

pub const SIGHASH_ALL_FORKID: u32 = 0x41;

/// Digest signed for input `index`, which spends `utxo`.
pub fn sighash(tx: &Transaction, index: usize, utxo: &Utxo) -> Result<[u8; 32], PipelineError> {
    let input = tx.inputs.get(index).ok_or_else(|| {
        PipelineError::Key(format!(
            "input {} out of range ({} inputs)",
            index,
            tx.inputs.len()
        ))
    })?;

    let mut prevouts = Vec::with_capacity(tx.inputs.len() * 36);
    let mut sequences = Vec::with_capacity(tx.inputs.len() * 4);
    for i in &tx.inputs {
        write_out_point(&mut prevouts, &i.previous);
        sequences.extend_from_slice(&i.sequence.to_le_bytes());
    }
    let mut outputs = Vec::new();
    for o in &tx.outputs {
        write_output(&mut outputs, o);
    }

    let mut preimage = Vec::with_capacity(200 + utxo.locking_script.len());
    preimage.extend_from_slice(&tx.version.to_le_bytes());
    preimage.extend_from_slice(&sha256d(&prevouts));
    preimage.extend_from_slice(&sha256d(&sequences));
    write_out_point(&mut preimage, &input.previous);
    write_varint(&mut preimage, utxo.locking_script.len() as u64);
    preimage.extend_from_slice(&utxo.locking_script);
    preimage.extend_from_slice(&utxo.value.to_le_bytes());
    preimage.extend_from_slice(&input.sequence.to_le_bytes());
    preimage.extend_from_slice(&sha256d(&outputs));
    preimage.extend_from_slice(&tx.lock_time.to_le_bytes());
    preimage.extend_from_slice(&SIGHASH_ALL_FORKID.to_le_bytes());

    Ok(sha256d(&preimage))
}

/// Sign input `index` and set its unlocking script to `<sig> <pubkey>`.
pub fn sign_input(
    tx: &mut Transaction,
    index: usize,
    utxo: &Utxo,
    key: &ExtendedPrivateKey,
) -> Result<(), PipelineError> {
    let digest = sighash(tx, index, utxo)?;
    let signature: Signature = key
        .signing_key()
        .sign_prehash(&digest)
        .map_err(|e| PipelineError::Key(format!("signing failed: {}", e)))?;
    let signature = signature.normalize_s().unwrap_or(signature);

    let mut sig = signature.to_der().as_bytes().to_vec();
    sig.push(SIGHASH_ALL_FORKID as u8);
    let public = key.public_key();

    let mut script_sig = Vec::with_capacity(sig.len() + public.len() + 2);
    script_sig.push(sig.len() as u8);
    script_sig.extend_from_slice(&sig);
    script_sig.push(public.len() as u8);
    script_sig.extend_from_slice(&public);

    tx.inputs[index].script_sig = script_sig;
    Ok(())
}

/// Check a `<sig> <pubkey>` unlocking script against the P2PKH output it spends.
pub fn verify_input(tx: &Transaction, index: usize, utxo: &Utxo) -> Result<(), PipelineError> {
    let input = tx
        .inputs
        .get(index)
        .ok_or_else(|| PipelineError::Key(format!("input {} out of range", index)))?;
    let (sig, public) = split_script_sig(&input.script_sig)
        .ok_or_else(|| PipelineError::Key(format!("input {} has no P2PKH unlocking script", index)))?;

    let (der, hash_type) = sig
        .split_last()
        .map(|(t, der)| (der, *t))
        .ok_or_else(|| PipelineError::Key("empty signature".to_string()))?;
    if hash_type as u32 != SIGHASH_ALL_FORKID {
        return Err(PipelineError::Key(format!(
            "unsupported sighash type {:#04x}",
            hash_type
        )));
    }

    let expected_hash = crate::hash::hash160(public);
    if utxo.locking_script.len() != 25 || utxo.locking_script[3..23] != expected_hash {
        return Err(PipelineError::Key(format!(
            "input {} key does not match the spent output",
            index
        )));
    }

    let verifying_key = VerifyingKey::from_sec1_bytes(public)
        .map_err(|e| PipelineError::Key(format!("bad public key: {}", e)))?;
    let signature =
        Signature::from_der(der).map_err(|e| PipelineError::Key(format!("bad signature: {}", e)))?;
    let digest = sighash(tx, index, utxo)?;
    verifying_key
        .verify_prehash(&digest, &signature)
        .map_err(|_| PipelineError::Key(format!("input {} signature does not verify", index)))
}

fn split_script_sig(script: &[u8]) -> Option<(&[u8], &[u8])> {
    let (&sig_len, rest) = script.split_first()?;
    let sig_len = sig_len as usize;
    if sig_len == 0 || sig_len > 75 || rest.len() < sig_len + 1 {
        return None;
    }
    let (sig, rest) = rest.split_at(sig_len);
    let (&key_len, key) = rest.split_first()?;
    if key_len as usize != key.len() {
        return None;
    }
    Some((sig, key))
}
