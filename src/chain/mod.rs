use anyhow::{anyhow, Result};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::{Violation, ViolationKind};

/// Chain head before the first entry.
pub const GENESIS_HASH: [u8; 32] = [0u8; 32];

/// Hashes a log entry payload with the previous chain hash.
pub fn hash_entry(prev_hash: &[u8; 32], payload: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(prev_hash);
    hasher.update(payload);
    hasher.finalize().into()
}

/// Signs a digest using Ed25519.
pub fn sign_entry(signing_key: &SigningKey, entry_hash: &[u8; 32]) -> [u8; 64] {
    signing_key.sign(entry_hash).to_bytes()
}

/// Verifies a signature against its digest.
pub fn verify_entry_signature(
    verifying_key: &VerifyingKey,
    entry_hash: &[u8; 32],
    signature: &[u8; 64],
) -> Result<()> {
    let sig = ed25519_dalek::Signature::from_bytes(signature);
    verifying_key
        .verify(entry_hash, &sig)
        .map_err(|e| anyhow!("signature verification failed: {}", e))
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct ChainedViolation {
    pub violation: Violation,
    pub prev_hash: [u8; 32],
    pub entry_hash: [u8; 32],
}

/// Append-only, hash-chained violation log.
///
/// Insertion order is chronological order. Identical violations are kept
/// as distinct entries. There is no removal or reordering API.
#[derive(Clone, Debug, Default)]
pub struct ViolationLog {
    entries: Vec<ChainedViolation>,
}

impl ViolationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, violation: Violation) -> &ChainedViolation {
        let prev_hash = self.head();
        let entry_hash = hash_entry(&prev_hash, &violation.canonical_bytes());
        self.entries.push(ChainedViolation {
            violation,
            prev_hash,
            entry_hash,
        });
        &self.entries[self.entries.len() - 1]
    }

    pub fn head(&self) -> [u8; 32] {
        self.entries
            .last()
            .map(|entry| entry.entry_hash)
            .unwrap_or(GENESIS_HASH)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ChainedViolation] {
        &self.entries
    }

    pub fn violations(&self) -> impl Iterator<Item = &Violation> {
        self.entries.iter().map(|entry| &entry.violation)
    }

    pub fn count_kind(&self, kind: ViolationKind) -> usize {
        self.violations().filter(|v| v.kind() == kind).count()
    }

    /// Owned copy of the violations, detached from this log.
    pub fn snapshot(&self) -> Vec<Violation> {
        self.violations().cloned().collect()
    }
}

/// Recompute the chain over `violations` and return its head.
pub fn chain_head_of<'a>(violations: impl IntoIterator<Item = &'a Violation>) -> [u8; 32] {
    violations.into_iter().fold(GENESIS_HASH, |prev, v| {
        hash_entry(&prev, &v.canonical_bytes())
    })
}

/// Walk stored entries and check every link. Returns the head on success.
pub fn verify_chain(entries: &[ChainedViolation]) -> Result<[u8; 32]> {
    let mut expected_prev = GENESIS_HASH;
    for (idx, entry) in entries.iter().enumerate() {
        if entry.prev_hash != expected_prev {
            return Err(anyhow!(
                "integrity check failed at entry {}: prev_hash={}, expected_prev={}",
                idx,
                hex::encode(entry.prev_hash),
                hex::encode(expected_prev)
            ));
        }
        let computed = hash_entry(&expected_prev, &entry.violation.canonical_bytes());
        if computed != entry.entry_hash {
            return Err(anyhow!(
                "integrity check failed at entry {}: entry_hash mismatch",
                idx
            ));
        }
        expected_prev = computed;
    }
    Ok(expected_prev)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn violation(kind: ViolationKind, secs: i64, detail: &str) -> Violation {
        let ts = Utc.timestamp_opt(1_780_000_000 + secs, 0).unwrap();
        Violation::new(kind, ts, detail.to_string())
    }

    #[test]
    fn hash_entry_is_deterministic() {
        let prev = [1u8; 32];
        assert_eq!(hash_entry(&prev, b"payload"), hash_entry(&prev, b"payload"));
        assert_ne!(hash_entry(&prev, b"payload"), hash_entry(&[2u8; 32], b"payload"));
    }

    #[test]
    fn append_links_entries_and_keeps_duplicates() -> Result<()> {
        let mut log = ViolationLog::new();
        assert_eq!(log.head(), GENESIS_HASH);

        let dup = violation(ViolationKind::ContextMenu, 0, "right click");
        log.append(dup.clone());
        log.append(dup.clone());
        log.append(violation(ViolationKind::TabSwitch, 4, "hidden"));

        assert_eq!(log.len(), 3);
        assert_eq!(log.count_kind(ViolationKind::ContextMenu), 2);
        assert_eq!(log.entries()[1].prev_hash, log.entries()[0].entry_hash);
        assert_ne!(log.entries()[0].entry_hash, log.entries()[1].entry_hash);

        assert_eq!(verify_chain(log.entries())?, log.head());
        assert_eq!(chain_head_of(log.violations()), log.head());
        Ok(())
    }

    #[test]
    fn tampered_entry_is_detected() {
        let mut log = ViolationLog::new();
        log.append(violation(ViolationKind::TabSwitch, 0, "hidden"));
        log.append(violation(ViolationKind::ContextMenu, 1, "right click"));

        let mut entries = log.entries().to_vec();
        entries[0].violation = violation(ViolationKind::TabSwitch, 0, "edited");
        assert!(verify_chain(&entries).is_err());

        let mut reordered = log.entries().to_vec();
        reordered.swap(0, 1);
        assert!(verify_chain(&reordered).is_err());
    }

    #[test]
    fn signature_round_trip_rejects_other_digest() {
        let key = SigningKey::from_bytes(&[9u8; 32]);
        let digest = [3u8; 32];
        let sig = sign_entry(&key, &digest);
        assert!(verify_entry_signature(&key.verifying_key(), &digest, &sig).is_ok());
        assert!(verify_entry_signature(&key.verifying_key(), &[4u8; 32], &sig).is_err());
    }

    #[test]
    fn snapshot_is_independent_of_later_appends() {
        let mut log = ViolationLog::new();
        log.append(violation(ViolationKind::TabSwitch, 0, "hidden"));
        let snap = log.snapshot();
        log.append(violation(ViolationKind::TabSwitch, 1, "hidden"));
        assert_eq!(snap.len(), 1);
        assert_eq!(log.len(), 2);
    }
}
