//! Integrity scoring and sealed report construction.

use chrono::{DateTime, SecondsFormat, Utc};
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Deserializer, Serialize};
use sha2::{Digest, Sha256};

use crate::chain::sign_entry;
use crate::monitor::SessionState;
use crate::{Policy, Violation, ViolationKind};

pub const MAX_SCORE: u8 = 100;
pub const PENALTY_PER_VIOLATION: usize = 10;

const REPORT_DOMAIN: &[u8] = b"proctor-kernel:report:v1";

/// `max(0, 100 - 10n)`.
pub fn security_score(violation_count: usize) -> u8 {
    let penalty = violation_count.saturating_mul(PENALTY_PER_VIOLATION);
    (MAX_SCORE as usize).saturating_sub(penalty) as u8
}

/// Final integrity report handed to the submission collaborator.
///
/// `violations` is an owned snapshot; nothing the monitor does afterwards
/// can change an issued report. Hashes, keys and the signature are hex.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct IntegrityReport {
    pub test_title: String,
    #[serde(deserialize_with = "deserialize_violations")]
    pub violations: Vec<Violation>,
    pub tab_switch_count: u32,
    pub submission_time: DateTime<Utc>,
    pub security_score: u8,
    pub chain_head: String,
    pub session_public_key: String,
    pub signature: String,
}

/// Violation as it appears in a serialized report.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ReportedViolation {
    kind: ViolationKind,
    timestamp: DateTime<Utc>,
    detail: String,
}

fn deserialize_violations<'de, D>(deserializer: D) -> Result<Vec<Violation>, D::Error>
where
    D: Deserializer<'de>,
{
    let reported = Vec::<ReportedViolation>::deserialize(deserializer)?;
    Ok(reported
        .into_iter()
        .map(|v| Violation::new(v.kind, v.timestamp, v.detail))
        .collect())
}

impl IntegrityReport {
    /// Digest covered by the signature.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(REPORT_DOMAIN);
        hasher.update((self.test_title.len() as u32).to_be_bytes());
        hasher.update(self.test_title.as_bytes());
        hasher.update(self.chain_head.as_bytes());
        hasher.update((self.violations.len() as u64).to_be_bytes());
        hasher.update(self.tab_switch_count.to_be_bytes());
        hasher.update([self.security_score]);
        hasher.update(
            self.submission_time
                .to_rfc3339_opts(SecondsFormat::AutoSi, true)
                .as_bytes(),
        );
        hasher.update(self.session_public_key.as_bytes());
        hasher.finalize().into()
    }
}

pub struct ReportBuilder<'a> {
    signing_key: &'a SigningKey,
}

impl<'a> ReportBuilder<'a> {
    pub fn new(signing_key: &'a SigningKey) -> Self {
        Self { signing_key }
    }

    pub fn build(
        &self,
        state: &SessionState,
        policy: &Policy,
        submission_time: DateTime<Utc>,
    ) -> IntegrityReport {
        let log = state.log();
        let mut report = IntegrityReport {
            test_title: policy.test_title.clone(),
            violations: log.snapshot(),
            tab_switch_count: state.tab_switch_count(),
            submission_time,
            security_score: security_score(log.len()),
            chain_head: hex::encode(log.head()),
            session_public_key: hex::encode(self.signing_key.verifying_key().to_bytes()),
            signature: String::new(),
        };
        let signature = sign_entry(self.signing_key, &report.digest());
        report.signature = hex::encode(signature);
        report
    }
}
