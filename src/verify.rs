use anyhow::{anyhow, Result};
use ed25519_dalek::VerifyingKey;

use crate::chain::{chain_head_of, verify_entry_signature};
use crate::report::{security_score, IntegrityReport};
use crate::ViolationKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReportCheck {
    pub violations: usize,
    pub tab_switches: u32,
    pub security_score: u8,
    pub chain_head: [u8; 32],
}

pub fn verifying_key_from_hex(hex_str: &str) -> Result<VerifyingKey> {
    let key_bytes = parse_hex_array::<32>(hex_str, "public key")?;
    VerifyingKey::from_bytes(&key_bytes).map_err(|e| anyhow!("invalid public key bytes: {}", e))
}

fn parse_hex_array<const N: usize>(hex_str: &str, what: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(hex_str.trim()).map_err(|e| anyhow!("invalid {} hex: {}", what, e))?;
    if bytes.len() != N {
        return Err(anyhow!(
            "invalid {} length: expected {} bytes, got {}",
            what,
            N,
            bytes.len()
        ));
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&bytes);
    Ok(out)
}

/// Check a report without trusting the runtime that produced it.
///
/// Recomputes the violation chain from the snapshot, the derived counter
/// and the score, then verifies the Ed25519 signature. When
/// `expected_key` is given the embedded session key must match it.
pub fn verify_report(
    report: &IntegrityReport,
    expected_key: Option<&VerifyingKey>,
) -> Result<ReportCheck> {
    let head = chain_head_of(&report.violations);
    let claimed_head = parse_hex_array::<32>(&report.chain_head, "chain head")?;
    if head != claimed_head {
        return Err(anyhow!(
            "integrity check failed: chain_head={}, recomputed={}",
            report.chain_head,
            hex::encode(head)
        ));
    }

    let tab_switches = report
        .violations
        .iter()
        .filter(|v| v.kind() == ViolationKind::TabSwitch)
        .count();
    if tab_switches != report.tab_switch_count as usize {
        return Err(anyhow!(
            "integrity check failed: tab_switch_count={} but log holds {} TabSwitch entries",
            report.tab_switch_count,
            tab_switches
        ));
    }

    let expected_score = security_score(report.violations.len());
    if report.security_score != expected_score {
        return Err(anyhow!(
            "integrity check failed: security_score={} but {} violations imply {}",
            report.security_score,
            report.violations.len(),
            expected_score
        ));
    }

    let embedded_key = verifying_key_from_hex(&report.session_public_key)?;
    if let Some(expected) = expected_key {
        if expected.as_bytes() != embedded_key.as_bytes() {
            return Err(anyhow!(
                "session public key mismatch: report={}, expected={}",
                report.session_public_key,
                hex::encode(expected.as_bytes())
            ));
        }
    }

    let signature = parse_hex_array::<64>(&report.signature, "signature")?;
    verify_entry_signature(&embedded_key, &report.digest(), &signature)
        .map_err(|e| anyhow!("report signature verification failed: {}", e))?;

    Ok(ReportCheck {
        violations: report.violations.len(),
        tab_switches: report.tab_switch_count,
        security_score: report.security_score,
        chain_head: head,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{reduce, MonitorEvent, SessionState};
    use crate::report::ReportBuilder;
    use crate::signal::{EventCategory, RawEvent};
    use crate::Policy;
    use chrono::Utc;
    use ed25519_dalek::SigningKey;

    fn sealed_report(key: &SigningKey) -> IntegrityReport {
        let policy = Policy::new("Econ 101").unwrap();
        let mut state = reduce(SessionState::new(), MonitorEvent::Activate, &policy).0;
        for category in [
            EventCategory::VisibilityChanged { hidden: true },
            EventCategory::ContextMenuRequested,
        ] {
            state = reduce(
                state,
                MonitorEvent::Raw(RawEvent {
                    category,
                    time: Utc::now(),
                }),
                &policy,
            )
            .0;
        }
        ReportBuilder::new(key).build(&state, &policy, Utc::now())
    }

    #[test]
    fn genuine_report_verifies() -> Result<()> {
        let key = SigningKey::from_bytes(&[8u8; 32]);
        let report = sealed_report(&key);
        let check = verify_report(&report, Some(&key.verifying_key()))?;
        assert_eq!(check.violations, 2);
        assert_eq!(check.tab_switches, 1);
        assert_eq!(check.security_score, 80);
        Ok(())
    }

    #[test]
    fn json_round_trip_still_verifies() -> Result<()> {
        let key = SigningKey::from_bytes(&[8u8; 32]);
        let json = serde_json::to_string(&sealed_report(&key))?;
        let parsed: IntegrityReport = serde_json::from_str(&json)?;
        verify_report(&parsed, None)?;
        Ok(())
    }

    #[test]
    fn dropped_violation_is_detected() {
        let key = SigningKey::from_bytes(&[8u8; 32]);
        let mut report = sealed_report(&key);
        report.violations.pop();
        assert!(verify_report(&report, None).is_err());
    }

    #[test]
    fn inflated_score_is_detected() {
        let key = SigningKey::from_bytes(&[8u8; 32]);
        let mut report = sealed_report(&key);
        report.security_score = 100;
        assert!(verify_report(&report, None).is_err());
    }

    #[test]
    fn resigned_with_other_key_is_rejected_when_pinned() {
        let key = SigningKey::from_bytes(&[8u8; 32]);
        let other = SigningKey::from_bytes(&[9u8; 32]);
        let report = sealed_report(&other);
        assert!(verify_report(&report, None).is_ok());
        assert!(verify_report(&report, Some(&key.verifying_key())).is_err());
    }

    #[test]
    fn edited_title_breaks_signature() {
        let key = SigningKey::from_bytes(&[8u8; 32]);
        let mut report = sealed_report(&key);
        report.test_title.push_str(" (retake)");
        assert!(verify_report(&report, None).is_err());
    }
}
