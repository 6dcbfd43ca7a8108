//! report_verify - External verifier for sealed integrity reports
//!
//! This tool proves:
//! - The violation snapshot matches the report's chain head (nothing dropped, edited or reordered)
//! - tab_switch_count and security_score are consistent with the snapshot
//! - The report is signed by the session key (Ed25519)
//!
//! Integrity must be provable without trusting the client that ran the session.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::IsTerminal;

use proctor_kernel::verify::{verify_report, verifying_key_from_hex};
use proctor_kernel::IntegrityReport;

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(
    name = "report_verify",
    about = "Verify a sealed integrity report (hash chain + signature)"
)]
struct Args {
    /// Path to the report JSON
    #[arg(long, default_value = "report.json")]
    report: String,

    /// Expected session public key (hex-encoded Ed25519 verifying key)
    #[arg(long, value_name = "HEX", conflicts_with = "public_key_file")]
    public_key: Option<String>,

    /// Path to file containing the hex-encoded session public key
    #[arg(long, value_name = "PATH", conflicts_with = "public_key")]
    public_key_file: Option<String>,

    /// List every violation in the report
    #[arg(short, long)]
    verbose: bool,

    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: ui::UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let ui = ui::Ui::new(args.ui, std::io::stderr().is_terminal());

    let report: IntegrityReport = {
        let _stage = ui.stage("Load report");
        let raw = std::fs::read_to_string(&args.report)
            .map_err(|e| anyhow!("failed to read report {}: {}", args.report, e))?;
        serde_json::from_str(&raw).map_err(|e| anyhow!("invalid report {}: {}", args.report, e))?
    };

    let expected_key = {
        let _stage = ui.stage("Load verifying key");
        match (&args.public_key, &args.public_key_file) {
            (Some(hex), _) => Some(verifying_key_from_hex(hex)?),
            (None, Some(path)) => {
                let key_hex = std::fs::read_to_string(path)
                    .map_err(|e| anyhow!("failed to read public key file {}: {}", path, e))?;
                Some(verifying_key_from_hex(key_hex.trim())?)
            }
            (None, None) => {
                log::warn!("no expected key given; trusting the key embedded in the report");
                None
            }
        }
    };

    let check = {
        let mut stage = ui.stage("Verify chain + signature");
        let result = verify_report(&report, expected_key.as_ref());
        if result.is_err() {
            stage.fail();
        }
        result?
    };

    println!("report_verify: {}", args.report);
    println!("  test:          {}", report.test_title);
    println!("  submitted:     {}", report.submission_time.to_rfc3339());
    println!("  violations:    {}", check.violations);
    println!("  tab switches:  {}", check.tab_switches);
    println!("  score:         {}", check.security_score);
    println!("  chain head:    {}", hex::encode(check.chain_head));
    println!("  session key:   {}", report.session_public_key);

    if args.verbose {
        for (idx, violation) in report.violations.iter().enumerate() {
            println!(
                "  [{:>3}] {} {} - {}",
                idx + 1,
                violation.timestamp().to_rfc3339(),
                violation.kind(),
                violation.detail()
            );
        }
    }

    println!("OK");
    Ok(())
}
