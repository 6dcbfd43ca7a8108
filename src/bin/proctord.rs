//! proctord - run a proctored session from a platform signal script
//!
//! This binary:
//! 1. Loads the session policy (PROCTOR_CONFIG file + PROCTOR_* env overrides)
//! 2. Attaches a SessionMonitor to a SignalHub standing in for the platform
//! 3. Replays JSON-lines signal steps (file or stdin) through the hub
//! 4. Submits at end of input, on a scripted submit, or on Ctrl-C
//! 5. Emits the sealed integrity report as JSON

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::Parser;
use std::cell::RefCell;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use proctor_kernel::config::ProctorConfig;
use proctor_kernel::containment::{FullscreenControl, HeadlessDisplay, UnsupportedFullscreen};
use proctor_kernel::present::status_line;
use proctor_kernel::replay::{apply_step, parse_line};
use proctor_kernel::{
    generate_session_key, session_key_from_seed, IntegrityReport, Phase, SessionCollaborator,
    SessionMonitor, SignalHub, Violation,
};

#[derive(Parser, Debug)]
#[command(
    name = "proctord",
    about = "Replay a proctored test session and emit its sealed integrity report"
)]
struct Args {
    /// JSON-lines signal script ("-" reads stdin)
    #[arg(long, env = "PROCTORD_SCRIPT", default_value = "-", value_name = "PATH")]
    script: String,

    /// Write the report to this file instead of stdout
    #[arg(long, env = "PROCTORD_REPORT_OUT", value_name = "PATH")]
    out: Option<PathBuf>,

    /// Simulate a display that grants fullscreen requests
    #[arg(long, env = "PROCTORD_FULLSCREEN")]
    fullscreen: bool,

    /// Log the session status line after every step
    #[arg(short, long)]
    verbose: bool,
}

struct ReportSink {
    report: Rc<RefCell<Option<IntegrityReport>>>,
}

impl SessionCollaborator for ReportSink {
    fn on_test_submit(&mut self, report: IntegrityReport) {
        *self.report.borrow_mut() = Some(report);
    }

    fn on_security_violation(&mut self, violation: &Violation) {
        log::info!(
            "telemetry: {} at {}",
            violation.kind(),
            violation.timestamp().to_rfc3339()
        );
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let cfg = ProctorConfig::load()?;
    let policy = cfg.to_policy()?;
    let signing_key = match cfg.key_seed.as_deref() {
        Some(seed) => session_key_from_seed(seed)?,
        None => generate_session_key(),
    };
    log::info!(
        "session key: {}",
        hex::encode(signing_key.verifying_key().to_bytes())
    );

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let flag = Arc::clone(&interrupted);
        ctrlc::set_handler(move || {
            if flag.swap(true, Ordering::SeqCst) {
                std::process::exit(130);
            }
            eprintln!("interrupt received; submitting after the current step");
        })
        .context("failed to install Ctrl-C handler")?;
    }

    let hub = SignalHub::new();
    let display: Box<dyn FullscreenControl> = if args.fullscreen {
        Box::new(HeadlessDisplay::new(hub.clone()))
    } else {
        Box::new(UnsupportedFullscreen)
    };
    let report_slot = Rc::new(RefCell::new(None));
    let mut monitor = SessionMonitor::new(
        policy.clone(),
        hub,
        display,
        Box::new(ReportSink {
            report: Rc::clone(&report_slot),
        }),
        signing_key,
    );

    let reader: Box<dyn BufRead> = if args.script == "-" {
        Box::new(BufReader::new(std::io::stdin()))
    } else {
        let file = File::open(&args.script)
            .with_context(|| format!("failed to open script {}", args.script))?;
        Box::new(BufReader::new(file))
    };

    let start = Utc::now();
    let mut last_at = start;
    for (idx, line) in reader.lines().enumerate() {
        if interrupted.load(Ordering::SeqCst) {
            log::warn!("interrupted; stopping replay at line {}", idx + 1);
            break;
        }
        let line = line?;
        let Some(step) = parse_line(&line).map_err(|e| anyhow!("line {}: {}", idx + 1, e))?
        else {
            continue;
        };
        last_at = step.time_from(start);
        apply_step(&mut monitor, &step, start)?;
        if args.verbose {
            let remaining = policy
                .time_remaining_seconds
                .map(|limit| limit.saturating_sub(step.at_ms / 1000));
            log::info!("{}", status_line(&monitor.policy(), &monitor.state(), remaining));
        }
        if monitor.phase() == Phase::Closed {
            break;
        }
    }

    if monitor.phase() == Phase::Active {
        monitor.submit(last_at);
    }

    let Some(report) = report_slot.borrow_mut().take() else {
        return Err(anyhow!(
            "no report issued: session ended in phase {}",
            monitor.phase().as_str()
        ));
    };

    log::info!(
        "\"{}\": {} violation(s), {} tab switch(es), score {}",
        report.test_title,
        report.violations.len(),
        report.tab_switch_count,
        report.security_score
    );

    let json = serde_json::to_string_pretty(&report)?;
    match &args.out {
        Some(path) => {
            std::fs::write(path, json.as_bytes())
                .with_context(|| format!("failed to write report {}", path.display()))?;
            log::info!("report written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}
