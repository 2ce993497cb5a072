//! Line-oriented replay of JSON actions into a store

use anyhow::{Context, Result};
use libconceal::state::SessionPhase;
use libconceal::{AppState, ConcealError, Store};
use serde_json::Value;
use std::io::BufRead;

/// One input line that could not be applied
#[derive(Debug)]
pub struct LineFailure {
    pub line: usize,
    pub message: String,
}

/// Outcome of replaying a whole stream
#[derive(Debug, Default)]
pub struct ReplayReport {
    pub applied: usize,
    pub failures: Vec<LineFailure>,
}

impl ReplayReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Parse one input line
///
/// Blank lines and lines starting with `#` yield `None`.
pub fn parse_line(line: &str) -> Option<std::result::Result<Value, serde_json::Error>> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    Some(serde_json::from_str(trimmed))
}

/// Dispatch every action in `input`, continuing past rejected lines
///
/// Input I/O errors and store failures other than a rejected action abort
/// the replay.
pub fn replay<R: BufRead>(store: &Store, input: R) -> Result<ReplayReport> {
    let mut report = ReplayReport::default();

    for (index, line) in input.lines().enumerate() {
        let number = index + 1;
        let line = line.with_context(|| format!("Failed to read input line {}", number))?;

        let value = match parse_line(&line) {
            None => continue,
            Some(Ok(value)) => value,
            Some(Err(e)) => {
                report.failures.push(LineFailure {
                    line: number,
                    message: format!("malformed JSON: {}", e),
                });
                continue;
            }
        };

        match store.dispatch_json(&value) {
            Ok(_) => report.applied += 1,
            Err(e) if e.is_rejected_action() => report.failures.push(LineFailure {
                line: number,
                message: e.to_string(),
            }),
            Err(e) => {
                let context = format!("Store failed at line {}", number);
                return Err(anyhow::Error::new(e).context(context));
            }
        }
    }

    tracing::info!(
        applied = report.applied,
        failed = report.failures.len(),
        "replay finished"
    );
    Ok(report)
}

/// Human-readable summary of a document
pub fn summarize(state: &AppState) -> String {
    let mut out = String::new();

    let session = match state.session() {
        SessionPhase::LoggedOut => "logged out".to_string(),
        SessionPhase::LoggedIn {
            user_loaded,
            wallets_loaded,
        } => format!(
            "logged in as {} (user {}, wallets {})",
            display_or_dash(&state.user.user_name),
            loaded(user_loaded),
            loaded(wallets_loaded)
        ),
    };
    out.push_str(&format!("session:    {}\n", session));
    out.push_str(&format!(
        "wallets:    {} (total balance {})\n",
        state.wallets.len(),
        state.total_balance()
    ));
    out.push_str(&format!("height:     {}\n", state.network.blockchain_height));
    out.push_str(&format!("intervals:  {}\n", state.intervals.len()));

    let prices: Vec<String> = state
        .prices
        .iter()
        .map(|(currency, price)| format!("{}={}", currency, price))
        .collect();
    out.push_str(&format!("prices:     {}\n", prices.join(" ")));

    for (id, market) in state.markets.iter() {
        out.push_str(&format!(
            "market:     {} ask={} bid={} volume={}\n",
            id, market.ask, market.bid, market.volume
        ));
    }

    if !state.layout.message.is_empty() {
        out.push_str(&format!("message:    {}\n", state.layout.message.text()));
    }

    out
}

fn loaded(flag: bool) -> &'static str {
    if flag {
        "loaded"
    } else {
        "pending"
    }
}

fn display_or_dash(value: &str) -> &str {
    if value.is_empty() {
        "-"
    } else {
        value
    }
}

/// Map an error to the process exit code
pub fn exit_code(error: &anyhow::Error) -> i32 {
    error
        .downcast_ref::<ConcealError>()
        .map(ConcealError::exit_code)
        .unwrap_or(1)
}
