//! Interactive prompts shown before a run starts.

use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::{Context, Result, bail};

use harness::core::budget::TimeoutPolicy;

/// Parse a `--timeout` value: `5m`, `10m`, `none`, or a custom `<n>s` / `<n>m`.
pub fn parse_timeout(raw: &str) -> Result<TimeoutPolicy> {
    let value = raw.trim().to_ascii_lowercase();
    match value.as_str() {
        "5m" => return Ok(TimeoutPolicy::FiveMinutes),
        "10m" => return Ok(TimeoutPolicy::TenMinutes),
        "none" | "unbounded" => return Ok(TimeoutPolicy::Unbounded),
        _ => {}
    }
    let (digits, scale) = if let Some(digits) = value.strip_suffix('m') {
        (digits, 60)
    } else if let Some(digits) = value.strip_suffix('s') {
        (digits, 1)
    } else {
        bail!("invalid timeout {raw:?}: expected 5m, 10m, none, or <n>s/<n>m");
    };
    let amount: u64 = digits
        .parse()
        .with_context(|| format!("invalid timeout {raw:?}"))?;
    if amount == 0 {
        bail!("timeout must be greater than zero; use `none` for no limit");
    }
    let secs = amount
        .checked_mul(scale)
        .with_context(|| format!("timeout {raw:?} is too large"))?;
    Ok(TimeoutPolicy::Custom(Duration::from_secs(secs)))
}

/// Human label for a timeout policy.
pub fn describe_timeout(policy: TimeoutPolicy) -> String {
    match policy.as_secs() {
        None => "no timeout".to_string(),
        Some(secs) if secs % 60 == 0 => format!("{} minutes", secs / 60),
        Some(secs) => format!("{secs} seconds"),
    }
}

/// Ask a yes/no question. Anything but `y`/`yes` (including EOF) is no.
pub fn confirm<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> Result<bool> {
    write!(output, "{question} [y/N] ").context("write prompt")?;
    output.flush().context("flush prompt")?;
    let mut line = String::new();
    input.read_line(&mut line).context("read answer")?;
    Ok(matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Offer the timeout choices. An empty answer takes the 5 minute default.
pub fn select_timeout<R: BufRead, W: Write>(input: &mut R, output: &mut W) -> Result<TimeoutPolicy> {
    writeln!(output, "Per-invocation timeout:").context("write prompt")?;
    writeln!(output, "  1) 5 minutes (default)").context("write prompt")?;
    writeln!(output, "  2) 10 minutes").context("write prompt")?;
    writeln!(output, "  3) no timeout").context("write prompt")?;
    loop {
        write!(output, "Select [1-3]: ").context("write prompt")?;
        output.flush().context("flush prompt")?;
        let mut line = String::new();
        if input.read_line(&mut line).context("read answer")? == 0 {
            return Ok(TimeoutPolicy::default());
        }
        match line.trim() {
            "" | "1" => return Ok(TimeoutPolicy::FiveMinutes),
            "2" => return Ok(TimeoutPolicy::TenMinutes),
            "3" => return Ok(TimeoutPolicy::Unbounded),
            other => writeln!(output, "unrecognized choice {other:?}").context("write prompt")?,
        }
    }
}
