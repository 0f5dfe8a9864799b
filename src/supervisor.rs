//! Feeds the redirect service's output into the ingestor.
//!
//! The service is either spawned as a child process or, when no command is
//! given, its output is read from our stdin.

use std::process::Stdio;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use redirlog_logs::{LogIngestor, LogLevel, decode_line};

/// Read lines from `reader` until EOF, echoing every line the ingestor
/// does not handle to `writer` byte for byte.
///
/// Lines that are not UTF-8 are tried as GBK before a lossy decode.
///
/// Returns the number of lines read.
pub async fn pump_lines<R, W>(mut reader: R, mut writer: W, ingestor: &LogIngestor) -> std::io::Result<u64>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::new();
    let mut lines = 0u64;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }
        lines += 1;

        let line = decode_line(&buf);
        let text = line.trim_end_matches(['\n', '\r']);
        if !ingestor.observe_line(text) {
            writer.write_all(&buf).await?;
            writer.flush().await?;
        }
    }

    Ok(lines)
}

/// Run the line source until it ends or `cancel` fires.
///
/// With an empty `command` the source is stdin. Otherwise the command is
/// spawned and both of its output streams are pumped; the child is killed on
/// cancellation.
pub async fn run(command: Vec<String>, ingestor: LogIngestor, cancel: CancellationToken) -> Result<()> {
    let Some((program, args)) = command.split_first() else {
        return run_stdin(&ingestor, cancel).await;
    };

    let command_line = command.join(" ");
    let spawned = Command::new(program)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            ingestor.record(
                &format!("Failed to start redirect service: {}: {}", command_line, e),
                LogLevel::Error,
            );
            return Err(e).with_context(|| format!("failed to spawn '{}'", command_line));
        }
    };
    ingestor.record(
        &format!("Starting redirect service: {}", command_line),
        LogLevel::Success,
    );
    info!(command = %command_line, pid = ?child.id(), "redirect service started");

    let stdout = child.stdout.take().context("child stdout was not captured")?;
    let stderr = child.stderr.take().context("child stderr was not captured")?;

    let exchange = async {
        let (out, err) = tokio::join!(
            pump_lines(BufReader::new(stdout), tokio::io::stdout(), &ingestor),
            pump_lines(BufReader::new(stderr), tokio::io::stderr(), &ingestor),
        );
        if let Err(e) = out {
            warn!(error = %e, "reading service stdout failed");
        }
        if let Err(e) = err {
            warn!(error = %e, "reading service stderr failed");
        }
        child.wait().await
    };

    let outcome = tokio::select! {
        _ = cancel.cancelled() => None,
        status = exchange => Some(status),
    };

    let Some(status) = outcome else {
        if let Err(e) = child.kill().await {
            debug!(error = %e, "redirect service already gone");
        }
        info!("redirect service stopped");
        return Ok(());
    };

    let status = status.context("failed to wait for redirect service")?;
    let level = if status.success() {
        LogLevel::Info
    } else {
        LogLevel::Error
    };
    ingestor.record(&format!("Redirect service exited: {}", status), level);
    info!(%status, "redirect service exited");
    Ok(())
}

async fn run_stdin(ingestor: &LogIngestor, cancel: CancellationToken) -> Result<()> {
    debug!("reading service output from stdin");
    let reader = BufReader::new(tokio::io::stdin());

    tokio::select! {
        _ = cancel.cancelled() => Ok(()),
        lines = pump_lines(reader, tokio::io::stdout(), ingestor) => {
            let lines = lines.context("failed to read stdin")?;
            info!(lines, "stdin closed");
            Ok(())
        }
    }
}
