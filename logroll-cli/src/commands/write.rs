//! `logroll write`: pump stdin into a rotating log file.

use std::io::Write as _;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use tokio::io::{AsyncBufReadExt, BufReader};

use logroll_writer::{RotateError, RotatingWriter};

use super::PolicyArgs;

/// Arguments for `logroll write`.
#[derive(Args, Debug)]
pub struct WriteArgs {
    #[command(flatten)]
    pub policy: PolicyArgs,

    /// Also copy every line to stdout.
    #[arg(long)]
    pub tee: bool,
}

impl WriteArgs {
    pub fn run(self) -> Result<()> {
        let config = self.policy.resolve()?;
        let writer = Arc::new(
            RotatingWriter::new(config).context("failed to set up rotating writer")?,
        );
        tracing::info!(path = %writer.path().display(), "writing stdin to log file");

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("failed to start tokio runtime")?;
        let result = runtime.block_on(pump(writer.clone(), self.tee));
        // A pending stdin read lives on a blocking thread; do not wait for it.
        runtime.shutdown_background();
        let lines = result?;

        writer.close().context("failed to close log file")?;
        tracing::info!(lines, "stdin closed; log file closed");
        Ok(())
    }
}

/// Copy stdin records into `writer` until EOF or Ctrl-C. SIGHUP rotates.
///
/// A record is everything up to and including a `\n`; bytes pass through
/// unchanged, whatever their encoding.
async fn pump(writer: Arc<RotatingWriter>, tee: bool) -> Result<u64> {
    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut hangup = Hangup::new()?;
    let mut record = Vec::new();
    let mut written = 0u64;

    loop {
        tokio::select! {
            read = stdin.read_until(b'\n', &mut record) => {
                if read.context("failed to read stdin")? == 0 {
                    break;
                }
                if tee {
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(&record).context("failed to write stdout")?;
                }
                match writer.write(&record) {
                    Ok(_) => written += 1,
                    Err(err @ RotateError::WriteTooLarge { .. }) => {
                        tracing::warn!(error = %err, "dropping oversized line");
                    }
                    Err(err) => return Err(err).context("failed to write log file"),
                }
                record.clear();
            }
            _ = hangup.recv() => {
                tracing::info!("received SIGHUP, rotating");
                writer.rotate().context("manual rotation failed")?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received ctrl-c, closing log file");
                break;
            }
        }
    }
    Ok(written)
}

/// SIGHUP listener; never fires off unix.
struct Hangup {
    #[cfg(unix)]
    signal: tokio::signal::unix::Signal,
}

impl Hangup {
    #[cfg(unix)]
    fn new() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        let signal = signal(SignalKind::hangup()).context("failed to install SIGHUP handler")?;
        Ok(Self { signal })
    }

    #[cfg(not(unix))]
    fn new() -> Result<Self> {
        Ok(Self {})
    }

    #[cfg(unix)]
    async fn recv(&mut self) {
        if self.signal.recv().await.is_none() {
            std::future::pending::<()>().await;
        }
    }

    #[cfg(not(unix))]
    async fn recv(&mut self) {
        std::future::pending::<()>().await
    }
}
