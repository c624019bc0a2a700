use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::OutputConfig;
use crate::pool::OutputChunk;

/// Tracing target of captured build output lines.
pub const OUTPUT_TARGET: &str = "mpbuild::output";

/// Single consumer of the output stream. Writes every chunk to `writer` in
/// completion order unless quiet, and mirrors each line into tracing under
/// [`OUTPUT_TARGET`] at debug level when `log_output` is set.
pub struct ResultAggregator<W> {
    writer: W,
    quiet: bool,
    log_output: bool,
}

impl ResultAggregator<tokio::io::Stdout> {
    pub fn stdout(cfg: &OutputConfig) -> Self {
        Self::new(tokio::io::stdout(), cfg)
    }
}

impl<W> ResultAggregator<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(writer: W, cfg: &OutputConfig) -> Self {
        Self {
            writer,
            quiet: cfg.quiet,
            log_output: cfg.log_output,
        }
    }

    /// Drain until every sender is gone; hands the writer back.
    pub async fn drain(mut self, mut rx: mpsc::UnboundedReceiver<OutputChunk>) -> W {
        let mut chunks = 0usize;
        while let Some(chunk) = rx.recv().await {
            chunks += 1;
            if self.log_output {
                for line in chunk.text.lines() {
                    tracing::debug!(target: OUTPUT_TARGET, task_id = chunk.task_id, "{}: {}", chunk.label, line);
                }
            }
            if self.quiet {
                continue;
            }
            if let Err(e) = self.write_chunk(&chunk).await {
                tracing::warn!(error = %e, "output write failed; further output suppressed");
                self.quiet = true;
            }
        }
        tracing::trace!(chunks, "output stream drained");
        self.writer
    }

    pub fn spawn(self, rx: mpsc::UnboundedReceiver<OutputChunk>) -> JoinHandle<W> {
        tokio::spawn(self.drain(rx))
    }

    async fn write_chunk(&mut self, chunk: &OutputChunk) -> std::io::Result<()> {
        self.writer.write_all(chunk.text.as_bytes()).await?;
        if !chunk.text.ends_with('\n') {
            self.writer.write_all(b"\n").await?;
        }
        self.writer.flush().await
    }
}
