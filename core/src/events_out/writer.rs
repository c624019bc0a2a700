use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::EventsOutConfig;

#[derive(Clone)]
pub struct EventsOutTx {
    tx: mpsc::Sender<String>,
    dropped: Arc<AtomicU64>,
    drop_when_full: bool,
}

impl EventsOutTx {
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub async fn send_line(&self, line: String) {
        if self.drop_when_full {
            if self.tx.try_send(line).is_err() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        } else if self.tx.send(line).await.is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Running events writer. [`EventsOut::finish`] flushes what was queued.
pub struct EventsOut {
    tx: EventsOutTx,
    handle: JoinHandle<()>,
}

impl EventsOut {
    pub fn tx(&self) -> &EventsOutTx {
        &self.tx
    }

    pub async fn finish(self) {
        let dropped = self.tx.dropped_count();
        drop(self.tx);
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "events writer panicked");
        }
        if dropped > 0 {
            tracing::warn!(dropped, "events_out dropped lines");
        }
    }
}

/// Open the configured destination and start the writer task. Returns
/// `Ok(None)` when the side channel is disabled.
pub async fn start_events_out(cfg: &EventsOutConfig) -> std::io::Result<Option<EventsOut>> {
    if !cfg.enabled || cfg.path.trim().is_empty() {
        return Ok(None);
    }

    let mut writer: Box<dyn tokio::io::AsyncWrite + Unpin + Send> = if cfg.path == "stdout:" {
        Box::new(tokio::io::stdout())
    } else {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&cfg.path)
            .await?;
        Box::new(file)
    };

    let (tx, mut rx) = mpsc::channel::<String>(cfg.channel_capacity.max(1));
    let path = cfg.path.clone();

    let handle = tokio::spawn(async move {
        while let Some(mut line) = rx.recv().await {
            if !line.ends_with('\n') {
                line.push('\n');
            }
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                tracing::warn!(path = %path, error = %e, "events_out write failed");
                return;
            }
        }
        if let Err(e) = writer.flush().await {
            tracing::warn!(path = %path, error = %e, "events_out flush failed");
        }
    });

    Ok(Some(EventsOut {
        tx: EventsOutTx {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
            drop_when_full: cfg.drop_when_full,
        },
        handle,
    }))
}
