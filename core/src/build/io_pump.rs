use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;

use crate::error::TaskError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStream {
    Stdout,
    Stderr,
}

impl LineStream {
    fn label(self) -> &'static str {
        match self {
            LineStream::Stdout => "stdout",
            LineStream::Stderr => "stderr",
        }
    }
}

/// Combined stdout/stderr capture of one build, line by line in arrival
/// order. Keeps the most recent lines within a byte budget (0 = unbounded).
#[derive(Debug, Default)]
pub struct CaptureBuffer {
    inner: Mutex<CaptureInner>,
    max_bytes: usize,
}

#[derive(Debug, Default)]
struct CaptureInner {
    lines: VecDeque<String>,
    bytes: usize,
    dropped_lines: u64,
}

impl CaptureBuffer {
    pub fn new(max_bytes: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(CaptureInner::default()),
            max_bytes,
        })
    }

    pub fn push_line(&self, line: String) {
        let mut g = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        g.bytes += line.len() + 1;
        g.lines.push_back(line);
        if self.max_bytes == 0 {
            return;
        }
        while g.bytes > self.max_bytes && g.lines.len() > 1 {
            if let Some(old) = g.lines.pop_front() {
                g.bytes -= old.len() + 1;
                g.dropped_lines += 1;
            }
        }
    }

    /// Captured text, one `\n`-terminated line per entry.
    pub fn contents(&self) -> String {
        let g = match self.inner.lock() {
            Ok(g) => g,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut out = String::with_capacity(g.bytes + 64);
        if g.dropped_lines > 0 {
            out.push_str(&format!("[... {} earlier lines dropped ...]\n", g.dropped_lines));
        }
        for line in &g.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// Read `rd` to EOF, splitting it into lines appended to `capture`.
/// Resolves to the number of bytes read.
pub fn pump<R>(
    mut rd: R,
    stream: LineStream,
    capture: Arc<CaptureBuffer>,
    task_id: usize,
) -> JoinHandle<Result<u64, TaskError>>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; 16 * 1024];
        let mut total = 0u64;
        let mut line_buf: Vec<u8> = Vec::with_capacity(8 * 1024);

        loop {
            let n = rd
                .read(&mut buf)
                .await
                .map_err(|e| TaskError::Io(format!("{} read failed: {e}", stream.label())))?;
            if n == 0 {
                break;
            }
            total += n as u64;

            line_buf.extend_from_slice(&buf[..n]);
            while let Some(pos) = line_buf.iter().position(|&b| b == b'\n') {
                let mut one = line_buf.drain(..=pos).collect::<Vec<u8>>();
                trim_newline(&mut one);
                emit(&capture, stream, task_id, &one);
            }
        }

        // EOF flush: deliver the last partial line if it doesn't end with '\n'.
        if !line_buf.is_empty() {
            trim_newline(&mut line_buf);
            emit(&capture, stream, task_id, &line_buf);
        }

        Ok(total)
    })
}

fn emit(capture: &CaptureBuffer, stream: LineStream, task_id: usize, raw: &[u8]) {
    let line = String::from_utf8_lossy(raw).to_string();
    tracing::trace!(task_id, stream = stream.label(), "{line}");
    capture.push_line(line);
}

fn trim_newline(buf: &mut Vec<u8>) {
    if buf.last() == Some(&b'\n') {
        buf.pop();
    }
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }
}
