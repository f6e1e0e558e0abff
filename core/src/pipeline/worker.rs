//! Render worker threads.
//!
//! Workers pull keys from a shared queue, rasterize them through the [`Document`], compress the
//! result and report back on a completion channel. They never look at the cache or the
//! in-flight tracker; the render system applies every outcome on its own completion thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, anyhow, ensure};
use flume::{Receiver, Sender};
use tracing::{debug, warn};

use crate::codec::{CompressedRender, Pixmap};
use crate::document::Document;
use crate::render::RenderKey;

use super::Result;

/// A key waiting for a worker.
#[derive(Debug, Clone)]
pub struct RenderJob {
    pub key: RenderKey,
}

/// Successful render: the cacheable compressed copy plus the pixels for immediate delivery.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub compressed: CompressedRender,
    pub pixmap: Arc<Pixmap>,
}

/// Report sent by a worker once a job is done. `rendered` is `None` when the job failed.
#[derive(Debug)]
pub struct JobOutcome {
    pub key: RenderKey,
    pub rendered: Option<RenderedPage>,
    pub elapsed: Duration,
}

/// Fixed set of threads executing render jobs in parallel.
#[derive(Debug)]
pub struct WorkerPool {
    jobs: Option<Sender<RenderJob>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `workers` threads reporting to `completions`.
    pub fn spawn(
        workers: usize,
        document: Arc<dyn Document>,
        compression_level: u32,
        completions: Sender<JobOutcome>,
    ) -> Result<Self> {
        let (jobs_tx, jobs_rx) = flume::unbounded::<RenderJob>();
        let mut handles = Vec::with_capacity(workers.max(1));

        for index in 0..workers.max(1) {
            let document = Arc::clone(&document);
            let jobs = jobs_rx.clone();
            let completions = completions.clone();
            let handle = thread::Builder::new()
                .name(format!("render-worker-{index}"))
                .spawn(move || run_worker(document.as_ref(), compression_level, jobs, completions))
                .with_context(|| format!("spawning render worker {index}"))?;
            handles.push(handle);
        }

        Ok(Self { jobs: Some(jobs_tx), handles })
    }

    pub fn workers(&self) -> usize {
        self.handles.len()
    }

    /// Jobs queued but not yet picked up by a worker.
    pub fn queued(&self) -> usize {
        self.jobs.as_ref().map_or(0, Sender::len)
    }

    /// Queue a render. Returns `false` once the pool is shut down.
    pub fn dispatch(&self, key: RenderKey) -> bool {
        match &self.jobs {
            Some(jobs) => jobs.send(RenderJob { key }).is_ok(),
            None => false,
        }
    }

    /// Stop accepting jobs and wait for the workers to drain the queue.
    pub fn shutdown(&mut self) {
        self.jobs.take();
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                warn!("render worker terminated by a panic");
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    document: &dyn Document,
    compression_level: u32,
    jobs: Receiver<RenderJob>,
    completions: Sender<JobOutcome>,
) {
    while let Ok(RenderJob { key }) = jobs.recv() {
        let started = Instant::now();
        let job = panic::catch_unwind(AssertUnwindSafe(|| {
            render_job(document, &key, compression_level)
        }));
        let rendered = match job {
            Ok(Ok(rendered)) => Some(rendered),
            Ok(Err(err)) => {
                warn!(%key, "render failed: {err:#}");
                None
            }
            Err(_) => {
                warn!(%key, "render job panicked");
                None
            }
        };
        let elapsed = started.elapsed();
        debug!(%key, ?elapsed, ok = rendered.is_some(), "render job finished");

        if completions.send(JobOutcome { key, rendered, elapsed }).is_err() {
            break;
        }
    }
}

/// Rasterize and compress a single key on the calling thread.
pub fn render_job(
    document: &dyn Document,
    key: &RenderKey,
    compression_level: u32,
) -> Result<RenderedPage> {
    ensure!(!key.is_null(), "refusing to render null key");
    let page = key.page().ok_or_else(|| anyhow!("render key has no page"))?;

    let pixmap = panic::catch_unwind(AssertUnwindSafe(|| document.render_page(page, key.size())))
        .map_err(|_| anyhow!("document backend panicked while rendering {key}"))?
        .with_context(|| format!("rendering {key}"))?;

    ensure!(
        pixmap.dimensions == key.size(),
        "backend produced {} pixels for {key}",
        pixmap.dimensions
    );

    let compressed = CompressedRender::compress(&pixmap, compression_level)
        .with_context(|| format!("compressing {key}"))?;

    Ok(RenderedPage { compressed, pixmap: Arc::new(pixmap) })
}
