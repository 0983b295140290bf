//! log_queue.rs
//! Bounded in-memory window over the latest samples, spilling everything older to disk.
//! - `main` keeps the last `maxlen` records for inspection
//! - Records pushed out of `main` collect in the active sub-buffer
//! - A full sub-buffer is handed to the "log-writer" thread; the other buffer becomes active
//! - Only two sub-buffers exist: if the writer still holds one at swap time, `append` blocks
//!
//! Rows reach the sink in arrival order, each exactly once: swapped batches in
//! swap order, then on `close()` the active buffer followed by `main`.

use crate::{
    error::LogError,
    logging::sink::{CsvSink, RowSink},
    model::Record,
};
use crossbeam::channel::{Receiver, Sender, bounded};
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet, VecDeque},
    mem,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
};

/// Slack on each sub-buffer allocation so a push right before a swap never reallocates.
pub const TAIL_MARGIN: usize = 10;

/// Sub-buffer size for a given `maxlen`.
pub fn sub_capacity_for(maxlen: usize) -> usize {
    if maxlen < 1_000 {
        500
    } else if maxlen > 10_000 {
        1_000
    } else {
        (500.0 + 500.0 * (maxlen as f64 / 1_000.0).log10()).round() as usize
    }
}

type Batch = Vec<Arc<dyn Record>>;

/// Progress and health of the writer thread, shared with the queue.
#[derive(Debug, Default)]
struct WriterStatus {
    written: AtomicU64,
    failure: Mutex<Option<String>>,
}

impl WriterStatus {
    fn fail(&self, reason: String) {
        let mut failure = self.failure.lock();
        if failure.is_none() {
            error!("log writer failed: {}", reason);
            *failure = Some(reason);
        }
    }

    fn failure(&self) -> Option<String> {
        self.failure.lock().clone()
    }
}

/// Turns records into header-ordered rows. Owned by the writer thread.
struct RowWriter {
    sink: Box<dyn RowSink>,
    header: Option<Vec<String>>,
    index: HashMap<String, usize>,
    dropped: HashSet<String>,
}

impl RowWriter {
    fn new(sink: Box<dyn RowSink>) -> Self {
        Self {
            sink,
            header: None,
            index: HashMap::new(),
            dropped: HashSet::new(),
        }
    }

    /// The first record fixes the header for the whole file. If it has no
    /// columns (no link bound on the first tick), the header is empty and
    /// every later column is dropped.
    fn write(&mut self, record: &dyn Record) -> Result<(), LogError> {
        let columns = record.columns();
        if self.header.is_none() {
            let names: Vec<String> = columns.names().map(str::to_string).collect();
            if names.is_empty() {
                warn!(
                    "first '{}' record has no columns; the log header is empty",
                    record.model_name()
                );
            }
            self.sink.write_header(&names)?;
            self.index = names
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), i))
                .collect();
            debug!("log header fixed with {} columns", names.len());
            self.header = Some(names);
        }

        let mut cells = vec![String::new(); self.index.len()];
        for (name, value) in columns.iter() {
            match self.index.get(name) {
                Some(&i) => cells[i] = value.to_string(),
                None => {
                    if self.dropped.insert(name.to_string()) {
                        warn!("column '{}' is not in the log header; dropping it", name);
                    }
                }
            }
        }
        self.sink.write_row(&cells)
    }

    fn write_batch(&mut self, batch: &[Arc<dyn Record>]) -> Result<(), LogError> {
        for record in batch {
            self.write(record.as_ref())?;
        }
        self.sink.flush()
    }
}

fn writer_loop(
    batches: Receiver<Batch>,
    recycle: Sender<Batch>,
    mut writer: RowWriter,
    status: Arc<WriterStatus>,
) {
    for mut batch in batches.iter() {
        if let Err(e) = writer.write_batch(&batch) {
            status.fail(e.to_string());
            return;
        }
        status
            .written
            .fetch_add(batch.len() as u64, Ordering::Release);
        batch.clear();
        // at most two buffers exist, so the recycle slot is never full
        let _ = recycle.try_send(batch);
    }
    debug!(
        "log writer drained; {} rows written",
        status.written.load(Ordering::Acquire)
    );
}

struct QueueState {
    main: VecDeque<Arc<dyn Record>>,
    active: Batch,
    spare: Option<Batch>,
    closed: bool,
    to_writer: Option<Sender<Batch>>,
}

pub struct LogQueue {
    state: Mutex<QueueState>,
    recycled: Receiver<Batch>,
    status: Arc<WriterStatus>,
    worker: Mutex<Option<JoinHandle<()>>>,
    maxlen: usize,
    sub_capacity: usize,
    path: Option<PathBuf>,
}

impl LogQueue {
    /// Logs to a CSV file at `path` (created, parents included).
    pub fn create(path: impl Into<PathBuf>, maxlen: usize) -> Result<Self, LogError> {
        let path = path.into();
        let sink = CsvSink::create(&path)?;
        let mut queue = Self::with_sink(Box::new(sink), maxlen)?;
        info!("log queue writing to {:?} (maxlen {})", path, maxlen);
        queue.path = Some(path);
        Ok(queue)
    }

    pub fn with_sink(sink: Box<dyn RowSink>, maxlen: usize) -> Result<Self, LogError> {
        Self::with_sub_capacity(sink, maxlen, sub_capacity_for(maxlen))
    }

    pub fn with_sub_capacity(
        sink: Box<dyn RowSink>,
        maxlen: usize,
        sub_capacity: usize,
    ) -> Result<Self, LogError> {
        let sub_capacity = sub_capacity.max(1);
        let (to_writer, batches) = bounded::<Batch>(1);
        let (recycle, recycled) = bounded::<Batch>(2);
        let status = Arc::new(WriterStatus::default());

        let worker = {
            let status = Arc::clone(&status);
            let writer = RowWriter::new(sink);
            thread::Builder::new()
                .name("log-writer".into())
                .spawn(move || writer_loop(batches, recycle, writer, status))?
        };

        Ok(Self {
            state: Mutex::new(QueueState {
                main: VecDeque::with_capacity(maxlen.min(100_000) + 1),
                active: Vec::with_capacity(sub_capacity + TAIL_MARGIN),
                spare: Some(Vec::with_capacity(sub_capacity + TAIL_MARGIN)),
                closed: false,
                to_writer: Some(to_writer),
            }),
            recycled,
            status,
            worker: Mutex::new(Some(worker)),
            maxlen,
            sub_capacity,
            path: None,
        })
    }

    fn writer_gone(&self) -> LogError {
        LogError::WriterFailed(
            self.status
                .failure()
                .unwrap_or_else(|| "log writer stopped".to_string()),
        )
    }

    /// Accepts one record. Blocks while the writer still holds the previous
    /// batch at swap time; fails once the writer has failed or after `close`.
    pub fn append(&self, record: Arc<dyn Record>) -> Result<(), LogError> {
        if let Some(reason) = self.status.failure() {
            return Err(LogError::WriterFailed(reason));
        }

        let mut state = self.state.lock();
        if state.closed {
            return Err(LogError::Closed);
        }

        state.main.push_back(record);
        if state.main.len() > self.maxlen {
            if let Some(oldest) = state.main.pop_front() {
                state.active.push(oldest);
            }
        }

        if state.active.len() >= self.sub_capacity {
            let empty = match state.spare.take() {
                Some(buffer) => buffer,
                None => self.recycled.recv().map_err(|_| self.writer_gone())?,
            };
            let full = mem::replace(&mut state.active, empty);
            let sender = state.to_writer.as_ref().ok_or(LogError::Closed)?;
            sender.send(full).map_err(|_| self.writer_gone())?;
        }
        Ok(())
    }

    /// Hands every remaining record to the writer and waits for it to finish.
    /// Idempotent; returns the writer's failure, if any.
    pub fn close(&self) -> Result<(), LogError> {
        let worker = {
            let mut state = self.state.lock();
            if !state.closed {
                state.closed = true;
                let mut last = mem::take(&mut state.active);
                last.extend(state.main.iter().cloned());
                if let Some(sender) = state.to_writer.take() {
                    if !last.is_empty() && sender.send(last).is_err() {
                        warn!("log writer gone before the final batch");
                    }
                }
            }
            self.worker.lock().take()
        };

        if let Some(handle) = worker {
            if handle.join().is_err() {
                self.status.fail("log writer panicked".to_string());
            }
            info!("log queue closed; {} rows written", self.written());
        }

        match self.status.failure() {
            Some(reason) => Err(LogError::WriterFailed(reason)),
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Records currently held in `main`.
    pub fn len(&self) -> usize {
        self.state.lock().main.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// `index` 0 is the oldest record in `main`.
    pub fn get(&self, index: usize) -> Option<Arc<dyn Record>> {
        self.state.lock().main.get(index).cloned()
    }

    /// Contents of `main`, oldest first.
    pub fn snapshot(&self) -> Vec<Arc<dyn Record>> {
        self.state.lock().main.iter().cloned().collect()
    }

    /// Rows the writer has flushed to the sink, header excluded.
    pub fn written(&self) -> u64 {
        self.status.written.load(Ordering::Acquire)
    }

    pub fn failure(&self) -> Option<String> {
        self.status.failure()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn maxlen(&self) -> usize {
        self.maxlen
    }

    pub fn sub_capacity(&self) -> usize {
        self.sub_capacity
    }
}

impl Drop for LogQueue {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            error!("log queue dropped with error: {}", e);
        }
    }
}

impl std::fmt::Debug for LogQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogQueue")
            .field("path", &self.path)
            .field("maxlen", &self.maxlen)
            .field("sub_capacity", &self.sub_capacity)
            .field("written", &self.written())
            .finish()
    }
}
