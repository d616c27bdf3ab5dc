//! Parallel Encoding Pipeline
//!
//! Streams many records through the Bloom encoder: rows are chunked,
//! a pool of workers encodes chunks independently, and a gatherer on
//! the caller's thread reassembles the results in input order. The
//! schema and derived keys are the only shared state and both are
//! immutable once encoding starts.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use parking_lot::Mutex;

use crate::bloom::{encode_record, EncodedRecord, EncodingError};
use crate::crypto::{derive_key_lists, CryptoError, KeySet};
use crate::fields::FieldSpec;
use crate::schema::Schema;

/// Inputs up to this many rows use the small chunk size.
const SMALL_INPUT_ROWS: usize = 10_000;
const SMALL_CHUNK_SIZE: usize = 200;
const LARGE_CHUNK_SIZE: usize = 1_000;

/// The shape of the input data is wrong.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FormatError {
    #[error("row {row_index} has {actual} entries when {expected} are expected")]
    RowLength {
        row_index: usize,
        actual: usize,
        expected: usize,
    },

    #[error("header has {actual} columns when {expected} are expected")]
    HeaderLength { actual: usize, expected: usize },

    #[error("column {column} has identifier '{actual}' when '{expected}' is expected")]
    HeaderName {
        column: usize,
        actual: String,
        expected: String,
    },
}

/// Pipeline error types
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Encoding(#[from] EncodingError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("failed to build worker pool: {0}")]
    WorkerPool(String),
}

/// Options for [`encode_records`].
pub struct EncodeOptions<'a> {
    /// Worker count; defaults to the host parallelism.
    pub max_workers: Option<usize>,
    /// Run the per-field validators. When off, raw values go straight
    /// to the comparators.
    pub validate: bool,
    /// Column names to check against the schema before encoding.
    pub header: Option<&'a [String]>,
    /// Called from the gatherer with the record count of each finished
    /// chunk. Must not block indefinitely.
    pub progress: Option<Box<dyn FnMut(usize) + 'a>>,
}

impl Default for EncodeOptions<'_> {
    fn default() -> Self {
        Self {
            max_workers: None,
            validate: true,
            header: None,
            progress: None,
        }
    }
}

/// Check that every row has exactly one entry per schema field.
pub fn validate_row_lengths(
    fields: &[FieldSpec],
    rows: &[Vec<String>],
) -> Result<(), FormatError> {
    for (row_index, row) in rows.iter().enumerate() {
        if row.len() != fields.len() {
            return Err(FormatError::RowLength {
                row_index,
                actual: row.len(),
                expected: fields.len(),
            });
        }
    }
    Ok(())
}

/// Check the column names against the schema's field identifiers.
pub fn validate_header(fields: &[FieldSpec], column_names: &[String]) -> Result<(), FormatError> {
    if column_names.len() != fields.len() {
        return Err(FormatError::HeaderLength {
            actual: column_names.len(),
            expected: fields.len(),
        });
    }
    for (column, (field, name)) in fields.iter().zip(column_names).enumerate() {
        if field.identifier() != name {
            return Err(FormatError::HeaderName {
                column,
                actual: name.clone(),
                expected: field.identifier().to_string(),
            });
        }
    }
    Ok(())
}

enum WorkerMessage {
    Chunk {
        chunk_id: usize,
        records: Vec<EncodedRecord>,
    },
    Error(EncodingError),
    /// Terminal sentinel, one per worker.
    Done,
}

/// Heap entry ordered by chunk id alone.
struct OrderedChunk {
    chunk_id: usize,
    records: Vec<EncodedRecord>,
}

impl PartialEq for OrderedChunk {
    fn eq(&self, other: &Self) -> bool {
        self.chunk_id == other.chunk_id
    }
}

impl Eq for OrderedChunk {}

impl PartialOrd for OrderedChunk {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedChunk {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.chunk_id.cmp(&other.chunk_id)
    }
}

/// Encode all `rows` into CLKs, preserving input order.
///
/// Keys are derived once from `master_secrets` and the schema's KDF
/// configuration. The output index of each record equals its 0-based
/// position in `rows` for any worker count. The first encoding error
/// cancels the run: remaining chunks are drained unprocessed, workers
/// quiesce and the error is returned.
pub fn encode_records<S: AsRef<[u8]>>(
    rows: Vec<Vec<String>>,
    schema: &Schema,
    master_secrets: &[S],
    mut options: EncodeOptions<'_>,
) -> Result<Vec<EncodedRecord>, PipelineError> {
    if options.validate {
        if let Some(header) = options.header {
            validate_header(&schema.fields, header)?;
        }
        validate_row_lengths(&schema.fields, &rows)?;
    }

    let keys = derive_key_lists(master_secrets, schema.fields.len(), &schema.kdf)?;
    let total = rows.len();
    if total == 0 {
        return Ok(Vec::new());
    }
    log::info!("encoding {total} records");

    let chunk_size = if total <= SMALL_INPUT_ROWS {
        SMALL_CHUNK_SIZE
    } else {
        LARGE_CHUNK_SIZE
    };

    let mut chunks: VecDeque<(usize, Vec<Vec<String>>)> = VecDeque::new();
    let mut remaining = rows.into_iter();
    loop {
        let chunk: Vec<Vec<String>> = remaining.by_ref().take(chunk_size).collect();
        if chunk.is_empty() {
            break;
        }
        chunks.push_back((chunks.len(), chunk));
    }
    let num_chunks = chunks.len();

    let workers = options
        .max_workers
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
        .clamp(1, num_chunks);

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()
        .map_err(|e| PipelineError::WorkerPool(e.to_string()))?;

    let queue = Arc::new(Mutex::new(chunks));
    let cancelled = Arc::new(AtomicBool::new(false));
    let schema = Arc::new(schema.clone());
    let keys = Arc::new(keys);
    let (sender, receiver) = mpsc::channel::<WorkerMessage>();

    for _ in 0..workers {
        let queue = Arc::clone(&queue);
        let cancelled = Arc::clone(&cancelled);
        let schema = Arc::clone(&schema);
        let keys = Arc::clone(&keys);
        let sender = sender.clone();
        let validate = options.validate;
        pool.spawn(move || {
            worker_loop(queue, schema, keys, chunk_size, validate, cancelled, sender)
        });
    }
    // The gatherer terminates on the workers' sentinels, not on channel
    // disconnect, but dropping our sender keeps the accounting honest.
    drop(sender);

    let mut heap: BinaryHeap<Reverse<OrderedChunk>> = BinaryHeap::new();
    let mut next_expected = 0usize;
    let mut output: Vec<EncodedRecord> = Vec::with_capacity(total);
    let mut first_error: Option<EncodingError> = None;
    let mut finished_workers = 0usize;

    while finished_workers < workers {
        match receiver.recv() {
            Ok(WorkerMessage::Chunk { chunk_id, records }) => {
                if let Some(progress) = options.progress.as_mut() {
                    progress(records.len());
                }
                heap.push(Reverse(OrderedChunk { chunk_id, records }));
                // Flush every chunk that is next in line.
                while heap
                    .peek()
                    .is_some_and(|Reverse(chunk)| chunk.chunk_id == next_expected)
                {
                    if let Some(Reverse(chunk)) = heap.pop() {
                        output.extend(chunk.records);
                        next_expected += 1;
                    }
                }
            }
            Ok(WorkerMessage::Error(error)) => {
                first_error.get_or_insert(error);
            }
            Ok(WorkerMessage::Done) => finished_workers += 1,
            Err(_) => break,
        }
    }

    while let Some(Reverse(chunk)) = heap.pop() {
        output.extend(chunk.records);
    }

    match first_error {
        Some(error) => Err(error.into()),
        None => Ok(output),
    }
}

fn worker_loop(
    queue: Arc<Mutex<VecDeque<(usize, Vec<Vec<String>>)>>>,
    schema: Arc<Schema>,
    keys: Arc<KeySet>,
    chunk_size: usize,
    validate: bool,
    cancelled: Arc<AtomicBool>,
    sender: mpsc::Sender<WorkerMessage>,
) {
    loop {
        let job = queue.lock().pop_front();
        let Some((chunk_id, chunk)) = job else {
            break;
        };
        // After a failure the queue is only drained, not processed.
        if cancelled.load(Ordering::Relaxed) {
            continue;
        }
        log::debug!("encoding chunk {chunk_id} ({} records)", chunk.len());

        let base_index = chunk_id * chunk_size;
        let mut records = Vec::with_capacity(chunk.len());
        let mut completed = true;
        for (offset, row) in chunk.iter().enumerate() {
            match encode_record(row, base_index + offset, &schema, &keys, validate) {
                Ok(record) => records.push(record),
                Err(error) => {
                    cancelled.store(true, Ordering::Relaxed);
                    let _ = sender.send(WorkerMessage::Error(error));
                    completed = false;
                    break;
                }
            }
        }
        if completed {
            let _ = sender.send(WorkerMessage::Chunk { chunk_id, records });
        }
    }
    let _ = sender.send(WorkerMessage::Done);
}
