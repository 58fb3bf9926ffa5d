//! Row streaming for CSV, JSON, and XLSX sources
//!
//! All parsing happens on blocking threads; rows cross into the async
//! pipeline through a bounded channel, so at most one batch of raw rows
//! is buffered no matter how large the source is. Dropping the receiver
//! shuts the reader down.

use crate::error::{IngestError, IngestResult};
use crate::ingest::router::{IntakeStrategy, SourceFormat};
use crate::models::SourceRow;
use serde::de::{DeserializeSeed, Error as DeError, SeqAccess, Visitor};
use serde_json::Value;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Sentinel error message for an orderly reader shutdown
const RECEIVER_CLOSED: &str = "row channel closed";

/// One streamed row, or a per-row failure the pipeline counts and skips
#[derive(Debug)]
pub enum RowMessage {
    Row(SourceRow),
    Failed { offset: u64, reason: String },
}

/// An open source, headers resolved, rows flowing
pub struct RowStream {
    /// Header row, in file column order
    pub headers: Vec<String>,
    /// Total data rows, when the source knows it up front
    pub total_rows: Option<u64>,
    /// Bounded row channel
    pub rx: mpsc::Receiver<RowMessage>,
    /// Reader task; join after draining to observe source-level failures
    pub reader: JoinHandle<IngestResult<()>>,
    // Keeps a normalized temporary file alive for the stream's lifetime
    _normalized: Option<tempfile::NamedTempFile>,
}

/// Open `path` for row streaming under the selected strategy.
///
/// Returns once the header row is known. `start_offset` rows are parsed
/// and discarded before the first delivery (checkpoint resume).
pub async fn open_row_stream(
    path: &Path,
    format: SourceFormat,
    strategy: IntakeStrategy,
    start_offset: u64,
    channel_capacity: usize,
) -> IngestResult<RowStream> {
    let (tx, rx) = mpsc::channel(channel_capacity.max(1));
    let (meta_tx, meta_rx) = oneshot::channel();

    let mut normalized = None;
    let read_path;
    let read_format;

    match strategy {
        IntakeStrategy::ForcedRowWise => {
            // Normalize once on a blocking thread, then stream the result
            let source = path.to_path_buf();
            let tempfile = tokio::task::spawn_blocking(move || normalize_to_csv(&source, format))
                .await
                .map_err(|err| IngestError::SourceRead(format!("normalizer panicked: {}", err)))??;
            read_path = tempfile.path().to_path_buf();
            read_format = SourceFormat::Csv;
            normalized = Some(tempfile);
        }
        IntakeStrategy::Direct | IntakeStrategy::StreamingNative => {
            read_path = path.to_path_buf();
            read_format = format;
        }
    }

    let reader = tokio::task::spawn_blocking(move || match read_format {
        SourceFormat::Csv => read_csv(&read_path, start_offset, tx, meta_tx),
        SourceFormat::Json => match strategy {
            IntakeStrategy::Direct => read_json_direct(&read_path, start_offset, tx, meta_tx),
            _ => read_json_streaming(&read_path, start_offset, tx, meta_tx),
        },
        SourceFormat::Xlsx => read_xlsx(&read_path, start_offset, tx, meta_tx),
    });

    let (headers, total_rows) = match meta_rx.await {
        Ok(meta) => meta,
        Err(_) => {
            // Reader died before producing headers; surface its error
            let result = reader
                .await
                .map_err(|err| IngestError::SourceRead(format!("reader panicked: {}", err)))?;
            return Err(result.err().unwrap_or_else(|| {
                IngestError::SourceRead("source produced no header row".to_string())
            }));
        }
    };

    if headers.is_empty() {
        return Err(IngestError::SourceRead(
            "source has an empty header row".to_string(),
        ));
    }

    Ok(RowStream {
        headers,
        total_rows,
        rx,
        reader,
        _normalized: normalized,
    })
}

type MetaSender = oneshot::Sender<(Vec<String>, Option<u64>)>;

fn read_csv(
    path: &Path,
    start_offset: u64,
    tx: mpsc::Sender<RowMessage>,
    meta_tx: MetaSender,
) -> IngestResult<()> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|err| IngestError::SourceRead(format!("cannot open CSV: {}", err)))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|err| IngestError::SourceRead(format!("cannot read CSV header: {}", err)))?
        .iter()
        .map(str::to_string)
        .collect();

    if meta_tx.send((headers.clone(), None)).is_err() {
        return Ok(());
    }

    for (offset, record) in reader.records().enumerate() {
        let offset = offset as u64;
        if offset < start_offset {
            continue;
        }
        let message = match record {
            Ok(record) => RowMessage::Row(pair_with_headers(offset, &headers, record.iter())),
            Err(err) => RowMessage::Failed {
                offset,
                reason: format!("malformed CSV record: {}", err),
            },
        };
        if tx.blocking_send(message).is_err() {
            return Ok(());
        }
    }
    Ok(())
}

fn read_json_direct(
    path: &Path,
    start_offset: u64,
    tx: mpsc::Sender<RowMessage>,
    meta_tx: MetaSender,
) -> IngestResult<()> {
    let text = std::fs::read_to_string(path)?;
    let values: Vec<Value> = serde_json::from_str(&text)
        .map_err(|err| IngestError::SourceRead(format!("invalid JSON array: {}", err)))?;

    let headers = values
        .iter()
        .find_map(|value| value.as_object())
        .map(|obj| obj.keys().cloned().collect::<Vec<_>>())
        .ok_or_else(|| {
            IngestError::SourceRead("JSON array contains no objects".to_string())
        })?;

    if meta_tx
        .send((headers.clone(), Some(values.len() as u64)))
        .is_err()
    {
        return Ok(());
    }

    for (offset, value) in values.into_iter().enumerate() {
        let offset = offset as u64;
        if offset < start_offset {
            continue;
        }
        if tx.blocking_send(json_value_to_message(offset, &headers, value)).is_err() {
            return Ok(());
        }
    }
    Ok(())
}

fn read_json_streaming(
    path: &Path,
    start_offset: u64,
    tx: mpsc::Sender<RowMessage>,
    meta_tx: MetaSender,
) -> IngestResult<()> {
    let file = File::open(path)?;
    let mut deserializer = serde_json::Deserializer::from_reader(BufReader::new(file));

    let seed = JsonArraySeed {
        start_offset,
        tx,
        meta_tx: Some(meta_tx),
        headers: Vec::new(),
    };

    match seed.deserialize(&mut deserializer) {
        Ok(()) => {
            deserializer
                .end()
                .map_err(|err| IngestError::SourceRead(format!("trailing JSON content: {}", err)))?;
            Ok(())
        }
        // Receiver dropped mid-stream is an orderly shutdown
        Err(err) if err.to_string().contains(RECEIVER_CLOSED) => Ok(()),
        Err(err) => Err(IngestError::SourceRead(format!("invalid JSON array: {}", err))),
    }
}

/// Streaming visitor over a top-level JSON array of row objects
struct JsonArraySeed {
    start_offset: u64,
    tx: mpsc::Sender<RowMessage>,
    meta_tx: Option<MetaSender>,
    headers: Vec<String>,
}

impl<'de> DeserializeSeed<'de> for JsonArraySeed {
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> Result<(), D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for JsonArraySeed {
    type Value = ();

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("an array of row objects")
    }

    fn visit_seq<A>(mut self, mut seq: A) -> Result<(), A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut offset = 0u64;
        // Offsets of non-objects seen before the first object; they are
        // reported once the header row is known
        let mut pending_failures: Vec<u64> = Vec::new();
        while let Some(value) = seq.next_element::<Value>()? {
            if self.headers.is_empty() {
                if let Some(obj) = value.as_object() {
                    self.headers = obj.keys().cloned().collect();
                    if let Some(meta_tx) = self.meta_tx.take() {
                        if meta_tx.send((self.headers.clone(), None)).is_err() {
                            return Err(A::Error::custom(RECEIVER_CLOSED));
                        }
                    }
                    for failed_offset in pending_failures.drain(..) {
                        let message = RowMessage::Failed {
                            offset: failed_offset,
                            reason: "array element is not an object".to_string(),
                        };
                        if self.tx.blocking_send(message).is_err() {
                            return Err(A::Error::custom(RECEIVER_CLOSED));
                        }
                    }
                } else {
                    if offset >= self.start_offset {
                        pending_failures.push(offset);
                    }
                    offset += 1;
                    continue;
                }
            }
            if offset >= self.start_offset {
                let message = json_value_to_message(offset, &self.headers, value);
                if self.tx.blocking_send(message).is_err() {
                    // Drain nothing further; caller maps this to Ok
                    return Err(A::Error::custom(RECEIVER_CLOSED));
                }
            }
            offset += 1;
        }
        if self.headers.is_empty() {
            return Err(A::Error::custom("JSON array contains no objects"));
        }
        Ok(())
    }
}

fn read_xlsx(
    path: &Path,
    start_offset: u64,
    tx: mpsc::Sender<RowMessage>,
    meta_tx: MetaSender,
) -> IngestResult<()> {
    use calamine::Reader;

    let mut workbook = calamine::open_workbook_auto(path)
        .map_err(|err| IngestError::SourceRead(format!("cannot open workbook: {}", err)))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| IngestError::SourceRead("workbook has no sheets".to_string()))?
        .map_err(|err| IngestError::SourceRead(format!("cannot read sheet: {}", err)))?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .ok_or_else(|| IngestError::SourceRead("workbook sheet is empty".to_string()))?
        .iter()
        .map(cell_to_string)
        .collect();

    let total = range.height().saturating_sub(1) as u64;
    if meta_tx.send((headers.clone(), Some(total))).is_err() {
        return Ok(());
    }

    for (offset, row) in rows.enumerate() {
        let offset = offset as u64;
        if offset < start_offset {
            continue;
        }
        let row = pair_with_headers(offset, &headers, row.iter().map(cell_to_string));
        if tx.blocking_send(RowMessage::Row(row)).is_err() {
            return Ok(());
        }
    }
    Ok(())
}

/// Rewrite a source as a row-wise CSV temporary file
fn normalize_to_csv(path: &Path, format: SourceFormat) -> IngestResult<tempfile::NamedTempFile> {
    let tempfile = tempfile::NamedTempFile::new()?;
    let mut writer = csv::Writer::from_path(tempfile.path())
        .map_err(|err| IngestError::SourceRead(format!("cannot write temp CSV: {}", err)))?;

    match format {
        SourceFormat::Csv => {
            // Already row-wise; only reached when the caller forces it
            let mut reader = csv::ReaderBuilder::new()
                .flexible(true)
                .from_path(path)
                .map_err(|err| IngestError::SourceRead(format!("cannot open CSV: {}", err)))?;
            writer
                .write_record(reader.headers().map_err(|err| {
                    IngestError::SourceRead(format!("cannot read CSV header: {}", err))
                })?)
                .map_err(io_like)?;
            for record in reader.records() {
                let record = record
                    .map_err(|err| IngestError::SourceRead(format!("malformed CSV: {}", err)))?;
                writer.write_record(&record).map_err(io_like)?;
            }
        }
        SourceFormat::Json => {
            let file = File::open(path)?;
            let mut deserializer = serde_json::Deserializer::from_reader(BufReader::new(file));
            let seed = JsonToCsvSeed {
                writer: &mut writer,
                headers: Vec::new(),
            };
            seed.deserialize(&mut deserializer)
                .map_err(|err| IngestError::SourceRead(format!("invalid JSON array: {}", err)))?;
            deserializer
                .end()
                .map_err(|err| IngestError::SourceRead(format!("trailing JSON content: {}", err)))?;
        }
        SourceFormat::Xlsx => {
            use calamine::Reader;
            let mut workbook = calamine::open_workbook_auto(path)
                .map_err(|err| IngestError::SourceRead(format!("cannot open workbook: {}", err)))?;
            let range = workbook
                .worksheet_range_at(0)
                .ok_or_else(|| IngestError::SourceRead("workbook has no sheets".to_string()))?
                .map_err(|err| IngestError::SourceRead(format!("cannot read sheet: {}", err)))?;
            for row in range.rows() {
                let cells: Vec<String> = row.iter().map(cell_to_string).collect();
                writer.write_record(&cells).map_err(io_like)?;
            }
        }
    }

    writer.flush()?;
    drop(writer);
    Ok(tempfile)
}

/// Streaming JSON-to-CSV rewriter used by the forced row-wise strategy
struct JsonToCsvSeed<'a, W: std::io::Write> {
    writer: &'a mut csv::Writer<W>,
    headers: Vec<String>,
}

impl<'de, 'a, W: std::io::Write> DeserializeSeed<'de> for JsonToCsvSeed<'a, W> {
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> Result<(), D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_seq(self)
    }
}

impl<'de, 'a, W: std::io::Write> Visitor<'de> for JsonToCsvSeed<'a, W> {
    type Value = ();

    fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
        formatter.write_str("an array of row objects")
    }

    fn visit_seq<A>(mut self, mut seq: A) -> Result<(), A::Error>
    where
        A: SeqAccess<'de>,
    {
        while let Some(value) = seq.next_element::<Value>()? {
            let Some(obj) = value.as_object() else {
                continue;
            };
            if self.headers.is_empty() {
                self.headers = obj.keys().cloned().collect();
                self.writer
                    .write_record(&self.headers)
                    .map_err(A::Error::custom)?;
            }
            let cells: Vec<String> = self
                .headers
                .iter()
                .map(|key| obj.get(key).map(json_cell_to_string).unwrap_or_default())
                .collect();
            self.writer.write_record(&cells).map_err(A::Error::custom)?;
        }
        if self.headers.is_empty() {
            return Err(A::Error::custom("JSON array contains no objects"));
        }
        Ok(())
    }
}

fn json_value_to_message(offset: u64, headers: &[String], value: Value) -> RowMessage {
    let Some(obj) = value.as_object() else {
        return RowMessage::Failed {
            offset,
            reason: "array element is not an object".to_string(),
        };
    };
    let columns = headers
        .iter()
        .map(|key| {
            (
                key.clone(),
                obj.get(key).map(json_cell_to_string).unwrap_or_default(),
            )
        })
        .collect();
    RowMessage::Row(SourceRow::new(offset, columns))
}

/// Text form of one JSON cell; structured values keep their JSON form
fn json_cell_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn cell_to_string(cell: &calamine::Data) -> String {
    match cell {
        calamine::Data::Empty => String::new(),
        calamine::Data::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Pad or truncate a record to the header width and pair names with values
fn pair_with_headers<I, S>(offset: u64, headers: &[String], cells: I) -> SourceRow
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut values: Vec<String> = cells.into_iter().map(Into::into).collect();
    values.resize(headers.len(), String::new());
    let columns = headers
        .iter()
        .cloned()
        .zip(values.into_iter().take(headers.len()))
        .collect();
    SourceRow::new(offset, columns)
}

fn io_like(err: csv::Error) -> IngestError {
    IngestError::SourceRead(format!("temp CSV write failed: {}", err))
}
