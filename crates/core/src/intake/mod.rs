//! Intake: moving a submitted file into job-local storage.

mod kind;
mod probe;

pub use kind::{AudioKind, DocumentKind, SourceKind};
pub use probe::{probe_wav_file, wav_duration};

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

use crate::job::JobId;
use crate::metrics;
use crate::stage::{ErrorKind, Reporter, StageError, StageOutcome};

/// Chunked body of a submission.
pub type ByteStream = BoxStream<'static, Result<Bytes, io::Error>>;

const COPY_BUFFER_SIZE: usize = 64 * 1024;

/// Where a job's input bytes come from.
pub enum JobSource {
    /// Bytes still arriving, e.g. a request body.
    Stream(ByteStream),
    /// A file already on local disk. It is copied, never moved.
    File(PathBuf),
}

impl std::fmt::Debug for JobSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobSource::Stream(_) => f.write_str("JobSource::Stream"),
            JobSource::File(path) => f.debug_tuple("JobSource::File").field(path).finish(),
        }
    }
}

impl JobSource {
    /// Stream over an in-memory buffer.
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        JobSource::Stream(futures::stream::once(async move { Ok(bytes) }).boxed())
    }
}

/// Input file after intake.
#[derive(Debug, Clone)]
pub struct StagedInput {
    pub path: PathBuf,
    /// Name the file was submitted under.
    pub file_name: String,
    pub kind: SourceKind,
    pub size_bytes: u64,
}

/// Job-local temp directory, removed by [`JobWorkspace::cleanup`].
#[derive(Debug)]
pub struct JobWorkspace {
    dir: PathBuf,
}

impl JobWorkspace {
    pub async fn create(root: &Path, job_id: &JobId) -> StageOutcome<Self> {
        let workspace = Self::open(root, job_id);
        tokio::fs::create_dir_all(&workspace.dir).await.map_err(|e| {
            StageError::fatal(
                ErrorKind::Internal,
                format!("failed to create {}: {}", workspace.dir.display(), e),
            )
        })?;
        Ok(workspace)
    }

    /// The workspace `create` would make for `job_id`, without touching disk.
    pub fn open(root: &Path, job_id: &JobId) -> Self {
        Self {
            dir: root.join(format!("job-{}", job_id)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Removes the directory and everything in it. Failures are logged.
    pub async fn cleanup(&self) {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => debug!(dir = %self.dir.display(), "Removed job workspace"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                metrics::CLEANUP_FAILURES.with_label_values(&["temp_dir"]).inc();
                warn!(dir = %self.dir.display(), error = %e, "Failed to remove job workspace");
            }
        }
    }
}

/// Writes the submission into `workspace`, enforcing `max_bytes`.
///
/// Exceeding the cap aborts the copy and removes the partial file. An empty
/// submission is rejected, since nothing can be extracted from it.
pub async fn receive(
    source: JobSource,
    workspace: &JobWorkspace,
    file_name: &str,
    kind: SourceKind,
    max_bytes: u64,
    size_hint: Option<u64>,
    reporter: &Reporter,
) -> StageOutcome<StagedInput> {
    let path = workspace.dir().join(format!("source.{}", kind.extension()));
    reporter.report(0, format!("Receiving {}", file_name)).await;

    let result = write_capped(source, &path, max_bytes, size_hint, reporter).await;
    let size_bytes = match result {
        Ok(n) => n,
        Err(err) => {
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to remove partial input");
                }
            }
            return Err(err);
        }
    };

    if size_bytes == 0 {
        return Err(StageError::new(
            ErrorKind::ExtractionError,
            "could not extract content: the file is empty",
        ));
    }

    reporter
        .report(100, format!("Received {} ({} bytes)", file_name, size_bytes))
        .await;
    Ok(StagedInput {
        path,
        file_name: file_name.to_string(),
        kind,
        size_bytes,
    })
}

fn too_large(max_bytes: u64) -> StageError {
    StageError::new(
        ErrorKind::SizeExceeded,
        format!("file exceeds the maximum size of {} bytes", max_bytes),
    )
}

fn io_failure(path: &Path, e: io::Error) -> StageError {
    StageError::fatal(
        ErrorKind::Internal,
        format!("failed writing {}: {}", path.display(), e),
    )
}

async fn write_capped(
    source: JobSource,
    path: &Path,
    max_bytes: u64,
    size_hint: Option<u64>,
    reporter: &Reporter,
) -> StageOutcome<u64> {
    if size_hint.is_some_and(|n| n > max_bytes) {
        return Err(too_large(max_bytes));
    }

    let file = File::create(path).await.map_err(|e| io_failure(path, e))?;
    let mut writer = BufWriter::with_capacity(COPY_BUFFER_SIZE, file);
    let mut written: u64 = 0;
    let mut last_percent = 0u8;

    match source {
        JobSource::Stream(mut stream) => {
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(|e| {
                    StageError::fatal(ErrorKind::Internal, format!("failed reading upload: {}", e))
                })?;
                written += chunk.len() as u64;
                if written > max_bytes {
                    return Err(too_large(max_bytes));
                }
                writer.write_all(&chunk).await.map_err(|e| io_failure(path, e))?;
                last_percent = report_copy(reporter, written, size_hint, last_percent).await;
            }
        }
        JobSource::File(source_path) => {
            let mut reader = File::open(&source_path).await.map_err(|e| {
                StageError::fatal(
                    ErrorKind::Internal,
                    format!("failed to open {}: {}", source_path.display(), e),
                )
            })?;
            let total = reader.metadata().await.ok().map(|m| m.len()).or(size_hint);
            let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
            loop {
                let n = reader
                    .read(&mut buffer)
                    .await
                    .map_err(|e| io_failure(&source_path, e))?;
                if n == 0 {
                    break;
                }
                written += n as u64;
                if written > max_bytes {
                    return Err(too_large(max_bytes));
                }
                writer
                    .write_all(&buffer[..n])
                    .await
                    .map_err(|e| io_failure(path, e))?;
                last_percent = report_copy(reporter, written, total, last_percent).await;
            }
        }
    }

    writer.flush().await.map_err(|e| io_failure(path, e))?;
    Ok(written)
}

async fn report_copy(reporter: &Reporter, written: u64, total: Option<u64>, last: u8) -> u8 {
    let Some(total) = total.filter(|t| *t > 0) else {
        return last;
    };
    let percent = ((written.min(total) * 99) / total) as u8;
    if percent >= last + 10 {
        reporter
            .report(percent, format!("Received {} of {} bytes", written, total))
            .await;
        percent
    } else {
        last
    }
}
