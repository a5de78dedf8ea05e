//! The pipeline driver: sequences the stages of one job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::extract::TextExtractor;
use crate::generate::SectionGenerator;
use crate::intake::{self, probe_wav_file, AudioKind, JobWorkspace, SourceKind, StagedInput};
use crate::job::{Job, JobFailure, JobId, JobRegistry, JobResult, JobState};
use crate::metrics;
use crate::render::DocumentRenderer;
use crate::stage::{
    ErrorKind, ProgressSink, ProgressWindow, Reporter, StageError, StageKind, StageOutcome,
};
use crate::template::{resolve_sections, TemplateProvider};
use crate::transcribe::{AudioInput, TranscriptionChain};
use crate::upload::{sanitize_file_name, AuthContext, DocumentUploader, RemoteDocument};

use super::config::PipelineConfig;
use super::types::{JobInput, PipelineError};

/// Part of the upload window spent rendering before the upload starts.
const RENDER_WINDOW: ProgressWindow = ProgressWindow::fixed(0, 10);
const TRANSFER_WINDOW: ProgressWindow = ProgressWindow::fixed(10, 100);

/// Collaborators shared by every job.
#[derive(Clone)]
pub struct PipelineServices {
    pub extractor: Arc<dyn TextExtractor>,
    pub transcriber: Arc<TranscriptionChain>,
    pub generator: Arc<SectionGenerator>,
    pub templates: Arc<dyn TemplateProvider>,
    pub renderer: Arc<dyn DocumentRenderer>,
    pub uploader: Arc<dyn DocumentUploader>,
}

/// Forwards stage progress into the job registry.
struct RegistrySink {
    registry: Arc<JobRegistry>,
    job_id: JobId,
}

#[async_trait]
impl ProgressSink for RegistrySink {
    async fn publish(&self, percent: u8, message: String) {
        if let Err(e) = self
            .registry
            .update(&self.job_id, |job| job.advance(percent, message))
            .await
        {
            debug!(job_id = %self.job_id, error = %e, "Dropped progress update");
        }
    }
}

/// Runs jobs in the background and answers status queries.
///
/// Cloning is cheap; clones share the registry and services.
#[derive(Clone)]
pub struct PipelineDriver {
    config: Arc<PipelineConfig>,
    registry: Arc<JobRegistry>,
    services: PipelineServices,
}

impl PipelineDriver {
    pub fn new(
        config: PipelineConfig,
        registry: Arc<JobRegistry>,
        services: PipelineServices,
    ) -> Self {
        Self {
            config: Arc::new(config),
            registry,
            services,
        }
    }

    pub fn registry(&self) -> &Arc<JobRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Creates a job and starts processing it in the background.
    ///
    /// Returns as soon as the job exists. Input with an unsupported type is
    /// refused here and no job is created.
    pub async fn submit(&self, input: JobInput) -> Result<JobId, PipelineError> {
        let kind = SourceKind::detect(&input.file_name, input.content_type.as_deref())
            .map_err(PipelineError::Rejected)?;

        let job = self.registry.create().await;
        let job_id = job.id;
        metrics::JOBS_SUBMITTED.inc();
        info!(
            job_id = %job_id,
            file_name = %input.file_name,
            kind = %kind,
            "Job submitted"
        );

        let driver = self.clone();
        let span = info_span!("job", job_id = %job_id.short());
        let task = tokio::spawn(
            async move { driver.run(job_id, input, kind).await }.instrument(span.clone()),
        );
        let supervisor = self.clone();
        tokio::spawn(async move { supervisor.supervise(job_id, task).await }.instrument(span));

        Ok(job_id)
    }

    /// Waits for a job task and fails the job if the task died without
    /// recording an outcome. The job's workspace is removed in that case.
    async fn supervise(&self, job_id: JobId, task: JoinHandle<()>) {
        let Err(join_error) = task.await else {
            return;
        };
        let reason = if join_error.is_panic() {
            "job processing panicked"
        } else {
            "job processing was cancelled"
        };
        error!(job_id = %job_id, error = %join_error, "{}", reason);

        JobWorkspace::open(&self.config.temp_dir, &job_id).cleanup().await;

        let failure = JobFailure {
            code: ErrorKind::Internal,
            message: reason.to_string(),
        };
        let prior = self
            .registry
            .update(&job_id, |job| {
                let prior = job.state;
                job.fail(failure).map(|_| prior)
            })
            .await;
        match prior {
            Ok(prior) => {
                if prior == JobState::Processing {
                    metrics::JOBS_RUNNING.dec();
                }
                metrics::JOBS_FINISHED
                    .with_label_values(&["failed", ErrorKind::Internal.code()])
                    .inc();
            }
            Err(e) => debug!(job_id = %job_id, error = %e, "Job already finished"),
        }
    }

    /// Generated documents at the upload destination from `since` on,
    /// newest first.
    pub async fn recent_documents(
        &self,
        since: DateTime<Utc>,
        auth: &AuthContext,
    ) -> StageOutcome<Vec<RemoteDocument>> {
        self.services
            .uploader
            .list_recent(&self.config.output_prefix, since, auth)
            .await
    }

    /// Current snapshot of a job.
    pub async fn status(&self, job_id: &JobId) -> Result<Job, PipelineError> {
        Ok(self.registry.get(job_id).await?)
    }

    /// Drives one job to a terminal state. Cleanup runs on every path.
    pub async fn run(&self, job_id: JobId, input: JobInput, kind: SourceKind) {
        let started = Instant::now();
        if let Err(e) = self
            .registry
            .update(&job_id, |job| job.start("[upload] Preparing job"))
            .await
        {
            error!(job_id = %job_id, error = %e, "Failed to start job");
            return;
        }
        metrics::JOBS_RUNNING.inc();

        let outcome = match JobWorkspace::create(&self.config.temp_dir, &job_id).await {
            Ok(workspace) => {
                let outcome = self.execute(job_id, input, kind, &workspace).await;
                workspace.cleanup().await;
                outcome
            }
            Err(e) => Err(e),
        };

        let (label, code) = match &outcome {
            Ok(_) => ("completed", "none"),
            Err(e) => ("failed", e.kind().code()),
        };
        let finished = match outcome {
            Ok(result) => {
                info!(
                    job_id = %job_id,
                    remote_id = %result.remote_id,
                    tokens = result.stats.total_tokens(),
                    "Job completed"
                );
                self.registry
                    .update(&job_id, |job| job.complete(result, "[finalize] Completed"))
                    .await
            }
            Err(err) => {
                warn!(job_id = %job_id, code = err.kind().code(), error = %err, "Job failed");
                self.registry
                    .update(&job_id, |job| job.fail(JobFailure::from(&err)))
                    .await
            }
        };
        if let Err(e) = finished {
            error!(job_id = %job_id, error = %e, "Failed to record job outcome");
        }

        metrics::JOBS_RUNNING.dec();
        metrics::JOBS_FINISHED.with_label_values(&[label, code]).inc();
        metrics::JOB_DURATION
            .with_label_values(&[label])
            .observe(started.elapsed().as_secs_f64());
    }

    fn reporter(&self, job_id: JobId, stage: StageKind, window: ProgressWindow) -> Reporter {
        let sink = Arc::new(RegistrySink {
            registry: Arc::clone(&self.registry),
            job_id,
        });
        Reporter::new(sink, stage, window)
    }

    async fn execute(
        &self,
        job_id: JobId,
        input: JobInput,
        kind: SourceKind,
        workspace: &JobWorkspace,
    ) -> StageOutcome<JobResult> {
        let windows = self.config.windows;
        let JobInput {
            source,
            file_name,
            size_hint,
            sections: requested_sections,
            auth,
            ..
        } = input;

        let staged = timed(
            StageKind::Intake,
            intake::receive(
                source,
                workspace,
                &file_name,
                kind,
                self.config.max_input_bytes,
                size_hint,
                &self.reporter(job_id, StageKind::Intake, windows.intake),
            ),
        )
        .await?;

        let text = match kind {
            SourceKind::Document(doc_kind) => {
                let reporter = self.reporter(job_id, StageKind::Extract, windows.extract);
                timed(
                    StageKind::Extract,
                    self.services.extractor.extract(&staged.path, doc_kind, &reporter),
                )
                .await?
            }
            SourceKind::Audio(audio_kind) => {
                let reporter = self.reporter(job_id, StageKind::Transcribe, windows.extract);
                let audio = audio_input(&staged, audio_kind).await;
                timed(
                    StageKind::Transcribe,
                    self.services.transcriber.transcribe(&audio, &reporter),
                )
                .await?
            }
        };
        if text.trim().is_empty() {
            return Err(StageError::new(
                ErrorKind::ExtractionError,
                "could not extract content from the file",
            ));
        }
        debug!(job_id = %job_id, chars = text.len(), "Source text ready");

        let sections = resolve_sections(
            self.services.templates.as_ref(),
            auth.user_id.as_deref(),
            requested_sections,
        )
        .await;
        let generated = timed(
            StageKind::Generate,
            self.services.generator.generate(
                &text,
                &sections,
                &self.reporter(job_id, StageKind::Generate, windows.generate),
            ),
        )
        .await?;
        if generated.placeholder_count() > 0 {
            warn!(
                job_id = %job_id,
                missing = generated.placeholder_count(),
                "Some sections were not generated"
            );
        }

        let stem = source_stem(&file_name);
        let render_reporter = self
            .reporter(job_id, StageKind::Render, windows.upload)
            .child(RENDER_WINDOW);
        render_reporter.report(0, "Rendering document").await;
        let title = format!("{}: {}", self.config.output_prefix, stem);
        let document = timed(
            StageKind::Render,
            self.services.renderer.render(
                &title,
                &generated.sections,
                self.config.base_template.as_deref(),
            ),
        )
        .await?;
        render_reporter.report(100, "Document rendered").await;

        let destination = output_name(
            &self.config.output_prefix,
            &stem,
            &job_id,
            document.extension,
        );
        let receipt = timed(
            StageKind::Upload,
            self.services.uploader.upload(
                &document,
                &destination,
                &auth,
                &self
                    .reporter(job_id, StageKind::Upload, windows.upload)
                    .child(TRANSFER_WINDOW),
            ),
        )
        .await?;

        Ok(JobResult {
            remote_id: receipt.remote_id,
            link: receipt.link,
            destination,
            stats: generated.stats,
        })
    }
}

/// Records the duration and result of one stage.
async fn timed<T>(
    stage: StageKind,
    fut: impl Future<Output = StageOutcome<T>>,
) -> StageOutcome<T> {
    let started = Instant::now();
    let result = fut.await;
    let outcome = if result.is_ok() { "success" } else { "error" };
    metrics::STAGE_DURATION
        .with_label_values(&[stage.as_str(), outcome])
        .observe(started.elapsed().as_secs_f64());
    result
}

async fn audio_input(staged: &StagedInput, kind: AudioKind) -> AudioInput {
    let duration = if kind == AudioKind::Wav {
        match probe_wav_file(&staged.path).await {
            Ok(duration) => duration,
            Err(e) => {
                debug!(error = %e, "Could not probe WAV duration");
                None
            }
        }
    } else {
        None
    };
    AudioInput::from_staged(staged, kind, duration)
}

/// File stem of the submitted name, reduced to safe characters.
pub fn source_stem(file_name: &str) -> String {
    let stem = Path::new(file_name)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("document");
    sanitize_file_name(stem)
}

/// `<prefix>_<stem>_<8 hex>.<ext>`
pub fn output_name(prefix: &str, stem: &str, job_id: &JobId, extension: &str) -> String {
    format!("{}_{}_{}.{}", prefix, stem, job_id.short(), extension)
}
