//! Simulated chapter-detection pipeline.
//!
//! There is no detector behind this: a queued video walks through a fixed
//! list of steps on a timer so the client has something to poll. The upload
//! service only sees the `ChapterDetectionQueue` contract.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, ensure};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;

use crate::metadata::MetadataStore;
use crate::models::AiProcessingStatus;

/// Fire-and-forget hand-off of a video id for chapter detection. No
/// acknowledgement is expected.
pub trait ChapterDetectionQueue: Send + Sync {
    fn submit(&self, video_id: &str);
}

/// Where pipeline transitions get mirrored, typically the video row.
#[async_trait]
pub trait AiStatusSink: Send + Sync {
    async fn set_ai_status(&self, video_id: &str, status: AiProcessingStatus) -> Result<()>;
}

#[async_trait]
impl AiStatusSink for MetadataStore {
    async fn set_ai_status(&self, video_id: &str, status: AiProcessingStatus) -> Result<()> {
        self.set_ai_processing_status(video_id, status).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingStep {
    pub title: &'static str,
    pub description: &'static str,
}

pub const PROCESSING_STEPS: [ProcessingStep; 4] = [
    ProcessingStep {
        title: "Analyzing video content",
        description: "Scanning your video for key moments",
    },
    ProcessingStep {
        title: "Detecting scene changes",
        description: "Finding natural break points",
    },
    ProcessingStep {
        title: "AI chapter generation",
        description: "Creating intelligent chapters",
    },
    ProcessingStep {
        title: "Finalizing timeline",
        description: "Polishing your chapters",
    },
];

#[derive(Debug, Clone, Copy)]
pub struct PipelineTiming {
    pub tick: Duration,
    pub step_every: Duration,
    pub progress_per_tick: u8,
    /// How long a completed run stays visible to status polls.
    pub retention: Duration,
}

impl Default for PipelineTiming {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(100),
            step_every: Duration::from_millis(1500),
            progress_per_tick: 2,
            retention: Duration::from_secs(600),
        }
    }
}

impl PipelineTiming {
    fn ticks_per_step(&self) -> u64 {
        let tick = self.tick.as_millis().max(1);
        (self.step_every.as_millis() / tick).max(1) as u64
    }
}

/// Step index and percentage of one run. Progress saturates at 100 and the
/// step index at the last step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineProgress {
    pub step: usize,
    pub progress: u8,
}

impl PipelineProgress {
    pub fn tick(&mut self, amount: u8) {
        self.progress = self.progress.saturating_add(amount).min(100);
    }

    pub fn next_step(&mut self) {
        self.step = (self.step + 1).min(PROCESSING_STEPS.len() - 1);
    }

    pub fn is_finished(&self) -> bool {
        self.step == PROCESSING_STEPS.len() - 1 && self.progress >= 100
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Completed,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingReport {
    pub video_id: String,
    pub state: JobState,
    pub step: usize,
    pub step_title: &'static str,
    pub step_description: &'static str,
    pub progress: u8,
}

#[derive(Clone)]
struct ProcessingJob {
    state: JobState,
    progress: PipelineProgress,
}

/// In-memory registry of simulated runs, keyed by video id.
#[derive(Clone)]
pub struct ProcessingTracker {
    inner: Arc<TrackerInner>,
}

struct TrackerInner {
    jobs: Mutex<HashMap<String, ProcessingJob>>,
    timing: PipelineTiming,
    sink: Option<Arc<dyn AiStatusSink>>,
}

impl ProcessingTracker {
    pub fn new(timing: PipelineTiming, sink: Option<Arc<dyn AiStatusSink>>) -> Result<Self> {
        ensure!(!timing.tick.is_zero(), "pipeline tick must be non-zero");
        Ok(Self {
            inner: Arc::new(TrackerInner {
                jobs: Mutex::new(HashMap::new()),
                timing,
                sink,
            }),
        })
    }

    pub fn status(&self, video_id: &str) -> Option<ProcessingReport> {
        let jobs = self.inner.jobs.lock();
        let job = jobs.get(video_id)?;
        let step = PROCESSING_STEPS[job.progress.step];
        Some(ProcessingReport {
            video_id: video_id.to_string(),
            state: job.state,
            step: job.progress.step,
            step_title: step.title,
            step_description: step.description,
            progress: job.progress.progress,
        })
    }

    fn start(&self, video_id: String) {
        {
            let mut jobs = self.inner.jobs.lock();
            if jobs.contains_key(&video_id) {
                tracing::debug!(video_id, "chapter detection already tracked");
                return;
            }
            jobs.insert(
                video_id.clone(),
                ProcessingJob {
                    state: JobState::Queued,
                    progress: PipelineProgress::default(),
                },
            );
        }

        let inner = self.inner.clone();
        tokio::spawn(async move {
            run_pipeline(inner, video_id).await;
        });
    }
}

impl ChapterDetectionQueue for ProcessingTracker {
    fn submit(&self, video_id: &str) {
        tracing::info!(video_id, "queued chapter detection");
        self.start(video_id.to_string());
    }
}

async fn run_pipeline(inner: Arc<TrackerInner>, video_id: String) {
    set_state(&inner, &video_id, JobState::Running);
    mirror_status(&inner, &video_id, AiProcessingStatus::Processing).await;

    let timing = inner.timing;
    let ticks_per_step = timing.ticks_per_step();
    let mut ticker = tokio::time::interval(timing.tick);
    // The first tick of an interval fires immediately.
    ticker.tick().await;

    let mut elapsed: u64 = 0;
    loop {
        ticker.tick().await;
        elapsed += 1;

        let finished = {
            let mut jobs = inner.jobs.lock();
            let Some(job) = jobs.get_mut(&video_id) else {
                return;
            };
            job.progress.tick(timing.progress_per_tick);
            if elapsed % ticks_per_step == 0 {
                job.progress.next_step();
            }
            job.progress.is_finished()
        };

        if finished {
            break;
        }
    }

    set_state(&inner, &video_id, JobState::Completed);
    mirror_status(&inner, &video_id, AiProcessingStatus::Complete).await;
    tracing::info!(video_id, "simulated chapter detection finished");

    tokio::time::sleep(timing.retention).await;
    let mut jobs = inner.jobs.lock();
    if jobs
        .get(&video_id)
        .is_some_and(|job| job.state == JobState::Completed)
    {
        jobs.remove(&video_id);
        tracing::debug!(video_id, "dropped finished chapter detection run");
    }
}

fn set_state(inner: &TrackerInner, video_id: &str, state: JobState) {
    if let Some(job) = inner.jobs.lock().get_mut(video_id) {
        job.state = state;
    }
}

async fn mirror_status(inner: &TrackerInner, video_id: &str, status: AiProcessingStatus) {
    let Some(sink) = &inner.sink else {
        return;
    };
    if let Err(err) = sink.set_ai_status(video_id, status).await {
        tracing::warn!(
            video_id,
            status = status.as_str(),
            error = %format!("{err:#}"),
            "failed to record AI status"
        );
    }
}
