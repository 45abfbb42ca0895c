//! Declarative training-pipeline description and its sequential driver.
//!
//! A [`TrainingPlan`] names the image directory and a cascade of
//! [`Stage`]s; the [`PipelineDriver`] executes it against any
//! [`TrainingEngine`], walking each stage through the same state
//! machine: ingest, process, annotate, flag, train (polled), and a final
//! process before chaining into the children.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::warn;

use crate::engine::{ToolId, ToolKind, TrainingEngine};
use crate::error::{EngineError, PipelineError, Result};
use crate::ingest;
use crate::masks::{self, MaskPlan, MaskReport};
use crate::models::{ManifestEntry, StageConfig};
use crate::progress::{ProgressEvent, ProgressSink};

/// Extensions accepted by default when scanning the image directory.
pub const IMAGE_EXTENSIONS: [&str; 3] = [".jpg", ".bmp", ".png"];

/// Lifecycle of a single stage run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Created,
    Ingested,
    Processed,
    Annotated,
    FlaggedForTraining,
    Training,
    Trained,
    Finalized,
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageState::Created => "created",
            StageState::Ingested => "ingested",
            StageState::Processed => "processed",
            StageState::Annotated => "annotated",
            StageState::FlaggedForTraining => "flagged-for-training",
            StageState::Training => "training",
            StageState::Trained => "trained",
            StageState::Finalized => "finalized",
        };
        f.write_str(s)
    }
}

/// What to do when a manifest entry matches no ingested sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LookupPolicy {
    /// Abort the stage on the first miss.
    Strict,
    /// Warn, count, and continue. Matches the original driver's behavior.
    #[default]
    Lenient,
}

/// Manifest annotations to apply to a stage's samples.
#[derive(Debug, Clone)]
pub struct AnnotationPlan {
    pub entries: Vec<ManifestEntry>,
    /// Feature name the annotations are stored under.
    pub feature: String,
}

/// Assign `label` to every sample matching `filter`.
#[derive(Debug, Clone)]
pub struct LabelRule {
    pub filter: String,
    pub label: String,
}

/// Assign `tag` to every sample matching `filter`.
#[derive(Debug, Clone)]
pub struct TagRule {
    pub filter: String,
    pub tag: String,
}

/// Declarative per-stage work, applied between processing and training.
#[derive(Debug, Clone, Default)]
pub struct StageSetup {
    pub annotations: Option<AnnotationPlan>,
    pub labels: Vec<LabelRule>,
    pub tags: Vec<TagRule>,
    pub masks: Option<MaskPlan>,
    pub training_fraction: Option<f64>,
    /// Filter passed to the train flag; empty selects every sample.
    pub train_filter: String,
}

/// One configured unit in the training cascade.
#[derive(Debug, Clone)]
pub struct Stage {
    pub name: String,
    pub kind: ToolKind,
    pub config: StageConfig,
    pub setup: StageSetup,
    pub children: Vec<Stage>,
}

impl Stage {
    pub fn new(name: impl Into<String>, kind: ToolKind, config: StageConfig) -> Self {
        Self {
            name: name.into(),
            kind,
            config,
            setup: StageSetup::default(),
            children: Vec::new(),
        }
    }

    pub fn with_annotations(mut self, entries: Vec<ManifestEntry>, feature: impl Into<String>) -> Self {
        self.setup.annotations = Some(AnnotationPlan {
            entries,
            feature: feature.into(),
        });
        self
    }

    pub fn with_label(mut self, filter: impl Into<String>, label: impl Into<String>) -> Self {
        self.setup.labels.push(LabelRule {
            filter: filter.into(),
            label: label.into(),
        });
        self
    }

    pub fn with_tag(mut self, filter: impl Into<String>, tag: impl Into<String>) -> Self {
        self.setup.tags.push(TagRule {
            filter: filter.into(),
            tag: tag.into(),
        });
        self
    }

    pub fn with_masks(mut self, plan: MaskPlan) -> Self {
        self.setup.masks = Some(plan);
        self
    }

    pub fn with_training_fraction(mut self, fraction: f64) -> Self {
        self.setup.training_fraction = Some(fraction);
        self
    }

    pub fn add_child(mut self, child: Stage) -> Self {
        self.children.push(child);
        self
    }
}

/// A full pipeline run: where the images come from and the stage cascade.
#[derive(Debug, Clone)]
pub struct TrainingPlan {
    pub images_dir: PathBuf,
    pub extensions: Vec<String>,
    pub root: Stage,
}

impl TrainingPlan {
    pub fn new(images_dir: impl Into<PathBuf>, root: Stage) -> Self {
        Self {
            images_dir: images_dir.into(),
            extensions: IMAGE_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
            root,
        }
    }

    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions = extensions.iter().map(|e| e.to_string()).collect();
        self
    }
}

/// Shared flag that stops the polling loop from another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of one stage.
#[derive(Debug, Clone, Default)]
pub struct StageReport {
    pub name: String,
    pub annotations_applied: usize,
    pub annotations_skipped: usize,
    pub masks: Option<MaskReport>,
    pub trained: bool,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub images: usize,
    pub stages: Vec<StageReport>,
}

/// Sequential executor. Owns nothing: the engine and sink are borrowed
/// for the duration of the run, so their release is guaranteed by the
/// caller's scope on every exit path.
pub struct PipelineDriver<'a> {
    engine: &'a mut dyn TrainingEngine,
    sink: &'a dyn ProgressSink,
    poll_interval: Duration,
    lookup: LookupPolicy,
    cancel: CancelToken,
}

impl<'a> PipelineDriver<'a> {
    pub fn new(engine: &'a mut dyn TrainingEngine, sink: &'a dyn ProgressSink) -> Self {
        Self {
            engine,
            sink,
            poll_interval: Duration::from_millis(1000),
            lookup: LookupPolicy::default(),
            cancel: CancelToken::new(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_lookup_policy(mut self, policy: LookupPolicy) -> Self {
        self.lookup = policy;
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    /// Ingest the dataset and run every stage of the cascade in order.
    pub fn run(&mut self, plan: &TrainingPlan) -> Result<PipelineReport> {
        let extensions: Vec<&str> = plan.extensions.iter().map(String::as_str).collect();
        let images = ingest::ingest_directory(&mut *self.engine, &plan.images_dir, &extensions)?;
        self.sink.on_event(&ProgressEvent::Ingested { count: images });

        let mut stages = Vec::new();
        self.run_stage(None, &plan.root, &mut stages)?;

        Ok(PipelineReport { images, stages })
    }

    fn run_stage(
        &mut self,
        parent: Option<ToolId>,
        stage: &Stage,
        out: &mut Vec<StageReport>,
    ) -> Result<()> {
        let name = stage.name.as_str();
        let tool = self
            .engine
            .add_tool(parent, name, stage.kind)
            .map_err(|e| stage_err(name, "tool creation", e))?;
        self.state(name, StageState::Created);
        // The dataset is already visible through the stream or the
        // parent tool once the tool exists.
        self.state(name, StageState::Ingested);

        // Annotation needs processed feature keys, so block here first.
        self.engine
            .process(tool)
            .map_err(|e| stage_err(name, "processing", e))?;
        self.poll_until_complete(tool, name, "processing")?;
        self.state(name, StageState::Processed);

        self.engine
            .configure(tool, &stage.config)
            .map_err(|e| stage_err(name, "configuration", e))?;

        let (annotations_applied, annotations_skipped) = self.annotate(tool, name, &stage.setup)?;
        self.state(name, StageState::Annotated);

        for rule in &stage.setup.labels {
            self.engine
                .label_samples(tool, &rule.filter, &rule.label)
                .map_err(|e| stage_err(name, "labeling", e))?;
        }
        for rule in &stage.setup.tags {
            self.engine
                .tag_samples(tool, &rule.filter, &rule.tag)
                .map_err(|e| stage_err(name, "tagging", e))?;
        }

        let mask_report = match &stage.setup.masks {
            Some(plan) => {
                let eligible = self
                    .engine
                    .list_samples(tool, &plan.eligible)
                    .map_err(|e| stage_err(name, "mask eligibility listing", e))?;
                Some(masks::apply_region_masks(
                    &mut *self.engine,
                    tool,
                    plan,
                    &eligible,
                    self.sink,
                )?)
            }
            None => None,
        };

        if let Some(fraction) = stage.setup.training_fraction {
            self.engine
                .select_training_set(tool, "", fraction)
                .map_err(|e| stage_err(name, "training-set selection", e))?;
        }

        self.engine
            .set_train_flag(tool, &stage.setup.train_filter, true)
            .map_err(|e| stage_err(name, "train flagging", e))?;
        self.state(name, StageState::FlaggedForTraining);

        self.engine
            .train(tool)
            .map_err(|e| stage_err(name, "training", e))?;
        self.state(name, StageState::Training);
        self.poll_until_complete(tool, name, "training")?;
        self.state(name, StageState::Trained);

        // Refresh derived features so chained stages see this stage's
        // output labels.
        self.engine
            .process(tool)
            .map_err(|e| stage_err(name, "post-training processing", e))?;
        self.poll_until_complete(tool, name, "post-training processing")?;
        self.state(name, StageState::Finalized);

        out.push(StageReport {
            name: stage.name.clone(),
            annotations_applied,
            annotations_skipped,
            masks: mask_report,
            trained: true,
        });

        for child in &stage.children {
            self.run_stage(Some(tool), child, out)?;
        }

        Ok(())
    }

    /// Bounded polling loop. Returns as soon as `wait` reports
    /// completion; no engine call is made after that. Cancellation is
    /// checked between polls.
    fn poll_until_complete(
        &mut self,
        tool: ToolId,
        stage: &str,
        what: &'static str,
    ) -> Result<()> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(PipelineError::Cancelled(format!("{what} in stage '{stage}'")));
            }
            let done = self
                .engine
                .wait(tool, self.poll_interval)
                .map_err(|e| stage_err(stage, what, e))?;
            if done {
                return Ok(());
            }
            let progress = self
                .engine
                .progress(tool)
                .map_err(|e| stage_err(stage, what, e))?;
            self.sink.on_event(&ProgressEvent::TrainingTick {
                stage: stage.to_string(),
                description: progress.description,
                eta: progress.eta,
            });
        }
    }

    fn annotate(
        &mut self,
        tool: ToolId,
        stage: &str,
        setup: &StageSetup,
    ) -> Result<(usize, usize)> {
        let Some(plan) = &setup.annotations else {
            return Ok((0, 0));
        };

        let known: HashSet<String> = self
            .engine
            .list_samples(tool, "")
            .map_err(|e| stage_err(stage, "sample listing", e))?
            .into_iter()
            .collect();

        let mut applied = 0;
        let mut skipped = 0;
        for entry in &plan.entries {
            if known.contains(&entry.sample) {
                self.engine
                    .set_feature(
                        tool,
                        &entry.sample,
                        &plan.feature,
                        entry.position,
                        entry.angle,
                        entry.size,
                    )
                    .map_err(|e| stage_err(stage, "annotation", e))?;
                applied += 1;
                self.sink.on_event(&ProgressEvent::AnnotationApplied {
                    stage: stage.to_string(),
                    sample: entry.sample.clone(),
                });
            } else {
                match self.lookup {
                    LookupPolicy::Strict => {
                        return Err(PipelineError::LookupMiss {
                            stage: stage.to_string(),
                            sample: entry.sample.clone(),
                        });
                    }
                    LookupPolicy::Lenient => {
                        warn!(stage, sample = %entry.sample, "manifest entry has no ingested counterpart");
                        skipped += 1;
                        self.sink.on_event(&ProgressEvent::AnnotationSkipped {
                            stage: stage.to_string(),
                            sample: entry.sample.clone(),
                        });
                    }
                }
            }
        }

        Ok((applied, skipped))
    }

    fn state(&self, stage: &str, state: StageState) {
        self.sink.on_event(&ProgressEvent::StageState {
            stage: stage.to_string(),
            state,
        });
    }
}

fn stage_err(stage: &str, operation: &'static str, source: EngineError) -> PipelineError {
    PipelineError::Stage {
        stage: stage.to_string(),
        operation,
        source,
    }
}
