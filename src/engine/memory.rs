//! In-memory training engine.
//!
//! Stands in for a vendor adapter wherever one is not available: dry runs
//! from the CLI and the instrumented engine behind the integration tests.
//! Long-running operations complete after a configurable number of polls,
//! every port call is recorded in a journal, and the runtime export is a
//! JSON snapshot of the workspace.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use image::DynamicImage;
use serde::Serialize;

use crate::error::EngineError;
use crate::models::{Point, Size, StageConfig};

use super::{ToolId, ToolKind, TrainingEngine, TrainingProgress};

/// One recorded port call. The integration tests assert ordering
/// invariants against this journal.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    AddImage(String),
    AddTool {
        name: String,
        kind: ToolKind,
        parent: Option<usize>,
    },
    Configure(usize),
    Process(usize),
    Train(usize),
    Wait {
        tool: usize,
        done: bool,
    },
    SetFeature {
        tool: usize,
        sample: String,
        feature: String,
    },
    LabelSamples {
        tool: usize,
        filter: String,
        label: String,
    },
    TagSamples {
        tool: usize,
        filter: String,
        tag: String,
    },
    SelectTrainingSet {
        tool: usize,
        filter: String,
        fraction: f64,
    },
    SetTrainFlag {
        tool: usize,
        filter: String,
        enabled: bool,
    },
    SetRegionMask {
        tool: usize,
        sample: String,
        region: String,
    },
    SaveWorkspace,
    ExportRuntime,
}

#[derive(Debug, Clone)]
pub struct FeatureRecord {
    pub position: Point,
    pub angle: f64,
    pub size: Size,
}

#[derive(Debug, Clone, Default)]
pub struct SampleRecord {
    pub width: u32,
    pub height: u32,
    pub label: Option<String>,
    pub tag: Option<String>,
    pub features: BTreeMap<String, FeatureRecord>,
    pub masks: BTreeMap<String, (u32, u32)>,
    pub in_training_set: bool,
}

#[derive(Debug, Clone)]
pub struct ToolRecord {
    pub name: String,
    pub kind: ToolKind,
    pub parent: Option<usize>,
    pub config: Option<StageConfig>,
    pub train_flag: bool,
    pub process_runs: u32,
    pub trained: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingOp {
    Process,
    Train,
}

#[derive(Debug, Clone, Copy)]
struct Pending {
    tool: usize,
    op: PendingOp,
    polls_left: u32,
    total: u32,
}

pub struct MemoryEngine {
    workspace: String,
    samples: BTreeMap<String, SampleRecord>,
    tools: Vec<ToolRecord>,
    pending: Option<Pending>,
    saved: bool,
    /// How many `wait` calls return false before an operation completes.
    pub polls_per_operation: u32,
    /// Samples whose region-mask application fails with a vendor error.
    pub fail_masks: BTreeSet<String>,
    /// Journal of every port call, in order.
    pub calls: Vec<Call>,
    /// Set to true on drop; lets tests observe release on error paths.
    pub release_flag: Option<Arc<AtomicBool>>,
}

impl MemoryEngine {
    pub fn new(workspace: impl Into<String>) -> Self {
        Self {
            workspace: workspace.into(),
            samples: BTreeMap::new(),
            tools: Vec::new(),
            pending: None,
            saved: false,
            polls_per_operation: 0,
            fail_masks: BTreeSet::new(),
            calls: Vec::new(),
            release_flag: None,
        }
    }

    pub fn sample(&self, name: &str) -> Option<&SampleRecord> {
        self.samples.get(name)
    }

    pub fn sample_names(&self) -> Vec<String> {
        self.samples.keys().cloned().collect()
    }

    pub fn tool_record(&self, tool: ToolId) -> Option<&ToolRecord> {
        self.tools.get(tool.0)
    }

    pub fn tool_records(&self) -> &[ToolRecord] {
        &self.tools
    }

    pub fn workspace_saved(&self) -> bool {
        self.saved
    }

    fn tool_mut(&mut self, tool: ToolId) -> Result<&mut ToolRecord, EngineError> {
        self.tools
            .get_mut(tool.0)
            .ok_or(EngineError::UnknownTool(tool.0))
    }

    fn check_tool(&self, tool: ToolId) -> Result<&ToolRecord, EngineError> {
        self.tools.get(tool.0).ok_or(EngineError::UnknownTool(tool.0))
    }

    fn check_idle(&self, tool: ToolId) -> Result<(), EngineError> {
        match self.pending {
            Some(p) => Err(EngineError::InvalidOperation {
                tool: tool.0,
                message: format!("{:?} already pending", p.op).to_lowercase(),
            }),
            None => Ok(()),
        }
    }

    /// Engine query semantics: `""` matches everything, `not labeled`
    /// matches samples without a label or tag, and `'text'` matches
    /// samples whose name contains `text` or whose label or tag equals it.
    fn matches(filter: &str, name: &str, record: &SampleRecord) -> bool {
        match filter {
            "" => true,
            "not labeled" => record.label.is_none() && record.tag.is_none(),
            quoted if quoted.starts_with('\'') && quoted.ends_with('\'') && quoted.len() >= 2 => {
                let needle = &quoted[1..quoted.len() - 1];
                name.contains(needle)
                    || record.label.as_deref() == Some(needle)
                    || record.tag.as_deref() == Some(needle)
            }
            _ => false,
        }
    }

    fn matching_names(&self, filter: &str) -> Vec<String> {
        self.samples
            .iter()
            .filter(|(name, record)| Self::matches(filter, name, record))
            .map(|(name, _)| name.clone())
            .collect()
    }
}

impl TrainingEngine for MemoryEngine {
    fn add_image(&mut self, name: &str, image: &DynamicImage) -> Result<(), EngineError> {
        self.calls.push(Call::AddImage(name.to_string()));
        self.samples.insert(
            name.to_string(),
            SampleRecord {
                width: image.width(),
                height: image.height(),
                ..SampleRecord::default()
            },
        );
        Ok(())
    }

    fn add_tool(
        &mut self,
        parent: Option<ToolId>,
        name: &str,
        kind: ToolKind,
    ) -> Result<ToolId, EngineError> {
        if let Some(p) = parent {
            self.check_tool(p)?;
        }
        self.calls.push(Call::AddTool {
            name: name.to_string(),
            kind,
            parent: parent.map(|p| p.0),
        });
        self.tools.push(ToolRecord {
            name: name.to_string(),
            kind,
            parent: parent.map(|p| p.0),
            config: None,
            train_flag: false,
            process_runs: 0,
            trained: false,
        });
        Ok(ToolId(self.tools.len() - 1))
    }

    fn configure(&mut self, tool: ToolId, config: &StageConfig) -> Result<(), EngineError> {
        self.calls.push(Call::Configure(tool.0));
        self.tool_mut(tool)?.config = Some(config.clone());
        Ok(())
    }

    fn process(&mut self, tool: ToolId) -> Result<(), EngineError> {
        self.check_tool(tool)?;
        self.check_idle(tool)?;
        self.calls.push(Call::Process(tool.0));
        self.pending = Some(Pending {
            tool: tool.0,
            op: PendingOp::Process,
            polls_left: self.polls_per_operation,
            total: self.polls_per_operation,
        });
        Ok(())
    }

    fn train(&mut self, tool: ToolId) -> Result<(), EngineError> {
        self.check_idle(tool)?;
        let record = self.check_tool(tool)?;
        if !record.train_flag {
            return Err(EngineError::InvalidOperation {
                tool: tool.0,
                message: "no samples flagged for training".to_string(),
            });
        }
        self.calls.push(Call::Train(tool.0));
        self.pending = Some(Pending {
            tool: tool.0,
            op: PendingOp::Train,
            polls_left: self.polls_per_operation,
            total: self.polls_per_operation,
        });
        Ok(())
    }

    fn wait(&mut self, tool: ToolId, _timeout: Duration) -> Result<bool, EngineError> {
        self.check_tool(tool)?;
        let done = match self.pending {
            Some(ref mut p) if p.tool == tool.0 => {
                if p.polls_left == 0 {
                    true
                } else {
                    p.polls_left -= 1;
                    false
                }
            }
            // Nothing pending on this tool: an idle wait completes at once.
            _ => true,
        };
        self.calls.push(Call::Wait { tool: tool.0, done });
        if done {
            if let Some(p) = self.pending.take_if(|p| p.tool == tool.0) {
                let record = &mut self.tools[tool.0];
                match p.op {
                    PendingOp::Process => record.process_runs += 1,
                    PendingOp::Train => record.trained = true,
                }
            }
        }
        Ok(done)
    }

    fn progress(&self, tool: ToolId) -> Result<TrainingProgress, EngineError> {
        let record = self.check_tool(tool)?;
        match self.pending {
            Some(p) if p.tool == tool.0 => {
                let step = p.total - p.polls_left;
                let op = match p.op {
                    PendingOp::Process => "processing",
                    PendingOp::Train => "training",
                };
                Ok(TrainingProgress {
                    description: format!("{} {} ({}/{})", op, record.name, step, p.total.max(1)),
                    eta: Some(Duration::from_secs(u64::from(p.polls_left))),
                })
            }
            _ => Ok(TrainingProgress {
                description: format!("{} idle", record.name),
                eta: None,
            }),
        }
    }

    fn list_samples(&self, tool: ToolId, filter: &str) -> Result<Vec<String>, EngineError> {
        self.check_tool(tool)?;
        Ok(self.matching_names(filter))
    }

    fn set_feature(
        &mut self,
        tool: ToolId,
        sample: &str,
        feature: &str,
        position: Point,
        angle: f64,
        size: Size,
    ) -> Result<(), EngineError> {
        self.check_tool(tool)?;
        self.calls.push(Call::SetFeature {
            tool: tool.0,
            sample: sample.to_string(),
            feature: feature.to_string(),
        });
        let record = self
            .samples
            .get_mut(sample)
            .ok_or_else(|| EngineError::UnknownSample(sample.to_string()))?;
        record.features.insert(
            feature.to_string(),
            FeatureRecord {
                position,
                angle,
                size,
            },
        );
        Ok(())
    }

    fn label_samples(
        &mut self,
        tool: ToolId,
        filter: &str,
        label: &str,
    ) -> Result<(), EngineError> {
        self.check_tool(tool)?;
        self.calls.push(Call::LabelSamples {
            tool: tool.0,
            filter: filter.to_string(),
            label: label.to_string(),
        });
        // The empty label means "no defect": it clears rather than sets.
        let value = (!label.is_empty()).then(|| label.to_string());
        for name in self.matching_names(filter) {
            self.samples.get_mut(&name).unwrap().label = value.clone();
        }
        Ok(())
    }

    fn tag_samples(&mut self, tool: ToolId, filter: &str, tag: &str) -> Result<(), EngineError> {
        self.check_tool(tool)?;
        self.calls.push(Call::TagSamples {
            tool: tool.0,
            filter: filter.to_string(),
            tag: tag.to_string(),
        });
        for name in self.matching_names(filter) {
            self.samples.get_mut(&name).unwrap().tag = Some(tag.to_string());
        }
        Ok(())
    }

    fn select_training_set(
        &mut self,
        tool: ToolId,
        filter: &str,
        fraction: f64,
    ) -> Result<(), EngineError> {
        self.check_tool(tool)?;
        self.calls.push(Call::SelectTrainingSet {
            tool: tool.0,
            filter: filter.to_string(),
            fraction,
        });
        let names = self.matching_names(filter);
        let take = ((names.len() as f64) * fraction).ceil() as usize;
        for name in names.into_iter().take(take) {
            self.samples.get_mut(&name).unwrap().in_training_set = true;
        }
        Ok(())
    }

    fn set_train_flag(
        &mut self,
        tool: ToolId,
        filter: &str,
        enabled: bool,
    ) -> Result<(), EngineError> {
        self.check_tool(tool)?;
        self.calls.push(Call::SetTrainFlag {
            tool: tool.0,
            filter: filter.to_string(),
            enabled,
        });
        self.tool_mut(tool)?.train_flag = enabled;
        Ok(())
    }

    fn set_region_mask(
        &mut self,
        tool: ToolId,
        sample: &str,
        region: &str,
        mask: &DynamicImage,
    ) -> Result<(), EngineError> {
        self.check_tool(tool)?;
        self.calls.push(Call::SetRegionMask {
            tool: tool.0,
            sample: sample.to_string(),
            region: region.to_string(),
        });
        if self.fail_masks.contains(sample) {
            return Err(EngineError::vendor(format!(
                "mask rejected for sample '{sample}'"
            )));
        }
        let record = self
            .samples
            .get_mut(sample)
            .ok_or_else(|| EngineError::UnknownSample(sample.to_string()))?;
        record
            .masks
            .insert(region.to_string(), (mask.width(), mask.height()));
        Ok(())
    }

    fn save_workspace(&mut self) -> Result<(), EngineError> {
        self.calls.push(Call::SaveWorkspace);
        self.saved = true;
        Ok(())
    }

    fn export_runtime(&mut self, out: &mut dyn Write) -> Result<u64, EngineError> {
        self.calls.push(Call::ExportRuntime);
        let runtime = RuntimeWorkspace {
            workspace: &self.workspace,
            sample_count: self.samples.len(),
            tools: self
                .tools
                .iter()
                .map(|t| RuntimeTool {
                    name: &t.name,
                    kind: t.kind.as_str(),
                    trained: t.trained,
                    epochs: t.config.as_ref().map(|c| c.epochs),
                    feature_size: t.config.as_ref().map(|c| c.feature_size),
                })
                .collect(),
        };
        let bytes = serde_json::to_vec_pretty(&runtime)
            .map_err(|e| EngineError::vendor(e.to_string()))?;
        out.write_all(&bytes)
            .map_err(|e| EngineError::vendor(e.to_string()))?;
        Ok(bytes.len() as u64)
    }
}

impl Drop for MemoryEngine {
    fn drop(&mut self) {
        if let Some(flag) = &self.release_flag {
            flag.store(true, Ordering::SeqCst);
        }
    }
}

#[derive(Serialize)]
struct RuntimeWorkspace<'a> {
    workspace: &'a str,
    sample_count: usize,
    tools: Vec<RuntimeTool<'a>>,
}

#[derive(Serialize)]
struct RuntimeTool<'a> {
    name: &'a str,
    kind: &'static str,
    trained: bool,
    epochs: Option<u32>,
    feature_size: Option<Size>,
}
