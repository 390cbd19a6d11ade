//! Sequential stage runner executing each stage on its own thread.

use std::any::Any;
use std::thread::{self, JoinHandle};

use log::{debug, error};

use crate::error::PipelineError;

pub type StageResult = Result<(), PipelineError>;

type Stage = Box<dyn FnOnce() -> StageResult + Send + 'static>;

pub(crate) fn panic_payload_to_string(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "non-string panic payload".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineOutcome {
    Completed,
    /// A stage failed or was cancelled; the failure handler has been called.
    Aborted,
}

/// Ordered list of stages run strictly one after another.
///
/// The first failing stage stops the sequence and its error is handed to the
/// failure handler exactly once.
pub struct Pipeline {
    name: String,
    stages: Vec<(&'static str, Stage)>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    pub fn then<F>(mut self, stage_name: &'static str, stage: F) -> Self
    where
        F: FnOnce() -> StageResult + Send + 'static,
    {
        self.stages.push((stage_name, Box::new(stage)));
        self
    }

    /// Starts the sequence on a background thread and returns immediately.
    pub fn begin<H>(self, on_failure: H) -> Result<PipelineHandle, PipelineError>
    where
        H: FnOnce(PipelineError) + Send + 'static,
    {
        let name = self.name.clone();
        let join_handle = thread::Builder::new()
            .name(format!("{name}-pipeline"))
            .spawn(move || match self.run_stages() {
                Ok(()) => PipelineOutcome::Completed,
                Err(pipeline_error) => {
                    on_failure(pipeline_error);
                    PipelineOutcome::Aborted
                }
            })
            .map_err(|source| PipelineError::Spawn {
                stage: "pipeline",
                source,
            })?;
        Ok(PipelineHandle { join_handle })
    }

    fn run_stages(self) -> StageResult {
        let Self { name, stages } = self;
        for (stage_name, stage) in stages {
            debug!("Pipeline: {} entering stage '{}'", name, stage_name);
            let worker = thread::Builder::new()
                .name(format!("{name}-{stage_name}"))
                .spawn(stage)
                .map_err(|source| PipelineError::Spawn {
                    stage: stage_name,
                    source,
                })?;
            match worker.join() {
                Ok(Ok(())) => {}
                Ok(Err(stage_error)) => {
                    debug!("Pipeline: {} stopped in '{}': {}", name, stage_name, stage_error);
                    return Err(stage_error);
                }
                Err(payload) => {
                    let message = panic_payload_to_string(payload.as_ref());
                    error!("Pipeline: {} stage '{}' panicked: {}", name, stage_name, message);
                    return Err(PipelineError::Panicked {
                        stage: stage_name,
                        message,
                    });
                }
            }
        }
        Ok(())
    }
}

pub struct PipelineHandle {
    join_handle: JoinHandle<PipelineOutcome>,
}

impl PipelineHandle {
    /// Blocks until the last stage ran or the failure handler returned.
    pub fn join(self) -> PipelineOutcome {
        self.join_handle.join().unwrap_or_else(|payload| {
            error!(
                "Pipeline: failure handler panicked: {}",
                panic_payload_to_string(payload.as_ref())
            );
            PipelineOutcome::Aborted
        })
    }
}
