//! Plan-construction errors.
//!
//! Capacity failures travel as [`FailMode`](crate::core::common::FailMode)
//! values and never reach this type; `EngineError` covers the
//! higher-level search and evacuation surfaces, where errors carry the
//! stage they occurred in.

use thiserror::Error;

use crate::core::common::Gdx;
use crate::core::instance::DiskTemplate;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("Instances of type {0} cannot be relocated")]
    NotRelocatable(DiskTemplate),
    #[error("Instances with disk template '{0}' can't execute change secondary")]
    SecondaryChangeUnsupported(DiskTemplate),
    #[error("Not enough online nodes")]
    NotEnoughOnlineNodes,
    #[error("No online nodes")]
    NoOnlineNodes,
    #[error("Can't find group with index {0}")]
    GroupNotFound(Gdx),
    #[error("unsupported allocation request for {0} nodes")]
    UnsupportedNodeCount(usize),
    #[error("{0}")]
    Plan(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Annotates an error with the stage it occurred in.
pub fn annotate<T>(res: EngineResult<T>, stage: &str) -> EngineResult<T> {
    res.map_err(|e| EngineError::Plan(format!("{}: {}", stage, e)))
}

/// Lifts a capacity failure into a stage-annotated plan error.
pub fn annotate_op<T>(res: crate::core::common::OpResult<T>, stage: &str) -> EngineResult<T> {
    res.map_err(|fm| EngineError::Plan(format!("{}: {}", stage, fm)))
}
