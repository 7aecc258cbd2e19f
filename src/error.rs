use thiserror::Error;

/// Errors surfaced by layout, matrix buffer construction and the layout worker.
///
/// Routing failures never show up here: the A* router recovers locally by
/// falling back to a straight segment.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum LayoutError {
    #[error("malformed graph: {0}")]
    MalformedGraph(String),
    #[error("invalid buffer configuration: {0}")]
    InvalidBufferConfiguration(String),
    #[error("invalid matrix: {0}")]
    InvalidMatrix(String),
    #[error("layout worker unavailable: {0}")]
    WorkerUnavailable(String),
    #[error("texture upload failed: {0}")]
    Upload(String),
}

impl LayoutError {
    pub(crate) fn dangling_endpoint(edge: &str, endpoint: &str) -> Self {
        Self::MalformedGraph(format!("edge {edge} references unknown node '{endpoint}'"))
    }

    pub(crate) fn duplicate_id(id: &str) -> Self {
        Self::MalformedGraph(format!("node id '{id}' appears more than once"))
    }
}

pub type Result<T, E = LayoutError> = std::result::Result<T, E>;
