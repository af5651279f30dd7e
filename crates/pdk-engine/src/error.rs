use pdk_workflow::WorkflowError;

/// Failure of an engine operation. Either a typed domain refusal or an
/// infrastructure fault; in both cases the unit of work was rolled back.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error("STORAGE: {0:#}")]
    Storage(anyhow::Error),
}

/// Store adapters report through `anyhow`. A [`WorkflowError`] carried
/// inside (legacy status strings, for example) keeps its type.
impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<WorkflowError>() {
            Ok(w) => EngineError::Workflow(w),
            Err(other) => EngineError::Storage(other),
        }
    }
}

impl EngineError {
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Workflow(w) => w.code(),
            EngineError::Storage(_) => "STORAGE",
        }
    }

    pub fn as_workflow(&self) -> Option<&WorkflowError> {
        match self {
            EngineError::Workflow(w) => Some(w),
            EngineError::Storage(_) => None,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
