use thiserror::Error;

/// Error type for collaborator and component implementations supplied from outside the crate
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised while compiling or executing an operator DAG
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("node not found: {name}")]
    NodeNotFound { name: String },

    #[error("unknown operator type '{node_type}' for node '{node}'")]
    UnknownOperatorType { node: String, node_type: String },

    #[error("duplicate node name: {name}")]
    DuplicateNode { name: String },

    #[error("plan contains a cycle through node '{node}'")]
    CyclicPlan { node: String },

    #[error("node '{node}' is missing required param '{param}'")]
    MissingParam { node: String, param: String },

    #[error("node '{node}' has invalid param '{param}': {reason}")]
    InvalidParam {
        node: String,
        param: String,
        reason: String,
    },

    #[error("node '{node}' requires {collaborator}, which is not configured")]
    MissingCollaborator {
        node: String,
        collaborator: &'static str,
    },

    #[error("node '{node}' binds input key '{key}' more than once")]
    DuplicateInputKey { node: String, key: String },

    #[error("unresolved template variable '{key}' in node '{node}'")]
    UnresolvedTemplate { node: String, key: String },

    #[error("node '{node}' did not produce output '{key}'")]
    MissingOutput { node: String, key: String },

    #[error("node '{node}' received invalid input '{key}': {reason}")]
    InvalidInput {
        node: String,
        key: String,
        reason: String,
    },

    #[error("{component} '{name}' failed")]
    Component {
        component: &'static str,
        name: String,
        #[source]
        source: BoxError,
    },

    #[error("node '{node}' failed")]
    Execution {
        node: String,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Whether this error was raised while compiling a plan, before any node ran
    pub fn is_plan_build_error(&self) -> bool {
        matches!(
            self,
            Self::NodeNotFound { .. }
                | Self::UnknownOperatorType { .. }
                | Self::DuplicateNode { .. }
                | Self::CyclicPlan { .. }
                | Self::MissingParam { .. }
                | Self::InvalidParam { .. }
                | Self::MissingCollaborator { .. }
                | Self::DuplicateInputKey { .. }
        )
    }

    pub fn missing_param(node: &str, param: &str) -> Self {
        Self::MissingParam {
            node: node.to_string(),
            param: param.to_string(),
        }
    }

    pub fn invalid_param(node: &str, param: &str, reason: impl Into<String>) -> Self {
        Self::InvalidParam {
            node: node.to_string(),
            param: param.to_string(),
            reason: reason.into(),
        }
    }

    pub fn invalid_input(node: &str, key: &str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            node: node.to_string(),
            key: key.to_string(),
            reason: reason.into(),
        }
    }

    pub fn component(component: &'static str, name: &str, source: BoxError) -> Self {
        Self::Component {
            component,
            name: name.to_string(),
            source,
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
