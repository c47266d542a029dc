use thiserror::Error;

/// Settings-file model errors
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Setting not found: {0}")]
    NotFound(String),
}

/// Script repository errors
#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Script not found: {0}")]
    NotFound(String),

    #[error("Invalid script: {0}")]
    Invalid(String),
}

/// Proxy and rule-string errors
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Rule string parse error: {0}")]
    Parse(String),

    #[error("Proxy not found: {0}")]
    NotFound(String),
}

/// Orchestrator (load/save) errors
#[derive(Debug, Error)]
pub enum ListError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Generator failed: {0}")]
    Generator(String),

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),
}

/// Rule-reordering errors. `NoTarget` is the expected "can't move any
/// further" outcome and callers surface it, they don't treat it as fatal.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MoveError {
    #[error("no target position in the requested direction")]
    NoTarget,

    #[error("rule not found in proxy")]
    RuleNotFound,
}
