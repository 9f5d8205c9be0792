#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// Nothing was captured: the proxy or the subprocess could not be started.
    #[error("failed to start {component}: {reason}")]
    Startup {
        component: &'static str,
        reason: String,
    },
    #[error("persistence sink: {0}")]
    Sink(String),
    #[error("capturer: {0}")]
    Capturer(String),
    #[error("subprocess: {0}")]
    Supervisor(#[from] std::io::Error),
}

impl CaptureError {
    pub fn startup(component: &'static str, reason: impl ToString) -> Self {
        Self::Startup {
            component,
            reason: reason.to_string(),
        }
    }
}
