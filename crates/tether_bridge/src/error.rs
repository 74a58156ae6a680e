use thiserror::Error;

/// Engine start-up failures. Each names the step that failed; none of them
/// are recoverable for the engine instance that raised them.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("an engine is already initialized on this thread")]
    AlreadyInitialized,

    #[error("could not initialize the guest engine: {0}")]
    Runtime(#[source] rquickjs::Error),

    #[error("could not create the guest context: {0}")]
    Context(#[source] rquickjs::Error),

    #[error("could not register global function '{name}': {source}")]
    Function {
        name: &'static str,
        #[source]
        source: rquickjs::Error,
    },

    #[error("could not evaluate self-hosted code: {0}")]
    SelfHosted(String),
}

/// Why a timer could not be scheduled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    #[error("no running event loop to schedule on")]
    NoRunningLoop,

    #[error("all timeout ids are in use")]
    IdsExhausted,
}
