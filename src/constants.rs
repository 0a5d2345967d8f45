//! Shared constants: configuration defaults, environment variable names and
//! the built-in failure category names.

/// Configuration defaults
pub mod defaults {
    pub const WORKER_COUNT: usize = 8;
    pub const COMMAND_BUFFER_SIZE: usize = 1024;
    pub const PROGRESS_LOG_INTERVAL: u64 = 1000;

    /// Upper bound on pool size and on the dispatcher mailbox
    pub const MAX_WORKER_COUNT: usize = 1 << 20;
    pub const MAX_COMMAND_BUFFER_SIZE: usize = 1 << 20;

    /// Each worker has at most one reply outstanding
    pub const WORKER_MAILBOX_SIZE: usize = 1;
}

/// Environment variables consulted by configuration and logging
pub mod env {
    pub const ENVIRONMENT: &str = "WORKPULL_ENV";
    pub const FALLBACK_ENVIRONMENT: &str = "APP_ENV";
    pub const LOG_FORMAT: &str = "WORKPULL_LOG_FORMAT";
    pub const CONFIG_PREFIX: &str = "WORKPULL";
    pub const CONFIG_SEPARATOR: &str = "__";
    pub const DEFAULT_ENVIRONMENT: &str = "development";
}

/// Failure category names used by the built-in `Categorize` impls
pub mod categories {
    pub const PANIC: &str = "panic";
    pub const CANCELLED: &str = "cancelled";
    pub const TIMEOUT: &str = "timeout";
    pub const MESSAGE: &str = "message";
    pub const UNKNOWN: &str = "unknown";
    pub const IO_PREFIX: &str = "io";
}

/// Actor names used in log fields
pub mod actors {
    pub const DISPATCHER: &str = "WorkDispatcher";
    pub const WORKER: &str = "Worker";
}
