/// Console and rotating file logging on top of `tracing`.
pub mod loggerlocal;

pub use loggerlocal::{init_logging, rotate_logs, LoggerError, LoggerLocalOptions};
