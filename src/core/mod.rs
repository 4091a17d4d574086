//! 核心层：错误类型与优雅关闭

pub mod error;
pub mod shutdown;

pub use error::BotError;
pub use shutdown::{run_until_shutdown, ShutdownManager, ShutdownReason};
