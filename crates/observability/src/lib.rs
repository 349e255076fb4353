//! Process-wide logging setup shared by the binaries.

/// Subscriber configuration (format, filter).
pub mod tracing;

pub use crate::tracing::{LogFormat, ParseLogFormatError};

/// Initialize JSON logging filtered by `RUST_LOG` (default `info`).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init(LogFormat::Json);
}

/// Like [`init`] with an explicit output format.
pub fn init_with(format: LogFormat) {
    tracing::init(format);
}
