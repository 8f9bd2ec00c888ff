use crate::timings::{ModelineError, TimingsError};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("invalid modeline: {0}")]
    Modeline(#[from] ModelineError),
    #[error("invalid timings: {0}")]
    InvalidTimings(#[from] TimingsError),
    /// Not even one viewport row could be allocated
    #[error("no DMA capable memory left for the viewport")]
    OutOfMemory,
    #[error("no resolution has been set")]
    NotConfigured,
    #[error("the controller has been shut down")]
    Closed,
    #[error("bitmap of {width}x{height} needs {expected} bytes, got {actual}")]
    BitmapData {
        width: i32,
        height: i32,
        expected: usize,
        actual: usize,
    },
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
