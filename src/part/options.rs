use serde::{Deserialize, Serialize};

use super::compress::CompressionMethod;
use crate::error::{PartError, PartResult};

/// Tuning knobs for part writing.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PartOptions {
    /// Rows per mark.
    pub granularity: usize,
    /// A frame holding at least this many uncompressed bytes is closed at the
    /// next mark boundary.
    pub min_frame_bytes: usize,
    /// Hard cap on a frame's uncompressed size.
    pub max_frame_bytes: usize,
    pub compression: CompressionMethod,
    /// Data files whose estimated size reaches this threshold get a large
    /// write buffer. 0 disables the policy.
    pub aio_threshold: u64,
}

impl Default for PartOptions {
    fn default() -> Self {
        Self {
            granularity: 8192,
            min_frame_bytes: 65536,
            max_frame_bytes: 1 << 20,
            compression: CompressionMethod::default(),
            aio_threshold: 0,
        }
    }
}

impl PartOptions {
    pub fn default_for_test() -> Self {
        Self {
            min_frame_bytes: 64,
            max_frame_bytes: 4096,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> PartResult<()> {
        if self.granularity == 0 {
            return Err(PartError::bad_arguments("granularity must be positive"));
        }
        if self.max_frame_bytes == 0 {
            return Err(PartError::bad_arguments("max_frame_bytes must be positive"));
        }
        if self.min_frame_bytes > self.max_frame_bytes {
            return Err(PartError::bad_arguments(format!(
                "min_frame_bytes ({}) exceeds max_frame_bytes ({})",
                self.min_frame_bytes, self.max_frame_bytes
            )));
        }
        Ok(())
    }
}
