//! Record and range types shared across the pipeline

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One structured unit of input: an insertion-ordered field map.
pub type Record = Map<String, Value>;

/// Half-open interval `[start, end)` over the logical record stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputRange {
    pub start: u64,
    pub end: u64,
}

impl OutputRange {
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Number of records the range covers (zero for inverted ranges).
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.start && offset < self.end
    }
}

impl std::fmt::Display for OutputRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
