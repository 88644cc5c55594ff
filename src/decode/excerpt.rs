use serde::{Deserialize, Serialize};

/// The part of a file a caller wants decoded, in seconds.
///
/// A `length` of zero or less, or longer than the file, selects the whole
/// file. A negative `start` asks for a centred excerpt that begins no later
/// than `-start`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ExcerptRequest {
    pub length: f32,
    pub start: f32,
}

impl ExcerptRequest {
    pub fn new(length: f32, start: f32) -> Self {
        Self { length, start }
    }

    /// Decode everything.
    pub fn whole_file() -> Self {
        Self::default()
    }
}

/// A resolved window. `length == 0` means no window at all.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ExcerptPlan {
    pub start: f32,
    pub length: f32,
}

impl ExcerptPlan {
    pub const WHOLE_FILE: ExcerptPlan = ExcerptPlan {
        start: 0.0,
        length: 0.0,
    };

    pub fn is_whole_file(&self) -> bool {
        self.length == 0.0
    }
}

/// Fit a requested excerpt into a file of `duration` seconds.
pub fn plan_excerpt(duration: u32, request: ExcerptRequest) -> ExcerptPlan {
    let duration = duration as f32;
    let ExcerptRequest { length, start } = request;

    // NaN fails every comparison, so test for the accepted range instead.
    if !(length > 0.0 && length <= duration) || !start.is_finite() {
        return ExcerptPlan::WHOLE_FILE;
    }

    let start = if start < 0.0 {
        (-start).min((duration - length) / 2.0)
    } else if start + length > duration {
        duration - length
    } else {
        start
    };

    ExcerptPlan { start, length }
}
