//! Prediction and outcome recording
//!
//! Appends every prediction and every resolved outcome to CSV files so the
//! model's calibration can be checked offline: if 60%-confidence calls win
//! only 52% of the time, the confidence threshold is too low.

mod recorder;

pub use recorder::{DataRecorder, RecorderStats};
