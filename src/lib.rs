pub mod engine;
pub mod error;
pub mod plan;
pub mod rescale;
pub mod sink;
pub mod types;
pub mod window;

pub use engine::ColaEngine;
pub use error::{ColaError, Result};
pub use plan::SegmentationPlan;
pub use rescale::{BaselineMode, BaselineRescale, EpochStack};
pub use sink::{ArraySink, CallbackSink, Sink};
pub use types::{ColaConfig, RunReport};
pub use window::{build_window, NormalizedWindow, WindowKind};
