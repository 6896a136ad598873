//! Pipeline telemetry.

pub mod log;

pub use log::{
    create_shared_log, create_shared_log_with_persistence, PipelineLog, PipelineStats,
    SharedPipelineLog,
};
