//! Process resource sampling
//!
//! - `process_tree`: [`ProcessSource`] seam, `/proc` implementation and
//!   depth-first tree collection
//! - `sampler`: change detection and the timer-driven [`ResourceSampler`]
//! - `cpu_utils`: online CPU count for CPU normalisation

pub mod cpu_utils;
pub mod process_tree;
pub mod sampler;

pub use cpu_utils::online_cpu_count;
pub use process_tree::{collect_tree, ProcFs, ProcessInfo, ProcessSource, ProcessTable};
pub use sampler::{ResourceChange, ResourceSampler, ResourceSnapshot, SamplerState};
