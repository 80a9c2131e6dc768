//! # scopelog - Scoped Execution Telemetry
//!
//! scopelog records what an automation script is doing while it runs: which
//! named scopes are open on which task, what was logged inside them, and how
//! much CPU, memory and threads the process tree is using. Everything lands in
//! a DEFLATE-compressed binary event log that a replay viewer can scrub
//! through frame by frame.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         Host Script                             │
//! │        begin_scope("build") / log(...) / fork / spawn           │
//! └───────────────────────┬─────────────────────────────────────────┘
//!                         │
//!                         ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    TelemetryContext                             │
//! │                                                                 │
//! │  ┌──────────────┐   ┌──────────────┐   ┌──────────────┐        │
//! │  │ ScopeTracker │   │   Sampler    │   │  FrameClock  │        │
//! │  │ (task-local) │   │   (/proc)    │   │   (timer)    │        │
//! │  └──────┬───────┘   └──────┬───────┘   └──────┬───────┘        │
//! │         │                  │                  │                 │
//! │         ▼                  ▼                  ▼                 │
//! │  ┌──────────────────────────────────────────────────────┐      │
//! │  │     EventLogWriter (entity registry, frame counter)   │      │
//! │  └──────────────────────────┬───────────────────────────┘      │
//! └─────────────────────────────┼───────────────────────────────────┘
//!                               ▼
//!                      DEFLATE record stream
//! ```
//!
//! ## Module Structure
//!
//! - [`scope`]: immutable scope stacks and their task-local propagation
//! - [`eventlog`]: entity registry, record writer and reader
//! - [`sampling`]: process-tree enumeration and resource change detection
//! - [`frame_clock`]: stopwatch-driven frame boundaries
//! - [`timer`]: periodic background threads
//! - [`context`]: wires the above into one [`TelemetryContext`]
//! - [`cancel`]: cancellation token, Ctrl+C and parallel fan-out
//! - [`config`]: JSON-loadable settings
//! - [`dump`], [`cli`]: the `scopelog` inspection tool
//! - [`domain`]: core types (`EntityKey`, `Frame`, `Pid`) and errors
//!
//! The wire format itself lives in the `scopelog-common` crate.
//!
//! ## Typical Usage
//!
//! ```no_run
//! use scopelog::config::TelemetryConfig;
//! use scopelog::context::TelemetryContext;
//! use scopelog::domain::LogLevel;
//!
//! # fn main() -> Result<(), scopelog::domain::TelemetryError> {
//! let telemetry = TelemetryContext::create("run.scopelog", &TelemetryConfig::default())?;
//! {
//!     let _build = telemetry.begin_scope("build");
//!     telemetry.log(LogLevel::Information, "compiling")?;
//! }
//! telemetry.dispose();
//! # Ok(())
//! # }
//! ```

pub mod cancel;
pub mod cli;
pub mod config;
pub mod context;
pub mod domain;
pub mod dump;
pub mod eventlog;
pub mod frame_clock;
pub mod sampling;
pub mod scope;
pub mod timer;

pub use context::TelemetryContext;
