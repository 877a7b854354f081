//! Build-step recording and replay.
//!
//! # Overview
//!
//! While the host build tool runs, the hook adapter hands every command it
//! is about to execute to a [`recorder::RecordingSession`], which appends
//! one JSON line per step (target, command, cwd, dependencies, flags).
//!
//! Later, [`replayer::Replayer`] walks that log in order and re-runs each
//! command whose non-phony dependencies all exist, without going through
//! the build tool's own configuration and dependency analysis. Existence
//! is the only staleness signal: there are no timestamps or hashes in the
//! log.

pub mod recorder;
pub mod recording;
pub mod replayer;
