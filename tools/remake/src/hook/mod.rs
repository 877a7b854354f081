//! Adapter between a host build tool and the recorder.
//!
//! The host describes target files once, gets back a [`TargetId`] for each,
//! and then reports every command it is about to run as a [`BuildStepEvent`]
//! that refers to targets by id. Shared target nodes live in a
//! [`TargetArena`], so dependency lists are plain id sequences. Whether a
//! dependency is phony belongs to the edge reported with each event, not to
//! the shared node.
//!
//! Recording never influences the host: [`HookContext::on_command`] always
//! answers [`HookVerdict::Proceed`].

pub mod ffi;

use crate::config::{load_config, CliOverrides, EnvMap};
use crate::errors::RemakeError;
use crate::replay::recorder::{CapturedStep, RecorderStats, RecordingSession};
use crate::replay::recording::DependencyRef;
use crate::runtime::ProductionFileSystem;
use std::collections::HashMap;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(u32);

impl TargetId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Default)]
pub struct TargetArena {
    names: Vec<String>,
    by_name: HashMap<String, TargetId>,
}

impl TargetArena {
    /// Returns the existing id for `name`, or a fresh one.
    pub fn intern(&mut self, name: &str) -> TargetId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        let id = TargetId(self.names.len() as u32);
        self.names.push(name.to_string());
        self.by_name.insert(name.to_string(), id);
        id
    }

    pub fn name(&self, id: TargetId) -> Option<&str> {
        self.names.get(id.index()).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// One prerequisite of a step, as the host reported it for that step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DependencyEdge {
    pub target: TargetId,
    pub phony: bool,
}

impl DependencyEdge {
    pub fn file(target: TargetId) -> Self {
        Self {
            target,
            phony: false,
        }
    }

    pub fn phony(target: TargetId) -> Self {
        Self {
            target,
            phony: true,
        }
    }
}

/// Snapshot of one command the host is about to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStepEvent {
    pub target: TargetId,
    pub dependencies: Vec<DependencyEdge>,
    pub command: String,
    pub continue_on_error: bool,
    /// Working directory of the host process when the command was issued.
    pub working_directory: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookVerdict {
    Proceed,
}

/// Per-session hook state: the target arena and the open recording, if any.
#[derive(Default)]
pub struct HookContext {
    pub targets: TargetArena,
    session: Option<RecordingSession>,
}

impl HookContext {
    pub fn new(session: Option<RecordingSession>) -> Self {
        Self {
            targets: TargetArena::default(),
            session,
        }
    }

    /// Builds the context from the environment (`MAKE_LOG`, `REMAKE_CONFIG`,
    /// `REMAKE_ENTRY_POINT`). No log destination means recording is off.
    pub fn from_env(env: &EnvMap) -> Result<Self, RemakeError> {
        let cfg = load_config(&CliOverrides::default(), env, &ProductionFileSystem)?;
        Ok(Self::new(RecordingSession::from_config(&cfg.recording)?))
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    pub fn stats(&self) -> RecorderStats {
        self.session
            .as_ref()
            .map(RecordingSession::stats)
            .unwrap_or_default()
    }

    /// Count an event the adapter could not snapshot.
    pub(crate) fn note_dropped(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.note_dropped();
        }
    }

    pub fn on_command(&mut self, event: &BuildStepEvent) -> HookVerdict {
        let Some(session) = self.session.as_mut() else {
            return HookVerdict::Proceed;
        };
        match resolve_event(&self.targets, event) {
            Some(step) => session.record(step),
            None => session.note_dropped(),
        }
        HookVerdict::Proceed
    }
}

fn resolve_event(targets: &TargetArena, event: &BuildStepEvent) -> Option<CapturedStep> {
    let target = targets.name(event.target)?;
    let dependencies = event
        .dependencies
        .iter()
        .map(|edge| {
            targets.name(edge.target).map(|name| DependencyRef {
                path: name.to_string(),
                is_phony: edge.phony,
            })
        })
        .collect::<Option<Vec<_>>>()?;
    Some(CapturedStep {
        target: target.to_string(),
        command: event.command.clone(),
        dependencies,
        continue_on_error: event.continue_on_error,
        working_directory: event.working_directory.clone(),
    })
}
