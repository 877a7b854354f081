//! C ABI for host build tools.
//!
//! The host links against this library, opens one context per run, and
//! calls `remake_hook_on_command` right before executing each command.
//! Every pointer read happens in this file. Bad input (null pointers, an
//! ABI version we don't speak) is ignored, and the host always gets 0 back:
//! recording never changes what the host does next.

use super::{BuildStepEvent, DependencyEdge, HookContext};
use crate::config::{EnvMap, ENV_RECORDING_ACTIVE};
use crate::replay::recorder::RecordingSession;
use std::ffi::{c_char, c_int, CStr};
use std::path::PathBuf;

pub const REMAKE_HOOK_ABI_VERSION: u32 = 1;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RemakeDependency {
    pub name: *const c_char,
    pub phony: bool,
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RemakeBuildStep {
    /// Must equal `REMAKE_HOOK_ABI_VERSION`.
    pub abi_version: u32,
    pub target: *const c_char,
    pub command: *const c_char,
    pub dependencies: *const RemakeDependency,
    pub dependency_count: usize,
    pub continue_on_error: bool,
}

/// Opens a context configured from the process environment. Never null;
/// configuration errors yield a context that records nothing.
///
/// A recording context exports `REMAKE_RECORDING_ACTIVE`, so nested runs of
/// the host inherit it and append to the log instead of truncating it.
/// Call this before the host starts any threads.
#[no_mangle]
pub extern "C" fn remake_hook_open() -> *mut HookContext {
    let env = std::env::vars_os()
        .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
        .collect::<EnvMap>();
    let ctx = HookContext::from_env(&env).unwrap_or_default();
    if ctx.is_recording() {
        std::env::set_var(ENV_RECORDING_ACTIVE, "1");
    }
    Box::into_raw(Box::new(ctx))
}

/// Opens a context that appends to `log_path`. A null `log_path` disables
/// recording; a null `entry_point` falls back to no recursion detection.
///
/// # Safety
/// Non-null arguments must be valid NUL-terminated strings.
#[no_mangle]
pub unsafe extern "C" fn remake_hook_open_path(
    log_path: *const c_char,
    entry_point: *const c_char,
) -> *mut HookContext {
    let session = read_str(log_path).and_then(|path| {
        let entry = read_str(entry_point).unwrap_or_default();
        RecordingSession::open(PathBuf::from(path), entry, false).ok()
    });
    Box::into_raw(Box::new(HookContext::new(session)))
}

/// Records one step. Always returns 0.
///
/// # Safety
/// `ctx` must come from one of the open functions and not be closed yet.
/// `step`, when non-null, must point to a valid `RemakeBuildStep` whose
/// strings are NUL-terminated and whose `dependencies` array holds
/// `dependency_count` entries.
#[no_mangle]
pub unsafe extern "C" fn remake_hook_on_command(
    ctx: *mut HookContext,
    step: *const RemakeBuildStep,
) -> c_int {
    let Some(ctx) = ctx.as_mut() else {
        return 0;
    };
    match snapshot(ctx, step) {
        Some(event) => {
            ctx.on_command(&event);
        }
        None => ctx.note_dropped(),
    }
    0
}

/// Returns the number of records written by this context so far.
///
/// # Safety
/// `ctx` must be null or a live context.
#[no_mangle]
pub unsafe extern "C" fn remake_hook_records_written(ctx: *const HookContext) -> u64 {
    ctx.as_ref().map(|ctx| ctx.stats().written).unwrap_or(0)
}

/// Closes the log. `ctx` must not be used afterwards.
///
/// # Safety
/// `ctx` must be null or a live context returned by an open function.
#[no_mangle]
pub unsafe extern "C" fn remake_hook_close(ctx: *mut HookContext) {
    if !ctx.is_null() {
        drop(Box::from_raw(ctx));
    }
}

unsafe fn read_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
}

unsafe fn snapshot(ctx: &mut HookContext, step: *const RemakeBuildStep) -> Option<BuildStepEvent> {
    let step = step.as_ref()?;
    if step.abi_version != REMAKE_HOOK_ABI_VERSION {
        return None;
    }
    let target = read_str(step.target)?;
    let command = read_str(step.command)?;
    let raw_deps: &[RemakeDependency] = if step.dependency_count == 0 {
        &[]
    } else if step.dependencies.is_null() {
        return None;
    } else {
        std::slice::from_raw_parts(step.dependencies, step.dependency_count)
    };

    let names = raw_deps
        .iter()
        .map(|dep| read_str(dep.name))
        .collect::<Option<Vec<_>>>()?;
    let working_directory = std::env::current_dir().ok()?;

    let target = ctx.targets.intern(&target);
    let dependencies = names
        .iter()
        .zip(raw_deps)
        .map(|(name, dep)| DependencyEdge {
            target: ctx.targets.intern(name),
            phony: dep.phony,
        })
        .collect();
    Some(BuildStepEvent {
        target,
        dependencies,
        command,
        continue_on_error: step.continue_on_error,
        working_directory,
    })
}
