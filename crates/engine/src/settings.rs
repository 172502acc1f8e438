//! Layered engine configuration.
//!
//! Process-wide defaults live behind a lock and can be adjusted with
//! [`configure`]; a task type contributes a [`SettingsPatch`] that is merged
//! over the defaults once at invocation entry. The merged [`Settings`] value
//! is then threaded explicitly through the executor, which never reads the
//! global state mid-run.

use std::sync::RwLock;

use once_cell::sync::Lazy;
use operon_types::ExecutionStatus;

/// Effective configuration for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Statuses that make strict-mode execution raise a fault.
    pub task_breakpoints: Vec<ExecutionStatus>,
    /// Statuses that stop a workflow after a member finishes.
    pub workflow_breakpoints: Vec<ExecutionStatus>,
    /// Whether a non-halting skip/fail forces the final state to
    /// `interrupted`. When false the routine's normal return finalizes as
    /// `complete` with the recorded halted status.
    pub non_halting_interrupts: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            task_breakpoints: vec![ExecutionStatus::Failed],
            workflow_breakpoints: vec![ExecutionStatus::Failed],
            non_halting_interrupts: false,
        }
    }
}

impl Settings {
    /// Applies a per-task patch over this configuration.
    pub fn merged_with(&self, patch: &SettingsPatch) -> Settings {
        Settings {
            task_breakpoints: patch.task_breakpoints.clone().unwrap_or_else(|| self.task_breakpoints.clone()),
            workflow_breakpoints: patch
                .workflow_breakpoints
                .clone()
                .unwrap_or_else(|| self.workflow_breakpoints.clone()),
            non_halting_interrupts: patch.non_halting_interrupts.unwrap_or(self.non_halting_interrupts),
        }
    }
}

/// Partial configuration contributed by a task type; `None` fields inherit
/// the process-wide defaults.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SettingsPatch {
    pub task_breakpoints: Option<Vec<ExecutionStatus>>,
    pub workflow_breakpoints: Option<Vec<ExecutionStatus>>,
    pub non_halting_interrupts: Option<bool>,
}

impl SettingsPatch {
    pub fn task_breakpoints(mut self, statuses: impl Into<Vec<ExecutionStatus>>) -> Self {
        self.task_breakpoints = Some(statuses.into());
        self
    }

    pub fn workflow_breakpoints(mut self, statuses: impl Into<Vec<ExecutionStatus>>) -> Self {
        self.workflow_breakpoints = Some(statuses.into());
        self
    }

    pub fn non_halting_interrupts(mut self, interrupts: bool) -> Self {
        self.non_halting_interrupts = Some(interrupts);
        self
    }
}

static GLOBAL: Lazy<RwLock<Settings>> = Lazy::new(|| RwLock::new(Settings::default()));

/// Copies the current process-wide defaults.
pub fn global() -> Settings {
    GLOBAL.read().expect("settings lock poisoned").clone()
}

/// Adjusts the process-wide defaults in place.
pub fn configure(adjust: impl FnOnce(&mut Settings)) {
    let mut settings = GLOBAL.write().expect("settings lock poisoned");
    adjust(&mut settings);
}

/// Restores the process-wide defaults. Intended for tests.
pub fn reset_global() {
    *GLOBAL.write().expect("settings lock poisoned") = Settings::default();
}
