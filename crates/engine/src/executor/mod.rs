//! Execution state machine.
//!
//! Drives a single invocation through its lifecycle: materialize and verify
//! declarations, resolve attributes, run the work routine, translate its
//! control value into a finalized outcome record, and append the record to
//! the thread's chain. Tolerant execution ([`execute`]) always returns the
//! record; strict execution ([`execute_strict`]) raises a [`Fault`] when
//! the final status is in the configured breakpoint set.

use std::any::TypeId;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info};

use operon_types::{ExecutionState, ExecutionStatus, ValidationErrors};

use crate::attribute::{DeclarationError, resolver, verify_specs};
use crate::chain::Chain;
use crate::context::ContextInput;
use crate::fault::Fault;
use crate::result::{ResultDraft, TaskResult};
use crate::settings::{self, Settings};
use crate::task::{Control, Halt, PendingMark, Run, Task, UNSPECIFIED_REASON};

/// Reason recorded when attribute resolution or an output check fails.
pub const INVALID_REASON: &str = "Invalid";

/// Errors returned by the invocation entry point itself. These are
/// programmer errors, not business outcomes, and are never folded into an
/// outcome record.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The execution already finalized; invocations are single-use.
    #[error("execution already finalized; invocations are single-use")]
    AlreadyFinalized,

    /// The task's declarations are malformed.
    #[error(transparent)]
    Declaration(#[from] DeclarationError),
}

/// One single-use invocation of a task.
///
/// Wraps the task instance together with its verified declarations. The
/// higher-level [`execute`]/[`execute_strict`] helpers build one of these
/// per call; workflows hold them for their members.
pub struct Execution {
    task: Box<dyn Task>,
    task_name: String,
    task_type: TypeId,
    result: Option<TaskResult>,
}

impl Execution {
    /// Wraps a task, verifying its declarations once up front.
    pub fn new<T: Task + 'static>(task: T) -> Result<Self, DeclarationError> {
        let specs = task.attributes();
        verify_specs(&specs, &task.coercions(), &task.validators())?;
        Ok(Self {
            task: Box::new(task),
            task_name: short_type_name(std::any::type_name::<T>()).to_string(),
            task_type: TypeId::of::<T>(),
            result: None,
        })
    }

    /// The finalized record, once the execution ran.
    pub fn result(&self) -> Option<&TaskResult> {
        self.result.as_ref()
    }

    /// The effective settings for this invocation: process defaults merged
    /// with the task's overrides.
    pub fn effective_settings(&self) -> Settings {
        settings::global().merged_with(&self.task.settings())
    }

    /// Runs the invocation. A second call is rejected: once finalized, the
    /// record is immutable and the instance is spent.
    pub fn execute(&mut self, input: impl Into<ContextInput>) -> Result<TaskResult, ExecutionError> {
        if self.result.is_some() {
            return Err(ExecutionError::AlreadyFinalized);
        }

        let context = input.into().into_context();
        let chain = Chain::obtain();
        let index = chain.reserve();
        let started_at = Utc::now();
        let timer = Instant::now();
        let effective = self.effective_settings();

        debug!(task = %self.task_name, index, "task started");

        let specs = self.task.attributes();
        let coercions = self.task.coercions();
        let validators = self.task.validators();
        let resolution = resolver::resolve_all(&specs, &context, self.task.as_ref(), &coercions, &validators);

        let mut draft = ResultDraft {
            task_name: self.task_name.clone(),
            task_type: self.task_type,
            state: ExecutionState::Interrupted,
            status: ExecutionStatus::Failed,
            reason: None,
            metadata: serde_json::Map::new(),
            cause: None,
            context: context.clone(),
            chain: chain.clone(),
            index,
            started_at,
            runtime: timer.elapsed(),
            caused_failure: None,
            threw_failure: None,
        };

        if !resolution.errors.is_empty() {
            // The work routine is never entered on an aggregate validation
            // failure.
            draft.reason = Some(INVALID_REASON.to_string());
            draft.metadata.insert("errors".to_string(), resolution.errors.to_payload());
        } else {
            let mut run = Run::new(context.clone(), resolution.values, effective.clone());
            let control = self.task.call(&mut run);
            let pending = run.take_pending();
            self.settle(&mut draft, control, pending, &effective);
        }

        draft.runtime = timer.elapsed();
        let result = draft.finalize();
        chain.record(index, result.clone());
        info!(
            task = %self.task_name,
            state = %result.state(),
            status = %result.status(),
            runtime_ms = result.runtime().as_millis() as u64,
            "task finished"
        );
        self.result = Some(result.clone());
        Ok(result)
    }

    /// Translates the routine's control value and any pending non-halting
    /// mark into the final state, status, reason, and provenance.
    fn settle(&self, draft: &mut ResultDraft, control: Control, pending: Option<PendingMark>, effective: &Settings) {
        let (base_status, base_reason, base_metadata) = match pending {
            Some(mark) => (
                mark.status,
                Some(mark.reason.unwrap_or_else(|| UNSPECIFIED_REASON.to_string())),
                mark.metadata,
            ),
            None => (ExecutionStatus::Success, None, serde_json::Map::new()),
        };

        match control {
            Ok(()) => {
                draft.state = if base_status.is_halted() && effective.non_halting_interrupts {
                    ExecutionState::Interrupted
                } else {
                    ExecutionState::Complete
                };
                draft.status = base_status;
                draft.reason = base_reason;
                draft.metadata = base_metadata;

                // Expected outputs are checked only while the status is
                // still success.
                if draft.status == ExecutionStatus::Success {
                    let mut missing = ValidationErrors::new();
                    for output in self.task.outputs() {
                        if !draft.context.contains(&output) {
                            missing.add(output, "is expected in the context after execution");
                        }
                    }
                    if !missing.is_empty() {
                        draft.state = ExecutionState::Interrupted;
                        draft.status = ExecutionStatus::Failed;
                        draft.reason = Some(INVALID_REASON.to_string());
                        draft.metadata.insert("errors".to_string(), missing.to_payload());
                    }
                }
            }
            Err(Halt::Skip { reason, metadata }) => {
                draft.state = ExecutionState::Interrupted;
                if base_status.can_transition_to(ExecutionStatus::Skipped) {
                    draft.status = ExecutionStatus::Skipped;
                    draft.reason = Some(reason.unwrap_or_else(|| UNSPECIFIED_REASON.to_string()));
                    draft.metadata = metadata;
                } else {
                    draft.status = base_status;
                    draft.reason = base_reason;
                    draft.metadata = base_metadata;
                }
            }
            Err(Halt::Fail { reason, metadata, cause }) => {
                draft.state = ExecutionState::Interrupted;
                if base_status.can_transition_to(ExecutionStatus::Failed) {
                    draft.status = ExecutionStatus::Failed;
                    draft.reason = Some(reason.unwrap_or_else(|| UNSPECIFIED_REASON.to_string()));
                    draft.metadata = metadata;
                    draft.cause = cause;
                } else {
                    draft.status = base_status;
                    draft.reason = base_reason;
                    draft.metadata = base_metadata;
                }
            }
            Err(Halt::Throw { outcome, metadata }) => {
                draft.state = outcome.state();
                draft.status = if base_status.can_transition_to(outcome.status()) {
                    outcome.status()
                } else {
                    base_status
                };
                draft.reason = outcome.reason().map(str::to_string);
                let mut merged = outcome.metadata().clone();
                merged.extend(metadata);
                draft.metadata = merged;
                // The true origin is forwarded transitively; the thrown
                // outcome itself is recorded as what this invocation threw.
                draft.caused_failure = Some(outcome.caused_failure().cloned().unwrap_or_else(|| outcome.clone()));
                draft.threw_failure = Some(outcome);
            }
            Err(Halt::Error(error)) => {
                draft.state = ExecutionState::Interrupted;
                draft.status = ExecutionStatus::Failed;
                draft.reason = Some(error.to_string());
                draft.cause = Some(Arc::new(error));
                draft.metadata = base_metadata;
            }
        }
    }
}

/// Invokes a task tolerantly: the outcome record is always returned and
/// business failures never raise.
///
/// # Panics
///
/// Panics when the task's declarations are malformed; that is a programmer
/// error, detected before anything runs.
pub fn execute<T: Task + 'static>(task: T, input: impl Into<ContextInput>) -> TaskResult {
    let mut execution = Execution::new(task).unwrap_or_else(|error| panic!("invalid task declaration: {}", error));
    execution.execute(input).expect("fresh execution cannot be finalized")
}

/// Invokes a task strictly: raises the matching [`Fault`] when the final
/// status is in the effective breakpoint set (by default, failures only).
///
/// # Panics
///
/// Panics when the task's declarations are malformed.
pub fn execute_strict<T: Task + 'static>(task: T, input: impl Into<ContextInput>) -> Result<TaskResult, Fault> {
    let mut execution = Execution::new(task).unwrap_or_else(|error| panic!("invalid task declaration: {}", error));
    let effective = execution.effective_settings();
    let result = execution.execute(input).expect("fresh execution cannot be finalized");
    if effective.task_breakpoints.contains(&result.status())
        && let Some(fault) = Fault::from_result(&result)
    {
        return Err(fault);
    }
    Ok(result)
}

fn short_type_name(full: &str) -> &str {
    full.rsplit("::").next().unwrap_or(full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeSpec;
    use crate::settings::SettingsPatch;
    use serde_json::json;

    struct Greet;

    impl Task for Greet {
        fn attributes(&self) -> Vec<AttributeSpec> {
            vec![AttributeSpec::required("name").coerce("string")]
        }

        fn outputs(&self) -> Vec<String> {
            vec!["greeting".to_string()]
        }

        fn call(&mut self, run: &mut Run) -> Control {
            let name: String = run.attribute_as("name")?;
            run.context().insert("greeting", json!(format!("hello {}", name)));
            Ok(())
        }
    }

    struct Forgetful;

    impl Task for Forgetful {
        fn outputs(&self) -> Vec<String> {
            vec!["greeting".to_string()]
        }

        fn call(&mut self, _run: &mut Run) -> Control {
            Ok(())
        }
    }

    struct AlwaysSkip;

    impl Task for AlwaysSkip {
        fn call(&mut self, _run: &mut Run) -> Control {
            Err(Halt::skip("nothing to do").with_metadata("batch", json!(3)))
        }
    }

    struct Explodes;

    impl Task for Explodes {
        fn call(&mut self, _run: &mut Run) -> Control {
            let _: i64 = "oops".parse().map_err(anyhow::Error::from)?;
            Ok(())
        }
    }

    struct MarksFailure {
        interrupts: bool,
    }

    impl Task for MarksFailure {
        fn settings(&self) -> SettingsPatch {
            SettingsPatch::default().non_halting_interrupts(self.interrupts)
        }

        fn call(&mut self, run: &mut Run) -> Control {
            run.mark_failed("quota exceeded");
            run.context().insert("kept_going", json!(true));
            Ok(())
        }
    }

    #[test]
    fn successful_run_completes_with_outputs_satisfied() {
        let result = execute(Greet, json!({ "name": "ada" }));

        assert_eq!(result.state(), ExecutionState::Complete);
        assert_eq!(result.status(), ExecutionStatus::Success);
        assert_eq!(result.context().get("greeting"), Some(json!("hello ada")));
        assert!(result.is_executed());
    }

    #[test]
    fn invalid_attributes_never_enter_the_routine() {
        let result = execute(Greet, json!({}));

        assert_eq!(result.state(), ExecutionState::Interrupted);
        assert_eq!(result.status(), ExecutionStatus::Failed);
        assert_eq!(result.reason(), Some(INVALID_REASON));
        assert_eq!(result.errors().unwrap()["messages"], json!({ "name": ["is required"] }));
        assert_eq!(result.context().get("greeting"), None);
    }

    #[test]
    fn coercion_failure_matches_the_documented_shape() {
        struct Age;

        impl Task for Age {
            fn attributes(&self) -> Vec<AttributeSpec> {
                vec![AttributeSpec::required("age").coerce("integer")]
            }

            fn call(&mut self, _run: &mut Run) -> Control {
                Ok(())
            }
        }

        let result = execute(Age, json!({ "age": "30x" }));

        assert_eq!(result.status(), ExecutionStatus::Failed);
        assert_eq!(result.reason(), Some("Invalid"));
        assert_eq!(
            result.errors().unwrap()["messages"],
            json!({ "age": ["could not coerce into an integer"] })
        );
    }

    #[test]
    fn missing_outputs_convert_success_to_invalid() {
        let result = execute(Forgetful, json!({}));

        assert_eq!(result.status(), ExecutionStatus::Failed);
        assert_eq!(result.reason(), Some(INVALID_REASON));
        assert_eq!(
            result.errors().unwrap()["messages"],
            json!({ "greeting": ["is expected in the context after execution"] })
        );
    }

    #[test]
    fn skip_halts_interrupt_with_reason_and_metadata() {
        let result = execute(AlwaysSkip, json!({}));

        assert_eq!(result.state(), ExecutionState::Interrupted);
        assert_eq!(result.status(), ExecutionStatus::Skipped);
        assert_eq!(result.reason(), Some("nothing to do"));
        assert_eq!(result.metadata().get("batch"), Some(&json!(3)));
    }

    #[test]
    fn uncontrolled_errors_are_captured_with_their_cause() {
        let result = execute(Explodes, json!({}));

        assert_eq!(result.state(), ExecutionState::Interrupted);
        assert_eq!(result.status(), ExecutionStatus::Failed);
        assert!(result.cause().is_some());
    }

    #[test]
    fn non_halting_failure_leaves_state_complete_by_default() {
        let result = execute(MarksFailure { interrupts: false }, json!({}));

        assert_eq!(result.state(), ExecutionState::Complete);
        assert_eq!(result.status(), ExecutionStatus::Failed);
        assert_eq!(result.reason(), Some("quota exceeded"));
        assert_eq!(result.context().get("kept_going"), Some(json!(true)));
    }

    #[test]
    fn non_halting_mark_metadata_lands_on_the_record() {
        struct MarksWithDetail;

        impl Task for MarksWithDetail {
            fn call(&mut self, run: &mut Run) -> Control {
                run.mark_skipped_with("already imported", "batch", json!(12));
                Ok(())
            }
        }

        let result = execute(MarksWithDetail, json!({}));

        assert_eq!(result.status(), ExecutionStatus::Skipped);
        assert_eq!(result.reason(), Some("already imported"));
        assert_eq!(result.metadata().get("batch"), Some(&json!(12)));
    }

    #[test]
    fn non_halting_failure_can_be_configured_to_interrupt() {
        let result = execute(MarksFailure { interrupts: true }, json!({}));

        assert_eq!(result.state(), ExecutionState::Interrupted);
        assert_eq!(result.status(), ExecutionStatus::Failed);
    }

    #[test]
    fn finalized_executions_reject_reinvocation() {
        let mut execution = Execution::new(AlwaysSkip).unwrap();
        execution.execute(json!({})).unwrap();

        let error = execution.execute(json!({})).unwrap_err();
        assert!(matches!(error, ExecutionError::AlreadyFinalized));
    }

    #[test]
    fn strict_mode_raises_on_failure_but_returns_skips() {
        let fault = execute_strict(Forgetful, json!({})).unwrap_err();
        assert!(matches!(fault, Fault::Failed(_)));
        assert!(fault.is_for::<Forgetful>());
        assert!(!fault.is_for::<AlwaysSkip>());
        assert!(fault.matches(|result| result.reason() == Some(INVALID_REASON)));

        let result = execute_strict(AlwaysSkip, json!({})).unwrap();
        assert_eq!(result.status(), ExecutionStatus::Skipped);
    }

    #[test]
    fn skip_can_be_added_to_strict_breakpoints_per_task() {
        struct StrictSkip;

        impl Task for StrictSkip {
            fn settings(&self) -> SettingsPatch {
                SettingsPatch::default().task_breakpoints(vec![ExecutionStatus::Failed, ExecutionStatus::Skipped])
            }

            fn call(&mut self, _run: &mut Run) -> Control {
                Err(Halt::skip_unexplained())
            }
        }

        let fault = execute_strict(StrictSkip, json!({})).unwrap_err();
        assert!(matches!(fault, Fault::Skipped(_)));
        assert_eq!(fault.result().reason(), Some(crate::task::UNSPECIFIED_REASON));
    }

    #[test]
    fn throw_preserves_provenance_transitively() {
        struct Origin;

        impl Task for Origin {
            fn call(&mut self, _run: &mut Run) -> Control {
                Err(Halt::fail("root failure"))
            }
        }

        struct Relay {
            outcome: TaskResult,
        }

        impl Task for Relay {
            fn call(&mut self, _run: &mut Run) -> Control {
                Err(Halt::throw(&self.outcome))
            }
        }

        let x = execute(Origin, json!({}));
        let y = execute(Relay { outcome: x.clone() }, json!({}));
        let z = execute(Relay { outcome: y.clone() }, json!({}));

        assert!(x.is_caused_failure());
        assert!(y.is_threw_failure());
        assert!(z.is_thrown_failure());

        assert_eq!(z.caused_failure().unwrap().task_name(), x.task_name());
        assert_eq!(z.caused_failure().unwrap().index(), x.index());
        assert_eq!(z.threw_failure().unwrap().index(), y.index());
        assert_eq!(z.reason(), Some("root failure"));
    }

    #[test]
    fn results_are_chained_in_invocation_order() {
        Chain::clear();
        let first = execute(AlwaysSkip, json!({}));
        let second = execute(Forgetful, json!({}));

        assert!(first.chain().same_as(second.chain()));
        assert_eq!(first.index(), 0);
        assert_eq!(second.index(), 1);
        assert_eq!(first.chain().status(), Some(ExecutionStatus::Skipped));
        Chain::clear();
    }
}
