//! Workflows: tasks whose work routine runs other tasks.
//!
//! A workflow declares ordered groups of member tasks that all run against
//! the same shared context, so later members observe earlier members'
//! writes. Each group may carry `if`/`unless` guards (an unsatisfied guard
//! skips its members with no outcome side effects) and a breakpoint
//! override. After a member finishes, its status is compared against the
//! effective breakpoint set — group override, else workflow setting, else
//! the global default of failures only — and a match makes the workflow
//! re-raise the member's outcome with provenance preserved and stop. A
//! skipped member outside the breakpoint set is a no-op.

use indexmap::IndexMap;
use tracing::debug;

use operon_types::ExecutionStatus;

use crate::attribute::DeclarationError;
use crate::callable::{CallScope, Predicate};
use crate::executor::Execution;
use crate::settings::SettingsPatch;
use crate::task::{Control, Halt, Run, Task};

type MemberFactory = Box<dyn Fn() -> Result<Execution, DeclarationError> + Send + Sync>;

struct Member {
    name: String,
    factory: MemberFactory,
}

/// An ordered set of members sharing guards and a breakpoint override.
pub struct Group {
    members: Vec<Member>,
    only_if: Option<Predicate>,
    unless: Option<Predicate>,
    breakpoints: Option<Vec<ExecutionStatus>>,
}

impl Group {
    fn new() -> Self {
        Self {
            members: Vec::new(),
            only_if: None,
            unless: None,
            breakpoints: None,
        }
    }
}

/// Builder for one member group.
pub struct GroupBuilder {
    group: Group,
}

impl GroupBuilder {
    /// Adds a member constructed through `Default`.
    pub fn task<T: Task + Default + 'static>(mut self) -> Self {
        self.group.members.push(member::<T, _>(T::default));
        self
    }

    /// Adds a member built by a factory, for tasks that need arguments.
    pub fn task_with<T: Task + 'static>(mut self, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        self.group.members.push(member::<T, _>(factory));
        self
    }

    /// Runs the group only when the guard holds.
    pub fn only_if(mut self, guard: Predicate) -> Self {
        self.group.only_if = Some(guard);
        self
    }

    /// Skips the group when the guard holds.
    pub fn unless(mut self, guard: Predicate) -> Self {
        self.group.unless = Some(guard);
        self
    }

    /// Overrides the breakpoint statuses for this group's members.
    pub fn breakpoints(mut self, statuses: impl Into<Vec<ExecutionStatus>>) -> Self {
        self.group.breakpoints = Some(statuses.into());
        self
    }
}

fn member<T: Task + 'static, F: Fn() -> T + Send + Sync + 'static>(factory: F) -> Member {
    Member {
        name: short_name::<T>(),
        factory: Box::new(move || Execution::new(factory())),
    }
}

fn short_name<T>() -> String {
    std::any::type_name::<T>().rsplit("::").next().unwrap_or("task").to_string()
}

/// A multi-step pipeline of member tasks. Itself a [`Task`], so workflows
/// nest and execute through the same entry points as any other unit.
pub struct Workflow {
    name: String,
    groups: Vec<Group>,
    patch: SettingsPatch,
}

impl Workflow {
    /// Starts a named workflow definition.
    pub fn builder(name: impl Into<String>) -> WorkflowBuilder {
        WorkflowBuilder {
            name: name.into(),
            groups: Vec::new(),
            patch: SettingsPatch::default(),
        }
    }

    /// The workflow's declared name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Task for Workflow {
    fn settings(&self) -> SettingsPatch {
        self.patch.clone()
    }

    fn call(&mut self, run: &mut Run) -> Control {
        let no_attributes = IndexMap::new();
        for group in &self.groups {
            let satisfied = {
                let scope = CallScope::new(run.context(), &no_attributes, None);
                let wanted = group.only_if.as_ref().map(|guard| guard.evaluate(&scope)).unwrap_or(true);
                let excused = group.unless.as_ref().map(|guard| guard.evaluate(&scope)).unwrap_or(false);
                wanted && !excused
            };
            if !satisfied {
                debug!(workflow = %self.name, "group guard unsatisfied; members not invoked");
                continue;
            }

            let breakpoints = group.breakpoints.as_ref().unwrap_or(&run.settings().workflow_breakpoints);

            for member in &group.members {
                let mut execution = (member.factory)().map_err(|error| Halt::Error(anyhow::Error::new(error)))?;
                let result = execution
                    .execute(run.context().clone())
                    .map_err(|error| Halt::Error(anyhow::Error::new(error)))?;

                debug!(
                    workflow = %self.name,
                    member = %member.name,
                    status = %result.status(),
                    "workflow member finished"
                );

                if breakpoints.contains(&result.status()) {
                    // Re-raise the member's outcome untouched so provenance
                    // points at the member, never at the workflow.
                    return Err(Halt::throw(&result));
                }
            }
        }
        Ok(())
    }
}

/// Builder for a [`Workflow`].
pub struct WorkflowBuilder {
    name: String,
    groups: Vec<Group>,
    patch: SettingsPatch,
}

impl WorkflowBuilder {
    /// Adds an ungrouped member constructed through `Default`.
    pub fn task<T: Task + Default + 'static>(self) -> Self {
        self.group(|group| group.task::<T>())
    }

    /// Adds an ungrouped member built by a factory.
    pub fn task_with<T: Task + 'static>(self, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        self.group(|group| group.task_with(factory))
    }

    /// Adds a group of members sharing guards and overrides.
    pub fn group(mut self, build: impl FnOnce(GroupBuilder) -> GroupBuilder) -> Self {
        let builder = build(GroupBuilder { group: Group::new() });
        self.groups.push(builder.group);
        self
    }

    /// Overrides the breakpoint statuses for the whole workflow.
    pub fn breakpoints(mut self, statuses: impl Into<Vec<ExecutionStatus>>) -> Self {
        self.patch.workflow_breakpoints = Some(statuses.into());
        self
    }

    pub fn build(self) -> Workflow {
        Workflow {
            name: self.name,
            groups: self.groups,
            patch: self.patch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::execute;
    use operon_types::ExecutionState;
    use serde_json::json;

    #[derive(Default)]
    struct Record(&'static str);

    impl Record {
        fn named(name: &'static str) -> impl Fn() -> Record + Send + Sync {
            move || Record(name)
        }
    }

    impl Task for Record {
        fn call(&mut self, run: &mut Run) -> Control {
            let mut order: Vec<String> = run
                .context()
                .get("order")
                .and_then(|value| serde_json::from_value(value).ok())
                .unwrap_or_default();
            order.push(self.0.to_string());
            run.context().insert("order", json!(order));
            Ok(())
        }
    }

    #[derive(Default)]
    struct Fails;

    impl Task for Fails {
        fn call(&mut self, _run: &mut Run) -> Control {
            Err(Halt::fail("member broke"))
        }
    }

    #[derive(Default)]
    struct Skips;

    impl Task for Skips {
        fn call(&mut self, _run: &mut Run) -> Control {
            Err(Halt::skip("member idle"))
        }
    }

    fn recorded_order(result: &crate::result::TaskResult) -> Vec<String> {
        result
            .context()
            .get("order")
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }

    #[test]
    fn members_share_one_context_in_declaration_order() {
        let workflow = Workflow::builder("trace")
            .task_with(Record::named("a"))
            .task_with(Record::named("b"))
            .task_with(Record::named("c"))
            .build();

        let result = execute(workflow, json!({}));
        assert!(result.is_success());
        assert_eq!(recorded_order(&result), ["a", "b", "c"]);
    }

    #[test]
    fn default_breakpoints_stop_on_the_failing_member() {
        let workflow = Workflow::builder("halts")
            .task_with(Record::named("first"))
            .task::<Fails>()
            .task_with(Record::named("third"))
            .build();

        let result = execute(workflow, json!({}));

        assert_eq!(result.status(), ExecutionStatus::Failed);
        assert_eq!(result.reason(), Some("member broke"));
        assert_eq!(recorded_order(&result), ["first"]);
        assert_eq!(result.threw_failure().unwrap().task_name(), "Fails");
        assert!(result.is_thrown_failure());
    }

    #[test]
    fn skipped_members_are_no_ops_by_default() {
        let workflow = Workflow::builder("tolerant")
            .task_with(Record::named("first"))
            .task::<Skips>()
            .task_with(Record::named("third"))
            .build();

        let result = execute(workflow, json!({}));
        assert!(result.is_success());
        assert_eq!(recorded_order(&result), ["first", "third"]);
    }

    #[test]
    fn group_breakpoints_override_the_workflow_default() {
        let workflow = Workflow::builder("strict_group")
            .group(|group| {
                group
                    .task_with(Record::named("first"))
                    .task::<Skips>()
                    .breakpoints(vec![ExecutionStatus::Failed, ExecutionStatus::Skipped])
            })
            .task_with(Record::named("after"))
            .build();

        let result = execute(workflow, json!({}));

        assert_eq!(result.status(), ExecutionStatus::Skipped);
        assert_eq!(result.state(), ExecutionState::Interrupted);
        assert_eq!(result.reason(), Some("member idle"));
        assert_eq!(recorded_order(&result), ["first"]);
    }

    #[test]
    fn unsatisfied_guard_skips_the_group_silently() {
        let workflow = Workflow::builder("guarded")
            .group(|group| {
                group
                    .task_with(Record::named("gated"))
                    .only_if(Predicate::new(|scope| {
                        scope.context().get("enabled").and_then(|value| value.as_bool()).unwrap_or(false)
                    }))
            })
            .task_with(Record::named("always"))
            .build();

        let result = execute(workflow, json!({ "enabled": false }));
        assert!(result.is_success());
        assert_eq!(recorded_order(&result), ["always"]);
    }

    #[test]
    fn workflow_level_breakpoints_apply_to_all_groups() {
        let workflow = Workflow::builder("skip_breaks")
            .task_with(Record::named("first"))
            .task::<Skips>()
            .task_with(Record::named("third"))
            .breakpoints(vec![ExecutionStatus::Failed, ExecutionStatus::Skipped])
            .build();

        let result = execute(workflow, json!({}));

        assert_eq!(result.status(), ExecutionStatus::Skipped);
        assert_eq!(recorded_order(&result), ["first"]);
    }

    #[test]
    fn nested_workflows_propagate_member_failures_upward() {
        let inner = || {
            Workflow::builder("inner")
                .task_with(Record::named("inner_first"))
                .task::<Fails>()
                .build()
        };
        let outer = Workflow::builder("outer")
            .task_with(Record::named("outer_first"))
            .task_with(inner)
            .task_with(Record::named("outer_last"))
            .build();

        let result = execute(outer, json!({}));

        assert_eq!(result.status(), ExecutionStatus::Failed);
        assert_eq!(recorded_order(&result), ["outer_first", "inner_first"]);
        // The origin is forwarded transitively through both workflows.
        assert_eq!(result.caused_failure().unwrap().task_name(), "Fails");
    }
}
