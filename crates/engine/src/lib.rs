//! # Operon Engine
//!
//! Operon executes declared units of business logic in-process. A unit is a
//! [`Task`]: it declares its inputs as attributes, receives a shared
//! [`Context`] of loosely typed values, and runs a work routine that ends
//! either normally or through a controlled halt ([`Halt::skip`],
//! [`Halt::fail`], [`Halt::throw`]). Every invocation produces an immutable
//! [`TaskResult`] capturing state, status, reason, metadata, timing, and —
//! for forwarded outcomes — provenance pointers back to the origin.
//!
//! ## Key Features
//!
//! - **Attribute Resolution**: Declarative inputs with sourcing, defaults,
//!   type coercion, validation, transforms, and nested children; failures
//!   aggregate across all attributes instead of stopping at the first
//! - **Lifecycle Tracking**: A one-way state machine (`initialized` →
//!   `executing` → `complete`/`interrupted`) crossed with a one-way status
//!   track (`success` → `skipped`/`failed`)
//! - **Halt Primitives**: Controlled early returns for skip, fail, and
//!   outcome forwarding, plus capture of uncontrolled errors via `?`
//! - **Chains**: Thread-scoped grouping of every result produced during one
//!   outermost invocation, ordered outermost-first
//! - **Workflows**: Pipelines of member tasks over one shared context with
//!   configurable halt policy
//!
//! ## Usage
//!
//! ```rust
//! use operon_engine::{AttributeSpec, Control, Run, Task, execute};
//! use serde_json::json;
//!
//! struct Greet;
//!
//! impl Task for Greet {
//!     fn attributes(&self) -> Vec<AttributeSpec> {
//!         vec![AttributeSpec::required("name").types(["string"])]
//!     }
//!
//!     fn call(&mut self, run: &mut Run) -> Control {
//!         let name: String = run.attribute_as("name")?;
//!         run.context().insert("greeting", json!(format!("Hello, {name}!")));
//!         Ok(())
//!     }
//! }
//!
//! let result = execute(Greet, json!({ "name": "Ada" }));
//! assert!(result.is_success());
//! assert_eq!(result.context().get("greeting"), Some(json!("Hello, Ada!")));
//! ```
//!
//! ## Architecture
//!
//! - **`context`**: The shared key/value bag tasks read and write
//! - **`attribute`**: Declarations plus the coercion/validation registries
//!   and the resolution pipeline
//! - **`task`**: The [`Task`] trait, [`Run`] handle, and halt primitives
//! - **`executor`**: The invocation state machine and entry points
//! - **`result`** / **`chain`**: Immutable outcome records and their
//!   thread-scoped grouping
//! - **`workflow`**: Sequential pipelines of tasks

pub mod attribute;
pub mod callable;
pub mod chain;
pub mod context;
pub mod executor;
pub mod fault;
pub mod result;
pub mod settings;
pub mod task;
pub mod workflow;

// Re-export commonly used types for convenience
pub use attribute::{
    AttributeSpec, CoercionError, CoercionOptions, CoercionRegistry, DeclarationError, DefaultValue, Requirement,
    RuleError, RuleOptions, Source, ValidationSpec, ValidatorRegistry,
};
pub use callable::{CallScope, Callable, CallableError, Predicate, invoke_callable};
pub use chain::Chain;
pub use context::{Context, ContextInput};
pub use executor::{Execution, ExecutionError, INVALID_REASON, execute, execute_strict};
pub use fault::Fault;
pub use operon_types::{ExecutionState, ExecutionStatus, ValidationErrors};
pub use result::TaskResult;
pub use settings::{Settings, SettingsPatch, configure, global as global_settings};
pub use task::{Control, Halt, Run, Task, UNSPECIFIED_REASON};
pub use workflow::{Group, GroupBuilder, Workflow, WorkflowBuilder};
