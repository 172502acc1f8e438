use operon_engine::attribute::validate;
use operon_engine::{
    AttributeSpec, Chain, Control, ExecutionState, ExecutionStatus, Halt, Run, Task, execute, execute_strict,
};
use serde_json::json;

struct SignUp;

impl Task for SignUp {
    fn attributes(&self) -> Vec<AttributeSpec> {
        vec![
            AttributeSpec::required("email").types(["string"]).validate(validate::format(r"@")),
            AttributeSpec::required("age").types(["integer"]).validate(validate::numeric(Some(18.0), None)),
            AttributeSpec::optional("locale").types(["string"]).default_value(json!("en")),
        ]
    }

    fn outputs(&self) -> Vec<String> {
        vec!["account_id".to_string()]
    }

    fn call(&mut self, run: &mut Run) -> Control {
        let email: String = run.attribute_as("email")?;
        let locale: String = run.attribute_as("locale")?;
        run.context().insert("account_id", json!(format!("{email}:{locale}")));
        Ok(())
    }
}

struct Lookup;

impl Task for Lookup {
    fn call(&mut self, run: &mut Run) -> Control {
        if run.context().get("record").is_none() {
            return Err(Halt::fail("record not found"));
        }
        Ok(())
    }
}

struct Enrich;

impl Task for Enrich {
    fn call(&mut self, run: &mut Run) -> Control {
        let found = execute(Lookup, run.context().clone());
        if found.is_failed() {
            return Err(Halt::throw(&found));
        }
        run.context().insert("enriched", json!(true));
        Ok(())
    }
}

#[test]
fn happy_path_coerces_defaults_and_records_outputs() {
    // Age arrives as a numeric string; the declared integer type coerces it.
    let result = execute(SignUp, json!({ "email": "ada@example.com", "age": "30" }));

    assert_eq!(result.state_status(), (ExecutionState::Complete, ExecutionStatus::Success));
    assert!(result.is_good());
    assert_eq!(result.context().get("account_id"), Some(json!("ada@example.com:en")));
    assert_eq!(result.index(), 0);
    assert!(result.reason().is_none());
}

#[test]
fn validation_failures_aggregate_across_attributes() {
    let result = execute(SignUp, json!({ "email": "not-an-email", "age": 12 }));

    assert_eq!(result.state_status(), (ExecutionState::Interrupted, ExecutionStatus::Failed));
    assert_eq!(result.reason(), Some("Invalid"));
    // The routine never ran, so no output landed in the context.
    assert_eq!(result.context().get("account_id"), None);

    let errors = result.errors().expect("errors payload present");
    let messages = errors.get("messages").expect("messages map present");
    assert!(messages.get("email").is_some(), "email failure missing: {errors}");
    assert!(messages.get("age").is_some(), "age failure missing: {errors}");
}

#[test]
fn fixing_one_attribute_leaves_the_other_failure_reported() {
    let result = execute(SignUp, json!({ "email": "ada@example.com", "age": 12 }));

    let errors = result.errors().expect("errors payload present");
    let messages = errors.get("messages").expect("messages map present");
    assert!(messages.get("email").is_none());
    assert!(messages.get("age").is_some());
}

#[test]
fn nested_invocations_share_one_chain_outermost_first() {
    Chain::clear();

    let result = execute(Enrich, json!({}));

    assert!(result.is_failed());
    let chain = result.chain();
    assert_eq!(chain.len(), 2);
    let results = chain.results();
    assert_eq!(results[0].task_name(), "Enrich");
    assert_eq!(results[1].task_name(), "Lookup");
    assert_eq!(results[0].index(), 0);
    assert_eq!(results[1].index(), 1);
    // The chain summarizes through its outermost record.
    assert_eq!(chain.status(), Some(ExecutionStatus::Failed));
}

#[test]
fn thrown_outcomes_point_back_at_the_origin() {
    let result = execute(Enrich, json!({}));

    assert_eq!(result.threw_failure().expect("threw pointer").task_name(), "Lookup");
    assert_eq!(result.caused_failure().expect("caused pointer").task_name(), "Lookup");
    assert!(result.is_threw_failure());
    assert!(!result.is_caused_failure());
}

#[test]
fn chains_are_isolated_per_thread() {
    Chain::clear();
    let local = execute(Enrich, json!({ "record": 1 }));

    let remote = std::thread::spawn(|| {
        Chain::clear();
        execute(Enrich, json!({ "record": 1 }))
    })
    .join()
    .expect("worker thread panicked");

    assert_ne!(local.chain().id(), remote.chain().id());
    assert!(!local.chain().same_as(remote.chain()));
}

#[test]
fn strict_execution_raises_on_failure_with_the_full_record() {
    let fault = execute_strict(Lookup, json!({})).expect_err("failure should raise");

    assert!(fault.is_for::<Lookup>());
    assert_eq!(fault.result().reason(), Some("record not found"));
    assert_eq!(fault.to_string(), format!("failed: {}", fault.result()));
}

#[test]
fn strict_execution_returns_successes_untouched() {
    let result = execute_strict(Lookup, json!({ "record": 1 })).expect("success should not raise");
    assert!(result.is_success());
}

#[test]
fn outcome_hooks_fire_by_predicate() {
    let result = execute(Lookup, json!({ "record": 1 }));

    let mut seen = Vec::new();
    result
        .on_success(|_| seen.push("success"))
        .on_failed(|_| seen.push("failed"))
        .on_complete(|_| seen.push("complete"));

    assert_eq!(seen, ["success", "complete"]);
}
