//! Tests for the in-memory process catalog

use std::sync::Arc;

use process_orchestrator::core::{
    PreparedTask, ProcessCatalog, ProcessDescriptor, ProgressSink, QuoteEstimate, TaskError,
};
use process_orchestrator::infra::InMemoryProcessCatalog;
use process_orchestrator::util::ExecutionMode;
use serde_json::{json, Value};

struct Constant {
    id: &'static str,
    value: i64,
}

impl ProcessDescriptor for Constant {
    fn process_id(&self) -> &str {
        self.id
    }

    fn create_task(&self, _params: Value, _progress: ProgressSink) -> Result<PreparedTask, TaskError> {
        let value = self.value;
        Ok(PreparedTask::from_fn(move |_cancel| async move { Ok(json!(value)) }))
    }
}

#[test]
fn test_register_and_resolve() {
    let catalog = InMemoryProcessCatalog::new()
        .with(Constant { id: "one", value: 1 })
        .with(Constant { id: "two", value: 2 });
    assert_eq!(catalog.list(), ["one", "two"]);

    let descriptor = catalog.resolve("two").unwrap();
    assert_eq!(descriptor.process_id(), "two");
    assert!(descriptor.supports_mode(ExecutionMode::Sync));
    assert!(descriptor.supports_mode(ExecutionMode::Async));
    assert_eq!(descriptor.preferred_mode(), ExecutionMode::Async);
}

#[test]
fn test_default_quote_is_free() {
    let catalog = InMemoryProcessCatalog::new().with(Constant { id: "one", value: 1 });
    let estimate = catalog.resolve("one").unwrap().quote(&json!({})).unwrap();
    assert_eq!(estimate, QuoteEstimate::default());
}

#[test]
fn test_replace_and_unregister() {
    let catalog = InMemoryProcessCatalog::new().with(Constant { id: "p", value: 1 });
    catalog.register(Arc::new(Constant { id: "p", value: 2 }));
    assert_eq!(catalog.list(), ["p"]);

    assert!(catalog.unregister("p"));
    assert!(!catalog.unregister("p"));
    let err = catalog.resolve("p").err().unwrap();
    assert!(err.is_not_found());
    assert_eq!(err.code(), "NoSuchProcess");
}
