//! Pipeline executor.
//!
//! A [`Pipeline`] chains operator stages. Executing it wraps the input in
//! each stage in turn, so nothing is pulled until the caller pulls from
//! the result: items flow one at a time through the whole chain. The
//! synchronous and asynchronous forms build the same chain over
//! `Iterator` and `Stream` respectively.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::{self, Stream, StreamExt, TryStreamExt};
use serde_json::Value;
use tracing::debug;

use crate::Item;
use crate::error::{PipeError, Result};
use crate::modules::{self, StageDef};
use crate::pipe::{Context, ItemIter, ItemStream, Operator, Pipe, PipeRegistry};

/// An ordered chain of operator stages.
#[derive(Clone)]
pub struct Pipeline {
    name: String,
    stages: Vec<Arc<dyn Operator>>,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stages: Vec::new(),
        }
    }

    /// Append a stage.
    pub fn stage(mut self, operator: Arc<dyn Operator>) -> Self {
        self.stages.push(operator);
        self
    }

    /// Build from a JSON array of stage definitions.
    pub fn from_json(name: impl Into<String>, def: &Value, registry: &PipeRegistry) -> Result<Self> {
        let defs: Vec<StageDef> = serde_json::from_value(def.clone())?;
        let mut pipeline = Self::new(name);
        for def in &defs {
            pipeline = pipeline.stage(modules::build(def, registry)?);
        }
        debug!(
            pipeline = %pipeline.name,
            stages = pipeline.stages.len(),
            loopable = pipeline.loopable(),
            "pipeline built"
        );
        Ok(pipeline)
    }

    pub fn stages(&self) -> &[Arc<dyn Operator>] {
        &self.stages
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Chain every stage over `input`.
    ///
    /// Stage setup errors are returned here; item errors come out of the
    /// returned iterator.
    pub fn execute<'a, I>(&'a self, ctx: &Context, input: I) -> Result<ItemIter<'a>>
    where
        I: IntoIterator<Item = Item>,
        I::IntoIter: 'a,
    {
        let mut current: ItemIter<'a> = Box::new(input.into_iter().map(Ok::<Item, PipeError>));
        for stage in &self.stages {
            current = stage.process(ctx, current)?;
        }
        Ok(current)
    }

    /// Asynchronous counterpart of [`execute`](Pipeline::execute).
    pub async fn execute_async<'a, S>(&'a self, ctx: &Context, input: S) -> Result<ItemStream<'a>>
    where
        S: Stream<Item = Item> + Send + 'a,
    {
        let mut current: ItemStream<'a> = input.map(Ok::<Item, PipeError>).boxed();
        for stage in &self.stages {
            current = stage.process_async(ctx, current).await?;
        }
        Ok(current)
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stages: Vec<&str> = self.stages.iter().map(|s| s.info().name).collect();
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("stages", &stages)
            .finish()
    }
}

impl Pipe for Pipeline {
    fn name(&self) -> &str {
        &self.name
    }

    fn loopable(&self) -> bool {
        self.stages.iter().all(|s| s.info().loopable)
    }

    fn run(&self, ctx: &Context, items: Vec<Item>) -> Result<Vec<Item>> {
        self.execute(ctx, items)?.collect()
    }

    fn run_async<'a>(
        &'a self,
        ctx: &'a Context,
        items: Vec<Item>,
    ) -> BoxFuture<'a, Result<Vec<Item>>> {
        Box::pin(async move {
            self.execute_async(ctx, stream::iter(items))
                .await?
                .try_collect()
                .await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conf::SubPipe;
    use crate::runner::{execute_pipeline, execute_pipeline_async};
    use futures::executor::block_on;
    use serde_json::json;
    use std::fs;
    use std::path::Path;

    fn regex_stage(field: &str, pattern: &str, replace: &str) -> Value {
        json!({
            "module": "regex",
            "conf": {"RULE": [{
                "field": {"value": field},
                "match": {"value": pattern},
                "replace": {"value": replace}
            }]}
        })
    }

    fn two_stage() -> Pipeline {
        let def = json!([
            regex_stage("title", "World", "Pipes"),
            regex_stage("title", "Pipes", "Streams"),
        ]);
        Pipeline::from_json("two", &def, &PipeRegistry::new()).unwrap()
    }

    /// Assert both schedulers produce identical output for a fixture pipeline.
    fn assert_equivalence(fixture: &str) {
        let fixture_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("specs");
        let input = fs::read_to_string(fixture_dir.join("items.jsonl")).unwrap();
        let pipeline = fs::read_to_string(fixture_dir.join(fixture)).unwrap();

        let sync_output = execute_pipeline(&input, &pipeline).unwrap();
        let async_output = block_on(execute_pipeline_async(&input, &pipeline)).unwrap();

        assert_eq!(
            sync_output, async_output,
            "async output differs from sync for {fixture}"
        );
    }

    // --- Unit tests ---

    #[test]
    fn test_stages_run_in_order() {
        let pipeline = two_stage();
        assert_eq!(pipeline.len(), 2);
        let out = pipeline
            .run(&Context::new(), vec![Item::from_value(json!({"title": "Hello World"}))])
            .unwrap();
        assert_eq!(out[0].get("title", json!("")), json!("Hello Streams"));
    }

    #[test]
    fn test_empty_pipeline_passes_through() {
        let pipeline = Pipeline::new("empty");
        assert!(pipeline.is_empty());
        let items = vec![Item::from_value(json!({"a": 1}))];
        assert_eq!(pipeline.run(&Context::new(), items.clone()).unwrap(), items);
    }

    #[test]
    fn test_execute_is_lazy() {
        let pipeline = two_stage();
        let ctx = Context::new();
        let input = (0..).map(|n| Item::from_value(json!({"title": format!("World {n}")})));
        let first: Vec<Item> = pipeline
            .execute(&ctx, input)
            .unwrap()
            .take(3)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first[2].get("title", json!("")), json!("Streams 2"));
    }

    #[test]
    fn test_run_async_matches_run() {
        let pipeline = two_stage();
        let ctx = Context::new();
        let items = vec![
            Item::from_value(json!({"title": "Hello World"})),
            Item::from_value(json!({"title": "nothing"})),
        ];
        let sync = pipeline.run(&ctx, items.clone()).unwrap();
        let async_out = block_on(pipeline.run_async(&ctx, items)).unwrap();
        assert_eq!(sync, async_out);
    }

    #[test]
    fn test_regex_pipeline_not_loopable() {
        let pipeline = Arc::new(two_stage());
        assert!(!pipeline.loopable());
        let err = SubPipe::new(pipeline).unwrap_err();
        assert!(matches!(err, PipeError::NotLoopable { ref pipe } if pipe == "two"));
        assert!(Pipeline::new("empty").loopable());
    }

    #[test]
    fn test_setup_error_before_items() {
        let def = json!([regex_stage("title", "(", "x")]);
        let pipeline = Pipeline::from_json("bad", &def, &PipeRegistry::new()).unwrap();
        let err = pipeline.execute(&Context::new(), Vec::new()).err().unwrap();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_malformed_definition() {
        let err = Pipeline::from_json("bad", &json!({"module": "regex"}), &PipeRegistry::new())
            .unwrap_err();
        assert!(matches!(err, PipeError::Json(_)));
    }

    // --- Equivalence tests for all fixture pipelines ---

    macro_rules! equiv_test {
        ($name:ident, $file:expr) => {
            #[test]
            fn $name() {
                assert_equivalence($file);
            }
        };
    }

    equiv_test!(equiv_back_references, "back-references.json");
    equiv_test!(equiv_bypass_draft, "bypass-draft.json");
    equiv_test!(equiv_case_insensitive, "case-insensitive.json");
    equiv_test!(equiv_chained_rules, "chained-rules.json");
    equiv_test!(equiv_collapse_whitespace, "collapse-whitespace.json");
    equiv_test!(equiv_dynamic_match, "dynamic-match.json");
    equiv_test!(equiv_empty_rules, "empty-rules.json");
    equiv_test!(equiv_hello_pipes, "hello-pipes.json");
    equiv_test!(equiv_missing_field, "missing-field.json");
    equiv_test!(equiv_multi_field, "multi-field.json");
    equiv_test!(equiv_multi_stage, "multi-stage.json");
    equiv_test!(equiv_nested_path, "nested-path.json");
}
