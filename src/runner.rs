//! Text-level entry points: JSON pipeline definitions over JSON-lines
//! items.
//!
//! Input is one JSON value per line (blank lines are skipped; non-object
//! values are wrapped under `content`). Output uses the same format.

use futures::stream::{self, TryStreamExt};
use serde_json::Value;

use crate::Item;
use crate::error::Result;
use crate::executor::Pipeline;
use crate::pipe::{Context, PipeRegistry};

/// Parse JSON-lines text into items.
pub fn parse_items(input_text: &str) -> Result<Vec<Item>> {
    input_text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| Ok(Item::from_value(serde_json::from_str::<Value>(line)?)))
        .collect()
}

/// Render items as JSON lines.
pub fn format_items(items: &[Item]) -> String {
    items
        .iter()
        .map(Item::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

fn load(pipeline_text: &str, registry: &PipeRegistry) -> Result<Pipeline> {
    let def: Value = serde_json::from_str(pipeline_text)?;
    Pipeline::from_json("main", &def, registry)
}

/// Execute a pipeline definition against JSON-lines input.
///
/// Returns the output text and the input and output item counts.
pub fn execute_pipeline(input_text: &str, pipeline_text: &str) -> Result<(String, usize, usize)> {
    execute_pipeline_with(input_text, pipeline_text, &PipeRegistry::new(), &Context::new())
}

/// [`execute_pipeline`] with named sub-pipelines and a context.
pub fn execute_pipeline_with(
    input_text: &str,
    pipeline_text: &str,
    registry: &PipeRegistry,
    ctx: &Context,
) -> Result<(String, usize, usize)> {
    let pipeline = load(pipeline_text, registry)?;
    let input = parse_items(input_text)?;
    let input_count = input.len();
    let output = pipeline.execute(ctx, input)?.collect::<Result<Vec<_>>>()?;
    Ok((format_items(&output), input_count, output.len()))
}

/// Asynchronous form of [`execute_pipeline`]; the output is identical.
pub async fn execute_pipeline_async(
    input_text: &str,
    pipeline_text: &str,
) -> Result<(String, usize, usize)> {
    execute_pipeline_async_with(input_text, pipeline_text, &PipeRegistry::new(), &Context::new())
        .await
}

/// Asynchronous form of [`execute_pipeline_with`].
pub async fn execute_pipeline_async_with(
    input_text: &str,
    pipeline_text: &str,
    registry: &PipeRegistry,
    ctx: &Context,
) -> Result<(String, usize, usize)> {
    let pipeline = load(pipeline_text, registry)?;
    let input = parse_items(input_text)?;
    let input_count = input.len();
    let output: Vec<Item> = pipeline
        .execute_async(ctx, stream::iter(input))
        .await?
        .try_collect()
        .await?;
    Ok((format_items(&output), input_count, output.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipeError;
    use futures::executor::block_on;

    const PIPELINE: &str = r#"[{"module": "regex", "conf": {"RULE": [
        {"field": {"value": "title"}, "match": {"value": "World"}, "replace": {"value": "Pipes"}}
    ]}}]"#;

    #[test]
    fn test_parse_items_skips_blank_lines() {
        let items = parse_items("{\"a\": 1}\n\n  \n\"text\"\n").unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].to_string(), r#"{"content":"text"}"#);
    }

    #[test]
    fn test_parse_items_rejects_bad_json() {
        assert!(matches!(parse_items("{nope"), Err(PipeError::Json(_))));
    }

    #[test]
    fn test_execute_pipeline_counts() {
        let input = "{\"title\": \"Hello World\"}\n{\"title\": \"Bye\"}\n";
        let (output, input_count, output_count) = execute_pipeline(input, PIPELINE).unwrap();
        assert_eq!(input_count, 2);
        assert_eq!(output_count, 2);
        assert_eq!(output, "{\"title\":\"Hello Pipes\"}\n{\"title\":\"Bye\"}");
    }

    #[test]
    fn test_async_runner_matches() {
        let input = "{\"title\": \"World World\"}\n";
        let sync = execute_pipeline(input, PIPELINE).unwrap();
        let async_out = block_on(execute_pipeline_async(input, PIPELINE)).unwrap();
        assert_eq!(sync, async_out);
    }

    #[test]
    fn test_empty_input() {
        let (output, input_count, output_count) = execute_pipeline("", PIPELINE).unwrap();
        assert_eq!((output.as_str(), input_count, output_count), ("", 0, 0));
    }
}
