//! Pipe and operator contracts.
//!
//! A [`Pipe`] is anything that turns a batch of items into another batch,
//! synchronously or asynchronously. Sub-pipelines embedded in conf trees
//! are pipes, and so is a compiled [`Pipeline`](crate::Pipeline).
//!
//! An [`Operator`] is one stage of a pipeline. It consumes a lazy item
//! stream and produces another, exposing both a pull-based entry point
//! (`process`) and a future-of-stream one (`process_async`) that must yield
//! the same items in the same order.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde_json::{Map, Value};

use crate::Item;
use crate::dispatch::DispatchKind;
use crate::error::Result;

/// Pull-based item stream passed between stages.
pub type ItemIter<'a> = Box<dyn Iterator<Item = Result<Item>> + 'a>;

/// Asynchronous item stream passed between stages.
pub type ItemStream<'a> = BoxStream<'a, Result<Item>>;

// ---------------------------------------------------------------------------
// Context
// ---------------------------------------------------------------------------

/// Execution context forwarded unchanged to every operator and sub-pipeline.
///
/// Cloning is cheap; the engine never inspects the contents.
#[derive(Debug, Clone, Default)]
pub struct Context {
    verbose: bool,
    inputs: Arc<Map<String, Value>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Attach a named user input.
    pub fn with_input(mut self, name: impl Into<String>, value: Value) -> Self {
        Arc::make_mut(&mut self.inputs).insert(name.into(), value);
        self
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn input(&self, name: &str) -> Option<&Value> {
        self.inputs.get(name)
    }
}

// ---------------------------------------------------------------------------
// Pipes
// ---------------------------------------------------------------------------

/// A compiled pipe that can be evaluated on a batch of items.
pub trait Pipe: Send + Sync {
    /// Name used in registries and error messages.
    fn name(&self) -> &str;

    /// Whether the pipe may be re-invoked once per upstream item.
    fn loopable(&self) -> bool {
        true
    }

    /// Run the pipe to completion on the calling thread.
    fn run(&self, ctx: &Context, items: Vec<Item>) -> Result<Vec<Item>>;

    /// Run the pipe, suspending wherever its stages do.
    fn run_async<'a>(
        &'a self,
        ctx: &'a Context,
        items: Vec<Item>,
    ) -> BoxFuture<'a, Result<Vec<Item>>>;
}

type PipeFn = dyn Fn(&Context, Vec<Item>) -> Result<Vec<Item>> + Send + Sync;

/// A pipe backed by a plain function.
///
/// Useful for collaborators outside this crate (string or source modules)
/// whose work does not suspend.
#[derive(Clone)]
pub struct FnPipe {
    name: String,
    func: Arc<PipeFn>,
}

impl FnPipe {
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Context, Vec<Item>) -> Result<Vec<Item>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }
}

impl fmt::Debug for FnPipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnPipe").field("name", &self.name).finish()
    }
}

impl Pipe for FnPipe {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: &Context, items: Vec<Item>) -> Result<Vec<Item>> {
        (self.func)(ctx, items)
    }

    fn run_async<'a>(
        &'a self,
        ctx: &'a Context,
        items: Vec<Item>,
    ) -> BoxFuture<'a, Result<Vec<Item>>> {
        Box::pin(async move { (self.func)(ctx, items) })
    }
}

/// Named pipes that conf trees may reference as sub-pipelines.
#[derive(Clone, Default)]
pub struct PipeRegistry {
    pipes: HashMap<String, Arc<dyn Pipe>>,
}

impl PipeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `pipe` under its own name, replacing any previous entry.
    pub fn register(&mut self, pipe: Arc<dyn Pipe>) {
        self.pipes.insert(pipe.name().to_string(), pipe);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Pipe>> {
        self.pipes.get(name)
    }

    pub fn len(&self) -> usize {
        self.pipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipes.is_empty()
    }
}

impl fmt::Debug for PipeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.pipes.keys().collect();
        names.sort();
        f.debug_struct("PipeRegistry").field("pipes", &names).finish()
    }
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

/// Static description of an operator module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorInfo {
    /// Module name as used in pipeline definitions.
    pub name: &'static str,
    /// Coercion applied to the datum paired with each item's conf.
    pub dispatch: DispatchKind,
    /// Whether the main conf parameter is a list of rules.
    pub listize: bool,
    /// Whether the module may run inside a per-item sub-pipeline.
    pub loopable: bool,
}

/// One stage of a pipeline.
pub trait Operator: Send + Sync {
    fn info(&self) -> OperatorInfo;

    /// Wrap `input` in this stage's pull-based transformation.
    ///
    /// Setup failures (such as an invalid static pattern) are returned
    /// here, before any item is pulled.
    fn process<'a>(&'a self, ctx: &Context, input: ItemIter<'a>) -> Result<ItemIter<'a>>;

    /// Asynchronous counterpart of [`process`](Operator::process).
    fn process_async<'a>(
        &'a self,
        ctx: &Context,
        input: ItemStream<'a>,
    ) -> BoxFuture<'a, Result<ItemStream<'a>>>;
}
