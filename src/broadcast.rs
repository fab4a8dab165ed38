//! Broadcast engine: per-item resolution of an operator's conf.
//!
//! For every upstream item the engine produces a [`Triple`]:
//!
//! - `pieces`: the conf resolved against the item (a list of rules when the
//!   parameter is listized, a single value otherwise)
//! - `with`: the datum the operator pairs with the pieces, usually the item
//! - `pass`: whether the item must bypass the operator untouched
//!
//! Items are independent, so the engine only has to keep their order. Both
//! [`Broadcast::broadcast`] and [`Broadcast::broadcast_async`] are lazy and
//! hold at most one item in flight.

use std::fmt;
use std::sync::Arc;

use futures::stream::{Stream, StreamExt};
use serde_json::Value;
use tracing::debug;

use crate::Item;
use crate::conf::{ConfNode, SubPipe};
use crate::error::Result;
use crate::pipe::Context;
use crate::schedule;
use crate::step::ItemTask;

/// Bypass predicate evaluated per item.
pub type PassIf = Arc<dyn Fn(&Item) -> bool + Send + Sync>;

/// What the engine pairs with each item's resolved conf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WithKind {
    /// The item, or the value at the `with` path when one is configured.
    #[default]
    With,
    /// The item itself.
    Pass,
    /// Nothing.
    None,
}

/// Engine configuration for one operator.
#[derive(Clone)]
pub struct BroadcastOptions {
    /// Operator name used in logs and errors.
    pub module: String,
    /// Name of the conf parameter being resolved (error locations).
    pub location: String,
    /// Treat the conf as a list of rule definitions.
    pub listize: bool,
    /// Wrap each resolved rule as `{d_index: rule}`.
    pub d_index: Option<String>,
    pub ftype: WithKind,
    /// Path read from the item for [`WithKind::With`].
    pub with: Option<String>,
    pub pass_if: Option<PassIf>,
}

impl BroadcastOptions {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            ..Self::default()
        }
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = location.into();
        self
    }

    pub fn listize(mut self, listize: bool) -> Self {
        self.listize = listize;
        self
    }

    pub fn d_index(mut self, key: impl Into<String>) -> Self {
        self.d_index = Some(key.into());
        self
    }

    pub fn ftype(mut self, ftype: WithKind) -> Self {
        self.ftype = ftype;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.with = Some(path.into());
        self
    }

    pub fn pass_if(mut self, pass_if: Option<PassIf>) -> Self {
        self.pass_if = pass_if;
        self
    }
}

impl Default for BroadcastOptions {
    fn default() -> Self {
        Self {
            module: "pipe".to_string(),
            location: "conf".to_string(),
            listize: true,
            d_index: None,
            ftype: WithKind::With,
            with: None,
            pass_if: None,
        }
    }
}

impl fmt::Debug for BroadcastOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BroadcastOptions")
            .field("module", &self.module)
            .field("location", &self.location)
            .field("listize", &self.listize)
            .field("d_index", &self.d_index)
            .field("ftype", &self.ftype)
            .field("with", &self.with)
            .field("pass_if", &self.pass_if.is_some())
            .finish()
    }
}

/// Resolved conf for one item.
#[derive(Debug, Clone, PartialEq)]
pub enum Pieces {
    List(Vec<Value>),
    Single(Value),
}

impl Pieces {
    /// The pieces as a list; a single value becomes a list of one.
    pub fn into_list(self) -> Vec<Value> {
        match self {
            Self::List(values) => values,
            Self::Single(value) => vec![value],
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::List(values) => values.len(),
            Self::Single(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The engine's per-item output and its only contract with operators.
#[derive(Debug, Clone, PartialEq)]
pub struct Triple {
    pub pieces: Pieces,
    pub with: Value,
    pub pass: bool,
}

enum Defs {
    List(Vec<ConfNode>),
    Single(ConfNode),
}

/// Resolves one operator's conf against each item of a stream.
pub struct Broadcast {
    defs: Defs,
    sub_pipes: Vec<SubPipe>,
    options: BroadcastOptions,
}

impl Broadcast {
    /// Prepare the engine for `conf`.
    ///
    /// A missing listized parameter resolves to an empty rule list; a
    /// missing single parameter resolves to an empty record.
    pub fn new(conf: Option<&ConfNode>, options: BroadcastOptions) -> Self {
        let defs = if options.listize {
            let mut defs: Vec<ConfNode> = conf
                .map(|c| c.listize().into_iter().cloned().collect())
                .unwrap_or_default();
            if let Some(key) = &options.d_index {
                defs = defs
                    .into_iter()
                    .map(|def| ConfNode::record([(key.clone(), def)]))
                    .collect();
            }
            Defs::List(defs)
        } else {
            Defs::Single(conf.cloned().unwrap_or_else(|| ConfNode::Record(Vec::new())))
        };

        let sub_pipes: Vec<SubPipe> = match &defs {
            Defs::List(nodes) => nodes.iter().flat_map(ConfNode::sub_pipes).cloned().collect(),
            Defs::Single(node) => node.sub_pipes().into_iter().cloned().collect(),
        };

        debug!(
            module = %options.module,
            listize = options.listize,
            defs = match &defs {
                Defs::List(nodes) => nodes.len(),
                Defs::Single(_) => 1,
            },
            sub_pipes = sub_pipes.len(),
            "broadcast prepared"
        );

        Self {
            defs,
            sub_pipes,
            options,
        }
    }

    pub fn options(&self) -> &BroadcastOptions {
        &self.options
    }

    pub fn module(&self) -> &str {
        &self.options.module
    }

    /// Conf definitions in resolution order.
    pub fn defs(&self) -> &[ConfNode] {
        match &self.defs {
            Defs::List(nodes) => nodes,
            Defs::Single(node) => std::slice::from_ref(node),
        }
    }

    /// Sub-pipelines that must run for every item, in resolution order.
    pub fn sub_pipes(&self) -> &[SubPipe] {
        &self.sub_pipes
    }

    /// Resolve the conf against `item`, consuming sub-pipeline outputs in
    /// [`sub_pipes`](Broadcast::sub_pipes) order.
    pub fn get_pieces<I>(&self, item: &Item, outputs: &mut I) -> Result<Pieces>
    where
        I: Iterator<Item = Vec<Item>>,
    {
        let module = self.options.module.as_str();
        let location = self.options.location.as_str();
        match &self.defs {
            Defs::List(nodes) => nodes
                .iter()
                .enumerate()
                .map(|(i, node)| {
                    node.resolve_with(item, outputs, module, &format!("{location}[{i}]"))
                })
                .collect::<Result<Vec<_>>>()
                .map(Pieces::List),
            Defs::Single(node) => node
                .resolve_with(item, outputs, module, location)
                .map(Pieces::Single),
        }
    }

    /// The datum paired with the resolved conf.
    pub fn get_with(&self, item: Item) -> Value {
        match self.options.ftype {
            WithKind::With => match &self.options.with {
                Some(path) => item.get(path, Value::String(String::new())),
                None => item.into_value(),
            },
            WithKind::Pass => item.into_value(),
            WithKind::None => Value::Null,
        }
    }

    /// Pieces handed out for a bypassed item: no rules, or an empty record.
    pub fn empty_pieces(&self) -> Pieces {
        match self.defs {
            Defs::List(_) => Pieces::List(Vec::new()),
            Defs::Single(_) => Pieces::Single(Value::Object(serde_json::Map::new())),
        }
    }

    /// Whether `item` bypasses the operator.
    pub fn get_pass(&self, item: &Item) -> bool {
        self.options.pass_if.as_ref().is_some_and(|test| test(item))
    }

    /// Start resolving `item`.
    pub fn task(&self, item: Item) -> ItemTask<'_> {
        ItemTask::new(self, item)
    }

    /// Lazily resolve every item, running sub-pipelines on the calling
    /// thread.
    pub fn broadcast<'a, I>(
        &'a self,
        ctx: &'a Context,
        items: I,
    ) -> impl Iterator<Item = Result<Triple>> + 'a
    where
        I: IntoIterator<Item = Item>,
        I::IntoIter: 'a,
    {
        items
            .into_iter()
            .map(move |item| schedule::immediate(self, ctx, item))
    }

    /// Lazily resolve every item, awaiting sub-pipelines.
    pub fn broadcast_async<'a, S>(
        &'a self,
        ctx: &'a Context,
        items: S,
    ) -> impl Stream<Item = Result<Triple>> + 'a
    where
        S: Stream<Item = Item> + 'a,
    {
        items.then(move |item| schedule::suspending(self, ctx, item))
    }
}

impl fmt::Debug for Broadcast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Broadcast")
            .field("defs", &self.defs().len())
            .field("sub_pipes", &self.sub_pipes)
            .field("options", &self.options)
            .finish()
    }
}
