//! Config nodes: the declarative parameters every operator receives.
//!
//! A parameter is a literal, a reference into the current item, or an
//! embedded sub-pipeline; records and lists of these build up a module's
//! whole conf. Conf trees load from the JSON shape used by pipe
//! definitions:
//!
//! ```text
//! {"value": "World", "type": "text"}       literal
//! {"subkey": "author.name"}                reference (optional "default")
//! {"terminal": "shorten", "path": "title"} sub-pipeline (optional "reduce")
//! {"field": {..}, "match": {..}}           record
//! [{..}, {..}]                             list
//! ```
//!
//! Sub-pipelines are evaluated by a scheduler, not here: [`ConfNode::sub_pipes`]
//! lists them in the order [`ConfNode::resolve_with`] consumes their
//! outputs.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::Item;
use crate::dispatch::DispatchKind;
use crate::error::{PipeError, Result};
use crate::pipe::{Context, Pipe, PipeRegistry};

/// How a sub-pipeline's output becomes a single conf value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reduce {
    /// The first output item (or its `path`), default when there is none.
    #[default]
    First,
    /// Every output item, as a list.
    All,
}

/// A nested pipe evaluated once per outer item.
#[derive(Clone)]
pub struct SubPipe {
    pipe: Arc<dyn Pipe>,
    path: Option<String>,
    reduce: Reduce,
}

impl SubPipe {
    /// Wrap `pipe`, refusing pipes that cannot run once per item.
    pub fn new(pipe: Arc<dyn Pipe>) -> Result<Self> {
        if !pipe.loopable() {
            return Err(PipeError::NotLoopable {
                pipe: pipe.name().to_string(),
            });
        }
        Ok(Self {
            pipe,
            path: None,
            reduce: Reduce::First,
        })
    }

    /// Project each output item onto `path`.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_reduce(mut self, reduce: Reduce) -> Self {
        self.reduce = reduce;
        self
    }

    pub fn name(&self) -> &str {
        self.pipe.name()
    }

    pub fn pipe(&self) -> &Arc<dyn Pipe> {
        &self.pipe
    }

    /// Turn the pipe's output for one item into a conf value.
    pub fn reduce_output(&self, output: Vec<Item>) -> Value {
        let project = |item: Item| match &self.path {
            Some(path) => item.get(path, empty()),
            None => item.into_value(),
        };
        match self.reduce {
            Reduce::First => output.into_iter().next().map(project).unwrap_or_else(empty),
            Reduce::All => Value::Array(output.into_iter().map(project).collect()),
        }
    }
}

impl fmt::Debug for SubPipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubPipe")
            .field("pipe", &self.pipe.name())
            .field("path", &self.path)
            .field("reduce", &self.reduce)
            .finish()
    }
}

/// A declarative parameter definition.
#[derive(Debug, Clone)]
pub enum ConfNode {
    /// A fixed value cast by its kind.
    Literal { value: Value, kind: DispatchKind },
    /// A path into the current item.
    Reference { path: String, default: Value },
    /// A nested pipe run against `[item]`.
    SubPipe(SubPipe),
    /// Named fields, in declaration order.
    Record(Vec<(String, ConfNode)>),
    /// An ordered list of nodes.
    List(Vec<ConfNode>),
}

fn empty() -> Value {
    Value::String(String::new())
}

impl ConfNode {
    /// Literal passed through without coercion.
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal {
            value: value.into(),
            kind: DispatchKind::Pass,
        }
    }

    /// Literal stringified on resolution.
    pub fn text(value: impl Into<String>) -> Self {
        Self::Literal {
            value: Value::String(value.into()),
            kind: DispatchKind::Word,
        }
    }

    /// Reference defaulting to the empty string.
    pub fn reference(path: impl Into<String>) -> Self {
        Self::Reference {
            path: path.into(),
            default: empty(),
        }
    }

    /// Record built from `(name, node)` pairs.
    pub fn record<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, ConfNode)>,
    {
        Self::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Field `key` of a record node.
    pub fn get(&self, key: &str) -> Option<&ConfNode> {
        match self {
            Self::Record(fields) => fields.iter().find(|(k, _)| k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// View the node as a list: lists yield their elements, anything else
    /// is a list of one.
    pub fn listize(&self) -> Vec<&ConfNode> {
        match self {
            Self::List(nodes) => nodes.iter().collect(),
            other => vec![other],
        }
    }

    /// The literal value, when the node is one.
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Self::Literal { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Whether the node resolves the same way for every item.
    pub fn is_static(&self) -> bool {
        match self {
            Self::Literal { .. } => true,
            Self::Reference { .. } | Self::SubPipe(_) => false,
            Self::Record(fields) => fields.iter().all(|(_, v)| v.is_static()),
            Self::List(nodes) => nodes.iter().all(ConfNode::is_static),
        }
    }

    /// Sub-pipelines in the node, depth first.
    pub fn sub_pipes(&self) -> Vec<&SubPipe> {
        let mut found = Vec::new();
        self.collect_sub_pipes(&mut found);
        found
    }

    fn collect_sub_pipes<'a>(&'a self, found: &mut Vec<&'a SubPipe>) {
        match self {
            Self::SubPipe(sub) => found.push(sub),
            Self::Record(fields) => fields.iter().for_each(|(_, v)| v.collect_sub_pipes(found)),
            Self::List(nodes) => nodes.iter().for_each(|v| v.collect_sub_pipes(found)),
            Self::Literal { .. } | Self::Reference { .. } => {}
        }
    }

    /// Resolve against `item`, taking sub-pipeline results from `outputs`
    /// in [`sub_pipes`](ConfNode::sub_pipes) order.
    ///
    /// `location` names this node inside the module's conf and is extended
    /// as the walk descends, so errors point at the offending parameter.
    pub fn resolve_with<I>(
        &self,
        item: &Item,
        outputs: &mut I,
        module: &str,
        location: &str,
    ) -> Result<Value>
    where
        I: Iterator<Item = Vec<Item>>,
    {
        match self {
            Self::Literal { value, kind } => kind.coerce(value.clone()).map_err(|value| {
                PipeError::coercion(module, location, kind.tag(), value.to_string())
            }),
            Self::Reference { path, default } => Ok(item.get(path, default.clone())),
            Self::SubPipe(sub) => match outputs.next() {
                Some(output) => Ok(sub.reduce_output(output)),
                None => Err(PipeError::resolution(
                    module,
                    location,
                    format!("sub-pipeline '{}' was not evaluated", sub.name()),
                )),
            },
            Self::Record(fields) => {
                let mut map = Map::with_capacity(fields.len());
                for (key, node) in fields {
                    let here = child_location(location, key);
                    map.insert(key.clone(), node.resolve_with(item, outputs, module, &here)?);
                }
                Ok(Value::Object(map))
            }
            Self::List(nodes) => nodes
                .iter()
                .enumerate()
                .map(|(i, node)| {
                    node.resolve_with(item, outputs, module, &format!("{location}[{i}]"))
                })
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
        }
    }

    /// Resolve against `item`, running any sub-pipelines synchronously.
    pub fn resolve(&self, ctx: &Context, item: &Item, module: &str) -> Result<Value> {
        let outputs = self
            .sub_pipes()
            .into_iter()
            .map(|sub| sub.pipe().run(ctx, vec![item.clone()]))
            .collect::<Result<Vec<_>>>()?;
        self.resolve_with(item, &mut outputs.into_iter(), module, "")
    }

    // -----------------------------------------------------------------------
    // Loading
    // -----------------------------------------------------------------------

    /// Build a conf tree from its JSON definition.
    ///
    /// `terminal` references are looked up in `registry`; an unknown name
    /// is a setup error.
    pub fn from_json(value: &Value, registry: &PipeRegistry) -> Result<Self> {
        match value {
            Value::Object(map) => {
                if let Some(name) = map.get("terminal") {
                    return Self::load_terminal(name, map, registry);
                }
                if let Some(path) = map.get("subkey") {
                    let path = path.as_str().ok_or_else(|| {
                        PipeError::invalid_conf(format!("subkey must be a string, got {path}"))
                    })?;
                    return Ok(Self::Reference {
                        path: path.to_string(),
                        default: map.get("default").cloned().unwrap_or_else(empty),
                    });
                }
                if let Some(literal) = map.get("value") {
                    let kind = DispatchKind::from_type_attr(map.get("type").and_then(Value::as_str));
                    return Ok(Self::Literal {
                        value: literal.clone(),
                        kind,
                    });
                }
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), Self::from_json(v, registry)?)))
                    .collect::<Result<Vec<_>>>()
                    .map(Self::Record)
            }
            Value::Array(list) => list
                .iter()
                .map(|v| Self::from_json(v, registry))
                .collect::<Result<Vec<_>>>()
                .map(Self::List),
            scalar => Ok(Self::literal(scalar.clone())),
        }
    }

    fn load_terminal(
        name: &Value,
        map: &Map<String, Value>,
        registry: &PipeRegistry,
    ) -> Result<Self> {
        let name = name.as_str().ok_or_else(|| {
            PipeError::invalid_conf(format!("terminal must be a string, got {name}"))
        })?;
        let pipe = registry.get(name).ok_or_else(|| {
            PipeError::resolution("conf", name, format!("no sub-pipeline named '{name}'"))
        })?;
        let mut sub = SubPipe::new(Arc::clone(pipe))?;
        if let Some(path) = map.get("path").and_then(Value::as_str) {
            sub = sub.with_path(path);
        }
        match map.get("reduce").and_then(Value::as_str) {
            None | Some("first") => {}
            Some("all") => sub = sub.with_reduce(Reduce::All),
            Some(other) => {
                return Err(PipeError::invalid_conf(format!(
                    "unknown reduce mode '{other}' (expected first or all)"
                )));
            }
        }
        Ok(Self::SubPipe(sub))
    }
}

fn child_location(location: &str, key: &str) -> String {
    if location.is_empty() {
        key.to_string()
    } else {
        format!("{location}.{key}")
    }
}
