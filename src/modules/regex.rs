//! Regex operator: grouped, ordered search-and-replace on item fields.
//!
//! Each rule reads "in `field` replace `match` with `replace`". Rules are
//! grouped by field in order of first appearance; inside a group they are
//! folded left to right, each one rewriting the output of the previous.
//!
//! ```text
//! {"RULE": [
//!     {"field": {"value": "title"}, "match": {"value": "World"},
//!      "replace": {"value": "Pipes"}, "globalmatch": {"value": "1"}}
//! ]}
//! ```
//!
//! Flags are set when their resolved value is truthy: `globalmatch`
//! replaces every match instead of the first, `singlelinematch` lets `.`
//! match newlines, `multilinematch` anchors `^`/`$` per line and
//! `casematch` ignores case.
//!
//! The operator is not loopable: a pipeline containing it cannot be used
//! as a per-item sub-pipeline.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::{self, BoxFuture};
use futures::stream::{self, Stream, StreamExt};
use regex::{Regex, RegexBuilder};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::Item;
use crate::broadcast::{Broadcast, BroadcastOptions, PassIf, Pieces, Triple, WithKind};
use crate::conf::ConfNode;
use crate::dispatch::{Convert, Dispatch, DispatchKind, Dispatched, is_truthy, to_word};
use crate::error::{ErrorPolicy, PipeError, Result};
use crate::modules::StageDef;
use crate::pipe::{Context, ItemIter, ItemStream, Operator, OperatorInfo, PipeRegistry};
use crate::schedule;

pub const NAME: &str = "regex";

/// Conf key holding the rule list.
pub const RULE_KEY: &str = "RULE";

pub const INFO: OperatorInfo = OperatorInfo {
    name: NAME,
    dispatch: DispatchKind::Pass,
    listize: true,
    loopable: false,
};

/// Asynchronous output of the operator.
pub type RegexStream<'a> = ItemStream<'a>;

// ---------------------------------------------------------------------------
// Options and rules
// ---------------------------------------------------------------------------

#[derive(Clone, Default)]
pub struct RegexOptions {
    /// Items matching the predicate are re-emitted untouched.
    pub pass_if: Option<PassIf>,
    pub on_error: ErrorPolicy,
}

impl RegexOptions {
    pub fn pass_if<F>(mut self, test: F) -> Self
    where
        F: Fn(&Item) -> bool + Send + Sync + 'static,
    {
        self.pass_if = Some(Arc::new(test));
        self
    }

    pub fn on_error(mut self, policy: ErrorPolicy) -> Self {
        self.on_error = policy;
        self
    }
}

impl fmt::Debug for RegexOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegexOptions")
            .field("pass_if", &self.pass_if.is_some())
            .field("on_error", &self.on_error)
            .finish()
    }
}

/// Compile-time modifiers of a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Flags {
    pub case_insensitive: bool,
    pub multi_line: bool,
    pub dot_all: bool,
}

impl Flags {
    fn from_rule(rule: &Value) -> Self {
        let flag = |key: &str| rule.get(key).is_some_and(is_truthy);
        Self {
            case_insensitive: flag("casematch"),
            multi_line: flag("multilinematch"),
            dot_all: flag("singlelinematch"),
        }
    }
}

/// A resolved rule with its pattern compiled.
#[derive(Debug, Clone)]
pub struct Rule {
    pub field: String,
    pub pattern: Regex,
    pub replace: String,
    pub global: bool,
}

/// Compiled patterns for one operator invocation, keyed by source and
/// flags.
///
/// Only patterns retained through [`compile`](PatternCache::compile) are
/// stored. Patterns that change from item to item go through
/// [`fetch`](PatternCache::fetch), so the cache never grows with the
/// stream.
#[derive(Debug, Default)]
pub struct PatternCache {
    compiled: HashMap<(String, Flags), Regex>,
}

impl PatternCache {
    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }

    /// Compiled form of `pattern`, compiling and retaining it on first use.
    pub fn compile(&mut self, pattern: &str, flags: Flags) -> std::result::Result<Regex, regex::Error> {
        let key = (pattern.to_string(), flags);
        if let Some(re) = self.compiled.get(&key) {
            return Ok(re.clone());
        }
        let re = build_pattern(pattern, flags)?;
        self.compiled.insert(key, re.clone());
        Ok(re)
    }

    /// Retained form of `pattern` if there is one, else a fresh compile that
    /// is not kept.
    pub fn fetch(&self, pattern: &str, flags: Flags) -> std::result::Result<Regex, regex::Error> {
        match self.compiled.get(&(pattern.to_string(), flags)) {
            Some(re) => Ok(re.clone()),
            None => build_pattern(pattern, flags),
        }
    }
}

fn build_pattern(pattern: &str, flags: Flags) -> std::result::Result<Regex, regex::Error> {
    RegexBuilder::new(pattern)
        .case_insensitive(flags.case_insensitive)
        .multi_line(flags.multi_line)
        .dot_matches_new_line(flags.dot_all)
        .build()
}

/// First dispatch stage: turns resolved rule records into [`Rule`]s.
#[derive(Debug)]
pub struct RuleCompiler {
    module: String,
    cache: PatternCache,
}

impl RuleCompiler {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            cache: PatternCache::default(),
        }
    }

    pub fn cache(&self) -> &PatternCache {
        &self.cache
    }

    /// Compile every rule whose definition is the same for all items.
    ///
    /// Fails before any item is processed when one of them is invalid.
    pub fn prime(&mut self, defs: &[ConfNode]) -> Result<()> {
        let blank = Item::new();
        for (index, def) in defs.iter().enumerate().filter(|(_, d)| d.is_static()) {
            let location = format!("{RULE_KEY}[{index}]");
            let value = def.resolve_with(&blank, &mut std::iter::empty(), &self.module, &location)?;
            self.compile_rule(index, &value, true)?;
        }
        Ok(())
    }

    /// Compile one resolved rule. Only `retain` puts its pattern in the
    /// cache.
    fn compile_rule(&mut self, index: usize, rule: &Value, retain: bool) -> Result<Rule> {
        let word = |key: &str| rule.get(key).map(to_word).unwrap_or_default();
        let field = word("field");
        let pattern = word("match");
        let flags = Flags::from_rule(rule);
        let compiled = if retain {
            self.cache.compile(&pattern, flags)
        } else {
            self.cache.fetch(&pattern, flags)
        };
        let compiled = compiled.map_err(|source| PipeError::PatternCompile {
            module: self.module.clone(),
            rule: index,
            field: field.clone(),
            pattern: pattern.clone(),
            source,
        })?;
        Ok(Rule {
            field,
            pattern: compiled,
            replace: convert_replacement(&word("replace")),
            global: rule.get("globalmatch").is_some_and(is_truthy),
        })
    }
}

impl Convert for RuleCompiler {
    type Output = Vec<Rule>;

    fn convert(&mut self, pieces: Pieces) -> Result<Vec<Rule>> {
        pieces
            .into_list()
            .iter()
            .enumerate()
            .map(|(index, rule)| self.compile_rule(index, rule, false))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Substitution
// ---------------------------------------------------------------------------

/// Rewrite `$N` back-references as `${N}` and escape any other `$`.
pub fn convert_replacement(replace: &str) -> String {
    let mut out = String::with_capacity(replace.len());
    let mut rest = replace;
    while let Some(pos) = rest.find('$') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        if digits > 0 {
            out.push_str("${");
            out.push_str(&after[..digits]);
            out.push('}');
        } else {
            out.push_str("$$");
        }
        rest = &after[digits..];
    }
    out.push_str(rest);
    out
}

/// Apply one rule to `word`.
pub fn substitute(word: String, rule: &Rule) -> String {
    if word.is_empty() {
        return word;
    }
    let limit = if rule.global { 0 } else { 1 };
    rule.pattern
        .replacen(&word, limit, rule.replace.as_str())
        .into_owned()
}

/// Rules grouped by field, groups in order of first appearance.
pub fn group_rules(rules: &[Rule]) -> Vec<(&str, Vec<&Rule>)> {
    let mut groups: Vec<(&str, Vec<&Rule>)> = Vec::new();
    for rule in rules {
        match groups.iter().position(|(field, _)| *field == rule.field) {
            Some(i) => groups[i].1.push(rule),
            None => groups.push((rule.field.as_str(), vec![rule])),
        }
    }
    groups
}

/// Current text of `field`. Absent and empty-ish values (null, false,
/// zero, empty list or record) read as `""`.
fn field_word(item: &Item, field: &str) -> String {
    match item.lookup(field) {
        None | Some(Value::Null) | Some(Value::Bool(false)) => String::new(),
        Some(Value::Number(n)) if n.as_f64() == Some(0.0) => String::new(),
        Some(Value::Array(list)) if list.is_empty() => String::new(),
        Some(Value::Object(map)) if map.is_empty() => String::new(),
        Some(value) => to_word(value),
    }
}

/// Run every rule group against `item`.
pub fn apply(rules: &[Rule], mut item: Item) -> Item {
    for (field, group) in group_rules(rules) {
        let word = group.into_iter().fold(field_word(&item, field), substitute);
        item.set(field, Value::String(word));
    }
    item
}

/// [`apply`], yielding between rule applications.
pub async fn apply_async(rules: &[Rule], mut item: Item) -> Item {
    for (field, group) in group_rules(rules) {
        let word = stream::iter(group)
            .fold(field_word(&item, field), |word, rule| {
                future::ready(substitute(word, rule))
            })
            .await;
        item.set(field, Value::String(word));
    }
    item
}

// ---------------------------------------------------------------------------
// Invocation state
// ---------------------------------------------------------------------------

enum Prepared {
    Bypass(Item),
    Apply(Vec<Rule>, Item),
}

/// Everything one invocation owns: the engine, the compiled patterns and
/// the error policy.
struct RegexState {
    broadcast: Broadcast,
    dispatch: Dispatch<RuleCompiler>,
    ctx: Context,
    on_error: ErrorPolicy,
    done: bool,
}

impl RegexState {
    fn new(ctx: &Context, rules: Option<&ConfNode>, options: RegexOptions) -> Result<Self> {
        let broadcast = Broadcast::new(
            rules,
            BroadcastOptions::new(NAME)
                .location(RULE_KEY)
                .ftype(WithKind::Pass)
                .pass_if(options.pass_if),
        );
        let mut compiler = RuleCompiler::new(NAME);
        compiler.prime(broadcast.defs())?;
        debug!(
            rules = broadcast.defs().len(),
            precompiled = compiler.cache().len(),
            on_error = ?options.on_error,
            "regex ready"
        );
        Ok(Self {
            broadcast,
            dispatch: Dispatch::new(NAME, compiler, INFO.dispatch),
            ctx: ctx.clone(),
            on_error: options.on_error,
            done: false,
        })
    }

    fn prepare(&mut self, triple: Result<Triple>) -> Result<Prepared> {
        let triple = triple?;
        if triple.pass {
            trace!("bypass");
            return Ok(Prepared::Bypass(Item::from_value(triple.with)));
        }
        let Dispatched { pieces, with, .. } = self.dispatch.apply(triple)?;
        Ok(Prepared::Apply(pieces, Item::from_value(with)))
    }

    /// Decide whether `err` ends the stream. Returns the error to yield,
    /// or `None` when the item is dropped.
    fn settle(&mut self, err: PipeError) -> Option<PipeError> {
        if err.is_fatal() || self.on_error == ErrorPolicy::Abort {
            self.done = true;
            return Some(err);
        }
        warn!(error = %err, "skipping item");
        None
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Lazy synchronous output of the operator.
pub struct RegexIter<'a> {
    state: RegexState,
    input: ItemIter<'a>,
}

impl Iterator for RegexIter<'_> {
    type Item = Result<Item>;

    fn next(&mut self) -> Option<Result<Item>> {
        loop {
            if self.state.done {
                return None;
            }
            let item = match self.input.next()? {
                Ok(item) => item,
                Err(err) => return Some(Err(err)),
            };
            let triple = schedule::immediate(&self.state.broadcast, &self.state.ctx, item);
            match self.state.prepare(triple) {
                Ok(Prepared::Bypass(item)) => return Some(Ok(item)),
                Ok(Prepared::Apply(rules, item)) => return Some(Ok(apply(&rules, item))),
                Err(err) => {
                    if let Some(err) = self.state.settle(err) {
                        return Some(Err(err));
                    }
                }
            }
        }
    }
}

fn regex_stream<'a>(state: RegexState, input: ItemStream<'a>) -> RegexStream<'a> {
    stream::unfold((state, input), |(mut state, mut input)| async move {
        loop {
            if state.done {
                return None;
            }
            let item = match input.next().await? {
                Ok(item) => item,
                Err(err) => return Some((Err(err), (state, input))),
            };
            let triple = schedule::suspending(&state.broadcast, &state.ctx, item).await;
            let out = match state.prepare(triple) {
                Ok(Prepared::Bypass(item)) => Ok(item),
                Ok(Prepared::Apply(rules, item)) => Ok(apply_async(&rules, item).await),
                Err(err) => match state.settle(err) {
                    Some(err) => Err(err),
                    None => continue,
                },
            };
            return Some((out, (state, input)));
        }
    })
    .boxed()
}

/// Replace text in `input` items using the rules under `conf["RULE"]`.
///
/// Rules that are the same for every item are compiled here, so an
/// invalid static pattern is reported before any item is pulled.
pub fn pipe_regex<'a, I>(
    ctx: &Context,
    input: I,
    conf: &ConfNode,
    options: RegexOptions,
) -> Result<RegexIter<'a>>
where
    I: IntoIterator<Item = Item>,
    I::IntoIter: 'a,
{
    let state = RegexState::new(ctx, conf.get(RULE_KEY), options)?;
    Ok(RegexIter {
        state,
        input: Box::new(input.into_iter().map(Ok::<Item, PipeError>)),
    })
}

/// Asynchronous form of [`pipe_regex`], producing the same items in the
/// same order.
pub async fn pipe_regex_async<'a, S>(
    ctx: &Context,
    input: S,
    conf: &ConfNode,
    options: RegexOptions,
) -> Result<RegexStream<'a>>
where
    S: Stream<Item = Item> + Send + 'a,
{
    let state = RegexState::new(ctx, conf.get(RULE_KEY), options)?;
    Ok(regex_stream(state, input.map(Ok::<Item, PipeError>).boxed()))
}

// ---------------------------------------------------------------------------
// Pipeline stage
// ---------------------------------------------------------------------------

/// The regex operator as a pipeline stage.
#[derive(Debug, Clone)]
pub struct RegexModule {
    conf: ConfNode,
    options: RegexOptions,
}

impl RegexModule {
    pub fn new(conf: ConfNode, options: RegexOptions) -> Self {
        Self { conf, options }
    }

    /// Build from a stage definition.
    ///
    /// `pass_if` names an item path; items where it is truthy bypass the
    /// stage.
    pub fn from_def(def: &StageDef, registry: &PipeRegistry) -> Result<Self> {
        let conf = ConfNode::from_json(&def.conf, registry)?;
        let on_error = def
            .on_error
            .as_deref()
            .map(str::parse::<ErrorPolicy>)
            .transpose()?
            .unwrap_or_default();
        let mut options = RegexOptions::default().on_error(on_error);
        if let Some(path) = def.pass_if.clone() {
            options = options.pass_if(move |item: &Item| item.lookup(&path).is_some_and(is_truthy));
        }
        Ok(Self::new(conf, options))
    }
}

impl Operator for RegexModule {
    fn info(&self) -> OperatorInfo {
        INFO
    }

    fn process<'a>(&'a self, ctx: &Context, input: ItemIter<'a>) -> Result<ItemIter<'a>> {
        let state = RegexState::new(ctx, self.conf.get(RULE_KEY), self.options.clone())?;
        Ok(Box::new(RegexIter { state, input }))
    }

    fn process_async<'a>(
        &'a self,
        ctx: &Context,
        input: ItemStream<'a>,
    ) -> BoxFuture<'a, Result<ItemStream<'a>>> {
        let setup = RegexState::new(ctx, self.conf.get(RULE_KEY), self.options.clone());
        Box::pin(async move { Ok(regex_stream(setup?, input)) })
    }
}
