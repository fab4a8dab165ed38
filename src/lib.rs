//! # pipes-rs
//!
//! Declarative item pipelines with per-item configuration resolution.
//!
//! Every operator in a pipe receives a conf tree whose parameters may be
//! literals, references into the current item, or whole sub-pipelines. The
//! broadcast engine resolves that tree once per item and hands the operator
//! a `(pieces, with, pass)` triple; the operator never deals with conf
//! resolution itself.
//!
//! ## Overview
//!
//! - **Items**: ordered-key JSON records with dotted-path access
//! - **Config nodes**: literal, reference and sub-pipeline parameters
//! - **Dispatch**: `word`, `num`, `pass` and `none` coercions
//! - **Broadcast**: lazy, order-preserving per-item resolution
//! - **Two schedulers**: a pull-based `Iterator` path and a `Stream` path
//!   that awaits sub-pipelines, producing identical output
//!
//! ## Example
//!
//! ```
//! use pipes_rs::{ConfNode, Context, Item, RegexOptions, pipe_regex};
//! use serde_json::json;
//!
//! let conf = ConfNode::record([(
//!     "RULE",
//!     ConfNode::List(vec![ConfNode::record([
//!         ("field", ConfNode::text("title")),
//!         ("match", ConfNode::text("World")),
//!         ("replace", ConfNode::text("Pipes")),
//!     ])]),
//! )]);
//! let items = vec![Item::from_value(json!({"title": "Hello World"}))];
//!
//! let out: Vec<Item> = pipe_regex(&Context::new(), items, &conf, RegexOptions::default())
//!     .unwrap()
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//!
//! assert_eq!(out[0].get("title", json!("")), json!("Hello Pipes"));
//! ```

pub mod broadcast;
pub mod conf;
pub mod dispatch;
pub mod error;
pub mod executor;
pub mod item;
pub mod modules;
pub mod pipe;
pub mod runner;
pub mod schedule;
pub mod step;

pub use broadcast::{Broadcast, BroadcastOptions, PassIf, Pieces, Triple, WithKind};
pub use conf::{ConfNode, Reduce, SubPipe};
pub use dispatch::{Dispatch, DispatchKind, Dispatched};
pub use error::{ErrorPolicy, PipeError, Result};
pub use executor::Pipeline;
pub use item::Item;
pub use modules::{RegexModule, RegexOptions, StageDef, pipe_regex, pipe_regex_async};
pub use pipe::{Context, FnPipe, ItemIter, ItemStream, Operator, OperatorInfo, Pipe, PipeRegistry};
pub use runner::{execute_pipeline, execute_pipeline_async, parse_items};
pub use step::{ItemTask, Step};
