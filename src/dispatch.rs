//! Dispatch functions: coercion of resolved values to operator types.
//!
//! Every operator declares a [`DispatchKind`]. The kind is parsed from its
//! tag (`word`, `num`, `pass`, `none`) when the operator is configured, so
//! an unknown tag is rejected before any item flows.
//!
//! A [`Dispatch`] applies three functions element-wise over a resolution
//! [`Triple`]: `first` turns the resolved pieces into the operator's
//! working form (for example compiled rules), the kind coerces the paired
//! datum, and `last` maps the bypass flag.

use std::str::FromStr;

use serde_json::{Number, Value};

use crate::broadcast::{Pieces, Triple};
use crate::error::{PipeError, Result};

/// Coercion selected by an operator's declared parameter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchKind {
    /// Stringify.
    Word,
    /// Parse to a number, keeping integers and floats apart.
    Num,
    /// Identity.
    #[default]
    Pass,
    /// Discard, yielding null.
    None,
}

impl DispatchKind {
    /// Tag used in operator declarations.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Word => "word",
            Self::Num => "num",
            Self::Pass => "pass",
            Self::None => "none",
        }
    }

    /// Map a conf literal's `type` attribute to a kind.
    ///
    /// Textual types stringify, numeric types parse, anything else is
    /// passed through untouched.
    pub fn from_type_attr(attr: Option<&str>) -> Self {
        match attr {
            Some("text" | "url" | "location" | "datetime" | "word") => Self::Word,
            Some("number" | "int" | "integer" | "float" | "num") => Self::Num,
            _ => Self::Pass,
        }
    }

    /// Coerce `value`, handing it back unchanged when it cannot be
    /// represented.
    pub fn coerce(&self, value: Value) -> std::result::Result<Value, Value> {
        match self {
            Self::Word => Ok(Value::String(to_word(&value))),
            Self::Num => to_num(&value).ok_or(value),
            Self::Pass => Ok(value),
            Self::None => Ok(Value::Null),
        }
    }
}

impl FromStr for DispatchKind {
    type Err = PipeError;

    fn from_str(tag: &str) -> Result<Self> {
        match tag {
            "word" => Ok(Self::Word),
            "num" => Ok(Self::Num),
            "pass" => Ok(Self::Pass),
            "none" => Ok(Self::None),
            other => Err(PipeError::invalid_conf(format!(
                "unknown dispatch type '{other}' (expected word, num, pass or none)"
            ))),
        }
    }
}

/// Render a value as a word.
///
/// Null becomes the empty string, strings are kept verbatim, numbers and
/// booleans use their display form, and containers are written as compact
/// JSON.
pub fn to_word(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        compound => compound.to_string(),
    }
}

/// Parse a value as a number.
pub fn to_num(value: &Value) -> Option<Value> {
    match value {
        Value::Number(_) => Some(value.clone()),
        Value::Bool(b) => Some(Value::from(u8::from(*b))),
        Value::String(s) => {
            let s = s.trim();
            if let Ok(int) = s.parse::<i64>() {
                return Some(Value::from(int));
            }
            let float = s.parse::<f64>().ok()?;
            Number::from_f64(float).map(Value::Number)
        }
        _ => None,
    }
}

/// Whether a resolved value counts as set.
///
/// Used for flag-style conf fields: empty strings, `"0"`, `"false"`, zero,
/// `false` and null are unset.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !matches!(s.trim(), "" | "0" | "false"),
        Value::Array(list) => !list.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

// ---------------------------------------------------------------------------
// Three-stage dispatch
// ---------------------------------------------------------------------------

/// First stage of a dispatch: turns resolved pieces into working form.
pub trait Convert {
    type Output;

    fn convert(&mut self, pieces: Pieces) -> Result<Self::Output>;
}

impl<F, P> Convert for F
where
    F: FnMut(Pieces) -> Result<P>,
{
    type Output = P;

    fn convert(&mut self, pieces: Pieces) -> Result<P> {
        self(pieces)
    }
}

/// Leaves pieces as they were resolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepPieces;

impl Convert for KeepPieces {
    type Output = Pieces;

    fn convert(&mut self, pieces: Pieces) -> Result<Pieces> {
        Ok(pieces)
    }
}

/// A triple after dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched<P> {
    pub pieces: P,
    pub with: Value,
    pub pass: bool,
}

/// Element-wise application of `first`, a coercion kind, and `last`.
pub struct Dispatch<C> {
    module: String,
    first: C,
    kind: DispatchKind,
    last: fn(bool) -> bool,
}

impl<C: Convert> Dispatch<C> {
    pub fn new(module: impl Into<String>, first: C, kind: DispatchKind) -> Self {
        Self {
            module: module.into(),
            first,
            kind,
            last: std::convert::identity,
        }
    }

    /// Replace the function applied to the bypass flag.
    pub fn with_last(mut self, last: fn(bool) -> bool) -> Self {
        self.last = last;
        self
    }

    pub fn kind(&self) -> DispatchKind {
        self.kind
    }

    /// Borrow the first-stage converter.
    pub fn first(&self) -> &C {
        &self.first
    }

    pub fn apply(&mut self, triple: Triple) -> Result<Dispatched<C::Output>> {
        let Triple { pieces, with, pass } = triple;
        let with = self.kind.coerce(with).map_err(|value| {
            PipeError::coercion(self.module.clone(), "with", self.kind.tag(), value.to_string())
        })?;
        Ok(Dispatched {
            pieces: self.first.convert(pieces)?,
            with,
            pass: (self.last)(pass),
        })
    }
}

impl Dispatch<KeepPieces> {
    /// Dispatch that only coerces the paired value.
    pub fn coerce_only(module: impl Into<String>, kind: DispatchKind) -> Self {
        Self::new(module, KeepPieces, kind)
    }
}
