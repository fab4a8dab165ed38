//! Per-item resolution as a step machine.
//!
//! Resolving an item's conf may require running sub-pipelines. The task
//! does not run them itself: it names the next one to evaluate and waits
//! to be fed its output, so a blocking scheduler and a suspending one
//! drive exactly the same resolution logic.

use crate::Item;
use crate::broadcast::{Broadcast, Triple};
use crate::conf::SubPipe;
use crate::error::Result;

/// What a scheduler must do next for a task.
#[derive(Debug)]
pub enum Step<'b> {
    /// Run this sub-pipeline on `[item]` and feed the output back.
    Evaluate(&'b SubPipe),
    /// Every sub-pipeline has run; call [`ItemTask::finish`].
    Resolve,
}

/// Resolution of one item against one broadcast.
#[derive(Debug)]
pub struct ItemTask<'b> {
    broadcast: &'b Broadcast,
    item: Item,
    pass: bool,
    outputs: Vec<Vec<Item>>,
}

impl<'b> ItemTask<'b> {
    /// The bypass flag is decided here, before any of the conf is touched.
    pub(crate) fn new(broadcast: &'b Broadcast, item: Item) -> Self {
        let pass = broadcast.get_pass(&item);
        let capacity = if pass { 0 } else { broadcast.sub_pipes().len() };
        Self {
            broadcast,
            item,
            pass,
            outputs: Vec::with_capacity(capacity),
        }
    }

    /// The item being resolved.
    pub fn item(&self) -> &Item {
        &self.item
    }

    /// Whether the item bypasses the operator.
    pub fn pass(&self) -> bool {
        self.pass
    }

    /// A bypassed item has nothing to evaluate.
    pub fn next_step(&self) -> Step<'b> {
        if self.pass {
            return Step::Resolve;
        }
        match self.broadcast.sub_pipes().get(self.outputs.len()) {
            Some(sub) => Step::Evaluate(sub),
            None => Step::Resolve,
        }
    }

    /// Record the output of the sub-pipeline named by the last
    /// [`Step::Evaluate`].
    pub fn feed(&mut self, output: Vec<Item>) {
        self.outputs.push(output);
    }

    /// Build the item's triple. A bypassed item gets empty pieces and its
    /// conf is never resolved.
    pub fn finish(self) -> Result<Triple> {
        let Self {
            broadcast,
            item,
            pass,
            outputs,
        } = self;
        let pieces = if pass {
            broadcast.empty_pieces()
        } else {
            broadcast.get_pieces(&item, &mut outputs.into_iter())?
        };
        let with = broadcast.get_with(item);
        Ok(Triple { pieces, with, pass })
    }
}
