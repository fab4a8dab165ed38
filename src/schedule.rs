//! Schedulers that drive an [`ItemTask`](crate::step::ItemTask).
//!
//! [`immediate`] runs each sub-pipeline on the calling thread; [`suspending`]
//! awaits it. Neither reorders anything: a task's sub-pipelines run one
//! after another and the caller consumes tasks in item order.

use tracing::trace;

use crate::Item;
use crate::broadcast::{Broadcast, Triple};
use crate::error::Result;
use crate::pipe::Context;
use crate::step::Step;

/// Resolve `item`, blocking on every sub-pipeline.
pub fn immediate(broadcast: &Broadcast, ctx: &Context, item: Item) -> Result<Triple> {
    let mut task = broadcast.task(item);
    while let Step::Evaluate(sub) = task.next_step() {
        trace!(module = broadcast.module(), sub_pipe = sub.name(), "evaluating");
        let output = sub.pipe().run(ctx, vec![task.item().clone()])?;
        task.feed(output);
    }
    task.finish()
}

/// Resolve `item`, awaiting every sub-pipeline.
pub async fn suspending(broadcast: &Broadcast, ctx: &Context, item: Item) -> Result<Triple> {
    let mut task = broadcast.task(item);
    while let Step::Evaluate(sub) = task.next_step() {
        trace!(module = broadcast.module(), sub_pipe = sub.name(), "evaluating");
        let output = sub.pipe().run_async(ctx, vec![task.item().clone()]).await?;
        task.feed(output);
    }
    task.finish()
}
