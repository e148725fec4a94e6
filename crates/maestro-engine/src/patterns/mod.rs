//! Orchestration pattern implementations.
//!
//! Each pattern is an async function over a [`BlockContext`]; all turns of
//! one invocation share the context's cancellation scope.

pub mod debate;
pub mod hierarchical;
pub mod parallel;
pub mod reflection;
pub mod routing;
pub mod sequential;

use maestro_core::MaestroError;
use maestro_core::design::BlockKind;

use crate::context::{BlockContext, BlockOutput};

/// Run the block's pattern to completion.
pub async fn run_block(ctx: &BlockContext<'_>) -> Result<BlockOutput, MaestroError> {
    match ctx.block.kind {
        BlockKind::Sequential => sequential::run(ctx).await,
        BlockKind::Parallel => parallel::run(ctx).await,
        BlockKind::Hierarchical => hierarchical::run(ctx).await,
        BlockKind::Debate => debate::run(ctx).await,
        BlockKind::Routing => routing::run(ctx).await,
        BlockKind::Reflection => reflection::run(ctx).await,
    }
}
