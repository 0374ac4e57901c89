// src/agents/reduction.rs
//! Sum-reduction of per-process migration results onto the coordinator

use crate::engine::MigrationResult;
use crate::group::Communicator;
use crate::utils::errors::Result;
use tracing::{debug, info};

/// Reduce every buffer of `local` across the group, then close the group.
///
/// Buffer `k` on the coordinator becomes the element-wise sum of buffer `k`
/// over all ranks. Returns the reduced result on the coordinator and `None`
/// on every other rank. Blocks until the whole group has contributed.
pub fn reduce_migration_result<C>(
    comm: &mut C,
    mut local: MigrationResult,
) -> Result<Option<MigrationResult>>
where
    C: Communicator + ?Sized,
{
    local.validate()?;

    let buffer_count = local.buffers().len();
    for index in 0..buffer_count {
        let reduced = comm.reduce_sum(index as u32, &local.buffers()[index].data)?;
        if let Some(sum) = reduced {
            local.replace_buffer(index, sum)?;
        }
    }

    comm.finalize()?;
    metrics::counter!("stbx_reductions_total").increment(1);

    if comm.is_coordinator() {
        info!(
            "Reduced {} buffer(s) of {} samples across {} process(es)",
            buffer_count,
            local.buffer_len(),
            comm.size()
        );
        Ok(Some(local))
    } else {
        debug!("Rank {} contributed {} buffer(s)", comm.rank(), buffer_count);
        Ok(None)
    }
}
