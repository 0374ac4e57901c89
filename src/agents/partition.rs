// src/agents/partition.rs
//! Static round-robin shot partitions
//!
//! Both formulas are pure functions of `(shots, rank, process_count)`, so a
//! given group always reproduces the same assignment.

use crate::engine::{ShotId, ShotList};
use crate::group::{Rank, COORDINATOR};

/// Shots at positions `i` with `i % slots == slot`
pub fn round_robin(shots: &[ShotId], slot: usize, slots: usize) -> ShotList {
    if slots == 0 {
        return ShotList::new();
    }

    shots
        .iter()
        .enumerate()
        .filter(|(index, _)| index % slots == slot)
        .map(|(_, shot)| *shot)
        .collect()
}

/// Share of `rank` when the coordinator only aggregates: workers `1..n`
/// split the list over `n - 1` slots, the coordinator gets nothing
pub fn static_server_share(shots: &[ShotId], rank: Rank, process_count: usize) -> ShotList {
    if rank == COORDINATOR || process_count < 2 {
        return ShotList::new();
    }
    round_robin(shots, rank - 1, process_count - 1)
}

/// Share of `rank` when every rank, coordinator included, is a worker
pub fn static_serverless_share(shots: &[ShotId], rank: Rank, process_count: usize) -> ShotList {
    round_robin(shots, rank, process_count)
}
