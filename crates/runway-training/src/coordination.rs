//! Compute-once-and-share for multi-worker training.
//!
//! Attempt probing is not atomic across processes: two workers probing at the same
//! time may both claim the same "next" attempt. Exactly one coordinator (rank 0)
//! resolves; every other member receives its result.

use crate::error::{LayoutError, LayoutResult};
use std::sync::{Arc, Barrier, Mutex, PoisonError};

const RANK_VARS: [&str; 3] = ["RANK", "LOCAL_RANK", "SLURM_PROCID"];
const WORLD_SIZE_VARS: [&str; 2] = ["WORLD_SIZE", "SLURM_NTASKS"];

/// Position of this process within the launcher's process group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankInfo {
    pub rank: usize,
    pub world_size: usize,
}

impl Default for RankInfo {
    fn default() -> Self {
        Self { rank: 0, world_size: 1 }
    }
}

impl RankInfo {
    /// Read the rank set by common launchers (torchrun, SLURM).
    pub fn from_env() -> LayoutResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> LayoutResult<Self> {
        let rank = match RANK_VARS.iter().find_map(|key| lookup(key).map(|v| (*key, v))) {
            Some((key, value)) => parse_count(key, &value)?,
            None => 0,
        };
        let world_size = match WORLD_SIZE_VARS.iter().find_map(|key| lookup(key).map(|v| (*key, v))) {
            Some((key, value)) => parse_count(key, &value)?,
            None => 1,
        };

        if world_size == 0 {
            return Err(LayoutError::InvalidConfig("world size must be >= 1".to_string()));
        }
        if rank >= world_size {
            return Err(LayoutError::InvalidConfig(format!("rank {rank} is outside world size {world_size}")));
        }
        Ok(Self { rank, world_size })
    }

    #[must_use]
    pub fn is_coordinator(&self) -> bool {
        self.rank == 0
    }
}

fn parse_count(key: &str, value: &str) -> LayoutResult<usize> {
    value
        .trim()
        .parse()
        .map_err(|_| LayoutError::InvalidConfig(format!("{key} must be a non-negative integer, got {value:?}")))
}

/// A group in which only the coordinator computes a value and all members receive it.
pub trait Broadcast<T> {
    fn rank(&self) -> usize;

    fn world_size(&self) -> usize;

    fn is_coordinator(&self) -> bool {
        self.rank() == 0
    }

    /// Run `compute` on the coordinator only and hand its result to every member.
    ///
    /// Every member of the group must call this the same number of times.
    fn broadcast_from_coordinator<F>(&self, compute: F) -> LayoutResult<T>
    where
        F: FnOnce() -> LayoutResult<T>;
}

/// A group of one: the caller is the coordinator.
#[derive(Debug, Default, Clone, Copy)]
pub struct SingleProcess;

impl<T> Broadcast<T> for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn world_size(&self) -> usize {
        1
    }

    fn broadcast_from_coordinator<F>(&self, compute: F) -> LayoutResult<T>
    where
        F: FnOnce() -> LayoutResult<T>,
    {
        compute()
    }
}

struct Shared<T> {
    barrier: Barrier,
    slot: Mutex<Option<Result<T, String>>>,
}

/// An in-process group whose members run on separate threads.
pub struct LocalGroup<T> {
    world_size: usize,
    shared: Arc<Shared<T>>,
}

impl<T: Clone> LocalGroup<T> {
    pub fn new(world_size: usize) -> LayoutResult<Self> {
        if world_size == 0 {
            return Err(LayoutError::InvalidConfig("world size must be >= 1".to_string()));
        }
        Ok(Self { world_size, shared: Arc::new(Shared { barrier: Barrier::new(world_size), slot: Mutex::new(None) }) })
    }

    /// One handle per rank; member 0 is the coordinator.
    #[must_use]
    pub fn into_members(self) -> Vec<LocalGroupMember<T>> {
        (0..self.world_size)
            .map(|rank| LocalGroupMember { rank, world_size: self.world_size, shared: Arc::clone(&self.shared) })
            .collect()
    }
}

pub struct LocalGroupMember<T> {
    rank: usize,
    world_size: usize,
    shared: Arc<Shared<T>>,
}

impl<T: Clone> Broadcast<T> for LocalGroupMember<T> {
    fn rank(&self) -> usize {
        self.rank
    }

    fn world_size(&self) -> usize {
        self.world_size
    }

    fn broadcast_from_coordinator<F>(&self, compute: F) -> LayoutResult<T>
    where
        F: FnOnce() -> LayoutResult<T>,
    {
        if self.rank == 0 {
            let result = compute();
            {
                let mut slot = self.shared.slot.lock().unwrap_or_else(PoisonError::into_inner);
                *slot = Some(result.as_ref().map(T::clone).map_err(ToString::to_string));
            }
            // Publish, then keep the slot stable until every member has read it.
            self.shared.barrier.wait();
            self.shared.barrier.wait();
            return result;
        }

        self.shared.barrier.wait();
        let received = {
            let slot = self.shared.slot.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(Ok(value)) => Ok(value.clone()),
                Some(Err(message)) => Err(LayoutError::Coordination(format!("coordinator failed: {message}"))),
                None => Err(LayoutError::Coordination("coordinator published no value".to_string())),
            }
        };
        self.shared.barrier.wait();
        tracing::debug!(rank = self.rank, "received value from coordinator");
        received
    }
}
