//! Environment capability queries.
//!
//! Network reachability, storage availability, and space/memory figures come
//! from a capability object handed to the engine at construction and queried
//! per operation. Nothing here is cached in process-wide state.

use std::path::Path;

/// Capability queries the engine needs from its host environment.
pub trait Environment: Send + Sync {
    /// Whether the network is currently reachable.
    fn network_available(&self) -> bool;

    /// Whether `dir` is usable for persisted downloads.
    fn storage_available(&self, dir: &Path) -> bool;

    /// Free bytes on the volume holding `dir`. Implementations that cannot
    /// measure this return `u64::MAX`, which disables the min-free-space
    /// eviction trigger while leaving the directory-size trigger active.
    fn usable_space(&self, dir: &Path) -> u64;

    /// Total memory available to the process, used to derive the default
    /// memory-cache budget.
    fn total_memory(&self) -> u64;
}

/// Default environment backed by plain filesystem checks.
pub struct SystemEnvironment;

/// Conservative total-memory figure used when the platform offers no
/// portable query; yields a 64 MiB default cache budget.
const ASSUMED_TOTAL_MEMORY: u64 = 512 * 1024 * 1024;

impl Environment for SystemEnvironment {
    fn network_available(&self) -> bool {
        true
    }

    fn storage_available(&self, dir: &Path) -> bool {
        if dir.is_dir() {
            return true;
        }
        std::fs::create_dir_all(dir).is_ok()
    }

    fn usable_space(&self, _dir: &Path) -> u64 {
        u64::MAX
    }

    fn total_memory(&self) -> u64 {
        ASSUMED_TOTAL_MEMORY
    }
}
