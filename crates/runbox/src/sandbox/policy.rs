//! Isolation policy applied to every container
//!
//! Every container gets the same hardening: a memory ceiling, one CPU, a
//! process-count ceiling, no network, no capabilities and tmpfs scratch
//! mounts. Only the memory ceiling can vary per request.

use std::collections::HashMap;

use crate::config::LanguageProfile;

/// Memory ceiling when neither the request nor the profile sets one (100 MiB)
pub const DEFAULT_MEMORY_LIMIT: u64 = 100 * 1024 * 1024;

/// CPU quota in units of 1e-9 CPUs (one full core)
pub const NANO_CPUS: i64 = 1_000_000_000;

/// Maximum number of processes/threads inside a container
pub const PIDS_LIMIT: i64 = 64;

/// Working directory submissions are copied into and run from
pub const WORKING_DIR: &str = "/app";

/// Keeps an idle container alive until it is claimed
const KEEPALIVE_COMMAND: [&str; 3] = ["tail", "-f", "/dev/null"];

/// Scratch directories mounted as tmpfs so nothing persists across runs
const TMPFS_MOUNTS: [&str; 2] = ["/tmp", "/run"];

/// Everything the engine needs to create one hardened container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Image reference
    pub image: String,

    /// Memory ceiling in bytes
    pub memory_limit: u64,

    /// CPU quota in 1e-9 CPUs
    pub nano_cpus: i64,

    /// Process/thread ceiling
    pub pids_limit: i64,

    /// Whether the container gets any network at all
    pub network_enabled: bool,

    /// Capabilities to drop
    pub cap_drop: Vec<String>,

    /// tmpfs mounts, mount point to options
    pub tmpfs: HashMap<String, String>,

    /// Working directory
    pub working_dir: String,

    /// Entry process
    pub command: Vec<String>,
}

/// Build the hardened container spec for a language profile
///
/// The memory ceiling is the override if given, else the profile default,
/// else [`DEFAULT_MEMORY_LIMIT`].
pub fn hardened_spec(profile: &LanguageProfile, memory_override: Option<u64>) -> ContainerSpec {
    ContainerSpec {
        image: profile.image.clone(),
        memory_limit: profile.effective_memory_limit(memory_override),
        nano_cpus: NANO_CPUS,
        pids_limit: PIDS_LIMIT,
        network_enabled: false,
        cap_drop: vec!["ALL".to_string()],
        tmpfs: TMPFS_MOUNTS
            .iter()
            .map(|mount| (mount.to_string(), String::new()))
            .collect(),
        working_dir: WORKING_DIR.to_string(),
        command: KEEPALIVE_COMMAND.iter().map(|arg| arg.to_string()).collect(),
    }
}
