/*!
 * Configuration
 * Sizing for arenas and chunk pools, loadable from JSON or the environment
 */

use super::errors::{MemError, MemResult};
use super::limits::{
    CHUNK_MAX_SIZE, CHUNK_MIN_SIZE, DEFAULT_ARENA_SIZE, DEFAULT_CHUNK_SIZE, MIN_ARENA_SIZE,
};
use serde::{Deserialize, Serialize};

/// Environment variable overriding the arena capacity
pub const ENV_ARENA_SIZE: &str = "NETMEM_ARENA_SIZE";

/// Environment variable overriding the chunk size
pub const ENV_CHUNK_SIZE: &str = "NETMEM_CHUNK_SIZE";

/// Arena sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaConfig {
    /// Size in bytes of every block the arena reserves, header included
    pub capacity: usize,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_ARENA_SIZE,
        }
    }
}

impl ArenaConfig {
    /// Arena with the given block capacity
    pub const fn with_capacity(capacity: usize) -> Self {
        Self { capacity }
    }

    /// One page per block, for short request metadata
    pub const fn small() -> Self {
        Self { capacity: 4096 }
    }

    /// 64KB blocks, for connections carrying many small objects
    pub const fn large() -> Self {
        Self {
            capacity: 64 * 1024,
        }
    }

    pub fn validate(&self) -> MemResult<()> {
        if self.capacity < MIN_ARENA_SIZE {
            return Err(MemError::InvalidConfig(format!(
                "arena capacity {} is below the minimum of {} bytes",
                self.capacity, MIN_ARENA_SIZE
            )));
        }
        Ok(())
    }
}

/// Chunk pool sizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkPoolConfig {
    /// Total size in bytes of each chunk allocation, canary trailer included
    pub chunk_size: usize,
}

impl Default for ChunkPoolConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl ChunkPoolConfig {
    pub const fn with_chunk_size(chunk_size: usize) -> Self {
        Self { chunk_size }
    }

    pub fn validate(&self) -> MemResult<()> {
        if !(CHUNK_MIN_SIZE..=CHUNK_MAX_SIZE).contains(&self.chunk_size) {
            return Err(MemError::InvalidConfig(format!(
                "chunk size {} outside [{}, {}]",
                self.chunk_size, CHUNK_MIN_SIZE, CHUNK_MAX_SIZE
            )));
        }
        Ok(())
    }
}

/// Combined configuration for a service's memory layer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemConfig {
    pub arena: ArenaConfig,
    pub chunk_pool: ChunkPoolConfig,
}

impl MemConfig {
    /// Parse and validate a JSON document
    ///
    /// Missing fields fall back to their defaults.
    pub fn from_json(json: &str) -> MemResult<Self> {
        let config: MemConfig = serde_json::from_str(json)
            .map_err(|e| MemError::InvalidConfig(format!("malformed config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults, overridden by `NETMEM_ARENA_SIZE` and `NETMEM_CHUNK_SIZE`
    pub fn from_env() -> MemResult<Self> {
        let mut config = Self::default();
        if let Some(capacity) = env_size(ENV_ARENA_SIZE)? {
            config.arena.capacity = capacity;
        }
        if let Some(chunk_size) = env_size(ENV_CHUNK_SIZE)? {
            config.chunk_pool.chunk_size = chunk_size;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> MemResult<()> {
        self.arena.validate()?;
        self.chunk_pool.validate()
    }
}

fn env_size(key: &str) -> MemResult<Option<usize>> {
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| MemError::InvalidConfig(format!("{} is not a size: {:?}", key, value))),
        Err(_) => Ok(None),
    }
}
