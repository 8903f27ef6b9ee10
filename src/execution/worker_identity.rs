use rand::Rng;

use crate::config::WorkerConfig;
use crate::error::{EngineError, Result};

/// Identity a worker process leases tasks under.
///
/// Either configured (a non-negative id unique in the fleet) or drawn at
/// random on every start. Only random identities heartbeat: a fixed id
/// recovers its own leftovers at restart instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerIdentity {
    id: i64,
    random: bool,
}

impl WorkerIdentity {
    pub fn from_config(config: &WorkerConfig) -> Result<Self> {
        match (config.random_worker_id_enabled, config.id) {
            (true, Some(id)) => Err(EngineError::WorkerIdentity(format!(
                "worker id {id} is configured while random worker ids are enabled"
            ))),
            (true, None) => Ok(Self::random()),
            (false, Some(id)) => Self::fixed(id),
            (false, None) => Err(EngineError::WorkerIdentity(
                "no worker id configured and random worker ids are disabled".to_string(),
            )),
        }
    }

    pub fn fixed(id: i64) -> Result<Self> {
        if id < 0 {
            return Err(EngineError::WorkerIdentity(format!(
                "worker id must be non-negative, got {id}"
            )));
        }
        Ok(Self { id, random: false })
    }

    pub fn random() -> Self {
        Self {
            id: rand::thread_rng().gen_range(0..i64::MAX),
            random: true,
        }
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn is_random(&self) -> bool {
        self.random
    }
}

impl std::fmt::Display for WorkerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}
