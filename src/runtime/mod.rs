//! Runtime adapters used by the pool's background machinery.

pub mod tokio_spawner;

pub use tokio_spawner::TokioSpawner;
