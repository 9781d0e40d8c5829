pub mod backend;
pub mod bob;
pub mod client;
pub mod error;
pub mod memory;
pub mod model;
pub mod validation;
pub mod views;

pub use backend::{AuthBackend, CrisisBackend};
pub use bob::{BoardCard, BoardColumn, BobBoard, LinkedRef, TargetSelection};
pub use client::{BackendConfig, HostedClient};
pub use error::{BackendError, LinkError, Operation, ValidationError};
pub use memory::MemoryBackend;
pub use model::*;
pub use views::LoadState;
