//! Board core: live snapshots, the mutation surface and the update bus.

use shared::error::ApiError;
use storage::Storage;

pub mod actions;
pub mod aggregate;
pub mod boards;
pub mod bus;

pub use actions::apply_action;
pub use aggregate::{assemble_snapshot, get_board};
pub use boards::{board_exists, create_board, delete_board, list_boards, rename_board};
pub use bus::{Subscription, SubscriptionId, UpdateBus};

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub bus: UpdateBus,
}

impl ApiContext {
    pub fn new(storage: Storage, bus: UpdateBus) -> Self {
        Self { storage, bus }
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::internal(err.to_string())
}
