pub mod dto;
pub mod errors;
pub mod handlers;
pub mod router;

use crate::core::engine::Engine;

/// Shared state handed to every route.
pub struct AppState {
    pub engine: Engine,
}
