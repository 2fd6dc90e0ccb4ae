//! HTTP control plane for the Conveyor job queue.

pub mod controllers;
pub mod dto;
pub mod responses;
pub mod router;
pub mod state;

pub use router::create_router;
pub use state::AppState;
