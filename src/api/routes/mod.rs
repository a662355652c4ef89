//! API Routes
//!
//! Route handlers organized by functionality.

pub mod dashboard;
pub mod events;
pub mod export;
pub mod health;
