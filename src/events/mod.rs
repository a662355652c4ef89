//! Quiz Event Model
//!
//! This module provides the canonical event record and its companions:
//!
//! - **types**: `Event`, `EventType` and the metadata side channel
//! - **catalog**: The fixed, ordered step catalog
//! - **range**: Inclusive date ranges and the time-zone policy
//! - **error**: Error types shared with the store layer
//!
//! # Example
//!
//! ```rust
//! use quizpulse::events::{Event, EventType, StepCatalog};
//!
//! let catalog = StepCatalog::reference();
//! let event = Event::new("session-1", EventType::StepView, 3, 1_700_000_000_000)
//!     .step_name(catalog.name_for(3))
//!     .time_spent(4_200);
//!
//! assert!(event.validate().is_ok());
//! assert_eq!(event.step_name, "Zona reducir grasa");
//! ```

pub mod catalog;
pub mod error;
pub mod range;
pub mod types;

// Re-export commonly used types
pub use catalog::{StepCatalog, StepDef, DEFAULT_TERMINAL_STEP, QUIZ_COMPLETE_NAME};
pub use error::{StoreError, StoreResult};
pub use range::{in_range, parse_bound, parse_range, preset, Bound, DateRange, RangeError, ZonePolicy};
pub use types::{Event, EventType, Metadata, SCREEN_WIDTH_KEY};
