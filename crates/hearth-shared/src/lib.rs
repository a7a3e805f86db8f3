//! # hearth-shared
//!
//! Identifiers, domain records, the denial taxonomy and change events shared
//! by the Hearth policy engine and its persistence collaborators.

pub mod avatar;
pub mod constants;
pub mod error;
pub mod events;
pub mod models;
pub mod types;

pub use error::{Denial, DenialKind};
pub use models::*;
pub use types::*;
