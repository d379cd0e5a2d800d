//! Output requirements and their validation after a clean run.

pub mod requirement;
pub mod validator;

pub use requirement::{ContentKind, OutputRequirement};
pub use validator::{conclude, validate};
