pub mod audio;
pub mod events;
pub mod status;

pub use events::{ClientEvent, ServerEvent};
pub use status::StatusFlags;
