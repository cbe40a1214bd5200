pub mod chat;
pub mod events;
pub mod image;
pub mod presets;
pub mod runs;
