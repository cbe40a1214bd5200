mod catalog;
mod group;

pub use catalog::{PresetCatalog, PresetError};
pub use group::{PresetGroup, StyleMode, StylePreset, SubjectCategory};
