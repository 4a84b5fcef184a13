pub mod autosave;

pub use autosave::{AutosaveBridge, AutosaveEvent, FlushKind};
