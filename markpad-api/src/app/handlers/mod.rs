mod health;
mod notes;

pub use health::health;
pub use notes::{get_note, list_notes, save_note};
