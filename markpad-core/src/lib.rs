//! Core library for the local markdown editor: path admission, note storage,
//! and single-instance coordination.

mod admission;
mod error;
mod lock;
mod models;
mod policy;
mod sanitize;
mod store;

pub use admission::{evaluate, AccessIntent, AdmissionDecision, DenyReason};
pub use error::{EditorError, Result};
pub use lock::{InstanceCoordinator, InstanceLock, LockGuard};
pub use models::{NoteContent, NoteSummary};
pub use policy::AccessPolicy;
pub use sanitize::{sanitize_content, validate_path_shape, MAX_PATH_LEN};
pub use store::NoteStore;
