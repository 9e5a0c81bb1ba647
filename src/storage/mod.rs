// src/storage/mod.rs

pub mod key_state;
pub mod record;

pub use key_state::{is_immediate_blacklist_status, KeyHealth, KeyState};
pub use record::KeyRecord;
