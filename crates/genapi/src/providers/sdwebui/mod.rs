mod api;
pub mod models;

pub use api::{list_checkpoints, load_checkpoint, txt2img};
