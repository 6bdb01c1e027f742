mod api;
pub mod models;

pub use api::{fetch_model, generate_images, response_to_images, send_generate_request};
