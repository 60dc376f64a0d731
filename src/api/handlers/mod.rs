mod admin;
mod images;
mod legacy;
mod models;
mod objects;

pub use admin::health;
pub use images::{create_image, delete_image, get_image, list_images};
pub use legacy::legacy_upload;
pub use models::{create_model, delete_model, get_model, list_models};
pub use objects::{
    receive_upload, request_upload, serve_file, serve_private_object, serve_public_object,
};
