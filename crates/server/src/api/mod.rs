//! HTTP endpoint handlers.

mod health;
pub(crate) mod images;

pub use health::health;
pub use images::post_images;
