mod admin;
mod catalog;
mod video;

pub use admin::health;
pub use catalog::list_videos;
pub use video::{serve_latest, serve_video};
