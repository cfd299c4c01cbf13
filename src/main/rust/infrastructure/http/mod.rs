mod admin_server;

pub use admin_server::{routes, serve_admin};
