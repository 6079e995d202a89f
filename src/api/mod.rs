pub mod admin;

pub use admin::admin_router;
