pub mod assets;
pub mod build_info;
pub mod path;
pub mod retry;
pub mod sentry;
