//! Database models for gbp-hub.
//!
//! Every row carries the `user_id` of its owner and every query filters on
//! it; that filter is the row-level access policy for the API.

pub mod account;
pub mod citation;
pub mod credential;
pub mod dashboard;
pub mod insight;
pub mod location;
pub mod media_item;
pub mod post;
pub mod ranking;
pub mod review;
pub mod sync_job;
