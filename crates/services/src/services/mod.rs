//! Service modules for gbp-hub.
//!
//! - [`google`] - Google Business Profile client and token sources
//! - [`gmb_sync`] - Google to database sync, post publishing, background loop
//! - [`ai`] - content generation through LLM providers with canned fallbacks
//! - [`storage`] - bucketed file storage on the local filesystem
//! - [`nap`] - Name/Address/Phone consistency checks for citations

pub mod ai;
pub mod config;
pub mod gmb_sync;
pub mod google;
pub mod nap;
pub mod storage;
