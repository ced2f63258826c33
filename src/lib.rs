//! Analysis job orchestration for a photo-curation service.
//!
//! Turns "analyze these images" requests into jobs with one item per
//! (image, task), hands the items to the compute worker without blocking the
//! request, and derives job status from item outcomes on every poll. Also
//! records per-image pick/rating/rejection actions as idempotent upserts.

pub mod app_state;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;
