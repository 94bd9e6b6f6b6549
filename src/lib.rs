//! newsroom - Role-based news publishing service
//!
//! Journalists write articles and newsletters, editors review them for their
//! publishers, and readers subscribe to publishers and journalists and are
//! notified when new content is published.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
