//! # Event Publishing
//!
//! The publish/subscribe transport that carries the core's outbound signals
//! (retry dispatch, alerts, tickets, recovery requests, rate alerts, summaries)
//! and inbound failure reports. Topic names live in [`crate::constants::topics`].

pub mod publisher;

pub use publisher::{EventPublisher, EventPublisherStats, PublishError, PublishedEvent};
