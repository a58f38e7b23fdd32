//! # livedispatch
//!
//! `livedispatch` is the real-time coordination core of a delivery
//! marketplace. It tracks which participants are listening for which
//! delivery, fans position, status, chat and notification events out to
//! exactly those listeners, assigns drivers to deliveries and computes
//! prices and arrival times.
//!
//! ## Core Modules
//!
//! The library is structured into several modules, each with a distinct responsibility:
//!
//! - `broker`: Topics, the event wire shape and publishing onto topics.
//! - `config`: Loading and merging server configuration.
//! - `dispatch`: The delivery state machine, driver auto-assignment and the engine committing both.
//! - `geo`: Great-circle distance and ETA.
//! - `location`: Last known driver positions with a staleness window.
//! - `model`: Deliveries, drivers, promo codes and participant roles.
//! - `persistence`: The store port and its `sled` implementation.
//! - `pricing`: Fare tables and the price calculation.
//! - `registry`: Live sessions, their subscriptions and their outbound queues.
//! - `transport`: The realtime gateway, its inbound protocol and the WebSocket server.
//! - `utils`: Shared utilities, such as error handling and logging.

pub mod broker;
pub mod config;
pub mod dispatch;
pub mod geo;
pub mod location;
pub mod model;
pub mod persistence;
pub mod pricing;
pub mod registry;
pub mod transport;
pub mod utils;
