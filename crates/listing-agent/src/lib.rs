// Copyright 2026 Listing Agent Contributors
// SPDX-License-Identifier: MIT

//! Listing agent: submits a product listing to web directories.
//!
//! Loads each directory page in a browser, detects its submission form with
//! a vision model (falling back to HTML rules), maps product attributes onto
//! the detected fields, fills and submits, and judges the outcome. A
//! scheduler drives many such runs with bounded concurrency and pacing.

pub mod activity;
pub mod automation;
pub mod cli;
pub mod config;
pub mod demo;
pub mod detection;
pub mod executor;
pub mod mapping;
pub mod renderer;
pub mod scheduler;
pub mod store;
