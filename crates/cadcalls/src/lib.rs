// Copyright 2026 cadcalls Contributors
// SPDX-License-Identifier: MIT

//! cadcalls: fetch CAD call records from Police-to-Citizen portals.
//!
//! This library crate exposes the core modules for the binary and for
//! integration testing.

pub mod artifact;
pub mod config;
pub mod display;
pub mod error;
pub mod portal;

pub use error::{PortalError, PortalResult};
