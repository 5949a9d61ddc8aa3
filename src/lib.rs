// Copyright 2026 Fontgrab Contributors
// SPDX-License-Identifier: Apache-2.0

//! Fontgrab library — discover, download and flatten Fontshare font families.
//!
//! This library crate exposes the core modules for integration testing.

pub mod browser;
pub mod cli;
pub mod pipeline;
