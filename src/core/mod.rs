// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! Core types used throughout robosource.
//!
//! - [`SourceError`] - Error taxonomy for sources and readers
//! - [`SourceConfig`] - Tunables shared by readers and the source facade

pub mod config;
pub mod error;

pub use config::{HttpConfig, SourceConfig};
pub use error::{Result, SourceError};
