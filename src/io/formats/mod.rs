// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! File format implementations.
//!
//! - [`mcap`]: MCAP readers (indexed and streaming)

pub mod mcap;
