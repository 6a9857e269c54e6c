// SPDX-FileCopyrightText: 2026 ArcheBase
//
// SPDX-License-Identifier: MulanPSL-2.0

//! CLI subcommands.

mod backfill;
mod cat;
mod info;

pub use backfill::BackfillCmd;
pub use cat::CatCmd;
pub use info::InfoCmd;
