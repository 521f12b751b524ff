// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Library surface of the `warren` CLI, split out so command handlers can be
//! exercised against a mock admin server in integration tests.

pub mod client;
pub mod commands;

use clap::ValueEnum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}
