// SPDX-License-Identifier: MIT

pub mod config;
pub mod pipelines;
pub mod server;
pub mod tools;
pub mod workflow;
