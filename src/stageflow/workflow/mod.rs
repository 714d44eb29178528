// SPDX-License-Identifier: MIT

pub mod fanout;
pub mod graph;
pub mod ranker;
pub mod registry;
pub mod runner;
pub mod state;
pub mod suspension;
pub mod throttle;
