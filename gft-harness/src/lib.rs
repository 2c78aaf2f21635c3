// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

//! Composition layer on top of the CLI adapter: topology planning, volume
//! and mount lifecycles, wait loops, workload drivers, and the test case
//! runtime that strings them together.
//!
//! Lifecycle operations return `bool` and never propagate errors; every
//! failure is logged with enough context to diagnose from the run output.
//! The runtime is single-driver: all inventory mutation happens from the
//! suite loop, and remote parallelism only ever comes from spawned handles
//! awaited later.

pub mod io;
pub mod mount;
pub mod runtime;
pub mod topology;
pub mod volume;
pub mod wait;

#[cfg(test)]
pub(crate) mod mock;

pub use runtime::{run_suite, Scenario, SuiteOutcome, TestCase, TestParams, TestReport};
