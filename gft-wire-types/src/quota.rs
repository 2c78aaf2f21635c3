// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

use std::collections::BTreeMap;

/// One row of `volume quota <vol> list --xml`.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct QuotaLimit {
    /// Hard limit in bytes.
    pub hard_limit: u64,
    /// Soft limit as a percentage of the hard limit.
    pub soft_limit_pct: u8,
    /// Bytes currently accounted against the limit.
    pub used: u64,
    /// Bytes left before the hard limit.
    pub available: u64,
    pub sl_exceeded: bool,
    pub hl_exceeded: bool,
}

/// Path-keyed quota view. `BTreeMap` so iteration (and Debug output in
/// failed assertions) is stable.
pub type QuotaList = BTreeMap<String, QuotaLimit>;
