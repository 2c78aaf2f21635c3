// Copyright (c) 2021 DDN. All rights reserved.
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file.

//! Brick placement. The planner is pure apart from consuming paths from
//! the inventory; every decision is reproducible from the server order.

use gft_config::{Inventory, InventoryError};
use gft_wire_types::{brick::subvols_of, BrickRef, Subvolume, VolumeSpec};

/// The planner's output: an ordered brick list (the exact order handed to
/// `volume create` / `add-brick`) and its stripe structure.
#[derive(Debug, Clone)]
pub struct Plan {
    pub bricks: Vec<BrickRef>,
    pub subvols: Vec<Subvolume>,
    pub warnings: Vec<String>,
}

/// Place bricks for a full volume: `spec.stripe_count()` stripes,
/// round-robin over `servers` starting at the first.
pub fn plan(
    spec: &VolumeSpec,
    servers: &[String],
    inv: &mut Inventory,
) -> Result<Plan, InventoryError> {
    plan_stripes(spec, servers, inv, spec.stripe_count())
}

/// Place bricks for an expansion: `stripes` additional stripes (callers
/// default to one).
pub fn expand_plan(
    spec: &VolumeSpec,
    servers: &[String],
    inv: &mut Inventory,
    stripes: usize,
) -> Result<Plan, InventoryError> {
    plan_stripes(spec, servers, inv, stripes.max(1))
}

fn plan_stripes(
    spec: &VolumeSpec,
    servers: &[String],
    inv: &mut Inventory,
    stripes: usize,
) -> Result<Plan, InventoryError> {
    let width = spec.subvol_width();
    let need = stripes * width;
    let mut bricks = Vec::with_capacity(need);

    for n in 0..need {
        let server = &servers[n % servers.len()];

        match inv.brick_path_for(server) {
            Ok(path) => bricks.push(BrickRef::new(server, path)),
            Err(e) => {
                // Nothing was created on disk yet; hand the paths back.
                inv.release_bricks(&bricks);

                return Err(e);
            }
        }
    }

    let mut warnings = vec![];

    if width > 1 && servers.len() < width {
        warnings.push(format!(
            "subvolume width {} exceeds the {}-server pool; replicas of one file will share a server",
            width,
            servers.len()
        ));
    }

    Ok(Plan {
        subvols: subvols_of(&bricks, width),
        bricks,
        warnings,
    })
}

/// The arbiter brick of each replica set: by convention the last brick of
/// the stripe. Empty for non-arbiter topologies.
pub fn arbiter_bricks(spec: &VolumeSpec, subvols: &[Subvolume]) -> Vec<BrickRef> {
    if !spec.is_arbiter() {
        return vec![];
    }

    subvols
        .iter()
        .filter_map(|sv| sv.last().cloned())
        .collect()
}

/// Which stripe a shrink removes: the last one unless the caller names a
/// subvolume index. Out-of-range indexes yield `None`.
pub fn shrink_selection(
    subvols: &[Subvolume],
    index: Option<usize>,
) -> Option<(usize, Subvolume)> {
    let idx = match index {
        Some(i) => i,
        None => subvols.len().checked_sub(1)?,
    };

    subvols.get(idx).map(|sv| (idx, sv.clone()))
}
