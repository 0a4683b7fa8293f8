//! Ordered fallback merge ("decision tree") of rasters describing the same quantity.
//!
//! For every cell the first raster in priority order holding a valid value wins. Lower
//! priority rasters only fill cells that no higher priority raster could fill.

use crate::error::{HarmonizeError, Result};
use crate::raster::{Raster, is_sentinel, try_alloc};
use log::debug;
use ndarray::{Array2, Zip};

/// Rule deciding whether a cell of a priority entry can be taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Validity {
    /// Not the sentinel and strictly greater than zero. Zero is treated as missing and
    /// falls through to the next source.
    #[default]
    Positive,
    /// Any value that is not the sentinel, zero included.
    HasData,
}

impl Validity {
    pub fn accepts(&self, value: f32, nodata: f32) -> bool {
        if is_sentinel(value, nodata) {
            return false;
        }
        match self {
            Validity::Positive => value > 0.0,
            Validity::HasData => true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PriorityEntry<'a> {
    pub raster: &'a Raster,
    pub validity: Validity,
}

/// Rasters ordered from most to least trusted.
#[derive(Debug, Clone, Default)]
pub struct PriorityList<'a> {
    entries: Vec<PriorityEntry<'a>>,
}

impl<'a> PriorityList<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `raster` below every entry already in the list, using the `> 0` rule.
    pub fn then(self, raster: &'a Raster) -> Self {
        self.then_with(raster, Validity::Positive)
    }

    pub fn then_with(mut self, raster: &'a Raster, validity: Validity) -> Self {
        self.entries.push(PriorityEntry { raster, validity });
        self
    }

    pub fn push(&mut self, raster: &'a Raster, validity: Validity) {
        self.entries.push(PriorityEntry { raster, validity });
    }

    pub fn entries(&self) -> &[PriorityEntry<'a>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Fuses the list into one raster carrying the first entry's grid and sentinel.
///
/// Cells where no entry is valid are set to the sentinel.
pub fn fuse(ordered: &PriorityList) -> Result<Raster> {
    let (first, rest) = ordered
        .entries()
        .split_first()
        .ok_or(HarmonizeError::EmptyPriorityList)?;

    let grid = first.raster.grid();
    for (index, entry) in rest.iter().enumerate() {
        grid.ensure_matches(
            entry.raster.grid(),
            &format!("priority entry {}", index + 1),
        )?;
    }

    let nodata = first.raster.nodata();
    let mut fused = try_alloc(grid.shape(), nodata)?;
    let mut decided: Array2<bool> = Array2::from_elem(grid.shape(), false);

    for (rank, entry) in ordered.entries().iter().enumerate() {
        let filled = select(&mut fused, &mut decided, entry);
        debug!(
            "Priority {} ({:?}) filled {} cells",
            rank, entry.validity, filled
        );
    }

    Ok(Raster::from_parts(fused, nodata, grid.clone()))
}

/// Fills still-undecided cells of `fused` from `entry`, returning how many it filled.
fn select(fused: &mut Array2<f32>, decided: &mut Array2<bool>, entry: &PriorityEntry) -> usize {
    let nodata = entry.raster.nodata();
    let validity = entry.validity;

    Zip::from(fused)
        .and(decided)
        .and(entry.raster.data())
        .par_map_collect(|out, taken, &candidate| {
            if !*taken && validity.accepts(candidate, nodata) {
                *out = candidate;
                *taken = true;
                1_usize
            } else {
                0
            }
        })
        .sum()
}
