//! Domain decomposition of the coarse grid into worker patches
//!
//! Interior columns are dealt round-robin to the patch workers. Each
//! column is split into runs that skip the subgrid footprints, and every
//! footprint goes whole to one owner, so each interior cell is written by
//! exactly one worker. The PML rim belongs to the boundary worker.

use crate::error::{Result, SimError};
use crate::settings::Settings;

/// Half-open index rectangle `[i_min, i_max) x [j_min, j_max)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Area {
    pub i_min: usize,
    pub i_max: usize,
    pub j_min: usize,
    pub j_max: usize,
}

impl Area {
    pub fn new(i_min: usize, i_max: usize, j_min: usize, j_max: usize) -> Self {
        Self { i_min, i_max, j_min, j_max }
    }

    #[inline]
    pub fn contains(&self, i: usize, j: usize) -> bool {
        i >= self.i_min && i < self.i_max && j >= self.j_min && j < self.j_max
    }

    pub fn is_empty(&self) -> bool {
        self.i_min >= self.i_max || self.j_min >= self.j_max
    }

    /// Number of cells
    pub fn cells(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            (self.i_max - self.i_min) * (self.j_max - self.j_min)
        }
    }

    pub fn intersects(&self, other: &Area) -> bool {
        self.i_min < other.i_max
            && other.i_min < self.i_max
            && self.j_min < other.j_max
            && other.j_min < self.j_max
    }

    /// Iterate the cells in column-major order (j fastest)
    pub fn indices(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (self.i_min..self.i_max).flat_map(move |i| (self.j_min..self.j_max).map(move |j| (i, j)))
    }
}

/// A subgrid footprint and the worker that owns it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FootprintOwner {
    /// Index of the subgrid in definition order
    pub subgrid: usize,
    pub area: Area,
    pub worker: usize,
}

/// Assignment of interior cells to patch workers
#[derive(Debug, Clone)]
pub struct Partition {
    /// Ordinary patches per worker
    pub patches: Vec<Vec<Area>>,
    /// Explicit footprint ownership table
    pub footprints: Vec<FootprintOwner>,
    interior: Area,
}

impl Partition {
    /// Split the interior among `workers` patch workers around `footprints`
    pub fn new(settings: &Settings, footprints: &[Area], workers: usize) -> Result<Self> {
        if workers == 0 {
            return Err(SimError::InvalidSettings("need at least one patch worker".to_string()));
        }
        let pml = settings.pml_layers;
        let interior = Area::new(pml, pml + settings.cells_x, pml, pml + settings.cells_y);

        for (k, area) in footprints.iter().enumerate() {
            let inside = area.i_min >= interior.i_min
                && area.i_max <= interior.i_max
                && area.j_min >= interior.j_min
                && area.j_max <= interior.j_max;
            if !inside || area.is_empty() {
                return Err(SimError::InvalidSettings(format!(
                    "subgrid {k} footprint {area:?} leaves the interior {interior:?}"
                )));
            }
            if let Some(other) = footprints[..k].iter().position(|f| f.intersects(area)) {
                return Err(SimError::OverlappingSubgrids { first: other, second: k });
            }
        }

        let mut patches = vec![Vec::new(); workers];
        for i in interior.i_min..interior.i_max {
            let worker = i % workers;
            let mut run_start = None;
            for j in interior.j_min..=interior.j_max {
                let free = j < interior.j_max && !footprints.iter().any(|f| f.contains(i, j));
                match (free, run_start) {
                    (true, None) => run_start = Some(j),
                    (false, Some(start)) => {
                        patches[worker].push(Area::new(i, i + 1, start, j));
                        run_start = None;
                    }
                    _ => {}
                }
            }
        }

        let footprints = footprints
            .iter()
            .enumerate()
            .map(|(subgrid, &area)| FootprintOwner { subgrid, area, worker: subgrid % workers })
            .collect();

        let partition = Self { patches, footprints, interior };
        partition.validate()?;
        Ok(partition)
    }

    pub fn workers(&self) -> usize {
        self.patches.len()
    }

    pub fn interior(&self) -> Area {
        self.interior
    }

    /// Worker writing interior cell `(i, j)`
    pub fn owner_of(&self, i: usize, j: usize) -> Option<usize> {
        if !self.interior.contains(i, j) {
            return None;
        }
        if let Some(f) = self.footprints.iter().find(|f| f.area.contains(i, j)) {
            return Some(f.worker);
        }
        Some(i % self.workers())
    }

    /// All areas a worker updates: its patches then its footprints
    pub fn areas_of(&self, worker: usize) -> Vec<Area> {
        let mut areas = self.patches.get(worker).cloned().unwrap_or_default();
        areas.extend(self.footprints.iter().filter(|f| f.worker == worker).map(|f| f.area));
        areas
    }

    /// Check that every interior cell is claimed exactly once
    pub fn validate(&self) -> Result<()> {
        let (w, h) = (
            self.interior.i_max - self.interior.i_min,
            self.interior.j_max - self.interior.j_min,
        );
        let mut claims = vec![0u8; w * h];
        let all = self
            .patches
            .iter()
            .flatten()
            .chain(self.footprints.iter().map(|f| &f.area));
        for area in all {
            for (i, j) in area.indices() {
                if !self.interior.contains(i, j) {
                    return Err(SimError::InvalidSettings(format!(
                        "patch {area:?} leaves the interior"
                    )));
                }
                let slot = &mut claims[(i - self.interior.i_min) * h + (j - self.interior.j_min)];
                *slot = slot.saturating_add(1);
            }
        }
        match claims.iter().position(|&c| c != 1) {
            None => Ok(()),
            Some(k) => Err(SimError::InvalidSettings(format!(
                "interior cell ({}, {}) claimed {} times",
                self.interior.i_min + k / h,
                self.interior.j_min + k % h,
                claims[k]
            ))),
        }
    }
}
