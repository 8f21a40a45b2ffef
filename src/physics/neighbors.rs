//! Bounded-radius neighbor search with linked cells and periodic images.
//!
//! The search grid covers an axis-aligned superbox around the cell, padded
//! by the cutoff on every side. Each atom is binned together with its
//! +/-1 lattice translations along periodic axes, so pairs that straddle a
//! periodic boundary meet in nearby bins. Every candidate pair is confirmed
//! with the true minimum-image distance before it is registered.

use nalgebra::Vector3;
use rayon::prelude::*;

use super::minimum_image::ImageShifts;
use crate::error::{Error, Result};
use crate::model::property::{DType, Value};
use crate::model::{SimBox, System};

/// Adjacency property: `[coordination, n_1, .., n_k, 0, ..]` per atom.
pub const NLIST: &str = "nlist";
/// Coordination property: neighbor count per atom.
pub const COORD: &str = "coord";

/// Per-atom neighbor rows packed into one arena of `natoms x capacity` slots.
///
/// When any row overflows, every row is widened to twice the capacity.
#[derive(Clone, Debug, PartialEq)]
pub struct NeighborList {
    capacity: usize,
    counts: Vec<usize>,
    slots: Vec<usize>,
}

impl NeighborList {
    pub fn new(natoms: usize, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            counts: vec![0; natoms],
            slots: vec![0; natoms * capacity],
        }
    }

    #[inline]
    pub fn natoms(&self) -> usize {
        self.counts.len()
    }

    /// Current row width.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// # Panics
    /// If `i >= natoms`.
    #[inline]
    pub fn coordination(&self, i: usize) -> usize {
        self.counts[i]
    }

    /// # Panics
    /// If `i >= natoms`.
    pub fn neighbors(&self, i: usize) -> &[usize] {
        let start = i * self.capacity;
        &self.slots[start..start + self.counts[i]]
    }

    pub fn contains(&self, i: usize, j: usize) -> bool {
        i < self.natoms() && self.neighbors(i).contains(&j)
    }

    /// Appends `j` to row `i`, widening the arena if the row is full.
    pub fn push(&mut self, i: usize, j: usize) {
        if self.counts[i] == self.capacity {
            self.reserve(self.capacity * 2);
        }
        self.slots[i * self.capacity + self.counts[i]] = j;
        self.counts[i] += 1;
    }

    /// Registers `i`-`j` in both rows. Returns `false` for self pairs and
    /// pairs already present.
    pub fn add_pair(&mut self, i: usize, j: usize) -> bool {
        if i == j || self.contains(i, j) {
            return false;
        }
        self.push(i, j);
        self.push(j, i);
        true
    }

    /// Widens rows by doubling until they hold at least `min_capacity`.
    pub(crate) fn reserve(&mut self, min_capacity: usize) {
        if min_capacity <= self.capacity {
            return;
        }
        let mut capacity = self.capacity;
        while capacity < min_capacity {
            capacity *= 2;
        }
        log::debug!("neighbor rows: widening from {} to {}", self.capacity, capacity);

        let mut slots = vec![0; self.natoms() * capacity];
        for (i, &count) in self.counts.iter().enumerate() {
            let src = i * self.capacity;
            slots[i * capacity..i * capacity + count].copy_from_slice(&self.slots[src..src + count]);
        }
        self.slots = slots;
        self.capacity = capacity;
    }

    pub fn sort_rows(&mut self) {
        for i in 0..self.natoms() {
            let start = i * self.capacity;
            self.slots[start..start + self.counts[i]].sort_unstable();
        }
    }

    pub fn is_symmetric(&self) -> bool {
        (0..self.natoms()).all(|i| self.neighbors(i).iter().all(|&j| self.contains(j, i)))
    }
}

/// One binned copy of an atom; `real` marks the untranslated copy.
#[derive(Clone, Copy, Debug)]
struct Occurrence {
    atom: usize,
    real: bool,
}

/// Grid size cap, per atom, before bins are coarsened.
const BINS_PER_ATOM: usize = 8;
/// Grids up to this many bins are never coarsened.
const MIN_BINS: usize = 4096;

/// Bins per axis, at least one, as floats so huge grids cannot overflow.
fn bin_counts(extent: &Vector3<f64>, binsize: f64) -> [f64; 3] {
    [0, 1, 2].map(|axis| (extent[axis] / binsize).ceil().max(1.0))
}

/// Uniform grid over the padded superbox.
struct BinGrid {
    lo: Vector3<f64>,
    binsize: f64,
    dims: [usize; 3],
    bins: Vec<Vec<Occurrence>>,
}

impl BinGrid {
    fn build(
        simbox: &SimBox,
        positions: &[Vector3<f64>],
        shifts: &ImageShifts,
        cutoff: f64,
        cmult: usize,
    ) -> Result<Self> {
        // Atoms outside the box still get a home bin
        let corners = simbox.corners();
        let mut lo = simbox.origin();
        let mut hi = simbox.origin();
        for p in corners.iter().chain(positions) {
            lo = lo.inf(p);
            hi = hi.sup(p);
        }
        let pad = Vector3::repeat(cutoff);
        lo -= pad;
        hi += pad;

        let extent = hi - lo;
        if !extent.iter().all(|x| x.is_finite()) {
            return Err(Error::MalformedValue(
                "non-finite atom position in neighbor search".to_string(),
            ));
        }

        // Coarser bins still cover the cutoff within `cmult` steps
        let budget = BINS_PER_ATOM.saturating_mul(positions.len()).max(MIN_BINS);
        let mut binsize = cutoff / cmult as f64;
        let mut counts = bin_counts(&extent, binsize);
        let mut total: f64 = counts.iter().product();
        while total > budget as f64 {
            binsize *= (total / budget as f64).cbrt().max(1.01);
            counts = bin_counts(&extent, binsize);
            total = counts.iter().product();
        }

        let dims = counts.map(|n| n as usize);
        let nbins = dims[0]
            .checked_mul(dims[1])
            .and_then(|n| n.checked_mul(dims[2]))
            .ok_or_else(|| Error::MalformedValue("cell list grid too large".to_string()))?;
        log::debug!(
            "cell list: {}x{}x{} bins of edge {:.4}",
            dims[0],
            dims[1],
            dims[2],
            binsize
        );

        let mut grid = Self {
            lo,
            binsize,
            dims,
            bins: vec![Vec::new(); nbins],
        };

        for (atom, p) in positions.iter().enumerate() {
            for (real, shift) in shifts.iter() {
                if let Some(cell) = grid.locate(&(p + shift)) {
                    let bin = grid.linear(cell);
                    grid.bins[bin].push(Occurrence { atom, real });
                }
            }
        }
        Ok(grid)
    }

    fn locate(&self, p: &Vector3<f64>) -> Option<[usize; 3]> {
        let mut cell = [0usize; 3];
        for axis in 0..3 {
            let x = ((p[axis] - self.lo[axis]) / self.binsize).floor();
            if !(x >= 0.0) || x >= self.dims[axis] as f64 {
                return None;
            }
            cell[axis] = x as usize;
        }
        Some(cell)
    }

    #[inline]
    fn linear(&self, cell: [usize; 3]) -> usize {
        cell[0] + self.dims[0] * (cell[1] + self.dims[1] * cell[2])
    }

    fn cell_of(&self, bin: usize) -> [i64; 3] {
        let x = bin % self.dims[0];
        let y = (bin / self.dims[0]) % self.dims[1];
        let z = bin / (self.dims[0] * self.dims[1]);
        [x as i64, y as i64, z as i64]
    }

    fn offset(&self, cell: [i64; 3], off: &[i64; 3]) -> Option<usize> {
        let mut target = [0usize; 3];
        for axis in 0..3 {
            let v = cell[axis] + off[axis];
            if v < 0 || v >= self.dims[axis] as i64 {
                return None;
            }
            target[axis] = v as usize;
        }
        Some(self.linear(target))
    }

    /// Atom pairs `(u, v)`, `u < v`, from occurrences sharing `bin` or
    /// sitting in `bin` and one of its forward neighbors. At least one side
    /// of every pair is a real occurrence.
    fn candidate_pairs(&self, bin: usize, offsets: &[[i64; 3]]) -> Vec<(usize, usize)> {
        let here = &self.bins[bin];
        let mut out = Vec::new();
        if here.is_empty() {
            return out;
        }
        let here_real = here.iter().any(|o| o.real);

        for (n, a) in here.iter().enumerate() {
            for b in &here[n + 1..] {
                consider(a, b, &mut out);
            }
        }

        let cell = self.cell_of(bin);
        for off in offsets {
            let Some(other) = self.offset(cell, off) else {
                continue;
            };
            let there = &self.bins[other];
            if !here_real && !there.iter().any(|o| o.real) {
                continue;
            }
            for a in here {
                for b in there {
                    consider(a, b, &mut out);
                }
            }
        }

        out.sort_unstable();
        out.dedup();
        out
    }
}

#[inline]
fn consider(a: &Occurrence, b: &Occurrence, out: &mut Vec<(usize, usize)>) {
    if (a.real || b.real) && a.atom != b.atom {
        out.push((a.atom.min(b.atom), a.atom.max(b.atom)));
    }
}

/// Bin offsets within `cmult` steps on every axis, keeping exactly one of
/// each offset and its point reflection.
fn half_offsets(cmult: usize) -> Vec<[i64; 3]> {
    let m = cmult as i64;
    let mut offsets = Vec::new();
    for dx in -m..=m {
        for dy in -m..=m {
            for dz in -m..=m {
                if (dx, dy, dz) > (0, 0, 0) {
                    offsets.push([dx, dy, dz]);
                }
            }
        }
    }
    offsets
}

impl System {
    /// Builds the neighbor relation for `cutoff` using the configured bin multiplier.
    pub fn neighbors(&mut self, cutoff: f64) -> Result<()> {
        self.neighbors_with(cutoff, self.config.cmult)
    }

    /// Builds the neighbor relation for `cutoff` with bins of edge `cutoff / cmult`.
    ///
    /// Stores the result in the [`NLIST`] and [`COORD`] properties.
    pub fn neighbors_with(&mut self, cutoff: f64, cmult: usize) -> Result<()> {
        if !(cutoff > 0.0) || !cutoff.is_finite() {
            return Err(Error::InvalidCutoff(cutoff));
        }
        if cmult == 0 {
            return Err(Error::InvalidBinMultiplier(cmult));
        }

        let positions = self.positions()?;
        let shifts = ImageShifts::new(&self.simbox, self.pbc);
        let grid = BinGrid::build(&self.simbox, &positions, &shifts, cutoff, cmult)?;
        let offsets = half_offsets(cmult);
        let cutoff_sq = cutoff * cutoff;

        let pairs: Vec<(usize, usize)> = (0..grid.bins.len())
            .into_par_iter()
            .flat_map_iter(|bin| grid.candidate_pairs(bin, &offsets))
            .filter(|&(u, v)| shifts.minimum(positions[v] - positions[u]).norm_squared() < cutoff_sq)
            .collect();

        let mut nlist = NeighborList::new(self.natoms(), self.config.initial_neighbor_capacity);
        let mut registered = 0usize;
        for (u, v) in pairs {
            if nlist.add_pair(u, v) {
                registered += 1;
            }
        }
        nlist.sort_rows();
        log::info!(
            "neighbors: {} atoms, {} pairs within {}",
            self.natoms(),
            registered,
            cutoff
        );

        self.store_neighbors(&nlist)
    }

    /// Writes `nlist` into the [`NLIST`] and [`COORD`] properties,
    /// replacing any previous relation.
    pub(crate) fn store_neighbors(&mut self, nlist: &NeighborList) -> Result<()> {
        self.invalidate_neighbors();

        let width = nlist.capacity() + 1;
        self.props.register(COORD, DType::Int, Vec::new())?;
        self.props.register(NLIST, DType::Int, vec![width])?;

        let mut row = vec![0i64; width];
        for i in 0..nlist.natoms() {
            let neighbors = nlist.neighbors(i);
            row.fill(0);
            row[0] = neighbors.len() as i64;
            for (slot, &j) in row[1..].iter_mut().zip(neighbors) {
                *slot = j as i64;
            }
            self.props.set(i, COORD, Value::int(neighbors.len() as i64))?;
            self.props.set(i, NLIST, Value::int_vector(&row))?;
        }
        Ok(())
    }

    /// The stored neighbor relation, or `None` if it was never built or
    /// has been invalidated.
    pub fn neighbor_list(&self) -> Option<NeighborList> {
        let width = *self.props.info(NLIST)?.shape.first()?;
        let mut nlist = NeighborList::new(self.natoms(), width.saturating_sub(1));
        for i in 0..self.natoms() {
            let row = self.props.raw(i, NLIST)?;
            let count = row[0] as usize;
            for &j in row.get(1..1 + count)? {
                nlist.push(i, j as usize);
            }
        }
        Some(nlist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Atom;

    /// n x n x n simple-cubic lattice with spacing `a`.
    fn simple_cubic(n: usize, a: f64, pbc: [bool; 3]) -> System {
        let mut atoms = Vec::new();
        for i in 0..n {
            for j in 0..n {
                for k in 0..n {
                    atoms.push(Atom::new(1, [i as f64 * a, j as f64 * a, k as f64 * a]));
                }
            }
        }
        System::from_atoms(SimBox::cubic(n as f64 * a).unwrap(), pbc, &atoms).unwrap()
    }

    fn brute_force(system: &System, cutoff: f64) -> Vec<Vec<usize>> {
        let n = system.natoms();
        (0..n)
            .map(|i| {
                (0..n)
                    .filter(|&j| j != i && system.distance(i, j).unwrap() < cutoff)
                    .collect()
            })
            .collect()
    }

    fn assert_matches_brute_force(system: &System, cutoff: f64) {
        let expected = brute_force(system, cutoff);
        let nlist = system.neighbor_list().unwrap();
        for (i, row) in expected.iter().enumerate() {
            assert_eq!(nlist.neighbors(i), row.as_slice(), "atom {}", i);
            assert_eq!(
                system.get(i, COORD).unwrap().unwrap().as_int(),
                Some(row.len() as i64)
            );
        }
    }

    #[test]
    fn test_simple_cubic_coordination() {
        // side 4.0, spacing 1.0
        let mut system = simple_cubic(4, 1.0, [true; 3]);
        system.neighbors(1.01).unwrap();

        let nlist = system.neighbor_list().unwrap();
        for i in 0..system.natoms() {
            assert_eq!(nlist.coordination(i), 6, "atom {}", i);
            assert!(!nlist.neighbors(i).contains(&i));
        }
        assert!(nlist.is_symmetric());
    }

    #[test]
    fn test_two_wide_cell_has_distinct_neighbors_only() {
        // 8 atoms, side 4.0, spacing 2.0: the +x and -x images are the same
        // atom, so each atom has 3 distinct neighbors.
        let mut system = simple_cubic(2, 2.0, [true; 3]);
        system.neighbors(1.01 * 2.0).unwrap();

        let nlist = system.neighbor_list().unwrap();
        assert_eq!(nlist.neighbors(0), &[1, 2, 4]);
        assert!((0..8).all(|i| nlist.coordination(i) == 3));
        assert!(nlist.is_symmetric());
    }

    #[test]
    fn test_against_brute_force() {
        let mut system = simple_cubic(4, 1.3, [true, false, true]);
        // jitter positions so distances are not all equal
        for i in 0..system.natoms() {
            let p = system.pos(i).unwrap();
            let j = i as f64;
            let jitter = Vector3::new((j * 0.37).sin(), (j * 0.91).cos(), (j * 0.53).sin()) * 0.2;
            system.set_pos(i, p + jitter).unwrap();
        }

        for (cutoff, cmult) in [(1.5, 1), (1.5, 2), (2.1, 3)] {
            system.neighbors_with(cutoff, cmult).unwrap();
            assert_matches_brute_force(&system, cutoff);
        }
    }

    #[test]
    fn test_triclinic_against_brute_force() {
        let simbox = SimBox::new(
            Vector3::new(5.0, 0.0, 0.0),
            Vector3::new(1.5, 4.5, 0.0),
            Vector3::new(-1.0, 1.0, 4.8),
            Vector3::new(0.5, -0.5, 0.0),
        )
        .unwrap();
        let mut system = System::new(simbox, [true; 3], 30);
        for i in 0..30 {
            let f = Vector3::new(
                (i as f64 * 0.618).fract(),
                (i as f64 * 0.414).fract(),
                (i as f64 * 0.732).fract(),
            );
            let p = system.unscale(f);
            system.set_pos(i, p).unwrap();
        }

        system.neighbors(2.2).unwrap();
        assert_matches_brute_force(&system, 2.2);
        assert!(system.neighbor_list().unwrap().is_symmetric());
    }

    #[test]
    fn test_tiny_cutoff_coarsens_grid() {
        let atoms = vec![
            Atom::new(1, [1.0, 1.0, 1.0]),
            Atom::new(1, [1.0, 1.0, 1.0 + 5e-7]),
            Atom::new(1, [6.0, 6.0, 6.0]),
        ];
        let mut system =
            System::from_atoms(SimBox::cubic(10.0).unwrap(), [true; 3], &atoms).unwrap();
        system.neighbors(1e-6).unwrap();

        assert_matches_brute_force(&system, 1e-6);
        assert_eq!(system.neighbor_list().unwrap().neighbors(0), &[1]);
    }

    #[test]
    fn test_far_away_atoms() {
        let atoms = vec![
            Atom::new(1, [0.5, 0.5, 0.5]),
            Atom::new(1, [1.0e9, 0.5, 0.5]),
            Atom::new(1, [1.0e9 + 1.0, 0.5, 0.5]),
        ];
        let mut system =
            System::from_atoms(SimBox::cubic(4.0).unwrap(), [false; 3], &atoms).unwrap();
        system.neighbors(1.5).unwrap();

        assert_matches_brute_force(&system, 1.5);
        assert_eq!(system.neighbor_list().unwrap().neighbors(1), &[2]);
    }

    #[test]
    fn test_invalid_arguments() {
        let mut system = simple_cubic(2, 1.0, [true; 3]);
        assert!(matches!(system.neighbors(0.0), Err(Error::InvalidCutoff(_))));
        assert!(matches!(system.neighbors(-1.0), Err(Error::InvalidCutoff(_))));
        assert!(matches!(system.neighbors(f64::NAN), Err(Error::InvalidCutoff(_))));
        assert!(matches!(
            system.neighbors_with(1.0, 0),
            Err(Error::InvalidBinMultiplier(0))
        ));
        assert!(system.neighbor_list().is_none());
    }

    #[test]
    fn test_invalidated_by_position_change() {
        let mut system = simple_cubic(2, 2.0, [true; 3]);
        system.neighbors(2.02).unwrap();
        assert!(system.neighbor_list().is_some());

        system.set_pos(0, Vector3::new(0.1, 0.0, 0.0)).unwrap();
        assert!(system.neighbor_list().is_none());
        assert!(!system.prop_names().contains(&COORD.to_string()));

        system.neighbors(2.02).unwrap();
        system.set_pbc([true, true, false]);
        assert!(system.neighbor_list().is_none());
    }

    #[test]
    fn test_row_growth_doubles() {
        let mut nlist = NeighborList::new(3, 2);
        nlist.add_pair(0, 1);
        nlist.add_pair(0, 2);
        assert_eq!(nlist.capacity(), 2);
        nlist.push(0, 7);
        assert_eq!(nlist.capacity(), 4);
        assert_eq!(nlist.neighbors(0), &[1, 2, 7]);
        assert_eq!(nlist.neighbors(2), &[0]);

        assert!(!nlist.add_pair(1, 0));
        assert!(!nlist.add_pair(1, 1));
    }

    #[test]
    fn test_dense_cluster_grows_capacity() {
        // 50 atoms inside a tiny sphere: each has 49 neighbors > 40 default slots
        let mut system = System::new(SimBox::cubic(20.0).unwrap(), [false; 3], 50);
        for i in 0..50 {
            let t = i as f64;
            system
                .set_pos(i, Vector3::new(10.0 + 0.1 * t.sin(), 10.0 + 0.1 * t.cos(), 10.0 + 0.002 * t))
                .unwrap();
        }
        system.neighbors(1.0).unwrap();

        let nlist = system.neighbor_list().unwrap();
        assert_eq!(nlist.capacity(), 80);
        assert!((0..50).all(|i| nlist.coordination(i) == 49));
        assert_eq!(system.properties().info(NLIST).unwrap().shape, vec![81]);
    }

    #[test]
    fn test_half_offsets() {
        let offsets = half_offsets(2);
        assert_eq!(offsets.len(), (125 - 1) / 2);
        for off in &offsets {
            let mirror = [-off[0], -off[1], -off[2]];
            assert!(!offsets.contains(&mirror));
        }
    }
}
