//! Minimum-image displacement under periodic boundary conditions.

use nalgebra::Vector3;

use crate::error::Result;
use crate::model::{Atom, SimBox, System};

/// One end of a displacement: a raw point, an atom of the system, or a
/// standalone atom record.
#[derive(Clone, Copy, Debug)]
pub enum Site<'a> {
    Point(Vector3<f64>),
    Index(usize),
    Atom(&'a Atom),
}

impl From<Vector3<f64>> for Site<'_> {
    fn from(p: Vector3<f64>) -> Self {
        Site::Point(p)
    }
}

impl From<[f64; 3]> for Site<'_> {
    fn from(p: [f64; 3]) -> Self {
        Site::Point(Vector3::from(p))
    }
}

impl From<usize> for Site<'_> {
    fn from(i: usize) -> Self {
        Site::Index(i)
    }
}

impl<'a> From<&'a Atom> for Site<'a> {
    fn from(atom: &'a Atom) -> Self {
        Site::Atom(atom)
    }
}

/// Lattice translations by -1/0/+1 along every periodic axis.
///
/// Non-periodic axes contribute only 0, so there are `3^k` entries for `k`
/// periodic axes. Order is a-major, then b, then c.
#[derive(Clone, Debug)]
pub(crate) struct ImageShifts {
    vectors: Vec<Vector3<f64>>,
    identity: usize,
}

impl ImageShifts {
    pub(crate) fn new(simbox: &SimBox, pbc: [bool; 3]) -> Self {
        let steps = |periodic: bool| if periodic { -1..=1 } else { 0..=0 };
        let (a, b, c) = (simbox.avect(), simbox.bvect(), simbox.cvect());

        let mut vectors = Vec::with_capacity(27);
        let mut identity = 0;
        for i in steps(pbc[0]) {
            for j in steps(pbc[1]) {
                for k in steps(pbc[2]) {
                    if (i, j, k) == (0, 0, 0) {
                        identity = vectors.len();
                    }
                    vectors.push(a * i as f64 + b * j as f64 + c * k as f64);
                }
            }
        }
        Self { vectors, identity }
    }

    /// Every translation, flagged `true` for the zero translation.
    pub(crate) fn iter(&self) -> impl Iterator<Item = (bool, &Vector3<f64>)> + '_ {
        self.vectors
            .iter()
            .enumerate()
            .map(move |(n, v)| (n == self.identity, v))
    }

    /// Shortest of all translated copies of `delta`; the direct displacement
    /// wins ties, then earlier translations.
    pub(crate) fn minimum(&self, delta: Vector3<f64>) -> Vector3<f64> {
        let mut best = delta;
        let mut best_sq = delta.norm_squared();
        for (n, shift) in self.vectors.iter().enumerate() {
            if n == self.identity {
                continue;
            }
            let candidate = delta + shift;
            let d_sq = candidate.norm_squared();
            if d_sq < best_sq {
                best = candidate;
                best_sq = d_sq;
            }
        }
        best
    }
}

impl System {
    fn resolve(&self, site: Site<'_>) -> Result<Vector3<f64>> {
        match site {
            Site::Point(p) => Ok(p),
            Site::Index(i) => self.pos(i),
            Site::Atom(atom) => Ok(Vector3::from(atom.pos)),
        }
    }

    /// Minimum-image displacement from `a` to `b`.
    pub fn dvect<'a, 'b>(
        &self,
        a: impl Into<Site<'a>>,
        b: impl Into<Site<'b>>,
    ) -> Result<Vector3<f64>> {
        let pa = self.resolve(a.into())?;
        let pb = self.resolve(b.into())?;
        Ok(ImageShifts::new(&self.simbox, self.pbc).minimum(pb - pa))
    }

    /// Length of [`dvect`](System::dvect).
    pub fn distance<'a, 'b>(&self, a: impl Into<Site<'a>>, b: impl Into<Site<'b>>) -> Result<f64> {
        Ok(self.dvect(a, b)?.norm())
    }
}
