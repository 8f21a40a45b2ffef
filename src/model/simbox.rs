use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::utils::linalg::triple_product;

/// Parallelepiped simulation cell: three lattice vectors and an origin.
///
/// Lattice vectors follow the triangular convention: `a` lies along x and
/// `b` in the xy plane. Fractional coordinates are solved by sequential
/// elimination, which depends on it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimBox {
    a: [f64; 3],
    b: [f64; 3],
    c: [f64; 3],
    origin: [f64; 3],
}

impl SimBox {
    /// Builds a box, rejecting zero or negative volume.
    pub fn new(
        avect: Vector3<f64>,
        bvect: Vector3<f64>,
        cvect: Vector3<f64>,
        origin: Vector3<f64>,
    ) -> Result<Self> {
        let volume = triple_product(&avect, &bvect, &cvect);
        if !(volume > 0.0) {
            return Err(Error::DegenerateBox(format!(
                "volume must be positive, got {}",
                volume
            )));
        }

        Ok(Self {
            a: avect.into(),
            b: bvect.into(),
            c: cvect.into(),
            origin: origin.into(),
        })
    }

    pub fn cubic(side: f64) -> Result<Self> {
        Self::orthorhombic(side, side, side)
    }

    pub fn orthorhombic(lx: f64, ly: f64, lz: f64) -> Result<Self> {
        Self::new(
            Vector3::new(lx, 0.0, 0.0),
            Vector3::new(0.0, ly, 0.0),
            Vector3::new(0.0, 0.0, lz),
            Vector3::zeros(),
        )
    }

    /// Lattice as rows `[a, b, c]`, origin at zero.
    pub fn from_lattice(lattice: [[f64; 3]; 3]) -> Result<Self> {
        Self::new(
            Vector3::from(lattice[0]),
            Vector3::from(lattice[1]),
            Vector3::from(lattice[2]),
            Vector3::zeros(),
        )
    }

    #[inline]
    pub fn avect(&self) -> Vector3<f64> {
        Vector3::from(self.a)
    }

    #[inline]
    pub fn bvect(&self) -> Vector3<f64> {
        Vector3::from(self.b)
    }

    #[inline]
    pub fn cvect(&self) -> Vector3<f64> {
        Vector3::from(self.c)
    }

    #[inline]
    pub fn origin(&self) -> Vector3<f64> {
        Vector3::from(self.origin)
    }

    /// Lattice vector by axis index (0 = a, 1 = b, 2 = c).
    pub fn vect(&self, axis: usize) -> Vector3<f64> {
        match axis {
            0 => self.avect(),
            1 => self.bvect(),
            _ => self.cvect(),
        }
    }

    pub fn lattice(&self) -> [[f64; 3]; 3] {
        [self.a, self.b, self.c]
    }

    pub fn volume(&self) -> f64 {
        triple_product(&self.avect(), &self.bvect(), &self.cvect())
    }

    pub fn set_origin(&mut self, origin: Vector3<f64>) {
        self.origin = origin.into();
    }

    /// The eight corners of the cell in Cartesian coordinates.
    pub fn corners(&self) -> [Vector3<f64>; 8] {
        let (o, a, b, c) = (self.origin(), self.avect(), self.bvect(), self.cvect());
        [
            o,
            o + a,
            o + b,
            o + c,
            o + a + b,
            o + a + c,
            o + b + c,
            o + a + b + c,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume() {
        let b = SimBox::orthorhombic(2.0, 3.0, 4.0).unwrap();
        assert!((b.volume() - 24.0).abs() < 1e-12);
        assert_eq!(b.lattice()[1], [0.0, 3.0, 0.0]);
    }

    #[test]
    fn test_degenerate_rejected() {
        let flat = SimBox::new(
            Vector3::new(1.0, 0.0, 0.0),
            Vector3::new(2.0, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::zeros(),
        );
        assert!(matches!(flat, Err(Error::DegenerateBox(_))));

        let left_handed = SimBox::orthorhombic(1.0, 1.0, -1.0);
        assert!(matches!(left_handed, Err(Error::DegenerateBox(_))));
    }

    #[test]
    fn test_corners() {
        let mut b = SimBox::cubic(2.0).unwrap();
        b.set_origin(Vector3::new(-1.0, -1.0, -1.0));
        let corners = b.corners();
        assert_eq!(corners[0], Vector3::new(-1.0, -1.0, -1.0));
        assert_eq!(corners[7], Vector3::new(1.0, 1.0, 1.0));
    }
}
