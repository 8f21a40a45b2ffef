use nalgebra::Vector3;

use super::property::{PropertyTable, Value, ATYPE, POS};
use super::simbox::SimBox;
use super::structure::{Atom, AtomRecord};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::physics::neighbors::{COORD, NLIST};
use crate::utils::linalg::{cart_to_frac_triangular, frac_to_cart};

/// Fractional values this close below 1 wrap to 0.
const WRAP_SNAP: f64 = 1e-12;

/// A periodic cell of atoms: one box, a periodicity flag per lattice
/// direction and a per-atom property table.
///
/// The atom count is fixed; operations that add or remove atoms
/// ([`point_defect`](System::point_defect), [`supercell`](crate::supercell))
/// return new systems.
#[derive(Clone, Debug)]
pub struct System {
    pub(crate) simbox: SimBox,
    pub(crate) pbc: [bool; 3],
    pub(crate) props: PropertyTable,
    pub(crate) config: Config,
}

impl System {
    /// `natoms` atoms of type 1, all at the Cartesian origin.
    pub fn new(simbox: SimBox, pbc: [bool; 3], natoms: usize) -> Self {
        let config = Config::default();
        Self {
            simbox,
            pbc,
            props: PropertyTable::for_atoms(natoms, config.column_slack),
            config,
        }
    }

    /// Builds a system from atom records, registering their extra properties
    /// in first-seen order.
    pub fn from_atoms<A: AtomRecord>(simbox: SimBox, pbc: [bool; 3], atoms: &[A]) -> Result<Self> {
        let mut system = Self::new(simbox, pbc, atoms.len());
        for (i, atom) in atoms.iter().enumerate() {
            system.set(i, ATYPE, atom.atype())?;
            system.set(i, POS, atom.pos())?;
            for (name, value) in atom.properties() {
                system.set(i, name, value.clone())?;
            }
        }
        Ok(system)
    }

    pub(crate) fn from_parts(simbox: SimBox, pbc: [bool; 3], props: PropertyTable, config: Config) -> Self {
        Self {
            simbox,
            pbc,
            props,
            config,
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.props.set_slack(config.column_slack);
        self.config = config;
        self
    }

    #[inline]
    pub fn natoms(&self) -> usize {
        self.props.natoms()
    }

    #[inline]
    pub fn simbox(&self) -> &SimBox {
        &self.simbox
    }

    #[inline]
    pub fn pbc(&self) -> [bool; 3] {
        self.pbc
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn properties(&self) -> &PropertyTable {
        &self.props
    }

    pub fn prop_names(&self) -> Vec<String> {
        self.props.names()
    }

    /// Reads a property. `Ok(None)` if `name` is not registered.
    pub fn get(&self, index: usize, name: &str) -> Result<Option<Value>> {
        self.props.get(index, name)
    }

    /// Writes a property value for one atom.
    ///
    /// Writing `pos` drops the neighbor relation.
    pub fn set(&mut self, index: usize, name: &str, value: impl Into<Value>) -> Result<()> {
        let value = value.into();
        if name == ATYPE {
            if let Some(t) = value.as_int() {
                if t < 1 {
                    return Err(Error::InvalidAtomType(t));
                }
            }
        }

        self.props.set(index, name, value)?;
        if name == POS {
            self.invalidate_neighbors();
        }
        Ok(())
    }

    fn mandatory(&self, index: usize, name: &str) -> Result<&[f64]> {
        if index >= self.natoms() {
            return Err(Error::IndexOutOfRange {
                index,
                natoms: self.natoms(),
            });
        }
        self.props
            .raw(index, name)
            .ok_or_else(|| Error::MalformedValue(format!("mandatory property '{}' missing", name)))
    }

    pub fn atype(&self, index: usize) -> Result<i64> {
        Ok(self.mandatory(index, ATYPE)?[0] as i64)
    }

    pub fn pos(&self, index: usize) -> Result<Vector3<f64>> {
        let p = self.mandatory(index, POS)?;
        Ok(Vector3::new(p[0], p[1], p[2]))
    }

    pub fn set_atype(&mut self, index: usize, atype: i64) -> Result<()> {
        self.set(index, ATYPE, atype)
    }

    pub fn set_pos(&mut self, index: usize, pos: Vector3<f64>) -> Result<()> {
        self.set(index, POS, pos)
    }

    /// Copies one atom, with every registered property, out of the table.
    pub fn atom(&self, index: usize) -> Result<Atom> {
        let mut atom = Atom::new(self.atype(index)?, self.pos(index)?.into());
        for name in self.props.names() {
            if name == ATYPE || name == POS {
                continue;
            }
            if let Some(value) = self.props.get(index, &name)? {
                atom.properties.push((name, value));
            }
        }
        Ok(atom)
    }

    pub fn set_pbc(&mut self, pbc: [bool; 3]) {
        if pbc != self.pbc {
            self.pbc = pbc;
            self.invalidate_neighbors();
        }
    }

    /// Replaces the box. With `rescale_atoms` the atoms keep their fractional
    /// coordinates; otherwise they keep their absolute ones.
    pub fn set_box(&mut self, simbox: SimBox, rescale_atoms: bool) -> Result<()> {
        if rescale_atoms {
            let positions = self
                .scaled_positions()?
                .iter()
                .map(|f| to_cart(&simbox, f))
                .collect::<Vec<_>>();
            self.write_positions(&positions)?;
        }
        self.simbox = simbox;
        self.invalidate_neighbors();
        Ok(())
    }

    /// Cartesian point to fractional coordinates.
    pub fn scale(&self, point: Vector3<f64>) -> Result<Vector3<f64>> {
        to_frac(&self.simbox, self.config.residual_tolerance, &point)
    }

    /// Fractional coordinates to a Cartesian point.
    pub fn unscale(&self, frac: Vector3<f64>) -> Vector3<f64> {
        to_cart(&self.simbox, &frac)
    }

    /// Same atom with `pos` in fractional coordinates.
    pub fn scale_atom(&self, atom: &Atom) -> Result<Atom> {
        let mut scaled = atom.clone();
        scaled.pos = self.scale(Vector3::from(atom.pos))?.into();
        Ok(scaled)
    }

    /// Same atom with a fractional `pos` turned back into Cartesian.
    pub fn unscale_atom(&self, atom: &Atom) -> Atom {
        let mut unscaled = atom.clone();
        unscaled.pos = self.unscale(Vector3::from(atom.pos)).into();
        unscaled
    }

    pub fn positions(&self) -> Result<Vec<Vector3<f64>>> {
        (0..self.natoms()).map(|i| self.pos(i)).collect()
    }

    pub fn scaled_positions(&self) -> Result<Vec<Vector3<f64>>> {
        (0..self.natoms()).map(|i| self.scale(self.pos(i)?)).collect()
    }

    /// Wraps atoms back into the box along periodic axes and stretches the
    /// box along non-periodic axes until it covers every atom.
    ///
    /// Atom order is preserved. Non-periodic positions never move; the box
    /// never shrinks.
    pub fn wrap(&mut self) -> Result<()> {
        let (fracs, lo, hi) = self.wrapped_fractions()?;
        self.commit_wrap(&fracs, lo, hi)
    }

    /// Fractional positions wrapped along periodic axes, plus the fractional
    /// span `[lo, hi]` the box must cover on non-periodic ones.
    pub(crate) fn wrapped_fractions(&self) -> Result<(Vec<Vector3<f64>>, [f64; 3], [f64; 3])> {
        let mut fracs = self.scaled_positions()?;
        let eps = self.config.wrap_epsilon;
        let mut lo = [0.0f64; 3];
        let mut hi = [1.0f64; 3];

        for f in fracs.iter_mut() {
            for axis in 0..3 {
                if self.pbc[axis] {
                    f[axis] = wrap_unit(f[axis]);
                } else if f[axis] < lo[axis] {
                    lo[axis] = f[axis] - eps;
                } else if f[axis] > hi[axis] {
                    hi[axis] = f[axis] + eps;
                }
            }
        }
        Ok((fracs, lo, hi))
    }

    /// Writes wrapped fractions back and stretches the box to `[lo, hi]` on
    /// non-periodic axes.
    pub(crate) fn commit_wrap(&mut self, fracs: &[Vector3<f64>], lo: [f64; 3], hi: [f64; 3]) -> Result<()> {
        let old = &self.simbox;
        let mut origin = old.origin();
        let mut vects = [old.avect(), old.bvect(), old.cvect()];
        for axis in 0..3 {
            if !self.pbc[axis] && (lo[axis] != 0.0 || hi[axis] != 1.0) {
                log::debug!(
                    "wrap: extending non-periodic axis {} to fractional [{}, {}]",
                    axis,
                    lo[axis],
                    hi[axis]
                );
                origin += vects[axis] * lo[axis];
                vects[axis] *= hi[axis] - lo[axis];
            }
        }
        let new_box = SimBox::new(vects[0], vects[1], vects[2], origin)?;

        // Positions come from the old box so non-periodic coordinates stay put
        let positions: Vec<Vector3<f64>> = fracs.iter().map(|f| to_cart(old, f)).collect();

        self.write_positions(&positions)?;
        self.simbox = new_box;
        self.invalidate_neighbors();
        Ok(())
    }

    fn write_positions(&mut self, positions: &[Vector3<f64>]) -> Result<()> {
        for (i, p) in positions.iter().enumerate() {
            self.props.set(i, POS, Value::from(*p))?;
        }
        Ok(())
    }

    /// Removes the stored neighbor relation.
    pub(crate) fn invalidate_neighbors(&mut self) {
        let dropped_nlist = self.props.remove(NLIST);
        let dropped_coord = self.props.remove(COORD);
        if dropped_nlist || dropped_coord {
            log::debug!("neighbor list invalidated");
        }
    }
}

fn to_frac(simbox: &SimBox, tolerance: f64, point: &Vector3<f64>) -> Result<Vector3<f64>> {
    let d = point - simbox.origin();
    let (frac, rest) =
        cart_to_frac_triangular(&d, &simbox.avect(), &simbox.bvect(), &simbox.cvect())
            .ok_or_else(|| Error::DegenerateBox("zero pivot among lattice vectors".to_string()))?;

    let bound = tolerance * d.norm().max(1.0);
    if !(rest.norm() <= bound) {
        return Err(Error::DegenerateBox(format!(
            "lattice vectors break the triangular convention (residual {:e})",
            rest.norm()
        )));
    }
    Ok(frac)
}

fn to_cart(simbox: &SimBox, frac: &Vector3<f64>) -> Vector3<f64> {
    simbox.origin() + frac_to_cart(frac, &simbox.avect(), &simbox.bvect(), &simbox.cvect())
}

/// Maps a fractional coordinate into `[0, 1)`.
fn wrap_unit(x: f64) -> f64 {
    let w = x - x.floor();
    if w >= 1.0 - WRAP_SNAP {
        0.0
    } else {
        w
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::property::DType;

    fn triclinic() -> SimBox {
        SimBox::new(
            Vector3::new(4.0, 0.0, 0.0),
            Vector3::new(1.2, 3.8, 0.0),
            Vector3::new(-0.6, 0.9, 4.5),
            Vector3::new(-1.0, 0.5, 2.0),
        )
        .unwrap()
    }

    #[test]
    fn test_new_defaults() {
        let system = System::new(SimBox::cubic(2.0).unwrap(), [true; 3], 3);
        assert_eq!(system.natoms(), 3);
        assert_eq!(system.atype(2).unwrap(), 1);
        assert_eq!(system.pos(2).unwrap(), Vector3::zeros());
        assert_eq!(system.prop_names(), vec!["atype".to_string(), "pos".to_string()]);
    }

    #[test]
    fn test_from_atoms() {
        let atoms = vec![
            Atom::new(1, [0.0, 0.0, 0.0]).with_property("charge", 0.4),
            Atom::new(2, [1.0, 1.0, 1.0])
                .with_property("charge", -0.4)
                .with_property("velocity", [0.1, 0.2, 0.3]),
        ];
        let system = System::from_atoms(SimBox::cubic(3.0).unwrap(), [true; 3], &atoms).unwrap();

        assert_eq!(system.prop_names(), vec!["atype", "pos", "charge", "velocity"]);
        assert_eq!(system.atype(1).unwrap(), 2);
        assert_eq!(
            system.get(1, "velocity").unwrap().unwrap().as_vec3(),
            Some(Vector3::new(0.1, 0.2, 0.3))
        );
        // atom 0 never set velocity
        assert_eq!(
            system.get(0, "velocity").unwrap().unwrap().as_vec3(),
            Some(Vector3::zeros())
        );
        assert_eq!(system.atom(1).unwrap(), atoms[1]);
    }

    #[test]
    fn test_from_atoms_rejects_bad_type() {
        let atoms = vec![Atom::new(0, [0.0; 3])];
        let err = System::from_atoms(SimBox::cubic(3.0).unwrap(), [true; 3], &atoms);
        assert!(matches!(err, Err(Error::InvalidAtomType(0))));
    }

    #[test]
    fn test_set_validation() {
        let mut system = System::new(SimBox::cubic(2.0).unwrap(), [true; 3], 2);
        assert!(matches!(
            system.set(0, "pos", Value::float_vector(&[1.0, 2.0])),
            Err(Error::ShapeMismatch { .. })
        ));
        assert!(matches!(
            system.set(0, "atype", 1.5),
            Err(Error::TypeMismatch { .. })
        ));
        assert!(matches!(
            system.set(2, "atype", 1i64),
            Err(Error::IndexOutOfRange { .. })
        ));
        assert!(system.get(0, "missing").unwrap().is_none());
        assert_eq!(system.properties().info("pos").unwrap().dtype, DType::Float);
    }

    #[test]
    fn test_scale_roundtrip() {
        let mut system = System::new(triclinic(), [true; 3], 0);
        system.config.residual_tolerance = 1e-10;

        let frac = Vector3::new(0.25, 0.5, 0.75);
        let p = system.unscale(frac);
        assert!((system.scale(p).unwrap() - frac).norm() < 1e-12);

        let q = Vector3::new(0.3, 1.1, 3.0);
        assert!((system.unscale(system.scale(q).unwrap()) - q).norm() < 1e-12);

        let origin = system.simbox().origin();
        assert!(system.scale(origin).unwrap().norm() < 1e-12);
    }

    #[test]
    fn test_scale_atom() {
        let system = System::new(SimBox::orthorhombic(2.0, 4.0, 8.0).unwrap(), [true; 3], 0);
        let atom = Atom::new(3, [1.0, 1.0, 1.0]).with_property("charge", 1.0);

        let scaled = system.scale_atom(&atom).unwrap();
        assert_eq!(scaled.pos, [0.5, 0.25, 0.125]);
        assert_eq!(scaled.atype, 3);
        assert_eq!(scaled.properties, atom.properties);
        assert_eq!(system.unscale_atom(&scaled), atom);
    }

    #[test]
    fn test_scale_rejects_non_triangular_box() {
        let skewed = SimBox::new(
            Vector3::new(4.0, 1.0, 0.0),
            Vector3::new(0.0, 4.0, 0.0),
            Vector3::new(0.0, 0.0, 4.0),
            Vector3::zeros(),
        )
        .unwrap();
        let system = System::new(skewed, [true; 3], 0);
        assert!(matches!(
            system.scale(Vector3::new(1.0, 2.0, 3.0)),
            Err(Error::DegenerateBox(_))
        ));
    }

    #[test]
    fn test_wrap_periodic() {
        let mut system = System::new(SimBox::cubic(4.0).unwrap(), [true; 3], 2);
        system.set_pos(0, Vector3::new(-1.0, 5.0, 9.0)).unwrap();
        system.set_pos(1, Vector3::new(3.9, 4.0, -8.5)).unwrap();
        system.wrap().unwrap();

        assert!((system.pos(0).unwrap() - Vector3::new(3.0, 1.0, 1.0)).norm() < 1e-12);
        assert!((system.pos(1).unwrap() - Vector3::new(3.9, 0.0, 3.5)).norm() < 1e-12);
        assert_eq!(system.simbox(), &SimBox::cubic(4.0).unwrap());
    }

    #[test]
    fn test_wrap_extends_non_periodic_axis() {
        let mut system = System::new(SimBox::cubic(4.0).unwrap(), [true, true, false], 2);
        system.set_pos(0, Vector3::new(1.0, 1.0, -2.0)).unwrap();
        system.set_pos(1, Vector3::new(5.0, 1.0, 6.0)).unwrap();
        system.wrap().unwrap();

        // z positions untouched, x wrapped
        assert!((system.pos(0).unwrap() - Vector3::new(1.0, 1.0, -2.0)).norm() < 1e-12);
        assert!((system.pos(1).unwrap() - Vector3::new(1.0, 1.0, 6.0)).norm() < 1e-12);

        let b = system.simbox();
        assert!(b.origin().z < -2.0 && b.origin().z > -2.0 - 1e-6);
        assert!(b.origin().z + b.cvect().z > 6.0);
        assert_eq!(b.avect(), Vector3::new(4.0, 0.0, 0.0));

        for f in system.scaled_positions().unwrap() {
            assert!(f.z > 0.0 && f.z < 1.0);
        }
    }

    #[test]
    fn test_wrap_idempotent() {
        let mut system = System::new(triclinic(), [true, false, true], 4);
        let points = [
            Vector3::new(-3.0, 7.0, 1.0),
            Vector3::new(9.5, -2.0, 12.0),
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(2.0, 2.0, -4.0),
        ];
        for (i, p) in points.iter().enumerate() {
            system.set_pos(i, *p).unwrap();
        }

        system.wrap().unwrap();
        let box_once = system.simbox().clone();
        let pos_once = system.positions().unwrap();

        system.wrap().unwrap();
        let b = system.simbox();
        assert!((b.origin() - box_once.origin()).norm() < 1e-9);
        assert!((b.bvect() - box_once.bvect()).norm() < 1e-9);
        for (p, q) in system.positions().unwrap().iter().zip(&pos_once) {
            assert!((p - q).norm() < 1e-9);
        }
    }

    #[test]
    fn test_set_box_rescale() {
        let mut system = System::new(SimBox::cubic(2.0).unwrap(), [true; 3], 1);
        system.set_pos(0, Vector3::new(1.0, 1.0, 1.0)).unwrap();

        system.set_box(SimBox::cubic(4.0).unwrap(), true).unwrap();
        assert_eq!(system.pos(0).unwrap(), Vector3::new(2.0, 2.0, 2.0));

        system.set_box(SimBox::cubic(8.0).unwrap(), false).unwrap();
        assert_eq!(system.pos(0).unwrap(), Vector3::new(2.0, 2.0, 2.0));
    }
}
