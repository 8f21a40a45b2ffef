//! Periodic atomic systems: a simulation box, a columnar per-atom property
//! table, and the geometry built on top of them.
//!
//! A [`System`] owns its [`SimBox`], per-axis periodicity and a
//! [`PropertyTable`] holding at least `atype` and `pos` for every atom. On
//! top of that it offers
//!
//! * fractional/Cartesian conversion and wrapping into the box,
//! * minimum-image displacements ([`System::dvect`]),
//! * a cell-list neighbor search stored back as `nlist`/`coord` properties
//!   ([`System::neighbors`]), with a plain-text exchange format in [`io`],
//! * paired perfect/defect systems for point defects
//!   ([`System::point_defect`]) and supercell replication ([`supercell`]).
//!
//! ```no_run
//! use atomsys::{Atom, SimBox, System};
//!
//! # fn main() -> atomsys::Result<()> {
//! let atoms = vec![Atom::new(1, [0.0, 0.0, 0.0]), Atom::new(1, [2.0, 0.0, 0.0])];
//! let mut system = System::from_atoms(SimBox::cubic(4.0)?, [true; 3], &atoms)?;
//! system.neighbors(2.5)?;
//! if let Some(nlist) = system.neighbor_list() {
//!     assert_eq!(nlist.neighbors(0), &[1]);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod io;
pub mod model;
pub mod physics;
pub mod utils;

pub use config::Config;
pub use error::{Error, Result};
pub use model::{Atom, AtomRecord, DType, PropertyInfo, PropertyTable, SimBox, System, Value};
pub use physics::minimum_image::Site;
pub use physics::neighbors::{NeighborList, COORD, NLIST};
pub use physics::operations::point_defect::{
    PointDefect, PointDefectKind, PointDefectParams, SiteSelector,
};
pub use physics::operations::supercell::generate as supercell;
