use crate::error::{Error, Result};
use crate::model::property::{Value, POS};
use crate::model::{SimBox, System};

/// Replicates `system` `nx x ny x nz` times along its lattice vectors.
///
/// Every property is copied into each replica; only `pos` is translated.
/// Replicas are laid out x-major, atoms in their original order inside each.
pub fn generate(system: &System, nx: usize, ny: usize, nz: usize) -> Result<System> {
    if nx == 0 || ny == 0 || nz == 0 {
        return Err(Error::InvalidSupercell { nx, ny, nz });
    }

    let vec_a = system.simbox.avect();
    let vec_b = system.simbox.bvect();
    let vec_c = system.simbox.cvect();

    let natoms = system.natoms();
    let mut rows = Vec::with_capacity(natoms * nx * ny * nz);
    let mut translations = Vec::with_capacity(nx * ny * nz);

    for x in 0..nx {
        for y in 0..ny {
            for z in 0..nz {
                translations.push(vec_a * x as f64 + vec_b * y as f64 + vec_c * z as f64);
                rows.extend(0..natoms);
            }
        }
    }

    let new_box = SimBox::new(
        vec_a * nx as f64,
        vec_b * ny as f64,
        vec_c * nz as f64,
        system.simbox.origin(),
    )?;

    let mut props = system.props.select(&rows);
    for (replica, shift) in translations.iter().enumerate() {
        for atom in 0..natoms {
            let row = replica * natoms + atom;
            let pos = system.pos(atom)? + shift;
            props.set(row, POS, Value::from(pos))?;
        }
    }

    let mut supercell = System::from_parts(new_box, system.pbc, props, system.config.clone());
    supercell.invalidate_neighbors();
    log::debug!(
        "supercell {}x{}x{}: {} -> {} atoms",
        nx,
        ny,
        nz,
        natoms,
        supercell.natoms()
    );
    Ok(supercell)
}
