//! Plain-text neighbor lists.
//!
//! Lines starting with `#` are comments. Every other non-blank line is
//! `<atom> <neighbor> <neighbor> ...`, whitespace separated. Atoms without a
//! line have no neighbors.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::model::System;
use crate::physics::neighbors::NeighborList;

pub fn write(nlist: &NeighborList, mut out: impl Write) -> Result<()> {
    writeln!(out, "# neighbor list: {} atoms", nlist.natoms())?;
    for i in 0..nlist.natoms() {
        write!(out, "{}", i)?;
        for j in nlist.neighbors(i) {
            write!(out, " {}", j)?;
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

/// Parses a neighbor list for a system of `natoms` atoms. Rows are widened
/// to fit the largest coordination found.
///
/// The relation must be symmetric, with no self pairs, no repeated
/// neighbors and at most one line per atom.
pub fn read(input: impl BufRead, natoms: usize) -> Result<NeighborList> {
    let check = |index: usize| {
        if index >= natoms {
            Err(Error::IndexOutOfRange { index, natoms })
        } else {
            Ok(index)
        }
    };

    let mut line_of: Vec<Option<usize>> = vec![None; natoms];
    let mut rows: Vec<(usize, Vec<usize>)> = Vec::new();
    for (n, line) in input.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let lineno = n + 1;
        let parse_error = |detail: String| Error::Parse {
            line: lineno,
            detail,
        };

        let mut indices = Vec::new();
        for token in trimmed.split_whitespace() {
            let index: usize = token
                .parse()
                .map_err(|_| parse_error(format!("expected an atom index, found '{}'", token)))?;
            indices.push(check(index)?);
        }
        let atom = indices.remove(0);

        if let Some(first) = line_of[atom] {
            return Err(parse_error(format!("atom {} already listed on line {}", atom, first)));
        }
        line_of[atom] = Some(lineno);
        for (k, &j) in indices.iter().enumerate() {
            if j == atom {
                return Err(parse_error(format!("atom {} lists itself", atom)));
            }
            if indices[..k].contains(&j) {
                return Err(parse_error(format!("atom {} lists {} twice", atom, j)));
            }
        }
        rows.push((atom, indices));
    }

    let widest = rows.iter().map(|(_, r)| r.len()).max().unwrap_or(0);
    let mut nlist = NeighborList::new(natoms, widest);
    for (atom, neighbors) in rows {
        for j in neighbors {
            nlist.push(atom, j);
        }
    }

    for i in 0..natoms {
        if let Some(&j) = nlist.neighbors(i).iter().find(|&&j| !nlist.contains(j, i)) {
            return Err(Error::Parse {
                line: line_of[i].unwrap_or(0),
                detail: format!("atom {} lists {}, but {} does not list {}", i, j, j, i),
            });
        }
    }
    Ok(nlist)
}

pub fn save(nlist: &NeighborList, path: impl AsRef<Path>) -> Result<()> {
    let file = File::create(path)?;
    write(nlist, BufWriter::new(file))
}

pub fn load(path: impl AsRef<Path>, natoms: usize) -> Result<NeighborList> {
    let file = File::open(path)?;
    read(BufReader::new(file), natoms)
}

impl System {
    /// Writes the stored neighbor relation to `path`. Returns `Ok(false)`
    /// and writes nothing if there is no relation to save.
    pub fn save_neighbors(&self, path: impl AsRef<Path>) -> Result<bool> {
        match self.neighbor_list() {
            Some(nlist) => {
                save(&nlist, path)?;
                Ok(true)
            }
            None => {
                log::debug!("no neighbor relation to save");
                Ok(false)
            }
        }
    }

    /// Replaces the neighbor relation with the one stored at `path`.
    pub fn load_neighbors(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let natoms = self.natoms();
        let loaded = load(path, natoms)?;

        let mut nlist = NeighborList::new(natoms, self.config.initial_neighbor_capacity);
        nlist.reserve(loaded.capacity());
        for i in 0..natoms {
            for &j in loaded.neighbors(i) {
                nlist.push(i, j);
            }
        }
        self.store_neighbors(&nlist)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Atom, SimBox};
    use crate::physics::neighbors::COORD;

    fn chain() -> System {
        let atoms: Vec<Atom> = (0..4).map(|i| Atom::new(1, [i as f64, 0.0, 0.0])).collect();
        System::from_atoms(SimBox::cubic(4.0).unwrap(), [true, false, false], &atoms).unwrap()
    }

    #[test]
    fn test_read_format() {
        let text = "# comment\n0 1 3\n\n1 0 2\n  # indented comment\n2 1 3\n3 2 0\n";
        let nlist = read(text.as_bytes(), 4).unwrap();
        assert_eq!(nlist.neighbors(0), &[1, 3]);
        assert_eq!(nlist.neighbors(2), &[1, 3]);
        assert_eq!(nlist.coordination(3), 2);
        assert_eq!(nlist.capacity(), 2);
    }

    #[test]
    fn test_missing_rows_are_empty() {
        let nlist = read("1\n2 0\n0 2\n".as_bytes(), 3).unwrap();
        assert_eq!(nlist.coordination(0), 1);
        assert_eq!(nlist.coordination(1), 0);
        assert_eq!(nlist.neighbors(2), &[0]);
    }

    #[test]
    fn test_read_errors() {
        assert!(matches!(
            read("# header\n0 1\n1 x\n".as_bytes(), 2),
            Err(Error::Parse { line: 3, .. })
        ));
        assert!(matches!(
            read("0 -1\n".as_bytes(), 2),
            Err(Error::Parse { line: 1, .. })
        ));
        assert!(matches!(
            read("0 5\n".as_bytes(), 2),
            Err(Error::IndexOutOfRange { index: 5, natoms: 2 })
        ));
    }

    #[test]
    fn test_read_rejects_broken_relations() {
        assert!(matches!(
            read("0 1 1\n1 0\n".as_bytes(), 2),
            Err(Error::Parse { line: 1, .. })
        ));
        assert!(matches!(
            read("0 1\n1 0\n# again\n0 1\n".as_bytes(), 2),
            Err(Error::Parse { line: 4, .. })
        ));
        assert!(matches!(
            read("0 0\n".as_bytes(), 2),
            Err(Error::Parse { line: 1, .. })
        ));
        assert!(matches!(
            read("1 2\n0 1\n2 1\n".as_bytes(), 3),
            Err(Error::Parse { line: 2, .. })
        ));
    }

    #[test]
    fn test_load_keeps_relation_on_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.nl");
        std::fs::write(&path, "0 1\n").unwrap();

        let mut system = chain();
        system.neighbors(1.01).unwrap();
        let before = system.neighbor_list().unwrap();
        assert!(matches!(system.load_neighbors(&path), Err(Error::Parse { .. })));
        assert_eq!(system.neighbor_list().unwrap(), before);
    }

    #[test]
    fn test_write_lines() {
        let mut nlist = NeighborList::new(3, 4);
        nlist.add_pair(0, 2);
        let mut out = Vec::new();
        write(&nlist, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with('#'));
        assert_eq!(&lines[1..], &["0 2", "1", "2 0"]);
    }

    #[test]
    fn test_system_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain.nl");

        let mut system = chain();
        assert!(!system.save_neighbors(&path).unwrap());
        assert!(!path.exists());

        system.neighbors(1.01).unwrap();
        let built = system.neighbor_list().unwrap();
        assert!(system.save_neighbors(&path).unwrap());

        let mut copy = chain();
        copy.load_neighbors(&path).unwrap();
        let loaded = copy.neighbor_list().unwrap();
        for i in 0..4 {
            assert_eq!(loaded.neighbors(i), built.neighbors(i));
            assert_eq!(
                copy.get(i, COORD).unwrap().unwrap().as_int(),
                Some(built.coordination(i) as i64)
            );
        }
        assert_eq!(loaded.neighbors(0), &[1, 3]);
    }

    #[test]
    fn test_load_widens_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wide.nl");

        let natoms = 60;
        let mut text = String::from("0");
        for j in 1..natoms {
            text.push_str(&format!(" {}", j));
        }
        text.push('\n');
        for j in 1..natoms {
            text.push_str(&format!("{} 0\n", j));
        }
        std::fs::write(&path, text).unwrap();

        let atoms: Vec<Atom> = (0..natoms).map(|i| Atom::new(1, [i as f64 * 0.1, 0.0, 0.0])).collect();
        let mut system =
            System::from_atoms(SimBox::cubic(10.0).unwrap(), [false; 3], &atoms).unwrap();
        system.load_neighbors(&path).unwrap();

        let nlist = system.neighbor_list().unwrap();
        assert_eq!(nlist.coordination(0), 59);
        assert_eq!(nlist.capacity(), 80);
        assert_eq!(nlist.neighbors(1), &[0]);
        assert!(nlist.is_symmetric());
    }
}
