//! Paired perfect/defect systems for point-defect calculations.
//!
//! Both outputs share the receiver's box and periodicity and agree
//! index-for-index on every atom the defect does not touch. Atoms the
//! defect touches always sit at the highest indices.

use nalgebra::Vector3;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::model::property::{Value, ATYPE, POS};
use crate::model::System;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PointDefectKind {
    Vacancy,
    Interstitial,
    Substitutional,
    Dumbbell,
}

impl FromStr for PointDefectKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "v" | "vacancy" => Ok(Self::Vacancy),
            "i" | "interstitial" => Ok(Self::Interstitial),
            "s" | "substitutional" => Ok(Self::Substitutional),
            "db" | "dumbbell" => Ok(Self::Dumbbell),
            other => Err(Error::InvalidDefectSpecification(format!(
                "unknown point defect type '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for PointDefectKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let tag = match self {
            PointDefectKind::Vacancy => "v",
            PointDefectKind::Interstitial => "i",
            PointDefectKind::Substitutional => "s",
            PointDefectKind::Dumbbell => "db",
        };
        write!(f, "{}", tag)
    }
}

/// How the defect site is chosen among existing atoms.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SiteSelector {
    /// The single atom within the site tolerance of this point.
    ByPosition(Vector3<f64>),
    ById(usize),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PointDefect {
    Vacancy {
        site: SiteSelector,
    },
    Interstitial {
        atype: i64,
        pos: Vector3<f64>,
    },
    Substitutional {
        atype: i64,
        site: SiteSelector,
    },
    /// Site atom replaced by itself at `site - db_vect` and a new atom of
    /// `atype` at `site + db_vect`.
    Dumbbell {
        atype: i64,
        site: SiteSelector,
        db_vect: Vector3<f64>,
    },
}

impl PointDefect {
    pub fn kind(&self) -> PointDefectKind {
        match self {
            PointDefect::Vacancy { .. } => PointDefectKind::Vacancy,
            PointDefect::Interstitial { .. } => PointDefectKind::Interstitial,
            PointDefect::Substitutional { .. } => PointDefectKind::Substitutional,
            PointDefect::Dumbbell { .. } => PointDefectKind::Dumbbell,
        }
    }
}

/// Loose argument bundle, checked into a [`PointDefect`] with `TryFrom`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointDefectParams {
    pub ptdtype: String,
    pub atype: Option<i64>,
    pub pos: Option<[f64; 3]>,
    pub ptd_id: Option<usize>,
    pub db_vect: Option<[f64; 3]>,
    pub shift: bool,
}

fn invalid(kind: PointDefectKind, detail: &str) -> Error {
    Error::InvalidDefectSpecification(format!("'{}' defect {}", kind, detail))
}

impl TryFrom<&PointDefectParams> for PointDefect {
    type Error = Error;

    fn try_from(p: &PointDefectParams) -> Result<Self> {
        let kind: PointDefectKind = p.ptdtype.parse()?;

        let site = || match (p.pos, p.ptd_id) {
            (Some(pos), None) => Ok(SiteSelector::ByPosition(Vector3::from(pos))),
            (None, Some(id)) => Ok(SiteSelector::ById(id)),
            (Some(_), Some(_)) => Err(invalid(kind, "takes pos or ptd_id, not both")),
            (None, None) => Err(invalid(kind, "requires pos or ptd_id")),
        };
        let atype = || p.atype.ok_or_else(|| invalid(kind, "requires atype"));

        match kind {
            PointDefectKind::Vacancy => {
                if p.atype.is_some() || p.db_vect.is_some() {
                    return Err(invalid(kind, "takes neither atype nor db_vect"));
                }
                Ok(PointDefect::Vacancy { site: site()? })
            }
            PointDefectKind::Interstitial => {
                if p.ptd_id.is_some() || p.db_vect.is_some() {
                    return Err(invalid(kind, "takes neither ptd_id nor db_vect"));
                }
                let pos = p.pos.ok_or_else(|| invalid(kind, "requires pos"))?;
                Ok(PointDefect::Interstitial {
                    atype: atype()?,
                    pos: Vector3::from(pos),
                })
            }
            PointDefectKind::Substitutional => {
                if p.db_vect.is_some() {
                    return Err(invalid(kind, "does not take db_vect"));
                }
                Ok(PointDefect::Substitutional {
                    atype: atype()?,
                    site: site()?,
                })
            }
            PointDefectKind::Dumbbell => {
                let db_vect = p.db_vect.ok_or_else(|| invalid(kind, "requires db_vect"))?;
                Ok(PointDefect::Dumbbell {
                    atype: atype()?,
                    site: site()?,
                    db_vect: Vector3::from(db_vect),
                })
            }
        }
    }
}

impl System {
    /// Indices of atoms within the site tolerance of `point` (minimum image).
    pub fn atoms_at(&self, point: Vector3<f64>) -> Result<Vec<usize>> {
        let tolerance = self.config.site_tolerance;
        let mut found = Vec::new();
        for i in 0..self.natoms() {
            if self.distance(point, i)? < tolerance {
                found.push(i);
            }
        }
        Ok(found)
    }

    fn resolve_site(&self, site: &SiteSelector) -> Result<usize> {
        match *site {
            SiteSelector::ById(id) => {
                if id >= self.natoms() {
                    return Err(Error::IndexOutOfRange {
                        index: id,
                        natoms: self.natoms(),
                    });
                }
                Ok(id)
            }
            SiteSelector::ByPosition(point) => {
                let found = self.atoms_at(point)?;
                match found.as_slice() {
                    [id] => Ok(*id),
                    _ => Err(Error::AmbiguousSiteLookup {
                        expected: 1,
                        found: found.len(),
                    }),
                }
            }
        }
    }

    /// Builds `(perfect, defect)` for the given defect. The receiver is not
    /// modified.
    ///
    /// With `shift`, both outputs get the same rigid origin shift that puts
    /// the defect site at the fractional center of every periodic axis, and
    /// are then wrapped.
    pub fn point_defect(&self, defect: &PointDefect, shift: bool) -> Result<(System, System)> {
        let kind = defect.kind();
        let n = self.natoms();
        let site_last = |id: usize| -> Vec<usize> { (0..n).filter(|&i| i != id).chain([id]).collect() };

        let (perfect_props, defect_props, site) = match defect {
            PointDefect::Vacancy { site } => {
                let id = self.resolve_site(site)?;
                let order = site_last(id);
                (
                    self.props.select(&order),
                    self.props.select(&order[..n - 1]),
                    self.pos(id)?,
                )
            }
            PointDefect::Interstitial { atype, pos } => {
                check_atype(kind, *atype)?;
                let found = self.atoms_at(*pos)?.len();
                if found != 0 {
                    return Err(Error::AmbiguousSiteLookup { expected: 0, found });
                }
                let mut added = self.props.append_atoms(1);
                added.set(n, ATYPE, Value::int(*atype))?;
                added.set(n, POS, Value::from(*pos))?;
                (self.props.clone(), added, *pos)
            }
            PointDefect::Substitutional { atype, site } => {
                check_atype(kind, *atype)?;
                let id = self.resolve_site(site)?;
                if self.atype(id)? == *atype {
                    return Err(invalid(kind, "atype must differ from the site atom's type"));
                }
                let perfect = self.props.select(&site_last(id));
                let mut substituted = perfect.clone();
                substituted.set(n - 1, ATYPE, Value::int(*atype))?;
                (perfect, substituted, self.pos(id)?)
            }
            PointDefect::Dumbbell {
                atype,
                site,
                db_vect,
            } => {
                check_atype(kind, *atype)?;
                if !(db_vect.norm() > 0.0) {
                    return Err(invalid(kind, "requires a non-zero db_vect"));
                }
                let id = self.resolve_site(site)?;
                let center = self.pos(id)?;
                let perfect = self.props.select(&site_last(id));
                let mut split = perfect.append_atoms(1);
                split.copy_row(n - 1, n)?;
                split.set(n - 1, POS, Value::from(center - db_vect))?;
                split.set(n, POS, Value::from(center + db_vect))?;
                split.set(n, ATYPE, Value::int(*atype))?;
                (perfect, split, center)
            }
        };

        let mut perfect =
            System::from_parts(self.simbox.clone(), self.pbc, perfect_props, self.config.clone());
        let mut defected =
            System::from_parts(self.simbox.clone(), self.pbc, defect_props, self.config.clone());
        perfect.invalidate_neighbors();
        defected.invalidate_neighbors();

        if shift {
            let frac = self.scale(site)?;
            let mut origin = self.simbox.origin();
            for axis in 0..3 {
                if self.pbc[axis] {
                    origin += self.simbox.vect(axis) * (frac[axis] - 0.5);
                }
            }
            perfect.simbox.set_origin(origin);
            defected.simbox.set_origin(origin);

            // One box for both: non-periodic spans cover the atoms of either
            let (perfect_fracs, perfect_lo, perfect_hi) = perfect.wrapped_fractions()?;
            let (defect_fracs, defect_lo, defect_hi) = defected.wrapped_fractions()?;
            let lo = [0, 1, 2].map(|a| perfect_lo[a].min(defect_lo[a]));
            let hi = [0, 1, 2].map(|a| perfect_hi[a].max(defect_hi[a]));
            perfect.commit_wrap(&perfect_fracs, lo, hi)?;
            defected.commit_wrap(&defect_fracs, lo, hi)?;
        }

        log::info!(
            "point defect '{}': perfect {} atoms, defect {} atoms",
            kind,
            perfect.natoms(),
            defected.natoms()
        );
        Ok((perfect, defected))
    }

    /// [`point_defect`](System::point_defect) from a loose argument bundle.
    pub fn point_defect_params(&self, params: &PointDefectParams) -> Result<(System, System)> {
        let defect = PointDefect::try_from(params)?;
        self.point_defect(&defect, params.shift)
    }
}

fn check_atype(kind: PointDefectKind, atype: i64) -> Result<()> {
    if atype < 1 {
        return Err(invalid(kind, &format!("atype must be >= 1, got {}", atype)));
    }
    Ok(())
}
