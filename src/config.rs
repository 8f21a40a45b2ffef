// src/config.rs

use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::error::Result;

/// Tuning knobs shared by a [`System`](crate::System) and everything derived from it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
  /// Bins per cutoff length used by the cell list (bin edge = cutoff / cmult).
  pub cmult: usize,

  /// Starting row width of the neighbor arena.
  pub initial_neighbor_capacity: usize,

  /// Extra columns allocated whenever the property buffer must grow.
  pub column_slack: usize,

  /// Distance (Angstroms) under which an atom counts as sitting at a position.
  pub site_tolerance: f64,

  /// Fractional pad applied when a non-periodic box edge is extended by `wrap`.
  pub wrap_epsilon: f64,

  /// Relative bound on the elimination residual in `scale`.
  pub residual_tolerance: f64,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      cmult: 2,
      initial_neighbor_capacity: 40,
      column_slack: 5,
      site_tolerance: 1e-5,
      wrap_epsilon: 1e-8,
      residual_tolerance: 1e-8,
    }
  }
}

impl Config {
  pub fn from_json_str(text: &str) -> Result<Self> {
    Ok(serde_json::from_str(text)?)
  }

  /// Loads a JSON config; missing fields fall back to their defaults.
  pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
    let path = path.as_ref();
    let reader = BufReader::new(File::open(path)?);
    let cfg = serde_json::from_reader(reader)?;
    log::debug!("config loaded from {:?}", path);
    Ok(cfg)
  }

  pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
      if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)?;
      }
    }

    let writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(writer, self)?;
    log::debug!("config saved to {:?}", path);
    Ok(())
  }
}
