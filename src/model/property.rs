//! Columnar per-atom property store.
//!
//! Every property lives in one contiguous `natoms x ncols` buffer of `f64`.
//! A side table maps each name to its dtype, shape and column range; matrix
//! properties are laid out row-major inside their range. Integer properties
//! are stored exactly as whole `f64` values.
//!
//! Properties register on first write and keep their dtype and shape for the
//! lifetime of the table. When a registration needs more columns than the
//! buffer holds, the buffer is reallocated with slack and existing data is
//! copied forward.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Species id of each atom (Int scalar, >= 1).
pub const ATYPE: &str = "atype";
/// Absolute Cartesian position of each atom (Float `[3]`).
pub const POS: &str = "pos";

/// Int magnitudes at or above 2^53 cannot be stored exactly.
pub const MAX_EXACT_INT: i64 = 1 << 53;

/// Element type of a property.
///
/// Int values live in `f64` storage, so tables only accept magnitudes below
/// [`MAX_EXACT_INT`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    Int,
    Float,
}

/// A single atom's value for one property: scalar (`[]`), vector (`[k]`) or
/// matrix (`[r, c]`), stored row-major.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawValue")]
pub struct Value {
    dtype: DType,
    shape: Vec<usize>,
    data: Vec<f64>,
}

/// Unchecked wire form of [`Value`].
#[derive(Deserialize)]
struct RawValue {
    dtype: DType,
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl TryFrom<RawValue> for Value {
    type Error = Error;

    fn try_from(raw: RawValue) -> Result<Self> {
        Value::array(raw.dtype, raw.shape, raw.data)
    }
}

impl Value {
    pub fn int(v: i64) -> Self {
        Self {
            dtype: DType::Int,
            shape: Vec::new(),
            data: vec![v as f64],
        }
    }

    pub fn float(v: f64) -> Self {
        Self {
            dtype: DType::Float,
            shape: Vec::new(),
            data: vec![v],
        }
    }

    pub fn int_vector(v: &[i64]) -> Self {
        Self {
            dtype: DType::Int,
            shape: vec![v.len()],
            data: v.iter().map(|&x| x as f64).collect(),
        }
    }

    pub fn float_vector(v: &[f64]) -> Self {
        Self {
            dtype: DType::Float,
            shape: vec![v.len()],
            data: v.to_vec(),
        }
    }

    pub fn float_matrix(rows: &[Vec<f64>]) -> Result<Self> {
        let ncols = rows.first().map_or(0, |r| r.len());
        if rows.iter().any(|r| r.len() != ncols) {
            return Err(Error::MalformedValue("ragged matrix rows".to_string()));
        }
        Ok(Self {
            dtype: DType::Float,
            shape: vec![rows.len(), ncols],
            data: rows.iter().flatten().copied().collect(),
        })
    }

    pub fn int_matrix(rows: &[Vec<i64>]) -> Result<Self> {
        let ncols = rows.first().map_or(0, |r| r.len());
        if rows.iter().any(|r| r.len() != ncols) {
            return Err(Error::MalformedValue("ragged matrix rows".to_string()));
        }
        Ok(Self {
            dtype: DType::Int,
            shape: vec![rows.len(), ncols],
            data: rows.iter().flatten().map(|&x| x as f64).collect(),
        })
    }

    /// Builds a value of arbitrary rank from row-major data.
    ///
    /// Rank is not limited here; tables reject rank > 2 on write.
    pub fn array(dtype: DType, shape: Vec<usize>, data: Vec<f64>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != data.len() {
            return Err(Error::MalformedValue(format!(
                "shape {:?} needs {} elements, got {}",
                shape,
                expected,
                data.len()
            )));
        }
        if dtype == DType::Int && data.iter().any(|x| x.fract() != 0.0) {
            return Err(Error::MalformedValue(
                "integer value with fractional data".to_string(),
            ));
        }
        Ok(Self { dtype, shape, data })
    }

    #[inline]
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    #[inline]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    #[inline]
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    #[inline]
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    /// Scalar integer value.
    pub fn as_int(&self) -> Option<i64> {
        match (self.dtype, self.rank()) {
            (DType::Int, 0) => Some(self.data[0] as i64),
            _ => None,
        }
    }

    /// Scalar value of either dtype.
    pub fn as_float(&self) -> Option<f64> {
        if self.rank() == 0 {
            Some(self.data[0])
        } else {
            None
        }
    }

    pub fn as_vec3(&self) -> Option<Vector3<f64>> {
        if self.shape == [3] {
            Some(Vector3::new(self.data[0], self.data[1], self.data[2]))
        } else {
            None
        }
    }

    pub fn to_int_vec(&self) -> Option<Vec<i64>> {
        match self.dtype {
            DType::Int => Some(self.data.iter().map(|&x| x as i64).collect()),
            DType::Float => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::float(v)
    }
}

impl From<[f64; 3]> for Value {
    fn from(v: [f64; 3]) -> Self {
        Value::float_vector(&v)
    }
}

impl From<Vector3<f64>> for Value {
    fn from(v: Vector3<f64>) -> Self {
        Value::float_vector(v.as_slice())
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::float_vector(&v)
    }
}

impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Value::int_vector(&v)
    }
}

impl From<[[f64; 3]; 3]> for Value {
    fn from(m: [[f64; 3]; 3]) -> Self {
        Self {
            dtype: DType::Float,
            shape: vec![3, 3],
            data: m.iter().flatten().copied().collect(),
        }
    }
}

/// Registration record of one property.
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyInfo {
    pub name: String,
    pub dtype: DType,
    pub shape: Vec<usize>,
    /// First buffer column owned by the property.
    pub offset: usize,
    /// Number of columns (product of the shape).
    pub width: usize,
}

#[derive(Clone, Debug)]
pub struct PropertyTable {
    natoms: usize,
    ncols: usize,
    slack: usize,
    data: Vec<f64>,
    props: Vec<PropertyInfo>,
}

impl PropertyTable {
    /// Empty table for `natoms` atoms; `slack` extra columns are added on every growth.
    pub fn new(natoms: usize, slack: usize) -> Self {
        Self {
            natoms,
            ncols: 0,
            slack,
            data: Vec::new(),
            props: Vec::new(),
        }
    }

    /// Table with the two mandatory properties registered: `atype`
    /// (Int scalar, every atom 1) and `pos` (Float `[3]`, every atom at zero).
    pub(crate) fn for_atoms(natoms: usize, slack: usize) -> Self {
        let ncols = 4 + slack;
        let mut data = vec![0.0; natoms * ncols];
        for row in 0..natoms {
            data[row * ncols] = 1.0;
        }

        let props = vec![
            PropertyInfo {
                name: ATYPE.to_string(),
                dtype: DType::Int,
                shape: Vec::new(),
                offset: 0,
                width: 1,
            },
            PropertyInfo {
                name: POS.to_string(),
                dtype: DType::Float,
                shape: vec![3],
                offset: 1,
                width: 3,
            },
        ];

        Self {
            natoms,
            ncols,
            slack,
            data,
            props,
        }
    }

    pub(crate) fn set_slack(&mut self, slack: usize) {
        self.slack = slack;
    }

    #[inline]
    pub fn natoms(&self) -> usize {
        self.natoms
    }

    /// Columns allocated in the backing buffer.
    #[inline]
    pub fn column_capacity(&self) -> usize {
        self.ncols
    }

    /// Columns owned by registered properties.
    pub fn columns_used(&self) -> usize {
        self.props.last().map_or(0, |p| p.offset + p.width)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.info(name).is_some()
    }

    pub fn info(&self, name: &str) -> Option<&PropertyInfo> {
        self.props.iter().find(|p| p.name == name)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<String> {
        self.props.iter().map(|p| p.name.clone()).collect()
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.natoms {
            return Err(Error::IndexOutOfRange {
                index,
                natoms: self.natoms,
            });
        }
        Ok(())
    }

    /// Reads one atom's value. `Ok(None)` if `name` is not registered.
    pub fn get(&self, index: usize, name: &str) -> Result<Option<Value>> {
        self.check_index(index)?;
        let Some(info) = self.info(name) else {
            return Ok(None);
        };

        let start = index * self.ncols + info.offset;
        Ok(Some(Value {
            dtype: info.dtype,
            shape: info.shape.clone(),
            data: self.data[start..start + info.width].to_vec(),
        }))
    }

    /// Borrowed view of one atom's columns for `name`.
    pub(crate) fn raw(&self, index: usize, name: &str) -> Option<&[f64]> {
        if index >= self.natoms {
            return None;
        }
        let info = self.info(name)?;
        let start = index * self.ncols + info.offset;
        Some(&self.data[start..start + info.width])
    }

    /// Writes one atom's value, registering the property on first use.
    pub fn set(&mut self, index: usize, name: &str, value: Value) -> Result<()> {
        self.check_index(index)?;
        check_data(&value)?;
        let offset = match self.info(name) {
            Some(info) => {
                validate(info, &value)?;
                info.offset
            }
            None => {
                self.register(name, value.dtype, value.shape.clone())?;
                self.props.last().map_or(0, |p| p.offset)
            }
        };

        let start = index * self.ncols + offset;
        self.data[start..start + value.data.len()].copy_from_slice(&value.data);
        Ok(())
    }

    /// Registers `name` with the given dtype and shape.
    ///
    /// Re-registering with an identical dtype and shape is a no-op.
    pub fn register(&mut self, name: &str, dtype: DType, shape: Vec<usize>) -> Result<()> {
        if shape.len() > 2 {
            return Err(Error::UnsupportedShape {
                name: name.to_string(),
                shape,
            });
        }
        if let Some(info) = self.info(name) {
            if info.shape != shape {
                return Err(Error::ShapeMismatch {
                    name: name.to_string(),
                    expected: info.shape.clone(),
                    found: shape,
                });
            }
            if info.dtype != dtype {
                return Err(Error::TypeMismatch {
                    name: name.to_string(),
                    expected: info.dtype,
                    found: dtype,
                });
            }
            return Ok(());
        }

        let width: usize = shape.iter().product();
        let offset = self.columns_used();
        if offset + width > self.ncols {
            self.grow(offset + width + self.slack);
        }

        self.props.push(PropertyInfo {
            name: name.to_string(),
            dtype,
            shape,
            offset,
            width,
        });
        Ok(())
    }

    /// Reallocates the buffer with `ncols` columns and copies every row forward.
    fn grow(&mut self, ncols: usize) {
        log::debug!(
            "property buffer: growing from {} to {} columns ({} atoms)",
            self.ncols,
            ncols,
            self.natoms
        );
        let used = self.columns_used();
        let mut data = vec![0.0; self.natoms * ncols];
        for row in 0..self.natoms {
            let src = row * self.ncols;
            data[row * ncols..row * ncols + used].copy_from_slice(&self.data[src..src + used]);
        }
        self.data = data;
        self.ncols = ncols;
    }

    /// Drops a property and shifts later properties left. Capacity is kept.
    pub fn remove(&mut self, name: &str) -> bool {
        let Some(pos) = self.props.iter().position(|p| p.name == name) else {
            return false;
        };
        let tail_end = self.columns_used();
        let removed = self.props.remove(pos);
        let tail_start = removed.offset + removed.width;

        for row in 0..self.natoms {
            let base = row * self.ncols;
            self.data
                .copy_within(base + tail_start..base + tail_end, base + removed.offset);
            self.data[base + tail_end - removed.width..base + tail_end].fill(0.0);
        }
        for info in self.props.iter_mut().skip(pos) {
            info.offset -= removed.width;
        }
        true
    }

    /// New table holding the given rows, in order. Indices must be in range.
    pub(crate) fn select(&self, indices: &[usize]) -> PropertyTable {
        let mut data = vec![0.0; indices.len() * self.ncols];
        for (row, &src) in indices.iter().enumerate() {
            data[row * self.ncols..(row + 1) * self.ncols]
                .copy_from_slice(&self.data[src * self.ncols..(src + 1) * self.ncols]);
        }
        PropertyTable {
            natoms: indices.len(),
            ncols: self.ncols,
            slack: self.slack,
            data,
            props: self.props.clone(),
        }
    }

    /// New table with `extra` zeroed rows appended.
    pub(crate) fn append_atoms(&self, extra: usize) -> PropertyTable {
        let mut table = self.clone();
        table.natoms += extra;
        table.data.resize(table.natoms * table.ncols, 0.0);
        table
    }

    /// Copies every property of row `src` onto row `dst`.
    pub(crate) fn copy_row(&mut self, src: usize, dst: usize) -> Result<()> {
        self.check_index(src)?;
        self.check_index(dst)?;
        self.data
            .copy_within(src * self.ncols..(src + 1) * self.ncols, dst * self.ncols);
        Ok(())
    }
}

/// Checks a value's own data before it reaches the buffer.
fn check_data(value: &Value) -> Result<()> {
    let expected: usize = value.shape.iter().product();
    if value.data.len() != expected {
        return Err(Error::MalformedValue(format!(
            "shape {:?} needs {} elements, got {}",
            value.shape,
            expected,
            value.data.len()
        )));
    }
    let limit = MAX_EXACT_INT as f64;
    if value.dtype == DType::Int && value.data.iter().any(|x| !(x.abs() < limit)) {
        return Err(Error::MalformedValue(
            "integer magnitude must be below 2^53 for exact storage".to_string(),
        ));
    }
    Ok(())
}

/// Checks a value against an existing registration.
fn validate(info: &PropertyInfo, value: &Value) -> Result<()> {
    if value.rank() > 2 {
        return Err(Error::UnsupportedShape {
            name: info.name.clone(),
            shape: value.shape.clone(),
        });
    }
    if info.shape != value.shape {
        return Err(Error::ShapeMismatch {
            name: info.name.clone(),
            expected: info.shape.clone(),
            found: value.shape.clone(),
        });
    }
    if info.dtype != value.dtype {
        return Err(Error::TypeMismatch {
            name: info.name.clone(),
            expected: info.dtype,
            found: value.dtype,
        });
    }
    Ok(())
}
