// src/utils/linalg.rs

use nalgebra::Vector3;

/// Convert fractional coordinates to a Cartesian displacement
///
/// # Formula
/// ```text
/// Cartesian = f0 * a + f1 * b + f2 * c
/// ```
pub fn frac_to_cart(
  frac: &Vector3<f64>,
  a: &Vector3<f64>,
  b: &Vector3<f64>,
  c: &Vector3<f64>,
) -> Vector3<f64> {
  a * frac.x + b * frac.y + c * frac.z
}

/// Convert a Cartesian displacement to fractional coordinates by sequential
/// elimination along c, then b, then a.
///
/// Requires the triangular lattice convention (a along x, b in the xy plane).
/// Returns the fractional vector together with the residual displacement left
/// after elimination, or `None` if a pivot (`c.z`, `b.y`, `a.x`) is zero.
pub fn cart_to_frac_triangular(
  cart: &Vector3<f64>,
  a: &Vector3<f64>,
  b: &Vector3<f64>,
  c: &Vector3<f64>,
) -> Option<(Vector3<f64>, Vector3<f64>)> {
  if c.z == 0.0 || b.y == 0.0 || a.x == 0.0 {
    return None;
  }

  let mut rest = *cart;

  let fc = rest.z / c.z;
  rest -= c * fc;

  let fb = rest.y / b.y;
  rest -= b * fb;

  let fa = rest.x / a.x;
  rest -= a * fa;

  Some((Vector3::new(fa, fb, fc), rest))
}

/// Mixed product a · (b × c)
pub fn triple_product(a: &Vector3<f64>, b: &Vector3<f64>, c: &Vector3<f64>) -> f64 {
  a.dot(&b.cross(c))
}
