use std::ops::{Add, Div, Mul, Sub};

/// Cartesian coordinates in Ångström, also used for attachment point directions.
///
/// ```
/// use fragmentation::vector::Vector;
///
/// let host = Vector::new(0.0, 0.0, 0.0);
/// let partner = Vector::new(1.4, 0.0, 0.1);
/// assert_eq!(partner - host, Vector::new(1.4, 0.0, 0.1));
/// assert_eq!((partner - host) * 2.0, Vector::new(2.8, 0.0, 0.2));
/// ```
#[derive(Debug, PartialEq, Clone, Copy, Default)]
pub struct Vector {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Add for Vector {
    type Output = Vector;

    fn add(self, rhs: Vector) -> Vector {
        Vector::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vector {
    type Output = Vector;

    fn sub(self, rhs: Vector) -> Vector {
        Vector::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f64> for Vector {
    type Output = Vector;

    fn mul(self, factor: f64) -> Vector {
        Vector::new(self.x * factor, self.y * factor, self.z * factor)
    }
}

impl Div<f64> for Vector {
    type Output = Vector;

    fn div(self, divisor: f64) -> Vector {
        Vector::new(self.x / divisor, self.y / divisor, self.z / divisor)
    }
}

impl From<[f64; 3]> for Vector {
    fn from([x, y, z]: [f64; 3]) -> Vector {
        Vector::new(x, y, z)
    }
}

impl Vector {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f64 {
        self.squared_length().sqrt()
    }

    pub fn squared_length(&self) -> f64 {
        self.as_array().iter().map(|component| component * component).sum()
    }

    pub fn distance(&self, other: &Self) -> f64 {
        (*self - *other).length()
    }

    /// Mean position of `points`, `None` when there are none. Link atoms of multi-center
    /// ligands sit here.
    ///
    /// ```
    /// use fragmentation::vector::Vector;
    /// let points = [Vector::new(0.0, 0.0, 0.0), Vector::new(2.0, 0.0, 0.0), Vector::new(1.0, 3.0, 0.0)];
    /// assert_eq!(Vector::centroid(&points), Some(Vector::new(1.0, 1.0, 0.0)));
    /// assert_eq!(Vector::centroid(&[]), None);
    /// ```
    pub fn centroid(points: &[Vector]) -> Option<Vector> {
        if points.is_empty() {
            return None;
        }
        let sum = points.iter().fold(Vector::default(), |sum, &point| sum + point);
        Some(sum / points.len() as f64)
    }

    pub fn as_array(&self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difference_points_from_rhs_to_lhs() {
        let direction = Vector::new(1.0, 1.0, 1.0) - Vector::new(1.0, 1.0, -1.0);
        assert_eq!(direction, Vector::new(0.0, 0.0, 2.0));
        assert_eq!(direction.length(), 2.0);
    }

    #[test]
    fn arrays_convert() {
        let v = Vector::from([3.0, 4.0, 0.0]);
        assert_eq!(v.as_array(), [3.0, 4.0, 0.0]);
        assert_eq!(v.distance(&Vector::default()), 5.0);
    }
}
