use std::fmt;

use scriptbridge::{BridgeError, BridgeResult};

use crate::functions;

/// A three-component vector whose components are always finite.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    /// X component.
    pub x: f64,
    /// Y component.
    pub y: f64,
    /// Z component.
    pub z: f64,
}

fn finite(value: f64, op: &str) -> BridgeResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(BridgeError::domain(format!("{op} produced a non-finite value")))
    }
}

impl Vector3 {
    /// The zero vector.
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Build a vector without checking the components.
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Build a vector, failing with `Domain` if a component is not finite.
    pub fn checked(x: f64, y: f64, z: f64, op: &str) -> BridgeResult<Self> {
        Ok(Self::new(finite(x, op)?, finite(y, op)?, finite(z, op)?))
    }

    /// Componentwise sum.
    pub fn add(self, other: Self) -> BridgeResult<Self> {
        Self::checked(self.x + other.x, self.y + other.y, self.z + other.z, "add")
    }

    /// Componentwise difference, `self - other`.
    pub fn subtract(self, other: Self) -> BridgeResult<Self> {
        Self::checked(self.x - other.x, self.y - other.y, self.z - other.z, "subtract")
    }

    /// Multiply every component by `k`.
    pub fn scale(self, k: f64) -> BridgeResult<Self> {
        Self::checked(self.x * k, self.y * k, self.z * k, "scalar multiply")
    }

    /// Divide every component by `k`.
    pub fn divide(self, k: f64) -> BridgeResult<Self> {
        if k == 0.0 {
            return Err(BridgeError::domain("division of a vector by zero"));
        }
        Self::checked(self.x / k, self.y / k, self.z / k, "divide")
    }

    /// The opposite vector.
    pub fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }

    /// Dot product.
    pub fn dot(self, other: Self) -> BridgeResult<f64> {
        finite(
            self.x * other.x + self.y * other.y + self.z * other.z,
            "dot",
        )
    }

    /// Cross product, `self × other`.
    pub fn cross(self, other: Self) -> BridgeResult<Self> {
        Self::checked(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
            "cross",
        )
    }

    /// Squared Euclidean length.
    pub fn length_squared(self) -> BridgeResult<f64> {
        self.dot(self)
    }

    /// Euclidean length.
    pub fn length(self) -> BridgeResult<f64> {
        Ok(self.length_squared()?.sqrt())
    }

    /// Distance between two points.
    pub fn distance(self, other: Self) -> BridgeResult<f64> {
        other.subtract(self)?.length()
    }

    /// Unit vector in the same direction. The zero vector has none.
    pub fn normalize(self) -> BridgeResult<Self> {
        let length = self.length()?;
        if length == 0.0 {
            return Err(BridgeError::domain("cannot normalize a zero-length vector"));
        }
        Self::checked(self.x / length, self.y / length, self.z / length, "normalize")
    }

    /// Rotate about `axis` by `angle` radians (Rodrigues' formula).
    pub fn rotated(self, axis: Self, angle: f64) -> BridgeResult<Self> {
        let k = axis
            .normalize()
            .map_err(|_| BridgeError::domain("rotation axis has zero length"))?;
        let (sin, cos) = angle.sin_cos();
        let along = k.scale(k.dot(self)? * (1.0 - cos))?;
        self.scale(cos)?.add(k.cross(self)?.scale(sin)?)?.add(along)
    }

    /// Componentwise linear interpolation, exact at `t == 0` and `t == 1`.
    /// `t` is not clamped.
    pub fn lerp(self, other: Self, t: f64) -> BridgeResult<Self> {
        Self::checked(
            functions::lerp(self.x, other.x, t),
            functions::lerp(self.y, other.y, t),
            functions::lerp(self.z, other.z, t),
            "lerp",
        )
    }
}

impl fmt::Display for Vector3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vector3({}, {}, {})", self.x, self.y, self.z)
    }
}
