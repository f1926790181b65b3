#![warn(missing_docs)]

//! Math host API for scriptbridge sessions.
//!
//! Installing [`MathApi`] registers the `Vector3` type and a `math` module:
//!
//! ```text
//! let v = Vector3(1, 2, 3) * 2.0;
//! let r = v.rotated(Vector3(0, 1, 0), math::radians(90.0));
//! let x = math::lerp(0.0, 10.0, 0.25);
//! ```

mod api;
mod functions;
mod vector3;

pub use api::{MODULE, MathApi, math_functions, vector3_type};
pub use functions::{clamp, degrees, lerp, radians, random, random_int};
pub use vector3::Vector3;
