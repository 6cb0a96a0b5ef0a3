//! Named multidimensional parameter spaces.
//!
//! A [`Space`] is an ordered list of named dimensions, each a finite,
//! ordered set of categories. Spaces combine with set algebra
//! ([`Space::union`], [`Space::intersection`], [`Space::difference`])
//! and enumerate their [`Point`]s in a fixed row-major order. A [`Map`]
//! assigns a value to every point of a space, and a plain function can
//! be lifted ([`lift`]) into an operator that evaluates it at every
//! point, reading its arguments from maps over the same space.
//!
//! Recurrences are written with a [`MemoizedFunction`]: a lazily
//! evaluated, cached map that may refer to itself through a
//! [`MemoRef`]. The [`reshape`] operators move points and maps between
//! related spaces, so that a computation can iterate over whichever
//! dimensions it needs.
//!
//! ```
//! use pspace::Point;
//! use pspace::points_map;
//!
//! let s = pspace::space!(x = [1, 2], y = [10, 20, 30]);
//! let sum = s.lift(|p: Point<i32>| p.get("x").unwrap() + p.get("y").unwrap());
//! let m = sum.call(&(points_map(&s),)).unwrap();
//! assert_eq!(m.values(), &[11, 21, 31, 12, 22, 32]);
//! ```

pub mod config;

mod function;
mod map;
mod memo;
mod point;
pub mod reshape;
mod space;

pub use function::lift;
pub use function::Args;
pub use function::Function;
pub use function::Pointwise;
pub use map::keys_map;
pub use map::points_map;
pub use map::unit_map;
pub use map::Lookup;
pub use map::Map;
pub use map::MapError;
pub use memo::MemoRef;
pub use memo::MemoizedFunction;
pub use point::Point;
pub use reshape::collapse_map;
pub use reshape::contract_point;
pub use reshape::expand_map;
pub use reshape::expand_point;
pub use reshape::point_region;
pub use reshape::stack_map;
pub use reshape::unstack_map;
pub use reshape::update_point;
pub use reshape::Expand;
pub use reshape::Nested;
pub use space::Category;
pub use space::Dimension;
pub use space::Points;
pub use space::Space;
pub use space::SpaceError;
