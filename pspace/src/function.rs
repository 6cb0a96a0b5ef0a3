//! Lifting plain functions into pointwise operators over maps.
//!
//! A lifted [`Function`] applies an ordinary N-ary function at every
//! point of a space, reading its N arguments from N [`Lookup`]s (maps
//! or memoized functions) over that same space:
//!
//! ```
//! use pspace::Point;
//! use pspace::points_map;
//! use pspace::unit_map;
//!
//! let s = pspace::space!(x = [1, 2, 3]);
//! let scale = s.lift(|p: Point<i32>, k: i32| p.get("x").unwrap() * k);
//! let m = scale.call(&(points_map(&s), unit_map(&s, 10))).unwrap();
//! assert_eq!(m.values(), &[10, 20, 30]);
//! ```

use rayon::prelude::*;

use crate::config;
use crate::map::Lookup;
use crate::map::Map;
use crate::map::MapError;
use crate::point::Point;
use crate::space::Category;
use crate::space::Space;
use crate::space::SpaceError;

/// A tuple of argument lookups, read together at one point.
pub trait Args<V> {
    /// The tuple of values read at a point.
    type Values;

    /// Fails unless every argument is defined over a space equivalent
    /// to `space`.
    fn check_space(&self, space: &Space<V>) -> Result<(), MapError>;

    /// Reads every argument at `point`.
    fn read(&self, point: &Point<V>) -> Result<Self::Values, MapError>;
}

/// A callable taking the positional values of `A` and returning one
/// value. Implemented for closures and functions of matching arity.
pub trait Pointwise<A> {
    type Output;

    fn apply(&self, args: A) -> Self::Output;
}

macro_rules! impl_arity {
    ($($arg:ident $idx:tt),+) => {
        impl<V: Category, $($arg: Lookup<V>),+> Args<V> for ($($arg,)+) {
            type Values = ($($arg::Value,)+);

            fn check_space(&self, space: &Space<V>) -> Result<(), MapError> {
                $(
                    if self.$idx.space() != space {
                        return Err(SpaceError::incompatible(space, self.$idx.space()).into());
                    }
                )+
                Ok(())
            }

            fn read(&self, point: &Point<V>) -> Result<Self::Values, MapError> {
                Ok(($(self.$idx.lookup(point)?,)+))
            }
        }

        impl<Func, Out, $($arg),+> Pointwise<($($arg,)+)> for Func
        where
            Func: Fn($($arg),+) -> Out,
        {
            type Output = Out;

            fn apply(&self, args: ($($arg,)+)) -> Out {
                self($(args.$idx),+)
            }
        }
    };
}

impl_arity!(A 0);
impl_arity!(A 0, B 1);
impl_arity!(A 0, B 1, C 2);
impl_arity!(A 0, B 1, C 2, D 3);
impl_arity!(A 0, B 1, C 2, D 3, E 4);
impl_arity!(A 0, B 1, C 2, D 3, E 4, F 5);

/// A plain function lifted to operate pointwise over a space.
pub struct Function<V, F> {
    space: Space<V>,
    func: F,
}

/// Lifts `func` into a pointwise operator over `space`.
pub fn lift<V: Category, F>(space: &Space<V>, func: F) -> Function<V, F> {
    Function::new(space.clone(), func)
}

impl<V: Category> Space<V> {
    /// Lifts `func` into a pointwise operator over this space.
    pub fn lift<F>(&self, func: F) -> Function<V, F> {
        lift(self, func)
    }
}

impl<V: Category, F> Function<V, F> {
    pub fn new(space: Space<V>, func: F) -> Self {
        Self { space, func }
    }

    pub fn space(&self) -> &Space<V> {
        &self.space
    }

    /// Applies the underlying function to one set of argument values.
    pub fn apply<A>(&self, args: A) -> F::Output
    where
        F: Pointwise<A>,
    {
        self.func.apply(args)
    }

    /// Evaluates the function at every point, reading each argument at
    /// that point, and collects the results into a new map.
    pub fn call<A>(&self, args: &A) -> Result<Map<V, F::Output>, MapError>
    where
        A: Args<V>,
        F: Pointwise<A::Values>,
    {
        args.check_space(&self.space)?;
        tracing::debug!(space = %self.space, points = self.space.num_points(), "evaluating lifted function");
        Map::try_from_fn(&self.space, |point| -> Result<_, MapError> {
            Ok(self.func.apply(args.read(point)?))
        })
    }

    /// Like [`Function::call`] for a function that can itself fail. The
    /// first failure aborts the evaluation.
    pub fn try_call<A, R>(&self, args: &A) -> Result<Map<V, R>, MapError>
    where
        A: Args<V>,
        F: Pointwise<A::Values, Output = Result<R, MapError>>,
    {
        args.check_space(&self.space)?;
        tracing::debug!(space = %self.space, points = self.space.num_points(), "evaluating fallible lifted function");
        Map::try_from_fn(&self.space, |point| self.func.apply(args.read(point)?))
    }

    /// Like [`Function::call`], with every point evaluated as an
    /// independent unit of work on the shared pool from
    /// [`config::thread_pool`]. Blocks until every point is done.
    ///
    /// The function must be free of shared mutable state. Memoized
    /// functions are not `Sync` and so cannot be used as arguments.
    pub fn par_call<A>(&self, args: &A) -> Result<Map<V, F::Output>, MapError>
    where
        V: Send + Sync,
        A: Args<V> + Sync,
        F: Pointwise<A::Values> + Sync,
        F::Output: Send,
    {
        self.par_call_in(config::thread_pool(), args)
    }

    /// Like [`Function::par_call`] on a caller-provided pool.
    pub fn par_call_in<A>(
        &self,
        pool: &rayon::ThreadPool,
        args: &A,
    ) -> Result<Map<V, F::Output>, MapError>
    where
        V: Send + Sync,
        A: Args<V> + Sync,
        F: Pointwise<A::Values> + Sync,
        F::Output: Send,
    {
        args.check_space(&self.space)?;
        let points: Vec<Point<V>> = self.space.points().collect();
        tracing::debug!(
            space = %self.space,
            points = points.len(),
            threads = pool.current_num_threads(),
            "evaluating lifted function in parallel"
        );
        // Indexed collection keeps results in enumeration order no
        // matter which worker finishes first.
        let values = pool.install(|| {
            points
                .par_iter()
                .map(|point| -> Result<_, MapError> { Ok(self.func.apply(args.read(point)?)) })
                .collect::<Result<Vec<_>, MapError>>()
        })?;
        Map::from_values(&self.space, values)
    }
}
