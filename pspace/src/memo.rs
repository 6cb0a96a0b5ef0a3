//! Lazily evaluated, cached, possibly self-referential maps.
//!
//! A [`MemoizedFunction`] wraps a lifted [`Function`] together with
//! its argument lookups. Nothing is evaluated up front: the first
//! [`MemoizedFunction::get`] at a point evaluates the function there
//! and caches the result for the lifetime of the memoized function.
//!
//! An argument may refer back to the memoized function itself through
//! a [`MemoRef`] handle. This is how recurrences are written: the
//! function at one point looks up the memoized function at other
//! points (for example a smaller value of a "steps" dimension), and the
//! cache provides the usual dynamic-programming short-circuit. A lookup
//! that re-enters a point whose evaluation is still in progress fails
//! with [`MapError::CycleDetected`].
//!
//! The cache uses interior mutability without locking, so memoized
//! functions are neither `Send` nor `Sync`; they are populated by a
//! single thread.

use std::cell::OnceCell;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::rc::Weak;

use crate::function::Args;
use crate::function::Function;
use crate::function::Pointwise;
use crate::map::Lookup;
use crate::map::Map;
use crate::map::MapError;
use crate::point::Point;
use crate::space::Category;
use crate::space::Space;
use crate::space::SpaceError;

enum CacheCell<T> {
    Pending,
    InProgress,
    Resolved(T),
}

pub struct MemoizedFunction<V, T, F, A> {
    function: Function<V, F>,
    args: OnceCell<A>,
    cache: RefCell<Vec<CacheCell<T>>>,
}

impl<V, T, F, A> MemoizedFunction<V, T, F, A>
where
    V: Category,
    T: Clone,
    A: Args<V>,
    F: Pointwise<A::Values, Output = Result<T, MapError>>,
{
    /// Wraps `function` with no arguments bound yet. Bind them with
    /// [`MemoizedFunction::bind`] before the first lookup; binding late
    /// lets the arguments hold a [`MemoRef`] to the function itself.
    pub fn new(function: Function<V, F>) -> Rc<Self> {
        let cells = (0..function.space().num_points())
            .map(|_| CacheCell::Pending)
            .collect();
        Rc::new(Self {
            function,
            args: OnceCell::new(),
            cache: RefCell::new(cells),
        })
    }

    /// Wraps `function` and binds its arguments.
    pub fn with_args(function: Function<V, F>, args: A) -> Result<Rc<Self>, MapError> {
        let memo = Self::new(function);
        memo.bind(args)?;
        Ok(memo)
    }

    /// Binds the argument lookups. Arguments can be bound only once.
    pub fn bind(&self, args: A) -> Result<(), MapError> {
        args.check_space(self.space())?;
        self.args.set(args).map_err(|_| MapError::AlreadyBound)
    }

    /// A weak, type-erased handle to this memoized function, for use as
    /// (part of) its own arguments.
    pub fn handle(self: &Rc<Self>) -> MemoRef<V, T>
    where
        Self: 'static,
    {
        let weak: Weak<Self> = Rc::downgrade(self);
        let inner: Weak<dyn Lookup<V, Value = T>> = weak;
        MemoRef {
            space: self.space().clone(),
            inner,
        }
    }

    pub fn space(&self) -> &Space<V> {
        self.function.space()
    }

    /// The value at `point`, evaluated on first use and cached.
    pub fn get(&self, point: &Point<V>) -> Result<T, MapError> {
        let rank = self.rank(point)?;
        {
            let mut cache = self.cache.borrow_mut();
            let cached = match &cache[rank] {
                CacheCell::Resolved(value) => Some(value.clone()),
                CacheCell::InProgress => {
                    tracing::warn!(%point, "cycle detected in memoized function");
                    return Err(MapError::CycleDetected {
                        point: point.to_string(),
                    });
                }
                CacheCell::Pending => None,
            };
            if let Some(value) = cached {
                tracing::trace!(%point, "memo hit");
                return Ok(value);
            }
            cache[rank] = CacheCell::InProgress;
        }

        tracing::trace!(%point, "memo miss");
        let result = self.evaluate(point);
        let mut cache = self.cache.borrow_mut();
        match result {
            Ok(value) => {
                cache[rank] = CacheCell::Resolved(value.clone());
                Ok(value)
            }
            Err(err) => {
                cache[rank] = CacheCell::Pending;
                Err(err)
            }
        }
    }

    fn evaluate(&self, point: &Point<V>) -> Result<T, MapError> {
        let args = self.args.get().ok_or(MapError::Unbound)?;
        self.function.apply(args.read(point)?)
    }

    fn rank(&self, point: &Point<V>) -> Result<usize, MapError> {
        let space = self.space();
        if point.space() != space {
            return Err(SpaceError::incompatible(space, point.space()).into());
        }
        Ok(space.rank(point)?)
    }

    /// Whether the value at `point` has already been evaluated.
    pub fn is_resolved(&self, point: &Point<V>) -> Result<bool, MapError> {
        let rank = self.rank(point)?;
        Ok(matches!(
            self.cache.borrow()[rank],
            CacheCell::Resolved(_)
        ))
    }

    /// The number of points evaluated so far.
    pub fn resolved_count(&self) -> usize {
        self.cache
            .borrow()
            .iter()
            .filter(|cell| matches!(cell, CacheCell::Resolved(_)))
            .count()
    }

    /// Evaluates every point and returns the results as an eager map.
    pub fn to_map(&self) -> Result<Map<V, T>, MapError> {
        Map::try_from_fn(self.space(), |point| self.get(point))
    }
}

impl<V, T, F, A> Lookup<V> for MemoizedFunction<V, T, F, A>
where
    V: Category,
    T: Clone,
    A: Args<V>,
    F: Pointwise<A::Values, Output = Result<T, MapError>>,
{
    type Value = T;

    fn space(&self) -> &Space<V> {
        self.function.space()
    }

    fn lookup(&self, point: &Point<V>) -> Result<T, MapError> {
        self.get(point)
    }
}

impl<V: Category, T, F, A> fmt::Debug for MemoizedFunction<V, T, F, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let resolved = self
            .cache
            .borrow()
            .iter()
            .filter(|cell| matches!(cell, CacheCell::Resolved(_)))
            .count();
        f.debug_struct("MemoizedFunction")
            .field("space", &self.function.space().to_string())
            .field("bound", &self.args.get().is_some())
            .field("resolved", &resolved)
            .finish()
    }
}

/// A weak handle to a memoized function, see
/// [`MemoizedFunction::handle`]. Lookups through the handle fail with
/// [`MapError::Detached`] once the memoized function is dropped.
pub struct MemoRef<V, T> {
    space: Space<V>,
    inner: Weak<dyn Lookup<V, Value = T>>,
}

impl<V: Category, T> MemoRef<V, T> {
    /// The value at `point`, evaluating it if necessary.
    pub fn get(&self, point: &Point<V>) -> Result<T, MapError> {
        self.lookup(point)
    }
}

impl<V: Category, T> Lookup<V> for MemoRef<V, T> {
    type Value = T;

    fn space(&self) -> &Space<V> {
        &self.space
    }

    fn lookup(&self, point: &Point<V>) -> Result<T, MapError> {
        let inner = self.inner.upgrade().ok_or(MapError::Detached)?;
        inner.lookup(point)
    }
}

impl<V: Category, T> Clone for MemoRef<V, T> {
    fn clone(&self) -> Self {
        Self {
            space: self.space.clone(),
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<V: Category, T> fmt::Debug for MemoRef<V, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoRef")
            .field("space", &self.space.to_string())
            .field("live", &(self.inner.strong_count() > 0))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use tracing_test::traced_test;

    use super::*;
    use crate::map::points_map;
    use crate::map::unit_map;
    use crate::space;

    type Memo<T, F, A> = Rc<MemoizedFunction<i32, T, F, A>>;

    #[test]
    fn test_lazy_and_cached() {
        let s = space!(x = 0..4);
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let f = s.lift(move |p: Point<i32>| -> Result<i32, MapError> {
            counter.set(counter.get() + 1);
            Ok(p.value("x")? * 3)
        });
        let memo: Memo<i32, _, _> = MemoizedFunction::with_args(f, (points_map(&s),)).unwrap();
        assert_eq!(memo.resolved_count(), 0);

        let p = s.point([("x", 2)]).unwrap();
        assert_eq!(memo.get(&p).unwrap(), 6);
        assert_eq!(memo.get(&p).unwrap(), 6);
        assert_eq!(calls.get(), 1);
        assert!(memo.is_resolved(&p).unwrap());
        assert!(!memo.is_resolved(&s.point([("x", 1)]).unwrap()).unwrap());

        let all = memo.to_map().unwrap();
        assert_eq!(all.values(), &[0, 3, 6, 9]);
        assert_eq!(calls.get(), 4);
        assert_eq!(memo.resolved_count(), 4);
    }

    #[test]
    fn test_self_reference() {
        // fib(n) = fib(n - 1) + fib(n - 2), fib(0) = 0, fib(1) = 1.
        let s = space!(n = 0..40);
        let calls = Rc::new(Cell::new(0));
        let counter = Rc::clone(&calls);
        let f = s.lift(
            move |p: Point<i32>, fib: MemoRef<i32, u64>| -> Result<u64, MapError> {
                counter.set(counter.get() + 1);
                let n = *p.value("n")?;
                if n < 2 {
                    return Ok(n as u64);
                }
                Ok(fib.get(&p.update([("n", n - 1)])?)? + fib.get(&p.update([("n", n - 2)])?)?)
            },
        );
        let memo: Memo<u64, _, _> = MemoizedFunction::new(f);
        memo.bind((points_map(&s), unit_map(&s, memo.handle())))
            .unwrap();

        let p = s.point([("n", 39)]).unwrap();
        assert_eq!(memo.get(&p).unwrap(), 63_245_986);
        assert_eq!(calls.get(), 40);
    }

    #[test]
    fn test_unbound_and_rebind() {
        let s = space!(x = [1]);
        let f = s.lift(|p: Point<i32>| -> Result<i32, MapError> { Ok(*p.value("x")?) });
        let memo: Memo<i32, _, _> = MemoizedFunction::new(f);
        let p = s.point([("x", 1)]).unwrap();
        assert!(matches!(memo.get(&p).unwrap_err(), MapError::Unbound));
        // A failed evaluation leaves the point pending.
        assert!(!memo.is_resolved(&p).unwrap());

        memo.bind((points_map(&s),)).unwrap();
        assert_eq!(memo.get(&p).unwrap(), 1);
        assert!(matches!(
            memo.bind((points_map(&s),)).unwrap_err(),
            MapError::AlreadyBound
        ));
    }

    #[test]
    fn test_bind_rejects_other_space() {
        let s = space!(x = [1, 2]);
        let t = space!(y = [1, 2]);
        let f = s.lift(|p: Point<i32>| -> Result<i32, MapError> { Ok(*p.value("x")?) });
        let memo: Memo<i32, _, _> = MemoizedFunction::new(f);
        assert!(matches!(
            memo.bind((points_map(&t),)).unwrap_err(),
            MapError::Space(SpaceError::IncompatibleSpace { .. })
        ));
    }

    #[traced_test]
    #[test]
    fn test_direct_cycle() {
        let s = space!(x = [1, 2]);
        let f = s.lift(
            |p: Point<i32>, me: MemoRef<i32, i32>| -> Result<i32, MapError> { me.get(&p) },
        );
        let memo: Memo<i32, _, _> = MemoizedFunction::new(f);
        memo.bind((points_map(&s), unit_map(&s, memo.handle())))
            .unwrap();

        let p = s.point([("x", 1)]).unwrap();
        assert!(matches!(
            memo.get(&p).unwrap_err(),
            MapError::CycleDetected { point } if point == "{x=1}"
        ));
        assert!(!memo.is_resolved(&p).unwrap());
        assert!(logs_contain("cycle detected"));
    }

    #[test]
    fn test_indirect_cycle() {
        let s = space!(x = [1, 2, 3]);
        let f = s.lift(
            |p: Point<i32>, me: MemoRef<i32, i32>| -> Result<i32, MapError> {
                match *p.value("x")? {
                    // 1 -> 2 -> 1 is a cycle; 3 is a base case.
                    1 => me.get(&p.update([("x", 2)])?),
                    2 => me.get(&p.update([("x", 1)])?),
                    x => Ok(x),
                }
            },
        );
        let memo: Memo<i32, _, _> = MemoizedFunction::new(f);
        memo.bind((points_map(&s), unit_map(&s, memo.handle())))
            .unwrap();

        assert!(matches!(
            memo.get(&s.point([("x", 2)]).unwrap()).unwrap_err(),
            MapError::CycleDetected { point } if point == "{x=2}"
        ));
        assert_eq!(memo.get(&s.point([("x", 3)]).unwrap()).unwrap(), 3);
        assert_eq!(memo.resolved_count(), 1);
    }

    #[test]
    fn test_detached_handle() {
        let s = space!(x = [1]);
        let f = s.lift(|p: Point<i32>| -> Result<i32, MapError> { Ok(*p.value("x")?) });
        let memo: Memo<i32, _, _> = MemoizedFunction::new(f);
        let handle = memo.handle();
        let p = s.point([("x", 1)]).unwrap();
        memo.bind((points_map(&s),)).unwrap();
        assert_eq!(handle.get(&p).unwrap(), 1);

        drop(memo);
        assert!(matches!(handle.get(&p).unwrap_err(), MapError::Detached));
    }

    #[test]
    fn test_as_argument_of_lifted_function() {
        let s = space!(x = [1, 2, 3]);
        let f = s.lift(|p: Point<i32>| -> Result<i32, MapError> { Ok(*p.value("x")? + 1) });
        let memo: Memo<i32, _, _> = MemoizedFunction::with_args(f, (points_map(&s),)).unwrap();
        let double = s.lift(|v: i32| v * 2);
        let m = double.call(&(Rc::clone(&memo),)).unwrap();
        assert_eq!(m.values(), &[4, 6, 8]);
        assert_eq!(memo.resolved_count(), 3);
    }
}
