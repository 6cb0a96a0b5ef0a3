use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use crate::point::Point;
use crate::space::Category;
use crate::space::Space;
use crate::space::SpaceError;

#[derive(Debug, thiserror::Error)]
pub enum MapError {
    #[error("point {point} not present in map")]
    MissingEntry { point: String },

    #[error("expected {expected} values, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("cycle detected while evaluating point {point}")]
    CycleDetected { point: String },

    #[error("memoized function evaluated before its arguments were bound")]
    Unbound,

    #[error("memoized function arguments are already bound")]
    AlreadyBound,

    #[error("memoized function behind this handle was dropped")]
    Detached,

    #[error("ragged nesting: leaf reached at {point} before all dimensions were consumed")]
    RaggedNesting { point: String },

    #[error(transparent)]
    Space(#[from] SpaceError),
}

/// Anything that yields a value for each point of a space. This is how
/// lifted functions read their arguments, whether the argument is an
/// eager [`Map`] or a lazily evaluated memoized function.
pub trait Lookup<V> {
    type Value;

    /// The space the lookup is defined over.
    fn space(&self) -> &Space<V>;

    /// The value at `point`.
    fn lookup(&self, point: &Point<V>) -> Result<Self::Value, MapError>;
}

impl<V, L: Lookup<V> + ?Sized> Lookup<V> for &L {
    type Value = L::Value;

    fn space(&self) -> &Space<V> {
        (**self).space()
    }

    fn lookup(&self, point: &Point<V>) -> Result<Self::Value, MapError> {
        (**self).lookup(point)
    }
}

impl<V, L: Lookup<V> + ?Sized> Lookup<V> for Rc<L> {
    type Value = L::Value;

    fn space(&self) -> &Space<V> {
        (**self).space()
    }

    fn lookup(&self, point: &Point<V>) -> Result<Self::Value, MapError> {
        (**self).lookup(point)
    }
}

impl<V, L: Lookup<V> + ?Sized> Lookup<V> for Arc<L> {
    type Value = L::Value;

    fn space(&self) -> &Space<V> {
        (**self).space()
    }

    fn lookup(&self, point: &Point<V>) -> Result<Self::Value, MapError> {
        (**self).lookup(point)
    }
}

/// A total table: one value for every point of a space.
///
/// Values are stored densely in the space's enumeration order. Lookups
/// accept points of any space equivalent to the map's own (not only the
/// very same space object); positions are always resolved through the
/// map's space, so differences in category order do not matter.
#[derive(Clone)]
pub struct Map<V, T> {
    space: Space<V>,
    values: Vec<T>,
}

impl<V: Category, T> Map<V, T> {
    /// Creates a map from explicit entries. Every point of `space` must
    /// have an entry; entries for other points are ignored.
    pub fn new(space: &Space<V>, mut entries: HashMap<Point<V>, T>) -> Result<Self, MapError> {
        let mut values = Vec::with_capacity(space.num_points());
        for point in space.points() {
            match entries.remove(&point) {
                Some(value) => values.push(value),
                None => {
                    return Err(MapError::MissingEntry {
                        point: point.to_string(),
                    });
                }
            }
        }
        Ok(Self {
            space: space.clone(),
            values,
        })
    }

    /// Creates a map by evaluating `f` at every point.
    pub fn from_fn(space: &Space<V>, mut f: impl FnMut(&Point<V>) -> T) -> Self {
        Self {
            space: space.clone(),
            values: space.points().map(|p| f(&p)).collect(),
        }
    }

    /// Creates a map by evaluating a fallible `f` at every point,
    /// stopping at the first error.
    pub fn try_from_fn<E>(
        space: &Space<V>,
        mut f: impl FnMut(&Point<V>) -> Result<T, E>,
    ) -> Result<Self, E> {
        let values = space
            .points()
            .map(|p| f(&p))
            .collect::<Result<Vec<_>, E>>()?;
        Ok(Self {
            space: space.clone(),
            values,
        })
    }

    /// Creates a map from values listed in the space's enumeration
    /// order.
    pub fn from_values(space: &Space<V>, values: Vec<T>) -> Result<Self, MapError> {
        if values.len() != space.num_points() {
            return Err(MapError::LengthMismatch {
                expected: space.num_points(),
                actual: values.len(),
            });
        }
        Ok(Self {
            space: space.clone(),
            values,
        })
    }

    pub fn space(&self) -> &Space<V> {
        &self.space
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn rank(&self, point: &Point<V>) -> Result<usize, MapError> {
        if point.space() != &self.space {
            return Err(SpaceError::incompatible(&self.space, point.space()).into());
        }
        Ok(self.space.rank(point)?)
    }

    pub fn get(&self, point: &Point<V>) -> Result<&T, MapError> {
        let rank = self.rank(point)?;
        Ok(&self.values[rank])
    }

    /// Replaces the value at `point`, returning the previous one.
    pub fn set(&mut self, point: &Point<V>, value: T) -> Result<T, MapError> {
        let rank = self.rank(point)?;
        Ok(std::mem::replace(&mut self.values[rank], value))
    }

    /// The values in the space's enumeration order.
    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn into_values(self) -> Vec<T> {
        self.values
    }

    /// `(point, value)` pairs in the space's enumeration order.
    pub fn iter(&self) -> impl Iterator<Item = (Point<V>, &T)> + '_ {
        self.space.points().zip(self.values.iter())
    }

    /// A map over the same space with `f` applied to every value.
    pub fn map_values<U>(&self, f: impl FnMut(&T) -> U) -> Map<V, U> {
        Map {
            space: self.space.clone(),
            values: self.values.iter().map(f).collect(),
        }
    }

    /// Like [`Map::map_values`], consuming the map.
    pub fn into_map_values<U>(self, f: impl FnMut(T) -> U) -> Map<V, U> {
        Map {
            space: self.space,
            values: self.values.into_iter().map(f).collect(),
        }
    }

    /// Like [`Map::map_values`] for a fallible `f`.
    pub fn try_map_values<U, E>(&self, f: impl FnMut(&T) -> Result<U, E>) -> Result<Map<V, U>, E> {
        Ok(Map {
            space: self.space.clone(),
            values: self.values.iter().map(f).collect::<Result<Vec<_>, E>>()?,
        })
    }
}

impl<V: Category, T: Clone> Lookup<V> for Map<V, T> {
    type Value = T;

    fn space(&self) -> &Space<V> {
        &self.space
    }

    fn lookup(&self, point: &Point<V>) -> Result<T, MapError> {
        self.get(point).cloned()
    }
}

impl<V: fmt::Debug, T: fmt::Debug> fmt::Debug for Map<V, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Map")
            .field("space", &self.space)
            .field("values", &self.values)
            .finish()
    }
}

impl<V: Category, T: fmt::Debug> fmt::Display for Map<V, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (point, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {:?}", point, value)?;
        }
        write!(f, "}}")
    }
}

/// The map taking every point of `space` to itself.
pub fn points_map<V: Category>(space: &Space<V>) -> Map<V, Point<V>> {
    Map::from_fn(space, Point::clone)
}

/// The map taking every point of `space` to `value`.
pub fn unit_map<V: Category, T: Clone>(space: &Space<V>, value: T) -> Map<V, T> {
    Map::from_fn(space, |_| value.clone())
}

/// The map taking every point of `space` to its raw key.
pub fn keys_map<V: Category>(space: &Space<V>) -> Map<V, Vec<(String, V)>> {
    Map::from_fn(space, Point::to_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::space;

    #[test]
    fn test_totality() {
        let s = space!(x = [1, 2], y = [3, 4]);
        let mut entries: HashMap<_, _> = s.points().map(|p| (p, 0)).collect();
        assert_eq!(Map::new(&s, entries.clone()).unwrap().len(), 4);

        let missing = s.point([("x", 2), ("y", 4)]).unwrap();
        entries.remove(&missing);
        assert!(matches!(
            Map::new(&s, entries).unwrap_err(),
            MapError::MissingEntry { point } if point == "{x=2,y=4}"
        ));
    }

    #[test]
    fn test_get_set() {
        let s = space!(x = [1, 2], y = [3, 4]);
        let mut m = Map::from_fn(&s, |p| p.get("x").unwrap() * 10 + p.get("y").unwrap());
        for p in s.points() {
            assert_eq!(
                *m.get(&p).unwrap(),
                p.get("x").unwrap() * 10 + p.get("y").unwrap()
            );
        }
        let p = s.point([("x", 2), ("y", 3)]).unwrap();
        assert_eq!(m.set(&p, 0).unwrap(), 23);
        assert_eq!(*m.get(&p).unwrap(), 0);
        assert_eq!(m.len(), 4);
    }

    #[test]
    fn test_equivalent_space_lookup() {
        let s = space!(x = [1, 2], y = [3, 4]);
        let t = space!(y = [4, 3], x = [2, 1]);
        let m = Map::from_fn(&s, |p| *p.get("y").unwrap());
        for p in t.points() {
            assert_eq!(m.get(&p).unwrap(), p.get("y").unwrap());
        }
    }

    #[test]
    fn test_incompatible_lookup() {
        let m = unit_map(&space!(x = [1, 2]), "a");
        let p = space!(x = [1, 2, 3]).point([("x", 1)]).unwrap();
        assert!(matches!(
            m.get(&p).unwrap_err(),
            MapError::Space(SpaceError::IncompatibleSpace { .. })
        ));
    }

    #[test]
    fn test_from_values() {
        let s = space!(x = [1, 2, 3]);
        let m = Map::from_values(&s, vec!['a', 'b', 'c']).unwrap();
        assert_eq!(*m.get(&s.point([("x", 2)]).unwrap()).unwrap(), 'b');
        assert!(matches!(
            Map::from_values(&s, vec!['a']).unwrap_err(),
            MapError::LengthMismatch {
                expected: 3,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_convenience_maps() {
        let s = space!(x = [1, 2], y = [3]);
        let points = points_map(&s);
        for (p, q) in points.iter() {
            assert_eq!(&p, q);
        }
        let keys = keys_map(&s);
        let p = s.point([("x", 2), ("y", 3)]).unwrap();
        assert_eq!(
            keys.get(&p).unwrap(),
            &vec![("x".to_string(), 2), ("y".to_string(), 3)]
        );
        let units = unit_map(&s, "u");
        assert!(units.values().iter().all(|v| *v == "u"));
    }

    #[test]
    fn test_map_values_and_display() {
        let s = space!(x = [1, 2]);
        let m = Map::from_fn(&s, |p| *p.get("x").unwrap());
        let doubled = m.map_values(|v| v * 2);
        assert_eq!(doubled.values(), &[2, 4]);
        assert_eq!(doubled.to_string(), "{{x=1}: 2, {x=2}: 4}");

        let checked: Result<Map<i32, i32>, &str> =
            m.try_map_values(|v| if *v > 1 { Err("too big") } else { Ok(*v) });
        assert_eq!(checked.unwrap_err(), "too big");
    }
}
