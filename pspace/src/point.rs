use std::fmt;
use std::hash::Hash;
use std::hash::Hasher;

use crate::space::Category;
use crate::space::Space;
use crate::space::SpaceError;

/// A coordinate in a [`Space`]: one category value per dimension.
///
/// A point may also carry extra key entries for names its space does
/// not declare. Those entries are kept in the raw key, so the point can
/// later be widened into a larger space, but they take no part in
/// equality or hashing.
#[derive(Clone)]
pub struct Point<V> {
    space: Space<V>,
    coords: Vec<V>,
    extra: Vec<(String, V)>,
}

impl<V: Category> Point<V> {
    /// Callers guarantee that `coords` line up with the space's
    /// dimensions and hold valid categories.
    pub(crate) fn from_parts(space: Space<V>, coords: Vec<V>, extra: Vec<(String, V)>) -> Self {
        Self {
            space,
            coords,
            extra,
        }
    }

    pub(crate) fn coords(&self) -> &[V] {
        &self.coords
    }

    /// The space that owns this point.
    pub fn space(&self) -> &Space<V> {
        &self.space
    }

    /// The value for `name`, looking at declared dimensions first and
    /// extra key entries second.
    pub fn get(&self, name: &str) -> Option<&V> {
        match self.space.position_of(name) {
            Some(pos) => Some(&self.coords[pos]),
            None => self.extra.iter().find(|(n, _)| n == name).map(|(_, v)| v),
        }
    }

    /// Like [`Point::get`], but fails on an unknown name.
    pub fn value(&self, name: &str) -> Result<&V, SpaceError> {
        self.get(name).ok_or_else(|| SpaceError::UnknownDimension {
            name: name.to_string(),
        })
    }

    /// The raw key: declared dimensions in space order, then extra
    /// entries.
    pub fn key(&self) -> impl Iterator<Item = (&str, &V)> + '_ {
        self.space
            .names()
            .zip(self.coords.iter())
            .chain(self.extra.iter().map(|(n, v)| (n.as_str(), v)))
    }

    /// An owned copy of [`Point::key`].
    pub fn to_key(&self) -> Vec<(String, V)> {
        self.key()
            .map(|(n, v)| (n.to_string(), v.clone()))
            .collect()
    }

    /// Euclidean distance between two points of the same space, where
    /// each dimension contributes the difference between the two
    /// values' positions in the declared category order.
    ///
    /// ```
    /// let s = pspace::space!(x = ['a', 'b', 'c']);
    /// let a = s.point([("x", 'a')]).unwrap();
    /// let c = s.point([("x", 'c')]).unwrap();
    /// assert_eq!(a.distance(&c).unwrap(), 2.0);
    /// ```
    pub fn distance(&self, other: &Point<V>) -> Result<f64, SpaceError> {
        if self.space != other.space {
            return Err(SpaceError::incompatible(&self.space, &other.space));
        }
        let mut sum = 0.0;
        for (dim, value) in self.space.dims().iter().zip(&self.coords) {
            let theirs = other.value(dim.name())?;
            let a = dim
                .position(value)
                .ok_or_else(|| SpaceError::invalid_value(dim.name(), value))?;
            let b = dim
                .position(theirs)
                .ok_or_else(|| SpaceError::invalid_value(dim.name(), theirs))?;
            let delta = a.abs_diff(b) as f64;
            sum += delta * delta;
        }
        Ok(sum.sqrt())
    }

    /// A new point in the same space whose key is this point's key
    /// overridden by `patch`.
    pub fn update<N, I>(&self, patch: I) -> Result<Point<V>, SpaceError>
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
    {
        self.update_in(patch, &self.space)
    }

    /// A new point in `target` whose key is this point's key overridden
    /// by `patch`.
    pub fn update_in<N, I>(&self, patch: I, target: &Space<V>) -> Result<Point<V>, SpaceError>
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
    {
        let mut key = self.to_key();
        for (name, value) in patch {
            let name = name.into();
            match key.iter_mut().find(|(n, _)| *n == name) {
                Some(slot) => slot.1 = value,
                None => key.push((name, value)),
            }
        }
        target.point(key)
    }

    /// The declared dimensions as `(name, value)` pairs sorted by
    /// name, so that equivalent spaces with a different dimension
    /// order agree.
    fn canonical(&self) -> Vec<(&str, &V)> {
        let mut pairs: Vec<_> = self.space.names().zip(self.coords.iter()).collect();
        pairs.sort_by(|a, b| a.0.cmp(b.0));
        pairs
    }
}

impl<V: Category> PartialEq for Point<V> {
    fn eq(&self, other: &Self) -> bool {
        self.space == other.space
            && self
                .space
                .names()
                .zip(&self.coords)
                .all(|(name, value)| other.get(name) == Some(value))
    }
}

impl<V: Category> Eq for Point<V> {}

impl<V: Category> Hash for Point<V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

impl<V: Category> fmt::Display for Point<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.key().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}={:?}", name, value)?;
        }
        write!(f, "}}")
    }
}

impl<V: Category> fmt::Debug for Point<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Point<{}>", self)
    }
}
