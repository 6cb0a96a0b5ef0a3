use std::collections::HashMap;
use std::fmt;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use itertools::Itertools;

use crate::point::Point;

/// Values usable as categories of a dimension. Categories are used as
/// keys in associative containers, so equality and hashing must agree.
pub trait Category: Clone + Eq + Hash + Debug {}

impl<T: Clone + Eq + Hash + Debug> Category for T {}

#[derive(Debug, thiserror::Error)]
pub enum SpaceError {
    #[error("duplicate dimension `{name}`")]
    DuplicateDimension { name: String },

    #[error("duplicate category {category} in dimension `{dim}`")]
    DuplicateCategory { dim: String, category: String },

    #[error("unknown dimension `{name}`")]
    UnknownDimension { name: String },

    #[error("key is missing dimension `{dim}`")]
    MissingDimension { dim: String },

    #[error("invalid value {value} for dimension `{dim}`")]
    InvalidValue { dim: String, value: String },

    #[error("conflicting categories for dimension `{dim}` in {op}")]
    ConflictingCategories { dim: String, op: &'static str },

    #[error("incompatible spaces: expected {expected}, got {actual}")]
    IncompatibleSpace { expected: String, actual: String },

    #[error("space {{{dims}}} has more points than fit in usize")]
    TooManyPoints { dims: String },

    #[error("cannot take difference of spaces")]
    Difference {
        #[source]
        source: Box<SpaceError>,
    },
}

impl SpaceError {
    pub(crate) fn incompatible<V: Category>(expected: &Space<V>, actual: &Space<V>) -> Self {
        SpaceError::IncompatibleSpace {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub(crate) fn invalid_value<V: Debug>(dim: &str, value: &V) -> Self {
        SpaceError::InvalidValue {
            dim: dim.to_string(),
            value: format!("{:?}", value),
        }
    }
}

/// A named dimension: an ordered sequence of categories together with
/// the position of each category in that sequence.
///
/// The order is significant for enumeration and [`Point::distance`];
/// it is ignored when comparing spaces.
#[derive(Debug, Clone)]
pub struct Dimension<V> {
    name: String,
    categories: Vec<V>,
    index: HashMap<V, usize>,
}

impl<V: Category> Dimension<V> {
    /// Creates a dimension. Each category may appear at most once.
    pub fn new(name: impl Into<String>, categories: Vec<V>) -> Result<Self, SpaceError> {
        let name = name.into();
        let mut index = HashMap::with_capacity(categories.len());
        for (pos, category) in categories.iter().enumerate() {
            if index.insert(category.clone(), pos).is_some() {
                return Err(SpaceError::DuplicateCategory {
                    dim: name,
                    category: format!("{:?}", category),
                });
            }
        }
        Ok(Self {
            name,
            categories,
            index,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The categories in declared order.
    pub fn categories(&self) -> &[V] {
        &self.categories
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// The position of `value` in the declared order.
    pub fn position(&self, value: &V) -> Option<usize> {
        self.index.get(value).copied()
    }

    pub fn contains(&self, value: &V) -> bool {
        self.index.contains_key(value)
    }

    /// Whether both dimensions hold the same set of categories,
    /// regardless of order.
    pub fn same_categories(&self, other: &Dimension<V>) -> bool {
        self.len() == other.len() && self.categories.iter().all(|c| other.contains(c))
    }
}

/// A space is a set of named dimensions; its points are the Cartesian
/// product of the dimensions' categories.
///
/// Spaces are immutable and cheap to clone: every algebra operation
/// returns a new space. Two spaces compare equal when they have the
/// same dimension names and, per dimension, the same category set.
#[derive(Debug, Clone)]
pub struct Space<V> {
    dims: Arc<Vec<Dimension<V>>>,
    num_points: usize,
}

impl<V: Category> Space<V> {
    /// Creates a space from `(name, categories)` pairs. The iteration
    /// order of the pairs is the enumeration order of the space.
    ///
    /// Spaces can also be constructed with the [`space`] macro:
    ///
    /// ```
    /// let s = pspace::space!(x = [1, 2], y = [3, 4, 5]);
    /// assert_eq!(s.names().collect::<Vec<_>>(), &["x", "y"]);
    /// assert_eq!(s.num_points(), 6);
    /// ```
    pub fn new<N, I>(dims: I) -> Result<Self, SpaceError>
    where
        I: IntoIterator<Item = (N, Vec<V>)>,
        N: Into<String>,
    {
        let mut out: Vec<Dimension<V>> = Vec::new();
        for (name, categories) in dims {
            let dim = Dimension::new(name, categories)?;
            if out.iter().any(|d| d.name == dim.name) {
                return Err(SpaceError::DuplicateDimension { name: dim.name });
            }
            out.push(dim);
        }
        Self::from_dims(out)
    }

    /// The space with no dimensions. It has exactly one (empty) point.
    pub fn empty() -> Self {
        Self {
            dims: Arc::new(Vec::new()),
            num_points: 1,
        }
    }

    /// Every space is built here, so every space has a point count
    /// that fits in `usize`.
    fn from_dims(dims: Vec<Dimension<V>>) -> Result<Self, SpaceError> {
        let num_points = dims
            .iter()
            .try_fold(1usize, |acc, dim| acc.checked_mul(dim.len()))
            .ok_or_else(|| SpaceError::TooManyPoints {
                dims: dims.iter().map(|d| format!("{}={}", d.name, d.len())).join(","),
            })?;
        Ok(Self {
            dims: Arc::new(dims),
            num_points,
        })
    }

    pub fn dims(&self) -> &[Dimension<V>] {
        &self.dims
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.dims.iter().map(|d| d.name())
    }

    pub fn num_dims(&self) -> usize {
        self.dims.len()
    }

    /// The number of points, i.e. the product of the dimension sizes.
    pub fn num_points(&self) -> usize {
        self.num_points
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position_of(name).is_some()
    }

    pub(crate) fn position_of(&self, name: &str) -> Option<usize> {
        self.dims.iter().position(|d| d.name == name)
    }

    fn find(&self, name: &str) -> Option<&Dimension<V>> {
        self.dims.iter().find(|d| d.name == name)
    }

    /// The dimension called `name`.
    pub fn dim(&self, name: &str) -> Result<&Dimension<V>, SpaceError> {
        self.find(name).ok_or_else(|| SpaceError::UnknownDimension {
            name: name.to_string(),
        })
    }

    /// Returns a new space with `dims` merged in. A dimension that is
    /// already present is replaced in place rather than rejected.
    pub fn add<N, I>(&self, dims: I) -> Result<Self, SpaceError>
    where
        I: IntoIterator<Item = (N, Vec<V>)>,
        N: Into<String>,
    {
        let mut out = self.dims.as_ref().clone();
        for (name, categories) in dims {
            let dim = Dimension::new(name, categories)?;
            match out.iter_mut().find(|d| d.name == dim.name) {
                Some(existing) => {
                    tracing::debug!(dim = %dim.name, "add overwrites existing dimension");
                    *existing = dim;
                }
                None => out.push(dim),
            }
        }
        Self::from_dims(out)
    }

    /// Returns a new space without the named dimensions.
    pub fn drop<S, I>(&self, names: I) -> Result<Self, SpaceError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out = self.dims.as_ref().clone();
        for name in names {
            let name = name.as_ref();
            let pos = out.iter().position(|d| d.name == name).ok_or_else(|| {
                SpaceError::UnknownDimension {
                    name: name.to_string(),
                }
            })?;
            out.remove(pos);
        }
        Self::from_dims(out)
    }

    /// Returns the space made of exactly the named dimensions, in the
    /// order given.
    pub fn subspace<S, I>(&self, names: I) -> Result<Self, SpaceError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<Dimension<V>> = Vec::new();
        for name in names {
            let dim = self.dim(name.as_ref())?;
            if out.iter().any(|d| d.name == dim.name) {
                return Err(SpaceError::DuplicateDimension {
                    name: dim.name.clone(),
                });
            }
            out.push(dim.clone());
        }
        Self::from_dims(out)
    }

    /// The union of both spaces' dimensions. A dimension shared by both
    /// must have the same category set, unless one side is empty, in
    /// which case the other side's categories are used.
    pub fn union(&self, other: &Space<V>) -> Result<Self, SpaceError> {
        let mut out = Vec::with_capacity(self.num_dims() + other.num_dims());
        for dim in self.dims.iter() {
            match other.find(&dim.name) {
                Some(theirs)
                    if !dim.is_empty() && !theirs.is_empty() && !dim.same_categories(theirs) =>
                {
                    return Err(SpaceError::ConflictingCategories {
                        dim: dim.name.clone(),
                        op: "union",
                    });
                }
                Some(theirs) if dim.is_empty() => out.push(theirs.clone()),
                _ => out.push(dim.clone()),
            }
        }
        for dim in other.dims.iter() {
            if !self.contains(&dim.name) {
                out.push(dim.clone());
            }
        }
        Self::from_dims(out)
    }

    /// The dimensions present in both spaces. Shared dimensions must
    /// have the same category set.
    pub fn intersection(&self, other: &Space<V>) -> Result<Self, SpaceError> {
        let mut out = Vec::new();
        for dim in self.dims.iter() {
            if let Some(theirs) = other.find(&dim.name) {
                if !dim.same_categories(theirs) {
                    return Err(SpaceError::ConflictingCategories {
                        dim: dim.name.clone(),
                        op: "intersection",
                    });
                }
                out.push(dim.clone());
            }
        }
        Self::from_dims(out)
    }

    /// The dimensions of `self` that are absent from `other`. Fails if
    /// the spaces disagree on a shared dimension.
    pub fn difference(&self, other: &Space<V>) -> Result<Self, SpaceError> {
        self.intersection(other)
            .map_err(|source| SpaceError::Difference {
                source: Box::new(source),
            })?;
        Self::from_dims(
            self.dims
                .iter()
                .filter(|d| !other.contains(&d.name))
                .cloned()
                .collect(),
        )
    }

    /// Whether every dimension of `self` appears in `other` with the
    /// same category set.
    pub fn is_subspace_of(&self, other: &Space<V>) -> bool {
        self.dims.iter().all(|dim| {
            other
                .find(&dim.name)
                .is_some_and(|theirs| dim.same_categories(theirs))
        })
    }

    /// Lazily enumerates every point of the space, in declared
    /// dimension order with the last dimension varying fastest. Each
    /// call starts a fresh enumeration.
    pub fn points(&self) -> Points<V> {
        Points {
            space: self.clone(),
            cursor: vec![0; self.num_dims()],
            remaining: self.num_points(),
        }
    }

    /// Builds a point from `(name, value)` pairs. Every dimension must
    /// be given a value from its categories; pairs naming other
    /// dimensions are kept as extra key entries. When a name repeats,
    /// the last pair wins.
    pub fn point<N, I>(&self, key: I) -> Result<Point<V>, SpaceError>
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
    {
        let mut coords: Vec<Option<V>> = vec![None; self.num_dims()];
        let mut extra: Vec<(String, V)> = Vec::new();
        for (name, value) in key {
            let name = name.into();
            match self.position_of(&name) {
                Some(pos) => coords[pos] = Some(value),
                None => match extra.iter_mut().find(|(n, _)| *n == name) {
                    Some(slot) => slot.1 = value,
                    None => extra.push((name, value)),
                },
            }
        }

        let mut checked = Vec::with_capacity(coords.len());
        for (dim, value) in self.dims.iter().zip(coords) {
            let value = value.ok_or_else(|| SpaceError::MissingDimension {
                dim: dim.name.clone(),
            })?;
            if !dim.contains(&value) {
                return Err(SpaceError::invalid_value(&dim.name, &value));
            }
            checked.push(value);
        }
        Ok(Point::from_parts(self.clone(), checked, extra))
    }

    /// The position of `point` in this space's enumeration order.
    /// Values are looked up by dimension name, so the point may belong
    /// to any equivalent space.
    pub(crate) fn rank(&self, point: &Point<V>) -> Result<usize, SpaceError> {
        let mut rank = 0;
        for dim in self.dims.iter() {
            let value = point
                .get(&dim.name)
                .ok_or_else(|| SpaceError::MissingDimension {
                    dim: dim.name.clone(),
                })?;
            let pos = dim
                .position(value)
                .ok_or_else(|| SpaceError::invalid_value(&dim.name, value))?;
            rank = rank * dim.len() + pos;
        }
        Ok(rank)
    }

    fn point_at(&self, cursor: &[usize]) -> Point<V> {
        let coords = self
            .dims
            .iter()
            .zip(cursor)
            .map(|(dim, &pos)| dim.categories[pos].clone())
            .collect();
        Point::from_parts(self.clone(), coords, Vec::new())
    }
}

impl<V: Category> PartialEq for Space<V> {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.dims, &other.dims) {
            return true;
        }
        self.num_dims() == other.num_dims()
            && self.dims.iter().all(|dim| {
                other
                    .find(&dim.name)
                    .is_some_and(|theirs| dim.same_categories(theirs))
            })
    }
}

impl<V: Category> Eq for Space<V> {}

impl<V: Category> fmt::Display for Space<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, dim) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(
                f,
                "{}=[{}]",
                dim.name,
                dim.categories.iter().map(|c| format!("{:?}", c)).join(", ")
            )?;
        }
        write!(f, "}}")
    }
}

/// Iterator over the points of a [`Space`], see [`Space::points`].
pub struct Points<V> {
    space: Space<V>,
    cursor: Vec<usize>,
    remaining: usize,
}

impl<V: Category> Iterator for Points<V> {
    type Item = Point<V>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let point = self.space.point_at(&self.cursor);
        self.remaining -= 1;

        for d in (0..self.cursor.len()).rev() {
            self.cursor[d] += 1;
            if self.cursor[d] < self.space.dims[d].len() {
                break;
            }
            self.cursor[d] = 0;
        }
        Some(point)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V: Category> ExactSizeIterator for Points<V> {}

/// Construct a new space from `name = categories` pairs, in order.
/// Categories may be given as an array, a `Vec`, a range, or any other
/// iterable. Panics if the dimensions are invalid.
///
/// ```
/// let s = pspace::space!(host = [0, 1], gpu = 0..8);
/// assert_eq!(s.num_points(), 16);
/// assert_eq!(s.to_string(), "{host=[0, 1],gpu=[0, 1, 2, 3, 4, 5, 6, 7]}");
/// ```
#[macro_export]
macro_rules! space {
    ( $( $name:ident = $categories:expr ),* $(,)? ) => {
        {
            let mut dims = ::std::vec::Vec::new();
            $(
                dims.push((
                    stringify!($name),
                    ::std::iter::IntoIterator::into_iter($categories)
                        .collect::<::std::vec::Vec<_>>(),
                ));
            )*
            $crate::Space::new(dims).unwrap()
        }
    };
}
