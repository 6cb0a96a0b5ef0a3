//! Moving points and maps between related spaces.
//!
//! Points project down onto subspaces ([`contract_point`]) and expand
//! up into superspaces ([`expand_point`]); a partial key selects a
//! region of a space ([`point_region`]). Maps pivot between a flat
//! table over a joined space and a nested table of tables
//! ([`stack_map`], [`unstack_map`], [`collapse_map`]), so that a lifted
//! function can iterate over whichever dimensions it needs.

use std::collections::HashSet;

use crate::map::Map;
use crate::map::MapError;
use crate::point::Point;
use crate::space::Category;
use crate::space::Points;
use crate::space::Space;
use crate::space::SpaceError;

// Where each coordinate of an expanded point comes from.
enum Source<V> {
    Free(usize),
    Fixed(V),
}

/// Iterator over the completions of a point in a larger space, see
/// [`expand_point`].
pub struct Expand<V> {
    target: Space<V>,
    free: Points<V>,
    sources: Vec<Source<V>>,
    extra: Vec<(String, V)>,
}

impl<V: Category> Iterator for Expand<V> {
    type Item = Point<V>;

    fn next(&mut self) -> Option<Self::Item> {
        let free = self.free.next()?;
        let coords = self
            .sources
            .iter()
            .map(|source| match source {
                Source::Free(pos) => free.coords()[*pos].clone(),
                Source::Fixed(value) => value.clone(),
            })
            .collect();
        Some(Point::from_parts(
            self.target.clone(),
            coords,
            self.extra.clone(),
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.free.size_hint()
    }
}

impl<V: Category> ExactSizeIterator for Expand<V> {}

/// Every point of `target` that agrees with `point`: one per point of
/// the dimensions of `target` that `point`'s space lacks. Key entries
/// of `point` that `target` does not declare are carried along as
/// extra entries.
///
/// Fails if the two spaces disagree on a shared dimension.
pub fn expand_point<V: Category>(
    point: &Point<V>,
    target: &Space<V>,
) -> Result<Expand<V>, SpaceError> {
    let free = target.difference(point.space())?;
    let mut sources = Vec::with_capacity(target.num_dims());
    for dim in target.dims() {
        let source = match free.dims().iter().position(|d| d.name() == dim.name()) {
            Some(pos) => Source::Free(pos),
            None => {
                let value = point.value(dim.name())?;
                if !dim.contains(value) {
                    return Err(SpaceError::invalid_value(dim.name(), value));
                }
                Source::Fixed(value.clone())
            }
        };
        sources.push(source);
    }
    let extra = point
        .key()
        .filter(|(name, _)| !target.contains(name))
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect();
    Ok(Expand {
        target: target.clone(),
        free: free.points(),
        sources,
        extra,
    })
}

/// Projects `point` onto `target`, keeping only `target`'s dimensions.
pub fn contract_point<V: Category>(
    point: &Point<V>,
    target: &Space<V>,
) -> Result<Point<V>, SpaceError> {
    let mut key = Vec::with_capacity(target.num_dims());
    for name in target.names() {
        let value = point.get(name).ok_or_else(|| SpaceError::MissingDimension {
            dim: name.to_string(),
        })?;
        key.push((name, value.clone()));
    }
    target.point(key)
}

/// The points of `space` consistent with a partial key: the slice of
/// the space where the named dimensions take the given values.
///
/// ```
/// let s = pspace::space!(x = [1, 2], y = [3, 4, 5]);
/// let region: Vec<_> = pspace::point_region(&s, [("x", 2)]).unwrap().collect();
/// assert_eq!(region.len(), 3);
/// assert!(region.iter().all(|p| p.get("x") == Some(&2)));
/// ```
pub fn point_region<V, N, I>(space: &Space<V>, partial: I) -> Result<Expand<V>, SpaceError>
where
    V: Category,
    I: IntoIterator<Item = (N, V)>,
    N: Into<String>,
{
    let key: Vec<(String, V)> = partial
        .into_iter()
        .map(|(name, value)| (name.into(), value))
        .collect();
    let minimal = space.subspace(key.iter().map(|(name, _)| name.as_str()))?;
    let point = minimal.point(key)?;
    expand_point(&point, space)
}

/// A new point in `target` (by default, `point`'s own space) whose key
/// is `point`'s key overridden by `patch`.
pub fn update_point<V, N, I>(
    point: &Point<V>,
    patch: I,
    target: Option<&Space<V>>,
) -> Result<Point<V>, SpaceError>
where
    V: Category,
    I: IntoIterator<Item = (N, V)>,
    N: Into<String>,
{
    point.update_in(patch, target.unwrap_or(point.space()))
}

fn require_subspace<V: Category>(sub: &Space<V>, space: &Space<V>) -> Result<(), SpaceError> {
    if sub.is_subspace_of(space) {
        Ok(())
    } else {
        Err(SpaceError::incompatible(space, sub))
    }
}

/// Broadcasts `map` from its space to a superspace: every point of
/// `target` takes the value of its projection.
pub fn expand_map<V: Category, T: Clone>(
    map: &Map<V, T>,
    target: &Space<V>,
) -> Result<Map<V, T>, MapError> {
    require_subspace(map.space(), target)?;
    Map::try_from_fn(target, |point| -> Result<T, MapError> {
        let projected = contract_point(point, map.space())?;
        Ok(map.get(&projected)?.clone())
    })
}

/// Groups a flat map by the coordinates of `sub`: the result is a map
/// over `sub` whose values are maps over the remaining dimensions.
pub fn stack_map<V: Category, T: Clone>(
    map: &Map<V, T>,
    sub: &Space<V>,
) -> Result<Map<V, Map<V, T>>, MapError> {
    require_subspace(sub, map.space())?;
    let rest = map.space().difference(sub)?;
    Map::try_from_fn(sub, |outer| {
        Map::try_from_fn(&rest, |inner| -> Result<T, MapError> {
            let point = map.space().point(
                outer
                    .key()
                    .chain(inner.key())
                    .map(|(name, value)| (name, value.clone())),
            )?;
            Ok(map.get(&point)?.clone())
        })
    })
}

/// Flattens a map of maps back into one map over `target`, which must
/// be the union of the outer and inner spaces.
pub fn unstack_map<V: Category, T: Clone>(
    nested: &Map<V, Map<V, T>>,
    target: &Space<V>,
) -> Result<Map<V, T>, MapError> {
    if let Some(first) = nested.values().first() {
        let joined = nested.space().union(first.space())?;
        if &joined != target {
            return Err(SpaceError::incompatible(&joined, target).into());
        }
        if let Some(other) = nested.values().iter().find(|m| m.space() != first.space()) {
            return Err(SpaceError::incompatible(first.space(), other.space()).into());
        }
    }
    Map::try_from_fn(target, |point| -> Result<T, MapError> {
        let inner = nested.get(&contract_point(point, nested.space())?)?;
        Ok(inner.get(&contract_point(point, inner.space())?)?.clone())
    })
}

/// A value in an arbitrarily deep nesting of maps.
#[derive(Debug, Clone)]
pub enum Nested<V, T> {
    Leaf(T),
    Map(Map<V, Nested<V, T>>),
}

impl<V: Category, T> From<Map<V, T>> for Nested<V, T> {
    fn from(map: Map<V, T>) -> Self {
        Nested::Map(map.into_map_values(Nested::Leaf))
    }
}

/// Flattens any depth of nested maps into one map. The flat space is
/// the union of the spaces along the first chain of nested values.
pub fn collapse_map<V: Category, T: Clone>(
    map: &Map<V, Nested<V, T>>,
) -> Result<Map<V, T>, MapError> {
    let mut space = map.space().clone();
    let mut current = map;
    while let Some(Nested::Map(inner)) = current.values().first() {
        space = space.union(inner.space())?;
        current = inner;
    }
    tracing::debug!(%space, "collapsing nested map");
    Map::try_from_fn(&space, |point| resolve(map, point, &space))
}

fn resolve<V: Category, T: Clone>(
    map: &Map<V, Nested<V, T>>,
    point: &Point<V>,
    space: &Space<V>,
) -> Result<T, MapError> {
    let mut covered: HashSet<&str> = map.space().names().collect();
    let mut current = map.get(&contract_point(point, map.space())?)?;
    loop {
        match current {
            Nested::Leaf(value) => {
                if space.names().any(|name| !covered.contains(name)) {
                    return Err(MapError::RaggedNesting {
                        point: point.to_string(),
                    });
                }
                return Ok(value.clone());
            }
            Nested::Map(inner) => {
                covered.extend(inner.space().names());
                current = inner.get(&contract_point(point, inner.space())?)?;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::space;

    fn flat() -> Map<i32, i32> {
        let s = space!(a = [1, 2], b = [3, 4, 5], c = [6, 7]);
        Map::from_fn(&s, |p| {
            p.get("a").unwrap() * 100 + p.get("b").unwrap() * 10 + p.get("c").unwrap()
        })
    }

    #[test]
    fn test_expand_point() {
        let s = space!(x = [1, 2]);
        let big = space!(x = [1, 2], y = [3, 4, 5]);
        let p = s.point([("x", 2)]).unwrap();
        let expanded: Vec<_> = expand_point(&p, &big).unwrap().collect();
        assert_eq!(expanded.len(), 3);
        for (q, y) in expanded.iter().zip([3, 4, 5]) {
            assert_eq!(q.space(), &big);
            assert_eq!(q.get("x"), Some(&2));
            assert_eq!(q.get("y"), Some(&y));
            assert_eq!(&contract_point(q, &s).unwrap(), &p);
        }
    }

    #[test]
    fn test_expand_point_keeps_extras() {
        let s = space!(x = [1, 2]);
        let big = space!(y = [3, 4], x = [2, 1]);
        let p = s.point([("x", 1), ("tag", 9)]).unwrap();
        let expanded: Vec<_> = expand_point(&p, &big).unwrap().collect();
        assert_eq!(expanded.len(), 2);
        assert!(expanded.iter().all(|q| q.get("tag") == Some(&9)));
        assert_eq!(expanded[0].to_string(), "{y=3,x=1,tag=9}");
    }

    #[test]
    fn test_expand_point_conflict() {
        let p = space!(x = [1, 2]).point([("x", 1)]).unwrap();
        assert!(matches!(
            expand_point(&p, &space!(x = [1, 2, 3])).err().unwrap(),
            SpaceError::Difference { .. }
        ));
    }

    #[test]
    fn test_contract_point() {
        let big = space!(x = [1, 2], y = [3, 4]);
        let p = big.point([("x", 1), ("y", 4)]).unwrap();
        let q = contract_point(&p, &space!(y = [3, 4])).unwrap();
        assert_eq!(q.to_string(), "{y=4}");
        assert!(matches!(
            contract_point(&p, &space!(z = [1])).unwrap_err(),
            SpaceError::MissingDimension { dim } if dim == "z"
        ));
        assert!(matches!(
            contract_point(&p, &space!(y = [3])).unwrap_err(),
            SpaceError::InvalidValue { .. }
        ));
    }

    #[test]
    fn test_point_region() {
        let s = space!(x = [1, 2], y = [3, 4], z = [5, 6, 7]);
        let region: Vec<_> = point_region(&s, [("y", 4), ("x", 1)]).unwrap().collect();
        assert_eq!(region.len(), 3);
        assert!(region
            .iter()
            .all(|p| p.get("x") == Some(&1) && p.get("y") == Some(&4)));
        let zs: HashSet<_> = region.iter().map(|p| *p.get("z").unwrap()).collect();
        assert_eq!(zs, HashSet::from([5, 6, 7]));

        assert_eq!(point_region(&s, Vec::<(&str, i32)>::new()).unwrap().count(), 12);
        assert!(point_region(&s, [("w", 1)]).is_err());
        assert!(point_region(&s, [("x", 9)]).is_err());
    }

    #[test]
    fn test_update_point() {
        let s = space!(x = [1, 2], steps = [1, 2, 3]);
        let p = s.point([("x", 1), ("steps", 3)]).unwrap();
        let q = update_point(&p, [("steps", 2)], None).unwrap();
        assert_eq!(q.get("steps"), Some(&2));
        assert_eq!(q.space(), &s);

        let sub = space!(x = [1, 2]);
        let r = update_point(&p, [("x", 2)], Some(&sub)).unwrap();
        assert_eq!(r.space(), &sub);
        // Entries the target does not declare are kept as extras.
        assert_eq!(r.get("steps"), Some(&3));
    }

    #[test]
    fn test_expand_map() {
        let s = space!(x = [1, 2]);
        let m = Map::from_fn(&s, |p| *p.get("x").unwrap());
        let big = space!(x = [1, 2], y = [3, 4, 5]);
        let e = expand_map(&m, &big).unwrap();
        assert_eq!(e.len(), 6);
        for (p, v) in e.iter() {
            assert_eq!(p.get("x"), Some(v));
        }
        assert!(matches!(
            expand_map(&m, &space!(y = [3])).unwrap_err(),
            MapError::Space(SpaceError::IncompatibleSpace { .. })
        ));
    }

    #[test]
    fn test_stack_unstack() {
        let m = flat();
        let outer = space!(b = [3, 4, 5]);
        let stacked = stack_map(&m, &outer).unwrap();
        assert_eq!(stacked.len(), 3);

        let b4 = outer.point([("b", 4)]).unwrap();
        let group = stacked.get(&b4).unwrap();
        assert_eq!(group.space(), &space!(a = [1, 2], c = [6, 7]));
        assert_eq!(group.values(), &[146, 147, 246, 247]);

        let restored = unstack_map(&stacked, m.space()).unwrap();
        for (p, v) in m.iter() {
            assert_eq!(restored.get(&p).unwrap(), v);
        }
    }

    #[test]
    fn test_stack_rejects_non_subspace() {
        let m = flat();
        assert!(stack_map(&m, &space!(d = [1])).is_err());
        assert!(stack_map(&m, &space!(a = [1])).is_err());
    }

    #[test]
    fn test_unstack_rejects_wrong_target() {
        let m = flat();
        let stacked = stack_map(&m, &space!(a = [1, 2])).unwrap();
        assert!(matches!(
            unstack_map(&stacked, &space!(a = [1, 2], b = [3, 4, 5])).unwrap_err(),
            MapError::Space(SpaceError::IncompatibleSpace { .. })
        ));
    }

    #[test]
    fn test_unstack_rejects_ragged_inner_maps() {
        let outer = space!(x = [1, 2]);
        let full = Map::from_fn(&space!(y = [3, 4]), |p| *p.get("y").unwrap());
        let short = Map::from_fn(&Space::empty(), |_| 99);
        let nested = Map::from_fn(&outer, |p| {
            if p.get("x") == Some(&1) {
                full.clone()
            } else {
                short.clone()
            }
        });
        assert!(matches!(
            unstack_map(&nested, &space!(x = [1, 2], y = [3, 4])).unwrap_err(),
            MapError::Space(SpaceError::IncompatibleSpace { .. })
        ));
    }

    #[test]
    fn test_collapse() {
        let m = flat();
        // a -> (b -> (c -> value))
        let by_a = stack_map(&m, &space!(a = [1, 2])).unwrap();
        let nested = by_a
            .try_map_values(|inner| {
                Ok::<_, MapError>(Nested::Map(
                    stack_map(inner, &space!(b = [3, 4, 5]))?.into_map_values(Nested::from),
                ))
            })
            .unwrap();

        let collapsed = collapse_map(&nested).unwrap();
        assert_eq!(collapsed.space(), m.space());
        for (p, v) in m.iter() {
            assert_eq!(collapsed.get(&p).unwrap(), v);
        }

        // A single level of nesting also works.
        let shallow = by_a.map_values(|inner| Nested::from(inner.clone()));
        let collapsed = collapse_map(&shallow).unwrap();
        assert_eq!(collapsed.values(), m.values());
    }

    #[test]
    fn test_collapse_ragged() {
        let s = space!(x = [1, 2]);
        let inner = Map::from_fn(&space!(y = [3]), |_| 0);
        let nested = Map::from_fn(&s, |p| {
            if p.get("x") == Some(&1) {
                Nested::from(inner.clone())
            } else {
                Nested::Leaf(5)
            }
        });
        assert!(matches!(
            collapse_map(&nested).unwrap_err(),
            MapError::RaggedNesting { point } if point == "{x=2,y=3}"
        ));
    }
}
