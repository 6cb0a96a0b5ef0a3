//! Which vertices of a small directed graph reach which others within a
//! bounded number of steps.
//!
//! The answer is a memoized map over (v1, v2, steps) that refers to
//! itself at `steps - 1`. Run with `RUST_LOG=pspace=trace` to watch the
//! cache fill in.

use std::rc::Rc;

use pspace::contract_point;
use pspace::lift;
use pspace::point_region;
use pspace::points_map;
use pspace::unit_map;
use pspace::Map;
use pspace::MapError;
use pspace::MemoRef;
use pspace::MemoizedFunction;
use pspace::Point;
use pspace::Space;
use tracing_subscriber::EnvFilter;

struct Graph {
    vertices: Vec<usize>,
    edges: Vec<(usize, usize)>,
}

fn is_edge(point: Point<usize>, graph: Rc<Graph>) -> bool {
    let (Some(&from), Some(&to)) = (point.get("v1"), point.get("v2")) else {
        return false;
    };
    graph.edges.contains(&(from, to))
}

fn reachable_in(
    point: Point<usize>,
    edges: Rc<Map<usize, bool>>,
    reach: MemoRef<usize, bool>,
) -> Result<bool, MapError> {
    let steps = *point.value("steps")?;
    if steps == 1 {
        return Ok(*edges.get(&contract_point(&point, edges.space())?)?);
    }
    if reach.get(&point.update([("steps", steps - 1)])?)? {
        return Ok(true);
    }
    // Otherwise v2 must be one edge away from something v1 reaches in
    // one step fewer.
    let target = *point.value("v2")?;
    for pred in point_region(edges.space(), [("v2", target)])? {
        if *edges.get(&pred)?
            && reach.get(&point.update([("steps", steps - 1), ("v2", *pred.value("v1")?)])?)?
        {
            return Ok(true);
        }
    }
    Ok(false)
}

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing::subscriber::set_global_default(
        tracing_subscriber::fmt().with_env_filter(filter).finish(),
    )?;

    let graph = Rc::new(Graph {
        vertices: (1..=5).collect(),
        edges: vec![(1, 2), (2, 3), (3, 4), (3, 5)],
    });

    let vertices = Space::new([("v1", graph.vertices.clone())])?;
    let pairs = vertices.add([("v2", graph.vertices.clone())])?;
    let max_steps = graph.vertices.len();
    let steps = Space::new([("steps", (1..=max_steps).collect())])?;
    let space = pairs.union(&steps)?;
    tracing::info!(%space, points = space.num_points(), "built reachability space");

    let edges = lift(&pairs, is_edge).call(&(points_map(&pairs), unit_map(&pairs, graph)))?;

    let reach: Rc<MemoizedFunction<usize, bool, _, _>> =
        MemoizedFunction::new(lift(&space, reachable_in));
    reach.bind((
        points_map(&space),
        unit_map(&space, Rc::new(edges)),
        unit_map(&space, reach.handle()),
    ))?;

    for k in [2, 4] {
        println!("reachable in {}:", k);
        for point in point_region(&space, [("steps", k)])? {
            if reach.get(&point)? {
                println!(
                    "  {} reaches {} within {} steps",
                    point.value("v1")?,
                    point.value("v2")?,
                    k
                );
            }
        }
    }
    tracing::info!(
        resolved = reach.resolved_count(),
        total = space.num_points(),
        "done"
    );
    Ok(())
}
