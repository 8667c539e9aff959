//! Voronoi partition of the airport set.
//!
//! Each cell is the bounds rectangle cut down by the bisector half-planes of
//! the site's Delaunay neighbours. Cells are planar in lon/lat space, matching
//! how the map front-end draws them.
//!
//! Only sites inside the bounds take part. A site outside would own no cell
//! yet still cut its bisector into its neighbours, leaving part of the bounds
//! uncovered.

use crate::error::PartitionError;
use crate::types::{Bounds, Cell, PointCollection, ProximityPartition};
use geo::{Coord, LineString, Polygon};
use rayon::prelude::*;
use spade::handles::FixedVertexHandle;
use spade::{DelaunayTriangulation, Point2, Triangulation};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Build the partition, logging and returning `None` when it cannot be built.
pub fn build(points: &PointCollection, bounds: Bounds) -> Option<ProximityPartition> {
    match try_build(points, bounds) {
        Ok(partition) if !partition.is_empty() => {
            info!(cells = partition.len(), "proximity partition built");
            Some(partition)
        }
        Ok(_) => {
            warn!("Voronoi computation produced no cells");
            None
        }
        Err(e) => {
            warn!("Voronoi computation failed: {e}");
            None
        }
    }
}

pub fn try_build(points: &PointCollection, bounds: Bounds) -> Result<ProximityPartition, PartitionError> {
    let mut triangulation: DelaunayTriangulation<Point2<f64>> = DelaunayTriangulation::new();
    // First point inserted at a position owns that vertex.
    let mut owners: HashMap<FixedVertexHandle, usize> = HashMap::with_capacity(points.len());

    for (index, point) in points.iter().enumerate() {
        if !bounds.contains(point.lon(), point.lat()) {
            debug!(index, lon = point.lon(), lat = point.lat(), "site outside bounds, left out");
            continue;
        }
        let handle = triangulation
            .insert(Point2::new(point.lon(), point.lat()))
            .map_err(|cause| PartitionError::Triangulation { index, cause })?;
        if let Some(owner) = owners.get(&handle) {
            debug!(index, owner = *owner, "duplicate position, cell stays with first point");
        } else {
            owners.insert(handle, index);
        }
    }

    if triangulation.num_vertices() < 3 {
        return Err(PartitionError::TooFewPoints(triangulation.num_vertices()));
    }
    if triangulation.all_vertices_on_line() {
        return Err(PartitionError::Collinear);
    }

    // Neighbour lists are gathered up front; the triangulation is not shared across threads.
    let sites: Vec<(usize, Coord<f64>, Vec<Coord<f64>>)> = triangulation
        .fixed_vertices()
        .filter_map(|handle| {
            let site = *owners.get(&handle)?;
            let vertex = triangulation.vertex(handle);
            let position = to_coord(vertex.position());
            let neighbours = vertex
                .out_edges()
                .map(|edge| to_coord(edge.to().position()))
                .collect();
            Some((site, position, neighbours))
        })
        .collect();

    let outline = rect_ring(&bounds);
    let mut cells: Vec<Cell> = sites
        .into_par_iter()
        .filter_map(|(site, position, neighbours)| {
            let ring = neighbours.iter().fold(outline.clone(), |ring, neighbour| {
                clip_by_bisector(&ring, position, *neighbour)
            });
            if ring.len() < 3 {
                return None;
            }
            Some(Cell {
                site,
                polygon: Polygon::new(LineString::from(ring), vec![]),
            })
        })
        .collect();

    cells.sort_by_key(|c| c.site);
    Ok(ProximityPartition { bounds, cells })
}

fn to_coord(p: Point2<f64>) -> Coord<f64> {
    Coord { x: p.x, y: p.y }
}

/// Counter-clockwise outline of the bounds, not closed.
fn rect_ring(bounds: &Bounds) -> Vec<Coord<f64>> {
    vec![
        Coord { x: bounds.min_lon, y: bounds.min_lat },
        Coord { x: bounds.max_lon, y: bounds.min_lat },
        Coord { x: bounds.max_lon, y: bounds.max_lat },
        Coord { x: bounds.min_lon, y: bounds.max_lat },
    ]
}

/// Positive on the neighbour's side of the bisector between `site` and `neighbour`.
fn bisector_side(p: Coord<f64>, site: Coord<f64>, neighbour: Coord<f64>) -> f64 {
    let mid = Coord {
        x: (site.x + neighbour.x) * 0.5,
        y: (site.y + neighbour.y) * 0.5,
    };
    (p.x - mid.x) * (neighbour.x - site.x) + (p.y - mid.y) * (neighbour.y - site.y)
}

/// Keep the part of a convex ring that lies on the site's side of the bisector.
fn clip_by_bisector(ring: &[Coord<f64>], site: Coord<f64>, neighbour: Coord<f64>) -> Vec<Coord<f64>> {
    let Some(&last) = ring.last() else {
        return Vec::new();
    };

    let mut result = Vec::with_capacity(ring.len() + 1);
    let mut prev = last;
    let mut prev_side = bisector_side(prev, site, neighbour);

    for &current in ring {
        let side = bisector_side(current, site, neighbour);
        let inside = side <= 0.0;
        let prev_inside = prev_side <= 0.0;

        if inside != prev_inside {
            let t = prev_side / (prev_side - side);
            result.push(Coord {
                x: prev.x + (current.x - prev.x) * t,
                y: prev.y + (current.y - prev.y) * t,
            });
        }
        if inside {
            result.push(current);
        }

        prev = current;
        prev_side = side;
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PointEntity;
    use approx::assert_relative_eq;
    use geo::{Area, Contains, Intersects, Point};
    use serde_json::Map;

    fn collection(coords: &[(f64, f64)]) -> PointCollection {
        PointCollection::new(
            coords
                .iter()
                .map(|&(lon, lat)| PointEntity::new(lon, lat, Map::new()))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn three_points_cover_the_world() {
        let points = collection(&[(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)]);
        let partition = build(&points, Bounds::WORLD).unwrap();

        assert_eq!(partition.len(), 3);
        let total: f64 = partition.cells.iter().map(|c| c.polygon.unsigned_area()).sum();
        assert_relative_eq!(total, 360.0 * 180.0, max_relative = 1e-9);

        for cell in &partition.cells {
            let site = points.get(cell.site).unwrap();
            assert!(cell.polygon.intersects(&site.coordinates));
        }
    }

    #[test]
    fn cells_hold_only_their_nearest_locations() {
        let points = collection(&[(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)]);
        let partition = build(&points, Bounds::WORLD).unwrap();

        let alpha = partition.cell_for(0).unwrap();
        let beta = partition.cell_for(1).unwrap();
        assert!(alpha.polygon.contains(&Point::new(1.0, 1.0)));
        assert!(!alpha.polygon.contains(&Point::new(9.0, 1.0)));
        assert!(beta.polygon.contains(&Point::new(9.0, 1.0)));
    }

    #[test]
    fn random_points_tile_the_bounds() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand::rngs::StdRng::seed_from_u64(7);
        let coords: Vec<(f64, f64)> = (0..200)
            .map(|_| (rng.gen_range(-179.0..179.0), rng.gen_range(-89.0..89.0)))
            .collect();
        let points = collection(&coords);

        let partition = build(&points, Bounds::WORLD).unwrap();
        assert_eq!(partition.len(), 200);
        let total: f64 = partition.cells.iter().map(|c| c.polygon.unsigned_area()).sum();
        assert_relative_eq!(total, 360.0 * 180.0, max_relative = 1e-6);
    }

    #[test]
    fn too_few_points_is_absent() {
        let points = collection(&[(0.0, 0.0), (10.0, 0.0)]);
        assert!(matches!(
            try_build(&points, Bounds::WORLD),
            Err(PartitionError::TooFewPoints(2))
        ));
        assert!(build(&points, Bounds::WORLD).is_none());
    }

    #[test]
    fn duplicates_do_not_count_as_distinct() {
        let points = collection(&[(0.0, 0.0), (0.0, 0.0), (10.0, 0.0)]);
        assert!(matches!(
            try_build(&points, Bounds::WORLD),
            Err(PartitionError::TooFewPoints(2))
        ));
    }

    #[test]
    fn collinear_points_are_absent() {
        let points = collection(&[(0.0, 0.0), (10.0, 0.0), (20.0, 0.0), (30.0, 0.0)]);
        assert!(matches!(
            try_build(&points, Bounds::WORLD),
            Err(PartitionError::Collinear)
        ));
        assert!(build(&points, Bounds::WORLD).is_none());
    }

    #[test]
    fn duplicate_position_cell_goes_to_first_point() {
        let points = collection(&[(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (10.0, 0.0)]);
        let partition = build(&points, Bounds::WORLD).unwrap();
        assert_eq!(partition.len(), 3);
        assert!(partition.cell_for(1).is_some());
        assert!(partition.cell_for(3).is_none());
    }

    #[test]
    fn site_outside_bounds_owns_no_cell() {
        let bounds = Bounds::from([-20.0, -20.0, 20.0, 20.0]);
        let points = collection(&[(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (100.0, 80.0)]);
        let partition = build(&points, bounds).unwrap();
        assert!(partition.cell_for(3).is_none());
        let total: f64 = partition.cells.iter().map(|c| c.polygon.unsigned_area()).sum();
        assert_relative_eq!(total, 40.0 * 40.0, max_relative = 1e-9);
    }

    #[test]
    fn site_just_outside_bounds_leaves_no_gap() {
        let bounds = Bounds::from([-20.0, -20.0, 20.0, 20.0]);
        let points = collection(&[(0.0, 0.0), (10.0, 0.0), (0.0, 10.0), (21.0, 0.0)]);
        let partition = build(&points, bounds).unwrap();

        assert_eq!(partition.len(), 3);
        assert!(partition.cell_for(3).is_none());
        let total: f64 = partition.cells.iter().map(|c| c.polygon.unsigned_area()).sum();
        assert_relative_eq!(total, 40.0 * 40.0, max_relative = 1e-9);

        // Locations nearer the outside site still fall in some cell.
        let beta = partition.cell_for(1).unwrap();
        assert!(beta.polygon.contains(&Point::new(18.0, 1.0)));
        for cell in &partition.cells {
            let site = points.get(cell.site).unwrap();
            assert!(cell.polygon.intersects(&site.coordinates));
        }
    }

    #[test]
    fn outside_sites_do_not_count_as_distinct() {
        let bounds = Bounds::from([-20.0, -20.0, 20.0, 20.0]);
        let points = collection(&[(0.0, 0.0), (10.0, 0.0), (50.0, 50.0)]);
        assert!(matches!(
            try_build(&points, bounds),
            Err(PartitionError::TooFewPoints(2))
        ));
    }

    #[test]
    fn clipping_halves_a_square() {
        let square = rect_ring(&Bounds::from([0.0, 0.0, 2.0, 2.0]));
        let clipped = clip_by_bisector(&square, Coord { x: 0.5, y: 1.0 }, Coord { x: 1.5, y: 1.0 });
        let polygon = Polygon::new(LineString::from(clipped), vec![]);
        assert_relative_eq!(polygon.unsigned_area(), 2.0, epsilon = 1e-12);
    }
}
