//! Great-circle nearest-airport search.
//!
//! Points are placed on the unit sphere; the smallest chord in 3D is also the
//! smallest great-circle arc, so a plain R*-tree over the 3D positions answers
//! the query exactly.

use crate::error::QueryError;
use crate::types::PointCollection;
use geo::{Distance, Haversine, Point};
use rstar::primitives::GeomWithData;
use rstar::RTree;

type SpherePoint = GeomWithData<[f64; 3], usize>;

pub struct NearestIndex {
    tree: RTree<SpherePoint>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nearest {
    /// Index into the collection the index was built from.
    pub index: usize,
    pub distance_m: f64,
}

fn to_unit_sphere(lon: f64, lat: f64) -> [f64; 3] {
    let (lon, lat) = (lon.to_radians(), lat.to_radians());
    [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
}

impl NearestIndex {
    pub fn build(points: &PointCollection) -> Self {
        let items: Vec<SpherePoint> = points
            .iter()
            .enumerate()
            .map(|(i, p)| GeomWithData::new(to_unit_sphere(p.lon(), p.lat()), i))
            .collect();
        Self {
            tree: RTree::bulk_load(items),
        }
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Nearest point to (`lon`, `lat`). `points` must be the collection the
    /// index was built from.
    pub fn nearest(&self, points: &PointCollection, lon: f64, lat: f64) -> Result<Nearest, QueryError> {
        if !lon.is_finite() || !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(QueryError::InvalidCoordinate { lon, lat });
        }

        let hit = self
            .tree
            .nearest_neighbor(&to_unit_sphere(lon, lat))
            .ok_or(QueryError::NoResult)?;
        let entity = points.get(hit.data).ok_or(QueryError::NoResult)?;

        Ok(Nearest {
            index: hit.data,
            distance_m: Haversine.distance(Point::new(lon, lat), entity.coordinates),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PointEntity;
    use rand::{Rng, SeedableRng};
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
    fn picks_closest_of_three() {
        let points = collection(&[(0.0, 0.0), (10.0, 0.0), (0.0, 10.0)]);
        let index = NearestIndex::build(&points);
        assert_eq!(index.len(), 3);

        assert_eq!(index.nearest(&points, 1.0, 1.0).unwrap().index, 0);
        assert_eq!(index.nearest(&points, 9.0, 1.0).unwrap().index, 1);
        assert_eq!(index.nearest(&points, 1.0, 8.0).unwrap().index, 2);
    }

    #[test]
    fn wraps_across_the_antimeridian() {
        let points = collection(&[(179.5, 0.0), (170.0, 0.0)]);
        let index = NearestIndex::build(&points);
        let hit = index.nearest(&points, -179.5, 0.0).unwrap();
        assert_eq!(hit.index, 0);
        // One degree of longitude on the equator is about 111 km.
        assert!((hit.distance_m - 111_000.0).abs() < 1_000.0);
    }

    #[test]
    fn matches_brute_force_haversine() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(42);
        let coords: Vec<(f64, f64)> = (0..300)
            .map(|_| (rng.gen_range(-180.0..180.0), rng.gen_range(-85.0..85.0)))
            .collect();
        let points = collection(&coords);
        let index = NearestIndex::build(&points);

        for _ in 0..100 {
            let (lon, lat) = (rng.gen_range(-180.0..180.0), rng.gen_range(-90.0..90.0));
            let query = Point::new(lon, lat);
            let expected = points
                .iter()
                .map(|p| Haversine.distance(query, p.coordinates))
                .fold(f64::INFINITY, f64::min);
            let hit = index.nearest(&points, lon, lat).unwrap();
            assert!((hit.distance_m - expected).abs() < 1e-3);
        }
    }

    #[test]
    fn rejects_non_finite_queries() {
        let points = collection(&[(0.0, 0.0)]);
        let index = NearestIndex::build(&points);
        assert!(matches!(
            index.nearest(&points, f64::NAN, 0.0),
            Err(QueryError::InvalidCoordinate { .. })
        ));
        assert!(index.nearest(&points, 0.0, 95.0).is_err());
    }
}
