//! Map representations and their likelihood fields.

mod distance_map;
mod occupancy_map;
mod octree_field;
mod ray_tracer;

pub use distance_map::CachedDistanceMap;
pub use occupancy_map::{OccState, OccupancyGridMsg, OccupancyMap};
pub use octree_field::{OctreeField, OctreeSummary};

use std::sync::Arc;

/// The installed map, tagged by provenance.
///
/// Both variants expose a planar grid with a distance field; the tag decides
/// which sensor path scores against it and how free space is defined.
#[derive(Debug, Clone)]
pub enum MapModel {
    /// A 2D occupancy grid, scored by the planar laser model.
    Occupancy(Arc<OccupancyMap>),
    /// An octree-derived field, scored by the point-cloud model.
    OctreeDerived(Arc<OctreeField>),
}

impl MapModel {
    /// The planar grid backing either variant.
    pub fn grid(&self) -> &OccupancyMap {
        match self {
            MapModel::Occupancy(map) => map,
            MapModel::OctreeDerived(field) => field.grid(),
        }
    }

    /// Free-space cell indices for uniform pose generation.
    pub fn free_space_indices(&self) -> Vec<(i32, i32)> {
        match self {
            MapModel::Occupancy(map) => map.free_space_indices(),
            MapModel::OctreeDerived(field) => field.free_space_indices(),
        }
    }
}
