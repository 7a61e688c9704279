use std::sync::Arc;

use foundation::bounds::Aabb3;
use foundation::handles::TileHandle;
use foundation::math::{GeoPoint, Mat4, Vec3};
use parking_lot::Mutex;
use scene::picking::Ray;
use scene::projection::{Projection, SRID_PLANAR};

use crate::mesh::TerrainMesh;

/// One terrain mesh tile.
///
/// Vertices are stored relative to `local_frame`, which maps them into
/// `srid` coordinates: for SRID 4326 that is `(longitude, latitude, height)`.
/// Indices before `skirt_index_offset` are the surface; the rest form the
/// skirt that hides cracks between neighbouring levels.
#[derive(Debug)]
pub struct TerrainTile {
    pub handle: TileHandle,
    /// Geodetic extent: `x` longitude, `y` latitude, `z` height in meters.
    pub aabb: Aabb3,
    pub local_frame: Mat4,
    pub srid: i32,
    pub mesh: TerrainMesh,
    pub skirt_index_offset: usize,
    /// False when every post fell back to zero height.
    pub has_data: bool,
    projected: Mutex<Option<Arc<ProjectedMesh>>>,
}

/// A tile's surface transformed into a scene projection's world space.
#[derive(Debug)]
pub struct ProjectedMesh {
    pub projection: Projection,
    pub mesh: TerrainMesh,
    pub aabb: Aabb3,
    pub skirt_index_offset: usize,
}

impl ProjectedMesh {
    pub fn intersect(&self, ray: &Ray) -> Option<f64> {
        self.mesh.intersect(ray, 0..self.skirt_index_offset)
    }
}

impl TerrainTile {
    pub fn new(
        handle: TileHandle,
        local_frame: Mat4,
        mesh: TerrainMesh,
        skirt_index_offset: usize,
        has_data: bool,
    ) -> Self {
        let aabb =
            Aabb3::from_points(mesh.vertices.iter().map(|v| local_frame.transform_point(*v)));
        Self {
            handle,
            aabb,
            local_frame,
            srid: SRID_PLANAR,
            mesh,
            skirt_index_offset,
            has_data,
            projected: Mutex::new(None),
        }
    }

    /// Whether the geodetic footprint covers the point.
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        self.aabb.contains_xy(longitude, latitude)
    }

    /// Height of the surface under a geodetic point, found by casting a ray
    /// straight down from `start_altitude` through the core triangles.
    pub fn elevation(&self, latitude: f64, longitude: f64, start_altitude: f64) -> Option<f64> {
        let inverse = self.local_frame.inverse()?;
        let origin = inverse.transform_point(Vec3::new(longitude, latitude, start_altitude));
        let dir = inverse.transform_direction(Vec3::new(0.0, 0.0, -1.0));
        let ray = Ray::new(origin, dir);
        let t = self.mesh.intersect(&ray, 0..self.skirt_index_offset)?;
        let hit = self.local_frame.transform_point(ray.at(t));
        hit.z.is_finite().then_some(hit.z)
    }

    /// Surface mesh in `projection` world space, built on first use and
    /// cached until a different projection is requested.
    pub fn projected(&self, projection: Projection) -> Arc<ProjectedMesh> {
        let mut cached = self.projected.lock();
        if let Some(mesh) = cached.as_ref()
            && mesh.projection == projection
        {
            return mesh.clone();
        }
        let frame = self.local_frame;
        let mesh = self.mesh.map_vertices(|v| {
            let p = frame.transform_point(v);
            projection.forward(GeoPoint::with_altitude(p.y, p.x, p.z))
        });
        let built = Arc::new(ProjectedMesh {
            projection,
            aabb: mesh.aabb(),
            mesh,
            skirt_index_offset: self.skirt_index_offset,
        });
        *cached = Some(built.clone());
        built
    }
}
