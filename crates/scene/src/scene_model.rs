//! Immutable camera snapshot and its geodetic <-> screen transforms.
//!
//! A `SceneModel` is built once per camera change on the render thread and
//! shared read-only (behind an `Arc`) with every background worker, so the
//! forward/inverse math here never takes `&mut self`.
//!
//! Screen coordinates are pixels with `y` growing downward from
//! `Viewport::top`.

use foundation::math::{EnuFrame, GeoPoint, Mat4, Vec2, Vec3, WGS84_A};

use crate::error::ProjectionError;
use crate::picking::Ray;
use crate::projection::Projection;
use crate::visibility::Frustum;

const INCHES_PER_METER: f64 = 39.37;

/// Pixel rectangle the map renders into.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Viewport {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            left: 0.0,
            top: 0.0,
            right: width,
            bottom: height,
        }
    }

    pub fn width(&self) -> f64 {
        self.right - self.left
    }

    pub fn height(&self) -> f64 {
        self.bottom - self.top
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new((self.left + self.right) * 0.5, (self.top + self.bottom) * 0.5)
    }
}

/// Live camera fields the render thread mutates between frames.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraParams {
    pub projection: Projection,
    pub viewport: Viewport,
    /// Screen point the camera target projects to.
    pub focus: Vec2,
    pub fov_y_deg: f64,
    /// Ground meters per pixel at the focus point.
    pub resolution: f64,
    /// Heading in degrees clockwise from north.
    pub rotation: f64,
    /// Degrees away from nadir.
    pub tilt: f64,
    pub center: GeoPoint,
    pub display_dpi: f64,
}

impl Default for CameraParams {
    fn default() -> Self {
        let viewport = Viewport::new(1024.0, 768.0);
        Self {
            projection: Projection::Ellipsoid,
            viewport,
            focus: viewport.center(),
            fov_y_deg: 45.0,
            resolution: 1_000.0,
            rotation: 0.0,
            tilt: 0.0,
            center: GeoPoint::new(0.0, 0.0),
            display_dpi: 240.0,
        }
    }
}

impl CameraParams {
    /// Map scale (1:N expressed as 1/N) for the current resolution.
    pub fn map_scale(&self) -> f64 {
        1.0 / (self.resolution * self.display_dpi * INCHES_PER_METER)
    }

    fn sanitized(&self) -> CameraParams {
        let mut p = self.clone();
        if p.viewport.width() < 1.0 {
            p.viewport.right = p.viewport.left + 1.0;
        }
        if p.viewport.height() < 1.0 {
            p.viewport.bottom = p.viewport.top + 1.0;
        }
        if !p.fov_y_deg.is_finite() {
            p.fov_y_deg = 45.0;
        }
        p.fov_y_deg = p.fov_y_deg.clamp(1.0, 170.0);
        if !(p.resolution.is_finite() && p.resolution > 0.0) {
            p.resolution = 1.0;
        }
        p.tilt = if p.tilt.is_finite() { p.tilt.clamp(0.0, 89.0) } else { 0.0 };
        if !p.rotation.is_finite() {
            p.rotation = 0.0;
        }
        p.center.latitude = p.center.latitude.clamp(-90.0, 90.0);
        p.center.altitude = 0.0;
        p
    }
}

/// Perspective camera in world space.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Camera {
    pub location: Vec3,
    pub target: Vec3,
    pub forward: Vec3,
    pub up: Vec3,
    pub right: Vec3,
    /// Eye to target distance.
    pub range: f64,
    pub near: f64,
    pub far: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SceneModel {
    params: CameraParams,
    camera: Camera,
    view_proj: Mat4,
    tan_half_fov: f64,
    aspect: f64,
    principal: Vec2,
}

impl Default for SceneModel {
    fn default() -> Self {
        Self::new(&CameraParams::default())
    }
}

impl SceneModel {
    /// Builds the camera for `params`. Out-of-range inputs are clamped.
    pub fn new(params: &CameraParams) -> Self {
        let params = params.sanitized();
        let projection = params.projection;
        let vp = params.viewport;

        let tan_half_fov = (params.fov_y_deg.to_radians() * 0.5).tan();
        let range = params.resolution * vp.height() * 0.5 / tan_half_fov;

        let target = projection.forward(params.center);
        let frame = match projection {
            Projection::Ellipsoid => EnuFrame::at(params.center.to_geodetic()),
            Projection::Planar => EnuFrame::planar(target),
        };

        let (sin_a, cos_a) = params.rotation.to_radians().sin_cos();
        let (sin_t, cos_t) = params.tilt.to_radians().sin_cos();
        let heading = frame.east.scale(sin_a) + frame.north.scale(cos_a);

        let forward = heading.scale(sin_t) - frame.up.scale(cos_t);
        let up = heading.scale(cos_t) + frame.up.scale(sin_t);
        let right = forward.cross(up);
        let location = target - forward.scale(range);

        let near = (range * 1.0e-3).max(1.0);
        let far = match projection {
            Projection::Ellipsoid => range + 2.0 * WGS84_A,
            Projection::Planar => range * 1.0e3,
        };

        let camera = Camera {
            location,
            target,
            forward,
            up,
            right,
            range,
            near,
            far,
        };

        let aspect = vp.width() / vp.height();
        let principal = Vec2::new(
            2.0 * (params.focus.x - vp.left) / vp.width() - 1.0,
            1.0 - 2.0 * (params.focus.y - vp.top) / vp.height(),
        );
        let view_proj =
            perspective(tan_half_fov, aspect, principal, near, far).mul(&look_at(&camera));

        Self {
            params,
            camera,
            view_proj,
            tan_half_fov,
            aspect,
            principal,
        }
    }

    pub fn params(&self) -> &CameraParams {
        &self.params
    }

    pub fn projection(&self) -> Projection {
        self.params.projection
    }

    pub fn srid(&self) -> i32 {
        self.params.projection.srid()
    }

    pub fn is_3d(&self) -> bool {
        self.params.projection.is_3d()
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn viewport(&self) -> Viewport {
        self.params.viewport
    }

    pub fn view_proj(&self) -> &Mat4 {
        &self.view_proj
    }

    pub fn frustum(&self) -> Frustum {
        Frustum::from_view_proj_row_major(self.view_proj.m)
    }

    /// World position to screen `(x, y, depth)`, depth in `[0, 1]` inside
    /// the frustum.
    pub fn forward_world(&self, world: Vec3) -> Result<Vec3, ProjectionError> {
        if !world.is_finite() {
            return Err(ProjectionError::Degenerate);
        }
        let [x, y, z, w] = self.view_proj.transform_homogeneous(world);
        if w <= 0.0 {
            return Err(ProjectionError::BehindCamera);
        }
        let vp = self.params.viewport;
        Ok(Vec3::new(
            vp.left + (x / w + 1.0) * 0.5 * vp.width(),
            vp.top + (1.0 - y / w) * 0.5 * vp.height(),
            z / w,
        ))
    }

    pub fn forward(&self, geo: GeoPoint) -> Result<Vec3, ProjectionError> {
        if !geo.is_valid() {
            return Err(ProjectionError::Degenerate);
        }
        self.forward_world(self.params.projection.forward(geo))
    }

    /// World-space ray from the eye through a screen pixel.
    pub fn screen_ray(&self, x: f64, y: f64) -> Result<Ray, ProjectionError> {
        let vp = self.params.viewport;
        let ndc_x = 2.0 * (x - vp.left) / vp.width() - 1.0;
        let ndc_y = 1.0 - 2.0 * (y - vp.top) / vp.height();
        let cam_x = (ndc_x - self.principal.x) * self.aspect * self.tan_half_fov;
        let cam_y = (ndc_y - self.principal.y) * self.tan_half_fov;
        let c = &self.camera;
        let dir = (c.right.scale(cam_x) + c.up.scale(cam_y) + c.forward)
            .normalize()
            .ok_or(ProjectionError::Degenerate)?;
        Ok(Ray::new(c.location, dir))
    }

    /// Screen pixel to the point on the zero-height surface.
    pub fn inverse(&self, x: f64, y: f64) -> Result<GeoPoint, ProjectionError> {
        let ray = self.screen_ray(x, y)?;
        let projection = self.params.projection;
        let t = projection
            .intersect_surface(ray.origin, ray.dir)
            .ok_or(ProjectionError::MissedSurface)?;
        let geo = projection.inverse(ray.at(t));
        if !geo.is_valid() {
            return Err(ProjectionError::Degenerate);
        }
        Ok(geo)
    }

    /// Like `inverse`, but a ray that misses the surface resolves to the
    /// nearest surface point along it instead of failing.
    pub fn inverse_nearest(&self, x: f64, y: f64) -> Result<GeoPoint, ProjectionError> {
        match self.inverse(x, y) {
            Err(ProjectionError::MissedSurface) => {
                let ray = self.screen_ray(x, y)?;
                self.params
                    .projection
                    .nearest_surface_point(ray.origin, ray.dir)
                    .ok_or(ProjectionError::Degenerate)
            }
            other => other,
        }
    }
}

fn look_at(c: &Camera) -> Mat4 {
    let (r, u, f, e) = (c.right, c.up, c.forward, c.location);
    Mat4::from_rows([
        [r.x, r.y, r.z, -r.dot(e)],
        [u.x, u.y, u.z, -u.dot(e)],
        [-f.x, -f.y, -f.z, f.dot(e)],
        [0.0, 0.0, 0.0, 1.0],
    ])
}

/// Right-handed perspective with clip `z` in `[0, w]` and an off-center
/// principal point (in NDC).
fn perspective(tan_half_fov: f64, aspect: f64, principal: Vec2, near: f64, far: f64) -> Mat4 {
    let f = 1.0 / tan_half_fov;
    Mat4::from_rows([
        [f / aspect, 0.0, -principal.x, 0.0],
        [0.0, f, -principal.y, 0.0],
        [0.0, 0.0, far / (near - far), near * far / (near - far)],
        [0.0, 0.0, -1.0, 0.0],
    ])
}
