use cgmath::{perspective, Deg, EuclideanSpace, InnerSpace, Matrix4, Point3, Vector3};

const EPS: f32 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspectiveCamera {
    pub fovy: Deg<f32>,
    pub aspect: f32,
    pub znear: f32,
    pub zfar: f32,
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    pub up: Vector3<f32>,
}

impl PerspectiveCamera {
    pub fn new(fovy: Deg<f32>, aspect: f32, znear: f32, zfar: f32) -> Self {
        Self {
            fovy,
            aspect,
            znear,
            zfar,
            position: Point3::origin(),
            target: Point3::origin(),
            up: Vector3::unit_y(),
        }
    }

    /// Keep the projection in step with the output size. A zero height is ignored.
    pub fn resize_projection(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.aspect = width as f32 / height as f32;
    }

    pub fn view_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Matrix4<f32> {
        perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }

    pub fn view_projection(&self) -> Matrix4<f32> {
        self.projection_matrix() * self.view_matrix()
    }
}

/// Orbit-style controls: rotate around, dolly towards and pan a target point.
///
/// Input accumulates into pending deltas; [`OrbitControls::update`] applies
/// them to a camera once per frame, easing them out when damping is enabled.
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitControls {
    pub target: Point3<f32>,
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    delta_theta: f32,
    delta_phi: f32,
    zoom_scale: f32,
    pan_offset: Vector3<f32>,
}

impl Default for OrbitControls {
    fn default() -> Self {
        Self {
            target: Point3::origin(),
            enable_damping: true,
            damping_factor: 0.05,
            min_distance: 1.0,
            max_distance: 100.0,
            delta_theta: 0.0,
            delta_phi: 0.0,
            zoom_scale: 1.0,
            pan_offset: Vector3::new(0.0, 0.0, 0.0),
        }
    }
}

impl OrbitControls {
    /// Rotate around the target: `theta` about the up axis, `phi` towards the pole.
    pub fn rotate(&mut self, theta: f32, phi: f32) {
        self.delta_theta -= theta;
        self.delta_phi -= phi;
    }

    /// Scale the orbit radius; values below 1 move closer.
    pub fn dolly(&mut self, scale: f32) {
        if scale > 0.0 {
            self.zoom_scale *= scale;
        }
    }

    pub fn pan(&mut self, offset: Vector3<f32>) {
        self.pan_offset += offset;
    }

    /// Drop any pending motion.
    pub fn clear(&mut self) {
        self.delta_theta = 0.0;
        self.delta_phi = 0.0;
        self.zoom_scale = 1.0;
        self.pan_offset = Vector3::new(0.0, 0.0, 0.0);
    }

    /// Apply pending motion to `camera`. Returns whether the camera moved.
    pub fn update(&mut self, camera: &mut PerspectiveCamera) -> bool {
        let offset = camera.position - self.target;
        let mut radius = offset.magnitude();
        let (mut theta, mut phi) = if radius > EPS {
            (
                offset.x.atan2(offset.z),
                (offset.y / radius).clamp(-1.0, 1.0).acos(),
            )
        } else {
            (0.0, std::f32::consts::FRAC_PI_2)
        };

        let step = if self.enable_damping {
            self.damping_factor
        } else {
            1.0
        };
        theta += self.delta_theta * step;
        phi = (phi + self.delta_phi * step).clamp(EPS, std::f32::consts::PI - EPS);
        radius = (radius * self.zoom_scale).clamp(self.min_distance, self.max_distance);
        self.target += self.pan_offset * step;

        let sin_phi = phi.sin();
        let new_offset = Vector3::new(
            radius * sin_phi * theta.sin(),
            radius * phi.cos(),
            radius * sin_phi * theta.cos(),
        );
        let new_position = self.target + new_offset;

        if self.enable_damping {
            self.delta_theta *= 1.0 - self.damping_factor;
            self.delta_phi *= 1.0 - self.damping_factor;
            self.pan_offset *= 1.0 - self.damping_factor;
        } else {
            self.delta_theta = 0.0;
            self.delta_phi = 0.0;
            self.pan_offset = Vector3::new(0.0, 0.0, 0.0);
        }
        self.zoom_scale = 1.0;

        let moved = (new_position - camera.position).magnitude2() > EPS
            || (self.target - camera.target).magnitude2() > EPS;
        camera.position = new_position;
        camera.target = self.target;
        moved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera_at(p: Point3<f32>) -> PerspectiveCamera {
        let mut camera = PerspectiveCamera::new(Deg(75.0), 1.0, 0.1, 1000.0);
        camera.position = p;
        camera
    }

    #[test]
    fn idle_update_keeps_camera_still() {
        let mut camera = camera_at(Point3::new(5.0, 5.0, 5.0));
        let mut controls = OrbitControls::default();
        controls.update(&mut camera);
        assert!(!controls.update(&mut camera));
        assert!((camera.position - Point3::new(5.0, 5.0, 5.0)).magnitude() < 1e-4);
    }

    #[test]
    fn dolly_respects_distance_bounds() {
        let mut camera = camera_at(Point3::new(0.0, 0.0, 50.0));
        let mut controls = OrbitControls::default();

        controls.dolly(10.0);
        controls.update(&mut camera);
        assert!((camera.position.to_vec().magnitude() - 100.0).abs() < 1e-3);

        controls.dolly(0.0001);
        controls.update(&mut camera);
        assert!((camera.position.to_vec().magnitude() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn damping_eases_rotation_out() {
        let mut camera = camera_at(Point3::new(0.0, 0.0, 10.0));
        let mut controls = OrbitControls::default();
        controls.rotate(1.0, 0.0);

        let first = camera.position;
        assert!(controls.update(&mut camera));
        let step_one = (camera.position - first).magnitude();
        let second = camera.position;
        controls.update(&mut camera);
        let step_two = (camera.position - second).magnitude();
        assert!(step_two < step_one);
    }

    #[test]
    fn resize_ignores_zero_height() {
        let mut camera = camera_at(Point3::new(0.0, 0.0, 1.0));
        camera.resize_projection(1600, 900);
        assert!((camera.aspect - 16.0 / 9.0).abs() < 1e-6);
        camera.resize_projection(800, 0);
        assert!((camera.aspect - 16.0 / 9.0).abs() < 1e-6);
    }
}
