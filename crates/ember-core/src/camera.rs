//! Camera and per-frame transform uniforms.

use std::f32::consts::FRAC_PI_2;

use glam::{Mat4, Vec3};

/// Fixed look-at camera.
#[derive(Debug, Clone)]
pub struct Camera {
    pub eye: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            eye: Vec3::splat(2.0),
            target: Vec3::ZERO,
            up: Vec3::Z,
            fov_y: 45f32.to_radians(),
            near: 0.1,
            far: 10.0,
        }
    }
}

impl Camera {
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye, self.target, self.up)
    }

    /// Perspective projection with clip-space Y pointing down.
    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        let mut proj = Mat4::perspective_rh(self.fov_y, aspect, self.near, self.far);
        proj.y_axis.y *= -1.0;
        proj
    }
}

/// Model rotation after `seconds`: a quarter turn per second about +Z.
pub fn spin_model(seconds: f32) -> Mat4 {
    Mat4::from_rotation_z(seconds * FRAC_PI_2)
}

/// Uniform buffer contents: model, view and projection matrices, column-major.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct UniformBufferObject {
    pub model: [[f32; 4]; 4],
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
}

impl UniformBufferObject {
    /// Size in bytes as seen by the shader.
    pub const SIZE: u64 = std::mem::size_of::<Self>() as u64;

    pub fn new(model: Mat4, view: Mat4, proj: Mat4) -> Self {
        Self {
            model: model.to_cols_array_2d(),
            view: view.to_cols_array_2d(),
            proj: proj.to_cols_array_2d(),
        }
    }

    /// Uniforms for the spinning model `seconds` after the first frame.
    pub fn at_time(camera: &Camera, seconds: f32, width: u32, height: u32) -> Self {
        let aspect = width as f32 / height.max(1) as f32;
        Self::new(
            spin_model(seconds),
            camera.view_matrix(),
            camera.projection_matrix(aspect),
        )
    }

    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_cols_array_2d(&self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glam::Vec4;

    #[test]
    fn uniform_layout_is_three_packed_matrices() {
        assert_eq!(UniformBufferObject::SIZE, 192);
        assert_eq!(std::mem::offset_of!(UniformBufferObject, view), 64);
        assert_eq!(std::mem::offset_of!(UniformBufferObject, proj), 128);
    }

    #[test]
    fn model_turns_a_quarter_per_second() {
        let ubo = UniformBufferObject::at_time(&Camera::default(), 1.0, 800, 600);
        let x = ubo.model_matrix() * Vec4::X;
        assert_relative_eq!(x.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(x.y, 1.0, epsilon = 1e-6);

        let (_, rotation, _) = ubo.model_matrix().to_scale_rotation_translation();
        let (axis, angle) = rotation.to_axis_angle();
        assert_relative_eq!(angle, FRAC_PI_2, epsilon = 1e-5);
        assert_relative_eq!(axis.z, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn projection_flips_y() {
        let camera = Camera::default();
        let flipped = camera.projection_matrix(1.0);
        let plain = Mat4::perspective_rh(camera.fov_y, 1.0, camera.near, camera.far);
        assert!(flipped.y_axis.y < 0.0);
        assert_relative_eq!(flipped.y_axis.y, -plain.y_axis.y);
        assert_relative_eq!(flipped.x_axis.x, plain.x_axis.x);
    }

    #[test]
    fn view_looks_at_origin_from_corner() {
        let view = Camera::default().view_matrix();
        let origin = view.transform_point3(Vec3::ZERO);
        assert_relative_eq!(origin.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(origin.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(origin.z, -(12f32.sqrt()), epsilon = 1e-5);
    }

    #[test]
    fn zero_height_does_not_divide_by_zero() {
        let ubo = UniformBufferObject::at_time(&Camera::default(), 0.0, 640, 0);
        assert!(ubo.proj.iter().flatten().all(|v| v.is_finite()));
    }
}
