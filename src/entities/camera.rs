//! Orthographic 2D camera for the correlation editor.
//!
//! World space is Y-up, in nm. `zoom` is screen pixels per world unit.
//!
//! ```text
//! view       = Scale(zoom) · RotZ(rotation) · Translate(position)
//! projection = ortho(-w/2, w/2, -h/2, h/2, near, far)   (screen px -> NDC)
//! vp         = projection · view
//! ```
//!
//! `position` is the negated world point shown at the viewport centre.

use glam::{DMat4, DVec2, DVec3};
use serde::{Deserialize, Serialize};

use super::clem_frame::ClemFrame;
use super::space;
use crate::config::{CAMERA_MAX_ZOOM, CAMERA_MIN_ZOOM, CAMERA_Z_FAR, CAMERA_Z_NEAR, FOCUS_FOV_FRACTION};

#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: DVec3,
    /// Degrees, CCW positive.
    pub rotation: f64,
    pub zoom: f64,
    viewport: DVec2,
    projection_matrix: DMat4,
    view_matrix: DMat4,
    view_projection_matrix: DMat4,
    inverse_view_projection: DMat4,
}

/// Serializable camera pose.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraRecord {
    pub position: [f64; 3],
    pub rotation: f64,
    pub zoom: f64,
}

impl Camera {
    pub fn new(width: f64, height: f64) -> Self {
        let mut camera = Self {
            position: DVec3::ZERO,
            rotation: 0.0,
            zoom: 1.0,
            viewport: DVec2::new(width, height),
            projection_matrix: DMat4::IDENTITY,
            view_matrix: DMat4::IDENTITY,
            view_projection_matrix: DMat4::IDENTITY,
            inverse_view_projection: DMat4::IDENTITY,
        };
        camera.set_projection_matrix(width, height);
        camera
    }

    pub fn viewport(&self) -> DVec2 {
        self.viewport
    }

    pub fn projection_matrix(&self) -> DMat4 {
        self.projection_matrix
    }

    pub fn view_matrix(&self) -> DMat4 {
        self.view_matrix
    }

    pub fn view_projection_matrix(&self) -> DMat4 {
        self.view_projection_matrix
    }

    /// Orthographic projection for a `width x height` pixel viewport.
    pub fn set_projection_matrix(&mut self, width: f64, height: f64) {
        self.viewport = DVec2::new(width, height);
        self.projection_matrix = DMat4::orthographic_rh_gl(
            -width * 0.5,
            width * 0.5,
            -height * 0.5,
            height * 0.5,
            CAMERA_Z_NEAR,
            CAMERA_Z_FAR,
        );
        self.on_update();
    }

    /// Rebuild view and view-projection matrices from position/rotation/zoom.
    pub fn on_update(&mut self) {
        debug_assert!(self.zoom != 0.0, "camera zoom must be non-zero");
        self.view_matrix = DMat4::from_scale(DVec3::new(self.zoom, self.zoom, 1.0))
            * DMat4::from_rotation_z(self.rotation.to_radians())
            * DMat4::from_translation(self.position);
        self.view_projection_matrix = self.projection_matrix * self.view_matrix;
        self.inverse_view_projection = self.view_projection_matrix.inverse();
    }

    /// Screen pixel (origin top-left, Y down) -> world point.
    pub fn cursor_to_world_position(&self, cursor: DVec2) -> DVec2 {
        let ndc = space::cursor_to_ndc(cursor, self.viewport);
        self.inverse_view_projection
            .project_point3(ndc.extend(0.0))
            .truncate()
    }

    /// World point -> screen pixel. Inverse of [`Camera::cursor_to_world_position`].
    pub fn world_to_screen_position(&self, world: DVec2) -> DVec2 {
        let ndc = self.view_projection_matrix.project_point3(world.extend(0.0)).truncate();
        space::ndc_to_cursor(ndc, self.viewport)
    }

    /// World point shown at the viewport centre.
    pub fn center(&self) -> DVec2 {
        -self.position.truncate()
    }

    /// Centre on `world` without touching zoom or rotation.
    pub fn look_at(&mut self, world: DVec2) {
        self.position = (-world).extend(self.position.z);
        self.on_update();
    }

    /// Centre on a frame and zoom so its largest dimension fills
    /// `FOCUS_FOV_FRACTION` of the smaller viewport dimension.
    pub fn focus_on_frame(&mut self, frame: &ClemFrame) {
        let t = frame.transform.translation_vec();
        self.position = (-t).extend(self.position.z);
        let extent = frame.world_extent();
        if extent > 0.0 {
            let fov = self.viewport.min_element() * FOCUS_FOV_FRACTION;
            self.zoom = (fov / extent).clamp(CAMERA_MIN_ZOOM, CAMERA_MAX_ZOOM);
        }
        self.on_update();
        log::debug!("Camera focus on '{}': zoom {:.4}", frame.title, self.zoom);
    }

    /// Multiply zoom, keeping the world point under `anchor` (screen px) fixed.
    pub fn zoom_by(&mut self, factor: f64, anchor: DVec2) {
        let before = self.cursor_to_world_position(anchor);
        self.zoom = (self.zoom * factor).clamp(CAMERA_MIN_ZOOM, CAMERA_MAX_ZOOM);
        self.on_update();
        let after = self.cursor_to_world_position(anchor);
        self.position += (after - before).extend(0.0);
        self.on_update();
    }

    /// Drag the view by `delta` screen pixels (content follows the cursor).
    pub fn pan(&mut self, delta: DVec2) {
        let from = self.cursor_to_world_position(DVec2::ZERO);
        let to = self.cursor_to_world_position(delta);
        self.position += (to - from).extend(0.0);
        self.on_update();
    }

    /// Rotate the view by `degrees`, keeping `pivot` (world) at the same screen position.
    pub fn rotate_about(&mut self, pivot: DVec2, degrees: f64) {
        let shifted = pivot + self.position.truncate();
        let rotated = DVec2::from_angle(-degrees.to_radians()).rotate(shifted);
        self.position = (rotated - pivot).extend(self.position.z);
        self.rotation += degrees;
        self.on_update();
    }

    pub fn world_units_per_pixel(&self) -> f64 {
        1.0 / self.zoom
    }

    pub fn record(&self) -> CameraRecord {
        CameraRecord { position: self.position.to_array(), rotation: self.rotation, zoom: self.zoom }
    }

    pub fn from_record(record: CameraRecord, width: f64, height: f64) -> Self {
        let mut camera = Self::new(width, height);
        camera.position = DVec3::from_array(record.position);
        camera.rotation = record.rotation;
        camera.zoom = record.zoom.clamp(CAMERA_MIN_ZOOM, CAMERA_MAX_ZOOM);
        camera.on_update();
        camera
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: DVec2, b: DVec2, eps: f64) {
        assert!((a - b).length() < eps, "{:?} != {:?}", a, b);
    }

    fn camera(position: DVec3, rotation: f64, zoom: f64) -> Camera {
        let mut c = Camera::new(800.0, 600.0);
        c.position = position;
        c.rotation = rotation;
        c.zoom = zoom;
        c.on_update();
        c
    }

    #[test]
    fn test_cursor_world_roundtrip() {
        let cams = [
            camera(DVec3::ZERO, 0.0, 1.0),
            camera(DVec3::new(123.0, -45.0, 0.0), 30.0, 0.37),
            camera(DVec3::new(-5e4, 2e4, 0.0), -110.0, 0.004),
            camera(DVec3::new(1.0, 1.0, 0.0), 359.0, 250.0),
        ];
        for cam in &cams {
            for &(x, y) in &[(0.0, 0.0), (400.0, 300.0), (799.0, 1.0), (12.5, 587.25)] {
                let p = DVec2::new(x, y);
                let back = cam.world_to_screen_position(cam.cursor_to_world_position(p));
                assert_close(back, p, 1e-6);
            }
        }
    }

    #[test]
    fn test_center_maps_to_negated_position() {
        let cam = camera(DVec3::new(100.0, -20.0, 0.0), 45.0, 2.0);
        assert_close(cam.cursor_to_world_position(DVec2::new(400.0, 300.0)), DVec2::new(-100.0, 20.0), 1e-9);
        // One screen pixel to the right is 1/zoom world units away.
        let a = cam.cursor_to_world_position(DVec2::new(400.0, 300.0));
        let b = cam.cursor_to_world_position(DVec2::new(401.0, 300.0));
        assert!(((a - b).length() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_screen_y_points_down() {
        let cam = camera(DVec3::ZERO, 0.0, 1.0);
        let top = cam.cursor_to_world_position(DVec2::new(400.0, 0.0));
        assert_close(top, DVec2::new(0.0, 300.0), 1e-9);
    }

    #[test]
    fn test_zoom_by_keeps_anchor() {
        let mut cam = camera(DVec3::new(10.0, 10.0, 0.0), 20.0, 1.5);
        let anchor = DVec2::new(130.0, 470.0);
        let before = cam.cursor_to_world_position(anchor);
        cam.zoom_by(3.0, anchor);
        assert!((cam.zoom - 4.5).abs() < 1e-12);
        assert_close(cam.cursor_to_world_position(anchor), before, 1e-9);
    }

    #[test]
    fn test_pan_moves_content_with_cursor() {
        let mut cam = camera(DVec3::ZERO, 60.0, 0.8);
        let grab = DVec2::new(200.0, 200.0);
        let world = cam.cursor_to_world_position(grab);
        cam.pan(DVec2::new(35.0, -12.0));
        assert_close(cam.world_to_screen_position(world), DVec2::new(235.0, 188.0), 1e-9);
    }

    #[test]
    fn test_rotate_about_keeps_pivot_on_screen() {
        let mut cam = camera(DVec3::new(-30.0, 5.0, 0.0), 10.0, 1.25);
        let pivot = DVec2::new(70.0, -40.0);
        let screen = cam.world_to_screen_position(pivot);
        cam.rotate_about(pivot, 33.0);
        assert_close(cam.world_to_screen_position(pivot), screen, 1e-9);
        assert_eq!(cam.rotation, 43.0);
    }

    #[test]
    fn test_focus_on_frame() {
        let mut frame = ClemFrame::new("f", 100, 50, vec![0.0; 5000], 10.0).unwrap();
        frame.transform.translation = [300.0, -200.0];
        let mut cam = Camera::new(800.0, 600.0);
        cam.focus_on_frame(&frame);
        assert_close(cam.center(), DVec2::new(300.0, -200.0), 1e-9);
        // 1000 nm wide frame fills 0.8 * 600 px.
        assert!((cam.zoom - 600.0 * FOCUS_FOV_FRACTION / 1000.0).abs() < 1e-12);
    }

    #[test]
    fn test_record_roundtrip() {
        let cam = camera(DVec3::new(1.0, 2.0, 0.0), 15.0, 3.0);
        let restored = Camera::from_record(cam.record(), 800.0, 600.0);
        assert_eq!(restored, cam);
    }
}
