//! Editor gizmos: constant-screen-size handles placed on the active frame.
//!
//! Scale and Rotate gizmos sit just outside the four frame corners, pushed
//! outward along the frame's local diagonal. Their world size is divided by
//! the camera zoom on every update, so they keep the same size on screen at
//! any zoom level. The Pivot gizmo marks the frame pivot; the Location
//! gizmo is a free world-space marker.

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::config::{GIZMO_ICON_HALF_SIZE, GIZMO_MARKER_HALF_SIZE, GIZMO_ROTATE_OFFSET, GIZMO_SCALE_OFFSET};
use crate::entities::camera::Camera;
use crate::entities::clem_frame::ClemFrame;
use crate::entities::space::Quad;
use crate::entities::transform::Transform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GizmoType {
    Scale,
    Rotate,
    Pivot,
    Location,
}

impl GizmoType {
    /// Distance (screen px) from the frame corner, for corner gizmos.
    fn corner_offset(self) -> Option<f64> {
        match self {
            GizmoType::Scale => Some(GIZMO_SCALE_OFFSET),
            GizmoType::Rotate => Some(GIZMO_ROTATE_OFFSET),
            GizmoType::Pivot | GizmoType::Location => None,
        }
    }

    fn half_size(self) -> f64 {
        match self {
            GizmoType::Scale | GizmoType::Rotate => GIZMO_ICON_HALF_SIZE,
            GizmoType::Pivot | GizmoType::Location => GIZMO_MARKER_HALF_SIZE,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EditorGizmo {
    pub gizmo_type: GizmoType,
    /// Frame corner index (TL, TR, BR, BL) for Scale/Rotate.
    pub corner: usize,
    /// World placement: translation is the gizmo centre, rotation follows the frame.
    pub transform: Transform,
    /// Half edge in world units, recomputed from the zoom.
    half_size: f64,
    pub hide: bool,
}

impl EditorGizmo {
    pub fn new(gizmo_type: GizmoType, corner: usize) -> Self {
        Self {
            gizmo_type,
            corner: corner % 4,
            transform: Transform::default(),
            half_size: gizmo_type.half_size(),
            hide: false,
        }
    }

    /// Free marker at a world point.
    pub fn location(world: DVec2) -> Self {
        let mut g = Self::new(GizmoType::Location, 0);
        g.transform.translation = world.to_array();
        g
    }

    pub fn position(&self) -> DVec2 {
        self.transform.translation_vec()
    }

    /// Re-place on `frame` and rescale for the current camera zoom.
    pub fn update(&mut self, frame: &ClemFrame, camera: &Camera) {
        let zoom = camera.zoom;
        match self.gizmo_type.corner_offset() {
            Some(offset) => {
                let corner = frame.local_corners()[self.corner] * frame.transform.scale;
                let outward = corner.normalize_or_zero() * (offset / zoom);
                let world = frame
                    .transform
                    .matrix_no_scale()
                    .transform_point3((corner + outward).extend(0.0))
                    .truncate();
                self.transform.translation = world.to_array();
                self.transform.rotation = frame.transform.rotation;
            }
            None if self.gizmo_type == GizmoType::Pivot => {
                self.transform.translation = frame.pivot;
                self.transform.rotation = frame.transform.rotation;
            }
            None => {}
        }
        self.half_size = self.gizmo_type.half_size() / zoom;
    }

    /// Rescale only (for gizmos not attached to a frame).
    pub fn update_zoom(&mut self, camera: &Camera) {
        self.half_size = self.gizmo_type.half_size() / camera.zoom;
    }

    pub fn half_size(&self) -> f64 {
        self.half_size
    }

    /// Axis aligned icon corners around the gizmo centre: TL, TR, BR, BL.
    pub fn local_corners(&self) -> [DVec2; 4] {
        Quad::square(DVec2::ZERO, self.half_size).corners
    }

    pub fn world_corners(&self) -> [DVec2; 4] {
        let m = self.transform.matrix_no_scale();
        self.local_corners().map(|c| m.transform_point3(c.extend(0.0)).truncate())
    }

    /// Icon outline in world space.
    pub fn quad(&self) -> Quad {
        Quad::new(self.world_corners())
    }

    pub fn hit(&self, world: DVec2) -> bool {
        !self.hide && self.quad().contains(world)
    }

    /// Edge length of the icon on screen, in pixels.
    pub fn screen_size(&self, camera: &Camera) -> f64 {
        let q = self.quad();
        let a = camera.world_to_screen_position(q.corners[0]);
        let b = camera.world_to_screen_position(q.corners[1]);
        (b - a).length()
    }
}
