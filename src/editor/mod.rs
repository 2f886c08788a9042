//! Correlation editor: world-placed frames, camera, gizmos and mouse interaction.
//!
//! The editor owns its frames in draw order (first = bottom). One frame can
//! be active; the active frame gets four Scale gizmos, four Rotate gizmos
//! and a Pivot gizmo, rebuilt on every [`CorrelationEditor::on_update`].
//!
//! # Interaction
//!
//! ```text
//! Idle --press on gizmo--> DraggingGizmo --release--> Idle
//! Idle --press on frame--> DraggingFrame --release--> Idle
//! Idle --ctrl+press------> DraggingGizmo(Location) --release--> Idle
//! ```
//!
//! Drags act on the frame and all of its descendants:
//! - Pivot/Location gizmo: translate the marker
//! - Rotate gizmo: signed angle change about the pivot
//! - Scale gizmo: distance ratio about the pivot
//! - frame body: translate

pub mod compositor;
pub mod export;
pub mod gizmo;
pub mod renderer;

use anyhow::{Result, bail};
use glam::DVec2;
use indexmap::IndexMap;
use uuid::Uuid;

use crate::entities::camera::Camera;
use crate::entities::clem_frame::ClemFrame;
use crate::entities::transform::Transform;
use gizmo::{EditorGizmo, GizmoType};
use renderer::{Framebuffer, ParticleLayer, RenderLayer};

/// Keyboard modifiers held during a mouse press.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    /// Drop the location marker at the cursor instead of picking a frame.
    pub ctrl: bool,
}

/// Mouse interaction state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Interaction {
    #[default]
    Idle,
    DraggingGizmo { index: usize, last_world: DVec2 },
    DraggingFrame { id: Uuid, last_world: DVec2 },
}

#[derive(Debug)]
pub struct CorrelationEditor {
    pub camera: Camera,
    frames: IndexMap<Uuid, ClemFrame>,
    particle_layers: Vec<ParticleLayer>,
    active: Option<Uuid>,
    gizmos: Vec<EditorGizmo>,
    location: Option<EditorGizmo>,
    interaction: Interaction,
}

impl CorrelationEditor {
    pub fn new(viewport_width: f64, viewport_height: f64) -> Self {
        Self {
            camera: Camera::new(viewport_width, viewport_height),
            frames: IndexMap::new(),
            particle_layers: Vec::new(),
            active: None,
            gizmos: Vec::new(),
            location: None,
            interaction: Interaction::Idle,
        }
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.camera.set_projection_matrix(width, height);
        self.camera.on_update();
        self.on_update();
    }

    // === Frames ===

    /// Add a frame on top and make it active.
    pub fn add_frame(&mut self, frame: ClemFrame) -> Uuid {
        let id = frame.id;
        log::info!("Editor: added frame '{}' ({}x{})", frame.title, frame.width(), frame.height());
        self.frames.insert(id, frame);
        self.active = Some(id);
        self.on_update();
        id
    }

    /// Remove a frame; its children become roots.
    pub fn remove_frame(&mut self, id: Uuid) -> Option<ClemFrame> {
        let frame = self.frames.shift_remove(&id)?;
        if let Some(parent) = frame.parent.and_then(|p| self.frames.get_mut(&p)) {
            parent.children.retain(|c| *c != id);
        }
        for child in &frame.children {
            if let Some(c) = self.frames.get_mut(child) {
                c.parent = None;
            }
        }
        if self.active == Some(id) {
            self.active = None;
        }
        self.interaction = Interaction::Idle;
        self.on_update();
        Some(frame)
    }

    pub fn frame(&self, id: Uuid) -> Option<&ClemFrame> {
        self.frames.get(&id)
    }

    /// Mutable access; gizmos are rebuilt on the next `on_update`.
    pub fn frame_mut(&mut self, id: Uuid) -> Option<&mut ClemFrame> {
        self.frames.get_mut(&id)
    }

    pub fn frames(&self) -> impl Iterator<Item = &ClemFrame> {
        self.frames.values()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Move a frame one step up (`true`) or down in draw order.
    pub fn reorder(&mut self, id: Uuid, up: bool) {
        let Some(idx) = self.frames.get_index_of(&id) else { return };
        let target = if up { idx + 1 } else { idx.wrapping_sub(1) };
        if target < self.frames.len() {
            self.frames.swap_indices(idx, target);
        }
    }

    pub fn active_frame(&self) -> Option<&ClemFrame> {
        self.active.and_then(|id| self.frames.get(&id))
    }

    pub fn active_id(&self) -> Option<Uuid> {
        self.active
    }

    pub fn set_active(&mut self, id: Option<Uuid>) {
        self.active = id.filter(|id| self.frames.contains_key(id));
        self.on_update();
    }

    /// Parent `child` under `parent` (or detach with `None`).
    pub fn set_parent(&mut self, child: Uuid, parent: Option<Uuid>) -> Result<()> {
        if !self.frames.contains_key(&child) {
            bail!("Frame {} not found", child);
        }
        if let Some(p) = parent {
            if !self.frames.contains_key(&p) {
                bail!("Parent frame {} not found", p);
            }
            if p == child || self.subtree(child).contains(&p) {
                bail!("Cannot parent a frame under its own descendant");
            }
        }
        let old = self.frames.get(&child).and_then(|f| f.parent);
        if let Some(old) = old.and_then(|o| self.frames.get_mut(&o)) {
            old.children.retain(|c| *c != child);
        }
        if let Some(p) = parent.and_then(|p| self.frames.get_mut(&p)) {
            p.children.push(child);
        }
        if let Some(c) = self.frames.get_mut(&child) {
            c.parent = parent;
        }
        Ok(())
    }

    /// `id` followed by all of its descendants.
    pub fn subtree(&self, id: Uuid) -> Vec<Uuid> {
        let mut out = vec![id];
        let mut i = 0;
        while i < out.len() {
            if let Some(f) = self.frames.get(&out[i]) {
                for c in &f.children {
                    if !out.contains(c) {
                        out.push(*c);
                    }
                }
            }
            i += 1;
        }
        out
    }

    /// Transform taking `a` to `b`: `b.transform - a.transform`.
    pub fn relative_transform(&self, a: Uuid, b: Uuid) -> Option<Transform> {
        Some(self.frames.get(&b)?.transform - self.frames.get(&a)?.transform)
    }

    // === Transform ops (frame and descendants) ===

    pub fn translate(&mut self, id: Uuid, delta: DVec2) {
        for fid in self.subtree(id) {
            if let Some(f) = self.frames.get_mut(&fid) {
                f.translate(delta);
            }
        }
    }

    pub fn rotate(&mut self, id: Uuid, center: DVec2, degrees: f64) {
        for fid in self.subtree(id) {
            if let Some(f) = self.frames.get_mut(&fid) {
                f.rotate_about(center, degrees);
            }
        }
    }

    pub fn scale(&mut self, id: Uuid, center: DVec2, factor: f64) {
        for fid in self.subtree(id) {
            if let Some(f) = self.frames.get_mut(&fid) {
                f.scale_about(center, factor);
            }
        }
    }

    // === Particles ===

    pub fn add_particle_layer(&mut self, layer: ParticleLayer) {
        log::info!("Editor: added particle layer '{}' ({} particles)", layer.title, layer.particle_count());
        self.particle_layers.push(layer);
    }

    pub fn particle_layers(&self) -> &[ParticleLayer] {
        &self.particle_layers
    }

    /// Everything drawable, bottom first: frames then particle layers.
    pub fn render_layers(&self) -> Vec<RenderLayer<'_>> {
        self.frames
            .values()
            .map(RenderLayer::from_frame)
            .chain(self.particle_layers.iter().map(RenderLayer::from_particles))
            .collect()
    }

    /// Draw the current view into a viewport-sized framebuffer.
    pub fn render(&self) -> Framebuffer {
        let vp = self.camera.viewport();
        let mut fb = Framebuffer::new(vp.x.max(0.0) as usize, vp.y.max(0.0) as usize);
        renderer::render_layers(&self.camera, &self.render_layers(), &mut fb);
        fb
    }

    // === Gizmos ===

    pub fn gizmos(&self) -> &[EditorGizmo] {
        &self.gizmos
    }

    pub fn set_location(&mut self, world: Option<DVec2>) {
        self.location = world.map(EditorGizmo::location);
        self.on_update();
    }

    pub fn location(&self) -> Option<DVec2> {
        self.location.as_ref().map(EditorGizmo::position)
    }

    /// Rebuild gizmos for the active frame at the current zoom.
    pub fn on_update(&mut self) {
        self.gizmos.clear();
        if let Some(frame) = self.active.and_then(|id| self.frames.get(&id)) {
            for ty in [GizmoType::Scale, GizmoType::Rotate] {
                for corner in 0..4 {
                    let mut g = EditorGizmo::new(ty, corner);
                    g.update(frame, &self.camera);
                    g.hide = frame.locked || frame.hide;
                    self.gizmos.push(g);
                }
            }
            let mut pivot = EditorGizmo::new(GizmoType::Pivot, 0);
            pivot.update(frame, &self.camera);
            pivot.hide = frame.locked || frame.hide;
            self.gizmos.push(pivot);
        }
        if let Some(loc) = &mut self.location {
            loc.update_zoom(&self.camera);
            self.gizmos.push(loc.clone());
        }
    }

    // === Picking & mouse ===

    /// Topmost visible frame under a world point.
    pub fn pick_frame(&self, world: DVec2) -> Option<Uuid> {
        self.frames.values().rev().find(|f| !f.hide && f.contains(world)).map(|f| f.id)
    }

    /// Topmost gizmo under a world point; the pivot wins over corner handles.
    fn pick_gizmo(&self, world: DVec2) -> Option<usize> {
        self.gizmos.iter().enumerate().rev().find(|(_, g)| g.hit(world)).map(|(i, _)| i)
    }

    pub fn interaction(&self) -> Interaction {
        self.interaction
    }

    /// Mouse down at a cursor position (screen px). Returns true if something was grabbed.
    pub fn mouse_press(&mut self, cursor: DVec2) -> bool {
        self.mouse_press_with(cursor, Modifiers::default())
    }

    /// [`CorrelationEditor::mouse_press`] with modifiers. Gizmos are rebuilt
    /// for the current camera before the hit test.
    pub fn mouse_press_with(&mut self, cursor: DVec2, modifiers: Modifiers) -> bool {
        self.on_update();
        let world = self.camera.cursor_to_world_position(cursor);
        if let Some(index) = self.pick_gizmo(world) {
            log::debug!("Editor: grabbed {:?} gizmo", self.gizmos[index].gizmo_type);
            self.interaction = Interaction::DraggingGizmo { index, last_world: world };
            return true;
        }
        if modifiers.ctrl {
            self.set_location(Some(world));
            let index = self.gizmos.iter().rposition(|g| g.gizmo_type == GizmoType::Location);
            self.interaction = match index {
                Some(index) => Interaction::DraggingGizmo { index, last_world: world },
                None => Interaction::Idle,
            };
            log::debug!("Editor: location marker at ({:.1}, {:.1})", world.x, world.y);
            return index.is_some();
        }
        match self.pick_frame(world) {
            Some(id) => {
                self.active = Some(id);
                let locked = self.frames.get(&id).is_some_and(|f| f.locked);
                self.interaction = if locked {
                    Interaction::Idle
                } else {
                    Interaction::DraggingFrame { id, last_world: world }
                };
                self.on_update();
                !locked
            }
            None => {
                self.active = None;
                self.interaction = Interaction::Idle;
                self.on_update();
                false
            }
        }
    }

    /// Mouse move with the button held.
    pub fn mouse_drag(&mut self, cursor: DVec2) {
        let world = self.camera.cursor_to_world_position(cursor);
        match self.interaction {
            Interaction::Idle => return,
            Interaction::DraggingFrame { id, last_world } => {
                self.translate(id, world - last_world);
                self.interaction = Interaction::DraggingFrame { id, last_world: world };
            }
            Interaction::DraggingGizmo { index, last_world } => {
                let Some(gizmo_type) = self.gizmos.get(index).map(|g| g.gizmo_type) else {
                    self.interaction = Interaction::Idle;
                    return;
                };
                self.drag_gizmo(gizmo_type, last_world, world);
                self.interaction = Interaction::DraggingGizmo { index, last_world: world };
            }
        }
        self.on_update();
    }

    pub fn mouse_release(&mut self) {
        self.interaction = Interaction::Idle;
    }

    fn drag_gizmo(&mut self, gizmo_type: GizmoType, from: DVec2, to: DVec2) {
        if gizmo_type == GizmoType::Location {
            if let Some(loc) = &mut self.location {
                loc.transform.translate(to - from);
            }
            return;
        }
        let Some(id) = self.active else { return };
        let Some(pivot) = self.frames.get(&id).map(|f| f.pivot_vec()) else { return };
        match gizmo_type {
            GizmoType::Pivot => {
                if let Some(f) = self.frames.get_mut(&id) {
                    f.pivot = (pivot + to - from).to_array();
                }
            }
            GizmoType::Rotate => {
                let (a, b) = (from - pivot, to - pivot);
                let degrees = wrap_degrees((b.y.atan2(b.x) - a.y.atan2(a.x)).to_degrees());
                self.rotate(id, pivot, degrees);
            }
            GizmoType::Scale => {
                let before = (from - pivot).length();
                let after = (to - pivot).length();
                if before > f64::EPSILON && after > f64::EPSILON {
                    self.scale(id, pivot, after / before);
                }
            }
            GizmoType::Location => {}
        }
    }
}

/// Angle wrapped into `(-180, 180]` degrees.
fn wrap_degrees(degrees: f64) -> f64 {
    -((180.0 - degrees).rem_euclid(360.0) - 180.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: DVec2, b: DVec2) {
        assert!((a - b).length() < 1e-6, "{:?} != {:?}", a, b);
    }

    fn square(title: &str, px: usize) -> ClemFrame {
        ClemFrame::new(title, px, px, vec![1.0; px * px], 1.0).unwrap()
    }

    fn editor() -> CorrelationEditor {
        // zoom 1, world origin at the viewport centre
        CorrelationEditor::new(400.0, 400.0)
    }

    #[test]
    fn test_gizmos_built_for_active_frame() {
        let mut ed = editor();
        ed.add_frame(square("a", 100));
        assert_eq!(ed.gizmos().len(), 9);
        ed.set_active(None);
        assert!(ed.gizmos().is_empty());
    }

    #[test]
    fn test_drag_frame_moves_children() {
        let mut ed = editor();
        let parent = ed.add_frame(square("parent", 100));
        let mut c = square("child", 10);
        c.translate(DVec2::new(120.0, 0.0));
        let child = ed.add_frame(c);
        ed.set_parent(child, Some(parent)).unwrap();

        // screen (200, 200) = world (0, 0), inside parent only
        assert!(ed.mouse_press(DVec2::new(200.0, 200.0)));
        assert_eq!(ed.active_id(), Some(parent));
        ed.mouse_drag(DVec2::new(210.0, 190.0));
        ed.mouse_release();

        assert_eq!(ed.frame(parent).unwrap().transform.translation, [10.0, 10.0]);
        assert_eq!(ed.frame(child).unwrap().transform.translation, [130.0, 10.0]);
        assert_eq!(ed.interaction(), Interaction::Idle);
    }

    #[test]
    fn test_rotate_gizmo_drag() {
        let mut ed = editor();
        let id = ed.add_frame(square("a", 100));
        let g = ed.gizmos().iter().find(|g| g.gizmo_type == GizmoType::Rotate && g.corner == 1).unwrap().clone();
        let start = ed.camera.world_to_screen_position(g.position());
        assert!(ed.mouse_press(start));
        assert!(matches!(ed.interaction(), Interaction::DraggingGizmo { .. }));

        // Swing the handle a quarter turn counter-clockwise around the pivot (origin).
        let p = g.position();
        let target = DVec2::new(-p.y, p.x);
        ed.mouse_drag(ed.camera.world_to_screen_position(target));
        ed.mouse_release();

        let t = ed.frame(id).unwrap().transform;
        assert!((t.rotation - 90.0).abs() < 1e-6);
        assert_close(t.translation_vec(), DVec2::ZERO);
    }

    #[test]
    fn test_scale_gizmo_drag_about_pivot() {
        let mut ed = editor();
        let id = ed.add_frame(square("a", 100));
        let g = ed.gizmos().iter().find(|g| g.gizmo_type == GizmoType::Scale && g.corner == 2).unwrap().clone();
        let p = g.position();
        assert!(ed.mouse_press(ed.camera.world_to_screen_position(p)));
        ed.mouse_drag(ed.camera.world_to_screen_position(p * 2.0));

        let t = ed.frame(id).unwrap().transform;
        assert!((t.scale - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_pivot_drag_moves_only_pivot() {
        let mut ed = editor();
        let id = ed.add_frame(square("a", 100));
        assert!(ed.mouse_press(DVec2::new(200.0, 200.0)));
        assert!(matches!(ed.interaction(), Interaction::DraggingGizmo { .. }));
        ed.mouse_drag(DVec2::new(220.0, 200.0));
        let f = ed.frame(id).unwrap();
        assert_eq!(f.pivot, [20.0, 0.0]);
        assert!(f.transform.is_identity());
    }

    #[test]
    fn test_pick_topmost_and_miss() {
        let mut ed = editor();
        let bottom = ed.add_frame(square("bottom", 100));
        let top = ed.add_frame(square("top", 100));
        assert_eq!(ed.pick_frame(DVec2::new(10.0, 10.0)), Some(top));
        ed.reorder(top, false);
        assert_eq!(ed.pick_frame(DVec2::new(10.0, 10.0)), Some(bottom));
        assert!(!ed.mouse_press(DVec2::new(5.0, 5.0)));
        assert_eq!(ed.active_id(), None);
    }

    #[test]
    fn test_parent_cycle_rejected_and_relative_transform() {
        let mut ed = editor();
        let a = ed.add_frame(square("a", 10));
        let b = ed.add_frame(square("b", 10));
        ed.set_parent(b, Some(a)).unwrap();
        assert!(ed.set_parent(a, Some(b)).is_err());

        ed.frame_mut(b).unwrap().transform = Transform::new([5.0, 5.0], 10.0, 2.0);
        let rel = ed.relative_transform(a, b).unwrap();
        assert_eq!(rel.translation, [5.0, 5.0]);
        assert_eq!(rel.scale, 2.0);

        ed.remove_frame(a);
        assert_eq!(ed.frame(b).unwrap().parent, None);
    }

    #[test]
    fn test_rotate_drag_across_negative_x_axis_is_small() {
        let mut ed = editor();
        let id = ed.add_frame(square("a", 100));
        ed.frame_mut(id).unwrap().transform.rotation = 44.0;
        let polar = |deg: f64| DVec2::from_angle(deg.to_radians()) * 80.0;
        ed.drag_gizmo(GizmoType::Rotate, polar(179.0), polar(-179.0));
        let r = ed.frame(id).unwrap().transform.rotation;
        assert!((r - 46.0).abs() < 1e-9, "rotation {}", r);

        assert_eq!(wrap_degrees(-358.0), 2.0);
        assert_eq!(wrap_degrees(180.0), 180.0);
        assert_eq!(wrap_degrees(-180.0), 180.0);
        assert_eq!(wrap_degrees(190.0), -170.0);
    }

    #[test]
    fn test_press_uses_gizmos_for_current_zoom() {
        let mut ed = editor();
        let id = ed.add_frame(square("a", 100));
        // Zoom without an explicit update: the press must see the new gizmo layout.
        ed.camera.zoom_by(4.0, DVec2::new(200.0, 200.0));
        let mut expected = EditorGizmo::new(GizmoType::Rotate, 1);
        expected.update(ed.frame(id).unwrap(), &ed.camera);

        assert!(ed.mouse_press(ed.camera.world_to_screen_position(expected.position())));
        let Interaction::DraggingGizmo { index, .. } = ed.interaction() else {
            panic!("expected a gizmo drag, got {:?}", ed.interaction());
        };
        assert_eq!(ed.gizmos()[index].gizmo_type, GizmoType::Rotate);
        assert_eq!(ed.gizmos()[index].corner, 1);
    }

    #[test]
    fn test_ctrl_press_places_and_drags_location() {
        let mut ed = editor();
        let id = ed.add_frame(square("a", 100));
        // Over the frame but away from its gizmos.
        let cursor = DVec2::new(180.0, 220.0);
        assert!(ed.mouse_press_with(cursor, Modifiers { ctrl: true }));
        assert_close(ed.location().unwrap(), DVec2::new(-20.0, -20.0));
        ed.mouse_drag(cursor + DVec2::new(5.0, -5.0));
        ed.mouse_release();
        assert_close(ed.location().unwrap(), DVec2::new(-15.0, -15.0));
        // The frame stayed put and active.
        assert!(ed.frame(id).unwrap().transform.is_identity());
        assert_eq!(ed.active_id(), Some(id));

        // A plain press on the marker grabs it again.
        assert!(ed.mouse_press(DVec2::new(185.0, 215.0)));
        let Interaction::DraggingGizmo { index, .. } = ed.interaction() else {
            panic!("expected the location gizmo");
        };
        assert_eq!(ed.gizmos()[index].gizmo_type, GizmoType::Location);
        ed.mouse_drag(DVec2::new(195.0, 215.0));
        assert_close(ed.location().unwrap(), DVec2::new(-5.0, -15.0));
    }
}
