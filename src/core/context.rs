//! Application context: the single owner of editor/graph session state.
//!
//! Holds the node graph, the correlation editor, the shared error log,
//! background tasks and the current focus (active node, active editor).
//! Front-ends drive it with [`AppContext::tick`] once per frame/update.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use uuid::Uuid;

use super::error_log::{ErrorLog, Notification};
use super::tasks::{TaskHandle, TaskQueue, TaskReport, TaskOutcome};
use super::workers::{self, Workers};
use crate::config::Settings;
use crate::editor::CorrelationEditor;
use crate::editor::export::{TileGrid, WorldRect, render_tiled_with};
use crate::editor::renderer::{ParticleLayer, RenderLayer};
use crate::entities::camera::Camera;
use crate::entities::clem_frame::ClemFrame;
use crate::entities::graph::NodeGraph;
use crate::entities::node::Node;
use crate::entities::project::ProjectFile;

/// Default editor viewport until a front-end reports its size.
const DEFAULT_VIEWPORT: (f64, f64) = (1280.0, 720.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveEditor {
    #[default]
    NodeEditor,
    CorrelationEditor,
}

pub struct AppContext {
    pub settings: Settings,
    pub graph: NodeGraph,
    pub editor: CorrelationEditor,
    pub tasks: TaskQueue,
    errors: ErrorLog,
    workers: Workers,
    active_node: Option<Uuid>,
    active_editor: ActiveEditor,
}

impl AppContext {
    pub fn new(settings: Settings) -> Result<Self> {
        let errors = ErrorLog::new(settings.error_log_capacity);
        let workers = Workers::from_settings(&settings)?;
        Ok(Self {
            graph: NodeGraph::new(errors.clone()),
            editor: CorrelationEditor::new(DEFAULT_VIEWPORT.0, DEFAULT_VIEWPORT.1),
            tasks: TaskQueue::new(errors.clone()),
            errors,
            workers,
            settings,
            active_node: None,
            active_editor: ActiveEditor::default(),
        })
    }

    /// Per-update housekeeping: graph dirty flags, gizmos, finished tasks.
    pub fn tick(&mut self) -> Vec<TaskReport> {
        self.graph.on_update();
        self.editor.on_update();
        if self.active_node.is_some_and(|id| self.graph.node(id).is_none()) {
            self.active_node = None;
        }
        let reports = self.tasks.poll();
        for r in &reports {
            if r.outcome == TaskOutcome::Finished {
                self.errors.info(format!("Task '{}' finished", r.name));
            }
        }
        reports
    }

    // === Focus ===

    pub fn active_node(&self) -> Option<Uuid> {
        self.active_node
    }

    pub fn set_active_node(&mut self, id: Option<Uuid>) {
        self.active_node = id.filter(|id| self.graph.node(*id).is_some());
    }

    pub fn active_editor(&self) -> ActiveEditor {
        self.active_editor
    }

    pub fn set_active_editor(&mut self, editor: ActiveEditor) {
        self.active_editor = editor;
    }

    // === Notifications ===

    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }

    pub fn last_error(&self) -> Option<Notification> {
        self.errors.last_error()
    }

    pub fn drain_notifications(&self) -> Vec<Notification> {
        self.errors.drain()
    }

    // === Graph <-> editor ===

    /// Evaluate `node` once and place its output in the correlation editor.
    pub fn send_to_editor(&mut self, node: Uuid, idx: Option<usize>) -> Result<Uuid> {
        let title = self
            .graph
            .node(node)
            .map(|n| n.title())
            .ok_or_else(|| anyhow!("Node {} not found", node))?;
        let frame = self
            .graph
            .try_get_image(node, idx)?
            .ok_or_else(|| anyhow!("'{}' produced no output", title))?;
        let clem = ClemFrame::from_frame(title, &frame)?;
        Ok(self.editor.add_frame(clem))
    }

    /// Collect a reconstruction node's particles and add them as a splat layer.
    pub fn send_particles_to_editor(&mut self, node: Uuid) -> Result<usize> {
        let recon = self
            .graph
            .node(node)
            .and_then(|n| n.as_reconstruction())
            .ok_or_else(|| anyhow!("Node {} is not a reconstruction node", node))?;
        let pixel_size = recon.params().get_float_or(crate::entities::keys::P_OUTPUT_PIXEL_SIZE, 10.0);
        let loc = self.graph.evaluate_with(|ctx| recon.collect(ctx))?;
        let layer = ParticleLayer::new(recon.title(), &loc.particles, pixel_size)
            .ok_or_else(|| anyhow!("No particles to show"))?;
        let n = layer.particle_count();
        self.editor.add_particle_layer(layer);
        Ok(n)
    }

    // === Export ===

    /// Write every frame of `node` as TIFF into `dir` using the worker pool.
    pub fn export_node(&self, node: Uuid, dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
        workers::export_dataset(&self.graph, node, dir, prefix, &self.workers, None)
    }

    /// Render the editor scene to a PNG on a background task.
    pub fn spawn_scene_export(&mut self, path: PathBuf, pixel_size: f64) -> Result<TaskHandle> {
        let frames: Vec<ClemFrame> = self.editor.frames().cloned().collect();
        let particles: Vec<ParticleLayer> = self.editor.particle_layers().to_vec();
        if frames.is_empty() && particles.is_empty() {
            bail!("Nothing to export");
        }
        let tile_size = self.settings.tile_size;

        self.tasks.spawn("scene-export", move |handle| {
            let layers: Vec<RenderLayer> = frames
                .iter()
                .map(RenderLayer::from_frame)
                .chain(particles.iter().map(RenderLayer::from_particles))
                .collect();
            let rect = WorldRect::of_layers(&layers).context("All layers are hidden")?;
            let grid = TileGrid::new(rect, pixel_size, tile_size)?;
            let Some(raster) = render_tiled_with(&layers, &grid, |p| handle.set_progress(p), || handle.stop_requested())
            else {
                return Ok(());
            };
            raster.save_png(&path)
        })
    }

    // === Persistence ===

    pub fn save_project(&self, path: &Path) -> Result<()> {
        ProjectFile::capture(&self.graph, self.editor.frames(), Some(&self.editor.camera)).to_json(path)
    }

    /// Replace graph and editor contents with a saved project.
    pub fn load_project(&mut self, path: &Path) -> Result<()> {
        let file = ProjectFile::from_json(path)?;
        let graph = file
            .restore_graph(self.errors.clone())
            .with_context(|| format!("Failed to load project {}", path.display()))?;

        let vp = self.editor.camera.viewport();
        let mut editor = CorrelationEditor::new(vp.x, vp.y);
        for frame in file.frames {
            editor.add_frame(frame);
        }
        editor.set_active(None);
        if let Some(record) = file.camera {
            editor.camera = Camera::from_record(record, vp.x, vp.y);
        }

        self.graph = graph;
        self.editor = editor;
        self.active_node = None;
        log::info!("Loaded project {} ({} nodes)", path.display(), self.graph.len());
        Ok(())
    }
}
