use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use tracing::{debug, error, info, warn};

use crate::coords::{Position, Resolution, to_model_space};
use crate::error::SegmentationError;
use crate::inference::{AutoSegmentOptions, InferenceService, Prompt, is_blank};
use crate::input::Action;
use crate::selection::SelectionStore;

pub(crate) type Reply<T> = Sender<Result<T, SegmentationError>>;

pub(crate) enum Command {
    Act(Action),
    Clear,
    LoadImage { path: PathBuf, reply: Reply<Resolution> },
    AutoSegment { options: AutoSegmentOptions, reply: Reply<usize> },
    /// Answered once everything queued before it has been applied and published.
    Barrier(Sender<()>),
    Shutdown,
}

/// Exported selection as last published by the worker.
#[derive(Debug, Default)]
pub struct MaskSnapshot {
    /// Bumped on every publish; the renderer re-uploads when it moves.
    pub revision: u64,
    /// Resolution of the loaded image, empty when no image is loaded.
    pub resolution: Resolution,
    /// Row-major `width * height` bytes, see [`crate::selection::HIGHLIGHT`].
    pub data: Vec<u8>,
    pub selected: usize,
}

#[derive(Default)]
pub(crate) struct Shared {
    pub snapshot: RwLock<Arc<MaskSnapshot>>,
    pub shutdown: AtomicBool,
    pub pending: AtomicUsize,
}

pub(crate) struct SegmentationWorker {
    service: Box<dyn InferenceService>,
    store: SelectionStore,
    shared: Arc<Shared>,
    published: Option<(u64, Resolution)>,
    revision: u64,
}

impl SegmentationWorker {
    pub fn new(service: Box<dyn InferenceService>, shared: Arc<Shared>) -> Self {
        SegmentationWorker {
            service,
            store: SelectionStore::default(),
            shared,
            published: None,
            revision: 0,
        }
    }

    pub fn run(mut self, commands: Receiver<Command>) {
        info!("Segmentation worker started");
        while let Ok(command) = commands.recv() {
            if self.shared.shutdown.load(Ordering::Acquire) {
                break;
            }
            if !self.handle(command) {
                break;
            }
            if commands.is_empty() {
                self.publish();
            }
        }
        info!("Segmentation worker stopped");
    }

    /// Applies one command, returns `false` when the loop should end.
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Act(Action::Segment(pos)) => {
                self.segment(pos);
                self.shared.pending.fetch_sub(1, Ordering::AcqRel);
            }
            Command::Act(Action::BrushAdd { center, tag }) => {
                self.store.add_brush(center, tag);
            }
            Command::Act(Action::BrushRemove(center)) => {
                self.store.remove_brush(center);
            }
            Command::Act(Action::RemoveRegionAt(pos)) => {
                let removed = self.store.remove_region_at(pos);
                debug!(x = pos.x, y = pos.y, removed, "Region removed");
            }
            Command::Clear => {
                self.store.clear();
                debug!("Selection cleared");
            }
            Command::LoadImage { path, reply } => {
                let result = self.load_image(path);
                self.publish();
                let _ = reply.send(result);
            }
            Command::AutoSegment { options, reply } => {
                let result = self.auto_segment(&options);
                self.publish();
                let _ = reply.send(result);
            }
            Command::Barrier(reply) => {
                self.publish();
                let _ = reply.send(());
            }
            Command::Shutdown => return false,
        }
        true
    }

    fn load_image(&mut self, path: PathBuf) -> Result<Resolution, SegmentationError> {
        info!("Loading image {}", path.display());
        match self.service.load_image(&path) {
            Ok(resolution) if !resolution.is_empty() => {
                self.store.reset(resolution);
                info!(width = resolution.width, height = resolution.height, "Image loaded");
                Ok(resolution)
            }
            Ok(_) => {
                self.store.reset(Resolution::default());
                Err(SegmentationError::ImageLoad(format!("{} is empty", path.display())))
            }
            Err(err) => {
                self.store.reset(Resolution::default());
                error!(%err, "Image load failed");
                Err(err)
            }
        }
    }

    fn segment(&mut self, pos: Position) {
        let image = self.store.bounds();
        if image.is_empty() {
            warn!(x = pos.x, y = pos.y, "No image loaded, segmentation request dropped");
            return;
        }
        let (mx, my) = to_model_space(pos, image, self.service.input_size());
        let prompt = Prompt::single(mx, my);
        let service = &mut self.service;
        let result = panic::catch_unwind(AssertUnwindSafe(|| service.get_mask(&prompt)))
            .unwrap_or_else(|payload| Err(panicked(payload)));
        match result {
            Ok(prediction) if !is_blank(&prediction.mask) => {
                let added = self.store.merge_mask_result(pos, &prediction.mask);
                debug!(x = pos.x, y = pos.y, added, iou = ?prediction.iou, "Mask merged");
            }
            Ok(_) => warn!(x = pos.x, y = pos.y, "Empty mask, segmentation request dropped"),
            Err(err) => error!(x = pos.x, y = pos.y, %err, "Segmentation request dropped"),
        }
    }

    fn auto_segment(&mut self, options: &AutoSegmentOptions) -> Result<usize, SegmentationError> {
        options.validate()?;
        if self.store.bounds().is_empty() {
            return Err(SegmentationError::ImageLoad("no image loaded".to_string()));
        }
        let service = &mut self.service;
        let mask = panic::catch_unwind(AssertUnwindSafe(|| {
            service.auto_segment(options, &mut |progress: f64| {
                debug!(progress, "Auto segmentation progress");
            })
        }))
        .unwrap_or_else(|payload| Err(panicked(payload)))?;
        Ok(self.store.merge_mask_result(Position::ORIGIN, &mask))
    }

    fn publish(&mut self) {
        let current = (self.store.version(), self.store.bounds());
        if self.published == Some(current) {
            return;
        }
        self.revision += 1;
        let snapshot = MaskSnapshot {
            revision: self.revision,
            resolution: current.1,
            data: self.store.export_mask(current.1),
            selected: self.store.len(),
        };
        *self.shared.snapshot.write() = Arc::new(snapshot);
        self.published = Some(current);
    }
}

/// Turns a backend panic payload into an inference error.
fn panicked(payload: Box<dyn Any + Send>) -> SegmentationError {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    SegmentationError::Inference(format!("inference backend panicked: {message}"))
}
