use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, bounded, unbounded};
use tracing::{info, warn};

use crate::config::SubsystemConfig;
use crate::coords::Resolution;
use crate::error::SegmentationError;
use crate::inference::{AutoSegmentOptions, InferenceService};
use crate::input::{Action, InputRouter, PointerEvent};
use crate::worker::{Command, MaskSnapshot, SegmentationWorker, Shared};

/// Interactive object selection over one loaded picture. Lives on the
/// interactive thread; the worker thread owns inference and the selection.
pub struct SegmentationSubsystem {
    router: InputRouter,
    commands: Sender<Command>,
    shared: Arc<Shared>,
    observed: AtomicU64,
    model_resolution: Resolution,
    worker: Option<JoinHandle<()>>,
}

impl SegmentationSubsystem {
    pub fn new<S>(service: S, config: &SubsystemConfig) -> Result<Self, SegmentationError>
    where
        S: InferenceService + 'static,
    {
        config.validate()?;
        let model_resolution = service.input_size();
        if model_resolution.is_empty() {
            return Err(SegmentationError::ModelInit("model input size is empty".to_string()));
        }

        let shared = Arc::new(Shared::default());
        let (commands, queue) = unbounded();
        let worker = SegmentationWorker::new(Box::new(service), shared.clone());
        let handle = thread::Builder::new()
            .name("segmentation-worker".to_string())
            .spawn(move || worker.run(queue))?;

        info!(
            model_width = model_resolution.width,
            model_height = model_resolution.height,
            "Segmentation subsystem started"
        );
        Ok(SegmentationSubsystem {
            router: InputRouter::new(config.window, config.pixel_scaling),
            commands,
            shared,
            observed: AtomicU64::new(0),
            model_resolution,
            worker: Some(handle),
        })
    }

    pub fn model_resolution(&self) -> Resolution {
        self.model_resolution
    }

    pub fn router(&self) -> &InputRouter {
        &self.router
    }

    /// Blocks until the worker has encoded the picture and reset the selection.
    pub fn load_image(&mut self, path: impl AsRef<Path>) -> Result<Resolution, SegmentationError> {
        let (reply, answer) = bounded(1);
        self.send(Command::LoadImage { path: path.as_ref().to_path_buf(), reply })?;
        let result = answer.recv().map_err(|_| SegmentationError::WorkerGone)?;
        self.router.set_image_resolution(result.as_ref().copied().unwrap_or_default());
        result
    }

    pub fn is_image_loaded(&self) -> bool {
        !self.shared.snapshot.read().resolution.is_empty()
    }

    pub fn pointer(&mut self, event: PointerEvent) {
        let Some(action) = self.router.handle(event) else {
            return;
        };
        let segment = matches!(action, Action::Segment(_));
        if segment {
            self.shared.pending.fetch_add(1, Ordering::AcqRel);
        }
        if self.send(Command::Act(action)).is_err() {
            warn!(?action, "Segmentation worker gone, input dropped");
            if segment {
                self.shared.pending.fetch_sub(1, Ordering::AcqRel);
            }
        }
    }

    pub fn pending_requests(&self) -> usize {
        self.shared.pending.load(Ordering::Acquire)
    }

    pub fn set_pixel_scaling(&mut self, enabled: bool) {
        self.router.set_pixel_scaling(enabled);
    }

    pub fn change_window_resolution(&mut self, width: u32, height: u32) {
        self.router.set_window_resolution(Resolution::new(width, height));
    }

    pub fn remove_all_positions(&self) {
        if self.send(Command::Clear).is_err() {
            warn!("Segmentation worker gone, clear dropped");
        }
    }

    /// Runs grid auto-segmentation on the worker and adds the result to the
    /// selection. Returns the number of newly selected pixels.
    pub fn auto_segment(&self, options: AutoSegmentOptions) -> Result<usize, SegmentationError> {
        let (reply, answer) = bounded(1);
        self.send(Command::AutoSegment { options, reply })?;
        answer.recv().map_err(|_| SegmentationError::WorkerGone)?
    }

    /// Blocks until every command queued so far has been applied and published.
    pub fn wait_idle(&self) -> Result<(), SegmentationError> {
        let (reply, answer) = bounded(1);
        self.send(Command::Barrier(reply))?;
        answer.recv().map_err(|_| SegmentationError::WorkerGone)
    }

    /// Whether the published mask changed since the previous call.
    pub fn selected_object_size_changed(&self) -> bool {
        let revision = self.shared.snapshot.read().revision;
        self.observed.swap(revision, Ordering::AcqRel) != revision
    }

    pub fn selected_objects_mask(&self) -> Arc<MaskSnapshot> {
        self.shared.snapshot.read().clone()
    }

    fn send(&self, command: Command) -> Result<(), SegmentationError> {
        self.commands.send(command).map_err(|_| SegmentationError::WorkerGone)
    }
}

impl Drop for SegmentationSubsystem {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("Segmentation worker panicked");
            }
        }
        info!("Segmentation subsystem stopped");
    }
}
