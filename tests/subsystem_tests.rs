mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use common::{ScriptedService, prediction, rect_mask};
use living_select::{
    AutoSegmentOptions, Button, FOREGROUND, HIGHLIGHT, InferenceService, MaskImage, MaskPrediction,
    PointerEvent, Prompt, Resolution, SegmentationError, SegmentationSubsystem, SubsystemConfig,
};

const IMAGE: Resolution = Resolution::new(1920, 1080);
const MODEL: Resolution = Resolution::new(256, 256);

fn config(window: Resolution, pixel_scaling: bool) -> SubsystemConfig {
    SubsystemConfig { window, pixel_scaling, ..Default::default() }
}

fn start(service: ScriptedService, pixel_scaling: bool) -> SegmentationSubsystem {
    let mut subsystem = SegmentationSubsystem::new(service, &config(IMAGE, pixel_scaling)).unwrap();
    assert_eq!(subsystem.load_image("photo.jpg").unwrap(), IMAGE);
    subsystem
}

fn press(button: Button, x: f64, y: f64) -> PointerEvent {
    PointerEvent::Press { button, modifier: true, x, y }
}

fn selected(subsystem: &SegmentationSubsystem) -> usize {
    subsystem.wait_idle().unwrap();
    subsystem.selected_objects_mask().selected
}

#[test]
fn test_point_request_merges_full_mask_with_click_tag() {
    let service = ScriptedService::new(MODEL, IMAGE);
    let prompts = service.prompts.clone();
    let mut subsystem = start(service, false);

    subsystem.pointer(press(Button::Primary, 100.0, 100.0));
    assert_eq!(selected(&subsystem), 1920 * 1080);
    assert_eq!(subsystem.pending_requests(), 0);

    let prompt = prompts.lock()[0].clone();
    assert_eq!(prompt.points.len(), 1);
    assert!(prompt.negative_points.is_empty());
    assert!((prompt.points[0].x - 100.0 * 256.0 / 1920.0).abs() < 1e-3);
    assert!((prompt.points[0].y - 100.0 * 256.0 / 1080.0).abs() < 1e-3);

    // every pixel carries the (100, 100) tag, so one region removal empties it
    subsystem.pointer(press(Button::Secondary, 1500.0, 900.0));
    assert_eq!(selected(&subsystem), 0);
}

#[test]
fn test_brush_add_then_remove_restores_count() {
    let mut subsystem = start(ScriptedService::new(MODEL, IMAGE), true);
    subsystem.pointer(press(Button::Primary, 10.0, 10.0));
    subsystem.pointer(PointerEvent::Release { button: Button::Primary });
    let before = selected(&subsystem);
    assert_eq!(before, 9);

    subsystem.pointer(press(Button::Primary, 50.0, 50.0));
    subsystem.pointer(PointerEvent::Release { button: Button::Primary });
    assert_eq!(selected(&subsystem), before + 9);

    subsystem.pointer(press(Button::Secondary, 50.0, 50.0));
    subsystem.pointer(PointerEvent::Release { button: Button::Secondary });
    assert_eq!(selected(&subsystem), before);
}

#[test]
fn test_brush_stroke_follows_moves_and_exports_highlight() {
    let mut subsystem = start(ScriptedService::new(MODEL, IMAGE), true);
    subsystem.pointer(press(Button::Primary, 20.0, 20.0));
    subsystem.pointer(PointerEvent::Move { x: 23.0, y: 20.0 });
    subsystem.pointer(PointerEvent::Release { button: Button::Primary });
    subsystem.pointer(PointerEvent::Move { x: 200.0, y: 200.0 });
    assert_eq!(selected(&subsystem), 2 * 9);

    let mask = subsystem.selected_objects_mask();
    assert_eq!(mask.resolution, IMAGE);
    assert_eq!(mask.data.len(), 1920 * 1080);
    assert_eq!(mask.data[20 + 1920 * 20], HIGHLIGHT);
    assert_eq!(mask.data[24 + 1920 * 21], HIGHLIGHT);
    assert_eq!(mask.data[25 + 1920 * 20], 0);
    assert_eq!(mask.data[200 + 1920 * 200], 0);

    // the whole stroke shares its anchor tag
    subsystem.set_pixel_scaling(false);
    subsystem.pointer(press(Button::Secondary, 24.0, 19.0));
    assert_eq!(selected(&subsystem), 0);
}

#[test]
fn test_requests_are_fifo_and_first_writer_keeps_overlap() {
    let service = ScriptedService::new(MODEL, IMAGE)
        .then(prediction(rect_mask(MODEL, 0, 0, 128, 256)))
        .then(prediction(rect_mask(MODEL, 64, 0, 256, 256)));
    let mut subsystem = start(service, false);
    subsystem.pointer(press(Button::Primary, 10.0, 10.0));
    subsystem.pointer(press(Button::Primary, 1900.0, 10.0));
    assert_eq!(selected(&subsystem), 1920 * 1080);

    // the overlap belongs to the first click, so removing through it leaves
    // only the second mask's exclusive part
    subsystem.pointer(press(Button::Secondary, 600.0, 500.0));
    assert_eq!(selected(&subsystem), 960 * 1080);
}

#[test]
fn test_failed_and_empty_inference_are_dropped() {
    let service = ScriptedService::new(MODEL, IMAGE)
        .then(Err(SegmentationError::Inference("decoder exploded".to_string())))
        .then(prediction(MaskImage::new(MODEL)))
        .then(prediction(rect_mask(MODEL, 0, 0, 128, 128)));
    let prompts = service.prompts.clone();
    let mut subsystem = start(service, false);
    for x in [10.0, 20.0, 30.0] {
        subsystem.pointer(press(Button::Primary, x, 10.0));
    }
    assert_eq!(selected(&subsystem), 960 * 540);
    assert_eq!(prompts.lock().len(), 3);
    assert_eq!(subsystem.pending_requests(), 0);
}

#[test]
fn test_dirty_flag_tracks_content_not_cardinality() {
    let mut subsystem = start(ScriptedService::new(MODEL, IMAGE), true);
    subsystem.wait_idle().unwrap();
    let _ = subsystem.selected_object_size_changed();
    assert!(!subsystem.selected_object_size_changed());

    subsystem.pointer(press(Button::Primary, 100.0, 100.0));
    subsystem.pointer(PointerEvent::Release { button: Button::Primary });
    subsystem.wait_idle().unwrap();
    assert!(subsystem.selected_object_size_changed());
    assert!(!subsystem.selected_object_size_changed());

    // erase the stroke and paint one of equal size elsewhere
    subsystem.pointer(press(Button::Secondary, 100.0, 100.0));
    subsystem.pointer(PointerEvent::Release { button: Button::Secondary });
    subsystem.pointer(press(Button::Primary, 500.0, 500.0));
    subsystem.pointer(PointerEvent::Release { button: Button::Primary });
    assert_eq!(selected(&subsystem), 9);
    assert!(subsystem.selected_object_size_changed());
}

#[test]
fn test_window_scaling_applies_to_input() {
    let mut subsystem = start(ScriptedService::new(MODEL, IMAGE), true);
    subsystem.change_window_resolution(960, 540);
    subsystem.pointer(press(Button::Primary, 480.0, 270.0));
    subsystem.pointer(PointerEvent::Release { button: Button::Primary });
    subsystem.wait_idle().unwrap();
    let mask = subsystem.selected_objects_mask();
    assert_eq!(mask.data[960 + 1920 * 540], HIGHLIGHT);
}

#[test]
fn test_input_without_modifier_never_mutates() {
    let mut subsystem = start(ScriptedService::new(MODEL, IMAGE), false);
    subsystem.pointer(PointerEvent::Press { button: Button::Primary, modifier: false, x: 5.0, y: 5.0 });
    assert_eq!(selected(&subsystem), 0);
    assert_eq!(subsystem.pending_requests(), 0);
}

#[test]
fn test_remove_all_and_reload_clear_selection() {
    let mut subsystem = start(ScriptedService::new(MODEL, IMAGE), false);
    subsystem.pointer(press(Button::Primary, 5.0, 5.0));
    assert_eq!(selected(&subsystem), 1920 * 1080);
    subsystem.remove_all_positions();
    assert_eq!(selected(&subsystem), 0);

    subsystem.pointer(press(Button::Primary, 5.0, 5.0));
    assert_eq!(selected(&subsystem), 1920 * 1080);
    subsystem.load_image("other.jpg").unwrap();
    assert_eq!(selected(&subsystem), 0);
    assert!(subsystem.is_image_loaded());
}

#[test]
fn test_image_load_failure_is_reported_and_disables_input() {
    let mut subsystem =
        SegmentationSubsystem::new(ScriptedService::new(MODEL, IMAGE), &config(IMAGE, false)).unwrap();
    assert!(!subsystem.is_image_loaded());
    let err = subsystem.load_image("missing.jpg").unwrap_err();
    assert!(matches!(err, SegmentationError::ImageLoad(_)));
    assert!(!subsystem.is_image_loaded());

    subsystem.pointer(press(Button::Primary, 5.0, 5.0));
    assert_eq!(selected(&subsystem), 0);
    assert_eq!(subsystem.selected_objects_mask().data.len(), 0);
}

#[test]
fn test_auto_segment_runs_on_worker_and_merges() {
    let mut subsystem = start(ScriptedService::new(MODEL, IMAGE), false);
    let options = AutoSegmentOptions { points_per_side: 2, iou_threshold: 0.5, min_area: 1 };
    let added = subsystem.auto_segment(options).unwrap();
    assert_eq!(added, 1920 * 1080);
    subsystem.pointer(press(Button::Secondary, 0.0, 0.0));
    assert_eq!(selected(&subsystem), 0);
}

#[test]
fn test_oversized_auto_segment_grid_is_rejected_and_worker_survives() {
    let mut subsystem = start(ScriptedService::new(MODEL, IMAGE), false);
    let options = AutoSegmentOptions { points_per_side: 70_000, ..Default::default() };
    let err = subsystem.auto_segment(options).unwrap_err();
    assert!(matches!(err, SegmentationError::InvalidConfig(_)));

    assert_eq!(subsystem.load_image("photo.jpg").unwrap(), IMAGE);
    subsystem.pointer(press(Button::Primary, 10.0, 10.0));
    assert_eq!(selected(&subsystem), 1920 * 1080);
}

/// Panics on the first decoder call, answers with a full mask afterwards.
struct FlakyService {
    calls: usize,
}

impl InferenceService for FlakyService {
    fn input_size(&self) -> Resolution {
        MODEL
    }

    fn load_image(&mut self, _path: &std::path::Path) -> Result<Resolution, SegmentationError> {
        Ok(IMAGE)
    }

    fn get_mask(&mut self, _prompt: &Prompt) -> Result<MaskPrediction, SegmentationError> {
        self.calls += 1;
        if self.calls == 1 {
            panic!("decoder output `masks` not found");
        }
        Ok(MaskPrediction { mask: MaskImage::filled(MODEL, FOREGROUND), iou: None })
    }
}

#[test]
fn test_backend_panic_drops_only_that_request() {
    let mut subsystem =
        SegmentationSubsystem::new(FlakyService { calls: 0 }, &config(IMAGE, false)).unwrap();
    subsystem.load_image("photo.jpg").unwrap();
    subsystem.pointer(press(Button::Primary, 10.0, 10.0));
    assert_eq!(selected(&subsystem), 0);
    assert_eq!(subsystem.pending_requests(), 0);

    subsystem.pointer(press(Button::Primary, 20.0, 20.0));
    assert_eq!(selected(&subsystem), 1920 * 1080);
    // the survivor carries the second click's tag
    subsystem.pointer(press(Button::Secondary, 10.0, 10.0));
    assert_eq!(selected(&subsystem), 0);
}

#[test]
fn test_model_init_rejects_empty_input_size() {
    let service = ScriptedService::new(Resolution::new(0, 0), IMAGE);
    let err = SegmentationSubsystem::new(service, &SubsystemConfig::default()).err();
    assert!(matches!(err, Some(SegmentationError::ModelInit(_))));
}

/// Counts how many decoder calls actually ran.
struct SlowService {
    calls: Arc<AtomicUsize>,
}

impl InferenceService for SlowService {
    fn input_size(&self) -> Resolution {
        MODEL
    }

    fn load_image(&mut self, _path: &std::path::Path) -> Result<Resolution, SegmentationError> {
        Ok(IMAGE)
    }

    fn get_mask(&mut self, _prompt: &Prompt) -> Result<MaskPrediction, SegmentationError> {
        std::thread::sleep(Duration::from_millis(300));
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(MaskPrediction { mask: MaskImage::new(MODEL), iou: None })
    }
}

#[test]
fn test_teardown_waits_for_in_flight_request_and_skips_the_rest() {
    let calls = Arc::new(AtomicUsize::new(0));
    let service = SlowService { calls: calls.clone() };
    let mut subsystem = SegmentationSubsystem::new(service, &config(IMAGE, false)).unwrap();
    subsystem.load_image("photo.jpg").unwrap();
    for x in [1.0, 2.0, 3.0, 4.0] {
        subsystem.pointer(press(Button::Primary, x, 1.0));
    }
    let started = Instant::now();
    drop(subsystem);
    assert!(calls.load(Ordering::SeqCst) <= 1);
    assert!(started.elapsed() < Duration::from_millis(900));
}
