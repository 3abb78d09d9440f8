use std::ffi::{CStr, c_char, c_int};
use std::path::Path;
use tracing::subscriber::set_global_default;
use crate::logger::{FfiSubscriber, LoggerCallback, LOGGER_CALLBACK};

pub mod config;
pub mod coords;
pub mod error;
pub mod inference;
pub mod input;
pub mod mask;
pub mod processing;
pub mod selection;
pub mod subsystem;
pub mod worker;
mod logger;
#[cfg(feature = "onnx")]
pub mod runner;

pub use config::{ExecutionProvider, ModelConfig, SubsystemConfig};
pub use coords::{Position, Resolution, to_image_space, to_model_space};
pub use error::SegmentationError;
pub use inference::{AutoSegmentOptions, InferenceService, MaskPrediction, Point, Prompt, Roi};
pub use input::{Action, Button, InputRouter, PointerEvent, RouterState};
pub use mask::{FOREGROUND, MaskImage};
pub use selection::{BRUSH_FOOTPRINT, HIGHLIGHT, RegionTag, SelectionStore};
pub use subsystem::SegmentationSubsystem;
pub use worker::MaskSnapshot;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CreateSubsystemError {
    None = 0,
    PathMissingOrInvalid = 1,
    InvalidConfig = 2,
    ModelLoadingError = 3,
    WorkerStartError = 4,
    UnknownError = 5,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SubsystemCallError {
    None = 0,
    NoSubsystem = 1,
    InvalidInput = 2,
    ImageLoadError = 3,
    InferenceError = 4,
    WorkerGone = 5,
    BufferTooSmall = 6,
    UnknownError = 7,
}

impl From<&SegmentationError> for CreateSubsystemError {
    fn from(err: &SegmentationError) -> Self {
        match err {
            SegmentationError::InvalidConfig(_) => CreateSubsystemError::InvalidConfig,
            SegmentationError::ModelInit(_) => CreateSubsystemError::ModelLoadingError,
            SegmentationError::Spawn(_) => CreateSubsystemError::WorkerStartError,
            _ => CreateSubsystemError::UnknownError,
        }
    }
}

impl From<&SegmentationError> for SubsystemCallError {
    fn from(err: &SegmentationError) -> Self {
        match err {
            SegmentationError::ImageLoad(_) => SubsystemCallError::ImageLoadError,
            SegmentationError::Inference(_) => SubsystemCallError::InferenceError,
            SegmentationError::WorkerGone => SubsystemCallError::WorkerGone,
            _ => SubsystemCallError::UnknownError,
        }
    }
}

#[repr(C)]
pub struct SubsystemOpaque(*mut SegmentationSubsystem);

/// Pointer buttons as passed across the C boundary.
pub const BUTTON_PRIMARY: c_int = 0;
pub const BUTTON_SECONDARY: c_int = 1;

fn button_from_code(button: c_int) -> Button {
    match button {
        BUTTON_PRIMARY => Button::Primary,
        BUTTON_SECONDARY => Button::Secondary,
        _ => Button::Other,
    }
}

unsafe fn path_from_ptr<'a>(path: *const c_char) -> Option<&'a Path> {
    if path.is_null() {
        return None;
    }
    unsafe { CStr::from_ptr(path) }.to_str().ok().map(Path::new)
}

unsafe fn subsystem_mut<'a>(handle: *mut SubsystemOpaque) -> Option<&'a mut SegmentationSubsystem> {
    if handle.is_null() {
        return None;
    }
    unsafe {
        let inner = (*handle).0;
        if inner.is_null() { None } else { Some(&mut *inner) }
    }
}

/// Builds the ONNX Segment-Anything backend and starts the worker thread.
///
/// `config_path` may be null to use defaults; `encoder_path`/`decoder_path`
/// override the configured weights when non-null.
#[cfg(feature = "onnx")]
#[unsafe(no_mangle)]
pub extern "C" fn create_subsystem(
    config_path: *const c_char,
    encoder_path: *const c_char,
    decoder_path: *const c_char,
    out_subsystem: *mut *mut SubsystemOpaque,
) -> CreateSubsystemError {
    if out_subsystem.is_null() {
        return CreateSubsystemError::PathMissingOrInvalid;
    }

    let mut config = if config_path.is_null() {
        SubsystemConfig::default()
    } else {
        let Some(path) = (unsafe { path_from_ptr(config_path) }) else {
            return CreateSubsystemError::PathMissingOrInvalid;
        };
        match SubsystemConfig::from_file(path) {
            Ok(config) => config,
            Err(err) => {
                tracing::error!("{}", err);
                return CreateSubsystemError::InvalidConfig;
            }
        }
    };
    for (ptr, slot) in [
        (encoder_path, &mut config.model.encoder_path),
        (decoder_path, &mut config.model.decoder_path),
    ] {
        if ptr.is_null() {
            continue;
        }
        match unsafe { path_from_ptr(ptr) } {
            Some(path) => *slot = path.to_path_buf(),
            None => return CreateSubsystemError::PathMissingOrInvalid,
        }
    }

    let subsystem = runner::SamRunner::new(&config.model)
        .and_then(|runner| SegmentationSubsystem::new(runner, &config));
    match subsystem {
        Ok(subsystem) => {
            let subsystem_ptr = Box::into_raw(Box::new(subsystem));
            unsafe {
                *out_subsystem = Box::into_raw(Box::new(SubsystemOpaque(subsystem_ptr)));
            }
            tracing::info!("Subsystem created: {:?}", subsystem_ptr);
            CreateSubsystemError::None
        }
        Err(err) => {
            tracing::error!("{}", err);
            CreateSubsystemError::from(&err)
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn destroy_subsystem(subsystem: *mut SubsystemOpaque) {
    if !subsystem.is_null() {
        unsafe {
            let opaque = Box::from_raw(subsystem);
            if !opaque.0.is_null() {
                drop(Box::from_raw(opaque.0));
            }
        }
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn load_image(
    subsystem: *mut SubsystemOpaque,
    path: *const c_char,
    out_width: *mut u32,
    out_height: *mut u32,
) -> SubsystemCallError {
    let Some(subsystem) = (unsafe { subsystem_mut(subsystem) }) else {
        return SubsystemCallError::NoSubsystem;
    };
    let Some(path) = (unsafe { path_from_ptr(path) }) else {
        return SubsystemCallError::InvalidInput;
    };
    match subsystem.load_image(path) {
        Ok(resolution) => {
            unsafe {
                if !out_width.is_null() {
                    *out_width = resolution.width;
                }
                if !out_height.is_null() {
                    *out_height = resolution.height;
                }
            }
            SubsystemCallError::None
        }
        Err(err) => SubsystemCallError::from(&err),
    }
}

#[unsafe(no_mangle)]
pub extern "C" fn pointer_pressed(
    subsystem: *mut SubsystemOpaque,
    button: c_int,
    modifier: bool,
    x: f64,
    y: f64,
) -> SubsystemCallError {
    let Some(subsystem) = (unsafe { subsystem_mut(subsystem) }) else {
        return SubsystemCallError::NoSubsystem;
    };
    subsystem.pointer(PointerEvent::Press { button: button_from_code(button), modifier, x, y });
    SubsystemCallError::None
}

#[unsafe(no_mangle)]
pub extern "C" fn pointer_released(subsystem: *mut SubsystemOpaque, button: c_int) -> SubsystemCallError {
    let Some(subsystem) = (unsafe { subsystem_mut(subsystem) }) else {
        return SubsystemCallError::NoSubsystem;
    };
    subsystem.pointer(PointerEvent::Release { button: button_from_code(button) });
    SubsystemCallError::None
}

#[unsafe(no_mangle)]
pub extern "C" fn pointer_moved(subsystem: *mut SubsystemOpaque, x: f64, y: f64) -> SubsystemCallError {
    let Some(subsystem) = (unsafe { subsystem_mut(subsystem) }) else {
        return SubsystemCallError::NoSubsystem;
    };
    subsystem.pointer(PointerEvent::Move { x, y });
    SubsystemCallError::None
}

#[unsafe(no_mangle)]
pub extern "C" fn set_pixel_scaling(subsystem: *mut SubsystemOpaque, enabled: bool) -> SubsystemCallError {
    let Some(subsystem) = (unsafe { subsystem_mut(subsystem) }) else {
        return SubsystemCallError::NoSubsystem;
    };
    subsystem.set_pixel_scaling(enabled);
    SubsystemCallError::None
}

#[unsafe(no_mangle)]
pub extern "C" fn change_window_resolution(
    subsystem: *mut SubsystemOpaque,
    width: u32,
    height: u32,
) -> SubsystemCallError {
    let Some(subsystem) = (unsafe { subsystem_mut(subsystem) }) else {
        return SubsystemCallError::NoSubsystem;
    };
    subsystem.change_window_resolution(width, height);
    SubsystemCallError::None
}

#[unsafe(no_mangle)]
pub extern "C" fn remove_all_positions(subsystem: *mut SubsystemOpaque) -> SubsystemCallError {
    let Some(subsystem) = (unsafe { subsystem_mut(subsystem) }) else {
        return SubsystemCallError::NoSubsystem;
    };
    subsystem.remove_all_positions();
    SubsystemCallError::None
}

#[unsafe(no_mangle)]
pub extern "C" fn is_image_loaded(subsystem: *mut SubsystemOpaque) -> bool {
    unsafe { subsystem_mut(subsystem) }.is_some_and(|s| s.is_image_loaded())
}

#[unsafe(no_mangle)]
pub extern "C" fn selected_object_size_changed(subsystem: *mut SubsystemOpaque) -> bool {
    unsafe { subsystem_mut(subsystem) }.is_some_and(|s| s.selected_object_size_changed())
}

/// Copies the current selection mask into `out_buffer` (`width * height`
/// bytes, row-major). Sizes are always written so a caller can retry.
#[unsafe(no_mangle)]
pub extern "C" fn get_selected_objects_mask(
    subsystem: *mut SubsystemOpaque,
    out_buffer: *mut u8,
    buffer_len: usize,
    out_width: *mut u32,
    out_height: *mut u32,
) -> SubsystemCallError {
    let Some(subsystem) = (unsafe { subsystem_mut(subsystem) }) else {
        return SubsystemCallError::NoSubsystem;
    };
    let snapshot = subsystem.selected_objects_mask();
    unsafe {
        if !out_width.is_null() {
            *out_width = snapshot.resolution.width;
        }
        if !out_height.is_null() {
            *out_height = snapshot.resolution.height;
        }
    }
    if snapshot.data.is_empty() {
        return SubsystemCallError::None;
    }
    if out_buffer.is_null() {
        return SubsystemCallError::InvalidInput;
    }
    if buffer_len < snapshot.data.len() {
        return SubsystemCallError::BufferTooSmall;
    }
    let out = unsafe { std::slice::from_raw_parts_mut(out_buffer, snapshot.data.len()) };
    out.copy_from_slice(&snapshot.data);
    SubsystemCallError::None
}

#[unsafe(no_mangle)]
pub extern "C" fn init_logger(callback: LoggerCallback, max_level: c_int) -> c_int {
    // Store the callback
    {
        let mut cb_guard = match LOGGER_CALLBACK.lock() {
            Ok(guard) => guard,
            Err(_) => {
                eprintln!("Failed to lock callback mutex");
                return -1;
            }
        };
        *cb_guard = Some(callback);
    }

    // Set the global subscriber
    match set_global_default(FfiSubscriber::new(max_level)) {
        Ok(_) => {
            tracing::info!("Tracing initialized successfully");
            0
        }
        Err(e) => {
            eprintln!("Failed to set tracing subscriber: {}", e);
            -1
        }
    }
}
