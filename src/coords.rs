use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Position {
    pub x: u32,
    pub y: u32,
}

impl Position {
    pub const ORIGIN: Position = Position { x: 0, y: 0 };

    pub const fn new(x: u32, y: u32) -> Self {
        Position { x, y }
    }

    /// Shifts by a signed offset, `None` when the result leaves `bounds`.
    pub fn offset(self, dx: i32, dy: i32, bounds: Resolution) -> Option<Position> {
        let x = self.x.checked_add_signed(dx)?;
        let y = self.y.checked_add_signed(dy)?;
        let moved = Position { x, y };
        bounds.contains(moved).then_some(moved)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const fn new(width: u32, height: u32) -> Self {
        Resolution { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn contains(&self, pos: Position) -> bool {
        pos.x < self.width && pos.y < self.height
    }

    /// Row-major index of `pos`, `x + width * y`.
    pub fn index_of(&self, pos: Position) -> Option<usize> {
        self.contains(pos)
            .then(|| pos.x as usize + self.width as usize * pos.y as usize)
    }
}

/// Maps a window-space pointer location to the image cell beneath it.
///
/// The pointer may sit outside the window (dragging past the border), so the
/// result is clamped into `[0, image)` on both axes.
pub fn to_image_space(window_pos: (f64, f64), window: Resolution, image: Resolution) -> Position {
    if window.is_empty() || image.is_empty() {
        return Position::ORIGIN;
    }
    let scale = |v: f64, from: u32, to: u32| -> u32 {
        let scaled = (v * to as f64 / from as f64).floor();
        if !scaled.is_finite() || scaled <= 0.0 {
            0
        } else {
            (scaled as u64).min(to as u64 - 1) as u32
        }
    };
    Position {
        x: scale(window_pos.0, window.width, image.width),
        y: scale(window_pos.1, window.height, image.height),
    }
}

/// Maps an image cell to the inference input, stretching both axes.
pub fn to_model_space(image_pos: Position, image: Resolution, model: Resolution) -> (f32, f32) {
    if image.is_empty() || model.is_empty() {
        return (0.0, 0.0);
    }
    (
        image_pos.x as f32 * model.width as f32 / image.width as f32,
        image_pos.y as f32 * model.height as f32 / image.height as f32,
    )
}
