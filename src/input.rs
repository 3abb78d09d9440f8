use crate::coords::{Position, Resolution, to_image_space};
use crate::selection::RegionTag;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Button {
    Primary,
    Secondary,
    Other,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum PointerEvent {
    Press { button: Button, modifier: bool, x: f64, y: f64 },
    Release { button: Button },
    Move { x: f64, y: f64 },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Action {
    /// Run the segmentation network for a click.
    Segment(Position),
    BrushAdd { center: Position, tag: RegionTag },
    BrushRemove(Position),
    /// Drop the whole region the clicked pixel belongs to.
    RemoveRegionAt(Position),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum RouterState {
    #[default]
    Idle,
    /// Painting a stroke; every pixel is tagged with where it started.
    BrushAdding { anchor: Position },
    BrushRemoving,
}

#[derive(Debug)]
pub struct InputRouter {
    state: RouterState,
    pixel_scaling: bool,
    window: Resolution,
    image: Resolution,
}

impl InputRouter {
    pub fn new(window: Resolution, pixel_scaling: bool) -> Self {
        InputRouter {
            state: RouterState::Idle,
            pixel_scaling,
            window,
            image: Resolution::default(),
        }
    }

    pub fn state(&self) -> RouterState {
        self.state
    }

    pub fn pixel_scaling(&self) -> bool {
        self.pixel_scaling
    }

    /// Switching modes abandons any stroke in progress.
    pub fn set_pixel_scaling(&mut self, enabled: bool) {
        if self.pixel_scaling != enabled {
            self.pixel_scaling = enabled;
            self.state = RouterState::Idle;
        }
    }

    pub fn window_resolution(&self) -> Resolution {
        self.window
    }

    pub fn set_window_resolution(&mut self, window: Resolution) {
        self.window = window;
    }

    pub fn set_image_resolution(&mut self, image: Resolution) {
        self.image = image;
        self.state = RouterState::Idle;
    }

    fn locate(&self, x: f64, y: f64) -> Position {
        to_image_space((x, y), self.window, self.image)
    }

    pub fn handle(&mut self, event: PointerEvent) -> Option<Action> {
        if self.image.is_empty() {
            return None;
        }
        match event {
            PointerEvent::Press { modifier: false, .. } => None,
            PointerEvent::Press { button, x, y, .. } => self.press(button, self.locate(x, y)),
            PointerEvent::Release { button } => {
                let releases = matches!(
                    (self.state, button),
                    (RouterState::BrushAdding { .. }, Button::Primary)
                        | (RouterState::BrushRemoving, Button::Secondary)
                );
                if releases {
                    self.state = RouterState::Idle;
                }
                None
            }
            PointerEvent::Move { x, y } => match self.state {
                RouterState::Idle => None,
                RouterState::BrushAdding { anchor } => Some(Action::BrushAdd {
                    center: self.locate(x, y),
                    tag: anchor,
                }),
                RouterState::BrushRemoving => Some(Action::BrushRemove(self.locate(x, y))),
            },
        }
    }

    fn press(&mut self, button: Button, pos: Position) -> Option<Action> {
        if self.state != RouterState::Idle {
            return None;
        }
        match (self.pixel_scaling, button) {
            (true, Button::Primary) => {
                self.state = RouterState::BrushAdding { anchor: pos };
                Some(Action::BrushAdd { center: pos, tag: pos })
            }
            (true, Button::Secondary) => {
                self.state = RouterState::BrushRemoving;
                Some(Action::BrushRemove(pos))
            }
            (false, Button::Primary) => Some(Action::Segment(pos)),
            (false, Button::Secondary) => Some(Action::RemoveRegionAt(pos)),
            (_, Button::Other) => None,
        }
    }
}
