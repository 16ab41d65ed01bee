//! Interactive region selection.
//!
//! The on-screen overlay only reports input edges (press, move, release,
//! escape); all selection state lives in [`SelectionMachine`].

use crate::types::Rect;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Input edge reported by the selection overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SelectionInput {
    PointerDown { x: i32, y: i32 },
    PointerMove { x: i32, y: i32 },
    PointerUp { x: i32, y: i32 },
    Escape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    /// Overlay shown, waiting for a press
    Idle,
    Selecting { start: (i32, i32) },
    Done(Rect),
    Cancelled,
}

/// What the overlay should do after an input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionEffect {
    Ignored,
    /// Redraw the live selection box
    Draw(Rect),
    Completed(Rect),
    Cancelled,
}

pub struct SelectionMachine {
    state: SelectionState,
    min_size: u32,
}

impl SelectionMachine {
    pub fn new(min_size: u32) -> Self {
        Self {
            state: SelectionState::Idle,
            min_size,
        }
    }

    pub fn state(&self) -> SelectionState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, SelectionState::Done(_) | SelectionState::Cancelled)
    }

    /// Apply one input edge
    pub fn handle(&mut self, input: SelectionInput) -> SelectionEffect {
        let (next, effect) = match (self.state, input) {
            (SelectionState::Done(_) | SelectionState::Cancelled, _) => {
                return SelectionEffect::Ignored;
            }
            (_, SelectionInput::Escape) => (SelectionState::Cancelled, SelectionEffect::Cancelled),
            (_, SelectionInput::PointerDown { x, y }) => (
                SelectionState::Selecting { start: (x, y) },
                SelectionEffect::Draw(Rect::new(x, y, 0, 0)),
            ),
            (SelectionState::Selecting { start }, SelectionInput::PointerMove { x, y }) => (
                self.state,
                SelectionEffect::Draw(Rect::from_corners(start, (x, y))),
            ),
            (SelectionState::Selecting { start }, SelectionInput::PointerUp { x, y }) => {
                let rect = Rect::from_corners(start, (x, y));
                if rect.exceeds(self.min_size) {
                    (SelectionState::Done(rect), SelectionEffect::Completed(rect))
                } else {
                    debug!("Discarding {} selection as an accidental click", rect.size_label());
                    (SelectionState::Cancelled, SelectionEffect::Cancelled)
                }
            }
            (SelectionState::Idle, _) => (SelectionState::Idle, SelectionEffect::Ignored),
        };

        trace!("Selection {:?} --{:?}--> {:?}", self.state, input, next);
        self.state = next;
        effect
    }
}

/// Selection overlay collaborator
#[async_trait::async_trait]
pub trait SelectionUi: Send + Sync {
    /// Show the overlay and crosshair cursor
    async fn begin(&self);

    /// Next input edge; `None` when the overlay went away
    async fn next_input(&self) -> Option<SelectionInput>;

    /// Draw the live selection box
    async fn draw(&self, rect: Rect);

    /// Remove the overlay, box and listeners
    async fn cleanup(&self);
}

/// Run a selection to completion, returning the rectangle if one was chosen
///
/// The overlay is left up on success so the caller can clean it up after
/// the user has seen the final box.
pub async fn run_selection(ui: &dyn SelectionUi, min_size: u32) -> Option<Rect> {
    let mut machine = SelectionMachine::new(min_size);
    ui.begin().await;

    loop {
        let Some(input) = ui.next_input().await else {
            debug!("Selection overlay closed");
            ui.cleanup().await;
            return None;
        };

        match machine.handle(input) {
            SelectionEffect::Ignored => {}
            SelectionEffect::Draw(rect) => ui.draw(rect).await,
            SelectionEffect::Completed(rect) => {
                ui.draw(rect).await;
                return Some(rect);
            }
            SelectionEffect::Cancelled => {
                ui.cleanup().await;
                return None;
            }
        }
    }
}
