use scene::antimeridian::AntimeridianHelper;
use scene::view_state::ViewState;

use crate::frame::RenderFrame;

/// What a drawable sees of the current frame.
#[derive(Debug, Clone, Copy)]
pub struct DrawContext<'a> {
    pub view: &'a ViewState,
    pub antimeridian: &'a AntimeridianHelper,
}

/// Something the render thread draws each frame.
pub trait Drawable: Send {
    fn draw(&self, ctx: &DrawContext<'_>, frame: &mut RenderFrame);

    /// Frees any resources. Called on the render thread; the drawable is not
    /// drawn again afterwards.
    fn release(&mut self) {}

    fn as_resolvable(&self) -> Option<&dyn Resolvable> {
        None
    }
}

/// Progress of a drawable that loads its content in the background.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResolutionState {
    Unresolved,
    Resolving,
    Resolved,
    /// Loading failed for good; retrying will not help.
    Unresolvable,
    Suspended,
}

impl ResolutionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ResolutionState::Resolved | ResolutionState::Unresolvable)
    }
}

pub trait Resolvable {
    fn state(&self) -> ResolutionState;
    fn suspend(&self);
    fn resume(&self);
}

/// Folds child states into the state a parent reports once its own work is
/// done. Any child still loading keeps the parent resolving; terminal children
/// count as resolved, so one failed child does not fail the parent.
pub fn fold_child_states<'a>(
    children: impl IntoIterator<Item = &'a dyn Resolvable>,
) -> ResolutionState {
    for child in children {
        if matches!(
            child.state(),
            ResolutionState::Unresolved | ResolutionState::Resolving
        ) {
            return ResolutionState::Resolving;
        }
    }
    ResolutionState::Resolved
}
