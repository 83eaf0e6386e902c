//! Render-state bookkeeping for the 2D and composite paths.

pub mod cache;
pub mod style;

pub use cache::{ps_const, StateCache, PS_CONSTANT_REGISTERS, TEXTURE_SLOTS};
pub use style::{blend_for_style, BlendState, RenderStyle, StyleAlpha, StyleOp};
