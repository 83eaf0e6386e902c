use crate::device::{Blend, BlendOp};

/// Blend operation requested by the 2D drawer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StyleOp {
    /// No blending: the source replaces the destination.
    #[default]
    None,
    Add,
    Sub,
    RevSub,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum StyleAlpha {
    #[default]
    Zero,
    One,
    Src,
    InvSrc,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct RenderStyle {
    pub op: StyleOp,
    pub src_alpha: StyleAlpha,
    pub dest_alpha: StyleAlpha,
}

impl RenderStyle {
    pub const OPAQUE: RenderStyle = RenderStyle {
        op: StyleOp::None,
        src_alpha: StyleAlpha::One,
        dest_alpha: StyleAlpha::Zero,
    };
    pub const TRANSLUCENT: RenderStyle = RenderStyle {
        op: StyleOp::Add,
        src_alpha: StyleAlpha::Src,
        dest_alpha: StyleAlpha::InvSrc,
    };
    pub const ADDITIVE: RenderStyle = RenderStyle {
        op: StyleOp::Add,
        src_alpha: StyleAlpha::Src,
        dest_alpha: StyleAlpha::One,
    };
    pub const SUBTRACTIVE: RenderStyle = RenderStyle {
        op: StyleOp::RevSub,
        src_alpha: StyleAlpha::Src,
        dest_alpha: StyleAlpha::One,
    };
}

/// Fixed-function blend configuration with blending enabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BlendState {
    pub op: BlendOp,
    pub src: Blend,
    pub dst: Blend,
}

impl BlendState {
    pub const REPLACE: BlendState = BlendState {
        op: BlendOp::Add,
        src: Blend::One,
        dst: Blend::Zero,
    };
}

fn translate_style_alpha(alpha: StyleAlpha) -> Blend {
    match alpha {
        StyleAlpha::Zero => Blend::Zero,
        StyleAlpha::One => Blend::One,
        StyleAlpha::Src => Blend::SrcAlpha,
        StyleAlpha::InvSrc => Blend::InvSrcAlpha,
    }
}

/// Maps a 2D render style onto blend state. `StyleOp::None` becomes an explicit
/// add/one/zero replace so 2D draws never depend on a previous command's blend.
pub fn blend_for_style(style: RenderStyle) -> BlendState {
    let op = match style.op {
        StyleOp::None => return BlendState::REPLACE,
        StyleOp::Add => BlendOp::Add,
        StyleOp::Sub => BlendOp::Subtract,
        StyleOp::RevSub => BlendOp::RevSubtract,
    };
    BlendState {
        op,
        src: translate_style_alpha(style.src_alpha),
        dst: translate_style_alpha(style.dest_alpha),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_op_style_is_replace_regardless_of_alphas() {
        let style = RenderStyle {
            op: StyleOp::None,
            src_alpha: StyleAlpha::InvSrc,
            dest_alpha: StyleAlpha::Src,
        };
        assert_eq!(blend_for_style(style), BlendState::REPLACE);
    }

    #[test]
    fn ops_map_to_device_blend_ops() {
        assert_eq!(
            blend_for_style(RenderStyle::TRANSLUCENT),
            BlendState {
                op: BlendOp::Add,
                src: Blend::SrcAlpha,
                dst: Blend::InvSrcAlpha
            }
        );
        let sub = RenderStyle {
            op: StyleOp::Sub,
            ..RenderStyle::ADDITIVE
        };
        assert_eq!(blend_for_style(sub).op, BlendOp::Subtract);
        assert_eq!(
            blend_for_style(RenderStyle::SUBTRACTIVE).op,
            BlendOp::RevSubtract
        );
    }
}
