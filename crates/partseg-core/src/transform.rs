//! Whole-image transforms applied before segmentation.

use serde::{Deserialize, Serialize};

use crate::types::Image;

/// Trait for image transforms.
pub trait ImageTransform {
    /// Produce the transformed image; the input is left untouched.
    fn transform(&self, image: &Image) -> Image;
}

/// Selects an image transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ImageTransformKind {
    /// Exchange the time and z axes.
    #[default]
    SwapTimeStack,
}

impl ImageTransform for ImageTransformKind {
    fn transform(&self, image: &Image) -> Image {
        match *self {
            Self::SwapTimeStack => image.swap_time_and_stack(),
        }
    }
}

impl ImageTransformKind {
    /// User-facing name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SwapTimeStack => "Swap time and Z dim",
        }
    }
}
