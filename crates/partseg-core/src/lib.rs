//! partseg-core: threshold and flow segmentation of 3-D microscopy volumes
//! (sans-IO).
//!
//! Segments one channel of one time frame of an [`Image`] into labelled
//! components through:
//! noise removal -> exclusion -> binarisation -> hole closing ->
//! component labeling -> size cutoff -> (sprawl) -> border smoothing ->
//! convex fill -> exclusion merge.
//!
//! A [`SegmentationPipeline`] chains several runs, each confined to the mask
//! built from the one before.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! `ndarray` arrays and returns new arrays. Running an engine on a worker
//! thread lives in `partseg-worker`.
//!
//! ```rust
//! # use partseg_core::{
//! #     Image, SegmentationAlgorithm, SegmentationError, SegmentationInput, Spacing,
//! # };
//! # fn run(volume: ndarray::Array3<f32>) -> Result<(), SegmentationError> {
//! let image = Image::from_volume(volume, Spacing::new(1.0, 0.5, 0.5)?)?;
//! let algorithm = SegmentationAlgorithm::default();
//! let result = algorithm.run(&SegmentationInput::new(&image), &mut |phase, step| {
//!     log::info!("{step}: {phase}");
//! })?;
//! println!("{}", result.diagnostics.report());
//! # Ok(())
//! # }
//! ```

pub mod algorithm;
pub mod chain;
pub mod convex;
pub mod cutoff;
pub mod diagnostics;
pub mod flow;
pub mod label;
pub mod mask;
pub mod morphology;
pub mod noise;
mod pipeline;
pub mod schema;
pub mod smoothing;
pub mod spacing;
pub mod sprawl;
pub mod threshold;
pub mod transform;
pub mod types;

pub use algorithm::{
    ComponentOptions, FlowParameters, PreviewParameters, SegmentationAlgorithm, SegmentationInput,
    ThresholdParameters,
};
pub use chain::{HistoryElement, PipelineResult, PipelineStep, SegmentationPipeline};
pub use diagnostics::{SegmentationDiagnostics, StageDiagnostics, StageMetrics};
pub use flow::FlowDirection;
pub use label::{Components, Connectivity};
pub use mask::{MaskProperty, calculate_mask};
pub use noise::{NoiseRemoval, NoiseRemovalKind};
pub use smoothing::{BorderSmoothing, BorderSmoothingKind, NeighType};
pub use sprawl::{SprawlKind, SprawlStrategy};
pub use threshold::Binarization;
pub use transform::{ImageTransform, ImageTransformKind};
pub use types::{
    Image, Labels, Mask, RadiusType, SegmentationError, SegmentationResult, Spacing, Volume,
};
