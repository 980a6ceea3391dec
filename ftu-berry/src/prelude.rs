//! 🍇欢迎光临🍓
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::Idx2d;

pub use crate::data::{ImgWriteRaw, ImgWriteVis, MaskSlice, MaskSliceMut, OwnedMask};

pub use crate::consts::gray::{MASK_BACKGROUND, MASK_FOREGROUND};
pub use crate::consts::{keys, layer, HIER_SEP};

pub use crate::coord::{map_to_pixel, pixel_to_map, Scale, SlideFrame};

pub use crate::property::{Properties, PropertyValue};

pub use crate::store::{GeometryStore, IngestReport, RawElement, Structure, StructureRef};

pub use crate::query::{find, LayerSelection, QueryRegion};

pub use crate::aggregate::{
    aggregate, aggregate_by_layer, aggregate_region, AggregateError, AggregationResult,
};

pub use crate::segment::{
    crop_structure_mask, sub_segment_image, SegmentationParam, SegmenterOptions,
    SubCompartmentSegmenter, SubCompartments, ViewMode, DEFAULT_PARAMS,
};

pub use crate::session::{SessionError, SharedSlideSession, SlideSession};
