//! Image engine: captured frames, calibrated templates, template matching and
//! field extraction.

mod image;
pub use image::*;
mod rect;
pub use rect::*;
mod frame;
pub use frame::*;
pub mod template;
pub use template::{FieldKind, Template, TemplateRole, TemplateScope, TemplateSet};
mod matcher;
pub use matcher::*;
mod extract;
pub use extract::*;
mod ocr;
pub use ocr::*;
