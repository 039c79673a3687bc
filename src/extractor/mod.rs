pub mod page_extractor;

pub use page_extractor::{ExtractedLink, PageExtractor, PageFacts};
