pub mod extractor;
pub mod location;
pub mod product;

pub use extractor::ProductExtractor;
pub use location::parse_location;
pub use product::{Fingerprint, ProductRecord};
