// Bookgen Infrastructure - External Adapters
// Implements: ContentGenerator (hosted model API), BookExporter (filesystem)

pub mod fs_exporter;
pub mod http_generator;
pub mod pacer;

pub use fs_exporter::FsBookExporter;
pub use http_generator::{HttpContentGenerator, HttpGeneratorConfig};
pub use pacer::RequestPacer;
