// Book Exporter Port
// Writes a finalized book somewhere and reports the files it produced

use crate::domain::AssembledBook;
use crate::error::Result;
use async_trait::async_trait;

#[async_trait]
pub trait BookExporter: Send + Sync {
    /// Export the book, returning the written output file paths.
    async fn export(&self, book: &AssembledBook) -> Result<Vec<String>>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::error::AppError;
    use std::sync::Mutex;

    /// Records exported books; optionally fails every export.
    #[derive(Default)]
    pub struct RecordingExporter {
        exported: Mutex<Vec<AssembledBook>>,
        fail: bool,
    }

    impl RecordingExporter {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn failing() -> Self {
            Self {
                fail: true,
                ..Self::default()
            }
        }

        pub fn exported(&self) -> Vec<AssembledBook> {
            self.exported.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BookExporter for RecordingExporter {
        async fn export(&self, book: &AssembledBook) -> Result<Vec<String>> {
            if self.fail {
                return Err(AppError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "output directory is read-only",
                )));
            }
            self.exported.lock().unwrap().push(book.clone());
            Ok(vec![format!("memory://{}/book.json", book.job_id)])
        }
    }
}
