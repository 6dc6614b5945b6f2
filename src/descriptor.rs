//! Stream descriptors and the store a session loads them into.

use std::sync::Arc;

use serde::Serialize;

use crate::error::{CheckError, Result};

/// One playlist entry to validate.
///
/// The URL is cleaned on construction and the descriptor is immutable after
/// that, so it can be shared freely between probe tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamDescriptor {
    display_name: String,
    raw_metadata_line: Option<String>,
    url: String,
}

impl StreamDescriptor {
    /// Build a descriptor, stripping control and non-printable characters
    /// from `url`.
    ///
    /// An empty `display_name` falls back to the cleaned URL.
    pub fn new(
        display_name: impl Into<String>,
        raw_metadata_line: Option<String>,
        url: &str,
    ) -> Result<Self> {
        let url = clean_url(url);
        if url.is_empty() {
            return Err(CheckError::EmptyUrl);
        }

        let mut display_name = display_name.into().trim().to_string();
        if display_name.is_empty() {
            display_name.clone_from(&url);
        }

        Ok(Self {
            display_name,
            raw_metadata_line: raw_metadata_line.filter(|m| !m.trim().is_empty()),
            url,
        })
    }

    /// Descriptor for a bare URL with no metadata.
    pub fn from_url(url: &str) -> Result<Self> {
        Self::new(String::new(), None, url)
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// The `#EXTINF` line as it appeared in the playlist, if any.
    pub fn raw_metadata_line(&self) -> Option<&str> {
        self.raw_metadata_line.as_deref()
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Metadata line written to the output partitions.
    ///
    /// Entries without metadata get a minimal `#EXTINF` so the partition files
    /// stay loadable by players.
    pub fn metadata_or_placeholder(&self) -> String {
        match &self.raw_metadata_line {
            Some(line) => line.clone(),
            None => format!("#EXTINF:-1,{}", self.display_name),
        }
    }
}

/// Remove NUL bytes and anything outside printable ASCII, then trim.
pub fn clean_url(raw: &str) -> String {
    raw.chars()
        .filter(|c| (' '..='~').contains(c))
        .collect::<String>()
        .trim()
        .to_string()
}

/// Ordered collection of descriptors for the next run.
#[derive(Debug, Default, Clone)]
pub struct DescriptorStore {
    descriptors: Arc<[StreamDescriptor]>,
}

impl DescriptorStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current set.
    pub fn load(&mut self, descriptors: Vec<StreamDescriptor>) {
        self.descriptors = descriptors.into();
    }

    pub fn all(&self) -> &[StreamDescriptor] {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Shared immutable view handed to a run.
    ///
    /// Fails with [`CheckError::EmptyInput`] when nothing is loaded.
    pub fn snapshot(&self) -> Result<Arc<[StreamDescriptor]>> {
        if self.descriptors.is_empty() {
            return Err(CheckError::EmptyInput);
        }
        Ok(Arc::clone(&self.descriptors))
    }
}
