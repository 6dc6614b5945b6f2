//! M3U playlist loading.
//!
//! Turns a playlist file into the ordered descriptor list a session runs on.
//! `#EXTINF` lines are attached to the URL that follows them; every other
//! comment line is ignored.
//!
//! Playlists in the wild are often not UTF-8 (cp1251 and latin-1 channel
//! lists are common). A BOM decides the encoding when present; otherwise it
//! is guessed from the content, so titles survive into the output partitions.

use std::borrow::Cow;
use std::path::Path;

use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use tracing::{debug, info};

use crate::descriptor::StreamDescriptor;
use crate::error::{CheckError, Result};

const EXTINF: &str = "#EXTINF";
/// Read and parse a playlist file.
pub fn load_playlist(path: &Path) -> Result<Vec<StreamDescriptor>> {
    let bytes = std::fs::read(path).map_err(|source| CheckError::Playlist {
        path: path.to_path_buf(),
        source,
    })?;

    let (text, encoding) = decode(&bytes);
    let descriptors = parse_playlist(&text);

    info!(
        path = %path.display(),
        encoding = encoding.name(),
        streams = descriptors.len(),
        "Loaded playlist"
    );
    Ok(descriptors)
}

/// Decode playlist bytes: BOM first, then content detection.
fn decode(bytes: &[u8]) -> (Cow<'_, str>, &'static Encoding) {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return (text, encoding);
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        debug!(encoding = encoding.name(), "Playlist contains undecodable bytes");
    }
    (text, encoding)
}

/// Parse playlist text into descriptors, in file order.
pub fn parse_playlist(text: &str) -> Vec<StreamDescriptor> {
    let mut descriptors = Vec::new();
    let mut pending_meta: Option<String> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.starts_with(EXTINF) {
            pending_meta = Some(line.to_string());
            continue;
        }
        if line.starts_with('#') {
            continue;
        }

        let meta = pending_meta.take();
        let name = meta.as_deref().map(extinf_title).unwrap_or_default().to_string();

        match StreamDescriptor::new(name, meta, line) {
            Ok(d) => descriptors.push(d),
            Err(e) => debug!(line, error = %e, "Skipping playlist line"),
        }
    }

    descriptors
}

/// Title part of an `#EXTINF` line: everything after the first comma that is
/// not inside a quoted attribute value.
fn extinf_title(line: &str) -> &str {
    let mut in_quotes = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => return line[i + 1..].trim(),
            _ => {}
        }
    }
    ""
}
