//! Recording buffer and the finished artifact it turns into.

use chrono::{DateTime, Local};

/// Ordered chunks of encoded audio collected during one recording attempt.
#[derive(Debug, Default)]
pub struct RecordingBuffer {
    chunks: Vec<Vec<u8>>,
    len: usize,
}

impl RecordingBuffer {
    pub fn append(&mut self, chunk: Vec<u8>) {
        self.len += chunk.len();
        self.chunks.push(chunk);
    }

    /// Total number of buffered bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
        self.len = 0;
    }

    /// Concatenates the chunks in arrival order into an artifact and empties
    /// the buffer.
    pub fn finalize(&mut self, mime_type: &str, file_name: &str) -> RecordingArtifact {
        let mut bytes = Vec::with_capacity(self.len);
        for chunk in self.chunks.drain(..) {
            bytes.extend_from_slice(&chunk);
        }
        self.len = 0;

        RecordingArtifact {
            bytes,
            mime_type: mime_type.to_string(),
            file_name: file_name.to_string(),
            recorded_at: Local::now(),
        }
    }
}

/// A finished recording, ready for preview and upload.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingArtifact {
    bytes: Vec<u8>,
    mime_type: String,
    file_name: String,
    recorded_at: DateTime<Local>,
}

impl RecordingArtifact {
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn recorded_at(&self) -> DateTime<Local> {
        self.recorded_at
    }
}

/// Human-readable size: bytes below 1 KiB, otherwise kB with one decimal.
///
/// Rounds half up and drops a trailing `.0`, so 2048 bytes is `"2 kB"`.
pub fn format_size(bytes: Option<usize>) -> String {
    let Some(bytes) = bytes else {
        return "-".to_string();
    };
    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let tenths = (bytes as u64 * 10 + 512) / 1024;
    if tenths % 10 == 0 {
        format!("{} kB", tenths / 10)
    } else {
        format!("{}.{} kB", tenths / 10, tenths % 10)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(None), "-");
        assert_eq!(format_size(Some(0)), "0 B");
        assert_eq!(format_size(Some(500)), "500 B");
        assert_eq!(format_size(Some(1023)), "1023 B");
        assert_eq!(format_size(Some(1024)), "1 kB");
        assert_eq!(format_size(Some(1536)), "1.5 kB");
        assert_eq!(format_size(Some(2048)), "2 kB");
        assert_eq!(format_size(Some(36864)), "36 kB");
        // 1075 / 1024 = 1.0498..., rounds down
        assert_eq!(format_size(Some(1075)), "1 kB");
        // exactly 2.25 kB rounds half up
        assert_eq!(format_size(Some(2304)), "2.3 kB");
    }

    #[test]
    fn test_finalize_concatenates_in_order() {
        let mut buffer = RecordingBuffer::default();
        buffer.append(b"c1".to_vec());
        buffer.append(b"c2-".to_vec());
        buffer.append(b"c3".to_vec());
        assert_eq!(buffer.len(), 7);
        assert_eq!(buffer.chunk_count(), 3);

        let artifact = buffer.finalize("audio/mpeg", "recording.mp3");
        assert_eq!(artifact.bytes(), b"c1c2-c3");
        assert_eq!(artifact.mime_type(), "audio/mpeg");
        assert_eq!(artifact.file_name(), "recording.mp3");
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.chunk_count(), 0);
    }
}
