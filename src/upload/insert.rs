//! Turning an upload receipt into post markup and delivering it.

use std::io::Write;
use std::path::PathBuf;

use super::UploadReceipt;
use crate::clipboard::copy_to_clipboard;

/// Discourse audio markup: `![recording|audio](upload://...)`.
///
/// The label is the uploaded file name up to its first dot.
pub fn audio_markup(receipt: &UploadReceipt) -> String {
    let label = receipt
        .original_filename
        .split('.')
        .next()
        .unwrap_or_default();
    format!("![{label}|audio]({})", receipt.short_url)
}

/// Where the markup goes once the upload succeeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    Clipboard,
    File(PathBuf),
}

impl OutputTarget {
    /// `-o` wins over `-c`; without either the markup is printed.
    pub fn from_flags(clipboard: bool, output: Option<String>) -> Self {
        match output {
            Some(path) => OutputTarget::File(PathBuf::from(path)),
            None if clipboard => OutputTarget::Clipboard,
            None => OutputTarget::Stdout,
        }
    }

    /// Delivers `markup`, followed by a newline, to the target.
    ///
    /// A clipboard without a usable tool falls back to stdout.
    pub fn insert(&self, markup: &str) -> anyhow::Result<()> {
        match self {
            OutputTarget::Stdout => {
                let mut out = std::io::stdout().lock();
                writeln!(out, "{markup}")?;
                out.flush()?;
            }
            OutputTarget::Clipboard => match copy_to_clipboard(markup) {
                Ok(tool) => tracing::info!("Markup copied to clipboard via {}", tool),
                Err(e) => {
                    tracing::warn!("{}; printing markup instead", e);
                    println!("{markup}");
                }
            },
            OutputTarget::File(path) => {
                std::fs::write(path, format!("{markup}\n")).map_err(|e| {
                    anyhow::anyhow!("Failed to write markup to {}: {e}", path.display())
                })?;
                tracing::info!("Markup written to {}", path.display());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn receipt(original_filename: &str) -> UploadReceipt {
        UploadReceipt {
            id: 321,
            url: "/uploads/default/original/1X/61fdf6fac415541560e2d86e495f94d4dd201a18.mp3"
                .to_string(),
            original_filename: original_filename.to_string(),
            short_url: "upload://dYSqLbGQHdjJFT40TIVt56uSIOs.mp3".to_string(),
            filesize: Some(36864),
            extension: Some("mp3".to_string()),
            human_filesize: Some("36 KB".to_string()),
        }
    }

    #[test]
    fn test_audio_markup() {
        assert_eq!(
            audio_markup(&receipt("recording.mp3")),
            "![recording|audio](upload://dYSqLbGQHdjJFT40TIVt56uSIOs.mp3)"
        );
        assert_eq!(
            audio_markup(&receipt("standup.2024.ogg")),
            "![standup|audio](upload://dYSqLbGQHdjJFT40TIVt56uSIOs.mp3)"
        );
    }

    #[test]
    fn test_from_flags() {
        assert_eq!(OutputTarget::from_flags(false, None), OutputTarget::Stdout);
        assert_eq!(OutputTarget::from_flags(true, None), OutputTarget::Clipboard);
        assert_eq!(
            OutputTarget::from_flags(true, Some("out.md".to_string())),
            OutputTarget::File(PathBuf::from("out.md"))
        );
    }

    #[test]
    fn test_insert_into_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("post.md");
        OutputTarget::File(path.clone())
            .insert("![recording|audio](upload://abc.mp3)")
            .unwrap();
        assert_eq!(
            std::fs::read_to_string(path).unwrap(),
            "![recording|audio](upload://abc.mp3)\n"
        );
    }
}
