//! Merge and split commands
//!
//! A command is a self-contained description of one operation: input bytes
//! and every option needed to run it. Executing it is a pure function from
//! the command to its output files, so the same value can be run inline for
//! a synchronous request or later by a background job.

use std::fmt;
use std::time::Instant;

use serde::Serialize;

use crate::document::{EncryptionSupport, PdfDocument};
use crate::error::PdfJoinError;
use crate::range::{ranges_from_outline, validate_ranges, PageRange, RangePolicy};

/// An uploaded PDF and the password to open it, if any
#[derive(Clone)]
pub struct InputFile {
    pub name: String,
    pub bytes: Vec<u8>,
    pub password: Option<String>,
}

impl fmt::Debug for InputFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputFile")
            .field("name", &self.name)
            .field("size_bytes", &self.bytes.len())
            .field("has_password", &self.password.is_some())
            .finish()
    }
}

impl InputFile {
    fn load(&self) -> Result<PdfDocument, PdfJoinError> {
        PdfDocument::load(&self.name, &self.bytes, self.password.as_deref())
    }
}

/// One produced PDF
#[derive(Debug, Clone)]
pub struct OutputFile {
    pub name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum PdfCommand {
    Merge {
        files: Vec<InputFile>,
        output_password: Option<String>,
    },
    Split {
        file: InputFile,
        ranges: Vec<PageRange>,
        declared_count: Option<usize>,
        output_password: Option<String>,
    },
    SplitByBookmarks {
        file: InputFile,
        output_password: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Merge,
    Split,
    SplitByBookmarks,
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandKind::Merge => write!(f, "merge"),
            CommandKind::Split => write!(f, "split"),
            CommandKind::SplitByBookmarks => write!(f, "split_by_bookmarks"),
        }
    }
}

/// Deployment-wide settings a command runs under
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandOptions {
    pub range_policy: RangePolicy,
    pub encryption: EncryptionSupport,
}

#[derive(Debug, Clone)]
pub struct ProcessResult {
    pub files: Vec<OutputFile>,
    pub metrics: ProcessMetrics,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessMetrics {
    pub input_size_bytes: usize,
    pub output_size_bytes: usize,
    pub page_count: u32,
    pub processing_time_ms: u64,
}

impl PdfCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            PdfCommand::Merge { .. } => CommandKind::Merge,
            PdfCommand::Split { .. } => CommandKind::Split,
            PdfCommand::SplitByBookmarks { .. } => CommandKind::SplitByBookmarks,
        }
    }

    fn input_size(&self) -> usize {
        match self {
            PdfCommand::Merge { files, .. } => files.iter().map(|f| f.bytes.len()).sum(),
            PdfCommand::Split { file, .. } | PdfCommand::SplitByBookmarks { file, .. } => {
                file.bytes.len()
            }
        }
    }

    /// Run the command. Any failure aborts the whole command; there is no
    /// partial output.
    pub fn execute(self, options: &CommandOptions) -> Result<ProcessResult, PdfJoinError> {
        let started = Instant::now();
        let input_size_bytes = self.input_size();

        let (files, page_count) = match self {
            PdfCommand::Merge {
                files,
                output_password,
            } => {
                let documents = files
                    .iter()
                    .map(InputFile::load)
                    .collect::<Result<Vec<_>, _>>()?;

                let mut merged = PdfDocument::merge(documents)?;
                let page_count = merged.page_count();
                merged.encrypt_optional(output_password.as_deref(), options.encryption);

                let output = OutputFile {
                    name: "merged.pdf".to_string(),
                    bytes: merged.serialize()?,
                };
                (vec![output], page_count)
            }
            PdfCommand::Split {
                file,
                ranges,
                declared_count,
                output_password,
            } => {
                let source = file.load()?;
                let ranges = validate_ranges(
                    source.page_count(),
                    &ranges,
                    options.range_policy,
                    declared_count,
                )?;
                let outputs = extract_ranges(
                    &source,
                    &ranges,
                    output_password.as_deref(),
                    options,
                    |range| format!("split-{}-{}.pdf", range.start, range.end),
                )?;
                (outputs, source.page_count())
            }
            PdfCommand::SplitByBookmarks {
                file,
                output_password,
            } => {
                let source = file.load()?;
                let ranges = ranges_from_outline(source.page_count(), &source.outline_starts());
                if ranges.is_empty() {
                    return Err(PdfJoinError::NoBookmarks);
                }

                let mut section = 0;
                let outputs = extract_ranges(
                    &source,
                    &ranges,
                    output_password.as_deref(),
                    options,
                    |range| {
                        section += 1;
                        format!("section-{}-{}-{}.pdf", section, range.start, range.end)
                    },
                )?;
                (outputs, source.page_count())
            }
        };

        let metrics = ProcessMetrics {
            input_size_bytes,
            output_size_bytes: files.iter().map(|f| f.bytes.len()).sum(),
            page_count,
            processing_time_ms: started.elapsed().as_millis() as u64,
        };

        Ok(ProcessResult { files, metrics })
    }
}

/// One output per range, in range order
fn extract_ranges(
    source: &PdfDocument,
    ranges: &[PageRange],
    output_password: Option<&str>,
    options: &CommandOptions,
    mut name_for: impl FnMut(&PageRange) -> String,
) -> Result<Vec<OutputFile>, PdfJoinError> {
    ranges
        .iter()
        .map(|range| {
            let mut part = source.extract_pages(&range.page_indices())?;
            part.encrypt_optional(output_password, options.encryption);
            Ok(OutputFile {
                name: name_for(range),
                bytes: part.serialize()?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{add_bookmarks, create_test_pdf, page_texts};
    use crate::range::RangeError;
    use pretty_assertions::assert_eq;

    fn input(name: &str, bytes: Vec<u8>) -> InputFile {
        InputFile {
            name: name.to_string(),
            bytes,
            password: None,
        }
    }

    fn split(pages: u32, ranges: Vec<PageRange>) -> PdfCommand {
        PdfCommand::Split {
            file: input("source.pdf", create_test_pdf(pages, "S")),
            ranges,
            declared_count: None,
            output_password: None,
        }
    }

    #[test]
    fn test_merge_page_count_is_sum_in_order() {
        let cmd = PdfCommand::Merge {
            files: vec![
                input("a.pdf", create_test_pdf(2, "A")),
                input("b.pdf", create_test_pdf(3, "B")),
            ],
            output_password: None,
        };
        let result = cmd.execute(&CommandOptions::default()).unwrap();

        assert_eq!(result.files.len(), 1);
        assert_eq!(result.files[0].name, "merged.pdf");
        assert_eq!(result.metrics.page_count, 5);
        assert_eq!(
            page_texts(&result.files[0].bytes),
            vec!["A-Page-1", "A-Page-2", "B-Page-1", "B-Page-2", "B-Page-3"]
        );
    }

    #[test]
    fn test_merge_invalid_file_is_named() {
        let cmd = PdfCommand::Merge {
            files: vec![
                input("good.pdf", create_test_pdf(1, "G")),
                input("bad.pdf", b"%PDF-1.4 garbage".to_vec()),
            ],
            output_password: None,
        };
        let err = cmd.execute(&CommandOptions::default()).unwrap_err();
        assert_eq!(err.to_string(), "Invalid or password-protected PDF: bad.pdf");
    }

    #[test]
    fn test_strict_split_ten_pages_in_halves() {
        let cmd = split(10, vec![PageRange::new(1, 5), PageRange::new(6, 10)]);
        let result = cmd.execute(&CommandOptions::default()).unwrap();

        let names: Vec<&str> = result.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["split-1-5.pdf", "split-6-10.pdf"]);
        assert_eq!(
            page_texts(&result.files[1].bytes),
            vec!["S-Page-6", "S-Page-7", "S-Page-8", "S-Page-9", "S-Page-10"]
        );
    }

    #[test]
    fn test_strict_split_overlap_fails() {
        let cmd = split(10, vec![PageRange::new(1, 5), PageRange::new(3, 8)]);
        let err = cmd.execute(&CommandOptions::default()).unwrap_err();
        assert!(matches!(err, PdfJoinError::Range(RangeError::Overlap { page: 3 })));
        assert!(err.is_client_error());
    }

    #[test]
    fn test_permissive_split_allows_overlap() {
        let options = CommandOptions {
            range_policy: RangePolicy::Permissive,
            ..Default::default()
        };
        let cmd = split(10, vec![PageRange::new(1, 5), PageRange::new(3, 8)]);
        let result = cmd.execute(&options).unwrap();
        assert_eq!(page_texts(&result.files[1].bytes).len(), 6);
    }

    #[test]
    fn test_single_page_range_at_end() {
        let options = CommandOptions {
            range_policy: RangePolicy::Permissive,
            ..Default::default()
        };
        let result = split(4, vec![PageRange::new(4, 4)]).execute(&options).unwrap();
        assert_eq!(page_texts(&result.files[0].bytes), vec!["S-Page-4"]);
    }

    #[test]
    fn test_split_by_bookmarks() {
        let bytes = add_bookmarks(&create_test_pdf(6, "K"), &[3, 5]);
        let cmd = PdfCommand::SplitByBookmarks {
            file: input("book.pdf", bytes),
            output_password: None,
        };
        let result = cmd.execute(&CommandOptions::default()).unwrap();

        let names: Vec<&str> = result.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["section-1-1-2.pdf", "section-2-3-4.pdf", "section-3-5-6.pdf"]
        );
    }

    #[test]
    fn test_bookmark_sections_hold_only_their_pages() {
        let bytes = add_bookmarks(&create_test_pdf(6, "K"), &[1, 4]);
        let cmd = PdfCommand::SplitByBookmarks {
            file: input("book.pdf", bytes),
            output_password: None,
        };
        let result = cmd.execute(&CommandOptions::default()).unwrap();

        for file in &result.files {
            let doc = lopdf::Document::load_mem(&file.bytes).unwrap();
            let page_objects = doc
                .objects
                .values()
                .filter_map(|object| object.as_dict().ok())
                .filter(|dict| {
                    matches!(
                        dict.get(b"Type").and_then(lopdf::Object::as_name),
                        Ok(name) if name == b"Page"
                    )
                })
                .count();
            assert_eq!(page_objects, 3, "{}", file.name);
        }
    }

    #[test]
    fn test_split_by_bookmarks_without_outline_fails() {
        let cmd = PdfCommand::SplitByBookmarks {
            file: input("plain.pdf", create_test_pdf(3, "P")),
            output_password: None,
        };
        assert!(matches!(
            cmd.execute(&CommandOptions::default()),
            Err(PdfJoinError::NoBookmarks)
        ));
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&CommandKind::SplitByBookmarks).unwrap();
        assert_eq!(json, r#""split_by_bookmarks""#);
    }
}
