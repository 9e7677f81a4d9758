//! Multipart request parsing
//!
//! Uploads are read fully into memory and checked before any PDF work
//! starts. Each request shape is then turned into a [`PdfCommand`].

use std::collections::HashMap;

use axum::extract::Multipart;
use pdfjoin_core::{InputFile, PageRange, PdfCommand};
use serde_json::Value;
use tracing::debug;

use crate::error::ApiError;

const PDF_CONTENT_TYPE: &str = "application/pdf";

#[derive(Debug)]
struct UploadedFile {
    field: String,
    name: String,
    bytes: Vec<u8>,
}

/// The parts of one multipart request
#[derive(Debug, Default)]
pub struct Upload {
    files: Vec<UploadedFile>,
    fields: HashMap<String, String>,
}

impl Upload {
    /// Read every part of the request. File parts must be PDFs.
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut upload = Upload::default();

        while let Some(field) = multipart.next_field().await? {
            let field_name = field.name().unwrap_or_default().to_string();

            match field.file_name().map(str::to_string) {
                Some(file_name) => {
                    if !is_pdf_content_type(field.content_type()) {
                        debug!(
                            file = %file_name,
                            content_type = ?field.content_type(),
                            "Rejected non-PDF upload"
                        );
                        return Err(ApiError::UnsupportedMedia);
                    }
                    let bytes = field.bytes().await?;
                    upload.files.push(UploadedFile {
                        field: field_name,
                        name: file_name,
                        bytes: bytes.to_vec(),
                    });
                }
                None => {
                    let text = field.text().await?;
                    upload.fields.insert(field_name, text);
                }
            }
        }

        Ok(upload)
    }

    pub fn into_merge(mut self, min_files: usize) -> Result<PdfCommand, ApiError> {
        let passwords = match self.field("passwords") {
            Some(raw) => parse_passwords(raw)?,
            None => HashMap::new(),
        };
        let output_password = self.take_field("outputPassword");

        let files: Vec<InputFile> = self
            .take_files("files")
            .into_iter()
            .map(|file| InputFile {
                password: passwords.get(&file.name).cloned(),
                name: file.name,
                bytes: file.bytes,
            })
            .collect();

        if files.len() < min_files {
            return Err(ApiError::validation(format!(
                "At least {} PDF files are required to merge",
                min_files
            )));
        }

        Ok(PdfCommand::Merge {
            files,
            output_password,
        })
    }

    pub fn into_split(mut self) -> Result<PdfCommand, ApiError> {
        let file = self.take_single_file()?;

        let ranges = self
            .field("ranges")
            .ok_or_else(|| ApiError::validation("Page ranges are required"))
            .and_then(parse_ranges)?;
        let declared_count = self.field("splitCount").map(parse_split_count).transpose()?;

        Ok(PdfCommand::Split {
            file,
            ranges,
            declared_count,
            output_password: self.take_field("outputPassword"),
        })
    }

    pub fn into_split_by_bookmarks(mut self) -> Result<PdfCommand, ApiError> {
        let file = self.take_single_file()?;
        Ok(PdfCommand::SplitByBookmarks {
            file,
            output_password: self.take_field("outputPassword"),
        })
    }

    /// Non-empty text field
    fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    fn take_field(&mut self, name: &str) -> Option<String> {
        self.fields.remove(name).filter(|value| !value.is_empty())
    }

    fn take_files(&mut self, field: &str) -> Vec<UploadedFile> {
        let (matching, rest) = std::mem::take(&mut self.files)
            .into_iter()
            .partition(|file| file.field == field);
        self.files = rest;
        matching
    }

    fn take_single_file(&mut self) -> Result<InputFile, ApiError> {
        let password = self.take_field("password");
        let file = self
            .take_files("file")
            .into_iter()
            .next()
            .ok_or_else(|| ApiError::validation("A PDF file is required"))?;

        Ok(InputFile {
            name: file.name,
            bytes: file.bytes,
            password,
        })
    }
}

fn is_pdf_content_type(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().eq_ignore_ascii_case(PDF_CONTENT_TYPE))
        .unwrap_or(false)
}

/// `passwords` is a JSON object mapping original file names to passwords
fn parse_passwords(raw: &str) -> Result<HashMap<String, String>, ApiError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|_| ApiError::validation("Invalid passwords format"))?;

    let Value::Object(map) = value else {
        return Err(ApiError::validation("Invalid passwords format"));
    };

    Ok(map
        .into_iter()
        .filter_map(|(name, password)| match password {
            Value::String(p) if !p.is_empty() => Some((name, p)),
            _ => None,
        })
        .collect())
}

/// `ranges` is either a JSON array of `{start, end}` objects or the compact
/// `"1-3, 5"` syntax
fn parse_ranges(raw: &str) -> Result<Vec<PageRange>, ApiError> {
    let ranges = if raw.starts_with('[') {
        let value: Value = serde_json::from_str(raw)
            .map_err(|_| ApiError::validation("Invalid ranges format"))?;
        let Value::Array(items) = value else {
            return Err(ApiError::validation("Invalid ranges format"));
        };
        items
            .iter()
            .map(PageRange::from_json)
            .collect::<Result<Vec<_>, _>>()
    } else {
        PageRange::parse_list(raw)
    };

    ranges.map_err(|e| ApiError::validation(e.to_string()))
}

fn parse_split_count(raw: &str) -> Result<usize, ApiError> {
    raw.parse::<usize>()
        .ok()
        .filter(|&count| count > 0)
        .ok_or_else(|| ApiError::validation("splitCount must be a positive integer"))
}
