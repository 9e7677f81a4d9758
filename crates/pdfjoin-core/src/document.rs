//! Document operations facade
//!
//! `lopdf` owns the object graph (page selection, merging, serialization).
//! `qpdf` is only used at the edges: opening password-protected input and
//! encrypting output.

use std::fmt;

use lopdf::Document;
use qpdf::{EncryptionParams, EncryptionParamsR6, PrintPermission, QPdf};
use tracing::{debug, warn};

use crate::error::PdfJoinError;
use crate::{merge, outline, split};

/// Whether output encryption is available in this deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncryptionSupport {
    #[default]
    Enabled,
    /// Output passwords are accepted but ignored with a warning
    Disabled,
}

/// Output protection recorded by [`PdfDocument::encrypt_optional`] and
/// applied on [`PdfDocument::serialize`]
#[derive(Clone)]
struct Protection {
    user_password: String,
    owner_password: String,
}

impl fmt::Debug for Protection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Protection { .. }")
    }
}

/// A loaded PDF, owned by the operation that loaded it
#[derive(Debug, Clone)]
pub struct PdfDocument {
    doc: Document,
    protection: Option<Protection>,
}

impl PdfDocument {
    /// Open PDF bytes, decrypting with `password` when one is given.
    ///
    /// Every failure (malformed bytes, wrong or missing password, empty
    /// page tree) is reported as [`PdfJoinError::InvalidOrProtected`]
    /// naming `name`.
    pub fn load(name: &str, bytes: &[u8], password: Option<&str>) -> Result<Self, PdfJoinError> {
        let doc = match password {
            Some(pwd) => {
                let plain = decrypt(bytes, Some(pwd)).map_err(|e| {
                    warn!(file = name, error = %e, "Failed to open PDF with password");
                    PdfJoinError::protected(name)
                })?;
                parse(name, &plain)?
            }
            None => match Document::load_mem(bytes) {
                Ok(doc) if !doc.is_encrypted() => doc,
                _ => {
                    // Documents restricted only by an owner password open with
                    // an empty user password
                    let plain = decrypt(bytes, None).map_err(|e| {
                        warn!(file = name, error = %e, "Failed to load PDF");
                        PdfJoinError::protected(name)
                    })?;
                    parse(name, &plain)?
                }
            },
        };

        if doc.is_encrypted() {
            warn!(file = name, "PDF is still encrypted after opening");
            return Err(PdfJoinError::protected(name));
        }

        if doc.get_pages().is_empty() {
            warn!(file = name, "PDF has no pages");
            return Err(PdfJoinError::protected(name));
        }

        debug!(file = name, pages = doc.get_pages().len(), "Loaded PDF");

        Ok(Self {
            doc,
            protection: None,
        })
    }

    pub fn page_count(&self) -> u32 {
        self.doc.get_pages().len() as u32
    }

    /// New document holding exactly the given 0-based pages, in the given
    /// order. Indices may repeat.
    pub fn extract_pages(&self, indices: &[u32]) -> Result<Self, PdfJoinError> {
        let doc = split::select_pages(&self.doc, indices)?;
        Ok(Self {
            doc,
            protection: None,
        })
    }

    /// Concatenate documents in input order
    pub fn merge(documents: Vec<PdfDocument>) -> Result<Self, PdfJoinError> {
        let doc = merge::merge_documents(documents.into_iter().map(|d| d.doc).collect())?;
        Ok(Self {
            doc,
            protection: None,
        })
    }

    /// Request password protection for the serialized output.
    ///
    /// Printing stays allowed at full resolution; modifying, copying,
    /// annotating, form filling, assembly and accessibility extraction are
    /// all disallowed. With [`EncryptionSupport::Disabled`] this is a no-op.
    pub fn encrypt_optional(&mut self, password: Option<&str>, support: EncryptionSupport) {
        let Some(password) = password.filter(|p| !p.is_empty()) else {
            return;
        };

        if support == EncryptionSupport::Disabled {
            warn!("Output encryption is disabled; writing unprotected PDF");
            return;
        }

        self.protection = Some(Protection {
            user_password: password.to_string(),
            owner_password: uuid::Uuid::new_v4().simple().to_string(),
        });
    }

    /// 1-based start pages of the top-level bookmarks
    pub fn outline_starts(&self) -> Vec<u32> {
        outline::top_level_starts(&self.doc)
    }

    pub fn serialize(mut self) -> Result<Vec<u8>, PdfJoinError> {
        self.doc.prune_objects();
        self.doc.compress();

        let mut buffer = Vec::new();
        self.doc
            .save_to(&mut buffer)
            .map_err(|e| PdfJoinError::SerializationError(format!("Save failed: {}", e)))?;

        match self.protection {
            Some(protection) => encrypt(&buffer, &protection),
            None => Ok(buffer),
        }
    }
}

fn parse(name: &str, bytes: &[u8]) -> Result<Document, PdfJoinError> {
    Document::load_mem(bytes).map_err(|e| {
        warn!(file = name, error = %e, "Failed to parse PDF");
        PdfJoinError::protected(name)
    })
}

/// Open with qpdf and write back without encryption
fn decrypt(bytes: &[u8], password: Option<&str>) -> Result<Vec<u8>, qpdf::QPdfError> {
    let qpdf = match password {
        Some(pwd) => QPdf::read_from_memory_encrypted(bytes, pwd)?,
        None => QPdf::read_from_memory(bytes)?,
    };

    let mut writer = qpdf.writer();
    writer.preserve_encryption(false);
    writer.write_to_memory()
}

fn encrypt(bytes: &[u8], protection: &Protection) -> Result<Vec<u8>, PdfJoinError> {
    let qpdf = QPdf::read_from_memory(bytes)
        .map_err(|e| PdfJoinError::OperationError(format!("Re-open for encryption: {}", e)))?;

    let encryption = EncryptionParams::R6(EncryptionParamsR6 {
        user_password: protection.user_password.clone(),
        owner_password: protection.owner_password.clone(),
        allow_accessibility: false,
        allow_extract: false,
        allow_assemble: false,
        allow_annotate_and_form: false,
        allow_form_filling: false,
        allow_modify_other: false,
        allow_print: PrintPermission::Full,
        encrypt_metadata: true,
    });

    let mut writer = qpdf.writer();
    writer
        .preserve_encryption(false)
        .encryption_params(encryption);
    writer
        .write_to_memory()
        .map_err(|e| PdfJoinError::SerializationError(format!("Encryption failed: {}", e)))
}
