// src/fasta.rs
use crate::error::FastaError;

/// A validated FASTA blob. Construction goes through [`FastaPayload::parse`],
/// so a value of this type always satisfies the validity predicate and a
/// job id is never derived from invalid content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastaPayload {
    raw: String,
    records: usize,
}

impl FastaPayload {
    /// Validate a raw blob: non-empty, every record opens with a `>` header,
    /// every record carries at least one residue, residues are ASCII letters
    /// plus `*` (stop) and `-` (gap).
    pub fn parse(raw: &str) -> Result<Self, FastaError> {
        if raw.trim().is_empty() {
            return Err(FastaError::EmptyPayload);
        }

        let mut records = 0usize;
        let mut current_header: Option<String> = None;
        let mut current_len = 0usize;

        for (idx, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(header) = line.strip_prefix('>') {
                if let Some(prev) = current_header.take() {
                    if current_len == 0 {
                        return Err(FastaError::EmptySequence(prev));
                    }
                }
                current_header = Some(header.split_whitespace().next().unwrap_or("").to_string());
                current_len = 0;
                records += 1;
            } else {
                if current_header.is_none() {
                    return Err(FastaError::MissingHeader(idx + 1));
                }
                for ch in line.chars() {
                    if !(ch.is_ascii_alphabetic() || ch == '*' || ch == '-') {
                        return Err(FastaError::InvalidCharacter { line: idx + 1, ch });
                    }
                }
                current_len += line.len();
            }
        }

        match current_header {
            Some(header) if current_len == 0 => return Err(FastaError::EmptySequence(header)),
            None => return Err(FastaError::MissingHeader(1)),
            _ => {}
        }

        Ok(Self { raw: raw.to_string(), records })
    }

    /// Content-derived identity: lowercase hex MD5 of the raw payload.
    /// Identical content always maps to the same job id, which is what makes
    /// resubmission idempotent.
    pub fn job_id(&self) -> String {
        format!("{:x}", md5::compute(self.raw.as_bytes()))
    }

    /// Number of records in the blob.
    pub fn len(&self) -> usize {
        self.records
    }

    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn into_inner(self) -> String {
        self.raw
    }
}
