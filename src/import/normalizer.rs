//! Conversion of raw rows into canonical documents.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use super::parser::RawRecord;
use super::{ImportContext, SkipReason};
use crate::models::{
    CanonicalDocument, DocumentMetadata, DocumentStatus, FileLocation, DEFAULT_STORAGE_TYPE,
};

pub const COL_FILENAME: &str = "filename";
pub const COL_PATH: &str = "file_location_path";
pub const COL_TITLE: &str = "title";
pub const COL_EXTENSION: &str = "file_extension";
pub const COL_MIME_TYPE: &str = "mime_type";
pub const COL_UPLOAD_DATE: &str = "upload_date";
pub const COL_STATUS: &str = "status";
pub const COL_TAGS: &str = "tags";
pub const COL_STORAGE_TYPE: &str = "file_location_storage_type";
pub const COL_BUCKET: &str = "file_location_bucket_name";

const METADATA_PREFIX: &str = "metadata_";
const META_DOCUMENT_TYPE: &str = "document_type";
const META_DOCUMENT_YEAR: &str = "document_year";

/// Document classes that receive the classification tag.
const CLASSIFIED_TYPES: &[&str] = &["DECRETO", "ATO", "LEI", "PORTARIA"];
pub const CLASSIFICATION_TAG: &str = "ADLP";

/// Build a `CanonicalDocument` from one raw row. Pure.
pub fn normalize(raw: &RawRecord, ctx: &ImportContext) -> Result<CanonicalDocument, SkipReason> {
    let filename = required(raw, COL_FILENAME)?;
    let path = normalize_path(required(raw, COL_PATH)?);

    let upload_date = match raw.get(COL_UPLOAD_DATE) {
        Some(value) => parse_upload_date(value).ok_or_else(|| SkipReason::InvalidValue {
            line: raw.line,
            field: COL_UPLOAD_DATE.to_string(),
            value: value.to_string(),
        })?,
        None => ctx.now,
    };

    let metadata = build_metadata(raw);
    let tags = build_tags(raw.get(COL_TAGS), metadata.document_type.as_deref());

    Ok(CanonicalDocument {
        id: CanonicalDocument::new_id(),
        title: raw.get(COL_TITLE).map(str::to_string),
        filename: filename.to_string(),
        file_extension: raw.get(COL_EXTENSION).map(str::to_string),
        mime_type: raw.get(COL_MIME_TYPE).map(str::to_string),
        upload_date,
        uploaded_by: ctx.uploader.clone(),
        status: raw
            .get(COL_STATUS)
            .map(DocumentStatus::from_str)
            .unwrap_or_default(),
        metadata,
        tags,
        permissions: ctx.permissions.clone(),
        file_location: FileLocation {
            path,
            storage_type: raw
                .get(COL_STORAGE_TYPE)
                .unwrap_or(DEFAULT_STORAGE_TYPE)
                .to_string(),
            bucket_name: raw.get(COL_BUCKET).map(str::to_string),
        },
        created_at: ctx.now,
        updated_at: ctx.now,
    })
}

fn required<'a>(raw: &'a RawRecord, field: &str) -> Result<&'a str, SkipReason> {
    raw.get(field).ok_or_else(|| SkipReason::MissingField {
        line: raw.line,
        field: field.to_string(),
    })
}

/// Backslashes become slashes and a trailing `.pdf` extension is lowercased.
pub fn normalize_path(path: &str) -> String {
    let mut path = path.replace('\\', "/");
    let ext_start = path.len().saturating_sub(4);
    if path.is_char_boundary(ext_start) && path[ext_start..].eq_ignore_ascii_case(".pdf") {
        path.replace_range(ext_start.., ".pdf");
    }
    path
}

/// Leading-integer coercion: "2021abc" is 2021, "abc" is 0.
pub fn parse_year(value: &str) -> i64 {
    let value = value.trim();
    let (sign, digits) = match value.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, value.strip_prefix('+').unwrap_or(value)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().map(|n| sign * n).unwrap_or(0)
}

fn parse_upload_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&dt));
    }
    ["%Y-%m-%d", "%d/%m/%Y"].iter().find_map(|fmt| {
        NaiveDate::parse_from_str(value, fmt)
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| Utc.from_utc_datetime(&dt))
    })
}

fn build_metadata(raw: &RawRecord) -> DocumentMetadata {
    let mut additional = BTreeMap::new();
    let mut document_type = None;
    let mut document_year = 0;

    for (column, value) in &raw.fields {
        let Some(name) = column.strip_prefix(METADATA_PREFIX) else {
            continue;
        };
        match name {
            META_DOCUMENT_TYPE => {
                document_type = Some(value.trim().to_string()).filter(|v| !v.is_empty());
            }
            META_DOCUMENT_YEAR => document_year = parse_year(value),
            "" => {}
            _ => {
                additional.insert(name.to_string(), value.clone());
            }
        }
    }

    DocumentMetadata {
        document_type,
        document_year,
        additional,
    }
}

fn build_tags(tags: Option<&str>, document_type: Option<&str>) -> Vec<String> {
    let mut candidates: Vec<&str> = tags.map(|t| t.split('|').collect()).unwrap_or_default();

    if let Some(doc_type) = document_type {
        let doc_type = doc_type.trim().to_uppercase();
        if CLASSIFIED_TYPES.contains(&doc_type.as_str()) {
            candidates.push(CLASSIFICATION_TAG);
        }
    }

    let mut result: Vec<String> = Vec::with_capacity(candidates.len());
    for tag in candidates {
        let tag = tag.trim().to_uppercase();
        if !tag.is_empty() && !result.contains(&tag) {
            result.push(tag);
        }
    }
    result
}
