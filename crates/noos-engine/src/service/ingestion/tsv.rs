//! TSV tokenizing (§4.2.1). Uses the `csv` crate with a tab delimiter and
//! `has_headers(false)` — the header line is read and validated by hand so
//! the "reject on header mismatch" rule applies before any row is parsed,
//! rather than letting `csv` silently treat the first line as headers.

use std::collections::HashMap;

use crate::error::{EngineError, EngineResult};

pub type RawRow = HashMap<String, String>;

/// One data row plus its 1-indexed file-line number (header counts as line
/// 1, so the first data row is line 2 — §4.2 "Output contract").
pub struct ParsedRow {
    pub line: usize,
    /// Empty when the row's field count didn't match the header; callers
    /// treat that as a row-level validation failure (§4.2 "TSV parsing").
    pub fields: RawRow,
}

pub fn parse(expected_header: &[&str], data: &[u8], max_rows: usize) -> EngineResult<Vec<ParsedRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .from_reader(data);

    let mut records = reader.records();
    let header_record = records
        .next()
        .transpose()
        .map_err(|e| EngineError::validation("malformed TSV header").with_detail(e.to_string()))?
        .ok_or_else(|| EngineError::validation("file is empty"))?;

    let header: Vec<String> = header_record.iter().map(str::trim).map(str::to_string).collect();
    let header_matches = header.len() == expected_header.len()
        && header
            .iter()
            .zip(expected_header.iter())
            .all(|(actual, expected)| actual.eq_ignore_ascii_case(expected));
    if !header_matches {
        return Err(EngineError::validation("header does not match expected columns")
            .with_detail(format!("expected: {}", expected_header.join(" ")))
            .with_detail(format!("found: {}", header.join(" "))));
    }

    let mut rows = Vec::new();
    let mut line = 1usize;
    for record in records {
        line += 1;
        let record = record.map_err(|e| {
            EngineError::validation("malformed TSV row").with_detail(format!("line {line}: {e}"))
        })?;
        let values: Vec<String> = record.iter().map(str::trim).map(str::to_string).collect();
        let fields = if values.len() == expected_header.len() {
            expected_header
                .iter()
                .map(|h| (*h).to_string())
                .zip(values)
                .collect()
        } else {
            RawRow::new()
        };
        rows.push(ParsedRow { line, fields });

        if rows.len() > max_rows {
            return Err(EngineError::validation("file exceeds maximum row count")
                .with_detail(format!("limit: {max_rows}")));
        }
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    const STYLES_HEADER: &[&str] = &["style", "brand", "category", "sub_category", "mrp", "gender"];

    #[test]
    fn parses_well_formed_rows() {
        let data = b"style\tbrand\tcategory\tsub_category\tmrp\tgender\nSHIRT001\tNIKE\tSHIRTS\tCASUAL\t100.50\tM\n";
        let rows = parse(STYLES_HEADER, data, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].line, 2);
        assert_eq!(rows[0].fields.get("style").unwrap(), "SHIRT001");
        assert_eq!(rows[0].fields.get("mrp").unwrap(), "100.50");
    }

    #[test]
    fn header_mismatch_is_rejected() {
        let data = b"style\tbrand\nSHIRT001\tNIKE\n";
        let err = parse(STYLES_HEADER, data, 10).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }

    #[test]
    fn header_match_is_case_insensitive() {
        let data = b"STYLE\tBRAND\tCATEGORY\tSUB_CATEGORY\tMRP\tGENDER\nSHIRT001\tNIKE\tSHIRTS\tCASUAL\t100.50\tM\n";
        assert!(parse(STYLES_HEADER, data, 10).is_ok());
    }

    #[test]
    fn mismatched_field_count_yields_empty_mapping() {
        let data = b"style\tbrand\tcategory\tsub_category\tmrp\tgender\nSHIRT001\tNIKE\n";
        let rows = parse(STYLES_HEADER, data, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].fields.is_empty());
    }

    #[test]
    fn exceeding_max_rows_is_rejected() {
        let mut data = String::from("style\tbrand\tcategory\tsub_category\tmrp\tgender\n");
        for i in 0..5 {
            data.push_str(&format!("S{i}\tB\tC\tSC\t10.00\tM\n"));
        }
        let err = parse(STYLES_HEADER, data.as_bytes(), 3).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Validation);
    }

    #[test]
    fn crlf_line_endings_are_accepted() {
        let data = b"style\tbrand\tcategory\tsub_category\tmrp\tgender\r\nSHIRT001\tNIKE\tSHIRTS\tCASUAL\t100.50\tM\r\n";
        let rows = parse(STYLES_HEADER, data, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields.get("gender").unwrap(), "M");
    }
}
