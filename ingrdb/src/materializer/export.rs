// Pure batch encoders for the six export formats, plus column resolution
// and batch file naming.

use crate::error::{IngrDbError, Result};
use crate::record::RecordEntry;
use crate::schema::{CollectionDef, ViewDef, ViewFormat};
use crate::value::Value;
use sha2::{Digest, Sha256};
use std::io::Write as _;

/// Optional settings that modify INGR serialization behaviour.
/// Non-INGR formats ignore all fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExportOptions {
    /// Appends a `# sha256:{hex}` line to the INGR footer.
    pub include_hash: bool,
    /// Writes a bare `#` line after each record.
    pub records_delimiter: bool,
}

/// Returns the output file name for a batch: `base.ext` for a single batch,
/// `base-NNNNNN.ext` (zero-padded 6-digit, 1-based) otherwise.
pub fn batch_file_name(base: &str, ext: &str, batch_num: usize, total_batches: usize) -> String {
    if total_batches <= 1 {
        format!("{base}.{ext}")
    } else {
        format!("{base}-{batch_num:06}.{ext}")
    }
}

/// Returns the ordered list of column names to export.
///
/// Priority: the view's explicit columns, else the collection's declared
/// column order, else the collection's column names sorted alphabetically.
/// `id` is always moved to index 0 (prepended when missing entirely).
pub fn determine_columns(col: &CollectionDef, view: &ViewDef) -> Vec<String> {
    let mut cols: Vec<String> = if !view.columns.is_empty() {
        view.columns.clone()
    } else if !col.columns_order.is_empty() {
        col.columns_order.clone()
    } else {
        let mut names: Vec<String> = col.columns.keys().cloned().collect();
        names.sort();
        names
    };

    if cols.first().map(String::as_str) != Some("id") {
        cols.retain(|c| c != "id");
        cols.insert(0, "id".to_string());
    }
    cols
}

/// Serializes a batch of records into the given format.
/// `view_identity` is used only by INGR for the metadata header line.
pub fn encode_batch(
    format: ViewFormat,
    view_identity: &str,
    headers: &[String],
    records: &[RecordEntry],
    opts: ExportOptions,
) -> Result<Vec<u8>> {
    match format {
        ViewFormat::Tsv => encode_tsv(headers, records),
        ViewFormat::Csv => encode_csv(headers, records),
        ViewFormat::Json => encode_json(headers, records),
        ViewFormat::Jsonl => encode_jsonl(headers, records),
        ViewFormat::Yaml => encode_yaml(headers, records),
        ViewFormat::Ingr => encode_ingr(view_identity, headers, records, opts),
    }
}

fn cell(record: &RecordEntry, header: &str) -> String {
    match record.data.get(header) {
        Some(v) => v.to_string(),
        None => String::new(),
    }
}

fn encode_tsv(headers: &[String], records: &[RecordEntry]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    writeln!(buf, "{}", headers.join("\t"))?;
    for record in records {
        for (i, header) in headers.iter().enumerate() {
            if i > 0 {
                buf.push(b'\t');
            }
            buf.extend_from_slice(escape_tsv(&cell(record, header)).as_bytes());
        }
        buf.push(b'\n');
    }
    Ok(buf)
}

fn escape_tsv(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('\t', "\\t")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

fn encode_csv(headers: &[String], records: &[RecordEntry]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(headers)?;
    for record in records {
        writer.write_record(headers.iter().map(|h| cell(record, h)))?;
    }
    writer
        .into_inner()
        .map_err(|e| IngrDbError::Encode(format!("csv: {e}")))
}

fn records_to_rows(
    headers: &[String],
    records: &[RecordEntry],
) -> Vec<serde_json::Map<String, serde_json::Value>> {
    records
        .iter()
        .map(|record| {
            let mut row = serde_json::Map::with_capacity(headers.len());
            for header in headers {
                let value = record
                    .data
                    .get(header)
                    .map(serde_json::Value::from)
                    .unwrap_or(serde_json::Value::Null);
                row.insert(header.clone(), value);
            }
            row
        })
        .collect()
}

fn encode_json(headers: &[String], records: &[RecordEntry]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&records_to_rows(headers, records))?)
}

fn encode_jsonl(headers: &[String], records: &[RecordEntry]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    for row in records_to_rows(headers, records) {
        buf.extend(serde_json::to_vec(&row)?);
        buf.push(b'\n');
    }
    Ok(buf)
}

fn encode_yaml(headers: &[String], records: &[RecordEntry]) -> Result<Vec<u8>> {
    Ok(serde_yaml::to_string(&records_to_rows(headers, records))?.into_bytes())
}

/// Serializes records in INGR format.
///
/// The first line is a metadata header `#INGR: {viewIdentity}: $ID, col2, ...`
/// where the `id` column renders as `$ID`. Each record contributes one line
/// per resolved column, each value individually JSON-encoded. The footer
/// counts the records; when the hash is enabled a `# sha256:{hex}` line over
/// every preceding byte follows it, and the file does not end with a newline.
fn encode_ingr(
    view_identity: &str,
    headers: &[String],
    records: &[RecordEntry],
    opts: ExportOptions,
) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    write!(buf, "#INGR: {view_identity}: ")?;
    for (i, header) in headers.iter().enumerate() {
        if i > 0 {
            buf.extend_from_slice(b", ");
        }
        if header == "id" {
            buf.extend_from_slice(b"$ID");
        } else {
            buf.extend_from_slice(header.as_bytes());
        }
    }
    buf.push(b'\n');

    for record in records {
        for header in headers {
            let value = record.data.get(header).unwrap_or(&Value::Null);
            let encoded = serde_json::to_vec(value).map_err(|e| {
                IngrDbError::Encode(format!("ingr: failed to encode field {header:?}: {e}"))
            })?;
            buf.extend(encoded);
            buf.push(b'\n');
        }
        if opts.records_delimiter {
            buf.extend_from_slice(b"#\n");
        }
    }

    let n = records.len();
    if n == 1 {
        buf.extend_from_slice(b"# 1 record");
    } else {
        write!(buf, "# {n} records")?;
    }
    if opts.include_hash {
        buf.push(b'\n');
        let digest = Sha256::digest(&buf);
        write!(buf, "# sha256:{digest:x}")?;
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn record(key: &str, fields: &[(&str, Value)]) -> RecordEntry {
        let data: HashMap<String, Value> = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        RecordEntry::new(key, data)
    }

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn s(v: &str) -> Value {
        Value::String(v.into())
    }

    #[test]
    fn test_batch_file_name() {
        let cases = [
            ("data", "tsv", 1, 1, "data.tsv"),
            ("data", "tsv", 1, 0, "data.tsv"),
            ("data", "csv", 1, 2, "data-000001.csv"),
            ("data", "json", 5, 10, "data-000005.json"),
            ("items", "jsonl", 10, 100, "items-000010.jsonl"),
            ("records", "yaml", 999999, 1000000, "records-999999.yaml"),
        ];
        for (base, ext, num, total, want) in cases {
            assert_eq!(batch_file_name(base, ext, num, total), want);
        }
    }

    #[test]
    fn test_determine_columns() {
        let cases: &[(&[&str], &[&str], &[&str])] = &[
            // (collection columns_order, view columns, expected)
            (&["id", "x", "y"], &["id", "x"], &["id", "x"]),
            (&["id", "x", "y"], &["x", "y"], &["id", "x", "y"]),
            (&["id", "x", "y"], &["x", "id", "y"], &["id", "x", "y"]),
            (&["id", "a", "b", "c"], &[], &["id", "a", "b", "c"]),
            (&["name", "id", "email"], &[], &["id", "name", "email"]),
            (&[], &[], &["id"]),
        ];
        for (order, view_cols, want) in cases {
            let col = CollectionDef {
                id: "col1".into(),
                columns_order: order.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            };
            let view = ViewDef {
                columns: view_cols.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            };
            let got = determine_columns(&col, &view);
            assert_eq!(got, headers(want), "order={order:?} view={view_cols:?}");
        }
    }

    #[test]
    fn test_determine_columns_falls_back_to_sorted_names() {
        let mut col = CollectionDef {
            id: "col1".into(),
            ..Default::default()
        };
        for name in ["zebra", "apple", "mango"] {
            col.columns.insert(name.into(), Default::default());
        }
        let got = determine_columns(&col, &ViewDef::default());
        assert_eq!(got, headers(&["id", "apple", "mango", "zebra"]));
    }

    #[test]
    fn test_encode_tsv() {
        let cases: Vec<(&str, Vec<String>, Vec<RecordEntry>, &str)> = vec![
            (
                "single record",
                headers(&["id", "name"]),
                vec![record("1", &[("id", s("1")), ("name", s("Alice"))])],
                "id\tname\n1\tAlice\n",
            ),
            (
                "multiple records",
                headers(&["id", "name", "age"]),
                vec![
                    record(
                        "1",
                        &[("id", s("1")), ("name", s("Alice")), ("age", Value::Int(30))],
                    ),
                    record(
                        "2",
                        &[("id", s("2")), ("name", s("Bob")), ("age", Value::Int(25))],
                    ),
                ],
                "id\tname\tage\n1\tAlice\t30\n2\tBob\t25\n",
            ),
            (
                "null value",
                headers(&["id", "name"]),
                vec![record("1", &[("id", s("1")), ("name", Value::Null)])],
                "id\tname\n1\t\n",
            ),
            (
                "missing field",
                headers(&["id", "name"]),
                vec![record("1", &[("id", s("1"))])],
                "id\tname\n1\t\n",
            ),
            (
                "escape tab",
                headers(&["id", "text"]),
                vec![record("1", &[("id", s("1")), ("text", s("hello\tworld"))])],
                "id\ttext\n1\thello\\tworld\n",
            ),
            (
                "escape newline",
                headers(&["id", "text"]),
                vec![record("1", &[("id", s("1")), ("text", s("line1\nline2"))])],
                "id\ttext\n1\tline1\\nline2\n",
            ),
            (
                "escape backslash",
                headers(&["id", "text"]),
                vec![record("1", &[("id", s("1")), ("text", s("path\\to\\file"))])],
                "id\ttext\n1\tpath\\\\to\\\\file\n",
            ),
            (
                "empty records",
                headers(&["id", "name"]),
                vec![],
                "id\tname\n",
            ),
            (
                "empty data",
                headers(&["id", "name"]),
                vec![record("1", &[])],
                "id\tname\n\t\n",
            ),
        ];
        for (name, hdrs, records, want) in cases {
            let got = encode_batch(ViewFormat::Tsv, "", &hdrs, &records, ExportOptions::default())
                .unwrap();
            assert_eq!(String::from_utf8(got).unwrap(), want, "{name}");
        }
    }

    #[test]
    fn test_escape_tsv() {
        let cases = [
            ("hello", "hello"),
            ("hello\tworld", "hello\\tworld"),
            ("line1\nline2", "line1\\nline2"),
            ("path\\to\\file", "path\\\\to\\\\file"),
            ("hello\rworld", "hello\\rworld"),
            ("a\tb\nc\rd", "a\\tb\\nc\\rd"),
            ("\\t", "\\\\t"),
            ("\\\\", "\\\\\\\\"),
        ];
        for (input, want) in cases {
            assert_eq!(escape_tsv(input), want, "{input:?}");
        }
    }

    #[test]
    fn test_encode_csv_quoting() {
        let hdrs = headers(&["id", "text"]);
        let records = vec![
            record("1", &[("id", s("1")), ("text", s("Smith, John"))]),
            record("2", &[("id", s("2")), ("text", s("He said \"hello\""))]),
            record("3", &[("id", s("3")), ("text", s("Line 1\nLine 2"))]),
        ];
        let got =
            encode_batch(ViewFormat::Csv, "", &hdrs, &records, ExportOptions::default()).unwrap();

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(got.as_slice());
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 4);
        assert_eq!(&rows[0][0], "id");
        assert_eq!(&rows[1][1], "Smith, John");
        assert_eq!(&rows[2][1], "He said \"hello\"");
        assert_eq!(&rows[3][1], "Line 1\nLine 2");
    }

    #[test]
    fn test_encode_csv_numbers_booleans_and_empty() {
        let hdrs = headers(&["id", "count", "enabled"]);
        let records = vec![
            record(
                "1",
                &[("id", s("1")), ("count", Value::Int(42)), ("enabled", Value::Bool(true))],
            ),
            record(
                "2",
                &[("id", s("2")), ("count", Value::Float(3.14159)), ("enabled", Value::Null)],
            ),
            record("3", &[("id", s("3"))]),
        ];
        let got =
            encode_batch(ViewFormat::Csv, "", &hdrs, &records, ExportOptions::default()).unwrap();

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(got.as_slice());
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(&rows[1][1], "42");
        assert_eq!(&rows[1][2], "true");
        assert_eq!(&rows[2][1], "3.14159");
        assert_eq!(&rows[2][2], "");
        assert_eq!(&rows[3][1], "");
    }

    #[test]
    fn test_encode_csv_empty_records_is_header_only() {
        let got = encode_batch(
            ViewFormat::Csv,
            "",
            &headers(&["id", "name"]),
            &[],
            ExportOptions::default(),
        )
        .unwrap();
        assert_eq!(String::from_utf8(got).unwrap(), "id,name\n");
    }

    #[test]
    fn test_encode_json_header_order_and_nulls() {
        let hdrs = headers(&["id", "name", "age"]);
        let records = vec![
            record(
                "1",
                &[("id", s("1")), ("name", s("Alice")), ("age", Value::Int(30))],
            ),
            record("2", &[("id", s("2")), ("name", s("Bob"))]),
        ];
        let got =
            encode_batch(ViewFormat::Json, "", &hdrs, &records, ExportOptions::default()).unwrap();
        assert_eq!(
            String::from_utf8(got).unwrap(),
            r#"[{"id":"1","name":"Alice","age":30},{"id":"2","name":"Bob","age":null}]"#
        );
    }

    #[test]
    fn test_encode_json_empty_records() {
        let got = encode_batch(
            ViewFormat::Json,
            "",
            &headers(&["id", "name"]),
            &[],
            ExportOptions::default(),
        )
        .unwrap();
        assert_eq!(String::from_utf8(got).unwrap(), "[]");
    }

    #[test]
    fn test_encode_jsonl() {
        let hdrs = headers(&["id", "name"]);
        let records = vec![
            record("1", &[("id", s("1")), ("name", s("Alice"))]),
            record("2", &[("id", s("2")), ("name", s("Bob"))]),
        ];
        let got =
            encode_batch(ViewFormat::Jsonl, "", &hdrs, &records, ExportOptions::default()).unwrap();
        assert_eq!(
            String::from_utf8(got).unwrap(),
            "{\"id\":\"1\",\"name\":\"Alice\"}\n{\"id\":\"2\",\"name\":\"Bob\"}\n"
        );

        let empty = encode_batch(
            ViewFormat::Jsonl,
            "",
            &hdrs,
            &[],
            ExportOptions::default(),
        )
        .unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_encode_yaml_round_trips() {
        let hdrs = headers(&["id", "name"]);
        let records = vec![record("1", &[("id", s("1")), ("name", s("Alice"))])];
        let got =
            encode_batch(ViewFormat::Yaml, "", &hdrs, &records, ExportOptions::default()).unwrap();

        let parsed: Vec<HashMap<String, serde_yaml::Value>> =
            serde_yaml::from_slice(&got).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0]["id"], serde_yaml::Value::String("1".into()));
        assert_eq!(parsed[0]["name"], serde_yaml::Value::String("Alice".into()));
    }

    #[test]
    fn test_encode_ingr_framing() {
        let hdrs = headers(&["id", "name", "age"]);
        let records = vec![
            record(
                "1",
                &[("id", s("1")), ("name", s("Alice")), ("age", Value::Int(30))],
            ),
            record(
                "2",
                &[("id", s("2")), ("name", s("Bob")), ("age", Value::Int(25))],
            ),
        ];
        let got = encode_batch(
            ViewFormat::Ingr,
            "test/view",
            &hdrs,
            &records,
            ExportOptions::default(),
        )
        .unwrap();
        let want = "#INGR: test/view: $ID, name, age\n\
                    \"1\"\n\"Alice\"\n30\n\
                    \"2\"\n\"Bob\"\n25\n\
                    # 2 records";
        assert_eq!(String::from_utf8(got).unwrap(), want);
    }

    #[test]
    fn test_encode_ingr_null_and_missing_fields() {
        let hdrs = headers(&["id", "name", "age"]);
        let records = vec![record("1", &[("id", s("1")), ("name", Value::Null)])];
        let got = encode_batch(
            ViewFormat::Ingr,
            "test/view",
            &hdrs,
            &records,
            ExportOptions::default(),
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(got).unwrap(),
            "#INGR: test/view: $ID, name, age\n\"1\"\nnull\nnull\n# 1 record"
        );
    }

    #[test]
    fn test_encode_ingr_empty_records() {
        let got = encode_batch(
            ViewFormat::Ingr,
            "test/view",
            &headers(&["id", "name"]),
            &[],
            ExportOptions::default(),
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(got).unwrap(),
            "#INGR: test/view: $ID, name\n# 0 records"
        );
    }

    #[test]
    fn test_encode_ingr_records_delimiter() {
        let hdrs = headers(&["id"]);
        let records = vec![
            record("1", &[("id", s("1"))]),
            record("2", &[("id", s("2"))]),
        ];
        let opts = ExportOptions {
            records_delimiter: true,
            ..Default::default()
        };
        let got = encode_batch(ViewFormat::Ingr, "test/view", &hdrs, &records, opts).unwrap();
        assert_eq!(
            String::from_utf8(got).unwrap(),
            "#INGR: test/view: $ID\n\"1\"\n#\n\"2\"\n#\n# 2 records"
        );
    }

    #[test]
    fn test_encode_ingr_hash_covers_preceding_bytes() {
        let hdrs = headers(&["id", "name"]);
        let records = vec![record("a", &[("id", s("a")), ("name", s("Alice"))])];
        let opts = ExportOptions {
            include_hash: true,
            ..Default::default()
        };
        let got = encode_batch(ViewFormat::Ingr, "test/view", &hdrs, &records, opts).unwrap();
        let output = String::from_utf8(got).unwrap();

        // The file must not end with a newline when the hash line is present.
        assert!(!output.ends_with('\n'));

        let hash_line = output.lines().last().unwrap();
        let digest = hash_line.strip_prefix("# sha256:").unwrap();
        assert_eq!(digest.len(), 64);

        // The digest covers everything before the hash line, including the
        // count line's trailing newline.
        let body = output.strip_suffix(hash_line).unwrap();
        assert!(body.ends_with("# 1 record\n"));
        let want = format!("{:x}", Sha256::digest(body.as_bytes()));
        assert_eq!(digest, want);
    }

    #[test]
    fn test_encode_ingr_header_parses_back_to_columns() {
        let hdrs = headers(&["id", "title", "author"]);
        let got = encode_batch(
            ViewFormat::Ingr,
            "articles/default",
            &hdrs,
            &[],
            ExportOptions::default(),
        )
        .unwrap();
        let output = String::from_utf8(got).unwrap();
        let header_line = output.lines().next().unwrap();
        let cols_part = header_line
            .strip_prefix("#INGR: articles/default: ")
            .unwrap();
        let parsed: Vec<&str> = cols_part.split(", ").collect();
        assert_eq!(parsed, vec!["$ID", "title", "author"]);
    }

    #[test]
    fn test_encode_tsv_unicode_preserved() {
        let hdrs = headers(&["id", "text"]);
        let records = vec![record("1", &[("id", s("1")), ("text", s("Café 你好"))])];
        let got =
            encode_batch(ViewFormat::Tsv, "", &hdrs, &records, ExportOptions::default()).unwrap();
        assert!(String::from_utf8(got).unwrap().contains("Café 你好"));
    }
}
