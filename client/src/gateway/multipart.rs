use bytes::{BufMut, Bytes, BytesMut};
use chrono::Utc;

use shared::types::NewRecord;

/// A `multipart/form-data` body and the content type announcing its
/// boundary.
#[derive(Debug, Clone)]
pub struct MultipartBody {
    pub boundary: String,
    pub body: Bytes,
}

impl MultipartBody {
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }
}

/// Encode a new record: the text fields, then one `files` part per
/// attachment.
pub fn encode_record(record: &NewRecord) -> MultipartBody {
    let boundary = pick_boundary(record);
    let mut buf = BytesMut::new();

    for (name, value) in record.fields() {
        open_part(&mut buf, &boundary);
        buf.put_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                quote(name)
            )
            .as_bytes(),
        );
        buf.put_slice(value.as_bytes());
        buf.put_slice(b"\r\n");
    }

    for file in &record.files {
        open_part(&mut buf, &boundary);
        buf.put_slice(
            format!(
                "Content-Disposition: form-data; name=\"files\"; filename=\"{}\"\r\n",
                quote(&file.file_name)
            )
            .as_bytes(),
        );
        buf.put_slice(format!("Content-Type: {}\r\n\r\n", file.content_type).as_bytes());
        buf.put_slice(&file.data);
        buf.put_slice(b"\r\n");
    }

    buf.put_slice(format!("--{}--\r\n", boundary).as_bytes());

    MultipartBody {
        boundary,
        body: buf.freeze(),
    }
}

fn open_part(buf: &mut BytesMut, boundary: &str) {
    buf.put_slice(format!("--{}\r\n", boundary).as_bytes());
}

/// Header parameter values: no raw quotes or line breaks.
fn quote(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

/// A boundary that occurs in none of the parts.
fn pick_boundary(record: &NewRecord) -> String {
    boundary_from(record, Utc::now().timestamp_nanos_opt().unwrap_or_default())
}

fn boundary_from(record: &NewRecord, seed: i64) -> String {
    let mut attempt = 0u32;
    loop {
        let boundary = format!("----mrms{:x}{:x}", seed, attempt);
        let clashes = record
            .fields()
            .iter()
            .any(|(_, v)| v.contains(&boundary))
            || record
                .files
                .iter()
                .any(|f| contains(&f.data, boundary.as_bytes()));
        if !clashes {
            return boundary;
        }
        attempt += 1;
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}
