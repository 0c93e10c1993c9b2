use crate::config::RawEncoding;

/// Render a raw-mode buffer for output.
pub fn render_raw(data: &[u8], encoding: RawEncoding) -> Vec<u8> {
    match encoding {
        RawEncoding::Binary => data.to_vec(),
        RawEncoding::Escaped => escape_bytes(data),
    }
}

/// Byte-literal text form of `data`, terminated by a newline.
///
/// Printable ASCII is kept, `\t` `\n` `\r` and backslash use their short
/// escapes, everything else becomes `\xNN`. The literal is single-quoted
/// unless the data holds `'` and no `"`.
fn escape_bytes(data: &[u8]) -> Vec<u8> {
    let quote = if data.contains(&b'\'') && !data.contains(&b'"') {
        b'"'
    } else {
        b'\''
    };

    let mut out = Vec::with_capacity(data.len() + 4);
    out.push(b'b');
    out.push(quote);
    for &byte in data {
        match byte {
            b'\\' => out.extend_from_slice(b"\\\\"),
            b'\t' => out.extend_from_slice(b"\\t"),
            b'\n' => out.extend_from_slice(b"\\n"),
            b'\r' => out.extend_from_slice(b"\\r"),
            b if b == quote => {
                out.push(b'\\');
                out.push(b);
            }
            0x20..=0x7e => out.push(byte),
            _ => out.extend_from_slice(format!("\\x{byte:02x}").as_bytes()),
        }
    }
    out.push(quote);
    out.push(b'\n');
    out
}
