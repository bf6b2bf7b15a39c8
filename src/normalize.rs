/// Collapse `.` and `..` segments in a slash-delimited path into a canonical
/// absolute path.
///
/// The result always begins and ends with `/`. Each `..` removes the nearest
/// surviving ancestor segment; `..` with no ancestor left is dropped, so the
/// path clamps at the root instead of erroring. Idempotent:
/// `normalize(normalize(p)) == normalize(p)`.
pub fn normalize(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    if segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", segments.join("/"))
    }
}
