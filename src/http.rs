//! URL helpers shared by the REST clients.

/// Parse `url` and drop trailing slashes from its path.
pub(crate) fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string())
}

/// Join `path` onto `base` with exactly one slash between them.
pub(crate) fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

/// Percent-encode caller-supplied text for use inside one path segment.
///
/// `/`, `?` and `#` are encoded; `.` is not, so a bare `.` or `..` must be wrapped by the caller.
pub(crate) fn encode_segment(text: &str) -> String {
    urlencoding::encode(text).into_owned()
}
