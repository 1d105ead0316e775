/// Turns a server-relative document URL into an absolute one.
///
/// Anything not starting with `/` is returned unchanged, well-formed or not.
pub(super) fn resolve_document_url(url: &str, base_origin: &str) -> String {
    if url.starts_with('/') {
        format!("{}{}", base_origin.trim_end_matches('/'), url)
    } else {
        url.to_string()
    }
}
