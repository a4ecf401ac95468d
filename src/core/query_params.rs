use std::collections::HashMap;

/// Parse query parameters from a URI string.
///
/// Values are URL-decoded. Repeated keys keep the last value.
pub fn parse_query_params(uri: &str) -> HashMap<String, String> {
    match uri.find('?') {
        Some(start) => parse_pairs(&uri[start + 1..]),
        None => HashMap::new(),
    }
}

/// Parse an `application/x-www-form-urlencoded` body.
pub fn parse_form_body(body: &[u8]) -> HashMap<String, String> {
    parse_pairs(&String::from_utf8_lossy(body))
}

fn parse_pairs(raw: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    for param in raw.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = match param.find('=') {
            Some(eq_idx) => (&param[..eq_idx], &param[eq_idx + 1..]),
            None => (param, ""),
        };
        params.insert(decode(key), decode(value));
    }

    params
}

fn decode(raw: &str) -> String {
    // Form encoding uses '+' for spaces.
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}

/// Raw `page` parameter, left unparsed for the paginator to interpret.
pub fn page_param(params: &HashMap<String, String>) -> Option<&str> {
    params.get("page").map(|s| s.as_str())
}

/// Strip the query string (if any) from a URI, leaving the path.
pub fn path_of(uri: &str) -> &str {
    let without_query = uri.split('?').next().unwrap_or(uri);
    // Absolute URIs carry scheme and authority.
    match without_query.find("://") {
        Some(idx) => {
            let rest = &without_query[idx + 3..];
            rest.find('/').map(|p| &rest[p..]).unwrap_or("/")
        }
        None => without_query,
    }
}
