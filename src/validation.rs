use regex::Regex;
use std::sync::LazyLock;

use crate::error::ProxyError;

/// Player tags are alphanumeric, optionally written with a leading `#`.
static PLAYER_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#?[0-9A-Za-z]+$").expect("player tag pattern is valid"));

const ENCODED_HASH: &str = "%23";

/// Turn a path-supplied player tag into the form the upstream expects:
/// every `#` becomes `%23` and the result always starts with `%23`.
pub fn encode_tag(tag: &str) -> Result<String, ProxyError> {
    if tag.is_empty() {
        return Err(ProxyError::ClientError("Player tag is required".to_string()));
    }

    if !PLAYER_TAG.is_match(tag) {
        return Err(ProxyError::ClientError("Invalid player tag".to_string()));
    }

    let encoded = tag.replace('#', ENCODED_HASH);
    if encoded.starts_with(ENCODED_HASH) {
        Ok(encoded)
    } else {
        Ok(format!("{}{}", ENCODED_HASH, encoded))
    }
}
