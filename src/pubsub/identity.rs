//! Client identity from the connection handshake.

use crate::ClientId;
use url::form_urlencoded;

/// Header carrying a peer-supplied client id.
pub const CLIENT_ID_HEADER: &str = "x-client-id";

/// Query parameter carrying a peer-supplied client id.
pub const CLIENT_ID_QUERY_PARAM: &str = "client_id";

/// Upper bound on a peer-supplied id. Longer ids are ignored.
const MAX_CLIENT_ID_LEN: usize = 128;

fn accept(raw: &str) -> Option<ClientId> {
    let raw = raw.trim();
    (!raw.is_empty() && raw.len() <= MAX_CLIENT_ID_LEN).then(|| ClientId::from(raw))
}

/// Find and percent-decode the client id parameter in a raw query string.
pub(crate) fn client_id_param(query: &str) -> Option<String> {
    form_urlencoded::parse(query.trim_start_matches('?').as_bytes())
        .find(|(k, _)| k == CLIENT_ID_QUERY_PARAM)
        .map(|(_, v)| v.into_owned())
}

/// Resolve the peer-supplied client id from the header and an already
/// decoded query value. The header wins. Returns `None` when neither carries
/// a usable id, in which case the hub generates one.
pub(crate) fn resolve_client_id(header: Option<&str>, query: Option<&str>) -> Option<ClientId> {
    header.and_then(accept).or_else(|| query.and_then(accept))
}

/// Resolve the peer-supplied client id from the header and a raw query
/// string.
pub(crate) fn client_id_from_handshake(
    header: Option<&str>,
    query: Option<&str>,
) -> Option<ClientId> {
    let param = query.and_then(client_id_param);
    resolve_client_id(header, param.as_deref())
}
