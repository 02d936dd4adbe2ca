//! MCP protocol version the gateway declares and negotiates against.

/// The single protocol version this gateway speaks. Unlike the teacher's
/// client-facing SDK, the gateway does not negotiate across a range of
/// historical versions — it is a single deployed service, not a library
/// consumed by arbitrary MCP peers of varying vintage.
pub const PROTOCOL_VERSION: &str = "2025-03-26";

/// `MiddlewareChain`'s `ProtocolVersionCheck`: when the client sends a
/// protocol-version header, it must match exactly.
pub fn negotiate(requested: Option<&str>) -> Result<(), String> {
    match requested {
        None => Ok(()),
        Some(v) if v == PROTOCOL_VERSION => Ok(()),
        Some(v) => Err(format!(
            "unsupported protocol version {v}, server declares {PROTOCOL_VERSION}"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_version_is_accepted() {
        assert!(negotiate(Some(PROTOCOL_VERSION)).is_ok());
    }

    #[test]
    fn absent_header_is_accepted() {
        assert!(negotiate(None).is_ok());
    }

    #[test]
    fn mismatched_version_is_rejected() {
        assert!(negotiate(Some("2024-01-01")).is_err());
    }
}
