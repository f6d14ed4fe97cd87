//! `host:port` address validation
//!
//! Purely syntactic: no DNS lookups and no reachability checks. The same input
//! always yields the same result.

use crate::error::InvalidAddress;
use portal_types::PortalAddress;

/// Parse and validate a `host:port` string.
///
/// The string is split on the last `:` so that bracket-less IPv6 hosts such
/// as `::1:8080` keep their colons in the host segment.
pub fn validate_address(address: &str) -> Result<PortalAddress, InvalidAddress> {
    if address.is_empty() {
        return Err(InvalidAddress::Empty);
    }

    let (host, port) = address
        .rsplit_once(':')
        .ok_or_else(|| InvalidAddress::MissingPort(address.to_string()))?;

    if host.is_empty() {
        return Err(InvalidAddress::EmptyHost(address.to_string()));
    }

    Ok(PortalAddress::new(host, parse_port(port)?))
}

/// Decimal port in [1, 65535]. Signs, whitespace and an empty segment are rejected.
fn parse_port(segment: &str) -> Result<u16, InvalidAddress> {
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return Err(InvalidAddress::InvalidPort(segment.to_string()));
    }

    // All digits, so a parse failure can only be overflow
    let value: u64 = segment
        .parse()
        .map_err(|_| InvalidAddress::PortOutOfRange(segment.to_string()))?;

    match u16::try_from(value) {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(InvalidAddress::PortOutOfRange(segment.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_addresses() {
        let addr = validate_address("localhost:10000").unwrap();
        assert_eq!(addr.host, "localhost");
        assert_eq!(addr.port, 10000);

        let addr = validate_address("10.0.0.5:1").unwrap();
        assert_eq!(addr.port, 1);

        let addr = validate_address("db.internal:65535").unwrap();
        assert_eq!(addr.port, 65535);
    }

    #[test]
    fn test_splits_on_last_colon() {
        let addr = validate_address("::1:8080").unwrap();
        assert_eq!(addr.host, "::1");
        assert_eq!(addr.port, 8080);
        assert_eq!(addr.to_string(), "::1:8080");
    }

    #[test]
    fn test_missing_colon() {
        assert_eq!(
            validate_address("localhost"),
            Err(InvalidAddress::MissingPort("localhost".to_string()))
        );
        assert_eq!(validate_address(""), Err(InvalidAddress::Empty));
    }

    #[test]
    fn test_empty_host() {
        assert!(matches!(
            validate_address(":8080"),
            Err(InvalidAddress::EmptyHost(_))
        ));
    }

    #[test]
    fn test_bad_ports() {
        for input in ["localhost:", "localhost:http", "localhost:+80", "localhost:-1", "localhost: 80"] {
            assert!(
                matches!(validate_address(input), Err(InvalidAddress::InvalidPort(_))),
                "expected InvalidPort for {:?}",
                input
            );
        }

        for input in ["localhost:0", "localhost:65536", "localhost:99999", "localhost:184467440737095516160"] {
            assert!(
                matches!(validate_address(input), Err(InvalidAddress::PortOutOfRange(_))),
                "expected PortOutOfRange for {:?}",
                input
            );
        }
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(validate_address("web:80"), validate_address("web:80"));
        assert_eq!(validate_address("web:0"), validate_address("web:0"));
    }
}
