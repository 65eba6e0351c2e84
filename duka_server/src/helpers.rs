use std::{net::IpAddr, str::FromStr};

use actix_web::HttpRequest;
use log::{debug, trace, warn};
use regex::Regex;

/// Get the remote IP address from the request. It uses 3 sources to determine the IP address, in decreasing order
/// of preference:
/// 1. The `X-Forwarded-For` header, iif `use_x_forwarded_for` is set to true in the configuration.
/// 2. The `Forwarded` header, iif `use_forwarded` is set to true in the configuration.
/// 3. The peer address from the connection info.
pub fn get_remote_ip(req: &HttpRequest, use_x_forwarded_for: bool, use_forwarded: bool) -> Option<IpAddr> {
    let mut result = None;
    if use_x_forwarded_for {
        trace!("Checking X-Forwarded-For header");
        // Proxies append to the header, so the first entry is the original client
        result = req
            .headers()
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|s| IpAddr::from_str(s.trim()).ok());
        if let Some(ip) = result {
            debug!("Using X-Forwarded-For header for remote address: {ip}");
        }
    }
    if use_forwarded && result.is_none() {
        trace!("Checking Forwarded header");
        result = req.headers().get("Forwarded").and_then(|v| v.to_str().ok()).and_then(parse_forwarded_for);
        if let Some(ip) = result {
            debug!("Using Forwarded header for remote address: {ip}");
        }
    }
    result.or_else(|| {
        let peer_addr = req.connection_info().peer_addr().map(|a| a.to_string());
        trace!("Using Peer address for remote address: {:?}", peer_addr);
        peer_addr.and_then(|s| IpAddr::from_str(&s).ok())
    })
}

/// Extracts the `for=` address of a `Forwarded` header value. Quoted and bracketed IPv6 forms are accepted.
pub fn parse_forwarded_for(value: &str) -> Option<IpAddr> {
    let re = Regex::new(r#"for=(?P<ip>[^;,]+)"#)
        .map_err(|e| warn!("Could not compile the Forwarded header pattern. {e}"))
        .ok()?;
    re.captures(value)
        .and_then(|caps| caps.name("ip"))
        .map(|m| m.as_str().trim_matches('"').trim_start_matches('[').trim_end_matches(']'))
        .and_then(|s| IpAddr::from_str(s).ok())
}

/// True if the request may proceed. With no whitelist configured every request may.
pub fn is_whitelisted(peer: Option<IpAddr>, whitelist: Option<&[IpAddr]>) -> bool {
    match (peer, whitelist) {
        (_, None) => true,
        (Some(ip), Some(whitelist)) => whitelist.contains(&ip),
        (None, Some(_)) => {
            warn!("💻️ No IP address found in the remote peer request, denying access.");
            false
        },
    }
}

#[cfg(test)]
mod test {
    use actix_web::test::TestRequest;

    use super::*;

    #[test]
    fn forwarded_header() {
        assert_eq!(parse_forwarded_for("for=192.0.2.60;proto=http;by=203.0.113.43"), "192.0.2.60".parse().ok());
        assert_eq!(parse_forwarded_for(r#"for="[2001:db8:cafe::17]""#), "2001:db8:cafe::17".parse().ok());
        assert_eq!(parse_forwarded_for("for=unknown"), None);
        assert_eq!(parse_forwarded_for("proto=https"), None);
    }

    #[test]
    fn remote_ip_sources() {
        let req = TestRequest::default()
            .peer_addr("10.0.0.1:5000".parse().unwrap())
            .insert_header(("X-Forwarded-For", "196.201.214.200, 10.0.0.2"))
            .insert_header(("Forwarded", "for=196.201.214.206"))
            .to_http_request();
        assert_eq!(get_remote_ip(&req, false, false), "10.0.0.1".parse().ok());
        assert_eq!(get_remote_ip(&req, true, false), "196.201.214.200".parse().ok());
        assert_eq!(get_remote_ip(&req, false, true), "196.201.214.206".parse().ok());
        assert_eq!(get_remote_ip(&req, true, true), "196.201.214.200".parse().ok());
    }

    #[test]
    fn whitelist_checks() {
        let allowed: Vec<IpAddr> = vec!["196.201.214.200".parse().unwrap()];
        assert!(is_whitelisted(None, None));
        assert!(is_whitelisted(allowed.first().copied(), Some(&allowed)));
        assert!(!is_whitelisted("10.0.0.1".parse().ok(), Some(&allowed)));
        assert!(!is_whitelisted(None, Some(&allowed)));
    }
}
