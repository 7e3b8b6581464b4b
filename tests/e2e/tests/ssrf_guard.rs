//! SSRF guard: loopback and private ranges rejected, public addresses
//! accepted, allow-list entries bypass DNS entirely.

use std::collections::HashSet;

use jaybrain_core::validate_url;

fn no_allow() -> HashSet<String> {
    HashSet::new()
}

#[test]
fn loopback_and_private_ranges_rejected() {
    for url in [
        "http://127.0.0.1/admin",
        "http://[::1]/admin",
        "http://10.0.0.5/internal",
        "http://172.16.0.1/",
        "http://192.168.1.1/router",
        "http://169.254.169.254/latest/meta-data",
        "http://0.0.0.0/",
    ] {
        assert!(validate_url(url, &no_allow()).is_err(), "{url} should be rejected");
    }
}

#[test]
fn public_address_accepted_unchanged() {
    let url = "http://93.184.216.34/page";
    assert_eq!(validate_url(url, &no_allow()).unwrap(), url);
}

#[test]
fn allow_list_bypasses_dns() {
    let mut allow = HashSet::new();
    allow.insert("internal.corp".to_string());
    // internal.corp does not resolve here; the allow-set lets it through
    assert!(validate_url("http://internal.corp/dashboard", &allow).is_ok());
    // Everything else still goes through resolution
    assert!(validate_url("http://other.invalid/", &allow).is_err());
}

#[test]
fn bad_schemes_and_shapes_rejected() {
    for url in [
        "ftp://example.com/file",
        "file:///etc/passwd",
        "gopher://example.com/",
        "http://",
        "not a url at all",
    ] {
        assert!(validate_url(url, &no_allow()).is_err(), "{url} should be rejected");
    }
}
