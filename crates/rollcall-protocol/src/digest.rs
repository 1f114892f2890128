//! HTTP authentication for terminals.
//!
//! Terminals authenticate with HTTP digest (RFC 7616 subset: MD5 and
//! MD5-sess, `qop=auth`) and, on legacy firmware, basic authentication.
//!
//! A [`DigestChallenge`] is parsed from the `WWW-Authenticate` header of a 401
//! response and then reused for subsequent requests with an incrementing nonce
//! count, so most calls complete in a single round trip.
//!
//! # Examples
//!
//! ```
//! use rollcall_core::Credentials;
//! use rollcall_protocol::digest::DigestChallenge;
//!
//! let challenge = DigestChallenge::parse(
//!     r#"Digest realm="DS-K1T341", qop="auth", nonce="4e6a", stale="FALSE""#,
//! )
//! .unwrap();
//! let header = challenge.authorization(
//!     &Credentials::new("admin", "pw"),
//!     "GET",
//!     "/ISAPI/AccessControl/capabilities",
//!     1,
//!     "0a4f113b",
//! );
//! assert!(header.starts_with("Digest username=\"admin\""));
//! assert!(header.contains("nc=00000001"));
//! ```

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use md5::{Digest, Md5};
use rollcall_core::{Credentials, Error, Result};
use std::fmt::Write as _;

/// Hash algorithm announced by the challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestAlgorithm {
    Md5,
    Md5Sess,
}

impl DigestAlgorithm {
    fn as_str(self) -> &'static str {
        match self {
            DigestAlgorithm::Md5 => "MD5",
            DigestAlgorithm::Md5Sess => "MD5-sess",
        }
    }
}

/// Parsed `WWW-Authenticate: Digest ...` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestChallenge {
    pub realm: String,
    pub nonce: String,
    pub opaque: Option<String>,
    /// `true` when the server offered `qop=auth`
    pub qop_auth: bool,
    pub algorithm: DigestAlgorithm,
    /// Nonce expired but the credentials were accepted
    pub stale: bool,
}

impl DigestChallenge {
    /// Parse a digest challenge header value.
    ///
    /// # Errors
    /// Returns `Error::Auth` if the scheme is not `Digest`, `realm` or `nonce`
    /// is missing, or the algorithm is not MD5 based.
    pub fn parse(header: &str) -> Result<Self> {
        let header = header.trim();
        let params = match header.split_once(char::is_whitespace) {
            Some((scheme, rest)) if scheme.eq_ignore_ascii_case("digest") => rest,
            _ => return Err(Error::auth(format!("unsupported auth scheme: {header}"))),
        };

        let mut realm = None;
        let mut nonce = None;
        let mut opaque = None;
        let mut qop_auth = false;
        let mut algorithm = DigestAlgorithm::Md5;
        let mut stale = false;

        for (key, value) in parse_params(params) {
            match key.to_ascii_lowercase().as_str() {
                "realm" => realm = Some(value),
                "nonce" => nonce = Some(value),
                "opaque" => opaque = Some(value),
                "qop" => qop_auth = value.split(',').any(|q| q.trim().eq_ignore_ascii_case("auth")),
                "stale" => stale = value.eq_ignore_ascii_case("true"),
                "algorithm" => {
                    algorithm = match value.to_ascii_uppercase().as_str() {
                        "MD5" => DigestAlgorithm::Md5,
                        "MD5-SESS" => DigestAlgorithm::Md5Sess,
                        other => {
                            return Err(Error::auth(format!("unsupported digest algorithm: {other}")));
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(Self {
            realm: realm.ok_or_else(|| Error::auth("digest challenge without realm"))?,
            nonce: nonce.ok_or_else(|| Error::auth("digest challenge without nonce"))?,
            opaque,
            qop_auth,
            algorithm,
            stale,
        })
    }

    /// Compute the `Authorization` header value for one request.
    ///
    /// `nc` is the nonce count for this challenge (starting at 1) and `cnonce`
    /// a client nonce unique per request.
    #[must_use]
    pub fn authorization(
        &self,
        credentials: &Credentials,
        method: &str,
        uri: &str,
        nc: u32,
        cnonce: &str,
    ) -> String {
        let nc = format!("{nc:08x}");
        let mut ha1 = md5_hex(&format!(
            "{}:{}:{}",
            credentials.username, self.realm, credentials.password
        ));
        if self.algorithm == DigestAlgorithm::Md5Sess {
            ha1 = md5_hex(&format!("{ha1}:{}:{cnonce}", self.nonce));
        }
        let ha2 = md5_hex(&format!("{method}:{uri}"));
        let response = if self.qop_auth {
            md5_hex(&format!("{ha1}:{}:{nc}:{cnonce}:auth:{ha2}", self.nonce))
        } else {
            md5_hex(&format!("{ha1}:{}:{ha2}", self.nonce))
        };

        let mut header = format!(
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{uri}\", algorithm={}, response=\"{response}\"",
            credentials.username,
            self.realm,
            self.nonce,
            self.algorithm.as_str(),
        );
        if let Some(opaque) = &self.opaque {
            let _ = write!(header, ", opaque=\"{opaque}\"");
        }
        if self.qop_auth {
            let _ = write!(header, ", qop=auth, nc={nc}, cnonce=\"{cnonce}\"");
        }
        header
    }
}

/// `Authorization` header value for HTTP basic authentication.
#[must_use]
pub fn basic_authorization(credentials: &Credentials) -> String {
    let token = STANDARD.encode(format!("{}:{}", credentials.username, credentials.password));
    format!("Basic {token}")
}

fn md5_hex(input: &str) -> String {
    let digest = Md5::digest(input.as_bytes());
    digest.iter().fold(String::with_capacity(32), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

/// Split `key=value` pairs, honouring quoted values that contain commas.
fn parse_params(input: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace() || *c == ',').is_some() {}
        let key: String = chars.by_ref().take_while(|c| *c != '=').collect();
        let key = key.trim().to_string();
        if key.is_empty() {
            break;
        }

        let mut value = String::new();
        if chars.next_if_eq(&'"').is_some() {
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    _ => value.push(c),
                }
            }
        } else {
            while let Some(c) = chars.next_if(|c| *c != ',') {
                value.push(c);
            }
            value = value.trim().to_string();
        }
        params.push((key, value));
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rfc2617_vector() {
        let challenge = DigestChallenge::parse(
            r#"Digest realm="testrealm@host.com", qop="auth,auth-int", nonce="dcd98b7102dd2f0e8b11d0f600bfb0c093", opaque="5ccc069c403ebaf9f0171e9517f40e41""#,
        )
        .unwrap();
        assert!(challenge.qop_auth);
        assert_eq!(challenge.opaque.as_deref(), Some("5ccc069c403ebaf9f0171e9517f40e41"));

        let header = challenge.authorization(
            &Credentials::new("Mufasa", "Circle Of Life"),
            "GET",
            "/dir/index.html",
            1,
            "0a4f113b",
        );
        assert!(header.contains("response=\"6629fae49393a05397450978507c4ef1\""));
        assert!(header.contains("nc=00000001"));
        assert!(header.contains("cnonce=\"0a4f113b\""));
    }

    #[test]
    fn test_nonce_count_changes_response() {
        let challenge = DigestChallenge::parse(r#"Digest realm="r", nonce="n", qop="auth""#).unwrap();
        let creds = Credentials::new("admin", "pw");
        let first = challenge.authorization(&creds, "POST", "/ISAPI/x", 1, "c");
        let second = challenge.authorization(&creds, "POST", "/ISAPI/x", 2, "c");
        assert_ne!(first, second);
        assert!(second.contains("nc=00000002"));
    }

    #[test]
    fn test_without_qop_uses_legacy_response() {
        let challenge = DigestChallenge::parse(r#"Digest realm="r", nonce="n""#).unwrap();
        let header = challenge.authorization(&Credentials::new("a", "b"), "GET", "/", 1, "c");
        assert!(!header.contains("qop="));
        assert!(!header.contains("cnonce"));
    }

    #[test]
    fn test_stale_and_unquoted_params() {
        let challenge =
            DigestChallenge::parse(r#"Digest realm="r", nonce="n", stale=TRUE, algorithm=MD5-sess"#)
                .unwrap();
        assert!(challenge.stale);
        assert_eq!(challenge.algorithm, DigestAlgorithm::Md5Sess);
    }

    #[test]
    fn test_rejects_other_schemes_and_missing_fields() {
        assert!(DigestChallenge::parse("Basic realm=\"r\"").is_err());
        assert!(DigestChallenge::parse("Digest realm=\"r\"").is_err());
        assert!(DigestChallenge::parse("Digest realm=\"r\", nonce=\"n\", algorithm=SHA-256").is_err());
    }

    #[test]
    fn test_basic_authorization() {
        assert_eq!(
            basic_authorization(&Credentials::new("Aladdin", "open sesame")),
            "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ=="
        );
    }
}
