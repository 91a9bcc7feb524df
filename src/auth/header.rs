//! Parser for the SigV4 `Authorization` header.
//!
//! The header-based scheme looks like:
//!
//! ```text
//! AWS4-HMAC-SHA256 Credential=AKID/20130524/us-east-1/sqs/aws4_request,
//!     SignedHeaders=host;x-amz-date;x-amz-target, Signature=5d672d79...
//! ```
//!
//! Signature Version 2 headers (`AWS <key>:<sig>`) are recognized and
//! rejected explicitly rather than reported as malformed.

use pom::utf8::{end, one_of, seq, sym, Parser};

use crate::error::Error;

pub const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Parsed components of a SigV4 `Authorization` header.
#[derive(Debug)]
pub struct SigV4Header<'a> {
    pub algorithm: &'a str,
    /// The access key id the request was signed with.
    pub key_id: &'a str,
    /// Credential scope date, `YYYYMMDD`.
    pub date: &'a str,
    pub region: &'a str,
    pub service: &'a str,
    /// Header names covered by the signature, as presented.
    pub signed_headers: Vec<&'a str>,
    /// Hex-encoded signature to verify against.
    pub signature: &'a str,
}

fn token<'a>() -> Parser<'a, &'a str> {
    one_of("abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789-_")
        .repeat(1..)
        .collect()
}

fn scope_part<'a>() -> Parser<'a, &'a str> {
    one_of("abcdefghijklmnopqrstuvwxyz0123456789-")
        .repeat(1..)
        .collect()
}

fn header_name<'a>() -> Parser<'a, &'a str> {
    one_of("abcdefghijklmnopqrstuvwxyz0123456789-.")
        .repeat(1..)
        .collect()
}

fn hex_str<'a>() -> Parser<'a, &'a str> {
    one_of("0123456789abcdef").repeat(1..).collect()
}

fn field_sep<'a>() -> Parser<'a, Vec<char>> {
    sym(',') * sym(' ').repeat(0..)
}

pub fn sigv4_header<'a>() -> Parser<'a, SigV4Header<'a>> {
    let algorithm = seq(ALGORITHM);
    let space = sym(' ').repeat(1..);

    let credential = seq("Credential=") * token() - sym('/') + scope_part() - sym('/')
        + scope_part()
        - sym('/')
        + scope_part()
        - seq("/aws4_request");

    let signed_headers = seq("SignedHeaders=")
        * (header_name() + (sym(';') * header_name()).repeat(0..)).map(|(first, rest)| {
            let mut names = vec![first];
            names.extend(rest);
            names
        });

    let signature = seq("Signature=") * hex_str();

    ((algorithm - space) + (credential - field_sep()) + (signed_headers - field_sep()) + signature
        - end())
    .map(
        |(((algorithm, (((key_id, date), region), service)), signed_headers), signature)| {
            SigV4Header {
                algorithm,
                key_id,
                date,
                region,
                service,
                signed_headers,
                signature,
            }
        },
    )
    .name("sigv4 authorization header")
}

pub fn parse(header: &str) -> Result<SigV4Header<'_>, Error> {
    if header.starts_with("AWS ") {
        return Err(Error::UnsupportedSignatureVersion);
    }

    sigv4_header()
        .parse_str(header)
        .map_err(|e| Error::MalformedAuthHeader {
            message: e.to_string(),
        })
}
