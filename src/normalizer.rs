use crate::error::PreviewError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use tracing::debug;
use url::{Host, Url};

/// Relaxed URL token matcher. Finds links with an explicit `scheme://`, and
/// schemeless `host.tld[:port][/path]` forms where the TLD is a known generic
/// one, a two-letter country code, punycode, or a non-ASCII (IDN) label.
static URL_TOKEN: Lazy<Regex> = Lazy::new(|| {
    let label = r"[\p{L}\p{N}](?:[\p{L}\p{N}\-]*[\p{L}\p{N}])?";
    let tld = r"(?:com|org|net|edu|gov|mil|int|info|biz|name|pro|aero|coop|museum|mobi|asia|tel|travel|jobs|cat|app|dev|blog|shop|site|online|store|tech|xyz|club|news|live|media|link|page|cloud|design|xn--[a-z0-9\-]+|[a-z]{2}|[\p{L}&&[^\x00-\x7F]]{2,})";
    let pattern = format!(
        r#"(?i)(?P<full>\b[a-z][a-z0-9+.\-]*://[^\s<>"']+)|(?P<bare>\b(?:(?:{label}\.)+{tld}|\d{{1,3}}(?:\.\d{{1,3}}){{3}})\b(?::\d{{1,5}})?(?:[/?#][^\s<>"']*)?)"#
    );
    Regex::new(&pattern).expect("URL token pattern is valid")
});

/// Absolute-path, protocol-relative and dot-relative references. These never
/// name a host of their own, whatever their file names look like.
fn is_path_reference(link: &str) -> bool {
    link.starts_with('/') || link.starts_with("./") || link.starts_with("../")
}

/// A link starts the input or follows whitespace, an opening bracket or a
/// quote. Dotted names inside a path (`/img/avatar.xs.jpg`) are not links.
fn at_token_boundary(text: &str, start: usize) -> bool {
    text[..start]
        .chars()
        .next_back()
        .map_or(true, |c| c.is_whitespace() || matches!(c, '(' | '[' | '<' | '"' | '\''))
}

/// Configuration for link normalization
#[derive(Debug, Clone, Default)]
pub struct NormalizerConfig {
    /// Hosts that are refused, along with their subdomains
    pub blocked_hosts: HashSet<String>,
}

impl NormalizerConfig {
    pub fn with_blocked_host(mut self, host: impl Into<String>) -> Self {
        self.blocked_hosts.insert(host.into().to_lowercase());
        self
    }
}

/// Turns arbitrary user input into a canonical absolute URL.
#[derive(Debug, Clone, Default)]
pub struct UrlNormalizer {
    config: NormalizerConfig,
}

enum Token<'a> {
    Absolute(&'a str),
    Schemeless(&'a str),
}

impl UrlNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Validates `raw` and returns its canonical form.
    ///
    /// A single URL-like token inside `raw` is taken as an absolute link (with
    /// `http://` assumed when it has no scheme). Input without any such token is
    /// a relative reference and needs `base`. Several tokens make the input
    /// ambiguous.
    pub fn normalize(&self, raw: &str, base: Option<&Url>) -> Result<Url, PreviewError> {
        let link = raw.trim();
        if link.is_empty() {
            return Err(PreviewError::EmptyLink);
        }

        let tokens: Vec<Token<'_>> = if base.is_some() && is_path_reference(link) {
            Vec::new()
        } else {
            URL_TOKEN
                .captures_iter(link)
                .filter(|caps| caps.get(0).is_some_and(|m| at_token_boundary(link, m.start())))
                .filter_map(|caps| {
                    caps.name("full")
                        .map(|m| Token::Absolute(m.as_str()))
                        .or_else(|| caps.name("bare").map(|m| Token::Schemeless(m.as_str())))
                })
                .collect()
        };

        let mut url = match tokens.as_slice() {
            [Token::Absolute(token)] => Self::parse(token)?,
            [Token::Schemeless(token)] => Self::parse(&format!("http://{token}"))?,
            [] => Self::join(base, link)?,
            _ => return Err(PreviewError::AmbiguousLink(link.to_string())),
        };

        self.canonicalize_host(&mut url)?;

        if let Some(host) = url.host_str() {
            if self.is_host_blocked(host) {
                return Err(PreviewError::BlacklistedHost(host.to_string()));
            }
        }

        debug!(input = %link, canonical = %url, "Normalized link");
        Ok(url)
    }

    fn parse(link: &str) -> Result<Url, PreviewError> {
        Url::parse(link).map_err(|e| Self::map_parse_error(e, link))
    }

    fn join(base: Option<&Url>, link: &str) -> Result<Url, PreviewError> {
        let base = base.ok_or(PreviewError::NoBaseForRelative)?;
        base.join(link).map_err(|e| Self::map_parse_error(e, link))
    }

    fn map_parse_error(e: url::ParseError, link: &str) -> PreviewError {
        match e {
            url::ParseError::IdnaError => PreviewError::InvalidIDNAHost(link.to_string()),
            other => PreviewError::UrlParseError(other),
        }
    }

    /// Lower-cases the host and converts internationalized names to ASCII.
    /// Special schemes already get this from the parser; other schemes keep an
    /// opaque host that is converted here.
    fn canonicalize_host(&self, url: &mut Url) -> Result<(), PreviewError> {
        let domain = match url.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            Some(_) => return Ok(()),
            None => {
                return Err(PreviewError::InvalidUrl(format!(
                    "{url} has no host"
                )))
            }
        };

        let decoded = urlencoding::decode(&domain)
            .map(|d| d.into_owned())
            .unwrap_or_else(|_| domain.clone());
        let ascii = url::quirks::domain_to_ascii(&decoded.to_lowercase());
        if ascii.is_empty() {
            return Err(PreviewError::InvalidIDNAHost(domain));
        }

        if ascii != domain {
            url.set_host(Some(&ascii))
                .map_err(|_| PreviewError::InvalidIDNAHost(domain))?;
        }
        Ok(())
    }

    fn is_host_blocked(&self, host: &str) -> bool {
        self.config
            .blocked_hosts
            .iter()
            .any(|blocked| host == blocked || host.ends_with(&format!(".{blocked}")))
    }
}
