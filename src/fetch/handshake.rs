//! Download confirmation handshake
//!
//! Above some undocumented size the host answers the export endpoint with an
//! HTML "can't scan this file for viruses" page instead of the bytes. The
//! page (or a `download_warning*` cookie) carries a token; replaying it as
//! `confirm=<token>` releases the file. When the primary endpoint keeps
//! serving HTML, the usercontent host gets exactly one try.
//!
//! ```text
//! Initial ──token──▶ ConfirmationRequired ──html──▶ Retried ──html──▶ give up
//!    │                        │                        │
//!    └──html, no token──▶ Retried                      │
//!    └──payload──────────────┴────────payload──────────┴──▶ Done
//! ```
//!
//! At most three requests are made per download.

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, CONTENT_TYPE};

/// Cookie name prefix the host uses for pending download confirmations.
pub const WARNING_COOKIE_PREFIX: &str = "download_warning";

/// Token sent to the alternate endpoint when none was found.
pub const DEFAULT_CONFIRM_TOKEN: &str = "t";

/// Body token patterns, tried in order.
static BODY_TOKEN_PATTERNS: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        // <a href="/uc?export=download&amp;confirm=AbC1&amp;id=...">
        Regex::new(r"confirm=([0-9A-Za-z_-]+)").expect("valid confirm link regex"),
        // <input type="hidden" name="confirm" value="t">
        Regex::new(r#"name="confirm"\s+value="([0-9A-Za-z_-]+)""#)
            .expect("valid confirm input regex"),
    ]
});

/// Which download endpoint a request goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Primary,
    Alternate,
}

/// What a response turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// Non-HTML body: the file itself.
    Payload,
    /// A `download_warning*` cookie was set.
    CookieToken(String),
    /// An HTML page embedding a confirm token.
    BodyToken(String),
    /// An HTML page without any token.
    Html,
}

impl Signal {
    fn token(&self) -> Option<&str> {
        match self {
            Signal::CookieToken(t) | Signal::BodyToken(t) => Some(t),
            Signal::Payload | Signal::Html => None,
        }
    }
}

/// Handshake progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handshake {
    Initial,
    ConfirmationRequired { token: String },
    Retried,
    Done,
}

/// What to do after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Stream the current response to disk.
    Download,
    /// Issue another request.
    Request {
        endpoint: Endpoint,
        token: Option<String>,
    },
    /// The host never produced the file.
    GiveUp,
}

impl Handshake {
    /// The request that starts every handshake.
    pub fn first_step() -> Step {
        Step::Request {
            endpoint: Endpoint::Primary,
            token: None,
        }
    }

    /// Advance on the signal observed for the last request.
    #[must_use]
    pub fn advance(self, signal: &Signal) -> (Handshake, Step) {
        if *signal == Signal::Payload {
            return (Handshake::Done, Step::Download);
        }

        match self {
            Handshake::Initial => match signal.token() {
                Some(token) => (
                    Handshake::ConfirmationRequired {
                        token: token.to_string(),
                    },
                    Step::Request {
                        endpoint: Endpoint::Primary,
                        token: Some(token.to_string()),
                    },
                ),
                None => (
                    Handshake::Retried,
                    Step::Request {
                        endpoint: Endpoint::Alternate,
                        token: Some(DEFAULT_CONFIRM_TOKEN.to_string()),
                    },
                ),
            },
            Handshake::ConfirmationRequired { token } => {
                // Still HTML after the replay. A fresher token wins if the host issued one.
                let token = signal.token().map_or(token, str::to_string);
                (
                    Handshake::Retried,
                    Step::Request {
                        endpoint: Endpoint::Alternate,
                        token: Some(token),
                    },
                )
            }
            Handshake::Retried | Handshake::Done => (Handshake::Done, Step::GiveUp),
        }
    }
}

/// `true` when the declared content type is HTML.
pub fn is_html(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"))
}

/// Confirm token from the first `download_warning*` cookie.
pub fn token_from_cookies<N, V>(cookies: impl IntoIterator<Item = (N, V)>) -> Option<String>
where
    N: AsRef<str>,
    V: AsRef<str>,
{
    cookies
        .into_iter()
        .find(|(name, value)| {
            name.as_ref().starts_with(WARNING_COOKIE_PREFIX) && !value.as_ref().is_empty()
        })
        .map(|(_, value)| value.as_ref().to_string())
}

/// Confirm token embedded in an interstitial page.
pub fn token_from_body(body: &str) -> Option<String> {
    BODY_TOKEN_PATTERNS
        .iter()
        .find_map(|re| re.captures(body))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn request(endpoint: Endpoint, token: Option<&str>) -> Step {
        Step::Request {
            endpoint,
            token: token.map(str::to_string),
        }
    }

    #[test]
    fn payload_finishes_immediately() {
        let (state, step) = Handshake::Initial.advance(&Signal::Payload);
        assert_eq!(state, Handshake::Done);
        assert_eq!(step, Step::Download);
    }

    #[test]
    fn cookie_token_replays_on_primary() {
        let (state, step) = Handshake::Initial.advance(&Signal::CookieToken("Xy_1".into()));
        assert_eq!(
            state,
            Handshake::ConfirmationRequired {
                token: "Xy_1".into()
            }
        );
        assert_eq!(step, request(Endpoint::Primary, Some("Xy_1")));

        let (state, step) = state.advance(&Signal::Payload);
        assert_eq!(state, Handshake::Done);
        assert_eq!(step, Step::Download);
    }

    #[test]
    fn html_without_token_goes_to_alternate() {
        let (state, step) = Handshake::Initial.advance(&Signal::Html);
        assert_eq!(state, Handshake::Retried);
        assert_eq!(step, request(Endpoint::Alternate, Some(DEFAULT_CONFIRM_TOKEN)));
    }

    #[test]
    fn html_after_replay_goes_to_alternate_with_token() {
        let state = Handshake::ConfirmationRequired {
            token: "old".into(),
        };
        let (state, step) = state.clone().advance(&Signal::Html);
        assert_eq!(state, Handshake::Retried);
        assert_eq!(step, request(Endpoint::Alternate, Some("old")));

        let state = Handshake::ConfirmationRequired {
            token: "old".into(),
        };
        let (_, step) = state.advance(&Signal::BodyToken("new".into()));
        assert_eq!(step, request(Endpoint::Alternate, Some("new")));
    }

    #[test]
    fn alternate_is_tried_once() {
        let (state, step) = Handshake::Retried.advance(&Signal::BodyToken("again".into()));
        assert_eq!(state, Handshake::Done);
        assert_eq!(step, Step::GiveUp);
    }

    #[test]
    fn handshake_is_bounded() {
        // Worst case: every response is an interstitial with a token.
        let mut state = Handshake::Initial;
        let mut requests = 1;
        loop {
            let (next, step) = state.advance(&Signal::BodyToken("tok".into()));
            state = next;
            match step {
                Step::Request { .. } => requests += 1,
                Step::GiveUp => break,
                Step::Download => unreachable!(),
            }
        }
        assert_eq!(requests, 3);
    }

    #[test]
    fn detects_html_content_type() {
        let mut headers = HeaderMap::new();
        assert!(!is_html(&headers));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("Text/HTML; charset=utf-8"));
        assert!(is_html(&headers));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("video/mp4"));
        assert!(!is_html(&headers));
    }

    #[test]
    fn cookie_token_needs_prefix() {
        let cookies = [("NID", "abc"), ("download_warning_13058876669334088843_1x", "Zq9")];
        assert_eq!(token_from_cookies(cookies), Some("Zq9".to_string()));
        assert_eq!(token_from_cookies([("session", "abc")]), None);
        assert_eq!(token_from_cookies([("download_warning", "")]), None);
    }

    #[test]
    fn body_token_from_link() {
        let html = r#"<a id="uc-download-link" href="/uc?export=download&amp;confirm=k7Fq&amp;id=1abc">Download anyway</a>"#;
        assert_eq!(token_from_body(html), Some("k7Fq".to_string()));
    }

    #[test]
    fn body_token_from_form() {
        let html = r#"<form action="https://drive.usercontent.google.com/download">
            <input type="hidden" name="id" value="1abc">
            <input type="hidden" name="confirm" value="t">
        </form>"#;
        assert_eq!(token_from_body(html), Some("t".to_string()));
        assert_eq!(token_from_body("<html>quota exceeded</html>"), None);
    }
}
