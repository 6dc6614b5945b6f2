//! Client identity for probe requests.
//!
//! Many IPTV origins reject requests without a browser-looking user-agent, so
//! both the HTTP probe and ffmpeg present one of these profiles.

use rand::seq::SliceRandom;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_ENCODING, ACCEPT_LANGUAGE, CONNECTION, USER_AGENT,
};

const CHROME_UA: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";
const FIREFOX_UA: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:133.0) Gecko/20100101 Firefox/133.0";
const SAFARI_UA: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/18.1 Safari/605.1.15";
const VLC_UA: &str = "VLC/3.0.21 LibVLC/3.0.21";

/// Headers a probe sends to look like a real client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub user_agent: String,
    pub accept: String,
    pub accept_language: String,
    pub accept_encoding: String,
}

impl Default for ClientIdentity {
    fn default() -> Self {
        chrome_identity()
    }
}

impl ClientIdentity {
    /// Default identity with a custom user-agent.
    #[must_use]
    pub fn with_user_agent(user_agent: &str) -> Self {
        Self {
            user_agent: user_agent.to_string(),
            ..Self::default()
        }
    }

    /// Convert identity to reqwest `HeaderMap`.
    ///
    /// Values that are not valid header text are skipped rather than sent
    /// half-formed.
    pub fn to_headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();

        for (name, value) in [
            (USER_AGENT, &self.user_agent),
            (ACCEPT, &self.accept),
            (ACCEPT_LANGUAGE, &self.accept_language),
            (ACCEPT_ENCODING, &self.accept_encoding),
        ] {
            if let Ok(v) = HeaderValue::from_str(value) {
                headers.insert(name, v);
            }
        }
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));

        headers
    }
}

/// Chrome on Windows, the identity most origins accept.
#[must_use]
pub fn chrome_identity() -> ClientIdentity {
    ClientIdentity {
        user_agent: CHROME_UA.to_string(),
        accept: "application/json, text/plain, */*".to_string(),
        accept_language: "en-US,en;q=0.9".to_string(),
        accept_encoding: "gzip, deflate, br".to_string(),
    }
}

/// Pick one of the built-in identities at random.
///
/// Spreading a large playlist over several identities avoids tripping
/// per-agent rate limits on shared origins.
#[must_use]
pub fn random_identity() -> ClientIdentity {
    let mut rng = rand::thread_rng();
    let ua = [CHROME_UA, FIREFOX_UA, SAFARI_UA, VLC_UA]
        .choose(&mut rng)
        .copied()
        .unwrap_or(CHROME_UA);
    ClientIdentity::with_user_agent(ua)
}
