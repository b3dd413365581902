// Header profile and client identities presented to upstream
//
// Every upstream call carries the browser-like header profile. The client
// identity decides which player context (and user agent) the player request
// impersonates; different identities hit different bot-detection paths.

use std::fmt;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE, USER_AGENT};
use serde_json::{json, Value};

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Static set of browser headers plus the optional forwarded cookie
#[derive(Clone, Default)]
pub struct HeaderProfile {
    cookie: Option<String>,
}

impl HeaderProfile {
    pub fn new(cookie: Option<String>) -> Self {
        Self {
            cookie: cookie.filter(|c| !c.trim().is_empty()),
        }
    }

    pub fn has_cookie(&self) -> bool {
        self.cookie.is_some()
    }

    /// Headers for an upstream request. An invalid cookie value is dropped
    /// rather than failing every call.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(
            HeaderName::from_static("accept"),
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(
            HeaderName::from_static("accept-language"),
            HeaderValue::from_static("en-US,en;q=0.9"),
        );
        headers.insert(
            HeaderName::from_static("origin"),
            HeaderValue::from_static("https://www.youtube.com"),
        );
        headers.insert(
            HeaderName::from_static("referer"),
            HeaderValue::from_static("https://www.youtube.com/"),
        );

        if let Some(cookie) = &self.cookie {
            match HeaderValue::from_str(cookie) {
                Ok(value) => {
                    headers.insert(COOKIE, value);
                }
                Err(_) => tracing::warn!("Ignoring cookie with invalid header characters"),
            }
        }

        headers
    }
}

// Never print the cookie itself
impl fmt::Debug for HeaderProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeaderProfile")
            .field("cookie", &self.cookie.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// A named impersonation profile for the player API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    /// Short name used in config and logs
    pub name: &'static str,
    pub client_name: &'static str,
    pub client_version: &'static str,
    pub user_agent: &'static str,
    /// Extra fields merged into `context.client`
    device: Option<(&'static str, &'static str)>,
    android_sdk: Option<u32>,
    embedded: bool,
}

impl ClientIdentity {
    /// Oculus Quest client: direct URLs, no signature deciphering
    pub fn android_vr() -> Self {
        Self {
            name: "ANDROID_VR",
            client_name: "ANDROID_VR",
            client_version: "1.71.26",
            user_agent: "com.google.android.apps.youtube.vr.oculus/1.71.26 (Linux; U; Android 12L; eureka-user Build/SQ3A.220605.009.A1) gzip",
            device: Some(("Oculus", "Quest 3")),
            android_sdk: Some(32),
            embedded: false,
        }
    }

    /// Embedded web player: handles made-for-kids and most restrictions
    pub fn web_embedded() -> Self {
        Self {
            name: "WEB_EMBEDDED",
            client_name: "WEB_EMBEDDED_PLAYER",
            client_version: "1.20260115.01.00",
            user_agent: BROWSER_USER_AGENT,
            device: None,
            android_sdk: None,
            embedded: true,
        }
    }

    /// iOS app client
    pub fn ios() -> Self {
        Self {
            name: "IOS",
            client_name: "IOS",
            client_version: "19.45.4",
            user_agent: "com.google.ios.youtube/19.45.4 (iPhone16,2; U; CPU iOS 18_1_0 like Mac OS X;)",
            device: Some(("Apple", "iPhone16,2")),
            android_sdk: None,
            embedded: false,
        }
    }

    pub fn defaults() -> Vec<Self> {
        vec![Self::android_vr(), Self::web_embedded(), Self::ios()]
    }

    /// Look up a built-in identity by its config name (case-insensitive)
    pub fn by_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "ANDROID_VR" => Some(Self::android_vr()),
            "WEB_EMBEDDED" | "WEB_EMBEDDED_PLAYER" => Some(Self::web_embedded()),
            "IOS" => Some(Self::ios()),
            _ => None,
        }
    }

    /// Player request body for `video_id` under this identity
    pub fn player_payload(&self, video_id: &str) -> Value {
        let mut client = json!({
            "clientName": self.client_name,
            "clientVersion": self.client_version,
            "hl": "en",
            "gl": "US",
        });
        if let Some((make, model)) = self.device {
            client["deviceMake"] = json!(make);
            client["deviceModel"] = json!(model);
        }
        if let Some(sdk) = self.android_sdk {
            client["androidSdkVersion"] = json!(sdk);
        }

        let mut context = json!({ "client": client });
        if self.embedded {
            context["thirdParty"] = json!({ "embedUrl": "https://www.youtube.com/" });
        }

        json!({
            "context": context,
            "videoId": video_id,
            "contentCheckOk": true,
            "racyCheckOk": true,
        })
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}
