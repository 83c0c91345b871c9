//! Minimal W3C WebDriver client (chromedriver) covering what [BrowserSession] needs.

use super::browser::{BrowserSession, ElementHandle};
use super::SourceError;
use reqwest::blocking::Client;
use reqwest::Method;
use serde_json::{json, Value};
use std::time::Duration;

/// Default chromedriver endpoint.
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";

/// Key under which W3C WebDriver returns element references.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// One browser session on a WebDriver server. Deleted on `quit` or drop.
#[derive(Debug)]
pub struct WebDriverSession {
    client: Client,
    base: String,
    session_id: Option<String>,
}

impl WebDriverSession {
    /// Start a Chrome session on the server at `base`.
    pub fn start(base: &str, timeout_secs: u64) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| SourceError::WebDriver {
                command: "new session".to_string(),
                message: e.to_string(),
            })?;
        let mut session = Self {
            client,
            base: base.trim_end_matches('/').to_string(),
            session_id: None,
        };
        let capabilities = json!({
            "capabilities": {
                "alwaysMatch": {
                    "browserName": "chrome",
                    "goog:chromeOptions": { "excludeSwitches": ["enable-logging"] }
                }
            }
        });
        let value = session.send(Method::POST, "/session", Some(capabilities))?;
        let id = value
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| SourceError::WebDriver {
                command: "new session".to_string(),
                message: "response has no sessionId".to_string(),
            })?;
        tracing::debug!("WebDriver session {} started", id);
        session.session_id = Some(id.to_string());
        Ok(session)
    }

    fn session_path(&self, path: &str) -> Result<String, SourceError> {
        match &self.session_id {
            Some(id) => Ok(format!("/session/{}{}", id, path)),
            None => Err(SourceError::WebDriver {
                command: path.to_string(),
                message: "session is closed".to_string(),
            }),
        }
    }

    /// Send one command and return its `value`. Error payloads become `SourceError::WebDriver`.
    fn send(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, SourceError> {
        let failed = |message: String| SourceError::WebDriver {
            command: format!("{} {}", method, path),
            message,
        };
        let mut request = self
            .client
            .request(method.clone(), format!("{}{}", self.base, path));
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().map_err(|e| failed(e.to_string()))?;
        let status = response.status();
        let mut payload: Value = response.json().map_err(|e| failed(e.to_string()))?;
        let value = payload.get_mut("value").map(Value::take).unwrap_or(Value::Null);
        if !status.is_success() {
            let message = value
                .get("message")
                .or_else(|| value.get("error"))
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            return Err(failed(format!("HTTP {}: {}", status.as_u16(), message)));
        }
        Ok(value)
    }

    fn session_command(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, SourceError> {
        let path = self.session_path(path)?;
        self.send(method, &path, body)
    }

    fn string_value(value: Value) -> Option<String> {
        match value {
            Value::String(s) => Some(s),
            Value::Null => None,
            other => Some(other.to_string()),
        }
    }
}

fn element_handles(value: Value) -> Vec<ElementHandle> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| item.get(ELEMENT_KEY).and_then(Value::as_str))
            .map(|id| ElementHandle(id.to_string()))
            .collect(),
        _ => Vec::new(),
    }
}

impl BrowserSession for WebDriverSession {
    fn goto(&mut self, url: &str) -> Result<(), SourceError> {
        self.session_command(Method::POST, "/url", Some(json!({ "url": url })))?;
        Ok(())
    }

    fn find_elements(
        &mut self,
        scope: Option<&ElementHandle>,
        xpath: &str,
    ) -> Result<Vec<ElementHandle>, SourceError> {
        let path = match scope {
            Some(ElementHandle(id)) => format!("/element/{}/elements", id),
            None => "/elements".to_string(),
        };
        let body = json!({ "using": "xpath", "value": xpath });
        let value = self.session_command(Method::POST, &path, Some(body))?;
        Ok(element_handles(value))
    }

    fn click(&mut self, element: &ElementHandle) -> Result<(), SourceError> {
        let path = format!("/element/{}/click", element.0);
        self.session_command(Method::POST, &path, Some(json!({})))?;
        Ok(())
    }

    fn current_url(&mut self) -> Result<String, SourceError> {
        let value = self.session_command(Method::GET, "/url", None)?;
        Ok(Self::string_value(value).unwrap_or_default())
    }

    fn tag_name(&mut self, element: &ElementHandle) -> Result<String, SourceError> {
        let path = format!("/element/{}/name", element.0);
        let value = self.session_command(Method::GET, &path, None)?;
        Ok(Self::string_value(value)
            .unwrap_or_default()
            .to_ascii_lowercase())
    }

    fn attribute(
        &mut self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, SourceError> {
        let path = format!("/element/{}/property/{}", element.0, name);
        if let Some(value) = Self::string_value(self.session_command(Method::GET, &path, None)?) {
            return Ok(Some(value));
        }
        let path = format!("/element/{}/attribute/{}", element.0, name);
        Ok(Self::string_value(
            self.session_command(Method::GET, &path, None)?,
        ))
    }

    fn quit(&mut self) -> Result<(), SourceError> {
        if self.session_id.is_none() {
            return Ok(());
        }
        let result = self.session_command(Method::DELETE, "", None);
        self.session_id = None;
        result.map(|_| ())
    }
}

impl Drop for WebDriverSession {
    fn drop(&mut self) {
        if let Err(e) = self.quit() {
            tracing::debug!("Failed to delete WebDriver session: {}", e);
        }
    }
}
