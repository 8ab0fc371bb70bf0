use crate::config::RatingConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use fantoccini::error::CmdError;
use fantoccini::{Client, ClientBuilder, Locator};
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use super::{DriverError, PageDriver};

/// Headless Chrome driven over the W3C WebDriver protocol (chromedriver).
pub struct WebDriverSession {
    client: Client,
}

impl WebDriverSession {
    pub async fn connect(config: &RatingConfig) -> Result<Self> {
        let mut caps = serde_json::Map::new();
        caps.insert("browserName".to_string(), json!("chrome"));
        caps.insert(
            "goog:chromeOptions".to_string(),
            json!({ "args": config.browser_args }),
        );

        info!("Starting browser session via {}", config.webdriver_url);
        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(&config.webdriver_url)
            .await
            .with_context(|| {
                format!("Failed to open WebDriver session at {}", config.webdriver_url)
            })?;

        Ok(Self { client })
    }
}

/// XPath for the first `div` whose own text contains `label`.
pub fn label_xpath(label: &str) -> String {
    format!("//div[contains(text(),{})]", xpath_literal(label))
}

/// Quote `s` as an XPath 1.0 string literal (which has no escape syntax).
fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        format!("'{}'", s)
    } else if !s.contains('"') {
        format!("\"{}\"", s)
    } else {
        let parts: Vec<String> = s.split('\'').map(|p| format!("'{}'", p)).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

fn command_error(e: CmdError) -> DriverError {
    DriverError::Command(e.to_string())
}

#[async_trait]
impl PageDriver for WebDriverSession {
    async fn open(&mut self, url: &str) -> Result<(), DriverError> {
        debug!("navigate {}", url);
        self.client.goto(url).await.map_err(command_error)
    }

    async fn labeled_sibling_text(
        &mut self,
        label: &str,
        timeout: Duration,
    ) -> Result<String, DriverError> {
        let xpath = label_xpath(label);
        let label_el = self
            .client
            .wait()
            .at_most(timeout)
            .for_element(Locator::XPath(&xpath))
            .await
            .map_err(|e| match e {
                CmdError::WaitTimeout => DriverError::Timeout(timeout),
                other => command_error(other),
            })?;

        let value_el = label_el
            .find(Locator::XPath("following-sibling::div"))
            .await
            .map_err(|e| {
                if e.is_no_such_element() {
                    DriverError::NoValue
                } else {
                    command_error(e)
                }
            })?;

        value_el.text().await.map_err(command_error)
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        info!("Closing browser session");
        self.client.clone().close().await.map_err(command_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_xpath_plain() {
        assert_eq!(label_xpath("業績評価"), "//div[contains(text(),'業績評価')]");
    }

    #[test]
    fn test_xpath_literal_quoting() {
        assert_eq!(xpath_literal("it's"), "\"it's\"");
        assert_eq!(
            xpath_literal(r#"a'b"c"#),
            r#"concat('a', "'", 'b"c')"#
        );
    }
}
