use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::error::{CmdError, ErrorStatus};
use fantoccini::wd::WindowHandle;
use fantoccini::{Client, ClientBuilder};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{BrowserError, Session};
use crate::config::{BrowserConfig, Locator};
use crate::scraper::wait::await_condition;

/// W3C WebDriver key code for Enter.
const ENTER: &str = "\u{e007}";

/// A browser driven over WebDriver. Owns the optional driver process, which is
/// killed when this value is dropped whatever path the run exits through.
pub struct WebDriverSession {
    client: Client,
    driver: Mutex<Option<Child>>,
}

#[derive(Debug, Deserialize)]
struct DriverStatus {
    value: DriverReady,
}

#[derive(Debug, Deserialize)]
struct DriverReady {
    #[serde(default)]
    ready: bool,
}

impl WebDriverSession {
    pub async fn launch(config: &BrowserConfig) -> Result<Self, BrowserError> {
        let driver = match &config.driver_command {
            Some(cmd) => Some(spawn_driver(cmd)?),
            None => None,
        };

        wait_for_driver(
            &config.webdriver_url,
            Duration::from_secs(config.startup_timeout_secs),
        )
        .await?;

        let mut builder = ClientBuilder::native();
        builder.capabilities(capabilities(config));
        let client = builder
            .connect(&config.webdriver_url)
            .await
            .map_err(|e| BrowserError::SessionLost(format!("could not start session: {}", e)))?;

        let (w, h) = config.window_size;
        if let Err(e) = client.set_window_size(w, h).await {
            debug!("Could not resize window: {}", e);
        }

        info!(
            "Browser session started ({})",
            if config.headless { "headless" } else { "visible" }
        );
        Ok(Self {
            client,
            driver: Mutex::new(driver),
        })
    }

    async fn run_script(&self, script: &str, element: &Element) -> Result<Value, BrowserError> {
        let arg = serde_json::to_value(element)
            .map_err(|e| BrowserError::Command(format!("element not serialisable: {}", e)))?;
        self.client.execute(script, vec![arg]).await.map_err(classify)
    }
}

fn spawn_driver(cmd: &str) -> Result<Child, BrowserError> {
    let mut parts = cmd.split_whitespace();
    let program = parts
        .next()
        .ok_or_else(|| BrowserError::SessionLost("empty driver command".into()))?;
    info!("Starting driver: {}", cmd);
    Command::new(program)
        .args(parts)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| BrowserError::SessionLost(format!("could not spawn {}: {}", program, e)))
}

/// Poll the driver's `/status` endpoint until it reports ready.
async fn wait_for_driver(webdriver_url: &str, timeout: Duration) -> Result<(), BrowserError> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .map_err(|e| BrowserError::Command(format!("http client: {}", e)))?;
    let status_url = format!("{}/status", webdriver_url.trim_end_matches('/'));
    let http = &http;
    let status_url = status_url.as_str();

    await_condition("WebDriver ready", timeout, Duration::from_millis(250), move || {
        async move {
            let ready = match http.get(status_url).send().await {
                Ok(resp) => resp
                    .json::<DriverStatus>()
                    .await
                    .map(|s| s.value.ready)
                    .unwrap_or(false),
                Err(_) => false,
            };
            Ok(ready)
        }
    })
    .await
    .map_err(|e| BrowserError::SessionLost(format!("driver at {} not ready: {}", webdriver_url, e)))
}

fn capabilities(config: &BrowserConfig) -> serde_json::Map<String, Value> {
    let mut args = vec![
        "--no-sandbox".to_string(),
        "--disable-gpu".to_string(),
        "--disable-dev-shm-usage".to_string(),
        format!("--window-size={},{}", config.window_size.0, config.window_size.1),
        format!("--user-agent={}", config.user_agent),
        "--lang=en-US,en;q=0.9".to_string(),
    ];
    if config.headless {
        args.push("--headless=new".to_string());
    }
    args.extend(config.extra_args.iter().cloned());

    let mut caps = serde_json::Map::new();
    caps.insert("goog:chromeOptions".into(), json!({ "args": args }));
    caps
}

fn locate(locator: &Locator) -> fantoccini::Locator<'_> {
    match locator {
        Locator::Css(s) => fantoccini::Locator::Css(s),
        Locator::Xpath(s) => fantoccini::Locator::XPath(s),
    }
}

/// Map a WebDriver failure onto the crawl's error taxonomy.
fn classify(err: CmdError) -> BrowserError {
    match &err {
        CmdError::Standard(wd) => match wd.error {
            ErrorStatus::StaleElementReference => BrowserError::Stale,
            ErrorStatus::NoSuchElement => BrowserError::NotFound(err.to_string()),
            ErrorStatus::InvalidSessionId
            | ErrorStatus::SessionNotCreated
            | ErrorStatus::NoSuchWindow => BrowserError::SessionLost(err.to_string()),
            _ => BrowserError::Command(err.to_string()),
        },
        CmdError::Lost(_) => BrowserError::SessionLost(err.to_string()),
        _ => BrowserError::Command(err.to_string()),
    }
}

#[async_trait]
impl Session for WebDriverSession {
    type Element = Element;
    type Window = WindowHandle;

    async fn goto(&self, url: &str) -> Result<(), BrowserError> {
        debug!("Navigating to {}", url);
        self.client.goto(url).await.map_err(classify)
    }

    async fn current_url(&self) -> Result<String, BrowserError> {
        Ok(self.client.current_url().await.map_err(classify)?.to_string())
    }

    async fn back(&self) -> Result<(), BrowserError> {
        self.client.back().await.map_err(classify)
    }

    async fn find_all(&self, locator: &Locator) -> Result<Vec<Element>, BrowserError> {
        self.client.find_all(locate(locator)).await.map_err(classify)
    }

    async fn find_all_in(
        &self,
        parent: &Element,
        locator: &Locator,
    ) -> Result<Vec<Element>, BrowserError> {
        parent.find_all(locate(locator)).await.map_err(classify)
    }

    async fn text(&self, element: &Element) -> Result<String, BrowserError> {
        element.text().await.map_err(classify)
    }

    async fn attr(&self, element: &Element, name: &str) -> Result<Option<String>, BrowserError> {
        element.attr(name).await.map_err(classify)
    }

    async fn inner_html(&self, element: &Element) -> Result<String, BrowserError> {
        element.html(true).await.map_err(classify)
    }

    async fn is_enabled(&self, element: &Element) -> Result<bool, BrowserError> {
        element.is_enabled().await.map_err(classify)
    }

    async fn is_stale(&self, element: &Element) -> Result<bool, BrowserError> {
        match element.is_displayed().await.map_err(classify) {
            Ok(_) => Ok(false),
            Err(BrowserError::Stale) | Err(BrowserError::NotFound(_)) => Ok(true),
            Err(e) => Err(e),
        }
    }

    async fn click(&self, element: &Element) -> Result<(), BrowserError> {
        element.click().await.map_err(classify)
    }

    async fn script_click(&self, element: &Element) -> Result<(), BrowserError> {
        self.run_script("arguments[0].click();", element).await.map(|_| ())
    }

    async fn scroll_into_view(&self, element: &Element) -> Result<(), BrowserError> {
        self.run_script("arguments[0].scrollIntoView({block: 'center'});", element)
            .await
            .map(|_| ())
    }

    async fn clear(&self, element: &Element) -> Result<(), BrowserError> {
        element.clear().await.map_err(classify)
    }

    async fn type_text(&self, element: &Element, text: &str) -> Result<(), BrowserError> {
        element.send_keys(text).await.map_err(classify)
    }

    async fn submit(&self, element: &Element) -> Result<(), BrowserError> {
        element.send_keys(ENTER).await.map_err(classify)
    }

    async fn open_tab(&self, url: &str) -> Result<WindowHandle, BrowserError> {
        let origin = self.client.window().await.map_err(classify)?;
        let tab = self.client.new_window(true).await.map_err(classify)?;
        self.client
            .switch_to_window(tab.handle)
            .await
            .map_err(classify)?;
        if let Err(e) = self.client.goto(url).await.map_err(classify) {
            self.close_tab(&origin).await?;
            return Err(e);
        }
        Ok(origin)
    }

    async fn close_tab(&self, return_to: &WindowHandle) -> Result<(), BrowserError> {
        let closed = self.client.close_window().await.map_err(classify);
        self.client
            .switch_to_window(return_to.clone())
            .await
            .map_err(classify)?;
        closed
    }

    async fn quit(&self) -> Result<(), BrowserError> {
        let closed = self.client.clone().close().await.map_err(classify);
        if let Some(mut child) = self.driver.lock().await.take() {
            info!("Stopping driver process");
            if let Err(e) = child.kill().await {
                warn!("Could not kill driver process: {}", e);
            }
        }
        closed
    }
}
