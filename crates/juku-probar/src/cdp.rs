//! Chromium surface over the DevTools protocol.
//!
//! Element references are stamped into the page as a `data-jp-ref`
//! attribute of the form `<document token>:<counter>`. The token is minted
//! once per document, so a reference taken before a navigation no longer
//! resolves afterwards and is reported as [`ProbeError::StaleElement`].

use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::config::SuiteConfig;
use crate::locator::Selector;
use crate::result::{ProbeError, ProbeResult};
use crate::surface::{ElementRef, UiSurface};
use crate::wait::LoadState;

/// Attribute carrying element references
pub const REF_ATTRIBUTE: &str = "data-jp-ref";

const PRELUDE: &str = r#"
const __jp = window.__jp || (window.__jp = { doc: Math.random().toString(36).slice(2), next: 0 });
const refOf = el => {
  if (!el || el.nodeType !== 1) return null;
  let r = el.getAttribute('data-jp-ref');
  if (!r || !r.startsWith(__jp.doc + ':')) {
    r = __jp.doc + ':' + (__jp.next++);
    el.setAttribute('data-jp-ref', r);
  }
  return r;
};
const byRef = r => r.startsWith(__jp.doc + ':')
  ? document.querySelector('[data-jp-ref="' + r + '"]')
  : null;
const roleOf = el => {
  const explicit = el.getAttribute('role');
  if (explicit) return explicit;
  const tag = el.tagName.toLowerCase();
  if (tag === 'a') return el.hasAttribute('href') ? 'link' : null;
  if (tag === 'button') return 'button';
  if (tag === 'input') {
    const type = (el.getAttribute('type') || 'text').toLowerCase();
    if (type === 'checkbox' || type === 'radio') return type;
    if (type === 'submit' || type === 'button') return 'button';
    return 'textbox';
  }
  if (tag === 'textarea') return 'textbox';
  if (tag === 'select') return 'combobox';
  if (/^h[1-6]$/.test(tag)) return 'heading';
  if (tag === 'li') return 'listitem';
  if (tag === 'ul' || tag === 'ol') return 'list';
  if (tag === 'img') return 'img';
  return null;
};
const nameOf = el => {
  const aria = el.getAttribute('aria-label');
  if (aria) return aria.trim();
  if (el.labels && el.labels.length) return (el.labels[0].textContent || '').trim();
  const alt = el.getAttribute('alt');
  if (alt) return alt.trim();
  return (el.textContent || '').trim();
};
"#;

/// Reply envelope of an element-scoped script
#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Reply<T> {
    Ok(T),
    Stale,
}

fn js_string(value: &str) -> ProbeResult<String> {
    Ok(serde_json::to_string(value)?)
}

/// Chromium page driven over CDP
#[derive(Debug)]
pub struct CdpSurface {
    browser: Arc<Mutex<CdpBrowser>>,
    page: Arc<Mutex<CdpPage>>,
    handle: tokio::task::JoinHandle<()>,
}

impl CdpSurface {
    /// Launch a browser per `config` and open a blank page
    pub async fn launch(config: &SuiteConfig) -> ProbeResult<Self> {
        let mut builder = CdpConfig::builder().no_sandbox();
        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(ref path) = config.chromium_path {
            builder = builder.chrome_executable(path);
        }
        let cdp_config = builder
            .build()
            .map_err(|message| ProbeError::BrowserLaunch { message })?;

        let (browser, mut handler) = CdpBrowser::launch(cdp_config)
            .await
            .map_err(|e| ProbeError::BrowserLaunch {
                message: e.to_string(),
            })?;

        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ProbeError::BrowserLaunch {
                message: e.to_string(),
            })?;
        info!(headless = config.headless, "browser launched");

        Ok(Self {
            browser: Arc::new(Mutex::new(browser)),
            page: Arc::new(Mutex::new(page)),
            handle,
        })
    }

    /// Close the browser
    pub async fn close(self) -> ProbeResult<()> {
        let mut browser = self.browser.lock().await;
        browser
            .close()
            .await
            .map_err(|e| ProbeError::BrowserLaunch {
                message: e.to_string(),
            })?;
        self.handle.abort();
        Ok(())
    }

    /// Evaluate `body` (a function body using the prelude helpers)
    async fn eval<T: DeserializeOwned>(&self, body: &str) -> ProbeResult<T> {
        let expr = format!("(() => {{ {PRELUDE}\n{body} }})()");
        let page = self.page.lock().await;
        let result = page
            .evaluate(expr)
            .await
            .map_err(|e| ProbeError::surface(e.to_string()))?;
        result
            .into_value()
            .map_err(|e| ProbeError::surface(format!("unexpected script result: {e}")))
    }

    /// Evaluate `body` with `el` bound to `element`
    async fn eval_on<T: DeserializeOwned>(
        &self,
        element: &ElementRef,
        body: &str,
    ) -> ProbeResult<T> {
        let script = format!(
            "const el = byRef({}); if (!el) return 'stale'; \
             return {{ ok: (() => {{ {body} }})() }};",
            js_string(element.as_str())?
        );
        match self.eval::<Reply<T>>(&script).await? {
            Reply::Ok(value) => Ok(value),
            Reply::Stale => Err(ProbeError::StaleElement {
                reference: element.to_string(),
            }),
        }
    }
}

#[async_trait]
impl UiSurface for CdpSurface {
    async fn query_all(
        &self,
        scope: Option<&ElementRef>,
        selector: &Selector,
    ) -> ProbeResult<Vec<ElementRef>> {
        let refs: Vec<String> = match scope {
            Some(scope) => {
                let query = selector.to_query_all("el");
                self.eval_on(scope, &format!("return {query}.map(refOf);"))
                    .await?
            }
            None => {
                let query = selector.to_query_all("document");
                self.eval(&format!("return {query}.map(refOf);")).await?
            }
        };
        Ok(refs.into_iter().map(ElementRef::new).collect())
    }

    async fn parent(&self, element: &ElementRef) -> ProbeResult<Option<ElementRef>> {
        let parent: Option<String> = self
            .eval_on(element, "return refOf(el.parentElement);")
            .await?;
        Ok(parent.map(ElementRef::new))
    }

    async fn next_sibling(&self, element: &ElementRef) -> ProbeResult<Option<ElementRef>> {
        let next: Option<String> = self
            .eval_on(element, "return refOf(el.nextElementSibling);")
            .await?;
        Ok(next.map(ElementRef::new))
    }

    async fn text_content(&self, element: &ElementRef) -> ProbeResult<String> {
        self.eval_on(element, "return el.textContent || '';").await
    }

    async fn attribute(&self, element: &ElementRef, name: &str) -> ProbeResult<Option<String>> {
        self.eval_on(
            element,
            &format!("return el.getAttribute({});", js_string(name)?),
        )
        .await
    }

    async fn is_visible(&self, element: &ElementRef) -> ProbeResult<bool> {
        self.eval_on(
            element,
            "const s = getComputedStyle(el); \
             return s.display !== 'none' && s.visibility !== 'hidden' \
             && el.getClientRects().length > 0;",
        )
        .await
    }

    async fn is_checked(&self, element: &ElementRef) -> ProbeResult<bool> {
        self.eval_on(element, "return !!el.checked;").await
    }

    async fn input_value(&self, element: &ElementRef) -> ProbeResult<String> {
        self.eval_on(element, "return el.value || '';").await
    }

    async fn click(&self, element: &ElementRef) -> ProbeResult<()> {
        // Resolve first so a stale reference is reported as such
        let _: bool = self
            .eval_on(
                element,
                "el.scrollIntoView({ block: 'center' }); return true;",
            )
            .await?;
        let page = self.page.lock().await;
        let css = format!("[{REF_ATTRIBUTE}={}]", js_string(element.as_str())?);
        let target = page
            .find_element(css)
            .await
            .map_err(|_| ProbeError::StaleElement {
                reference: element.to_string(),
            })?;
        target
            .click()
            .await
            .map_err(|e| ProbeError::surface(format!("click on {element} failed: {e}")))?;
        debug!(%element, "clicked");
        Ok(())
    }

    async fn fill(&self, element: &ElementRef, text: &str) -> ProbeResult<()> {
        let _: bool = self
            .eval_on(
                element,
                &format!(
                    "el.focus(); el.value = {}; \
                     el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
                     el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
                     return true;",
                    js_string(text)?
                ),
            )
            .await?;
        Ok(())
    }

    async fn goto(&self, url: &str) -> ProbeResult<()> {
        let page = self.page.lock().await;
        page.goto(url).await.map_err(|e| ProbeError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        Ok(())
    }

    async fn current_url(&self) -> ProbeResult<String> {
        let page = self.page.lock().await;
        let url = page
            .url()
            .await
            .map_err(|e| ProbeError::surface(e.to_string()))?;
        Ok(url.unwrap_or_default())
    }

    async fn load_state(&self) -> ProbeResult<LoadState> {
        let ready: String = self.eval("return document.readyState;").await?;
        Ok(LoadState::from_ready_state(&ready))
    }
}
