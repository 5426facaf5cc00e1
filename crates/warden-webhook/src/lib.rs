//! Outbound webhook delivery for warden's notification bus.
//!
//! A webhook is configured as a named `method`/`url`/`headers`/`body` template
//! under `notifications.webhooks`. When an action's `on_success`/`on_error`
//! fires, the dispatcher substitutes `$PAL_*` placeholders into the `url` and
//! `body` and hands the result here. Delivery is fire-and-forget: failures are
//! logged and never affect the dispatch outcome.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

const CLIENT_TIMEOUT: Duration = Duration::from_secs(15);

/// A named outbound webhook spec, as configured under `notifications.webhooks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSpec {
    /// HTTP method, e.g. `"POST"`.
    pub method: String,
    /// URL template; may contain `$PAL_*` placeholders.
    pub url: String,
    /// Extra request headers.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Body template; may contain `$PAL_*` placeholders.
    #[serde(default)]
    pub body: String,
    /// Skip TLS certificate verification.
    #[serde(default)]
    pub insecure: bool,
    /// When set, the substituted body is HMAC-SHA256 signed and sent as
    /// `X-Warden-Signature: sha256=<hex>`.
    #[serde(default)]
    pub secret: Option<String>,
}

/// `$PAL_*` placeholder values available to a webhook's `url` and `body`
/// templates for one dispatch outcome.
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    pub group: String,
    pub action: String,
    pub input: String,
    pub status: String,
    pub output: Option<String>,
}

impl TemplateContext {
    /// Replace `$PAL_GROUP`/`$PAL_ACTION`/`$PAL_INPUT`/`$PAL_STATUS`/`$PAL_OUTPUT`
    /// placeholders. Used for webhook `url`/`body` templates as well as
    /// notification messages and `register.key`/`register.value`.
    pub fn substitute(&self, template: &str) -> String {
        let mut out = template.replace("$PAL_GROUP", &self.group);
        out = out.replace("$PAL_ACTION", &self.action);
        out = out.replace("$PAL_INPUT", &self.input);
        out = out.replace("$PAL_STATUS", &self.status);
        if let Some(output) = &self.output {
            out = out.replace("$PAL_OUTPUT", output);
        }
        out
    }
}

/// Send one webhook synchronously, applying template substitution first.
///
/// Non-2xx responses and transport errors are returned as `Err` for the
/// caller to log; they carry no retry semantics.
pub fn send_webhook(spec: &WebhookSpec, ctx: &TemplateContext) -> Result<()> {
    let url = ctx.substitute(&spec.url);
    let body = ctx.substitute(&spec.body);

    let client = reqwest::blocking::Client::builder()
        .timeout(CLIENT_TIMEOUT)
        .danger_accept_invalid_certs(spec.insecure)
        .build()
        .context("failed to build webhook HTTP client")?;

    let method = reqwest::Method::from_bytes(spec.method.to_uppercase().as_bytes())
        .context("invalid webhook method")?;

    let mut request = client.request(method, &url);
    for (name, value) in &spec.headers {
        request = request.header(name, value);
    }
    if let Some(secret) = &spec.secret {
        request = request.header("X-Warden-Signature", format!("sha256={}", sign(secret, &body)));
    }

    let response = request
        .body(body)
        .send()
        .context("failed to send webhook request")?;

    if !response.status().is_success() {
        let status = response.status();
        let text = response.text().unwrap_or_default();
        anyhow::bail!("webhook returned error status {status}: {text}");
    }

    Ok(())
}

/// Spawn [`send_webhook`] on a detached thread. Delivery failures are logged,
/// never propagated, matching the notification bus's fire-and-forget contract.
pub fn send_webhook_detached(spec: WebhookSpec, ctx: TemplateContext) {
    std::thread::spawn(move || {
        if let Err(err) = send_webhook(&spec, &ctx) {
            eprintln!("[warn] webhook delivery to {} failed: {err:#}", spec.url);
        }
    });
}

type HmacSha256 = Hmac<Sha256>;

fn sign(secret: &str, body: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
