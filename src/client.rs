use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::diff::smarthome_events;
use crate::logger::{MessageLogMode, MessageLogger};
use crate::protocol::{
    self, ApiRequest, Envelope, Form, TokenResponse, DEFAULT_BASE_URL, DEFAULT_CLIENT_ID,
    DEFAULT_LANG, TOKEN_PATH,
};
use crate::tree::SmartHomeTree;
use crate::types::*;
use crate::{Error, Result};

/// How often a host is expected to call [`WattsClient::reload`].
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(120);

type EventCallback = Box<dyn Fn(&Event) + Send + Sync>;
type SnapshotCallback = Box<dyn Fn(&SmartHome) + Send + Sync>;

struct Session {
    access_token: String,
    access_expires_at: Option<DateTime<Utc>>,
    refresh_token: Option<String>,
    refresh_expires_at: Option<DateTime<Utc>>,
}

impl Session {
    fn new(token: TokenResponse, issued_at: DateTime<Utc>) -> Self {
        let expiry = |secs: Option<i64>| {
            secs.and_then(TimeDelta::try_seconds)
                .and_then(|d| issued_at.checked_add_signed(d))
        };
        Self {
            access_expires_at: expiry(token.expires_in),
            refresh_expires_at: expiry(token.refresh_expires_in),
            access_token: token.access_token,
            refresh_token: token.refresh_token,
        }
    }

    /// Keep the previous refresh token when a refresh grant does not rotate it.
    fn inherit_refresh(&mut self, previous: Option<Session>) {
        if self.refresh_token.is_some() {
            return;
        }
        if let Some(previous) = previous {
            self.refresh_token = previous.refresh_token;
            self.refresh_expires_at = previous.refresh_expires_at;
        }
    }

    fn access_valid(&self, now: DateTime<Utc>) -> bool {
        self.access_expires_at.is_none_or(|t| t > now)
    }

    fn usable_refresh_token(&self, now: DateTime<Utc>) -> Option<&str> {
        if self.refresh_expires_at.is_some_and(|t| t <= now) {
            return None;
        }
        self.refresh_token.as_deref()
    }
}

enum Grant {
    Password,
    Refresh(String),
}

pub struct WattsClientBuilder {
    username: String,
    password: String,
    base_url: String,
    client_id: String,
    lang: String,
    event_callbacks: Vec<EventCallback>,
    snapshot_callbacks: Vec<SnapshotCallback>,
    log_mode: Option<MessageLogMode>,
    log_path: Option<String>,
}

impl WattsClientBuilder {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
            lang: DEFAULT_LANG.to_string(),
            event_callbacks: Vec::new(),
            snapshot_callbacks: Vec::new(),
            log_mode: None,
            log_path: None,
        }
    }

    /// Scheme and host serving both the token and data endpoints.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn client_id(mut self, id: impl Into<String>) -> Self {
        self.client_id = id.into();
        self
    }

    pub fn lang(mut self, lang: impl Into<String>) -> Self {
        self.lang = lang.into();
        self
    }

    pub fn on_event(mut self, f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        self.event_callbacks.push(Box::new(f));
        self
    }

    pub fn on_snapshot(mut self, f: impl Fn(&SmartHome) + Send + Sync + 'static) -> Self {
        self.snapshot_callbacks.push(Box::new(f));
        self
    }

    pub fn message_log(mut self, mode: MessageLogMode, path: impl Into<String>) -> Self {
        self.log_mode = Some(mode);
        self.log_path = Some(path.into());
        self
    }

    pub fn build(self) -> Result<WattsClient> {
        let http = reqwest::Client::builder().build()?;

        let logger = match (self.log_mode, self.log_path) {
            (Some(mode), Some(path)) => Some(MessageLogger::new(mode, &path)?),
            _ => None,
        };

        Ok(WattsClient {
            http,
            base_url: self.base_url,
            client_id: self.client_id,
            lang: self.lang,
            username: self.username,
            password: self.password,
            session: None,
            tree: SmartHomeTree::default(),
            event_callbacks: self.event_callbacks,
            snapshot_callbacks: self.snapshot_callbacks,
            logger,
        })
    }
}

/// Client for the Watts Vision cloud. Owns the login session and the cached
/// smart home → zone → device tree. Nothing runs in the background: the host
/// calls [`reload`](Self::reload) on its own schedule.
pub struct WattsClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    lang: String,
    username: String,
    password: String,
    session: Option<Session>,
    tree: SmartHomeTree,
    event_callbacks: Vec<EventCallback>,
    snapshot_callbacks: Vec<SnapshotCallback>,
    logger: Option<MessageLogger>,
}

impl WattsClient {
    pub fn builder(username: impl Into<String>, password: impl Into<String>) -> WattsClientBuilder {
        WattsClientBuilder::new(username, password)
    }

    // -- Session --

    /// Return an access token. With `force`, always performs a password
    /// login. Otherwise reuses a live token, refreshes an expired one while
    /// the refresh token lasts, and falls back to a password login.
    pub async fn authenticate(&mut self, force: bool) -> Result<String> {
        let now = Utc::now();
        let grant = match &self.session {
            _ if force => Grant::Password,
            None => Grant::Password,
            Some(s) if s.access_valid(now) => return Ok(s.access_token.clone()),
            Some(s) => match s.usable_refresh_token(now) {
                Some(refresh) => Grant::Refresh(refresh.to_string()),
                None => Grant::Password,
            },
        };

        if let Grant::Refresh(refresh) = grant {
            let form = protocol::refresh_grant_form(&self.client_id, &refresh);
            match self.request_token("refresh_token", form).await {
                Ok(token) => return Ok(token),
                Err(e) => warn!(error = %e, "token refresh failed, logging in again"),
            }
        }

        let form = protocol::password_grant_form(&self.client_id, &self.username, &self.password);
        self.request_token("password", form).await
    }

    /// Whether a password login currently succeeds. Used to validate
    /// credentials during setup.
    pub async fn test_authentication(&mut self) -> bool {
        match self.authenticate(true).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "authentication test failed");
                false
            }
        }
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.access_token.as_str())
    }

    // -- Tree loading --

    /// Fetch the user's smart homes and every home's zones, then replace the
    /// cache. On any failure the previous cache is kept as it was.
    pub async fn load_all(&mut self) -> Result<()> {
        let req = protocol::user_read(&self.username, &self.lang);
        let data = self.call(&req).await?;
        let mut homes = protocol::parse_smarthomes(&data)?;

        for home in &mut homes {
            let req = protocol::smarthome_read(&home.smarthome_id, &self.lang);
            let data = self.call(&req).await?;
            home.zones = protocol::parse_zones(&data)?;
        }
        debug!(count = homes.len(), "loaded smart homes");

        let events: Vec<Vec<Event>> = homes
            .iter()
            .map(|h| smarthome_events(self.tree.home(&h.smarthome_id), h))
            .collect();
        self.tree.replace_all(homes);

        for (home, events) in self.tree.homes().iter().zip(&events) {
            self.dispatch(home, events);
        }
        Ok(())
    }

    /// Refresh the zones of every cached smart home. The list of homes is
    /// not re-read. A home whose fetch fails keeps its cached zones; the
    /// remaining homes are still refreshed and the first error is returned.
    pub async fn reload(&mut self) -> Result<()> {
        let mut first_error = None;

        for id in self.tree.home_ids() {
            let req = protocol::smarthome_read(&id, &self.lang);
            let zones = match self.call(&req).await {
                Ok(data) => protocol::parse_zones(&data),
                Err(e) => Err(e),
            };
            let zones = match zones {
                Ok(zones) => zones,
                Err(e) => {
                    warn!(smarthome_id = %id, error = %e, "reload failed, keeping cached devices");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                    continue;
                }
            };

            let previous = self.tree.home(&id).cloned();
            self.tree.replace_zones(&id, zones);
            if let Some(current) = self.tree.home(&id) {
                trace!(smarthome_id = %id, devices = current.devices().count(), "reloaded");
                let events = smarthome_events(previous.as_ref(), current);
                self.dispatch(current, &events);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // -- Accessors --

    pub fn smart_homes(&self) -> &[SmartHome] {
        self.tree.homes()
    }

    pub fn smart_home(&self, smarthome_id: &str) -> Option<&SmartHome> {
        self.tree.home(smarthome_id)
    }

    pub fn device(&self, smarthome_id: &str, device_id: &str) -> Option<&Device> {
        self.tree.device(smarthome_id, device_id)
    }

    /// Overwrite a cached device record ahead of the next reload. Returns
    /// the replaced record, or `None` (and changes nothing) if the device is
    /// not cached. The stored record always keeps `device_id` as its id.
    pub fn set_device(&mut self, smarthome_id: &str, device_id: &str, record: Device) -> Option<Device> {
        self.tree.set_device(smarthome_id, device_id, record)
    }

    // -- Commands --

    /// Send a mode/setpoint to a device. `device_id` is the identifier the
    /// push endpoint expects (see [`Device::push_id`]). Returns `Ok(false)`
    /// when the API still refuses after one re-login. If that re-login itself
    /// fails, the login error is returned instead. The cache is not touched.
    pub async fn push_setpoint(
        &mut self,
        smarthome_id: &str,
        device_id: &str,
        value: Temperature,
        mode: Mode,
    ) -> Result<bool> {
        let req = protocol::push(smarthome_id, device_id, mode, value, &self.lang);
        if let Some(ref mut logger) = self.logger {
            logger.log_command("push_setpoint", device_id, &req.form);
        }
        debug!(smarthome_id, device_id, %mode, %value, "pushing setpoint");

        match self.call(&req).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_rejected() => {
                warn!(smarthome_id, device_id, error = %e, "setpoint push rejected");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Apply `mode`/`value` to the cached device first, then push it. The
    /// local write hides the delay until the next reload; it is not rolled
    /// back if the push fails.
    pub async fn apply_setpoint(
        &mut self,
        smarthome_id: &str,
        device_id: &str,
        mode: Mode,
        value: Temperature,
    ) -> Result<bool> {
        let mut record = self
            .device(smarthome_id, device_id)
            .cloned()
            .ok_or_else(|| Error::UnknownDevice {
                smarthome_id: smarthome_id.to_string(),
                device_id: device_id.to_string(),
            })?;
        record.apply(mode, value);
        let push_id = record.push_id().to_string();
        self.set_device(smarthome_id, device_id, record);

        self.push_setpoint(smarthome_id, &push_id, value, mode).await
    }

    pub async fn last_communication(&mut self, smarthome_id: &str) -> Result<LastCommunication> {
        let req = protocol::last_connexion(smarthome_id, &self.lang);
        let data = self.call(&req).await?;
        protocol::parse_last_communication(&data)
    }

    // -- Helpers --

    async fn request_token(&mut self, grant: &str, form: Form) -> Result<String> {
        let url = format!("{}{}", self.base_url, TOKEN_PATH);
        debug!(grant, "requesting access token");
        if let Some(ref mut logger) = self.logger {
            logger.log_request(TOKEN_PATH, &form);
        }

        let issued_at = Utc::now();
        let resp = self.http.post(&url).form(&form).send().await?;
        let status = resp.status().as_u16();
        if status != 200 {
            warn!(grant, status, "token request rejected");
            return Err(Error::Auth { status });
        }

        let body: Value = resp.json().await?;
        if let Some(ref mut logger) = self.logger {
            logger.log_response("token", TOKEN_PATH, status, &body);
        }
        let token: TokenResponse = serde_json::from_value(body)
            .map_err(|e| Error::Protocol(format!("bad token response: {e}")))?;

        let mut session = Session::new(token, issued_at);
        if grant == "refresh_token" {
            session.inherit_refresh(self.session.take());
        }
        debug!(
            access_expires = ?session.access_expires_at,
            refresh_expires = ?session.refresh_expires_at,
            "received access token"
        );
        let access = session.access_token.clone();
        self.session = Some(session);
        Ok(access)
    }

    /// Run a data request with a fresh token. If the API rejects it, log in
    /// again and send it exactly once more.
    async fn call(&mut self, req: &ApiRequest) -> Result<Value> {
        self.authenticate(false).await?;
        match self.send(req).await {
            Err(e) if e.is_rejected() => {
                debug!(path = req.path, error = %e, "request rejected, logging in again");
                self.authenticate(true).await?;
                self.send(req).await
            }
            result => result,
        }
    }

    async fn send(&mut self, req: &ApiRequest) -> Result<Value> {
        let url = format!("{}{}", self.base_url, req.path);
        let token = self.access_token().unwrap_or_default().to_string();
        if let Some(ref mut logger) = self.logger {
            logger.log_request(req.path, &req.form);
        }
        trace!(path = req.path, "POST");

        let resp = self
            .http
            .post(&url)
            .bearer_auth(token)
            .form(&req.form)
            .send()
            .await?;
        let status = resp.status().as_u16();
        if status != 200 {
            warn!(path = req.path, status, "request failed");
            return Err(Error::Status(status));
        }

        let body: Value = resp.json().await?;
        if let Some(ref mut logger) = self.logger {
            logger.log_response(&req.channel, req.path, status, &body);
        }
        let envelope: Envelope = serde_json::from_value(body)
            .map_err(|e| Error::Protocol(format!("bad response envelope: {e}")))?;
        if !envelope.accepts(req.expect) {
            let err = envelope.rejection();
            warn!(path = req.path, error = %err, "request refused");
            return Err(err);
        }
        Ok(envelope.data)
    }

    fn dispatch(&self, home: &SmartHome, events: &[Event]) {
        for event in events {
            for cb in &self.event_callbacks {
                cb(event);
            }
        }
        for cb in &self.snapshot_callbacks {
            cb(home);
        }
        if !events.is_empty() {
            debug!(smarthome_id = %home.smarthome_id, count = events.len(), "device changes");
        }
    }
}
