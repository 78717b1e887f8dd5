use serde::Deserialize;
use serde_json::Value;

use crate::types::{LastCommunication, Mode, SmartHome, Temperature, Zone};
use crate::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "https://smarthome.wattselectronics.com";
pub const DEFAULT_CLIENT_ID: &str = "app-front";
pub const DEFAULT_LANG: &str = "nl_NL";

pub const TOKEN_PATH: &str = "/auth/realms/watts/protocol/openid-connect/token";
pub const USER_READ_PATH: &str = "/api/v0.1/human/user/read/";
pub const SMARTHOME_READ_PATH: &str = "/api/v0.1/human/smarthome/read/";
pub const PUSH_PATH: &str = "/api/v0.1/human/query/push/";
pub const LAST_CONNEXION_PATH: &str = "/api/v0.1/human/sandbox/check_last_connexion/";

const BOOST_SECONDS: &str = "7200";
const PEREMPTION: &str = "15000";
const PEREMPTION_FROST: &str = "20000";

const PUSH_OK_KEY: &str = "OK_SET";
const PUSH_OK_VALUE: &str = "Insert / update success";

pub(crate) type Form = Vec<(&'static str, String)>;

/// What a data request needs from the response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Expect {
    Ok,
    Updated,
}

/// A form POST against the data API; replayable for the re-login retry.
#[derive(Debug, Clone)]
pub(crate) struct ApiRequest {
    pub path: &'static str,
    pub form: Form,
    pub expect: Expect,
    /// Groups successive responses for the diffed message log.
    pub channel: String,
}

pub(crate) fn password_grant_form(client_id: &str, username: &str, password: &str) -> Form {
    vec![
        ("grant_type", "password".to_string()),
        ("username", username.to_string()),
        ("password", password.to_string()),
        ("client_id", client_id.to_string()),
    ]
}

pub(crate) fn refresh_grant_form(client_id: &str, refresh_token: &str) -> Form {
    vec![
        ("grant_type", "refresh_token".to_string()),
        ("refresh_token", refresh_token.to_string()),
        ("client_id", client_id.to_string()),
    ]
}

pub(crate) fn user_read(email: &str, lang: &str) -> ApiRequest {
    ApiRequest {
        path: USER_READ_PATH,
        form: vec![
            ("token", "true".to_string()),
            ("email", email.to_string()),
            ("lang", lang.to_string()),
        ],
        expect: Expect::Ok,
        channel: "user/read".to_string(),
    }
}

pub(crate) fn smarthome_read(smarthome_id: &str, lang: &str) -> ApiRequest {
    ApiRequest {
        path: SMARTHOME_READ_PATH,
        form: vec![
            ("token", "true".to_string()),
            ("smarthome_id", smarthome_id.to_string()),
            ("lang", lang.to_string()),
        ],
        expect: Expect::Ok,
        channel: format!("smarthome/read/{smarthome_id}"),
    }
}

pub(crate) fn last_connexion(smarthome_id: &str, lang: &str) -> ApiRequest {
    ApiRequest {
        path: LAST_CONNEXION_PATH,
        form: vec![
            ("token", "true".to_string()),
            ("smarthome_id", smarthome_id.to_string()),
            ("lang", lang.to_string()),
        ],
        expect: Expect::Ok,
        channel: format!("last_connexion/{smarthome_id}"),
    }
}

pub(crate) fn push(
    smarthome_id: &str,
    device_id: &str,
    mode: Mode,
    value: Temperature,
    lang: &str,
) -> ApiRequest {
    ApiRequest {
        path: PUSH_PATH,
        form: push_form(smarthome_id, device_id, mode, value, lang),
        expect: Expect::Updated,
        channel: format!("push/{smarthome_id}/{device_id}"),
    }
}

/// Form for the query-push endpoint. Every mode sends the same base fields;
/// the mode decides the setpoint fields, boost time and expiry window.
pub(crate) fn push_form(
    smarthome_id: &str,
    device_id: &str,
    mode: Mode,
    value: Temperature,
    lang: &str,
) -> Form {
    let time_boost = if mode == Mode::Boost { BOOST_SECONDS } else { "0" };
    let peremption = if mode == Mode::FrostProtection {
        PEREMPTION_FROST
    } else {
        PEREMPTION
    };

    let mut form = vec![
        ("token", "true".to_string()),
        ("context", "1".to_string()),
        ("smarthome_id", smarthome_id.to_string()),
        ("query[id_device]", device_id.to_string()),
        ("query[time_boost]", time_boost.to_string()),
        ("query[gv_mode]", mode.as_code().to_string()),
        ("query[nv_mode]", mode.as_code().to_string()),
        ("peremption", peremption.to_string()),
        ("lang", lang.to_string()),
    ];
    form.extend(
        mode.setpoints(value)
            .into_iter()
            .map(|(field, v)| (query_key(field), v)),
    );
    form
}

fn query_key(field: &str) -> &'static str {
    match field {
        "consigne_confort" => "query[consigne_confort]",
        "consigne_hg" => "query[consigne_hg]",
        "consigne_eco" => "query[consigne_eco]",
        "consigne_boost" => "query[consigne_boost]",
        _ => "query[consigne_manuel]",
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_expires_in: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct EnvelopeCode {
    #[serde(default)]
    pub code: Value,
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub value: String,
}

/// Standard response wrapper of the data API.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Envelope {
    #[serde(default)]
    pub code: EnvelopeCode,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn accepts(&self, expect: Expect) -> bool {
        match expect {
            Expect::Ok => self.code.key == "OK" || self.code.key.starts_with("OK_"),
            Expect::Updated => self.code.key == PUSH_OK_KEY && self.code.value == PUSH_OK_VALUE,
        }
    }

    pub fn rejection(&self) -> Error {
        let code = match &self.code.code {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        Error::Envelope {
            code,
            key: self.code.key.clone(),
            value: self.code.value.clone(),
        }
    }
}

pub(crate) fn parse_smarthomes(data: &Value) -> Result<Vec<SmartHome>> {
    let homes = match data.get("smarthomes") {
        Some(Value::Null) => return Ok(Vec::new()),
        Some(homes) => homes,
        None => return Err(Error::Protocol("user data without smarthomes".to_string())),
    };
    serde_json::from_value(homes.clone())
        .map_err(|e| Error::Protocol(format!("bad smarthomes payload: {e}")))
}

/// Zones of one smart home. Installations without zones report a flat
/// `devices` list, which becomes a single unnamed zone.
pub(crate) fn parse_zones(data: &Value) -> Result<Vec<Zone>> {
    match (data.get("zones"), data.get("devices")) {
        (Some(Value::Null), _) => Ok(Vec::new()),
        (Some(zones), _) => serde_json::from_value(zones.clone())
            .map_err(|e| Error::Protocol(format!("bad zones payload: {e}"))),
        (None, Some(devices)) => {
            let zone: Zone = serde_json::from_value(serde_json::json!({ "devices": devices }))
                .map_err(|e| Error::Protocol(format!("bad devices payload: {e}")))?;
            Ok(vec![zone])
        }
        (None, None) => Err(Error::Protocol("smarthome data without zones".to_string())),
    }
}

pub(crate) fn parse_last_communication(data: &Value) -> Result<LastCommunication> {
    let diff = data
        .get("diffObj")
        .ok_or_else(|| Error::Protocol("last connexion without diffObj".to_string()))?;
    serde_json::from_value(diff.clone())
        .map_err(|e| Error::Protocol(format!("bad diffObj payload: {e}")))
}
