//! Blocking HTTP client for the BMR HC64 heating controller.
//!
//! - Blocking client using `ureq` (no async).
//! - Every endpoint is a form-encoded POST answered with positional text;
//!   decoding lives in `crate::protocol`.
//! - No session is kept: each operation logs in again before its request,
//!   so the client holds nothing but credentials and the transport.
//!
//! Authentication
//! - Username and password are obfuscated with a key derived from the day of
//!   month (see `crate::auth`) and posted to `/menu.html`.

use chrono::{Datelike, Local, NaiveDateTime};
use http::StatusCode;
use log::{debug, warn};
use std::time::Duration;

use crate::auth::{login_hash, LOGIN_ERROR_MARKER};
use crate::models::bmr::{Assignments, CircuitId, CircuitStatus, LowMode};
use crate::protocol;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=UTF-8";

#[derive(Debug)]
pub enum BmrClientError {
    /// The controller rejected the login.
    AuthenticationFailure,
    Transport(String),
    UnexpectedStatus { status: u16 },
    /// The response does not have the expected shape; carries the raw text.
    MalformedResponse(String),
    UnknownCircuit { circuit: CircuitId, count: usize },
}

impl core::fmt::Display for BmrClientError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            BmrClientError::AuthenticationFailure => {
                write!(f, "authentication failed, check username/password")
            }
            BmrClientError::Transport(s) => write!(f, "transport error: {}", s),
            BmrClientError::UnexpectedStatus { status } => write!(f, "server returned status code {}", status),
            BmrClientError::MalformedResponse(text) => write!(f, "server returned malformed data: {:?}", text),
            BmrClientError::UnknownCircuit { circuit, count } => {
                write!(f, "circuit {} out of range (controller reports {} circuit(s))", circuit, count)
            }
        }
    }
}

impl std::error::Error for BmrClientError {}

impl From<ureq::Error> for BmrClientError {
    fn from(value: ureq::Error) -> Self {
        BmrClientError::Transport(value.to_string())
    }
}

/// Raw HTTP answer from the controller.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub body: String,
}

/// Submits one form to the controller.
pub trait Transport {
    fn post_form(&self, path: &str, fields: &[(&str, String)]) -> Result<Reply, BmrClientError>;
}

pub struct UreqTransport {
    agent: ureq::Agent,
    base_url: String,
}

impl UreqTransport {
    pub fn new(host: &str, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
            .build();

        UreqTransport {
            agent: ureq::Agent::new_with_config(config),
            base_url: base_url(host),
        }
    }
}

fn base_url(host: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("http://{}", host)
    }
}

impl Transport for UreqTransport {
    fn post_form(&self, path: &str, fields: &[(&str, String)]) -> Result<Reply, BmrClientError> {
        let url = format!("{}{}", self.base_url, path);
        let body = protocol::encode_form(fields);

        let mut res = self
            .agent
            .post(&url)
            .header("Content-Type", FORM_CONTENT_TYPE)
            .send(body.as_str())?;
        let status = res.status();
        // Null padding and stray bytes must reach the parsers, not fail the call.
        let bytes = res.body_mut().read_to_vec()?;

        Ok(Reply {
            status,
            body: String::from_utf8_lossy(&bytes).into_owned(),
        })
    }
}

fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Setters answer with a body containing `true` on success.
fn accepted(body: &str) -> bool {
    body.contains("true")
}

fn no_param() -> [(&'static str, String); 1] {
    [("param", protocol::NO_PARAM.to_string())]
}

pub struct BmrClient<T = UreqTransport> {
    transport: T,
    username: String,
    password: String,
    clock: fn() -> NaiveDateTime,
}

impl BmrClient<UreqTransport> {
    pub fn new(host: &str, username: impl Into<String>, password: impl Into<String>, timeout: Duration) -> Self {
        Self::with_transport(UreqTransport::new(host, timeout), username, password)
    }
}

impl<T: Transport> BmrClient<T> {
    pub fn with_transport(transport: T, username: impl Into<String>, password: impl Into<String>) -> Self {
        BmrClient {
            transport,
            username: username.into(),
            password: password.into(),
            clock: local_now,
        }
    }

    /// Replace the wall clock used for the login key and low mode defaults.
    pub fn with_clock(mut self, clock: fn() -> NaiveDateTime) -> Self {
        self.clock = clock;
        self
    }

    fn post(&self, path: &str, fields: &[(&str, String)]) -> Result<String, BmrClientError> {
        debug!("POST {} ({} field(s))", path, fields.len());
        let reply = self.transport.post_form(path, fields)?;
        if reply.status != StatusCode::OK {
            return Err(BmrClientError::UnexpectedStatus {
                status: reply.status.as_u16(),
            });
        }
        Ok(reply.body)
    }

    fn ensure_auth(&self) -> Result<(), BmrClientError> {
        if self.auth()? {
            Ok(())
        } else {
            Err(BmrClientError::AuthenticationFailure)
        }
    }

    fn authenticated_post(&self, path: &str, fields: &[(&str, String)]) -> Result<String, BmrClientError> {
        self.ensure_auth()?;
        self.post(path, fields)
    }

    /// Log in. `Ok(false)` when the controller rejects the credentials.
    pub fn auth(&self) -> Result<bool, BmrClientError> {
        let day = (self.clock)().day();
        let body = self.post(
            "/menu.html",
            &[
                ("loginName", login_hash(&self.username, day)),
                ("passwd", login_hash(&self.password, day)),
            ],
        )?;
        if body.contains(LOGIN_ERROR_MARKER) {
            warn!("Controller rejected login for user {}", self.username);
            return Ok(false);
        }
        Ok(true)
    }

    pub fn get_num_circuits(&self) -> Result<u8, BmrClientError> {
        let body = self.authenticated_post("/numOfRooms", &no_param())?;
        protocol::parse_num_circuits(&body)
    }

    pub fn load_circuit(&self, circuit_id: CircuitId) -> Result<CircuitStatus, BmrClientError> {
        let body = self.authenticated_post("/wholeRoom", &[("param", circuit_id.to_string())])?;
        protocol::parse_circuit(circuit_id, &body)
    }

    /// Set the temperature of a heating mode. `mode_name` is cut to 13
    /// characters; the fraction of `temperature` is dropped.
    pub fn set_target_temperature(
        &self,
        temperature: f64,
        mode_order_number: u8,
        mode_name: &str,
    ) -> Result<bool, BmrClientError> {
        let settings = protocol::encode_mode_settings(mode_order_number, mode_name, temperature);
        let body = self.authenticated_post("/saveMode", &[("modeSettings", settings)])?;
        Ok(accepted(&body))
    }

    /// `true` when summer mode is on. The device reports it as `"0"`.
    pub fn get_summer_mode(&self) -> Result<bool, BmrClientError> {
        let body = self.authenticated_post("/loadSummerMode", &no_param())?;
        Ok(body == "0")
    }

    pub fn set_summer_mode(&self, value: bool) -> Result<bool, BmrClientError> {
        let flag = if value { "0" } else { "1" };
        let body = self.authenticated_post("/saveSummerMode", &[("summerMode", flag.to_string())])?;
        Ok(accepted(&body))
    }

    /// Which circuits summer mode applies to when it is turned on.
    pub fn load_summer_mode_assignments(&self) -> Result<Assignments, BmrClientError> {
        let body = self.authenticated_post("/letoLoadRooms", &no_param())?;
        protocol::parse_assignments(&body)
    }

    /// Add or remove `circuits` to/from summer mode, leaving others as they are.
    pub fn save_summer_mode_assignments(&self, circuits: &[CircuitId], value: bool) -> Result<bool, BmrClientError> {
        self.ensure_auth()?;
        let mut assignments = self.load_summer_mode_assignments()?;
        self.save_assignments("/letoSaveRooms", &mut assignments, circuits, value)
    }

    pub fn get_low_mode(&self) -> Result<LowMode, BmrClientError> {
        let body = self.authenticated_post("/loadLows", &no_param())?;
        protocol::parse_low_mode(&body)
    }

    /// Enable or disable LOW mode.
    ///
    /// - `temperature` defaults to the currently configured LOW temperature.
    /// - `start` defaults to now; without `end` LOW mode runs indefinitely.
    /// - When disabling, both bounds are cleared.
    pub fn set_low_mode(
        &self,
        enabled: bool,
        temperature: Option<u16>,
        start: Option<NaiveDateTime>,
        end: Option<NaiveDateTime>,
    ) -> Result<bool, BmrClientError> {
        self.ensure_auth()?;

        let start = start.unwrap_or_else(self.clock);
        let temperature = match temperature {
            Some(t) => t,
            None => self.get_low_mode()?.temperature,
        };

        let low_data = protocol::encode_low_mode(enabled, temperature, Some(start), end);
        let body = self.post("/lowSave", &[("lowData", low_data)])?;
        Ok(accepted(&body))
    }

    /// Which circuits LOW mode applies to when it is turned on.
    pub fn load_low_mode_assignments(&self) -> Result<Assignments, BmrClientError> {
        let body = self.authenticated_post("/lowLoadRooms", &no_param())?;
        protocol::parse_assignments(&body)
    }

    /// Add or remove `circuits` to/from LOW mode, leaving others as they are.
    pub fn save_low_mode_assignments(&self, circuits: &[CircuitId], value: bool) -> Result<bool, BmrClientError> {
        self.ensure_auth()?;
        let mut assignments = self.load_low_mode_assignments()?;
        self.save_assignments("/lowSaveRooms", &mut assignments, circuits, value)
    }

    /// The device has no partial update; the whole vector is resent.
    fn save_assignments(
        &self,
        path: &str,
        assignments: &mut Assignments,
        circuits: &[CircuitId],
        value: bool,
    ) -> Result<bool, BmrClientError> {
        protocol::apply_assignments(assignments, circuits, value)?;
        let body = self.post(path, &[("value", protocol::encode_assignments(assignments))])?;
        Ok(accepted(&body))
    }

    /// Heating mode assigned to a circuit. `None` for a missing circuit (no
    /// request is made) or when the device answers with garbage.
    pub fn get_mode_id(&self, circuit_id: Option<CircuitId>) -> Result<Option<i32>, BmrClientError> {
        let Some(circuit_id) = circuit_id else {
            return Ok(None);
        };
        let body = self.authenticated_post("/roomSettings", &[("roomID", circuit_id.to_string())])?;
        Ok(protocol::parse_mode_id(&body))
    }

    pub fn set_mode_id(&self, circuit_id: CircuitId, mode_id: u8) -> Result<bool, BmrClientError> {
        let settings = protocol::encode_room_settings(circuit_id, mode_id);
        let body = self.authenticated_post("/saveAssignmentModes", &[("roomSettings", settings)])?;
        Ok(accepted(&body))
    }

    /// `true` while the low-tariff (HDO) signal is active.
    pub fn load_hdo(&self) -> Result<bool, BmrClientError> {
        let body = self.authenticated_post("/loadHDO", &no_param())?;
        Ok(body == "1")
    }
}
