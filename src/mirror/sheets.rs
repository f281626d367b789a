use std::path::PathBuf;
use std::time::{Duration, Instant};

use log::{debug, info};
use reqwest::blocking::{Client, Response};
use reqwest::Url;
use rust_decimal::prelude::ToPrimitive;
use serde::Deserialize;
use serde_json::{json, Value};

use super::credentials::{ServiceAccountKey, JWT_BEARER_GRANT};
use super::{AuthError, MirrorError, RemoteError, Replicate};
use crate::orders::order::Order;

pub const SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/drive",
];
pub const SHEETS_API_URL: &str = "https://sheets.googleapis.com";
pub const DRIVE_API_URL: &str = "https://www.googleapis.com";

const SPREADSHEET_MIME_TYPE: &str = "application/vnd.google-apps.spreadsheet";
/// Tokens are refreshed this long before Google says they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);
/// Upper bound on the lifetime trusted from a token response.
const MAX_TOKEN_LIFETIME_SECS: u64 = 3600;

#[derive(Debug, Clone)]
pub struct MirrorConfig {
    pub credentials_path: PathBuf,
    /// Looked up through Drive unless `spreadsheet_id` is set.
    pub spreadsheet_title: String,
    pub spreadsheet_id: Option<String>,
    /// Defaults to the first worksheet.
    pub worksheet: Option<String>,
    pub sheets_api_url: String,
    pub drive_api_url: String,
    pub timeout: Duration,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        MirrorConfig {
            credentials_path: PathBuf::from("credentials.json"),
            spreadsheet_title: "Orders".to_string(),
            spreadsheet_id: None,
            worksheet: None,
            sheets_api_url: SHEETS_API_URL.to_string(),
            drive_api_url: DRIVE_API_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// An authorized handle on the remote service.
#[derive(Debug, Clone)]
pub struct Session {
    access_token: String,
    expires_at: Instant,
}

impl Session {
    pub fn is_fresh(&self) -> bool {
        Instant::now() + EXPIRY_MARGIN < self.expires_at
    }
}

/// A resolved worksheet rows are appended to.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteTable {
    pub spreadsheet_id: String,
    pub worksheet: String,
}

impl RemoteTable {
    fn append_range(&self) -> String {
        format!("'{}'", self.worksheet.replace('\'', "''"))
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3600
}

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Deserialize)]
struct SpreadsheetInfo {
    #[serde(default)]
    sheets: Vec<SheetInfo>,
}

#[derive(Deserialize)]
struct SheetInfo {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    title: String,
}

/// Mirrors orders into a Google Sheets worksheet.
///
/// The session and the resolved worksheet are cached, so only the first
/// replication (and the first one after the token expires) pays for the
/// token exchange and lookups.
#[derive(Debug)]
pub struct SheetsMirror {
    config: MirrorConfig,
    http: Client,
    session: Option<Session>,
    table: Option<RemoteTable>,
}

impl SheetsMirror {
    pub fn new(config: MirrorConfig) -> Result<SheetsMirror, RemoteError> {
        let http = Client::builder().timeout(config.timeout).build()?;
        Ok(SheetsMirror::with_client(config, http))
    }

    pub fn with_client(config: MirrorConfig, http: Client) -> SheetsMirror {
        SheetsMirror {
            config,
            http,
            session: None,
            table: None,
        }
    }

    /// Exchanges the service account key for an access token.
    pub fn authenticate(&self) -> Result<Session, AuthError> {
        let key = ServiceAccountKey::from_file(&self.config.credentials_path)?;
        let assertion = key.assertion(&SCOPES, chrono::Utc::now().timestamp())?;

        debug!("requesting access token, account={}, uri={}", key.client_email, key.token_uri);
        let response = self
            .http
            .post(&key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        let token: TokenResponse = response.json()?;
        Ok(Session {
            access_token: token.access_token,
            expires_at: Instant::now() + Duration::from_secs(token.expires_in.min(MAX_TOKEN_LIFETIME_SECS)),
        })
    }

    /// Resolves the configured spreadsheet and worksheet.
    pub fn open_table(&self, session: &Session) -> Result<RemoteTable, RemoteError> {
        let spreadsheet_id = match &self.config.spreadsheet_id {
            Some(id) => id.clone(),
            None => self.find_spreadsheet(session, &self.config.spreadsheet_title)?,
        };

        let worksheet = match &self.config.worksheet {
            Some(worksheet) => worksheet.clone(),
            None => self.first_worksheet(session, &spreadsheet_id)?,
        };

        debug!("opened remote table, spreadsheet={}, worksheet={}", spreadsheet_id, worksheet);
        Ok(RemoteTable {
            spreadsheet_id,
            worksheet,
        })
    }

    pub fn append_row(&self, session: &Session, table: &RemoteTable, values: &[Value]) -> Result<(), RemoteError> {
        let range = format!("{}:append", table.append_range());
        let url = endpoint(
            &self.config.sheets_api_url,
            &["v4", "spreadsheets", &table.spreadsheet_id, "values", &range],
        )?;

        let response = self
            .http
            .post(url)
            .bearer_auth(&session.access_token)
            .query(&[("valueInputOption", "RAW"), ("insertDataOption", "INSERT_ROWS")])
            .json(&json!({ "majorDimension": "ROWS", "values": [values] }))
            .send()?;
        check(response)?;

        Ok(())
    }

    fn find_spreadsheet(&self, session: &Session, title: &str) -> Result<String, RemoteError> {
        let url = endpoint(&self.config.drive_api_url, &["drive", "v3", "files"])?;
        let query = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            title.replace('\\', "\\\\").replace('\'', "\\'"),
            SPREADSHEET_MIME_TYPE
        );

        let response = self
            .http
            .get(url)
            .bearer_auth(&session.access_token)
            .query(&[("q", query.as_str()), ("fields", "files(id,name)")])
            .send()?;
        let files: FileList = check(response)?.json()?;

        files
            .files
            .into_iter()
            .next()
            .map(|file| file.id)
            .ok_or_else(|| RemoteError::SpreadsheetNotFound(title.to_string()))
    }

    fn first_worksheet(&self, session: &Session, spreadsheet_id: &str) -> Result<String, RemoteError> {
        let url = endpoint(&self.config.sheets_api_url, &["v4", "spreadsheets", spreadsheet_id])?;
        let response = self
            .http
            .get(url)
            .bearer_auth(&session.access_token)
            .query(&[("fields", "sheets.properties.title")])
            .send()?;
        let info: SpreadsheetInfo = check(response)?.json()?;

        info.sheets
            .into_iter()
            .next()
            .map(|sheet| sheet.properties.title)
            .ok_or_else(|| RemoteError::NoWorksheet(spreadsheet_id.to_string()))
    }

    fn session(&mut self) -> Result<Session, AuthError> {
        if let Some(session) = self.session.as_ref().filter(|session| session.is_fresh()) {
            return Ok(session.clone());
        }

        let session = self.authenticate()?;
        self.session = Some(session.clone());

        Ok(session)
    }

    /// Drops the cached session on a 401 so the next call authenticates again.
    fn forget_revoked(&mut self, err: RemoteError) -> RemoteError {
        if matches!(err, RemoteError::Status { status: 401, .. }) {
            debug!("access token rejected, dropping session");
            self.session = None;
        }
        err
    }

    fn table(&mut self, session: &Session) -> Result<RemoteTable, RemoteError> {
        if let Some(table) = &self.table {
            return Ok(table.clone());
        }

        let table = self.open_table(session)?;
        self.table = Some(table.clone());

        Ok(table)
    }
}

impl Replicate for SheetsMirror {
    fn replicate(&mut self, order: &Order) -> Result<(), MirrorError> {
        let values = row_values(order)?;
        let session = self.session()?;
        let table = self.table(&session).map_err(|err| self.forget_revoked(err))?;
        self.append_row(&session, &table, &values).map_err(|err| self.forget_revoked(err))?;

        info!(
            "mirrored order, spreadsheet={}, worksheet={}, customer={}",
            table.spreadsheet_id,
            table.worksheet,
            order.customer_name()
        );

        Ok(())
    }
}

/// The five positional cell values of a remote row, amount as a number.
pub fn row_values(order: &Order) -> Result<Vec<Value>, RemoteError> {
    let amount = order
        .amount()
        .to_f64()
        .ok_or(RemoteError::InvalidAmount(order.amount()))?;

    Ok(vec![
        json!(order.formatted_timestamp()),
        json!(order.customer_name()),
        json!(order.contact()),
        json!(order.order_details()),
        json!(amount),
    ])
}

fn endpoint(base: &str, segments: &[&str]) -> Result<Url, RemoteError> {
    let mut url = Url::parse(base).map_err(|_| RemoteError::InvalidUrl(base.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| RemoteError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(segments);

    Ok(url)
}

fn check(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    Err(RemoteError::Status {
        status: status.as_u16(),
        message: error_message(&body),
    })
}

/// Pulls a readable message out of Google's error envelopes, falling back to
/// the raw body.
fn error_message(body: &str) -> String {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let message = parsed.as_ref().and_then(|value| match value.get("error") {
        Some(Value::Object(error)) => error.get("message").and_then(Value::as_str).map(str::to_string),
        Some(Value::String(error)) => Some(match value.get("error_description").and_then(Value::as_str) {
            Some(description) => format!("{error}: {description}"),
            None => error.clone(),
        }),
        _ => None,
    });

    message.unwrap_or_else(|| body.trim().to_string())
}
